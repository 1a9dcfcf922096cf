use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::codec::{Entity, Lookup, Patch, PatchMode};
use crate::error::{Error, Result};
use crate::model::{is_blank, Id};

/// A catalogued piece of lab equipment that work units can lease.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Equipment {
    pub id: Id,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub lab_id: Option<Id>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquipmentPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lab_id: Option<Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EquipmentLookup {
    pub name: Option<String>,
    /// Owning lab id.
    pub lab: Option<Id>,
    pub search: Option<String>,
}

impl Patch for EquipmentPatch {
    const ENTITY: &'static str = "equipment";

    fn validate(&self, mode: PatchMode) -> Result<()> {
        match &self.name {
            None if mode == PatchMode::Create => {
                return Err(Error::validation(Self::ENTITY, "name is required"));
            }
            Some(name) if is_blank(name) => {
                return Err(Error::validation(Self::ENTITY, "name must not be blank"));
            }
            _ => {}
        }
        if let Some(tags) = &self.tags {
            if tags.iter().any(|tag| is_blank(tag)) {
                return Err(Error::validation(Self::ENTITY, "tags must not be blank"));
            }
        }
        Ok(())
    }
}

impl Lookup for EquipmentLookup {
    fn by_name(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            ..Self::default()
        }
    }
}

impl Entity for Equipment {
    type Patch = EquipmentPatch;
    type Lookup = EquipmentLookup;

    const NAME: &'static str = "equipment";
    const PATH: &'static str = "/lab/equipments";

    fn id(&self) -> Id {
        self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn to_patch(&self) -> EquipmentPatch {
        EquipmentPatch {
            name: Some(self.name.clone()),
            description: Some(self.description.clone()),
            lab_id: self.lab_id,
            tags: Some(self.tags.clone()),
        }
    }
}
