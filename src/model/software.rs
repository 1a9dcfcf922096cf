use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::codec::{Entity, Lookup, Patch, PatchMode};
use crate::error::{Error, Result};
use crate::model::{is_blank, Id};

/// A catalogued software package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Software {
    pub id: Id,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoftwarePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SoftwareLookup {
    pub name: Option<String>,
    pub search: Option<String>,
}

impl Patch for SoftwarePatch {
    const ENTITY: &'static str = "software";

    fn validate(&self, mode: PatchMode) -> Result<()> {
        match &self.name {
            None if mode == PatchMode::Create => {
                Err(Error::validation(Self::ENTITY, "name is required"))
            }
            Some(name) if is_blank(name) => {
                Err(Error::validation(Self::ENTITY, "name must not be blank"))
            }
            _ => Ok(()),
        }
    }
}

impl Lookup for SoftwareLookup {
    fn by_name(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            ..Self::default()
        }
    }
}

impl Entity for Software {
    type Patch = SoftwarePatch;
    type Lookup = SoftwareLookup;

    const NAME: &'static str = "software";
    const PATH: &'static str = "/lab/softwares";

    fn id(&self) -> Id {
        self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn to_patch(&self) -> SoftwarePatch {
        SoftwarePatch {
            name: Some(self.name.clone()),
            description: Some(self.description.clone()),
            tags: Some(self.tags.clone()),
        }
    }
}
