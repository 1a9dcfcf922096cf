use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::codec::{Entity, Lookup, Patch, PatchMode};
use crate::error::{Error, Result};
use crate::model::{is_blank, Id};

/// A laboratory that owns equipment and work units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lab {
    pub id: Id,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LabLookup {
    pub name: Option<String>,
    pub search: Option<String>,
}

impl Patch for LabPatch {
    const ENTITY: &'static str = "lab";

    fn validate(&self, mode: PatchMode) -> Result<()> {
        match (&self.name, mode) {
            (None, PatchMode::Create) => Err(Error::validation(Self::ENTITY, "name is required")),
            (Some(name), _) if is_blank(name) => {
                Err(Error::validation(Self::ENTITY, "name must not be blank"))
            }
            _ => Ok(()),
        }
    }
}

impl Lookup for LabLookup {
    fn by_name(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            ..Self::default()
        }
    }
}

impl Entity for Lab {
    type Patch = LabPatch;
    type Lookup = LabLookup;

    const NAME: &'static str = "lab";
    const PATH: &'static str = "/labs";

    fn id(&self) -> Id {
        self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn to_patch(&self) -> LabPatch {
        LabPatch {
            name: Some(self.name.clone()),
        }
    }
}
