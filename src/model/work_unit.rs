use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::codec::{Entity, Lookup, Patch, PatchMode};
use crate::error::{Error, Result};
use crate::model::resource::{unwrap_all, validate_all, wrap_all};
use crate::model::{
    is_blank, EquipmentLease, Id, InputMaterial, OutputMaterial, Resource, ResourceContainer,
    ResourceType, SoftwareLease,
};

/// A unit of lab work and every resource it requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkUnit {
    pub id: Id,
    pub lab_id: Id,
    pub name: String,
    #[serde(default)]
    pub technician: String,
    #[serde(default)]
    pub process_summary: String,
    #[serde(default)]
    pub equipments: Vec<EquipmentLease>,
    #[serde(default)]
    pub softwares: Vec<SoftwareLease>,
    #[serde(default)]
    pub input_materials: Vec<InputMaterial>,
    #[serde(default)]
    pub output_materials: Vec<OutputMaterial>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkUnitPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lab_id: Option<Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technician: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equipments: Option<Vec<EquipmentLease>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub softwares: Option<Vec<SoftwareLease>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_materials: Option<Vec<InputMaterial>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_materials: Option<Vec<OutputMaterial>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkUnitLookup {
    pub name: Option<String>,
    pub lab: Option<Id>,
    pub technician: Option<String>,
    pub search: Option<String>,
}

impl Patch for WorkUnitPatch {
    const ENTITY: &'static str = "work unit";

    fn validate(&self, mode: PatchMode) -> Result<()> {
        if mode == PatchMode::Create {
            if self.lab_id.is_none() {
                return Err(Error::validation(Self::ENTITY, "lab is required"));
            }
            if self.name.is_none() {
                return Err(Error::validation(Self::ENTITY, "name is required"));
            }
        }
        if self.name.as_deref().is_some_and(is_blank) {
            return Err(Error::validation(Self::ENTITY, "name must not be blank"));
        }

        if let Some(list) = &self.equipments {
            validate_all(list)?;
        }
        if let Some(list) = &self.softwares {
            validate_all(list)?;
        }
        if let Some(list) = &self.input_materials {
            validate_all(list)?;
        }
        if let Some(list) = &self.output_materials {
            validate_all(list)?;
        }
        Ok(())
    }
}

impl Lookup for WorkUnitLookup {
    fn by_name(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            ..Self::default()
        }
    }
}

impl Entity for WorkUnit {
    type Patch = WorkUnitPatch;
    type Lookup = WorkUnitLookup;

    const NAME: &'static str = "work unit";
    const PATH: &'static str = "/lab/work-units";

    fn id(&self) -> Id {
        self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn to_patch(&self) -> WorkUnitPatch {
        WorkUnitPatch {
            lab_id: Some(self.lab_id),
            name: Some(self.name.clone()),
            technician: Some(self.technician.clone()),
            process_summary: Some(self.process_summary.clone()),
            equipments: Some(self.equipments.clone()),
            softwares: Some(self.softwares.clone()),
            input_materials: Some(self.input_materials.clone()),
            output_materials: Some(self.output_materials.clone()),
        }
    }
}

impl ResourceContainer for WorkUnit {
    fn resources(&self, kind: ResourceType) -> Vec<Resource> {
        match kind {
            ResourceType::Equipment => wrap_all(&self.equipments),
            ResourceType::Software => wrap_all(&self.softwares),
            ResourceType::InputMaterial => wrap_all(&self.input_materials),
            ResourceType::OutputMaterial => wrap_all(&self.output_materials),
        }
    }

    fn patch_with_resources(
        &self,
        kind: ResourceType,
        list: Vec<Resource>,
    ) -> Result<WorkUnitPatch> {
        let mut patch = self.to_patch();
        match kind {
            ResourceType::Equipment => patch.equipments = Some(unwrap_all(list)?),
            ResourceType::Software => patch.softwares = Some(unwrap_all(list)?),
            ResourceType::InputMaterial => patch.input_materials = Some(unwrap_all(list)?),
            ResourceType::OutputMaterial => patch.output_materials = Some(unwrap_all(list)?),
        }
        Ok(patch)
    }
}
