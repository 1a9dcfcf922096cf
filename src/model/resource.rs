use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::codec::Entity;
use crate::error::{Error, Result};
use crate::model::{is_blank, Id};

/// The typed sub-resource lists a container owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceType {
    Equipment,
    Software,
    InputMaterial,
    OutputMaterial,
}

impl ResourceType {
    pub const ALL: [ResourceType; 4] = [
        ResourceType::Equipment,
        ResourceType::Software,
        ResourceType::InputMaterial,
        ResourceType::OutputMaterial,
    ];

    /// Key the list travels under inside a container record.
    pub fn wire_key(self) -> &'static str {
        match self {
            ResourceType::Equipment => "equipments",
            ResourceType::Software => "softwares",
            ResourceType::InputMaterial => "inputMaterials",
            ResourceType::OutputMaterial => "outputMaterials",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceType::Equipment => "equipment",
            ResourceType::Software => "software",
            ResourceType::InputMaterial => "input-material",
            ResourceType::OutputMaterial => "output-material",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ResourceType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s || kind.wire_key() == s)
            .ok_or_else(|| Error::validation("resource", format!("unknown resource type '{}'", s)))
    }
}

/// Equipment leased by a work unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquipmentLease {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Id>,
    #[serde(default)]
    pub equipment_id: Option<Id>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub num_required: u32,
}

/// Software a work unit needs installed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoftwareLease {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Id>,
    #[serde(default)]
    pub software_id: Option<Id>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub min_version: Option<String>,
}

/// A material consumed by a work unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputMaterial {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Id>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub base_unit: String,
    pub num_units_required: f64,
}

/// A material produced by a work unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputMaterial {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Id>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub base_unit: String,
    pub num_units_produced: f64,
}

/// One record of a container's sub-resource lists, tagged by type.
#[derive(Debug, Clone, PartialEq)]
pub enum Resource {
    Equipment(EquipmentLease),
    Software(SoftwareLease),
    InputMaterial(InputMaterial),
    OutputMaterial(OutputMaterial),
}

impl Resource {
    /// Empty draft for a pending creation.
    pub fn empty(kind: ResourceType) -> Self {
        match kind {
            ResourceType::Equipment => Resource::Equipment(EquipmentLease::default()),
            ResourceType::Software => Resource::Software(SoftwareLease::default()),
            ResourceType::InputMaterial => Resource::InputMaterial(InputMaterial::default()),
            ResourceType::OutputMaterial => Resource::OutputMaterial(OutputMaterial::default()),
        }
    }

    pub fn kind(&self) -> ResourceType {
        match self {
            Resource::Equipment(_) => ResourceType::Equipment,
            Resource::Software(_) => ResourceType::Software,
            Resource::InputMaterial(_) => ResourceType::InputMaterial,
            Resource::OutputMaterial(_) => ResourceType::OutputMaterial,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Resource::Equipment(r) => &r.name,
            Resource::Software(r) => &r.name,
            Resource::InputMaterial(r) => &r.name,
            Resource::OutputMaterial(r) => &r.name,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Resource::Equipment(r) => r.validate(),
            Resource::Software(r) => r.validate(),
            Resource::InputMaterial(r) => r.validate(),
            Resource::OutputMaterial(r) => r.validate(),
        }
    }
}

/// A concrete sub-resource record type.
pub trait SubResource: Clone + Into<Resource> + Sized {
    const KIND: ResourceType;

    fn from_resource(resource: Resource) -> Option<Self>;

    fn validate(&self) -> Result<()>;
}

macro_rules! into_resource {
    ($ty:ident, $variant:ident) => {
        impl From<$ty> for Resource {
            fn from(value: $ty) -> Self {
                Resource::$variant(value)
            }
        }
    };
}

into_resource!(EquipmentLease, Equipment);
into_resource!(SoftwareLease, Software);
into_resource!(InputMaterial, InputMaterial);
into_resource!(OutputMaterial, OutputMaterial);

fn require_name(kind: ResourceType, name: &str) -> Result<()> {
    if is_blank(name) {
        return Err(Error::validation(kind.as_str(), "name is required"));
    }
    Ok(())
}

fn require_quantity(kind: ResourceType, field: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(Error::validation(
            kind.as_str(),
            format!("{} must be a non-negative number", field),
        ));
    }
    Ok(())
}

impl SubResource for EquipmentLease {
    const KIND: ResourceType = ResourceType::Equipment;

    fn from_resource(resource: Resource) -> Option<Self> {
        match resource {
            Resource::Equipment(r) => Some(r),
            _ => None,
        }
    }

    fn validate(&self) -> Result<()> {
        require_name(Self::KIND, &self.name)?;
        if self.num_required == 0 {
            return Err(Error::validation(
                Self::KIND.as_str(),
                "at least one unit must be required",
            ));
        }
        Ok(())
    }
}

impl SubResource for SoftwareLease {
    const KIND: ResourceType = ResourceType::Software;

    fn from_resource(resource: Resource) -> Option<Self> {
        match resource {
            Resource::Software(r) => Some(r),
            _ => None,
        }
    }

    fn validate(&self) -> Result<()> {
        require_name(Self::KIND, &self.name)
    }
}

impl SubResource for InputMaterial {
    const KIND: ResourceType = ResourceType::InputMaterial;

    fn from_resource(resource: Resource) -> Option<Self> {
        match resource {
            Resource::InputMaterial(r) => Some(r),
            _ => None,
        }
    }

    fn validate(&self) -> Result<()> {
        require_name(Self::KIND, &self.name)?;
        if is_blank(&self.base_unit) {
            return Err(Error::validation(Self::KIND.as_str(), "base unit is required"));
        }
        require_quantity(Self::KIND, "units required", self.num_units_required)
    }
}

impl SubResource for OutputMaterial {
    const KIND: ResourceType = ResourceType::OutputMaterial;

    fn from_resource(resource: Resource) -> Option<Self> {
        match resource {
            Resource::OutputMaterial(r) => Some(r),
            _ => None,
        }
    }

    fn validate(&self) -> Result<()> {
        require_name(Self::KIND, &self.name)?;
        if is_blank(&self.base_unit) {
            return Err(Error::validation(Self::KIND.as_str(), "base unit is required"));
        }
        require_quantity(Self::KIND, "units produced", self.num_units_produced)
    }
}

pub(crate) fn wrap_all<T: SubResource>(records: &[T]) -> Vec<Resource> {
    records.iter().cloned().map(Into::into).collect()
}

/// Narrow a tagged list back to one concrete record type.
pub(crate) fn unwrap_all<T: SubResource>(list: Vec<Resource>) -> Result<Vec<T>> {
    list.into_iter()
        .map(|resource| {
            let found = resource.kind();
            T::from_resource(resource).ok_or_else(|| {
                Error::validation(
                    T::KIND.as_str(),
                    format!("expected {} record, found {}", T::KIND, found),
                )
            })
        })
        .collect()
}

pub(crate) fn validate_all<T: SubResource>(records: &[T]) -> Result<()> {
    records.iter().try_for_each(SubResource::validate)
}

/// An entity that owns typed, index-addressed sub-resource lists.
pub trait ResourceContainer: Entity {
    /// The committed list of `kind`, in positional order.
    fn resources(&self, kind: ResourceType) -> Vec<Resource>;

    /// A full patch carrying every writable field of this container, with
    /// the list of `kind` replaced by `list`.
    fn patch_with_resources(&self, kind: ResourceType, list: Vec<Resource>) -> Result<Self::Patch>;
}
