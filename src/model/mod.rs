pub mod common;
pub mod equipment;
pub mod lab;
pub mod resource;
pub mod software;
pub mod work_unit;

pub use common::*;
pub use equipment::*;
pub use lab::*;
pub use resource::{
    EquipmentLease, InputMaterial, OutputMaterial, Resource, ResourceContainer, ResourceType,
    SoftwareLease, SubResource,
};
pub use software::*;
pub use work_unit::*;
