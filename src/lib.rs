pub mod codec;
pub mod config;
pub mod context;
pub mod error;
pub mod model;
pub mod service;
pub mod store;

#[cfg(test)]
mod testing;

pub use codec::{Entity, Lookup, Patch, PatchMode};
pub use context::*;
pub use error::{Error, Result};
pub use model::*;
pub use service::*;
pub use store::*;
