//! Wire codec for entity records, patches and lookups.
//!
//! Every entity type describes itself through [`Entity`]: where it lives on
//! the backend, how its wire record decodes, and which [`Patch`] and
//! [`Lookup`] shapes it accepts. All functions here are pure.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Debug;

use crate::error::{Error, Result};
use crate::model::Id;

/// Whether a patch describes a new record or changes to an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchMode {
    Create,
    Update,
}

/// A typed set of fields to write. Unset fields are omitted from the wire.
pub trait Patch:
    Debug + Clone + Default + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Entity name used in validation and codec errors.
    const ENTITY: &'static str;

    /// Check the patch locally. `Create` requires every required field.
    fn validate(&self, mode: PatchMode) -> Result<()>;

    fn to_wire(&self) -> Result<Value> {
        encode(Self::ENTITY, self)
    }

    fn from_wire(record: Value) -> Result<Self> {
        decode(Self::ENTITY, record)
    }
}

/// Query filters for a list request. Never identifies a single entity.
pub trait Lookup: Debug + Clone + Default + Serialize + Send + Sync + 'static {
    /// Lookup matching records with exactly this name.
    fn by_name(name: &str) -> Self;

    fn to_params(&self) -> Result<Vec<(String, String)>> {
        lookup_params(self)
    }
}

pub trait Entity:
    Debug + Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    type Patch: Patch;
    type Lookup: Lookup;

    /// Human readable name, e.g. `"equipment"`.
    const NAME: &'static str;
    /// Backend base path, e.g. `"/lab/equipments"`.
    const PATH: &'static str;

    fn id(&self) -> Id;
    fn created_at(&self) -> DateTime<Utc>;
    fn updated_at(&self) -> DateTime<Utc>;

    /// The patch that would recreate every writable field of this entity.
    fn to_patch(&self) -> Self::Patch;

    fn decode(record: Value) -> Result<Self> {
        decode(Self::NAME, record)
    }

    fn encode(&self) -> Result<Value> {
        encode(Self::NAME, self)
    }
}

pub fn decode<T: DeserializeOwned>(entity: &'static str, record: Value) -> Result<T> {
    serde_json::from_value(record).map_err(|err| Error::codec(entity, err))
}

pub fn encode<T: Serialize>(entity: &'static str, value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|err| Error::codec(entity, err))
}

/// Flatten a lookup into query parameters. Unset filters are dropped and
/// list filters repeat their key once per element.
pub fn lookup_params<L: Serialize>(lookup: &L) -> Result<Vec<(String, String)>> {
    let value = encode("lookup", lookup)?;
    let Value::Object(fields) = value else {
        return Err(Error::codec("lookup", "lookup must encode to an object"));
    };

    let mut params = Vec::new();
    for (key, value) in fields {
        match value {
            Value::Null => {}
            Value::Array(items) => {
                for item in items {
                    if let Some(item) = scalar_param(item)? {
                        params.push((key.clone(), item));
                    }
                }
            }
            other => {
                if let Some(value) = scalar_param(other)? {
                    params.push((key, value));
                }
            }
        }
    }
    Ok(params)
}

fn scalar_param(value: Value) -> Result<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Bool(b) => Ok(Some(b.to_string())),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Array(_) | Value::Object(_) => Err(Error::codec(
            "lookup",
            "nested values cannot be sent as query parameters",
        )),
    }
}
