use log::{debug, warn};
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::codec::{self, Entity, Lookup, Patch};
use crate::error::{Error, Result};
use crate::model::{Id, Page};
use crate::service::transport::{ApiRequest, ApiResponse, Transport};

/// REST client for one entity type, rooted at `E::PATH`.
pub struct EntityService<E: Entity> {
    transport: Arc<dyn Transport>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Clone for EntityService<E> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> EntityService<E> {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            _entity: PhantomData,
        }
    }

    /// `GET {path}/{id}`
    pub async fn fetch(&self, id: Id) -> Result<E> {
        let response = self
            .transport
            .send(ApiRequest::get(format!("{}/{}", E::PATH, id)))
            .await?;

        if response.status == 404 {
            return Err(Error::NotFound {
                resource: E::NAME,
                id,
            });
        }
        E::decode(Self::check(response)?)
    }

    /// `GET {path}?{lookup}&page={page}`
    pub async fn query_page(&self, lookup: &E::Lookup, page: u32) -> Result<Page<E>> {
        let mut params = lookup.to_params()?;
        params.push(("page".to_string(), page.to_string()));

        let response = self
            .transport
            .send(ApiRequest::get(E::PATH).with_query(params))
            .await?;
        let envelope: Page<Value> = codec::decode(E::NAME, Self::check(response)?)?;

        let items = envelope
            .items
            .iter()
            .cloned()
            .map(E::decode)
            .collect::<Result<Vec<_>>>()?;
        debug!(
            "{} page {}/{}: {} items",
            E::NAME,
            envelope.page,
            envelope.page_count,
            items.len()
        );

        Ok(Page {
            items,
            total_item_count: envelope.total_item_count,
            page_count: envelope.page_count,
            page: envelope.page,
        })
    }

    /// `POST {path}`; the response is the created record.
    pub async fn create(&self, patch: &E::Patch) -> Result<E> {
        let response = self
            .transport
            .send(ApiRequest::post(E::PATH, patch.to_wire()?))
            .await?;
        E::decode(Self::check(response)?)
    }

    /// `PUT {path}/{id}`; the response is the full updated record.
    pub async fn update(&self, id: Id, patch: &E::Patch) -> Result<E> {
        let response = self
            .transport
            .send(ApiRequest::put(format!("{}/{}", E::PATH, id), patch.to_wire()?))
            .await?;

        if response.status == 404 {
            return Err(Error::NotFound {
                resource: E::NAME,
                id,
            });
        }
        E::decode(Self::check(response)?)
    }

    fn check(response: ApiResponse) -> Result<Value> {
        if response.is_success() {
            return Ok(response.body);
        }

        let body = match response.body {
            Value::String(text) => text,
            Value::Null => String::new(),
            other => other.to_string(),
        };
        warn!("{} request rejected with status {}", E::NAME, response.status);
        Err(Error::Backend {
            status: response.status,
            body,
        })
    }
}
