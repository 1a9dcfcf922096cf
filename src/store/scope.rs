use parking_lot::Mutex;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use crate::codec::Entity;
use crate::context::{ContainerContext, EntityContext};
use crate::model::ResourceContainer;
use crate::service::{EntityService, Transport};
use crate::store::EntityCollection;

/// Owns one [`EntityCollection`] per entity type for everything created
/// through it. Collections are created on first use.
pub struct Scope {
    transport: Arc<dyn Transport>,
    collections: Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl Scope {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            collections: Mutex::new(HashMap::new()),
        }
    }

    pub fn collection<E: Entity>(&self) -> Arc<EntityCollection<E>> {
        let mut collections = self.collections.lock();
        let entry = collections.entry(TypeId::of::<E>()).or_insert_with(|| {
            let service = EntityService::<E>::new(Arc::clone(&self.transport));
            Arc::new(EntityCollection::new(service)) as Arc<dyn Any + Send + Sync>
        });

        match Arc::clone(entry).downcast::<EntityCollection<E>>() {
            Ok(collection) => collection,
            Err(_) => unreachable!("collection registered under a foreign type id"),
        }
    }

    /// A fresh editing session backed by this scope's collection.
    pub fn context<E: Entity>(&self) -> EntityContext<E> {
        EntityContext::new(self.collection::<E>())
    }

    pub fn container_context<C: ResourceContainer>(&self) -> ContainerContext<C> {
        ContainerContext::new(self.collection::<C>())
    }
}
