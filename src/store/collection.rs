use log::{debug, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

use crate::codec::Entity;
use crate::error::{Error, Result};
use crate::model::{Id, Page};
use crate::service::EntityService;

const EVENT_CAPACITY: usize = 64;

/// Change notification for observers of a collection.
#[derive(Debug, Clone, PartialEq)]
pub enum CollectionEvent<E> {
    Upserted(E),
    Evicted(Id),
}

/// Outcome slot shared by every caller waiting on the same fetch.
type PendingFetch<E> = watch::Receiver<Option<Result<E>>>;

struct CollectionState<E> {
    /// Latest known record per id
    entries: HashMap<Id, E>,
    /// Fetches in flight, keyed by the id they load
    pending: HashMap<Id, PendingFetch<E>>,
}

struct Shared<E> {
    state: Mutex<CollectionState<E>>,
    events: broadcast::Sender<CollectionEvent<E>>,
}

impl<E: Entity> Shared<E> {
    fn upsert(&self, entity: E) {
        self.state.lock().entries.insert(entity.id(), entity.clone());
        // No subscribers is fine
        let _ = self.events.send(CollectionEvent::Upserted(entity));
    }

    /// Record the outcome of a fetch and return what its waiters receive.
    ///
    /// A fetch only starts on a miss, so an entry present now was written
    /// while the request was in flight and is newer than the fetched record.
    fn settle(&self, id: Id, result: Result<E>) -> Result<E> {
        let mut state = self.state.lock();
        state.pending.remove(&id);
        match result {
            Ok(entity) => {
                if let Some(newer) = state.entries.get(&id) {
                    debug!("{} {} written during fetch, keeping it", E::NAME, id);
                    return Ok(newer.clone());
                }
                state.entries.insert(id, entity.clone());
                drop(state);
                let _ = self.events.send(CollectionEvent::Upserted(entity.clone()));
                Ok(entity)
            }
            Err(err) => {
                warn!("fetch of {} {} failed: {}", E::NAME, id, err);
                Err(err)
            }
        }
    }
}

/// Id-keyed cache of one entity type.
///
/// Concurrent fetches of an uncached id share a single backend request.
/// Writes made by contexts arrive through [`EntityCollection::put`] and
/// always replace the previous record for that id. A fetch that was already
/// in flight never replaces a record put after it started.
pub struct EntityCollection<E: Entity> {
    service: EntityService<E>,
    shared: Arc<Shared<E>>,
}

impl<E: Entity> EntityCollection<E> {
    pub fn new(service: EntityService<E>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            service,
            shared: Arc::new(Shared {
                state: Mutex::new(CollectionState {
                    entries: HashMap::new(),
                    pending: HashMap::new(),
                }),
                events,
            }),
        }
    }

    pub fn service(&self) -> &EntityService<E> {
        &self.service
    }

    /// Cached record for `id`, without any I/O.
    pub fn peek(&self, id: &Id) -> Option<E> {
        self.shared.state.lock().entries.get(id).cloned()
    }

    /// Return the cached record for `id`, loading it on a miss.
    pub async fn fetch(&self, id: Id) -> Result<E> {
        let mut pending = {
            let mut state = self.shared.state.lock();
            if let Some(entity) = state.entries.get(&id) {
                debug!("{} {} served from cache", E::NAME, id);
                return Ok(entity.clone());
            }

            match state.pending.get(&id) {
                Some(pending) => {
                    debug!("{} {} joining in-flight fetch", E::NAME, id);
                    pending.clone()
                }
                None => {
                    debug!("{} {} not cached, fetching", E::NAME, id);
                    let (tx, rx) = watch::channel(None);
                    state.pending.insert(id, rx.clone());

                    // Detached so that a dropped caller cannot strand the other waiters
                    let service = self.service.clone();
                    let shared = Arc::clone(&self.shared);
                    tokio::spawn(async move {
                        let result = shared.settle(id, service.fetch(id).await);
                        let _ = tx.send(Some(result));
                    });
                    rx
                }
            }
        };

        let outcome = pending
            .wait_for(Option::is_some)
            .await
            .map_err(|_| Error::FetchAbandoned(id))?
            .clone();
        outcome.unwrap_or(Err(Error::FetchAbandoned(id)))
    }

    /// Fetch one page of a lookup. Every returned record is upserted.
    pub async fn query_page(&self, lookup: &E::Lookup, page: u32) -> Result<Page<E>> {
        let page = self.service.query_page(lookup, page).await?;
        for entity in &page.items {
            self.shared.upsert(entity.clone());
        }
        Ok(page)
    }

    /// Fetch every page of a lookup. Results are never cached by lookup.
    pub async fn query(&self, lookup: &E::Lookup) -> Result<Vec<E>> {
        let mut items = Vec::new();
        let mut number = 1;
        loop {
            let page = self.query_page(lookup, number).await?;
            let last = page.is_last(number);
            items.extend(page.items);
            if last {
                break;
            }
            number += 1;
        }
        Ok(items)
    }

    /// Unconditional upsert by id.
    pub fn put(&self, entity: E) {
        debug!("{} {} updated in cache", E::NAME, entity.id());
        self.shared.upsert(entity);
    }

    pub fn evict(&self, id: &Id) -> Option<E> {
        let removed = self.shared.state.lock().entries.remove(id);
        if removed.is_some() {
            let _ = self.shared.events.send(CollectionEvent::Evicted(*id));
        }
        removed
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CollectionEvent<E>> {
        self.shared.events.subscribe()
    }

    pub fn len(&self) -> usize {
        self.shared.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{generate_id, Equipment, EquipmentLookup};
    use crate::service::{ApiRequest, ApiResponse, Method, Transport};
    use crate::testing::MemoryTransport;
    use serde_json::json;
    use std::time::Duration;

    fn collection(transport: &Arc<MemoryTransport>) -> EntityCollection<Equipment> {
        EntityCollection::new(EntityService::new(transport.clone()))
    }

    #[tokio::test]
    async fn test_concurrent_fetches_are_coalesced() {
        let transport = Arc::new(MemoryTransport::with_latency(Duration::from_millis(20)));
        let id = transport.seed(Equipment::PATH, json!({ "name": "Centrifuge" }));
        let equipments = collection(&transport);

        let (a, b, c, d) = tokio::join!(
            equipments.fetch(id),
            equipments.fetch(id),
            equipments.fetch(id),
            equipments.fetch(id)
        );

        assert_eq!(transport.count(Method::Get), 1);
        let a = a.unwrap();
        assert_eq!(a, b.unwrap());
        assert_eq!(a, c.unwrap());
        assert_eq!(a, d.unwrap());
    }

    #[tokio::test]
    async fn test_cache_hit_skips_backend() {
        let transport = Arc::new(MemoryTransport::new());
        let id = transport.seed(Equipment::PATH, json!({ "name": "Centrifuge" }));
        let equipments = collection(&transport);

        equipments.fetch(id).await.unwrap();
        equipments.fetch(id).await.unwrap();
        assert_eq!(transport.count(Method::Get), 1);
        assert!(equipments.peek(&id).is_some());
    }

    #[tokio::test]
    async fn test_failed_fetch_is_not_cached() {
        let transport = Arc::new(MemoryTransport::new());
        let id = transport.seed(Equipment::PATH, json!({ "name": "Centrifuge" }));
        let equipments = collection(&transport);

        transport.fail_next(Error::Transport("connection reset".to_string()));
        let err = equipments.fetch(id).await.unwrap_err();
        assert_eq!(err, Error::Transport("connection reset".to_string()));
        assert!(equipments.peek(&id).is_none());

        let equipment = equipments.fetch(id).await.unwrap();
        assert_eq!(equipment.name, "Centrifuge");
        assert_eq!(transport.count(Method::Get), 2);
    }

    #[tokio::test]
    async fn test_failed_coalesced_fetch_reaches_every_waiter() {
        let transport = Arc::new(MemoryTransport::with_latency(Duration::from_millis(20)));
        let id = transport.seed(Equipment::PATH, json!({ "name": "Centrifuge" }));
        let equipments = collection(&transport);
        transport.fail_next(Error::Backend {
            status: 503,
            body: "maintenance".to_string(),
        });

        let (a, b) = tokio::join!(equipments.fetch(id), equipments.fetch(id));
        assert_eq!(a.unwrap_err(), b.unwrap_err());
        assert_eq!(transport.count(Method::Get), 1);
    }

    #[tokio::test]
    async fn test_query_upserts_every_page() {
        let transport = Arc::new(MemoryTransport::new());
        let ids: Vec<Id> = ["Autoclave", "Centrifuge", "Fume hood"]
            .iter()
            .map(|name| transport.seed(Equipment::PATH, json!({ "name": name })))
            .collect();
        let equipments = collection(&transport);

        let all = equipments.query(&EquipmentLookup::default()).await.unwrap();
        assert_eq!(all.len(), 3);
        // two pages of two
        assert_eq!(transport.count(Method::Get), 2);

        for id in &ids {
            equipments.fetch(*id).await.unwrap();
        }
        assert_eq!(transport.count(Method::Get), 2);
    }

    #[tokio::test]
    async fn test_put_during_fetch_is_kept() {
        let transport = Arc::new(MemoryTransport::with_latency(Duration::from_millis(30)));
        let id = transport.seed(Equipment::PATH, json!({ "name": "Centrifuge" }));
        let equipments = collection(&transport);
        let committed = Equipment::decode(json!({
            "id": id,
            "name": "Ultracentrifuge",
            "createdAt": "2024-02-01T09:00:00Z",
            "updatedAt": "2024-03-01T09:00:00Z"
        }))
        .unwrap();

        let (fetched, _) = tokio::join!(equipments.fetch(id), async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            equipments.put(committed.clone());
        });

        assert_eq!(fetched.unwrap(), committed);
        assert_eq!(equipments.peek(&id), Some(committed.clone()));
        assert_eq!(equipments.fetch(id).await.unwrap(), committed);
        assert_eq!(transport.count(Method::Get), 1);
    }

    /// Answers every list request with one item and `pageCount: 2`, without
    /// echoing the page number.
    #[derive(Default)]
    struct UnnumberedPages {
        requests: Mutex<u32>,
    }

    #[async_trait::async_trait]
    impl Transport for UnnumberedPages {
        async fn send(&self, _request: ApiRequest) -> Result<ApiResponse> {
            let mut requests = self.requests.lock();
            *requests += 1;
            if *requests > 5 {
                return Err(Error::Transport("too many page requests".to_string()));
            }
            Ok(ApiResponse {
                status: 200,
                body: json!({
                    "items": [{
                        "id": generate_id(),
                        "name": "Centrifuge",
                        "createdAt": "2024-02-01T09:00:00Z",
                        "updatedAt": "2024-02-01T09:00:00Z"
                    }],
                    "pageCount": 2
                }),
            })
        }
    }

    #[tokio::test]
    async fn test_query_stops_at_page_count_without_page_echo() {
        let transport = Arc::new(UnnumberedPages::default());
        let equipments = EntityCollection::<Equipment>::new(EntityService::new(transport.clone()));

        let all = equipments.query(&EquipmentLookup::default()).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(*transport.requests.lock(), 2);
    }

    #[tokio::test]
    async fn test_put_and_evict_notify_subscribers() {
        let transport = Arc::new(MemoryTransport::new());
        let id = transport.seed(Equipment::PATH, json!({ "name": "Centrifuge" }));
        let equipments = collection(&transport);
        let mut events = equipments.subscribe();

        let mut equipment = equipments.fetch(id).await.unwrap();
        equipment.name = "Ultracentrifuge".to_string();
        equipments.put(equipment.clone());
        assert_eq!(equipments.fetch(id).await.unwrap().name, "Ultracentrifuge");

        assert_eq!(equipments.evict(&id), Some(equipment.clone()));
        assert!(equipments.is_empty());

        assert!(matches!(events.recv().await.unwrap(), CollectionEvent::Upserted(_)));
        assert_eq!(events.recv().await.unwrap(), CollectionEvent::Upserted(equipment));
        assert_eq!(events.recv().await.unwrap(), CollectionEvent::Evicted(id));

        equipments.fetch(id).await.unwrap();
        assert_eq!(transport.count(Method::Get), 2);
    }
}
