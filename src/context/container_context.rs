use log::debug;
use parking_lot::{Mutex, MutexGuard};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

use crate::context::entity_context::{ContextSource, EntityContext};
use crate::context::forms::{FormSet, ResourceForm, Slot};
use crate::error::{Error, Result};
use crate::model::{Resource, ResourceContainer, ResourceType};
use crate::store::EntityCollection;

/// An editing session over a container entity plus the sub-resource forms
/// addressed by `(kind, index)`.
///
/// Sub-resource writes go through the container's own commit: the edited
/// list is spliced into a full container patch. Failed writes leave both the
/// committed container and the drafts untouched.
pub struct ContainerContext<C: ResourceContainer> {
    context: EntityContext<C>,
    forms: Arc<Mutex<FormSet>>,
    /// Tracks which committed value the forms were last rebased on.
    seen: Mutex<watch::Receiver<Option<C>>>,
}

impl<C: ResourceContainer> ContainerContext<C> {
    pub fn new(collection: Arc<EntityCollection<C>>) -> Self {
        let context = EntityContext::new(collection);
        let seen = Mutex::new(context.committed());
        Self {
            context,
            forms: Arc::new(Mutex::new(FormSet::default())),
            seen,
        }
    }

    pub fn context(&self) -> &EntityContext<C> {
        &self.context
    }

    pub fn connect(&self, source: ContextSource<C>) -> Result<()> {
        self.context.connect(source)
    }

    pub fn current(&self) -> Option<C> {
        self.context.current()
    }

    pub fn destroy(&self) {
        self.context.destroy();
    }

    /// Commit top-level container fields.
    pub fn commit(&self, patch: C::Patch) -> impl Future<Output = Result<C>> + Send + 'static {
        self.context.commit(patch)
    }

    /// Forms, rebased first if the committed container changed.
    fn lock_forms(&self) -> MutexGuard<'_, FormSet> {
        let mut forms = self.forms.lock();
        let mut seen = self.seen.lock();
        if seen.has_changed().unwrap_or(false) {
            let latest = seen.borrow_and_update().clone();
            forms.rebase_all(latest.as_ref());
        }
        forms
    }

    pub fn committed_count(&self, kind: ResourceType) -> usize {
        self.lock_forms().list(kind).committed_count()
    }

    /// Snapshot of every open form of `kind`.
    pub fn forms(&self, kind: ResourceType) -> Vec<ResourceForm> {
        self.lock_forms().list(kind).forms().to_vec()
    }

    /// The draft at `index`. `index == committed_count` opens a pending
    /// creation; anything beyond that is out of range.
    pub fn form(&self, kind: ResourceType, index: usize) -> Result<Resource> {
        let mut forms = self.lock_forms();
        Ok(forms.list(kind).open(index)?.value().clone())
    }

    pub fn is_dirty(&self, kind: ResourceType, index: usize) -> Result<bool> {
        let mut forms = self.lock_forms();
        Ok(forms.list(kind).get(index)?.is_dirty())
    }

    /// Edit the draft at `index` in place and return the edited value.
    pub fn update_form<F>(&self, kind: ResourceType, index: usize, edit: F) -> Result<Resource>
    where
        F: FnOnce(&mut Resource),
    {
        let mut forms = self.lock_forms();
        let form = forms.list(kind).open(index)?;
        let mut value = form.value().clone();
        edit(&mut value);
        if value.kind() != kind {
            return Err(Error::validation(
                kind.as_str(),
                format!("cannot store a {} record in a {} form", value.kind(), kind),
            ));
        }
        form.set_value(value.clone());
        Ok(value)
    }

    /// Write the draft at `index` into the container: replaces the committed
    /// record or appends a pending one.
    ///
    /// The draft is bound to its record when this is called, so writes queued
    /// ahead of it that move the record do not redirect it.
    pub fn commit_at(
        &self,
        kind: ResourceType,
        index: usize,
    ) -> impl Future<Output = Result<C>> + Send + 'static {
        let ticket = self.bind(kind, index).map(|(slot, draft)| {
            let forms = Arc::clone(&self.forms);
            self.context.enqueue(
                Box::new(move |base: Option<&C>| {
                    let container = base.ok_or(Error::ContainerNotCreated)?;
                    draft.validate()?;

                    let mut records = container.resources(kind);
                    match slot.locate(kind, index, &records)? {
                        Some(position) => records[position] = draft,
                        None => records.push(draft),
                    }
                    container.patch_with_resources(kind, records)
                }),
                Some(Box::new(move |container: &C| {
                    let mut forms = forms.lock();
                    forms.list(kind).settle_commit(slot, container.resources(kind));
                    forms.rebase_all(Some(container));
                    debug!("{} form {} committed", kind, index);
                })),
            )
        });

        async move { ticket?.outcome().await }
    }

    /// Open the form at `index` and bind it to the record it edits.
    fn bind(&self, kind: ResourceType, index: usize) -> Result<(Slot, Resource)> {
        let mut forms = self.lock_forms();
        let list = forms.list(kind);
        let draft = list.open(index)?.value().clone();
        Ok((list.slot(index)?, draft))
    }

    /// Discard the draft at `index`. A never-committed slot is removed and
    /// the slots above it shift down.
    pub fn revert_at(&self, kind: ResourceType, index: usize) -> Result<()> {
        self.lock_forms().list(kind).revert(index)
    }

    /// Remove the committed record at `index` and persist the shorter list.
    /// Deleting a pending slot only discards it.
    pub fn delete_at(
        &self,
        kind: ResourceType,
        index: usize,
    ) -> impl Future<Output = Result<C>> + Send + 'static {
        let ticket = self.prepare_delete(kind, index);
        async move { ticket?.await }
    }

    fn prepare_delete(
        &self,
        kind: ResourceType,
        index: usize,
    ) -> Result<std::pin::Pin<Box<dyn Future<Output = Result<C>> + Send>>> {
        let slot = {
            let mut forms = self.lock_forms();
            let list = forms.list(kind);
            let slot = list.slot(index)?;
            if slot == Slot::Pending {
                list.revert(index)?;
                let current = self.context.current().ok_or(Error::ContainerNotCreated);
                return Ok(Box::pin(async move { current }));
            }
            slot
        };

        let forms = Arc::clone(&self.forms);
        let ticket = self.context.enqueue(
            Box::new(move |base: Option<&C>| {
                let container = base.ok_or(Error::ContainerNotCreated)?;
                let mut records = container.resources(kind);
                if let Some(position) = slot.locate(kind, index, &records)? {
                    records.remove(position);
                }
                container.patch_with_resources(kind, records)
            }),
            Some(Box::new(move |container: &C| {
                let mut forms = forms.lock();
                forms.list(kind).settle_delete(slot, container.resources(kind));
                forms.rebase_all(Some(container));
                debug!("{} form {} deleted", kind, index);
            })),
        );
        Ok(Box::pin(ticket.outcome()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Entity;
    use crate::model::{generate_id, EquipmentLease, Id, SoftwareLease, WorkUnit, WorkUnitPatch};
    use crate::service::Method;
    use crate::store::Scope;
    use crate::testing::MemoryTransport;
    use serde_json::json;

    fn setup() -> (Arc<MemoryTransport>, Scope) {
        let transport = Arc::new(MemoryTransport::new());
        let scope = Scope::new(transport.clone());
        (transport, scope)
    }

    fn seed_unit(transport: &MemoryTransport) -> Id {
        transport.seed(
            WorkUnit::PATH,
            json!({
                "labId": generate_id(),
                "name": "Protein assay",
                "equipments": [
                    { "name": "Centrifuge", "numRequired": 1 },
                    { "name": "Spectrophotometer", "numRequired": 2 }
                ]
            }),
        )
    }

    async fn connected(scope: &Scope, id: Id) -> ContainerContext<WorkUnit> {
        let context = scope.container_context::<WorkUnit>();
        context.connect(ContextSource::Fetch(id)).unwrap();
        context.context().ready().await.unwrap();
        context
    }

    fn set_name(resource: &mut Resource, name: &str) {
        match resource {
            Resource::Software(r) => r.name = name.to_string(),
            Resource::Equipment(r) => r.name = name.to_string(),
            _ => {}
        }
    }

    #[tokio::test]
    async fn test_software_scenario() {
        let (_, scope) = setup();
        let context = scope.container_context::<WorkUnit>();
        context.connect(ContextSource::Value(None)).unwrap();
        context
            .commit(WorkUnitPatch {
                lab_id: Some(generate_id()),
                name: Some("Simulation".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        let draft = context.form(ResourceType::Software, 0).unwrap();
        assert_eq!(draft, Resource::Software(SoftwareLease::default()));

        context
            .update_form(ResourceType::Software, 0, |r| set_name(r, "MATLAB"))
            .unwrap();
        let unit = context.commit_at(ResourceType::Software, 0).await.unwrap();

        assert_eq!(unit.softwares.len(), 1);
        assert_eq!(unit.softwares[0].name, "MATLAB");
        assert_eq!(context.committed_count(ResourceType::Software), 1);
        assert!(!context.is_dirty(ResourceType::Software, 0).unwrap());
        assert_eq!(
            context.form(ResourceType::Software, 1).unwrap(),
            Resource::Software(SoftwareLease::default())
        );
    }

    #[tokio::test]
    async fn test_revert_pending_slot_keeps_committed_indices() {
        let (transport, scope) = setup();
        let id = seed_unit(&transport);
        let context = connected(&scope, id).await;

        assert_eq!(context.committed_count(ResourceType::Equipment), 2);
        context.form(ResourceType::Equipment, 2).unwrap();
        context.revert_at(ResourceType::Equipment, 2).unwrap();

        let forms = context.forms(ResourceType::Equipment);
        assert_eq!(forms.len(), 2);
        assert_eq!(forms[0].value().name(), "Centrifuge");
        assert_eq!(forms[1].value().name(), "Spectrophotometer");
        assert!(context.form(ResourceType::Equipment, 3).is_err());
    }

    #[tokio::test]
    async fn test_delete_shifts_later_slots_down() {
        let (transport, scope) = setup();
        let id = seed_unit(&transport);
        let context = connected(&scope, id).await;

        let unit = context.delete_at(ResourceType::Equipment, 0).await.unwrap();
        assert_eq!(unit.equipments.len(), 1);
        assert_eq!(unit.equipments[0].name, "Spectrophotometer");

        assert_eq!(context.committed_count(ResourceType::Equipment), 1);
        assert_eq!(
            context.form(ResourceType::Equipment, 0).unwrap().name(),
            "Spectrophotometer"
        );
        assert_eq!(scope.collection::<WorkUnit>().peek(&id), Some(unit));
    }

    #[tokio::test]
    async fn test_failed_commit_keeps_draft_and_container() {
        let (transport, scope) = setup();
        let id = seed_unit(&transport);
        let context = connected(&scope, id).await;
        let before = context.current();

        context
            .update_form(ResourceType::Equipment, 1, |r| set_name(r, "Plate reader"))
            .unwrap();
        transport.fail_next(Error::Transport("connection refused".to_string()));
        assert!(context.commit_at(ResourceType::Equipment, 1).await.is_err());

        assert_eq!(context.current(), before);
        assert!(context.is_dirty(ResourceType::Equipment, 1).unwrap());
        assert_eq!(
            context.form(ResourceType::Equipment, 1).unwrap().name(),
            "Plate reader"
        );

        // retry without re-entering anything
        let unit = context.commit_at(ResourceType::Equipment, 1).await.unwrap();
        assert_eq!(unit.equipments[1].name, "Plate reader");
        assert_eq!(unit.equipments[0].name, "Centrifuge");
        assert!(!context.is_dirty(ResourceType::Equipment, 1).unwrap());
    }

    #[tokio::test]
    async fn test_commit_queued_behind_delete_follows_its_record() {
        let (transport, scope) = setup();
        let id = seed_unit(&transport);
        let context = connected(&scope, id).await;

        context
            .update_form(ResourceType::Equipment, 1, |r| set_name(r, "Spectrophotometer (UV)"))
            .unwrap();
        // both queued before either write lands
        let delete = context.delete_at(ResourceType::Equipment, 0);
        let commit = context.commit_at(ResourceType::Equipment, 1);
        delete.await.unwrap();
        let unit = commit.await.unwrap();

        assert_eq!(unit.equipments.len(), 1);
        assert_eq!(unit.equipments[0].name, "Spectrophotometer (UV)");

        let forms = context.forms(ResourceType::Equipment);
        assert_eq!(forms.len(), 1);
        assert_eq!(forms[0].value().name(), "Spectrophotometer (UV)");
        assert!(!forms[0].is_dirty());
    }

    #[tokio::test]
    async fn test_commit_of_deleted_record_is_rejected() {
        let (transport, scope) = setup();
        let id = seed_unit(&transport);
        let context = connected(&scope, id).await;

        context
            .update_form(ResourceType::Equipment, 0, |r| set_name(r, "Centrifuge (cold)"))
            .unwrap();
        let delete = context.delete_at(ResourceType::Equipment, 0);
        let commit = context.commit_at(ResourceType::Equipment, 0);
        delete.await.unwrap();

        let err = commit.await.unwrap_err();
        assert!(matches!(err, Error::IndexOutOfRange { index: 0, .. }));
        let unit = context.current().unwrap();
        assert_eq!(unit.equipments.len(), 1);
        assert_eq!(unit.equipments[0].name, "Spectrophotometer");
        assert_eq!(transport.count(Method::Put), 1);
    }

    #[tokio::test]
    async fn test_failed_delete_keeps_slots() {
        let (transport, scope) = setup();
        let id = seed_unit(&transport);
        let context = connected(&scope, id).await;

        transport.fail_next(Error::Backend {
            status: 500,
            body: "boom".to_string(),
        });
        assert!(context.delete_at(ResourceType::Equipment, 0).await.is_err());
        assert_eq!(context.committed_count(ResourceType::Equipment), 2);
        assert_eq!(context.current().unwrap().equipments.len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_draft_is_not_sent() {
        let (transport, scope) = setup();
        let id = seed_unit(&transport);
        let context = connected(&scope, id).await;

        context.form(ResourceType::Equipment, 2).unwrap();
        let err = context
            .commit_at(ResourceType::Equipment, 2)
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(transport.count(Method::Put), 0);
        assert!(context.forms(ResourceType::Equipment)[2].is_pending());
    }

    #[tokio::test]
    async fn test_commit_patch_carries_every_list() {
        let (transport, scope) = setup();
        let id = seed_unit(&transport);
        let context = connected(&scope, id).await;

        context
            .update_form(ResourceType::Equipment, 2, |r| {
                *r = Resource::Equipment(EquipmentLease {
                    name: "Plate reader".to_string(),
                    num_required: 1,
                    ..Default::default()
                })
            })
            .unwrap();
        context.commit_at(ResourceType::Equipment, 2).await.unwrap();

        let put = transport
            .requests()
            .into_iter()
            .find(|r| r.method == Method::Put)
            .unwrap();
        let body = put.body.unwrap();
        assert_eq!(body["name"], "Protein assay");
        assert_eq!(body["equipments"].as_array().unwrap().len(), 3);
        assert_eq!(body["softwares"], json!([]));
        assert_eq!(body["inputMaterials"], json!([]));
        assert_eq!(body["outputMaterials"], json!([]));
    }

    #[tokio::test]
    async fn test_sub_resource_ops_need_a_created_container() {
        let (transport, scope) = setup();
        let context = scope.container_context::<WorkUnit>();
        context.connect(ContextSource::Value(None)).unwrap();

        context
            .update_form(ResourceType::Software, 0, |r| set_name(r, "MATLAB"))
            .unwrap();
        let err = context
            .commit_at(ResourceType::Software, 0)
            .await
            .unwrap_err();
        assert_eq!(err, Error::ContainerNotCreated);
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_update_form_rejects_kind_change() {
        let (transport, scope) = setup();
        let id = seed_unit(&transport);
        let context = connected(&scope, id).await;

        let err = context
            .update_form(ResourceType::Equipment, 0, |r| {
                *r = Resource::Software(SoftwareLease::default())
            })
            .unwrap_err();
        assert!(err.is_validation());
        assert!(!context.is_dirty(ResourceType::Equipment, 0).unwrap());
    }
}
