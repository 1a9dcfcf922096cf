use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::model::{Id, Resource, ResourceContainer, ResourceType};

/// Editable draft for one sub-resource slot.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceForm {
    value: Resource,
    /// The persisted record this slot edits; `None` for a pending creation.
    committed: Option<Resource>,
}

impl ResourceForm {
    fn pending(kind: ResourceType) -> Self {
        Self {
            value: Resource::empty(kind),
            committed: None,
        }
    }

    fn seeded(record: Resource) -> Self {
        Self {
            value: record.clone(),
            committed: Some(record),
        }
    }

    pub fn value(&self) -> &Resource {
        &self.value
    }

    pub fn committed(&self) -> Option<&Resource> {
        self.committed.as_ref()
    }

    pub(crate) fn set_value(&mut self, value: Resource) {
        self.value = value;
    }

    pub fn is_pending(&self) -> bool {
        self.committed.is_none()
    }

    pub fn is_dirty(&self) -> bool {
        self.committed.as_ref() != Some(&self.value)
    }

    fn committed_id(&self) -> Option<Id> {
        self.committed.as_ref().and_then(resource_id)
    }
}

fn resource_id(resource: &Resource) -> Option<Id> {
    match resource {
        Resource::Equipment(r) => r.id,
        Resource::Software(r) => r.id,
        Resource::InputMaterial(r) => r.id,
        Resource::OutputMaterial(r) => r.id,
    }
}

/// The committed record a queued write is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Slot {
    /// Follows the record with this sub-resource id wherever it moves.
    Record(Id),
    /// An id-less committed record, by position.
    Position(usize),
    /// A pending creation; appended.
    Pending,
}

impl Slot {
    /// Position of the bound record in `records`, `None` for an append.
    pub(crate) fn locate(
        self,
        kind: ResourceType,
        index: usize,
        records: &[Resource],
    ) -> Result<Option<usize>> {
        let found = match self {
            Slot::Pending => return Ok(None),
            Slot::Record(id) => records.iter().position(|r| resource_id(r) == Some(id)),
            Slot::Position(position) => Some(position).filter(|p| *p < records.len()),
        };
        found.map(Some).ok_or(Error::IndexOutOfRange {
            kind,
            index,
            committed: records.len(),
        })
    }
}

/// Index-dense forms for one resource type.
///
/// Slots `0..committed_count()` edit the committed records in order; at most
/// one pending slot follows them at index `committed_count()`.
#[derive(Debug, Clone)]
pub struct FormList {
    kind: ResourceType,
    forms: Vec<ResourceForm>,
}

impl FormList {
    pub fn new(kind: ResourceType) -> Self {
        Self {
            kind,
            forms: Vec::new(),
        }
    }

    pub fn kind(&self) -> ResourceType {
        self.kind
    }

    pub fn forms(&self) -> &[ResourceForm] {
        &self.forms
    }

    pub fn committed_count(&self) -> usize {
        self.forms.iter().take_while(|f| !f.is_pending()).count()
    }

    fn out_of_range(&self, index: usize) -> Error {
        Error::IndexOutOfRange {
            kind: self.kind,
            index,
            committed: self.committed_count(),
        }
    }

    /// Return the form at `index`, opening a pending creation when `index`
    /// is one past the committed records.
    pub fn open(&mut self, index: usize) -> Result<&mut ResourceForm> {
        if index == self.forms.len() && index == self.committed_count() {
            self.forms.push(ResourceForm::pending(self.kind));
        }
        let err = self.out_of_range(index);
        self.forms.get_mut(index).ok_or(err)
    }

    pub fn get(&self, index: usize) -> Result<&ResourceForm> {
        self.forms.get(index).ok_or_else(|| self.out_of_range(index))
    }

    /// Bind the form at `index` to the record it edits.
    pub(crate) fn slot(&self, index: usize) -> Result<Slot> {
        let form = self.get(index)?;
        Ok(match (form.is_pending(), form.committed_id()) {
            (true, _) => Slot::Pending,
            (false, Some(id)) => Slot::Record(id),
            (false, None) => Slot::Position(index),
        })
    }

    fn position_of(&self, slot: Slot) -> Option<usize> {
        match slot {
            Slot::Pending => self.forms.iter().position(ResourceForm::is_pending),
            Slot::Record(id) => self.forms.iter().position(|f| f.committed_id() == Some(id)),
            Slot::Position(position) => {
                Some(position).filter(|p| self.forms.get(*p).is_some_and(|f| !f.is_pending()))
            }
        }
    }

    /// Discard edits. A pending slot is dropped; a committed one is reseeded.
    pub fn revert(&mut self, index: usize) -> Result<()> {
        let err = self.out_of_range(index);
        let form = self.forms.get_mut(index).ok_or(err)?;
        match form.committed.clone() {
            Some(record) => form.value = record,
            None => {
                self.forms.remove(index);
            }
        }
        Ok(())
    }

    /// Re-point every slot at `records`, the new committed list.
    ///
    /// Slots follow their record by id when the record has one, otherwise by
    /// position. Clean slots take the new values, dirty slots keep their
    /// edits, slots whose record disappeared are dropped and the pending slot
    /// stays last.
    pub fn rebase(&mut self, records: Vec<Resource>) {
        let mut pending = None;
        let mut previous: Vec<Option<ResourceForm>> = Vec::with_capacity(self.forms.len());
        for form in self.forms.drain(..) {
            if form.is_pending() {
                pending = Some(form);
            } else {
                previous.push(Some(form));
            }
        }

        let mut forms = Vec::with_capacity(records.len() + 1);
        for record in records {
            let slot = match resource_id(&record) {
                Some(id) => previous
                    .iter()
                    .position(|f| f.as_ref().is_some_and(|f| f.committed_id() == Some(id))),
                None => previous
                    .iter()
                    .position(|f| f.as_ref().is_some_and(|f| f.committed_id().is_none())),
            };

            let form = match slot.and_then(|slot| previous[slot].take()) {
                Some(mut form) => {
                    if !form.is_dirty() {
                        form.value = record.clone();
                    }
                    form.committed = Some(record);
                    form
                }
                None => ResourceForm::seeded(record),
            };
            forms.push(form);
        }

        forms.extend(pending);
        self.forms = forms;
    }

    /// Settle the form bound to `slot` after its draft was written as part
    /// of `records`.
    pub(crate) fn settle_commit(&mut self, slot: Slot, records: Vec<Resource>) {
        if slot == Slot::Pending {
            if let Some(pending) = self.position_of(slot) {
                self.forms.remove(pending);
            }
            // the new record is seeded clean by the rebase
            self.rebase(records);
            return;
        }

        self.rebase(records);
        if let Some(form) = self.position_of(slot).map(|p| &mut self.forms[p]) {
            if let Some(record) = &form.committed {
                form.value = record.clone();
            }
        }
    }

    /// Settle after the record bound to `slot` was deleted and `records` is
    /// the shortened list.
    pub(crate) fn settle_delete(&mut self, slot: Slot, records: Vec<Resource>) {
        if slot != Slot::Pending {
            if let Some(position) = self.position_of(slot) {
                self.forms.remove(position);
            }
        }
        self.rebase(records);
    }
}

/// Every form list of one container.
#[derive(Debug, Default)]
pub struct FormSet {
    lists: HashMap<ResourceType, FormList>,
}

impl FormSet {
    pub fn list(&mut self, kind: ResourceType) -> &mut FormList {
        self.lists.entry(kind).or_insert_with(|| FormList::new(kind))
    }

    pub fn rebase_all<C: ResourceContainer>(&mut self, container: Option<&C>) {
        for kind in ResourceType::ALL {
            let records = container.map(|c| c.resources(kind)).unwrap_or_default();
            self.list(kind).rebase(records);
        }
    }
}
