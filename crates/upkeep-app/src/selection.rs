// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::Serialize;

use crate::{Bundle, BundleRecordId, CandidateId, PersistedBundle, Priority, WorkItem, WorkItemId};

/// An ephemeral set of ids marked for a batch action. Keeps the order in
/// which ids were first selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection<Id> {
    ids: Vec<Id>,
}

impl<Id> Default for Selection<Id> {
    fn default() -> Self {
        Self { ids: Vec::new() }
    }
}

impl<Id: PartialEq + Clone> Selection<Id> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_ids(ids: impl IntoIterator<Item = Id>) -> Self {
        let mut selection = Self::new();
        for id in ids {
            if !selection.contains(&id) {
                selection.ids.push(id);
            }
        }
        selection
    }

    /// Adds `id` if absent, removes it if present. Returns whether `id` is
    /// selected afterwards.
    pub fn toggle(&mut self, id: &Id) -> bool {
        if let Some(position) = self.ids.iter().position(|existing| existing == id) {
            self.ids.remove(position);
            false
        } else {
            self.ids.push(id.clone());
            true
        }
    }

    pub fn toggled(mut self, id: &Id) -> Self {
        self.toggle(id);
        self
    }

    pub fn contains(&self, id: &Id) -> bool {
        self.ids.contains(id)
    }

    pub fn ids(&self) -> &[Id] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }
}

/// Something a [`Selection`] can pick out of a list.
pub trait Selectable {
    type Id: PartialEq;

    fn selection_id(&self) -> &Self::Id;
    fn bundle(&self) -> &Bundle;
}

impl Selectable for Bundle {
    type Id = CandidateId;

    fn selection_id(&self) -> &CandidateId {
        self.id()
    }

    fn bundle(&self) -> &Bundle {
        self
    }
}

impl Selectable for PersistedBundle {
    type Id = BundleRecordId;

    fn selection_id(&self) -> &BundleRecordId {
        &self.id
    }

    fn bundle(&self) -> &Bundle {
        &self.bundle
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SelectionTotals {
    pub total_cost_cents: i64,
    pub total_savings_cents: i64,
    pub total_items: usize,
}

/// Sums over the selected subset. Ids with no matching bundle contribute
/// nothing.
pub fn aggregate<T>(bundles: &[T], selection: &Selection<T::Id>) -> SelectionTotals
where
    T: Selectable,
    T::Id: Clone,
{
    bundles
        .iter()
        .filter(|entry| selection.contains(entry.selection_id()))
        .fold(SelectionTotals::default(), |totals, entry| {
            let bundle = entry.bundle();
            SelectionTotals {
                total_cost_cents: totals
                    .total_cost_cents
                    .saturating_add(bundle.total_cost_cents()),
                total_savings_cents: totals
                    .total_savings_cents
                    .saturating_add(bundle.total_savings_cents()),
                total_items: totals.total_items + bundle.item_count(),
            }
        })
}

/// The items pre-selected when an opportunity is opened: everything marked
/// high priority.
pub fn default_item_selection(items: &[WorkItem]) -> Selection<WorkItemId> {
    Selection::from_ids(
        items
            .iter()
            .filter(|item| item.priority == Priority::High)
            .map(|item| item.id.clone()),
    )
}
