// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::anyhow;
use std::sync::{Mutex, MutexGuard};
use time::OffsetDateTime;
use tracing::info;
use upkeep_app::{
    Bundle, BundleError, BundleRecordId, BundleResult, BundleStatus, PersistedBundle, Selection,
    SelectionTotals, WorkItemId, aggregate,
};

use crate::QueueStore;

/// Bundle lifecycle on top of a [`QueueStore`].
///
/// Every transition reads and rewrites both collections inside one
/// [`QueueStore::write_scope`], so accepts never reuse an id and a bundle is
/// dispatched at most once, even across processes sharing a database file.
pub struct BundleLedger<S> {
    store: Mutex<S>,
}

#[derive(Debug)]
pub struct DispatchRejection {
    pub id: BundleRecordId,
    pub error: BundleError,
}

/// Outcome of dispatching a selection: successes and typed rejections side
/// by side, plus the totals of what was selected.
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub dispatched: Vec<PersistedBundle>,
    pub rejected: Vec<DispatchRejection>,
    pub selected: SelectionTotals,
}

impl<S: QueueStore> BundleLedger<S> {
    pub fn new(store: S) -> Self {
        Self {
            store: Mutex::new(store),
        }
    }

    /// Persists `candidate` narrowed to `items` as ready for dispatch.
    pub fn accept(
        &self,
        candidate: &Bundle,
        items: &Selection<WorkItemId>,
        now: OffsetDateTime,
    ) -> BundleResult<PersistedBundle> {
        let narrowed = candidate
            .restrict_to(|id| items.contains(id))
            .ok_or(BundleError::EmptySelection)?;
        self.accept_bundle(narrowed, now)
    }

    pub fn accept_bundle(&self, bundle: Bundle, now: OffsetDateTime) -> BundleResult<PersistedBundle> {
        if bundle.item_count() == 0 {
            return Err(BundleError::EmptySelection);
        }

        let store = self.lock()?;
        let persisted = store.write_scope(|store| -> BundleResult<PersistedBundle> {
            let mut history = store.get_history()?;
            let mut queue = store.get_queue()?;

            let next = history
                .iter()
                .chain(queue.iter())
                .map(|entry| entry.id.get())
                .max()
                .unwrap_or(0)
                + 1;
            let persisted = PersistedBundle {
                id: BundleRecordId::new(next),
                bundle,
                status: BundleStatus::ReadyForDispatch,
                created_at: now,
                dispatched_at: None,
            };

            history.push(persisted.clone());
            store.save_history(&history)?;
            queue.push(persisted.clone());
            store.save_queue(&queue)?;
            Ok(persisted)
        })?;

        info!(
            id = %persisted.id,
            candidate = %persisted.candidate_id(),
            items = persisted.bundle.item_count(),
            "bundle accepted"
        );
        Ok(persisted)
    }

    /// Moves a ready bundle to dispatched. Unknown ids and bundles in any
    /// other state are rejected without touching the store.
    pub fn dispatch(&self, id: BundleRecordId, now: OffsetDateTime) -> BundleResult<PersistedBundle> {
        let store = self.lock()?;
        dispatch_locked(&*store, id, now)
    }

    /// Attempts every id in the selection, in selection order.
    pub fn dispatch_selection(
        &self,
        selection: &Selection<BundleRecordId>,
        now: OffsetDateTime,
    ) -> BundleResult<DispatchReport> {
        let store = self.lock()?;
        let queue = store.get_queue()?;
        let mut report = DispatchReport {
            selected: aggregate(&queue, selection),
            ..DispatchReport::default()
        };

        for id in selection.ids() {
            match dispatch_locked(&*store, *id, now) {
                Ok(dispatched) => report.dispatched.push(dispatched),
                Err(BundleError::Storage(error)) => return Err(BundleError::Storage(error)),
                Err(error) => report.rejected.push(DispatchRejection { id: *id, error }),
            }
        }
        Ok(report)
    }

    /// Every persisted bundle with `status`, or all of them, in acceptance
    /// order.
    pub fn list_by_status(&self, status: Option<BundleStatus>) -> BundleResult<Vec<PersistedBundle>> {
        let history = self.lock()?.get_history()?;
        Ok(history
            .into_iter()
            .filter(|entry| status.is_none_or(|wanted| entry.status == wanted))
            .collect())
    }

    pub fn queue(&self) -> BundleResult<Vec<PersistedBundle>> {
        Ok(self.lock()?.get_queue()?)
    }

    pub fn get(&self, id: BundleRecordId) -> BundleResult<Option<PersistedBundle>> {
        let history = self.lock()?.get_history()?;
        Ok(history.into_iter().find(|entry| entry.id == id))
    }

    pub fn into_store(self) -> BundleResult<S> {
        self.store
            .into_inner()
            .map_err(|_| BundleError::Storage(anyhow!("bundle ledger lock poisoned")))
    }

    fn lock(&self) -> BundleResult<MutexGuard<'_, S>> {
        self.store
            .lock()
            .map_err(|_| BundleError::Storage(anyhow!("bundle ledger lock poisoned")))
    }
}

fn dispatch_locked<S: QueueStore>(
    store: &S,
    id: BundleRecordId,
    now: OffsetDateTime,
) -> BundleResult<PersistedBundle> {
    let dispatched = store.write_scope(|store| -> BundleResult<PersistedBundle> {
        let mut history = store.get_history()?;
        let Some(entry) = history.iter_mut().find(|entry| entry.id == id) else {
            return Err(BundleError::InvalidState { id, current: None });
        };
        if entry.status != BundleStatus::ReadyForDispatch {
            return Err(BundleError::InvalidState {
                id,
                current: Some(entry.status),
            });
        }

        entry.status = BundleStatus::Dispatched;
        entry.dispatched_at = Some(now);
        let dispatched = entry.clone();
        store.save_history(&history)?;

        let mut queue = store.get_queue()?;
        match queue.iter_mut().find(|queued| queued.id == id) {
            Some(queued) => {
                queued.status = BundleStatus::Dispatched;
                queued.dispatched_at = Some(now);
            }
            None => queue.push(dispatched.clone()),
        }
        store.save_queue(&queue)?;
        Ok(dispatched)
    })?;

    info!(id = %id, candidate = %dispatched.candidate_id(), "bundle dispatched");
    Ok(dispatched)
}
