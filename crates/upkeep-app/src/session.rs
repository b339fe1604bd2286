// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use tracing::debug;

use crate::selection::{Selection, SelectionTotals, aggregate, default_item_selection};
use crate::sequence::RequestTicket;
use crate::{Bundle, BundleError, BundleResult, CandidateId, WorkItemId};

/// Per-session review state: the current candidates, which of them are marked
/// for a batch action, and which items of the open bundle will be accepted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    candidates: Vec<Bundle>,
    bundle_selection: Selection<CandidateId>,
    open_bundle: Option<CandidateId>,
    item_selection: Selection<WorkItemId>,
    shown_ticket: Option<RequestTicket>,
    pub status_line: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    /// Replaces the candidates with the result of catalog request `ticket`.
    /// Results older than the ones already shown are dropped.
    ShowCandidates {
        ticket: RequestTicket,
        candidates: Vec<Bundle>,
    },
    /// Opens a candidate for review, pre-selecting its high-priority items.
    OpenBundle(CandidateId),
    ToggleBundle(CandidateId),
    ToggleItem(WorkItemId),
    ClearSelection,
    ClearStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    CandidatesReplaced(usize),
    StaleCandidatesDropped(RequestTicket),
    BundleOpened(CandidateId),
    BundleSelectionChanged(SelectionTotals),
    ItemSelectionChanged(usize),
    StatusUpdated(String),
    StatusCleared,
}

impl Session {
    pub fn candidates(&self) -> &[Bundle] {
        &self.candidates
    }

    pub fn bundle_selection(&self) -> &Selection<CandidateId> {
        &self.bundle_selection
    }

    pub fn item_selection(&self) -> &Selection<WorkItemId> {
        &self.item_selection
    }

    pub fn open_bundle(&self) -> Option<&Bundle> {
        let id = self.open_bundle.as_ref()?;
        self.candidates.iter().find(|bundle| bundle.id() == id)
    }

    pub fn selection_totals(&self) -> SelectionTotals {
        aggregate(&self.candidates, &self.bundle_selection)
    }

    /// The open bundle narrowed to the selected items, ready for acceptance.
    pub fn pending_acceptance(&self) -> BundleResult<Bundle> {
        let bundle = self
            .open_bundle()
            .ok_or_else(|| BundleError::validation("bundle", "no bundle is open"))?;
        bundle
            .restrict_to(|id| self.item_selection.contains(id))
            .ok_or(BundleError::EmptySelection)
    }

    pub fn dispatch(&mut self, command: SessionCommand) -> Vec<SessionEvent> {
        match command {
            SessionCommand::ShowCandidates { ticket, candidates } => {
                if let Some(shown) = self.shown_ticket
                    && ticket < shown
                {
                    debug!(ticket = ticket.get(), shown = shown.get(), "ignoring stale candidates");
                    return vec![SessionEvent::StaleCandidatesDropped(ticket)];
                }
                self.shown_ticket = Some(ticket);
                self.replace_candidates(candidates)
            }
            SessionCommand::OpenBundle(id) => {
                let Some(bundle) = self.candidates.iter().find(|bundle| bundle.id() == &id) else {
                    return vec![self.set_status(&format!("unknown bundle {id}"))];
                };
                self.item_selection = default_item_selection(bundle.items());
                self.open_bundle = Some(id.clone());
                vec![
                    SessionEvent::BundleOpened(id),
                    SessionEvent::ItemSelectionChanged(self.item_selection.len()),
                ]
            }
            SessionCommand::ToggleBundle(id) => {
                if !self.candidates.iter().any(|bundle| bundle.id() == &id) {
                    return vec![self.set_status(&format!("unknown bundle {id}"))];
                }
                self.bundle_selection.toggle(&id);
                vec![SessionEvent::BundleSelectionChanged(self.selection_totals())]
            }
            SessionCommand::ToggleItem(id) => {
                let Some(bundle) = self.open_bundle() else {
                    return vec![self.set_status("no bundle open")];
                };
                if !bundle.items().iter().any(|item| item.id == id) {
                    let message = format!("{id} is not part of {}", bundle.id());
                    return vec![self.set_status(&message)];
                }
                self.item_selection.toggle(&id);
                vec![SessionEvent::ItemSelectionChanged(self.item_selection.len())]
            }
            SessionCommand::ClearSelection => {
                self.bundle_selection.clear();
                self.item_selection.clear();
                vec![
                    SessionEvent::BundleSelectionChanged(SelectionTotals::default()),
                    SessionEvent::ItemSelectionChanged(0),
                    self.set_status("selection cleared"),
                ]
            }
            SessionCommand::ClearStatus => {
                self.status_line = None;
                vec![SessionEvent::StatusCleared]
            }
        }
    }

    fn replace_candidates(&mut self, candidates: Vec<Bundle>) -> Vec<SessionEvent> {
        self.candidates = candidates;
        let surviving: Vec<CandidateId> = self
            .bundle_selection
            .ids()
            .iter()
            .filter(|id| self.candidates.iter().any(|bundle| bundle.id() == *id))
            .cloned()
            .collect();
        self.bundle_selection = Selection::from_ids(surviving);
        if self.open_bundle().is_none() {
            self.open_bundle = None;
            self.item_selection.clear();
        }

        let count = self.candidates.len();
        let label = match count {
            0 => "no bundle opportunities".to_owned(),
            1 => "1 bundle opportunity".to_owned(),
            n => format!("{n} bundle opportunities"),
        };
        vec![
            SessionEvent::CandidatesReplaced(count),
            SessionEvent::BundleSelectionChanged(self.selection_totals()),
            self.set_status(&label),
        ]
    }

    fn set_status(&mut self, message: &str) -> SessionEvent {
        self.status_line = Some(message.to_owned());
        SessionEvent::StatusUpdated(message.to_owned())
    }
}
