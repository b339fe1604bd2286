// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::fmt::Write as _;
use time::OffsetDateTime;
use tracing::{info, warn};
use upkeep_app::validation::{format_cents, format_hours};
use upkeep_app::{
    Bundle, BundleEngine, BundleError, BundleRecordId, BundleResult, BundleStatus, CandidateId,
    PersistedBundle, RequestSequencer, Selection, Session, SessionCommand, WorkItemId,
};
use upkeep_catalog::{CatalogClient, CatalogLoad, CatalogOrigin, CatalogRequest, load_catalog};
use upkeep_db::{BundleLedger, DispatchReport, QueueStore};

/// Which items of a candidate to accept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemChoice {
    /// The high-priority items pre-selected when a candidate is opened.
    Default,
    All,
    Only(Vec<WorkItemId>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Generate {
        seeds: Vec<WorkItemId>,
    },
    List {
        status: Option<BundleStatus>,
    },
    Accept {
        candidate: CandidateId,
        items: ItemChoice,
        seeds: Vec<WorkItemId>,
    },
    Dispatch {
        ids: Vec<BundleRecordId>,
    },
}

pub struct Runtime<S> {
    engine: BundleEngine,
    catalog: Option<CatalogClient>,
    ledger: BundleLedger<S>,
    session: Session,
    sequencer: RequestSequencer,
}

impl<S: QueueStore> Runtime<S> {
    pub fn new(engine: BundleEngine, catalog: Option<CatalogClient>, ledger: BundleLedger<S>) -> Self {
        Self {
            engine,
            catalog,
            ledger,
            session: Session::default(),
            sequencer: RequestSequencer::new(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Runs one command and returns what should be printed.
    pub fn execute(&mut self, command: &Command, now: OffsetDateTime) -> BundleResult<String> {
        match command {
            Command::Generate { seeds } => {
                let load = self.refresh(seeds, now);
                let mut out = render_notices(&load);
                out.push_str(&render_candidates(self.session.candidates()));
                Ok(out)
            }
            Command::List { status } => Ok(render_persisted(&self.ledger.list_by_status(*status)?)),
            Command::Accept {
                candidate,
                items,
                seeds,
            } => {
                let load = self.refresh(seeds, now);
                let accepted = self.accept(candidate, items, now)?;
                let mut out = render_notices(&load);
                let _ = writeln!(
                    out,
                    "accepted {} as {} ({} items, {}, saves {})",
                    accepted.candidate_id(),
                    accepted.id,
                    accepted.bundle.item_count(),
                    format_cents(accepted.bundle.total_cost_cents()),
                    format_cents(accepted.bundle.total_savings_cents()),
                );
                Ok(out)
            }
            Command::Dispatch { ids } => {
                let selection = Selection::from_ids(ids.iter().copied());
                let report = self.ledger.dispatch_selection(&selection, now)?;
                Ok(render_dispatch(&report))
            }
        }
    }

    /// Loads the catalog and replaces the session's candidates.
    ///
    /// A single seed asks the catalog for that seed's opportunity; the
    /// upstream listing is bundled as returned even when it leaves the seed
    /// itself out.
    pub fn refresh(&mut self, seeds: &[WorkItemId], now: OffsetDateTime) -> CatalogLoad {
        let ticket = self.sequencer.issue();
        let request = match seeds {
            [seed] => CatalogRequest::BundleForSeed(seed.clone()),
            _ => CatalogRequest::Assets,
        };
        let load = load_catalog(self.catalog.as_ref(), &request, now);
        let candidates = match (&request, load.origin) {
            (CatalogRequest::BundleForSeed(seed), CatalogOrigin::Upstream) => self
                .engine
                .bundle_opportunity(&load.items, seed)
                .into_iter()
                .collect(),
            _ => self.engine.generate(&load.items, seeds),
        };
        info!(
            origin = load.origin.as_str(),
            items = load.items.len(),
            candidates = candidates.len(),
            "candidates generated"
        );
        self.session
            .dispatch(SessionCommand::ShowCandidates { ticket, candidates });
        load
    }

    /// Opens `candidate` in the session, applies `items`, and persists the
    /// result as ready for dispatch.
    pub fn accept(
        &mut self,
        candidate: &CandidateId,
        items: &ItemChoice,
        now: OffsetDateTime,
    ) -> BundleResult<PersistedBundle> {
        self.session.dispatch(SessionCommand::OpenBundle(candidate.clone()));
        let Some(bundle) = self.session.open_bundle() else {
            return Err(BundleError::validation(
                "candidate",
                format!("unknown candidate {candidate}; run `upkeep generate` to list candidates"),
            ));
        };

        let wanted: Vec<WorkItemId> = match items {
            ItemChoice::Default => bundle
                .items()
                .iter()
                .filter(|item| self.session.item_selection().contains(&item.id))
                .map(|item| item.id.clone())
                .collect(),
            ItemChoice::All => bundle.items().iter().map(|item| item.id.clone()).collect(),
            ItemChoice::Only(ids) => {
                if let Some(missing) = ids
                    .iter()
                    .find(|id| !bundle.items().iter().any(|item| &item.id == *id))
                {
                    return Err(BundleError::validation(
                        "item",
                        format!("{missing} is not part of {candidate}"),
                    ));
                }
                ids.clone()
            }
        };

        let selected = self.session.item_selection();
        let toggles: Vec<WorkItemId> = bundle
            .items()
            .iter()
            .filter(|item| selected.contains(&item.id) != wanted.contains(&item.id))
            .map(|item| item.id.clone())
            .collect();
        for id in toggles {
            self.session.dispatch(SessionCommand::ToggleItem(id));
        }
        self.accept_open(now)
    }

    fn accept_open(&mut self, now: OffsetDateTime) -> BundleResult<PersistedBundle> {
        let pending = match self.session.pending_acceptance() {
            Ok(pending) => pending,
            Err(BundleError::EmptySelection) => {
                warn!("no items selected; pass --item or --all");
                return Err(BundleError::EmptySelection);
            }
            Err(error) => return Err(error),
        };
        let accepted = self.ledger.accept_bundle(pending, now)?;
        self.session.dispatch(SessionCommand::ClearSelection);
        Ok(accepted)
    }

    pub fn into_ledger(self) -> BundleLedger<S> {
        self.ledger
    }
}

fn render_notices(load: &CatalogLoad) -> String {
    let mut out = String::new();
    for notice in &load.notices {
        let _ = writeln!(out, "note: {notice}");
    }
    out
}

pub fn render_candidates(candidates: &[Bundle]) -> String {
    if candidates.is_empty() {
        return "no bundle opportunities\n".to_owned();
    }

    let mut out = String::new();
    for bundle in candidates {
        let savings = bundle.savings();
        let _ = writeln!(
            out,
            "{}  {}\n  {} items ({}), {}, {}; saves {} ({:.1}%)",
            bundle.id(),
            bundle.header.name,
            bundle.item_count(),
            bundle
                .service_types()
                .iter()
                .map(|service_type| service_type.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            format_cents(savings.total_cost_cents),
            format_hours(savings.total_duration_hours),
            format_cents(savings.total_savings_cents),
            savings.savings_percentage,
        );
        for item in bundle.items() {
            let _ = writeln!(
                out,
                "    {:<12} {:<6} {:<13} {}",
                item.id.as_str(),
                item.priority.as_str(),
                item.service_type.as_str(),
                item.title,
            );
        }
    }
    out
}

pub fn render_persisted(bundles: &[PersistedBundle]) -> String {
    if bundles.is_empty() {
        return "no accepted bundles\n".to_owned();
    }

    let mut out = String::new();
    for entry in bundles {
        let _ = writeln!(
            out,
            "{}  {:<18} {}  {} items, {}",
            entry.id,
            entry.status.as_str(),
            entry.bundle.header.name,
            entry.bundle.item_count(),
            format_cents(entry.bundle.total_cost_cents()),
        );
    }
    out
}

pub fn render_dispatch(report: &DispatchReport) -> String {
    let mut out = String::new();
    for entry in &report.dispatched {
        let _ = writeln!(out, "dispatched {}  {}", entry.id, entry.bundle.header.name);
    }
    for rejection in &report.rejected {
        let _ = writeln!(out, "skipped {}: {}", rejection.id, rejection.error);
    }
    let _ = writeln!(
        out,
        "selected {} items, {}, saves {}",
        report.selected.total_items,
        format_cents(report.selected.total_cost_cents),
        format_cents(report.selected.total_savings_cents),
    );
    out
}
