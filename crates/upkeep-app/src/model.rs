// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::ids::*;
use crate::savings::{SavingsBreakdown, SavingsPolicy, estimate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    Plumbing,
    Electrical,
    Hvac,
    General,
    Refrigeration,
    Lighting,
}

impl ServiceType {
    pub const ALL: [Self; 6] = [
        Self::Plumbing,
        Self::Electrical,
        Self::Hvac,
        Self::General,
        Self::Refrigeration,
        Self::Lighting,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plumbing => "plumbing",
            Self::Electrical => "electrical",
            Self::Hvac => "hvac",
            Self::General => "general",
            Self::Refrigeration => "refrigeration",
            Self::Lighting => "lighting",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "plumbing" => Some(Self::Plumbing),
            "electrical" => Some(Self::Electrical),
            "hvac" => Some(Self::Hvac),
            "general" | "general maintenance" => Some(Self::General),
            "refrigeration" => Some(Self::Refrigeration),
            "lighting" => Some(Self::Lighting),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Plumbing => "Plumbing",
            Self::Electrical => "Electrical",
            Self::Hvac => "HVAC",
            Self::General => "General",
            Self::Refrigeration => "Refrigeration",
            Self::Lighting => "Lighting",
        }
    }

    /// Typical cost in cents and hours for one visit, used when an upstream
    /// asset record carries no estimate of its own.
    pub const fn standard_estimate(self) -> (i64, f64) {
        match self {
            Self::Hvac => (18_000, 3.0),
            Self::Refrigeration => (14_000, 2.0),
            Self::Lighting => (9_500, 1.0),
            Self::Electrical => (15_000, 2.0),
            Self::Plumbing => (12_000, 2.0),
            Self::General => (9_000, 1.5),
        }
    }
}

/// Ordered so that `High` sorts greatest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Upstream systems may send an `emergency` tier; it collapses to `High`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" | "emergency" => Some(Self::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BundleStatus {
    Candidate,
    ReadyForDispatch,
    Dispatched,
}

impl BundleStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Candidate => "candidate",
            Self::ReadyForDispatch => "ready_for_dispatch",
            Self::Dispatched => "dispatched",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "candidate" => Some(Self::Candidate),
            "ready_for_dispatch" | "ready" => Some(Self::ReadyForDispatch),
            "dispatched" => Some(Self::Dispatched),
            _ => None,
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Dispatched)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BundleOrigin {
    AssetBundling,
    WorkOrderBundling,
}

impl BundleOrigin {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AssetBundling => "asset_bundling",
            Self::WorkOrderBundling => "work_order_bundling",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: WorkItemId,
    pub title: String,
    pub property_id: String,
    pub property_name: String,
    pub service_area: String,
    pub service_type: ServiceType,
    pub priority: Priority,
    pub estimated_cost_cents: i64,
    pub estimated_duration_hours: f64,
    pub specific_location: String,
    pub last_serviced_at: Option<Date>,
    /// Negative when overdue.
    pub days_until_service: Option<i64>,
    pub confidence: ConfidenceLevel,
    pub installed_on: Option<Date>,
    pub asset_age_years: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleHeader {
    pub id: CandidateId,
    pub name: String,
    pub service_area: String,
    pub bundling_criteria: String,
    pub origin: BundleOrigin,
    pub seed: Option<WorkItemId>,
    pub policy: SavingsPolicy,
}

/// A group of work items proposed for one dispatch.
///
/// Totals and savings are always derived from `items`; there is no way to set
/// them independently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    #[serde(flatten)]
    pub header: BundleHeader,
    items: Vec<WorkItem>,
}

impl Bundle {
    /// Fewest items a generated candidate may hold.
    pub const MIN_CANDIDATE_ITEMS: usize = 2;

    /// Builds a generated candidate. Returns `None` below
    /// [`Self::MIN_CANDIDATE_ITEMS`]. Items are stably sorted by priority,
    /// highest first.
    pub fn assemble(header: BundleHeader, items: Vec<WorkItem>) -> Option<Self> {
        if items.len() < Self::MIN_CANDIDATE_ITEMS {
            return None;
        }
        Some(Self::sorted(header, items))
    }

    /// Builds what a user accepted out of a candidate: any non-empty subset.
    fn accepted_selection(header: BundleHeader, items: Vec<WorkItem>) -> Option<Self> {
        if items.is_empty() {
            return None;
        }
        Some(Self::sorted(header, items))
    }

    fn sorted(header: BundleHeader, mut items: Vec<WorkItem>) -> Self {
        items.sort_by(|a, b| b.priority.cmp(&a.priority));
        Self { header, items }
    }

    pub fn id(&self) -> &CandidateId {
        &self.header.id
    }

    pub fn items(&self) -> &[WorkItem] {
        &self.items
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Distinct service types in item order.
    pub fn service_types(&self) -> Vec<ServiceType> {
        crate::grouping::distinct_service_types(&self.items)
    }

    pub fn total_cost_cents(&self) -> i64 {
        self.items.iter().map(|item| item.estimated_cost_cents).sum()
    }

    pub fn total_duration_hours(&self) -> f64 {
        self.items
            .iter()
            .map(|item| item.estimated_duration_hours)
            .sum()
    }

    pub fn savings(&self) -> SavingsBreakdown {
        estimate(&self.items, self.header.policy)
    }

    pub fn total_savings_cents(&self) -> i64 {
        self.savings().total_savings_cents
    }

    /// Narrows the bundle to the items `keep` accepts, preserving order. A
    /// single kept item is allowed; only generated candidates need two.
    pub fn restrict_to(&self, keep: impl Fn(&WorkItemId) -> bool) -> Option<Self> {
        let items: Vec<WorkItem> = self
            .items
            .iter()
            .filter(|item| keep(&item.id))
            .cloned()
            .collect();
        Self::accepted_selection(self.header.clone(), items)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedBundle {
    pub id: BundleRecordId,
    pub bundle: Bundle,
    pub status: BundleStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub dispatched_at: Option<OffsetDateTime>,
}

impl PersistedBundle {
    pub fn candidate_id(&self) -> &CandidateId {
        self.bundle.id()
    }
}
