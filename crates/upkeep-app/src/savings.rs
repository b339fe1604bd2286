// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};

use crate::WorkItem;

const BPS_DENOMINATOR: i128 = 10_000;

/// Per-bundle savings constants. Each bundling flow carries its own policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavingsPolicy {
    /// Saved for every trip beyond the first.
    pub trip_savings_cents: i64,
    /// Bulk discount on the total cost, in basis points.
    pub bulk_discount_bps: i64,
}

impl SavingsPolicy {
    /// Seed-expansion and asset-driven bundles.
    pub const ASSET: Self = Self {
        trip_savings_cents: 4_500,
        bulk_discount_bps: 800,
    };
    /// Catalog bundles sharing one service type.
    pub const SAME_TYPE: Self = Self {
        trip_savings_cents: 5_000,
        bulk_discount_bps: 1_000,
    };
    /// Catalog bundles spanning several service types in one area.
    pub const MIXED: Self = Self {
        trip_savings_cents: 4_000,
        bulk_discount_bps: 0,
    };

    pub fn from_percent(trip_savings_cents: i64, bulk_discount_pct: f64) -> Self {
        Self {
            trip_savings_cents,
            bulk_discount_bps: (bulk_discount_pct * 100.0).round() as i64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SavingsBreakdown {
    pub item_count: usize,
    pub total_cost_cents: i64,
    pub total_duration_hours: f64,
    pub travel_savings_cents: i64,
    pub bulk_discount_cents: i64,
    pub total_savings_cents: i64,
    pub savings_percentage: f64,
}

pub fn estimate(items: &[WorkItem], policy: SavingsPolicy) -> SavingsBreakdown {
    let item_count = items.len();
    let total_cost_cents: i64 = items.iter().map(|item| item.estimated_cost_cents).sum();
    let total_duration_hours: f64 = items
        .iter()
        .map(|item| item.estimated_duration_hours)
        .sum();

    let extra_trips = i64::try_from(item_count.saturating_sub(1)).unwrap_or(i64::MAX);
    let travel_savings_cents = extra_trips
        .saturating_mul(policy.trip_savings_cents)
        .max(0);
    let bulk_discount_cents = bulk_discount(total_cost_cents, policy.bulk_discount_bps);
    let total_savings_cents = travel_savings_cents.saturating_add(bulk_discount_cents);

    SavingsBreakdown {
        item_count,
        total_cost_cents,
        total_duration_hours,
        travel_savings_cents,
        bulk_discount_cents,
        total_savings_cents,
        savings_percentage: savings_percentage(total_savings_cents, total_cost_cents),
    }
}

fn bulk_discount(total_cost_cents: i64, bps: i64) -> i64 {
    if total_cost_cents <= 0 || bps <= 0 {
        return 0;
    }
    // Half-up to the nearest cent.
    let discount =
        (i128::from(total_cost_cents) * i128::from(bps) + BPS_DENOMINATOR / 2) / BPS_DENOMINATOR;
    i64::try_from(discount).unwrap_or(i64::MAX)
}

/// Zero when there is no cost to compare against; never NaN or negative.
pub fn savings_percentage(savings_cents: i64, total_cost_cents: i64) -> f64 {
    if total_cost_cents <= 0 || savings_cents <= 0 {
        return 0.0;
    }
    let pct = savings_cents as f64 / total_cost_cents as f64 * 100.0;
    if pct.is_finite() { pct } else { 0.0 }
}
