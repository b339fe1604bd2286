// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use serde_json::{Value, json};
use std::path::PathBuf;
use time::macros::datetime;
use time::{Duration, OffsetDateTime};
use upkeep_app::normalize::{confidence_from_interval, days_until_service, priority_from_interval};
use upkeep_app::validation::format_date;
use upkeep_app::{Priority, ServiceType, WorkItem, WorkItemId};

const SERVICE_AREAS: [&str; 5] = [
    "North District",
    "Central District",
    "West District",
    "Riverside",
    "Harbor Point",
];

const PROPERTIES: [&str; 8] = [
    "Sunset Apartments",
    "Oak Grove Complex",
    "Riverside Towers",
    "Maple Heights",
    "Pine Valley Condos",
    "Cedar Point",
    "Lakeview Commons",
    "Birch Court",
];

const UNIT_LOCATIONS: [&str; 10] = [
    "Kitchen",
    "Laundry Room",
    "Basement",
    "Boiler Room",
    "Roof",
    "Lobby",
    "Parking Garage",
    "Hallway",
    "Unit Bathroom",
    "Mechanical Closet",
];

const EQUIPMENT_LABELS: [&str; 12] = [
    "Rooftop HVAC Unit",
    "Air Handler",
    "Boiler",
    "Exhaust Fan",
    "Refrigerator",
    "Walk-in Freezer",
    "Beverage Cooler",
    "Parking Lot Light",
    "Lobby Lamp",
    "Electrical Panel",
    "Breaker Box",
    "Elevator Motor",
];

const MANUFACTURERS: [&str; 8] = [
    "Trane", "Carrier", "Whirlpool", "Lennox", "Philips", "Square D", "GE", "Rheem",
];

const PRIORITIES: [Priority; 3] = [Priority::Low, Priority::Medium, Priority::High];

#[derive(Debug, Clone)]
struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        let mut state = seed ^ 0x9E37_79B9_7F4A_7C15;
        if state == 0 {
            state = 0xA409_3822_299F_31D0;
        }
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        let mut x = self.state;
        x ^= x >> 13;
        x ^= x << 7;
        x ^= x >> 17;
        x
    }

    fn int_n(&mut self, n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        (self.next_u64() % (n as u64)) as usize
    }
}

/// Seeded generator of work items and raw upstream records. The same seed
/// always yields the same sequence.
#[derive(Debug, Clone)]
pub struct WorkOrderFaker {
    rng: DeterministicRng,
    seed: u64,
    issued: u64,
}

impl WorkOrderFaker {
    pub fn new(seed: u64) -> Self {
        let normalized = if seed == 0 { 1 } else { seed };
        Self {
            rng: DeterministicRng::new(normalized),
            seed: normalized,
            issued: 0,
        }
    }

    pub fn int_n(&mut self, n: usize) -> usize {
        self.rng.int_n(n)
    }

    pub fn work_item(&mut self) -> WorkItem {
        let area = self.pick(&SERVICE_AREAS);
        let service_type = ServiceType::ALL[self.rng.int_n(ServiceType::ALL.len())];
        self.work_item_in(area, service_type)
    }

    pub fn work_item_in(&mut self, service_area: &str, service_type: ServiceType) -> WorkItem {
        self.issued += 1;
        let property = self.pick(&PROPERTIES);
        let interval_months = self.int_range_i64(1, 24) as f64;
        let last_serviced = fixture_now().date() - Duration::days(self.int_range_i64(0, 540));
        let days_until = days_until_service(last_serviced, interval_months, fixture_now().date());

        WorkItem {
            id: WorkItemId::new(format!("WO-{}-{:04}", self.seed, self.issued)),
            title: format!("{} service", service_type.label()),
            property_id: format!("PROP-{:03}", self.int_range_i64(1, 120)),
            property_name: property.to_owned(),
            service_area: service_area.to_owned(),
            service_type,
            priority: priority_from_interval(days_until),
            estimated_cost_cents: self.int_range_i64(0, 60_000),
            estimated_duration_hours: self.int_range_i64(1, 16) as f64 / 2.0,
            specific_location: format!(
                "{} {}",
                property,
                self.pick(&UNIT_LOCATIONS)
            ),
            last_serviced_at: Some(last_serviced),
            days_until_service: Some(days_until),
            confidence: confidence_from_interval(interval_months),
            installed_on: None,
            asset_age_years: None,
        }
    }

    /// A catalog of `len` uniquely identified items spread over a few areas
    /// so that grouping has something to find.
    pub fn catalog(&mut self, len: usize) -> Vec<WorkItem> {
        let areas = 1 + self.rng.int_n(3);
        (0..len)
            .map(|_| {
                let area = SERVICE_AREAS[self.rng.int_n(areas)];
                let service_type = ServiceType::ALL[self.rng.int_n(ServiceType::ALL.len())];
                let mut item = self.work_item_in(area, service_type);
                item.priority = PRIORITIES[self.rng.int_n(PRIORITIES.len())];
                item
            })
            .collect()
    }

    /// A raw asset record in the upstream camelCase shape.
    pub fn asset_record(&mut self) -> Value {
        self.issued += 1;
        let last_service = fixture_now().date() - Duration::days(self.int_range_i64(0, 540));
        json!({
            "locationAssetId": self.issued,
            "averageIntervalMonths": self.int_range_i64(1, 24),
            "locationId": self.int_range_i64(1, 40),
            "locationName": self.pick(&PROPERTIES),
            "equipmentType": self.pick(&EQUIPMENT_LABELS),
            "manufacturer": self.pick(&MANUFACTURERS),
            "lastServiceDate": format_date(last_service),
        })
    }

    fn pick<'a>(&mut self, items: &'a [&'a str]) -> &'a str {
        items[self.rng.int_n(items.len())]
    }

    fn int_range_i64(&mut self, min: i64, max: i64) -> i64 {
        if max <= min {
            return min;
        }
        let span = max - min + 1;
        min + (self.rng.next_u64() % (span as u64)) as i64
    }
}

pub fn temp_db_path() -> Result<(tempfile::TempDir, PathBuf)> {
    let dir = tempfile::tempdir().context("create temp dir")?;
    let db_path = dir.path().join("upkeep.db");
    Ok((dir, db_path))
}

pub fn fixture_datetime() -> &'static str {
    "2026-02-19T12:34:56Z"
}

/// Reference "now" shared by every test that needs a clock.
pub fn fixture_now() -> OffsetDateTime {
    datetime!(2026-02-19 12:34:56 UTC)
}

pub fn service_areas() -> &'static [&'static str] {
    &SERVICE_AREAS
}
