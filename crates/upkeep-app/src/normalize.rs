// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Turns upstream asset and work-order records into [`WorkItem`]s.
//!
//! Upstream systems disagree on key names, so every field is looked up under
//! its camelCase and snake_case spellings. Required fields that are missing or
//! unparseable fail with [`BundleError::Validation`] naming the field; nothing
//! is invented for them.

use serde_json::{Map, Value};
use std::collections::BTreeSet;
use time::{Date, OffsetDateTime};
use tracing::warn;

use crate::validation::{self, ValidationError};
use crate::{BundleError, BundleResult, ConfidenceLevel, Priority, ServiceType, WorkItem, WorkItemId};

const DAYS_PER_MONTH: f64 = 30.0;
const HIGH_PRIORITY_WINDOW_DAYS: i64 = 15;
const MEDIUM_PRIORITY_WINDOW_DAYS: i64 = 60;

const ASSET_ID_KEYS: &[&str] = &["locationAssetId", "location_asset_id"];
const INTERVAL_KEYS: &[&str] = &["averageIntervalMonths", "average_interval_months"];
const LOCATION_ID_KEYS: &[&str] = &["locationId", "location_id"];
const EQUIPMENT_KEYS: &[&str] = &["equipmentType", "equipment_type"];
const MANUFACTURER_KEYS: &[&str] = &["manufacturer"];
const LAST_SERVICE_KEYS: &[&str] = &["lastServiceDate", "last_service_date"];
const LOCATION_NAME_KEYS: &[&str] = &["locationName", "location_name", "location"];
const SERVICE_AREA_KEYS: &[&str] = &["serviceArea", "service_area"];
const SPECIFIC_LOCATION_KEYS: &[&str] = &["specificLocation", "specific_location", "address"];
const COST_KEYS: &[&str] = &["estimatedCost", "estimated_cost"];
const DURATION_KEYS: &[&str] = &[
    "estimatedDuration",
    "estimatedDurationHours",
    "estimated_duration",
    "estimated_duration_hours",
];
const INSTALLATION_KEYS: &[&str] = &["installationDate", "installation_date"];
const WORK_ORDER_ID_KEYS: &[&str] = &["id", "workOrderId", "work_order_id", "woid"];
const TITLE_KEYS: &[&str] = &["title", "description"];
const PROPERTY_NAME_KEYS: &[&str] = &["property", "propertyName", "property_name"];
const PROPERTY_ID_KEYS: &[&str] = &["propertyId", "property_id"];
const SERVICE_TYPE_KEYS: &[&str] = &["serviceType", "service_type", "category"];
const PRIORITY_KEYS: &[&str] = &["priority"];

/// `round(interval × 30) − days since last service`. Negative means overdue.
pub fn days_until_service(last_service: Date, average_interval_months: f64, today: Date) -> i64 {
    let interval_days = (average_interval_months * DAYS_PER_MONTH).round() as i64;
    let days_since = (today - last_service).whole_days();
    interval_days - days_since
}

pub fn priority_from_interval(days_until_service: i64) -> Priority {
    if days_until_service < 0 || days_until_service <= HIGH_PRIORITY_WINDOW_DAYS {
        Priority::High
    } else if days_until_service <= MEDIUM_PRIORITY_WINDOW_DAYS {
        Priority::Medium
    } else {
        Priority::Low
    }
}

/// Short service intervals mean more history behind the estimate.
pub fn confidence_from_interval(average_interval_months: f64) -> ConfidenceLevel {
    if average_interval_months <= 6.0 {
        ConfidenceLevel::High
    } else if average_interval_months <= 12.0 {
        ConfidenceLevel::Medium
    } else {
        ConfidenceLevel::Low
    }
}

/// Classifies free-text equipment labels. Unrecognized labels fall back to
/// HVAC.
pub fn service_type_from_equipment_label(label: &str) -> ServiceType {
    let lowered = label.to_ascii_lowercase();
    let has_any = |needles: &[&str]| needles.iter().any(|needle| lowered.contains(needle));

    if has_any(&["hvac", "air handler", "boiler", "exhaust fan"]) {
        ServiceType::Hvac
    } else if has_any(&["refrigerat", "freezer", "cooler"]) {
        ServiceType::Refrigeration
    } else if has_any(&["light", "lamp"]) {
        ServiceType::Lighting
    } else if has_any(&["electric", "panel", "breaker"]) {
        ServiceType::Electrical
    } else {
        ServiceType::Hvac
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RejectedRecord {
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct NormalizedCatalog {
    pub items: Vec<WorkItem>,
    pub rejected: Vec<RejectedRecord>,
}

/// Normalizes a batch. Malformed records and repeated ids are skipped with a
/// warning so one bad row never blocks the rest of the catalog.
pub fn normalize_catalog(records: &[Value], now: OffsetDateTime) -> NormalizedCatalog {
    let mut catalog = NormalizedCatalog::default();
    let mut seen = BTreeSet::new();

    for (index, record) in records.iter().enumerate() {
        match normalize_record(record, now) {
            Ok(item) => {
                if seen.insert(item.id.clone()) {
                    catalog.items.push(item);
                } else {
                    warn!(index, id = %item.id, "skipping duplicate catalog record");
                    catalog.rejected.push(RejectedRecord {
                        index,
                        reason: format!("duplicate id {}", item.id),
                    });
                }
            }
            Err(error) => {
                warn!(index, %error, "skipping malformed catalog record");
                catalog.rejected.push(RejectedRecord {
                    index,
                    reason: error.to_string(),
                });
            }
        }
    }

    catalog
}

pub fn normalize_record(record: &Value, now: OffsetDateTime) -> BundleResult<WorkItem> {
    let Some(map) = record.as_object() else {
        return Err(BundleError::validation("record", "expected a JSON object"));
    };
    let view = RecordView { map };
    if view.lookup(ASSET_ID_KEYS).is_some() {
        normalize_asset(&view, now.date())
    } else {
        normalize_work_order(&view, now.date())
    }
}

fn normalize_asset(view: &RecordView<'_>, today: Date) -> BundleResult<WorkItem> {
    let asset_id = view.required_key("locationAssetId", ASSET_ID_KEYS)?;
    let interval_months = view.required_number("averageIntervalMonths", INTERVAL_KEYS)?;
    let location_id = view.required_key("locationId", LOCATION_ID_KEYS)?;
    let equipment = view.required_text("equipmentType", EQUIPMENT_KEYS)?;
    let last_service = view.required_date("lastServiceDate", LAST_SERVICE_KEYS)?;
    let manufacturer = view.optional_text(MANUFACTURER_KEYS);

    let service_type = service_type_from_equipment_label(&equipment);
    let days_until = days_until_service(last_service, interval_months, today);
    let (standard_cost, standard_hours) = service_type.standard_estimate();
    let estimated_cost_cents = match view.optional_number("estimatedCost", COST_KEYS)? {
        Some(dollars) => {
            validation::dollars_to_cents(dollars).map_err(|error| field_error("estimatedCost", error))?
        }
        None => standard_cost,
    };
    let estimated_duration_hours = view
        .optional_number("estimatedDuration", DURATION_KEYS)?
        .unwrap_or(standard_hours);

    let property_id = format!("LOC-{location_id}");
    let location_name = view.optional_text(LOCATION_NAME_KEYS);
    let service_area = view
        .optional_text(SERVICE_AREA_KEYS)
        .or_else(|| location_name.clone())
        .unwrap_or_else(|| property_id.clone());
    let installed_on = view.display_date("installationDate", INSTALLATION_KEYS);

    let title = match manufacturer {
        Some(manufacturer) => format!("{manufacturer} {equipment}"),
        None => equipment,
    };

    Ok(WorkItem {
        id: WorkItemId::new(format!("ASSET-{asset_id}")),
        title,
        property_name: location_name.unwrap_or_else(|| property_id.clone()),
        property_id,
        service_area,
        service_type,
        priority: priority_from_interval(days_until),
        estimated_cost_cents,
        estimated_duration_hours,
        specific_location: view.optional_text(SPECIFIC_LOCATION_KEYS).unwrap_or_default(),
        last_serviced_at: Some(last_service),
        days_until_service: Some(days_until),
        confidence: confidence_from_interval(interval_months),
        installed_on,
        asset_age_years: installed_on.map(|installed| age_in_years(installed, today)),
    })
}

fn normalize_work_order(view: &RecordView<'_>, today: Date) -> BundleResult<WorkItem> {
    let id = view.required_key("id", WORK_ORDER_ID_KEYS)?;
    let title = view.required_text("title", TITLE_KEYS)?;
    let service_area = view.required_text("serviceArea", SERVICE_AREA_KEYS)?;
    let raw_type = view.required_text("serviceType", SERVICE_TYPE_KEYS)?;
    let service_type = ServiceType::parse(&raw_type).ok_or_else(|| {
        BundleError::validation("serviceType", format!("unknown service type {raw_type:?}"))
    })?;
    let raw_priority = view.required_text("priority", PRIORITY_KEYS)?;
    let priority = Priority::parse(&raw_priority).ok_or_else(|| {
        BundleError::validation("priority", format!("unknown priority {raw_priority:?}"))
    })?;
    let cost_dollars = view.required_number("estimatedCost", COST_KEYS)?;
    let estimated_cost_cents = validation::dollars_to_cents(cost_dollars)
        .map_err(|error| field_error("estimatedCost", error))?;
    let estimated_duration_hours = view.required_number("estimatedDuration", DURATION_KEYS)?;

    let property_name = view.optional_text(PROPERTY_NAME_KEYS).unwrap_or_default();
    let property_id = view
        .optional_key(PROPERTY_ID_KEYS)
        .unwrap_or_else(|| property_name.clone());

    let last_serviced_at = view.optional_date("lastServiceDate", LAST_SERVICE_KEYS)?;
    let interval_months = view.optional_number("averageIntervalMonths", INTERVAL_KEYS)?;
    let days_until = match (last_serviced_at, interval_months) {
        (Some(last), Some(months)) => Some(days_until_service(last, months, today)),
        _ => None,
    };
    let installed_on = view.display_date("installationDate", INSTALLATION_KEYS);

    Ok(WorkItem {
        id: WorkItemId::new(id),
        title,
        property_id,
        property_name,
        service_area,
        service_type,
        priority,
        estimated_cost_cents,
        estimated_duration_hours,
        specific_location: view.optional_text(SPECIFIC_LOCATION_KEYS).unwrap_or_default(),
        last_serviced_at,
        days_until_service: days_until,
        confidence: interval_months.map_or(ConfidenceLevel::Low, confidence_from_interval),
        installed_on,
        asset_age_years: installed_on.map(|installed| age_in_years(installed, today)),
    })
}

fn age_in_years(installed: Date, today: Date) -> i32 {
    let mut years = today.year() - installed.year();
    if (today.month() as u8, today.day()) < (installed.month() as u8, installed.day()) {
        years -= 1;
    }
    years.max(0)
}

fn field_error(field: &'static str, error: ValidationError) -> BundleError {
    BundleError::validation(field, error.to_string())
}

struct RecordView<'a> {
    map: &'a Map<String, Value>,
}

impl RecordView<'_> {
    fn lookup(&self, keys: &[&str]) -> Option<&Value> {
        keys.iter()
            .filter_map(|key| self.map.get(*key))
            .find(|value| !value.is_null())
    }

    fn optional_text(&self, keys: &[&str]) -> Option<String> {
        match self.lookup(keys)? {
            Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_owned()),
            _ => None,
        }
    }

    fn required_text(&self, field: &'static str, keys: &[&str]) -> BundleResult<String> {
        match self.lookup(keys) {
            None => Err(field_error(field, ValidationError::Missing)),
            Some(Value::String(text)) if !text.trim().is_empty() => Ok(text.trim().to_owned()),
            Some(_) => Err(field_error(field, ValidationError::InvalidText)),
        }
    }

    /// Identifiers arrive as either numbers or strings.
    fn optional_key(&self, keys: &[&str]) -> Option<String> {
        match self.lookup(keys)? {
            Value::Number(number) => Some(number.to_string()),
            Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_owned()),
            _ => None,
        }
    }

    fn required_key(&self, field: &'static str, keys: &[&str]) -> BundleResult<String> {
        if self.lookup(keys).is_none() {
            return Err(field_error(field, ValidationError::Missing));
        }
        self.optional_key(keys)
            .ok_or_else(|| field_error(field, ValidationError::InvalidText))
    }

    fn optional_number(&self, field: &'static str, keys: &[&str]) -> BundleResult<Option<f64>> {
        let Some(value) = self.lookup(keys) else {
            return Ok(None);
        };
        let number = match value {
            Value::Number(number) => number.as_f64(),
            Value::String(text) => text.trim().parse::<f64>().ok(),
            _ => None,
        }
        .ok_or_else(|| field_error(field, ValidationError::InvalidNumber))?;
        validation::non_negative(number)
            .map(Some)
            .map_err(|error| field_error(field, error))
    }

    fn required_number(&self, field: &'static str, keys: &[&str]) -> BundleResult<f64> {
        self.optional_number(field, keys)?
            .ok_or_else(|| field_error(field, ValidationError::Missing))
    }

    fn optional_date(&self, field: &'static str, keys: &[&str]) -> BundleResult<Option<Date>> {
        let Some(value) = self.lookup(keys) else {
            return Ok(None);
        };
        let Value::String(raw) = value else {
            return Err(field_error(field, ValidationError::InvalidDate));
        };
        validation::parse_date(raw)
            .map(Some)
            .map_err(|error| field_error(field, error))
    }

    fn required_date(&self, field: &'static str, keys: &[&str]) -> BundleResult<Date> {
        self.optional_date(field, keys)?
            .ok_or_else(|| field_error(field, ValidationError::Missing))
    }

    /// Display-only dates are dropped rather than failing the whole record.
    fn display_date(&self, field: &'static str, keys: &[&str]) -> Option<Date> {
        match self.optional_date(field, keys) {
            Ok(value) => value,
            Err(error) => {
                warn!(%error, "ignoring unparseable display-only date");
                None
            }
        }
    }
}
