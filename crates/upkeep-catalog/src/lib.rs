// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Catalog ingestion: fetches raw asset and work-order records from the
//! upstream service and falls back to the bundled fixtures when it cannot.

use anyhow::{Context, Result, anyhow, bail};
use reqwest::StatusCode;
use reqwest::blocking::Client as HttpClient;
use serde_json::{Value, json};
use std::fmt;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{info, warn};
use upkeep_app::{BundleError, RejectedRecord, WorkItem, WorkItemId, normalize_catalog};
use url::Url;

const FIXTURE_WORK_ORDERS: &str = include_str!("../fixtures/work_orders.json");
const FIXTURE_ASSETS: &str = include_str!("../fixtures/assets.json");

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogRequest {
    /// Every asset the upstream knows about.
    Assets,
    /// Assets the upstream considers bundleable with `seed`.
    BundleForSeed(WorkItemId),
}

#[derive(Debug, Clone)]
pub struct CatalogClient {
    base_url: String,
    timeout: Duration,
    http: HttpClient,
}

impl CatalogClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_owned();
        if base_url.is_empty() {
            bail!("catalog.base_url must not be empty");
        }
        let parsed = Url::parse(&base_url)
            .with_context(|| format!("catalog.base_url {base_url:?} is not a valid URL"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            bail!(
                "catalog.base_url must use http or https, got {}://",
                parsed.scheme()
            );
        }

        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("build HTTP client")?;

        Ok(Self {
            base_url,
            timeout,
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn fetch(&self, request: &CatalogRequest) -> Result<Vec<Value>> {
        match request {
            CatalogRequest::Assets => self.fetch_assets(),
            CatalogRequest::BundleForSeed(seed) => self.generate_for_seed(seed),
        }
    }

    pub fn fetch_assets(&self) -> Result<Vec<Value>> {
        let response = self
            .http
            .get(format!("{}/assets", self.base_url))
            .send()
            .map_err(|error| connection_error(&self.base_url, error))?;
        read_records(response, "asset list")
    }

    pub fn generate_for_seed(&self, seed: &WorkItemId) -> Result<Vec<Value>> {
        let response = self
            .http
            .post(format!("{}/bundles/generate", self.base_url))
            .json(&json!({ "woid": seed.as_str() }))
            .send()
            .map_err(|error| connection_error(&self.base_url, error))?;
        read_records(response, "bundle candidates")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogOrigin {
    Upstream,
    Fixture,
}

impl CatalogOrigin {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Upstream => "upstream",
            Self::Fixture => "fixture",
        }
    }
}

/// Non-fatal conditions met while loading a catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogNotice {
    UpstreamUnavailable { reason: String },
    UpstreamDisabled,
    SkippedRecords { count: usize },
}

impl CatalogNotice {
    /// The typed error this notice stands in for, when there is one.
    pub fn as_error(&self) -> Option<BundleError> {
        match self {
            Self::UpstreamUnavailable { reason } => Some(BundleError::UpstreamUnavailable {
                reason: reason.clone(),
            }),
            Self::UpstreamDisabled | Self::SkippedRecords { .. } => None,
        }
    }
}

impl fmt::Display for CatalogNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UpstreamUnavailable { reason } => {
                write!(f, "catalog unavailable, showing sample data: {reason}")
            }
            Self::UpstreamDisabled => f.write_str("catalog disabled, showing sample data"),
            Self::SkippedRecords { count: 1 } => f.write_str("skipped 1 malformed record"),
            Self::SkippedRecords { count } => write!(f, "skipped {count} malformed records"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogLoad {
    pub items: Vec<WorkItem>,
    pub origin: CatalogOrigin,
    pub notices: Vec<CatalogNotice>,
    pub rejected: Vec<RejectedRecord>,
}

/// Fetches and normalizes a catalog. Any transport, status or decode failure
/// yields the fixture catalog and an [`CatalogNotice::UpstreamUnavailable`]
/// notice instead of an error.
pub fn load_catalog(
    client: Option<&CatalogClient>,
    request: &CatalogRequest,
    now: OffsetDateTime,
) -> CatalogLoad {
    let Some(client) = client else {
        return fixture_load(vec![CatalogNotice::UpstreamDisabled], now);
    };

    match client.fetch(request) {
        Ok(records) => {
            info!(records = records.len(), base_url = client.base_url(), "catalog fetched");
            let normalized = normalize_catalog(&records, now);
            if !records.is_empty() && normalized.items.is_empty() {
                warn!(
                    rejected = normalized.rejected.len(),
                    "no catalog record was usable; using fixture data"
                );
                return fixture_load(
                    vec![CatalogNotice::UpstreamUnavailable {
                        reason: format!(
                            "catalog returned {} records and none were usable",
                            records.len()
                        ),
                    }],
                    now,
                );
            }
            let mut notices = Vec::new();
            if !normalized.rejected.is_empty() {
                notices.push(CatalogNotice::SkippedRecords {
                    count: normalized.rejected.len(),
                });
            }
            CatalogLoad {
                items: normalized.items,
                origin: CatalogOrigin::Upstream,
                notices,
                rejected: normalized.rejected,
            }
        }
        Err(error) => {
            warn!(error = %format!("{error:#}"), "catalog fetch failed; using fixture data");
            fixture_load(
                vec![CatalogNotice::UpstreamUnavailable {
                    reason: format!("{error:#}"),
                }],
                now,
            )
        }
    }
}

/// Raw records of the bundled sample catalog: twelve work orders followed by
/// five assets.
pub fn fixture_records() -> Result<Vec<Value>> {
    let mut records = parse_fixture("work_orders.json", FIXTURE_WORK_ORDERS)?;
    records.extend(parse_fixture("assets.json", FIXTURE_ASSETS)?);
    Ok(records)
}

pub fn fixture_catalog(now: OffsetDateTime) -> Vec<WorkItem> {
    fixture_load(Vec::new(), now).items
}

fn fixture_load(mut notices: Vec<CatalogNotice>, now: OffsetDateTime) -> CatalogLoad {
    let records = match fixture_records() {
        Ok(records) => records,
        Err(error) => {
            warn!(error = %format!("{error:#}"), "bundled fixtures are unreadable");
            Vec::new()
        }
    };
    let normalized = normalize_catalog(&records, now);
    if !normalized.rejected.is_empty() {
        notices.push(CatalogNotice::SkippedRecords {
            count: normalized.rejected.len(),
        });
    }
    CatalogLoad {
        items: normalized.items,
        origin: CatalogOrigin::Fixture,
        notices,
        rejected: normalized.rejected,
    }
}

fn parse_fixture(name: &str, raw: &str) -> Result<Vec<Value>> {
    let value: Value =
        serde_json::from_str(raw).with_context(|| format!("parse fixture {name}"))?;
    records_from_payload(value).with_context(|| format!("read fixture {name}"))
}

fn read_records(response: reqwest::blocking::Response, what: &str) -> Result<Vec<Value>> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(clean_error_response(status, &body));
    }
    let payload: Value = response.json().with_context(|| format!("decode {what}"))?;
    records_from_payload(payload).with_context(|| format!("decode {what}"))
}

/// Accepts a bare array of records or an object wrapping them in `assets`.
fn records_from_payload(payload: Value) -> Result<Vec<Value>> {
    match payload {
        Value::Array(records) => Ok(records),
        Value::Object(mut object) => match object.remove("assets") {
            Some(Value::Array(records)) => Ok(records),
            Some(_) => Err(anyhow!("`assets` is not an array")),
            None => Err(anyhow!("expected an array of records or an object with `assets`")),
        },
        _ => Err(anyhow!("expected an array of records or an object with `assets`")),
    }
}

fn connection_error(base_url: &str, error: reqwest::Error) -> anyhow::Error {
    anyhow!(
        "cannot reach catalog at {} -- check catalog.base_url or run with --demo ({})",
        base_url,
        error
    )
}

fn clean_error_response(status: StatusCode, body: &str) -> anyhow::Error {
    if let Ok(Value::Object(parsed)) = serde_json::from_str::<Value>(body)
        && let Some(Value::String(message)) = parsed.get("error").or_else(|| parsed.get("message"))
        && !message.is_empty()
    {
        return anyhow!("catalog error ({}): {}", status.as_u16(), message);
    }

    if body.len() < 100 && !body.contains('{') && !body.trim().is_empty() {
        return anyhow!("catalog error ({}): {}", status.as_u16(), body.trim());
    }

    anyhow!("catalog returned {}", status.as_u16())
}
