// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use upkeep_app::{BundlingPolicy, SavingsPolicy};

const CONFIG_VERSION: i64 = 1;
const CONFIG_PATH_ENV: &str = "UPKEEP_CONFIG_PATH";
const DEFAULT_CATALOG_BASE_URL: &str = "http://localhost:8080/api";
const DEFAULT_CATALOG_TIMEOUT: &str = "5s";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub version: i64,
    #[serde(default)]
    pub storage: Storage,
    #[serde(default)]
    pub catalog: Catalog,
    #[serde(default)]
    pub bundling: Bundling,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            storage: Storage::default(),
            catalog: Catalog::default(),
            bundling: Bundling::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Storage {
    pub db_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Catalog {
    pub enabled: Option<bool>,
    pub base_url: Option<String>,
    pub timeout: Option<String>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            enabled: Some(true),
            base_url: Some(DEFAULT_CATALOG_BASE_URL.to_owned()),
            timeout: Some(DEFAULT_CATALOG_TIMEOUT.to_owned()),
        }
    }
}

/// Dollar amounts and percentages as a person would write them; converted to
/// cents and basis points by [`Config::bundling_policy`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Bundling {
    pub seed_cap: Option<i64>,
    pub asset_trip_savings: Option<f64>,
    pub asset_bulk_discount_pct: Option<f64>,
    pub same_type_trip_savings: Option<f64>,
    pub same_type_bulk_discount_pct: Option<f64>,
    pub mixed_trip_savings: Option<f64>,
    pub mixed_bulk_discount_pct: Option<f64>,
    pub mixed_min_savings_pct: Option<f64>,
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        if let Some(path) = env::var_os(CONFIG_PATH_ENV) {
            return Ok(PathBuf::from(path));
        }

        let config_root = dirs::config_dir().ok_or_else(|| {
            anyhow!("cannot resolve config directory; set {CONFIG_PATH_ENV} to the config file")
        })?;

        let app_dir = config_root.join(upkeep_db::APP_NAME);
        fs::create_dir_all(&app_dir)
            .with_context(|| format!("create config directory {}", app_dir.display()))?;
        Ok(app_dir.join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        let value: toml::Value = toml::from_str(&raw)
            .with_context(|| format!("parse TOML config {}", path.display()))?;

        let version = value
            .get("version")
            .and_then(toml::Value::as_integer)
            .ok_or_else(|| {
                anyhow!(
                    "config file {} is not versioned. Add `version = 1` and put values under [storage], [catalog], and [bundling]",
                    path.display()
                )
            })?;

        if version != CONFIG_VERSION {
            bail!(
                "unsupported config version {} in {}; expected version = 1",
                version,
                path.display()
            );
        }

        let config: Config = value
            .try_into()
            .with_context(|| format!("decode config {}", path.display()))?;
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if let Some(db_path) = &self.storage.db_path {
            upkeep_db::validate_db_path(db_path)?;
        }

        if let Some(timeout) = &self.catalog.timeout {
            let parsed = parse_duration(timeout)?;
            if parsed <= Duration::ZERO {
                bail!(
                    "catalog.timeout in {} must be positive, got {}",
                    path.display(),
                    timeout
                );
            }
        }

        if let Some(cap) = self.bundling.seed_cap
            && cap < 2
        {
            bail!(
                "bundling.seed_cap in {} must be at least 2, got {}",
                path.display(),
                cap
            );
        }

        let amounts = [
            ("asset_trip_savings", self.bundling.asset_trip_savings),
            ("same_type_trip_savings", self.bundling.same_type_trip_savings),
            ("mixed_trip_savings", self.bundling.mixed_trip_savings),
            ("mixed_min_savings_pct", self.bundling.mixed_min_savings_pct),
        ];
        for (name, value) in amounts {
            if let Some(value) = value
                && !(value.is_finite() && value >= 0.0)
            {
                bail!(
                    "bundling.{name} in {} must be a non-negative number, got {value}",
                    path.display()
                );
            }
        }

        let discounts = [
            ("asset_bulk_discount_pct", self.bundling.asset_bulk_discount_pct),
            (
                "same_type_bulk_discount_pct",
                self.bundling.same_type_bulk_discount_pct,
            ),
            ("mixed_bulk_discount_pct", self.bundling.mixed_bulk_discount_pct),
        ];
        for (name, value) in discounts {
            if let Some(value) = value
                && !(0.0..=100.0).contains(&value)
            {
                bail!(
                    "bundling.{name} in {} must be between 0 and 100, got {value}",
                    path.display()
                );
            }
        }

        Ok(())
    }

    pub fn db_path(&self) -> Result<PathBuf> {
        match &self.storage.db_path {
            Some(path) => Ok(PathBuf::from(path)),
            None => upkeep_db::default_db_path(),
        }
    }

    pub fn catalog_enabled(&self) -> bool {
        self.catalog.enabled.unwrap_or(true)
    }

    pub fn catalog_base_url(&self) -> &str {
        self.catalog
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_CATALOG_BASE_URL)
            .trim_end_matches('/')
    }

    pub fn catalog_timeout(&self) -> Result<Duration> {
        parse_duration(
            self.catalog
                .timeout
                .as_deref()
                .unwrap_or(DEFAULT_CATALOG_TIMEOUT),
        )
    }

    /// Bundling constants with any configured overrides applied.
    pub fn bundling_policy(&self) -> BundlingPolicy {
        let defaults = BundlingPolicy::default();
        let bundling = &self.bundling;
        BundlingPolicy {
            seed_cap: bundling
                .seed_cap
                .and_then(|cap| usize::try_from(cap).ok())
                .unwrap_or(defaults.seed_cap),
            asset: override_policy(
                defaults.asset,
                bundling.asset_trip_savings,
                bundling.asset_bulk_discount_pct,
            ),
            same_type: override_policy(
                defaults.same_type,
                bundling.same_type_trip_savings,
                bundling.same_type_bulk_discount_pct,
            ),
            mixed: override_policy(
                defaults.mixed,
                bundling.mixed_trip_savings,
                bundling.mixed_bulk_discount_pct,
            ),
            mixed_min_savings_pct: bundling
                .mixed_min_savings_pct
                .unwrap_or(defaults.mixed_min_savings_pct),
            mixed_min_items: defaults.mixed_min_items,
        }
    }

    pub fn example_config(path: &Path) -> String {
        let defaults = BundlingPolicy::default();
        format!(
            "# upkeep config\n# Place this file at: {}\n\nversion = 1\n\n[storage]\n# Optional. Default is platform data dir (for example ~/.local/share/upkeep/upkeep.db)\n# db_path = \"/absolute/path/to/upkeep.db\"\n\n[catalog]\nenabled = true\nbase_url = \"{}\"\ntimeout = \"{}\"\n\n[bundling]\nseed_cap = {}\nasset_trip_savings = {}\nasset_bulk_discount_pct = {}\nsame_type_trip_savings = {}\nsame_type_bulk_discount_pct = {}\nmixed_trip_savings = {}\nmixed_bulk_discount_pct = {}\nmixed_min_savings_pct = {:.1}\n",
            path.display(),
            DEFAULT_CATALOG_BASE_URL,
            DEFAULT_CATALOG_TIMEOUT,
            defaults.seed_cap,
            dollars(defaults.asset.trip_savings_cents),
            percent(defaults.asset.bulk_discount_bps),
            dollars(defaults.same_type.trip_savings_cents),
            percent(defaults.same_type.bulk_discount_bps),
            dollars(defaults.mixed.trip_savings_cents),
            percent(defaults.mixed.bulk_discount_bps),
            defaults.mixed_min_savings_pct,
        )
    }
}

fn override_policy(
    base: SavingsPolicy,
    trip_savings: Option<f64>,
    bulk_discount_pct: Option<f64>,
) -> SavingsPolicy {
    let trip_savings_cents = trip_savings
        .map(|dollars| (dollars * 100.0).round() as i64)
        .unwrap_or(base.trip_savings_cents);
    match bulk_discount_pct {
        Some(pct) => SavingsPolicy::from_percent(trip_savings_cents, pct),
        None => SavingsPolicy {
            trip_savings_cents,
            bulk_discount_bps: base.bulk_discount_bps,
        },
    }
}

fn dollars(cents: i64) -> String {
    format!("{:.1}", cents as f64 / 100.0)
}

fn percent(bps: i64) -> String {
    format!("{:.1}", bps as f64 / 100.0)
}

fn parse_duration(raw: &str) -> Result<Duration> {
    if let Some(value) = raw.strip_suffix("ms") {
        let millis: u64 = value
            .parse()
            .with_context(|| format!("invalid timeout duration {raw:?}"))?;
        return Ok(Duration::from_millis(millis));
    }
    if let Some(value) = raw.strip_suffix('s') {
        let secs: u64 = value
            .parse()
            .with_context(|| format!("invalid timeout duration {raw:?}"))?;
        return Ok(Duration::from_secs(secs));
    }
    if let Some(value) = raw.strip_suffix('m') {
        let mins: u64 = value
            .parse()
            .with_context(|| format!("invalid timeout duration {raw:?}"))?;
        return Ok(Duration::from_secs(mins * 60));
    }

    bail!("invalid duration {raw:?}; use one of: <N>ms, <N>s, <N>m (for example 500ms or 5s)")
}

#[cfg(test)]
mod tests {
    use super::{Config, parse_duration};
    use anyhow::Result;
    use std::path::PathBuf;
    use std::sync::{Mutex, OnceLock};
    use std::time::Duration;
    use upkeep_app::{BundlingPolicy, SavingsPolicy};

    fn write_config(content: &str) -> Result<(tempfile::TempDir, PathBuf)> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("config.toml");
        std::fs::write(&path, content)?;
        Ok((temp, path))
    }

    fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        match ENV_LOCK.get_or_init(|| Mutex::new(())).lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    #[test]
    fn missing_config_uses_defaults() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let config = Config::load(&temp.path().join("missing.toml"))?;
        assert_eq!(config.version, 1);
        assert!(config.catalog_enabled());
        assert_eq!(config.bundling_policy(), BundlingPolicy::default());
        Ok(())
    }

    #[test]
    fn unversioned_config_is_rejected_with_actionable_message() -> Result<()> {
        let (_temp, path) = write_config("[catalog]\nenabled = false\n")?;
        let error = Config::load(&path).expect_err("unversioned config should fail");
        let message = error.to_string();
        assert!(message.contains("version = 1"));
        assert!(message.contains("[storage], [catalog], and [bundling]"));
        Ok(())
    }

    #[test]
    fn unsupported_config_version_is_rejected() -> Result<()> {
        let (_temp, path) = write_config("version = 3\n")?;
        let error = Config::load(&path).expect_err("v3 config should fail");
        assert!(error.to_string().contains("unsupported config version 3"));
        Ok(())
    }

    #[test]
    fn malformed_config_returns_parse_error() -> Result<()> {
        let (_temp, path) = write_config("{{not toml")?;
        let error = Config::load(&path).expect_err("malformed config should fail");
        assert!(error.to_string().contains("parse TOML config"));
        Ok(())
    }

    #[test]
    fn catalog_section_parses() -> Result<()> {
        let (_temp, path) = write_config(
            "version = 1\n[catalog]\nenabled = false\nbase_url = \"https://assets.example.com/api//\"\ntimeout = \"750ms\"\n",
        )?;
        let config = Config::load(&path)?;
        assert!(!config.catalog_enabled());
        assert_eq!(config.catalog_base_url(), "https://assets.example.com/api");
        assert_eq!(config.catalog_timeout()?, Duration::from_millis(750));
        Ok(())
    }

    #[test]
    fn bundling_overrides_convert_to_cents_and_basis_points() -> Result<()> {
        let (_temp, path) = write_config(
            "version = 1\n[bundling]\nseed_cap = 6\nsame_type_trip_savings = 62.5\nsame_type_bulk_discount_pct = 12.5\nmixed_min_savings_pct = 7.0\n",
        )?;
        let policy = Config::load(&path)?.bundling_policy();
        assert_eq!(policy.seed_cap, 6);
        assert_eq!(
            policy.same_type,
            SavingsPolicy {
                trip_savings_cents: 6_250,
                bulk_discount_bps: 1_250,
            }
        );
        assert_eq!(policy.asset, SavingsPolicy::ASSET);
        assert_eq!(policy.mixed, SavingsPolicy::MIXED);
        assert_eq!(policy.mixed_min_savings_pct, 7.0);
        Ok(())
    }

    #[test]
    fn bundling_values_are_validated() -> Result<()> {
        let (_temp, path) = write_config("version = 1\n[bundling]\nseed_cap = 1\n")?;
        let error = Config::load(&path).expect_err("seed cap below two should fail");
        assert!(error.to_string().contains("at least 2"));

        let (_temp, path) =
            write_config("version = 1\n[bundling]\nmixed_bulk_discount_pct = 140.0\n")?;
        let error = Config::load(&path).expect_err("discount above 100 should fail");
        assert!(error.to_string().contains("between 0 and 100"));

        let (_temp, path) =
            write_config("version = 1\n[bundling]\nasset_trip_savings = -5.0\n")?;
        let error = Config::load(&path).expect_err("negative trip savings should fail");
        assert!(error.to_string().contains("non-negative"));
        Ok(())
    }

    #[test]
    fn default_path_honors_env_override() -> Result<()> {
        let _guard = env_lock();
        let temp = tempfile::tempdir()?;
        let override_path = temp.path().join("custom-config.toml");
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::set_var("UPKEEP_CONFIG_PATH", &override_path);
        }
        let resolved = Config::default_path()?;
        // SAFETY: test cleanup for process-local env mutation.
        unsafe {
            std::env::remove_var("UPKEEP_CONFIG_PATH");
        }
        assert_eq!(resolved, override_path);
        Ok(())
    }

    #[test]
    fn db_path_prefers_storage_config_over_env_override() -> Result<()> {
        let _guard = env_lock();
        let (_temp, path) =
            write_config("version = 1\n[storage]\ndb_path = \"/explicit/from-config.db\"\n")?;
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::set_var("UPKEEP_DB_PATH", "/from/env.db");
        }
        let config = Config::load(&path)?;
        // SAFETY: test cleanup for process-local env mutation.
        unsafe {
            std::env::remove_var("UPKEEP_DB_PATH");
        }
        assert_eq!(config.db_path()?, PathBuf::from("/explicit/from-config.db"));
        Ok(())
    }

    #[test]
    fn db_path_uses_env_override_when_storage_db_path_missing() -> Result<()> {
        let _guard = env_lock();
        let (_temp, path) = write_config("version = 1\n")?;
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::set_var("UPKEEP_DB_PATH", "/from/env-only.db");
        }
        let config = Config::load(&path)?;
        let resolved = config.db_path()?;
        // SAFETY: test cleanup for process-local env mutation.
        unsafe {
            std::env::remove_var("UPKEEP_DB_PATH");
        }
        assert_eq!(resolved, PathBuf::from("/from/env-only.db"));
        Ok(())
    }

    #[test]
    fn db_path_rejects_uri_style_storage_value() -> Result<()> {
        let (_temp, path) = write_config(
            "version = 1\n[storage]\ndb_path = \"https://evil.example/upkeep.db\"\n",
        )?;
        let error = Config::load(&path).expect_err("URI db_path should fail validation");
        assert!(error.to_string().contains("looks like a URI"));
        Ok(())
    }

    #[test]
    fn timeout_parses_ms_seconds_and_minutes() -> Result<()> {
        assert_eq!(parse_duration("500ms")?, Duration::from_millis(500));
        assert_eq!(parse_duration("5s")?, Duration::from_secs(5));
        assert_eq!(parse_duration("2m")?, Duration::from_secs(120));
        assert!(parse_duration("oops").is_err());
        Ok(())
    }

    #[test]
    fn timeout_rejects_non_positive_values_in_config() -> Result<()> {
        let (_temp, path) = write_config("version = 1\n[catalog]\ntimeout = \"0s\"\n")?;
        let error = Config::load(&path).expect_err("zero timeout should fail");
        assert!(error.to_string().contains("must be positive"));
        Ok(())
    }

    #[test]
    fn example_config_round_trips_to_defaults() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("config.toml");
        let example = Config::example_config(&path);
        assert!(example.contains("[storage]"));
        assert!(example.contains("[catalog]"));
        assert!(example.contains("[bundling]"));

        std::fs::write(&path, &example)?;
        let config = Config::load(&path)?;
        assert_eq!(config.bundling_policy(), BundlingPolicy::default());
        Ok(())
    }
}
