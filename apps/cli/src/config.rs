use std::{collections::HashMap, fs, path::Path, time::Duration};

use anyhow::{bail, Context, Result};
use client_core::{AnomalyPolicy, RetryPolicy, DEFAULT_SESSION_KEY};
use shared::codec::{ContractTarget, DEFAULT_FUNCTION, DEFAULT_MODULE};

pub const DEFAULT_CONFIG_FILE: &str = "calc.toml";

const SETTING_KEYS: &[&str] = &[
    "rpc_url",
    "signer_url",
    "sender_address",
    "package_id",
    "module",
    "function",
    "database_url",
    "session_key",
    "settlement_poll_attempts",
    "settlement_poll_interval_ms",
    "request_timeout_secs",
    "anomaly_policy",
];

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub rpc_url: String,
    pub signer_url: String,
    pub sender_address: Option<String>,
    pub package_id: String,
    pub module: String,
    pub function: String,
    pub database_url: String,
    pub session_key: String,
    pub settlement_poll_attempts: u32,
    pub settlement_poll_interval_ms: u64,
    pub request_timeout_secs: u64,
    pub anomaly_policy: AnomalyPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rpc_url: "https://api.testnet.iota.cafe".into(),
            signer_url: "http://127.0.0.1:8787".into(),
            sender_address: None,
            package_id: "0x79b7453abe063fbc396bba3c125c9321fc2f3767af3884e4f2ca713c1c93c61d"
                .into(),
            module: DEFAULT_MODULE.into(),
            function: DEFAULT_FUNCTION.into(),
            database_url: "sqlite://./data/calc.db".into(),
            session_key: DEFAULT_SESSION_KEY.into(),
            settlement_poll_attempts: 30,
            settlement_poll_interval_ms: 2_000,
            request_timeout_secs: 30,
            anomaly_policy: AnomalyPolicy::Absorb,
        }
    }
}

impl Settings {
    pub fn contract_target(&self) -> ContractTarget {
        ContractTarget {
            package: self.package_id.clone(),
            module: self.module.clone(),
            function: self.function.clone(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.settlement_poll_attempts.max(1),
            interval: Duration::from_millis(self.settlement_poll_interval_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        let value = value.trim();
        match key {
            "rpc_url" => self.rpc_url = value.to_string(),
            "signer_url" => self.signer_url = value.to_string(),
            "sender_address" => {
                self.sender_address = (!value.is_empty()).then(|| value.to_string())
            }
            "package_id" => self.package_id = value.to_string(),
            "module" => self.module = value.to_string(),
            "function" => self.function = value.to_string(),
            "database_url" => self.database_url = normalize_database_url(value),
            "session_key" => self.session_key = value.to_string(),
            "settlement_poll_attempts" => {
                self.settlement_poll_attempts = parse_number(key, value)?
            }
            "settlement_poll_interval_ms" => {
                self.settlement_poll_interval_ms = parse_number(key, value)?
            }
            "request_timeout_secs" => self.request_timeout_secs = parse_number(key, value)?,
            "anomaly_policy" => {
                self.anomaly_policy = value
                    .parse()
                    .with_context(|| format!("invalid value for {key}"))?
            }
            _ => {}
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    match value.parse::<T>() {
        Ok(parsed) => Ok(parsed),
        Err(_) => bail!("invalid value for {key}: '{value}' is not a number"),
    }
}

/// Defaults, then the config file, then `CALC_*` and `APP__*` variables.
/// A missing default `calc.toml` is fine; a missing explicit file is not.
pub fn load_settings(config_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();

    let (path, required) = match config_path {
        Some(path) => (path, true),
        None => (Path::new(DEFAULT_CONFIG_FILE), false),
    };
    match fs::read_to_string(path) {
        Ok(raw) => apply_file(&mut settings, &raw)
            .with_context(|| format!("failed to load config file '{}'", path.display()))?,
        Err(err) if required => {
            return Err(err)
                .with_context(|| format!("failed to read config file '{}'", path.display()))
        }
        Err(_) => {}
    }

    apply_env(&mut settings, |name| std::env::var(name).ok())?;
    Ok(settings)
}

pub fn apply_file(settings: &mut Settings, raw: &str) -> Result<()> {
    let file_cfg = toml::from_str::<HashMap<String, toml::Value>>(raw)?;
    for key in SETTING_KEYS {
        let Some(value) = file_cfg.get(*key) else {
            continue;
        };
        let value = match value {
            toml::Value::String(value) => value.clone(),
            toml::Value::Integer(value) => value.to_string(),
            other => bail!("unsupported value for {key}: {other}"),
        };
        settings.apply(key, &value)?;
    }
    Ok(())
}

/// `APP__<KEY>` overrides `CALC_<KEY>`.
pub fn apply_env(
    settings: &mut Settings,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    for key in SETTING_KEYS {
        let upper = key.to_ascii_uppercase();
        if let Some(value) = lookup(&format!("CALC_{upper}")) {
            settings.apply(key, &value)?;
        }
        if let Some(value) = lookup(&format!("APP__{upper}")) {
            settings.apply(key, &value)?;
        }
    }
    Ok(())
}

pub fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:")
        || raw_database_url.starts_with("sqlite://")
        || raw_database_url.contains("://")
    {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        let path = path.replace('\\', "/");
        return format!("sqlite://{path}");
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
