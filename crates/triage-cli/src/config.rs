// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use triage_llm::{ClientConfig, DEFAULT_BASE_URL, DEFAULT_MODEL};
use url::Url;

pub const APP_NAME: &str = "triage";
const CONFIG_VERSION: i64 = 1;
const DEFAULT_API_KEY_ENV: &str = "API_KEY";
const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub version: i64,
    #[serde(default)]
    pub llm: Llm,
    #[serde(default)]
    pub log: Log,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            llm: Llm::default(),
            log: Log::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Llm {
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub api_key_env: Option<String>,
    pub timeout: Option<String>,
}

impl Default for Llm {
    fn default() -> Self {
        Self {
            base_url: Some(DEFAULT_BASE_URL.to_owned()),
            model: Some(DEFAULT_MODEL.to_owned()),
            api_key_env: Some(DEFAULT_API_KEY_ENV.to_owned()),
            timeout: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Log {
    pub filter: Option<String>,
    pub file: Option<String>,
}

impl Default for Log {
    fn default() -> Self {
        Self {
            filter: Some(DEFAULT_LOG_FILTER.to_owned()),
            file: None,
        }
    }
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        if let Some(path) = env::var_os("TRIAGE_CONFIG_PATH") {
            return Ok(PathBuf::from(path));
        }

        let config_root = dirs::config_dir().ok_or_else(|| {
            anyhow!("cannot resolve config directory; set TRIAGE_CONFIG_PATH to the config file")
        })?;
        Ok(config_root.join(APP_NAME).join("config.toml"))
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
                    "config file {} is not versioned. Add `version = 1` and put values under [llm] and [log]",
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
        if let Some(base_url) = &self.llm.base_url {
            let parsed = Url::parse(base_url.trim_end_matches('/')).with_context(|| {
                format!(
                    "llm.base_url in {} is not a valid URL: {base_url:?}",
                    path.display()
                )
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                bail!(
                    "llm.base_url in {} must use http or https, got {base_url:?}",
                    path.display()
                );
            }
        }

        if let Some(model) = &self.llm.model
            && model.trim().is_empty()
        {
            bail!("llm.model in {} must not be empty", path.display());
        }

        if let Some(key_env) = &self.llm.api_key_env
            && key_env.trim().is_empty()
        {
            bail!("llm.api_key_env in {} must not be empty", path.display());
        }

        if let Some(timeout) = &self.llm.timeout {
            let parsed = parse_duration(timeout)
                .with_context(|| format!("llm.timeout in {}", path.display()))?;
            if parsed <= Duration::ZERO {
                bail!(
                    "llm.timeout in {} must be positive, got {}",
                    path.display(),
                    timeout
                );
            }
        }

        if let Some(filter) = &self.log.filter {
            EnvFilter::try_new(filter).with_context(|| {
                format!(
                    "log.filter in {} is not a valid filter: {filter:?}",
                    path.display()
                )
            })?;
        }

        Ok(())
    }

    pub fn llm_base_url(&self) -> &str {
        self.llm
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
    }

    pub fn llm_model(&self) -> &str {
        self.llm.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    pub fn llm_api_key_env(&self) -> &str {
        self.llm
            .api_key_env
            .as_deref()
            .unwrap_or(DEFAULT_API_KEY_ENV)
    }

    /// Reads the key from the configured variable. An unset variable yields an
    /// empty key; the service rejects the request.
    pub fn llm_api_key(&self) -> String {
        env::var(self.llm_api_key_env()).unwrap_or_default()
    }

    pub fn llm_timeout(&self) -> Result<Option<Duration>> {
        self.llm.timeout.as_deref().map(parse_duration).transpose()
    }

    pub fn client_config(&self) -> Result<ClientConfig> {
        Ok(ClientConfig {
            base_url: self.llm_base_url().to_owned(),
            model: self.llm_model().to_owned(),
            api_key: self.llm_api_key(),
            timeout: self.llm_timeout()?,
        })
    }

    pub fn log_filter(&self) -> &str {
        self.log.filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    }

    pub fn log_file(&self) -> Result<PathBuf> {
        if let Some(path) = &self.log.file {
            return Ok(PathBuf::from(path));
        }

        let data_root = dirs::data_dir().ok_or_else(|| {
            anyhow!("cannot resolve data directory; set [log].file in the config")
        })?;
        Ok(data_root.join(APP_NAME).join("triage.log"))
    }

    pub fn example_config(path: &Path) -> String {
        format!(
            "# triage config\n# Place this file at: {}\n\nversion = 1\n\n[llm]\nbase_url = \"{}\"\nmodel = \"{}\"\n# Name of the environment variable holding the API key\napi_key_env = \"{}\"\n# Optional. No timeout when unset\n# timeout = \"30s\"\n\n[log]\n# RUST_LOG overrides this\nfilter = \"{}\"\n# Optional. Default is platform data dir (for example ~/.local/share/triage/triage.log)\n# file = \"/absolute/path/to/triage.log\"\n",
            path.display(),
            DEFAULT_BASE_URL,
            DEFAULT_MODEL,
            DEFAULT_API_KEY_ENV,
            DEFAULT_LOG_FILTER,
        )
    }
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
        let secs = mins
            .checked_mul(60)
            .ok_or_else(|| anyhow!("timeout duration {raw:?} is too large"))?;
        return Ok(Duration::from_secs(secs));
    }

    bail!("invalid duration {raw:?}; use one of: <N>ms, <N>s, <N>m (for example 500ms or 30s)")
}
