//! Deployer configuration: optional `flow-deployer.toml` plus environment overrides.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Config file looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "flow-deployer.toml";

/// Deployer configuration (TOML).
///
/// Every field has a default so an absent file is a valid configuration.
/// Environment variables override file values (see [`apply_env`]).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DeployerConfig {
    /// Metadata API version, `<major>.<minor>`.
    pub api_version: String,

    /// Ceiling shared by the structure-fix and deploy-fix budgets.
    pub max_iterations: u32,

    /// Seconds between deployment status polls.
    pub poll_interval_secs: u64,

    /// Status polls per deployment before the run times out.
    pub max_poll_cycles: u32,

    /// Directory for per-flow logs and document snapshots.
    pub logs_dir: PathBuf,

    pub salesforce: SalesforceConfig,
    pub model: ModelConfig,
}

/// Salesforce org credentials. Either a ready access token with its instance
/// URL, or the full OAuth password-grant set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SalesforceConfig {
    pub instance_url: Option<String>,
    pub access_token: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub security_token: Option<String>,
    pub consumer_key: Option<String>,
    pub consumer_secret: Option<String>,
}

/// OpenAI-compatible chat-completions endpoint used for repair and generation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ModelConfig {
    pub name: String,
    pub base_url: String,
    /// Leave unset to run without a model; repairs then report unavailable.
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

/// Password-grant credentials, borrowed from a validated [`SalesforceConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordGrant<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub security_token: &'a str,
    pub consumer_key: &'a str,
    pub consumer_secret: &'a str,
}

/// How the deployer obtains a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credentials<'a> {
    AccessToken {
        access_token: &'a str,
        instance_url: &'a str,
    },
    Password {
        grant: PasswordGrant<'a>,
        instance_url: Option<&'a str>,
    },
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: "gemini-2.5-flash".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
            api_key: None,
            timeout_secs: 120,
        }
    }
}

impl Default for DeployerConfig {
    fn default() -> Self {
        Self {
            api_version: "65.0".to_string(),
            max_iterations: 15,
            poll_interval_secs: 5,
            max_poll_cycles: 40,
            logs_dir: PathBuf::from("deploy_logs"),
            salesforce: SalesforceConfig::default(),
            model: ModelConfig::default(),
        }
    }
}

impl DeployerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(anyhow!("max_iterations must be > 0"));
        }
        if self.poll_interval_secs == 0 {
            return Err(anyhow!("poll_interval_secs must be > 0"));
        }
        if self.max_poll_cycles == 0 {
            return Err(anyhow!("max_poll_cycles must be > 0"));
        }
        if !is_api_version(&self.api_version) {
            return Err(anyhow!(
                "api_version must look like <major>.<minor>, got {:?}",
                self.api_version
            ));
        }
        if self.model.timeout_secs == 0 {
            return Err(anyhow!("model.timeout_secs must be > 0"));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl SalesforceConfig {
    /// Resolve which credential set is usable.
    ///
    /// A deployment cannot start without one, so this is checked before the
    /// retry loop begins.
    pub fn credentials(&self) -> Result<Credentials<'_>> {
        if let (Some(access_token), Some(instance_url)) =
            (non_empty(&self.access_token), non_empty(&self.instance_url))
        {
            return Ok(Credentials::AccessToken {
                access_token,
                instance_url,
            });
        }
        match (
            non_empty(&self.username),
            non_empty(&self.password),
            non_empty(&self.consumer_key),
            non_empty(&self.consumer_secret),
        ) {
            (Some(username), Some(password), Some(consumer_key), Some(consumer_secret)) => {
                Ok(Credentials::Password {
                    grant: PasswordGrant {
                        username,
                        password,
                        security_token: non_empty(&self.security_token).unwrap_or_default(),
                        consumer_key,
                        consumer_secret,
                    },
                    instance_url: non_empty(&self.instance_url),
                })
            }
            _ => Err(anyhow!(
                "missing Salesforce credentials: set SALESFORCE_ACCESS_TOKEN and \
                 SALESFORCE_INSTANCE_URL, or SALESFORCE_USERNAME, SALESFORCE_PASSWORD, \
                 SALESFORCE_CONSUMER_KEY and SALESFORCE_CONSUMER_SECRET"
            )),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn is_api_version(value: &str) -> bool {
    match value.split_once('.') {
        Some((major, minor)) => {
            !major.is_empty()
                && !minor.is_empty()
                && major.bytes().all(|b| b.is_ascii_digit())
                && minor.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `DeployerConfig::default()`. Validation is
/// left to the caller so environment overrides can be applied first.
pub fn load_config(path: &Path) -> Result<DeployerConfig> {
    if !path.exists() {
        return Ok(DeployerConfig::default());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}

/// Apply environment overrides through `lookup` (usually `std::env::var`).
pub fn apply_env<F>(cfg: &mut DeployerConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

    if let Some(value) = get("SALESFORCE_API_VERSION") {
        cfg.api_version = value.trim().to_string();
    }
    if let Some(value) = get("MAX_DEPLOY_ITERATIONS") {
        cfg.max_iterations = parse_number("MAX_DEPLOY_ITERATIONS", &value)?;
    }
    if let Some(value) = get("POLL_INTERVAL") {
        cfg.poll_interval_secs = parse_number("POLL_INTERVAL", &value)?;
    }
    if let Some(value) = get("MAX_POLL_CYCLES") {
        cfg.max_poll_cycles = parse_number("MAX_POLL_CYCLES", &value)?;
    }
    if let Some(value) = get("DEPLOY_LOGS_DIR") {
        cfg.logs_dir = PathBuf::from(value);
    }

    let sf = &mut cfg.salesforce;
    for (key, slot) in [
        ("SALESFORCE_INSTANCE_URL", &mut sf.instance_url),
        ("SALESFORCE_ACCESS_TOKEN", &mut sf.access_token),
        ("SALESFORCE_USERNAME", &mut sf.username),
        ("SALESFORCE_PASSWORD", &mut sf.password),
        ("SALESFORCE_SECURITY_TOKEN", &mut sf.security_token),
        ("SALESFORCE_CONSUMER_KEY", &mut sf.consumer_key),
        ("SALESFORCE_CONSUMER_SECRET", &mut sf.consumer_secret),
    ] {
        if let Some(value) = get(key) {
            *slot = Some(value);
        }
    }

    if let Some(value) = get("GEMINI_API_KEY") {
        cfg.model.api_key = Some(value);
    }
    if let Some(value) = get("GEMINI_MODEL") {
        cfg.model.name = value;
    }
    if let Some(value) = get("GEMINI_BASE_URL") {
        cfg.model.base_url = value;
    }
    Ok(())
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| anyhow!("{key} must be a non-negative integer, got {value:?}"))
}

/// Load the file, apply the process environment, then validate.
pub fn resolve_config(path: &Path) -> Result<DeployerConfig> {
    let mut cfg = load_config(path)?;
    apply_env(&mut cfg, |key| std::env::var(key).ok())?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &DeployerConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

/// Write the default config to `path` unless it exists. `force` overwrites.
///
/// Returns whether the file was written.
pub fn init_config(path: &Path, force: bool) -> Result<bool> {
    if !force && path.exists() {
        return Ok(false);
    }
    write_config(path, &DeployerConfig::default())?;
    Ok(true)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
