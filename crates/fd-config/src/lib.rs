//! Layered YAML configuration for FreightDesk.
//!
//! Config files are merged in order (earlier = base, later = override),
//! converted to JSON, checked for literal secrets, canonicalized and hashed.
//! Secrets themselves never live in YAML: the `gateway.keys_env` section
//! names environment variables, resolved once at startup by
//! [`secrets::resolve_gateway_secrets`].
//!
//! Recognized keys:
//!
//! | key                               | meaning                                     |
//! |-----------------------------------|---------------------------------------------|
//! | `app.base_url`                    | public origin; overrides host detection     |
//! | `gateway.environment`             | `sandbox` (UAT) or `production`             |
//! | `gateway.host`                    | API host override (proxies, tests)          |
//! | `gateway.timeout_secs`            | outbound request timeout                    |
//! | `gateway.keys_env.merchant_id`    | env var NAME holding the merchant id        |
//! | `gateway.keys_env.salt_key`       | env var NAME holding the salt key           |
//! | `gateway.keys_env.salt_index`     | env var NAME holding the salt index         |

pub mod secrets;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs;

pub use secrets::{resolve_gateway_secrets, ResolvedGatewaySecrets};

/// Env var holding comma-separated config paths for the daemon.
pub const ENV_CONFIG_PATHS: &str = "FD_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/defaults/base.yaml";

/// Known secret-like prefixes. If any leaf string value in the effective
/// config starts with one of these, loading aborts with CONFIG_SECRET_DETECTED.
const SECRET_PREFIXES: &[&str] = &[
    "sk-",        // OpenAI style
    "sk_live",    // Stripe live
    "sk_test",    // Stripe test
    "rzp_live",   // Razorpay live
    "rzp_test",   // Razorpay test
    "AKIA",       // AWS access key ID
    "-----BEGIN", // PEM private keys
    "ghp_",       // GitHub PAT
    "glpat-",     // GitLab PAT
    "xoxb-",      // Slack bot token
];

/// JSON-pointer prefixes the daemon actually reads. Anything else in the
/// merged config is reported as unused.
const CONSUMED_POINTERS: &[&str] = &[
    "/app/base_url",
    "/gateway/environment",
    "/gateway/host",
    "/gateway/timeout_secs",
    "/gateway/keys_env/merchant_id",
    "/gateway/keys_env/salt_key",
    "/gateway/keys_env/salt_index",
];

// ---------------------------------------------------------------------------
// Typed view
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayEnvironment {
    /// PhonePe UAT sandbox (salt-key test credentials).
    #[default]
    Sandbox,
    Production,
}

impl GatewayEnvironment {
    pub fn is_sandbox(&self) -> bool {
        matches!(self, GatewayEnvironment::Sandbox)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySection {
    pub environment: GatewayEnvironment,
    pub host: Option<String>,
    pub timeout_secs: u64,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            environment: GatewayEnvironment::Sandbox,
            host: None,
            timeout_secs: 15,
        }
    }
}

/// Non-secret settings, deserialized from the merged config JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub gateway: GatewaySection,
}

impl AppConfig {
    pub fn from_json(config_json: &Value) -> Result<Self> {
        let cfg: AppConfig =
            serde_json::from_value(config_json.clone()).context("config shape invalid")?;
        if cfg.gateway.timeout_secs == 0 {
            bail!("CONFIG_INVALID: gateway.timeout_secs must be > 0");
        }
        if let Some(base) = cfg.app.base_url.as_deref() {
            let b = base.trim();
            if !(b.is_empty() || b.starts_with("http://") || b.starts_with("https://")) {
                bail!("CONFIG_INVALID: app.base_url must start with http:// or https://");
            }
        }
        Ok(cfg)
    }

    /// `app.base_url` if set and non-blank.
    pub fn base_url(&self) -> Option<&str> {
        self.app
            .base_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Unused-key report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnusedKeyReport {
    /// Minimal set of unused leaf pointers (sorted)
    pub unused_leaf_pointers: Vec<String>,
}

impl UnusedKeyReport {
    pub fn is_clean(&self) -> bool {
        self.unused_leaf_pointers.is_empty()
    }
}

/// Leaf pointers in `config_json` that no FreightDesk component reads.
pub fn report_unused_keys(config_json: &Value) -> UnusedKeyReport {
    let consumed: BTreeSet<String> = CONSUMED_POINTERS
        .iter()
        .map(|p| normalize_pointer(p))
        .collect();

    let mut leaves: Vec<String> = Vec::new();
    collect_leaf_pointers(config_json, "", &mut leaves);

    let mut unused: Vec<String> = leaves
        .into_iter()
        .filter(|lp| !consumed.iter().any(|cp| is_prefix_pointer(cp, lp)))
        // An empty document has the single leaf "/"; nothing to report.
        .filter(|lp| lp != "/")
        .collect();
    unused.sort();
    unused.dedup();

    UnusedKeyReport {
        unused_leaf_pointers: unused,
    }
}

/// Normalize JSON pointer:
/// - must begin with "/"
/// - no trailing "/" unless it's just "/"
fn normalize_pointer(p: &str) -> String {
    let mut s = p.trim().to_string();
    if s.is_empty() {
        return "/".to_string();
    }
    if !s.starts_with('/') {
        s.insert(0, '/');
    }
    while s.ends_with('/') && s.len() > 1 {
        s.pop();
    }
    s
}

/// "/a/b" consumes "/a/b" and "/a/b/c" but NOT "/a/bc".
fn is_prefix_pointer(prefix: &str, leaf: &str) -> bool {
    if prefix == "/" || leaf == prefix {
        return true;
    }
    leaf.starts_with(prefix)
        && leaf
            .get(prefix.len()..prefix.len() + 1)
            .map(|c| c == "/")
            .unwrap_or(false)
}

fn collect_leaf_pointers(v: &Value, prefix: &str, out: &mut Vec<String>) {
    match v {
        Value::Object(map) if !map.is_empty() => {
            for (k, vv) in map.iter() {
                let next = format!("{}/{}", prefix, escape_pointer_token(k));
                collect_leaf_pointers(vv, &next, out);
            }
        }
        Value::Array(arr) if !arr.is_empty() => {
            for (i, vv) in arr.iter().enumerate() {
                let next = format!("{}/{}", prefix, i);
                collect_leaf_pointers(vv, &next, out);
            }
        }
        _ => {
            let p = if prefix.is_empty() {
                "/".to_string()
            } else {
                prefix.to_string()
            };
            out.push(p);
        }
    }
}

fn escape_pointer_token(s: &str) -> String {
    s.replace('~', "~0").replace('/', "~1")
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut docs: Vec<String> = Vec::new();
    for p in paths {
        let raw =
            fs::read_to_string(p).with_context(|| format!("failed to read yaml path: {p}"))?;
        docs.push(raw);
    }

    let doc_refs: Vec<&str> = docs.iter().map(|s| s.as_str()).collect();
    load_layered_yaml_from_strings(&doc_refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = serde_json::json!({});
    for raw in yaml_docs {
        let v_yaml: serde_yaml::Value = serde_yaml::from_str(raw).context("invalid yaml")?;
        let v_json = serde_json::to_value(v_yaml).context("yaml->json conversion failed")?;
        // An empty YAML document parses as null; treat it as "no overrides".
        if v_json.is_null() {
            continue;
        }
        merged = deep_merge(merged, v_json);
    }

    enforce_no_secret_literals(&merged)?;

    // serde_json's default Map is ordered by key, so this is already canonical.
    let canonical_json = serde_json::to_string(&merged).context("canonical json serialize failed")?;
    let config_hash = sha256_hex(canonical_json.as_bytes());
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

/// Paths from `FD_CONFIG` (comma-separated), else the default base file.
pub fn config_paths_from_env() -> Vec<String> {
    match std::env::var(ENV_CONFIG_PATHS) {
        Ok(v) if !v.trim().is_empty() => v
            .split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect(),
        _ => vec![DEFAULT_CONFIG_PATH.to_string()],
    }
}

fn deep_merge(a: Value, b: Value) -> Value {
    match (a, b) {
        (Value::Object(mut a_map), Value::Object(b_map)) => {
            for (k, b_val) in b_map {
                let a_val = a_map.remove(&k).unwrap_or(Value::Null);
                a_map.insert(k, deep_merge(a_val, b_val));
            }
            Value::Object(a_map)
        }
        (_, b_other) => b_other,
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn enforce_no_secret_literals(v: &Value) -> Result<()> {
    let mut leaves = Vec::new();
    collect_leaf_pointers(v, "", &mut leaves);

    for ptr in leaves {
        if let Some(s) = v.pointer(&ptr).and_then(Value::as_str) {
            if looks_like_secret(s) {
                bail!("CONFIG_SECRET_DETECTED leaf={} value=REDACTED", ptr);
            }
        }
    }
    Ok(())
}

fn looks_like_secret(s: &str) -> bool {
    let t = s.trim();
    if t.len() < 8 {
        return false;
    }
    SECRET_PREFIXES.iter().any(|p| t.starts_with(p))
}
