//! Gateway secret resolution.
//!
//! # Contract
//! - Config YAML stores only **env var NAMES** under `gateway.keys_env`.
//! - At startup the daemon calls [`resolve_gateway_secrets`] once and hands
//!   the result to the gateway client constructor.
//! - `Debug` output redacts every value.
//! - Error messages reference the env var **NAME**, never the value.
//!
//! Merchant id and salt key are required. The salt index defaults to `"1"`
//! when its variable is unset, matching the provider's single-key setup.

use anyhow::{bail, Result};
use serde_json::Value;

pub const DEFAULT_MERCHANT_ID_VAR: &str = "PHONEPE_MERCHANT_ID";
pub const DEFAULT_SALT_KEY_VAR: &str = "PHONEPE_SALT_KEY";
pub const DEFAULT_SALT_INDEX_VAR: &str = "PHONEPE_SALT_INDEX";
pub const DEFAULT_SALT_INDEX: &str = "1";

/// PhonePe credentials resolved from the environment.
#[derive(Clone)]
pub struct ResolvedGatewaySecrets {
    pub merchant_id: String,
    pub salt_key: String,
    pub salt_index: String,
}

impl std::fmt::Debug for ResolvedGatewaySecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedGatewaySecrets")
            .field("merchant_id", &"<REDACTED>")
            .field("salt_key", &"<REDACTED>")
            .field("salt_index", &self.salt_index)
            .finish()
    }
}

struct GatewayEnvNames {
    merchant_id_var: String,
    salt_key_var: String,
    salt_index_var: String,
}

/// Read a non-empty string value at `pointer` from a JSON config.
fn read_str_at(config: &Value, pointer: &str) -> Option<String> {
    let s = config.pointer(pointer)?.as_str()?;
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// `None` if the variable is unset or blank.
fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    }
}

fn parse_env_names(config_json: &Value) -> GatewayEnvNames {
    GatewayEnvNames {
        merchant_id_var: read_str_at(config_json, "/gateway/keys_env/merchant_id")
            .unwrap_or_else(|| DEFAULT_MERCHANT_ID_VAR.to_string()),
        salt_key_var: read_str_at(config_json, "/gateway/keys_env/salt_key")
            .unwrap_or_else(|| DEFAULT_SALT_KEY_VAR.to_string()),
        salt_index_var: read_str_at(config_json, "/gateway/keys_env/salt_index")
            .unwrap_or_else(|| DEFAULT_SALT_INDEX_VAR.to_string()),
    }
}

/// Resolve gateway credentials named by `gateway.keys_env`.
///
/// # Errors
/// `SECRETS_MISSING` naming the first required variable that is unset or
/// empty; `SECRETS_INVALID` when the salt index is not a positive integer.
pub fn resolve_gateway_secrets(config_json: &Value) -> Result<ResolvedGatewaySecrets> {
    let names = parse_env_names(config_json);

    let Some(merchant_id) = resolve_env(&names.merchant_id_var) else {
        bail!(
            "SECRETS_MISSING: required env var '{}' (gateway merchant_id) is not set or empty",
            names.merchant_id_var
        );
    };
    let Some(salt_key) = resolve_env(&names.salt_key_var) else {
        bail!(
            "SECRETS_MISSING: required env var '{}' (gateway salt_key) is not set or empty",
            names.salt_key_var
        );
    };
    let salt_index =
        resolve_env(&names.salt_index_var).unwrap_or_else(|| DEFAULT_SALT_INDEX.to_string());
    if !salt_index.bytes().all(|b| b.is_ascii_digit()) || salt_index.parse::<u32>().ok() == Some(0)
    {
        bail!(
            "SECRETS_INVALID: env var '{}' (gateway salt_index) must be a positive integer",
            names.salt_index_var
        );
    }

    Ok(ResolvedGatewaySecrets {
        merchant_id,
        salt_key,
        salt_index,
    })
}
