//! Config hash stability.
//!
//! GREEN when:
//! - the same inputs hash identically across calls,
//! - key order inside a YAML document does not affect the hash,
//! - a later layer overrides an earlier one and changes the hash.

use fd_config::{load_layered_yaml, load_layered_yaml_from_strings, AppConfig, GatewayEnvironment};

const BASE_YAML: &str = r#"
app:
  base_url: "https://desk.example.in"
gateway:
  environment: "sandbox"
  timeout_secs: 15
  keys_env:
    merchant_id: "PHONEPE_MERCHANT_ID"
    salt_key: "PHONEPE_SALT_KEY"
"#;

const BASE_YAML_REORDERED: &str = r#"
gateway:
  keys_env:
    salt_key: "PHONEPE_SALT_KEY"
    merchant_id: "PHONEPE_MERCHANT_ID"
  timeout_secs: 15
  environment: "sandbox"
app:
  base_url: "https://desk.example.in"
"#;

const PROD_OVERLAY: &str = r#"
gateway:
  environment: "production"
"#;

#[test]
fn same_input_produces_identical_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
    assert_eq!(a.canonical_json, b.canonical_json);
}

#[test]
fn key_order_does_not_change_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML_REORDERED]).unwrap();
    assert_eq!(
        a.config_hash, b.config_hash,
        "reordered keys must canonicalize to the same hash"
    );
}

#[test]
fn overlay_overrides_and_changes_hash() {
    let base = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let layered = load_layered_yaml_from_strings(&[BASE_YAML, PROD_OVERLAY]).unwrap();
    assert_ne!(base.config_hash, layered.config_hash);

    let cfg = AppConfig::from_json(&layered.config_json).unwrap();
    assert_eq!(cfg.gateway.environment, GatewayEnvironment::Production);
    // Untouched keys survive the merge.
    assert_eq!(cfg.base_url(), Some("https://desk.example.in"));
    assert_eq!(
        layered.config_json["gateway"]["keys_env"]["salt_key"],
        "PHONEPE_SALT_KEY"
    );
}

#[test]
fn empty_overlay_document_is_ignored() {
    let base = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let with_empty = load_layered_yaml_from_strings(&[BASE_YAML, ""]).unwrap();
    assert_eq!(base.config_hash, with_empty.config_hash);
}

#[test]
fn files_load_like_strings() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("base.yaml");
    let prod = dir.path().join("prod.yaml");
    std::fs::write(&base, BASE_YAML).unwrap();
    std::fs::write(&prod, PROD_OVERLAY).unwrap();

    let base_s = base.to_string_lossy().to_string();
    let prod_s = prod.to_string_lossy().to_string();
    let from_files = load_layered_yaml(&[base_s.as_str(), prod_s.as_str()]).unwrap();
    let from_strings = load_layered_yaml_from_strings(&[BASE_YAML, PROD_OVERLAY]).unwrap();
    assert_eq!(from_files.config_hash, from_strings.config_hash);
}

#[test]
fn missing_file_is_reported_by_path() {
    let err = load_layered_yaml(&["/definitely/not/here.yaml"]).unwrap_err();
    assert!(format!("{err:#}").contains("/definitely/not/here.yaml"));
}
