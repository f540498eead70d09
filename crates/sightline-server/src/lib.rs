//! Server assembly for Sightline: configuration, store options, the HTTP
//! application and the retention sweep.

pub mod retention;

use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use axum::Router;
use serde::Deserialize;
use sightline_api::{ApiState, AuthConfig};
use sightline_core::{ingest::IngestPolicy, link::Site, store::VisitStore};
use sightline_store_sqlite::StoreOptions;
use tower_http::trace::TraceLayer;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `SIGHTLINE_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:               String,
  #[serde(default = "default_port")]
  pub port:               u16,
  #[serde(default = "default_store_path")]
  pub store_path:         PathBuf,
  /// Absolute base URL of the tracked site, e.g. `https://blog.example/`.
  pub site_url:           String,
  /// Log storage error detail.
  #[serde(default)]
  pub debug:              bool,
  pub auth_username:      String,
  pub auth_password_hash: String,
  #[serde(default)]
  pub policy:             IngestPolicy,
  #[serde(default)]
  pub retention:          RetentionConfig,
  #[serde(default)]
  pub cache:              CacheConfig,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct RetentionConfig {
  /// Seconds between sweeps.
  pub interval_secs: u64,
  /// Visits older than this many days are deleted.
  pub expiry_days:   u32,
}

impl Default for RetentionConfig {
  fn default() -> Self { Self { interval_secs: 2 * 60 * 60, expiry_days: 7 } }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
  pub capacity:        usize,
  pub report_ttl_secs: u64,
}

impl Default for CacheConfig {
  fn default() -> Self { Self { capacity: 1024, report_ttl_secs: 15 * 60 } }
}

fn default_host() -> String { "127.0.0.1".to_string() }

fn default_port() -> u16 { 8080 }

fn default_store_path() -> PathBuf { PathBuf::from("sightline.db") }

impl ServerConfig {
  /// Layer the optional file at `path` under `SIGHTLINE_*` environment
  /// variables. Nested keys use `__`, e.g. `SIGHTLINE_RETENTION__EXPIRY_DAYS`.
  pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("SIGHTLINE")
          .prefix_separator("_")
          .separator("__")
          .try_parsing(true),
      )
      .build()?
      .try_deserialize()
  }

  pub fn store_options(&self) -> sightline_core::Result<StoreOptions> {
    let mut options = StoreOptions::new(Site::new(&self.site_url)?);
    options.policy = self.policy;
    options.cache_capacity = self.cache.capacity;
    options.report_ttl = Duration::from_secs(self.cache.report_ttl_secs);
    Ok(options)
  }

  pub fn auth(&self) -> AuthConfig {
    AuthConfig {
      username:      self.auth_username.clone(),
      password_hash: self.auth_password_hash.clone(),
    }
  }
}

// ─── Application ──────────────────────────────────────────────────────────────

/// The full HTTP application: API routes plus request tracing.
pub fn app<S>(store: Arc<S>, config: &ServerConfig) -> Router
where
  S: VisitStore + 'static,
{
  let state = ApiState { store, auth: Arc::new(config.auth()), debug: config.debug };
  sightline_api::api_router(state).layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
  use std::io::Write as _;

  use sightline_core::ingest::DevicePolicy;

  use super::*;

  fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
  }

  #[test]
  fn minimal_config_fills_defaults() {
    let file = write_config(
      r#"
site_url           = "https://blog.test/"
auth_username      = "admin"
auth_password_hash = "$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA"
"#,
    );
    let cfg = ServerConfig::load(file.path()).unwrap();
    assert_eq!(cfg.port, 8080);
    assert_eq!(cfg.retention, RetentionConfig { interval_secs: 7200, expiry_days: 7 });
    assert_eq!(cfg.policy.first_contact, DevicePolicy::Mint);
    assert!(!cfg.debug);

    let options = cfg.store_options().unwrap();
    assert_eq!(options.site.host(), "blog.test");
    assert_eq!(options.report_ttl, Duration::from_secs(900));
  }

  #[test]
  fn nested_sections_override_defaults() {
    let file = write_config(
      r#"
site_url           = "https://blog.test/"
auth_username      = "admin"
auth_password_hash = "x"
debug              = true

[policy]
unknown_token = "reject"

[retention]
expiry_days = 30

[cache]
capacity = 16
"#,
    );
    let cfg = ServerConfig::load(file.path()).unwrap();
    assert!(cfg.debug);
    assert_eq!(cfg.policy.unknown_token, DevicePolicy::Reject);
    assert_eq!(cfg.policy.first_contact, DevicePolicy::Mint);
    assert_eq!(cfg.retention.expiry_days, 30);
    assert_eq!(cfg.retention.interval_secs, 7200);
    assert_eq!(cfg.cache.capacity, 16);
    assert_eq!(cfg.cache.report_ttl_secs, 900);
  }

  #[test]
  fn bad_site_url_is_rejected() {
    let file = write_config(
      "site_url = \"not a url\"\nauth_username = \"a\"\nauth_password_hash = \"b\"\n",
    );
    let cfg = ServerConfig::load(file.path()).unwrap();
    assert!(cfg.store_options().is_err());
  }
}
