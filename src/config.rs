//! Digest auth configuration.
//!
//! Deserializable from any serde format, or loaded from `DIGEST_AUTH_*`
//! environment variables.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::hooks::{NonceExpirationSpoof, HIKVISION_SPOOF_NONCE_EXPIRATION};
use crate::policy::NonceReusePolicy;
use crate::requestor::Requestor;
use crate::transport::Transport;

/// Digest auth settings.
///
/// # Examples
///
/// ```
/// use digest_requestor::DigestAuthConfig;
///
/// let config: DigestAuthConfig =
///     serde_json::from_str(r#"{"allowNonceReuse": true, "nonceReuseTimeout": 300}"#).unwrap();
/// assert!(config.enabled);
/// assert!(config.per_host_cache);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DigestAuthConfig {
    /// When false, no requestor is built and callers skip digest auth entirely.
    pub enabled: bool,
    /// Keep one auth state per host for reuse.
    pub per_host_cache: bool,
    pub allow_nonce_reuse: bool,
    /// Seconds a cached state may be reused, `0` for no limit.
    pub nonce_reuse_timeout: u64,
    /// Device-specific extensions, e.g. `hikvision_spoof_nonce_expiration`.
    pub modules: Vec<String>,
}

impl Default for DigestAuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            per_host_cache: true,
            allow_nonce_reuse: false,
            nonce_reuse_timeout: 0,
            modules: Vec::new(),
        }
    }
}

impl DigestAuthConfig {
    /// Load configuration from environment variables, falling back to defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(v) = lookup("DIGEST_AUTH_ENABLED") {
            config.enabled = parse_flag(&v);
        }
        if let Some(v) = lookup("DIGEST_AUTH_PER_HOST_CACHE") {
            config.per_host_cache = parse_flag(&v);
        }
        if let Some(v) = lookup("DIGEST_AUTH_ALLOW_NONCE_REUSE") {
            config.allow_nonce_reuse = parse_flag(&v);
        }
        if let Some(v) = lookup("DIGEST_AUTH_NONCE_REUSE_TIMEOUT") {
            match v.trim().parse() {
                Ok(secs) => config.nonce_reuse_timeout = secs,
                Err(e) => warn!(value = %v, error = %e, "ignoring invalid DIGEST_AUTH_NONCE_REUSE_TIMEOUT"),
            }
        }
        if let Some(v) = lookup("DIGEST_AUTH_MODULES") {
            config.modules = v
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_owned)
                .collect();
        }

        config
    }

    pub fn nonce_reuse_policy(&self) -> NonceReusePolicy {
        match (self.allow_nonce_reuse, self.nonce_reuse_timeout) {
            (false, _) => NonceReusePolicy::Never,
            (true, 0) => NonceReusePolicy::Always,
            (true, secs) => NonceReusePolicy::WithinTimeout(Duration::from_secs(secs)),
        }
    }

    /// Build a [`Requestor`] over `transport`, or `None` when disabled.
    pub fn build_requestor<T: Transport>(&self, transport: T) -> Option<Requestor<T>> {
        if !self.enabled {
            return None;
        }

        let mut requestor =
            Requestor::new(transport).with_nonce_reuse_policy(self.nonce_reuse_policy());
        if !self.per_host_cache {
            requestor = requestor.without_cache();
        }

        for module in &self.modules {
            match module.as_str() {
                // only useful when cached states are reused
                HIKVISION_SPOOF_NONCE_EXPIRATION if self.allow_nonce_reuse => {
                    requestor = requestor.with_before_persist_state(NonceExpirationSpoof::default());
                }
                HIKVISION_SPOOF_NONCE_EXPIRATION => {}
                unknown => warn!(module = %unknown, "ignoring unknown digest auth module"),
            }
        }

        Some(requestor)
    }
}

fn parse_flag(v: &str) -> bool {
    let v = v.trim();
    v == "1" || v.eq_ignore_ascii_case("true")
}
