//! Hooks run by the [`Requestor`](crate::Requestor) before it caches a state.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::warn;

use crate::digest::{AuthState, PARAM_NONCE};
use crate::transport::RequestContext;

/// Module name that enables [`NonceExpirationSpoof`] in the configuration.
pub const HIKVISION_SPOOF_NONCE_EXPIRATION: &str = "hikvision_spoof_nonce_expiration";

/// Called right before a state is stored in the per-host cache after a 2xx
/// authenticated response.
///
/// It runs on every store, including stores of reused states, so an
/// implementation meant for new states only has to check
/// [`AuthState::is_fresh`] itself.
///
/// The hook reads and writes parameters through [`AuthState::get`] and
/// [`AuthState::set`], each of which takes the state lock on its own. Another
/// request sharing the state may run between the two calls. That is accepted
/// here: the rewritten nonce stays valid whichever version wins.
pub trait BeforePersistState: Send + Sync {
    fn before_persist(&self, ctx: &RequestContext, state: &AuthState);
}

impl<F> BeforePersistState for F
where
    F: Fn(&RequestContext, &AuthState) + Send + Sync,
{
    fn before_persist(&self, ctx: &RequestContext, state: &AuthState) {
        self(ctx, state)
    }
}

/// Pushes the expiry embedded in Hikvision nonces far into the future.
///
/// Those nonces look like `<hash>:<unix_ms>` and the timestamp is not covered
/// by the hash, so rewriting it lets a cached nonce be reused well past the
/// device's own expiry.
#[derive(Debug, Clone)]
pub struct NonceExpirationSpoof {
    extend_by: Duration,
}

impl Default for NonceExpirationSpoof {
    fn default() -> Self {
        Self {
            extend_by: Duration::from_secs(60 * 60 * 24 * 365 * 10),
        }
    }
}

impl NonceExpirationSpoof {
    pub fn new(extend_by: Duration) -> Self {
        Self { extend_by }
    }

    fn spoofed(&self, nonce: &str) -> Option<String> {
        let (hash, expiration) = nonce.split_once(':')?;
        if expiration.is_empty() || !expiration.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        let expiration = (SystemTime::now() + self.extend_by)
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_millis());

        Some(format!("{}:{}", hash, expiration))
    }
}

impl BeforePersistState for NonceExpirationSpoof {
    fn before_persist(&self, ctx: &RequestContext, state: &AuthState) {
        // states that were already stored once are already patched
        if !state.is_fresh() {
            return;
        }

        let nonce = state.get(PARAM_NONCE).unwrap_or_default();
        match self.spoofed(&nonce) {
            Some(spoofed) => state.set(PARAM_NONCE, spoofed),
            None => {
                let _enter = ctx.span().enter();
                warn!(
                    module = HIKVISION_SPOOF_NONCE_EXPIRATION,
                    "module is registered for digest auth, but incompatible nonce was found"
                );
            }
        }
    }
}
