use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use http::Uri;

use crate::digest::AuthState;

type ReuseFn = dyn Fn(&Uri, &AuthState) -> bool + Send + Sync;

/// Decides whether a cached [`AuthState`] may answer a new request instead
/// of fetching a fresh challenge.
///
/// Whether reuse actually works depends on the device; a rejected reuse
/// attempt costs one extra round trip.
#[derive(Clone, Default)]
pub enum NonceReusePolicy {
    Always,
    #[default]
    Never,
    /// Reusable until `created_at + timeout`
    WithinTimeout(Duration),
    Custom(Arc<ReuseFn>),
}

impl NonceReusePolicy {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&Uri, &AuthState) -> bool + Send + Sync + 'static,
    {
        NonceReusePolicy::Custom(Arc::new(f))
    }

    pub fn can_reuse(&self, uri: &Uri, state: &AuthState) -> bool {
        match self {
            NonceReusePolicy::Always => true,
            NonceReusePolicy::Never => false,
            NonceReusePolicy::WithinTimeout(timeout) => state
                .created_at()
                .checked_add(*timeout)
                .map_or(true, |deadline| Instant::now() < deadline),
            NonceReusePolicy::Custom(f) => f(uri, state),
        }
    }
}

impl fmt::Debug for NonceReusePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NonceReusePolicy::Always => f.write_str("Always"),
            NonceReusePolicy::Never => f.write_str("Never"),
            NonceReusePolicy::WithinTimeout(d) => f.debug_tuple("WithinTimeout").field(d).finish(),
            NonceReusePolicy::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}
