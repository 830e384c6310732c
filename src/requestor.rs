//! Authenticated GET with per-host nonce reuse.
//!
//! One call of [`Requestor::request`] runs through:
//!
//! ```text
//! cached state? ──no──> GET (no auth) ──2xx──> done
//!      │                    │
//!     yes                  401 + challenge
//!      │                    │
//!      └──────> GET + Authorization <──────────────┐
//!                     │                            │
//!      401, reused ───┼── salvage challenge ───────┘ (once)
//!                     │   └─ none: restart cold (once)
//!      2xx ───────────┴── hook, then cache
//! ```

use std::future::Future;
use std::sync::Arc;

use http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use http::uri::{Authority, Parts};
use http::{HeaderMap, HeaderValue, Response, StatusCode, Uri};
use tracing::{debug, warn, Instrument};

use crate::cache::AuthStateCache;
use crate::digest::{AuthState, Credentials};
use crate::hooks::BeforePersistState;
use crate::parser::DIGEST_SCHEME;
use crate::policy::NonceReusePolicy;
use crate::transport::{RequestContext, Transport};
use crate::{Error, Result};

/// Authenticated sends per pass: one with a reused state, one salvage.
const MAX_AUTH_ATTEMPTS: usize = 2;

/// Performs Digest-authenticated GET requests through a [`Transport`].
pub struct Requestor<T> {
    transport: T,
    cache: Option<AuthStateCache>,
    nonce_reuse_policy: NonceReusePolicy,
    before_persist_state: Option<Arc<dyn BeforePersistState>>,
}

enum Challenge<B> {
    /// The device answered without asking for credentials
    NotRequired(Response<B>),
    Required(AuthState),
}

impl<T: Transport> Requestor<T> {
    /// Requestor with its own per-host cache and [`NonceReusePolicy::Never`]
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            cache: Some(AuthStateCache::new()),
            nonce_reuse_policy: NonceReusePolicy::default(),
            before_persist_state: None,
        }
    }

    /// Use `cache` for per-host states, e.g. to share it between requestors
    pub fn with_cache(mut self, cache: AuthStateCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Disable the per-host cache. Without it no state is ever reused.
    pub fn without_cache(mut self) -> Self {
        self.cache = None;
        self
    }

    pub fn with_nonce_reuse_policy(mut self, policy: NonceReusePolicy) -> Self {
        self.nonce_reuse_policy = policy;
        self
    }

    pub fn with_before_persist_state(mut self, hook: impl BeforePersistState + 'static) -> Self {
        self.before_persist_state = Some(Arc::new(hook));
        self
    }

    pub fn cache(&self) -> Option<&AuthStateCache> {
        self.cache.as_ref()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// GET `uri`, authenticating with the credentials embedded in its userinfo.
    ///
    /// The credentials are stripped before anything goes on the wire. The
    /// caller owns the returned response body.
    ///
    /// # Errors
    ///
    /// [`Error::MissingCredentials`] when `uri` carries no userinfo; see
    /// [`request_or_fallback`](Self::request_or_fallback). Transport failures
    /// are never retried. [`Error::Cancelled`] when the context deadline passes.
    pub async fn request(&self, ctx: &RequestContext, uri: &Uri) -> Result<Response<T::Body>> {
        run_with_deadline(ctx, self.authenticated_get(ctx, uri)).await
    }

    /// Like [`request`](Self::request), but a URI without credentials is
    /// fetched unauthenticated instead of failing.
    pub async fn request_or_fallback(
        &self,
        ctx: &RequestContext,
        uri: &Uri,
    ) -> Result<Response<T::Body>> {
        match self.request(ctx, uri).await {
            Err(Error::MissingCredentials) => {
                {
                    let _enter = ctx.span().enter();
                    warn!(
                        uri = %uri,
                        "attempted to use digest auth with a URI that has no credentials in it"
                    );
                }
                run_with_deadline(ctx, async {
                    self.transport
                        .get(uri, HeaderMap::new())
                        .await
                        .map_err(|e| Error::transport("request failed", e))
                })
                .await
            }
            other => other,
        }
    }

    async fn authenticated_get(&self, ctx: &RequestContext, uri: &Uri) -> Result<Response<T::Body>> {
        let credentials = Credentials::from_uri(uri).ok_or(Error::MissingCredentials)?;
        let target = strip_credentials(uri)?;
        let host = target
            .authority()
            .map(|a| a.as_str().to_owned())
            .unwrap_or_default();
        let request_uri = target
            .path_and_query()
            .map_or("/", |pq| pq.as_str())
            .to_owned();

        // the second pass is a cold restart and skips the cache
        let mut cold = false;
        loop {
            let cached = if cold { None } else { self.reusable_state(&host, &target) };

            let mut state = match cached {
                Some(state) => state,
                None => match self.fetch_challenge(&target).await? {
                    Challenge::NotRequired(res) => return Ok(res),
                    Challenge::Required(state) => Arc::new(state),
                },
            };

            let mut attempts = 0;
            loop {
                attempts += 1;
                let res = self
                    .send_authenticated(&target, &request_uri, &credentials, &state)
                    .await?;

                let Some(cache) = &self.cache else {
                    return Ok(res);
                };

                let status = res.status();
                // a cold pass never holds a reused state
                if status == StatusCode::UNAUTHORIZED
                    && !cold
                    && !state.is_fresh()
                    && attempts < MAX_AUTH_ATTEMPTS
                {
                    warn!(
                        host = %host,
                        "digest auth state reuse attempt failed; if this happens often, lower the \
                         nonce reuse timeout or disable reuse, the device may not support it"
                    );
                    cache.remove_stale(&host, &state);

                    // salvage the challenge from this response to save a round trip
                    match challenge_from_response(&res).and_then(AuthState::from_challenge) {
                        Ok(fresh) => {
                            debug!(host = %host, "retrying with challenge from rejected reuse");
                            state = Arc::new(fresh);
                            continue;
                        }
                        Err(e) => {
                            debug!(host = %host, error = %e, "no usable challenge, restarting");
                            cold = true;
                            break;
                        }
                    }
                }

                if status.is_success() {
                    if let Some(hook) = &self.before_persist_state {
                        hook.before_persist(ctx, &state);
                    }
                    debug!(host = %host, nc = state.nonce_count(), "caching digest auth state");
                    cache.insert(&host, state);
                }

                return Ok(res);
            }
        }
    }

    /// Cached state for `host`, if the reuse policy allows it. A rejected
    /// state is evicted.
    fn reusable_state(&self, host: &str, target: &Uri) -> Option<Arc<AuthState>> {
        let cache = self.cache.as_ref()?;
        let state = cache.get(host)?;

        if self.nonce_reuse_policy.can_reuse(target, &state) {
            debug!(host = %host, nc = state.nonce_count(), "reusing cached digest auth state");
            Some(state)
        } else {
            debug!(host = %host, "reuse policy rejected cached state, evicting");
            cache.remove_stale(host, &state);
            None
        }
    }

    async fn fetch_challenge(&self, target: &Uri) -> Result<Challenge<T::Body>> {
        debug!(uri = %target, "fetching digest challenge");
        let res = self
            .transport
            .get(target, HeaderMap::new())
            .await
            .map_err(|e| Error::transport("challenge request failed", e))?;

        if res.status().is_success() {
            // auth seems to be disabled on the device
            return Ok(Challenge::NotRequired(res));
        }

        let challenge = challenge_from_response(&res)?;
        Ok(Challenge::Required(AuthState::from_challenge(challenge)?))
    }

    async fn send_authenticated(
        &self,
        target: &Uri,
        request_uri: &str,
        credentials: &Credentials,
        state: &AuthState,
    ) -> Result<Response<T::Body>> {
        let authorization = state.compute_response(request_uri, credentials)?;

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&authorization)?);

        self.transport
            .get(target, headers)
            .await
            .map_err(|e| Error::transport("request failed", e))
    }
}

async fn run_with_deadline<F, R>(ctx: &RequestContext, fut: F) -> Result<R>
where
    F: Future<Output = Result<R>>,
{
    let fut = fut.instrument(ctx.span().clone());
    match ctx.deadline() {
        Some(deadline) => tokio::time::timeout_at(deadline, fut)
            .await
            .map_err(|_| Error::Cancelled)?,
        None => fut.await,
    }
}

/// The Digest challenge of a 401 response. When several `WWW-Authenticate`
/// headers are present, the first Digest one wins.
fn challenge_from_response<B>(res: &Response<B>) -> Result<&str> {
    let unexpected = || Error::UnexpectedChallenge {
        status: res.status(),
    };

    if res.status() != StatusCode::UNAUTHORIZED {
        return Err(unexpected());
    }

    let values: Vec<&str> = res
        .headers()
        .get_all(WWW_AUTHENTICATE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .collect();

    values
        .iter()
        .find(|v| v.starts_with(DIGEST_SCHEME))
        .or_else(|| values.first())
        .copied()
        .ok_or_else(unexpected)
}

fn strip_credentials(uri: &Uri) -> Result<Uri> {
    let mut parts = Parts::from(uri.clone());
    if let Some(authority) = &parts.authority {
        if let Some((_, host)) = authority.as_str().rsplit_once('@') {
            let host: Authority = host
                .parse()
                .map_err(|e: http::uri::InvalidUri| Error::InvalidUri(e.to_string()))?;
            parts.authority = Some(host);
        }
    }
    Uri::from_parts(parts).map_err(|e| Error::InvalidUri(e.to_string()))
}
