use std::result;

use http::StatusCode;

/// Boxed error produced by a [`Transport`](crate::Transport).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The target URI carries no userinfo. Callers usually fall back to an
    /// unauthenticated request.
    #[error("credentials to perform digest authentication are missing")]
    MissingCredentials,
    #[error("failed to parse WWW-Authenticate challenge: {0}")]
    Parse(#[from] ParseError),
    #[error("unsupported digest algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("unsupported qop: {0}")]
    UnsupportedQop(String),
    #[error("challenge lacks the {0} parameter")]
    MissingChallengeParam(&'static str),
    #[error("failed to generate client nonce: {0}")]
    Randomness(#[from] rand::Error),
    #[error("unexpected status ({status}) or empty WWW-Authenticate header")]
    UnexpectedChallenge { status: StatusCode },
    #[error("{context}: {source}")]
    Transport {
        context: &'static str,
        #[source]
        source: BoxError,
    },
    #[error("request cancelled")]
    Cancelled,
    #[error("invalid request URI: {0}")]
    InvalidUri(String),
    /// The computed `Authorization` value contains bytes not allowed in a
    /// header, e.g. control characters echoed from the challenge.
    #[error("invalid Authorization header value")]
    InvalidHeader(#[from] http::header::InvalidHeaderValue),
}

impl Error {
    pub fn is_missing_credentials(&self) -> bool {
        matches!(self, Error::MissingCredentials)
    }

    pub(crate) fn transport(context: &'static str, source: BoxError) -> Self {
        Error::Transport { context, source }
    }
}

/// Malformed `WWW-Authenticate` header. Positions count characters of the
/// parameter list, i.e. after the `Digest` scheme and its trailing spaces.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("header does not start with the Digest scheme")]
    BadPrefix,
    #[error("header is too long ({len} characters)")]
    TooLong { len: usize },
    #[error("duplicated key at pos {pos}: {key}")]
    DuplicateKey { key: String, pos: usize },
    #[error("unexpected character at pos {pos}, state {state}: {ch:?}")]
    UnexpectedChar {
        ch: char,
        pos: usize,
        state: String,
    },
    #[error("parser finished at end of string in invalid state {state}")]
    UnexpectedEnd { state: String },
}

pub type Result<T> = result::Result<T, Error>;
