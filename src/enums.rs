use crate::{Error, Error::*, Result};
use std::fmt;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use digest::Digest;
use md5::Md5;

/// Digest algorithm named by the challenge's `algorithm` parameter
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
#[allow(non_camel_case_types)]
pub enum Algorithm {
    /// Plain MD5, also used when the challenge does not name an algorithm
    #[default]
    MD5,
    /// MD5 with the session variant of HA1
    MD5_SESS,
}

impl Algorithm {
    /// Resolve the `algorithm` parameter, treating an absent parameter like an empty one
    pub fn from_param(param: Option<&str>) -> Result<Self> {
        param.unwrap_or_default().parse()
    }

    /// Hex-encoded MD5 of the given bytes
    pub fn hash(self, bytes: &[u8]) -> String {
        hex::encode(Md5::digest(bytes))
    }

    pub fn hash_str(self, s: &str) -> String {
        self.hash(s.as_bytes())
    }

    pub fn is_sess(self) -> bool {
        self == Algorithm::MD5_SESS
    }
}

impl FromStr for Algorithm {
    type Err = Error;

    /// Parse from the format used in WWW-Authenticate, ignoring case
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "" | "md5" => Ok(Algorithm::MD5),
            "md5-sess" => Ok(Algorithm::MD5_SESS),
            _ => Err(UnsupportedAlgorithm(s.into())),
        }
    }
}

impl Display for Algorithm {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Algorithm::MD5 => "MD5",
            Algorithm::MD5_SESS => "MD5-sess",
        })
    }
}

/// QOP field values
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[allow(non_camel_case_types)]
pub enum Qop {
    AUTH,
    /// Integrity protection. Only an empty request body is supported.
    AUTH_INT,
}

impl Qop {
    /// Pick the qop to answer with from the challenge's `qop` parameter.
    ///
    /// `None` means the server did not ask for one (RFC 2069 compat mode).
    /// Servers may offer a comma-separated list; `auth` is preferred over
    /// `auth-int` since the latter would need the request body.
    pub fn select(param: Option<&str>) -> Result<Option<Qop>> {
        let param = param.unwrap_or_default();
        if param.trim().is_empty() {
            return Ok(None);
        }

        if !param.contains(',') {
            return param.trim().parse().map(Some);
        }

        let offered: Vec<Qop> = param
            .split(',')
            .filter_map(|q| q.trim().parse().ok())
            .collect();

        if offered.contains(&Qop::AUTH) {
            Ok(Some(Qop::AUTH))
        } else if offered.contains(&Qop::AUTH_INT) {
            Ok(Some(Qop::AUTH_INT))
        } else {
            Err(UnsupportedQop(param.into()))
        }
    }
}

impl FromStr for Qop {
    type Err = Error;

    /// Parse from "auth" or "auth-int" as used in HTTP headers, ignoring case
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auth" => Ok(Qop::AUTH),
            "auth-int" => Ok(Qop::AUTH_INT),
            _ => Err(UnsupportedQop(s.into())),
        }
    }
}

impl Display for Qop {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Qop::AUTH => "auth",
            Qop::AUTH_INT => "auth-int",
        })
    }
}
