//! Interceptor configuration.
//!
//! The only knob read from the environment is the parameter deny-list:
//!
//! ```text
//! FILTERED_PARAMS=password,token,card_number
//! ```
//!
//! It is parsed once at startup, wrapped in an `Arc`, and shared read-only by
//! every request afterwards. Hosts that keep their settings in a file can
//! deserialize [`TraceConfig`] from it instead:
//!
//! ```rust
//! use routetrace::config::TraceConfig;
//!
//! let config: TraceConfig =
//!     serde_json::from_str(r#"{ "deny_list": ["password", "token"] }"#).unwrap();
//! assert!(config.deny_list.contains("Password"));
//! assert_eq!(config.max_parseable_size, 3072);
//! ```

use std::env::{self, VarError};
use std::sync::Arc;

use serde::Deserialize;
use tracing::warn;

/// Environment variable holding the comma-separated deny-list.
pub const FILTERED_PARAMS_ENV: &str = "FILTERED_PARAMS";

/// Bodies declared larger than this are never parsed for trace parameters.
pub const MAX_PARSEABLE_SIZE: u64 = 3 * 1024;

/// Parameter keys that must never reach a trace.
///
/// Matching is ASCII case-insensitive: denying `password` also hides
/// `Password` and `PASSWORD`.
#[derive(Clone, Debug, Deserialize)]
#[serde(from = "Vec<String>")]
pub struct DenyList {
    keys: Arc<[String]>,
}

impl DenyList {
    /// Builds a deny-list from individual keys. Blank entries are dropped.
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keys: Vec<String> = keys
            .into_iter()
            .map(|k| k.as_ref().trim().to_owned())
            .filter(|k| !k.is_empty())
            .collect();
        Self { keys: keys.into() }
    }

    /// Parses a comma-separated list such as `"password, token"`.
    pub fn parse(list: &str) -> Self {
        Self::new(list.split(','))
    }

    /// Reads [`FILTERED_PARAMS_ENV`]. A missing variable means nothing is
    /// denied.
    pub fn from_env() -> Self {
        match env::var(FILTERED_PARAMS_ENV) {
            Ok(list) => Self::parse(&list),
            Err(VarError::NotPresent) => Self::default(),
            Err(VarError::NotUnicode(_)) => {
                warn!(var = FILTERED_PARAMS_ENV, "deny-list is not valid unicode, ignoring it");
                Self::default()
            }
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k.eq_ignore_ascii_case(key))
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }
}

impl Default for DenyList {
    fn default() -> Self {
        Self { keys: Arc::from(Vec::new()) }
    }
}

impl From<Vec<String>> for DenyList {
    fn from(keys: Vec<String>) -> Self {
        Self::new(keys)
    }
}

/// Settings for [`TraceLayer`](crate::middleware::trace::TraceLayer).
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    pub deny_list: DenyList,
    pub max_parseable_size: u64,
}

impl TraceConfig {
    /// Defaults plus the deny-list from [`FILTERED_PARAMS_ENV`].
    pub fn from_env() -> Self {
        Self { deny_list: DenyList::from_env(), ..Self::default() }
    }

    pub fn deny_list(mut self, deny_list: DenyList) -> Self {
        self.deny_list = deny_list;
        self
    }

    pub fn max_parseable_size(mut self, bytes: u64) -> Self {
        self.max_parseable_size = bytes;
        self
    }
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self { deny_list: DenyList::default(), max_parseable_size: MAX_PARSEABLE_SIZE }
    }
}
