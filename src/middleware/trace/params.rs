//! Request parameters as they are attached to a trace.
//!
//! Keys are always `String`s. Everything that enters from outside (query
//! strings, form bodies, JSON bodies) is normalized to that form here, and
//! every map handed to a reporter goes through [`ParameterSanitizer`] first.

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::DenyList;
use crate::request::Request;

/// A string-keyed parameter map.
pub type Params = Map<String, Value>;

// ── DecodedParams ─────────────────────────────────────────────────────────────

/// Ordered `(key, value)` pairs decoded from a request, before any
/// structured parsing.
///
/// Body pairs come first, then query pairs. A JSON body is kept whole as a
/// single key with an empty value; a form body is form-decoded. Other
/// content types contribute nothing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DecodedParams(Vec<(String, String)>);

impl DecodedParams {
    pub fn new(pairs: Vec<(String, String)>) -> Self {
        Self(pairs)
    }

    pub fn decode(query: Option<&str>, content_type: Option<&str>, body: &[u8]) -> Self {
        let mut pairs = Vec::new();

        if !body.is_empty() {
            match BodyKind::of(content_type) {
                BodyKind::Json => {
                    if let Ok(text) = std::str::from_utf8(body) {
                        pairs.push((text.to_owned(), String::new()));
                    }
                }
                BodyKind::Form => {
                    if let Ok(form) = serde_urlencoded::from_bytes::<Vec<(String, String)>>(body) {
                        pairs.extend(form);
                    }
                }
                BodyKind::Other => {}
            }
        }

        if let Some(query) = query {
            pairs.extend(Self::from_query(query).0);
        }

        Self(pairs)
    }

    pub fn from_query(query: &str) -> Self {
        Self(serde_urlencoded::from_str::<Vec<(String, String)>>(query).unwrap_or_default())
    }

    pub fn from_request(req: &Request) -> Self {
        Self::decode(req.query(), req.header("content-type"), req.body())
    }

    pub fn first(&self) -> Option<(&str, &str)> {
        self.0.first().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Collapses the pairs into a map. A repeated key keeps its last value.
    pub fn to_params(&self) -> Params {
        self.0
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for DecodedParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

enum BodyKind {
    Json,
    Form,
    Other,
}

impl BodyKind {
    fn of(content_type: Option<&str>) -> Self {
        let Some(ct) = content_type else { return Self::Form };
        let essence = ct.split(';').next().unwrap_or_default().trim();
        if essence.eq_ignore_ascii_case("application/json") || essence.ends_with("+json") {
            Self::Json
        } else if essence.eq_ignore_ascii_case("application/x-www-form-urlencoded") {
            Self::Form
        } else {
            Self::Other
        }
    }
}

// ── SanitizedParams ───────────────────────────────────────────────────────────

/// Parameters with every deny-listed key removed. Only
/// [`ParameterSanitizer`] builds non-empty ones.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SanitizedParams(Params);

impl SanitizedParams {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Params {
        &self.0
    }
}

/// Renders as compact JSON.
impl fmt::Display for SanitizedParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(&self.0).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

// ── ParameterSanitizer ────────────────────────────────────────────────────────

/// Drops deny-listed keys from parameter maps.
#[derive(Clone, Debug, Default)]
pub struct ParameterSanitizer {
    deny_list: DenyList,
}

impl ParameterSanitizer {
    pub fn new(deny_list: DenyList) -> Self {
        Self { deny_list }
    }

    pub fn deny_list(&self) -> &DenyList {
        &self.deny_list
    }

    /// Returns a copy of `params` without the deny-listed keys. Retained
    /// values are untouched; only top-level keys are inspected.
    pub fn filter(&self, params: &Params) -> SanitizedParams {
        SanitizedParams(
            params
                .iter()
                .filter(|(k, _)| !self.deny_list.contains(k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}
