//! Bounded, never-failing extraction of structured body parameters.
//!
//! Tracing runs on every request, so the parse it does is speculative and
//! must stay cheap: bodies declared larger than
//! [`MAX_PARSEABLE_SIZE`](crate::config::MAX_PARSEABLE_SIZE) are not looked
//! at, and a body that does not parse just falls back to what was already
//! decoded. Every outcome is a [`ParamSource`] variant, never an error.

use std::io;

use bytes::Bytes;
use serde_json::Value;
use tracing::{debug, trace};

use super::params::{DecodedParams, ParameterSanitizer, SanitizedParams};
use crate::config::MAX_PARSEABLE_SIZE;

/// A request body as seen by [`BoundedBodyParser`].
pub trait RequestBody {
    /// The size the client announced, or the buffered length.
    fn declared_size(&self) -> u64;

    /// Current read position; `None` when the body cannot seek.
    fn read_position(&mut self) -> Option<u64>;

    fn seek_to(&mut self, pos: u64) -> io::Result<()>;

    /// The untouched body bytes.
    fn raw(&self) -> Bytes;
}

/// Where a scope's parameters came from.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamSource {
    /// The first decoded entry held a JSON object; deny-listed keys removed.
    Parsed(SanitizedParams),
    /// Nothing was decoded, so nothing was parsed.
    Decoded(DecodedParams),
    /// The first decoded entry was not a JSON object.
    ParseFailureFallback(DecodedParams),
    /// The body was too large to look at.
    OversizeFallback(Bytes),
}

impl ParamSource {
    /// The decoded pairs, for the two variants that return them unchanged.
    pub fn decoded(&self) -> Option<&DecodedParams> {
        match self {
            Self::Decoded(d) | Self::ParseFailureFallback(d) => Some(d),
            Self::Parsed(_) | Self::OversizeFallback(_) => None,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::ParseFailureFallback(_) | Self::OversizeFallback(_))
    }

    /// Turns any outcome into parameters a reporter may see. Decoded pairs
    /// are sanitized too; a raw oversize body contributes nothing.
    pub fn into_params(self, sanitizer: &ParameterSanitizer) -> SanitizedParams {
        match self {
            Self::Parsed(params) => params,
            Self::Decoded(d) | Self::ParseFailureFallback(d) => sanitizer.filter(&d.to_params()),
            Self::OversizeFallback(_) => SanitizedParams::empty(),
        }
    }
}

/// Parses request parameters for a trace scope under a hard size cap.
#[derive(Clone, Debug)]
pub struct BoundedBodyParser {
    sanitizer: ParameterSanitizer,
    max_size: u64,
}

impl BoundedBodyParser {
    pub fn new(sanitizer: ParameterSanitizer) -> Self {
        Self { sanitizer, max_size: MAX_PARSEABLE_SIZE }
    }

    pub fn max_size(mut self, bytes: u64) -> Self {
        self.max_size = bytes;
        self
    }

    pub fn sanitizer(&self) -> &ParameterSanitizer {
        &self.sanitizer
    }

    /// Extracts parameters from `body` and the already-`decoded` pairs.
    ///
    /// An oversize body is returned raw and left at the read position it had
    /// on entry. Otherwise the first decoded entry (key and value joined) is
    /// parsed as a JSON object and sanitized; if it is not one, `decoded` is
    /// returned as-is.
    pub fn parse<B>(&self, body: &mut B, decoded: &DecodedParams) -> ParamSource
    where
        B: RequestBody + ?Sized,
    {
        let start = body.read_position().unwrap_or(0);
        let size = body.declared_size();

        if size > self.max_size {
            let raw = body.raw();
            if let Some(pos) = body.read_position() {
                if pos != start {
                    if let Err(e) = body.seek_to(start) {
                        debug!(error = %e, pos = start, "could not restore body position");
                    }
                }
            }
            debug!(size, limit = self.max_size, "body too large to parse for trace params");
            return ParamSource::OversizeFallback(raw);
        }

        let Some((key, value)) = decoded.first() else {
            return ParamSource::Decoded(decoded.clone());
        };

        let candidate = [key, value].concat();
        match serde_json::from_str::<Value>(&candidate) {
            Ok(Value::Object(map)) => ParamSource::Parsed(self.sanitizer.filter(&map)),
            Ok(other) => {
                trace!(kind = json_kind(&other), "body params are not a JSON object");
                ParamSource::ParseFailureFallback(decoded.clone())
            }
            Err(e) => {
                trace!(error = %e, "body params are not JSON");
                ParamSource::ParseFailureFallback(decoded.clone())
            }
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
