//! Per-request record of the route fragments matched during dispatch.
//!
//! The record lives in the request's [`Extensions`]. It is inserted on the
//! first successful match, so its presence alone says "the router touched
//! this request", even before anything useful was appended.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use http::Extensions;

/// One piece of a matched route.
#[derive(Clone, Debug)]
pub enum Fragment {
    /// A literal path segment such as `users`.
    Literal(Cow<'static, str>),
    /// A value produced by a pattern: a regex group, a typed binding.
    Capture(Capture),
    /// Several parts produced by a single pattern. Flattened one level when
    /// the transaction name is built.
    Compound(Vec<Fragment>),
}

impl Fragment {
    pub fn literal(segment: impl Into<Cow<'static, str>>) -> Self {
        Self::Literal(segment.into())
    }

    /// An opaque capture. See [`Capture::value`].
    pub fn capture<T>(value: T) -> Self
    where
        T: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        Self::Capture(Capture::value(value))
    }

    pub fn compound(parts: impl IntoIterator<Item = Fragment>) -> Self {
        Self::Compound(parts.into_iter().collect())
    }

    /// A label for diagnostics. Unlike name rendering it never calls into a
    /// captured value: opaque captures show as `{name}`, or `{?}` unnamed.
    pub fn describe(&self) -> String {
        match self {
            Self::Literal(s) => s.to_string(),
            Self::Capture(c) => c.describe(),
            Self::Compound(parts) => {
                parts.iter().map(Self::describe).collect::<Vec<_>>().join("/")
            }
        }
    }
}

impl From<&'static str> for Fragment {
    fn from(segment: &'static str) -> Self {
        Self::literal(segment)
    }
}

impl From<Capture> for Fragment {
    fn from(capture: Capture) -> Self {
        Self::Capture(capture)
    }
}

/// A captured value, optionally named after the binding that produced it.
#[derive(Clone, Debug)]
pub struct Capture {
    name: Option<Cow<'static, str>>,
    value: CaptureValue,
}

trait Opaque: fmt::Display + fmt::Debug + Send + Sync {}

impl<T: fmt::Display + fmt::Debug + Send + Sync> Opaque for T {}

#[derive(Clone, Debug)]
enum CaptureValue {
    Text(String),
    Opaque(Arc<dyn Opaque>),
}

impl Capture {
    /// A textual capture. Rendered as-is.
    pub fn text(value: impl Into<String>) -> Self {
        Self { name: None, value: CaptureValue::Text(value.into()) }
    }

    /// Any other value. Rendered with `Display` when it stands alone and
    /// with `Debug` inside a compound fragment.
    pub fn value<T>(value: T) -> Self
    where
        T: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        Self { name: None, value: CaptureValue::Opaque(Arc::new(value)) }
    }

    pub fn named(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The stand-alone form. May panic if an opaque value's `Display` does.
    pub fn render(&self) -> String {
        match &self.value {
            CaptureValue::Text(s) => s.clone(),
            CaptureValue::Opaque(v) => v.to_string(),
        }
    }

    /// The form used inside a compound. May panic if an opaque value's
    /// `Debug` does.
    pub fn inspect(&self) -> String {
        match &self.value {
            CaptureValue::Text(s) => s.clone(),
            CaptureValue::Opaque(v) => format!("{v:?}"),
        }
    }

    fn describe(&self) -> String {
        match (&self.value, self.name()) {
            (CaptureValue::Text(s), _) => s.clone(),
            (CaptureValue::Opaque(_), Some(name)) => format!("{{{name}}}"),
            (CaptureValue::Opaque(_), None) => "{?}".to_owned(),
        }
    }
}

// ── MatchRecord ───────────────────────────────────────────────────────────────

/// Ordered fragments matched while resolving one request.
#[derive(Clone, Debug, Default)]
pub struct MatchRecord {
    fragments: Vec<Fragment>,
}

impl MatchRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the request's record, inserting an empty one first if the
    /// request has never been touched.
    pub fn get_or_init(extensions: &mut Extensions) -> &mut Self {
        extensions.get_or_insert_default::<Self>()
    }

    pub fn get(extensions: &Extensions) -> Option<&Self> {
        extensions.get::<Self>()
    }

    pub fn get_mut(extensions: &mut Extensions) -> Option<&mut Self> {
        extensions.get_mut::<Self>()
    }

    pub fn push(&mut self, fragment: Fragment) {
        self.fragments.push(fragment);
    }

    /// Drops every fragment after the first `len`.
    pub fn truncate(&mut self, len: usize) {
        self.fragments.truncate(len);
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

impl FromIterator<Fragment> for MatchRecord {
    fn from_iter<I: IntoIterator<Item = Fragment>>(iter: I) -> Self {
        Self { fragments: iter.into_iter().collect() }
    }
}

/// The result of a match primitive, as far as recording is concerned.
pub trait MatchResult {
    /// What a successful match carries.
    type Value;

    fn matched(&self) -> Option<&Self::Value>;

    fn is_match(&self) -> bool {
        self.matched().is_some()
    }
}

impl MatchResult for bool {
    type Value = ();

    fn matched(&self) -> Option<&()> {
        self.then_some(&())
    }
}

impl<T> MatchResult for Option<T> {
    type Value = T;

    fn matched(&self) -> Option<&T> {
        self.as_ref()
    }
}

impl<T, E> MatchResult for Result<T, E> {
    type Value = T;

    fn matched(&self) -> Option<&T> {
        self.as_ref().ok()
    }
}

/// Records the fragment built from a match when `result` is one, then
/// returns `result` untouched.
///
/// Meant to wrap a routing engine's own match primitive; recording never
/// changes what the engine decides.
///
/// ```rust
/// use http::Extensions;
/// use routetrace::middleware::trace::{record, Fragment, MatchRecord};
///
/// let mut ext = Extensions::new();
/// let hit = record(&mut ext, "users/42".strip_prefix("users/"), |id| {
///     Fragment::compound([Fragment::literal("users"), Fragment::literal(id.to_string())])
/// });
/// assert_eq!(hit, Some("42"));
/// assert_eq!(MatchRecord::get(&ext).unwrap().len(), 1);
/// ```
pub fn record<M, F>(extensions: &mut Extensions, result: M, fragment: F) -> M
where
    M: MatchResult,
    F: FnOnce(&M::Value) -> Fragment,
{
    if let Some(value) = result.matched() {
        MatchRecord::get_or_init(extensions).push(fragment(value));
    }
    result
}
