//! Transaction names.
//!
//! A name is the HTTP method followed by the matched fragments joined with
//! `/`: a request matched through the `admin` mount and then the
//! `/users/{id}` route is named `GET admin/users/{id}`. Names only depend on
//! the route that handled the request, so they aggregate well.

use super::record::{Fragment, MatchRecord};

/// Stand-in fragment when nothing was recorded.
pub const ROOT_FRAGMENT: &str = "/";

/// Builds the transaction name for a request.
///
/// Deterministic for a given record and method. An absent or empty record
/// names the root: `"GET /"`.
///
/// ```rust
/// use routetrace::middleware::trace::{transaction_name, Capture, Fragment, MatchRecord};
///
/// let record: MatchRecord = [
///     Fragment::literal("users"),
///     Fragment::compound([Fragment::from(Capture::value(42).named("id"))]),
/// ]
/// .into_iter()
/// .collect();
///
/// assert_eq!(transaction_name(Some(&record), "GET"), "GET users/42");
/// assert_eq!(transaction_name(None, "POST"), "POST /");
/// ```
pub fn transaction_name(record: Option<&MatchRecord>, method: &str) -> String {
    let mut parts = Vec::new();
    if let Some(record) = record {
        for fragment in record.fragments() {
            match fragment {
                Fragment::Compound(inner) => parts.extend(inner.iter().map(inspect)),
                other => parts.push(render(other)),
            }
        }
    }
    if parts.is_empty() {
        parts.push(ROOT_FRAGMENT.to_owned());
    }
    format!("{method} {}", parts.join("/"))
}

/// A fragment standing on its own.
fn render(fragment: &Fragment) -> String {
    match fragment {
        Fragment::Literal(s) => s.to_string(),
        Fragment::Capture(c) => c.render(),
        Fragment::Compound(_) => inspect(fragment),
    }
}

/// A fragment inside a compound.
fn inspect(fragment: &Fragment) -> String {
    match fragment {
        Fragment::Literal(s) => s.to_string(),
        Fragment::Capture(c) => c.inspect(),
        // Only one level is flattened; deeper nesting keeps its list form.
        Fragment::Compound(inner) => format!("{:?}", inner.iter().map(inspect).collect::<Vec<_>>()),
    }
}
