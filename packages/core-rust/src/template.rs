//! Template substitution for host/path templates, query strings, headers and
//! form bodies.
//!
//! Host and path templates are compiled once into sorted, disjoint placeholder
//! ranges. Rendering walks the ranges left to right, copying the literal text
//! between them and writing each replacement once; a replacement value that
//! itself looks like `{name}` is never re-scanned.

use http::HeaderMap;

use crate::arg::Arg;
use crate::descriptor::{Substitution, SubstitutionKind};
use crate::escape::{escape, EscapeProfile};
use crate::serializer::Serializer;

/// Errors found while compiling a template.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("placeholder {{{placeholder}}} does not appear in template {template:?}")]
    UnknownPlaceholder { placeholder: String, template: String },
    #[error("placeholders {{{first}}} and {{{second}}} overlap in template {template:?}")]
    Overlap {
        first: String,
        second: String,
        template: String,
    },
}

/// One occurrence of a placeholder: byte range `start..end` of `{name}` in
/// the raw template, bound to `substitutions[substitution]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaceholderRange {
    pub start: usize,
    pub end: usize,
    pub substitution: usize,
}

/// A host or path template with its placeholder ranges resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    raw: String,
    ranges: Vec<PlaceholderRange>,
}

impl Template {
    /// Locates every `{name}` occurrence for substitutions of `kind`.
    ///
    /// # Errors
    ///
    /// Fails if a substitution's placeholder never occurs, or if two
    /// occurrences overlap.
    pub fn compile(
        raw: &str,
        substitutions: &[Substitution],
        kind: SubstitutionKind,
    ) -> Result<Self, TemplateError> {
        let mut ranges = Vec::new();
        for (i, sub) in substitutions.iter().enumerate().filter(|(_, s)| s.kind == kind) {
            let token = format!("{{{}}}", sub.placeholder);
            let before = ranges.len();
            ranges.extend(raw.match_indices(&token).map(|(start, m)| PlaceholderRange {
                start,
                end: start + m.len(),
                substitution: i,
            }));
            if ranges.len() == before {
                return Err(TemplateError::UnknownPlaceholder {
                    placeholder: sub.placeholder.clone(),
                    template: raw.to_owned(),
                });
            }
        }
        ranges.sort_by_key(|r| r.start);
        if let Some(pair) = ranges.windows(2).find(|w| w[0].end > w[1].start) {
            return Err(TemplateError::Overlap {
                first: substitutions[pair[0].substitution].placeholder.clone(),
                second: substitutions[pair[1].substitution].placeholder.clone(),
                template: raw.to_owned(),
            });
        }
        Ok(Self {
            raw: raw.to_owned(),
            ranges,
        })
    }

    /// A template with no placeholders.
    #[must_use]
    pub fn literal(raw: &str) -> Self {
        Self {
            raw: raw.to_owned(),
            ranges: Vec::new(),
        }
    }

    /// The template text as declared.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Placeholder positions in the raw text, in order.
    #[must_use]
    pub fn ranges(&self) -> &[PlaceholderRange] {
        &self.ranges
    }

    /// Replaces every range with `value_of(range.substitution)` in one pass.
    pub fn render(&self, mut value_of: impl FnMut(usize) -> String) -> String {
        let mut out = String::with_capacity(self.raw.len());
        let mut cursor = 0;
        for range in &self.ranges {
            out.push_str(&self.raw[cursor..range.start]);
            out.push_str(&value_of(range.substitution));
            cursor = range.end;
        }
        out.push_str(&self.raw[cursor..]);
        out
    }
}

/// Resolves a host or path template against the call arguments.
///
/// Missing and null arguments substitute as the empty string. Encoded
/// substitutions are escaped with the path profile.
#[must_use]
pub fn resolve(
    template: &Template,
    substitutions: &[Substitution],
    args: &[Arg],
    serializer: &dyn Serializer,
) -> String {
    template.render(|i| {
        let sub = &substitutions[i];
        let raw = args
            .get(sub.argument_index)
            .and_then(|arg| serializer.serialize_raw(arg))
            .unwrap_or_default();
        if sub.should_encode {
            escape(&raw, &EscapeProfile::PATH).into_owned()
        } else {
            raw
        }
    })
}

/// Query parameters in declaration order, values already escaped.
///
/// A list argument bound to a `merge_multiple` substitution contributes one
/// parameter per element; null values are skipped.
#[must_use]
pub fn query_pairs(
    substitutions: &[Substitution],
    args: &[Arg],
    serializer: &dyn Serializer,
) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for sub in of_kind(substitutions, SubstitutionKind::Query) {
        let Some(arg) = args.get(sub.argument_index) else {
            continue;
        };
        let encode = |v: String| {
            if sub.should_encode {
                escape(&v, &EscapeProfile::QUERY).into_owned()
            } else {
                v
            }
        };
        match arg {
            Arg::List(items) if sub.merge_multiple => {
                for item in items {
                    if let Some(v) = serializer.serialize_raw(item) {
                        pairs.push((sub.placeholder.clone(), encode(v)));
                    }
                }
            }
            other => {
                if let Some(v) = serializer.serialize_raw(other) {
                    pairs.push((sub.placeholder.clone(), encode(v)));
                }
            }
        }
    }
    pairs
}

/// Header entries in declaration order.
///
/// A map argument expands to one header per key, named `prefix + key` where
/// the prefix is the substitution's placeholder name.
#[must_use]
pub fn header_pairs(
    substitutions: &[Substitution],
    args: &[Arg],
    serializer: &dyn Serializer,
) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for sub in of_kind(substitutions, SubstitutionKind::Header) {
        let Some(arg) = args.get(sub.argument_index) else {
            continue;
        };
        if let Some(entries) = map_entries(arg, serializer) {
            for (key, value) in entries {
                pairs.push((format!("{}{key}", sub.placeholder), value));
            }
        } else if let Some(v) = serializer.serialize_raw(arg) {
            pairs.push((sub.placeholder.clone(), v));
        }
    }
    pairs
}

/// `application/x-www-form-urlencoded` body, or `None` when no form field
/// has a value.
#[must_use]
pub fn form_body(
    substitutions: &[Substitution],
    args: &[Arg],
    serializer: &dyn Serializer,
) -> Option<String> {
    let mut fields: Vec<String> = Vec::new();
    for sub in of_kind(substitutions, SubstitutionKind::Form) {
        let Some(arg) = args.get(sub.argument_index) else {
            continue;
        };
        let mut push = |key: &str, value: String| {
            let value = if sub.should_encode {
                escape(&value, &EscapeProfile::FORM).into_owned()
            } else {
                value
            };
            fields.push(format!("{}={value}", escape(key, &EscapeProfile::FORM)));
        };
        if let Some(entries) = map_entries(arg, serializer) {
            for (key, value) in entries {
                push(&key, value);
            }
        } else if let Some(v) = serializer.serialize_raw(arg) {
            push(&sub.placeholder, v);
        }
    }
    (!fields.is_empty()).then(|| fields.join("&"))
}

/// Inserts header pairs into `headers`, replacing same-named entries.
/// Pairs whose name `keep` rejects are skipped.
///
/// # Errors
///
/// Returns the offending header name.
pub fn apply_headers(
    headers: &mut HeaderMap,
    pairs: impl IntoIterator<Item = (String, String)>,
    mut keep: impl FnMut(&http::HeaderName) -> bool,
) -> Result<(), String> {
    for (name, value) in pairs {
        let header_name = http::HeaderName::from_bytes(name.as_bytes()).map_err(|_| name.clone())?;
        if !keep(&header_name) {
            continue;
        }
        let header_value = http::HeaderValue::from_str(&value).map_err(|_| name.clone())?;
        headers.insert(header_name, header_value);
    }
    Ok(())
}

fn of_kind(
    substitutions: &[Substitution],
    kind: SubstitutionKind,
) -> impl Iterator<Item = &Substitution> {
    substitutions.iter().filter(move |s| s.kind == kind)
}

/// Raw entries of a map-valued argument; JSON objects count as maps.
/// Entries whose value serializes to nothing are dropped.
fn map_entries(arg: &Arg, serializer: &dyn Serializer) -> Option<Vec<(String, String)>> {
    match arg {
        Arg::Map(entries) => Some(
            entries
                .iter()
                .filter_map(|(k, v)| serializer.serialize_raw(v).map(|v| (k.clone(), v)))
                .collect(),
        ),
        Arg::Json(serde_json::Value::Object(entries)) => Some(
            entries
                .iter()
                .filter_map(|(k, v)| {
                    serializer
                        .serialize_raw(&Arg::Json(v.clone()))
                        .map(|v| (k.clone(), v))
                })
                .collect(),
        ),
        _ => None,
    }
}
