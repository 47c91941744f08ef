//! Hook name canonicalization.
//!
//! Plugins spell hook names many ways (`App.Core.Init`, `app/core/init`,
//! `APP CORE INIT`). Every name is normalized to one canonical
//! [`HookName`] before it touches the registry, so all spellings share a
//! bucket.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use quire_settings::HookSettings;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::errors::{HookError, HookResult};

static SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t\n\r:.]").expect("valid separator regex"));
static INVALID_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_/\-]").expect("valid charset regex"));
static REPEATED_UNDERSCORES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_{2,}").expect("valid underscore regex"));
static REPEATED_SLASHES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/{2,}").expect("valid slash regex"));

static DEFAULT_CANONICALIZER: LazyLock<NameCanonicalizer> =
    LazyLock::new(NameCanonicalizer::default);

/// Canonicalize with the default rules (100 characters, built-in plurals).
pub fn canonicalize(name: &str) -> HookName {
    DEFAULT_CANONICALIZER.canonicalize(name)
}

/// A canonical hook name.
///
/// Lowercase, `/`-delimited segments of `[a-z0-9_-]`. Only produced by
/// [`NameCanonicalizer`]; may be empty when the input held nothing usable.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct HookName(String);

impl HookName {
    /// Return the inner string as a slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume self and return the inner `String`.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::ops::Deref for HookName {
    type Target = str;
    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for HookName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HookName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for HookName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for HookName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Normalizes hook-name spellings to a [`HookName`].
///
/// One pass applies, in order:
/// 1. truncate to `max_length` characters
/// 2. strip leading/trailing digits and `:`
/// 3. separators (space, tab, CR, LF, `:`, `.`) become `/`
/// 4. anything outside `[A-Za-z0-9_/-]` becomes `_`
/// 5. collapse runs of `_`, then runs of `/`
/// 6. trim `_`, `/` and `-` from both ends
/// 7. lowercase
/// 8. rewrite plural segments that sit between two `/`
///
/// Passes repeat until the name stops changing, which makes the result
/// idempotent even when step 6 exposes digits for step 2.
#[derive(Clone, Debug)]
pub struct NameCanonicalizer {
    max_length: usize,
    singular_segments: BTreeMap<String, String>,
}

impl Default for NameCanonicalizer {
    fn default() -> Self {
        Self::from_settings(&HookSettings::default())
    }
}

impl NameCanonicalizer {
    /// Build a canonicalizer from explicit rules.
    ///
    /// Plural rules are dropped (with a warning) when the singular form is
    /// not itself canonical or is another rule's plural, since either would
    /// keep rewriting the name on every pass.
    pub fn new(max_length: usize, singular_segments: BTreeMap<String, String>) -> Self {
        let mut accepted = BTreeMap::new();
        for (plural, singular) in &singular_segments {
            let canonical_segment = !singular.is_empty()
                && !singular.contains("__")
                && singular
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');
            if !canonical_segment || singular_segments.contains_key(singular) {
                warn!(plural = %plural, singular = %singular, "ignoring unusable singular segment rule");
                continue;
            }
            let _ = accepted.insert(plural.clone(), singular.clone());
        }

        Self {
            max_length: max_length.max(1),
            singular_segments: accepted,
        }
    }

    /// Build a canonicalizer from hook settings.
    pub fn from_settings(settings: &HookSettings) -> Self {
        Self::new(settings.max_name_length, settings.singular_segments.clone())
    }

    /// Canonicalize a hook name. Empty or all-junk input yields an empty name.
    pub fn canonicalize(&self, name: &str) -> HookName {
        // Every pass after the first can only shorten the name, so this ends.
        let mut current = self.pass(name);
        loop {
            let next = self.pass(&current);
            if next == current {
                return HookName(current);
            }
            current = next;
        }
    }

    /// Canonicalize a dynamically-typed name, e.g. one read from a plugin
    /// manifest. Strings, numbers and booleans are accepted.
    pub fn canonicalize_value(&self, name: &Value) -> HookResult<HookName> {
        match name {
            Value::String(s) => Ok(self.canonicalize(s)),
            Value::Number(n) => Ok(self.canonicalize(&n.to_string())),
            Value::Bool(b) => Ok(self.canonicalize(&b.to_string())),
            other => Err(HookError::InvalidHookName(format!(
                "expected a scalar, got {}",
                value_kind(other)
            ))),
        }
    }

    fn pass(&self, name: &str) -> String {
        let truncated: String = name.chars().take(self.max_length).collect();
        let stripped = truncated.trim_matches(|c: char| c.is_ascii_digit() || c == ':');
        let separated = SEPARATORS.replace_all(stripped, "/");
        let cleaned = INVALID_CHARS.replace_all(&separated, "_");
        let collapsed = REPEATED_UNDERSCORES.replace_all(&cleaned, "_");
        let collapsed = REPEATED_SLASHES.replace_all(&collapsed, "/");
        let trimmed = collapsed
            .trim_matches(|c| matches!(c, '_' | '/' | '-'))
            .to_ascii_lowercase();
        self.singularize(trimmed)
    }

    fn singularize(&self, name: String) -> String {
        let segments: Vec<&str> = name.split('/').collect();
        if segments.len() < 3 {
            return name;
        }
        let last = segments.len() - 1;
        segments
            .iter()
            .enumerate()
            .map(|(i, segment)| {
                if i == 0 || i == last {
                    return *segment;
                }
                self.singular_segments
                    .get(*segment)
                    .map_or(*segment, String::as_str)
            })
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// One or more hook names passed to a registration or removal call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HookNames(Vec<String>);

impl HookNames {
    /// Parse names from a dynamic value: a scalar, or an array of scalars.
    pub fn from_value(value: &Value) -> HookResult<Self> {
        match value {
            Value::Array(items) => items
                .iter()
                .map(scalar_to_string)
                .collect::<HookResult<Vec<_>>>()
                .map(Self),
            scalar => scalar_to_string(scalar).map(|name| Self(vec![name])),
        }
    }

    /// Names as given, before canonicalization.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Number of names.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no names were given.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Names joined for error messages.
    pub(crate) fn describe(&self) -> String {
        if self.0.is_empty() {
            "<none>".to_string()
        } else {
            self.0.join(", ")
        }
    }
}

impl From<&str> for HookNames {
    fn from(name: &str) -> Self {
        Self(vec![name.to_string()])
    }
}

impl From<String> for HookNames {
    fn from(name: String) -> Self {
        Self(vec![name])
    }
}

impl From<&String> for HookNames {
    fn from(name: &String) -> Self {
        Self(vec![name.clone()])
    }
}

impl From<Vec<String>> for HookNames {
    fn from(names: Vec<String>) -> Self {
        Self(names)
    }
}

impl From<Vec<&str>> for HookNames {
    fn from(names: Vec<&str>) -> Self {
        Self(names.into_iter().map(str::to_string).collect())
    }
}

impl From<&[&str]> for HookNames {
    fn from(names: &[&str]) -> Self {
        Self(names.iter().map(|n| (*n).to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for HookNames {
    fn from(names: [&str; N]) -> Self {
        Self(names.iter().map(|n| (*n).to_string()).collect())
    }
}

fn scalar_to_string(value: &Value) -> HookResult<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(HookError::InvalidHookName(format!(
            "expected a scalar or a list of scalars, got {}",
            value_kind(other)
        ))),
    }
}

pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
