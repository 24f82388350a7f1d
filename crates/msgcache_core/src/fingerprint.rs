//! Content fingerprints for matching tentative entries to confirmed ones.
//!
//! A fingerprint captures an entry's identity content and ignores fields the
//! remote source rewrites (id, sequence, timestamps, status). Three variants
//! are derived per entry, from strictest to loosest:
//!
//! - [`FingerprintVariant::Exact`] includes the position, rounded to six
//!   decimals.
//! - [`FingerprintVariant::Loose`] drops the position, for when the server
//!   recomputes ordering.
//! - [`FingerprintVariant::MediaLoose`] (media kinds only) also drops content
//!   and annotations. The binary payload (url, size, filename) remains.
//!
//! ## Canonical form
//!
//! Values are normalized before serialization:
//! - `null`, `""`, numeric zero, empty arrays and empty objects are unset and
//!   omitted
//! - numbers are rendered in shortest decimal form, and strings that spell a
//!   number are rendered the same way, so `"1024"` and `1024` agree
//! - objects are serialized with sorted keys, recursively
//!
//! The canonical string is hashed with SHA-256.

use crate::entry::{Entry, EntryKind};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt;

/// Scale applied to positions before rounding (six decimals).
pub const POSITION_SCALE: f64 = 1_000_000.0;

/// A 32-byte content fingerprint.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Hashes a canonical string.
    #[must_use]
    pub fn from_canonical(canonical: &str) -> Self {
        Self(Sha256::digest(canonical.as_bytes()).into())
    }

    /// Returns the raw digest.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex rendering.
    #[must_use]
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", &self.to_hex()[..12])
    }
}

/// Which identity fields a fingerprint covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FingerprintVariant {
    /// Full identity including rounded position.
    Exact,
    /// Identity without position.
    Loose,
    /// Media identity without position, content and annotations.
    MediaLoose,
}

impl FingerprintVariant {
    /// All variants in matching order.
    pub const ALL: [FingerprintVariant; 3] = [
        FingerprintVariant::Exact,
        FingerprintVariant::Loose,
        FingerprintVariant::MediaLoose,
    ];

    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            FingerprintVariant::Exact => "exact",
            FingerprintVariant::Loose => "loose",
            FingerprintVariant::MediaLoose => "media_loose",
        }
    }
}

/// The fingerprints of one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryFingerprints {
    /// Exact key.
    pub exact: Fingerprint,
    /// Loose key.
    pub loose: Fingerprint,
    /// Media-loose key, present only for media kinds.
    pub media_loose: Option<Fingerprint>,
}

impl EntryFingerprints {
    /// Computes all fingerprints of an entry.
    #[must_use]
    pub fn of(entry: &Entry) -> Self {
        Self {
            exact: Fingerprint::from_canonical(&canonical_string(entry, FingerprintVariant::Exact)),
            loose: Fingerprint::from_canonical(&canonical_string(entry, FingerprintVariant::Loose)),
            media_loose: fingerprint(entry, FingerprintVariant::MediaLoose),
        }
    }

    /// Returns the key for one variant.
    #[must_use]
    pub fn get(&self, variant: FingerprintVariant) -> Option<Fingerprint> {
        match variant {
            FingerprintVariant::Exact => Some(self.exact),
            FingerprintVariant::Loose => Some(self.loose),
            FingerprintVariant::MediaLoose => self.media_loose,
        }
    }
}

/// Computes one fingerprint variant.
///
/// Returns `None` for the media-loose variant of a non-media entry.
#[must_use]
pub fn fingerprint(entry: &Entry, variant: FingerprintVariant) -> Option<Fingerprint> {
    canonical_form(entry, variant).map(|s| Fingerprint::from_canonical(&s))
}

/// Returns the canonical string a fingerprint is hashed from.
#[must_use]
pub fn canonical_form(entry: &Entry, variant: FingerprintVariant) -> Option<String> {
    if variant == FingerprintVariant::MediaLoose && !entry.is_media() {
        return None;
    }
    Some(canonical_string(entry, variant))
}

fn canonical_string(entry: &Entry, variant: FingerprintVariant) -> String {
    let identity = Value::Object(identity_fields(entry, variant));
    let mut out = String::new();
    match normalize(&identity) {
        Some(normalized) => write_canonical(&normalized, &mut out),
        None => out.push_str("{}"),
    }
    out
}

fn identity_fields(entry: &Entry, variant: FingerprintVariant) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert("partition".into(), Value::from(entry.partition_id.as_u64()));
    fields.insert("author".into(), opt_text(entry.author.as_deref()));
    fields.insert("role".into(), opt_text(entry.role.as_deref()));
    fields.insert(
        "kind".into(),
        opt_text(entry.kind.map(EntryKind::as_str)),
    );
    fields.insert(
        "reply_to".into(),
        entry.reply_to.map_or(Value::Null, |id| Value::from(id.as_i64())),
    );
    fields.insert(
        "thread_root".into(),
        entry
            .thread_root
            .map_or(Value::Null, |id| Value::from(id.as_i64())),
    );
    fields.insert("label".into(), opt_text(entry.label.as_deref()));
    fields.insert("payload".into(), Value::Object(entry.payload.clone()));

    if variant != FingerprintVariant::MediaLoose {
        fields.insert("content".into(), opt_text(entry.content.as_deref()));
        let annotations = entry
            .annotations
            .as_ref()
            .map(|set| set.iter().cloned().map(Value::String).collect::<Vec<_>>())
            .unwrap_or_default();
        fields.insert("annotations".into(), Value::Array(annotations));
    }

    if variant == FingerprintVariant::Exact {
        #[allow(clippy::cast_possible_truncation)]
        let rounded = entry
            .position
            .filter(|p| p.is_finite())
            .map_or(Value::Null, |p| Value::from((p * POSITION_SCALE).round() as i64));
        fields.insert("position".into(), rounded);
    }

    fields
}

fn opt_text(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |s| Value::String(s.to_owned()))
}

/// Normalizes a value, returning `None` when it is unset.
fn normalize(value: &Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(Value::Bool(*b)),
        Value::Number(n) => canonical_number(n.as_f64()?, n.as_i64()).map(Value::String),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            match trimmed.parse::<f64>() {
                Ok(parsed) if parsed.is_finite() => {
                    canonical_number(parsed, trimmed.parse::<i64>().ok()).map(Value::String)
                }
                _ => Some(Value::String(s.clone())),
            }
        }
        Value::Array(items) => {
            let normalized: Vec<Value> = items
                .iter()
                .map(|v| normalize(v).unwrap_or(Value::Null))
                .collect();
            if normalized.iter().all(Value::is_null) {
                None
            } else {
                Some(Value::Array(normalized))
            }
        }
        Value::Object(map) => {
            let normalized: Map<String, Value> = map
                .iter()
                .filter_map(|(k, v)| normalize(v).map(|v| (k.clone(), v)))
                .collect();
            if normalized.is_empty() {
                None
            } else {
                Some(Value::Object(normalized))
            }
        }
    }
}

/// Shortest decimal rendering; zero is unset.
#[allow(clippy::cast_possible_truncation)]
fn canonical_number(value: f64, exact: Option<i64>) -> Option<String> {
    if let Some(i) = exact {
        return (i != 0).then(|| i.to_string());
    }
    if value == 0.0 || !value.is_finite() {
        return None;
    }
    if value.fract() == 0.0 && value.abs() < 9.0e15 {
        return Some((value as i64).to_string());
    }
    Some(value.to_string())
}

/// Serializes with sorted object keys.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {
            out.push_str(&value.to_string());
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
    }
}
