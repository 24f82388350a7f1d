//! The entry record.

use crate::types::{EntryId, PartitionId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// Kind of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Plain text message.
    Text,
    /// Image attachment.
    Image,
    /// Audio attachment.
    Audio,
    /// Video attachment.
    Video,
    /// Generic file attachment.
    File,
    /// Structured variable (form field) entry.
    Variable,
    /// Structured choice entry.
    Choice,
    /// System notice.
    System,
}

impl EntryKind {
    /// Returns true for kinds whose binary payload identifies them.
    #[must_use]
    pub const fn is_media(self) -> bool {
        matches!(
            self,
            EntryKind::Image | EntryKind::Audio | EntryKind::Video | EntryKind::File
        )
    }

    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            EntryKind::Text => "text",
            EntryKind::Image => "image",
            EntryKind::Audio => "audio",
            EntryKind::Video => "video",
            EntryKind::File => "file",
            EntryKind::Variable => "variable",
            EntryKind::Choice => "choice",
            EntryKind::System => "system",
        }
    }
}

/// Lifecycle status of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// Visible entry.
    #[default]
    Active,
    /// Soft-deleted; kept in storage, hidden from reads.
    Deleted,
    /// Tentative entry whose submission failed. Terminal.
    Failed,
}

impl EntryStatus {
    /// Numeric status code.
    #[must_use]
    pub const fn as_code(self) -> u8 {
        match self {
            EntryStatus::Active => 0,
            EntryStatus::Deleted => 1,
            EntryStatus::Failed => 2,
        }
    }

    /// Parses a numeric status code.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(EntryStatus::Active),
            1 => Some(EntryStatus::Deleted),
            2 => Some(EntryStatus::Failed),
            _ => None,
        }
    }
}

/// One conversation record.
///
/// Every field other than `id` and `partition_id` is optional. `None` means
/// "absent", which matters for [`Entry::merge_from`]: a partial update that
/// omits a field leaves the stored value in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Entry identity.
    pub id: EntryId,
    /// Owning partition.
    pub partition_id: PartitionId,
    /// Per-partition sync cursor value. Absent on tentative entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
    /// Sort key within the partition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<f64>,
    /// Entry kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<EntryKind>,
    /// Author identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Author role.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Entry this one replies to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<EntryId>,
    /// Root of the thread this entry belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_root: Option<EntryId>,
    /// Custom label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Text content or caption.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Kind-specific fields.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub payload: Map<String, Value>,
    /// Unordered tags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeSet<String>>,
    /// Creation time, unix milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    /// Last update time, unix milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
    /// Lifecycle status. Absent reads as active.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<EntryStatus>,
}

impl Entry {
    /// Creates an entry with only its identity set.
    #[must_use]
    pub fn new(id: EntryId, partition_id: PartitionId) -> Self {
        Self {
            id,
            partition_id,
            sequence: None,
            position: None,
            kind: None,
            author: None,
            role: None,
            reply_to: None,
            thread_root: None,
            label: None,
            content: None,
            payload: Map::new(),
            annotations: None,
            created_at: None,
            updated_at: None,
            status: None,
        }
    }

    /// Sets the sequence.
    #[must_use]
    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = Some(sequence);
        self
    }

    /// Sets the position.
    #[must_use]
    pub fn with_position(mut self, position: f64) -> Self {
        self.position = Some(position);
        self
    }

    /// Sets the kind.
    #[must_use]
    pub fn with_kind(mut self, kind: EntryKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Sets the author.
    #[must_use]
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// Sets the role.
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Sets the reply target.
    #[must_use]
    pub fn with_reply_to(mut self, id: EntryId) -> Self {
        self.reply_to = Some(id);
        self
    }

    /// Sets the thread root.
    #[must_use]
    pub fn with_thread_root(mut self, id: EntryId) -> Self {
        self.thread_root = Some(id);
        self
    }

    /// Sets the custom label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Sets the content.
    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Sets one payload field.
    #[must_use]
    pub fn with_payload_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Sets the annotation set.
    #[must_use]
    pub fn with_annotations<I, S>(mut self, annotations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.annotations = Some(annotations.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the creation time.
    #[must_use]
    pub fn with_created_at(mut self, millis: i64) -> Self {
        self.created_at = Some(millis);
        self
    }

    /// Sets the update time.
    #[must_use]
    pub fn with_updated_at(mut self, millis: i64) -> Self {
        self.updated_at = Some(millis);
        self
    }

    /// Sets the status.
    #[must_use]
    pub fn with_status(mut self, status: EntryStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Effective status (absent reads as active).
    #[must_use]
    pub fn status(&self) -> EntryStatus {
        self.status.unwrap_or_default()
    }

    /// Returns true if this entry has a local, unconfirmed id.
    #[must_use]
    pub fn is_tentative(&self) -> bool {
        self.id.is_tentative()
    }

    /// Returns true if reads should include this entry.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.status() != EntryStatus::Deleted
    }

    /// Returns true if this is a media entry.
    #[must_use]
    pub fn is_media(&self) -> bool {
        self.kind.is_some_and(EntryKind::is_media)
    }

    /// Merges a later confirmed version of the same entry into this one.
    ///
    /// Fields present in `incoming` overwrite; absent fields keep the current
    /// value. Payload is merged key by key, and a JSON `null` counts as absent.
    pub fn merge_from(&mut self, incoming: &Entry) {
        fn take<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
            if let Some(v) = value {
                *slot = Some(v.clone());
            }
        }

        self.partition_id = incoming.partition_id;
        take(&mut self.sequence, &incoming.sequence);
        take(&mut self.position, &incoming.position);
        take(&mut self.kind, &incoming.kind);
        take(&mut self.author, &incoming.author);
        take(&mut self.role, &incoming.role);
        take(&mut self.reply_to, &incoming.reply_to);
        take(&mut self.thread_root, &incoming.thread_root);
        take(&mut self.label, &incoming.label);
        take(&mut self.content, &incoming.content);
        take(&mut self.annotations, &incoming.annotations);
        take(&mut self.created_at, &incoming.created_at);
        take(&mut self.updated_at, &incoming.updated_at);
        take(&mut self.status, &incoming.status);

        for (key, value) in &incoming.payload {
            if !value.is_null() {
                self.payload.insert(key.clone(), value.clone());
            }
        }
    }

    /// Returns a copy of this entry with `incoming` merged in.
    #[must_use]
    pub fn merged(&self, incoming: &Entry) -> Entry {
        let mut merged = self.clone();
        merged.merge_from(incoming);
        merged
    }

    /// Total order within a partition: position ascending, then id ascending.
    ///
    /// Entries without a position sort after all positioned entries.
    #[must_use]
    pub fn order_cmp(&self, other: &Entry) -> Ordering {
        let by_position = match (self.position, other.position) {
            (Some(a), Some(b)) => a.total_cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_position.then(self.id.cmp(&other.id))
    }
}

/// Computes a position strictly between two neighbours.
///
/// With one neighbour missing the result lands one unit beyond the other;
/// with neither it is `0.0`.
#[must_use]
pub fn position_between(before: Option<f64>, after: Option<f64>) -> f64 {
    match (before, after) {
        (Some(a), Some(b)) => a + (b - a) / 2.0,
        (Some(a), None) => a + 1.0,
        (None, Some(b)) => b - 1.0,
        (None, None) => 0.0,
    }
}
