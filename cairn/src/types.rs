//! Core identifier and value types for Cairn.
//!
//! All identifier types use smart constructors so that validity is checked at
//! construction time, following the "parse, don't validate" principle. Once a
//! value exists it is guaranteed valid everywhere it flows.

use chrono::{DateTime, Utc};
use nutype::nutype;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies one project aggregate, and therefore one event stream.
///
/// `ProjectId` values are guaranteed to be non-empty and at most 255
/// characters after trimming.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct ProjectId(String);

/// A globally unique event identifier using UUIDv7 format.
///
/// UUIDv7 gives time-based ordering, so event ids created in sequence sort in
/// creation order.
#[nutype(
    validate(predicate = |id: &Uuid| id.get_version() == Some(uuid::Version::SortRand)),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new `EventId` with the current timestamp.
    pub fn new() -> Self {
        Self::try_new(Uuid::now_v7()).expect("Uuid::now_v7() should always return a valid v7 UUID")
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

/// The version of an event stream: the count of events appended so far.
///
/// Versions start at 0 (empty stream) and increment by one per event. The
/// version is the sole optimistic-concurrency token: an append states the
/// version it expects to find and fails if the stream has moved on.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    Into,
    Serialize,
    Deserialize
))]
pub struct EventVersion(u64);

impl EventVersion {
    /// The version of a stream with no events.
    pub fn initial() -> Self {
        Self::new(0)
    }

    /// Returns the next version after this one.
    #[must_use]
    pub fn next(self) -> Self {
        Self::new(self.into_inner() + 1)
    }
}

impl Default for EventVersion {
    fn default() -> Self {
        Self::initial()
    }
}

/// A timestamp for when an event was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Creates a new timestamp from a UTC `DateTime`.
    pub const fn new(datetime: DateTime<Utc>) -> Self {
        Self(datetime)
    }

    /// Creates a timestamp representing the current moment.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Returns the underlying `DateTime`.
    pub const fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(datetime: DateTime<Utc>) -> Self {
        Self::new(datetime)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifies a person record in the administration backend.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, AsRef, Deref, Display, Serialize,
        Deserialize
    )
)]
pub struct PersonId(String);

/// Identifies a user account. Distinct from [`PersonId`]: a person record may
/// or may not have a login, and the mapping lives outside the core.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, AsRef, Deref, Display, Serialize,
        Deserialize
    )
)]
pub struct UserId(String);

/// Identifies a role a person can hold on a project (PI, researcher, ...).
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, AsRef, Deref, Display, Serialize,
        Deserialize
    )
)]
pub struct ProjectRoleId(String);

/// Identifies a role a user can hold within an organisation node.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, AsRef, Deref, Display, Serialize,
        Deserialize
    )
)]
pub struct OrgRoleId(String);

/// Identifies a node in the organisation hierarchy.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, AsRef, Deref, Display, Serialize,
        Deserialize
    )
)]
pub struct OrgNodeId(String);

/// Identifies a research product (dataset, software, publication).
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, AsRef, Deref, Display, Serialize,
        Deserialize
    )
)]
pub struct ProductId(String);
