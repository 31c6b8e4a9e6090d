use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Department sentinel for members whose label carries no bracket tag
/// and for free-text actors that never matched the roster.
pub const UNKNOWN_DEPARTMENT: &str = "不明";

/// Half-open aggregation window `[start, end)` in UTC instants.
/// `None` on both sides means unbounded (all time).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeWindow {
    pub const ALL: TimeWindow = TimeWindow {
        start: None,
        end: None,
    };

    /// Start-inclusive, end-exclusive membership test.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        if let Some(start) = self.start {
            if at < start {
                return false;
            }
        }
        if let Some(end) = self.end {
            if at >= end {
                return false;
            }
        }
        true
    }
}

/// Caller-facing period specifier, resolved against a reference "now"
/// by `period::resolve`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PeriodSpec {
    ThisPeriod,
    PreviousPeriod,
    RelativeOffset { months: u32 },
    ExplicitMonth { year: i32, month: u32 },
    /// Minute-precision wall-clock literals in the reference zone.
    ExplicitRange {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
    AllTime,
}

/// One known member of the community, supplied wholesale per run by the
/// roster provider. `raw_label` may encode departments and a nickname,
/// e.g. `【社長室/広報】與儀 あんり（あんり）`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterMember {
    pub id: u64,
    pub raw_label: String,
}

/// One counted endorsement kind on a post, e.g. `{"kind": "❤️", "count": 3}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndorsementEntry {
    pub kind: String,
    pub count: u64,
}

/// A single community-activity event as delivered by the source
/// collaborator, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    Post {
        actor_label: String,
        timestamp: DateTime<Utc>,
        #[serde(default)]
        message_id: u64,
        #[serde(default)]
        endorsements: Vec<EndorsementEntry>,
        #[serde(default)]
        content: String,
    },
    EndorsementGrant {
        granter_label: String,
        timestamp: DateTime<Utc>,
    },
    FormSubmission {
        content: String,
        timestamp: DateTime<Utc>,
    },
}

impl Event {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Event::Post { timestamp, .. }
            | Event::EndorsementGrant { timestamp, .. }
            | Event::FormSubmission { timestamp, .. } => *timestamp,
        }
    }
}

/// Resolved identity an aggregate row is keyed by: a roster member, or
/// a normalized free-text bucket when no roster match exists.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActorKey {
    Member(u64),
    Unresolved(String),
}

/// Per-actor counters accumulated over one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActorStats {
    pub display_name: String,
    pub departments: Vec<String>,
    pub posts: u64,
    pub received: u64,
    pub given: u64,
}

impl ActorStats {
    /// Endorsements received per post; zero when there are no posts.
    pub fn average_received(&self) -> f64 {
        if self.posts == 0 {
            0.0
        } else {
            self.received as f64 / self.posts as f64
        }
    }
}

/// Per-department roll-up. An actor in N departments contributes its
/// full counters to each of the N groups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupStats {
    pub posts: u64,
    pub received: u64,
}

/// One entry of the optional top-posts ranking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedPost {
    pub display_name: String,
    pub metric: u64,
    pub timestamp: DateTime<Utc>,
    pub excerpt: String,
}

/// Structured output of the external intent-parsing collaborator.
#[derive(Debug, Clone, Deserialize)]
pub struct ParsedIntent {
    #[serde(default)]
    pub action: IntentAction,
    #[serde(default)]
    pub period: Option<PeriodSpec>,
    #[serde(default)]
    pub target_actor_id: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentAction {
    Report,
    ActorQuery,
    #[default]
    Unknown,
}
