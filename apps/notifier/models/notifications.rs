use crate::models::proposals::{ProposalStatus, VoteTally};
use chrono::{DateTime, Utc};
use std::fmt;

/// Opaque handle to a message posted in the notification channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageRef(pub String);

impl MessageRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Coarse time-until-close bucket. A snapshot only changes when the bucket
/// does, not on every poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRemaining {
    Unknown,
    Ended,
    Days(i64),
    Hours(i64),
    UnderAnHour,
}

impl TimeRemaining {
    /// Stable storage encoding, independent of the display wording.
    pub fn to_key(self) -> String {
        match self {
            TimeRemaining::Unknown => "unknown".to_string(),
            TimeRemaining::Ended => "ended".to_string(),
            TimeRemaining::Days(days) => format!("days:{days}"),
            TimeRemaining::Hours(hours) => format!("hours:{hours}"),
            TimeRemaining::UnderAnHour => "under_hour".to_string(),
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "unknown" => Some(TimeRemaining::Unknown),
            "ended" => Some(TimeRemaining::Ended),
            "under_hour" => Some(TimeRemaining::UnderAnHour),
            _ => {
                let (unit, count) = key.split_once(':')?;
                let count = count.parse().ok()?;
                match unit {
                    "days" => Some(TimeRemaining::Days(count)),
                    "hours" => Some(TimeRemaining::Hours(count)),
                    _ => None,
                }
            }
        }
    }
}

impl fmt::Display for TimeRemaining {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeRemaining::Unknown => f.write_str("Unknown"),
            TimeRemaining::Ended => f.write_str("Ended"),
            TimeRemaining::Days(1) => f.write_str("1 day"),
            TimeRemaining::Days(days) => write!(f, "{days} days"),
            TimeRemaining::Hours(1) => f.write_str("1 hour"),
            TimeRemaining::Hours(hours) => write!(f, "{hours} hours"),
            TimeRemaining::UnderAnHour => f.write_str("Less than an hour"),
        }
    }
}

/// The rendered fields of a notification, compared cycle to cycle to decide
/// whether the message needs an edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub status: ProposalStatus,
    pub status_label: String,
    pub votes: VoteTally,
    pub time_remaining: TimeRemaining,
    pub quorum_met: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedNotification {
    pub proposal_id: String,
    pub message_ref: MessageRef,
    pub snapshot: Snapshot,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TrackedNotification {
    pub fn new(
        proposal_id: String,
        message_ref: MessageRef,
        snapshot: Snapshot,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            proposal_id,
            message_ref,
            snapshot,
            created_at: now,
            updated_at: now,
        }
    }

    /// Copy of this row after a successful edit (or re-post) at `now`.
    pub fn updated(&self, message_ref: MessageRef, snapshot: Snapshot, now: DateTime<Utc>) -> Self {
        Self {
            proposal_id: self.proposal_id.clone(),
            message_ref,
            snapshot,
            created_at: self.created_at,
            updated_at: now,
        }
    }
}
