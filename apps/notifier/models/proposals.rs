use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use std::{convert::Infallible, fmt, str::FromStr};

/// Lifecycle status as reported by the governance platform.
///
/// The platform may introduce statuses we have never seen; those are kept in
/// `Unknown`, upper-cased like the known variants, so a status compares equal
/// however upstream happens to capitalize it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProposalStatus {
    Draft,
    Pending,
    Active,
    Extended,
    Queued,
    PendingExecution,
    Succeeded,
    Defeated,
    Executed,
    CrossChainExecuted,
    CallExecuted,
    Expired,
    Canceled,
    Archived,
    Unknown(String),
}

impl ProposalStatus {
    pub fn as_str(&self) -> &str {
        match self {
            ProposalStatus::Draft => "DRAFT",
            ProposalStatus::Pending => "PENDING",
            ProposalStatus::Active => "ACTIVE",
            ProposalStatus::Extended => "EXTENDED",
            ProposalStatus::Queued => "QUEUED",
            ProposalStatus::PendingExecution => "PENDINGEXECUTION",
            ProposalStatus::Succeeded => "SUCCEEDED",
            ProposalStatus::Defeated => "DEFEATED",
            ProposalStatus::Executed => "EXECUTED",
            ProposalStatus::CrossChainExecuted => "CROSSCHAINEXECUTED",
            ProposalStatus::CallExecuted => "CALLEXECUTED",
            ProposalStatus::Expired => "EXPIRED",
            ProposalStatus::Canceled => "CANCELED",
            ProposalStatus::Archived => "ARCHIVED",
            ProposalStatus::Unknown(raw) => raw,
        }
    }
}

impl FromStr for ProposalStatus {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        Ok(match normalized.as_str() {
            "DRAFT" => ProposalStatus::Draft,
            "PENDING" => ProposalStatus::Pending,
            "ACTIVE" => ProposalStatus::Active,
            "EXTENDED" => ProposalStatus::Extended,
            "QUEUED" => ProposalStatus::Queued,
            "PENDINGEXECUTION" => ProposalStatus::PendingExecution,
            "SUCCEEDED" => ProposalStatus::Succeeded,
            "DEFEATED" => ProposalStatus::Defeated,
            "EXECUTED" => ProposalStatus::Executed,
            "CROSSCHAINEXECUTED" => ProposalStatus::CrossChainExecuted,
            "CALLEXECUTED" => ProposalStatus::CallExecuted,
            "EXPIRED" => ProposalStatus::Expired,
            "CANCELED" | "CANCELLED" => ProposalStatus::Canceled,
            "ARCHIVED" => ProposalStatus::Archived,
            _ => ProposalStatus::Unknown(normalized.clone()),
        })
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ProposalStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        match raw.parse() {
            Ok(status) => Ok(status),
            Err(never) => match never {},
        }
    }
}

/// Token-weighted vote totals. Governance tokens use 18 decimals, so the
/// raw amounts do not fit in 64 bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VoteTally {
    pub for_votes: u128,
    pub against_votes: u128,
    pub abstain_votes: u128,
}

impl VoteTally {
    pub fn new(for_votes: u128, against_votes: u128, abstain_votes: u128) -> Self {
        Self {
            for_votes,
            against_votes,
            abstain_votes,
        }
    }

    pub fn total(&self) -> u128 {
        self.for_votes
            .saturating_add(self.against_votes)
            .saturating_add(self.abstain_votes)
    }

    /// Share of the total for each side, in percent. All zero when nobody voted.
    pub fn percentages(&self) -> (f64, f64, f64) {
        let total = self.total();
        if total == 0 {
            return (0.0, 0.0, 0.0);
        }
        let total = total as f64;
        (
            self.for_votes as f64 / total * 100.0,
            self.against_votes as f64 / total * 100.0,
            self.abstain_votes as f64 / total * 100.0,
        )
    }
}

/// A proposal as fetched during one sync cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    pub id: String,
    pub title: String,
    pub status: ProposalStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    /// `None` when the listing did not carry vote stats and a detail fetch is needed.
    pub votes: Option<VoteTally>,
    pub quorum: Option<u128>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parsing_is_case_insensitive() {
        assert_eq!("active".parse::<ProposalStatus>().unwrap(), ProposalStatus::Active);
        assert_eq!(
            "crosschainexecuted".parse::<ProposalStatus>().unwrap(),
            ProposalStatus::CrossChainExecuted
        );
        assert_eq!(" Canceled ".parse::<ProposalStatus>().unwrap(), ProposalStatus::Canceled);
    }

    #[test]
    fn unknown_status_is_upper_cased() {
        let status: ProposalStatus = " vetoed ".parse().unwrap();
        assert_eq!(status, ProposalStatus::Unknown("VETOED".to_string()));
        assert_eq!(status.as_str(), "VETOED");
        assert_eq!(status.as_str().parse::<ProposalStatus>().unwrap(), status);
    }

    #[test]
    fn unknown_status_ignores_upstream_case() {
        let lower: ProposalStatus = "vetoed".parse().unwrap();
        let upper: ProposalStatus = "VETOED".parse().unwrap();
        let mixed: ProposalStatus = "Vetoed".parse().unwrap();
        assert_eq!(lower, upper);
        assert_eq!(lower, mixed);
    }

    #[test]
    fn status_deserializes_from_json_string() {
        let status: ProposalStatus = serde_json::from_str("\"queued\"").unwrap();
        assert_eq!(status, ProposalStatus::Queued);
    }

    #[test]
    fn percentages_of_empty_tally_are_zero() {
        assert_eq!(VoteTally::default().percentages(), (0.0, 0.0, 0.0));
    }

    #[test]
    fn percentages_split_total() {
        let (for_pct, against_pct, abstain_pct) = VoteTally::new(75, 20, 5).percentages();
        assert!((for_pct - 75.0).abs() < 1e-9);
        assert!((against_pct - 20.0).abs() < 1e-9);
        assert!((abstain_pct - 5.0).abs() < 1e-9);
    }

    #[test]
    fn total_saturates_instead_of_overflowing() {
        let tally = VoteTally::new(u128::MAX, 1, 1);
        assert_eq!(tally.total(), u128::MAX);
    }
}
