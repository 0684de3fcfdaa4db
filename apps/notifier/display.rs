//! Derived display fields computed from a raw proposal.
//!
//! Everything here is a pure function of the proposal and the current time,
//! so the sync engine can diff snapshots without touching the channel or the
//! store. Status labels and time buckets are table-driven: supporting a new
//! platform status means adding a row to `STATUS_TABLE`.

use crate::models::{
    notifications::{Snapshot, TimeRemaining},
    proposals::{Proposal, ProposalStatus, VoteTally},
};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use std::collections::HashMap;

const SECONDS_PER_HOUR: i64 = 60 * 60;
const SECONDS_PER_DAY: i64 = 24 * SECONDS_PER_HOUR;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusInfo {
    pub label: &'static str,
    /// Voting and execution are over; nothing about the proposal will change.
    pub is_final: bool,
}

static STATUS_TABLE: Lazy<HashMap<ProposalStatus, StatusInfo>> = Lazy::new(|| {
    [
        (ProposalStatus::Draft, "Draft", false),
        (ProposalStatus::Pending, "Pending", false),
        (ProposalStatus::Active, "Active", false),
        (ProposalStatus::Extended, "Extended", false),
        (ProposalStatus::Queued, "Queued", false),
        (ProposalStatus::PendingExecution, "Pending Execution", false),
        (ProposalStatus::Succeeded, "Succeeded", true),
        (ProposalStatus::Defeated, "Defeated", true),
        (ProposalStatus::Executed, "Executed", true),
        (ProposalStatus::CrossChainExecuted, "Executed (Cross-chain)", true),
        (ProposalStatus::CallExecuted, "Executed (Call)", true),
        (ProposalStatus::Expired, "Expired", true),
        (ProposalStatus::Canceled, "Canceled", true),
        (ProposalStatus::Archived, "Archived", true),
    ]
    .into_iter()
    .map(|(status, label, is_final)| (status, StatusInfo { label, is_final }))
    .collect()
});

/// Buckets checked from largest to smallest; the first threshold the
/// remaining time reaches wins.
const TIME_BUCKETS: [(i64, fn(i64) -> TimeRemaining); 2] = [
    (SECONDS_PER_DAY, TimeRemaining::Days),
    (SECONDS_PER_HOUR, TimeRemaining::Hours),
];

pub fn status_info(status: &ProposalStatus) -> Option<StatusInfo> {
    STATUS_TABLE.get(status).copied()
}

pub fn status_label(status: &ProposalStatus) -> String {
    match status_info(status) {
        Some(info) => info.label.to_string(),
        None => title_case(status.as_str()),
    }
}

pub fn is_final(status: &ProposalStatus) -> bool {
    status_info(status).is_some_and(|info| info.is_final)
}

pub fn time_remaining(end_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> TimeRemaining {
    let Some(end_at) = end_at else {
        return TimeRemaining::Unknown;
    };

    let remaining = (end_at - now).num_seconds();
    if remaining <= 0 {
        return TimeRemaining::Ended;
    }

    TIME_BUCKETS
        .iter()
        .find(|(threshold, _)| remaining >= *threshold)
        .map(|(threshold, bucket)| bucket(remaining / threshold))
        .unwrap_or(TimeRemaining::UnderAnHour)
}

/// Quorum counts for and abstain votes, matching OpenZeppelin's
/// `GovernorCountingSimple`.
pub fn quorum_met(votes: &VoteTally, quorum: Option<u128>) -> Option<bool> {
    quorum.map(|quorum| votes.for_votes.saturating_add(votes.abstain_votes) >= quorum)
}

pub fn snapshot(proposal: &Proposal, now: DateTime<Utc>) -> Snapshot {
    let votes = proposal.votes.unwrap_or_default();
    let time_remaining = if is_final(&proposal.status) {
        TimeRemaining::Ended
    } else {
        time_remaining(proposal.end_at, now)
    };

    Snapshot {
        status: proposal.status.clone(),
        status_label: status_label(&proposal.status),
        votes,
        time_remaining,
        quorum_met: quorum_met(&votes, proposal.quorum),
    }
}

fn title_case(raw: &str) -> String {
    raw.split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let lower = word.to_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
