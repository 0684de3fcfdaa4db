use crate::models::{
    notifications::Snapshot,
    proposals::{Proposal, VoteTally},
};
use chrono::{DateTime, Utc};

const EMBED_COLOR: u32 = 0xB291DE;
const TITLE_MAX_CHARS: usize = 256;
const BAR_SEGMENTS: usize = 10;
const DATE_FORMAT: &str = "%m/%d/%Y %H:%M UTC";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Channel-agnostic message body; the channel client maps it onto its own
/// wire format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageContent {
    pub title: String,
    pub url: String,
    pub color: u32,
    pub fields: Vec<MessageField>,
    pub footer: Option<String>,
}

pub fn proposal_url(governor_slug: &str, proposal_id: &str) -> String {
    format!("https://www.tally.xyz/gov/{governor_slug}/proposal/{proposal_id}")
}

pub fn render(proposal: &Proposal, snapshot: &Snapshot, governor_slug: &str) -> MessageContent {
    let mut fields = vec![
        field("Status", snapshot.status_label.clone(), true),
        field("Voting Ends", format_date(proposal.end_at), true),
        field("Time Remaining", snapshot.time_remaining.to_string(), true),
        field("Voting", voting_breakdown(&snapshot.votes), false),
    ];

    if let Some(met) = snapshot.quorum_met {
        let value = if met { "Reached" } else { "Not reached" };
        fields.push(field("Quorum", value.to_string(), true));
    }

    MessageContent {
        title: truncate_chars(&proposal.title, TITLE_MAX_CHARS),
        url: proposal_url(governor_slug, &proposal.id),
        color: EMBED_COLOR,
        fields,
        footer: proposal
            .created_at
            .map(|created| format!("Created: {}", created.format(DATE_FORMAT))),
    }
}

fn field(name: &str, value: String, inline: bool) -> MessageField {
    MessageField {
        name: name.to_string(),
        value,
        inline,
    }
}

fn format_date(date: Option<DateTime<Utc>>) -> String {
    date.map(|d| d.format(DATE_FORMAT).to_string())
        .unwrap_or_else(|| "N/A".to_string())
}

fn voting_breakdown(votes: &VoteTally) -> String {
    let (for_pct, against_pct, abstain_pct) = votes.percentages();
    [
        (for_pct, '🟩', "FOR"),
        (against_pct, '🟥', "AGAINST"),
        (abstain_pct, '🟨', "ABSTAIN"),
    ]
    .iter()
    .map(|(pct, filled, side)| format!("{}  –  {pct:.1}% {side}", bar(*pct, *filled)))
    .collect::<Vec<_>>()
    .join("\n")
}

fn bar(percentage: f64, filled: char) -> String {
    let filled_count = ((percentage / 10.0).round() as usize).min(BAR_SEGMENTS);
    let mut bar: String = std::iter::repeat_n(filled, filled_count).collect();
    bar.extend(std::iter::repeat_n('⬜', BAR_SEGMENTS - filled_count));
    bar
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max - 1).collect();
    truncated.push('…');
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        display,
        models::proposals::{ProposalStatus, VoteTally},
    };
    use chrono::TimeZone;

    fn proposal() -> Proposal {
        Proposal {
            id: "42".to_string(),
            title: "Fund the grants program".to_string(),
            status: ProposalStatus::Active,
            created_at: Some(Utc.with_ymd_and_hms(2025, 2, 20, 9, 30, 0).unwrap()),
            start_at: None,
            end_at: Some(Utc.with_ymd_and_hms(2025, 3, 4, 12, 0, 0).unwrap()),
            votes: Some(VoteTally::new(75, 25, 0)),
            quorum: Some(50),
        }
    }

    #[test]
    fn renders_status_votes_and_links() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let p = proposal();
        let content = render(&p, &display::snapshot(&p, now), "wormhole");

        assert_eq!(content.url, "https://www.tally.xyz/gov/wormhole/proposal/42");
        assert_eq!(content.title, "Fund the grants program");
        assert_eq!(content.footer.as_deref(), Some("Created: 02/20/2025 09:30 UTC"));

        let value = |name: &str| {
            content
                .fields
                .iter()
                .find(|f| f.name == name)
                .map(|f| f.value.clone())
                .unwrap()
        };
        assert_eq!(value("Status"), "Active");
        assert_eq!(value("Voting Ends"), "03/04/2025 12:00 UTC");
        assert_eq!(value("Time Remaining"), "3 days");
        assert_eq!(value("Quorum"), "Reached");
        assert!(value("Voting").contains("75.0% FOR"));
        assert!(value("Voting").contains("25.0% AGAINST"));
    }

    #[test]
    fn bar_has_fixed_width() {
        assert_eq!(bar(0.0, '🟩').chars().count(), BAR_SEGMENTS);
        assert_eq!(bar(100.0, '🟩').chars().filter(|c| *c == '🟩').count(), 10);
        assert_eq!(bar(44.0, '🟥').chars().filter(|c| *c == '🟥').count(), 4);
    }

    #[test]
    fn long_titles_are_truncated() {
        let long = "x".repeat(300);
        let truncated = truncate_chars(&long, TITLE_MAX_CHARS);
        assert_eq!(truncated.chars().count(), TITLE_MAX_CHARS);
        assert!(truncated.ends_with('…'));
    }
}
