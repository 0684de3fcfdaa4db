use crate::{
    models::proposals::{Proposal, ProposalStatus, VoteTally},
    source::{ProposalSource, SourceError},
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{
    Client, StatusCode,
    header::{CONTENT_TYPE, HeaderMap, HeaderValue, RETRY_AFTER, USER_AGENT},
};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::json;
use std::time::Duration;
use tokio::{
    sync::Mutex,
    time::{Instant, sleep},
};
use tracing::{debug, info, instrument, warn};
use utils::errors::HTTP_CLIENT_BUILD_FAILED;

pub const TALLY_GRAPHQL_ENDPOINT: &str = "https://api.tally.xyz/query";

const DEFAULT_MAX_RETRIES: usize = 3;
const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(2);
const MAX_BACKOFF: Duration = Duration::from_secs(60);
// Tally's free tier allows roughly one request per second.
const DEFAULT_MIN_REQUEST_SPACING: Duration = Duration::from_millis(1100);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

const PROPOSAL_FIELDS: &str = r#"
    id
    status
    createdAt
    quorum
    metadata {
      title
    }
    start {
      ... on Block {
        timestamp
      }
      ... on BlocklessTimestamp {
        timestamp
      }
    }
    end {
      ... on Block {
        timestamp
      }
      ... on BlocklessTimestamp {
        timestamp
      }
    }
    block {
      timestamp
    }
    voteStats {
      votesCount
      type
    }
"#;

#[derive(Deserialize, Debug)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Deserialize, Debug)]
struct GraphQlError {
    message: String,
}

#[derive(Deserialize, Debug)]
struct ProposalsData {
    proposals: ProposalConnection,
}

#[derive(Deserialize, Debug)]
struct ProposalConnection {
    nodes: Vec<TallyProposal>,
}

#[derive(Deserialize, Debug)]
struct ProposalDetailData {
    proposal: Option<TallyProposal>,
}

/// A proposal node as returned by the Tally GraphQL API.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TallyProposal {
    pub id: String,
    pub status: ProposalStatus,
    pub created_at: Option<TallyTimestamp>,
    pub quorum: Option<TallyAmount>,
    pub metadata: Option<TallyMetadata>,
    pub start: Option<TallyTimeRef>,
    pub end: Option<TallyTimeRef>,
    pub block: Option<TallyTimeRef>,
    pub vote_stats: Option<Vec<TallyVoteStat>>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct TallyMetadata {
    pub title: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct TallyTimeRef {
    pub timestamp: Option<TallyTimestamp>,
}

/// Tally serves ISO-8601 strings, but older payloads carry epoch millis.
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum TallyTimestamp {
    Millis(i64),
    Text(String),
}

impl TallyTimestamp {
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            TallyTimestamp::Millis(ms) => DateTime::from_timestamp_millis(*ms),
            TallyTimestamp::Text(text) => DateTime::parse_from_rfc3339(text)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
                .or_else(|| text.parse::<i64>().ok().and_then(DateTime::from_timestamp_millis)),
        }
    }
}

/// Big integers arrive as strings; be lenient about numbers too.
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum TallyAmount {
    Number(u64),
    Text(String),
}

impl TallyAmount {
    pub fn to_u128(&self) -> Option<u128> {
        match self {
            TallyAmount::Number(n) => Some(u128::from(*n)),
            TallyAmount::Text(text) => {
                let integer = text.trim().split('.').next().unwrap_or_default();
                integer.parse().ok()
            }
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TallyVoteStat {
    pub votes_count: TallyAmount,
    #[serde(rename = "type")]
    pub vote_type: String,
}

impl TallyProposal {
    pub fn into_proposal(self) -> Result<Proposal, String> {
        let title = self
            .metadata
            .and_then(|m| m.title)
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| "N/A".to_string());

        let votes = match self.vote_stats {
            None => None,
            Some(stats) => {
                let mut tally = VoteTally::default();
                for stat in stats {
                    let amount = stat.votes_count.to_u128().ok_or_else(|| {
                        format!("invalid votesCount {:?} for {}", stat.votes_count, self.id)
                    })?;
                    match stat.vote_type.to_ascii_lowercase().as_str() {
                        "for" => tally.for_votes = amount,
                        "against" => tally.against_votes = amount,
                        "abstain" => tally.abstain_votes = amount,
                        // pendingfor / pendingagainst etc. are cross-chain votes not yet counted
                        _ => {}
                    }
                }
                Some(tally)
            }
        };

        let timestamp = |time_ref: Option<TallyTimeRef>| {
            time_ref
                .and_then(|t| t.timestamp)
                .and_then(|t| t.to_datetime())
        };
        let created_at = self
            .created_at
            .and_then(|t| t.to_datetime())
            .or_else(|| timestamp(self.block));

        Ok(Proposal {
            id: self.id,
            title,
            status: self.status,
            created_at,
            start_at: timestamp(self.start),
            end_at: timestamp(self.end),
            votes,
            quorum: self.quorum.and_then(|q| q.to_u128()),
        })
    }
}

/// Client for the Tally GraphQL API.
pub struct TallyApi {
    client: Client,
    endpoint: String,
    page_limit: u32,
    max_retries: usize,
    initial_backoff: Duration,
    min_request_spacing: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl TallyApi {
    pub fn new(api_key: &str, page_limit: u32) -> Result<Self> {
        Self::new_with_endpoint(TALLY_GRAPHQL_ENDPOINT, api_key, page_limit)
    }

    pub fn new_with_endpoint(endpoint: &str, api_key: &str, page_limit: u32) -> Result<Self> {
        let client = Client::builder()
            .default_headers(Self::default_headers(api_key)?)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context(HTTP_CLIENT_BUILD_FAILED)?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            page_limit,
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            min_request_spacing: DEFAULT_MIN_REQUEST_SPACING,
            last_request: Mutex::new(None),
        })
    }

    pub fn with_retry_policy(mut self, max_retries: usize, initial_backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.initial_backoff = initial_backoff;
        self
    }

    pub fn with_min_request_spacing(mut self, spacing: Duration) -> Self {
        self.min_request_spacing = spacing;
        self
    }

    fn default_headers(api_key: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static("proposal-notifier/0.1 reqwest/0.12"),
        );
        headers.insert(
            "Api-Key",
            HeaderValue::from_str(api_key).context("TALLY_API_KEY is not a valid header value")?,
        );
        Ok(headers)
    }

    /// Sleeps until at least `min_request_spacing` has passed since the
    /// previous request went out.
    async fn wait_for_slot(&self) {
        let mut last_request = self.last_request.lock().await;
        if let Some(previous) = *last_request {
            let elapsed = previous.elapsed();
            if elapsed < self.min_request_spacing {
                sleep(self.min_request_spacing - elapsed).await;
            }
        }
        *last_request = Some(Instant::now());
    }

    fn retry_delay(&self, delay: Duration) -> Duration {
        let jitter = delay.mul_f64(rand::random::<f64>() * 0.3);
        (delay + jitter).min(MAX_BACKOFF)
    }

    fn get_retry_after(headers: &HeaderMap, default: Duration) -> Duration {
        headers
            .get(RETRY_AFTER)
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(default)
    }

    #[instrument(skip(self, query, variables), fields(endpoint = %self.endpoint))]
    async fn execute_query<T>(&self, query: &str, variables: serde_json::Value) -> Result<T, SourceError>
    where
        T: DeserializeOwned,
    {
        let body = json!({ "query": query, "variables": variables });
        let mut attempt = 0;
        let mut delay = self.initial_backoff;

        loop {
            self.wait_for_slot().await;

            let response = match self.client.post(&self.endpoint).json(&body).send().await {
                Ok(response) => response,
                Err(e) => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        return Err(SourceError::Transient(format!(
                            "max retries reached, last error: {e}"
                        )));
                    }
                    let wait = self.retry_delay(delay);
                    warn!(error = %e, attempt, wait = ?wait, "Request error, retrying");
                    sleep(wait).await;
                    delay = (delay * 2).min(MAX_BACKOFF);
                    continue;
                }
            };

            match response.status() {
                StatusCode::OK => {
                    let text = response.text().await.map_err(|e| {
                        SourceError::Transient(format!("failed to read response body: {e}"))
                    })?;
                    return Self::parse_graphql(&text);
                }
                StatusCode::TOO_MANY_REQUESTS => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        return Err(SourceError::Transient(
                            "rate limited (HTTP 429), max retries reached".to_string(),
                        ));
                    }
                    let wait = Self::get_retry_after(response.headers(), self.retry_delay(delay));
                    warn!(attempt, wait = ?wait, "Rate limited, retrying");
                    sleep(wait).await;
                    delay = delay.max(wait).saturating_mul(2).min(MAX_BACKOFF);
                }
                status if status.is_server_error() => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        return Err(SourceError::Transient(format!(
                            "server error HTTP {status}, max retries reached"
                        )));
                    }
                    let wait = self.retry_delay(delay);
                    warn!(status = %status, attempt, wait = ?wait, "Server error, retrying");
                    sleep(wait).await;
                    delay = (delay * 2).min(MAX_BACKOFF);
                }
                status @ (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => {
                    let body = response.text().await.unwrap_or_default();
                    return Err(SourceError::Fatal(format!(
                        "authentication failed with HTTP {status}: {body}"
                    )));
                }
                status => {
                    let body = response.text().await.unwrap_or_default();
                    return Err(SourceError::Fatal(format!(
                        "request failed with HTTP {status}: {body}"
                    )));
                }
            }
        }
    }

    fn parse_graphql<T: DeserializeOwned>(text: &str) -> Result<T, SourceError> {
        let response: GraphQlResponse<T> = serde_json::from_str(text)
            .map_err(|e| SourceError::Fatal(format!("failed to parse response: {e}")))?;

        let messages: Vec<&str> = response.errors.iter().map(|e| e.message.as_str()).collect();
        match response.data {
            Some(data) => {
                if !messages.is_empty() {
                    warn!(errors = ?messages, "GraphQL response carried errors alongside data");
                }
                Ok(data)
            }
            None if messages
                .iter()
                .any(|m| m.to_ascii_lowercase().contains("rate limit")) =>
            {
                Err(SourceError::Transient(messages.join("; ")))
            }
            None if messages.is_empty() => {
                Err(SourceError::Fatal("response carried no data".to_string()))
            }
            None => Err(SourceError::Fatal(messages.join("; "))),
        }
    }
}

#[async_trait]
impl ProposalSource for TallyApi {
    #[instrument(skip(self))]
    async fn fetch_proposals(&self, org_id: &str) -> Result<Vec<Proposal>, SourceError> {
        let query = format!(
            "query GovernanceProposals($input: ProposalsInput!) {{ proposals(input: $input) {{ nodes {{ ... on Proposal {{ {PROPOSAL_FIELDS} }} }} }} }}"
        );
        let variables = json!({
            "input": {
                "filters": { "organizationId": org_id },
                "sort": { "sortBy": "id", "isDescending": true },
                "page": { "limit": self.page_limit }
            }
        });

        let data: ProposalsData = self.execute_query(&query, variables).await?;

        let mut proposals = Vec::with_capacity(data.proposals.nodes.len());
        for node in data.proposals.nodes {
            let id = node.id.clone();
            match node.into_proposal() {
                Ok(proposal) => proposals.push(proposal),
                Err(reason) => warn!(proposal_id = %id, reason, "Skipping malformed proposal"),
            }
        }

        info!(org_id, count = proposals.len(), "Fetched proposals from Tally");
        Ok(proposals)
    }

    #[instrument(skip(self))]
    async fn fetch_detail(&self, proposal_id: &str) -> Result<Proposal, SourceError> {
        let query = format!(
            "query ProposalDetail($input: ProposalInput!) {{ proposal(input: $input) {{ {PROPOSAL_FIELDS} }} }}"
        );
        let variables = json!({ "input": { "id": proposal_id } });

        let data: ProposalDetailData = self.execute_query(&query, variables).await?;
        let node = data
            .proposal
            .ok_or_else(|| SourceError::Fatal(format!("proposal {proposal_id} not found")))?;

        debug!(proposal_id, "Fetched proposal detail");
        node.into_proposal().map_err(SourceError::Fatal)
    }
}
