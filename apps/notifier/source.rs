use crate::models::proposals::Proposal;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    /// Network trouble, rate limiting or a 5xx; the next cycle retries.
    #[error("transient proposal fetch error: {0}")]
    Transient(String),
    /// Bad credentials or a response we cannot interpret.
    #[error("fatal proposal fetch error: {0}")]
    Fatal(String),
}

impl SourceError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SourceError::Transient(_))
    }
}

/// Where proposals come from.
#[async_trait]
pub trait ProposalSource: Send + Sync {
    /// Current proposals for the organization, one page as served upstream.
    async fn fetch_proposals(&self, org_id: &str) -> Result<Vec<Proposal>, SourceError>;

    /// Full detail, including vote stats, for a single proposal.
    async fn fetch_detail(&self, proposal_id: &str) -> Result<Proposal, SourceError>;
}
