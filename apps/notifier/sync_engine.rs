//! Proposal synchronization and notification reconciliation.
//!
//! One cycle fetches the organization's proposals, compares each one's
//! rendered snapshot with what the store says was last published, and posts
//! or edits channel messages until the two agree. Store rows are written only
//! after the channel call they describe has succeeded.

use crate::{
    channel::{ChannelError, NotificationChannel},
    display,
    models::{
        notifications::{MessageRef, Snapshot, TrackedNotification},
        proposals::{Proposal, ProposalStatus},
    },
    render,
    source::{ProposalSource, SourceError},
    store::{NotificationStore, StoreError},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub org_id: String,
    pub governor_slug: String,
    /// Pause after each new announcement so a burst of proposals does not
    /// trip the channel's rate limit.
    pub post_delay: Duration,
    /// Statuses eligible for a first announcement. `None` announces everything.
    pub announce_statuses: Option<HashSet<ProposalStatus>>,
}

impl SyncConfig {
    pub fn new(org_id: impl Into<String>, governor_slug: impl Into<String>) -> Self {
        Self {
            org_id: org_id.into(),
            governor_slug: governor_slug.into(),
            post_delay: Duration::from_secs(1),
            announce_statuses: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub fetched: usize,
    pub created: usize,
    pub updated: usize,
    /// Edits whose message had vanished and was posted again.
    pub recreated: usize,
    pub unchanged: usize,
    /// Not announced because of the announce filter.
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClearReport {
    pub removed: u64,
    pub messages_deleted: usize,
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to fetch proposals: {0}")]
    Fetch(#[from] SourceError),
    #[error("notification store failed: {0}")]
    Store(#[from] StoreError),
    #[error("a sync cycle is already in progress")]
    CycleInProgress,
}

/// Failure scoped to a single proposal. Only `Store` escalates to the cycle.
#[derive(Debug, Error)]
enum ReconcileError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

enum Reconciled {
    Created(TrackedNotification),
    Updated(TrackedNotification),
    Recreated(TrackedNotification),
    Unchanged,
    Skipped,
}

pub struct SyncEngine {
    source: Arc<dyn ProposalSource>,
    channel: Arc<dyn NotificationChannel>,
    store: Arc<dyn NotificationStore>,
    config: SyncConfig,
    cycle_guard: Mutex<()>,
}

impl SyncEngine {
    pub fn new(
        source: Arc<dyn ProposalSource>,
        channel: Arc<dyn NotificationChannel>,
        store: Arc<dyn NotificationStore>,
        config: SyncConfig,
    ) -> Self {
        Self {
            source,
            channel,
            store,
            config,
            cycle_guard: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub async fn run_cycle(&self) -> Result<CycleReport, SyncError> {
        self.run_cycle_at(Utc::now()).await
    }

    /// Runs one reconciliation pass as of `now`.
    ///
    /// Returns `CycleInProgress` without touching any collaborator if another
    /// cycle (or an administrative clear) currently holds the engine.
    #[instrument(name = "sync_cycle", skip(self), fields(org_id = %self.config.org_id))]
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> Result<CycleReport, SyncError> {
        let _guard = self
            .cycle_guard
            .try_lock()
            .map_err(|_| SyncError::CycleInProgress)?;

        let mut proposals = match self.source.fetch_proposals(&self.config.org_id).await {
            Ok(proposals) => proposals,
            Err(e) => {
                if e.is_transient() {
                    warn!(error = %e, "Proposal fetch failed, cycle aborted");
                } else {
                    error!(error = %e, "Proposal fetch failed, cycle aborted");
                }
                return Err(e.into());
            }
        };

        let mut tracked: HashMap<String, TrackedNotification> = self
            .store
            .all()
            .await?
            .into_iter()
            .map(|row| (row.proposal_id.clone(), row))
            .collect();

        // Oldest first so announcements land in the order proposals were made.
        proposals.sort_by_key(|p| p.created_at);

        let mut report = CycleReport {
            fetched: proposals.len(),
            ..Default::default()
        };
        info!(
            fetched = report.fetched,
            tracked = tracked.len(),
            "Reconciling proposals"
        );

        for proposal in proposals {
            let proposal_id = proposal.id.clone();
            let outcome = self
                .reconcile(proposal, tracked.get(&proposal_id), now)
                .await;
            match outcome {
                Ok(Reconciled::Created(row)) => {
                    report.created += 1;
                    tracked.insert(proposal_id, row);
                }
                Ok(Reconciled::Updated(row)) => {
                    report.updated += 1;
                    tracked.insert(proposal_id, row);
                }
                Ok(Reconciled::Recreated(row)) => {
                    report.recreated += 1;
                    tracked.insert(proposal_id, row);
                }
                Ok(Reconciled::Unchanged) => report.unchanged += 1,
                Ok(Reconciled::Skipped) => report.skipped += 1,
                Err(ReconcileError::Store(e)) => {
                    error!(proposal_id = %proposal_id, error = %e, "Store write failed, cycle aborted");
                    return Err(e.into());
                }
                Err(e) => {
                    warn!(proposal_id = %proposal_id, error = %e, "Failed to reconcile proposal, will retry next cycle");
                    report.failed += 1;
                }
            }
        }

        info!(
            created = report.created,
            updated = report.updated,
            recreated = report.recreated,
            unchanged = report.unchanged,
            skipped = report.skipped,
            failed = report.failed,
            "Sync cycle finished"
        );
        Ok(report)
    }

    /// Administrative reset: forget every tracked notification so the next
    /// cycle announces all fetched proposals again. With `purge`, the tracked
    /// messages are deleted from the channel first (best effort).
    ///
    /// Waits for an in-flight cycle to finish.
    #[instrument(skip(self))]
    pub async fn clear_notifications(&self, purge: bool) -> Result<ClearReport, StoreError> {
        let _guard = self.cycle_guard.lock().await;

        let mut messages_deleted = 0;
        if purge {
            for row in self.store.all().await? {
                match self.channel.delete(&row.message_ref).await {
                    Ok(()) => messages_deleted += 1,
                    Err(ChannelError::NotFound(_)) => {
                        debug!(proposal_id = %row.proposal_id, "Message already gone");
                    }
                    Err(e) => {
                        warn!(proposal_id = %row.proposal_id, error = %e, "Failed to delete message");
                    }
                }
            }
        }

        let removed = self.store.clear_all().await?;
        info!(removed, messages_deleted, "Cleared tracked notifications");
        Ok(ClearReport {
            removed,
            messages_deleted,
        })
    }

    #[instrument(skip_all, fields(proposal_id = %proposal.id))]
    async fn reconcile(
        &self,
        proposal: Proposal,
        existing: Option<&TrackedNotification>,
        now: DateTime<Utc>,
    ) -> Result<Reconciled, ReconcileError> {
        let proposal = self.with_votes(proposal).await?;
        let snapshot = display::snapshot(&proposal, now);

        match existing {
            None => self.announce(&proposal, snapshot, now).await,
            Some(tracked) if tracked.snapshot == snapshot => {
                debug!("Notification up to date");
                Ok(Reconciled::Unchanged)
            }
            Some(tracked) => self.refresh(&proposal, tracked, snapshot, now).await,
        }
    }

    async fn with_votes(&self, proposal: Proposal) -> Result<Proposal, SourceError> {
        if proposal.votes.is_some() {
            return Ok(proposal);
        }
        debug!("Listing carried no vote stats, fetching detail");
        let mut detail = self.source.fetch_detail(&proposal.id).await?;
        if detail.created_at.is_none() {
            detail.created_at = proposal.created_at;
        }
        Ok(detail)
    }

    async fn announce(
        &self,
        proposal: &Proposal,
        snapshot: Snapshot,
        now: DateTime<Utc>,
    ) -> Result<Reconciled, ReconcileError> {
        if let Some(allowed) = &self.config.announce_statuses {
            if !allowed.contains(&proposal.status) {
                debug!(status = %proposal.status, "Status not eligible for announcement");
                return Ok(Reconciled::Skipped);
            }
        }

        let content = render::render(proposal, &snapshot, &self.config.governor_slug);
        let message_ref = self.channel.post(&content).await?;
        let row = TrackedNotification::new(proposal.id.clone(), message_ref, snapshot, now);
        self.store.put(&row).await?;
        info!(message_id = %row.message_ref, status = %proposal.status, "Announced new proposal");

        if !self.config.post_delay.is_zero() {
            tokio::time::sleep(self.config.post_delay).await;
        }
        Ok(Reconciled::Created(row))
    }

    async fn refresh(
        &self,
        proposal: &Proposal,
        tracked: &TrackedNotification,
        snapshot: Snapshot,
        now: DateTime<Utc>,
    ) -> Result<Reconciled, ReconcileError> {
        let content = render::render(proposal, &snapshot, &self.config.governor_slug);

        let (message_ref, recreated): (MessageRef, bool) =
            match self.channel.edit(&tracked.message_ref, &content).await {
                Ok(()) => (tracked.message_ref.clone(), false),
                Err(ChannelError::NotFound(missing)) => {
                    warn!(message_id = %missing, "Tracked message is gone, posting a new one");
                    (self.channel.post(&content).await?, true)
                }
                Err(e) => return Err(e.into()),
            };

        let row = tracked.updated(message_ref, snapshot, now);
        self.store.put(&row).await?;
        info!(
            message_id = %row.message_ref,
            status = %proposal.status,
            recreated,
            "Updated proposal notification"
        );

        Ok(if recreated {
            Reconciled::Recreated(row)
        } else {
            Reconciled::Updated(row)
        })
    }
}
