#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use notifier::{
    SyncConfig, SyncEngine,
    channel::{ChannelError, NotificationChannel},
    models::{
        notifications::{MessageRef, TrackedNotification},
        proposals::{Proposal, ProposalStatus, VoteTally},
    },
    render::MessageContent,
    source::{ProposalSource, SourceError},
    store::{NotificationStore, StoreError},
};
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};
use tokio::sync::Notify;

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
}

pub fn proposal(id: &str, status: ProposalStatus, votes: (u128, u128, u128)) -> Proposal {
    let created_offset: i64 = id.bytes().map(i64::from).sum();
    Proposal {
        id: id.to_string(),
        title: format!("Proposal {id}"),
        status,
        created_at: Some(now() - Duration::days(10) + Duration::minutes(created_offset)),
        start_at: Some(now() - Duration::days(1)),
        // Mid-bucket, so small clock moves do not change the time remaining.
        end_at: Some(now() + Duration::days(3) + Duration::hours(12)),
        votes: Some(VoteTally::new(votes.0, votes.1, votes.2)),
        quorum: None,
    }
}

#[derive(Default)]
pub struct FakeSource {
    proposals: Mutex<Vec<Proposal>>,
    details: Mutex<HashMap<String, Proposal>>,
    failure: Mutex<Option<SourceError>>,
    pub fetch_calls: AtomicUsize,
    pub detail_calls: AtomicUsize,
    /// When set, `fetch_proposals` signals `entered` and waits for `release`.
    gate: Mutex<Option<(Arc<Notify>, Arc<Notify>)>>,
}

impl FakeSource {
    pub fn set(&self, proposals: Vec<Proposal>) {
        *self.proposals.lock().unwrap() = proposals;
    }

    pub fn set_detail(&self, proposal: Proposal) {
        self.details
            .lock()
            .unwrap()
            .insert(proposal.id.clone(), proposal);
    }

    pub fn fail_next(&self, error: SourceError) {
        *self.failure.lock().unwrap() = Some(error);
    }

    pub fn gate(&self, entered: Arc<Notify>, release: Arc<Notify>) {
        *self.gate.lock().unwrap() = Some((entered, release));
    }
}

#[async_trait]
impl ProposalSource for FakeSource {
    async fn fetch_proposals(&self, _org_id: &str) -> Result<Vec<Proposal>, SourceError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);

        let gate = self.gate.lock().unwrap().take();
        if let Some((entered, release)) = gate {
            entered.notify_one();
            release.notified().await;
        }

        if let Some(error) = self.failure.lock().unwrap().take() {
            return Err(error);
        }
        Ok(self.proposals.lock().unwrap().clone())
    }

    async fn fetch_detail(&self, proposal_id: &str) -> Result<Proposal, SourceError> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        self.details
            .lock()
            .unwrap()
            .get(proposal_id)
            .cloned()
            .ok_or_else(|| SourceError::Fatal(format!("no detail for {proposal_id}")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Post(String),
    Edit(String),
    Delete(String),
}

#[derive(Default)]
pub struct RecordingChannel {
    calls: Mutex<Vec<Call>>,
    contents: Mutex<HashMap<String, MessageContent>>,
    next_id: AtomicUsize,
    missing: Mutex<HashSet<String>>,
    failing_titles: Mutex<HashSet<String>>,
    failing_edits: Mutex<bool>,
}

impl RecordingChannel {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn posts(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Post(_)))
            .count()
    }

    pub fn edits(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Edit(_)))
            .count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn content(&self, message_id: &str) -> Option<MessageContent> {
        self.contents.lock().unwrap().get(message_id).cloned()
    }

    /// Simulates a moderator deleting the message.
    pub fn remove_message(&self, message_id: &str) {
        self.missing.lock().unwrap().insert(message_id.to_string());
        self.contents.lock().unwrap().remove(message_id);
    }

    /// Edits of messages that still exist fail with a transient error.
    pub fn fail_edits(&self, fail: bool) {
        *self.failing_edits.lock().unwrap() = fail;
    }

    /// Posts whose title matches fail with a transient error.
    pub fn fail_posts_titled(&self, title: &str) {
        self.failing_titles.lock().unwrap().insert(title.to_string());
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    async fn post(&self, content: &MessageContent) -> Result<MessageRef, ChannelError> {
        if self.failing_titles.lock().unwrap().contains(&content.title) {
            return Err(ChannelError::Transient("simulated outage".to_string()));
        }
        let id = format!("m{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.calls.lock().unwrap().push(Call::Post(id.clone()));
        self.contents
            .lock()
            .unwrap()
            .insert(id.clone(), content.clone());
        Ok(MessageRef(id))
    }

    async fn edit(&self, message: &MessageRef, content: &MessageContent) -> Result<(), ChannelError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Edit(message.0.clone()));
        if self.missing.lock().unwrap().contains(message.as_str()) {
            return Err(ChannelError::NotFound(message.clone()));
        }
        if *self.failing_edits.lock().unwrap() {
            return Err(ChannelError::Transient("simulated outage".to_string()));
        }
        self.contents
            .lock()
            .unwrap()
            .insert(message.0.clone(), content.clone());
        Ok(())
    }

    async fn delete(&self, message: &MessageRef) -> Result<(), ChannelError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Delete(message.0.clone()));
        if !self.missing.lock().unwrap().insert(message.0.clone()) {
            return Err(ChannelError::NotFound(message.clone()));
        }
        self.contents.lock().unwrap().remove(message.as_str());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<BTreeMap<String, TrackedNotification>>,
    pub puts: AtomicUsize,
    fail_reads: Mutex<bool>,
    fail_writes: Mutex<bool>,
}

impl MemoryStore {
    pub fn rows(&self) -> BTreeMap<String, TrackedNotification> {
        self.rows.lock().unwrap().clone()
    }

    pub fn row(&self, proposal_id: &str) -> Option<TrackedNotification> {
        self.rows.lock().unwrap().get(proposal_id).cloned()
    }

    pub fn fail_reads(&self, fail: bool) {
        *self.fail_reads.lock().unwrap() = fail;
    }

    pub fn fail_writes(&self, fail: bool) {
        *self.fail_writes.lock().unwrap() = fail;
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn get(&self, proposal_id: &str) -> Result<Option<TrackedNotification>, StoreError> {
        if *self.fail_reads.lock().unwrap() {
            return Err(StoreError::Unavailable("simulated read failure".to_string()));
        }
        Ok(self.row(proposal_id))
    }

    async fn all(&self) -> Result<Vec<TrackedNotification>, StoreError> {
        if *self.fail_reads.lock().unwrap() {
            return Err(StoreError::Unavailable("simulated read failure".to_string()));
        }
        Ok(self.rows.lock().unwrap().values().cloned().collect())
    }

    async fn put(&self, notification: &TrackedNotification) -> Result<(), StoreError> {
        if *self.fail_writes.lock().unwrap() {
            return Err(StoreError::Unavailable("simulated write failure".to_string()));
        }
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.rows
            .lock()
            .unwrap()
            .insert(notification.proposal_id.clone(), notification.clone());
        Ok(())
    }

    async fn clear_all(&self) -> Result<u64, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let removed = rows.len() as u64;
        rows.clear();
        Ok(removed)
    }
}

pub struct Harness {
    pub source: Arc<FakeSource>,
    pub channel: Arc<RecordingChannel>,
    pub store: Arc<MemoryStore>,
    pub engine: Arc<SyncEngine>,
}

pub fn harness() -> Harness {
    harness_with(|_| {})
}

pub fn harness_with(configure: impl FnOnce(&mut SyncConfig)) -> Harness {
    let source = Arc::new(FakeSource::default());
    let channel = Arc::new(RecordingChannel::default());
    let store = Arc::new(MemoryStore::default());

    let mut config = SyncConfig::new("org-1", "wormhole");
    config.post_delay = std::time::Duration::ZERO;
    configure(&mut config);

    let engine = Arc::new(SyncEngine::new(
        source.clone(),
        channel.clone(),
        store.clone(),
        config,
    ));
    Harness {
        source,
        channel,
        store,
        engine,
    }
}
