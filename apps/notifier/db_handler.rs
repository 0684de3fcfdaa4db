use crate::{
    display,
    models::notifications::{MessageRef, Snapshot, TimeRemaining, TrackedNotification},
    models::proposals::{ProposalStatus, VoteTally},
    store::{NotificationStore, StoreError},
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use notifier_db::models::tracked_notification;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, EntityTrait, QueryOrder,
    Schema, Set, sea_query::OnConflict,
};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use utils::errors::{DATABASE_CONNECTION_FAILED, DATABASE_SCHEMA_FAILED};

/// sea-orm backed ledger of announced proposals.
#[derive(Clone)]
pub struct DbHandler {
    pub conn: DatabaseConnection,
}

impl DbHandler {
    #[instrument(skip(database_url))]
    pub async fn new(database_url: &str) -> Result<Self> {
        let mut opt = ConnectOptions::new(database_url.to_string());
        opt.max_connections(5)
            .min_connections(1)
            .connect_timeout(Duration::from_secs(15))
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(5 * 60))
            .max_lifetime(Duration::from_secs(30 * 60))
            .sqlx_logging(false);

        let conn = Database::connect(opt)
            .await
            .context(DATABASE_CONNECTION_FAILED)?;

        Self::from_connection(conn).await
    }

    /// Wraps an existing connection, creating the table if it is missing.
    pub async fn from_connection(conn: DatabaseConnection) -> Result<Self> {
        let backend = conn.get_database_backend();
        let mut statement =
            Schema::new(backend).create_table_from_entity(tracked_notification::Entity);
        statement.if_not_exists();

        conn.execute(backend.build(&statement))
            .await
            .context(DATABASE_SCHEMA_FAILED)?;

        info!("Notification store ready");
        Ok(Self { conn })
    }
}

fn to_active_model(row: &TrackedNotification) -> tracked_notification::ActiveModel {
    let snapshot = &row.snapshot;
    tracked_notification::ActiveModel {
        proposal_id: Set(row.proposal_id.clone()),
        message_id: Set(row.message_ref.0.clone()),
        status: Set(snapshot.status.as_str().to_string()),
        status_label: Set(snapshot.status_label.clone()),
        for_votes: Set(snapshot.votes.for_votes.to_string()),
        against_votes: Set(snapshot.votes.against_votes.to_string()),
        abstain_votes: Set(snapshot.votes.abstain_votes.to_string()),
        time_remaining: Set(snapshot.time_remaining.to_key()),
        quorum_met: Set(snapshot.quorum_met),
        created_at: Set(row.created_at.naive_utc()),
        updated_at: Set(row.updated_at.naive_utc()),
    }
}

/// Decodes a stored row. Unreadable columns never fail the read: a bad tally
/// decodes as empty and a bad bucket as `Unknown`, so the row mismatches the
/// next fresh snapshot and gets rewritten by one corrective edit.
fn from_model(model: tracked_notification::Model) -> TrackedNotification {
    let amounts = [&model.for_votes, &model.against_votes, &model.abstain_votes]
        .map(|value| value.parse::<u128>());
    let votes = match amounts {
        [Ok(for_votes), Ok(against_votes), Ok(abstain_votes)] => {
            VoteTally::new(for_votes, against_votes, abstain_votes)
        }
        _ => {
            warn!(
                proposal_id = %model.proposal_id,
                for_votes = %model.for_votes,
                against_votes = %model.against_votes,
                abstain_votes = %model.abstain_votes,
                "Stored tally is unreadable, treating it as empty"
            );
            VoteTally::default()
        }
    };

    let time_remaining =
        TimeRemaining::from_key(&model.time_remaining).unwrap_or(TimeRemaining::Unknown);

    let status = match model.status.parse::<ProposalStatus>() {
        Ok(status) => status,
        Err(never) => match never {},
    };
    let status_label = if model.status_label.is_empty() {
        display::status_label(&status)
    } else {
        model.status_label.clone()
    };

    TrackedNotification {
        proposal_id: model.proposal_id.clone(),
        message_ref: MessageRef(model.message_id.clone()),
        snapshot: Snapshot {
            status,
            status_label,
            votes,
            time_remaining,
            quorum_met: model.quorum_met,
        },
        created_at: model.created_at.and_utc(),
        updated_at: model.updated_at.and_utc(),
    }
}

#[async_trait]
impl NotificationStore for DbHandler {
    #[instrument(skip(self))]
    async fn get(&self, proposal_id: &str) -> Result<Option<TrackedNotification>, StoreError> {
        Ok(tracked_notification::Entity::find_by_id(proposal_id.to_string())
            .one(&self.conn)
            .await?
            .map(from_model))
    }

    #[instrument(skip(self))]
    async fn all(&self) -> Result<Vec<TrackedNotification>, StoreError> {
        Ok(tracked_notification::Entity::find()
            .order_by_asc(tracked_notification::Column::CreatedAt)
            .all(&self.conn)
            .await?
            .into_iter()
            .map(from_model)
            .collect())
    }

    #[instrument(skip(self, notification), fields(proposal_id = %notification.proposal_id))]
    async fn put(&self, notification: &TrackedNotification) -> Result<(), StoreError> {
        let on_conflict = OnConflict::column(tracked_notification::Column::ProposalId)
            .update_columns([
                tracked_notification::Column::MessageId,
                tracked_notification::Column::Status,
                tracked_notification::Column::StatusLabel,
                tracked_notification::Column::ForVotes,
                tracked_notification::Column::AgainstVotes,
                tracked_notification::Column::AbstainVotes,
                tracked_notification::Column::TimeRemaining,
                tracked_notification::Column::QuorumMet,
                tracked_notification::Column::UpdatedAt,
            ])
            .to_owned();

        tracked_notification::Entity::insert(to_active_model(notification))
            .on_conflict(on_conflict)
            .exec_without_returning(&self.conn)
            .await?;

        debug!("Tracked notification upserted");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn clear_all(&self) -> Result<u64, StoreError> {
        let result = tracked_notification::Entity::delete_many()
            .exec(&self.conn)
            .await?;
        info!(removed = result.rows_affected, "Cleared tracked notifications");
        Ok(result.rows_affected)
    }
}
