use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One row per proposal that has ever been announced in the channel.
///
/// Vote tallies are token-weighted and routinely exceed `i64`, so they are
/// kept as decimal strings.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tracked_notification")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub proposal_id: String,
    pub message_id: String,
    pub status: String,
    pub status_label: String,
    pub for_votes: String,
    pub against_votes: String,
    pub abstain_votes: String,
    pub time_remaining: String,
    pub quorum_met: Option<bool>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
