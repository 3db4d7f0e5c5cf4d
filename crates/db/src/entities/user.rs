//! User (actor) entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "user")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub username: String,

    pub username_lower: String,

    /// NULL = local user, Some(host) = remote user
    #[sea_orm(nullable)]
    pub host: Option<String>,

    /// Display name
    #[sea_orm(nullable)]
    pub name: Option<String>,

    /// Is this account suspended?
    #[sea_orm(default_value = false)]
    pub is_suspended: bool,

    /// `ActivityPub` inbox URL (remote users)
    #[sea_orm(nullable)]
    pub inbox: Option<String>,

    /// `ActivityPub` shared inbox URL (remote users)
    #[sea_orm(nullable)]
    pub shared_inbox: Option<String>,

    /// `ActivityPub` URI
    #[sea_orm(nullable)]
    pub uri: Option<String>,

    /// Last time this remote user was fetched
    #[sea_orm(nullable)]
    pub last_fetched_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,

    #[sea_orm(nullable)]
    pub updated_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_one = "super::user_keypair::Entity")]
    Keypair,
}

impl Related<super::user_keypair::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Keypair.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
