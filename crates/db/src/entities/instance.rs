//! Instance entity: reachability record per remote host.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Remote server in the federation network. Consulted before delivery to
/// skip dead or blocked destinations.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "instance")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// The hostname of this instance (unique identifier).
    #[sea_orm(unique)]
    pub host: String,

    /// Whether this instance is suspended (never delivered to).
    #[sea_orm(default_value = false)]
    pub is_suspended: bool,

    /// Whether recent exchanges with this instance have been failing.
    #[sea_orm(default_value = false)]
    pub is_not_responding: bool,

    /// Latest HTTP status received from this instance.
    #[sea_orm(nullable)]
    pub latest_status: Option<i32>,

    /// Last time we successfully communicated with this instance.
    #[sea_orm(nullable)]
    pub last_communicated_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,

    #[sea_orm(nullable)]
    pub updated_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
