use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Problem row. Owned by the main backend; the dispatcher only bumps `accepted_count`.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "problem")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub title: String,

    #[sea_orm(default_value = 0)]
    pub submit_count: i32,
    /// Incremented exactly once per submission that reaches `Accepted`.
    #[sea_orm(default_value = 0)]
    pub accepted_count: i32,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
