use common::SubmissionStatus;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One judge attempt. This is also the body sent to `POST /judge`.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "submission")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    #[sea_orm(indexed)]
    pub problem_id: i64,
    pub user_id: i64,

    pub language: String,
    #[sea_orm(column_type = "Text")]
    pub code: String,

    #[sea_orm(indexed)]
    pub status: SubmissionStatus,
    /// Milliseconds.
    pub run_time: Option<i64>,
    /// Kibibytes.
    pub memory: Option<i64>,
    #[sea_orm(column_type = "Text", nullable)]
    pub judge_info: Option<String>,
    pub score: Option<i32>,
    #[sea_orm(column_type = "Text", nullable)]
    pub error_message: Option<String>,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
