use serde::{Deserialize, Serialize};

pub mod asset;
pub mod asset_activity_log;
pub mod banner_message;
pub mod calendar;
pub mod chat;
pub mod daily_activity;
pub mod employee;
pub mod employee_leave;
pub mod feedback;
pub mod holiday;
pub mod maintenance;
pub mod meeting_minutes;
pub mod notice_board;
pub mod performance;
pub mod role;
pub mod safety_inspection;
pub mod shift_detail;
pub mod stock_transaction;
pub mod ticket;
pub mod user;

/// Who did something; stored denormalised on the record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}
