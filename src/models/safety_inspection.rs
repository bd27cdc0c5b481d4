//! Safety inspection schedules, read from the collection the backend service
//! maintains. Records (compliance status, violations) are only relayed.

use chrono::{DateTime, Utc};
use mongodb::{
    bson::{doc, oid::ObjectId, DateTime as BsonDateTime, Document},
    Collection,
};
use serde::{Deserialize, Serialize};

use crate::{database::get_db, error::ApiError, utils::from_bson_date};

pub const BACKEND_PATH: &str = "/api/safety-inspection";
const COLLECTION: &str = "safetyinspectionschedules";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyInspectionSchedule {
    #[serde(rename = "_id")]
    pub _id: ObjectId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub asset_id: Option<String>,
    #[serde(default)]
    pub asset_name: Option<String>,
    #[serde(default)]
    pub frequency: Option<String>,
    #[serde(default)]
    pub next_due_date: Option<BsonDateTime>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub risk_level: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub assigned_inspector: Option<String>,
}

impl SafetyInspectionSchedule {
    pub fn due(&self) -> Option<DateTime<Utc>> {
        self.next_due_date.map(from_bson_date)
    }

    pub fn display_title(&self) -> String {
        match (&self.title, &self.asset_name) {
            (Some(title), _) if !title.is_empty() => title.clone(),
            (_, Some(asset)) => format!("Safety inspection: {asset}"),
            _ => "Safety inspection".to_string(),
        }
    }

    pub async fn find_capped(filter: Document, limit: i64) -> Result<Vec<SafetyInspectionSchedule>, ApiError> {
        let collection: Collection<SafetyInspectionSchedule> =
            get_db()?.collection::<SafetyInspectionSchedule>(COLLECTION);
        crate::database::find_capped(&collection, filter, doc! { "nextDueDate": 1 }, limit).await
    }
}
