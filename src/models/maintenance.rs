//! Maintenance schedules and records are owned by the backend service. The
//! calendar reads schedules straight from the shared collection, so this
//! model is deliberately lenient about missing fields.

use chrono::{DateTime, Utc};
use mongodb::{
    bson::{doc, oid::ObjectId, DateTime as BsonDateTime, Document},
    Collection,
};
use serde::{Deserialize, Serialize};

use crate::{database::get_db, error::ApiError, utils::from_bson_date};

pub const BACKEND_PATH: &str = "/api/maintenance";
const COLLECTION: &str = "maintenanceschedules";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceSchedule {
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
    pub status: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub assigned_technician: Option<String>,
}

impl MaintenanceSchedule {
    pub fn due(&self) -> Option<DateTime<Utc>> {
        self.next_due_date.map(from_bson_date)
    }

    pub fn display_title(&self) -> String {
        match (&self.title, &self.asset_name) {
            (Some(title), _) if !title.is_empty() => title.clone(),
            (_, Some(asset)) => format!("Maintenance: {asset}"),
            _ => "Maintenance".to_string(),
        }
    }

    /// Past due and not finished.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        let finished = matches!(
            self.status.as_deref().map(str::to_lowercase).as_deref(),
            Some("completed") | Some("inactive") | Some("cancelled")
        );
        !finished && self.due().map(|due| due < now).unwrap_or(false)
    }

    pub async fn find_capped(filter: Document, limit: i64) -> Result<Vec<MaintenanceSchedule>, ApiError> {
        let collection: Collection<MaintenanceSchedule> =
            get_db()?.collection::<MaintenanceSchedule>(COLLECTION);
        crate::database::find_capped(&collection, filter, doc! { "nextDueDate": 1 }, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn schedule(status: Option<&str>, due_millis: Option<i64>) -> MaintenanceSchedule {
        MaintenanceSchedule {
            _id: ObjectId::new(),
            title: None,
            asset_id: None,
            asset_name: Some("Compressor".to_string()),
            frequency: Some("monthly".to_string()),
            next_due_date: due_millis.map(BsonDateTime::from_millis),
            priority: None,
            status: status.map(str::to_string),
            department: None,
            assigned_technician: None,
        }
    }

    #[test]
    fn overdue_ignores_finished_schedules() {
        let now = Utc.timestamp_millis_opt(2_000).unwrap();
        assert!(schedule(Some("active"), Some(1_000)).is_overdue(now));
        assert!(!schedule(Some("Completed"), Some(1_000)).is_overdue(now));
        assert!(!schedule(None, Some(3_000)).is_overdue(now));
        assert!(!schedule(None, None).is_overdue(now));
    }

    #[test]
    fn title_falls_back_to_asset() {
        assert_eq!(schedule(None, None).display_title(), "Maintenance: Compressor");
    }
}
