use crate::{
    database::{get_db, paginate},
    error::ApiError,
    response::{PageQuery, Pagination},
    utils::{contains_ci, date_range, from_bson_date, parse_date, push_and, sanitize, sanitize_opt, to_bson_date},
};
use chrono::{DateTime, Utc};
use mongodb::{
    bson::{doc, oid::ObjectId, DateTime as BsonDateTime, Document},
    Collection,
};
use serde::{Deserialize, Serialize};

use super::{
    asset_activity_log::{ActivityModule, AssetActivityLog},
    role::AccessScope,
    Actor, Priority,
};

pub const COLLECTION: &str = "dailyactivities";
const OWNER_FIELDS: [&str; 2] = ["createdBy.id", "attendedById"];

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DailyActivityStatus {
    #[default]
    Open,
    InProgress,
    Completed,
}

impl DailyActivityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DailyActivityStatus::Open => "open",
            DailyActivityStatus::InProgress => "in-progress",
            DailyActivityStatus::Completed => "completed",
        }
    }
}

/// One entry of the maintenance team's daily log.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyActivity {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,
    pub date: BsonDateTime,
    pub title: String,
    pub description: Option<String>,
    pub area: Option<String>,
    pub asset_id: Option<String>,
    pub asset_name: Option<String>,
    pub priority: Priority,
    pub status: DailyActivityStatus,
    pub department: Option<String>,
    pub created_by: Actor,
    pub attended_by: Option<String>,
    pub attended_by_id: Option<String>,
    pub duration_minutes: Option<u32>,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyActivityRequest {
    pub date: String,
    pub title: String,
    pub description: Option<String>,
    pub area: Option<String>,
    pub asset_id: Option<String>,
    pub asset_name: Option<String>,
    pub priority: Option<Priority>,
    pub status: Option<DailyActivityStatus>,
    pub department: Option<String>,
    pub attended_by: Option<String>,
    pub attended_by_id: Option<String>,
    pub duration_minutes: Option<u32>,
}
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyActivityQuery {
    pub status: Option<DailyActivityStatus>,
    pub priority: Option<Priority>,
    pub department: Option<String>,
    pub asset_id: Option<String>,
    pub search: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyActivityResponse {
    #[serde(rename = "_id")]
    pub _id: String,
    pub date: DateTime<Utc>,
    pub title: String,
    pub description: Option<String>,
    pub area: Option<String>,
    pub asset_id: Option<String>,
    pub asset_name: Option<String>,
    pub priority: Priority,
    pub status: DailyActivityStatus,
    pub department: Option<String>,
    pub created_by: Actor,
    pub attended_by: Option<String>,
    pub attended_by_id: Option<String>,
    pub duration_minutes: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DailyActivity> for DailyActivityResponse {
    fn from(activity: DailyActivity) -> Self {
        Self {
            _id: activity._id.map(|id| id.to_hex()).unwrap_or_default(),
            date: from_bson_date(activity.date),
            title: activity.title,
            description: activity.description,
            area: activity.area,
            asset_id: activity.asset_id,
            asset_name: activity.asset_name,
            priority: activity.priority,
            status: activity.status,
            department: activity.department,
            created_by: activity.created_by,
            attended_by: activity.attended_by,
            attended_by_id: activity.attended_by_id,
            duration_minutes: activity.duration_minutes,
            created_at: from_bson_date(activity.created_at),
            updated_at: from_bson_date(activity.updated_at),
        }
    }
}

impl DailyActivityQuery {
    pub fn filter(&self, scope: &AccessScope) -> Result<Document, ApiError> {
        let mut filter = scope.filter("department", &OWNER_FIELDS);
        if let Some(department) = scope.department_filter(self.department.as_deref()) {
            filter.insert("department", department);
        }
        if let Some(status) = self.status {
            filter.insert("status", status.as_str());
        }
        if let Some(priority) = self.priority {
            filter.insert("priority", priority.as_str());
        }
        if let Some(asset_id) = &self.asset_id {
            filter.insert("assetId", asset_id);
        }
        if let Some(search) = self.search.as_deref().filter(|v| !v.trim().is_empty()) {
            push_and(
                &mut filter,
                doc! { "$or": [
                    { "title": contains_ci(search) },
                    { "area": contains_ci(search) },
                    { "assetName": contains_ci(search) },
                ] },
            );
        }
        if let Some(range) = date_range(self.start_date.as_deref(), self.end_date.as_deref())? {
            filter.insert("date", range);
        }
        Ok(filter)
    }
}

fn collection() -> Result<Collection<DailyActivity>, ApiError> {
    Ok(get_db()?.collection::<DailyActivity>(COLLECTION))
}

impl DailyActivity {
    pub fn new(payload: DailyActivityRequest, created_by: Actor, department: Option<String>) -> Result<Self, ApiError> {
        let now = BsonDateTime::now();
        let mut activity = Self {
            _id: None,
            date: now,
            title: String::new(),
            description: None,
            area: None,
            asset_id: None,
            asset_name: None,
            priority: Priority::default(),
            status: DailyActivityStatus::default(),
            department,
            created_by,
            attended_by: None,
            attended_by_id: None,
            duration_minutes: None,
            created_at: now,
            updated_at: now,
        };
        activity.apply(payload, None)?;
        Ok(activity)
    }

    pub fn apply(&mut self, payload: DailyActivityRequest, department: Option<String>) -> Result<(), ApiError> {
        let title = sanitize(&payload.title, 200);
        if title.is_empty() {
            return Err(ApiError::validation("title is required"));
        }
        self.date = to_bson_date(parse_date(&payload.date)?);
        self.title = title;
        self.description = sanitize_opt(payload.description.as_deref(), 5000);
        self.area = sanitize_opt(payload.area.as_deref(), 200);
        self.asset_id = payload.asset_id.filter(|v| !v.trim().is_empty());
        self.asset_name = sanitize_opt(payload.asset_name.as_deref(), 200);
        self.priority = payload.priority.unwrap_or(self.priority);
        self.status = payload.status.unwrap_or(self.status);
        if department.is_some() {
            self.department = department;
        }
        self.attended_by = sanitize_opt(payload.attended_by.as_deref(), 200);
        self.attended_by_id = payload.attended_by_id.filter(|v| !v.trim().is_empty());
        self.duration_minutes = payload.duration_minutes;
        self.updated_at = BsonDateTime::now();
        Ok(())
    }

    pub fn owners(&self) -> [Option<&str>; 2] {
        [Some(self.created_by.id.as_str()), self.attended_by_id.as_deref()]
    }

    /// Activity log entry mirroring this record, when it concerns an asset.
    pub fn activity_entry(&self) -> Option<AssetActivityLog> {
        let asset_id = self.asset_id.clone()?;
        let now = BsonDateTime::now();
        Some(AssetActivityLog {
            _id: None,
            asset_id,
            asset_name: self.asset_name.clone(),
            module: ActivityModule::DailyLog,
            activity_type: "daily_log".to_string(),
            title: self.title.clone(),
            description: self.description.clone(),
            priority: self.priority,
            status: self.status.as_str().to_string(),
            department: self.department.clone(),
            reference_id: self._id.map(|id| id.to_hex()),
            created_by: self.created_by.clone(),
            verified_by: None,
            verified_at: None,
            edit_history: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn save(&mut self) -> Result<ObjectId, ApiError> {
        self._id = Some(ObjectId::new());
        collection()?.insert_one(&*self, None).await?;
        self._id.ok_or_else(|| ApiError::internal("INSERTING_FAILED"))
    }
    pub async fn update(&self) -> Result<ObjectId, ApiError> {
        let _id = self._id.ok_or_else(|| ApiError::internal("ACTIVITY_WITHOUT_ID"))?;
        collection()?.replace_one(doc! { "_id": _id }, self, None).await?;
        Ok(_id)
    }
    pub async fn delete(&self) -> Result<u64, ApiError> {
        let _id = self._id.ok_or_else(|| ApiError::internal("ACTIVITY_WITHOUT_ID"))?;
        Ok(collection()?
            .delete_one(doc! { "_id": _id }, None)
            .await?
            .deleted_count)
    }
    pub async fn find_many(
        query: &DailyActivityQuery,
        page: &PageQuery,
        scope: &AccessScope,
    ) -> Result<(Vec<DailyActivityResponse>, Pagination), ApiError> {
        let filter = query.filter(scope)?;
        let sort = page.sort(&["date", "priority", "status", "createdAt"], "date");
        let (activities, pagination) = paginate(&collection()?, filter, sort, page).await?;
        Ok((
            activities.into_iter().map(DailyActivityResponse::from).collect(),
            pagination,
        ))
    }
    pub async fn find_by_id(_id: &ObjectId) -> Result<Option<DailyActivity>, ApiError> {
        Ok(collection()?.find_one(doc! { "_id": _id }, None).await?)
    }
    pub async fn find_capped(filter: Document, limit: i64) -> Result<Vec<DailyActivity>, ApiError> {
        crate::database::find_capped(&collection()?, filter, doc! { "date": 1 }, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(asset_id: Option<&str>) -> DailyActivityRequest {
        DailyActivityRequest {
            date: "2024-06-03".to_string(),
            title: "Replaced belt".to_string(),
            description: None,
            area: Some("Line 2".to_string()),
            asset_id: asset_id.map(str::to_string),
            asset_name: Some("Conveyor".to_string()),
            priority: Some(Priority::Low),
            status: Some(DailyActivityStatus::Completed),
            department: None,
            attended_by: None,
            attended_by_id: None,
            duration_minutes: Some(45),
        }
    }

    fn actor() -> Actor {
        Actor {
            id: "u1".to_string(),
            name: "Ana".to_string(),
        }
    }

    #[test]
    fn activity_entry_only_for_asset_work() {
        let without = DailyActivity::new(request(None), actor(), None).unwrap();
        assert!(without.activity_entry().is_none());

        let with = DailyActivity::new(request(Some("A-9")), actor(), Some("Ops".to_string())).unwrap();
        let entry = with.activity_entry().unwrap();
        assert_eq!(entry.module, ActivityModule::DailyLog);
        assert_eq!(entry.status, "completed");
        assert_eq!(entry.department.as_deref(), Some("Ops"));
    }

    #[test]
    fn invalid_date_is_rejected() {
        let mut payload = request(None);
        payload.date = "yesterday".to_string();
        assert!(DailyActivity::new(payload, actor(), None).is_err());
    }
}
