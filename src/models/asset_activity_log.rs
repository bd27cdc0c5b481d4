use crate::{
    database::{get_db, paginate},
    error::ApiError,
    response::{PageQuery, Pagination},
    utils::{date_range, from_bson_date, sanitize, sanitize_opt},
};
use chrono::{DateTime, Utc};
use mongodb::{
    bson::{doc, oid::ObjectId, to_bson, DateTime as BsonDateTime, Document},
    Collection,
};
use serde::{Deserialize, Serialize};

use super::{role::AccessScope, Actor, Priority};

const COLLECTION: &str = "assetactivitylogs";

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActivityModule {
    Maintenance,
    Ticket,
    DailyLog,
    SafetyInspection,
    Asset,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetActivityLog {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,
    pub asset_id: String,
    pub asset_name: Option<String>,
    pub module: ActivityModule,
    pub activity_type: String,
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub status: String,
    pub department: Option<String>,
    pub reference_id: Option<String>,
    pub created_by: Actor,
    pub verified_by: Option<Actor>,
    pub verified_at: Option<BsonDateTime>,
    #[serde(default)]
    pub edit_history: Vec<EditEntry>,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditEntry {
    pub edited_by: Actor,
    pub edited_at: BsonDateTime,
    pub changes: Vec<FieldChange>,
}
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FieldChange {
    pub field: String,
    pub from: Option<String>,
    pub to: Option<String>,
}
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetActivityLogRequest {
    pub asset_id: String,
    pub asset_name: Option<String>,
    pub module: ActivityModule,
    pub activity_type: String,
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub status: Option<String>,
    pub department: Option<String>,
    pub reference_id: Option<String>,
}
#[derive(Debug, Default, Deserialize)]
pub struct AssetActivityLogEditRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub status: Option<String>,
}
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetActivityLogQuery {
    pub asset_id: Option<String>,
    pub module: Option<ActivityModule>,
    pub activity_type: Option<String>,
    pub priority: Option<Priority>,
    pub status: Option<String>,
    pub department: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetActivityLogResponse {
    #[serde(rename = "_id")]
    pub _id: String,
    pub asset_id: String,
    pub asset_name: Option<String>,
    pub module: ActivityModule,
    pub activity_type: String,
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub status: String,
    pub department: Option<String>,
    pub reference_id: Option<String>,
    pub created_by: Actor,
    pub verified_by: Option<Actor>,
    pub verified_at: Option<DateTime<Utc>>,
    pub edit_history: Vec<EditEntryResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditEntryResponse {
    pub edited_by: Actor,
    pub edited_at: DateTime<Utc>,
    pub changes: Vec<FieldChange>,
}

impl From<AssetActivityLog> for AssetActivityLogResponse {
    fn from(log: AssetActivityLog) -> Self {
        Self {
            _id: log._id.map(|id| id.to_hex()).unwrap_or_default(),
            asset_id: log.asset_id,
            asset_name: log.asset_name,
            module: log.module,
            activity_type: log.activity_type,
            title: log.title,
            description: log.description,
            priority: log.priority,
            status: log.status,
            department: log.department,
            reference_id: log.reference_id,
            created_by: log.created_by,
            verified_by: log.verified_by,
            verified_at: log.verified_at.map(from_bson_date),
            edit_history: log
                .edit_history
                .into_iter()
                .map(|entry| EditEntryResponse {
                    edited_by: entry.edited_by,
                    edited_at: from_bson_date(entry.edited_at),
                    changes: entry.changes,
                })
                .collect(),
            created_at: from_bson_date(log.created_at),
            updated_at: from_bson_date(log.updated_at),
        }
    }
}

impl AssetActivityLogQuery {
    pub fn filter(&self, scope: &AccessScope) -> Result<Document, ApiError> {
        let mut filter = scope.filter("department", &["createdBy.id"]);
        if let Some(department) = scope.department_filter(self.department.as_deref()) {
            filter.insert("department", department);
        }
        if let Some(asset_id) = &self.asset_id {
            filter.insert("assetId", asset_id);
        }
        if let Some(module) = self.module {
            filter.insert("module", to_bson(&module)?);
        }
        if let Some(activity_type) = &self.activity_type {
            filter.insert("activityType", activity_type);
        }
        if let Some(priority) = self.priority {
            filter.insert("priority", priority.as_str());
        }
        if let Some(status) = &self.status {
            filter.insert("status", status);
        }
        if let Some(range) = date_range(self.start_date.as_deref(), self.end_date.as_deref())? {
            filter.insert("createdAt", range);
        }
        Ok(filter)
    }
}

fn collection() -> Result<Collection<AssetActivityLog>, ApiError> {
    Ok(get_db()?.collection::<AssetActivityLog>(COLLECTION))
}

fn change(field: &str, from: Option<&str>, to: Option<&str>) -> Option<FieldChange> {
    (from != to).then(|| FieldChange {
        field: field.to_string(),
        from: from.map(str::to_string),
        to: to.map(str::to_string),
    })
}

impl AssetActivityLog {
    pub fn new(
        payload: AssetActivityLogRequest,
        created_by: Actor,
        department: Option<String>,
    ) -> Result<Self, ApiError> {
        let title = sanitize(&payload.title, 200);
        if title.is_empty() {
            return Err(ApiError::validation("title is required"));
        }
        if payload.asset_id.trim().is_empty() {
            return Err(ApiError::validation("assetId is required"));
        }
        let now = BsonDateTime::now();
        Ok(Self {
            _id: None,
            asset_id: payload.asset_id.trim().to_string(),
            asset_name: sanitize_opt(payload.asset_name.as_deref(), 200),
            module: payload.module,
            activity_type: sanitize(&payload.activity_type, 100),
            title,
            description: sanitize_opt(payload.description.as_deref(), 2000),
            priority: payload.priority.unwrap_or_default(),
            status: payload.status.unwrap_or_else(|| "open".to_string()),
            department,
            reference_id: payload.reference_id,
            created_by,
            verified_by: None,
            verified_at: None,
            edit_history: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Applies an edit and appends it to `editHistory`; `None` when nothing changed.
    pub fn apply_edit(&mut self, edit: AssetActivityLogEditRequest, editor: Actor) -> Option<&EditEntry> {
        let mut changes: Vec<FieldChange> = Vec::new();

        if let Some(title) = edit.title.map(|title| sanitize(&title, 200)).filter(|t| !t.is_empty()) {
            changes.extend(change("title", Some(self.title.as_str()), Some(title.as_str())));
            self.title = title;
        }
        if let Some(description) = edit.description {
            let description = sanitize_opt(Some(&description), 2000);
            changes.extend(change(
                "description",
                self.description.as_deref(),
                description.as_deref(),
            ));
            self.description = description;
        }
        if let Some(priority) = edit.priority {
            changes.extend(change(
                "priority",
                Some(self.priority.as_str()),
                Some(priority.as_str()),
            ));
            self.priority = priority;
        }
        if let Some(status) = edit.status {
            changes.extend(change("status", Some(self.status.as_str()), Some(status.as_str())));
            self.status = status;
        }

        if changes.is_empty() {
            return None;
        }
        let now = BsonDateTime::now();
        self.updated_at = now;
        self.edit_history.push(EditEntry {
            edited_by: editor,
            edited_at: now,
            changes,
        });
        self.edit_history.last()
    }

    pub fn verify(&mut self, verifier: Actor) -> Result<(), ApiError> {
        if self.verified_by.is_some() {
            return Err(ApiError::conflict("ACTIVITY_ALREADY_VERIFIED"));
        }
        let now = BsonDateTime::now();
        self.verified_by = Some(verifier);
        self.verified_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub async fn save(&mut self) -> Result<ObjectId, ApiError> {
        self._id = Some(ObjectId::new());
        collection()?.insert_one(&*self, None).await?;
        self._id.ok_or_else(|| ApiError::internal("INSERTING_FAILED"))
    }
    pub async fn update(&self) -> Result<ObjectId, ApiError> {
        let _id = self._id.ok_or_else(|| ApiError::internal("ACTIVITY_WITHOUT_ID"))?;
        collection()?
            .replace_one(doc! { "_id": _id }, self, None)
            .await?;
        Ok(_id)
    }
    pub async fn find_many(
        query: &AssetActivityLogQuery,
        page: &PageQuery,
        scope: &AccessScope,
    ) -> Result<(Vec<AssetActivityLogResponse>, Pagination), ApiError> {
        let filter = query.filter(scope)?;
        let sort = page.sort(&["createdAt", "priority", "status", "module"], "createdAt");
        let (logs, pagination) = paginate(&collection()?, filter, sort, page).await?;
        Ok((
            logs.into_iter().map(AssetActivityLogResponse::from).collect(),
            pagination,
        ))
    }
    pub async fn find_by_id(_id: &ObjectId) -> Result<Option<AssetActivityLog>, ApiError> {
        Ok(collection()?.find_one(doc! { "_id": _id }, None).await?)
    }

    /// Inserts in the background; failures are logged and never reach the caller.
    pub fn record_detached(mut self) {
        actix_web::rt::spawn(async move {
            if let Err(error) = self.save().await {
                tracing::warn!(
                    asset_id = %self.asset_id,
                    module = ?self.module,
                    %error,
                    "failed to record asset activity"
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::role::UserRole;

    fn actor(name: &str) -> Actor {
        Actor {
            id: format!("id-{name}"),
            name: name.to_string(),
        }
    }

    fn log() -> AssetActivityLog {
        AssetActivityLog::new(
            AssetActivityLogRequest {
                asset_id: "A-1".to_string(),
                asset_name: Some("Chiller".to_string()),
                module: ActivityModule::Maintenance,
                activity_type: "inspection".to_string(),
                title: "Quarterly check".to_string(),
                description: None,
                priority: Some(Priority::High),
                status: None,
                department: None,
                reference_id: None,
            },
            actor("ana"),
            Some("HVAC".to_string()),
        )
        .unwrap()
    }

    #[test]
    fn edits_are_appended_with_changed_fields_only() {
        let mut log = log();
        let entry = log
            .apply_edit(
                AssetActivityLogEditRequest {
                    title: Some("Quarterly check".to_string()),
                    status: Some("closed".to_string()),
                    ..Default::default()
                },
                actor("ben"),
            )
            .unwrap();
        assert_eq!(entry.changes.len(), 1);
        assert_eq!(entry.changes[0].field, "status");
        assert_eq!(entry.changes[0].from.as_deref(), Some("open"));
        assert_eq!(log.edit_history.len(), 1);

        assert!(log
            .apply_edit(AssetActivityLogEditRequest::default(), actor("ben"))
            .is_none());
        assert_eq!(log.edit_history.len(), 1);
    }

    #[test]
    fn verification_happens_once() {
        let mut log = log();
        log.verify(actor("mgr")).unwrap();
        assert!(log.verified_at.is_some());
        assert!(matches!(log.verify(actor("mgr")), Err(ApiError::Conflict(_))));
    }

    #[test]
    fn query_filter_is_scoped() {
        let scope = AccessScope {
            role: UserRole::NormalUser,
            department: Some("HVAC".to_string()),
            user_id: "u1".to_string(),
            employee_id: None,
        };
        let query = AssetActivityLogQuery {
            module: Some(ActivityModule::DailyLog),
            department: Some("Electrical".to_string()),
            ..Default::default()
        };
        let filter = query.filter(&scope).unwrap();
        assert_eq!(filter.get_str("department").unwrap(), "HVAC");
        assert_eq!(filter.get_str("module").unwrap(), "daily_log");
        assert!(filter.contains_key("$or"));
    }
}
