use crate::{
    database::{get_db, paginate},
    error::ApiError,
    response::{PageQuery, Pagination},
    utils::{contains_ci, from_bson_date, parse_end_date, push_and, sanitize, to_bson_date},
};
use chrono::{DateTime, Utc};
use mongodb::{
    bson::{doc, oid::ObjectId, DateTime as BsonDateTime, Document},
    Collection,
};
use serde::{Deserialize, Serialize};

use super::{role::AccessScope, Actor};

const COLLECTION: &str = "notices";

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NoticePriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl NoticePriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoticePriority::Low => "low",
            NoticePriority::Medium => "medium",
            NoticePriority::High => "high",
            NoticePriority::Urgent => "urgent",
        }
    }
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TargetAudience {
    #[default]
    All,
    Department,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,
    pub title: String,
    pub content: String,
    pub priority: NoticePriority,
    pub target_audience: TargetAudience,
    pub department: Option<String>,
    pub is_published: bool,
    pub published_at: Option<BsonDateTime>,
    pub expires_at: Option<BsonDateTime>,
    pub created_by: Actor,
    #[serde(default)]
    pub read_by: Vec<String>,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoticeRequest {
    pub title: String,
    pub content: String,
    pub priority: Option<NoticePriority>,
    pub target_audience: Option<TargetAudience>,
    pub department: Option<String>,
    pub is_published: Option<bool>,
    pub expires_at: Option<String>,
}
#[derive(Debug, Default, Deserialize)]
pub struct NoticeQuery {
    pub priority: Option<NoticePriority>,
    pub search: Option<String>,
}
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoticeResponse {
    #[serde(rename = "_id")]
    pub _id: String,
    pub title: String,
    pub content: String,
    pub priority: NoticePriority,
    pub target_audience: TargetAudience,
    pub department: Option<String>,
    pub is_published: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_by: Actor,
    pub read_count: usize,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NoticeResponse {
    /// `reader` decides `isRead`.
    pub fn of(notice: Notice, reader: &str) -> Self {
        Self {
            _id: notice._id.map(|id| id.to_hex()).unwrap_or_default(),
            is_read: notice.read_by.iter().any(|id| id == reader),
            read_count: notice.read_by.len(),
            title: notice.title,
            content: notice.content,
            priority: notice.priority,
            target_audience: notice.target_audience,
            department: notice.department,
            is_published: notice.is_published,
            published_at: notice.published_at.map(from_bson_date),
            expires_at: notice.expires_at.map(from_bson_date),
            created_by: notice.created_by,
            created_at: from_bson_date(notice.created_at),
            updated_at: from_bson_date(notice.updated_at),
        }
    }
}

impl NoticeQuery {
    /// Privileged callers see drafts in their scope; everyone else only
    /// published, unexpired notices aimed at them.
    pub fn filter(&self, scope: &AccessScope, now: DateTime<Utc>) -> Document {
        let mut filter = Document::new();
        if !scope.is_unrestricted() {
            let department = scope.department.clone().unwrap_or_default();
            filter.insert(
                "$or",
                vec![
                    doc! { "targetAudience": "all" },
                    doc! { "department": department },
                ],
            );
        }
        if !scope.role.is_privileged() {
            filter.insert("isPublished", true);
            push_and(
                &mut filter,
                doc! { "$or": [
                    { "expiresAt": null },
                    { "expiresAt": { "$gt": to_bson_date(now) } },
                ] },
            );
        }
        if let Some(priority) = self.priority {
            filter.insert("priority", priority.as_str());
        }
        if let Some(search) = self.search.as_deref().filter(|v| !v.trim().is_empty()) {
            push_and(
                &mut filter,
                doc! { "$or": [
                    { "title": contains_ci(search) },
                    { "content": contains_ci(search) },
                ] },
            );
        }
        filter
    }
}

fn collection() -> Result<Collection<Notice>, ApiError> {
    Ok(get_db()?.collection::<Notice>(COLLECTION))
}

impl Notice {
    pub fn new(payload: NoticeRequest, author: Actor, department: Option<String>) -> Result<Self, ApiError> {
        let now = BsonDateTime::now();
        let mut notice = Self {
            _id: None,
            title: String::new(),
            content: String::new(),
            priority: NoticePriority::Medium,
            target_audience: TargetAudience::All,
            department,
            is_published: false,
            published_at: None,
            expires_at: None,
            created_by: author,
            read_by: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        notice.apply(payload, None)?;
        Ok(notice)
    }

    pub fn apply(&mut self, payload: NoticeRequest, department: Option<String>) -> Result<(), ApiError> {
        let title = sanitize(&payload.title, 200);
        let content = payload.content.trim().to_string();
        if title.is_empty() {
            return Err(ApiError::validation("title is required"));
        }
        if content.is_empty() || content.chars().count() > 10_000 {
            return Err(ApiError::validation("content must be between 1 and 10000 characters"));
        }
        self.title = title;
        self.content = content;
        self.priority = payload.priority.unwrap_or(self.priority);
        self.target_audience = payload.target_audience.unwrap_or(self.target_audience);
        if department.is_some() {
            self.department = department;
        }
        if self.target_audience == TargetAudience::Department && self.department.is_none() {
            return Err(ApiError::validation("department is required for department notices"));
        }
        self.expires_at = match payload.expires_at.as_deref().filter(|v| !v.trim().is_empty()) {
            Some(expires) => Some(to_bson_date(parse_end_date(expires)?)),
            None => None,
        };
        if let Some(publish) = payload.is_published {
            self.set_published(publish);
        }
        self.updated_at = BsonDateTime::now();
        Ok(())
    }

    fn set_published(&mut self, publish: bool) {
        if publish && !self.is_published {
            self.published_at = Some(BsonDateTime::now());
        }
        self.is_published = publish;
    }

    pub fn toggle_publish(&mut self) {
        self.set_published(!self.is_published);
        self.updated_at = BsonDateTime::now();
    }

    pub fn is_visible_to(&self, scope: &AccessScope, now: DateTime<Utc>) -> bool {
        let in_scope = scope.is_unrestricted()
            || self.target_audience == TargetAudience::All
            || (self.department.is_some() && self.department == scope.department);
        if !in_scope {
            return false;
        }
        if scope.role.is_privileged() {
            return true;
        }
        let expired = self.expires_at.map(|at| from_bson_date(at) <= now).unwrap_or(false);
        self.is_published && !expired
    }

    /// Privileged and, unless super admin, from the caller's department.
    pub fn can_manage(&self, scope: &AccessScope) -> bool {
        scope.role.is_privileged() && scope.allows(self.department.as_deref(), &[])
    }

    pub fn mark_read(&mut self, reader: &str) -> bool {
        if self.read_by.iter().any(|id| id == reader) {
            return false;
        }
        self.read_by.push(reader.to_string());
        true
    }

    pub async fn save(&mut self) -> Result<ObjectId, ApiError> {
        self._id = Some(ObjectId::new());
        collection()?.insert_one(&*self, None).await?;
        self._id.ok_or_else(|| ApiError::internal("INSERTING_FAILED"))
    }
    pub async fn update(&self) -> Result<ObjectId, ApiError> {
        let _id = self._id.ok_or_else(|| ApiError::internal("NOTICE_WITHOUT_ID"))?;
        collection()?.replace_one(doc! { "_id": _id }, self, None).await?;
        Ok(_id)
    }
    pub async fn delete(&self) -> Result<u64, ApiError> {
        let _id = self._id.ok_or_else(|| ApiError::internal("NOTICE_WITHOUT_ID"))?;
        Ok(collection()?
            .delete_one(doc! { "_id": _id }, None)
            .await?
            .deleted_count)
    }
    pub async fn add_reader(&self, reader: &str) -> Result<(), ApiError> {
        let _id = self._id.ok_or_else(|| ApiError::internal("NOTICE_WITHOUT_ID"))?;
        collection()?
            .update_one(doc! { "_id": _id }, doc! { "$addToSet": { "readBy": reader } }, None)
            .await?;
        Ok(())
    }
    pub async fn find_many(
        query: &NoticeQuery,
        page: &PageQuery,
        scope: &AccessScope,
    ) -> Result<(Vec<NoticeResponse>, Pagination), ApiError> {
        let filter = query.filter(scope, Utc::now());
        let sort = page.sort(&["createdAt", "publishedAt", "priority", "title"], "createdAt");
        let (notices, pagination) = paginate(&collection()?, filter, sort, page).await?;
        Ok((
            notices
                .into_iter()
                .map(|notice| NoticeResponse::of(notice, &scope.user_id))
                .collect(),
            pagination,
        ))
    }
    pub async fn find_by_id(_id: &ObjectId) -> Result<Option<Notice>, ApiError> {
        Ok(collection()?.find_one(doc! { "_id": _id }, None).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::role::UserRole;
    use chrono::Duration;

    fn scope(role: UserRole, department: &str) -> AccessScope {
        AccessScope {
            role,
            department: Some(department.to_string()),
            user_id: "u1".to_string(),
            employee_id: None,
        }
    }

    fn notice(audience: TargetAudience, published: bool) -> Notice {
        Notice::new(
            NoticeRequest {
                title: "Shutdown".to_string(),
                content: "Plant shutdown on Friday".to_string(),
                priority: Some(NoticePriority::Urgent),
                target_audience: Some(audience),
                department: None,
                is_published: Some(published),
                expires_at: None,
            },
            Actor {
                id: "m1".to_string(),
                name: "Manager".to_string(),
            },
            Some("Ops".to_string()),
        )
        .unwrap()
    }

    #[test]
    fn drafts_are_hidden_from_normal_users() {
        let now = Utc::now();
        let draft = notice(TargetAudience::All, false);
        assert!(!draft.is_visible_to(&scope(UserRole::NormalUser, "Ops"), now));
        assert!(draft.is_visible_to(&scope(UserRole::Manager, "Ops"), now));
    }

    #[test]
    fn department_notices_stay_in_department() {
        let now = Utc::now();
        let published = notice(TargetAudience::Department, true);
        assert!(published.is_visible_to(&scope(UserRole::NormalUser, "Ops"), now));
        assert!(!published.is_visible_to(&scope(UserRole::NormalUser, "Finance"), now));
        assert!(notice(TargetAudience::All, true).is_visible_to(&scope(UserRole::NormalUser, "Finance"), now));
    }

    #[test]
    fn expired_notices_are_hidden() {
        let mut expired = notice(TargetAudience::All, true);
        expired.expires_at = Some(to_bson_date(Utc::now() - Duration::days(1)));
        assert!(!expired.is_visible_to(&scope(UserRole::NormalUser, "Ops"), Utc::now()));
    }

    #[test]
    fn publishing_stamps_once() {
        let mut draft = notice(TargetAudience::All, false);
        assert!(draft.published_at.is_none());
        draft.toggle_publish();
        assert!(draft.is_published);
        let stamped = draft.published_at;
        assert!(stamped.is_some());
        draft.toggle_publish();
        assert!(!draft.is_published);
        assert_eq!(draft.published_at, stamped);
    }

    #[test]
    fn reads_are_recorded_once() {
        let mut published = notice(TargetAudience::All, true);
        assert!(published.mark_read("u1"));
        assert!(!published.mark_read("u1"));
        assert!(NoticeResponse::of(published, "u1").is_read);
    }

    #[test]
    fn normal_user_filter_requires_published() {
        let filter = NoticeQuery::default().filter(&scope(UserRole::NormalUser, "Ops"), Utc::now());
        assert_eq!(filter.get_bool("isPublished").unwrap(), true);
        assert!(filter.contains_key("$or"));
        assert!(filter.contains_key("$and"));
    }
}
