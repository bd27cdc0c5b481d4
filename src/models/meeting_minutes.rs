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

use super::{role::AccessScope, Actor};

const COLLECTION: &str = "meetingminutes";

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MinutesStatus {
    #[default]
    Draft,
    Published,
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ActionItemStatus {
    #[default]
    Open,
    Done,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActionItem {
    pub id: String,
    pub description: String,
    pub assigned_to: Option<String>,
    pub due_date: Option<BsonDateTime>,
    pub status: ActionItemStatus,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingMinutes {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,
    pub title: String,
    pub department: Option<String>,
    pub meeting_date: BsonDateTime,
    #[serde(default)]
    pub attendees: Vec<String>,
    pub agenda: Option<String>,
    pub discussion: Option<String>,
    pub decisions: Option<String>,
    #[serde(default)]
    pub action_items: Vec<ActionItem>,
    pub status: MinutesStatus,
    pub is_approved: bool,
    pub approved_by: Option<Actor>,
    pub approved_at: Option<BsonDateTime>,
    pub created_by: Actor,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionItemRequest {
    pub id: Option<String>,
    pub description: String,
    pub assigned_to: Option<String>,
    pub due_date: Option<String>,
    pub status: Option<ActionItemStatus>,
}
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingMinutesRequest {
    pub title: String,
    pub department: Option<String>,
    pub meeting_date: String,
    #[serde(default)]
    pub attendees: Vec<String>,
    pub agenda: Option<String>,
    pub discussion: Option<String>,
    pub decisions: Option<String>,
    #[serde(default)]
    pub action_items: Vec<ActionItemRequest>,
}
#[derive(Debug, Deserialize)]
pub struct ActionItemStatusRequest {
    pub status: ActionItemStatus,
}
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingMinutesQuery {
    pub department: Option<String>,
    pub status: Option<MinutesStatus>,
    pub search: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionItemResponse {
    pub id: String,
    pub description: String,
    pub assigned_to: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub status: ActionItemStatus,
}
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingMinutesResponse {
    #[serde(rename = "_id")]
    pub _id: String,
    pub title: String,
    pub department: Option<String>,
    pub meeting_date: DateTime<Utc>,
    pub attendees: Vec<String>,
    pub agenda: Option<String>,
    pub discussion: Option<String>,
    pub decisions: Option<String>,
    pub action_items: Vec<ActionItemResponse>,
    pub status: MinutesStatus,
    pub is_approved: bool,
    pub approved_by: Option<Actor>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_by: Actor,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ActionItem> for ActionItemResponse {
    fn from(item: ActionItem) -> Self {
        Self {
            id: item.id,
            description: item.description,
            assigned_to: item.assigned_to,
            due_date: item.due_date.map(from_bson_date),
            status: item.status,
        }
    }
}

impl From<MeetingMinutes> for MeetingMinutesResponse {
    fn from(minutes: MeetingMinutes) -> Self {
        Self {
            _id: minutes._id.map(|id| id.to_hex()).unwrap_or_default(),
            title: minutes.title,
            department: minutes.department,
            meeting_date: from_bson_date(minutes.meeting_date),
            attendees: minutes.attendees,
            agenda: minutes.agenda,
            discussion: minutes.discussion,
            decisions: minutes.decisions,
            action_items: minutes
                .action_items
                .into_iter()
                .map(ActionItemResponse::from)
                .collect(),
            status: minutes.status,
            is_approved: minutes.is_approved,
            approved_by: minutes.approved_by,
            approved_at: minutes.approved_at.map(from_bson_date),
            created_by: minutes.created_by,
            created_at: from_bson_date(minutes.created_at),
            updated_at: from_bson_date(minutes.updated_at),
        }
    }
}

impl MeetingMinutesQuery {
    /// Non-privileged callers only see published minutes of their department.
    pub fn filter(&self, scope: &AccessScope) -> Result<Document, ApiError> {
        let mut filter = scope.filter("department", &[]);
        if let Some(department) = scope.department_filter(self.department.as_deref()) {
            filter.insert("department", department);
        }
        if !scope.role.is_privileged() {
            filter.insert("status", "published");
        } else if let Some(status) = self.status {
            filter.insert("status", mongodb::bson::to_bson(&status)?);
        }
        if let Some(search) = self.search.as_deref().filter(|v| !v.trim().is_empty()) {
            push_and(
                &mut filter,
                doc! { "$or": [
                    { "title": contains_ci(search) },
                    { "agenda": contains_ci(search) },
                    { "decisions": contains_ci(search) },
                ] },
            );
        }
        if let Some(range) = date_range(self.start_date.as_deref(), self.end_date.as_deref())? {
            filter.insert("meetingDate", range);
        }
        Ok(filter)
    }
}

fn collection() -> Result<Collection<MeetingMinutes>, ApiError> {
    Ok(get_db()?.collection::<MeetingMinutes>(COLLECTION))
}

fn action_items(items: Vec<ActionItemRequest>, existing: &[ActionItem]) -> Result<Vec<ActionItem>, ApiError> {
    let mut parsed = Vec::with_capacity(items.len());
    for item in items {
        let description = sanitize(&item.description, 500);
        if description.is_empty() {
            return Err(ApiError::validation("action item description is required"));
        }
        let due_date = match item.due_date.as_deref().filter(|v| !v.trim().is_empty()) {
            Some(due) => Some(to_bson_date(parse_date(due)?)),
            None => None,
        };
        // Known ids keep their status unless the request sets one.
        let known = item
            .id
            .as_deref()
            .and_then(|id| existing.iter().find(|current| current.id == id));
        parsed.push(ActionItem {
            id: known
                .map(|current| current.id.clone())
                .unwrap_or_else(|| ObjectId::new().to_hex()),
            description,
            assigned_to: sanitize_opt(item.assigned_to.as_deref(), 200),
            due_date,
            status: item
                .status
                .or(known.map(|current| current.status))
                .unwrap_or_default(),
        });
    }
    Ok(parsed)
}

impl MeetingMinutes {
    pub fn new(payload: MeetingMinutesRequest, author: Actor, department: Option<String>) -> Result<Self, ApiError> {
        let now = BsonDateTime::now();
        let mut minutes = Self {
            _id: None,
            title: String::new(),
            department,
            meeting_date: now,
            attendees: Vec::new(),
            agenda: None,
            discussion: None,
            decisions: None,
            action_items: Vec::new(),
            status: MinutesStatus::Draft,
            is_approved: false,
            approved_by: None,
            approved_at: None,
            created_by: author,
            created_at: now,
            updated_at: now,
        };
        minutes.apply(payload, None)?;
        Ok(minutes)
    }

    pub fn apply(&mut self, payload: MeetingMinutesRequest, department: Option<String>) -> Result<(), ApiError> {
        let title = sanitize(&payload.title, 200);
        if title.is_empty() {
            return Err(ApiError::validation("title is required"));
        }
        self.action_items = action_items(payload.action_items, &self.action_items)?;
        self.meeting_date = to_bson_date(parse_date(&payload.meeting_date)?);
        self.title = title;
        if department.is_some() {
            self.department = department;
        }
        self.attendees = payload
            .attendees
            .iter()
            .filter_map(|attendee| sanitize_opt(Some(attendee), 200))
            .collect();
        self.agenda = sanitize_opt(payload.agenda.as_deref(), 5000);
        self.discussion = payload.discussion.map(|text| text.trim().to_string()).filter(|text| !text.is_empty());
        self.decisions = payload.decisions.map(|text| text.trim().to_string()).filter(|text| !text.is_empty());
        self.updated_at = BsonDateTime::now();
        Ok(())
    }

    /// Approval also publishes; approving twice is a conflict.
    pub fn approve(&mut self, approver: Actor) -> Result<(), ApiError> {
        if self.is_approved {
            return Err(ApiError::conflict("MINUTES_ALREADY_APPROVED"));
        }
        let now = BsonDateTime::now();
        self.is_approved = true;
        self.approved_by = Some(approver);
        self.approved_at = Some(now);
        self.status = MinutesStatus::Published;
        self.updated_at = now;
        Ok(())
    }

    pub fn set_action_item_status(&mut self, item_id: &str, status: ActionItemStatus) -> Result<&ActionItem, ApiError> {
        let item = self
            .action_items
            .iter_mut()
            .find(|item| item.id == item_id)
            .ok_or_else(|| ApiError::not_found("ACTION_ITEM_NOT_FOUND"))?;
        item.status = status;
        self.updated_at = BsonDateTime::now();
        Ok(item)
    }

    pub fn is_visible_to(&self, scope: &AccessScope) -> bool {
        scope.allows(self.department.as_deref(), &[])
            && (scope.role.is_privileged() || self.status == MinutesStatus::Published)
    }

    /// Author or privileged caller in the same department.
    pub fn can_edit(&self, scope: &AccessScope) -> bool {
        scope.allows(self.department.as_deref(), &[])
            && (scope.role.is_privileged() || self.created_by.id == scope.user_id)
    }

    pub async fn save(&mut self) -> Result<ObjectId, ApiError> {
        self._id = Some(ObjectId::new());
        collection()?.insert_one(&*self, None).await?;
        self._id.ok_or_else(|| ApiError::internal("INSERTING_FAILED"))
    }
    pub async fn update(&self) -> Result<ObjectId, ApiError> {
        let _id = self._id.ok_or_else(|| ApiError::internal("MINUTES_WITHOUT_ID"))?;
        collection()?.replace_one(doc! { "_id": _id }, self, None).await?;
        Ok(_id)
    }
    pub async fn delete(&self) -> Result<u64, ApiError> {
        let _id = self._id.ok_or_else(|| ApiError::internal("MINUTES_WITHOUT_ID"))?;
        Ok(collection()?
            .delete_one(doc! { "_id": _id }, None)
            .await?
            .deleted_count)
    }
    pub async fn find_many(
        query: &MeetingMinutesQuery,
        page: &PageQuery,
        scope: &AccessScope,
    ) -> Result<(Vec<MeetingMinutesResponse>, Pagination), ApiError> {
        let filter = query.filter(scope)?;
        let sort = page.sort(&["meetingDate", "createdAt", "title", "status"], "meetingDate");
        let (minutes, pagination) = paginate(&collection()?, filter, sort, page).await?;
        Ok((
            minutes.into_iter().map(MeetingMinutesResponse::from).collect(),
            pagination,
        ))
    }
    pub async fn find_by_id(_id: &ObjectId) -> Result<Option<MeetingMinutes>, ApiError> {
        Ok(collection()?.find_one(doc! { "_id": _id }, None).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::role::UserRole;

    fn actor(id: &str) -> Actor {
        Actor {
            id: id.to_string(),
            name: format!("user {id}"),
        }
    }

    fn minutes() -> MeetingMinutes {
        MeetingMinutes::new(
            MeetingMinutesRequest {
                title: "Weekly maintenance sync".to_string(),
                department: None,
                meeting_date: "2024-06-03".to_string(),
                attendees: vec!["Ana".to_string(), "  ".to_string()],
                agenda: Some("Backlog".to_string()),
                discussion: None,
                decisions: Some("Replace belt on line 2".to_string()),
                action_items: vec![ActionItemRequest {
                    id: None,
                    description: "Order belt".to_string(),
                    assigned_to: Some("Ana".to_string()),
                    due_date: Some("2024-06-07".to_string()),
                    status: None,
                }],
            },
            actor("u1"),
            Some("Ops".to_string()),
        )
        .unwrap()
    }

    fn scope(role: UserRole) -> AccessScope {
        AccessScope {
            role,
            department: Some("Ops".to_string()),
            user_id: "u2".to_string(),
            employee_id: None,
        }
    }

    #[test]
    fn drafts_are_hidden_until_approved() {
        let mut minutes = minutes();
        assert_eq!(minutes.attendees, vec!["Ana".to_string()]);
        assert!(!minutes.is_visible_to(&scope(UserRole::NormalUser)));
        assert!(minutes.is_visible_to(&scope(UserRole::Manager)));

        minutes.approve(actor("m1")).unwrap();
        assert_eq!(minutes.status, MinutesStatus::Published);
        assert!(minutes.is_visible_to(&scope(UserRole::NormalUser)));
        assert!(matches!(minutes.approve(actor("m1")), Err(ApiError::Conflict(_))));
    }

    #[test]
    fn action_item_status_updates_by_id() {
        let mut minutes = minutes();
        let item_id = minutes.action_items[0].id.clone();
        let item = minutes.set_action_item_status(&item_id, ActionItemStatus::Done).unwrap();
        assert_eq!(item.status, ActionItemStatus::Done);
        assert!(minutes.set_action_item_status("missing", ActionItemStatus::Done).is_err());
    }

    #[test]
    fn edits_keep_known_action_item_ids() {
        let mut minutes = minutes();
        let item_id = minutes.action_items[0].id.clone();
        minutes.set_action_item_status(&item_id, ActionItemStatus::Done).unwrap();
        minutes
            .apply(
                MeetingMinutesRequest {
                    title: "Weekly maintenance sync".to_string(),
                    department: None,
                    meeting_date: "2024-06-03".to_string(),
                    attendees: Vec::new(),
                    agenda: None,
                    discussion: None,
                    decisions: None,
                    action_items: vec![ActionItemRequest {
                        id: Some(item_id.clone()),
                        description: "Order belt (two spares)".to_string(),
                        assigned_to: None,
                        due_date: None,
                        status: None,
                    }],
                },
                None,
            )
            .unwrap();
        assert_eq!(minutes.action_items[0].id, item_id);
        assert_eq!(minutes.action_items[0].status, ActionItemStatus::Done);
    }

    #[test]
    fn normal_user_filter_forces_published() {
        let filter = MeetingMinutesQuery {
            status: Some(MinutesStatus::Draft),
            ..Default::default()
        }
        .filter(&scope(UserRole::NormalUser))
        .unwrap();
        assert_eq!(filter.get_str("status").unwrap(), "published");
    }
}
