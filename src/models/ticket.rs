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
    role::{AccessScope, UserRole},
    Actor, Priority,
};

const COLLECTION: &str = "tickets";
pub const OWNER_FIELDS: [&str; 2] = ["reportedBy.id", "assignedToId"];

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TicketStatus {
    Open,
    InProgress,
    Pending,
    Completed,
    Cancelled,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Open => "open",
            TicketStatus::InProgress => "in-progress",
            TicketStatus::Pending => "pending",
            TicketStatus::Completed => "completed",
            TicketStatus::Cancelled => "cancelled",
        }
    }
    pub fn is_terminal(&self) -> bool {
        matches!(self, TicketStatus::Completed | TicketStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusApproval {
    pub pending: bool,
    pub requested_status: Option<TicketStatus>,
    pub requested_by: Option<Actor>,
    pub requested_at: Option<BsonDateTime>,
    pub approved_by: Option<Actor>,
    pub approved_at: Option<BsonDateTime>,
    #[serde(default)]
    pub rejected: bool,
    pub remarks: Option<String>,
}
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketComment {
    pub id: String,
    pub author: Actor,
    pub message: String,
    pub created_at: BsonDateTime,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,
    pub ticket_id: String,
    pub subject: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub status: TicketStatus,
    pub department: Option<String>,
    pub area: Option<String>,
    pub asset_id: Option<String>,
    pub asset_name: Option<String>,
    pub reported_by: Actor,
    pub assigned_to: Option<String>,
    pub assigned_to_id: Option<String>,
    pub due_date: Option<BsonDateTime>,
    pub status_approval: Option<StatusApproval>,
    #[serde(default)]
    pub comments: Vec<TicketComment>,
    pub completed_at: Option<BsonDateTime>,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketRequest {
    pub subject: String,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub department: Option<String>,
    pub area: Option<String>,
    pub asset_id: Option<String>,
    pub asset_name: Option<String>,
    pub assigned_to: Option<String>,
    pub assigned_to_id: Option<String>,
    pub due_date: Option<String>,
}
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketStatusRequest {
    pub status: Option<TicketStatus>,
    pub approve: Option<bool>,
    pub remarks: Option<String>,
}
#[derive(Debug, Deserialize)]
pub struct TicketCommentRequest {
    pub message: String,
}
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketQuery {
    pub status: Option<TicketStatus>,
    pub priority: Option<Priority>,
    pub department: Option<String>,
    pub assigned_to: Option<String>,
    pub search: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// What a status change did to the ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StatusChangeOutcome {
    Requested { requested: TicketStatus },
    Applied { from: TicketStatus, to: TicketStatus },
    Approved { from: TicketStatus, to: TicketStatus },
    Rejected { requested: TicketStatus },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusApprovalResponse {
    pub pending: bool,
    pub requested_status: Option<TicketStatus>,
    pub requested_by: Option<Actor>,
    pub requested_at: Option<DateTime<Utc>>,
    pub approved_by: Option<Actor>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected: bool,
    pub remarks: Option<String>,
}
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketCommentResponse {
    pub id: String,
    pub author: Actor,
    pub message: String,
    pub created_at: DateTime<Utc>,
}
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketResponse {
    #[serde(rename = "_id")]
    pub _id: String,
    pub ticket_id: String,
    pub subject: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub status: TicketStatus,
    pub department: Option<String>,
    pub area: Option<String>,
    pub asset_id: Option<String>,
    pub asset_name: Option<String>,
    pub reported_by: Actor,
    pub assigned_to: Option<String>,
    pub assigned_to_id: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub status_approval: Option<StatusApprovalResponse>,
    pub comments: Vec<TicketCommentResponse>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Ticket> for TicketResponse {
    fn from(ticket: Ticket) -> Self {
        Self {
            _id: ticket._id.map(|id| id.to_hex()).unwrap_or_default(),
            ticket_id: ticket.ticket_id,
            subject: ticket.subject,
            description: ticket.description,
            priority: ticket.priority,
            status: ticket.status,
            department: ticket.department,
            area: ticket.area,
            asset_id: ticket.asset_id,
            asset_name: ticket.asset_name,
            reported_by: ticket.reported_by,
            assigned_to: ticket.assigned_to,
            assigned_to_id: ticket.assigned_to_id,
            due_date: ticket.due_date.map(from_bson_date),
            status_approval: ticket.status_approval.map(|approval| StatusApprovalResponse {
                pending: approval.pending,
                requested_status: approval.requested_status,
                requested_by: approval.requested_by,
                requested_at: approval.requested_at.map(from_bson_date),
                approved_by: approval.approved_by,
                approved_at: approval.approved_at.map(from_bson_date),
                rejected: approval.rejected,
                remarks: approval.remarks,
            }),
            comments: ticket
                .comments
                .into_iter()
                .map(|comment| TicketCommentResponse {
                    id: comment.id,
                    author: comment.author,
                    message: comment.message,
                    created_at: from_bson_date(comment.created_at),
                })
                .collect(),
            completed_at: ticket.completed_at.map(from_bson_date),
            created_at: from_bson_date(ticket.created_at),
            updated_at: from_bson_date(ticket.updated_at),
        }
    }
}

impl TicketQuery {
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
        if let Some(assigned_to) = self.assigned_to.as_deref().filter(|v| !v.trim().is_empty()) {
            push_and(
                &mut filter,
                doc! { "$or": [
                    { "assignedToId": assigned_to.trim() },
                    { "assignedTo": contains_ci(assigned_to) },
                ] },
            );
        }
        if let Some(search) = self.search.as_deref().filter(|v| !v.trim().is_empty()) {
            push_and(
                &mut filter,
                doc! { "$or": [
                    { "subject": contains_ci(search) },
                    { "ticketId": contains_ci(search) },
                    { "assetName": contains_ci(search) },
                ] },
            );
        }
        if let Some(range) = date_range(self.start_date.as_deref(), self.end_date.as_deref())? {
            filter.insert("createdAt", range);
        }
        Ok(filter)
    }
}

fn collection() -> Result<Collection<Ticket>, ApiError> {
    Ok(get_db()?.collection::<Ticket>(COLLECTION))
}

fn generate_ticket_id(id: &ObjectId, now: DateTime<Utc>) -> String {
    let hex = id.to_hex();
    format!(
        "TKT-{}-{}",
        now.format("%Y%m%d"),
        hex[hex.len() - 4..].to_uppercase()
    )
}

impl Ticket {
    pub fn new(payload: TicketRequest, reporter: Actor, department: Option<String>) -> Result<Self, ApiError> {
        let subject = sanitize(&payload.subject, 200);
        if subject.is_empty() {
            return Err(ApiError::validation("subject is required"));
        }
        let due_date = match payload.due_date.as_deref().filter(|v| !v.trim().is_empty()) {
            Some(due) => Some(to_bson_date(parse_date(due)?)),
            None => None,
        };
        let _id = ObjectId::new();
        let now = Utc::now();
        Ok(Self {
            _id: Some(_id),
            ticket_id: generate_ticket_id(&_id, now),
            subject,
            description: sanitize_opt(payload.description.as_deref(), 5000),
            priority: payload.priority.unwrap_or_default(),
            status: TicketStatus::Open,
            department,
            area: sanitize_opt(payload.area.as_deref(), 200),
            asset_id: payload.asset_id.filter(|v| !v.trim().is_empty()),
            asset_name: sanitize_opt(payload.asset_name.as_deref(), 200),
            reported_by: reporter,
            assigned_to: sanitize_opt(payload.assigned_to.as_deref(), 200),
            assigned_to_id: payload.assigned_to_id.filter(|v| !v.trim().is_empty()),
            due_date,
            status_approval: None,
            comments: Vec::new(),
            completed_at: None,
            created_at: to_bson_date(now),
            updated_at: to_bson_date(now),
        })
    }

    /// Replaces editable fields; status only moves through [`Ticket::change_status`].
    pub fn apply_update(&mut self, payload: TicketRequest, department: Option<String>) -> Result<(), ApiError> {
        let subject = sanitize(&payload.subject, 200);
        if subject.is_empty() {
            return Err(ApiError::validation("subject is required"));
        }
        self.subject = subject;
        self.description = sanitize_opt(payload.description.as_deref(), 5000);
        if let Some(priority) = payload.priority {
            self.priority = priority;
        }
        if department.is_some() {
            self.department = department;
        }
        self.area = sanitize_opt(payload.area.as_deref(), 200);
        self.asset_id = payload.asset_id.filter(|v| !v.trim().is_empty());
        self.asset_name = sanitize_opt(payload.asset_name.as_deref(), 200);
        self.assigned_to = sanitize_opt(payload.assigned_to.as_deref(), 200);
        self.assigned_to_id = payload.assigned_to_id.filter(|v| !v.trim().is_empty());
        self.due_date = match payload.due_date.as_deref().filter(|v| !v.trim().is_empty()) {
            Some(due) => Some(to_bson_date(parse_date(due)?)),
            None => None,
        };
        self.updated_at = BsonDateTime::now();
        Ok(())
    }

    pub fn is_pending_approval(&self) -> bool {
        self.status_approval
            .as_ref()
            .map(|approval| approval.pending)
            .unwrap_or(false)
    }

    fn check_transition(&self, to: TicketStatus) -> Result<(), ApiError> {
        if self.status.is_terminal() {
            return Err(ApiError::conflict("TICKET_ALREADY_CLOSED"));
        }
        if self.status == to {
            return Err(ApiError::validation("TICKET_ALREADY_IN_STATUS"));
        }
        Ok(())
    }

    fn set_status(&mut self, to: TicketStatus, now: BsonDateTime) {
        self.status = to;
        self.updated_at = now;
        if to == TicketStatus::Completed {
            self.completed_at = Some(now);
        }
    }

    /// Two-tier status change: non-privileged callers file a request, privileged
    /// callers decide a pending request or set the status directly.
    pub fn change_status(
        &mut self,
        request: &TicketStatusRequest,
        role: UserRole,
        caller: Actor,
    ) -> Result<StatusChangeOutcome, ApiError> {
        let now = BsonDateTime::now();
        let remarks = sanitize_opt(request.remarks.as_deref(), 1000);

        if !role.is_privileged() {
            let requested = request
                .status
                .ok_or_else(|| ApiError::validation("status is required"))?;
            if self.is_pending_approval() {
                return Err(ApiError::conflict("STATUS_CHANGE_ALREADY_PENDING"));
            }
            self.check_transition(requested)?;
            self.status_approval = Some(StatusApproval {
                pending: true,
                requested_status: Some(requested),
                requested_by: Some(caller),
                requested_at: Some(now),
                remarks,
                ..Default::default()
            });
            self.updated_at = now;
            return Ok(StatusChangeOutcome::Requested { requested });
        }

        if self.is_pending_approval() {
            let requested = self
                .status_approval
                .as_ref()
                .and_then(|approval| approval.requested_status)
                .ok_or_else(|| ApiError::internal("PENDING_REQUEST_WITHOUT_STATUS"))?;

            if request.approve == Some(false) {
                if let Some(approval) = self.status_approval.as_mut() {
                    approval.pending = false;
                    approval.rejected = true;
                    approval.approved_by = Some(caller);
                    approval.approved_at = Some(now);
                    approval.remarks = remarks;
                }
                self.updated_at = now;
                return Ok(StatusChangeOutcome::Rejected { requested });
            }

            self.check_transition(requested)?;
            let from = self.status;
            if let Some(approval) = self.status_approval.as_mut() {
                approval.pending = false;
                approval.rejected = false;
                approval.approved_by = Some(caller);
                approval.approved_at = Some(now);
                if remarks.is_some() {
                    approval.remarks = remarks;
                }
            }
            self.set_status(requested, now);
            return Ok(StatusChangeOutcome::Approved { from, to: requested });
        }

        let to = request
            .status
            .ok_or_else(|| ApiError::validation("status is required"))?;
        self.check_transition(to)?;
        let from = self.status;
        self.set_status(to, now);
        Ok(StatusChangeOutcome::Applied { from, to })
    }

    pub fn add_comment(&mut self, author: Actor, message: &str) -> Result<&TicketComment, ApiError> {
        let message = sanitize(message, 2000);
        if message.is_empty() {
            return Err(ApiError::validation("message is required"));
        }
        let now = BsonDateTime::now();
        self.comments.push(TicketComment {
            id: ObjectId::new().to_hex(),
            author,
            message,
            created_at: now,
        });
        self.updated_at = now;
        self.comments
            .last()
            .ok_or_else(|| ApiError::internal("COMMENT_NOT_SAVED"))
    }

    pub fn owners(&self) -> [Option<&str>; 2] {
        [Some(self.reported_by.id.as_str()), self.assigned_to_id.as_deref()]
    }

    /// Asset history entry for a status change, only for tickets raised against an asset.
    pub fn activity_entry(&self, outcome: &StatusChangeOutcome, actor: Actor) -> Option<AssetActivityLog> {
        let asset_id = self.asset_id.clone()?;
        let (activity_type, description) = match outcome {
            StatusChangeOutcome::Requested { requested } => (
                "status_change_requested",
                format!("{} requested status {}", actor.name, requested.as_str()),
            ),
            StatusChangeOutcome::Applied { from, to } | StatusChangeOutcome::Approved { from, to } => (
                "status_changed",
                format!("Status changed from {} to {}", from.as_str(), to.as_str()),
            ),
            StatusChangeOutcome::Rejected { requested } => (
                "status_change_rejected",
                format!("Request for status {} was rejected", requested.as_str()),
            ),
        };
        let now = BsonDateTime::now();
        Some(AssetActivityLog {
            _id: None,
            asset_id,
            asset_name: self.asset_name.clone(),
            module: ActivityModule::Ticket,
            activity_type: activity_type.to_string(),
            title: format!("{} {}", self.ticket_id, self.subject),
            description: Some(description),
            priority: self.priority,
            status: self.status.as_str().to_string(),
            department: self.department.clone(),
            reference_id: self._id.map(|id| id.to_hex()),
            created_by: actor,
            verified_by: None,
            verified_at: None,
            edit_history: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn save(&self) -> Result<ObjectId, ApiError> {
        collection()?.insert_one(self, None).await?;
        self._id.ok_or_else(|| ApiError::internal("INSERTING_FAILED"))
    }
    pub async fn update(&self) -> Result<ObjectId, ApiError> {
        let _id = self._id.ok_or_else(|| ApiError::internal("TICKET_WITHOUT_ID"))?;
        collection()?.replace_one(doc! { "_id": _id }, self, None).await?;
        Ok(_id)
    }
    pub async fn delete(&self) -> Result<u64, ApiError> {
        let _id = self._id.ok_or_else(|| ApiError::internal("TICKET_WITHOUT_ID"))?;
        Ok(collection()?
            .delete_one(doc! { "_id": _id }, None)
            .await?
            .deleted_count)
    }
    pub async fn find_many(
        query: &TicketQuery,
        page: &PageQuery,
        scope: &AccessScope,
    ) -> Result<(Vec<TicketResponse>, Pagination), ApiError> {
        let filter = query.filter(scope)?;
        let sort = page.sort(&["createdAt", "priority", "status", "dueDate", "ticketId"], "createdAt");
        let (tickets, pagination) = paginate(&collection()?, filter, sort, page).await?;
        Ok((tickets.into_iter().map(TicketResponse::from).collect(), pagination))
    }
    pub async fn find_by_id(_id: &ObjectId) -> Result<Option<Ticket>, ApiError> {
        Ok(collection()?.find_one(doc! { "_id": _id }, None).await?)
    }
    pub async fn find_capped(filter: Document, sort: Document, limit: i64) -> Result<Vec<Ticket>, ApiError> {
        crate::database::find_capped(&collection()?, filter, sort, limit).await
    }
    /// Tickets assigned to someone, matched by id or case-insensitive name.
    pub async fn find_assigned(
        assignee_id: Option<&str>,
        assignee_name: &str,
        limit: i64,
    ) -> Result<Vec<TicketResponse>, ApiError> {
        let mut matches = vec![doc! { "assignedTo": crate::utils::exact_ci(assignee_name) }];
        if let Some(id) = assignee_id {
            matches.push(doc! { "assignedToId": id });
        }
        let tickets = crate::database::find_capped(
            &collection()?,
            doc! { "$or": matches },
            doc! { "createdAt": -1 },
            limit,
        )
        .await?;
        Ok(tickets.into_iter().map(TicketResponse::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(id: &str) -> Actor {
        Actor {
            id: id.to_string(),
            name: format!("user {id}"),
        }
    }

    fn ticket() -> Ticket {
        Ticket::new(
            TicketRequest {
                subject: "Leaking valve".to_string(),
                description: None,
                priority: Some(Priority::High),
                department: None,
                area: Some("Boiler room".to_string()),
                asset_id: None,
                asset_name: None,
                assigned_to: Some("Sam Tech".to_string()),
                assigned_to_id: Some("EMP-7".to_string()),
                due_date: Some("2024-05-01".to_string()),
            },
            actor("reporter"),
            Some("Mechanical".to_string()),
        )
        .unwrap()
    }

    fn status(status: TicketStatus) -> TicketStatusRequest {
        TicketStatusRequest {
            status: Some(status),
            ..Default::default()
        }
    }

    #[test]
    fn new_ticket_gets_readable_id() {
        let ticket = ticket();
        assert!(ticket.ticket_id.starts_with("TKT-"));
        assert_eq!(ticket.ticket_id.len(), "TKT-20240101-ABCD".len());
        assert_eq!(ticket.status, TicketStatus::Open);
    }

    #[test]
    fn non_privileged_change_only_files_a_request() {
        let mut ticket = ticket();
        let outcome = ticket
            .change_status(&status(TicketStatus::InProgress), UserRole::NormalUser, actor("tech"))
            .unwrap();

        assert_eq!(
            outcome,
            StatusChangeOutcome::Requested {
                requested: TicketStatus::InProgress
            }
        );
        assert_eq!(ticket.status, TicketStatus::Open);
        let approval = ticket.status_approval.as_ref().unwrap();
        assert!(approval.pending);
        assert_eq!(approval.requested_status, Some(TicketStatus::InProgress));
        assert_eq!(approval.requested_by.as_ref().unwrap().id, "tech");

        let second = ticket.change_status(&status(TicketStatus::Cancelled), UserRole::NormalUser, actor("tech"));
        assert!(matches!(second, Err(ApiError::Conflict(_))));
    }

    #[test]
    fn privileged_call_applies_pending_request() {
        let mut ticket = ticket();
        ticket
            .change_status(&status(TicketStatus::Completed), UserRole::NormalUser, actor("tech"))
            .unwrap();

        let outcome = ticket
            .change_status(&TicketStatusRequest::default(), UserRole::Manager, actor("boss"))
            .unwrap();
        assert_eq!(
            outcome,
            StatusChangeOutcome::Approved {
                from: TicketStatus::Open,
                to: TicketStatus::Completed
            }
        );
        assert_eq!(ticket.status, TicketStatus::Completed);
        assert!(ticket.completed_at.is_some());
        let approval = ticket.status_approval.as_ref().unwrap();
        assert!(!approval.pending);
        assert_eq!(approval.approved_by.as_ref().unwrap().id, "boss");
    }

    #[test]
    fn privileged_rejection_keeps_status() {
        let mut ticket = ticket();
        ticket
            .change_status(&status(TicketStatus::Cancelled), UserRole::NormalUser, actor("tech"))
            .unwrap();
        let outcome = ticket
            .change_status(
                &TicketStatusRequest {
                    approve: Some(false),
                    ..Default::default()
                },
                UserRole::Admin,
                actor("boss"),
            )
            .unwrap();
        assert_eq!(
            outcome,
            StatusChangeOutcome::Rejected {
                requested: TicketStatus::Cancelled
            }
        );
        assert_eq!(ticket.status, TicketStatus::Open);
        assert!(!ticket.is_pending_approval());
        assert!(ticket.status_approval.as_ref().unwrap().rejected);
    }

    #[test]
    fn privileged_direct_change_and_terminal_guard() {
        let mut ticket = ticket();
        ticket
            .change_status(&status(TicketStatus::InProgress), UserRole::SuperAdmin, actor("root"))
            .unwrap();
        assert_eq!(ticket.status, TicketStatus::InProgress);

        assert!(matches!(
            ticket.change_status(&status(TicketStatus::InProgress), UserRole::Manager, actor("m")),
            Err(ApiError::Validation(_))
        ));

        ticket
            .change_status(&status(TicketStatus::Cancelled), UserRole::Manager, actor("m"))
            .unwrap();
        assert!(matches!(
            ticket.change_status(&status(TicketStatus::Open), UserRole::Manager, actor("m")),
            Err(ApiError::Conflict(_))
        ));
    }

    #[test]
    fn search_and_scope_do_not_clobber_each_other() {
        let scope = AccessScope {
            role: UserRole::NormalUser,
            department: Some("Mechanical".to_string()),
            user_id: "u1".to_string(),
            employee_id: None,
        };
        let query = TicketQuery {
            search: Some("valve".to_string()),
            status: Some(TicketStatus::InProgress),
            ..Default::default()
        };
        let filter = query.filter(&scope).unwrap();
        assert!(filter.contains_key("$or"));
        assert_eq!(filter.get_array("$and").unwrap().len(), 1);
        assert_eq!(filter.get_str("status").unwrap(), "in-progress");
    }

    #[test]
    fn activity_entry_follows_the_asset() {
        let mut ticket = ticket();
        let outcome = StatusChangeOutcome::Applied {
            from: TicketStatus::Open,
            to: TicketStatus::InProgress,
        };
        ticket.asset_id = None;
        assert!(ticket.activity_entry(&outcome, actor("m")).is_none());

        ticket.asset_id = Some("A-7".to_string());
        let entry = ticket.activity_entry(&outcome, actor("m")).unwrap();
        assert_eq!(entry.module, ActivityModule::Ticket);
        assert_eq!(entry.activity_type, "status_changed");
        assert_eq!(entry.created_by.id, "m");
    }

    #[test]
    fn comments_are_sanitized() {
        let mut ticket = ticket();
        assert!(ticket.add_comment(actor("a"), "   ").is_err());
        let comment = ticket.add_comment(actor("a"), " <i>checked</i> ").unwrap();
        assert_eq!(comment.message, "ichecked/i");
    }
}
