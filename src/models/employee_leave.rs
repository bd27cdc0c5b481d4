use crate::{
    database::{get_db, paginate},
    error::ApiError,
    response::{PageQuery, Pagination},
    utils::{from_bson_date, parse_date, push_and, sanitize, sanitize_opt, to_bson_date},
};
use chrono::{DateTime, Utc};
use mongodb::{
    bson::{doc, oid::ObjectId, DateTime as BsonDateTime, Document},
    Collection,
};
use serde::{Deserialize, Serialize};

use super::{role::AccessScope, Actor};

const COLLECTION: &str = "employeeleaves";
const OWNER_FIELDS: [&str; 1] = ["employeeId"];

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LeaveType {
    Annual,
    Sick,
    Casual,
    Unpaid,
    Other,
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LeaveStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl LeaveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaveStatus::Pending => "pending",
            LeaveStatus::Approved => "approved",
            LeaveStatus::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeLeave {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,
    pub employee_id: String,
    pub employee_name: String,
    pub department: Option<String>,
    pub leave_type: LeaveType,
    pub start_date: BsonDateTime,
    pub end_date: BsonDateTime,
    pub days: i64,
    pub reason: Option<String>,
    pub status: LeaveStatus,
    pub approved_by: Option<Actor>,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeLeaveRequest {
    pub employee_id: Option<String>,
    pub employee_name: Option<String>,
    pub department: Option<String>,
    pub leave_type: LeaveType,
    pub start_date: String,
    pub end_date: String,
    pub reason: Option<String>,
}
#[derive(Debug, Deserialize)]
pub struct LeaveDecisionRequest {
    pub status: LeaveStatus,
}
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeLeaveQuery {
    pub employee_id: Option<String>,
    pub department: Option<String>,
    pub status: Option<LeaveStatus>,
    pub leave_type: Option<LeaveType>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeLeaveResponse {
    #[serde(rename = "_id")]
    pub _id: String,
    pub employee_id: String,
    pub employee_name: String,
    pub department: Option<String>,
    pub leave_type: LeaveType,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub days: i64,
    pub reason: Option<String>,
    pub status: LeaveStatus,
    pub approved_by: Option<Actor>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<EmployeeLeave> for EmployeeLeaveResponse {
    fn from(leave: EmployeeLeave) -> Self {
        Self {
            _id: leave._id.map(|id| id.to_hex()).unwrap_or_default(),
            employee_id: leave.employee_id,
            employee_name: leave.employee_name,
            department: leave.department,
            leave_type: leave.leave_type,
            start_date: from_bson_date(leave.start_date),
            end_date: from_bson_date(leave.end_date),
            days: leave.days,
            reason: leave.reason,
            status: leave.status,
            approved_by: leave.approved_by,
            created_at: from_bson_date(leave.created_at),
            updated_at: from_bson_date(leave.updated_at),
        }
    }
}

impl EmployeeLeaveQuery {
    pub fn filter(&self, scope: &AccessScope) -> Result<Document, ApiError> {
        let mut filter = scope.filter("department", &OWNER_FIELDS);
        if let Some(department) = scope.department_filter(self.department.as_deref()) {
            filter.insert("department", department);
        }
        if let Some(employee_id) = self.employee_id.as_deref().filter(|v| !v.trim().is_empty()) {
            filter.insert("employeeId", employee_id.trim());
        }
        if let Some(status) = self.status {
            filter.insert("status", status.as_str());
        }
        if let Some(leave_type) = self.leave_type {
            filter.insert("leaveType", mongodb::bson::to_bson(&leave_type)?);
        }
        // Leaves overlapping the window, not just starting inside it.
        if let Some(start) = self.start_date.as_deref().filter(|v| !v.trim().is_empty()) {
            push_and(&mut filter, doc! { "endDate": { "$gte": to_bson_date(parse_date(start)?) } });
        }
        if let Some(end) = self.end_date.as_deref().filter(|v| !v.trim().is_empty()) {
            let end = to_bson_date(crate::utils::parse_end_date(end)?);
            push_and(&mut filter, doc! { "startDate": { "$lte": end } });
        }
        Ok(filter)
    }
}

/// Calendar days from start to end, both included.
pub fn leave_days(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    (end.date_naive() - start.date_naive()).num_days() + 1
}

fn collection() -> Result<Collection<EmployeeLeave>, ApiError> {
    Ok(get_db()?.collection::<EmployeeLeave>(COLLECTION))
}

impl EmployeeLeave {
    /// `employee` is the id and name the leave is filed for; restricted
    /// callers can only file for themselves.
    pub fn new(
        payload: EmployeeLeaveRequest,
        employee: (String, String),
        department: Option<String>,
    ) -> Result<Self, ApiError> {
        let start = parse_date(&payload.start_date)?;
        let end = parse_date(&payload.end_date)?;
        if end < start {
            return Err(ApiError::validation("END_DATE_BEFORE_START_DATE"));
        }
        let (employee_id, employee_name) = employee;
        if employee_id.trim().is_empty() {
            return Err(ApiError::validation("employeeId is required"));
        }
        let now = BsonDateTime::now();
        Ok(Self {
            _id: None,
            employee_id: sanitize(&employee_id, 50),
            employee_name: sanitize(&employee_name, 200),
            department,
            leave_type: payload.leave_type,
            start_date: to_bson_date(start),
            end_date: to_bson_date(end),
            days: leave_days(start, end),
            reason: sanitize_opt(payload.reason.as_deref(), 1000),
            status: LeaveStatus::Pending,
            approved_by: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn decide(&mut self, status: LeaveStatus, approver: Actor) -> Result<(), ApiError> {
        if self.status != LeaveStatus::Pending {
            return Err(ApiError::conflict("LEAVE_ALREADY_DECIDED"));
        }
        if status == LeaveStatus::Pending {
            return Err(ApiError::validation("status must be approved or rejected"));
        }
        self.status = status;
        self.approved_by = Some(approver);
        self.updated_at = BsonDateTime::now();
        Ok(())
    }

    /// Own pending leave, or any leave in scope for privileged callers.
    pub fn can_delete(&self, scope: &AccessScope) -> bool {
        if scope.role.is_privileged() {
            return scope.allows(self.department.as_deref(), &[]);
        }
        self.status == LeaveStatus::Pending
            && scope.allows(self.department.as_deref(), &[Some(self.employee_id.as_str())])
    }

    pub async fn save(&mut self) -> Result<ObjectId, ApiError> {
        self._id = Some(ObjectId::new());
        collection()?.insert_one(&*self, None).await?;
        self._id.ok_or_else(|| ApiError::internal("INSERTING_FAILED"))
    }
    pub async fn update(&self) -> Result<ObjectId, ApiError> {
        let _id = self._id.ok_or_else(|| ApiError::internal("LEAVE_WITHOUT_ID"))?;
        collection()?.replace_one(doc! { "_id": _id }, self, None).await?;
        Ok(_id)
    }
    pub async fn delete(&self) -> Result<u64, ApiError> {
        let _id = self._id.ok_or_else(|| ApiError::internal("LEAVE_WITHOUT_ID"))?;
        Ok(collection()?
            .delete_one(doc! { "_id": _id }, None)
            .await?
            .deleted_count)
    }
    pub async fn find_many(
        query: &EmployeeLeaveQuery,
        page: &PageQuery,
        scope: &AccessScope,
    ) -> Result<(Vec<EmployeeLeaveResponse>, Pagination), ApiError> {
        let filter = query.filter(scope)?;
        let sort = page.sort(&["startDate", "endDate", "createdAt", "status", "days"], "startDate");
        let (leaves, pagination) = paginate(&collection()?, filter, sort, page).await?;
        Ok((
            leaves.into_iter().map(EmployeeLeaveResponse::from).collect(),
            pagination,
        ))
    }
    pub async fn find_by_id(_id: &ObjectId) -> Result<Option<EmployeeLeave>, ApiError> {
        Ok(collection()?.find_one(doc! { "_id": _id }, None).await?)
    }
    pub async fn find_for_employee(employee_id: &str, limit: i64) -> Result<Vec<EmployeeLeave>, ApiError> {
        crate::database::find_capped(
            &collection()?,
            doc! { "employeeId": employee_id },
            doc! { "startDate": -1 },
            limit,
        )
        .await
    }
    pub async fn find_capped(filter: Document, limit: i64) -> Result<Vec<EmployeeLeave>, ApiError> {
        crate::database::find_capped(&collection()?, filter, doc! { "startDate": 1 }, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::role::UserRole;

    fn leave(start: &str, end: &str) -> Result<EmployeeLeave, ApiError> {
        EmployeeLeave::new(
            EmployeeLeaveRequest {
                employee_id: None,
                employee_name: None,
                department: None,
                leave_type: LeaveType::Annual,
                start_date: start.to_string(),
                end_date: end.to_string(),
                reason: Some("Family trip".to_string()),
            },
            ("EMP-7".to_string(), "Sam Ortiz".to_string()),
            Some("Ops".to_string()),
        )
    }

    fn approver() -> Actor {
        Actor {
            id: "m1".to_string(),
            name: "Manager".to_string(),
        }
    }

    #[test]
    fn days_are_counted_inclusively() {
        assert_eq!(leave("2024-05-06", "2024-05-10").unwrap().days, 5);
        assert_eq!(leave("2024-05-06", "2024-05-06").unwrap().days, 1);
        assert!(leave("2024-05-10", "2024-05-06").is_err());
    }

    #[test]
    fn only_pending_leaves_can_be_decided() {
        let mut leave = leave("2024-05-06", "2024-05-07").unwrap();
        leave.decide(LeaveStatus::Approved, approver()).unwrap();
        assert_eq!(leave.status, LeaveStatus::Approved);
        let again = leave.decide(LeaveStatus::Rejected, approver()).unwrap_err();
        assert!(matches!(again, ApiError::Conflict(_)));
    }

    #[test]
    fn normal_user_deletes_only_own_pending_leave() {
        let mut leave = leave("2024-05-06", "2024-05-07").unwrap();
        let owner = AccessScope {
            role: UserRole::NormalUser,
            department: Some("Ops".to_string()),
            user_id: "u7".to_string(),
            employee_id: Some("EMP-7".to_string()),
        };
        let stranger = AccessScope {
            employee_id: Some("EMP-8".to_string()),
            ..owner.clone()
        };
        assert!(leave.can_delete(&owner));
        assert!(!leave.can_delete(&stranger));
        leave.decide(LeaveStatus::Approved, approver()).unwrap();
        assert!(!leave.can_delete(&owner));
    }
}
