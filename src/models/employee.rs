use crate::{
    database::{get_db, paginate},
    error::{settle, ApiError},
    response::{PageQuery, Pagination},
    utils::{contains_ci, from_bson_date, is_valid_email, parse_date, push_and, sanitize, sanitize_opt, to_bson_date},
};
use chrono::{DateTime, Utc};
use mongodb::{
    bson::{doc, oid::ObjectId, DateTime as BsonDateTime, Document},
    Collection,
};
use serde::{Deserialize, Serialize};

use super::{
    employee_leave::{EmployeeLeave, EmployeeLeaveResponse},
    performance::{Performance, PerformanceResponse, PerformanceSummary},
    role::AccessScope,
    shift_detail::{ShiftDetail, ShiftDetailResponse},
    ticket::{Ticket, TicketResponse},
};

const COLLECTION: &str = "employees";
const OWNER_FIELDS: [&str; 1] = ["employeeId"];
const DETAIL_LIMIT: i64 = 100;

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmployeeStatus {
    #[default]
    Active,
    Inactive,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,
    pub employee_id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub department: Option<String>,
    pub designation: Option<String>,
    pub role: Option<String>,
    pub join_date: Option<BsonDateTime>,
    pub status: EmployeeStatus,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeRequest {
    pub employee_id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub department: Option<String>,
    pub designation: Option<String>,
    pub role: Option<String>,
    pub join_date: Option<String>,
    pub status: Option<EmployeeStatus>,
}
#[derive(Debug, Default, Deserialize)]
pub struct EmployeeQuery {
    pub search: Option<String>,
    pub department: Option<String>,
    pub designation: Option<String>,
    pub status: Option<EmployeeStatus>,
}
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeResponse {
    #[serde(rename = "_id")]
    pub _id: String,
    pub employee_id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub department: Option<String>,
    pub designation: Option<String>,
    pub role: Option<String>,
    pub join_date: Option<DateTime<Utc>>,
    pub status: EmployeeStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
/// Employee joined with the records that reference them.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeDetails {
    pub employee: EmployeeResponse,
    pub leaves: Vec<EmployeeLeaveResponse>,
    pub shift: Option<ShiftDetailResponse>,
    pub performance: Vec<PerformanceResponse>,
    pub performance_summary: PerformanceSummary,
    pub assigned_tickets: Vec<TicketResponse>,
}

impl From<Employee> for EmployeeResponse {
    fn from(employee: Employee) -> Self {
        Self {
            _id: employee._id.map(|id| id.to_hex()).unwrap_or_default(),
            employee_id: employee.employee_id,
            name: employee.name,
            email: employee.email,
            phone: employee.phone,
            department: employee.department,
            designation: employee.designation,
            role: employee.role,
            join_date: employee.join_date.map(from_bson_date),
            status: employee.status,
            created_at: from_bson_date(employee.created_at),
            updated_at: from_bson_date(employee.updated_at),
        }
    }
}

impl EmployeeQuery {
    pub fn filter(&self, scope: &AccessScope) -> Document {
        let mut filter = scope.filter("department", &OWNER_FIELDS);
        if let Some(department) = scope.department_filter(self.department.as_deref()) {
            filter.insert("department", department);
        }
        if let Some(designation) = self.designation.as_deref().filter(|v| !v.trim().is_empty()) {
            filter.insert("designation", crate::utils::exact_ci(designation));
        }
        if let Some(status) = self.status {
            filter.insert(
                "status",
                match status {
                    EmployeeStatus::Active => "active",
                    EmployeeStatus::Inactive => "inactive",
                },
            );
        }
        if let Some(search) = self.search.as_deref().filter(|v| !v.trim().is_empty()) {
            push_and(
                &mut filter,
                doc! { "$or": [
                    { "name": contains_ci(search) },
                    { "email": contains_ci(search) },
                    { "employeeId": contains_ci(search) },
                ] },
            );
        }
        filter
    }
}

fn collection() -> Result<Collection<Employee>, ApiError> {
    Ok(get_db()?.collection::<Employee>(COLLECTION))
}

impl Employee {
    pub fn new(payload: EmployeeRequest, department: Option<String>) -> Result<Self, ApiError> {
        let now = BsonDateTime::now();
        let mut employee = Self {
            _id: None,
            employee_id: String::new(),
            name: String::new(),
            email: String::new(),
            phone: None,
            department,
            designation: None,
            role: None,
            join_date: None,
            status: EmployeeStatus::Active,
            created_at: now,
            updated_at: now,
        };
        employee.apply(payload, None)?;
        Ok(employee)
    }

    pub fn apply(&mut self, payload: EmployeeRequest, department: Option<String>) -> Result<(), ApiError> {
        let employee_id = sanitize(&payload.employee_id, 50);
        let name = sanitize(&payload.name, 200);
        if employee_id.is_empty() {
            return Err(ApiError::validation("employeeId is required"));
        }
        if name.is_empty() {
            return Err(ApiError::validation("name is required"));
        }
        if !is_valid_email(&payload.email) {
            return Err(ApiError::validation("EMPLOYEE_MUST_HAVE_VALID_EMAIL"));
        }
        self.employee_id = employee_id;
        self.name = name;
        self.email = payload.email.trim().to_lowercase();
        self.phone = sanitize_opt(payload.phone.as_deref(), 30);
        if department.is_some() {
            self.department = department;
        }
        self.designation = sanitize_opt(payload.designation.as_deref(), 100);
        self.role = sanitize_opt(payload.role.as_deref(), 50);
        self.join_date = match payload.join_date.as_deref().filter(|v| !v.trim().is_empty()) {
            Some(date) => Some(to_bson_date(parse_date(date)?)),
            None => None,
        };
        self.status = payload.status.unwrap_or(self.status);
        self.updated_at = BsonDateTime::now();
        Ok(())
    }

    /// Rejects an email or employee id already used by another employee.
    pub async fn ensure_unique(&self) -> Result<(), ApiError> {
        let mut filter = doc! { "$or": [
            { "email": &self.email },
            { "employeeId": &self.employee_id },
        ] };
        if let Some(_id) = self._id {
            filter.insert("_id", doc! { "$ne": _id });
        }
        match collection()?.find_one(filter, None).await? {
            Some(existing) if existing.email == self.email => {
                Err(ApiError::conflict("EMPLOYEE_EMAIL_ALREADY_EXIST"))
            }
            Some(_) => Err(ApiError::conflict("EMPLOYEE_ID_ALREADY_EXIST")),
            None => Ok(()),
        }
    }

    pub async fn save(&mut self) -> Result<ObjectId, ApiError> {
        self._id = Some(ObjectId::new());
        collection()?.insert_one(&*self, None).await?;
        self._id.ok_or_else(|| ApiError::internal("INSERTING_FAILED"))
    }
    pub async fn update(&self) -> Result<ObjectId, ApiError> {
        let _id = self._id.ok_or_else(|| ApiError::internal("EMPLOYEE_WITHOUT_ID"))?;
        collection()?.replace_one(doc! { "_id": _id }, self, None).await?;
        Ok(_id)
    }
    pub async fn delete(&self) -> Result<u64, ApiError> {
        let _id = self._id.ok_or_else(|| ApiError::internal("EMPLOYEE_WITHOUT_ID"))?;
        Ok(collection()?
            .delete_one(doc! { "_id": _id }, None)
            .await?
            .deleted_count)
    }
    pub async fn find_many(
        query: &EmployeeQuery,
        page: &PageQuery,
        scope: &AccessScope,
    ) -> Result<(Vec<EmployeeResponse>, Pagination), ApiError> {
        let filter = query.filter(scope);
        let sort = page.sort(&["name", "employeeId", "department", "joinDate", "createdAt"], "name");
        let (employees, pagination) = paginate(&collection()?, filter, sort, page).await?;
        Ok((
            employees.into_iter().map(EmployeeResponse::from).collect(),
            pagination,
        ))
    }
    pub async fn find_by_id(_id: &ObjectId) -> Result<Option<Employee>, ApiError> {
        Ok(collection()?.find_one(doc! { "_id": _id }, None).await?)
    }

    /// Stitches leaves, shift, performance and assigned tickets together by
    /// employee id, email or name. A failing lookup leaves its section empty.
    pub async fn details(self) -> EmployeeDetails {
        let (leaves, shift, performance, tickets) = futures::join!(
            EmployeeLeave::find_for_employee(&self.employee_id, DETAIL_LIMIT),
            ShiftDetail::find_for_employee(&self.employee_id, &self.email),
            Performance::find_for_employee(&self.employee_id, &self.name, DETAIL_LIMIT),
            Ticket::find_assigned(Some(&self.employee_id), &self.name, DETAIL_LIMIT),
        );
        let performance = settle("performance", performance);
        EmployeeDetails {
            leaves: settle("employee_leaves", leaves)
                .into_iter()
                .map(EmployeeLeaveResponse::from)
                .collect(),
            shift: settle("shift_details", shift).map(ShiftDetailResponse::from),
            performance_summary: PerformanceSummary::from_records(&performance),
            performance: performance.into_iter().map(PerformanceResponse::from).collect(),
            assigned_tickets: settle("tickets", tickets),
            employee: EmployeeResponse::from(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::role::UserRole;

    fn request(email: &str) -> EmployeeRequest {
        EmployeeRequest {
            employee_id: " EMP-001 ".to_string(),
            name: "Dana Reyes".to_string(),
            email: email.to_string(),
            phone: None,
            department: None,
            designation: Some("Technician".to_string()),
            role: None,
            join_date: Some("2021-02-01".to_string()),
            status: None,
        }
    }

    #[test]
    fn new_employee_is_normalized() {
        let employee = Employee::new(request("Dana.Reyes@Plant.example.com"), Some("Ops".to_string())).unwrap();
        assert_eq!(employee.employee_id, "EMP-001");
        assert_eq!(employee.email, "dana.reyes@plant.example.com");
        assert_eq!(employee.status, EmployeeStatus::Active);
        assert!(employee.join_date.is_some());
    }

    #[test]
    fn invalid_email_is_rejected() {
        assert!(Employee::new(request("dana"), None).is_err());
    }

    #[test]
    fn normal_user_only_sees_own_employee_record() {
        let scope = AccessScope {
            role: UserRole::NormalUser,
            department: Some("Ops".to_string()),
            user_id: "u1".to_string(),
            employee_id: Some("EMP-001".to_string()),
        };
        let filter = EmployeeQuery {
            search: Some("dana".to_string()),
            ..Default::default()
        }
        .filter(&scope);
        assert_eq!(filter.get_str("department").unwrap(), "Ops");
        assert!(filter.contains_key("$or"));
        assert!(filter.contains_key("$and"));
    }
}
