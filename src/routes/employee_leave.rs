use actix_web::{delete, get, patch, post, web, HttpRequest, HttpResponse};

use crate::{
    error::ApiError,
    models::{
        employee_leave::{
            EmployeeLeave, EmployeeLeaveQuery, EmployeeLeaveRequest, EmployeeLeaveResponse, LeaveDecisionRequest,
        },
        role::AccessScope,
        user::{current_user, UserAuthenticationData},
    },
    response::{created, ok, page, PageQuery},
    utils::parse_id,
};

/// Privileged callers file for anyone named in the payload; everyone else
/// files for themselves.
fn leave_owner(payload: &mut EmployeeLeaveRequest, issuer: &UserAuthenticationData) -> (String, String) {
    let own_id = issuer
        .employee_id
        .clone()
        .unwrap_or_else(|| issuer.id.to_hex());
    if issuer.role.is_privileged() {
        let employee_id = payload.employee_id.take().unwrap_or(own_id);
        let employee_name = payload
            .employee_name
            .take()
            .unwrap_or_else(|| issuer.name.clone());
        (employee_id, employee_name)
    } else {
        (own_id, issuer.name.clone())
    }
}

#[get("/employee-leaves")]
pub async fn get_employee_leaves(
    query: web::Query<EmployeeLeaveQuery>,
    page_query: web::Query<PageQuery>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    let (leaves, pagination) = EmployeeLeave::find_many(&query, &page_query, &AccessScope::of(&issuer)).await?;
    Ok(page("Leaves retrieved", leaves, pagination))
}

#[post("/employee-leaves")]
pub async fn create_employee_leave(
    payload: web::Json<EmployeeLeaveRequest>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    let mut payload = payload.into_inner();
    let employee = leave_owner(&mut payload, &issuer);
    let department = AccessScope::of(&issuer).resolve_department(payload.department.take());
    let mut leave = EmployeeLeave::new(payload, employee, department)?;
    leave.save().await?;
    tracing::info!(employee = %leave.employee_id, days = leave.days, "leave requested");
    Ok(created("Leave requested", EmployeeLeaveResponse::from(leave)))
}

#[patch("/employee-leaves/{leave_id}/status")]
pub async fn decide_employee_leave(
    leave_id: web::Path<String>,
    payload: web::Json<LeaveDecisionRequest>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    if !issuer.role.is_privileged() {
        return Err(ApiError::forbidden("FORBIDDEN"));
    }
    let leave_id = parse_id(&leave_id)?;
    let mut leave = EmployeeLeave::find_by_id(&leave_id)
        .await?
        .ok_or_else(|| ApiError::not_found("LEAVE_NOT_FOUND"))?;
    AccessScope::of(&issuer).ensure(leave.department.as_deref(), &[])?;
    leave.decide(payload.status, issuer.actor())?;
    leave.update().await?;
    tracing::info!(leave_id = %leave_id, status = leave.status.as_str(), by = %issuer.id, "leave decided");
    Ok(ok("Leave updated", EmployeeLeaveResponse::from(leave)))
}

#[delete("/employee-leaves/{leave_id}")]
pub async fn delete_employee_leave(leave_id: web::Path<String>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    let leave_id = parse_id(&leave_id)?;
    let leave = EmployeeLeave::find_by_id(&leave_id)
        .await?
        .ok_or_else(|| ApiError::not_found("LEAVE_NOT_FOUND"))?;
    if !leave.can_delete(&AccessScope::of(&issuer)) {
        return Err(ApiError::forbidden("FORBIDDEN"));
    }
    leave.delete().await?;
    Ok(ok("Leave deleted", EmployeeLeaveResponse::from(leave)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{employee_leave::LeaveType, role::UserRole};
    use mongodb::bson::oid::ObjectId;

    fn issuer(role: UserRole) -> UserAuthenticationData {
        UserAuthenticationData {
            id: ObjectId::new(),
            name: "Lee".to_string(),
            email: "lee@example.com".to_string(),
            role,
            department: Some("Ops".to_string()),
            employee_id: Some("EMP-7".to_string()),
            token: String::new(),
        }
    }

    fn request() -> EmployeeLeaveRequest {
        EmployeeLeaveRequest {
            employee_id: Some("EMP-99".to_string()),
            employee_name: Some("Someone Else".to_string()),
            department: None,
            leave_type: LeaveType::Annual,
            start_date: "2024-03-01".to_string(),
            end_date: "2024-03-02".to_string(),
            reason: None,
        }
    }

    #[test]
    fn normal_users_file_for_themselves() {
        let owner = leave_owner(&mut request(), &issuer(UserRole::NormalUser));
        assert_eq!(owner, ("EMP-7".to_string(), "Lee".to_string()));
    }

    #[test]
    fn managers_file_for_the_named_employee() {
        let owner = leave_owner(&mut request(), &issuer(UserRole::Manager));
        assert_eq!(owner, ("EMP-99".to_string(), "Someone Else".to_string()));
    }
}
