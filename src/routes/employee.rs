use actix_web::{delete, get, post, put, web, HttpRequest, HttpResponse};

use crate::{
    error::ApiError,
    models::{
        employee::{Employee, EmployeeQuery, EmployeeRequest, EmployeeResponse},
        role::AccessScope,
        user::current_user,
    },
    response::{created, ok, page, PageQuery},
    utils::parse_id,
};

async fn find_in_scope(employee_id: &str, scope: &AccessScope) -> Result<Employee, ApiError> {
    let employee_id = parse_id(employee_id)?;
    let employee = Employee::find_by_id(&employee_id)
        .await?
        .ok_or_else(|| ApiError::not_found("EMPLOYEE_NOT_FOUND"))?;
    scope.ensure(employee.department.as_deref(), &[Some(employee.employee_id.as_str())])?;
    Ok(employee)
}

#[get("/employees")]
pub async fn get_employees(
    query: web::Query<EmployeeQuery>,
    page_query: web::Query<PageQuery>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    let (employees, pagination) = Employee::find_many(&query, &page_query, &AccessScope::of(&issuer)).await?;
    Ok(page("Employees retrieved", employees, pagination))
}

#[post("/employees")]
pub async fn create_employee(payload: web::Json<EmployeeRequest>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    if !issuer.role.is_privileged() {
        return Err(ApiError::forbidden("FORBIDDEN"));
    }
    let mut payload = payload.into_inner();
    let department = AccessScope::of(&issuer).resolve_department(payload.department.take());
    let mut employee = Employee::new(payload, department)?;
    employee.ensure_unique().await?;
    employee.save().await?;
    tracing::info!(employee = %employee.employee_id, by = %issuer.id, "employee created");
    Ok(created("Employee created", EmployeeResponse::from(employee)))
}

#[get("/employees/{employee_id}")]
pub async fn get_employee(employee_id: web::Path<String>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    let employee = find_in_scope(&employee_id, &AccessScope::of(&issuer)).await?;
    Ok(ok("Employee retrieved", EmployeeResponse::from(employee)))
}

#[get("/employees/{employee_id}/details")]
pub async fn get_employee_details(employee_id: web::Path<String>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    let employee = find_in_scope(&employee_id, &AccessScope::of(&issuer)).await?;
    Ok(ok("Employee details retrieved", employee.details().await))
}

#[put("/employees/{employee_id}")]
pub async fn update_employee(
    employee_id: web::Path<String>,
    payload: web::Json<EmployeeRequest>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    if !issuer.role.is_privileged() {
        return Err(ApiError::forbidden("FORBIDDEN"));
    }
    let scope = AccessScope::of(&issuer);
    let mut employee = find_in_scope(&employee_id, &scope).await?;
    let mut payload = payload.into_inner();
    let department = payload
        .department
        .take()
        .and_then(|department| scope.resolve_department(Some(department)));
    employee.apply(payload, department)?;
    employee.ensure_unique().await?;
    employee.update().await?;
    Ok(ok("Employee updated", EmployeeResponse::from(employee)))
}

#[delete("/employees/{employee_id}")]
pub async fn delete_employee(employee_id: web::Path<String>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    if !issuer.role.is_admin() {
        return Err(ApiError::forbidden("FORBIDDEN"));
    }
    let employee = find_in_scope(&employee_id, &AccessScope::of(&issuer)).await?;
    employee.delete().await?;
    tracing::info!(employee = %employee.employee_id, by = %issuer.id, "employee deleted");
    Ok(ok("Employee deleted", EmployeeResponse::from(employee)))
}
