use actix_web::{delete, get, post, put, web, HttpRequest, HttpResponse};

use crate::{
    error::ApiError,
    models::{
        role::AccessScope,
        shift_detail::{ShiftDetail, ShiftDetailQuery, ShiftDetailRequest, ShiftDetailResponse},
        user::current_user,
    },
    response::{created, ok, page, PageQuery},
    utils::parse_id,
};

async fn find_in_scope(shift_id: &str, scope: &AccessScope) -> Result<ShiftDetail, ApiError> {
    let shift_id = parse_id(shift_id)?;
    let shift = ShiftDetail::find_by_id(&shift_id)
        .await?
        .ok_or_else(|| ApiError::not_found("SHIFT_NOT_FOUND"))?;
    scope.ensure(shift.department.as_deref(), &[Some(shift.employee_id.as_str())])?;
    Ok(shift)
}

#[get("/shift-details")]
pub async fn get_shift_details(
    query: web::Query<ShiftDetailQuery>,
    page_query: web::Query<PageQuery>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    let (shifts, pagination) = ShiftDetail::find_many(&query, &page_query, &AccessScope::of(&issuer)).await?;
    Ok(page("Shift details retrieved", shifts, pagination))
}

#[post("/shift-details")]
pub async fn create_shift_detail(
    payload: web::Json<ShiftDetailRequest>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    if !issuer.role.is_privileged() {
        return Err(ApiError::forbidden("FORBIDDEN"));
    }
    let mut payload = payload.into_inner();
    let department = AccessScope::of(&issuer).resolve_department(payload.department.take());
    let mut shift = ShiftDetail::new(payload, department)?;
    shift.save().await?;
    Ok(created("Shift detail created", ShiftDetailResponse::from(shift)))
}

#[get("/shift-details/{shift_id}")]
pub async fn get_shift_detail(shift_id: web::Path<String>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    let shift = find_in_scope(&shift_id, &AccessScope::of(&issuer)).await?;
    Ok(ok("Shift detail retrieved", ShiftDetailResponse::from(shift)))
}

#[put("/shift-details/{shift_id}")]
pub async fn update_shift_detail(
    shift_id: web::Path<String>,
    payload: web::Json<ShiftDetailRequest>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    if !issuer.role.is_privileged() {
        return Err(ApiError::forbidden("FORBIDDEN"));
    }
    let scope = AccessScope::of(&issuer);
    let mut shift = find_in_scope(&shift_id, &scope).await?;
    let mut payload = payload.into_inner();
    let department = payload
        .department
        .take()
        .and_then(|department| scope.resolve_department(Some(department)));
    shift.apply(payload, department)?;
    shift.update().await?;
    Ok(ok("Shift detail updated", ShiftDetailResponse::from(shift)))
}

#[delete("/shift-details/{shift_id}")]
pub async fn delete_shift_detail(shift_id: web::Path<String>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    if !issuer.role.is_privileged() {
        return Err(ApiError::forbidden("FORBIDDEN"));
    }
    let shift = find_in_scope(&shift_id, &AccessScope::of(&issuer)).await?;
    shift.delete().await?;
    Ok(ok("Shift detail deleted", ShiftDetailResponse::from(shift)))
}
