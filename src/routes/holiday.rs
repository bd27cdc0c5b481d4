use actix_web::{delete, get, post, put, web, HttpRequest, HttpResponse};

use crate::{
    error::ApiError,
    models::{
        holiday::{Holiday, HolidayQuery, HolidayRequest, HolidayResponse},
        role::AccessScope,
        user::{current_user, UserAuthenticationData},
    },
    response::{created, ok, page, PageQuery},
    utils::parse_id,
};

/// Admins manage their own department's holidays; company-wide ones belong to super admins.
fn admin_scope(issuer: &UserAuthenticationData) -> Result<AccessScope, ApiError> {
    if !issuer.role.is_admin() {
        return Err(ApiError::forbidden("FORBIDDEN"));
    }
    Ok(AccessScope::of(issuer))
}

fn pin_department(payload: &mut HolidayRequest, scope: &AccessScope) {
    if !scope.is_unrestricted() {
        payload.department = scope.department.clone();
    }
}

async fn find_managed(holiday_id: &str, scope: &AccessScope) -> Result<Holiday, ApiError> {
    let holiday_id = parse_id(holiday_id)?;
    let holiday = Holiday::find_by_id(&holiday_id)
        .await?
        .ok_or_else(|| ApiError::not_found("HOLIDAY_NOT_FOUND"))?;
    scope.ensure(holiday.department.as_deref(), &[])?;
    Ok(holiday)
}

#[get("/holidays")]
pub async fn get_holidays(
    query: web::Query<HolidayQuery>,
    page_query: web::Query<PageQuery>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    let (holidays, pagination) = Holiday::find_many(&query, &page_query, &AccessScope::of(&issuer)).await?;
    Ok(page("Holidays retrieved", holidays, pagination))
}

#[post("/holidays")]
pub async fn create_holiday(payload: web::Json<HolidayRequest>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    let scope = admin_scope(&issuer)?;
    let mut payload = payload.into_inner();
    pin_department(&mut payload, &scope);
    let mut holiday = Holiday::new(payload)?;
    holiday.save().await?;
    Ok(created("Holiday created", HolidayResponse::from(holiday)))
}

#[put("/holidays/{holiday_id}")]
pub async fn update_holiday(
    holiday_id: web::Path<String>,
    payload: web::Json<HolidayRequest>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    let scope = admin_scope(&issuer)?;
    let mut holiday = find_managed(&holiday_id, &scope).await?;
    let mut payload = payload.into_inner();
    pin_department(&mut payload, &scope);
    holiday.apply(payload)?;
    holiday.update().await?;
    Ok(ok("Holiday updated", HolidayResponse::from(holiday)))
}

#[delete("/holidays/{holiday_id}")]
pub async fn delete_holiday(holiday_id: web::Path<String>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    let scope = admin_scope(&issuer)?;
    let holiday = find_managed(&holiday_id, &scope).await?;
    holiday.delete().await?;
    Ok(ok("Holiday deleted", HolidayResponse::from(holiday)))
}
