use actix_web::{delete, get, post, put, web, HttpRequest, HttpResponse};

use crate::{
    error::ApiError,
    models::{
        daily_activity::{DailyActivity, DailyActivityQuery, DailyActivityRequest, DailyActivityResponse},
        role::AccessScope,
        user::current_user,
    },
    response::{created, ok, page, PageQuery},
    utils::parse_id,
};

async fn find_in_scope(activity_id: &str, scope: &AccessScope) -> Result<DailyActivity, ApiError> {
    let activity_id = parse_id(activity_id)?;
    let activity = DailyActivity::find_by_id(&activity_id)
        .await?
        .ok_or_else(|| ApiError::not_found("ACTIVITY_NOT_FOUND"))?;
    scope.ensure(activity.department.as_deref(), &activity.owners())?;
    Ok(activity)
}

#[get("/daily-activities")]
pub async fn get_daily_activities(
    query: web::Query<DailyActivityQuery>,
    page_query: web::Query<PageQuery>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    let (activities, pagination) =
        DailyActivity::find_many(&query, &page_query, &AccessScope::of(&issuer)).await?;
    Ok(page("Daily activities retrieved", activities, pagination))
}

#[post("/daily-activities")]
pub async fn create_daily_activity(
    payload: web::Json<DailyActivityRequest>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    let mut payload = payload.into_inner();
    let department = AccessScope::of(&issuer).resolve_department(payload.department.take());
    let mut activity = DailyActivity::new(payload, issuer.actor(), department)?;
    activity.save().await?;

    if let Some(entry) = activity.activity_entry() {
        entry.record_detached();
    }
    Ok(created("Daily activity created", DailyActivityResponse::from(activity)))
}

#[get("/daily-activities/{activity_id}")]
pub async fn get_daily_activity(activity_id: web::Path<String>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    let activity = find_in_scope(&activity_id, &AccessScope::of(&issuer)).await?;
    Ok(ok("Daily activity retrieved", DailyActivityResponse::from(activity)))
}

#[put("/daily-activities/{activity_id}")]
pub async fn update_daily_activity(
    activity_id: web::Path<String>,
    payload: web::Json<DailyActivityRequest>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    let scope = AccessScope::of(&issuer);
    let mut activity = find_in_scope(&activity_id, &scope).await?;
    let mut payload = payload.into_inner();
    let department = payload
        .department
        .take()
        .and_then(|department| scope.resolve_department(Some(department)));
    activity.apply(payload, department)?;
    activity.update().await?;
    Ok(ok("Daily activity updated", DailyActivityResponse::from(activity)))
}

#[delete("/daily-activities/{activity_id}")]
pub async fn delete_daily_activity(
    activity_id: web::Path<String>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    let activity = find_in_scope(&activity_id, &AccessScope::of(&issuer)).await?;
    if !issuer.role.is_privileged() && activity.created_by.id != issuer.id.to_hex() {
        return Err(ApiError::forbidden("FORBIDDEN"));
    }
    activity.delete().await?;
    Ok(ok("Daily activity deleted", DailyActivityResponse::from(activity)))
}
