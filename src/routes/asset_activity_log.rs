use actix_web::{get, patch, post, web, HttpRequest, HttpResponse};

use crate::{
    error::ApiError,
    models::{
        asset_activity_log::{
            AssetActivityLog, AssetActivityLogEditRequest, AssetActivityLogQuery, AssetActivityLogRequest,
            AssetActivityLogResponse,
        },
        role::AccessScope,
        user::current_user,
    },
    response::{created, ok, page, PageQuery},
    utils::parse_id,
};

async fn find_in_scope(log_id: &str, scope: &AccessScope) -> Result<AssetActivityLog, ApiError> {
    let log_id = parse_id(log_id)?;
    let log = AssetActivityLog::find_by_id(&log_id)
        .await?
        .ok_or_else(|| ApiError::not_found("ACTIVITY_NOT_FOUND"))?;
    scope.ensure(log.department.as_deref(), &[Some(log.created_by.id.as_str())])?;
    Ok(log)
}

#[get("/asset-activity-logs")]
pub async fn get_asset_activity_logs(
    query: web::Query<AssetActivityLogQuery>,
    page_query: web::Query<PageQuery>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    let (logs, pagination) = AssetActivityLog::find_many(&query, &page_query, &AccessScope::of(&issuer)).await?;
    Ok(page("Activity logs retrieved", logs, pagination))
}

#[post("/asset-activity-logs")]
pub async fn create_asset_activity_log(
    payload: web::Json<AssetActivityLogRequest>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    let mut payload = payload.into_inner();
    let department = AccessScope::of(&issuer).resolve_department(payload.department.take());
    let mut log = AssetActivityLog::new(payload, issuer.actor(), department)?;
    log.save().await?;
    Ok(created("Activity log created", AssetActivityLogResponse::from(log)))
}

#[get("/asset-activity-logs/{log_id}")]
pub async fn get_asset_activity_log(log_id: web::Path<String>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    let log = find_in_scope(&log_id, &AccessScope::of(&issuer)).await?;
    Ok(ok("Activity log retrieved", AssetActivityLogResponse::from(log)))
}

#[patch("/asset-activity-logs/{log_id}")]
pub async fn edit_asset_activity_log(
    log_id: web::Path<String>,
    payload: web::Json<AssetActivityLogEditRequest>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    let mut log = find_in_scope(&log_id, &AccessScope::of(&issuer)).await?;
    if log.apply_edit(payload.into_inner(), issuer.actor()).is_none() {
        return Ok(ok("Nothing to update", AssetActivityLogResponse::from(log)));
    }
    log.update().await?;
    Ok(ok("Activity log updated", AssetActivityLogResponse::from(log)))
}

#[post("/asset-activity-logs/{log_id}/verify")]
pub async fn verify_asset_activity_log(
    log_id: web::Path<String>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    if !issuer.role.is_privileged() {
        return Err(ApiError::forbidden("FORBIDDEN"));
    }
    let mut log = find_in_scope(&log_id, &AccessScope::of(&issuer)).await?;
    log.verify(issuer.actor())?;
    log.update().await?;
    tracing::info!(activity_id = %log_id, verifier = %issuer.id, "activity log verified");
    Ok(ok("Activity log verified", AssetActivityLogResponse::from(log)))
}
