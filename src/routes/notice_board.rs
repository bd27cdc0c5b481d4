use actix_web::{delete, get, patch, post, put, web, HttpRequest, HttpResponse};
use chrono::Utc;

use crate::{
    error::ApiError,
    models::{
        notice_board::{Notice, NoticeQuery, NoticeRequest, NoticeResponse},
        role::AccessScope,
        user::current_user,
    },
    response::{created, ok, page, PageQuery},
    utils::parse_id,
};

async fn find_notice(notice_id: &str) -> Result<Notice, ApiError> {
    let notice_id = parse_id(notice_id)?;
    Notice::find_by_id(&notice_id)
        .await?
        .ok_or_else(|| ApiError::not_found("NOTICE_NOT_FOUND"))
}

async fn find_managed(notice_id: &str, scope: &AccessScope) -> Result<Notice, ApiError> {
    let notice = find_notice(notice_id).await?;
    if !notice.can_manage(scope) {
        return Err(ApiError::forbidden("FORBIDDEN"));
    }
    Ok(notice)
}

#[get("/notices")]
pub async fn get_notices(
    query: web::Query<NoticeQuery>,
    page_query: web::Query<PageQuery>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    let (notices, pagination) = Notice::find_many(&query, &page_query, &AccessScope::of(&issuer)).await?;
    Ok(page("Notices retrieved", notices, pagination))
}

#[post("/notices")]
pub async fn create_notice(payload: web::Json<NoticeRequest>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    if !issuer.role.is_privileged() {
        return Err(ApiError::forbidden("FORBIDDEN"));
    }
    let scope = AccessScope::of(&issuer);
    let mut payload = payload.into_inner();
    let department = scope.resolve_department(payload.department.take());
    let mut notice = Notice::new(payload, issuer.actor(), department)?;
    notice.save().await?;
    Ok(created("Notice created", NoticeResponse::of(notice, &scope.user_id)))
}

#[get("/notices/{notice_id}")]
pub async fn get_notice(notice_id: web::Path<String>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    let scope = AccessScope::of(&issuer);
    let notice = find_notice(&notice_id).await?;
    if !notice.is_visible_to(&scope, Utc::now()) {
        return Err(ApiError::not_found("NOTICE_NOT_FOUND"));
    }
    Ok(ok("Notice retrieved", NoticeResponse::of(notice, &scope.user_id)))
}

#[put("/notices/{notice_id}")]
pub async fn update_notice(
    notice_id: web::Path<String>,
    payload: web::Json<NoticeRequest>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    let scope = AccessScope::of(&issuer);
    let mut notice = find_managed(&notice_id, &scope).await?;
    let mut payload = payload.into_inner();
    let department = payload
        .department
        .take()
        .and_then(|department| scope.resolve_department(Some(department)));
    notice.apply(payload, department)?;
    notice.update().await?;
    Ok(ok("Notice updated", NoticeResponse::of(notice, &scope.user_id)))
}

#[delete("/notices/{notice_id}")]
pub async fn delete_notice(notice_id: web::Path<String>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    let scope = AccessScope::of(&issuer);
    let notice = find_managed(&notice_id, &scope).await?;
    notice.delete().await?;
    Ok(ok("Notice deleted", NoticeResponse::of(notice, &scope.user_id)))
}

#[patch("/notices/{notice_id}/publish")]
pub async fn toggle_notice_publish(notice_id: web::Path<String>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    let scope = AccessScope::of(&issuer);
    let mut notice = find_managed(&notice_id, &scope).await?;
    notice.toggle_publish();
    notice.update().await?;
    let message = if notice.is_published {
        "Notice published"
    } else {
        "Notice unpublished"
    };
    Ok(ok(message, NoticeResponse::of(notice, &scope.user_id)))
}

#[post("/notices/{notice_id}/read")]
pub async fn read_notice(notice_id: web::Path<String>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    let scope = AccessScope::of(&issuer);
    let mut notice = find_notice(&notice_id).await?;
    if !notice.is_visible_to(&scope, Utc::now()) {
        return Err(ApiError::not_found("NOTICE_NOT_FOUND"));
    }
    if notice.mark_read(&scope.user_id) {
        notice.add_reader(&scope.user_id).await?;
    }
    Ok(ok("Notice marked as read", NoticeResponse::of(notice, &scope.user_id)))
}
