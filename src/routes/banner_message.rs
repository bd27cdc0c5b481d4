use actix_web::{delete, get, post, put, web, HttpRequest, HttpResponse};

use crate::{
    error::ApiError,
    models::{
        banner_message::{BannerMessage, BannerMessageRequest, BannerMessageResponse},
        user::{current_user, UserAuthentication},
    },
    response::{created, ok, page, PageQuery},
    utils::parse_id,
};

fn require_admin(req: &HttpRequest) -> Result<UserAuthentication, ApiError> {
    let issuer = current_user(req)?;
    if !issuer.role.is_admin() {
        return Err(ApiError::forbidden("FORBIDDEN"));
    }
    Ok(issuer)
}

async fn find_banner(banner_id: &str) -> Result<BannerMessage, ApiError> {
    let banner_id = parse_id(banner_id)?;
    BannerMessage::find_by_id(&banner_id)
        .await?
        .ok_or_else(|| ApiError::not_found("BANNER_NOT_FOUND"))
}

#[get("/banner-messages/active")]
pub async fn get_active_banner_messages(req: HttpRequest) -> Result<HttpResponse, ApiError> {
    current_user(&req)?;
    let banners = BannerMessage::find_active().await?;
    Ok(ok("Active banners retrieved", banners))
}

#[get("/banner-messages")]
pub async fn get_banner_messages(page_query: web::Query<PageQuery>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    require_admin(&req)?;
    let (banners, pagination) = BannerMessage::find_many(&page_query).await?;
    Ok(page("Banners retrieved", banners, pagination))
}

#[post("/banner-messages")]
pub async fn create_banner_message(
    payload: web::Json<BannerMessageRequest>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let issuer = require_admin(&req)?;
    let mut banner = BannerMessage::new(payload.into_inner(), issuer.actor())?;
    banner.save().await?;
    Ok(created("Banner created", BannerMessageResponse::from(banner)))
}

#[put("/banner-messages/{banner_id}")]
pub async fn update_banner_message(
    banner_id: web::Path<String>,
    payload: web::Json<BannerMessageRequest>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    require_admin(&req)?;
    let mut banner = find_banner(&banner_id).await?;
    banner.apply(payload.into_inner())?;
    banner.update().await?;
    Ok(ok("Banner updated", BannerMessageResponse::from(banner)))
}

#[delete("/banner-messages/{banner_id}")]
pub async fn delete_banner_message(banner_id: web::Path<String>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    require_admin(&req)?;
    let banner = find_banner(&banner_id).await?;
    banner.delete().await?;
    Ok(ok("Banner deleted", BannerMessageResponse::from(banner)))
}
