use actix_web::{delete, get, patch, post, put, web, HttpRequest, HttpResponse};

use crate::{
    error::ApiError,
    models::{
        meeting_minutes::{
            ActionItemResponse, ActionItemStatusRequest, MeetingMinutes, MeetingMinutesQuery,
            MeetingMinutesRequest, MeetingMinutesResponse,
        },
        role::AccessScope,
        user::current_user,
    },
    response::{created, ok, page, PageQuery},
    utils::parse_id,
};

async fn find_visible(minutes_id: &str, scope: &AccessScope) -> Result<MeetingMinutes, ApiError> {
    let minutes_id = parse_id(minutes_id)?;
    let minutes = MeetingMinutes::find_by_id(&minutes_id)
        .await?
        .ok_or_else(|| ApiError::not_found("MINUTES_NOT_FOUND"))?;
    if !minutes.is_visible_to(scope) {
        return Err(ApiError::not_found("MINUTES_NOT_FOUND"));
    }
    Ok(minutes)
}

async fn find_editable(minutes_id: &str, scope: &AccessScope) -> Result<MeetingMinutes, ApiError> {
    let minutes = find_visible(minutes_id, scope).await?;
    if !minutes.can_edit(scope) {
        return Err(ApiError::forbidden("FORBIDDEN"));
    }
    Ok(minutes)
}

#[get("/meeting-minutes")]
pub async fn get_meeting_minutes(
    query: web::Query<MeetingMinutesQuery>,
    page_query: web::Query<PageQuery>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    let (minutes, pagination) = MeetingMinutes::find_many(&query, &page_query, &AccessScope::of(&issuer)).await?;
    Ok(page("Meeting minutes retrieved", minutes, pagination))
}

#[post("/meeting-minutes")]
pub async fn create_meeting_minutes(
    payload: web::Json<MeetingMinutesRequest>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    let mut payload = payload.into_inner();
    let department = AccessScope::of(&issuer).resolve_department(payload.department.take());
    let mut minutes = MeetingMinutes::new(payload, issuer.actor(), department)?;
    minutes.save().await?;
    Ok(created("Meeting minutes created", MeetingMinutesResponse::from(minutes)))
}

#[get("/meeting-minutes/{minutes_id}")]
pub async fn get_meeting_minutes_by_id(
    minutes_id: web::Path<String>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    let minutes = find_visible(&minutes_id, &AccessScope::of(&issuer)).await?;
    Ok(ok("Meeting minutes retrieved", MeetingMinutesResponse::from(minutes)))
}

#[put("/meeting-minutes/{minutes_id}")]
pub async fn update_meeting_minutes(
    minutes_id: web::Path<String>,
    payload: web::Json<MeetingMinutesRequest>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    let scope = AccessScope::of(&issuer);
    let mut minutes = find_editable(&minutes_id, &scope).await?;
    let mut payload = payload.into_inner();
    let department = payload
        .department
        .take()
        .and_then(|department| scope.resolve_department(Some(department)));
    minutes.apply(payload, department)?;
    minutes.update().await?;
    Ok(ok("Meeting minutes updated", MeetingMinutesResponse::from(minutes)))
}

#[delete("/meeting-minutes/{minutes_id}")]
pub async fn delete_meeting_minutes(
    minutes_id: web::Path<String>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    let minutes = find_editable(&minutes_id, &AccessScope::of(&issuer)).await?;
    minutes.delete().await?;
    Ok(ok("Meeting minutes deleted", MeetingMinutesResponse::from(minutes)))
}

#[post("/meeting-minutes/{minutes_id}/approve")]
pub async fn approve_meeting_minutes(
    minutes_id: web::Path<String>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    if !issuer.role.is_privileged() {
        return Err(ApiError::forbidden("FORBIDDEN"));
    }
    let mut minutes = find_visible(&minutes_id, &AccessScope::of(&issuer)).await?;
    minutes.approve(issuer.actor())?;
    minutes.update().await?;
    tracing::info!(minutes_id = %minutes_id, by = %issuer.id, "meeting minutes approved");
    Ok(ok("Meeting minutes approved", MeetingMinutesResponse::from(minutes)))
}

/// Editors and the item's assignee may move an action item.
#[patch("/meeting-minutes/{minutes_id}/action-items/{item_id}")]
pub async fn update_action_item(
    path: web::Path<(String, String)>,
    payload: web::Json<ActionItemStatusRequest>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    let scope = AccessScope::of(&issuer);
    let (minutes_id, item_id) = path.into_inner();
    let mut minutes = find_visible(&minutes_id, &scope).await?;

    let is_assignee = minutes.action_items.iter().any(|item| {
        item.id == item_id
            && item
                .assigned_to
                .as_deref()
                .map(|assignee| assignee.eq_ignore_ascii_case(&issuer.name))
                .unwrap_or(false)
    });
    if !minutes.can_edit(&scope) && !is_assignee {
        return Err(ApiError::forbidden("FORBIDDEN"));
    }

    let item = ActionItemResponse::from(minutes.set_action_item_status(&item_id, payload.status)?.clone());
    minutes.update().await?;
    Ok(ok("Action item updated", item))
}
