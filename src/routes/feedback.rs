use actix_web::{get, patch, post, web, HttpRequest, HttpResponse};

use crate::{
    error::ApiError,
    models::{
        feedback::{Feedback, FeedbackQuery, FeedbackRequest, FeedbackResponse, FeedbackReviewRequest},
        role::AccessScope,
        user::current_user,
    },
    response::{created, ok, page, PageQuery},
    utils::parse_id,
};

#[post("/feedback")]
pub async fn create_feedback(payload: web::Json<FeedbackRequest>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    let mut feedback = Feedback::new(payload.into_inner(), issuer.actor(), issuer.department.clone())?;
    feedback.save().await?;
    Ok(created("Thank you for your feedback", FeedbackResponse::from(feedback)))
}

#[get("/feedback")]
pub async fn get_feedback(
    query: web::Query<FeedbackQuery>,
    page_query: web::Query<PageQuery>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    if !issuer.role.is_admin() {
        return Err(ApiError::forbidden("FORBIDDEN"));
    }
    let (feedback, pagination) = Feedback::find_many(&query, &page_query, &AccessScope::of(&issuer)).await?;
    Ok(page("Feedback retrieved", feedback, pagination))
}

#[patch("/feedback/{feedback_id}")]
pub async fn review_feedback(
    feedback_id: web::Path<String>,
    payload: web::Json<FeedbackReviewRequest>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    if !issuer.role.is_admin() {
        return Err(ApiError::forbidden("FORBIDDEN"));
    }
    let feedback_id = parse_id(&feedback_id)?;
    let mut feedback = Feedback::find_by_id(&feedback_id)
        .await?
        .ok_or_else(|| ApiError::not_found("FEEDBACK_NOT_FOUND"))?;
    let scope = AccessScope::of(&issuer);
    if feedback.department.is_some() {
        scope.ensure(feedback.department.as_deref(), &[])?;
    }
    feedback.review(payload.into_inner(), issuer.actor())?;
    feedback.update().await?;
    Ok(ok("Feedback updated", FeedbackResponse::from(feedback)))
}
