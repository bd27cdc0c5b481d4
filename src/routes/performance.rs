use actix_web::{get, post, web, HttpRequest, HttpResponse};

use crate::{
    error::ApiError,
    models::{
        performance::{Performance, PerformanceQuery, PerformanceRequest, PerformanceResponse, PerformanceSummary},
        role::AccessScope,
        user::current_user,
    },
    response::{created, ok, page, PageQuery},
};

#[get("/performance")]
pub async fn get_performances(
    query: web::Query<PerformanceQuery>,
    page_query: web::Query<PageQuery>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    let (records, pagination) = Performance::find_many(&query, &page_query, &AccessScope::of(&issuer)).await?;
    Ok(page("Performance records retrieved", records, pagination))
}

#[post("/performance")]
pub async fn create_performance(
    payload: web::Json<PerformanceRequest>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    if !issuer.role.is_privileged() {
        return Err(ApiError::forbidden("FORBIDDEN"));
    }
    let mut payload = payload.into_inner();
    let department = AccessScope::of(&issuer).resolve_department(payload.department.take());
    let mut record = Performance::new(payload, department)?;
    record.save().await?;
    Ok(created("Performance record created", PerformanceResponse::from(record)))
}

/// Totals over every record the caller can see, optionally narrowed to one employee.
#[get("/performance/summary")]
pub async fn get_performance_summary(
    query: web::Query<PerformanceQuery>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    let records = Performance::find_all(query.filter(&AccessScope::of(&issuer))).await?;
    Ok(ok("Performance summary retrieved", PerformanceSummary::from_records(&records)))
}
