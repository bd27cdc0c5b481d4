use actix_web::{get, web, HttpRequest, HttpResponse};
use chrono::Utc;

use crate::{
    config::Config,
    error::ApiError,
    models::{
        calendar::{aggregate, build_report, CalendarQuery},
        role::AccessScope,
        user::current_user,
    },
    response::ok,
};

#[get("/calendar/events")]
pub async fn get_calendar_events(
    config: web::Data<Config>,
    query: web::Query<CalendarQuery>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    let window = query.window(Utc::now())?;
    let events = aggregate(&window, &AccessScope::of(&issuer), config.calendar_source_limit).await;
    tracing::debug!(
        start = %window.start,
        end = %window.end,
        events = events.events.len(),
        "calendar events aggregated"
    );
    Ok(ok("Calendar events retrieved", events))
}

#[get("/calendar/reports")]
pub async fn get_calendar_reports(
    config: web::Data<Config>,
    query: web::Query<CalendarQuery>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    let window = query.window(Utc::now())?;
    let events = aggregate(&window, &AccessScope::of(&issuer), config.calendar_source_limit).await;
    Ok(ok("Calendar report generated", build_report(events)))
}
