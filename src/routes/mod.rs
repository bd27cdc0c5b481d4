use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::Value;

use crate::{backend::BackendClient, error::ApiError, models::user::current_user};

pub mod asset;
pub mod asset_activity_log;
pub mod banner_message;
pub mod calendar;
pub mod chat;
pub mod daily_activity;
pub mod employee;
pub mod employee_leave;
pub mod feedback;
pub mod health;
pub mod holiday;
pub mod maintenance;
pub mod meeting_minutes;
pub mod notice_board;
pub mod performance;
pub mod safety_inspection;
pub mod shift_detail;
pub mod stock_transaction;
pub mod ticket;
pub mod user;

/// Relays the request to the backend service with the caller's identity and
/// returns the backend's status and body unchanged.
pub async fn forward(
    client: &BackendClient,
    method: reqwest::Method,
    path: &str,
    req: &HttpRequest,
    body: Option<&Value>,
) -> Result<HttpResponse, ApiError> {
    let user = current_user(req)?;
    let reply = client
        .send(method, path, req.query_string(), body, &user)
        .await?;
    Ok(reply.into_response())
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .service(health::get_health)
            .service(user::login)
            .service(user::get_me)
            .service(user::get_users)
            .service(user::create_user)
            .service(user::get_user)
            .service(asset::bulk_import_assets)
            .service(asset::bulk_import_assets_file)
            .service(asset::get_assets)
            .service(asset::create_asset)
            .service(asset::get_asset)
            .service(asset::update_asset)
            .service(asset::delete_asset)
            .service(asset_activity_log::get_asset_activity_logs)
            .service(asset_activity_log::create_asset_activity_log)
            .service(asset_activity_log::get_asset_activity_log)
            .service(asset_activity_log::edit_asset_activity_log)
            .service(asset_activity_log::verify_asset_activity_log)
            .service(maintenance::get_schedules)
            .service(maintenance::create_schedule)
            .service(maintenance::get_schedule)
            .service(maintenance::update_schedule)
            .service(maintenance::delete_schedule)
            .service(maintenance::get_records)
            .service(maintenance::create_record)
            .service(maintenance::get_record)
            .service(safety_inspection::get_schedules)
            .service(safety_inspection::create_schedule)
            .service(safety_inspection::get_schedule)
            .service(safety_inspection::update_schedule)
            .service(safety_inspection::delete_schedule)
            .service(safety_inspection::get_records)
            .service(safety_inspection::create_record)
            .service(safety_inspection::get_record)
            .service(ticket::get_tickets)
            .service(ticket::create_ticket)
            .service(ticket::get_ticket)
            .service(ticket::update_ticket)
            .service(ticket::delete_ticket)
            .service(ticket::add_ticket_comment)
            .service(ticket::change_ticket_status)
            .service(daily_activity::get_daily_activities)
            .service(daily_activity::create_daily_activity)
            .service(daily_activity::get_daily_activity)
            .service(daily_activity::update_daily_activity)
            .service(daily_activity::delete_daily_activity)
            .service(employee::get_employees)
            .service(employee::create_employee)
            .service(employee::get_employee_details)
            .service(employee::get_employee)
            .service(employee::update_employee)
            .service(employee::delete_employee)
            .service(employee_leave::get_employee_leaves)
            .service(employee_leave::create_employee_leave)
            .service(employee_leave::decide_employee_leave)
            .service(employee_leave::delete_employee_leave)
            .service(shift_detail::get_shift_details)
            .service(shift_detail::create_shift_detail)
            .service(shift_detail::get_shift_detail)
            .service(shift_detail::update_shift_detail)
            .service(shift_detail::delete_shift_detail)
            .service(performance::get_performance_summary)
            .service(performance::get_performances)
            .service(performance::create_performance)
            .service(holiday::get_holidays)
            .service(holiday::create_holiday)
            .service(holiday::update_holiday)
            .service(holiday::delete_holiday)
            .service(calendar::get_calendar_events)
            .service(calendar::get_calendar_reports)
            .service(chat::get_chat_rooms)
            .service(chat::get_chat_messages)
            .service(chat::create_chat_message)
            .service(chat::read_chat_message)
            .service(chat::delete_chat_message)
            .service(notice_board::get_notices)
            .service(notice_board::create_notice)
            .service(notice_board::get_notice)
            .service(notice_board::update_notice)
            .service(notice_board::delete_notice)
            .service(notice_board::toggle_notice_publish)
            .service(notice_board::read_notice)
            .service(banner_message::get_active_banner_messages)
            .service(banner_message::get_banner_messages)
            .service(banner_message::create_banner_message)
            .service(banner_message::update_banner_message)
            .service(banner_message::delete_banner_message)
            .service(feedback::create_feedback)
            .service(feedback::get_feedback)
            .service(feedback::review_feedback)
            .service(meeting_minutes::get_meeting_minutes)
            .service(meeting_minutes::create_meeting_minutes)
            .service(meeting_minutes::get_meeting_minutes_by_id)
            .service(meeting_minutes::update_meeting_minutes)
            .service(meeting_minutes::delete_meeting_minutes)
            .service(meeting_minutes::approve_meeting_minutes)
            .service(meeting_minutes::update_action_item)
            .service(stock_transaction::get_stock_summary)
            .service(stock_transaction::get_stock_transactions)
            .service(stock_transaction::create_stock_transaction)
            .service(stock_transaction::get_stock_transaction)
            .service(stock_transaction::cancel_stock_transaction),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::StatusCode, test, App};

    #[actix_web::test]
    async fn protected_routes_reject_anonymous_callers() {
        let app = test::init_service(App::new().configure(configure)).await;

        for uri in ["/api/auth/me", "/api/tickets", "/api/chat/rooms"] {
            let res = test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
            assert_eq!(res.status(), StatusCode::UNAUTHORIZED, "{uri}");
        }
    }
}
