use actix_web::{delete, get, post, put, web, HttpRequest, HttpResponse};
use reqwest::Method;
use serde_json::Value;

use crate::{backend::BackendClient, error::ApiError, models::safety_inspection::BACKEND_PATH};

use super::forward;

#[get("/safety-inspection/schedules")]
pub async fn get_schedules(client: web::Data<BackendClient>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    forward(&client, Method::GET, &format!("{BACKEND_PATH}/schedules"), &req, None).await
}

#[post("/safety-inspection/schedules")]
pub async fn create_schedule(
    client: web::Data<BackendClient>,
    payload: web::Json<Value>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    forward(&client, Method::POST, &format!("{BACKEND_PATH}/schedules"), &req, Some(&payload.0)).await
}

#[get("/safety-inspection/schedules/{schedule_id}")]
pub async fn get_schedule(
    client: web::Data<BackendClient>,
    schedule_id: web::Path<String>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let path = format!("{BACKEND_PATH}/schedules/{schedule_id}");
    forward(&client, Method::GET, &path, &req, None).await
}

#[put("/safety-inspection/schedules/{schedule_id}")]
pub async fn update_schedule(
    client: web::Data<BackendClient>,
    schedule_id: web::Path<String>,
    payload: web::Json<Value>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let path = format!("{BACKEND_PATH}/schedules/{schedule_id}");
    forward(&client, Method::PUT, &path, &req, Some(&payload.0)).await
}

#[delete("/safety-inspection/schedules/{schedule_id}")]
pub async fn delete_schedule(
    client: web::Data<BackendClient>,
    schedule_id: web::Path<String>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let path = format!("{BACKEND_PATH}/schedules/{schedule_id}");
    forward(&client, Method::DELETE, &path, &req, None).await
}

#[get("/safety-inspection/records")]
pub async fn get_records(client: web::Data<BackendClient>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    forward(&client, Method::GET, &format!("{BACKEND_PATH}/records"), &req, None).await
}

#[post("/safety-inspection/records")]
pub async fn create_record(
    client: web::Data<BackendClient>,
    payload: web::Json<Value>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    forward(&client, Method::POST, &format!("{BACKEND_PATH}/records"), &req, Some(&payload.0)).await
}

#[get("/safety-inspection/records/{record_id}")]
pub async fn get_record(
    client: web::Data<BackendClient>,
    record_id: web::Path<String>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let path = format!("{BACKEND_PATH}/records/{record_id}");
    forward(&client, Method::GET, &path, &req, None).await
}
