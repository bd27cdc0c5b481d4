use actix_web::{get, HttpResponse};
use serde::Serialize;

use crate::{database, response::ok};

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub database: bool,
}

#[get("/health")]
pub async fn get_health() -> HttpResponse {
    let database = database::ping().await;
    if !database {
        tracing::warn!("health check could not reach the database");
    }
    ok(
        "Service is running",
        HealthStatus {
            status: "ok",
            database,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{body::to_bytes, http::StatusCode, test, App};
    use serde_json::Value;

    #[actix_web::test]
    async fn health_reports_ok_without_database() {
        let app = test::init_service(App::new().service(get_health)).await;
        let res = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);

        let body: Value = serde_json::from_slice(&to_bytes(res.into_body()).await.unwrap()).unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["status"], "ok");
        assert_eq!(body["data"]["database"], false);
    }
}
