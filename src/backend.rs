//! HTTP forwarding to the backend service that owns assets, maintenance and
//! safety inspection records.

use std::time::Duration;

use actix_web::{http::StatusCode, HttpResponse};
use serde::Serialize;
use serde_json::Value;

use crate::{error::ApiError, models::user::UserAuthenticationData, response::ApiResponse};

#[derive(Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
}

/// Status and JSON body returned by the backend.
#[derive(Debug)]
pub struct BackendReply {
    pub status: StatusCode,
    pub body: Value,
}

impl BackendReply {
    pub fn into_response(self) -> HttpResponse {
        HttpResponse::build(self.status).json(self.body)
    }
}

impl BackendClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn url(&self, path: &str, query: &str) -> String {
        let mut url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        if !query.is_empty() {
            url.push('?');
            url.push_str(query);
        }
        url
    }

    pub async fn send<B: Serialize + ?Sized>(
        &self,
        method: reqwest::Method,
        path: &str,
        query: &str,
        body: Option<&B>,
        user: &UserAuthenticationData,
    ) -> Result<BackendReply, ApiError> {
        let url = self.url(path, query);
        let mut request = self
            .http
            .request(method.clone(), &url)
            .bearer_auth(&user.token)
            .header("x-user-id", user.id.to_hex())
            .header("x-user-name", header_safe(&user.name))
            .header("x-user-email", header_safe(&user.email))
            .header("x-user-role", user.role.as_str());
        if let Some(department) = &user.department {
            request = request.header("x-user-department", header_safe(department));
        }
        if let Some(employee_id) = &user.employee_id {
            request = request.header("x-user-employee-id", header_safe(employee_id));
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        tracing::debug!(%method, %url, "forwarding to backend");
        let response = request.send().await.map_err(|error| {
            if error.is_builder() {
                ApiError::internal("BACKEND_REQUEST_INVALID")
            } else {
                tracing::error!(%url, %error, "backend unreachable");
                ApiError::BackendUnavailable(error)
            }
        })?;

        let status = StatusCode::from_u16(response.status().as_u16())
            .unwrap_or(StatusCode::BAD_GATEWAY);
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ApiError::RateLimited);
        }
        let text = response.text().await.map_err(ApiError::BackendUnavailable)?;
        Ok(BackendReply {
            status,
            body: normalize_body(status, &text),
        })
    }
}

/// Keeps JSON bodies verbatim and wraps anything else in the response envelope.
fn normalize_body(status: StatusCode, text: &str) -> Value {
    match serde_json::from_str::<Value>(text) {
        Ok(value) => value,
        Err(_) => {
            let message = if text.trim().is_empty() {
                status.canonical_reason().unwrap_or("").to_string()
            } else {
                text.trim().to_string()
            };
            let envelope = if status.is_success() {
                ApiResponse::success(message, Value::Null)
            } else {
                ApiResponse::<Value>::error(message)
            };
            serde_json::to_value(envelope).unwrap_or(Value::Null)
        }
    }
}

fn header_safe(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_ascii() && !c.is_ascii_control())
        .collect()
}

/// Reads the created record id out of a backend reply (`data._id`, `data.id` or `_id`).
pub fn extract_id(body: &Value) -> Option<String> {
    let candidates = [
        body.pointer("/data/_id"),
        body.pointer("/data/id"),
        body.pointer("/_id"),
        body.pointer("/id"),
    ];
    candidates.into_iter().flatten().find_map(|value| match value {
        Value::String(id) => Some(id.clone()),
        Value::Object(map) => map.get("$oid").and_then(Value::as_str).map(str::to_string),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn url_joins_path_and_query() {
        let client = BackendClient::new("http://backend:5000/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            client.url("/api/assets", "page=2&limit=5"),
            "http://backend:5000/api/assets?page=2&limit=5"
        );
        assert_eq!(client.url("api/assets/1", ""), "http://backend:5000/api/assets/1");
    }

    #[test]
    fn plain_text_bodies_are_wrapped() {
        let body = normalize_body(StatusCode::NOT_FOUND, "Asset not found");
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Asset not found");

        let body = normalize_body(StatusCode::OK, r#"{"success":true,"data":[]}"#);
        assert_eq!(body, json!({"success": true, "data": []}));
    }

    #[test]
    fn created_id_is_found_in_common_shapes() {
        assert_eq!(
            extract_id(&json!({"data": {"_id": "abc"}})),
            Some("abc".to_string())
        );
        assert_eq!(extract_id(&json!({"data": {"id": "xyz"}})), Some("xyz".to_string()));
        assert_eq!(
            extract_id(&json!({"_id": {"$oid": "65f0"}})),
            Some("65f0".to_string())
        );
        assert_eq!(extract_id(&json!({"data": null})), None);
    }

    #[test]
    fn header_values_drop_non_ascii() {
        assert_eq!(header_safe("José\n"), "Jos");
    }
}
