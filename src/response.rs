use actix_web::{http::StatusCode, HttpResponse};
use mongodb::bson::{doc, Document};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_LIMIT: u64 = 10;
pub const MAX_PAGE_LIMIT: u64 = 100;

/// `{success, message, data}` envelope shared by every endpoint.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            pagination: None,
        }
    }
    pub fn paginated(message: impl Into<String>, data: T, pagination: Pagination) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            pagination: Some(pagination),
        }
    }
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            pagination: None,
        }
    }
}

pub fn ok<T: Serialize>(message: &str, data: T) -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::success(message, data))
}

pub fn created<T: Serialize>(message: &str, data: T) -> HttpResponse {
    HttpResponse::Created().json(ApiResponse::success(message, data))
}

/// Envelope for results whose status depends on the outcome; `success`
/// follows the status class so a 4xx report still carries its data.
pub fn with_status<T: Serialize>(status: StatusCode, message: &str, data: T) -> HttpResponse {
    let body = ApiResponse {
        success: status.is_success(),
        ..ApiResponse::success(message, data)
    };
    HttpResponse::build(status).json(body)
}

pub fn page<T: Serialize>(message: &str, data: Vec<T>, pagination: Pagination) -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::paginated(message, data, pagination))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u64,
    pub limit: u64,
    pub total_count: u64,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl Pagination {
    pub fn new(page: u64, limit: u64, total_count: u64) -> Self {
        let total_pages = if limit == 0 {
            0
        } else {
            total_count.div_ceil(limit)
        };
        Self {
            page,
            limit,
            total_count,
            total_pages,
            has_next: page < total_pages,
            has_prev: page > 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Query-string parameters shared by list endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub sort_by: Option<String>,
    pub sort_order: Option<SortOrder>,
}

impl PageQuery {
    pub fn page(&self) -> u64 {
        self.page.filter(|page| *page > 0).unwrap_or(1)
    }
    pub fn limit(&self) -> u64 {
        self.limit
            .unwrap_or(DEFAULT_PAGE_LIMIT)
            .clamp(1, MAX_PAGE_LIMIT)
    }
    /// Offset for `$skip`; saturates instead of overflowing on absurd pages.
    pub fn skip(&self) -> i64 {
        let skip = (self.page() - 1).saturating_mul(self.limit());
        i64::try_from(skip).unwrap_or(i64::MAX)
    }
    /// Sort stage for a whitelist of fields, falling back to `default`.
    pub fn sort(&self, allowed: &[&str], default: &str) -> Document {
        let field = self
            .sort_by
            .as_deref()
            .filter(|field| allowed.contains(field))
            .unwrap_or(default);
        let direction = match self.sort_order.unwrap_or_default() {
            SortOrder::Asc => 1,
            SortOrder::Desc => -1,
        };
        let mut sort = doc! { field: direction };
        if field != "_id" {
            sort.insert("_id", direction);
        }
        sort
    }
}
