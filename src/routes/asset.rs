use std::{
    fs::{self, File},
    io::{BufReader, Cursor},
    path::Path,
};

use actix_multipart::form::MultipartForm;
use actix_web::{delete, get, post, put, web, HttpRequest, HttpResponse};
use mime_guess::get_mime_extensions_str;
use reqwest::Method;
use serde_json::Value;

use crate::{
    backend::BackendClient,
    config::Config,
    error::ApiError,
    models::{
        asset::{
            import_assets, rows_from_csv, rows_from_workbook, AssetImportMultipartRequest, AssetImportRequest,
            AssetImportRow, BackendAssetSink,
        },
        role::AccessScope,
        user::current_user,
    },
    response::with_status,
};

use super::forward;

const BACKEND_PATH: &str = "/api/assets";

#[get("/assets")]
pub async fn get_assets(client: web::Data<BackendClient>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    forward(&client, Method::GET, BACKEND_PATH, &req, None).await
}

#[post("/assets")]
pub async fn create_asset(
    client: web::Data<BackendClient>,
    payload: web::Json<Value>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    let mut payload = payload.into_inner();
    let scope = AccessScope::of(&issuer);
    if !scope.is_unrestricted() {
        force_department(&mut payload, scope.department.as_deref())?;
    }
    forward(&client, Method::POST, BACKEND_PATH, &req, Some(&payload)).await
}

#[get("/assets/{asset_id}")]
pub async fn get_asset(
    client: web::Data<BackendClient>,
    asset_id: web::Path<String>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let path = format!("{BACKEND_PATH}/{asset_id}");
    forward(&client, Method::GET, &path, &req, None).await
}

#[put("/assets/{asset_id}")]
pub async fn update_asset(
    client: web::Data<BackendClient>,
    asset_id: web::Path<String>,
    payload: web::Json<Value>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let path = format!("{BACKEND_PATH}/{asset_id}");
    forward(&client, Method::PUT, &path, &req, Some(&payload.0)).await
}

#[delete("/assets/{asset_id}")]
pub async fn delete_asset(
    client: web::Data<BackendClient>,
    asset_id: web::Path<String>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let path = format!("{BACKEND_PATH}/{asset_id}");
    forward(&client, Method::DELETE, &path, &req, None).await
}

fn force_department(payload: &mut Value, department: Option<&str>) -> Result<(), ApiError> {
    let object = payload
        .as_object_mut()
        .ok_or_else(|| ApiError::validation("asset payload must be a JSON object"))?;
    object.insert(
        "department".to_string(),
        department.map_or(Value::Null, |department| Value::String(department.to_string())),
    );
    Ok(())
}

async fn run_import(
    client: &BackendClient,
    config: &Config,
    rows: Vec<AssetImportRow>,
    req: &HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(req)?;
    if !issuer.role.is_privileged() {
        return Err(ApiError::forbidden("FORBIDDEN"));
    }
    let scope = AccessScope::of(&issuer);
    let sink = BackendAssetSink {
        client,
        user: &issuer,
    };
    let summary = import_assets(&sink, rows, &scope, &config.import).await?;
    tracing::info!(
        user_id = %issuer.id,
        total = summary.total,
        succeeded = summary.success_count,
        failed = summary.failure_count,
        "bulk asset import finished"
    );
    let message = format!(
        "Imported {} of {} assets",
        summary.success_count, summary.total
    );
    Ok(with_status(summary.status(), &message, summary))
}

#[post("/assets/bulk-import")]
pub async fn bulk_import_assets(
    client: web::Data<BackendClient>,
    config: web::Data<Config>,
    payload: web::Json<AssetImportRequest>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    run_import(&client, &config, payload.into_inner().rows, &req).await
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UploadKind {
    Csv,
    Workbook,
}

const WORKBOOK_EXTENSIONS: [&str; 5] = ["xlsx", "xlsm", "xls", "xlsb", "ods"];

fn upload_kind(file_name: Option<&str>, content_type: Option<&str>) -> Option<UploadKind> {
    let kind_of = |ext: &str| {
        if ext.eq_ignore_ascii_case("csv") {
            Some(UploadKind::Csv)
        } else if WORKBOOK_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)) {
            Some(UploadKind::Workbook)
        } else {
            None
        }
    };
    let by_name = file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .and_then(kind_of);
    by_name.or_else(|| {
        content_type
            .and_then(get_mime_extensions_str)
            .and_then(|extensions| extensions.iter().find_map(|ext| kind_of(ext)))
    })
}

#[post("/assets/bulk-import/file")]
pub async fn bulk_import_assets_file(
    client: web::Data<BackendClient>,
    config: web::Data<Config>,
    form: MultipartForm<AssetImportMultipartRequest>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    current_user(&req)?;
    let kind = upload_kind(
        form.file.file_name.as_deref(),
        form.file.content_type.as_ref().map(|mime| mime.essence_str()),
    )
    .ok_or_else(|| ApiError::validation("Only CSV or Excel files can be imported"))?;
    let path = form.file.file.path();
    let rows = match kind {
        UploadKind::Csv => {
            let file = File::open(path).map_err(|_| ApiError::internal("UPLOAD_NOT_READABLE"))?;
            rows_from_csv(BufReader::new(file))?
        }
        UploadKind::Workbook => {
            let bytes = fs::read(path).map_err(|_| ApiError::internal("UPLOAD_NOT_READABLE"))?;
            rows_from_workbook(Cursor::new(bytes))?
        }
    };
    run_import(&client, &config, rows, &req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn uploads_are_recognised_by_name_or_mime() {
        assert_eq!(upload_kind(Some("assets.CSV"), None), Some(UploadKind::Csv));
        assert_eq!(upload_kind(None, Some("text/csv")), Some(UploadKind::Csv));
        assert_eq!(
            upload_kind(Some("assets.xlsx"), Some("application/octet-stream")),
            Some(UploadKind::Workbook)
        );
        assert_eq!(upload_kind(Some("legacy.XLS"), None), Some(UploadKind::Workbook));
        assert_eq!(
            upload_kind(
                Some("upload"),
                Some("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet")
            ),
            Some(UploadKind::Workbook)
        );
        assert_eq!(upload_kind(Some("notes.txt"), Some("text/plain")), None);
        assert_eq!(upload_kind(None, None), None);
    }

    #[test]
    fn department_is_overwritten() {
        let mut payload = json!({ "assetName": "Pump", "department": "Electrical" });
        force_department(&mut payload, Some("Mechanical")).unwrap();
        assert_eq!(payload["department"], "Mechanical");

        assert!(force_department(&mut json!([1, 2]), Some("Mechanical")).is_err());
    }
}
