//! Assets live in the backend service; this module owns the bulk import path
//! that validates spreadsheet rows and creates them there in batches.

use std::collections::HashSet;
use std::io::{Read, Seek};

use actix_multipart::form::{tempfile::TempFile, MultipartForm};
use actix_web::http::StatusCode;
use async_trait::async_trait;
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use chrono::NaiveDate;
use futures::future::join_all;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::{
    backend::{extract_id, BackendClient},
    config::ImportConfig,
    error::ApiError,
    utils::sanitize_opt,
};

use super::{role::AccessScope, user::UserAuthenticationData};

const NAME_MAX: usize = 200;
const DESCRIPTION_MAX: usize = 1000;
const ASSET_STATUSES: [&str; 5] = ["active", "inactive", "maintenance", "retired", "disposed"];
const ASSET_CONDITIONS: [&str; 4] = ["excellent", "good", "fair", "poor"];

/// One spreadsheet row as uploaded; every cell is optional until validated.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssetImportRow {
    #[serde(default, deserialize_with = "lenient_string")]
    pub asset_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub serial_number: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub category_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub location: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub department: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub condition: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub manufacturer: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub model: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub purchase_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub purchase_cost: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub assigned_to: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: Option<String>,
}

/// Sanitised row sent to the backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetImportRecord {
    pub asset_name: String,
    pub serial_number: Option<String>,
    pub category_name: String,
    pub location: Option<String>,
    pub department: Option<String>,
    pub status: String,
    pub condition: String,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub purchase_date: Option<String>,
    pub purchase_cost: Option<f64>,
    pub assigned_to: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AssetImportRequest {
    pub rows: Vec<AssetImportRow>,
}

#[derive(Debug, MultipartForm)]
pub struct AssetImportMultipartRequest {
    #[multipart(rename = "file")]
    pub file: TempFile,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRowResult {
    pub row: usize,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub total: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub results: Vec<ImportRowResult>,
}

impl ImportSummary {
    /// 201 when every row landed, 207 for a mix, 400 when nothing did.
    pub fn status(&self) -> StatusCode {
        if self.failure_count == 0 {
            StatusCode::CREATED
        } else if self.success_count == 0 {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::MULTI_STATUS
        }
    }
}

/// Destination for validated rows.
#[async_trait(?Send)]
pub trait AssetSink {
    async fn create_asset(&self, record: &AssetImportRecord) -> Result<String, String>;
}

pub struct BackendAssetSink<'a> {
    pub client: &'a BackendClient,
    pub user: &'a UserAuthenticationData,
}

#[async_trait(?Send)]
impl AssetSink for BackendAssetSink<'_> {
    async fn create_asset(&self, record: &AssetImportRecord) -> Result<String, String> {
        let reply = self
            .client
            .send(reqwest::Method::POST, "/api/assets", "", Some(record), self.user)
            .await
            .map_err(|error| error.to_string())?;
        if !reply.status.is_success() {
            let message = reply
                .body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("ASSET_CREATION_FAILED");
            return Err(message.to_string());
        }
        extract_id(&reply.body).ok_or_else(|| "ASSET_ID_MISSING".to_string())
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(text)) => Some(text),
        Some(Value::Number(number)) => Some(number.to_string()),
        Some(Value::Bool(flag)) => Some(flag.to_string()),
        _ => None,
    })
}

fn normalize_header(header: &str) -> String {
    header.trim().to_lowercase().replace([' ', '-'], "_")
}

fn row_from_cells<I>(headers: &[String], cells: I) -> Option<AssetImportRow>
where
    I: IntoIterator<Item = String>,
{
    let mut row = AssetImportRow::default();
    let mut filled = false;
    for (header, cell) in headers.iter().zip(cells) {
        let cell = Some(cell.trim().to_string()).filter(|cell| !cell.is_empty());
        filled |= cell.is_some();
        match header.as_str() {
            "asset_name" => row.asset_name = cell,
            "serial_number" => row.serial_number = cell,
            "category_name" => row.category_name = cell,
            "location" => row.location = cell,
            "department" => row.department = cell,
            "status" => row.status = cell,
            "condition" => row.condition = cell,
            "manufacturer" => row.manufacturer = cell,
            "model" => row.model = cell,
            "purchase_date" => row.purchase_date = cell,
            "purchase_cost" => row.purchase_cost = cell,
            "assigned_to" => row.assigned_to = cell,
            "description" => row.description = cell,
            _ => {}
        }
    }
    filled.then_some(row)
}

/// Reads CSV rows keyed by header name; unknown columns are ignored.
pub fn rows_from_csv<R: Read>(reader: R) -> Result<Vec<AssetImportRow>, ApiError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);
    let headers: Vec<String> = reader
        .headers()
        .map_err(|error| ApiError::validation(format!("Invalid CSV header: {error}")))?
        .iter()
        .map(normalize_header)
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record =
            record.map_err(|error| ApiError::validation(format!("Invalid CSV row: {error}")))?;
        if let Some(row) = row_from_cells(&headers, record.iter().map(str::to_string)) {
            rows.push(row);
        }
    }
    Ok(rows)
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(text) | Data::DateTimeIso(text) | Data::DurationIso(text) => text.clone(),
        Data::Float(number) if number.fract() == 0.0 && number.abs() < 1e15 => (*number as i64).to_string(),
        Data::DateTime(date) => date
            .as_datetime()
            .map(|date| date.date().format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| date.as_f64().to_string()),
        other => other.to_string(),
    }
}

/// Reads the first sheet of an Excel workbook (.xlsx, .xls, .xlsb or .ods).
/// The first row holds the headers.
pub fn rows_from_workbook<RS>(data: RS) -> Result<Vec<AssetImportRow>, ApiError>
where
    RS: Read + Seek + Clone,
{
    let mut workbook = open_workbook_auto_from_rs(data)
        .map_err(|error| ApiError::validation(format!("Invalid workbook: {error}")))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ApiError::validation("Workbook has no sheets"))?
        .map_err(|error| ApiError::validation(format!("Invalid worksheet: {error}")))?;

    let mut sheet_rows = range.rows();
    let headers: Vec<String> = match sheet_rows.next() {
        Some(header_row) => header_row
            .iter()
            .map(|cell| normalize_header(&cell_text(cell)))
            .collect(),
        None => return Ok(Vec::new()),
    };
    Ok(sheet_rows
        .filter_map(|cells| row_from_cells(&headers, cells.iter().map(cell_text)))
        .collect())
}

fn one_of(value: Option<&str>, allowed: &[&str], default: &str) -> String {
    value
        .map(|value| value.trim().to_lowercase())
        .filter(|value| allowed.contains(&value.as_str()))
        .unwrap_or_else(|| default.to_string())
}

pub fn validate_row(row: &AssetImportRow, scope: &AccessScope) -> Result<AssetImportRecord, String> {
    let asset_name = sanitize_opt(row.asset_name.as_deref(), NAME_MAX)
        .ok_or_else(|| "asset_name is required".to_string())?;
    let category_name = sanitize_opt(row.category_name.as_deref(), NAME_MAX)
        .ok_or_else(|| "category_name is required".to_string())?;

    let purchase_date = match sanitize_opt(row.purchase_date.as_deref(), 32) {
        Some(date) => {
            NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                .map_err(|_| "purchase_date must be YYYY-MM-DD".to_string())?;
            Some(date)
        }
        None => None,
    };
    let purchase_cost = match sanitize_opt(row.purchase_cost.as_deref(), 32) {
        Some(cost) => {
            let cost: f64 = cost
                .replace(',', "")
                .parse()
                .map_err(|_| "purchase_cost must be a number".to_string())?;
            if !cost.is_finite() || cost < 0.0 {
                return Err("purchase_cost must be a non-negative number".to_string());
            }
            Some(cost)
        }
        None => None,
    };

    Ok(AssetImportRecord {
        asset_name,
        serial_number: sanitize_opt(row.serial_number.as_deref(), NAME_MAX),
        category_name,
        location: sanitize_opt(row.location.as_deref(), NAME_MAX),
        department: scope.resolve_department(sanitize_opt(row.department.as_deref(), NAME_MAX)),
        status: one_of(row.status.as_deref(), &ASSET_STATUSES, "active"),
        condition: one_of(row.condition.as_deref(), &ASSET_CONDITIONS, "good"),
        manufacturer: sanitize_opt(row.manufacturer.as_deref(), NAME_MAX),
        model: sanitize_opt(row.model.as_deref(), NAME_MAX),
        purchase_date,
        purchase_cost,
        assigned_to: sanitize_opt(row.assigned_to.as_deref(), NAME_MAX),
        description: sanitize_opt(row.description.as_deref(), DESCRIPTION_MAX),
    })
}

/// Validates every row, then creates the valid ones in delayed batches.
/// Rows already created stay created when later ones fail.
pub async fn import_assets<S: AssetSink>(
    sink: &S,
    rows: Vec<AssetImportRow>,
    scope: &AccessScope,
    config: &ImportConfig,
) -> Result<ImportSummary, ApiError> {
    if rows.is_empty() {
        return Err(ApiError::validation("No rows to import"));
    }
    if rows.len() > config.max_rows {
        return Err(ApiError::validation(format!(
            "A maximum of {} rows can be imported at once",
            config.max_rows
        )));
    }

    let total = rows.len();
    let mut results: Vec<ImportRowResult> = Vec::with_capacity(total);
    let mut pending: Vec<(usize, AssetImportRecord)> = Vec::new();
    let mut serials: HashSet<String> = HashSet::new();

    for (index, row) in rows.iter().enumerate() {
        let row_number = index + 1;
        let checked = validate_row(row, scope).and_then(|record| {
            let serial = record.serial_number.clone().unwrap_or_default();
            if !serial.is_empty() && !serials.insert(serial.to_lowercase()) {
                Err(format!("duplicate serial_number {serial}"))
            } else {
                Ok(record)
            }
        });
        match checked {
            Ok(record) => pending.push((row_number, record)),
            Err(error) => results.push(ImportRowResult {
                row: row_number,
                success: false,
                asset_id: None,
                error: Some(error),
            }),
        }
    }

    let batches: Vec<&[(usize, AssetImportRecord)]> =
        pending.chunks(config.batch_size.max(1)).collect();
    let batch_count = batches.len();
    for (batch_index, batch) in batches.into_iter().enumerate() {
        let outcomes = join_all(batch.iter().map(|(_, record)| sink.create_asset(record))).await;
        for ((row_number, record), outcome) in batch.iter().zip(outcomes) {
            match outcome {
                Ok(asset_id) => results.push(ImportRowResult {
                    row: *row_number,
                    success: true,
                    asset_id: Some(asset_id),
                    error: None,
                }),
                Err(error) => {
                    tracing::warn!(row = row_number, asset = %record.asset_name, %error, "asset import row failed");
                    results.push(ImportRowResult {
                        row: *row_number,
                        success: false,
                        asset_id: None,
                        error: Some(error),
                    })
                }
            }
        }
        if batch_index + 1 < batch_count && !config.batch_delay.is_zero() {
            actix_web::rt::time::sleep(config.batch_delay).await;
        }
    }

    results.sort_by_key(|result| result.row);
    let success_count = results.iter().filter(|result| result.success).count();
    tracing::info!(total, success_count, "asset import finished");

    Ok(ImportSummary {
        total,
        success_count,
        failure_count: total - success_count,
        results,
    })
}

#[cfg(test)]
mod tests {
    use std::{
        cell::RefCell,
        io::Cursor,
        time::{Duration, Instant},
    };

    use rust_xlsxwriter::Workbook;

    use super::*;
    use crate::models::role::UserRole;

    #[derive(Default)]
    struct RecordingSink {
        created: RefCell<Vec<String>>,
        reject: Option<&'static str>,
    }

    #[async_trait(?Send)]
    impl AssetSink for RecordingSink {
        async fn create_asset(&self, record: &AssetImportRecord) -> Result<String, String> {
            if Some(record.asset_name.as_str()) == self.reject {
                return Err("backend rejected".to_string());
            }
            let mut created = self.created.borrow_mut();
            created.push(record.asset_name.clone());
            Ok(format!("asset-{}", created.len()))
        }
    }

    /// Logs when each create starts and ends so batch boundaries are visible.
    #[derive(Default)]
    struct BatchLogSink {
        events: RefCell<Vec<(String, Instant)>>,
    }

    #[async_trait(?Send)]
    impl AssetSink for BatchLogSink {
        async fn create_asset(&self, record: &AssetImportRecord) -> Result<String, String> {
            self.events
                .borrow_mut()
                .push((format!("start {}", record.asset_name), Instant::now()));
            actix_web::rt::task::yield_now().await;
            self.events
                .borrow_mut()
                .push((format!("end {}", record.asset_name), Instant::now()));
            Ok(record.asset_name.clone())
        }
    }

    fn scope(role: UserRole) -> AccessScope {
        AccessScope {
            role,
            department: Some("Electrical".to_string()),
            user_id: "u1".to_string(),
            employee_id: None,
        }
    }

    fn row(name: Option<&str>, serial: &str) -> AssetImportRow {
        AssetImportRow {
            asset_name: name.map(str::to_string),
            serial_number: Some(serial.to_string()),
            category_name: Some("Pumps".to_string()),
            ..Default::default()
        }
    }

    fn config() -> ImportConfig {
        ImportConfig {
            max_rows: 100,
            batch_size: 2,
            batch_delay: Duration::ZERO,
        }
    }

    #[actix_web::test]
    async fn mixed_rows_report_multi_status() {
        let sink = RecordingSink::default();
        let rows = vec![
            row(Some("Pump A"), "SN-1"),
            row(None, "SN-2"),
            row(Some("Pump C"), "SN-3"),
            row(Some("Pump D"), "SN-4"),
        ];
        let summary = import_assets(&sink, rows, &scope(UserRole::Manager), &config())
            .await
            .unwrap();

        assert_eq!(summary.success_count, 3);
        assert_eq!(summary.failure_count, 1);
        assert_eq!(summary.status(), StatusCode::MULTI_STATUS);
        assert_eq!(summary.results[1].row, 2);
        assert_eq!(
            summary.results[1].error.as_deref(),
            Some("asset_name is required")
        );
        assert_eq!(sink.created.borrow().len(), 3);
    }

    #[actix_web::test]
    async fn duplicate_serials_and_sink_failures_are_per_row() {
        let sink = RecordingSink {
            reject: Some("Pump C"),
            ..Default::default()
        };
        let rows = vec![
            row(Some("Pump A"), "SN-1"),
            row(Some("Pump B"), "sn-1"),
            row(Some("Pump C"), "SN-3"),
        ];
        let summary = import_assets(&sink, rows, &scope(UserRole::Admin), &config())
            .await
            .unwrap();
        assert_eq!(summary.success_count, 1);
        assert!(summary.results[1]
            .error
            .as_deref()
            .unwrap()
            .starts_with("duplicate serial_number"));
        assert_eq!(summary.results[2].error.as_deref(), Some("backend rejected"));
    }

    #[actix_web::test]
    async fn all_valid_is_created_and_none_valid_is_bad_request() {
        let sink = RecordingSink::default();
        let summary = import_assets(
            &sink,
            vec![row(Some("Pump A"), "SN-1")],
            &scope(UserRole::Admin),
            &config(),
        )
        .await
        .unwrap();
        assert_eq!(summary.status(), StatusCode::CREATED);

        let summary = import_assets(
            &sink,
            vec![row(None, "SN-9")],
            &scope(UserRole::Admin),
            &config(),
        )
        .await
        .unwrap();
        assert_eq!(summary.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn row_limits_are_enforced() {
        let sink = RecordingSink::default();
        assert!(import_assets(&sink, Vec::new(), &scope(UserRole::Admin), &config())
            .await
            .is_err());

        let rows = (0..101).map(|i| row(Some("Pump"), &format!("SN-{i}"))).collect();
        assert!(import_assets(&sink, rows, &scope(UserRole::Admin), &config())
            .await
            .is_err());
        assert!(sink.created.borrow().is_empty());
    }

    #[test]
    fn validation_sanitizes_and_forces_department() {
        let raw = AssetImportRow {
            asset_name: Some("  <Main>   Pump ".to_string()),
            category_name: Some("Pumps".to_string()),
            department: Some("Mechanical".to_string()),
            status: Some("BROKEN".to_string()),
            condition: Some("Fair".to_string()),
            purchase_cost: Some("1,250.50".to_string()),
            ..Default::default()
        };
        let record = validate_row(&raw, &scope(UserRole::Manager)).unwrap();
        assert_eq!(record.asset_name, "Main Pump");
        assert_eq!(record.department.as_deref(), Some("Electrical"));
        assert_eq!(record.status, "active");
        assert_eq!(record.condition, "fair");
        assert_eq!(record.purchase_cost, Some(1250.5));

        let bad_date = AssetImportRow {
            purchase_date: Some("03/04/2024".to_string()),
            ..row(Some("Pump"), "SN")
        };
        assert!(validate_row(&bad_date, &scope(UserRole::Manager)).is_err());
    }

    #[test]
    fn csv_rows_map_by_header() {
        let csv = "Asset Name,serial_number,category_name,purchase_cost,extra\n\
                   Pump A,SN-1,Pumps,100,x\n\
                   ,,,,\n\
                   ,SN-2,Pumps,,\n";
        let rows = rows_from_csv(csv.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].asset_name.as_deref(), Some("Pump A"));
        assert_eq!(rows[0].purchase_cost.as_deref(), Some("100"));
        assert_eq!(rows[1].asset_name, None);
    }

    #[test]
    fn json_rows_accept_numbers() {
        let request: AssetImportRequest = serde_json::from_str(
            r#"{"rows":[{"asset_name":"Pump","category_name":"Pumps","purchase_cost":99.5,"serial_number":123}]}"#,
        )
        .unwrap();
        assert_eq!(request.rows[0].purchase_cost.as_deref(), Some("99.5"));
        assert_eq!(request.rows[0].serial_number.as_deref(), Some("123"));
    }

    #[actix_web::test]
    async fn batches_run_concurrently_and_wait_between() {
        let sink = BatchLogSink::default();
        let rows = ["A", "B", "C", "D", "E"]
            .iter()
            .enumerate()
            .map(|(i, name)| row(Some(*name), &format!("SN-{i}")))
            .collect();
        let config = ImportConfig {
            batch_delay: Duration::from_millis(20),
            ..config()
        };
        let summary = import_assets(&sink, rows, &scope(UserRole::Admin), &config)
            .await
            .unwrap();
        assert_eq!(summary.success_count, 5);

        let events = sink.events.borrow();
        let order: Vec<&str> = events.iter().map(|(event, _)| event.as_str()).collect();
        assert_eq!(
            order,
            [
                "start A", "start B", "end A", "end B",
                "start C", "start D", "end C", "end D",
                "start E", "end E",
            ]
        );
        let at = |event: &str| events.iter().find(|(name, _)| name == event).map(|(_, at)| *at).unwrap();
        assert!(at("start C").duration_since(at("end B")) >= Duration::from_millis(20));
        assert!(at("start E").duration_since(at("end D")) >= Duration::from_millis(20));
    }

    #[actix_web::test]
    async fn workbook_rows_import_from_first_sheet() {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        for (col, header) in ["Asset Name", "Serial Number", "category-name", "Purchase Cost", "Notes"]
            .iter()
            .enumerate()
        {
            sheet.write_string(0, col as u16, *header).unwrap();
        }
        sheet.write_string(1, 0, "Pump A").unwrap();
        sheet.write_number(1, 1, 1001.0).unwrap();
        sheet.write_string(1, 2, "Pumps").unwrap();
        sheet.write_number(1, 3, 1500.0).unwrap();
        sheet.write_string(1, 4, "ignored").unwrap();
        sheet.write_string(3, 0, "Valve B").unwrap();
        sheet.write_string(3, 2, "Valves").unwrap();
        sheet.write_number(3, 3, 12.5).unwrap();
        let bytes = workbook.save_to_buffer().unwrap();

        let rows = rows_from_workbook(Cursor::new(bytes)).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].serial_number.as_deref(), Some("1001"));
        assert_eq!(rows[0].purchase_cost.as_deref(), Some("1500"));
        assert_eq!(rows[1].asset_name.as_deref(), Some("Valve B"));
        assert_eq!(rows[1].purchase_cost.as_deref(), Some("12.5"));

        let sink = RecordingSink::default();
        let summary = import_assets(&sink, rows, &scope(UserRole::Admin), &config())
            .await
            .unwrap();
        assert_eq!(summary.status(), StatusCode::CREATED);
        assert_eq!(*sink.created.borrow(), ["Pump A", "Valve B"]);
    }

    #[test]
    fn garbage_is_not_a_workbook() {
        assert!(rows_from_workbook(Cursor::new(b"not a workbook".to_vec())).is_err());
    }
}
