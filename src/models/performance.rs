use crate::{
    database::{get_db, paginate},
    error::ApiError,
    response::{PageQuery, Pagination},
    utils::{exact_ci, from_bson_date, sanitize, sanitize_opt},
};
use chrono::{DateTime, Utc};
use mongodb::{
    bson::{doc, oid::ObjectId, DateTime as BsonDateTime, Document},
    options::UpdateOptions,
    Collection,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::role::AccessScope;

const COLLECTION: &str = "performances";
const OWNER_FIELDS: [&str; 1] = ["employeeId"];

static PERIOD_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-(0[1-9]|1[0-2])$").expect("period pattern is valid"));

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Performance {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,
    #[serde(default)]
    pub employee_id: Option<String>,
    pub employee_name: String,
    #[serde(default)]
    pub department: Option<String>,
    pub period: String,
    #[serde(default)]
    pub tasks_completed: i64,
    #[serde(default)]
    pub tasks_assigned: i64,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub remarks: Option<String>,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceRequest {
    pub employee_id: Option<String>,
    pub employee_name: String,
    pub department: Option<String>,
    pub period: String,
    pub tasks_completed: Option<i64>,
    pub tasks_assigned: Option<i64>,
    pub rating: Option<f64>,
    pub remarks: Option<String>,
}
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceQuery {
    pub employee_id: Option<String>,
    pub department: Option<String>,
    pub period: Option<String>,
}
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceResponse {
    #[serde(rename = "_id")]
    pub _id: String,
    pub employee_id: Option<String>,
    pub employee_name: String,
    pub department: Option<String>,
    pub period: String,
    pub tasks_completed: i64,
    pub tasks_assigned: i64,
    pub rating: Option<f64>,
    pub remarks: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
#[derive(Debug, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSummary {
    pub records: usize,
    pub average_rating: Option<f64>,
    pub total_tasks_completed: i64,
    pub total_tasks_assigned: i64,
    pub completion_rate: f64,
}

impl From<Performance> for PerformanceResponse {
    fn from(performance: Performance) -> Self {
        Self {
            _id: performance._id.map(|id| id.to_hex()).unwrap_or_default(),
            employee_id: performance.employee_id,
            employee_name: performance.employee_name,
            department: performance.department,
            period: performance.period,
            tasks_completed: performance.tasks_completed,
            tasks_assigned: performance.tasks_assigned,
            rating: performance.rating,
            remarks: performance.remarks,
            created_at: from_bson_date(performance.created_at),
            updated_at: from_bson_date(performance.updated_at),
        }
    }
}

impl PerformanceSummary {
    pub fn from_records(records: &[Performance]) -> Self {
        let ratings: Vec<f64> = records.iter().filter_map(|record| record.rating).collect();
        let average_rating = if ratings.is_empty() {
            None
        } else {
            let mean = ratings.iter().sum::<f64>() / ratings.len() as f64;
            Some((mean * 100.0).round() / 100.0)
        };
        let total_tasks_completed = records.iter().map(|record| record.tasks_completed).sum();
        let total_tasks_assigned: i64 = records.iter().map(|record| record.tasks_assigned).sum();
        let completion_rate = if total_tasks_assigned > 0 {
            let rate = total_tasks_completed as f64 / total_tasks_assigned as f64 * 100.0;
            (rate * 100.0).round() / 100.0
        } else {
            0.0
        };
        Self {
            records: records.len(),
            average_rating,
            total_tasks_completed,
            total_tasks_assigned,
            completion_rate,
        }
    }
}

impl PerformanceQuery {
    pub fn filter(&self, scope: &AccessScope) -> Document {
        let mut filter = scope.filter("department", &OWNER_FIELDS);
        if let Some(department) = scope.department_filter(self.department.as_deref()) {
            filter.insert("department", department);
        }
        if let Some(employee_id) = self.employee_id.as_deref().filter(|v| !v.trim().is_empty()) {
            filter.insert("employeeId", employee_id.trim());
        }
        if let Some(period) = self.period.as_deref().filter(|v| !v.trim().is_empty()) {
            filter.insert("period", period.trim());
        }
        filter
    }
}

/// `YYYY-MM` of the given instant.
pub fn period_of(date: DateTime<Utc>) -> String {
    date.format("%Y-%m").to_string()
}

fn collection() -> Result<Collection<Performance>, ApiError> {
    Ok(get_db()?.collection::<Performance>(COLLECTION))
}

impl Performance {
    pub fn new(payload: PerformanceRequest, department: Option<String>) -> Result<Self, ApiError> {
        let employee_name = sanitize(&payload.employee_name, 200);
        if employee_name.is_empty() {
            return Err(ApiError::validation("employeeName is required"));
        }
        let period = payload.period.trim().to_string();
        if !PERIOD_REGEX.is_match(&period) {
            return Err(ApiError::validation("period must use YYYY-MM"));
        }
        if let Some(rating) = payload.rating {
            if !(1.0..=5.0).contains(&rating) {
                return Err(ApiError::validation("rating must be between 1 and 5"));
            }
        }
        let tasks_completed = payload.tasks_completed.unwrap_or(0);
        let tasks_assigned = payload.tasks_assigned.unwrap_or(0);
        if tasks_completed < 0 || tasks_assigned < 0 {
            return Err(ApiError::validation("task counts cannot be negative"));
        }
        let now = BsonDateTime::now();
        Ok(Self {
            _id: None,
            employee_id: sanitize_opt(payload.employee_id.as_deref(), 50),
            employee_name,
            department,
            period,
            tasks_completed,
            tasks_assigned,
            rating: payload.rating,
            remarks: sanitize_opt(payload.remarks.as_deref(), 1000),
            created_at: now,
            updated_at: now,
        })
    }

    fn identity(&self) -> Document {
        match &self.employee_id {
            Some(employee_id) => doc! { "employeeId": employee_id, "period": &self.period },
            None => doc! { "employeeName": exact_ci(&self.employee_name), "period": &self.period },
        }
    }

    pub async fn save(&mut self) -> Result<ObjectId, ApiError> {
        let collection = collection()?;
        if collection.find_one(self.identity(), None).await?.is_some() {
            return Err(ApiError::conflict("PERFORMANCE_PERIOD_ALREADY_EXIST"));
        }
        self._id = Some(ObjectId::new());
        collection.insert_one(&*self, None).await?;
        self._id.ok_or_else(|| ApiError::internal("INSERTING_FAILED"))
    }
    pub async fn find_many(
        query: &PerformanceQuery,
        page: &PageQuery,
        scope: &AccessScope,
    ) -> Result<(Vec<PerformanceResponse>, Pagination), ApiError> {
        let filter = query.filter(scope);
        let sort = page.sort(&["period", "employeeName", "rating", "tasksCompleted", "createdAt"], "period");
        let (records, pagination) = paginate(&collection()?, filter, sort, page).await?;
        Ok((
            records.into_iter().map(PerformanceResponse::from).collect(),
            pagination,
        ))
    }
    pub async fn find_all(filter: Document) -> Result<Vec<Performance>, ApiError> {
        crate::database::find_capped(&collection()?, filter, doc! { "period": -1 }, 0).await
    }
    pub async fn find_for_employee(employee_id: &str, name: &str, limit: i64) -> Result<Vec<Performance>, ApiError> {
        crate::database::find_capped(
            &collection()?,
            doc! { "$or": [
                { "employeeId": employee_id },
                { "employeeName": exact_ci(name) },
            ] },
            doc! { "period": -1 },
            limit,
        )
        .await
    }

    /// Bumps `tasksCompleted` on the employee's record for the current
    /// period, creating the record when the period has none yet.
    pub async fn record_task_completion(
        employee_id: Option<String>,
        employee_name: String,
        department: Option<String>,
    ) -> Result<(), ApiError> {
        let period = period_of(Utc::now());
        let now = BsonDateTime::now();
        let (filter, mut on_insert) = match employee_id {
            Some(employee_id) => (
                doc! { "employeeId": employee_id, "period": &period },
                doc! { "employeeName": &employee_name },
            ),
            None => (
                doc! { "employeeName": &employee_name, "period": &period },
                doc! { "employeeId": null },
            ),
        };
        on_insert.insert("department", department);
        on_insert.insert("tasksAssigned", 0_i64);
        on_insert.insert("createdAt", now);
        let update = doc! {
            "$inc": { "tasksCompleted": 1_i64 },
            "$set": { "updatedAt": now },
            "$setOnInsert": on_insert,
        };
        let options = UpdateOptions::builder().upsert(true).build();
        collection()?.update_one(filter, update, options).await?;
        Ok(())
    }

    pub fn record_task_completion_detached(
        employee_id: Option<String>,
        employee_name: String,
        department: Option<String>,
    ) {
        actix_web::rt::spawn(async move {
            if let Err(error) =
                Performance::record_task_completion(employee_id, employee_name.clone(), department).await
            {
                tracing::warn!(employee = %employee_name, error = ?error, "failed to record task completion");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(completed: i64, assigned: i64, rating: Option<f64>) -> Performance {
        Performance {
            _id: None,
            employee_id: Some("EMP-1".to_string()),
            employee_name: "Ari".to_string(),
            department: None,
            period: "2024-01".to_string(),
            tasks_completed: completed,
            tasks_assigned: assigned,
            rating,
            remarks: None,
            created_at: BsonDateTime::now(),
            updated_at: BsonDateTime::now(),
        }
    }

    #[test]
    fn summary_averages_and_rates() {
        let summary = PerformanceSummary::from_records(&[
            record(8, 10, Some(4.0)),
            record(4, 6, Some(3.0)),
            record(2, 4, None),
        ]);
        assert_eq!(summary.records, 3);
        assert_eq!(summary.average_rating, Some(3.5));
        assert_eq!(summary.total_tasks_completed, 14);
        assert_eq!(summary.total_tasks_assigned, 20);
        assert_eq!(summary.completion_rate, 70.0);
    }

    #[test]
    fn empty_summary_has_no_rating() {
        assert_eq!(PerformanceSummary::from_records(&[]), PerformanceSummary::default());
    }

    #[test]
    fn period_and_rating_are_validated() {
        let request = |period: &str, rating: Option<f64>| PerformanceRequest {
            employee_id: Some("EMP-1".to_string()),
            employee_name: "Ari".to_string(),
            department: None,
            period: period.to_string(),
            tasks_completed: Some(3),
            tasks_assigned: Some(5),
            rating,
            remarks: None,
        };
        assert!(Performance::new(request("2024-02", Some(4.5)), None).is_ok());
        assert!(Performance::new(request("2024-13", None), None).is_err());
        assert!(Performance::new(request("2024-02", Some(6.0)), None).is_err());
    }
}
