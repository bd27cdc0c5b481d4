use crate::{
    database::{get_db, paginate},
    error::ApiError,
    response::{PageQuery, Pagination},
    utils::{contains_ci, from_bson_date, parse_date, parse_time, push_and, sanitize, sanitize_opt, to_bson_date},
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc, Weekday};
use mongodb::{
    bson::{doc, oid::ObjectId, DateTime as BsonDateTime, Document},
    Collection,
};
use serde::{Deserialize, Serialize};

use super::role::AccessScope;

const COLLECTION: &str = "shiftdetails";
const OWNER_FIELDS: [&str; 1] = ["employeeId"];

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ShiftType {
    #[default]
    Day,
    Night,
    Rotating,
    Custom,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShiftDetail {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,
    pub employee_id: String,
    pub employee_name: String,
    pub email: Option<String>,
    pub department: Option<String>,
    pub shift_type: ShiftType,
    pub shift_start_time: String,
    pub shift_end_time: String,
    pub work_days: Vec<String>,
    pub effective_from: Option<BsonDateTime>,
    pub effective_to: Option<BsonDateTime>,
    pub is_active: bool,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShiftDetailRequest {
    pub employee_id: String,
    pub employee_name: String,
    pub email: Option<String>,
    pub department: Option<String>,
    pub shift_type: Option<ShiftType>,
    pub shift_start_time: String,
    pub shift_end_time: String,
    pub work_days: Vec<String>,
    pub effective_from: Option<String>,
    pub effective_to: Option<String>,
    pub is_active: Option<bool>,
}
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShiftDetailQuery {
    pub search: Option<String>,
    pub department: Option<String>,
    pub shift_type: Option<ShiftType>,
    pub is_active: Option<bool>,
}
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShiftDetailResponse {
    #[serde(rename = "_id")]
    pub _id: String,
    pub employee_id: String,
    pub employee_name: String,
    pub email: Option<String>,
    pub department: Option<String>,
    pub shift_type: ShiftType,
    pub shift_start_time: String,
    pub shift_end_time: String,
    pub work_days: Vec<String>,
    pub effective_from: Option<DateTime<Utc>>,
    pub effective_to: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ShiftDetail> for ShiftDetailResponse {
    fn from(shift: ShiftDetail) -> Self {
        Self {
            _id: shift._id.map(|id| id.to_hex()).unwrap_or_default(),
            employee_id: shift.employee_id,
            employee_name: shift.employee_name,
            email: shift.email,
            department: shift.department,
            shift_type: shift.shift_type,
            shift_start_time: shift.shift_start_time,
            shift_end_time: shift.shift_end_time,
            work_days: shift.work_days,
            effective_from: shift.effective_from.map(from_bson_date),
            effective_to: shift.effective_to.map(from_bson_date),
            is_active: shift.is_active,
            created_at: from_bson_date(shift.created_at),
            updated_at: from_bson_date(shift.updated_at),
        }
    }
}

impl ShiftDetailQuery {
    pub fn filter(&self, scope: &AccessScope) -> Result<Document, ApiError> {
        let mut filter = scope.filter("department", &OWNER_FIELDS);
        if let Some(department) = scope.department_filter(self.department.as_deref()) {
            filter.insert("department", department);
        }
        if let Some(shift_type) = self.shift_type {
            filter.insert("shiftType", mongodb::bson::to_bson(&shift_type)?);
        }
        if let Some(is_active) = self.is_active {
            filter.insert("isActive", is_active);
        }
        if let Some(search) = self.search.as_deref().filter(|v| !v.trim().is_empty()) {
            push_and(
                &mut filter,
                doc! { "$or": [
                    { "employeeName": contains_ci(search) },
                    { "employeeId": contains_ci(search) },
                    { "email": contains_ci(search) },
                ] },
            );
        }
        Ok(filter)
    }
}

/// Lowercase weekday name, or None for anything that is not a weekday.
pub fn normalize_weekday(day: &str) -> Option<String> {
    day.trim()
        .parse::<Weekday>()
        .ok()
        .map(|weekday| weekday_name(weekday).to_string())
}

pub fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

fn collection() -> Result<Collection<ShiftDetail>, ApiError> {
    Ok(get_db()?.collection::<ShiftDetail>(COLLECTION))
}

impl ShiftDetail {
    pub fn new(payload: ShiftDetailRequest, department: Option<String>) -> Result<Self, ApiError> {
        let now = BsonDateTime::now();
        let mut shift = Self {
            _id: None,
            employee_id: String::new(),
            employee_name: String::new(),
            email: None,
            department,
            shift_type: ShiftType::Day,
            shift_start_time: String::new(),
            shift_end_time: String::new(),
            work_days: Vec::new(),
            effective_from: None,
            effective_to: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        shift.apply(payload, None)?;
        Ok(shift)
    }

    pub fn apply(&mut self, payload: ShiftDetailRequest, department: Option<String>) -> Result<(), ApiError> {
        let employee_id = sanitize(&payload.employee_id, 50);
        if employee_id.is_empty() {
            return Err(ApiError::validation("employeeId is required"));
        }
        if parse_time(&payload.shift_start_time).is_none() || parse_time(&payload.shift_end_time).is_none() {
            return Err(ApiError::validation("Shift times must use HH:MM"));
        }
        let mut work_days = Vec::with_capacity(payload.work_days.len());
        for day in &payload.work_days {
            let day = normalize_weekday(day)
                .ok_or_else(|| ApiError::validation(format!("Invalid work day: {}", day.trim())))?;
            if !work_days.contains(&day) {
                work_days.push(day);
            }
        }
        let effective_from = match payload.effective_from.as_deref().filter(|v| !v.trim().is_empty()) {
            Some(date) => Some(parse_date(date)?),
            None => None,
        };
        let effective_to = match payload.effective_to.as_deref().filter(|v| !v.trim().is_empty()) {
            Some(date) => Some(parse_date(date)?),
            None => None,
        };
        if let (Some(from), Some(to)) = (effective_from, effective_to) {
            if to < from {
                return Err(ApiError::validation("effectiveTo is before effectiveFrom"));
            }
        }

        self.employee_id = employee_id;
        self.employee_name = sanitize(&payload.employee_name, 200);
        self.email = sanitize_opt(payload.email.as_deref(), 200).map(|email| email.to_lowercase());
        if department.is_some() {
            self.department = department;
        }
        self.shift_type = payload.shift_type.unwrap_or(self.shift_type);
        self.shift_start_time = payload.shift_start_time.trim().to_string();
        self.shift_end_time = payload.shift_end_time.trim().to_string();
        self.work_days = work_days;
        self.effective_from = effective_from.map(to_bson_date);
        self.effective_to = effective_to.map(to_bson_date);
        self.is_active = payload.is_active.unwrap_or(self.is_active);
        self.updated_at = BsonDateTime::now();
        Ok(())
    }

    pub fn times(&self) -> Option<(NaiveTime, NaiveTime)> {
        Some((parse_time(&self.shift_start_time)?, parse_time(&self.shift_end_time)?))
    }

    /// Active, inside its effective period and scheduled on that weekday.
    pub fn works_on(&self, date: NaiveDate) -> bool {
        use chrono::Datelike;
        if !self.is_active {
            return false;
        }
        if let Some(from) = self.effective_from {
            if date < from_bson_date(from).date_naive() {
                return false;
            }
        }
        if let Some(to) = self.effective_to {
            if date > from_bson_date(to).date_naive() {
                return false;
            }
        }
        let weekday = weekday_name(date.weekday());
        self.work_days.iter().any(|day| day.eq_ignore_ascii_case(weekday))
    }

    pub async fn save(&mut self) -> Result<ObjectId, ApiError> {
        self._id = Some(ObjectId::new());
        collection()?.insert_one(&*self, None).await?;
        self._id.ok_or_else(|| ApiError::internal("INSERTING_FAILED"))
    }
    pub async fn update(&self) -> Result<ObjectId, ApiError> {
        let _id = self._id.ok_or_else(|| ApiError::internal("SHIFT_WITHOUT_ID"))?;
        collection()?.replace_one(doc! { "_id": _id }, self, None).await?;
        Ok(_id)
    }
    pub async fn delete(&self) -> Result<u64, ApiError> {
        let _id = self._id.ok_or_else(|| ApiError::internal("SHIFT_WITHOUT_ID"))?;
        Ok(collection()?
            .delete_one(doc! { "_id": _id }, None)
            .await?
            .deleted_count)
    }
    pub async fn find_many(
        query: &ShiftDetailQuery,
        page: &PageQuery,
        scope: &AccessScope,
    ) -> Result<(Vec<ShiftDetailResponse>, Pagination), ApiError> {
        let filter = query.filter(scope)?;
        let sort = page.sort(&["employeeName", "employeeId", "shiftType", "createdAt"], "employeeName");
        let (shifts, pagination) = paginate(&collection()?, filter, sort, page).await?;
        Ok((
            shifts.into_iter().map(ShiftDetailResponse::from).collect(),
            pagination,
        ))
    }
    pub async fn find_by_id(_id: &ObjectId) -> Result<Option<ShiftDetail>, ApiError> {
        Ok(collection()?.find_one(doc! { "_id": _id }, None).await?)
    }
    /// The employee's current shift, matched by employee id or email.
    pub async fn find_for_employee(employee_id: &str, email: &str) -> Result<Option<ShiftDetail>, ApiError> {
        let options = mongodb::options::FindOneOptions::builder()
            .sort(doc! { "isActive": -1, "updatedAt": -1 })
            .build();
        Ok(collection()?
            .find_one(
                doc! { "$or": [
                    { "employeeId": employee_id },
                    { "email": email.to_lowercase() },
                ] },
                options,
            )
            .await?)
    }
    /// Active shifts whose effective period overlaps `[start, end]`.
    pub async fn find_active_between(
        mut filter: Document,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ShiftDetail>, ApiError> {
        filter.insert("isActive", true);
        push_and(
            &mut filter,
            doc! { "$or": [
                { "effectiveFrom": null },
                { "effectiveFrom": { "$lte": to_bson_date(end) } },
            ] },
        );
        push_and(
            &mut filter,
            doc! { "$or": [
                { "effectiveTo": null },
                { "effectiveTo": { "$gte": to_bson_date(start) } },
            ] },
        );
        crate::database::find_capped(&collection()?, filter, doc! { "employeeName": 1 }, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(days: &[&str]) -> ShiftDetailRequest {
        ShiftDetailRequest {
            employee_id: "EMP-3".to_string(),
            employee_name: "Lee Park".to_string(),
            email: Some("Lee.Park@plant.example.com".to_string()),
            department: None,
            shift_type: Some(ShiftType::Night),
            shift_start_time: "22:00".to_string(),
            shift_end_time: "06:00".to_string(),
            work_days: days.iter().map(|day| day.to_string()).collect(),
            effective_from: None,
            effective_to: None,
            is_active: None,
        }
    }

    #[test]
    fn work_days_are_normalized_and_validated() {
        let shift = ShiftDetail::new(request(&["Monday", "tue", "monday"]), None).unwrap();
        assert_eq!(shift.work_days, vec!["monday", "tuesday"]);
        assert_eq!(shift.email.as_deref(), Some("lee.park@plant.example.com"));
        assert!(ShiftDetail::new(request(&["someday"]), None).is_err());
    }

    #[test]
    fn times_must_be_hh_mm() {
        let mut payload = request(&["monday"]);
        payload.shift_end_time = "6pm".to_string();
        assert!(ShiftDetail::new(payload, None).is_err());
    }

    #[test]
    fn works_on_respects_effective_period() {
        let mut payload = request(&["monday"]);
        payload.effective_from = Some("2024-06-10".to_string());
        let shift = ShiftDetail::new(payload, None).unwrap();
        let before = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        let monday = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        let tuesday = NaiveDate::from_ymd_opt(2024, 6, 11).unwrap();
        assert!(!shift.works_on(before));
        assert!(shift.works_on(monday));
        assert!(!shift.works_on(tuesday));
    }
}
