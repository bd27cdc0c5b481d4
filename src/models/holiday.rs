use crate::{
    database::{get_db, paginate},
    error::ApiError,
    response::{PageQuery, Pagination},
    utils::{from_bson_date, parse_date, sanitize, sanitize_opt, to_bson_date},
};
use chrono::{DateTime, NaiveDate, Utc};
use mongodb::{
    bson::{doc, oid::ObjectId, DateTime as BsonDateTime, Document},
    Collection,
};
use serde::{Deserialize, Serialize};

use super::role::AccessScope;

const COLLECTION: &str = "holidays";

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum HolidayType {
    #[default]
    Public,
    Company,
    Optional,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Holiday {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,
    pub name: String,
    pub date: BsonDateTime,
    #[serde(rename = "type")]
    pub kind: HolidayType,
    pub description: Option<String>,
    pub department: Option<String>,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}
#[derive(Debug, Deserialize)]
pub struct HolidayRequest {
    pub name: String,
    pub date: String,
    #[serde(rename = "type")]
    pub kind: Option<HolidayType>,
    pub description: Option<String>,
    pub department: Option<String>,
}
#[derive(Debug, Default, Deserialize)]
pub struct HolidayQuery {
    pub year: Option<i32>,
    pub department: Option<String>,
}
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HolidayResponse {
    #[serde(rename = "_id")]
    pub _id: String,
    pub name: String,
    pub date: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: HolidayType,
    pub description: Option<String>,
    pub department: Option<String>,
}

impl From<Holiday> for HolidayResponse {
    fn from(holiday: Holiday) -> Self {
        Self {
            _id: holiday._id.map(|id| id.to_hex()).unwrap_or_default(),
            name: holiday.name,
            date: from_bson_date(holiday.date),
            kind: holiday.kind,
            description: holiday.description,
            department: holiday.department,
        }
    }
}

/// Company-wide holidays (no department) are visible to everyone.
pub fn visibility(scope: &AccessScope, requested: Option<&str>) -> Document {
    let department = if scope.is_unrestricted() {
        scope.department_filter(requested)
    } else {
        scope.department.clone()
    };
    match department {
        Some(department) => doc! { "$or": [
            { "department": null },
            { "department": department },
        ] },
        None if scope.is_unrestricted() => Document::new(),
        None => doc! { "department": null },
    }
}

impl HolidayQuery {
    pub fn filter(&self, scope: &AccessScope) -> Result<Document, ApiError> {
        let mut filter = visibility(scope, self.department.as_deref());
        if let Some(year) = self.year {
            let start = NaiveDate::from_ymd_opt(year, 1, 1)
                .ok_or_else(|| ApiError::validation("Invalid year"))?;
            let end = NaiveDate::from_ymd_opt(year + 1, 1, 1)
                .ok_or_else(|| ApiError::validation("Invalid year"))?;
            filter.insert(
                "date",
                doc! {
                    "$gte": to_bson_date(crate::utils::start_of_day(start)),
                    "$lt": to_bson_date(crate::utils::start_of_day(end)),
                },
            );
        }
        Ok(filter)
    }
}

fn collection() -> Result<Collection<Holiday>, ApiError> {
    Ok(get_db()?.collection::<Holiday>(COLLECTION))
}

impl Holiday {
    pub fn new(payload: HolidayRequest) -> Result<Self, ApiError> {
        let now = BsonDateTime::now();
        let mut holiday = Self {
            _id: None,
            name: String::new(),
            date: now,
            kind: HolidayType::Public,
            description: None,
            department: None,
            created_at: now,
            updated_at: now,
        };
        holiday.apply(payload)?;
        Ok(holiday)
    }

    pub fn apply(&mut self, payload: HolidayRequest) -> Result<(), ApiError> {
        let name = sanitize(&payload.name, 200);
        if name.is_empty() {
            return Err(ApiError::validation("name is required"));
        }
        self.name = name;
        self.date = to_bson_date(parse_date(&payload.date)?);
        self.kind = payload.kind.unwrap_or(self.kind);
        self.description = sanitize_opt(payload.description.as_deref(), 1000);
        self.department = sanitize_opt(payload.department.as_deref(), 100);
        self.updated_at = BsonDateTime::now();
        Ok(())
    }

    pub async fn save(&mut self) -> Result<ObjectId, ApiError> {
        self._id = Some(ObjectId::new());
        collection()?.insert_one(&*self, None).await?;
        self._id.ok_or_else(|| ApiError::internal("INSERTING_FAILED"))
    }
    pub async fn update(&self) -> Result<ObjectId, ApiError> {
        let _id = self._id.ok_or_else(|| ApiError::internal("HOLIDAY_WITHOUT_ID"))?;
        collection()?.replace_one(doc! { "_id": _id }, self, None).await?;
        Ok(_id)
    }
    pub async fn delete(&self) -> Result<u64, ApiError> {
        let _id = self._id.ok_or_else(|| ApiError::internal("HOLIDAY_WITHOUT_ID"))?;
        Ok(collection()?
            .delete_one(doc! { "_id": _id }, None)
            .await?
            .deleted_count)
    }
    pub async fn find_many(
        query: &HolidayQuery,
        page: &PageQuery,
        scope: &AccessScope,
    ) -> Result<(Vec<HolidayResponse>, Pagination), ApiError> {
        let filter = query.filter(scope)?;
        let sort = page.sort(&["date", "name", "type"], "date");
        let (holidays, pagination) = paginate(&collection()?, filter, sort, page).await?;
        Ok((
            holidays.into_iter().map(HolidayResponse::from).collect(),
            pagination,
        ))
    }
    pub async fn find_by_id(_id: &ObjectId) -> Result<Option<Holiday>, ApiError> {
        Ok(collection()?.find_one(doc! { "_id": _id }, None).await?)
    }
    pub async fn find_capped(filter: Document, limit: i64) -> Result<Vec<Holiday>, ApiError> {
        crate::database::find_capped(&collection()?, filter, doc! { "date": 1 }, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::role::UserRole;

    #[test]
    fn restricted_callers_also_see_company_wide_holidays() {
        let scope = AccessScope {
            role: UserRole::Manager,
            department: Some("Ops".to_string()),
            user_id: "u1".to_string(),
            employee_id: None,
        };
        let filter = HolidayQuery {
            year: Some(2024),
            department: Some("Finance".to_string()),
        }
        .filter(&scope)
        .unwrap();
        let clauses = filter.get_array("$or").unwrap();
        assert_eq!(clauses.len(), 2);
        assert_eq!(
            clauses[1].as_document().unwrap().get_str("department").unwrap(),
            "Ops"
        );
        assert!(filter.get_document("date").unwrap().contains_key("$lt"));
    }

    #[test]
    fn holiday_type_defaults_to_public() {
        let holiday = Holiday::new(HolidayRequest {
            name: " New Year ".to_string(),
            date: "2025-01-01".to_string(),
            kind: None,
            description: None,
            department: None,
        })
        .unwrap();
        assert_eq!(holiday.name, "New Year");
        assert_eq!(holiday.kind, HolidayType::Public);
    }
}
