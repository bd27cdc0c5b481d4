use crate::{
    database::{get_db, paginate},
    error::ApiError,
    response::{PageQuery, Pagination},
    utils::{from_bson_date, parse_date, parse_end_date, sanitize, to_bson_date},
};
use chrono::{DateTime, Utc};
use mongodb::{
    bson::{doc, oid::ObjectId, DateTime as BsonDateTime, Document},
    Collection,
};
use serde::{Deserialize, Serialize};

use super::Actor;

const COLLECTION: &str = "bannermessages";

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BannerType {
    #[default]
    Info,
    Warning,
    Alert,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BannerMessage {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: BannerType,
    pub is_active: bool,
    pub priority: i32,
    pub start_date: Option<BsonDateTime>,
    pub end_date: Option<BsonDateTime>,
    pub created_by: Actor,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BannerMessageRequest {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: Option<BannerType>,
    pub is_active: Option<bool>,
    pub priority: Option<i32>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BannerMessageResponse {
    #[serde(rename = "_id")]
    pub _id: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: BannerType,
    pub is_active: bool,
    pub priority: i32,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub created_by: Actor,
    pub created_at: DateTime<Utc>,
}

impl From<BannerMessage> for BannerMessageResponse {
    fn from(banner: BannerMessage) -> Self {
        Self {
            _id: banner._id.map(|id| id.to_hex()).unwrap_or_default(),
            message: banner.message,
            kind: banner.kind,
            is_active: banner.is_active,
            priority: banner.priority,
            start_date: banner.start_date.map(from_bson_date),
            end_date: banner.end_date.map(from_bson_date),
            created_by: banner.created_by,
            created_at: from_bson_date(banner.created_at),
        }
    }
}

/// Active banners whose display window contains `now`.
pub fn active_filter(now: DateTime<Utc>) -> Document {
    let now = to_bson_date(now);
    doc! {
        "isActive": true,
        "$and": [
            { "$or": [{ "startDate": null }, { "startDate": { "$lte": now } }] },
            { "$or": [{ "endDate": null }, { "endDate": { "$gte": now } }] },
        ],
    }
}

fn collection() -> Result<Collection<BannerMessage>, ApiError> {
    Ok(get_db()?.collection::<BannerMessage>(COLLECTION))
}

impl BannerMessage {
    pub fn new(payload: BannerMessageRequest, author: Actor) -> Result<Self, ApiError> {
        let now = BsonDateTime::now();
        let mut banner = Self {
            _id: None,
            message: String::new(),
            kind: BannerType::Info,
            is_active: true,
            priority: 0,
            start_date: None,
            end_date: None,
            created_by: author,
            created_at: now,
            updated_at: now,
        };
        banner.apply(payload)?;
        Ok(banner)
    }

    pub fn apply(&mut self, payload: BannerMessageRequest) -> Result<(), ApiError> {
        let message = sanitize(&payload.message, 500);
        if message.is_empty() {
            return Err(ApiError::validation("message is required"));
        }
        let start = match payload.start_date.as_deref().filter(|v| !v.trim().is_empty()) {
            Some(start) => Some(parse_date(start)?),
            None => None,
        };
        let end = match payload.end_date.as_deref().filter(|v| !v.trim().is_empty()) {
            Some(end) => Some(parse_end_date(end)?),
            None => None,
        };
        if let (Some(start), Some(end)) = (start, end) {
            if end < start {
                return Err(ApiError::validation("endDate must not be before startDate"));
            }
        }
        self.message = message;
        self.kind = payload.kind.unwrap_or(self.kind);
        self.is_active = payload.is_active.unwrap_or(self.is_active);
        self.priority = payload.priority.unwrap_or(self.priority);
        self.start_date = start.map(to_bson_date);
        self.end_date = end.map(to_bson_date);
        self.updated_at = BsonDateTime::now();
        Ok(())
    }

    pub fn is_showing(&self, now: DateTime<Utc>) -> bool {
        self.is_active
            && self.start_date.map(|start| from_bson_date(start) <= now).unwrap_or(true)
            && self.end_date.map(|end| from_bson_date(end) >= now).unwrap_or(true)
    }

    pub async fn save(&mut self) -> Result<ObjectId, ApiError> {
        self._id = Some(ObjectId::new());
        collection()?.insert_one(&*self, None).await?;
        self._id.ok_or_else(|| ApiError::internal("INSERTING_FAILED"))
    }
    pub async fn update(&self) -> Result<ObjectId, ApiError> {
        let _id = self._id.ok_or_else(|| ApiError::internal("BANNER_WITHOUT_ID"))?;
        collection()?.replace_one(doc! { "_id": _id }, self, None).await?;
        Ok(_id)
    }
    pub async fn delete(&self) -> Result<u64, ApiError> {
        let _id = self._id.ok_or_else(|| ApiError::internal("BANNER_WITHOUT_ID"))?;
        Ok(collection()?
            .delete_one(doc! { "_id": _id }, None)
            .await?
            .deleted_count)
    }
    pub async fn find_many(page: &PageQuery) -> Result<(Vec<BannerMessageResponse>, Pagination), ApiError> {
        let sort = page.sort(&["priority", "createdAt", "startDate", "endDate"], "createdAt");
        let (banners, pagination) = paginate(&collection()?, Document::new(), sort, page).await?;
        Ok((
            banners.into_iter().map(BannerMessageResponse::from).collect(),
            pagination,
        ))
    }
    pub async fn find_active() -> Result<Vec<BannerMessageResponse>, ApiError> {
        let now = Utc::now();
        let banners = crate::database::find_capped(
            &collection()?,
            active_filter(now),
            doc! { "priority": -1, "createdAt": -1 },
            50,
        )
        .await?;
        Ok(banners
            .into_iter()
            .filter(|banner| banner.is_showing(now))
            .map(BannerMessageResponse::from)
            .collect())
    }
    pub async fn find_by_id(_id: &ObjectId) -> Result<Option<BannerMessage>, ApiError> {
        Ok(collection()?.find_one(doc! { "_id": _id }, None).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn banner(start: Option<&str>, end: Option<&str>) -> Result<BannerMessage, ApiError> {
        BannerMessage::new(
            BannerMessageRequest {
                message: "Fire drill at 14:00".to_string(),
                kind: Some(BannerType::Warning),
                is_active: None,
                priority: Some(5),
                start_date: start.map(str::to_string),
                end_date: end.map(str::to_string),
            },
            Actor {
                id: "a1".to_string(),
                name: "Admin".to_string(),
            },
        )
    }

    #[test]
    fn window_bounds_visibility() {
        let now = Utc::now();
        let open = banner(None, None).unwrap();
        assert!(open.is_showing(now));

        let mut ended = banner(None, None).unwrap();
        ended.end_date = Some(to_bson_date(now - Duration::hours(1)));
        assert!(!ended.is_showing(now));

        let mut inactive = banner(None, None).unwrap();
        inactive.is_active = false;
        assert!(!inactive.is_showing(now));
    }

    #[test]
    fn end_before_start_is_rejected() {
        assert!(banner(Some("2024-05-10"), Some("2024-05-01")).is_err());
        assert!(banner(Some("2024-05-10"), Some("2024-05-10")).is_ok());
    }

    #[test]
    fn active_filter_checks_both_bounds() {
        let filter = active_filter(Utc::now());
        assert_eq!(filter.get_bool("isActive").unwrap(), true);
        assert_eq!(filter.get_array("$and").unwrap().len(), 2);
    }
}
