use crate::{
    database::{get_db, paginate},
    error::ApiError,
    response::{PageQuery, Pagination},
    utils::{contains_ci, date_range, from_bson_date, push_and, sanitize, sanitize_opt},
};
use chrono::{DateTime, Utc};
use mongodb::{
    bson::{doc, oid::ObjectId, DateTime as BsonDateTime, Document},
    Collection,
};
use serde::{Deserialize, Serialize};

use super::{role::AccessScope, Actor};

const COLLECTION: &str = "feedbacks";

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackCategory {
    Bug,
    Feature,
    Improvement,
    #[default]
    General,
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackStatus {
    #[default]
    New,
    Reviewed,
    Resolved,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,
    pub category: FeedbackCategory,
    pub subject: String,
    pub message: String,
    pub rating: Option<u8>,
    pub is_anonymous: bool,
    pub submitted_by: Option<Actor>,
    pub department: Option<String>,
    pub status: FeedbackStatus,
    pub response: Option<String>,
    pub responded_by: Option<Actor>,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRequest {
    pub category: Option<FeedbackCategory>,
    pub subject: String,
    pub message: String,
    pub rating: Option<u8>,
    #[serde(default)]
    pub is_anonymous: bool,
}
#[derive(Debug, Deserialize)]
pub struct FeedbackReviewRequest {
    pub status: Option<FeedbackStatus>,
    pub response: Option<String>,
}
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackQuery {
    pub category: Option<FeedbackCategory>,
    pub status: Option<FeedbackStatus>,
    pub department: Option<String>,
    pub search: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackResponse {
    #[serde(rename = "_id")]
    pub _id: String,
    pub category: FeedbackCategory,
    pub subject: String,
    pub message: String,
    pub rating: Option<u8>,
    pub is_anonymous: bool,
    pub submitted_by: Option<Actor>,
    pub department: Option<String>,
    pub status: FeedbackStatus,
    pub response: Option<String>,
    pub responded_by: Option<Actor>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Feedback> for FeedbackResponse {
    fn from(feedback: Feedback) -> Self {
        Self {
            _id: feedback._id.map(|id| id.to_hex()).unwrap_or_default(),
            category: feedback.category,
            subject: feedback.subject,
            message: feedback.message,
            rating: feedback.rating,
            is_anonymous: feedback.is_anonymous,
            submitted_by: feedback.submitted_by,
            department: feedback.department,
            status: feedback.status,
            response: feedback.response,
            responded_by: feedback.responded_by,
            created_at: from_bson_date(feedback.created_at),
            updated_at: from_bson_date(feedback.updated_at),
        }
    }
}

impl FeedbackQuery {
    pub fn filter(&self, scope: &AccessScope) -> Result<Document, ApiError> {
        // Anonymous feedback carries no department and stays visible to every admin.
        let mut filter = if scope.is_unrestricted() {
            Document::new()
        } else {
            doc! { "$or": [
                { "department": scope.department.clone() },
                { "department": null },
            ] }
        };
        if let Some(department) = scope.department_filter(self.department.as_deref()) {
            filter.insert("department", department);
        }
        if let Some(category) = self.category {
            filter.insert("category", mongodb::bson::to_bson(&category)?);
        }
        if let Some(status) = self.status {
            filter.insert("status", mongodb::bson::to_bson(&status)?);
        }
        if let Some(search) = self.search.as_deref().filter(|v| !v.trim().is_empty()) {
            push_and(
                &mut filter,
                doc! { "$or": [
                    { "subject": contains_ci(search) },
                    { "message": contains_ci(search) },
                ] },
            );
        }
        if let Some(range) = date_range(self.start_date.as_deref(), self.end_date.as_deref())? {
            filter.insert("createdAt", range);
        }
        Ok(filter)
    }
}

fn collection() -> Result<Collection<Feedback>, ApiError> {
    Ok(get_db()?.collection::<Feedback>(COLLECTION))
}

impl Feedback {
    /// Anonymous feedback keeps neither the author nor the department.
    pub fn new(payload: FeedbackRequest, author: Actor, department: Option<String>) -> Result<Self, ApiError> {
        let subject = sanitize(&payload.subject, 200);
        let message = payload.message.trim().to_string();
        if subject.is_empty() {
            return Err(ApiError::validation("subject is required"));
        }
        if message.is_empty() || message.chars().count() > 5000 {
            return Err(ApiError::validation("message must be between 1 and 5000 characters"));
        }
        if let Some(rating) = payload.rating {
            if !(1..=5).contains(&rating) {
                return Err(ApiError::validation("rating must be between 1 and 5"));
            }
        }
        let now = BsonDateTime::now();
        let (submitted_by, department) = if payload.is_anonymous {
            (None, None)
        } else {
            (Some(author), department)
        };
        Ok(Self {
            _id: None,
            category: payload.category.unwrap_or_default(),
            subject,
            message,
            rating: payload.rating,
            is_anonymous: payload.is_anonymous,
            submitted_by,
            department,
            status: FeedbackStatus::New,
            response: None,
            responded_by: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn review(&mut self, payload: FeedbackReviewRequest, reviewer: Actor) -> Result<(), ApiError> {
        if payload.status.is_none() && payload.response.is_none() {
            return Err(ApiError::validation("status or response is required"));
        }
        if let Some(status) = payload.status {
            self.status = status;
        }
        if let Some(response) = payload.response {
            self.response = sanitize_opt(Some(&response), 2000);
            if self.status == FeedbackStatus::New {
                self.status = FeedbackStatus::Reviewed;
            }
        }
        self.responded_by = Some(reviewer);
        self.updated_at = BsonDateTime::now();
        Ok(())
    }

    pub async fn save(&mut self) -> Result<ObjectId, ApiError> {
        self._id = Some(ObjectId::new());
        collection()?.insert_one(&*self, None).await?;
        self._id.ok_or_else(|| ApiError::internal("INSERTING_FAILED"))
    }
    pub async fn update(&self) -> Result<ObjectId, ApiError> {
        let _id = self._id.ok_or_else(|| ApiError::internal("FEEDBACK_WITHOUT_ID"))?;
        collection()?.replace_one(doc! { "_id": _id }, self, None).await?;
        Ok(_id)
    }
    pub async fn find_many(
        query: &FeedbackQuery,
        page: &PageQuery,
        scope: &AccessScope,
    ) -> Result<(Vec<FeedbackResponse>, Pagination), ApiError> {
        let filter = query.filter(scope)?;
        let sort = page.sort(&["createdAt", "status", "category", "rating"], "createdAt");
        let (feedback, pagination) = paginate(&collection()?, filter, sort, page).await?;
        Ok((
            feedback.into_iter().map(FeedbackResponse::from).collect(),
            pagination,
        ))
    }
    pub async fn find_by_id(_id: &ObjectId) -> Result<Option<Feedback>, ApiError> {
        Ok(collection()?.find_one(doc! { "_id": _id }, None).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(anonymous: bool, rating: Option<u8>) -> FeedbackRequest {
        FeedbackRequest {
            category: Some(FeedbackCategory::Improvement),
            subject: "Ticket form".to_string(),
            message: "Allow attaching photos".to_string(),
            rating,
            is_anonymous: anonymous,
        }
    }

    fn author() -> Actor {
        Actor {
            id: "u1".to_string(),
            name: "Noor".to_string(),
        }
    }

    #[test]
    fn anonymous_feedback_hides_identity() {
        let feedback = Feedback::new(request(true, None), author(), Some("Ops".to_string())).unwrap();
        assert!(feedback.submitted_by.is_none());
        assert!(feedback.department.is_none());

        let named = Feedback::new(request(false, Some(4)), author(), Some("Ops".to_string())).unwrap();
        assert_eq!(named.submitted_by, Some(author()));
    }

    #[test]
    fn rating_must_be_one_to_five() {
        assert!(Feedback::new(request(false, Some(0)), author(), None).is_err());
        assert!(Feedback::new(request(false, Some(6)), author(), None).is_err());
    }

    #[test]
    fn responding_marks_new_feedback_reviewed() {
        let mut feedback = Feedback::new(request(false, None), author(), None).unwrap();
        feedback
            .review(
                FeedbackReviewRequest {
                    status: None,
                    response: Some("Planned for next release".to_string()),
                },
                author(),
            )
            .unwrap();
        assert_eq!(feedback.status, FeedbackStatus::Reviewed);
        assert!(feedback
            .review(
                FeedbackReviewRequest {
                    status: None,
                    response: None
                },
                author()
            )
            .is_err());
    }
}
