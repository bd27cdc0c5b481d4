use crate::{
    database::{get_db, paginate},
    error::ApiError,
    response::{PageQuery, Pagination},
    utils::{contains_ci, date_range, exact_ci, from_bson_date, sanitize, sanitize_opt},
};
use chrono::{DateTime, Utc};
use futures::stream::TryStreamExt;
use mongodb::{
    bson::{doc, from_document, oid::ObjectId, DateTime as BsonDateTime, Document},
    Collection,
};
use serde::{Deserialize, Serialize};

use super::{role::AccessScope, Actor};

const COLLECTION: &str = "stocktransactions";
const OWNER_FIELDS: [&str; 1] = ["createdBy.id"];

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    In,
    Out,
    Adjustment,
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    #[default]
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockTransaction {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,
    pub item_name: String,
    pub item_code: Option<String>,
    pub transaction_type: TransactionType,
    pub quantity: f64,
    pub unit: String,
    pub reason: Option<String>,
    pub reference_number: Option<String>,
    pub department: Option<String>,
    pub created_by: Actor,
    pub status: TransactionStatus,
    pub cancelled_by: Option<Actor>,
    pub cancelled_at: Option<BsonDateTime>,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockTransactionRequest {
    pub item_name: String,
    pub item_code: Option<String>,
    pub transaction_type: TransactionType,
    pub quantity: f64,
    pub unit: Option<String>,
    pub reason: Option<String>,
    pub reference_number: Option<String>,
    pub department: Option<String>,
}
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockTransactionQuery {
    pub transaction_type: Option<TransactionType>,
    pub item_name: Option<String>,
    pub status: Option<TransactionStatus>,
    pub department: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockSummaryQuery {
    pub item_name: Option<String>,
    pub department: Option<String>,
}
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockTransactionResponse {
    #[serde(rename = "_id")]
    pub _id: String,
    pub item_name: String,
    pub item_code: Option<String>,
    pub transaction_type: TransactionType,
    pub quantity: f64,
    pub net_effect: f64,
    pub unit: String,
    pub reason: Option<String>,
    pub reference_number: Option<String>,
    pub department: Option<String>,
    pub created_by: Actor,
    pub status: TransactionStatus,
    pub cancelled_by: Option<Actor>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
#[derive(Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StockLevel {
    pub item_name: String,
    pub unit: Option<String>,
    pub total_in: f64,
    pub total_out: f64,
    pub net_quantity: f64,
    pub transactions: i64,
}

impl From<StockTransaction> for StockTransactionResponse {
    fn from(transaction: StockTransaction) -> Self {
        Self {
            _id: transaction._id.map(|id| id.to_hex()).unwrap_or_default(),
            item_name: transaction.item_name,
            item_code: transaction.item_code,
            transaction_type: transaction.transaction_type,
            quantity: transaction.quantity,
            net_effect: match transaction.status {
                TransactionStatus::Completed => signed_quantity(transaction.transaction_type, transaction.quantity),
                TransactionStatus::Cancelled => 0.0,
            },
            unit: transaction.unit,
            reason: transaction.reason,
            reference_number: transaction.reference_number,
            department: transaction.department,
            created_by: transaction.created_by,
            status: transaction.status,
            cancelled_by: transaction.cancelled_by,
            cancelled_at: transaction.cancelled_at.map(from_bson_date),
            created_at: from_bson_date(transaction.created_at),
        }
    }
}

impl StockTransactionQuery {
    pub fn filter(&self, scope: &AccessScope) -> Result<Document, ApiError> {
        let mut filter = scope.filter("department", &OWNER_FIELDS);
        if let Some(department) = scope.department_filter(self.department.as_deref()) {
            filter.insert("department", department);
        }
        if let Some(kind) = self.transaction_type {
            filter.insert("transactionType", mongodb::bson::to_bson(&kind)?);
        }
        if let Some(status) = self.status {
            filter.insert("status", mongodb::bson::to_bson(&status)?);
        }
        if let Some(item_name) = self.item_name.as_deref().filter(|v| !v.trim().is_empty()) {
            filter.insert("itemName", contains_ci(item_name));
        }
        if let Some(range) = date_range(self.start_date.as_deref(), self.end_date.as_deref())? {
            filter.insert("createdAt", range);
        }
        Ok(filter)
    }
}

impl StockSummaryQuery {
    /// Groups completed transactions per item; outgoing quantities count
    /// negative, adjustments keep their sign.
    pub fn pipeline(&self, scope: &AccessScope) -> Vec<Document> {
        let mut filter = scope.filter("department", &OWNER_FIELDS);
        if let Some(department) = scope.department_filter(self.department.as_deref()) {
            filter.insert("department", department);
        }
        filter.insert("status", "completed");
        if let Some(item_name) = self.item_name.as_deref().filter(|v| !v.trim().is_empty()) {
            filter.insert("itemName", exact_ci(item_name));
        }
        vec![
            doc! { "$match": filter },
            doc! {
                "$group": {
                    "_id": "$itemName",
                    "unit": { "$last": "$unit" },
                    "totalIn": { "$sum": {
                        "$cond": [{ "$eq": ["$transactionType", "in"] }, "$quantity", 0]
                    } },
                    "totalOut": { "$sum": {
                        "$cond": [{ "$eq": ["$transactionType", "out"] }, "$quantity", 0]
                    } },
                    "netQuantity": { "$sum": {
                        "$cond": [
                            { "$eq": ["$transactionType", "out"] },
                            { "$multiply": ["$quantity", -1] },
                            "$quantity",
                        ]
                    } },
                    "transactions": { "$sum": 1_i64 },
                }
            },
            doc! {
                "$project": {
                    "_id": 0,
                    "itemName": "$_id",
                    "unit": 1,
                    "totalIn": { "$toDouble": "$totalIn" },
                    "totalOut": { "$toDouble": "$totalOut" },
                    "netQuantity": { "$toDouble": "$netQuantity" },
                    "transactions": { "$toLong": "$transactions" },
                }
            },
            doc! { "$sort": { "itemName": 1 } },
        ]
    }
}

/// Stock effect of one transaction.
pub fn signed_quantity(kind: TransactionType, quantity: f64) -> f64 {
    match kind {
        TransactionType::Out => -quantity,
        TransactionType::In | TransactionType::Adjustment => quantity,
    }
}

fn collection() -> Result<Collection<StockTransaction>, ApiError> {
    Ok(get_db()?.collection::<StockTransaction>(COLLECTION))
}

impl StockTransaction {
    pub fn new(payload: StockTransactionRequest, author: Actor, department: Option<String>) -> Result<Self, ApiError> {
        let item_name = sanitize(&payload.item_name, 200);
        if item_name.is_empty() {
            return Err(ApiError::validation("itemName is required"));
        }
        if !payload.quantity.is_finite() {
            return Err(ApiError::validation("quantity must be a number"));
        }
        match payload.transaction_type {
            TransactionType::Adjustment if payload.quantity == 0.0 => {
                return Err(ApiError::validation("adjustment quantity cannot be zero"));
            }
            TransactionType::In | TransactionType::Out if payload.quantity <= 0.0 => {
                return Err(ApiError::validation("quantity must be greater than zero"));
            }
            _ => {}
        }
        let now = BsonDateTime::now();
        Ok(Self {
            _id: None,
            item_name,
            item_code: sanitize_opt(payload.item_code.as_deref(), 50),
            transaction_type: payload.transaction_type,
            quantity: payload.quantity,
            unit: sanitize_opt(payload.unit.as_deref(), 20).unwrap_or_else(|| "pcs".to_string()),
            reason: sanitize_opt(payload.reason.as_deref(), 1000),
            reference_number: sanitize_opt(payload.reference_number.as_deref(), 100),
            department,
            created_by: author,
            status: TransactionStatus::Completed,
            cancelled_by: None,
            cancelled_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn cancel(&mut self, actor: Actor) -> Result<(), ApiError> {
        if self.status == TransactionStatus::Cancelled {
            return Err(ApiError::conflict("TRANSACTION_ALREADY_CANCELLED"));
        }
        let now = BsonDateTime::now();
        self.status = TransactionStatus::Cancelled;
        self.cancelled_by = Some(actor);
        self.cancelled_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn owners(&self) -> [Option<&str>; 1] {
        [Some(self.created_by.id.as_str())]
    }

    pub async fn save(&mut self) -> Result<ObjectId, ApiError> {
        self._id = Some(ObjectId::new());
        collection()?.insert_one(&*self, None).await?;
        self._id.ok_or_else(|| ApiError::internal("INSERTING_FAILED"))
    }
    pub async fn update(&self) -> Result<ObjectId, ApiError> {
        let _id = self._id.ok_or_else(|| ApiError::internal("TRANSACTION_WITHOUT_ID"))?;
        collection()?.replace_one(doc! { "_id": _id }, self, None).await?;
        Ok(_id)
    }
    pub async fn find_many(
        query: &StockTransactionQuery,
        page: &PageQuery,
        scope: &AccessScope,
    ) -> Result<(Vec<StockTransactionResponse>, Pagination), ApiError> {
        let filter = query.filter(scope)?;
        let sort = page.sort(&["createdAt", "itemName", "quantity", "transactionType"], "createdAt");
        let (transactions, pagination) = paginate(&collection()?, filter, sort, page).await?;
        Ok((
            transactions.into_iter().map(StockTransactionResponse::from).collect(),
            pagination,
        ))
    }
    pub async fn find_by_id(_id: &ObjectId) -> Result<Option<StockTransaction>, ApiError> {
        Ok(collection()?.find_one(doc! { "_id": _id }, None).await?)
    }
    pub async fn summary(query: &StockSummaryQuery, scope: &AccessScope) -> Result<Vec<StockLevel>, ApiError> {
        let mut cursor = collection()?.aggregate(query.pipeline(scope), None).await?;
        let mut levels = Vec::new();
        while let Some(document) = cursor.try_next().await? {
            levels.push(from_document::<StockLevel>(document)?);
        }
        Ok(levels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::role::UserRole;

    fn request(kind: TransactionType, quantity: f64) -> StockTransactionRequest {
        StockTransactionRequest {
            item_name: "Bearing 6204".to_string(),
            item_code: Some("BRG-6204".to_string()),
            transaction_type: kind,
            quantity,
            unit: None,
            reason: None,
            reference_number: None,
            department: None,
        }
    }

    fn author() -> Actor {
        Actor {
            id: "u1".to_string(),
            name: "Storekeeper".to_string(),
        }
    }

    #[test]
    fn quantities_are_validated_by_type() {
        assert!(StockTransaction::new(request(TransactionType::In, 5.0), author(), None).is_ok());
        assert!(StockTransaction::new(request(TransactionType::Out, 0.0), author(), None).is_err());
        assert!(StockTransaction::new(request(TransactionType::Out, -2.0), author(), None).is_err());
        assert!(StockTransaction::new(request(TransactionType::Adjustment, -2.0), author(), None).is_ok());
        assert!(StockTransaction::new(request(TransactionType::Adjustment, 0.0), author(), None).is_err());
    }

    #[test]
    fn cancelling_twice_conflicts() {
        let mut transaction = StockTransaction::new(request(TransactionType::In, 5.0), author(), None).unwrap();
        transaction.cancel(author()).unwrap();
        assert_eq!(transaction.status, TransactionStatus::Cancelled);
        assert!(matches!(transaction.cancel(author()), Err(ApiError::Conflict(_))));
    }

    #[test]
    fn net_quantity_sign_follows_type() {
        let net: f64 = [
            (TransactionType::In, 10.0),
            (TransactionType::Out, 4.0),
            (TransactionType::Adjustment, -1.0),
        ]
        .into_iter()
        .map(|(kind, quantity)| signed_quantity(kind, quantity))
        .sum();
        assert_eq!(net, 5.0);
    }

    #[test]
    fn summary_excludes_cancelled_and_respects_scope() {
        let scope = AccessScope {
            role: UserRole::Manager,
            department: Some("Stores".to_string()),
            user_id: "u1".to_string(),
            employee_id: None,
        };
        let pipeline = StockSummaryQuery {
            item_name: Some("bearing 6204".to_string()),
            department: Some("Ops".to_string()),
        }
        .pipeline(&scope);
        let matched = pipeline[0].get_document("$match").unwrap();
        assert_eq!(matched.get_str("status").unwrap(), "completed");
        assert_eq!(matched.get_str("department").unwrap(), "Stores");
        assert!(matched.contains_key("itemName"));
    }
}
