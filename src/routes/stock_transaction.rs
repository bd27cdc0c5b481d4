use actix_web::{get, post, web, HttpRequest, HttpResponse};

use crate::{
    error::ApiError,
    models::{
        role::AccessScope,
        stock_transaction::{
            StockSummaryQuery, StockTransaction, StockTransactionQuery, StockTransactionRequest,
            StockTransactionResponse,
        },
        user::current_user,
    },
    response::{created, ok, page, PageQuery},
    utils::parse_id,
};

async fn find_in_scope(transaction_id: &str, scope: &AccessScope) -> Result<StockTransaction, ApiError> {
    let transaction_id = parse_id(transaction_id)?;
    let transaction = StockTransaction::find_by_id(&transaction_id)
        .await?
        .ok_or_else(|| ApiError::not_found("TRANSACTION_NOT_FOUND"))?;
    scope.ensure(transaction.department.as_deref(), &transaction.owners())?;
    Ok(transaction)
}

#[get("/stock-transactions")]
pub async fn get_stock_transactions(
    query: web::Query<StockTransactionQuery>,
    page_query: web::Query<PageQuery>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    let (transactions, pagination) =
        StockTransaction::find_many(&query, &page_query, &AccessScope::of(&issuer)).await?;
    Ok(page("Stock transactions retrieved", transactions, pagination))
}

#[get("/stock-transactions/summary")]
pub async fn get_stock_summary(query: web::Query<StockSummaryQuery>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    let levels = StockTransaction::summary(&query, &AccessScope::of(&issuer)).await?;
    Ok(ok("Stock summary retrieved", levels))
}

#[post("/stock-transactions")]
pub async fn create_stock_transaction(
    payload: web::Json<StockTransactionRequest>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    let mut payload = payload.into_inner();
    let department = AccessScope::of(&issuer).resolve_department(payload.department.take());
    let mut transaction = StockTransaction::new(payload, issuer.actor(), department)?;
    transaction.save().await?;
    tracing::info!(
        item = %transaction.item_name,
        kind = ?transaction.transaction_type,
        quantity = transaction.quantity,
        "stock transaction recorded"
    );
    Ok(created("Stock transaction recorded", StockTransactionResponse::from(transaction)))
}

#[get("/stock-transactions/{transaction_id}")]
pub async fn get_stock_transaction(
    transaction_id: web::Path<String>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    let transaction = find_in_scope(&transaction_id, &AccessScope::of(&issuer)).await?;
    Ok(ok("Stock transaction retrieved", StockTransactionResponse::from(transaction)))
}

#[post("/stock-transactions/{transaction_id}/cancel")]
pub async fn cancel_stock_transaction(
    transaction_id: web::Path<String>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    if !issuer.role.is_privileged() {
        return Err(ApiError::forbidden("FORBIDDEN"));
    }
    let mut transaction = find_in_scope(&transaction_id, &AccessScope::of(&issuer)).await?;
    transaction.cancel(issuer.actor())?;
    transaction.update().await?;
    Ok(ok("Stock transaction cancelled", StockTransactionResponse::from(transaction)))
}
