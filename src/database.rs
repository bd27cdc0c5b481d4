use futures::stream::{StreamExt, TryStreamExt};
use mongodb::{
    bson::{doc, from_document, Bson, Document},
    options::{ClientOptions, FindOptions},
    Client, Collection, Database,
};
use once_cell::sync::OnceCell;
use serde::de::DeserializeOwned;

use crate::{
    error::ApiError,
    response::{PageQuery, Pagination},
};

static DB: OnceCell<Database> = OnceCell::new();

pub async fn connect(uri: &str, name: &str) -> Result<(), mongodb::error::Error> {
    let mut options = ClientOptions::parse(uri).await?;
    options.app_name = Some("cmms-server".to_string());
    let client = Client::with_options(options)?;
    let _ = DB.set(client.database(name));
    Ok(())
}

pub fn get_db() -> Result<Database, ApiError> {
    DB.get()
        .cloned()
        .ok_or_else(|| ApiError::internal("DATABASE_NOT_AVAILABLE"))
}

pub async fn ping() -> bool {
    match get_db() {
        Ok(db) => db.run_command(doc! { "ping": 1 }, None).await.is_ok(),
        Err(_) => false,
    }
}

/// Runs `$match` + `$sort` + `$facet` so one round trip yields the page and the total.
pub async fn paginate<T>(
    collection: &Collection<T>,
    filter: Document,
    sort: Document,
    query: &PageQuery,
) -> Result<(Vec<T>, Pagination), ApiError>
where
    T: DeserializeOwned,
{
    let pipeline: Vec<Document> = vec![
        doc! { "$match": filter },
        doc! { "$sort": sort },
        doc! {
            "$facet": {
                "data": [
                    { "$skip": query.skip() },
                    { "$limit": query.limit() as i64 },
                ],
                "total": [{ "$count": "count" }],
            }
        },
    ];

    let mut cursor = collection.aggregate(pipeline, None).await?;
    let facet = match cursor.next().await {
        Some(facet) => facet?,
        None => Document::new(),
    };

    let mut items: Vec<T> = Vec::new();
    if let Ok(data) = facet.get_array("data") {
        for item in data {
            if let Bson::Document(item) = item {
                items.push(from_document::<T>(item.clone())?);
            }
        }
    }
    let total = facet
        .get_array("total")
        .ok()
        .and_then(|total| total.first())
        .and_then(Bson::as_document)
        .map(count_of)
        .unwrap_or(0);

    Ok((items, Pagination::new(query.page(), query.limit(), total)))
}

/// Sorted, capped `find` used by the aggregation endpoints.
pub async fn find_capped<T>(
    collection: &Collection<T>,
    filter: Document,
    sort: Document,
    limit: i64,
) -> Result<Vec<T>, ApiError>
where
    T: DeserializeOwned + Unpin + Send + Sync,
{
    let options = FindOptions::builder().sort(sort).limit(limit).build();
    let cursor = collection.find(filter, options).await?;
    Ok(cursor.try_collect().await?)
}

fn count_of(document: &Document) -> u64 {
    match document.get("count") {
        Some(Bson::Int32(count)) => *count as u64,
        Some(Bson::Int64(count)) => *count as u64,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_reads_both_integer_widths() {
        assert_eq!(count_of(&doc! { "count": 7_i32 }), 7);
        assert_eq!(count_of(&doc! { "count": 9_i64 }), 9);
        assert_eq!(count_of(&doc! {}), 0);
    }
}
