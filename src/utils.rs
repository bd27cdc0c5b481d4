use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use mongodb::bson::{self, oid::ObjectId, Document};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ApiError;

static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([a-z0-9_+]([a-z0-9_+.\-]*[a-z0-9_+])?)@([a-z0-9]+([\-\.]{1}[a-z0-9]+)*\.[a-z]{2,6})$")
        .expect("email pattern is valid")
});

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_REGEX.is_match(&email.trim().to_lowercase())
}

pub fn parse_id(id: &str) -> Result<ObjectId, ApiError> {
    id.parse().map_err(|_| ApiError::validation("INVALID_ID"))
}

pub fn to_bson_date(date: DateTime<Utc>) -> bson::DateTime {
    bson::DateTime::from_millis(date.timestamp_millis())
}

pub fn from_bson_date(date: bson::DateTime) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(date.timestamp_millis())
        .single()
        .unwrap_or_default()
}

pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

/// Accepts `YYYY-MM-DD` or RFC 3339.
pub fn parse_date(value: &str) -> Result<DateTime<Utc>, ApiError> {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(start_of_day(date));
    }
    DateTime::parse_from_rfc3339(value)
        .map(|date| date.with_timezone(&Utc))
        .map_err(|_| ApiError::validation(format!("Invalid date: {value}")))
}

/// Inclusive upper bound: a plain date covers the whole day.
pub fn parse_end_date(value: &str) -> Result<DateTime<Utc>, ApiError> {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(start_of_day(date) + Duration::days(1) - Duration::milliseconds(1));
    }
    parse_date(value)
}

/// `{"$gte": start, "$lte": end}` for whichever bounds were supplied.
pub fn date_range(start: Option<&str>, end: Option<&str>) -> Result<Option<Document>, ApiError> {
    let mut range = Document::new();
    if let Some(start) = start.filter(|value| !value.trim().is_empty()) {
        range.insert("$gte", to_bson_date(parse_date(start)?));
    }
    if let Some(end) = end.filter(|value| !value.trim().is_empty()) {
        range.insert("$lte", to_bson_date(parse_end_date(end)?));
    }
    Ok(if range.is_empty() { None } else { Some(range) })
}

pub fn parse_time(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").ok()
}

/// Trims, collapses inner whitespace, drops angle brackets and caps the length.
pub fn sanitize(value: &str, max_len: usize) -> String {
    value
        .replace(['<', '>'], "")
        .split_whitespace()
        .collect::<Vec<&str>>()
        .join(" ")
        .chars()
        .take(max_len)
        .collect()
}

pub fn sanitize_opt(value: Option<&str>, max_len: usize) -> Option<String> {
    value
        .map(|value| sanitize(value, max_len))
        .filter(|value| !value.is_empty())
}

/// Adds a clause under `$and` so it cannot clobber an existing `$or`.
pub fn push_and(filter: &mut Document, clause: Document) {
    match filter.get_array_mut("$and") {
        Ok(clauses) => clauses.push(clause.into()),
        Err(_) => {
            filter.insert("$and", vec![clause]);
        }
    }
}

/// Case-insensitive exact match for free-text search fields.
pub fn exact_ci(value: &str) -> bson::Regex {
    bson::Regex {
        pattern: format!("^{}$", regex::escape(value.trim())),
        options: "i".to_string(),
    }
}

pub fn contains_ci(value: &str) -> bson::Regex {
    bson::Regex {
        pattern: regex::escape(value.trim()),
        options: "i".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_markup_and_whitespace() {
        assert_eq!(sanitize("  <b>Pump</b>\t  A  ", 200), "bPump/b A");
        assert_eq!(sanitize("abcdef", 3), "abc");
        assert_eq!(sanitize_opt(Some("   "), 10), None);
    }

    #[test]
    fn dates_accept_plain_and_rfc3339() {
        let plain = parse_date("2024-03-04").unwrap();
        let full = parse_date("2024-03-04T00:00:00Z").unwrap();
        assert_eq!(plain, full);
        assert!(parse_date("04/03/2024").is_err());
    }

    #[test]
    fn end_dates_cover_the_whole_day() {
        let end = parse_end_date("2024-03-04").unwrap();
        assert_eq!(end.to_rfc3339(), "2024-03-04T23:59:59.999+00:00");

        let range = date_range(Some("2024-03-01"), Some("2024-03-04")).unwrap().unwrap();
        assert!(range.contains_key("$gte"));
        assert!(range.contains_key("$lte"));
        assert!(date_range(None, Some(" ")).unwrap().is_none());
    }

    #[test]
    fn bson_dates_keep_millisecond_precision() {
        let now = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        assert_eq!(from_bson_date(to_bson_date(now)), now);
    }

    #[test]
    fn email_validation() {
        assert!(is_valid_email("tech.lead@plant.example.com"));
        assert!(!is_valid_email("not-an-email"));
    }

    #[test]
    fn and_clauses_accumulate() {
        let mut filter = bson::doc! { "$or": [{ "a": 1 }] };
        push_and(&mut filter, bson::doc! { "$or": [{ "b": 1 }] });
        push_and(&mut filter, bson::doc! { "c": 1 });
        assert_eq!(filter.get_array("$and").unwrap().len(), 2);
        assert!(filter.contains_key("$or"));
    }

    #[test]
    fn search_patterns_are_escaped() {
        assert_eq!(contains_ci("a.b").pattern, "a\\.b");
        assert_eq!(exact_ci(" John ").pattern, "^John$");
    }
}
