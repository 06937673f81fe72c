//! Pure conversions between SQLite rows and `ConversationRecord`.

use chrono::{DateTime, SecondsFormat, Utc};
use gemproxy_core::gemini::ChatMetadata;
use gemproxy_core::openai::ChatMessage;
use gemproxy_core::storage::{ConversationRecord, RepositoryError};
use rusqlite::Row;

/// Convert a SQLite row to a ConversationRecord.
///
/// Expected columns: hash, credential_id, model, messages, metadata,
/// created_at, updated_at
pub fn row_to_record(row: &Row) -> rusqlite::Result<ConversationRecord> {
    let hash: String = row.get(0)?;
    let credential_id: String = row.get(1)?;
    let model: String = row.get(2)?;
    let messages: String = row.get(3)?;
    let metadata: String = row.get(4)?;
    let created_at: String = row.get(5)?;
    let updated_at: String = row.get(6)?;

    Ok(ConversationRecord {
        hash,
        credential_id,
        model,
        messages: parse_json::<Vec<ChatMessage>>(3, &messages)?,
        metadata: parse_json::<ChatMetadata>(4, &metadata)?,
        created_at: parse_datetime(5, &created_at)?,
        updated_at: parse_datetime(6, &updated_at)?,
    })
}

fn parse_json<T: serde::de::DeserializeOwned>(column: usize, s: &str) -> rusqlite::Result<T> {
    serde_json::from_str(s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn parse_datetime(column: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                column,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

/// Format a timestamp for storage.
///
/// Fixed precision and a `Z` suffix keep the text sortable.
pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn to_json<T: serde::Serialize>(value: &T) -> Result<String, RepositoryError> {
    serde_json::to_string(value).map_err(|e| RepositoryError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_datetime_is_sortable() {
        let early = Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap();

        assert_eq!(format_datetime(&early), "2025-01-01T09:00:00.000000Z");
        assert!(format_datetime(&early) < format_datetime(&late));
    }

    #[test]
    fn test_parse_datetime_round_trip() {
        let dt = Utc.with_ymd_and_hms(2025, 6, 1, 12, 30, 0).unwrap();
        assert_eq!(parse_datetime(0, &format_datetime(&dt)).unwrap(), dt);
    }

    #[test]
    fn test_parse_json_reports_column() {
        let err = parse_json::<ChatMetadata>(4, "not json").unwrap_err();
        assert!(matches!(
            err,
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, _)
        ));
    }
}
