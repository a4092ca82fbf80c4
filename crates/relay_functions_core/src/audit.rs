use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use crate::contract::ValidationError;

pub const AUDIT_QUERY: &str = "General | where RecordType in ('93','94','95','96','97') | project CreationTime, LocalCreateTime = datetime_add('hour',8,CreationTime),Operation,RecordType,Workload,UserId,ClientIP| order by CreationTime asc";

pub const AUDIT_COLUMNS: [&str; 7] = [
    "CreationTime",
    "LocalCreateTime",
    "Operation",
    "RecordType",
    "Workload",
    "UserId",
    "ClientIP",
];

/// Checks that a result table leads with the audit columns, in order.
pub fn check_columns(columns: &[String]) -> Result<(), ValidationError> {
    let leading = columns.iter().take(AUDIT_COLUMNS.len()).map(String::as_str);
    if leading.eq(AUDIT_COLUMNS) {
        return Ok(());
    }
    Err(ValidationError::new(format!(
        "Audit query returned columns [{}], expected [{}]",
        columns.join(", "),
        AUDIT_COLUMNS.join(", ")
    )))
}

/// One row of the audit query, read positionally in `AUDIT_COLUMNS` order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    pub creation_time: DateTime<Utc>,
    pub local_create_time: DateTime<Utc>,
    pub operation: String,
    pub record_type: String,
    pub workload: String,
    pub user_id: String,
    pub client_ip: String,
}

impl AuditRecord {
    pub fn from_row(row: &[Value]) -> Result<Self, ValidationError> {
        if row.len() < AUDIT_COLUMNS.len() {
            return Err(ValidationError::new(format!(
                "Audit row has {} columns, expected {}",
                row.len(),
                AUDIT_COLUMNS.len()
            )));
        }

        Ok(Self {
            creation_time: datetime_column(row, 0)?,
            local_create_time: datetime_column(row, 1)?,
            operation: string_column(row, 2)?,
            record_type: record_type_column(row, 3)?,
            workload: string_column(row, 4)?,
            user_id: string_column(row, 5)?,
            client_ip: string_column(row, 6)?,
        })
    }

    /// Comma-delimited event body. Fields are not quoted or escaped.
    pub fn to_event_line(&self) -> String {
        format!(
            "{},{},{},{},{},{},{}",
            format_time(&self.creation_time),
            format_time(&self.local_create_time),
            self.operation,
            self.record_type,
            self.workload,
            self.user_id,
            self.client_ip
        )
    }
}

fn format_time(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn datetime_column(row: &[Value], index: usize) -> Result<DateTime<Utc>, ValidationError> {
    let name = AUDIT_COLUMNS[index];
    let Some(raw) = row[index].as_str() else {
        return Err(ValidationError::new(format!(
            "Column '{name}' must be a datetime string"
        )));
    };

    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| ValidationError::new(format!("Column '{name}' is not a datetime: {error}")))
}

fn string_column(row: &[Value], index: usize) -> Result<String, ValidationError> {
    match &row[index] {
        Value::Null => Ok(String::new()),
        Value::String(value) => Ok(value.clone()),
        _ => Err(ValidationError::new(format!(
            "Column '{}' must be a string",
            AUDIT_COLUMNS[index]
        ))),
    }
}

fn record_type_column(row: &[Value], index: usize) -> Result<String, ValidationError> {
    let name = AUDIT_COLUMNS[index];
    let parsed = match &row[index] {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    };

    let value = parsed
        .and_then(|value| i32::try_from(value).ok())
        .ok_or_else(|| ValidationError::new(format!("Column '{name}' must be a 32-bit integer")))?;
    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn sample_row() -> Vec<Value> {
        vec![
            json!("2024-03-01T01:02:03Z"),
            json!("2024-03-01T09:02:03Z"),
            json!("FileAccessed"),
            json!(94),
            json!("SharePoint"),
            json!("ada@example.com"),
            json!("10.0.0.7"),
        ]
    }

    #[test]
    fn maps_row_into_event_line() {
        let record = AuditRecord::from_row(&sample_row()).expect("row should map");
        assert_eq!(
            record.to_event_line(),
            "2024-03-01T01:02:03Z,2024-03-01T09:02:03Z,FileAccessed,94,SharePoint,ada@example.com,10.0.0.7"
        );
    }

    #[test]
    fn keeps_fractional_seconds() {
        let mut row = sample_row();
        row[0] = json!("2024-03-01T01:02:03.250Z");
        let record = AuditRecord::from_row(&row).expect("row should map");
        assert!(record
            .to_event_line()
            .starts_with("2024-03-01T01:02:03.250Z,"));
    }

    #[test]
    fn accepts_record_type_as_string() {
        let mut row = sample_row();
        row[3] = json!("95");
        let record = AuditRecord::from_row(&row).expect("row should map");
        assert_eq!(record.record_type, "95");
    }

    #[test]
    fn null_strings_become_empty_fields() {
        let mut row = sample_row();
        row[6] = Value::Null;
        let record = AuditRecord::from_row(&row).expect("row should map");
        assert!(record.to_event_line().ends_with("ada@example.com,"));
    }

    #[test]
    fn rejects_short_rows() {
        let error = AuditRecord::from_row(&sample_row()[..3]).expect_err("short row should fail");
        assert_eq!(error.message(), "Audit row has 3 columns, expected 7");
    }

    #[test]
    fn accepts_audit_columns_with_trailing_extras() {
        let mut columns: Vec<String> = AUDIT_COLUMNS.iter().map(|name| name.to_string()).collect();
        assert!(check_columns(&columns).is_ok());
        columns.push("Extra".to_string());
        assert!(check_columns(&columns).is_ok());
    }

    #[test]
    fn rejects_reordered_or_missing_columns() {
        let mut columns: Vec<String> = AUDIT_COLUMNS.iter().map(|name| name.to_string()).collect();
        columns.swap(2, 4);
        let error = check_columns(&columns).expect_err("reordered columns should fail");
        assert!(error
            .message()
            .starts_with("Audit query returned columns [CreationTime, LocalCreateTime, Workload,"));

        assert!(check_columns(&[]).is_err());
    }

    #[test]
    fn rejects_non_datetime_creation_time() {
        let mut row = sample_row();
        row[0] = json!(12);
        let error = AuditRecord::from_row(&row).expect_err("bad datetime should fail");
        assert!(error.message().contains("CreationTime"));
    }

    #[test]
    fn rejects_record_type_outside_i32() {
        let mut row = sample_row();
        row[3] = json!(i64::from(i32::MAX) + 1);
        assert!(AuditRecord::from_row(&row).is_err());
    }
}
