//! Transaction loading and cleaning.
//!
//! Reads the raw transaction CSV into typed records, repairing malformed
//! field values in place. Only records missing a date or a user identifier
//! are dropped; every other defect is coerced to a safe default so the
//! downstream aggregations never see a null.

use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use tracing::debug;

/// A cleaned transaction record.
///
/// Invariants: `user_id` is non-empty, `discount_rate` is within `[0, 1]`,
/// `paid_amount` and `app_time_min` are finite and non-negative.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub user_id: String,
    pub date: NaiveDate,
    pub paid_amount: f64,
    pub discount_rate: f64,
    pub payment_method: String,
    pub app_time_min: f64,
}

/// Raw CSV row before cleaning. Every field is optional so a defective cell
/// never aborts the load; the repair rules decide what survives.
#[derive(Debug, Deserialize)]
struct RawRecord {
    user_id: Option<String>,
    date: Option<String>,
    paid_amount: Option<String>,
    discount_rate: Option<String>,
    payment_method: Option<String>,
    app_time_min: Option<String>,
}

/// Sentinel for missing or blank payment methods.
const UNKNOWN_PAYMENT: &str = "Unknown";

/// Load transactions from a CSV file and clean them.
///
/// # Arguments
/// * `path` - Path to the input CSV file
///
/// # Returns
/// Cleaned records sorted by date ascending. Fails fast if the file does not
/// exist so the pipeline aborts before any computation.
pub fn load_transactions<P: AsRef<Path>>(path: P) -> crate::Result<Vec<Transaction>> {
    let path = path.as_ref();
    if !path.exists() {
        anyhow::bail!("input file not found: {}", path.display());
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)?;

    let mut transactions = Vec::new();
    let mut dropped = 0usize;
    for row in reader.deserialize::<RawRecord>() {
        // Structurally broken rows are treated like rows with missing
        // identifiers: dropped, not fatal.
        let raw = match row {
            Ok(raw) => raw,
            Err(_) => {
                dropped += 1;
                continue;
            }
        };
        match clean_record(raw) {
            Some(tx) => transactions.push(tx),
            None => dropped += 1,
        }
    }

    // Stable sort keeps same-day records in file order.
    transactions.sort_by_key(|tx| tx.date);

    debug!(
        kept = transactions.len(),
        dropped, "transaction cleaning finished"
    );
    Ok(transactions)
}

/// Apply the repair rules to one raw row.
///
/// Returns `None` when the row has no usable date or user identifier.
fn clean_record(raw: RawRecord) -> Option<Transaction> {
    let date = raw.date.as_deref().and_then(parse_date)?;

    let user_id = raw.user_id.map(|id| id.trim().to_string())?;
    if user_id.is_empty() {
        return None;
    }

    let payment_method = match raw.payment_method {
        Some(ref method) if !method.trim().is_empty() => method.trim().to_string(),
        _ => UNKNOWN_PAYMENT.to_string(),
    };

    let discount_rate = parse_numeric(raw.discount_rate).clamp(0.0, 1.0);
    let paid_amount = parse_numeric(raw.paid_amount).max(0.0);
    let app_time_min = parse_numeric(raw.app_time_min).max(0.0);

    Some(Transaction {
        user_id,
        date,
        paid_amount,
        discount_rate,
        payment_method,
        app_time_min,
    })
}

/// Parse a date or datetime cell, discarding the time component.
fn parse_date(value: &str) -> Option<NaiveDate> {
    const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];
    const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];

    let value = value.trim();
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt.date());
        }
    }
    for format in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(value, format) {
            return Some(d);
        }
    }
    None
}

/// Coerce a numeric cell, defaulting unparseable or non-finite values to zero.
fn parse_numeric(value: Option<String>) -> f64 {
    value
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(rows: &[&str]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "user_id,date,paid_amount,discount_rate,payment_method,app_time_min"
        )
        .unwrap();
        for row in rows {
            writeln!(file, "{row}").unwrap();
        }
        file
    }

    #[test]
    fn test_missing_input_file() {
        let result = load_transactions("definitely/not/here.csv");
        assert!(result.is_err());
    }

    #[test]
    fn test_rows_without_date_or_user_are_dropped() {
        let file = write_csv(&[
            "u1,2024-01-03,1000,0.1,card,12.5",
            ",2024-01-04,500,0.0,card,3.0",
            "u2,not-a-date,500,0.0,card,3.0",
            "u3,2024-01-05,700,0.2,cash,8.0",
        ]);
        let txs = load_transactions(file.path()).unwrap();
        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].user_id, "u1");
        assert_eq!(txs[1].user_id, "u3");
    }

    #[test]
    fn test_malformed_fields_are_repaired() {
        let file = write_csv(&[
            "u1,2024-01-03,abc,1.7,,xyz",
            "u2,2024-01-04,-50,-0.3,  ,10",
        ]);
        let txs = load_transactions(file.path()).unwrap();

        assert_eq!(txs[0].paid_amount, 0.0);
        assert_eq!(txs[0].discount_rate, 1.0);
        assert_eq!(txs[0].payment_method, "Unknown");
        assert_eq!(txs[0].app_time_min, 0.0);

        assert_eq!(txs[1].paid_amount, 0.0);
        assert_eq!(txs[1].discount_rate, 0.0);
        assert_eq!(txs[1].payment_method, "Unknown");
    }

    #[test]
    fn test_cleaned_invariants_hold() {
        let file = write_csv(&[
            "u1,2024-01-03 14:20:11,1000,0.15,card,12.5",
            "u2,2024-01-01,NaN,inf,card,-4",
            "u3,2024/01/02,250.5,0.999,transfer,",
        ]);
        let txs = load_transactions(file.path()).unwrap();
        assert_eq!(txs.len(), 3);
        for tx in &txs {
            assert!(!tx.user_id.is_empty());
            assert!((0.0..=1.0).contains(&tx.discount_rate));
            assert!(tx.paid_amount >= 0.0 && tx.paid_amount.is_finite());
            assert!(tx.app_time_min >= 0.0 && tx.app_time_min.is_finite());
        }
    }

    #[test]
    fn test_sorted_by_date_ascending() {
        let file = write_csv(&[
            "u1,2024-02-10,10,0,card,1",
            "u2,2024-01-05,20,0,card,1",
            "u3,2024-01-20T09:30:00,30,0,card,1",
        ]);
        let txs = load_transactions(file.path()).unwrap();
        let dates: Vec<NaiveDate> = txs.iter().map(|tx| tx.date).collect();
        let mut sorted = dates.clone();
        sorted.sort();
        assert_eq!(dates, sorted);
        assert_eq!(txs[0].user_id, "u2");
    }

    #[test]
    fn test_datetime_cell_truncates_to_date() {
        let file = write_csv(&["u1,2024-03-07 23:59:59,10,0,card,1"]);
        let txs = load_transactions(file.path()).unwrap();
        assert_eq!(txs[0].date, NaiveDate::from_ymd_opt(2024, 3, 7).unwrap());
    }
}
