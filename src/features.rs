//! Per-customer and per-day feature aggregation.
//!
//! Both builders are pure functions over the cleaned transaction table.
//! Grouping goes through `BTreeMap` so output order, and therefore every
//! downstream computation, is deterministic for a given input.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::data::Transaction;

/// Names of the numeric feature columns, in the order used by the
/// segmentation engine and the summary tables.
pub const FEATURE_COLUMNS: [&str; 7] = [
    "purchase_cnt",
    "total_paid",
    "avg_paid",
    "avg_discount",
    "discount_usage_rate",
    "avg_app_time",
    "recency_days",
];

/// Behavioral summary for one customer. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct UserFeatures {
    pub user_id: String,
    pub purchase_cnt: u64,
    pub total_paid: f64,
    pub avg_paid: f64,
    pub avg_discount: f64,
    /// Fraction of purchases made with a nonzero discount.
    pub discount_usage_rate: f64,
    pub avg_app_time: f64,
    pub last_purchase: NaiveDate,
    /// Days between the customer's last purchase and the dataset's max date.
    pub recency_days: i64,
}

impl UserFeatures {
    /// The numeric feature vector, ordered as [`FEATURE_COLUMNS`].
    pub fn feature_row(&self) -> [f64; 7] {
        [
            self.purchase_cnt as f64,
            self.total_paid,
            self.avg_paid,
            self.avg_discount,
            self.discount_usage_rate,
            self.avg_app_time,
            self.recency_days as f64,
        ]
    }
}

/// Total revenue for one calendar day.
#[derive(Debug, Clone, PartialEq)]
pub struct DailySales {
    pub date: NaiveDate,
    pub total_paid: f64,
}

#[derive(Default)]
struct UserAccumulator {
    count: u64,
    paid_sum: f64,
    discount_sum: f64,
    discounted: u64,
    app_time_sum: f64,
    last_purchase: Option<NaiveDate>,
}

/// Aggregate transactions into one feature row per customer.
///
/// Recency is measured against the dataset's maximum date, not the wall
/// clock: customers who purchased on the latest day have recency 0.
pub fn build_user_features(transactions: &[Transaction]) -> Vec<UserFeatures> {
    let max_date = match transactions.iter().map(|tx| tx.date).max() {
        Some(date) => date,
        None => return Vec::new(),
    };

    let mut groups: BTreeMap<&str, UserAccumulator> = BTreeMap::new();
    for tx in transactions {
        let acc = groups.entry(tx.user_id.as_str()).or_default();
        acc.count += 1;
        acc.paid_sum += tx.paid_amount;
        acc.discount_sum += tx.discount_rate;
        if tx.discount_rate > 0.0 {
            acc.discounted += 1;
        }
        acc.app_time_sum += tx.app_time_min;
        acc.last_purchase = Some(match acc.last_purchase {
            Some(prev) => prev.max(tx.date),
            None => tx.date,
        });
    }

    groups
        .into_iter()
        .map(|(user_id, acc)| {
            let n = acc.count as f64;
            let last_purchase = acc.last_purchase.expect("group has at least one record");
            UserFeatures {
                user_id: user_id.to_string(),
                purchase_cnt: acc.count,
                total_paid: acc.paid_sum,
                avg_paid: acc.paid_sum / n,
                avg_discount: acc.discount_sum / n,
                discount_usage_rate: acc.discounted as f64 / n,
                avg_app_time: acc.app_time_sum / n,
                last_purchase,
                recency_days: (max_date - last_purchase).num_days(),
            }
        })
        .collect()
}

/// Aggregate transactions into total revenue per calendar day,
/// ordered by date ascending.
pub fn build_daily_sales(transactions: &[Transaction]) -> Vec<DailySales> {
    let mut totals: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for tx in transactions {
        *totals.entry(tx.date).or_insert(0.0) += tx.paid_amount;
    }

    totals
        .into_iter()
        .map(|(date, total_paid)| DailySales { date, total_paid })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(user: &str, date: (i32, u32, u32), paid: f64, discount: f64, app: f64) -> Transaction {
        Transaction {
            user_id: user.to_string(),
            date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            paid_amount: paid,
            discount_rate: discount,
            payment_method: "card".to_string(),
            app_time_min: app,
        }
    }

    #[test]
    fn test_user_aggregates() {
        let txs = vec![
            tx("a", (2024, 1, 1), 100.0, 0.0, 10.0),
            tx("a", (2024, 1, 5), 300.0, 0.5, 30.0),
            tx("b", (2024, 1, 10), 50.0, 0.2, 5.0),
        ];
        let users = build_user_features(&txs);
        assert_eq!(users.len(), 2);

        let a = &users[0];
        assert_eq!(a.user_id, "a");
        assert_eq!(a.purchase_cnt, 2);
        assert_eq!(a.total_paid, 400.0);
        assert_eq!(a.avg_paid, 200.0);
        assert_eq!(a.avg_discount, 0.25);
        assert_eq!(a.discount_usage_rate, 0.5);
        assert_eq!(a.avg_app_time, 20.0);
        assert_eq!(a.recency_days, 5);

        let b = &users[1];
        assert_eq!(b.recency_days, 0);
    }

    #[test]
    fn test_recency_zero_on_max_date_only() {
        let txs = vec![
            tx("early", (2024, 2, 1), 10.0, 0.0, 1.0),
            tx("late", (2024, 3, 1), 10.0, 0.0, 1.0),
        ];
        let users = build_user_features(&txs);
        for user in &users {
            assert!(user.recency_days >= 0);
        }
        assert_eq!(users[0].recency_days, 29);
        assert_eq!(users[1].recency_days, 0);
    }

    #[test]
    fn test_daily_sales_sum_matches_transactions() {
        let txs = vec![
            tx("a", (2024, 1, 1), 100.0, 0.0, 1.0),
            tx("b", (2024, 1, 1), 50.0, 0.0, 1.0),
            tx("a", (2024, 1, 3), 25.0, 0.0, 1.0),
        ];
        let daily = build_daily_sales(&txs);
        assert_eq!(daily.len(), 2);
        assert_eq!(daily[0].total_paid, 150.0);
        assert_eq!(daily[1].total_paid, 25.0);

        let tx_total: f64 = txs.iter().map(|t| t.paid_amount).sum();
        let daily_total: f64 = daily.iter().map(|d| d.total_paid).sum();
        assert!((tx_total - daily_total).abs() < 1e-9);
    }

    #[test]
    fn test_empty_input() {
        assert!(build_user_features(&[]).is_empty());
        assert!(build_daily_sales(&[]).is_empty());
    }

    #[test]
    fn test_feature_row_order_matches_columns() {
        let users = build_user_features(&[tx("a", (2024, 1, 1), 80.0, 0.1, 4.0)]);
        let row = users[0].feature_row();
        assert_eq!(row.len(), FEATURE_COLUMNS.len());
        assert_eq!(row[0], 1.0); // purchase_cnt
        assert_eq!(row[1], 80.0); // total_paid
        assert_eq!(row[6], 0.0); // recency_days
    }
}
