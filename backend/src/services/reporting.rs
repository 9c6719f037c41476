//! Reporting service for the dashboard summary and the delivery schedule

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{DateRange, OrderStatus, OrderView};
use sqlx::PgPool;

use crate::error::AppResult;
use crate::services::order::OrderService;

/// Days covered by the delivery schedule when no range is given
pub const DEFAULT_SCHEDULE_DAYS: u32 = 7;

/// Reporting service
#[derive(Clone)]
pub struct ReportingService {
    db: PgPool,
}

/// Stock figures across all lots
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StockSummary {
    pub lot_count: i64,
    pub seeds_sown: i64,
    pub damaged: i64,
    pub booked: i64,
    pub available: i64,
}

/// Order counts per status
#[derive(Debug, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OrderCounts {
    pub booked: i64,
    pub delivered: i64,
    pub cancelled: i64,
    /// BOOKED orders still waiting for a lot
    pub pending_lot: i64,
}

/// Money over non-cancelled orders
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSummary {
    pub total_value: Decimal,
    pub advance_collected: Decimal,
    pub outstanding_balance: Decimal,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryReport {
    pub stock: StockSummary,
    pub orders: OrderCounts,
    pub payments: PaymentSummary,
}

#[derive(Debug, Deserialize)]
pub struct ScheduleQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// Delivery schedule for a date range
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliverySchedule {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub total_quantity: i64,
    pub orders: Vec<OrderView>,
}

impl OrderCounts {
    fn from_rows(rows: &[(OrderStatus, i64)], pending_lot: i64) -> Self {
        let mut counts = OrderCounts {
            pending_lot,
            ..Default::default()
        };
        for (status, count) in rows {
            match status {
                OrderStatus::Booked => counts.booked += count,
                OrderStatus::Delivered => counts.delivered += count,
                OrderStatus::Cancelled => counts.cancelled += count,
            }
        }
        counts
    }
}

impl ReportingService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Dashboard figures, all computed from source rows at read time
    pub async fn summary(&self) -> AppResult<SummaryReport> {
        let (lot_count, seeds_sown, damaged): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   COALESCE(SUM(seeds_sown), 0)::BIGINT,
                   COALESCE(SUM(damaged), 0)::BIGINT
            FROM sowing_lots
            "#,
        )
        .fetch_one(&self.db)
        .await?;

        let booked: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(booked_qty), 0)::BIGINT FROM orders
            WHERE lot_id IS NOT NULL AND status <> 'CANCELLED'
            "#,
        )
        .fetch_one(&self.db)
        .await?;

        let status_rows: Vec<(OrderStatus, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM orders GROUP BY status")
                .fetch_all(&self.db)
                .await?;

        let pending_lot: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM orders WHERE lot_id IS NULL AND status = 'BOOKED'",
        )
        .fetch_one(&self.db)
        .await?;

        let (total_value, advance_collected): (Decimal, Decimal) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(booked_qty * unit_price - discount), 0),
                   COALESCE(SUM(advance_amount), 0)
            FROM orders
            WHERE status <> 'CANCELLED'
            "#,
        )
        .fetch_one(&self.db)
        .await?;

        let available = seeds_sown - damaged - booked;

        Ok(SummaryReport {
            stock: StockSummary {
                lot_count,
                seeds_sown,
                damaged,
                booked,
                available,
            },
            orders: OrderCounts::from_rows(&status_rows, pending_lot),
            payments: PaymentSummary {
                total_value,
                advance_collected,
                outstanding_balance: total_value - advance_collected,
            },
        })
    }

    /// Orders due for delivery between `from` and `to`. Defaults to the week from `today`.
    pub async fn delivery_schedule(
        &self,
        query: ScheduleQuery,
        today: NaiveDate,
    ) -> AppResult<DeliverySchedule> {
        let range = match (query.from, query.to) {
            (Some(from), Some(to)) => DateRange::new(from, to)?,
            (Some(from), None) => DateRange::starting(from, DEFAULT_SCHEDULE_DAYS),
            (None, Some(to)) => DateRange::new(today.min(to), to)?,
            (None, None) => DateRange::starting(today, DEFAULT_SCHEDULE_DAYS),
        };

        let orders = OrderService::new(self.db.clone())
            .due_for_delivery(&range)
            .await?;
        let total_quantity = orders.iter().map(|o| i64::from(o.order.booked_qty)).sum();

        Ok(DeliverySchedule {
            from: range.start,
            to: range.end,
            total_quantity,
            orders,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_counts_from_grouped_rows() {
        let rows = [
            (OrderStatus::Booked, 4),
            (OrderStatus::Delivered, 2),
            (OrderStatus::Cancelled, 1),
        ];
        assert_eq!(
            OrderCounts::from_rows(&rows, 3),
            OrderCounts {
                booked: 4,
                delivered: 2,
                cancelled: 1,
                pending_lot: 3,
            }
        );
    }

    #[test]
    fn test_missing_statuses_count_zero() {
        let counts = OrderCounts::from_rows(&[(OrderStatus::Delivered, 5)], 0);
        assert_eq!(counts.booked, 0);
        assert_eq!(counts.delivered, 5);
        assert_eq!(counts.cancelled, 0);
    }
}
