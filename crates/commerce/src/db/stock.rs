//! Per-row stock updates inside an order transaction.

use chrono::Utc;
use sqlx::PgConnection;

use super::RepositoryError;
use super::products::stock_to_db;
use crate::ledger::{StockAdjustment, StockLine, StockMovement, StockReport};

/// Apply `movement` to every line, locking each product row in id order.
///
/// Missing products (deleted since the order was placed) are counted in
/// [`StockReport::skipped`] and otherwise ignored.
pub(super) async fn apply_movement(
    conn: &mut PgConnection,
    movement: StockMovement,
    lines: &[StockLine],
) -> Result<StockReport, RepositoryError> {
    let mut report = StockReport::default();

    for line in lines {
        let current: Option<i32> =
            sqlx::query_scalar("SELECT stock FROM product WHERE id = $1 FOR UPDATE")
                .bind(line.product_id)
                .fetch_optional(&mut *conn)
                .await?;

        let Some(current) = current else {
            report.skipped += 1;
            continue;
        };
        let before = u32::try_from(current).map_err(|_| {
            RepositoryError::DataCorruption(format!("negative stock for product {}", line.product_id))
        })?;

        let adjustment = StockAdjustment::compute(movement, *line, before);
        sqlx::query("UPDATE product SET stock = $2, updated_at = $3 WHERE id = $1")
            .bind(line.product_id)
            .bind(stock_to_db(adjustment.after))
            .bind(Utc::now())
            .execute(&mut *conn)
            .await?;

        report.adjustments.push(adjustment);
    }

    Ok(report)
}
