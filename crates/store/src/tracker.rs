//! PostgreSQL position tracker.
//!
//! The tracker is the system of record for opportunities, executions,
//! positions, the single-row capital status, the daily trade aggregate, and
//! the append-only audit log. Every mutation runs in one transaction that
//! also updates the capital row where capital is involved and appends one
//! audit entry; a failure anywhere rolls the whole transaction back.
//!
//! The capital row is always re-read under `SELECT ... FOR UPDATE` inside
//! the mutating transaction. No caller-supplied or cached copy is ever
//! written back, which is what lets concurrent executions race without
//! over-allocating the same capital.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::info;
use uuid::Uuid;

use arb_exec_core::{
    CapitalStatus, ExecutionRecord, Opportunity, OpportunityStatus, Position, PositionStore,
    StoreConfig,
};

use crate::models::{CapitalRow, PerformanceSummary, PositionRow};
use crate::schema::SCHEMA;

const POSITION_COLUMNS: &str = "id, execution_id, \
     leg1_venue, leg1_market_id, leg1_side, leg1_entry_price, leg1_order_id, \
     leg2_venue, leg2_market_id, leg2_side, leg2_entry_price, leg2_order_id, \
     size, total_cost, expected_payout, expected_profit, status, opened_at, resolved_at";

/// PostgreSQL-backed [`PositionStore`].
#[derive(Debug, Clone)]
pub struct PgPositionTracker {
    pool: PgPool,
}

impl PgPositionTracker {
    /// Connects to the database, bootstraps the schema, and seeds the
    /// capital row on first start.
    ///
    /// # Errors
    /// Returns an error if the connection or bootstrap fails.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await
            .context("failed to connect to position store")?;

        let tracker = Self { pool };
        tracker.init_schema().await?;
        tracker.seed_capital(config.initial_capital).await?;
        Ok(tracker)
    }

    /// Wraps an existing pool without running the bootstrap.
    #[must_use]
    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn init_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Seeds the capital row; a no-op when it already exists.
    async fn seed_capital(&self, initial_capital: Decimal) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO capital_status
                (id, total, available, allocated, reserved, open_positions, realized_profit, trade_count)
            VALUES (TRUE, $1, $1, 0, 0, 0, 0, 0)
            ON CONFLICT (id) DO NOTHING
            ",
        )
        .bind(initial_capital)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Reads the capital row under a row lock inside `tx`.
    async fn capital_for_update(tx: &mut Transaction<'_, Postgres>) -> Result<CapitalStatus> {
        let row = sqlx::query_as::<_, CapitalRow>(
            r"
            SELECT total, available, allocated, reserved, open_positions, realized_profit, trade_count
            FROM capital_status
            WHERE id
            FOR UPDATE
            ",
        )
        .fetch_one(&mut **tx)
        .await?;
        Ok(row.into_capital())
    }

    async fn write_capital(
        tx: &mut Transaction<'_, Postgres>,
        capital: &CapitalStatus,
    ) -> Result<()> {
        sqlx::query(
            r"
            UPDATE capital_status
            SET total = $1, available = $2, allocated = $3, reserved = $4,
                open_positions = $5, realized_profit = $6, trade_count = $7
            WHERE id
            ",
        )
        .bind(capital.total)
        .bind(capital.available)
        .bind(capital.allocated)
        .bind(capital.reserved)
        .bind(i32::try_from(capital.open_positions).unwrap_or(i32::MAX))
        .bind(capital.realized_profit)
        .bind(i64::try_from(capital.trade_count).unwrap_or(i64::MAX))
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Appends one audit entry inside `tx`.
    async fn audit(
        tx: &mut Transaction<'_, Postgres>,
        action: &str,
        entity_type: &str,
        entity_id: &str,
        detail: serde_json::Value,
    ) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO audit_log (action, entity_type, entity_id, at, detail)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(action)
        .bind(entity_type)
        .bind(entity_id)
        .bind(Utc::now())
        .bind(detail)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Aggregate performance over all closed trades.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn performance_summary(&self) -> Result<PerformanceSummary> {
        let (trades, wins, volume, realized_profit) =
            sqlx::query_as::<_, (i64, i64, Option<Decimal>, Option<Decimal>)>(
                r"
                SELECT COALESCE(SUM(trades), 0), COALESCE(SUM(wins), 0),
                       SUM(volume), SUM(realized_profit)
                FROM daily_trades
                ",
            )
            .fetch_one(&self.pool)
            .await?;

        Ok(PerformanceSummary {
            trades: u64::try_from(trades).unwrap_or(0),
            wins: u64::try_from(wins).unwrap_or(0),
            volume: volume.unwrap_or(Decimal::ZERO),
            realized_profit: realized_profit.unwrap_or(Decimal::ZERO),
        })
    }
}

#[async_trait]
impl PositionStore for PgPositionTracker {
    async fn track_opportunity(&self, opportunity: &Opportunity) -> Result<()> {
        let expires_at = opportunity.detected_at
            + chrono::Duration::from_std(opportunity.ttl)
                .map_err(|e| anyhow!("opportunity ttl out of range: {e}"))?;

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r"
            INSERT INTO opportunities
                (id, leg1_venue, leg1_market_id, leg1_side,
                 leg2_venue, leg2_market_id, leg2_side,
                 gross_profit_pct, net_profit_pct, total_cost, max_size,
                 confidence, status, detected_at, expires_at, detail)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            ",
        )
        .bind(opportunity.id)
        .bind(&opportunity.leg1.venue)
        .bind(&opportunity.leg1.market_id)
        .bind(opportunity.leg1.side.as_str())
        .bind(&opportunity.leg2.venue)
        .bind(&opportunity.leg2.market_id)
        .bind(opportunity.leg2.side.as_str())
        .bind(opportunity.gross_profit_pct)
        .bind(opportunity.net_profit_pct)
        .bind(opportunity.total_cost)
        .bind(opportunity.max_size)
        .bind(opportunity.confidence)
        .bind(OpportunityStatus::Detected.as_str())
        .bind(opportunity.detected_at)
        .bind(expires_at)
        .bind(serde_json::json!({
            "fees": opportunity.fees,
            "alignment": opportunity.alignment,
        }))
        .execute(&mut *tx)
        .await?;

        Self::audit(
            &mut tx,
            "track",
            "opportunity",
            &opportunity.id.to_string(),
            serde_json::json!({
                "net_profit_pct": opportunity.net_profit_pct,
                "total_cost": opportunity.total_cost,
            }),
        )
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn update_opportunity_status(&self, id: Uuid, status: OpportunityStatus) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE opportunities SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&mut *tx)
            .await?;
        Self::audit(
            &mut tx,
            "status",
            "opportunity",
            &id.to_string(),
            serde_json::json!({ "status": status.as_str() }),
        )
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn record_execution(&self, record: &ExecutionRecord) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r"
            INSERT INTO executions
                (id, opportunity_id, status, phase, leg1_order_id, leg2_order_id,
                 requested_size, actual_size, actual_cost, actual_profit,
                 error, rollback_reason, started_at, finished_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ",
        )
        .bind(record.id)
        .bind(record.opportunity_id)
        .bind(record.status.as_str())
        .bind(record.phase.as_str())
        .bind(&record.leg1_order_id)
        .bind(&record.leg2_order_id)
        .bind(record.requested_size)
        .bind(record.actual_size)
        .bind(record.actual_cost)
        .bind(record.actual_profit)
        .bind(&record.error)
        .bind(&record.rollback_reason)
        .bind(record.started_at)
        .bind(record.finished_at)
        .execute(&mut *tx)
        .await?;

        Self::audit(
            &mut tx,
            "record",
            "execution",
            &record.id.to_string(),
            serde_json::json!({
                "opportunity_id": record.opportunity_id,
                "requested_size": record.requested_size,
            }),
        )
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn update_execution(&self, record: &ExecutionRecord) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query(
            r"
            UPDATE executions
            SET status = $2, phase = $3, leg1_order_id = $4, leg2_order_id = $5,
                actual_size = $6, actual_cost = $7, actual_profit = $8,
                error = $9, rollback_reason = $10, finished_at = $11
            WHERE id = $1
            ",
        )
        .bind(record.id)
        .bind(record.status.as_str())
        .bind(record.phase.as_str())
        .bind(&record.leg1_order_id)
        .bind(&record.leg2_order_id)
        .bind(record.actual_size)
        .bind(record.actual_cost)
        .bind(record.actual_profit)
        .bind(&record.error)
        .bind(&record.rollback_reason)
        .bind(record.finished_at)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(anyhow!("unknown execution {}", record.id));
        }

        Self::audit(
            &mut tx,
            "update",
            "execution",
            &record.id.to_string(),
            serde_json::json!({
                "status": record.status.as_str(),
                "phase": record.phase.as_str(),
                "actual_size": record.actual_size,
            }),
        )
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn open_position(&self, position: &Position) -> Result<CapitalStatus> {
        let mut tx = self.pool.begin().await?;

        // Capital is re-read under lock and written back in the same
        // transaction as the position insert; the two can never diverge.
        let capital = Self::capital_for_update(&mut tx).await?;
        let capital = capital.apply_open(position.total_cost)?;
        Self::write_capital(&mut tx, &capital).await?;

        sqlx::query(&format!(
            "INSERT INTO positions ({POSITION_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)"
        ))
        .bind(position.id)
        .bind(position.execution_id)
        .bind(&position.leg1.venue)
        .bind(&position.leg1.market_id)
        .bind(position.leg1.side.as_str())
        .bind(position.leg1.entry_price)
        .bind(&position.leg1.order_id)
        .bind(&position.leg2.venue)
        .bind(&position.leg2.market_id)
        .bind(position.leg2.side.as_str())
        .bind(position.leg2.entry_price)
        .bind(&position.leg2.order_id)
        .bind(position.size)
        .bind(position.total_cost)
        .bind(position.expected_payout)
        .bind(position.expected_profit)
        .bind(position.status.as_str())
        .bind(position.opened_at)
        .bind(position.resolved_at)
        .execute(&mut *tx)
        .await?;

        Self::audit(
            &mut tx,
            "open",
            "position",
            &position.id.to_string(),
            serde_json::json!({
                "execution_id": position.execution_id,
                "size": position.size,
                "total_cost": position.total_cost,
                "available_after": capital.available,
            }),
        )
        .await?;
        tx.commit().await?;

        info!(
            position_id = %position.id,
            total_cost = %position.total_cost,
            available = %capital.available,
            allocated = %capital.allocated,
            "position opened"
        );
        Ok(capital)
    }

    async fn close_position(&self, position_id: Uuid, payout: Decimal) -> Result<CapitalStatus> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, PositionRow>(&format!(
            "SELECT {POSITION_COLUMNS} FROM positions \
             WHERE id = $1 AND status IN ('open', 'resolving') \
             FOR UPDATE"
        ))
        .bind(position_id)
        .fetch_optional(&mut *tx)
        .await?;
        let row = row.ok_or_else(|| anyhow!("no open position {position_id}"))?;

        let cost = row.total_cost;
        let profit = payout - cost;
        let resolved_at = Utc::now();

        let capital = Self::capital_for_update(&mut tx).await?;
        let capital = capital.apply_close(cost, payout)?;
        Self::write_capital(&mut tx, &capital).await?;

        sqlx::query("UPDATE positions SET status = 'resolved', resolved_at = $2 WHERE id = $1")
            .bind(position_id)
            .bind(resolved_at)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r"
            INSERT INTO daily_trades (trade_date, trades, wins, volume, realized_profit)
            VALUES ($1, 1, $2, $3, $4)
            ON CONFLICT (trade_date) DO UPDATE SET
                trades = daily_trades.trades + 1,
                wins = daily_trades.wins + EXCLUDED.wins,
                volume = daily_trades.volume + EXCLUDED.volume,
                realized_profit = daily_trades.realized_profit + EXCLUDED.realized_profit
            ",
        )
        .bind(resolved_at.date_naive())
        .bind(i32::from(profit > Decimal::ZERO))
        .bind(cost)
        .bind(profit)
        .execute(&mut *tx)
        .await?;

        Self::audit(
            &mut tx,
            "close",
            "position",
            &position_id.to_string(),
            serde_json::json!({
                "payout": payout,
                "realized_profit": profit,
                "available_after": capital.available,
            }),
        )
        .await?;
        tx.commit().await?;

        info!(
            position_id = %position_id,
            payout = %payout,
            realized_profit = %profit,
            "position closed"
        );
        Ok(capital)
    }

    async fn capital_status(&self) -> Result<CapitalStatus> {
        let row = sqlx::query_as::<_, CapitalRow>(
            r"
            SELECT total, available, allocated, reserved, open_positions, realized_profit, trade_count
            FROM capital_status
            WHERE id
            ",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into_capital())
    }

    async fn open_positions(&self) -> Result<Vec<Position>> {
        let rows = sqlx::query_as::<_, PositionRow>(&format!(
            "SELECT {POSITION_COLUMNS} FROM positions \
             WHERE status IN ('open', 'resolving') \
             ORDER BY opened_at ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PositionRow::into_position).collect()
    }

    async fn daily_deployment(&self, date: NaiveDate) -> Result<Decimal> {
        let start = date.and_time(NaiveTime::MIN).and_utc();
        let end = (date + chrono::Duration::days(1))
            .and_time(NaiveTime::MIN)
            .and_utc();

        let deployed = sqlx::query_scalar::<_, Option<Decimal>>(
            "SELECT SUM(total_cost) FROM positions WHERE opened_at >= $1 AND opened_at < $2",
        )
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;

        Ok(deployed.unwrap_or(Decimal::ZERO))
    }
}
