//! Relational schema owned by the position tracker.
//!
//! Money columns are `NUMERIC` (exact decimal, never floating point) and
//! all timestamps are `TIMESTAMPTZ`. The statements are idempotent and run
//! at connect time.

/// Bootstrap statements, applied in order.
pub const SCHEMA: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS opportunities (
        id               UUID PRIMARY KEY,
        leg1_venue       TEXT NOT NULL,
        leg1_market_id   TEXT NOT NULL,
        leg1_side        TEXT NOT NULL,
        leg2_venue       TEXT NOT NULL,
        leg2_market_id   TEXT NOT NULL,
        leg2_side        TEXT NOT NULL,
        gross_profit_pct NUMERIC NOT NULL,
        net_profit_pct   NUMERIC NOT NULL,
        total_cost       NUMERIC NOT NULL,
        max_size         NUMERIC NOT NULL,
        confidence       DOUBLE PRECISION NOT NULL,
        status           TEXT NOT NULL,
        detected_at      TIMESTAMPTZ NOT NULL,
        expires_at       TIMESTAMPTZ NOT NULL,
        detail           JSONB
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS executions (
        id              UUID PRIMARY KEY,
        opportunity_id  UUID NOT NULL,
        status          TEXT NOT NULL,
        phase           TEXT NOT NULL,
        leg1_order_id   TEXT,
        leg2_order_id   TEXT,
        requested_size  NUMERIC NOT NULL,
        actual_size     NUMERIC NOT NULL,
        actual_cost     NUMERIC NOT NULL,
        actual_profit   NUMERIC NOT NULL,
        error           TEXT,
        rollback_reason TEXT,
        started_at      TIMESTAMPTZ NOT NULL,
        finished_at     TIMESTAMPTZ
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS positions (
        id               UUID PRIMARY KEY,
        execution_id     UUID NOT NULL,
        leg1_venue       TEXT NOT NULL,
        leg1_market_id   TEXT NOT NULL,
        leg1_side        TEXT NOT NULL,
        leg1_entry_price NUMERIC NOT NULL,
        leg1_order_id    TEXT NOT NULL,
        leg2_venue       TEXT NOT NULL,
        leg2_market_id   TEXT NOT NULL,
        leg2_side        TEXT NOT NULL,
        leg2_entry_price NUMERIC NOT NULL,
        leg2_order_id    TEXT NOT NULL,
        size             NUMERIC NOT NULL,
        total_cost       NUMERIC NOT NULL,
        expected_payout  NUMERIC NOT NULL,
        expected_profit  NUMERIC NOT NULL,
        status           TEXT NOT NULL,
        opened_at        TIMESTAMPTZ NOT NULL,
        resolved_at      TIMESTAMPTZ
    )
    ",
    // Single-row table: the boolean primary key can only ever be TRUE.
    r"
    CREATE TABLE IF NOT EXISTS capital_status (
        id              BOOLEAN PRIMARY KEY DEFAULT TRUE CHECK (id),
        total           NUMERIC NOT NULL,
        available       NUMERIC NOT NULL,
        allocated       NUMERIC NOT NULL,
        reserved        NUMERIC NOT NULL,
        open_positions  INTEGER NOT NULL,
        realized_profit NUMERIC NOT NULL,
        trade_count     BIGINT NOT NULL
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS daily_trades (
        trade_date      DATE PRIMARY KEY,
        trades          INTEGER NOT NULL,
        wins            INTEGER NOT NULL,
        volume          NUMERIC NOT NULL,
        realized_profit NUMERIC NOT NULL
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS audit_log (
        id          BIGSERIAL PRIMARY KEY,
        action      TEXT NOT NULL,
        entity_type TEXT NOT NULL,
        entity_id   TEXT NOT NULL,
        at          TIMESTAMPTZ NOT NULL,
        detail      JSONB NOT NULL
    )
    ",
    "CREATE INDEX IF NOT EXISTS idx_positions_status ON positions (status)",
    "CREATE INDEX IF NOT EXISTS idx_positions_opened_at ON positions (opened_at)",
    "CREATE INDEX IF NOT EXISTS idx_executions_opportunity ON executions (opportunity_id)",
    "CREATE INDEX IF NOT EXISTS idx_audit_entity ON audit_log (entity_type, entity_id)",
];
