//! SQL schema definitions.

/// Complete schema for the v1 valve ledger.
///
/// `checkpoints` and `pipe_totals` deliberately carry no foreign key into
/// `pipes`: balances booked against a pipe must survive its removal from
/// the registry so already-earned funds stay withdrawable.
pub const SCHEMA_V1: &str = r#"
-- ============================================================
-- Pipe registry
-- ============================================================

CREATE TABLE IF NOT EXISTS pipes (
    pipe_id BLOB PRIMARY KEY,
    registered_at INTEGER NOT NULL
);

-- ============================================================
-- Flows & allocations
-- ============================================================

CREATE TABLE IF NOT EXISTS account_flows (
    account BLOB PRIMARY KEY,
    flow_rate TEXT NOT NULL,
    started_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

-- Only rows with a positive percentage are stored; a missing row means
-- the account sends nothing to that pipe.
CREATE TABLE IF NOT EXISTS allocations (
    account BLOB NOT NULL REFERENCES account_flows(account) ON DELETE CASCADE,
    pipe_id BLOB NOT NULL,
    percentage INTEGER NOT NULL,
    flow_rate TEXT NOT NULL,
    PRIMARY KEY (account, pipe_id)
);

CREATE INDEX IF NOT EXISTS idx_allocations_pipe ON allocations(pipe_id);

-- ============================================================
-- Checkpoint accounting
-- ============================================================

-- Rows are frozen and zeroed but never deleted, so the booked balance
-- of a deleted flow or removed pipe remains claimable.
CREATE TABLE IF NOT EXISTS checkpoints (
    account BLOB NOT NULL,
    pipe_id BLOB NOT NULL,
    booked_amount TEXT NOT NULL,
    booked_at INTEGER NOT NULL,
    PRIMARY KEY (account, pipe_id)
);

CREATE INDEX IF NOT EXISTS idx_checkpoints_pipe ON checkpoints(pipe_id);

CREATE TABLE IF NOT EXISTS pipe_totals (
    pipe_id BLOB PRIMARY KEY,
    booked_amount TEXT NOT NULL,
    booked_at INTEGER NOT NULL,
    total_rate TEXT NOT NULL,
    vault_deposited TEXT NOT NULL DEFAULT '0'
);

-- ============================================================
-- Settlement audit trail
-- ============================================================

CREATE TABLE IF NOT EXISTS settlements (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    account BLOB NOT NULL,
    amount TEXT NOT NULL,
    pipe_count INTEGER NOT NULL,
    settled_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_settlements_account ON settlements(account);
CREATE INDEX IF NOT EXISTS idx_settlements_time ON settlements(settled_at);
"#;
