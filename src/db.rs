// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use once_cell::sync::Lazy;
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

static APP: Lazy<(&str, &str, &str)> =
    Lazy::new(|| ("com.alphavelocity", "Ledgerplan", "ledgerplan"));

/// Name of the budget category whose planned value is derived from fixed expenses.
pub const FIXED_BUDGET_CATEGORY: &str = "Fixed Expenses";

const DEFAULT_BUDGET_CATEGORIES: [(&str, bool, &str); 10] = [
    (FIXED_BUDGET_CATEGORY, true, "#6B7280"),
    ("Savings", false, "#10B981"),
    ("Investment", false, "#8B5CF6"),
    ("Food", false, "#F59E0B"),
    ("Transportation", false, "#3B82F6"),
    ("Utilities", false, "#FBBF24"),
    ("Entertainment", false, "#EC4899"),
    ("Healthcare", false, "#EF4444"),
    ("Education", false, "#6366F1"),
    ("Miscellaneous", false, "#9CA3AF"),
];

pub fn db_path() -> Result<PathBuf> {
    let proj = ProjectDirs::from(APP.0, APP.1, APP.2)
        .context("Could not determine platform-specific data dir")?;
    let data_dir = proj.data_dir();
    fs::create_dir_all(data_dir).context("Failed to create data dir")?;
    Ok(data_dir.join("ledgerplan.sqlite"))
}

/// Opens the database at `path`, or at the platform data dir when `None`.
pub fn open_or_init(path: Option<&Path>) -> Result<Connection> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => db_path()?,
    };
    open_at(&path)
}

pub fn open_at(path: &Path) -> Result<Connection> {
    let mut conn =
        Connection::open(path).with_context(|| format!("Open DB at {}", path.display()))?;
    conn.busy_timeout(Duration::from_secs(5))?;
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |r| r.get(0))?;
    debug!(path = %path.display(), journal_mode = %mode, "opened database");
    init_schema(&mut conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let mut conn = Connection::open_in_memory()?;
    init_schema(&mut conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(
        r#"
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS settings(
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS account_categories(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        type TEXT NOT NULL CHECK(type IN ('asset','liability','equity','income','expense')),
        description TEXT,
        icon TEXT NOT NULL DEFAULT '',
        color TEXT NOT NULL DEFAULT '#3B82F6',
        sort_order INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE IF NOT EXISTS budget_categories(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        is_fixed INTEGER NOT NULL DEFAULT 0,
        color TEXT NOT NULL DEFAULT '#6B7280',
        icon TEXT NOT NULL DEFAULT '',
        sort_order INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );
    -- at most one category is fed by the fixed expense projection
    CREATE UNIQUE INDEX IF NOT EXISTS idx_budget_categories_fixed
        ON budget_categories(is_fixed) WHERE is_fixed = 1;

    CREATE TABLE IF NOT EXISTS accounts(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        category_id INTEGER NOT NULL,
        name TEXT NOT NULL UNIQUE,
        description TEXT,
        budget_category_id INTEGER,
        is_active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        FOREIGN KEY(category_id) REFERENCES account_categories(id),
        FOREIGN KEY(budget_category_id) REFERENCES budget_categories(id) ON DELETE SET NULL
    );

    CREATE TABLE IF NOT EXISTS transactions(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        date TEXT NOT NULL,
        description TEXT NOT NULL,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        updated_at TEXT NOT NULL DEFAULT (datetime('now'))
    );
    CREATE INDEX IF NOT EXISTS idx_transactions_date ON transactions(date);

    CREATE TABLE IF NOT EXISTS transaction_entries(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        transaction_id INTEGER NOT NULL,
        account_id INTEGER NOT NULL,
        debit_amount TEXT,
        credit_amount TEXT,
        memo TEXT,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        CHECK((debit_amount IS NULL) <> (credit_amount IS NULL)),
        FOREIGN KEY(transaction_id) REFERENCES transactions(id) ON DELETE CASCADE,
        FOREIGN KEY(account_id) REFERENCES accounts(id)
    );
    CREATE INDEX IF NOT EXISTS idx_entries_account ON transaction_entries(account_id);
    CREATE INDEX IF NOT EXISTS idx_entries_transaction ON transaction_entries(transaction_id);

    CREATE TABLE IF NOT EXISTS spending_plans(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        year INTEGER NOT NULL,
        month INTEGER NOT NULL,
        total_income TEXT NOT NULL DEFAULT '0',
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        updated_at TEXT NOT NULL DEFAULT (datetime('now')),
        UNIQUE(year, month)
    );

    CREATE TABLE IF NOT EXISTS spending_plan_items(
        plan_id INTEGER NOT NULL,
        category_id INTEGER NOT NULL,
        planned TEXT NOT NULL,
        PRIMARY KEY(plan_id, category_id),
        FOREIGN KEY(plan_id) REFERENCES spending_plans(id) ON DELETE CASCADE,
        FOREIGN KEY(category_id) REFERENCES budget_categories(id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS fixed_expenses(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        category TEXT NOT NULL,
        amount TEXT NOT NULL,
        frequency TEXT NOT NULL CHECK(frequency IN ('monthly','annual')),
        start_date TEXT NOT NULL,
        end_date TEXT,
        is_active INTEGER NOT NULL DEFAULT 1,
        description TEXT,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        updated_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE IF NOT EXISTS cards(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        type TEXT NOT NULL CHECK(type IN ('credit','debit')),
        issuer TEXT NOT NULL,
        last_four TEXT NOT NULL,
        credit_limit TEXT,
        linked_account_id INTEGER,
        is_active INTEGER NOT NULL DEFAULT 1,
        color TEXT NOT NULL DEFAULT '#3B82F6',
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        CHECK(type = 'credit' OR credit_limit IS NULL),
        FOREIGN KEY(linked_account_id) REFERENCES accounts(id)
    );

    CREATE TABLE IF NOT EXISTS transaction_cards(
        transaction_id INTEGER NOT NULL,
        card_id INTEGER NOT NULL,
        PRIMARY KEY(transaction_id, card_id),
        FOREIGN KEY(transaction_id) REFERENCES transactions(id) ON DELETE CASCADE,
        FOREIGN KEY(card_id) REFERENCES cards(id) ON DELETE CASCADE
    );

    -- cache over transaction_cards; rewritten on every affecting write
    CREATE TABLE IF NOT EXISTS card_monthly_usage(
        card_id INTEGER NOT NULL,
        year INTEGER NOT NULL,
        month INTEGER NOT NULL,
        total_amount TEXT NOT NULL DEFAULT '0',
        transaction_count INTEGER NOT NULL DEFAULT 0,
        calculated_at TEXT NOT NULL DEFAULT (datetime('now')),
        PRIMARY KEY(card_id, year, month),
        FOREIGN KEY(card_id) REFERENCES cards(id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS assets(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        symbol TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        kind TEXT NOT NULL CHECK(kind IN ('stock','etf','bond','crypto','currency','other')),
        currency TEXT NOT NULL DEFAULT 'KRW',
        data_source TEXT NOT NULL DEFAULT 'manual',
        current_price TEXT,
        last_updated TEXT,
        is_active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE IF NOT EXISTS asset_transactions(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        asset_id INTEGER NOT NULL,
        side TEXT NOT NULL CHECK(side IN ('buy','sell')),
        quantity TEXT NOT NULL,
        price TEXT NOT NULL,
        total_amount TEXT NOT NULL,
        currency TEXT NOT NULL,
        date TEXT NOT NULL,
        description TEXT,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        FOREIGN KEY(asset_id) REFERENCES assets(id) ON DELETE CASCADE
    );
    CREATE INDEX IF NOT EXISTS idx_asset_transactions_date ON asset_transactions(date);

    CREATE TABLE IF NOT EXISTS dividends(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        asset_id INTEGER NOT NULL,
        amount TEXT NOT NULL,
        currency TEXT NOT NULL,
        ex_date TEXT NOT NULL,
        pay_date TEXT NOT NULL,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        FOREIGN KEY(asset_id) REFERENCES assets(id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS portfolio_snapshots(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        date TEXT NOT NULL UNIQUE,
        total_value TEXT NOT NULL,
        total_cost TEXT NOT NULL,
        currency TEXT NOT NULL,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE IF NOT EXISTS audit_log(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        table_name TEXT NOT NULL,
        record_id INTEGER NOT NULL,
        action TEXT NOT NULL CHECK(action IN ('INSERT','UPDATE','DELETE')),
        old_values TEXT,
        new_values TEXT,
        timestamp TEXT NOT NULL DEFAULT (datetime('now'))
    );
    "#,
    )?;

    let tx = conn.transaction()?;
    {
        let mut seed = tx.prepare(
            "INSERT OR IGNORE INTO budget_categories(name, is_fixed, color, sort_order)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for (order, (name, is_fixed, color)) in DEFAULT_BUDGET_CATEGORIES.iter().enumerate() {
            seed.execute((name, is_fixed, color, order as i64))?;
        }
    }
    tx.commit()?;
    Ok(())
}
