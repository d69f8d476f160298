// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::error::{LedgerError, Result};
use crate::utils::opt_decimal_at;
use anyhow::Context;
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Serialize;
use std::path::Path;
use tracing::info;

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> anyhow::Result<()> {
    match m.subcommand() {
        Some(("journal", sub)) => {
            let format: ExportFormat = sub.get_one::<String>("format").unwrap().parse()?;
            let out = sub.get_one::<String>("out").unwrap();
            let n = export_journal(conn, format, Path::new(out))
                .with_context(|| format!("Export journal to {}", out))?;
            println!("Exported {} entries to {}", n, out);
            Ok(())
        }
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl std::str::FromStr for ExportFormat {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => Err(LedgerError::invalid_input(format!(
                "unknown format '{}' (use csv|json)",
                other
            ))),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JournalLine {
    pub transaction_id: i64,
    pub date: String,
    pub description: String,
    pub account: String,
    pub debit: Option<Decimal>,
    pub credit: Option<Decimal>,
    pub memo: Option<String>,
}

pub fn journal(conn: &Connection) -> Result<Vec<JournalLine>> {
    let mut stmt = conn.prepare(
        "SELECT t.id, t.date, t.description, a.name, e.debit_amount, e.credit_amount, e.memo
         FROM transaction_entries e
         JOIN transactions t ON e.transaction_id=t.id
         JOIN accounts a ON e.account_id=a.id
         ORDER BY t.date, t.id, e.id",
    )?;
    let rows = stmt.query_map([], |r| {
        Ok(JournalLine {
            transaction_id: r.get(0)?,
            date: r.get(1)?,
            description: r.get(2)?,
            account: r.get(3)?,
            debit: opt_decimal_at(r, 4)?,
            credit: opt_decimal_at(r, 5)?,
            memo: r.get(6)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Writes every ledger entry to `out` and returns how many were written.
pub fn export_journal(conn: &Connection, format: ExportFormat, out: &Path) -> anyhow::Result<usize> {
    let lines = journal(conn)?;
    match format {
        ExportFormat::Csv => {
            let mut wtr = csv::Writer::from_path(out)?;
            wtr.write_record([
                "transaction_id",
                "date",
                "description",
                "account",
                "debit",
                "credit",
                "memo",
            ])?;
            for l in &lines {
                wtr.write_record([
                    l.transaction_id.to_string(),
                    l.date.clone(),
                    l.description.clone(),
                    l.account.clone(),
                    l.debit.map(|d| d.to_string()).unwrap_or_default(),
                    l.credit.map(|c| c.to_string()).unwrap_or_default(),
                    l.memo.clone().unwrap_or_default(),
                ])?;
            }
            wtr.flush()?;
        }
        ExportFormat::Json => {
            std::fs::write(out, serde_json::to_string_pretty(&lines)?)?;
        }
    }
    info!(entries = lines.len(), path = %out.display(), "journal exported");
    Ok(lines.len())
}
