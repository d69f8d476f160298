// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::error::Result;
use crate::utils::{maybe_print_json, pretty_table};
use rusqlite::{Connection, params};
use serde::Serialize;
use serde_json::Value;

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> anyhow::Result<()> {
    let limit = *m.get_one::<usize>("limit").unwrap_or(&20);
    let rows = recent(conn, limit)?;
    if !maybe_print_json(m.get_flag("json"), m.get_flag("jsonl"), &rows)? {
        let data = rows
            .into_iter()
            .map(|r| {
                vec![
                    r.timestamp,
                    r.action,
                    r.table_name,
                    r.record_id.to_string(),
                    r.new_values.unwrap_or_default(),
                ]
            })
            .collect();
        println!(
            "{}",
            pretty_table(&["When", "Action", "Table", "Record", "Values"], data)
        );
    }
    Ok(())
}

/// Appends an audit row. Call it on the same connection (or open
/// transaction) that performs the change so both commit together.
pub fn record(
    conn: &Connection,
    table: &str,
    record_id: i64,
    action: &str,
    old: Option<&Value>,
    new: Option<&Value>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO audit_log(table_name, record_id, action, old_values, new_values)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            table,
            record_id,
            action,
            old.map(Value::to_string),
            new.map(Value::to_string)
        ],
    )?;
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct AuditRow {
    pub table_name: String,
    pub record_id: i64,
    pub action: String,
    pub old_values: Option<String>,
    pub new_values: Option<String>,
    pub timestamp: String,
}

pub fn recent(conn: &Connection, limit: usize) -> Result<Vec<AuditRow>> {
    let mut stmt = conn.prepare(
        "SELECT table_name, record_id, action, old_values, new_values, timestamp
         FROM audit_log ORDER BY id DESC LIMIT ?1",
    )?;
    let rows = stmt.query_map(params![limit as i64], |r| {
        Ok(AuditRow {
            table_name: r.get(0)?,
            record_id: r.get(1)?,
            action: r.get(2)?,
            old_values: r.get(3)?,
            new_values: r.get(4)?,
            timestamp: r.get(5)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}
