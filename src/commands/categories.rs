// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::commands::audit;
use crate::error::Result;
use crate::models::{AccountCategory, AccountType};
use crate::utils::pretty_table;
use rusqlite::{Connection, params};
use serde_json::json;
use tracing::info;

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> anyhow::Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => {
            let name = sub.get_one::<String>("name").unwrap().trim();
            let typ: AccountType = sub.get_one::<String>("type").unwrap().parse()?;
            let description = sub.get_one::<String>("description").map(|s| s.trim());
            let color = sub.get_one::<String>("color").map(|s| s.trim());
            let order = *sub.get_one::<i64>("order").unwrap_or(&0);
            add_category(conn, name, typ, description, color, order)?;
            println!("Added category '{}' ({})", name, typ);
        }
        Some(("list", _)) => {
            let data = list_categories(conn)?
                .into_iter()
                .map(|c| {
                    vec![
                        c.name,
                        c.r#type.to_string(),
                        c.description.unwrap_or_default(),
                        c.sort_order.to_string(),
                    ]
                })
                .collect();
            println!(
                "{}",
                pretty_table(&["Category", "Type", "Description", "Order"], data)
            );
        }
        _ => {}
    }
    Ok(())
}

pub fn add_category(
    conn: &Connection,
    name: &str,
    typ: AccountType,
    description: Option<&str>,
    color: Option<&str>,
    sort_order: i64,
) -> Result<i64> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO account_categories(name, type, description, color, sort_order)
         VALUES (?1, ?2, ?3, COALESCE(?4, '#3B82F6'), ?5)",
        params![name, typ, description, color, sort_order],
    )?;
    let id = tx.last_insert_rowid();
    audit::record(
        &tx,
        "account_categories",
        id,
        "INSERT",
        None,
        Some(&json!({ "name": name, "type": typ })),
    )?;
    tx.commit()?;
    info!(id, name, %typ, "account category added");
    Ok(id)
}

pub fn list_categories(conn: &Connection) -> Result<Vec<AccountCategory>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, type, description, icon, color, sort_order
         FROM account_categories ORDER BY sort_order, name",
    )?;
    let rows = stmt.query_map([], |r| {
        Ok(AccountCategory {
            id: r.get(0)?,
            name: r.get(1)?,
            r#type: r.get(2)?,
            description: r.get(3)?,
            icon: r.get(4)?,
            color: r.get(5)?,
            sort_order: r.get(6)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}
