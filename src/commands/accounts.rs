// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::commands::audit;
use crate::error::{LedgerError, Result};
use crate::models::{Account, AccountType};
use crate::utils::{id_for_account, id_for_budget_category, id_for_category, parse_date, pretty_table};
use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> anyhow::Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => {
            let name = sub.get_one::<String>("name").unwrap().trim();
            let category = sub.get_one::<String>("category").unwrap();
            let description = sub.get_one::<String>("description").map(|s| s.trim());
            let category_id = id_for_category(conn, category)?;
            let budget_id = match sub.get_one::<String>("budget") {
                Some(b) => Some(id_for_budget_category(conn, b)?),
                None => None,
            };
            add_account(conn, category_id, name, description, budget_id)?;
            println!("Added account '{}' under '{}'", name, category.trim());
        }
        Some(("list", sub)) => {
            let rows = list_accounts(conn, sub.get_flag("all"))?;
            let data = rows
                .into_iter()
                .map(|a| {
                    vec![
                        a.name,
                        a.category,
                        a.account_type.to_string(),
                        a.budget_category.unwrap_or_default(),
                        if a.is_active { "yes".into() } else { "no".into() },
                    ]
                })
                .collect();
            println!(
                "{}",
                pretty_table(&["Name", "Category", "Type", "Budget", "Active"], data)
            );
        }
        Some(("deactivate", sub)) => {
            let name = sub.get_one::<String>("name").unwrap();
            let as_of = match sub.get_one::<String>("as-of") {
                Some(d) => parse_date(d)?,
                None => Utc::now().date_naive(),
            };
            let id = id_for_account(conn, name)?;
            deactivate_account(conn, id, as_of)?;
            println!("Deactivated account '{}'", name.trim());
        }
        _ => {}
    }
    Ok(())
}

pub fn add_account(
    conn: &Connection,
    category_id: i64,
    name: &str,
    description: Option<&str>,
    budget_category_id: Option<i64>,
) -> Result<i64> {
    let tx = conn.unchecked_transaction()?;
    let typ: AccountType = tx
        .query_row(
            "SELECT type FROM account_categories WHERE id=?1",
            params![category_id],
            |r| r.get(0),
        )
        .optional()?
        .ok_or_else(|| LedgerError::not_found("account category", category_id))?;

    if let Some(budget_id) = budget_category_id {
        let exists: Option<i64> = tx
            .query_row(
                "SELECT id FROM budget_categories WHERE id=?1",
                params![budget_id],
                |r| r.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(LedgerError::not_found("budget category", budget_id));
        }
        if !typ.debit_normal() {
            return Err(LedgerError::invalid_input(format!(
                "only asset or expense accounts can feed a budget category, '{}' is {}",
                name, typ
            )));
        }
    }

    tx.execute(
        "INSERT INTO accounts(category_id, name, description, budget_category_id)
         VALUES (?1, ?2, ?3, ?4)",
        params![category_id, name, description, budget_category_id],
    )?;
    let id = tx.last_insert_rowid();
    audit::record(
        &tx,
        "accounts",
        id,
        "INSERT",
        None,
        Some(&json!({ "name": name, "category_id": category_id, "budget_category_id": budget_category_id })),
    )?;
    tx.commit()?;
    info!(id, name, %typ, "account added");
    Ok(id)
}

pub fn get_account(conn: &Connection, account_id: i64) -> Result<Account> {
    conn.query_row(
        "SELECT id, category_id, name, description, budget_category_id, is_active
         FROM accounts WHERE id=?1",
        params![account_id],
        |r| {
            Ok(Account {
                id: r.get(0)?,
                category_id: r.get(1)?,
                name: r.get(2)?,
                description: r.get(3)?,
                budget_category_id: r.get(4)?,
                is_active: r.get(5)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| LedgerError::not_found("account", account_id))
}

/// The semantic type of an account, inherited from its category.
pub fn account_type(conn: &Connection, account_id: i64) -> Result<AccountType> {
    conn.query_row(
        "SELECT c.type FROM accounts a JOIN account_categories c ON a.category_id=c.id
         WHERE a.id=?1",
        params![account_id],
        |r| r.get(0),
    )
    .optional()?
    .ok_or_else(|| LedgerError::not_found("account", account_id))
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountRow {
    pub id: i64,
    pub name: String,
    pub category: String,
    pub account_type: AccountType,
    pub budget_category: Option<String>,
    pub is_active: bool,
}

pub fn list_accounts(conn: &Connection, include_inactive: bool) -> Result<Vec<AccountRow>> {
    let mut stmt = conn.prepare(
        "SELECT a.id, a.name, c.name, c.type, b.name, a.is_active
         FROM accounts a
         JOIN account_categories c ON a.category_id=c.id
         LEFT JOIN budget_categories b ON a.budget_category_id=b.id
         WHERE a.is_active=1 OR ?1
         ORDER BY c.sort_order, c.name, a.name",
    )?;
    let rows = stmt.query_map(params![include_inactive], |r| {
        Ok(AccountRow {
            id: r.get(0)?,
            name: r.get(1)?,
            category: r.get(2)?,
            account_type: r.get(3)?,
            budget_category: r.get(4)?,
            is_active: r.get(5)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Marks an account inactive. Its entries stay in the ledger and keep
/// contributing to historical balances.
pub fn deactivate_account(conn: &Connection, account_id: i64, as_of: NaiveDate) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    let account = get_account(&tx, account_id)?;
    if !account.is_active {
        debug!(account_id, "account already inactive");
        return Ok(());
    }

    let card: Option<String> = tx
        .query_row(
            "SELECT name FROM cards WHERE linked_account_id=?1 AND is_active=1 LIMIT 1",
            params![account_id],
            |r| r.get(0),
        )
        .optional()?;
    if let Some(card) = card {
        warn!(account_id, card = %card, "refusing to deactivate account linked to active card");
        return Err(LedgerError::AccountInUse {
            account_id,
            reason: format!("active card '{}' is linked to it", card),
        });
    }

    let later: i64 = tx.query_row(
        "SELECT COUNT(*) FROM transaction_entries e JOIN transactions t ON e.transaction_id=t.id
         WHERE e.account_id=?1 AND t.date>?2",
        params![account_id, as_of],
        |r| r.get(0),
    )?;
    if later > 0 {
        warn!(account_id, later, "refusing to deactivate account with later entries");
        return Err(LedgerError::AccountInUse {
            account_id,
            reason: format!("{} entries are dated after {}", later, as_of),
        });
    }

    tx.execute(
        "UPDATE accounts SET is_active=0 WHERE id=?1",
        params![account_id],
    )?;
    audit::record(
        &tx,
        "accounts",
        account_id,
        "UPDATE",
        Some(&json!({ "is_active": true })),
        Some(&json!({ "is_active": false, "as_of": as_of })),
    )?;
    tx.commit()?;
    info!(account_id, name = %account.name, "account deactivated");
    Ok(())
}
