// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::commands::{audit, cards};
use crate::error::{LedgerError, Result};
use crate::models::{NewEntry, Transaction, TransactionEntry, YearMonth};
use crate::utils::{
    checked_add, decimal_at, id_for_account, id_for_card, maybe_print_json, opt_decimal_at, parse_date,
    parse_decimal, parse_month, pretty_table,
};
use anyhow::{Context, anyhow};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

pub fn handle(conn: &mut Connection, m: &clap::ArgMatches) -> anyhow::Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => add(conn, sub)?,
        Some(("list", sub)) => list(conn, sub)?,
        Some(("show", sub)) => show(conn, sub)?,
        Some(("correct", sub)) => correct(conn, sub)?,
        _ => {}
    }
    Ok(())
}

fn add(conn: &mut Connection, sub: &clap::ArgMatches) -> anyhow::Result<()> {
    let date = parse_date(sub.get_one::<String>("date").unwrap())?;
    let description = sub.get_one::<String>("description").unwrap().trim();

    let mut entries = Vec::new();
    for raw in sub.get_many::<String>("debit").into_iter().flatten() {
        let (account_id, amount) = parse_entry_arg(conn, raw)?;
        entries.push(NewEntry::debit(account_id, amount));
    }
    for raw in sub.get_many::<String>("credit").into_iter().flatten() {
        let (account_id, amount) = parse_entry_arg(conn, raw)?;
        entries.push(NewEntry::credit(account_id, amount));
    }

    let id = match sub.get_one::<String>("card") {
        Some(card) => {
            let card_id = id_for_card(conn, card)?;
            record_card_transaction(conn, date, description, &entries, card_id)?
        }
        None => record_transaction(conn, date, description, &entries)?,
    };
    println!("Recorded transaction #{} on {} '{}'", id, date, description);
    Ok(())
}

/// Parses `ACCOUNT=AMOUNT` as given on the command line.
fn parse_entry_arg(conn: &Connection, raw: &str) -> anyhow::Result<(i64, Decimal)> {
    let (name, amount) = raw
        .rsplit_once('=')
        .ok_or_else(|| anyhow!("Invalid entry '{}', expected ACCOUNT=AMOUNT", raw))?;
    let account_id = id_for_account(conn, name)?;
    let amount = parse_decimal(amount)
        .with_context(|| format!("Invalid amount in entry '{}'", raw))?;
    Ok((account_id, amount))
}

/// Records a balanced transaction atomically and returns its id.
pub fn record_transaction(
    conn: &mut Connection,
    date: NaiveDate,
    description: &str,
    entries: &[NewEntry],
) -> Result<i64> {
    validate_entries(entries)?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let id = insert_transaction(&tx, date, description, entries)?;
    tx.commit()?;
    info!(id, %date, entries = entries.len(), "transaction recorded");
    Ok(id)
}

/// Like [`record_transaction`], also linking the transaction to a card and
/// refreshing that card's usage for the month in the same unit.
pub fn record_card_transaction(
    conn: &mut Connection,
    date: NaiveDate,
    description: &str,
    entries: &[NewEntry],
    card_id: i64,
) -> Result<i64> {
    validate_entries(entries)?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    cards::get_card(&tx, card_id)?;
    let id = insert_transaction(&tx, date, description, entries)?;
    tx.execute(
        "INSERT INTO transaction_cards(transaction_id, card_id) VALUES (?1, ?2)",
        params![id, card_id],
    )?;
    cards::refresh_usage(&tx, card_id, YearMonth::of(date))?;
    tx.commit()?;
    info!(id, card_id, %date, "card transaction recorded");
    Ok(id)
}

/// Shape and balance checks that need no storage access.
fn validate_entries(entries: &[NewEntry]) -> Result<()> {
    let mut debits = Decimal::ZERO;
    let mut credits = Decimal::ZERO;
    for (idx, e) in entries.iter().enumerate() {
        match (e.debit, e.credit) {
            (Some(d), None) if d > Decimal::ZERO => {
                debits = debits.checked_add(d).ok_or_else(|| {
                    LedgerError::invalid_entry(format!("debit total overflows at entry {}", idx + 1))
                })?;
            }
            (None, Some(c)) if c > Decimal::ZERO => {
                credits = credits.checked_add(c).ok_or_else(|| {
                    LedgerError::invalid_entry(format!("credit total overflows at entry {}", idx + 1))
                })?;
            }
            (Some(_), Some(_)) => {
                return Err(LedgerError::invalid_entry(format!(
                    "entry {} sets both debit and credit",
                    idx + 1
                )));
            }
            (None, None) => {
                return Err(LedgerError::invalid_entry(format!(
                    "entry {} sets neither debit nor credit",
                    idx + 1
                )));
            }
            _ => {
                return Err(LedgerError::invalid_entry(format!(
                    "entry {} amount must be positive",
                    idx + 1
                )));
            }
        }
    }
    if entries.len() < 2 {
        return Err(LedgerError::invalid_entry(format!(
            "a transaction needs at least two entries, got {}",
            entries.len()
        )));
    }
    if debits != credits {
        warn!(%debits, %credits, "rejecting unbalanced transaction");
        return Err(LedgerError::UnbalancedEntry { debits, credits });
    }
    Ok(())
}

fn insert_transaction(
    conn: &Connection,
    date: NaiveDate,
    description: &str,
    entries: &[NewEntry],
) -> Result<i64> {
    let accounts: BTreeSet<i64> = entries.iter().map(|e| e.account_id).collect();
    for account_id in accounts {
        let active: Option<bool> = conn
            .query_row(
                "SELECT is_active FROM accounts WHERE id=?1",
                params![account_id],
                |r| r.get(0),
            )
            .optional()?;
        match active {
            Some(true) => {}
            Some(false) => {
                return Err(LedgerError::invalid_entry(format!(
                    "account {} is inactive",
                    account_id
                )));
            }
            None => {
                return Err(LedgerError::invalid_entry(format!(
                    "account {} does not exist",
                    account_id
                )));
            }
        }
    }

    conn.execute(
        "INSERT INTO transactions(date, description) VALUES (?1, ?2)",
        params![date, description],
    )?;
    let id = conn.last_insert_rowid();
    let mut stmt = conn.prepare_cached(
        "INSERT INTO transaction_entries(transaction_id, account_id, debit_amount, credit_amount, memo)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for e in entries {
        stmt.execute(params![
            id,
            e.account_id,
            e.debit.map(|d| d.to_string()),
            e.credit.map(|c| c.to_string()),
            e.memo
        ])?;
    }
    audit::record(
        conn,
        "transactions",
        id,
        "INSERT",
        None,
        Some(&json!({ "date": date, "description": description, "entries": entries.len() })),
    )?;
    Ok(id)
}

#[derive(Debug, Clone, Serialize)]
pub struct TransactionDetail {
    pub transaction: Transaction,
    pub entries: Vec<TransactionEntry>,
}

impl TransactionDetail {
    /// Total moved by the transaction: its debit side.
    pub fn amount(&self) -> Decimal {
        self.entries
            .iter()
            .filter_map(|e| e.debit)
            .fold(Decimal::ZERO, |acc, d| acc.saturating_add(d))
    }
}

pub fn get_transaction(conn: &Connection, id: i64) -> Result<TransactionDetail> {
    let transaction = conn
        .query_row(
            "SELECT id, date, description FROM transactions WHERE id=?1",
            params![id],
            |r| {
                Ok(Transaction {
                    id: r.get(0)?,
                    date: r.get(1)?,
                    description: r.get(2)?,
                })
            },
        )
        .optional()?
        .ok_or_else(|| LedgerError::not_found("transaction", id))?;

    let mut stmt = conn.prepare_cached(
        "SELECT id, transaction_id, account_id, debit_amount, credit_amount, memo
         FROM transaction_entries WHERE transaction_id=?1 ORDER BY id",
    )?;
    let entries = stmt
        .query_map(params![id], |r| {
            Ok(TransactionEntry {
                id: r.get(0)?,
                transaction_id: r.get(1)?,
                account_id: r.get(2)?,
                debit: opt_decimal_at(r, 3)?,
                credit: opt_decimal_at(r, 4)?,
                memo: r.get(5)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(TransactionDetail {
        transaction,
        entries,
    })
}

/// Corrects date and/or description. Entries are never touched; card usage
/// of every month the transaction moves out of or into is recomputed.
pub fn correct_transaction(
    conn: &mut Connection,
    id: i64,
    date: Option<NaiveDate>,
    description: Option<&str>,
) -> Result<()> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let before = get_transaction(&tx, id)?.transaction;
    let new_date = date.unwrap_or(before.date);
    let new_description = description.unwrap_or(&before.description);

    tx.execute(
        "UPDATE transactions SET date=?1, description=?2, updated_at=datetime('now') WHERE id=?3",
        params![new_date, new_description, id],
    )?;

    let old_month = YearMonth::of(before.date);
    let new_month = YearMonth::of(new_date);
    if old_month != new_month {
        let card_ids = {
            let mut stmt =
                tx.prepare("SELECT card_id FROM transaction_cards WHERE transaction_id=?1")?;
            stmt.query_map(params![id], |r| r.get::<_, i64>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?
        };
        for card_id in card_ids {
            cards::refresh_usage(&tx, card_id, old_month)?;
            cards::refresh_usage(&tx, card_id, new_month)?;
        }
    }

    audit::record(
        &tx,
        "transactions",
        id,
        "UPDATE",
        Some(&json!({ "date": before.date, "description": before.description })),
        Some(&json!({ "date": new_date, "description": new_description })),
    )?;
    tx.commit()?;
    info!(id, %new_date, "transaction corrected");
    Ok(())
}

#[derive(Debug, Default, Clone)]
pub struct TransactionFilter {
    pub month: Option<YearMonth>,
    pub account_id: Option<i64>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct TransactionRow {
    pub id: i64,
    pub date: String,
    pub description: String,
    pub amount: Decimal,
    pub accounts: String,
}

pub fn list_transactions(conn: &Connection, filter: &TransactionFilter) -> Result<Vec<TransactionRow>> {
    let mut sql = String::from("SELECT t.id, t.date, t.description FROM transactions t WHERE 1=1");
    let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(month) = filter.month {
        sql.push_str(" AND t.date>=? AND t.date<?");
        params_vec.push(Box::new(month.first_day()));
        params_vec.push(Box::new(month.next().first_day()));
    }
    if let Some(account_id) = filter.account_id {
        sql.push_str(
            " AND EXISTS (SELECT 1 FROM transaction_entries e WHERE e.transaction_id=t.id AND e.account_id=?)",
        );
        params_vec.push(Box::new(account_id));
    }
    sql.push_str(" ORDER BY t.date DESC, t.id DESC");
    if let Some(limit) = filter.limit {
        sql.push_str(" LIMIT ?");
        params_vec.push(Box::new(limit as i64));
    }
    debug!(%sql, "listing transactions");

    let mut stmt = conn.prepare(&sql)?;
    let heads = stmt
        .query_map(
            rusqlite::params_from_iter(params_vec.iter().map(|p| p.as_ref())),
            |r| {
                Ok((
                    r.get::<_, i64>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                ))
            },
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut lines = conn.prepare_cached(
        "SELECT a.name, e.debit_amount FROM transaction_entries e
         JOIN accounts a ON e.account_id=a.id
         WHERE e.transaction_id=?1 ORDER BY e.id",
    )?;
    let mut data = Vec::with_capacity(heads.len());
    for (id, date, description) in heads {
        let mut amount = Decimal::ZERO;
        let mut names: Vec<String> = Vec::new();
        let mut rows = lines.query(params![id])?;
        while let Some(r) = rows.next()? {
            let name: String = r.get(0)?;
            if let Some(d) = opt_decimal_at(r, 1)? {
                amount = checked_add(amount, d, "transaction amount")?;
            }
            if !names.contains(&name) {
                names.push(name);
            }
        }
        data.push(TransactionRow {
            id,
            date,
            description,
            amount,
            accounts: names.join(", "),
        });
    }
    Ok(data)
}

pub fn query_rows(conn: &Connection, sub: &clap::ArgMatches) -> anyhow::Result<Vec<TransactionRow>> {
    let month = match sub.get_one::<String>("month") {
        Some(m) => Some(parse_month(m)?),
        None => None,
    };
    let account_id = match sub.get_one::<String>("account") {
        Some(a) => Some(id_for_account(conn, a)?),
        None => None,
    };
    let filter = TransactionFilter {
        month,
        account_id,
        limit: sub.get_one::<usize>("limit").copied(),
    };
    Ok(list_transactions(conn, &filter)?)
}

fn list(conn: &Connection, sub: &clap::ArgMatches) -> anyhow::Result<()> {
    let data = query_rows(conn, sub)?;
    if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &data)? {
        let rows: Vec<Vec<String>> = data
            .iter()
            .map(|r| {
                vec![
                    r.id.to_string(),
                    r.date.clone(),
                    r.description.clone(),
                    format!("{:.2}", r.amount),
                    r.accounts.clone(),
                ]
            })
            .collect();
        println!(
            "{}",
            pretty_table(&["ID", "Date", "Description", "Amount", "Accounts"], rows)
        );
    }
    Ok(())
}

fn show(conn: &Connection, sub: &clap::ArgMatches) -> anyhow::Result<()> {
    let id = *sub.get_one::<i64>("id").unwrap();
    let detail = get_transaction(conn, id)?;
    if maybe_print_json(sub.get_flag("json"), false, &detail)? {
        return Ok(());
    }
    println!(
        "#{} {} {} ({:.2})",
        detail.transaction.id,
        detail.transaction.date,
        detail.transaction.description,
        detail.amount()
    );
    let mut names = conn.prepare_cached("SELECT name FROM accounts WHERE id=?1")?;
    let mut rows = Vec::new();
    for e in &detail.entries {
        let name: String = names.query_row(params![e.account_id], |r| r.get(0))?;
        rows.push(vec![
            name,
            e.debit.map(|d| format!("{:.2}", d)).unwrap_or_default(),
            e.credit.map(|c| format!("{:.2}", c)).unwrap_or_default(),
            e.memo.clone().unwrap_or_default(),
        ]);
    }
    println!(
        "{}",
        pretty_table(&["Account", "Debit", "Credit", "Memo"], rows)
    );
    Ok(())
}

fn correct(conn: &mut Connection, sub: &clap::ArgMatches) -> anyhow::Result<()> {
    let id = *sub.get_one::<i64>("id").unwrap();
    let date = match sub.get_one::<String>("date") {
        Some(d) => Some(parse_date(d)?),
        None => None,
    };
    let description = sub.get_one::<String>("description").map(|s| s.trim());
    if date.is_none() && description.is_none() {
        return Err(anyhow!("Nothing to correct: pass --date and/or --description"));
    }
    correct_transaction(conn, id, date, description)?;
    println!("Corrected transaction #{}", id);
    Ok(())
}

/// Debit side of one transaction, the single amount card usage counts.
pub(crate) fn debit_total(conn: &Connection, transaction_id: i64) -> Result<Decimal> {
    let mut stmt = conn.prepare_cached(
        "SELECT debit_amount FROM transaction_entries
         WHERE transaction_id=?1 AND debit_amount IS NOT NULL",
    )?;
    let mut rows = stmt.query(params![transaction_id])?;
    let mut total = Decimal::ZERO;
    while let Some(r) = rows.next()? {
        total = checked_add(total, decimal_at(r, 0)?, "transaction amount")?;
    }
    Ok(total)
}
