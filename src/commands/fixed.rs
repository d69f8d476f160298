// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::commands::audit;
use crate::error::{LedgerError, Result};
use crate::models::{FixedExpense, Frequency, YearMonth};
use crate::utils::{
    checked_add, decimal_at, maybe_print_json, parse_date, parse_decimal, parse_month,
    pretty_table,
};
use chrono::NaiveDate;
use rusqlite::{Connection, params};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> anyhow::Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => {
            let new = NewFixedExpense {
                name: sub.get_one::<String>("name").unwrap().trim().to_string(),
                category: sub.get_one::<String>("category").unwrap().trim().to_string(),
                amount: parse_decimal(sub.get_one::<String>("amount").unwrap())?,
                frequency: sub.get_one::<String>("frequency").unwrap().parse()?,
                start_date: parse_date(sub.get_one::<String>("start").unwrap())?,
                end_date: match sub.get_one::<String>("end") {
                    Some(d) => Some(parse_date(d)?),
                    None => None,
                },
                description: sub.get_one::<String>("description").cloned(),
            };
            let id = add_fixed_expense(conn, &new)?;
            println!("Added fixed expense #{} '{}'", id, new.name);
        }
        Some(("list", sub)) => {
            let rows = list_fixed_expenses(conn)?;
            if maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &rows)? {
                return Ok(());
            }
            let data = rows
                .into_iter()
                .map(|f| {
                    vec![
                        f.id.to_string(),
                        f.name,
                        f.category,
                        format!("{:.0}", f.amount),
                        f.frequency.to_string(),
                        f.start_date.to_string(),
                        f.end_date.map(|d| d.to_string()).unwrap_or_default(),
                        if f.is_active { "yes".into() } else { "no".into() },
                    ]
                })
                .collect();
            println!(
                "{}",
                pretty_table(
                    &["ID", "Name", "Category", "Amount", "Frequency", "Start", "End", "Active"],
                    data
                )
            );
        }
        Some(("activate", sub)) => {
            let id = *sub.get_one::<i64>("id").unwrap();
            set_fixed_expense_active(conn, id, true)?;
            println!("Activated fixed expense #{}", id);
        }
        Some(("deactivate", sub)) => {
            let id = *sub.get_one::<i64>("id").unwrap();
            set_fixed_expense_active(conn, id, false)?;
            println!("Deactivated fixed expense #{}", id);
        }
        Some(("summary", sub)) => {
            let month = parse_month(sub.get_one::<String>("month").unwrap())?;
            let s = fixed_summary(conn, month)?;
            if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &s)? {
                println!(
                    "{}",
                    pretty_table(
                        &["Month", "Monthly Items", "Annual Items", "Monthly Equivalent"],
                        vec![vec![
                            s.month.to_string(),
                            format!("{:.0}", s.total_monthly),
                            format!("{:.0}", s.total_annual),
                            format!("{:.2}", s.monthly_average),
                        ]]
                    )
                );
            }
        }
        _ => {}
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct NewFixedExpense {
    pub name: String,
    pub category: String,
    pub amount: Decimal,
    pub frequency: Frequency,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub description: Option<String>,
}

pub fn add_fixed_expense(conn: &Connection, new: &NewFixedExpense) -> Result<i64> {
    if new.amount <= Decimal::ZERO {
        warn!(name = %new.name, amount = %new.amount, "rejected fixed expense amount");
        return Err(LedgerError::invalid_input(format!(
            "fixed expense amount must be positive, got {}",
            new.amount
        )));
    }
    if let Some(end) = new.end_date {
        if end <= new.start_date {
            return Err(LedgerError::invalid_input(format!(
                "end date {} must be after start date {}",
                end, new.start_date
            )));
        }
    }
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO fixed_expenses(name, category, amount, frequency, start_date, end_date, description)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            new.name,
            new.category,
            new.amount.to_string(),
            new.frequency,
            new.start_date,
            new.end_date,
            new.description
        ],
    )?;
    let id = tx.last_insert_rowid();
    audit::record(
        &tx,
        "fixed_expenses",
        id,
        "INSERT",
        None,
        Some(&json!({ "name": new.name, "amount": new.amount, "frequency": new.frequency })),
    )?;
    tx.commit()?;
    info!(id, name = %new.name, "fixed expense added");
    Ok(id)
}

pub fn set_fixed_expense_active(conn: &Connection, id: i64, active: bool) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    let n = tx.execute(
        "UPDATE fixed_expenses SET is_active=?1, updated_at=datetime('now') WHERE id=?2",
        params![active, id],
    )?;
    if n == 0 {
        return Err(LedgerError::not_found("fixed expense", id));
    }
    audit::record(
        &tx,
        "fixed_expenses",
        id,
        "UPDATE",
        None,
        Some(&json!({ "is_active": active })),
    )?;
    tx.commit()?;
    info!(id, active, "fixed expense toggled");
    Ok(())
}

pub fn list_fixed_expenses(conn: &Connection) -> Result<Vec<FixedExpense>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, category, amount, frequency, start_date, end_date, is_active, description
         FROM fixed_expenses ORDER BY start_date, name",
    )?;
    let rows = stmt.query_map([], |r| {
        Ok(FixedExpense {
            id: r.get(0)?,
            name: r.get(1)?,
            category: r.get(2)?,
            amount: decimal_at(r, 3)?,
            frequency: r.get(4)?,
            start_date: r.get(5)?,
            end_date: r.get(6)?,
            is_active: r.get(7)?,
            description: r.get(8)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Sum of every active expense's monthly contribution; annual amounts are
/// spread evenly over twelve months.
pub fn monthly_equivalent(conn: &Connection, month: YearMonth) -> Result<Decimal> {
    let total = list_fixed_expenses(conn)?
        .iter()
        .try_fold(Decimal::ZERO, |acc, f| {
            checked_add(acc, f.monthly_contribution(month), "fixed expenses")
        })?;
    debug!(%month, %total, "fixed expense monthly equivalent");
    Ok(total)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FixedSummary {
    pub month: YearMonth,
    pub total_annual: Decimal,
    pub total_monthly: Decimal,
    pub monthly_average: Decimal,
}

pub fn fixed_summary(conn: &Connection, month: YearMonth) -> Result<FixedSummary> {
    let mut s = FixedSummary {
        month,
        total_annual: Decimal::ZERO,
        total_monthly: Decimal::ZERO,
        monthly_average: Decimal::ZERO,
    };
    for f in list_fixed_expenses(conn)?.iter().filter(|f| f.is_active_in(month)) {
        match f.frequency {
            Frequency::Monthly => {
                s.total_monthly = checked_add(s.total_monthly, f.amount, "monthly total")?;
            }
            Frequency::Annual => {
                s.total_annual = checked_add(s.total_annual, f.amount, "annual total")?;
            }
        }
        s.monthly_average =
            checked_add(s.monthly_average, f.monthly_contribution(month), "monthly average")?;
    }
    Ok(s)
}
