// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::commands::{audit, fixed};
use crate::error::{LedgerError, Result};
use crate::models::{AccountType, BudgetCategory, SpendingPlan, YearMonth};
use crate::utils::{
    checked_add, checked_sub, decimal_at, id_for_budget_category, maybe_print_json, opt_decimal_at, parse_decimal,
    parse_month, percent, pretty_table,
};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use tracing::{debug, info, warn};

pub fn handle(conn: &mut Connection, m: &clap::ArgMatches) -> anyhow::Result<()> {
    match m.subcommand() {
        Some(("add-category", sub)) => {
            let name = sub.get_one::<String>("name").unwrap().trim();
            let order = *sub.get_one::<i64>("order").unwrap_or(&0);
            add_budget_category(
                conn,
                name,
                false,
                sub.get_one::<String>("color").map(String::as_str),
                sub.get_one::<String>("icon").map(String::as_str),
                order,
            )?;
            println!("Added budget category '{}'", name);
        }
        Some(("categories", _)) => {
            let data = list_budget_categories(conn)?
                .into_iter()
                .map(|c| {
                    vec![
                        c.name,
                        if c.is_fixed { "fixed".into() } else { String::new() },
                        c.sort_order.to_string(),
                    ]
                })
                .collect();
            println!("{}", pretty_table(&["Category", "Kind", "Order"], data));
        }
        Some(("set", sub)) => set(conn, sub)?,
        Some(("income", sub)) => {
            let month = parse_month(sub.get_one::<String>("month").unwrap())?;
            let amount = parse_decimal(sub.get_one::<String>("amount").unwrap())?;
            set_income(conn, month, amount)?;
            println!("Income for {} = {}", month, amount);
        }
        Some(("show", sub)) => {
            let month = parse_month(sub.get_one::<String>("month").unwrap())?;
            let plan = get_plan(conn, month)?;
            if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &plan)? {
                let names = category_names(conn)?;
                let data = plan
                    .planned
                    .iter()
                    .map(|(id, amount)| {
                        vec![
                            names.get(id).cloned().unwrap_or_else(|| id.to_string()),
                            format!("{:.0}", amount),
                        ]
                    })
                    .collect();
                println!("Income: {:.0}", plan.total_income);
                println!("{}", pretty_table(&["Category", "Planned"], data));
            }
        }
        Some(("report", sub)) => report(conn, sub)?,
        _ => {}
    }
    Ok(())
}

fn set(conn: &mut Connection, sub: &clap::ArgMatches) -> anyhow::Result<()> {
    let month = parse_month(sub.get_one::<String>("month").unwrap())?;
    let cat = sub.get_one::<String>("category").unwrap();
    let amount = parse_decimal(sub.get_one::<String>("amount").unwrap())?;
    let cat_id = id_for_budget_category(conn, cat)?;
    set_planned(conn, month, cat_id, amount)?;
    println!("Planned {} / {} = {}", month, cat.trim(), amount);
    Ok(())
}

pub fn add_budget_category(
    conn: &Connection,
    name: &str,
    is_fixed: bool,
    color: Option<&str>,
    icon: Option<&str>,
    sort_order: i64,
) -> Result<i64> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO budget_categories(name, is_fixed, color, icon, sort_order)
         VALUES (?1, ?2, COALESCE(?3, '#6B7280'), COALESCE(?4, ''), ?5)",
        params![name, is_fixed, color, icon, sort_order],
    )?;
    let id = tx.last_insert_rowid();
    audit::record(
        &tx,
        "budget_categories",
        id,
        "INSERT",
        None,
        Some(&json!({ "name": name, "is_fixed": is_fixed })),
    )?;
    tx.commit()?;
    info!(id, name, "budget category added");
    Ok(id)
}

pub fn list_budget_categories(conn: &Connection) -> Result<Vec<BudgetCategory>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, is_fixed, color, icon, sort_order
         FROM budget_categories ORDER BY sort_order, name",
    )?;
    let rows = stmt.query_map([], |r| {
        Ok(BudgetCategory {
            id: r.get(0)?,
            name: r.get(1)?,
            is_fixed: r.get(2)?,
            color: r.get(3)?,
            icon: r.get(4)?,
            sort_order: r.get(5)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

fn category_names(conn: &Connection) -> Result<HashMap<i64, String>> {
    Ok(list_budget_categories(conn)?
        .into_iter()
        .map(|c| (c.id, c.name))
        .collect())
}

fn ensure_plan(conn: &Connection, month: YearMonth) -> Result<i64> {
    conn.execute(
        "INSERT OR IGNORE INTO spending_plans(year, month) VALUES (?1, ?2)",
        params![month.year(), month.month()],
    )?;
    Ok(conn.query_row(
        "SELECT id FROM spending_plans WHERE year=?1 AND month=?2",
        params![month.year(), month.month()],
        |r| r.get(0),
    )?)
}

/// Sets the planned amount for one category. The fixed category is derived
/// from fixed expenses and cannot be written.
pub fn set_planned(
    conn: &mut Connection,
    month: YearMonth,
    category_id: i64,
    amount: Decimal,
) -> Result<()> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let category: Option<(String, bool)> = tx
        .query_row(
            "SELECT name, is_fixed FROM budget_categories WHERE id=?1",
            params![category_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let name = match category {
        None => return Err(LedgerError::not_found("budget category", category_id)),
        Some((name, true)) => {
            warn!(category_id, "refusing to plan the fixed category");
            return Err(LedgerError::ReadOnlyCategory(name));
        }
        Some((name, false)) => name,
    };
    if amount < Decimal::ZERO {
        return Err(LedgerError::invalid_input(format!(
            "planned amount must not be negative, got {}",
            amount
        )));
    }

    let plan_id = ensure_plan(&tx, month)?;
    tx.execute(
        "INSERT INTO spending_plan_items(plan_id, category_id, planned) VALUES (?1, ?2, ?3)
         ON CONFLICT(plan_id, category_id) DO UPDATE SET planned=excluded.planned",
        params![plan_id, category_id, amount.to_string()],
    )?;
    tx.execute(
        "UPDATE spending_plans SET updated_at=datetime('now') WHERE id=?1",
        params![plan_id],
    )?;
    audit::record(
        &tx,
        "spending_plans",
        plan_id,
        "UPDATE",
        None,
        Some(&json!({ "category": name, "planned": amount })),
    )?;
    tx.commit()?;
    info!(%month, category = %name, %amount, "planned amount set");
    Ok(())
}

pub fn set_income(conn: &mut Connection, month: YearMonth, amount: Decimal) -> Result<()> {
    if amount < Decimal::ZERO {
        return Err(LedgerError::invalid_input(format!(
            "income must not be negative, got {}",
            amount
        )));
    }
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let plan_id = ensure_plan(&tx, month)?;
    tx.execute(
        "UPDATE spending_plans SET total_income=?1, updated_at=datetime('now') WHERE id=?2",
        params![amount.to_string(), plan_id],
    )?;
    audit::record(
        &tx,
        "spending_plans",
        plan_id,
        "UPDATE",
        None,
        Some(&json!({ "total_income": amount })),
    )?;
    tx.commit()?;
    info!(%month, %amount, "income set");
    Ok(())
}

pub fn get_plan(conn: &Connection, month: YearMonth) -> Result<SpendingPlan> {
    let head: Option<(i64, Decimal)> = conn
        .query_row(
            "SELECT id, total_income FROM spending_plans WHERE year=?1 AND month=?2",
            params![month.year(), month.month()],
            |r| Ok((r.get(0)?, decimal_at(r, 1)?)),
        )
        .optional()?;
    let (id, total_income) =
        head.ok_or_else(|| LedgerError::not_found("spending plan", month))?;

    let mut stmt = conn.prepare(
        "SELECT i.category_id, i.planned FROM spending_plan_items i
         JOIN budget_categories c ON i.category_id=c.id
         WHERE i.plan_id=?1 ORDER BY c.sort_order, c.name",
    )?;
    let planned = stmt
        .query_map(params![id], |r| Ok((r.get(0)?, decimal_at(r, 1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(SpendingPlan {
        id,
        month,
        total_income,
        planned,
    })
}

/// Ledger activity for the month bucketed by the budget category of each
/// mapped account, signed by the account's type.
pub fn actual_by_category(conn: &Connection, month: YearMonth) -> Result<HashMap<i64, Decimal>> {
    let mut stmt = conn.prepare(
        "SELECT a.budget_category_id, c.type, e.debit_amount, e.credit_amount
         FROM transaction_entries e
         JOIN transactions t ON e.transaction_id=t.id
         JOIN accounts a ON e.account_id=a.id
         JOIN account_categories c ON a.category_id=c.id
         WHERE a.budget_category_id IS NOT NULL AND t.date>=?1 AND t.date<?2",
    )?;
    let mut rows = stmt.query(params![month.first_day(), month.next().first_day()])?;
    let mut actual: HashMap<i64, Decimal> = HashMap::new();
    while let Some(r) = rows.next()? {
        let category_id: i64 = r.get(0)?;
        let typ: AccountType = r.get(1)?;
        let debit = opt_decimal_at(r, 2)?.unwrap_or_default();
        let credit = opt_decimal_at(r, 3)?.unwrap_or_default();
        let slot = actual.entry(category_id).or_default();
        *slot = checked_add(*slot, typ.signed(debit, credit), "category spend")?;
    }
    Ok(actual)
}

/// `actual / planned * 100`, or zero when nothing was planned.
pub fn achievement_rate(planned: Decimal, actual: Decimal) -> Decimal {
    percent(actual, planned)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Band {
    OnTrack,
    Caution,
    OverBudget,
}

impl Band {
    pub fn from_rate(rate: Decimal) -> Self {
        if rate <= Decimal::from(80) {
            Band::OnTrack
        } else if rate <= Decimal::ONE_HUNDRED {
            Band::Caution
        } else {
            Band::OverBudget
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Band::OnTrack => "on track",
            Band::Caution => "caution",
            Band::OverBudget => "over budget",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileRow {
    pub category_id: i64,
    pub category: String,
    pub is_fixed: bool,
    pub planned: Decimal,
    pub actual: Decimal,
    pub difference: Decimal,
    pub achievement_rate: Decimal,
    pub band: Band,
}

#[derive(Debug, Clone, Serialize)]
pub struct Reconciliation {
    pub month: YearMonth,
    pub rows: Vec<ReconcileRow>,
    pub total_planned: Decimal,
    pub total_actual: Decimal,
    pub total_income: Decimal,
    pub remaining: Decimal,
    pub overall_rate: Decimal,
    pub overall_band: Band,
}

/// Planned against actual for every budget category of the month, read in
/// one snapshot.
pub fn reconcile(conn: &Connection, month: YearMonth) -> Result<Reconciliation> {
    let snap = conn.unchecked_transaction()?;
    let plan = get_plan(&snap, month)?;
    let planned_by_id: HashMap<i64, Decimal> = plan.planned.iter().copied().collect();
    let actual_by_id = actual_by_category(&snap, month)?;
    let fixed_planned = fixed::monthly_equivalent(&snap, month)?;

    let mut rows = Vec::new();
    for cat in list_budget_categories(&snap)? {
        let planned = if cat.is_fixed {
            fixed_planned
        } else {
            planned_by_id.get(&cat.id).copied().unwrap_or_default()
        };
        let actual = actual_by_id.get(&cat.id).copied().unwrap_or_default();
        let rate = achievement_rate(planned, actual);
        rows.push(ReconcileRow {
            category_id: cat.id,
            category: cat.name,
            is_fixed: cat.is_fixed,
            planned,
            actual,
            difference: checked_sub(actual, planned, "budget difference")?,
            achievement_rate: rate,
            band: Band::from_rate(rate),
        });
    }
    snap.finish()?;

    let total_planned = rows
        .iter()
        .try_fold(Decimal::ZERO, |acc, r| checked_add(acc, r.planned, "total planned"))?;
    let total_actual = rows
        .iter()
        .try_fold(Decimal::ZERO, |acc, r| checked_add(acc, r.actual, "total actual"))?;
    let overall_rate = achievement_rate(total_planned, total_actual);
    debug!(%month, %total_planned, %total_actual, "reconciled");
    Ok(Reconciliation {
        month,
        rows,
        total_planned,
        total_actual,
        total_income: plan.total_income,
        remaining: checked_sub(plan.total_income, total_planned, "remaining income")?,
        overall_rate,
        overall_band: Band::from_rate(overall_rate),
    })
}

fn report(conn: &Connection, sub: &clap::ArgMatches) -> anyhow::Result<()> {
    let month = parse_month(sub.get_one::<String>("month").unwrap())?;
    let r = reconcile(conn, month)?;
    if maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &r)? {
        return Ok(());
    }
    let mut data: Vec<Vec<String>> = r
        .rows
        .iter()
        .map(|row| {
            vec![
                row.category.clone(),
                format!("{:.0}", row.planned),
                format!("{:.0}", row.actual),
                format!("{:.0}", row.difference),
                format!("{:.1}%", row.achievement_rate),
                row.band.label().into(),
            ]
        })
        .collect();
    data.push(vec![
        "Total".into(),
        format!("{:.0}", r.total_planned),
        format!("{:.0}", r.total_actual),
        format!("{:.0}", r.total_actual - r.total_planned),
        format!("{:.1}%", r.overall_rate),
        r.overall_band.label().into(),
    ]);
    println!(
        "{}",
        pretty_table(
            &["Category", "Planned", "Actual", "Difference", "Rate", "Status"],
            data
        )
    );
    println!(
        "Income {:.0}, planned {:.0}, remaining {:.0}",
        r.total_income, r.total_planned, r.remaining
    );
    Ok(())
}
