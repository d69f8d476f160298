// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::error::{LedgerError, Result};
use crate::models::{AccountType, YearMonth};
use crate::utils::{
    checked_add, checked_sub, fmt_money, get_currency, id_for_account, maybe_print_json,
    opt_decimal_at, parse_date, parse_month, percent, pretty_table,
};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, params};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> anyhow::Result<()> {
    match m.subcommand() {
        Some(("account", sub)) => {
            let name = sub.get_one::<String>("name").unwrap();
            let as_of = as_of_arg(sub)?;
            let bal = balance_of(conn, id_for_account(conn, name)?, as_of)?;
            println!("{}: {}", name.trim(), fmt_money(&bal, &get_currency(conn)?));
        }
        Some(("all", sub)) => all(conn, sub)?,
        Some(("networth", sub)) => {
            let as_of = as_of_arg(sub)?;
            let ccy = get_currency(conn)?;
            let worth = net_worth(conn, as_of)?;
            let assets = total_assets(conn, as_of)?;
            if !maybe_print_json(
                sub.get_flag("json"),
                sub.get_flag("jsonl"),
                &serde_json::json!({ "total_assets": assets, "net_worth": worth }),
            )? {
                println!("Total assets: {}", fmt_money(&assets, &ccy));
                println!("Net worth:    {}", fmt_money(&worth, &ccy));
            }
        }
        Some(("overview", sub)) => overview(conn, sub)?,
        Some(("cashflow", sub)) => {
            let month = parse_month(sub.get_one::<String>("month").unwrap())?;
            let cf = cashflow(conn, month)?;
            if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &cf)? {
                println!(
                    "{}",
                    pretty_table(
                        &["Month", "Income", "Expense", "Net"],
                        vec![vec![
                            cf.month.to_string(),
                            format!("{:.2}", cf.income),
                            format!("{:.2}", cf.expense),
                            format!("{:.2}", cf.net),
                        ]]
                    )
                );
            }
        }
        _ => {}
    }
    Ok(())
}

fn as_of_arg(sub: &clap::ArgMatches) -> anyhow::Result<Option<NaiveDate>> {
    match sub.get_one::<String>("as-of") {
        Some(d) => Ok(Some(parse_date(d)?)),
        None => Ok(None),
    }
}

/// Debit and credit totals of one account's entries dated in
/// `[from, until]`; open bounds when `None`.
fn entry_totals(
    conn: &Connection,
    account_id: i64,
    from: Option<NaiveDate>,
    until: Option<NaiveDate>,
) -> Result<(Decimal, Decimal)> {
    let mut stmt = conn.prepare_cached(
        "SELECT e.debit_amount, e.credit_amount
         FROM transaction_entries e JOIN transactions t ON e.transaction_id=t.id
         WHERE e.account_id=?1
           AND (?2 IS NULL OR t.date>=?2)
           AND (?3 IS NULL OR t.date<=?3)",
    )?;
    let mut rows = stmt.query(params![account_id, from, until])?;
    let (mut debit, mut credit) = (Decimal::ZERO, Decimal::ZERO);
    while let Some(r) = rows.next()? {
        debit = checked_add(debit, opt_decimal_at(r, 0)?.unwrap_or_default(), "debit total")?;
        credit = checked_add(credit, opt_decimal_at(r, 1)?.unwrap_or_default(), "credit total")?;
    }
    Ok((debit, credit))
}

/// Signed balance of an account from every entry on or before `as_of`
/// (all entries when `None`).
pub fn balance_of(conn: &Connection, account_id: i64, as_of: Option<NaiveDate>) -> Result<Decimal> {
    let typ: AccountType = conn
        .query_row(
            "SELECT c.type FROM accounts a JOIN account_categories c ON a.category_id=c.id
             WHERE a.id=?1",
            params![account_id],
            |r| r.get(0),
        )
        .optional()?
        .ok_or_else(|| LedgerError::not_found("account", account_id))?;
    let (debit, credit) = entry_totals(conn, account_id, None, as_of)?;
    Ok(typ.signed(debit, credit))
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountBalance {
    pub account_id: i64,
    pub name: String,
    pub category: String,
    pub account_type: AccountType,
    pub is_active: bool,
    pub balance: Decimal,
}

/// Every account, inactive ones included, with its balance as of the date.
pub fn balances(conn: &Connection, as_of: Option<NaiveDate>) -> Result<Vec<AccountBalance>> {
    let mut stmt = conn.prepare(
        "SELECT a.id, a.name, c.name, c.type, a.is_active
         FROM accounts a JOIN account_categories c ON a.category_id=c.id
         ORDER BY c.sort_order, c.name, a.name",
    )?;
    let accounts = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, i64>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, AccountType>(3)?,
                r.get::<_, bool>(4)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut out = Vec::with_capacity(accounts.len());
    for (account_id, name, category, account_type, is_active) in accounts {
        let (debit, credit) = entry_totals(conn, account_id, None, as_of)?;
        out.push(AccountBalance {
            account_id,
            name,
            category,
            account_type,
            is_active,
            balance: account_type.signed(debit, credit),
        });
    }
    Ok(out)
}

fn sum_of(rows: &[AccountBalance], typ: AccountType) -> Result<Decimal> {
    rows.iter()
        .filter(|b| b.account_type == typ)
        .try_fold(Decimal::ZERO, |acc, b| checked_add(acc, b.balance, typ.as_str()))
}

/// Asset balances minus liability balances.
pub fn net_worth(conn: &Connection, as_of: Option<NaiveDate>) -> Result<Decimal> {
    let snap = conn.unchecked_transaction()?;
    let rows = balances(&snap, as_of)?;
    snap.finish()?;
    checked_sub(
        sum_of(&rows, AccountType::Asset)?,
        sum_of(&rows, AccountType::Liability)?,
        "net worth",
    )
}

pub fn total_assets(conn: &Connection, as_of: Option<NaiveDate>) -> Result<Decimal> {
    let snap = conn.unchecked_transaction()?;
    let rows = balances(&snap, as_of)?;
    snap.finish()?;
    sum_of(&rows, AccountType::Asset)
}

/// Share of `amount` in `denominator` as a percentage. Callers pass the
/// denominator explicitly, usually `total_assets`.
pub fn portfolio_share(amount: Decimal, denominator: Decimal) -> Decimal {
    percent(amount, denominator)
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryOverview {
    pub category: String,
    pub account_type: AccountType,
    /// Liabilities are reported negative.
    pub amount: Decimal,
    pub account_count: usize,
    pub share: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssetOverview {
    pub as_of: Option<NaiveDate>,
    pub categories: Vec<CategoryOverview>,
    pub total_assets: Decimal,
    pub total_debt: Decimal,
    pub net_worth: Decimal,
}

/// Asset and liability balances grouped by account category, read in one
/// snapshot.
pub fn asset_overview(conn: &Connection, as_of: Option<NaiveDate>) -> Result<AssetOverview> {
    let snap = conn.unchecked_transaction()?;
    let rows = balances(&snap, as_of)?;
    snap.finish()?;

    let total_assets = sum_of(&rows, AccountType::Asset)?;
    let total_debt = sum_of(&rows, AccountType::Liability)?;

    let mut grouped: BTreeMap<(bool, String), (AccountType, Decimal, usize)> = BTreeMap::new();
    for b in rows.iter().filter(|b| {
        matches!(b.account_type, AccountType::Asset | AccountType::Liability)
    }) {
        let signed = match b.account_type {
            AccountType::Liability => -b.balance,
            _ => b.balance,
        };
        let key = (b.account_type == AccountType::Liability, b.category.clone());
        let slot = grouped
            .entry(key)
            .or_insert((b.account_type, Decimal::ZERO, 0));
        slot.1 = checked_add(slot.1, signed, "category amount")?;
        slot.2 += 1;
    }
    let categories = grouped
        .into_iter()
        .map(|((_, category), (account_type, amount, account_count))| CategoryOverview {
            share: portfolio_share(amount, total_assets),
            category,
            account_type,
            amount,
            account_count,
        })
        .collect();
    debug!(%total_assets, %total_debt, "asset overview");
    Ok(AssetOverview {
        as_of,
        categories,
        total_assets,
        total_debt,
        net_worth: checked_sub(total_assets, total_debt, "net worth")?,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cashflow {
    pub month: YearMonth,
    pub income: Decimal,
    pub expense: Decimal,
    pub net: Decimal,
}

/// Income and expense account movement within the month.
pub fn cashflow(conn: &Connection, month: YearMonth) -> Result<Cashflow> {
    let mut stmt = conn.prepare(
        "SELECT c.type, e.debit_amount, e.credit_amount
         FROM transaction_entries e
         JOIN transactions t ON e.transaction_id=t.id
         JOIN accounts a ON e.account_id=a.id
         JOIN account_categories c ON a.category_id=c.id
         WHERE c.type IN ('income','expense') AND t.date>=?1 AND t.date<?2",
    )?;
    let mut rows = stmt.query(params![month.first_day(), month.next().first_day()])?;
    let (mut income, mut expense) = (Decimal::ZERO, Decimal::ZERO);
    while let Some(r) = rows.next()? {
        let typ: AccountType = r.get(0)?;
        let debit = opt_decimal_at(r, 1)?.unwrap_or_default();
        let credit = opt_decimal_at(r, 2)?.unwrap_or_default();
        match typ {
            AccountType::Income => {
                income = checked_add(income, typ.signed(debit, credit), "income")?;
            }
            _ => expense = checked_add(expense, typ.signed(debit, credit), "expense")?,
        }
    }
    Ok(Cashflow {
        month,
        income,
        expense,
        net: checked_sub(income, expense, "net cashflow")?,
    })
}

fn all(conn: &Connection, sub: &clap::ArgMatches) -> anyhow::Result<()> {
    let rows = balances(conn, as_of_arg(sub)?)?;
    if maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &rows)? {
        return Ok(());
    }
    let data = rows
        .into_iter()
        .map(|b| {
            vec![
                b.name,
                b.category,
                b.account_type.to_string(),
                format!("{:.2}", b.balance),
            ]
        })
        .collect();
    println!(
        "{}",
        pretty_table(&["Account", "Category", "Type", "Balance"], data)
    );
    Ok(())
}

fn overview(conn: &Connection, sub: &clap::ArgMatches) -> anyhow::Result<()> {
    let o = asset_overview(conn, as_of_arg(sub)?)?;
    if maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &o)? {
        return Ok(());
    }
    let data = o
        .categories
        .iter()
        .map(|c| {
            vec![
                c.category.clone(),
                c.account_type.to_string(),
                format!("{:.0}", c.amount),
                c.account_count.to_string(),
                format!("{:.1}%", c.share),
            ]
        })
        .collect();
    println!(
        "{}",
        pretty_table(&["Category", "Type", "Amount", "Accounts", "Share"], data)
    );
    let ccy = get_currency(conn)?;
    println!(
        "Assets {} / Debt {} / Net worth {}",
        fmt_money(&o.total_assets, &ccy),
        fmt_money(&o.total_debt, &ccy),
        fmt_money(&o.net_worth, &ccy)
    );
    Ok(())
}
