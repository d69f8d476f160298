// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::commands::audit;
use crate::error::{LedgerError, Result};
use crate::models::{Asset, AssetKind, TradeSide};
use crate::utils::{
    checked_add, checked_sub, decimal_at, get_currency, id_for_asset, maybe_print_json,
    opt_decimal_at, parse_date, parse_decimal, percent, pretty_table,
};
use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use tracing::{debug, info, warn};

pub fn handle(conn: &mut Connection, m: &clap::ArgMatches) -> anyhow::Result<()> {
    match m.subcommand() {
        Some(("add-asset", sub)) => {
            let symbol = sub.get_one::<String>("symbol").unwrap().trim().to_uppercase();
            let name = sub.get_one::<String>("name").unwrap().trim();
            let kind: AssetKind = sub.get_one::<String>("kind").unwrap().parse()?;
            let currency = sub
                .get_one::<String>("currency")
                .map(|s| s.trim().to_uppercase())
                .unwrap_or(get_currency(conn)?);
            add_asset(conn, &symbol, name, kind, &currency)?;
            println!("Added asset {} ({}) {}", symbol, name, currency);
        }
        Some(("list-assets", sub)) => {
            let assets = list_assets(conn)?;
            if maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &assets)? {
                return Ok(());
            }
            let data = assets
                .into_iter()
                .map(|a| {
                    vec![
                        a.symbol,
                        a.name,
                        a.kind.to_string(),
                        a.currency,
                        a.current_price.map(|p| p.to_string()).unwrap_or_default(),
                        a.last_updated.map(|d| d.to_string()).unwrap_or_default(),
                    ]
                })
                .collect();
            println!(
                "{}",
                pretty_table(&["Symbol", "Name", "Kind", "CCY", "Price", "Updated"], data)
            );
        }
        Some(("price", sub)) => {
            let symbol = sub.get_one::<String>("symbol").unwrap();
            let price = parse_decimal(sub.get_one::<String>("price").unwrap())?;
            let date = match sub.get_one::<String>("date") {
                Some(d) => parse_date(d)?,
                None => Utc::now().date_naive(),
            };
            set_price(conn, id_for_asset(conn, symbol)?, price, date)?;
            println!("Price of {} set to {} on {}", symbol.trim(), price, date);
        }
        Some(("buy", sub)) => trade(conn, sub, TradeSide::Buy)?,
        Some(("sell", sub)) => trade(conn, sub, TradeSide::Sell)?,
        Some(("dividend", sub)) => {
            let symbol = sub.get_one::<String>("symbol").unwrap();
            let asset_id = id_for_asset(conn, symbol)?;
            let amount = parse_decimal(sub.get_one::<String>("amount").unwrap())?;
            let ex_date = parse_date(sub.get_one::<String>("ex-date").unwrap())?;
            let pay_date = match sub.get_one::<String>("pay-date") {
                Some(d) => parse_date(d)?,
                None => ex_date,
            };
            let currency = asset_currency(conn, asset_id)?;
            record_dividend(conn, asset_id, amount, &currency, ex_date, pay_date)?;
            println!("Recorded dividend {} {} for {}", amount, currency, symbol.trim());
        }
        Some(("positions", sub)) => {
            let rows = positions(conn)?;
            if maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &rows)? {
                return Ok(());
            }
            let data = rows
                .into_iter()
                .map(|p| {
                    vec![
                        p.symbol,
                        format!("{:.4}", p.quantity),
                        format!("{:.2}", p.average_cost),
                        format!("{:.2}", p.current_price),
                        format!("{:.2}", p.market_value),
                        format!("{:.2}", p.unrealized_gain),
                        format!("{:.2}", p.dividends),
                    ]
                })
                .collect();
            println!(
                "{}",
                pretty_table(
                    &["Symbol", "Qty", "Avg Cost", "Price", "Value", "Unrealized", "Dividends"],
                    data
                )
            );
        }
        Some(("summary", sub)) => {
            let s = portfolio_summary(conn)?;
            if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &s)? {
                println!(
                    "{}",
                    pretty_table(
                        &["Value", "Cost", "Unrealized", "Return", "Dividends"],
                        vec![vec![
                            format!("{:.2}", s.total_value),
                            format!("{:.2}", s.total_cost),
                            format!("{:.2}", s.unrealized_gain),
                            format!("{:.2}%", s.return_rate),
                            format!("{:.2}", s.dividends),
                        ]]
                    )
                );
            }
        }
        Some(("snapshot", sub)) => {
            let date = match sub.get_one::<String>("date") {
                Some(d) => parse_date(d)?,
                None => Utc::now().date_naive(),
            };
            let snap = take_snapshot(conn, date)?;
            println!(
                "Snapshot {}: {:.2} {}",
                snap.date, snap.total_value, snap.currency
            );
        }
        Some(("snapshots", sub)) => {
            let rows = list_snapshots(conn)?;
            if maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &rows)? {
                return Ok(());
            }
            let data = rows
                .into_iter()
                .map(|s| {
                    vec![
                        s.date.to_string(),
                        format!("{:.2}", s.total_value),
                        format!("{:.2}", s.total_cost),
                        s.currency,
                    ]
                })
                .collect();
            println!(
                "{}",
                pretty_table(&["Date", "Value", "Cost", "CCY"], data)
            );
        }
        _ => {}
    }
    Ok(())
}

fn trade(conn: &mut Connection, sub: &clap::ArgMatches, side: TradeSide) -> anyhow::Result<()> {
    let symbol = sub.get_one::<String>("symbol").unwrap();
    let asset_id = id_for_asset(conn, symbol)?;
    let qty = parse_decimal(sub.get_one::<String>("quantity").unwrap())?;
    let price = parse_decimal(sub.get_one::<String>("price").unwrap())?;
    let date = parse_date(sub.get_one::<String>("date").unwrap())?;
    let description = sub.get_one::<String>("description").map(String::as_str);
    record_trade(conn, asset_id, side, qty, price, date, description)?;
    println!("Recorded {} {} x {} @ {}", side, qty, symbol.trim(), price);
    Ok(())
}

pub fn add_asset(
    conn: &Connection,
    symbol: &str,
    name: &str,
    kind: AssetKind,
    currency: &str,
) -> Result<i64> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO assets(symbol, name, kind, currency) VALUES (?1, ?2, ?3, ?4)",
        params![symbol, name, kind, currency],
    )?;
    let id = tx.last_insert_rowid();
    audit::record(
        &tx,
        "assets",
        id,
        "INSERT",
        None,
        Some(&json!({ "symbol": symbol, "kind": kind, "currency": currency })),
    )?;
    tx.commit()?;
    info!(id, symbol, "asset added");
    Ok(id)
}

pub fn list_assets(conn: &Connection) -> Result<Vec<Asset>> {
    let mut stmt = conn.prepare(
        "SELECT id, symbol, name, kind, currency, data_source, current_price, last_updated, is_active
         FROM assets ORDER BY symbol",
    )?;
    let rows = stmt.query_map([], |r| {
        Ok(Asset {
            id: r.get(0)?,
            symbol: r.get(1)?,
            name: r.get(2)?,
            kind: r.get(3)?,
            currency: r.get(4)?,
            data_source: r.get(5)?,
            current_price: opt_decimal_at(r, 6)?,
            last_updated: r.get(7)?,
            is_active: r.get(8)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

fn asset_currency(conn: &Connection, asset_id: i64) -> Result<String> {
    conn.query_row(
        "SELECT currency FROM assets WHERE id=?1",
        params![asset_id],
        |r| r.get(0),
    )
    .optional()?
    .ok_or_else(|| LedgerError::not_found("asset", asset_id))
}

/// Manual price update; there is no live price source.
pub fn set_price(conn: &Connection, asset_id: i64, price: Decimal, date: NaiveDate) -> Result<()> {
    if price <= Decimal::ZERO {
        return Err(LedgerError::invalid_input(format!(
            "price must be positive, got {}",
            price
        )));
    }
    let tx = conn.unchecked_transaction()?;
    let n = tx.execute(
        "UPDATE assets SET current_price=?1, last_updated=?2 WHERE id=?3",
        params![price.to_string(), date, asset_id],
    )?;
    if n == 0 {
        return Err(LedgerError::not_found("asset", asset_id));
    }
    audit::record(
        &tx,
        "assets",
        asset_id,
        "UPDATE",
        None,
        Some(&json!({ "current_price": price, "last_updated": date })),
    )?;
    tx.commit()?;
    debug!(asset_id, %price, %date, "price updated");
    Ok(())
}

fn trade_total(quantity: Decimal, price: Decimal) -> Result<Decimal> {
    quantity.checked_mul(price).ok_or_else(|| {
        LedgerError::invalid_input(format!("{} x {} overflows", quantity, price))
    })
}

fn take_from(held: Decimal, quantity: Decimal, on: NaiveDate) -> Result<Decimal> {
    if quantity > held {
        warn!(%quantity, %held, %on, "sell exceeds holdings");
        return Err(LedgerError::invalid_input(format!(
            "cannot sell {} units on {}, only {} held",
            quantity, on, held
        )));
    }
    Ok(held - quantity)
}

/// Replays every trade of the asset in (date, id) order with the new sell
/// slotted in after the trades already on its date. Holdings may not go
/// negative anywhere, so a backdated sell cannot starve a later one.
fn check_sell(conn: &Connection, asset_id: i64, quantity: Decimal, date: NaiveDate) -> Result<()> {
    let mut stmt = conn.prepare_cached(
        "SELECT date, side, quantity FROM asset_transactions WHERE asset_id=?1 ORDER BY date, id",
    )?;
    let mut rows = stmt.query(params![asset_id])?;
    let mut held = Decimal::ZERO;
    let mut pending = Some(quantity);
    while let Some(r) = rows.next()? {
        let on: NaiveDate = r.get(0)?;
        if on > date {
            if let Some(q) = pending.take() {
                held = take_from(held, q, date)?;
            }
        }
        let side: TradeSide = r.get(1)?;
        let qty = decimal_at(r, 2)?;
        held = match side {
            TradeSide::Buy => checked_add(held, qty, "holdings")?,
            TradeSide::Sell => take_from(held, qty, on)?,
        };
    }
    if let Some(q) = pending {
        take_from(held, q, date)?;
    }
    Ok(())
}

pub fn record_trade(
    conn: &mut Connection,
    asset_id: i64,
    side: TradeSide,
    quantity: Decimal,
    price: Decimal,
    date: NaiveDate,
    description: Option<&str>,
) -> Result<i64> {
    if quantity <= Decimal::ZERO || price <= Decimal::ZERO {
        return Err(LedgerError::invalid_input(format!(
            "quantity and price must be positive, got {} @ {}",
            quantity, price
        )));
    }
    let total = trade_total(quantity, price)?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let currency = asset_currency(&tx, asset_id)?;
    if side == TradeSide::Sell {
        check_sell(&tx, asset_id, quantity, date)?;
    }
    tx.execute(
        "INSERT INTO asset_transactions(asset_id, side, quantity, price, total_amount, currency, date, description)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            asset_id,
            side,
            quantity.to_string(),
            price.to_string(),
            total.to_string(),
            currency,
            date,
            description
        ],
    )?;
    let id = tx.last_insert_rowid();
    audit::record(
        &tx,
        "asset_transactions",
        id,
        "INSERT",
        None,
        Some(&json!({ "asset_id": asset_id, "side": side, "quantity": quantity, "price": price })),
    )?;
    tx.commit()?;
    info!(id, asset_id, %side, %quantity, %price, "trade recorded");
    Ok(id)
}

pub fn record_dividend(
    conn: &Connection,
    asset_id: i64,
    amount: Decimal,
    currency: &str,
    ex_date: NaiveDate,
    pay_date: NaiveDate,
) -> Result<i64> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::invalid_input(format!(
            "dividend must be positive, got {}",
            amount
        )));
    }
    if pay_date < ex_date {
        return Err(LedgerError::invalid_input(format!(
            "pay date {} is before ex-date {}",
            pay_date, ex_date
        )));
    }
    let tx = conn.unchecked_transaction()?;
    asset_currency(&tx, asset_id)?;
    tx.execute(
        "INSERT INTO dividends(asset_id, amount, currency, ex_date, pay_date)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![asset_id, amount.to_string(), currency, ex_date, pay_date],
    )?;
    let id = tx.last_insert_rowid();
    audit::record(
        &tx,
        "dividends",
        id,
        "INSERT",
        None,
        Some(&json!({ "asset_id": asset_id, "amount": amount })),
    )?;
    tx.commit()?;
    info!(id, asset_id, %amount, "dividend recorded");
    Ok(id)
}

#[derive(Debug, Clone, Serialize)]
pub struct Position {
    pub asset_id: i64,
    pub symbol: String,
    pub currency: String,
    pub quantity: Decimal,
    pub average_cost: Decimal,
    pub cost_basis: Decimal,
    pub current_price: Decimal,
    pub market_value: Decimal,
    pub unrealized_gain: Decimal,
    pub realized_gain: Decimal,
    pub dividends: Decimal,
}

fn per_unit(total: Decimal, quantity: Decimal) -> Result<Decimal> {
    if quantity.is_zero() {
        return Ok(Decimal::ZERO);
    }
    total.checked_div(quantity).ok_or_else(|| {
        LedgerError::invalid_input(format!("{} / {} overflows", total, quantity))
    })
}

/// Holdings under the average cost method. Assets without a price are
/// valued at their average cost.
pub fn positions(conn: &Connection) -> Result<Vec<Position>> {
    let assets = list_assets(conn)?;
    let mut index_by_id = HashMap::with_capacity(assets.len());
    let mut out: Vec<Position> = Vec::with_capacity(assets.len());
    let mut prices = Vec::with_capacity(assets.len());
    for a in assets {
        index_by_id.insert(a.id, out.len());
        prices.push(a.current_price);
        out.push(Position {
            asset_id: a.id,
            symbol: a.symbol,
            currency: a.currency,
            quantity: Decimal::ZERO,
            average_cost: Decimal::ZERO,
            cost_basis: Decimal::ZERO,
            current_price: Decimal::ZERO,
            market_value: Decimal::ZERO,
            unrealized_gain: Decimal::ZERO,
            realized_gain: Decimal::ZERO,
            dividends: Decimal::ZERO,
        });
    }
    if out.is_empty() {
        return Ok(out);
    }

    let mut trades_stmt = conn.prepare_cached(
        "SELECT asset_id, side, quantity, price FROM asset_transactions ORDER BY date, id",
    )?;
    let mut trades = trades_stmt.query([])?;
    while let Some(r) = trades.next()? {
        let asset_id: i64 = r.get(0)?;
        let Some(&idx) = index_by_id.get(&asset_id) else {
            continue;
        };
        let side: TradeSide = r.get(1)?;
        let qty = decimal_at(r, 2)?;
        let price = decimal_at(r, 3)?;
        let p = &mut out[idx];
        match side {
            TradeSide::Buy => {
                p.quantity = checked_add(p.quantity, qty, "position quantity")?;
                p.cost_basis = checked_add(p.cost_basis, trade_total(qty, price)?, "cost basis")?;
            }
            TradeSide::Sell => {
                let avg = per_unit(p.cost_basis, p.quantity)?;
                let gain = trade_total(qty, price)?;
                let released = trade_total(qty, avg)?;
                p.realized_gain = checked_add(
                    p.realized_gain,
                    checked_sub(gain, released, "realized gain")?,
                    "realized gain",
                )?;
                p.cost_basis = checked_sub(p.cost_basis, released, "cost basis")?;
                p.quantity -= qty;
            }
        }
    }

    let mut div_stmt = conn.prepare_cached("SELECT asset_id, amount FROM dividends")?;
    let mut divs = div_stmt.query([])?;
    while let Some(r) = divs.next()? {
        let asset_id: i64 = r.get(0)?;
        if let Some(&idx) = index_by_id.get(&asset_id) {
            out[idx].dividends = checked_add(out[idx].dividends, decimal_at(r, 1)?, "dividends")?;
        }
    }

    let mut held = Vec::with_capacity(out.len());
    for (mut p, price) in out.into_iter().zip(prices) {
        if p.quantity.is_zero() {
            continue;
        }
        p.average_cost = per_unit(p.cost_basis, p.quantity)?;
        p.current_price = price.unwrap_or(p.average_cost);
        p.market_value = trade_total(p.quantity, p.current_price)?;
        p.unrealized_gain = checked_sub(p.market_value, p.cost_basis, "unrealized gain")?;
        held.push(p);
    }
    Ok(held)
}

#[derive(Debug, Clone, Serialize)]
pub struct PortfolioSummary {
    pub positions: usize,
    pub total_value: Decimal,
    pub total_cost: Decimal,
    pub unrealized_gain: Decimal,
    pub return_rate: Decimal,
    pub dividends: Decimal,
}

fn summarize(held: &[Position], dividends: Decimal) -> Result<PortfolioSummary> {
    let total_value = held
        .iter()
        .try_fold(Decimal::ZERO, |acc, p| checked_add(acc, p.market_value, "portfolio value"))?;
    let total_cost = held
        .iter()
        .try_fold(Decimal::ZERO, |acc, p| checked_add(acc, p.cost_basis, "portfolio cost"))?;
    let unrealized_gain = checked_sub(total_value, total_cost, "unrealized gain")?;
    Ok(PortfolioSummary {
        positions: held.len(),
        total_value,
        total_cost,
        unrealized_gain,
        return_rate: percent(unrealized_gain, total_cost),
        dividends,
    })
}

fn all_dividends(conn: &Connection) -> Result<Decimal> {
    let mut stmt = conn.prepare_cached("SELECT amount FROM dividends")?;
    let mut rows = stmt.query([])?;
    let mut total = Decimal::ZERO;
    while let Some(r) = rows.next()? {
        total = checked_add(total, decimal_at(r, 0)?, "dividends")?;
    }
    Ok(total)
}

pub fn portfolio_summary(conn: &Connection) -> Result<PortfolioSummary> {
    let snap = conn.unchecked_transaction()?;
    let held = positions(&snap)?;
    let dividends = all_dividends(&snap)?;
    snap.finish()?;
    summarize(&held, dividends)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioSnapshot {
    pub date: NaiveDate,
    pub total_value: Decimal,
    pub total_cost: Decimal,
    pub currency: String,
}

/// Stores the portfolio's current value under `date`, replacing an
/// earlier snapshot of the same day.
pub fn take_snapshot(conn: &Connection, date: NaiveDate) -> Result<PortfolioSnapshot> {
    let tx = conn.unchecked_transaction()?;
    let summary = summarize(&positions(&tx)?, all_dividends(&tx)?)?;
    let currency = get_currency(&tx)?;
    tx.execute(
        "INSERT INTO portfolio_snapshots(date, total_value, total_cost, currency)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(date) DO UPDATE SET total_value=excluded.total_value,
             total_cost=excluded.total_cost, currency=excluded.currency,
             created_at=datetime('now')",
        params![
            date,
            summary.total_value.to_string(),
            summary.total_cost.to_string(),
            currency
        ],
    )?;
    let id: i64 = tx.query_row(
        "SELECT id FROM portfolio_snapshots WHERE date=?1",
        params![date],
        |r| r.get(0),
    )?;
    audit::record(
        &tx,
        "portfolio_snapshots",
        id,
        "INSERT",
        None,
        Some(&json!({ "date": date, "total_value": summary.total_value })),
    )?;
    tx.commit()?;
    info!(%date, total_value = %summary.total_value, "portfolio snapshot stored");
    Ok(PortfolioSnapshot {
        date,
        total_value: summary.total_value,
        total_cost: summary.total_cost,
        currency,
    })
}

/// Stored snapshots, oldest first.
pub fn list_snapshots(conn: &Connection) -> Result<Vec<PortfolioSnapshot>> {
    let mut stmt = conn.prepare(
        "SELECT date, total_value, total_cost, currency FROM portfolio_snapshots ORDER BY date",
    )?;
    let rows = stmt.query_map([], |r| {
        Ok(PortfolioSnapshot {
            date: r.get(0)?,
            total_value: decimal_at(r, 1)?,
            total_cost: decimal_at(r, 2)?,
            currency: r.get(3)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}
