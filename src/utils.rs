// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::error::{LedgerError, Result};
use crate::models::{MONTH_YEARS, YearMonth};
use anyhow::Context;
use chrono::{Datelike, NaiveDate};
use comfy_table::{Cell, Table, presets::UTF8_FULL};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use rust_decimal::Decimal;

pub fn parse_date(s: &str) -> anyhow::Result<NaiveDate> {
    let date = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", s))?;
    if !MONTH_YEARS.contains(&date.year()) {
        anyhow::bail!("Date '{}' is out of range", s.trim());
    }
    Ok(date)
}

pub fn parse_month(s: &str) -> anyhow::Result<YearMonth> {
    Ok(s.parse::<YearMonth>()?)
}

pub fn parse_decimal(s: &str) -> anyhow::Result<Decimal> {
    s.trim()
        .replace(',', "")
        .parse::<Decimal>()
        .with_context(|| format!("Invalid decimal '{}'", s))
}

pub fn fmt_money(d: &Decimal, ccy: &str) -> String {
    format!("{} {}", ccy, d.round_dp(2))
}

/// `part` as a percentage of `whole`; zero when `whole` is zero.
pub fn percent(part: Decimal, whole: Decimal) -> Decimal {
    if whole.is_zero() {
        return Decimal::ZERO;
    }
    part.checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|scaled| scaled.checked_div(whole))
        .or_else(|| part.checked_div(whole)?.checked_mul(Decimal::ONE_HUNDRED))
        .unwrap_or(if part.is_sign_negative() == whole.is_sign_negative() {
            Decimal::MAX
        } else {
            Decimal::MIN
        })
}

/// Adds two amounts, naming `what` overflowed instead of panicking.
pub fn checked_add(a: Decimal, b: Decimal, what: &str) -> Result<Decimal> {
    a.checked_add(b)
        .ok_or_else(|| LedgerError::invalid_input(format!("{} overflows", what)))
}

pub fn checked_sub(a: Decimal, b: Decimal, what: &str) -> Result<Decimal> {
    a.checked_sub(b)
        .ok_or_else(|| LedgerError::invalid_input(format!("{} overflows", what)))
}

pub fn pretty_table(headers: &[&str], rows: Vec<Vec<String>>) -> Table {
    let mut t = Table::new();
    t.load_preset(UTF8_FULL);
    t.set_header(headers.iter().map(|h| Cell::new(*h)));
    for r in rows {
        t.add_row(r.into_iter().map(Cell::new));
    }
    t
}

pub fn maybe_print_json<T: serde::Serialize>(
    json_flag: bool,
    jsonl_flag: bool,
    v: &T,
) -> anyhow::Result<bool> {
    if json_flag {
        println!("{}", serde_json::to_string_pretty(v)?);
        return Ok(true);
    }
    if jsonl_flag {
        let val = serde_json::to_value(v)?;
        if let Some(arr) = val.as_array() {
            for item in arr {
                println!("{}", serde_json::to_string(item)?);
            }
        } else {
            println!("{}", serde_json::to_string(&val)?);
        }
        return Ok(true);
    }
    Ok(false)
}

/// Reads a TEXT column holding a decimal amount.
pub fn decimal_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let raw: String = row.get(idx)?;
    parse_stored(idx, &raw)
}

pub fn opt_decimal_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Decimal>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| parse_stored(idx, &s)).transpose()
}

fn parse_stored(idx: usize, raw: &str) -> rusqlite::Result<Decimal> {
    Decimal::from_str_exact(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn lookup_id(conn: &Connection, sql: &str, key: &str, kind: &'static str) -> Result<i64> {
    conn.query_row(sql, params![key.trim()], |r| r.get(0))
        .optional()?
        .ok_or_else(|| LedgerError::not_found(kind, key.trim()))
}

pub fn id_for_account(conn: &Connection, name: &str) -> Result<i64> {
    lookup_id(conn, "SELECT id FROM accounts WHERE name=?1", name, "account")
}

pub fn id_for_category(conn: &Connection, name: &str) -> Result<i64> {
    lookup_id(
        conn,
        "SELECT id FROM account_categories WHERE name=?1",
        name,
        "account category",
    )
}

pub fn id_for_budget_category(conn: &Connection, name: &str) -> Result<i64> {
    lookup_id(
        conn,
        "SELECT id FROM budget_categories WHERE name=?1",
        name,
        "budget category",
    )
}

pub fn id_for_card(conn: &Connection, name: &str) -> Result<i64> {
    lookup_id(conn, "SELECT id FROM cards WHERE name=?1", name, "card")
}

pub fn id_for_asset(conn: &Connection, symbol: &str) -> Result<i64> {
    lookup_id(conn, "SELECT id FROM assets WHERE symbol=?1", symbol, "asset")
}

pub fn get_currency(conn: &Connection) -> Result<String> {
    let v: Option<String> = conn
        .query_row("SELECT value FROM settings WHERE key='currency'", [], |r| {
            r.get(0)
        })
        .optional()?;
    Ok(v.unwrap_or_else(|| "KRW".to_string()))
}

pub fn set_currency(conn: &Connection, ccy: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value) VALUES('currency', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        params![ccy.trim().to_uppercase()],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_guards_zero_denominator() {
        assert!(percent(Decimal::from(50_000), Decimal::ZERO).is_zero());
        assert_eq!(
            percent(Decimal::from(100_000), Decimal::from(100_000)),
            Decimal::from(100)
        );
        assert_eq!(
            percent(Decimal::from(1), Decimal::from(8)),
            Decimal::from_str_exact("12.5").unwrap()
        );
    }

    #[test]
    fn parse_decimal_accepts_grouping_commas() {
        assert_eq!(
            parse_decimal(" 1,200,000 ").unwrap(),
            Decimal::from(1_200_000)
        );
        assert!(parse_decimal("12a").is_err());
    }

    #[test]
    fn huge_amounts_do_not_panic() {
        assert_eq!(
            percent(Decimal::MAX, Decimal::MAX),
            Decimal::ONE_HUNDRED
        );
        assert_eq!(percent(Decimal::MAX, Decimal::new(1, 20)), Decimal::MAX);
        assert!(checked_add(Decimal::MAX, Decimal::ONE, "total").is_err());
        assert!(parse_date("262142-12-01").is_err());
        assert!(parse_date("9999-12-31").is_ok());
    }
}
