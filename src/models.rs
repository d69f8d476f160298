// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::error::LedgerError;
use chrono::{Datelike, Days, Months, NaiveDate};
use rusqlite::ToSql;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Implements the text round trip (display, parsing, SQLite storage) for a
/// closed set of lowercase labels.
macro_rules! text_enum {
    ($name:ident, $what:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = LedgerError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    other => Err(LedgerError::invalid_input(format!(
                        "unknown {} '{}'",
                        $what, other
                    ))),
                }
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: LedgerError| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Asset,
    Liability,
    Equity,
    Income,
    Expense,
}

text_enum!(AccountType, "account type" {
    Asset => "asset",
    Liability => "liability",
    Equity => "equity",
    Income => "income",
    Expense => "expense",
});

impl AccountType {
    /// Asset and expense accounts grow on the debit side, the rest on credit.
    pub fn debit_normal(&self) -> bool {
        matches!(self, AccountType::Asset | AccountType::Expense)
    }

    pub fn signed(&self, debit: Decimal, credit: Decimal) -> Decimal {
        if self.debit_normal() {
            debit - credit
        } else {
            credit - debit
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Monthly,
    Annual,
}

text_enum!(Frequency, "frequency" {
    Monthly => "monthly",
    Annual => "annual",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardKind {
    Credit,
    Debit,
}

text_enum!(CardKind, "card type" {
    Credit => "credit",
    Debit => "debit",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Stock,
    Etf,
    Bond,
    Crypto,
    Currency,
    Other,
}

text_enum!(AssetKind, "asset type" {
    Stock => "stock",
    Etf => "etf",
    Bond => "bond",
    Crypto => "crypto",
    Currency => "currency",
    Other => "other",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

text_enum!(TradeSide, "trade side" {
    Buy => "buy",
    Sell => "sell",
});

/// A calendar month, stored as its first day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth(NaiveDate);

/// Years a month may be named in. Keeps `next`/`prev` well inside
/// chrono's representable range.
pub const MONTH_YEARS: std::ops::RangeInclusive<i32> = 1..=9999;

impl YearMonth {
    pub fn new(year: i32, month: u32) -> crate::error::Result<Self> {
        NaiveDate::from_ymd_opt(year, month, 1)
            .filter(|_| MONTH_YEARS.contains(&year))
            .map(YearMonth)
            .ok_or_else(|| LedgerError::invalid_input(format!("invalid month {year}-{month:02}")))
    }

    pub fn of(date: NaiveDate) -> Self {
        YearMonth(date - Days::new(u64::from(date.day0())))
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    pub fn month(&self) -> u32 {
        self.0.month()
    }

    pub fn first_day(&self) -> NaiveDate {
        self.0
    }

    /// The following month. Saturates at chrono's last month, which only
    /// a month derived from an out-of-range date through [`YearMonth::of`]
    /// can reach.
    pub fn next(&self) -> Self {
        self.0.checked_add_months(Months::new(1)).map_or(*self, YearMonth)
    }

    pub fn prev(&self) -> Self {
        self.0.checked_sub_months(Months::new(1)).map_or(*self, YearMonth)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.0 && date < self.next().0
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year(), self.month())
    }
}

impl FromStr for YearMonth {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        NaiveDate::parse_from_str(&format!("{s}-01"), "%Y-%m-%d")
            .ok()
            .filter(|d| MONTH_YEARS.contains(&d.year()))
            .map(YearMonth)
            .ok_or_else(|| LedgerError::invalid_input(format!("invalid month '{s}', expected YYYY-MM")))
    }
}

impl Serialize for YearMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountCategory {
    pub id: i64,
    pub name: String,
    pub r#type: AccountType,
    pub description: Option<String>,
    pub icon: String,
    pub color: String,
    pub sort_order: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Account {
    pub id: i64,
    pub category_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub budget_category_id: Option<i64>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Transaction {
    pub id: i64,
    pub date: NaiveDate,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransactionEntry {
    pub id: i64,
    pub transaction_id: i64,
    pub account_id: i64,
    pub debit: Option<Decimal>,
    pub credit: Option<Decimal>,
    pub memo: Option<String>,
}

/// One line of a transaction about to be recorded. Exactly one of `debit`
/// and `credit` must be set.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewEntry {
    pub account_id: i64,
    pub debit: Option<Decimal>,
    pub credit: Option<Decimal>,
    pub memo: Option<String>,
}

impl NewEntry {
    pub fn debit(account_id: i64, amount: Decimal) -> Self {
        NewEntry {
            account_id,
            debit: Some(amount),
            credit: None,
            memo: None,
        }
    }

    pub fn credit(account_id: i64, amount: Decimal) -> Self {
        NewEntry {
            account_id,
            debit: None,
            credit: Some(amount),
            memo: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Asset {
    pub id: i64,
    pub symbol: String,
    pub name: String,
    pub kind: AssetKind,
    pub currency: String,
    pub data_source: String,
    pub current_price: Option<Decimal>,
    pub last_updated: Option<NaiveDate>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssetTransaction {
    pub id: i64,
    pub asset_id: i64,
    pub side: TradeSide,
    pub quantity: Decimal,
    pub price: Decimal,
    pub total_amount: Decimal,
    pub currency: String,
    pub date: NaiveDate,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dividend {
    pub id: i64,
    pub asset_id: i64,
    pub amount: Decimal,
    pub currency: String,
    pub ex_date: NaiveDate,
    pub pay_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize)]
pub struct FixedExpense {
    pub id: i64,
    pub name: String,
    pub category: String,
    pub amount: Decimal,
    pub frequency: Frequency,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub is_active: bool,
    pub description: Option<String>,
}

impl FixedExpense {
    /// Active flag set and `[start_date, end_date)` overlapping the month.
    pub fn is_active_in(&self, month: YearMonth) -> bool {
        if !self.is_active {
            return false;
        }
        let from = month.first_day();
        let until = month.next().first_day();
        self.start_date < until && self.end_date.is_none_or(|end| end > from)
    }

    pub fn monthly_contribution(&self, month: YearMonth) -> Decimal {
        if !self.is_active_in(month) {
            return Decimal::ZERO;
        }
        match self.frequency {
            Frequency::Monthly => self.amount,
            Frequency::Annual => self.amount / Decimal::from(12),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Card {
    pub id: i64,
    pub name: String,
    pub kind: CardKind,
    pub issuer: String,
    pub last_four: String,
    pub credit_limit: Option<Decimal>,
    pub linked_account_id: Option<i64>,
    pub is_active: bool,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardUsage {
    pub card_id: i64,
    pub year: i32,
    pub month: u32,
    pub total_amount: Decimal,
    pub transaction_count: i64,
    pub calculated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BudgetCategory {
    pub id: i64,
    pub name: String,
    pub is_fixed: bool,
    pub color: String,
    pub icon: String,
    pub sort_order: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpendingPlan {
    pub id: i64,
    pub month: YearMonth,
    pub total_income: Decimal,
    /// Planned amounts keyed by budget category id. The fixed category is
    /// never present here.
    pub planned: Vec<(i64, Decimal)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expense(frequency: Frequency, amount: i64, start: &str, end: Option<&str>) -> FixedExpense {
        FixedExpense {
            id: 1,
            name: "Rent".into(),
            category: "Housing".into(),
            amount: Decimal::from(amount),
            frequency,
            start_date: start.parse().unwrap(),
            end_date: end.map(|e| e.parse().unwrap()),
            is_active: true,
            description: None,
        }
    }

    #[test]
    fn year_month_parses_and_steps() {
        let m: YearMonth = " 2024-12 ".parse().unwrap();
        assert_eq!(m.to_string(), "2024-12");
        assert_eq!(m.next().to_string(), "2025-01");
        assert_eq!(m.prev().to_string(), "2024-11");
        assert!(m.contains(NaiveDate::from_ymd_opt(2024, 12, 31).unwrap()));
        assert!(!m.contains(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()));
        assert_eq!(YearMonth::of(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()).to_string(), "2024-02");
        assert!("2024-13".parse::<YearMonth>().is_err());
        assert!(YearMonth::new(2024, 0).is_err());
    }

    #[test]
    fn far_future_months_are_rejected() {
        assert!("262142-12".parse::<YearMonth>().is_err());
        assert!(YearMonth::new(10_000, 1).is_err());
        let last = YearMonth::new(9999, 12).unwrap();
        assert_eq!(last.next().to_string(), "10000-01");
        assert_eq!(YearMonth::new(1, 1).unwrap().prev().to_string(), "0000-12");
        // stepping past chrono's range saturates instead of panicking
        let edge = YearMonth::of(NaiveDate::MAX);
        assert_eq!(edge.next(), edge);
    }

    #[test]
    fn annual_expense_is_spread_over_twelve_months() {
        let e = expense(Frequency::Annual, 1_200_000, "2024-01-01", None);
        let m = YearMonth::new(2024, 6).unwrap();
        assert_eq!(e.monthly_contribution(m), Decimal::from(100_000));
    }

    #[test]
    fn expense_window_is_half_open() {
        let e = expense(Frequency::Monthly, 120_000, "2024-03-15", Some("2024-06-01"));
        assert!(e.monthly_contribution(YearMonth::new(2024, 2).unwrap()).is_zero());
        assert_eq!(e.monthly_contribution(YearMonth::new(2024, 3).unwrap()), Decimal::from(120_000));
        assert_eq!(e.monthly_contribution(YearMonth::new(2024, 5).unwrap()), Decimal::from(120_000));
        assert!(e.monthly_contribution(YearMonth::new(2024, 6).unwrap()).is_zero());
    }

    #[test]
    fn account_type_sign_convention() {
        let d = Decimal::from(50);
        assert_eq!(AccountType::Asset.signed(d, Decimal::ZERO), d);
        assert_eq!(AccountType::Liability.signed(d, Decimal::ZERO), -d);
        assert_eq!("Income".parse::<AccountType>().unwrap(), AccountType::Income);
        assert!("cash".parse::<AccountType>().is_err());
    }
}
