// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::NaiveDate;
use ledgerplan::commands::fixed::{self, NewFixedExpense};
use ledgerplan::db;
use ledgerplan::error::LedgerError;
use ledgerplan::models::{Frequency, YearMonth};
use rusqlite::Connection;
use rust_decimal::Decimal;

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn month(y: i32, m: u32) -> YearMonth {
    YearMonth::new(y, m).unwrap()
}

fn expense(name: &str, amount: i64, frequency: Frequency, start: NaiveDate, end: Option<NaiveDate>) -> NewFixedExpense {
    NewFixedExpense {
        name: name.into(),
        category: "household".into(),
        amount: Decimal::from(amount),
        frequency,
        start_date: start,
        end_date: end,
        description: None,
    }
}

fn setup() -> Connection {
    let conn = db::open_in_memory().unwrap();
    fixed::add_fixed_expense(&conn, &expense("Rent", 800_000, Frequency::Monthly, ymd(2024, 1, 1), None)).unwrap();
    fixed::add_fixed_expense(&conn, &expense("Insurance", 1_200_000, Frequency::Annual, ymd(2024, 1, 15), None)).unwrap();
    fixed::add_fixed_expense(
        &conn,
        &expense("Gym", 50_000, Frequency::Monthly, ymd(2024, 2, 20), Some(ymd(2024, 4, 1))),
    )
    .unwrap();
    conn
}

#[test]
fn monthly_equivalent_follows_windows() {
    let conn = setup();
    // before anything starts
    assert_eq!(fixed::monthly_equivalent(&conn, month(2023, 12)).unwrap(), Decimal::ZERO);
    // mid-month start still counts for the month
    assert_eq!(
        fixed::monthly_equivalent(&conn, month(2024, 2)).unwrap(),
        Decimal::from(950_000)
    );
    assert_eq!(
        fixed::monthly_equivalent(&conn, month(2024, 3)).unwrap(),
        Decimal::from(950_000)
    );
    // end date is exclusive
    assert_eq!(
        fixed::monthly_equivalent(&conn, month(2024, 4)).unwrap(),
        Decimal::from(900_000)
    );
}

#[test]
fn deactivated_expense_drops_out() {
    let conn = setup();
    let rent = fixed::list_fixed_expenses(&conn)
        .unwrap()
        .into_iter()
        .find(|f| f.name == "Rent")
        .unwrap();
    fixed::set_fixed_expense_active(&conn, rent.id, false).unwrap();
    assert_eq!(
        fixed::monthly_equivalent(&conn, month(2024, 5)).unwrap(),
        Decimal::from(100_000)
    );
    fixed::set_fixed_expense_active(&conn, rent.id, true).unwrap();
    assert_eq!(
        fixed::monthly_equivalent(&conn, month(2024, 5)).unwrap(),
        Decimal::from(900_000)
    );
    assert!(matches!(
        fixed::set_fixed_expense_active(&conn, 404, true).unwrap_err(),
        LedgerError::NotFound { .. }
    ));
}

#[test]
fn invalid_expenses_are_rejected() {
    let conn = db::open_in_memory().unwrap();
    let zero = expense("Zero", 0, Frequency::Monthly, ymd(2024, 1, 1), None);
    assert!(matches!(
        fixed::add_fixed_expense(&conn, &zero).unwrap_err(),
        LedgerError::InvalidInput(_)
    ));
    let backwards = expense("Backwards", 10, Frequency::Monthly, ymd(2024, 5, 1), Some(ymd(2024, 5, 1)));
    assert!(matches!(
        fixed::add_fixed_expense(&conn, &backwards).unwrap_err(),
        LedgerError::InvalidInput(_)
    ));
    assert!(fixed::list_fixed_expenses(&conn).unwrap().is_empty());
}

#[test]
fn summary_splits_by_frequency() {
    let conn = setup();
    let s = fixed::fixed_summary(&conn, month(2024, 3)).unwrap();
    assert_eq!(s.total_monthly, Decimal::from(850_000));
    assert_eq!(s.total_annual, Decimal::from(1_200_000));
    assert_eq!(s.monthly_average, Decimal::from(950_000));
    assert_eq!(
        s.monthly_average,
        fixed::monthly_equivalent(&conn, month(2024, 3)).unwrap()
    );
}
