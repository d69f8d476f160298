// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::NaiveDate;
use ledgerplan::commands::{accounts, categories, reports, transactions};
use ledgerplan::db;
use ledgerplan::error::LedgerError;
use ledgerplan::models::{AccountType, NewEntry};
use proptest::prelude::*;
use rusqlite::Connection;
use rust_decimal::Decimal;

struct Books {
    checking: i64,
    brokerage: i64,
    loan: i64,
    payroll: i64,
    rent: i64,
}

fn setup() -> (Connection, Books) {
    let conn = db::open_in_memory().unwrap();
    let cash = categories::add_category(&conn, "Cash", AccountType::Asset, None, None, 1).unwrap();
    let invest =
        categories::add_category(&conn, "Investments", AccountType::Asset, None, None, 2).unwrap();
    let debt = categories::add_category(&conn, "Loans", AccountType::Liability, None, None, 3).unwrap();
    let salary = categories::add_category(&conn, "Salary", AccountType::Income, None, None, 4).unwrap();
    let living = categories::add_category(&conn, "Housing", AccountType::Expense, None, None, 5).unwrap();
    let books = Books {
        checking: accounts::add_account(&conn, cash, "Checking", None, None).unwrap(),
        brokerage: accounts::add_account(&conn, invest, "Brokerage", None, None).unwrap(),
        loan: accounts::add_account(&conn, debt, "Mortgage", None, None).unwrap(),
        payroll: accounts::add_account(&conn, salary, "Payroll", None, None).unwrap(),
        rent: accounts::add_account(&conn, living, "Rent", None, None).unwrap(),
    };
    (conn, books)
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn record(conn: &mut Connection, on: &str, debit: i64, credit: i64, amount: i64) {
    transactions::record_transaction(
        conn,
        date(on),
        "t",
        &[
            NewEntry::debit(debit, Decimal::from(amount)),
            NewEntry::credit(credit, Decimal::from(amount)),
        ],
    )
    .unwrap();
}

#[test]
fn net_worth_and_overview() {
    let (mut conn, b) = setup();
    record(&mut conn, "2024-01-02", b.checking, b.loan, 200_000_000);
    record(&mut conn, "2024-01-25", b.checking, b.payroll, 5_000_000);
    record(&mut conn, "2024-02-01", b.brokerage, b.checking, 50_000_000);
    record(&mut conn, "2024-02-03", b.rent, b.checking, 1_000_000);

    assert_eq!(
        reports::balance_of(&conn, b.checking, None).unwrap(),
        Decimal::from(154_000_000)
    );
    assert_eq!(
        reports::total_assets(&conn, None).unwrap(),
        Decimal::from(204_000_000)
    );
    assert_eq!(
        reports::net_worth(&conn, None).unwrap(),
        Decimal::from(4_000_000)
    );
    // as-of excludes February
    assert_eq!(
        reports::net_worth(&conn, Some(date("2024-01-31"))).unwrap(),
        Decimal::from(5_000_000)
    );

    let o = reports::asset_overview(&conn, None).unwrap();
    assert_eq!(o.total_debt, Decimal::from(200_000_000));
    assert_eq!(o.net_worth, Decimal::from(4_000_000));
    let invest = o
        .categories
        .iter()
        .find(|c| c.category == "Investments")
        .unwrap();
    assert_eq!(invest.account_count, 1);
    assert_eq!(
        invest.share,
        reports::portfolio_share(Decimal::from(50_000_000), o.total_assets)
    );
    let loans = o.categories.iter().find(|c| c.category == "Loans").unwrap();
    assert_eq!(loans.amount, Decimal::from(-200_000_000));
    assert!(o.categories.iter().all(|c| c.category != "Salary"));
}

#[test]
fn transfer_keeps_net_worth_but_borrowing_does_not() {
    let (mut conn, b) = setup();
    record(&mut conn, "2024-11-30", b.checking, b.payroll, 80_000);
    let before = reports::net_worth(&conn, None).unwrap();

    record(&mut conn, "2024-12-01", b.brokerage, b.checking, 50_000);
    assert_eq!(
        reports::balance_of(&conn, b.brokerage, None).unwrap(),
        Decimal::from(50_000)
    );
    assert_eq!(
        reports::balance_of(&conn, b.checking, None).unwrap(),
        Decimal::from(30_000)
    );
    assert_eq!(reports::net_worth(&conn, None).unwrap(), before);

    record(&mut conn, "2024-12-01", b.rent, b.loan, 50_000);
    assert_eq!(
        reports::net_worth(&conn, None).unwrap(),
        before - Decimal::from(50_000)
    );
}

#[test]
fn cashflow_counts_only_the_month() {
    let (mut conn, b) = setup();
    record(&mut conn, "2024-01-25", b.checking, b.payroll, 5_000_000);
    record(&mut conn, "2024-02-25", b.checking, b.payroll, 5_100_000);
    record(&mut conn, "2024-02-03", b.rent, b.checking, 1_000_000);

    let cf = reports::cashflow(&conn, "2024-02".parse().unwrap()).unwrap();
    assert_eq!(cf.income, Decimal::from(5_100_000));
    assert_eq!(cf.expense, Decimal::from(1_000_000));
    assert_eq!(cf.net, Decimal::from(4_100_000));
}

#[test]
fn unknown_account_has_no_balance() {
    let (conn, _) = setup();
    assert!(matches!(
        reports::balance_of(&conn, 31_337, None).unwrap_err(),
        LedgerError::NotFound { .. }
    ));
}

/// Records each `(is_income, cents)` pair in order and reads back the
/// checking, rent and net worth figures.
fn balances_after(ops: &[(bool, i64)]) -> (Decimal, Decimal, Decimal) {
    let (mut conn, b) = setup();
    for (is_income, cents) in ops {
        let amount = Decimal::new(*cents, 2);
        let (debit, credit) = if *is_income {
            (b.checking, b.payroll)
        } else {
            (b.rent, b.checking)
        };
        transactions::record_transaction(
            &mut conn,
            date("2024-05-01"),
            "p",
            &[NewEntry::debit(debit, amount), NewEntry::credit(credit, amount)],
        )
        .unwrap();
    }
    (
        reports::balance_of(&conn, b.checking, None).unwrap(),
        reports::balance_of(&conn, b.rent, None).unwrap(),
        reports::net_worth(&conn, None).unwrap(),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn balances_ignore_insertion_order(
        (original, shuffled) in prop::collection::vec((any::<bool>(), 1i64..10_000_000), 1..12)
            .prop_flat_map(|v| (Just(v.clone()), Just(v).prop_shuffle()))
    ) {
        let expected_checking: Decimal = original
            .iter()
            .map(|(inc, c)| if *inc { Decimal::new(*c, 2) } else { -Decimal::new(*c, 2) })
            .sum();
        let a = balances_after(&original);
        let b = balances_after(&shuffled);
        prop_assert_eq!(a, b);
        prop_assert_eq!(a.0, expected_checking);
    }
}
