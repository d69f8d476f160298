// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::NaiveDate;
use ledgerplan::commands::budgets::{self, Band};
use ledgerplan::commands::{accounts, categories, fixed, transactions};
use ledgerplan::db;
use ledgerplan::error::LedgerError;
use ledgerplan::models::{AccountType, Frequency, NewEntry, YearMonth};
use ledgerplan::utils::id_for_budget_category;
use rusqlite::Connection;
use rust_decimal::Decimal;

struct Books {
    checking: i64,
    groceries: i64,
    transit: i64,
}

fn setup() -> (Connection, Books) {
    let conn = db::open_in_memory().unwrap();
    let cash = categories::add_category(&conn, "Cash", AccountType::Asset, None, None, 1).unwrap();
    let living = categories::add_category(&conn, "Living", AccountType::Expense, None, None, 2).unwrap();
    let food = id_for_budget_category(&conn, "Food").unwrap();
    let transport = id_for_budget_category(&conn, "Transportation").unwrap();
    let books = Books {
        checking: accounts::add_account(&conn, cash, "Checking", None, None).unwrap(),
        groceries: accounts::add_account(&conn, living, "Groceries", None, Some(food)).unwrap(),
        transit: accounts::add_account(&conn, living, "Transit", None, Some(transport)).unwrap(),
    };
    (conn, books)
}

fn march() -> YearMonth {
    YearMonth::new(2024, 3).unwrap()
}

fn spend(conn: &mut Connection, on: &str, account: i64, from: i64, amount: i64) {
    transactions::record_transaction(
        conn,
        NaiveDate::parse_from_str(on, "%Y-%m-%d").unwrap(),
        "spend",
        &[
            NewEntry::debit(account, Decimal::from(amount)),
            NewEntry::credit(from, Decimal::from(amount)),
        ],
    )
    .unwrap();
}

fn row<'a>(r: &'a budgets::Reconciliation, name: &str) -> &'a budgets::ReconcileRow {
    r.rows.iter().find(|row| row.category == name).unwrap()
}

#[test]
fn reconcile_needs_a_plan() {
    let (conn, _) = setup();
    assert!(matches!(
        budgets::reconcile(&conn, march()).unwrap_err(),
        LedgerError::NotFound { .. }
    ));
    assert!(matches!(
        budgets::get_plan(&conn, march()).unwrap_err(),
        LedgerError::NotFound { .. }
    ));
}

#[test]
fn fixed_category_is_read_only() {
    let (mut conn, _) = setup();
    let fixed_id = id_for_budget_category(&conn, db::FIXED_BUDGET_CATEGORY).unwrap();
    let err = budgets::set_planned(&mut conn, march(), fixed_id, Decimal::from(1)).unwrap_err();
    assert!(matches!(err, LedgerError::ReadOnlyCategory(_)));

    let err = budgets::set_planned(&mut conn, march(), 9_999, Decimal::from(1)).unwrap_err();
    assert!(matches!(err, LedgerError::NotFound { .. }));

    let food = id_for_budget_category(&conn, "Food").unwrap();
    let err = budgets::set_planned(&mut conn, march(), food, Decimal::from(-1)).unwrap_err();
    assert!(matches!(err, LedgerError::InvalidInput(_)));
}

#[test]
fn only_one_fixed_category() {
    let (conn, _) = setup();
    assert!(budgets::add_budget_category(&conn, "Second fixed", true, None, None, 99).is_err());
    budgets::add_budget_category(&conn, "Pets", false, None, None, 99).unwrap();
    assert_eq!(budgets::list_budget_categories(&conn).unwrap().len(), 11);
}

#[test]
fn reconcile_planned_against_actual() {
    let (mut conn, b) = setup();
    let food = id_for_budget_category(&conn, "Food").unwrap();
    budgets::set_income(&mut conn, march(), Decimal::from(4_000_000)).unwrap();
    budgets::set_planned(&mut conn, march(), food, Decimal::from(100_000)).unwrap();
    // re-planning overwrites
    budgets::set_planned(&mut conn, march(), food, Decimal::from(100_000)).unwrap();

    spend(&mut conn, "2024-03-03", b.groceries, b.checking, 60_000);
    spend(&mut conn, "2024-03-28", b.groceries, b.checking, 40_000);
    spend(&mut conn, "2024-04-01", b.groceries, b.checking, 99_000);
    spend(&mut conn, "2024-03-10", b.transit, b.checking, 55_000);

    fixed::add_fixed_expense(
        &conn,
        &fixed::NewFixedExpense {
            name: "Insurance".into(),
            category: "insurance".into(),
            amount: Decimal::from(1_200_000),
            frequency: Frequency::Annual,
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: None,
            description: None,
        },
    )
    .unwrap();

    let r = budgets::reconcile(&conn, march()).unwrap();

    let food_row = row(&r, "Food");
    assert_eq!(food_row.planned, Decimal::from(100_000));
    assert_eq!(food_row.actual, Decimal::from(100_000));
    assert_eq!(food_row.difference, Decimal::ZERO);
    assert_eq!(food_row.achievement_rate, Decimal::ONE_HUNDRED);
    assert_eq!(food_row.band, Band::Caution);

    // spending without a plan never divides by zero
    let transit_row = row(&r, "Transportation");
    assert_eq!(transit_row.planned, Decimal::ZERO);
    assert_eq!(transit_row.actual, Decimal::from(55_000));
    assert_eq!(transit_row.achievement_rate, Decimal::ZERO);
    assert_eq!(transit_row.band, Band::OnTrack);

    let fixed_row = row(&r, db::FIXED_BUDGET_CATEGORY);
    assert!(fixed_row.is_fixed);
    assert_eq!(fixed_row.planned, Decimal::from(100_000));

    assert_eq!(r.total_planned, Decimal::from(200_000));
    assert_eq!(r.total_actual, Decimal::from(155_000));
    assert_eq!(r.total_income, Decimal::from(4_000_000));
    assert_eq!(r.remaining, Decimal::from(3_800_000));
    assert_eq!(r.overall_band, Band::OnTrack);
    assert_eq!(r.rows.len(), 10);
}

#[test]
fn plan_lists_only_editable_categories() {
    let (mut conn, _) = setup();
    let food = id_for_budget_category(&conn, "Food").unwrap();
    let fun = id_for_budget_category(&conn, "Entertainment").unwrap();
    budgets::set_planned(&mut conn, march(), fun, Decimal::from(30_000)).unwrap();
    budgets::set_planned(&mut conn, march(), food, Decimal::from(300_000)).unwrap();
    let plan = budgets::get_plan(&conn, march()).unwrap();
    assert_eq!(plan.total_income, Decimal::ZERO);
    assert_eq!(
        plan.planned,
        vec![(food, Decimal::from(300_000)), (fun, Decimal::from(30_000))]
    );
}
