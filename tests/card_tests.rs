// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::NaiveDate;
use ledgerplan::commands::cards::{self, NewCard};
use ledgerplan::commands::{accounts, categories, doctor, transactions};
use ledgerplan::db;
use ledgerplan::error::LedgerError;
use ledgerplan::models::{AccountType, CardKind, NewEntry, YearMonth};
use rusqlite::Connection;
use rust_decimal::Decimal;

struct Books {
    checking: i64,
    visa_account: i64,
    groceries: i64,
}

fn setup() -> (Connection, Books) {
    let conn = db::open_in_memory().unwrap();
    let cash = categories::add_category(&conn, "Cash", AccountType::Asset, None, None, 1).unwrap();
    let debt = categories::add_category(&conn, "Cards", AccountType::Liability, None, None, 2).unwrap();
    let living = categories::add_category(&conn, "Living", AccountType::Expense, None, None, 3).unwrap();
    let books = Books {
        checking: accounts::add_account(&conn, cash, "Checking", None, None).unwrap(),
        visa_account: accounts::add_account(&conn, debt, "Visa payable", None, None).unwrap(),
        groceries: accounts::add_account(&conn, living, "Groceries", None, None).unwrap(),
    };
    (conn, books)
}

fn card(name: &str, kind: CardKind, limit: Option<i64>, account: Option<i64>) -> NewCard {
    NewCard {
        name: name.into(),
        kind,
        issuer: "Hana".into(),
        last_four: "4321".into(),
        credit_limit: limit.map(Decimal::from),
        linked_account_id: account,
        color: None,
    }
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn month(s: &str) -> YearMonth {
    s.parse().unwrap()
}

fn purchase(b: &Books, amount: i64) -> [NewEntry; 2] {
    [
        NewEntry::debit(b.groceries, Decimal::from(amount)),
        NewEntry::credit(b.visa_account, Decimal::from(amount)),
    ]
}

fn assert_cache_fresh(conn: &Connection, card_id: i64, m: YearMonth) {
    let cached = cards::usage_for(conn, card_id, m).unwrap();
    let (total, count) = cards::compute_usage(conn, card_id, m).unwrap();
    assert_eq!(cached.total_amount, total, "total for {m}");
    assert_eq!(cached.transaction_count, count, "count for {m}");
}

#[test]
fn card_validation() {
    let (conn, b) = setup();
    let mut bad_digits = card("Bad", CardKind::Credit, Some(1_000_000), None);
    bad_digits.last_four = "12a4".into();
    let mut short = card("Short", CardKind::Credit, None, None);
    short.last_four = "123".into();
    for c in [
        bad_digits,
        short,
        card("Debit with limit", CardKind::Debit, Some(500_000), None),
        card("Zero limit", CardKind::Credit, Some(0), None),
    ] {
        assert!(matches!(
            cards::add_card(&conn, &c).unwrap_err(),
            LedgerError::InvalidInput(_)
        ));
    }
    assert!(matches!(
        cards::add_card(&conn, &card("Ghost", CardKind::Debit, None, Some(999))).unwrap_err(),
        LedgerError::NotFound { .. }
    ));

    let spare = categories::add_category(&conn, "Old", AccountType::Asset, None, None, 9).unwrap();
    let closed = accounts::add_account(&conn, spare, "Closed", None, None).unwrap();
    accounts::deactivate_account(&conn, closed, date("2024-01-01")).unwrap();
    assert!(matches!(
        cards::add_card(&conn, &card("Late", CardKind::Debit, None, Some(closed))).unwrap_err(),
        LedgerError::InvalidInput(_)
    ));

    cards::add_card(&conn, &card("Check", CardKind::Debit, None, Some(b.checking))).unwrap();
    assert_eq!(cards::list_cards(&conn).unwrap().len(), 1);
}

#[test]
fn utilization_only_for_limited_credit_cards() {
    let (mut conn, b) = setup();
    let credit = cards::add_card(&conn, &card("Visa", CardKind::Credit, Some(1_000_000), None)).unwrap();
    let debit = cards::add_card(&conn, &card("Check", CardKind::Debit, None, Some(b.checking))).unwrap();
    let open = cards::add_card(&conn, &card("NoLimit", CardKind::Credit, None, None)).unwrap();

    transactions::record_card_transaction(&mut conn, date("2024-03-02"), "Mart", &purchase(&b, 250_000), credit)
        .unwrap();
    transactions::record_card_transaction(&mut conn, date("2024-03-03"), "Cafe", &purchase(&b, 5_000), debit)
        .unwrap();

    assert_eq!(
        cards::utilization_rate(&conn, credit, month("2024-03")).unwrap(),
        Some(Decimal::from(25))
    );
    assert_eq!(cards::utilization_rate(&conn, debit, month("2024-03")).unwrap(), None);
    assert_eq!(cards::utilization_rate(&conn, open, month("2024-03")).unwrap(), None);
    assert!(matches!(
        cards::utilization_rate(&conn, 77, month("2024-03")).unwrap_err(),
        LedgerError::NotFound { .. }
    ));
}

#[test]
fn usage_cache_tracks_every_change() {
    let (mut conn, b) = setup();
    let visa = cards::add_card(&conn, &card("Visa", CardKind::Credit, Some(3_000_000), None)).unwrap();
    let (mar, apr) = (month("2024-03"), month("2024-04"));

    let t1 = transactions::record_card_transaction(&mut conn, date("2024-03-10"), "A", &purchase(&b, 30_000), visa)
        .unwrap();
    let t2 = transactions::record_transaction(&mut conn, date("2024-03-11"), "B", &purchase(&b, 20_000)).unwrap();
    let usage = cards::usage_for(&conn, visa, mar).unwrap();
    assert_eq!(usage.total_amount, Decimal::from(30_000));
    assert_eq!(usage.transaction_count, 1);

    cards::link_transaction(&mut conn, t2, visa).unwrap();
    // linking twice does not double count
    cards::link_transaction(&mut conn, t2, visa).unwrap();
    assert_eq!(cards::usage_for(&conn, visa, mar).unwrap().total_amount, Decimal::from(50_000));
    assert_cache_fresh(&conn, visa, mar);

    transactions::correct_transaction(&mut conn, t1, Some(date("2024-04-01")), None).unwrap();
    assert_eq!(cards::usage_for(&conn, visa, mar).unwrap().total_amount, Decimal::from(20_000));
    assert_eq!(cards::usage_for(&conn, visa, apr).unwrap().total_amount, Decimal::from(30_000));
    assert_cache_fresh(&conn, visa, mar);
    assert_cache_fresh(&conn, visa, apr);

    cards::unlink_transaction(&mut conn, t2, visa).unwrap();
    let usage = cards::usage_for(&conn, visa, mar).unwrap();
    assert_eq!(usage.total_amount, Decimal::ZERO);
    assert_eq!(usage.transaction_count, 0);
    assert!(matches!(
        cards::unlink_transaction(&mut conn, t2, visa).unwrap_err(),
        LedgerError::NotFound { .. }
    ));

    assert!(doctor::check(&conn).unwrap().is_empty());
}

#[test]
fn failed_card_transaction_leaves_cache_alone() {
    let (mut conn, b) = setup();
    let visa = cards::add_card(&conn, &card("Visa", CardKind::Credit, Some(3_000_000), None)).unwrap();
    let lopsided = [
        NewEntry::debit(b.groceries, Decimal::from(10)),
        NewEntry::credit(b.visa_account, Decimal::from(9)),
    ];
    assert!(transactions::record_card_transaction(&mut conn, date("2024-03-10"), "X", &lopsided, visa).is_err());
    assert!(matches!(
        transactions::record_card_transaction(&mut conn, date("2024-03-10"), "X", &purchase(&b, 10), 404)
            .unwrap_err(),
        LedgerError::NotFound { .. }
    ));
    let rows: i64 = conn
        .query_row("SELECT COUNT(*) FROM card_monthly_usage", [], |r| r.get(0))
        .unwrap();
    assert_eq!(rows, 0);
}

#[test]
fn summary_compares_with_previous_month() {
    let (mut conn, b) = setup();
    let visa = cards::add_card(&conn, &card("Visa", CardKind::Credit, Some(1_000_000), None)).unwrap();
    cards::add_card(&conn, &card("Check", CardKind::Debit, None, Some(b.checking))).unwrap();

    transactions::record_card_transaction(&mut conn, date("2024-02-15"), "Feb", &purchase(&b, 200_000), visa)
        .unwrap();
    transactions::record_card_transaction(&mut conn, date("2024-03-15"), "Mar", &purchase(&b, 300_000), visa)
        .unwrap();

    let s = cards::card_summary(&conn, month("2024-03")).unwrap();
    assert_eq!(s.total_cards, 2);
    assert_eq!(s.active_cards, 2);
    assert_eq!(s.credit_cards, 1);
    assert_eq!(s.debit_cards, 1);
    assert_eq!(s.this_month_total, Decimal::from(300_000));
    assert_eq!(s.last_month_total, Decimal::from(200_000));
    assert_eq!(s.this_month_count, 1);
    assert_eq!(s.change_percent, Decimal::from(50));

    let empty = cards::card_summary(&conn, month("2024-02")).unwrap();
    assert_eq!(empty.last_month_total, Decimal::ZERO);
    assert_eq!(empty.change_percent, Decimal::ZERO);
}

#[test]
fn summary_does_not_write_the_cache() {
    let (mut conn, b) = setup();
    let visa = cards::add_card(&conn, &card("Visa", CardKind::Credit, Some(1_000_000), None)).unwrap();
    transactions::record_card_transaction(&mut conn, date("2024-03-15"), "Mar", &purchase(&b, 100_000), visa)
        .unwrap();
    let cached = |conn: &Connection| -> i64 {
        conn.query_row("SELECT COUNT(*) FROM card_monthly_usage", [], |r| r.get(0))
            .unwrap()
    };
    assert_eq!(cached(&conn), 1);

    let s = cards::card_summary(&conn, month("2024-04")).unwrap();
    assert_eq!(s.this_month_total, Decimal::ZERO);
    assert_eq!(s.last_month_total, Decimal::from(100_000));
    assert_eq!(s.change_percent, Decimal::from(-100));
    assert_eq!(s.cards[0].utilization, Some(Decimal::ZERO));
    assert_eq!(cached(&conn), 1);
}
