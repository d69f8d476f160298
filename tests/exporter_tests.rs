// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::NaiveDate;
use ledgerplan::commands::exporter::{self, ExportFormat};
use ledgerplan::commands::{accounts, audit, categories, doctor, transactions};
use ledgerplan::models::{AccountType, NewEntry};
use ledgerplan::{cli, db};
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde_json::Value;
use tempfile::tempdir;

fn base_conn() -> Connection {
    let mut conn = db::open_in_memory().unwrap();
    let cash = categories::add_category(&conn, "Cash", AccountType::Asset, None, None, 1).unwrap();
    let salary = categories::add_category(&conn, "Salary", AccountType::Income, None, None, 2).unwrap();
    let checking = accounts::add_account(&conn, cash, "Checking", None, None).unwrap();
    let payroll = accounts::add_account(&conn, salary, "Payroll", None, None).unwrap();
    let mut payday = NewEntry::credit(payroll, Decimal::from(3_000_000));
    payday.memo = Some("March, net".into());
    transactions::record_transaction(
        &mut conn,
        NaiveDate::from_ymd_opt(2024, 3, 25).unwrap(),
        "Payday",
        &[NewEntry::debit(checking, Decimal::from(3_000_000)), payday],
    )
    .unwrap();
    conn
}

#[test]
fn export_journal_json() {
    let conn = base_conn();
    let dir = tempdir().unwrap();
    let out = dir.path().join("journal.json");
    let n = exporter::export_journal(&conn, ExportFormat::Json, &out).unwrap();
    assert_eq!(n, 2);

    let v: Value = serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    let lines = v.as_array().unwrap();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["account"], "Checking");
    assert_eq!(lines[0]["date"], "2024-03-25");
    assert_eq!(lines[1]["memo"], "March, net");
    assert!(lines[1]["debit"].is_null());
}

#[test]
fn export_journal_csv_via_cli() {
    let conn = base_conn();
    let dir = tempdir().unwrap();
    let out = dir.path().join("journal.csv");
    let matches = cli::build_cli().get_matches_from([
        "ledgerplan",
        "export",
        "journal",
        "--format",
        "csv",
        "--out",
        out.to_str().unwrap(),
    ]);
    let Some(("export", export_m)) = matches.subcommand() else {
        panic!("no export subcommand");
    };
    exporter::handle(&conn, export_m).unwrap();

    let mut rdr = csv::Reader::from_path(&out).unwrap();
    let headers = rdr.headers().unwrap().clone();
    assert_eq!(&headers[3], "account");
    let records: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
    assert_eq!(records.len(), 2);
    assert_eq!(&records[1][3], "Payroll");
    assert_eq!(&records[1][5], "3000000");
    assert_eq!(&records[1][6], "March, net");
}

#[test]
fn unknown_format_is_rejected() {
    assert!("xml".parse::<ExportFormat>().is_err());
    assert_eq!("JSON".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
}

#[test]
fn mutations_are_audited_and_data_is_clean() {
    let conn = base_conn();
    let rows = audit::recent(&conn, 10).unwrap();
    // two categories, two accounts, one transaction
    assert_eq!(rows.len(), 5);
    assert_eq!(rows[0].table_name, "transactions");
    assert_eq!(rows[0].action, "INSERT");
    assert!(doctor::check(&conn).unwrap().is_empty());
}

#[test]
fn doctor_flags_tampered_rows() {
    let conn = base_conn();
    conn.execute(
        "UPDATE transaction_entries SET credit_amount='1' WHERE credit_amount IS NOT NULL",
        [],
    )
    .unwrap();
    let issues = doctor::check(&conn).unwrap();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].kind, "unbalanced");
}
