// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::commands::{audit, transactions};
use crate::error::{LedgerError, Result};
use crate::models::{Card, CardKind, CardUsage, YearMonth};
use crate::utils::{
    checked_add, checked_sub, decimal_at, id_for_account, id_for_card, maybe_print_json,
    opt_decimal_at, parse_decimal, parse_month, percent, pretty_table,
};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

pub fn handle(conn: &mut Connection, m: &clap::ArgMatches) -> anyhow::Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => add(conn, sub)?,
        Some(("list", sub)) => list(conn, sub)?,
        Some(("link", sub)) => {
            let tx_id = *sub.get_one::<i64>("tx").unwrap();
            let card_id = id_for_card(conn, sub.get_one::<String>("card").unwrap())?;
            link_transaction(conn, tx_id, card_id)?;
            println!("Linked transaction #{} to card", tx_id);
        }
        Some(("unlink", sub)) => {
            let tx_id = *sub.get_one::<i64>("tx").unwrap();
            let card_id = id_for_card(conn, sub.get_one::<String>("card").unwrap())?;
            unlink_transaction(conn, tx_id, card_id)?;
            println!("Unlinked transaction #{} from card", tx_id);
        }
        Some(("summary", sub)) => summary(conn, sub)?,
        _ => {}
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct NewCard {
    pub name: String,
    pub kind: CardKind,
    pub issuer: String,
    pub last_four: String,
    pub credit_limit: Option<Decimal>,
    pub linked_account_id: Option<i64>,
    pub color: Option<String>,
}

fn add(conn: &Connection, sub: &clap::ArgMatches) -> anyhow::Result<()> {
    let linked_account_id = match sub.get_one::<String>("account") {
        Some(a) => Some(id_for_account(conn, a)?),
        None => None,
    };
    let credit_limit = match sub.get_one::<String>("limit") {
        Some(l) => Some(parse_decimal(l)?),
        None => None,
    };
    let card = NewCard {
        name: sub.get_one::<String>("name").unwrap().trim().to_string(),
        kind: sub.get_one::<String>("type").unwrap().parse()?,
        issuer: sub.get_one::<String>("issuer").unwrap().trim().to_string(),
        last_four: sub.get_one::<String>("last4").unwrap().trim().to_string(),
        credit_limit,
        linked_account_id,
        color: sub.get_one::<String>("color").map(|s| s.trim().to_string()),
    };
    add_card(conn, &card)?;
    println!("Added {} card '{}' ({} *{})", card.kind, card.name, card.issuer, card.last_four);
    Ok(())
}

pub fn add_card(conn: &Connection, card: &NewCard) -> Result<i64> {
    if card.last_four.len() != 4 || !card.last_four.bytes().all(|b| b.is_ascii_digit()) {
        return Err(LedgerError::invalid_input(format!(
            "last four digits must be exactly 4 digits, got '{}'",
            card.last_four
        )));
    }
    match (card.kind, card.credit_limit) {
        (CardKind::Debit, Some(_)) => {
            return Err(LedgerError::invalid_input(
                "a debit card cannot carry a credit limit",
            ));
        }
        (CardKind::Credit, Some(limit)) if limit <= Decimal::ZERO => {
            return Err(LedgerError::invalid_input(format!(
                "credit limit must be positive, got {}",
                limit
            )));
        }
        _ => {}
    }

    let tx = conn.unchecked_transaction()?;
    if let Some(account_id) = card.linked_account_id {
        let active: Option<bool> = tx
            .query_row(
                "SELECT is_active FROM accounts WHERE id=?1",
                params![account_id],
                |r| r.get(0),
            )
            .optional()?;
        match active {
            None => return Err(LedgerError::not_found("account", account_id)),
            Some(false) => {
                return Err(LedgerError::invalid_input(format!(
                    "cannot link a card to inactive account {}",
                    account_id
                )));
            }
            Some(true) => {}
        }
    }

    tx.execute(
        "INSERT INTO cards(name, type, issuer, last_four, credit_limit, linked_account_id, color)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, COALESCE(?7, '#3B82F6'))",
        params![
            card.name,
            card.kind,
            card.issuer,
            card.last_four,
            card.credit_limit.map(|l| l.to_string()),
            card.linked_account_id,
            card.color
        ],
    )?;
    let id = tx.last_insert_rowid();
    audit::record(
        &tx,
        "cards",
        id,
        "INSERT",
        None,
        Some(&json!({ "name": card.name, "type": card.kind, "credit_limit": card.credit_limit })),
    )?;
    tx.commit()?;
    info!(id, name = %card.name, kind = %card.kind, "card added");
    Ok(id)
}

const CARD_COLUMNS: &str =
    "id, name, type, issuer, last_four, credit_limit, linked_account_id, is_active, color";

fn card_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<Card> {
    Ok(Card {
        id: r.get(0)?,
        name: r.get(1)?,
        kind: r.get(2)?,
        issuer: r.get(3)?,
        last_four: r.get(4)?,
        credit_limit: opt_decimal_at(r, 5)?,
        linked_account_id: r.get(6)?,
        is_active: r.get(7)?,
        color: r.get(8)?,
    })
}

pub fn get_card(conn: &Connection, card_id: i64) -> Result<Card> {
    conn.query_row(
        &format!("SELECT {CARD_COLUMNS} FROM cards WHERE id=?1"),
        params![card_id],
        card_from_row,
    )
    .optional()?
    .ok_or_else(|| LedgerError::not_found("card", card_id))
}

pub fn list_cards(conn: &Connection) -> Result<Vec<Card>> {
    let mut stmt = conn.prepare(&format!("SELECT {CARD_COLUMNS} FROM cards ORDER BY name"))?;
    let rows = stmt.query_map([], card_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

fn ensure_transaction(conn: &Connection, tx_id: i64) -> Result<YearMonth> {
    let date: Option<chrono::NaiveDate> = conn
        .query_row(
            "SELECT date FROM transactions WHERE id=?1",
            params![tx_id],
            |r| r.get(0),
        )
        .optional()?;
    date.map(YearMonth::of)
        .ok_or_else(|| LedgerError::not_found("transaction", tx_id))
}

pub fn link_transaction(conn: &mut Connection, tx_id: i64, card_id: i64) -> Result<()> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    get_card(&tx, card_id)?;
    let month = ensure_transaction(&tx, tx_id)?;
    let inserted = tx.execute(
        "INSERT OR IGNORE INTO transaction_cards(transaction_id, card_id) VALUES (?1, ?2)",
        params![tx_id, card_id],
    )?;
    if inserted > 0 {
        refresh_usage(&tx, card_id, month)?;
        audit::record(
            &tx,
            "transaction_cards",
            tx_id,
            "INSERT",
            None,
            Some(&json!({ "card_id": card_id })),
        )?;
    }
    tx.commit()?;
    info!(tx_id, card_id, "transaction linked to card");
    Ok(())
}

pub fn unlink_transaction(conn: &mut Connection, tx_id: i64, card_id: i64) -> Result<()> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    get_card(&tx, card_id)?;
    let month = ensure_transaction(&tx, tx_id)?;
    let removed = tx.execute(
        "DELETE FROM transaction_cards WHERE transaction_id=?1 AND card_id=?2",
        params![tx_id, card_id],
    )?;
    if removed == 0 {
        return Err(LedgerError::not_found(
            "card link",
            format!("{tx_id}/{card_id}"),
        ));
    }
    refresh_usage(&tx, card_id, month)?;
    audit::record(
        &tx,
        "transaction_cards",
        tx_id,
        "DELETE",
        Some(&json!({ "card_id": card_id })),
        None,
    )?;
    tx.commit()?;
    info!(tx_id, card_id, "transaction unlinked from card");
    Ok(())
}

/// Aggregates a card's linked transactions for one month straight from the
/// ledger, bypassing the cache.
pub fn compute_usage(conn: &Connection, card_id: i64, month: YearMonth) -> Result<(Decimal, i64)> {
    let mut stmt = conn.prepare_cached(
        "SELECT t.id FROM transaction_cards tc JOIN transactions t ON tc.transaction_id=t.id
         WHERE tc.card_id=?1 AND t.date>=?2 AND t.date<?3",
    )?;
    let ids = stmt
        .query_map(
            params![card_id, month.first_day(), month.next().first_day()],
            |r| r.get::<_, i64>(0),
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    let mut total = Decimal::ZERO;
    for id in &ids {
        total = checked_add(total, transactions::debit_total(conn, *id)?, "card usage")?;
    }
    Ok((total, ids.len() as i64))
}

/// Rewrites the cached usage row for (card, month). Callers run it inside
/// the transaction that changed the underlying links.
pub fn refresh_usage(conn: &Connection, card_id: i64, month: YearMonth) -> Result<CardUsage> {
    let (total, count) = compute_usage(conn, card_id, month)?;
    conn.execute(
        "INSERT INTO card_monthly_usage(card_id, year, month, total_amount, transaction_count, calculated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, datetime('now'))
         ON CONFLICT(card_id, year, month) DO UPDATE SET
            total_amount=excluded.total_amount,
            transaction_count=excluded.transaction_count,
            calculated_at=excluded.calculated_at",
        params![card_id, month.year(), month.month(), total.to_string(), count],
    )?;
    debug!(card_id, %month, %total, count, "card usage refreshed");
    cached_usage(conn, card_id, month)?
        .ok_or_else(|| LedgerError::not_found("card usage", format!("{card_id}/{month}")))
}

fn cached_usage(conn: &Connection, card_id: i64, month: YearMonth) -> Result<Option<CardUsage>> {
    Ok(conn
        .query_row(
            "SELECT card_id, year, month, total_amount, transaction_count, calculated_at
             FROM card_monthly_usage WHERE card_id=?1 AND year=?2 AND month=?3",
            params![card_id, month.year(), month.month()],
            |r| {
                Ok(CardUsage {
                    card_id: r.get(0)?,
                    year: r.get(1)?,
                    month: r.get(2)?,
                    total_amount: decimal_at(r, 3)?,
                    transaction_count: r.get(4)?,
                    calculated_at: r.get(5)?,
                })
            },
        )
        .optional()?)
}

/// Usage of a card in a month. Served from the cache, which every link
/// change keeps current; a month never computed before is filled on read.
pub fn usage_for(conn: &Connection, card_id: i64, month: YearMonth) -> Result<CardUsage> {
    get_card(conn, card_id)?;
    match cached_usage(conn, card_id, month)? {
        Some(usage) => Ok(usage),
        None => refresh_usage(conn, card_id, month),
    }
}

/// Spend as a percentage of the credit limit. `None` when a limit does not
/// apply: debit cards and credit cards without a positive limit.
pub fn utilization_rate(conn: &Connection, card_id: i64, month: YearMonth) -> Result<Option<Decimal>> {
    let card = get_card(conn, card_id)?;
    if limit_of(&card).is_none() {
        return Ok(None);
    }
    let usage = usage_for(conn, card_id, month)?;
    Ok(utilization_of(&card, usage.total_amount))
}

fn limit_of(card: &Card) -> Option<Decimal> {
    match (card.kind, card.credit_limit) {
        (CardKind::Credit, Some(limit)) if limit > Decimal::ZERO => Some(limit),
        _ => None,
    }
}

fn utilization_of(card: &Card, spent: Decimal) -> Option<Decimal> {
    limit_of(card).map(|limit| percent(spent, limit))
}

/// Cached usage when present, otherwise computed from the ledger without
/// touching the cache.
fn peek_usage(conn: &Connection, card_id: i64, month: YearMonth) -> Result<(Decimal, i64)> {
    match cached_usage(conn, card_id, month)? {
        Some(usage) => Ok((usage.total_amount, usage.transaction_count)),
        None => compute_usage(conn, card_id, month),
    }
}

#[derive(Debug, Serialize)]
pub struct CardLine {
    pub name: String,
    pub kind: CardKind,
    pub issuer: String,
    pub last_four: String,
    pub this_month: Decimal,
    pub transaction_count: i64,
    pub last_month: Decimal,
    pub utilization: Option<Decimal>,
}

#[derive(Debug, Serialize)]
pub struct CardSummary {
    pub month: YearMonth,
    pub total_cards: usize,
    pub active_cards: usize,
    pub credit_cards: usize,
    pub debit_cards: usize,
    pub this_month_total: Decimal,
    pub this_month_count: i64,
    pub last_month_total: Decimal,
    pub last_month_count: i64,
    pub change_percent: Decimal,
    pub cards: Vec<CardLine>,
}

pub fn card_summary(conn: &Connection, month: YearMonth) -> Result<CardSummary> {
    let snap = conn.unchecked_transaction()?;
    let cards = list_cards(&snap)?;
    let prev = month.prev();

    let mut summary = CardSummary {
        month,
        total_cards: cards.len(),
        active_cards: cards.iter().filter(|c| c.is_active).count(),
        credit_cards: cards.iter().filter(|c| c.kind == CardKind::Credit).count(),
        debit_cards: cards.iter().filter(|c| c.kind == CardKind::Debit).count(),
        this_month_total: Decimal::ZERO,
        this_month_count: 0,
        last_month_total: Decimal::ZERO,
        last_month_count: 0,
        change_percent: Decimal::ZERO,
        cards: Vec::with_capacity(cards.len()),
    };
    for card in cards {
        let (now_total, now_count) = peek_usage(&snap, card.id, month)?;
        let (before_total, before_count) = peek_usage(&snap, card.id, prev)?;
        summary.this_month_total = checked_add(summary.this_month_total, now_total, "card spend")?;
        summary.this_month_count += now_count;
        summary.last_month_total = checked_add(summary.last_month_total, before_total, "card spend")?;
        summary.last_month_count += before_count;
        summary.cards.push(CardLine {
            utilization: utilization_of(&card, now_total),
            name: card.name,
            kind: card.kind,
            issuer: card.issuer,
            last_four: card.last_four,
            this_month: now_total,
            transaction_count: now_count,
            last_month: before_total,
        });
    }
    // read only; the cache is left as found
    snap.finish()?;
    summary.change_percent = percent(
        checked_sub(summary.this_month_total, summary.last_month_total, "card spend change")?,
        summary.last_month_total,
    );
    Ok(summary)
}

fn list(conn: &Connection, sub: &clap::ArgMatches) -> anyhow::Result<()> {
    let cards = list_cards(conn)?;
    if maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &cards)? {
        return Ok(());
    }
    let data = cards
        .into_iter()
        .map(|c| {
            vec![
                c.name,
                c.kind.to_string(),
                c.issuer,
                format!("*{}", c.last_four),
                c.credit_limit.map(|l| format!("{:.0}", l)).unwrap_or_else(|| "-".into()),
                if c.is_active { "yes".into() } else { "no".into() },
            ]
        })
        .collect();
    println!(
        "{}",
        pretty_table(&["Card", "Type", "Issuer", "Number", "Limit", "Active"], data)
    );
    Ok(())
}

fn summary(conn: &Connection, sub: &clap::ArgMatches) -> anyhow::Result<()> {
    let month = parse_month(sub.get_one::<String>("month").unwrap())?;
    let s = card_summary(conn, month)?;
    if maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &s)? {
        return Ok(());
    }
    println!(
        "{} cards ({} active, {} credit, {} debit)",
        s.total_cards, s.active_cards, s.credit_cards, s.debit_cards
    );
    println!(
        "{}: {:.0} in {} transactions; {}: {:.0} in {} transactions; change {:.1}%",
        s.month,
        s.this_month_total,
        s.this_month_count,
        s.month.prev(),
        s.last_month_total,
        s.last_month_count,
        s.change_percent
    );
    let data = s
        .cards
        .into_iter()
        .map(|c| {
            vec![
                c.name,
                c.kind.to_string(),
                format!("{:.0}", c.this_month),
                c.transaction_count.to_string(),
                format!("{:.0}", c.last_month),
                c.utilization
                    .map(|u| format!("{:.1}%", u))
                    .unwrap_or_else(|| "n/a".into()),
            ]
        })
        .collect();
    println!(
        "{}",
        pretty_table(
            &["Card", "Type", "This Month", "Count", "Last Month", "Utilization"],
            data
        )
    );
    Ok(())
}
