// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::commands::cards;
use crate::error::Result;
use crate::models::YearMonth;
use crate::utils::{decimal_at, maybe_print_json, opt_decimal_at, pretty_table};
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::warn;

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> anyhow::Result<()> {
    let issues = check(conn)?;
    if maybe_print_json(m.get_flag("json"), m.get_flag("jsonl"), &issues)? {
        return Ok(());
    }
    if issues.is_empty() {
        println!("doctor: no issues found");
    } else {
        let rows = issues.into_iter().map(|i| vec![i.kind.into(), i.detail]).collect();
        println!("{}", pretty_table(&["Issue", "Detail"], rows));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Issue {
    pub kind: &'static str,
    pub detail: String,
}

pub fn check(conn: &Connection) -> Result<Vec<Issue>> {
    let snap = conn.unchecked_transaction()?;
    let mut issues = Vec::new();

    // 1) entry sets that do not balance or are too short
    let mut totals: BTreeMap<i64, (Decimal, Decimal, usize)> = BTreeMap::new();
    {
        let mut stmt = snap.prepare(
            "SELECT t.id, e.debit_amount, e.credit_amount
             FROM transactions t LEFT JOIN transaction_entries e ON e.transaction_id=t.id",
        )?;
        let mut rows = stmt.query([])?;
        while let Some(r) = rows.next()? {
            let slot = totals.entry(r.get(0)?).or_default();
            let debit = opt_decimal_at(r, 1)?;
            let credit = opt_decimal_at(r, 2)?;
            if debit.is_some() || credit.is_some() {
                slot.2 += 1;
            }
            slot.0 = slot.0.saturating_add(debit.unwrap_or_default());
            slot.1 = slot.1.saturating_add(credit.unwrap_or_default());
        }
    }
    for (id, (debit, credit, count)) in totals {
        if count < 2 {
            issues.push(Issue {
                kind: "too_few_entries",
                detail: format!("transaction #{} has {} entries", id, count),
            });
        }
        if debit != credit {
            issues.push(Issue {
                kind: "unbalanced",
                detail: format!("transaction #{}: debits {} != credits {}", id, debit, credit),
            });
        }
    }

    // 2) debit cards carrying a limit
    {
        let mut stmt = snap.prepare(
            "SELECT name FROM cards WHERE type='debit' AND credit_limit IS NOT NULL",
        )?;
        let names = stmt
            .query_map([], |r| r.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for name in names {
            issues.push(Issue {
                kind: "debit_card_limit",
                detail: name,
            });
        }
    }

    // 3) usage cache rows that disagree with the ledger
    {
        let mut stmt = snap.prepare(
            "SELECT card_id, year, month, total_amount, transaction_count FROM card_monthly_usage",
        )?;
        let cached = stmt
            .query_map([], |r| {
                Ok((
                    r.get::<_, i64>(0)?,
                    r.get::<_, i32>(1)?,
                    r.get::<_, u32>(2)?,
                    decimal_at(r, 3)?,
                    r.get::<_, i64>(4)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for (card_id, year, month, total, count) in cached {
            let month = YearMonth::new(year, month)?;
            let (fresh_total, fresh_count) = cards::compute_usage(&snap, card_id, month)?;
            if fresh_total != total || fresh_count != count {
                issues.push(Issue {
                    kind: "stale_card_usage",
                    detail: format!(
                        "card #{} {}: cached {} ({}), actual {} ({})",
                        card_id, month, total, count, fresh_total, fresh_count
                    ),
                });
            }
        }
    }

    snap.finish()?;
    if !issues.is_empty() {
        warn!(count = issues.len(), "doctor found issues");
    }
    Ok(issues)
}
