// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use rust_decimal::Decimal;
use thiserror::Error;

/// Failures surfaced by the ledger engine. None of them are retried
/// internally; the caller decides how to present them.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("unbalanced transaction: debits {debits} != credits {credits}")]
    UnbalancedEntry { debits: Decimal, credits: Decimal },

    #[error("invalid entry: {0}")]
    InvalidEntry(String),

    #[error("account {account_id} is in use: {reason}")]
    AccountInUse { account_id: i64, reason: String },

    #[error("budget category '{0}' is derived from fixed expenses and cannot be edited")]
    ReadOnlyCategory(String),

    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Storage(#[from] rusqlite::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl LedgerError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        LedgerError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn invalid_entry(msg: impl Into<String>) -> Self {
        LedgerError::InvalidEntry(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        LedgerError::InvalidInput(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
