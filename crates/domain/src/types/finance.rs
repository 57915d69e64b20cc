//! Ledger entities exchanged between client and server

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::{FinTrackError, Result};

/// Whether a category or transaction moves money out or in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CategoryType {
    Expense,
    Income,
}

crate::impl_domain_status_conversions!(CategoryType {
    Expense => "expense",
    Income => "income",
});

/// Fields shared by both transaction variants.
///
/// `amount_cents` is an unsigned magnitude in minor units; the sign comes
/// from the enclosing [`Transaction`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    pub amount_cents: i64,
    pub description: String,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_name: Option<String>,
}

/// A ledger entry, tagged on the wire by `"type": "EXPENSE" | "INCOME"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum Transaction {
    Expense(TransactionDetails),
    Income(TransactionDetails),
}

impl Transaction {
    pub const fn details(&self) -> &TransactionDetails {
        match self {
            Self::Expense(details) | Self::Income(details) => details,
        }
    }

    pub fn details_mut(&mut self) -> &mut TransactionDetails {
        match self {
            Self::Expense(details) | Self::Income(details) => details,
        }
    }

    pub const fn id(&self) -> Option<i64> {
        self.details().id
    }

    pub const fn kind(&self) -> CategoryType {
        match self {
            Self::Expense(_) => CategoryType::Expense,
            Self::Income(_) => CategoryType::Income,
        }
    }

    /// Amount with sign applied: negative for expenses, positive for income.
    pub const fn signed_amount(&self) -> i64 {
        match self {
            Self::Expense(details) => details.amount_cents.saturating_neg(),
            Self::Income(details) => details.amount_cents,
        }
    }

    /// Basic shape checks shared by the server and the offline router.
    ///
    /// # Errors
    /// Returns [`FinTrackError::InvalidInput`] for a blank description or a
    /// negative magnitude.
    pub fn validate(&self) -> Result<()> {
        let details = self.details();
        if details.description.trim().is_empty() {
            return Err(FinTrackError::InvalidInput("description is required".into()));
        }
        if details.amount_cents < 0 {
            return Err(FinTrackError::InvalidInput(
                "amount must be non-negative; the transaction type carries the sign".into(),
            ));
        }
        Ok(())
    }
}

/// A user-defined bucket for transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    pub name: String,
    #[serde(rename = "type")]
    pub category_type: CategoryType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Category {
    /// # Errors
    /// Returns [`FinTrackError::InvalidInput`] when the name is blank.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(FinTrackError::InvalidInput("Name and Type required".into()));
        }
        Ok(())
    }
}

/// Optional filters for listing transactions. Bounds are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<i64>,
}

impl TransactionFilter {
    pub fn matches(&self, transaction: &Transaction) -> bool {
        let details = transaction.details();
        if self.start_date.is_some_and(|start| details.date < start) {
            return false;
        }
        if self.end_date.is_some_and(|end| details.date > end) {
            return false;
        }
        if let Some(category_id) = self.category_id {
            return details.category_id == Some(category_id);
        }
        true
    }

    pub const fn is_empty(&self) -> bool {
        self.start_date.is_none() && self.end_date.is_none() && self.category_id.is_none()
    }
}
