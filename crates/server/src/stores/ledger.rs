//! Per-user transactions and categories
//!
//! Every call is keyed by the caller's user id; an id owned by another user
//! behaves exactly like an id that does not exist.

use std::collections::{BTreeMap, HashMap};

use fintrack_domain::{Category, FinTrackError, Result, Transaction, TransactionFilter};
use parking_lot::RwLock;
use tracing::debug;

#[derive(Default)]
struct Ledger {
    next_transaction_id: i64,
    next_category_id: i64,
    transactions: HashMap<i64, BTreeMap<i64, Transaction>>,
    categories: HashMap<i64, BTreeMap<i64, Category>>,
}

impl Ledger {
    fn category_name(&self, user_id: i64, category_id: Option<i64>) -> Option<String> {
        let category_id = category_id?;
        self.categories.get(&user_id)?.get(&category_id).map(|category| category.name.clone())
    }
}

/// In-memory ledger shared by all handlers.
#[derive(Default)]
pub struct LedgerStore {
    inner: RwLock<Ledger>,
}

impl LedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caller's transactions matching `filter`, newest date first.
    pub fn list_transactions(&self, user_id: i64, filter: &TransactionFilter) -> Vec<Transaction> {
        let ledger = self.inner.read();
        let mut transactions: Vec<Transaction> = ledger
            .transactions
            .get(&user_id)
            .map(|owned| owned.values().filter(|tx| filter.matches(tx)).cloned().collect())
            .unwrap_or_default();

        for tx in &mut transactions {
            let details = tx.details_mut();
            details.category_name = ledger.category_name(user_id, details.category_id);
        }
        transactions.sort_by(|a, b| {
            b.details().date.cmp(&a.details().date).then_with(|| b.id().cmp(&a.id()))
        });
        transactions
    }

    /// Store a new transaction and return it with its server-assigned id.
    ///
    /// # Errors
    /// [`FinTrackError::InvalidInput`] when the transaction fails validation.
    pub fn create_transaction(&self, user_id: i64, mut transaction: Transaction) -> Result<Transaction> {
        transaction.validate()?;

        let mut ledger = self.inner.write();
        ledger.next_transaction_id += 1;
        let id = ledger.next_transaction_id;
        let category_name = ledger.category_name(user_id, transaction.details().category_id);

        let details = transaction.details_mut();
        details.id = Some(id);
        details.user_id = Some(user_id);
        details.category_name = category_name;

        ledger.transactions.entry(user_id).or_default().insert(id, transaction.clone());
        debug!(user_id, transaction_id = id, "Transaction created");
        Ok(transaction)
    }

    /// Replace an owned transaction.
    ///
    /// # Errors
    /// - [`FinTrackError::InvalidInput`] without an id or on validation failure
    /// - [`FinTrackError::NotFound`] when the caller does not own the id
    pub fn update_transaction(&self, user_id: i64, mut transaction: Transaction) -> Result<Transaction> {
        let id = transaction
            .id()
            .ok_or_else(|| FinTrackError::InvalidInput("Transaction ID required for update".into()))?;
        transaction.validate()?;

        let mut ledger = self.inner.write();
        let category_name = ledger.category_name(user_id, transaction.details().category_id);
        let slot = ledger
            .transactions
            .get_mut(&user_id)
            .and_then(|owned| owned.get_mut(&id))
            .ok_or_else(|| FinTrackError::NotFound(format!("Transaction {id} not found")))?;

        let details = transaction.details_mut();
        details.user_id = Some(user_id);
        details.category_name = category_name;
        slot.clone_from(&transaction);

        debug!(user_id, transaction_id = id, "Transaction updated");
        Ok(transaction)
    }

    /// # Errors
    /// [`FinTrackError::NotFound`] when the caller does not own the id.
    pub fn delete_transaction(&self, user_id: i64, id: i64) -> Result<()> {
        self.inner
            .write()
            .transactions
            .get_mut(&user_id)
            .and_then(|owned| owned.remove(&id))
            .map(|_| debug!(user_id, transaction_id = id, "Transaction deleted"))
            .ok_or_else(|| FinTrackError::NotFound(format!("Transaction {id} not found")))
    }

    /// Caller's categories ordered by id.
    pub fn list_categories(&self, user_id: i64) -> Vec<Category> {
        self.inner
            .read()
            .categories
            .get(&user_id)
            .map(|owned| owned.values().cloned().collect())
            .unwrap_or_default()
    }

    /// # Errors
    /// [`FinTrackError::InvalidInput`] when the name is blank.
    pub fn create_category(&self, user_id: i64, mut category: Category) -> Result<Category> {
        category.validate()?;

        let mut ledger = self.inner.write();
        ledger.next_category_id += 1;
        let id = ledger.next_category_id;
        category.id = Some(id);
        category.user_id = Some(user_id);

        ledger.categories.entry(user_id).or_default().insert(id, category.clone());
        debug!(user_id, category_id = id, "Category created");
        Ok(category)
    }

    /// # Errors
    /// - [`FinTrackError::InvalidInput`] without an id or with a blank name
    /// - [`FinTrackError::NotFound`] when the caller does not own the id
    pub fn update_category(&self, user_id: i64, mut category: Category) -> Result<Category> {
        let id = category
            .id
            .ok_or_else(|| FinTrackError::InvalidInput("ID required for update".into()))?;
        category.validate()?;
        category.user_id = Some(user_id);

        let mut ledger = self.inner.write();
        let slot = ledger
            .categories
            .get_mut(&user_id)
            .and_then(|owned| owned.get_mut(&id))
            .ok_or_else(|| FinTrackError::NotFound(format!("Category {id} not found")))?;
        slot.clone_from(&category);

        debug!(user_id, category_id = id, "Category updated");
        Ok(category)
    }

    /// Delete an owned category and detach it from the caller's transactions.
    ///
    /// # Errors
    /// [`FinTrackError::NotFound`] when the caller does not own the id.
    pub fn delete_category(&self, user_id: i64, id: i64) -> Result<()> {
        let mut ledger = self.inner.write();
        ledger
            .categories
            .get_mut(&user_id)
            .and_then(|owned| owned.remove(&id))
            .ok_or_else(|| FinTrackError::NotFound(format!("Category {id} not found")))?;

        if let Some(owned) = ledger.transactions.get_mut(&user_id) {
            for tx in owned.values_mut() {
                let details = tx.details_mut();
                if details.category_id == Some(id) {
                    details.category_id = None;
                    details.category_name = None;
                }
            }
        }
        debug!(user_id, category_id = id, "Category deleted");
        Ok(())
    }
}
