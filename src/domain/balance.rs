use std::collections::HashMap;

use super::{Cents, CustomerId, Transaction, TransactionStatus};

/// Compute the balance for a single customer from a list of transactions.
/// Balance = sum of approved debits - sum of approved payments. Pending
/// and rejected transactions never contribute.
///
/// The repository computes the same figure in SQL; this in-memory version
/// is the reconciliation path and the reference for tests.
pub fn customer_balance(customer_id: CustomerId, transactions: &[Transaction]) -> Cents {
    transactions
        .iter()
        .filter(|tx| tx.customer_id == customer_id && tx.status == TransactionStatus::Approved)
        .map(|tx| tx.transaction_type.signed_cents(tx.amount_cents))
        .sum()
}

/// Compute balances for all customers with at least one approved
/// transaction. Customers absent from the map have a balance of zero.
pub fn all_balances(transactions: &[Transaction]) -> HashMap<CustomerId, Cents> {
    let mut balances: HashMap<CustomerId, Cents> = HashMap::new();
    for tx in transactions {
        if tx.status != TransactionStatus::Approved {
            continue;
        }
        *balances.entry(tx.customer_id).or_insert(0) +=
            tx.transaction_type.signed_cents(tx.amount_cents);
    }
    balances
}

/// Total money owed to the shop: the sum of positive balances only.
/// Customers in credit do not reduce the outstanding figure.
pub fn outstanding_total(balances: &HashMap<CustomerId, Cents>) -> Cents {
    balances.values().filter(|b| **b > 0).sum()
}
