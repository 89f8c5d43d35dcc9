use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ActorId, Cents, CustomerId};

pub type TransactionId = Uuid;

/// Direction of a ledger movement: a debit increases what the customer
/// owes, a payment decreases it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Debit,
    Payment,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Debit => "debit",
            TransactionType::Payment => "payment",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "debit" => Some(TransactionType::Debit),
            "payment" => Some(TransactionType::Payment),
            _ => None,
        }
    }

    /// The contribution of an approved transaction of this type to the
    /// customer balance.
    pub fn signed_cents(&self, amount_cents: Cents) -> Cents {
        match self {
            TransactionType::Debit => amount_cents,
            TransactionType::Payment => -amount_cents,
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle state of a transaction. `Pending` is the initial state;
/// `Approved` and `Rejected` are terminal and permit no further
/// transitions or edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Approved,
    Rejected,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Approved => "approved",
            TransactionStatus::Rejected => "rejected",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(TransactionStatus::Pending),
            "approved" => Some(TransactionStatus::Approved),
            "rejected" => Some(TransactionStatus::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Approved | TransactionStatus::Rejected)
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single movement of money owed by or paid by a customer. Created in
/// `Pending` state; only approved transactions contribute to the customer
/// balance. The transition to a terminal state happens exactly once, via
/// the repository's conditional update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub customer_id: CustomerId,
    pub transaction_type: TransactionType,
    /// Amount in cents, always positive; direction comes from the type.
    pub amount_cents: Cents,
    pub description: String,
    pub status: TransactionStatus,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
    /// Set if and only if the transaction was rejected.
    pub rejection_reason: Option<String>,
    pub created_by: ActorId,
    pub created_at: DateTime<Utc>,
    /// Who decided the terminal state (set for rejections too).
    pub approved_by: Option<ActorId>,
    pub approved_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn new(
        customer_id: CustomerId,
        transaction_type: TransactionType,
        amount_cents: Cents,
        description: String,
        created_by: ActorId,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            customer_id,
            transaction_type,
            amount_cents,
            description,
            status: TransactionStatus::Pending,
            payment_method: None,
            notes: None,
            rejection_reason: None,
            created_by,
            created_at: now,
            approved_by: None,
            approved_at: None,
            updated_at: now,
        }
    }

    pub fn with_payment_method(mut self, method: impl Into<String>) -> Self {
        self.payment_method = Some(method.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn is_pending(&self) -> bool {
        self.status == TransactionStatus::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Transaction {
        Transaction::new(
            Uuid::new_v4(),
            TransactionType::Debit,
            10000,
            "store credit".into(),
            Uuid::new_v4(),
        )
    }

    #[test]
    fn test_new_transaction_is_pending() {
        let tx = sample();
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert!(tx.approved_by.is_none());
        assert!(tx.rejection_reason.is_none());
    }

    #[test]
    fn test_type_roundtrip() {
        for tt in [TransactionType::Debit, TransactionType::Payment] {
            assert_eq!(TransactionType::from_str(tt.as_str()), Some(tt));
        }
        assert_eq!(TransactionType::from_str("refund"), None);
    }

    #[test]
    fn test_status_roundtrip_and_terminality() {
        for st in [
            TransactionStatus::Pending,
            TransactionStatus::Approved,
            TransactionStatus::Rejected,
        ] {
            assert_eq!(TransactionStatus::from_str(st.as_str()), Some(st));
        }
        assert!(!TransactionStatus::Pending.is_terminal());
        assert!(TransactionStatus::Approved.is_terminal());
        assert!(TransactionStatus::Rejected.is_terminal());
    }

    #[test]
    fn test_signed_cents() {
        assert_eq!(TransactionType::Debit.signed_cents(100), 100);
        assert_eq!(TransactionType::Payment.signed_cents(100), -100);
    }
}
