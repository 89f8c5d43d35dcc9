// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use debitbook::application::LedgerService;
use debitbook::domain::{Actor, Customer, Role, Transaction, TransactionType};
use tempfile::TempDir;
use uuid::Uuid;

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(LedgerService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let service = LedgerService::init(db_path.to_str().unwrap()).await?;
    Ok((service, temp_dir))
}

pub fn admin() -> Actor {
    Actor::new(Uuid::new_v4(), Role::Admin)
}

pub fn manager() -> Actor {
    Actor::new(Uuid::new_v4(), Role::Manager)
}

pub fn staff() -> Actor {
    Actor::new(Uuid::new_v4(), Role::Staff)
}

/// Create a customer with no contact details.
pub async fn create_customer(
    service: &LedgerService,
    actor: &Actor,
    name: &str,
) -> Result<Customer> {
    Ok(service
        .create_customer(name.to_string(), None, None, None, actor)
        .await?)
}

/// Record a pending debit for the given customer.
pub async fn add_debit(
    service: &LedgerService,
    actor: &Actor,
    customer: &Customer,
    amount_cents: i64,
) -> Result<Transaction> {
    Ok(service
        .create_transaction(
            customer.id,
            TransactionType::Debit,
            amount_cents,
            "goods on credit".to_string(),
            None,
            None,
            actor,
        )
        .await?)
}

/// Record a pending payment for the given customer.
pub async fn add_payment(
    service: &LedgerService,
    actor: &Actor,
    customer: &Customer,
    amount_cents: i64,
) -> Result<Transaction> {
    Ok(service
        .create_transaction(
            customer.id,
            TransactionType::Payment,
            amount_cents,
            "cash payment".to_string(),
            Some("cash".to_string()),
            None,
            actor,
        )
        .await?)
}
