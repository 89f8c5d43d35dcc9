use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::domain::{
    Actor, ActorId, AuditAction, AuditCursor, AuditFilter, AuditLogEntry, AuditPage, AuditStream,
    AuditTargetType, Cents, Customer, CustomerId, Role, Transaction, TransactionId,
    TransactionStatus, TransactionType,
};
use crate::storage::{Repository, TransactionEdit, TransactionFilter};

use super::LedgerError;

/// Hard cap on audit page sizes; requests above it are clamped.
const MAX_AUDIT_PAGE: usize = 500;

/// Application service providing the ledger operations. This is the primary
/// interface for any client (CLI, API, UI). Constructed once and passed by
/// reference; it owns no ambient state beyond the pooled repository and a
/// counter of dropped audit writes.
#[derive(Clone)]
pub struct LedgerService {
    repo: Repository,
    audit_failures: Arc<AtomicU64>,
}

/// Customer with derived figures, for list screens.
#[derive(Debug, Clone)]
pub struct CustomerOverview {
    pub customer: Customer,
    pub balance: Cents,
    pub transaction_count: i64,
    pub last_transaction_at: Option<DateTime<Utc>>,
}

impl LedgerService {
    /// Create a new ledger service with the given repository.
    pub fn new(repo: Repository) -> Self {
        Self {
            repo,
            audit_failures: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Initialize a new database at the given path.
    pub async fn init(database_path: &str) -> Result<Self, LedgerError> {
        let db_url = format!("sqlite:{}?mode=rwc", database_path);
        let repo = Repository::init(&db_url).await?;
        Ok(Self::new(repo))
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str) -> Result<Self, LedgerError> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = Repository::connect(&db_url).await?;
        Ok(Self::new(repo))
    }

    // ========================
    // Customer operations
    // ========================

    /// Create a new customer. The duplicate-name check is the store's
    /// unique constraint, so two concurrent creators with the same name
    /// resolve to exactly one success and one conflict.
    pub async fn create_customer(
        &self,
        name: String,
        email: Option<String>,
        phone: Option<String>,
        address: Option<String>,
        actor: &Actor,
    ) -> Result<Customer, LedgerError> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(LedgerError::validation("customer name must not be empty"));
        }

        let mut customer = Customer::new(name, actor.id);
        if let Some(email) = email {
            customer = customer.with_email(email);
        }
        if let Some(phone) = phone {
            customer = customer.with_phone(phone);
        }
        if let Some(address) = address {
            customer = customer.with_address(address);
        }

        if !self.repo.insert_customer(&customer).await? {
            return Err(LedgerError::conflict(format!(
                "an active customer named '{}' already exists",
                customer.name
            )));
        }

        self.record_audit(
            AuditLogEntry::new(AuditStream::Ledger, actor.id, AuditAction::CustomerCreated)
                .with_target(AuditTargetType::Customer, customer.id)
                .with_customer(customer.id)
                .with_snapshots(None, serde_json::to_value(&customer).ok()),
        )
        .await;

        Ok(customer)
    }

    /// Get a customer by ID.
    pub async fn get_customer(&self, id: CustomerId) -> Result<Customer, LedgerError> {
        self.repo
            .get_customer(id)
            .await?
            .ok_or_else(|| LedgerError::not_found("customer", id))
    }

    /// Get an active customer by name.
    pub async fn get_customer_by_name(&self, name: &str) -> Result<Customer, LedgerError> {
        self.repo
            .get_customer_by_name(name)
            .await?
            .ok_or_else(|| LedgerError::not_found("customer", name))
    }

    /// List customers.
    pub async fn list_customers(&self, include_inactive: bool) -> Result<Vec<Customer>, LedgerError> {
        Ok(self.repo.list_customers(include_inactive).await?)
    }

    /// Deactivate a customer. Customers are never deleted; their history
    /// and balance survive deactivation.
    pub async fn deactivate_customer(
        &self,
        id: CustomerId,
        actor: &Actor,
    ) -> Result<Customer, LedgerError> {
        if !actor.role.can_approve() {
            return Err(LedgerError::Authorization {
                role: actor.role,
                operation: "deactivate a customer",
            });
        }

        let before = self.get_customer(id).await?;
        if !self.repo.deactivate_customer(id).await? {
            return Err(LedgerError::conflict(format!(
                "customer '{}' is already inactive",
                before.name
            )));
        }
        let after = self.get_customer(id).await?;

        self.record_audit(
            AuditLogEntry::new(
                AuditStream::Ledger,
                actor.id,
                AuditAction::CustomerDeactivated,
            )
            .with_target(AuditTargetType::Customer, id)
            .with_customer(id)
            .with_snapshots(
                serde_json::to_value(&before).ok(),
                serde_json::to_value(&after).ok(),
            ),
        )
        .await;

        Ok(after)
    }

    /// Customers with their balances, transaction counts and last activity.
    pub async fn customer_overview(
        &self,
        include_inactive: bool,
    ) -> Result<Vec<CustomerOverview>, LedgerError> {
        let customers = self.repo.list_customers(include_inactive).await?;
        let balances = self.repo.all_customer_balances().await?;
        let activity = self.repo.customer_activity().await?;

        Ok(customers
            .into_iter()
            .map(|customer| {
                let balance = balances.get(&customer.id).copied().unwrap_or(0);
                let act = activity.get(&customer.id).copied().unwrap_or_default();
                CustomerOverview {
                    customer,
                    balance,
                    transaction_count: act.transaction_count,
                    last_transaction_at: act.last_transaction_at,
                }
            })
            .collect())
    }

    // ========================
    // Transaction operations
    // ========================

    /// Record a new transaction in `pending` state. Pending transactions
    /// never affect the customer balance.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_transaction(
        &self,
        customer_id: CustomerId,
        transaction_type: TransactionType,
        amount_cents: Cents,
        description: String,
        payment_method: Option<String>,
        notes: Option<String>,
        actor: &Actor,
    ) -> Result<Transaction, LedgerError> {
        if amount_cents <= 0 {
            return Err(LedgerError::validation("amount must be positive"));
        }
        let description = description.trim().to_string();
        if description.is_empty() {
            return Err(LedgerError::validation("description must not be empty"));
        }

        let customer = self.get_customer(customer_id).await?;
        if !customer.is_active {
            return Err(LedgerError::validation(format!(
                "customer '{}' is inactive",
                customer.name
            )));
        }

        let mut tx = Transaction::new(
            customer_id,
            transaction_type,
            amount_cents,
            description,
            actor.id,
        );
        if let Some(method) = payment_method {
            tx = tx.with_payment_method(method);
        }
        if let Some(notes) = notes {
            tx = tx.with_notes(notes);
        }

        self.repo.insert_transaction(&tx).await?;

        self.record_audit(
            AuditLogEntry::new(AuditStream::Ledger, actor.id, AuditAction::TransactionCreated)
                .with_target(AuditTargetType::Transaction, tx.id)
                .with_customer(customer_id)
                .with_snapshots(None, serde_json::to_value(&tx).ok())
                .with_metadata(json!({
                    "amount_cents": tx.amount_cents,
                    "transaction_type": tx.transaction_type,
                    "payment_method": tx.payment_method,
                })),
        )
        .await;

        Ok(tx)
    }

    /// Get a transaction by ID.
    pub async fn get_transaction(&self, id: TransactionId) -> Result<Transaction, LedgerError> {
        self.repo
            .get_transaction(id)
            .await?
            .ok_or_else(|| LedgerError::not_found("transaction", id))
    }

    /// List transactions with filters, newest first.
    pub async fn list_transactions(
        &self,
        filter: TransactionFilter,
    ) -> Result<Vec<Transaction>, LedgerError> {
        Ok(self.repo.list_transactions(&filter).await?)
    }

    /// Edit a transaction while it is still pending. Terminal transactions
    /// are immutable; editing one fails with a conflict.
    pub async fn edit_transaction(
        &self,
        id: TransactionId,
        edit: TransactionEdit,
        actor: &Actor,
    ) -> Result<Transaction, LedgerError> {
        if edit.is_empty() {
            return Err(LedgerError::validation("no fields to edit"));
        }
        if let Some(amount) = edit.amount_cents {
            if amount <= 0 {
                return Err(LedgerError::validation("amount must be positive"));
            }
        }
        if let Some(ref description) = edit.description {
            if description.trim().is_empty() {
                return Err(LedgerError::validation("description must not be empty"));
            }
        }

        let before = self.get_transaction(id).await?;
        if !self.repo.update_pending_transaction(id, &edit).await? {
            // The pre-fetched status may be stale by now; report what the
            // row actually is (or NotFound if it was deleted meanwhile).
            let current = self.get_transaction(id).await?;
            return Err(LedgerError::conflict(format!(
                "transaction {} is {} and can no longer be edited",
                id, current.status
            )));
        }
        let after = self.get_transaction(id).await?;

        self.record_audit(
            AuditLogEntry::new(AuditStream::Ledger, actor.id, AuditAction::TransactionUpdated)
                .with_target(AuditTargetType::Transaction, id)
                .with_customer(after.customer_id)
                .with_snapshots(
                    serde_json::to_value(&before).ok(),
                    serde_json::to_value(&after).ok(),
                ),
        )
        .await;

        Ok(after)
    }

    /// Delete a pending transaction. Admin-only; a pending transaction has
    /// never contributed to a balance, so no compensation is needed, but
    /// the deletion itself is audited.
    pub async fn delete_transaction(
        &self,
        id: TransactionId,
        actor: &Actor,
    ) -> Result<(), LedgerError> {
        if !actor.role.can_delete() {
            return Err(LedgerError::Authorization {
                role: actor.role,
                operation: "delete a transaction",
            });
        }

        let before = self.get_transaction(id).await?;
        if !self.repo.delete_pending_transaction(id).await? {
            let current = self.get_transaction(id).await?;
            return Err(LedgerError::conflict(format!(
                "transaction {} is {} and cannot be deleted",
                id, current.status
            )));
        }

        self.record_audit(
            AuditLogEntry::new(AuditStream::Ledger, actor.id, AuditAction::TransactionDeleted)
                .with_target(AuditTargetType::Transaction, id)
                .with_customer(before.customer_id)
                .with_snapshots(serde_json::to_value(&before).ok(), None),
        )
        .await;

        Ok(())
    }

    /// Approve a pending transaction. The transition is a single
    /// conditional update in the store: of any number of concurrent
    /// approve/reject calls, exactly one wins and the rest observe a
    /// conflict. On success the transaction starts counting toward the
    /// customer balance.
    pub async fn approve_transaction(
        &self,
        id: TransactionId,
        actor: &Actor,
    ) -> Result<Transaction, LedgerError> {
        self.transition(id, TransactionStatus::Approved, None, actor)
            .await
    }

    /// Reject a pending transaction with a mandatory reason. Records who
    /// rejected and when in the same fields approval uses.
    pub async fn reject_transaction(
        &self,
        id: TransactionId,
        actor: &Actor,
        reason: &str,
    ) -> Result<Transaction, LedgerError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(LedgerError::validation("rejection reason must not be empty"));
        }
        self.transition(id, TransactionStatus::Rejected, Some(reason), actor)
            .await
    }

    async fn transition(
        &self,
        id: TransactionId,
        to: TransactionStatus,
        rejection_reason: Option<&str>,
        actor: &Actor,
    ) -> Result<Transaction, LedgerError> {
        let operation = match to {
            TransactionStatus::Approved => "approve a transaction",
            _ => "reject a transaction",
        };
        if !actor.role.can_approve() {
            return Err(LedgerError::Authorization {
                role: actor.role,
                operation,
            });
        }

        let before = self.get_transaction(id).await?;
        let decided_at = Utc::now();
        let won = self
            .repo
            .transition_transaction(id, to, actor.id, rejection_reason, decided_at)
            .await?;
        if !won {
            // Someone else reached a terminal decision first (or had
            // already). Never overwrite it; report the lost race.
            return Err(LedgerError::conflict(format!(
                "transaction {} is no longer pending",
                id
            )));
        }
        let after = self.get_transaction(id).await?;

        let action = match to {
            TransactionStatus::Approved => AuditAction::TransactionApproved,
            _ => AuditAction::TransactionRejected,
        };
        self.record_audit(
            AuditLogEntry::new(AuditStream::Ledger, actor.id, action)
                .with_target(AuditTargetType::Transaction, id)
                .with_customer(after.customer_id)
                .with_snapshots(
                    serde_json::to_value(&before).ok(),
                    serde_json::to_value(&after).ok(),
                )
                .with_metadata(json!({
                    "amount_cents": after.amount_cents,
                    "transaction_type": after.transaction_type,
                    "status": after.status,
                    "rejection_reason": after.rejection_reason,
                })),
        )
        .await;

        Ok(after)
    }

    // ========================
    // Balances
    // ========================

    /// Balance for a single customer: approved debits minus approved
    /// payments. Positive means the customer owes the shop.
    pub async fn customer_balance(&self, customer_id: CustomerId) -> Result<Cents, LedgerError> {
        // Ensure the id resolves so an unknown customer is NotFound, not 0.
        self.get_customer(customer_id).await?;
        Ok(self.repo.customer_balance(customer_id).await?)
    }

    /// Balances for all customers with approved transactions.
    pub async fn all_balances(
        &self,
    ) -> Result<std::collections::HashMap<CustomerId, Cents>, LedgerError> {
        Ok(self.repo.all_customer_balances().await?)
    }

    /// Total owed across all customers, counting positive balances only.
    pub async fn outstanding_total(&self) -> Result<Cents, LedgerError> {
        Ok(self.repo.outstanding_total().await?)
    }

    // ========================
    // Audit
    // ========================

    /// Append an event to the system audit stream on behalf of another
    /// domain. Unlike the ledger-side audit hooks, this IS the business
    /// operation, so failures propagate.
    pub async fn record_system_event(
        &self,
        actor_id: ActorId,
        action: AuditAction,
        target: Option<(AuditTargetType, Uuid)>,
        metadata: Option<serde_json::Value>,
    ) -> Result<AuditLogEntry, LedgerError> {
        let mut entry = AuditLogEntry::new(AuditStream::System, actor_id, action);
        if let Some((target_type, target_id)) = target {
            entry = entry.with_target(target_type, target_id);
        }
        if let Some(metadata) = metadata {
            entry = entry.with_metadata(metadata);
        }
        self.repo.append_audit(&mut entry).await?;
        Ok(entry)
    }

    /// Search the merged audit log, newest first, with cursor pagination.
    pub async fn search_audit(
        &self,
        filter: AuditFilter,
        limit: usize,
        cursor: Option<AuditCursor>,
    ) -> Result<AuditPage, LedgerError> {
        let limit = limit.clamp(1, MAX_AUDIT_PAGE);
        Ok(self.repo.search_audit(&filter, limit, cursor).await?)
    }

    /// Upsert an actor's display name and role from the identity provider,
    /// for query-time name resolution.
    pub async fn sync_actor(
        &self,
        id: ActorId,
        name: &str,
        role: Role,
        is_active: bool,
    ) -> Result<(), LedgerError> {
        Ok(self.repo.sync_actor(id, name, role, is_active).await?)
    }

    /// Number of audit entries that could not be written since this
    /// service was constructed. Non-zero means degraded observability and
    /// should be alerted on; the underlying ledger mutations themselves
    /// all committed.
    pub fn audit_write_failures(&self) -> u64 {
        self.audit_failures.load(Ordering::Relaxed)
    }

    /// Append a ledger audit entry for an already-committed mutation. A
    /// failure here must not roll back or fail the parent operation: the
    /// entry is dropped, the failure is logged and counted.
    async fn record_audit(&self, mut entry: AuditLogEntry) {
        if let Err(error) = self.repo.append_audit(&mut entry).await {
            self.audit_failures.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                action = %entry.action,
                target_id = ?entry.target_id,
                %error,
                "failed to append audit entry; ledger mutation already committed"
            );
        }
    }
}
