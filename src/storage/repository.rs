use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::{
    ActorId, AuditAction, AuditCursor, AuditFilter, AuditLogEntry, AuditPage, AuditStream,
    AuditTargetType, Cents, Customer, CustomerId, Role, Transaction, TransactionId,
    TransactionStatus, TransactionType,
};

use super::{MIGRATION_001_INITIAL, MIGRATION_002_AUDIT};

/// Per-customer activity figures used by the customer overview.
#[derive(Debug, Clone, Copy, Default)]
pub struct CustomerActivity {
    pub transaction_count: i64,
    pub last_transaction_at: Option<DateTime<Utc>>,
}

/// Fields of a pending transaction that may still be edited. `None` leaves
/// the field unchanged.
#[derive(Debug, Clone, Default)]
pub struct TransactionEdit {
    pub transaction_type: Option<TransactionType>,
    pub amount_cents: Option<Cents>,
    pub description: Option<String>,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
}

impl TransactionEdit {
    pub fn is_empty(&self) -> bool {
        self.transaction_type.is_none()
            && self.amount_cents.is_none()
            && self.description.is_none()
            && self.payment_method.is_none()
            && self.notes.is_none()
    }
}

/// Filter for querying transactions.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub customer_id: Option<CustomerId>,
    pub status: Option<TransactionStatus>,
    pub transaction_type: Option<TransactionType>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// Repository for persisting and querying customers, transactions and
/// audit entries. All state transitions under write contention go through
/// conditional updates here, never through read-modify-write in callers.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

const TRANSACTION_COLUMNS: &str = "id, customer_id, transaction_type, amount_cents, description, \
     status, payment_method, notes, rejection_reason, created_by, created_at, \
     approved_by, approved_at, updated_at";

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database at the given URL.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;

        sqlx::query(MIGRATION_002_AUDIT)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 002")?;

        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(database_url: &str) -> Result<Self> {
        let repo = Self::connect(database_url).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    // ========================
    // Actor read model
    // ========================

    /// Upsert an actor's display name and role from the identity provider.
    pub async fn sync_actor(
        &self,
        id: ActorId,
        name: &str,
        role: Role,
        is_active: bool,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO actors (id, name, role, is_active)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET name = excluded.name,
                role = excluded.role, is_active = excluded.is_active
            "#,
        )
        .bind(id.to_string())
        .bind(name)
        .bind(role.as_str())
        .bind(is_active)
        .execute(&self.pool)
        .await
        .context("Failed to sync actor")?;
        Ok(())
    }

    // ========================
    // Customer operations
    // ========================

    /// Insert a new customer. Returns `false` when the active-name
    /// uniqueness constraint rejects the row; duplicate detection is a
    /// store constraint, so concurrent creators resolve deterministically.
    pub async fn insert_customer(&self, customer: &Customer) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO customers (id, name, email, phone, address, is_active, created_by, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(customer.id.to_string())
        .bind(&customer.name)
        .bind(&customer.email)
        .bind(&customer.phone)
        .bind(&customer.address)
        .bind(customer.is_active)
        .bind(customer.created_by.to_string())
        .bind(customer.created_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Ok(false),
            Err(e) => Err(e).context("Failed to insert customer"),
        }
    }

    /// Get a customer by ID.
    pub async fn get_customer(&self, id: CustomerId) -> Result<Option<Customer>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, email, phone, address, is_active, created_by, created_at
            FROM customers
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch customer")?;

        match row {
            Some(row) => Ok(Some(Self::row_to_customer(&row)?)),
            None => Ok(None),
        }
    }

    /// Get an active customer by name.
    pub async fn get_customer_by_name(&self, name: &str) -> Result<Option<Customer>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, email, phone, address, is_active, created_by, created_at
            FROM customers
            WHERE name = ? AND is_active = 1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch customer by name")?;

        match row {
            Some(row) => Ok(Some(Self::row_to_customer(&row)?)),
            None => Ok(None),
        }
    }

    /// List all customers (optionally including deactivated ones).
    pub async fn list_customers(&self, include_inactive: bool) -> Result<Vec<Customer>> {
        let query = if include_inactive {
            "SELECT id, name, email, phone, address, is_active, created_by, created_at FROM customers ORDER BY name"
        } else {
            "SELECT id, name, email, phone, address, is_active, created_by, created_at FROM customers WHERE is_active = 1 ORDER BY name"
        };

        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list customers")?;

        rows.iter().map(Self::row_to_customer).collect()
    }

    /// Deactivate a customer (customers are never deleted). Returns `false`
    /// if the customer was not active.
    pub async fn deactivate_customer(&self, id: CustomerId) -> Result<bool> {
        let result = sqlx::query("UPDATE customers SET is_active = 0 WHERE id = ? AND is_active = 1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to deactivate customer")?;
        Ok(result.rows_affected() > 0)
    }

    fn row_to_customer(row: &sqlx::sqlite::SqliteRow) -> Result<Customer> {
        let id_str: String = row.get("id");
        let created_by_str: String = row.get("created_by");
        let created_at_str: String = row.get("created_at");

        Ok(Customer {
            id: Uuid::parse_str(&id_str).context("Invalid customer ID")?,
            name: row.get("name"),
            email: row.get("email"),
            phone: row.get("phone"),
            address: row.get("address"),
            is_active: row.get::<i32, _>("is_active") != 0,
            created_by: Uuid::parse_str(&created_by_str).context("Invalid created_by ID")?,
            created_at: Self::parse_timestamp(&created_at_str)?,
        })
    }

    // ========================
    // Transaction operations
    // ========================

    /// Save a new transaction. The row arrives in `pending` state; the
    /// schema re-checks the amount and description invariants.
    pub async fn insert_transaction(&self, tx: &Transaction) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO transactions (id, customer_id, transaction_type, amount_cents, description,
                status, payment_method, notes, rejection_reason, created_by, created_at,
                approved_by, approved_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(tx.id.to_string())
        .bind(tx.customer_id.to_string())
        .bind(tx.transaction_type.as_str())
        .bind(tx.amount_cents)
        .bind(&tx.description)
        .bind(tx.status.as_str())
        .bind(&tx.payment_method)
        .bind(&tx.notes)
        .bind(&tx.rejection_reason)
        .bind(tx.created_by.to_string())
        .bind(tx.created_at.to_rfc3339())
        .bind(tx.approved_by.map(|id| id.to_string()))
        .bind(tx.approved_at.map(|dt| dt.to_rfc3339()))
        .bind(tx.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to insert transaction")?;
        Ok(())
    }

    /// Get a transaction by ID.
    pub async fn get_transaction(&self, id: TransactionId) -> Result<Option<Transaction>> {
        let row = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch transaction")?;

        match row {
            Some(row) => Ok(Some(Self::row_to_transaction(&row)?)),
            None => Ok(None),
        }
    }

    /// List transactions with optional filters, newest first.
    pub async fn list_transactions(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>> {
        let mut query =
            format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE 1=1");

        let customer_id_str = filter.customer_id.map(|id| id.to_string());
        let from_date_str = filter.from_date.map(|dt| dt.to_rfc3339());
        let to_date_str = filter.to_date.map(|dt| dt.to_rfc3339());

        if customer_id_str.is_some() {
            query.push_str(" AND customer_id = ?");
        }
        if filter.status.is_some() {
            query.push_str(" AND status = ?");
        }
        if filter.transaction_type.is_some() {
            query.push_str(" AND transaction_type = ?");
        }
        if from_date_str.is_some() {
            query.push_str(" AND created_at >= ?");
        }
        if to_date_str.is_some() {
            query.push_str(" AND created_at <= ?");
        }

        query.push_str(" ORDER BY created_at DESC");

        if let Some(limit) = filter.limit {
            query.push_str(&format!(" LIMIT {}", limit));
        }

        let mut sql_query = sqlx::query(&query);

        if let Some(ref cid) = customer_id_str {
            sql_query = sql_query.bind(cid);
        }
        if let Some(status) = filter.status {
            sql_query = sql_query.bind(status.as_str());
        }
        if let Some(tt) = filter.transaction_type {
            sql_query = sql_query.bind(tt.as_str());
        }
        if let Some(ref from) = from_date_str {
            sql_query = sql_query.bind(from);
        }
        if let Some(ref to) = to_date_str {
            sql_query = sql_query.bind(to);
        }

        let rows = sql_query
            .fetch_all(&self.pool)
            .await
            .context("Failed to list transactions")?;

        rows.iter().map(Self::row_to_transaction).collect()
    }

    /// Apply edits to a transaction, but only while it is still pending.
    /// Returns `false` when the row was not pending (or does not exist);
    /// the caller distinguishes the two.
    pub async fn update_pending_transaction(
        &self,
        id: TransactionId,
        edit: &TransactionEdit,
    ) -> Result<bool> {
        let mut query = String::from("UPDATE transactions SET updated_at = ?");

        if edit.transaction_type.is_some() {
            query.push_str(", transaction_type = ?");
        }
        if edit.amount_cents.is_some() {
            query.push_str(", amount_cents = ?");
        }
        if edit.description.is_some() {
            query.push_str(", description = ?");
        }
        if edit.payment_method.is_some() {
            query.push_str(", payment_method = ?");
        }
        if edit.notes.is_some() {
            query.push_str(", notes = ?");
        }

        query.push_str(" WHERE id = ? AND status = 'pending'");

        let mut sql_query = sqlx::query(&query).bind(Utc::now().to_rfc3339());

        if let Some(tt) = edit.transaction_type {
            sql_query = sql_query.bind(tt.as_str());
        }
        if let Some(amount) = edit.amount_cents {
            sql_query = sql_query.bind(amount);
        }
        if let Some(ref description) = edit.description {
            sql_query = sql_query.bind(description);
        }
        if let Some(ref method) = edit.payment_method {
            sql_query = sql_query.bind(method);
        }
        if let Some(ref notes) = edit.notes {
            sql_query = sql_query.bind(notes);
        }

        let result = sql_query
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to update transaction")?;

        Ok(result.rows_affected() > 0)
    }

    /// Transition a transaction to a terminal state. This is a single
    /// conditional update: it applies only if the row is still pending, so
    /// exactly one of any number of concurrent approvers wins and the rest
    /// observe `false`.
    pub async fn transition_transaction(
        &self,
        id: TransactionId,
        to: TransactionStatus,
        decided_by: ActorId,
        rejection_reason: Option<&str>,
        decided_at: DateTime<Utc>,
    ) -> Result<bool> {
        debug_assert!(to.is_terminal());

        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET status = ?, approved_by = ?, approved_at = ?, rejection_reason = ?, updated_at = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(to.as_str())
        .bind(decided_by.to_string())
        .bind(decided_at.to_rfc3339())
        .bind(rejection_reason)
        .bind(decided_at.to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .context("Failed to transition transaction")?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a transaction, but only while pending. A pending transaction
    /// has never contributed to any balance, so the delete needs no
    /// compensation. Returns `false` when the row was not pending.
    pub async fn delete_pending_transaction(&self, id: TransactionId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM transactions WHERE id = ? AND status = 'pending'")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to delete transaction")?;
        Ok(result.rows_affected() > 0)
    }

    fn row_to_transaction(row: &sqlx::sqlite::SqliteRow) -> Result<Transaction> {
        let id_str: String = row.get("id");
        let customer_id_str: String = row.get("customer_id");
        let type_str: String = row.get("transaction_type");
        let status_str: String = row.get("status");
        let created_by_str: String = row.get("created_by");
        let created_at_str: String = row.get("created_at");
        let approved_by_str: Option<String> = row.get("approved_by");
        let approved_at_str: Option<String> = row.get("approved_at");
        let updated_at_str: String = row.get("updated_at");

        Ok(Transaction {
            id: Uuid::parse_str(&id_str).context("Invalid transaction ID")?,
            customer_id: Uuid::parse_str(&customer_id_str).context("Invalid customer ID")?,
            transaction_type: TransactionType::from_str(&type_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid transaction type: {}", type_str))?,
            amount_cents: row.get("amount_cents"),
            description: row.get("description"),
            status: TransactionStatus::from_str(&status_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid transaction status: {}", status_str))?,
            payment_method: row.get("payment_method"),
            notes: row.get("notes"),
            rejection_reason: row.get("rejection_reason"),
            created_by: Uuid::parse_str(&created_by_str).context("Invalid created_by ID")?,
            created_at: Self::parse_timestamp(&created_at_str)?,
            approved_by: approved_by_str
                .map(|s| Uuid::parse_str(&s))
                .transpose()
                .context("Invalid approved_by ID")?,
            approved_at: approved_at_str
                .map(|s| Self::parse_timestamp(&s))
                .transpose()?,
            updated_at: Self::parse_timestamp(&updated_at_str)?,
        })
    }

    // ========================
    // Balance aggregation
    // ========================

    /// Compute a customer's balance from approved transactions using SQL
    /// aggregation. Balance is derived state: this query is both the read
    /// path and the reconciliation path.
    pub async fn customer_balance(&self, customer_id: CustomerId) -> Result<Cents> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(CASE WHEN transaction_type = 'debit'
                                     THEN amount_cents ELSE -amount_cents END), 0) as balance
            FROM transactions
            WHERE customer_id = ? AND status = 'approved'
            "#,
        )
        .bind(customer_id.to_string())
        .fetch_one(&self.pool)
        .await
        .context("Failed to compute balance")?;

        Ok(row.get("balance"))
    }

    /// Compute balances for all customers in a single query. Customers
    /// with no approved transactions won't be in the map (balance = 0).
    pub async fn all_customer_balances(&self) -> Result<HashMap<CustomerId, Cents>> {
        let rows = sqlx::query(
            r#"
            SELECT customer_id,
                   SUM(CASE WHEN transaction_type = 'debit'
                            THEN amount_cents ELSE -amount_cents END) as balance
            FROM transactions
            WHERE status = 'approved'
            GROUP BY customer_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to compute balances")?;

        let mut balances = HashMap::new();
        for row in rows {
            let customer_id_str: String = row.get("customer_id");
            let balance: Cents = row.get("balance");
            let customer_id =
                Uuid::parse_str(&customer_id_str).context("Invalid customer ID")?;
            balances.insert(customer_id, balance);
        }

        Ok(balances)
    }

    /// Sum of positive customer balances. Customers in credit are not
    /// counted against the outstanding figure.
    pub async fn outstanding_total(&self) -> Result<Cents> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(balance), 0) as total
            FROM (
                SELECT SUM(CASE WHEN transaction_type = 'debit'
                                THEN amount_cents ELSE -amount_cents END) as balance
                FROM transactions
                WHERE status = 'approved'
                GROUP BY customer_id
            )
            WHERE balance > 0
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to compute outstanding total")?;

        Ok(row.get("total"))
    }

    /// Transaction count and last activity per customer, across all
    /// statuses.
    pub async fn customer_activity(&self) -> Result<HashMap<CustomerId, CustomerActivity>> {
        let rows = sqlx::query(
            r#"
            SELECT customer_id, COUNT(*) as transaction_count, MAX(created_at) as last_transaction_at
            FROM transactions
            GROUP BY customer_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to compute customer activity")?;

        let mut activity = HashMap::new();
        for row in rows {
            let customer_id_str: String = row.get("customer_id");
            let last_str: Option<String> = row.get("last_transaction_at");
            let customer_id =
                Uuid::parse_str(&customer_id_str).context("Invalid customer ID")?;
            activity.insert(
                customer_id,
                CustomerActivity {
                    transaction_count: row.get("transaction_count"),
                    last_transaction_at: last_str
                        .map(|s| Self::parse_timestamp(&s))
                        .transpose()?,
                },
            );
        }

        Ok(activity)
    }

    // ========================
    // Audit streams
    // ========================

    /// Get the next audit sequence number and increment the shared counter.
    async fn next_audit_sequence(&self) -> Result<i64> {
        let row = sqlx::query(
            r#"
            UPDATE audit_sequence
            SET value = value + 1
            WHERE name = 'audit'
            RETURNING value
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to get next audit sequence number")?;

        Ok(row.get("value"))
    }

    /// Append an entry to its audit stream. Assigns the next sequence
    /// number. Entries are immutable once written; there is deliberately no
    /// update or delete counterpart to this method.
    pub async fn append_audit(&self, entry: &mut AuditLogEntry) -> Result<()> {
        entry.sequence = self.next_audit_sequence().await?;

        let old_values = entry
            .old_values
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .context("Failed to serialize old values")?;
        let new_values = entry
            .new_values
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .context("Failed to serialize new values")?;
        let metadata = entry
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .context("Failed to serialize metadata")?;

        match entry.stream {
            AuditStream::Ledger => {
                sqlx::query(
                    r#"
                    INSERT INTO ledger_audit_logs (id, sequence, actor_id, action, target_type,
                        target_id, customer_id, old_values, new_values, metadata, timestamp)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(entry.id.to_string())
                .bind(entry.sequence)
                .bind(entry.actor_id.to_string())
                .bind(entry.action.as_str())
                .bind(entry.target_type.map(|t| t.as_str()))
                .bind(entry.target_id.map(|id| id.to_string()))
                .bind(entry.customer_id.map(|id| id.to_string()))
                .bind(old_values)
                .bind(new_values)
                .bind(metadata)
                .bind(entry.timestamp.to_rfc3339())
                .execute(&self.pool)
                .await
                .context("Failed to append ledger audit entry")?;
            }
            AuditStream::System => {
                sqlx::query(
                    r#"
                    INSERT INTO system_audit_logs (id, sequence, actor_id, action, target_type,
                        target_id, metadata, timestamp)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(entry.id.to_string())
                .bind(entry.sequence)
                .bind(entry.actor_id.to_string())
                .bind(entry.action.as_str())
                .bind(entry.target_type.map(|t| t.as_str()))
                .bind(entry.target_id.map(|id| id.to_string()))
                .bind(metadata)
                .bind(entry.timestamp.to_rfc3339())
                .execute(&self.pool)
                .await
                .context("Failed to append system audit entry")?;
            }
        }

        Ok(())
    }

    /// Search the merged audit log. Both streams are combined into one
    /// (timestamp, sequence)-descending result; actor and customer display
    /// names are resolved against the current records at query time, so
    /// renames show up retroactively and missing records yield `None`.
    pub async fn search_audit(
        &self,
        filter: &AuditFilter,
        limit: usize,
        cursor: Option<AuditCursor>,
    ) -> Result<AuditPage> {
        let mut query = String::from(
            r#"
            SELECT e.id, e.sequence, e.stream, e.actor_id, e.action, e.target_type, e.target_id,
                   e.customer_id, e.old_values, e.new_values, e.metadata, e.timestamp,
                   a.name as actor_name, c.name as customer_name
            FROM (
                SELECT id, sequence, 'ledger' as stream, actor_id, action, target_type, target_id,
                       customer_id, old_values, new_values, metadata, timestamp
                FROM ledger_audit_logs
                UNION ALL
                SELECT id, sequence, 'system' as stream, actor_id, action, target_type, target_id,
                       NULL, NULL, NULL, metadata, timestamp
                FROM system_audit_logs
            ) e
            LEFT JOIN actors a ON a.id = e.actor_id
            LEFT JOIN customers c ON c.id = e.customer_id
            WHERE 1=1
            "#,
        );

        let actor_id_str = filter.actor_id.map(|id| id.to_string());
        let from_date_str = filter.from_date.map(|dt| dt.to_rfc3339());
        let to_date_str = filter.to_date.map(|dt| dt.to_rfc3339());
        let free_text_pattern = filter
            .free_text
            .as_ref()
            .map(|text| format!("%{}%", text.trim()));
        let cursor_ts_str = cursor.map(|c| c.timestamp.to_rfc3339());

        if actor_id_str.is_some() {
            query.push_str(" AND e.actor_id = ?");
        }
        if filter.action.is_some() {
            query.push_str(" AND e.action = ?");
        }
        if filter.target_type.is_some() {
            query.push_str(" AND e.target_type = ?");
        }
        if filter.stream.is_some() {
            query.push_str(" AND e.stream = ?");
        }
        if from_date_str.is_some() {
            query.push_str(" AND e.timestamp >= ?");
        }
        if to_date_str.is_some() {
            query.push_str(" AND e.timestamp <= ?");
        }
        if free_text_pattern.is_some() {
            query.push_str(
                " AND (e.action LIKE ? OR IFNULL(a.name, '') LIKE ? \
                 OR IFNULL(c.name, '') LIKE ? OR IFNULL(e.metadata, '') LIKE ?)",
            );
        }
        if cursor.is_some() {
            query.push_str(" AND (e.timestamp < ? OR (e.timestamp = ? AND e.sequence < ?))");
        }

        // One extra row tells us whether another page exists.
        query.push_str(" ORDER BY e.timestamp DESC, e.sequence DESC LIMIT ?");

        let mut sql_query = sqlx::query(&query);

        if let Some(ref actor_id) = actor_id_str {
            sql_query = sql_query.bind(actor_id);
        }
        if let Some(action) = filter.action {
            sql_query = sql_query.bind(action.as_str());
        }
        if let Some(target_type) = filter.target_type {
            sql_query = sql_query.bind(target_type.as_str());
        }
        if let Some(stream) = filter.stream {
            sql_query = sql_query.bind(stream.as_str());
        }
        if let Some(ref from) = from_date_str {
            sql_query = sql_query.bind(from);
        }
        if let Some(ref to) = to_date_str {
            sql_query = sql_query.bind(to);
        }
        if let Some(ref pattern) = free_text_pattern {
            sql_query = sql_query
                .bind(pattern)
                .bind(pattern)
                .bind(pattern)
                .bind(pattern);
        }
        if let Some(cursor) = cursor {
            let ts = cursor_ts_str.as_deref().unwrap_or_default();
            sql_query = sql_query.bind(ts).bind(ts).bind(cursor.sequence);
        }
        sql_query = sql_query.bind((limit + 1) as i64);

        let rows = sql_query
            .fetch_all(&self.pool)
            .await
            .context("Failed to search audit log")?;

        let mut entries = rows
            .iter()
            .map(Self::row_to_audit_entry)
            .collect::<Result<Vec<_>>>()?;

        let next_cursor = if entries.len() > limit {
            entries.truncate(limit);
            entries.last().map(|last| AuditCursor {
                timestamp: last.timestamp,
                sequence: last.sequence,
            })
        } else {
            None
        };

        Ok(AuditPage {
            entries,
            next_cursor,
        })
    }

    fn row_to_audit_entry(row: &sqlx::sqlite::SqliteRow) -> Result<AuditLogEntry> {
        let id_str: String = row.get("id");
        let stream_str: String = row.get("stream");
        let actor_id_str: String = row.get("actor_id");
        let action_str: String = row.get("action");
        let target_type_str: Option<String> = row.get("target_type");
        let target_id_str: Option<String> = row.get("target_id");
        let customer_id_str: Option<String> = row.get("customer_id");
        let old_values_str: Option<String> = row.get("old_values");
        let new_values_str: Option<String> = row.get("new_values");
        let metadata_str: Option<String> = row.get("metadata");
        let timestamp_str: String = row.get("timestamp");

        Ok(AuditLogEntry {
            id: Uuid::parse_str(&id_str).context("Invalid audit entry ID")?,
            sequence: row.get("sequence"),
            stream: AuditStream::from_str(&stream_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid audit stream: {}", stream_str))?,
            actor_id: Uuid::parse_str(&actor_id_str).context("Invalid actor ID")?,
            action: AuditAction::from_str(&action_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid audit action: {}", action_str))?,
            target_type: target_type_str
                .map(|s| {
                    AuditTargetType::from_str(&s)
                        .ok_or_else(|| anyhow::anyhow!("Invalid audit target type: {}", s))
                })
                .transpose()?,
            target_id: target_id_str
                .map(|s| Uuid::parse_str(&s))
                .transpose()
                .context("Invalid target ID")?,
            customer_id: customer_id_str
                .map(|s| Uuid::parse_str(&s))
                .transpose()
                .context("Invalid customer ID")?,
            old_values: old_values_str
                .map(|s| serde_json::from_str(&s))
                .transpose()
                .context("Invalid old values snapshot")?,
            new_values: new_values_str
                .map(|s| serde_json::from_str(&s))
                .transpose()
                .context("Invalid new values snapshot")?,
            metadata: metadata_str
                .map(|s| serde_json::from_str(&s))
                .transpose()
                .context("Invalid metadata")?,
            timestamp: Self::parse_timestamp(&timestamp_str)?,
            actor_name: row.get("actor_name"),
            customer_name: row.get("customer_name"),
        })
    }

    fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
        Ok(DateTime::parse_from_rfc3339(s)
            .context("Invalid timestamp")?
            .with_timezone(&Utc))
    }
}
