use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::{ActorId, CustomerId};

/// Which append stream an audit entry belongs to. Ledger entries carry
/// before/after snapshots of the mutated record; system entries come from
/// other domains (sessions, inventory, orders) and carry metadata only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStream {
    Ledger,
    System,
}

impl AuditStream {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStream::Ledger => "ledger",
            AuditStream::System => "system",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ledger" => Some(AuditStream::Ledger),
            "system" => Some(AuditStream::System),
            _ => None,
        }
    }
}

impl std::fmt::Display for AuditStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Every operation name that can appear in an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    CustomerCreated,
    CustomerDeactivated,
    TransactionCreated,
    TransactionUpdated,
    TransactionApproved,
    TransactionRejected,
    TransactionDeleted,
    // System stream events, appended by external collaborators.
    Login,
    Logout,
    SettingsChanged,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::CustomerCreated => "customer_created",
            AuditAction::CustomerDeactivated => "customer_deactivated",
            AuditAction::TransactionCreated => "transaction_created",
            AuditAction::TransactionUpdated => "transaction_updated",
            AuditAction::TransactionApproved => "transaction_approved",
            AuditAction::TransactionRejected => "transaction_rejected",
            AuditAction::TransactionDeleted => "transaction_deleted",
            AuditAction::Login => "login",
            AuditAction::Logout => "logout",
            AuditAction::SettingsChanged => "settings_changed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "customer_created" => Some(AuditAction::CustomerCreated),
            "customer_deactivated" => Some(AuditAction::CustomerDeactivated),
            "transaction_created" => Some(AuditAction::TransactionCreated),
            "transaction_updated" => Some(AuditAction::TransactionUpdated),
            "transaction_approved" => Some(AuditAction::TransactionApproved),
            "transaction_rejected" => Some(AuditAction::TransactionRejected),
            "transaction_deleted" => Some(AuditAction::TransactionDeleted),
            "login" => Some(AuditAction::Login),
            "logout" => Some(AuditAction::Logout),
            "settings_changed" => Some(AuditAction::SettingsChanged),
            _ => None,
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of record an audit entry points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditTargetType {
    Customer,
    Transaction,
    Actor,
}

impl AuditTargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditTargetType::Customer => "customer",
            AuditTargetType::Transaction => "transaction",
            AuditTargetType::Actor => "actor",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "customer" => Some(AuditTargetType::Customer),
            "transaction" => Some(AuditTargetType::Transaction),
            "actor" => Some(AuditTargetType::Actor),
            _ => None,
        }
    }
}

impl std::fmt::Display for AuditTargetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An immutable audit record. Entries are append-only; nothing updates or
/// deletes them. The `sequence` number comes from a counter shared by both
/// streams, so ordering by (timestamp, sequence) is total even when
/// concurrent writers land on the same wall-clock instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    /// Monotonic, assigned by the repository on append.
    pub sequence: i64,
    pub stream: AuditStream,
    pub actor_id: ActorId,
    pub action: AuditAction,
    pub target_type: Option<AuditTargetType>,
    pub target_id: Option<Uuid>,
    pub customer_id: Option<CustomerId>,
    /// Snapshot of the record before the mutation (edit/approve/reject/delete).
    pub old_values: Option<Value>,
    /// Snapshot of the record after the mutation (create/edit/approve/reject).
    pub new_values: Option<Value>,
    pub metadata: Option<Value>,
    pub timestamp: DateTime<Utc>,
    /// Resolved against the current actor record at query time; `None`
    /// when the actor is unknown (rendered as "Unknown").
    pub actor_name: Option<String>,
    /// Resolved against the current customer record at query time.
    pub customer_name: Option<String>,
}

impl AuditLogEntry {
    pub fn new(stream: AuditStream, actor_id: ActorId, action: AuditAction) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence: 0, // assigned by the repository
            stream,
            actor_id,
            action,
            target_type: None,
            target_id: None,
            customer_id: None,
            old_values: None,
            new_values: None,
            metadata: None,
            timestamp: Utc::now(),
            actor_name: None,
            customer_name: None,
        }
    }

    pub fn with_target(mut self, target_type: AuditTargetType, target_id: Uuid) -> Self {
        self.target_type = Some(target_type);
        self.target_id = Some(target_id);
        self
    }

    pub fn with_customer(mut self, customer_id: CustomerId) -> Self {
        self.customer_id = Some(customer_id);
        self
    }

    pub fn with_snapshots(mut self, old_values: Option<Value>, new_values: Option<Value>) -> Self {
        self.old_values = old_values;
        self.new_values = new_values;
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Filters for searching the merged audit log. All fields are optional and
/// combine with AND; `free_text` matches against action names, resolved
/// actor/customer names and metadata.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub actor_id: Option<ActorId>,
    pub action: Option<AuditAction>,
    pub target_type: Option<AuditTargetType>,
    pub stream: Option<AuditStream>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    pub free_text: Option<String>,
}

/// Opaque position in the (timestamp, sequence)-descending ordering. Pass
/// the `next_cursor` of one page as the cursor of the next request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditCursor {
    pub timestamp: DateTime<Utc>,
    pub sequence: i64,
}

/// One page of merged audit entries, newest first.
#[derive(Debug, Clone)]
pub struct AuditPage {
    pub entries: Vec<AuditLogEntry>,
    /// `None` when there are no further entries.
    pub next_cursor: Option<AuditCursor>,
}
