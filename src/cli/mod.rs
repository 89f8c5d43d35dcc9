use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::application::LedgerService;
use crate::domain::{
    Actor, AuditAction, AuditCursor, AuditFilter, AuditStream, AuditTargetType, Role, format_cents,
    parse_amount,
};
use crate::storage::{TransactionEdit, TransactionFilter};

/// Debitbook - Customer Debit Ledger
#[derive(Parser)]
#[command(name = "debitbook")]
#[command(about = "A customer debit ledger with an approval workflow and audit trail")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, default_value = "debitbook.db")]
    pub database: String,

    /// Acting user id (normally supplied by the session provider)
    #[arg(long, global = true)]
    pub actor: Option<Uuid>,

    /// Acting user role: admin, manager or staff
    #[arg(long, global = true, default_value = "staff")]
    pub role: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Customer management commands
    #[command(subcommand)]
    Customer(CustomerCommands),

    /// Transaction management commands
    #[command(subcommand)]
    Tx(TxCommands),

    /// Show the balance for one customer or all customers
    Balance {
        /// Customer name (omit for all customers)
        customer: Option<String>,
    },

    /// Show the total outstanding amount across all customers
    Outstanding,

    /// Register or update an actor's display name for audit queries
    SyncActor {
        /// Actor id
        id: Uuid,

        /// Display name
        name: String,

        /// Role: admin, manager or staff
        #[arg(long, default_value = "staff")]
        actor_role: String,

        /// Mark the actor as inactive
        #[arg(long)]
        inactive: bool,
    },

    /// Search the merged audit log
    Audit {
        /// Filter by acting user id
        #[arg(long)]
        by: Option<Uuid>,

        /// Filter by action name (e.g. "transaction_approved")
        #[arg(long)]
        action: Option<String>,

        /// Filter by target type: customer, transaction or actor
        #[arg(long)]
        target_type: Option<String>,

        /// Filter by stream: ledger or system
        #[arg(long)]
        stream: Option<String>,

        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,

        /// End date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,

        /// Free-text search over actions, names and metadata
        #[arg(long)]
        text: Option<String>,

        /// Page size
        #[arg(long, default_value_t = 50)]
        limit: usize,

        /// Resume cursor from a previous page ("<sequence>@<timestamp>")
        #[arg(long)]
        cursor: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum CustomerCommands {
    /// Add a new customer
    Add {
        /// Customer name (unique among active customers)
        name: String,

        #[arg(long)]
        email: Option<String>,

        #[arg(long)]
        phone: Option<String>,

        #[arg(long)]
        address: Option<String>,
    },

    /// List customers with balances and activity
    List {
        /// Include deactivated customers
        #[arg(long)]
        all: bool,
    },

    /// Deactivate a customer (their history and balance survive)
    Deactivate {
        /// Customer name
        name: String,
    },
}

#[derive(Subcommand)]
pub enum TxCommands {
    /// Record a new transaction (created in pending state)
    Add {
        /// Customer name
        customer: String,

        /// Transaction type: debit or payment
        #[arg(value_parser = parse_type)]
        transaction_type: crate::domain::TransactionType,

        /// Amount (e.g. "25.00")
        amount: String,

        /// What the money was for
        description: String,

        /// Payment method (e.g. "cash", "card")
        #[arg(long)]
        payment_method: Option<String>,

        #[arg(long)]
        notes: Option<String>,
    },

    /// List transactions
    List {
        /// Filter by customer name
        #[arg(long)]
        customer: Option<String>,

        /// Filter by status: pending, approved or rejected
        #[arg(long)]
        status: Option<String>,

        /// Maximum number of rows
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show a single transaction
    Show {
        /// Transaction id
        id: Uuid,
    },

    /// Edit a pending transaction
    Edit {
        /// Transaction id
        id: Uuid,

        /// New type: debit or payment
        #[arg(long = "type", value_parser = parse_type)]
        transaction_type: Option<crate::domain::TransactionType>,

        /// New amount
        #[arg(long)]
        amount: Option<String>,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        payment_method: Option<String>,

        #[arg(long)]
        notes: Option<String>,
    },

    /// Approve a pending transaction (manager/admin only)
    Approve {
        /// Transaction id
        id: Uuid,
    },

    /// Reject a pending transaction (manager/admin only)
    Reject {
        /// Transaction id
        id: Uuid,

        /// Why the transaction is rejected
        reason: String,
    },

    /// Delete a pending transaction (admin only)
    Delete {
        /// Transaction id
        id: Uuid,
    },
}

fn parse_type(s: &str) -> Result<crate::domain::TransactionType, String> {
    crate::domain::TransactionType::from_str(s)
        .ok_or_else(|| format!("expected 'debit' or 'payment', got '{}'", s))
}

fn parse_date(s: &str) -> Result<DateTime<Utc>> {
    Ok(NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("Invalid date: {} (expected YYYY-MM-DD)", s))?
        .and_hms_opt(0, 0, 0)
        .context("Invalid date")?
        .and_utc())
}

fn parse_cursor(s: &str) -> Result<AuditCursor> {
    let (sequence, timestamp) = s
        .split_once('@')
        .context("Invalid cursor (expected '<sequence>@<timestamp>')")?;
    Ok(AuditCursor {
        sequence: sequence.parse().context("Invalid cursor sequence")?,
        timestamp: DateTime::parse_from_rfc3339(timestamp)
            .context("Invalid cursor timestamp")?
            .with_timezone(&Utc),
    })
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let role = Role::from_str(&self.role)
            .with_context(|| format!("Invalid role: {} (expected admin, manager or staff)", self.role))?;
        // A missing --actor gets a throwaway id; fine for read-only
        // commands, but mutations should identify the operator.
        let actor = Actor::new(self.actor.unwrap_or_else(Uuid::new_v4), role);

        if let Commands::Init = self.command {
            LedgerService::init(&self.database).await?;
            println!("Initialized ledger database at {}", self.database);
            return Ok(());
        }

        let service = LedgerService::connect(&self.database).await?;

        match self.command {
            Commands::Init => unreachable!(),

            Commands::Customer(command) => Self::run_customer(&service, &actor, command).await?,

            Commands::Tx(command) => Self::run_tx(&service, &actor, command).await?,

            Commands::Balance { customer } => match customer {
                Some(name) => {
                    let customer = service.get_customer_by_name(&name).await?;
                    let balance = service.customer_balance(customer.id).await?;
                    println!("{}: {}", customer.name, format_cents(balance));
                }
                None => {
                    for overview in service.customer_overview(false).await? {
                        println!(
                            "{:<30} {:>12}",
                            overview.customer.name,
                            format_cents(overview.balance)
                        );
                    }
                }
            },

            Commands::Outstanding => {
                let total = service.outstanding_total().await?;
                println!("Total outstanding: {}", format_cents(total));
            }

            Commands::SyncActor {
                id,
                name,
                actor_role,
                inactive,
            } => {
                let actor_role = Role::from_str(&actor_role)
                    .with_context(|| format!("Invalid role: {}", actor_role))?;
                service.sync_actor(id, &name, actor_role, !inactive).await?;
                println!("Synced actor {} ({})", name, id);
            }

            Commands::Audit {
                by,
                action,
                target_type,
                stream,
                from,
                to,
                text,
                limit,
                cursor,
            } => {
                let filter = AuditFilter {
                    actor_id: by,
                    action: action
                        .as_deref()
                        .map(|s| {
                            AuditAction::from_str(s)
                                .with_context(|| format!("Unknown audit action: {}", s))
                        })
                        .transpose()?,
                    target_type: target_type
                        .as_deref()
                        .map(|s| {
                            AuditTargetType::from_str(s)
                                .with_context(|| format!("Unknown target type: {}", s))
                        })
                        .transpose()?,
                    stream: stream
                        .as_deref()
                        .map(|s| {
                            AuditStream::from_str(s)
                                .with_context(|| format!("Unknown audit stream: {}", s))
                        })
                        .transpose()?,
                    from_date: from.as_deref().map(parse_date).transpose()?,
                    to_date: to.as_deref().map(parse_date).transpose()?,
                    free_text: text,
                };
                let cursor = cursor.as_deref().map(parse_cursor).transpose()?;

                let page = service.search_audit(filter, limit, cursor).await?;
                for entry in &page.entries {
                    println!(
                        "{} [{}] {:<24} by {} {}",
                        entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                        entry.stream,
                        entry.action.as_str(),
                        entry.actor_name.as_deref().unwrap_or("Unknown"),
                        entry
                            .customer_name
                            .as_deref()
                            .map(|n| format!("(customer: {})", n))
                            .unwrap_or_default(),
                    );
                }
                if let Some(next) = page.next_cursor {
                    println!(
                        "-- more: --cursor {}@{}",
                        next.sequence,
                        next.timestamp.to_rfc3339()
                    );
                }
            }
        }

        Ok(())
    }

    async fn run_customer(
        service: &LedgerService,
        actor: &Actor,
        command: CustomerCommands,
    ) -> Result<()> {
        match command {
            CustomerCommands::Add {
                name,
                email,
                phone,
                address,
            } => {
                let customer = service
                    .create_customer(name, email, phone, address, actor)
                    .await?;
                println!("Created customer '{}' ({})", customer.name, customer.id);
            }

            CustomerCommands::List { all } => {
                for overview in service.customer_overview(all).await? {
                    let marker = if overview.customer.is_active { "" } else { " [inactive]" };
                    println!(
                        "{:<30} {:>12}  {} transactions{}",
                        overview.customer.name,
                        format_cents(overview.balance),
                        overview.transaction_count,
                        marker,
                    );
                }
            }

            CustomerCommands::Deactivate { name } => {
                let customer = service.get_customer_by_name(&name).await?;
                service.deactivate_customer(customer.id, actor).await?;
                println!("Deactivated customer '{}'", name);
            }
        }
        Ok(())
    }

    async fn run_tx(service: &LedgerService, actor: &Actor, command: TxCommands) -> Result<()> {
        match command {
            TxCommands::Add {
                customer,
                transaction_type,
                amount,
                description,
                payment_method,
                notes,
            } => {
                let customer = service.get_customer_by_name(&customer).await?;
                let amount_cents =
                    parse_amount(&amount).with_context(|| format!("Invalid amount: {}", amount))?;
                let tx = service
                    .create_transaction(
                        customer.id,
                        transaction_type,
                        amount_cents,
                        description,
                        payment_method,
                        notes,
                        actor,
                    )
                    .await?;
                println!(
                    "Recorded pending {} of {} for '{}' ({})",
                    tx.transaction_type,
                    format_cents(tx.amount_cents),
                    customer.name,
                    tx.id
                );
            }

            TxCommands::List {
                customer,
                status,
                limit,
            } => {
                let customer_id = match customer {
                    Some(name) => Some(service.get_customer_by_name(&name).await?.id),
                    None => None,
                };
                let status = status
                    .as_deref()
                    .map(|s| {
                        crate::domain::TransactionStatus::from_str(s)
                            .with_context(|| format!("Unknown status: {}", s))
                    })
                    .transpose()?;
                let filter = TransactionFilter {
                    customer_id,
                    status,
                    limit,
                    ..TransactionFilter::default()
                };

                for tx in service.list_transactions(filter).await? {
                    println!(
                        "{} {:<8} {:>12} {:<9} {}",
                        tx.id,
                        tx.transaction_type,
                        format_cents(tx.amount_cents),
                        tx.status,
                        tx.description
                    );
                }
            }

            TxCommands::Show { id } => {
                let tx = service.get_transaction(id).await?;
                let customer = service.get_customer(tx.customer_id).await?;
                println!("Transaction {}", tx.id);
                println!("  Customer:    {}", customer.name);
                println!("  Type:        {}", tx.transaction_type);
                println!("  Amount:      {}", format_cents(tx.amount_cents));
                println!("  Description: {}", tx.description);
                println!("  Status:      {}", tx.status);
                if let Some(method) = &tx.payment_method {
                    println!("  Payment:     {}", method);
                }
                if let Some(notes) = &tx.notes {
                    println!("  Notes:       {}", notes);
                }
                if let Some(reason) = &tx.rejection_reason {
                    println!("  Rejected:    {}", reason);
                }
                if let (Some(by), Some(at)) = (tx.approved_by, tx.approved_at) {
                    println!("  Decided by:  {} at {}", by, at.format("%Y-%m-%d %H:%M:%S"));
                }
            }

            TxCommands::Edit {
                id,
                transaction_type,
                amount,
                description,
                payment_method,
                notes,
            } => {
                let amount_cents = amount
                    .as_deref()
                    .map(|s| parse_amount(s).with_context(|| format!("Invalid amount: {}", s)))
                    .transpose()?;
                let edit = TransactionEdit {
                    transaction_type,
                    amount_cents,
                    description,
                    payment_method,
                    notes,
                };
                let tx = service.edit_transaction(id, edit, actor).await?;
                println!("Updated transaction {} ({})", tx.id, tx.status);
            }

            TxCommands::Approve { id } => {
                let tx = service.approve_transaction(id, actor).await?;
                let balance = service.customer_balance(tx.customer_id).await?;
                println!(
                    "Approved {} of {}; customer balance is now {}",
                    tx.transaction_type,
                    format_cents(tx.amount_cents),
                    format_cents(balance)
                );
            }

            TxCommands::Reject { id, reason } => {
                let tx = service.reject_transaction(id, actor, &reason).await?;
                println!("Rejected transaction {} ({})", tx.id, reason);
            }

            TxCommands::Delete { id } => {
                service.delete_transaction(id, actor).await?;
                println!("Deleted pending transaction {}", id);
            }
        }
        Ok(())
    }
}
