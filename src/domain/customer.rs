use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ActorId;

pub type CustomerId = Uuid;

/// A customer who can owe money to the shop. Customers are never deleted,
/// only deactivated; an inactive customer cannot receive new transactions
/// but keeps their history and balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub is_active: bool,
    pub created_by: ActorId,
    pub created_at: DateTime<Utc>,
}

impl Customer {
    pub fn new(name: String, created_by: ActorId) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            email: None,
            phone: None,
            address: None,
            is_active: true,
            created_by,
            created_at: Utc::now(),
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }
}
