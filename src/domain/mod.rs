mod actor;
mod audit;
mod balance;
mod customer;
mod money;
mod transaction;

pub use actor::*;
pub use audit::*;
pub use balance::*;
pub use customer::*;
pub use money::*;
pub use transaction::*;
