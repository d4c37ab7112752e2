//! Wallet accounts and the transactional balance mutation paths

pub mod memory;
pub mod models;
pub mod pg;
pub mod store;

pub use memory::MemoryAccountStore;
pub use models::Account;
pub use pg::PgAccountStore;
pub use store::AccountStore;
