//! paydesk - Order lifecycle and approval core
//!
//! Processes money-moving orders (wallet top-ups, withdrawals, admin
//! adjustments) for a gaming platform where every order passes a human
//! or bot approval step before funds move. Every status change is
//! audited, and the balance side effect executes at most once per order
//! no matter how many actors race on the same approval control.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐    ┌──────────┐    ┌───────────┐    ┌──────────┐
//! │ Handlers │───▶│ Approval │───▶│ Lifecycle │───▶│  Engine  │
//! │ (extern) │    │ Service  │    │  Helpers  │    │ (FSM+CAS)│
//! └──────────┘    └────┬─────┘    └───────────┘    └────┬─────┘
//!                      │                                │
//!                 ┌────▼─────┐                     ┌────▼─────┐
//!                 │ Accounts │                     │  Orders  │
//!                 │ + Ledger │                     │ + Audit  │
//!                 └──────────┘                     └──────────┘
//! ```
//!
//! # Modules
//!
//! - [`order`] - status FSM, transition engine, lifecycle helpers, stores
//! - [`account`] - wallet balances and the transactional credit/debit paths
//! - [`ledger`] - immutable balance-change entries (before/after balances)
//! - [`approval`] - orchestrator, replay guards, actor permission gate
//! - [`notify`] - outcome event emission (fire-and-forget)
//! - [`clock`] - injectable time source
//! - [`config`] / [`logging`] / [`db`] - service plumbing

pub mod account;
pub mod approval;
pub mod clock;
pub mod config;
pub mod db;
pub mod ledger;
pub mod logging;
pub mod notify;
pub mod order;

// Convenient re-exports at crate root
pub use account::{Account, AccountStore, MemoryAccountStore, PgAccountStore};
pub use approval::{
    ActorDirectory, ApprovalAction, ApprovalGuards, ApprovalResult, ApprovalService, Capability,
    GuardConfig, StaticActorGate,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AppConfig;
pub use db::Database;
pub use ledger::{EntryKind, LedgerEntry};
pub use notify::{EventKind, LogNotifier, NotificationEvent, Notifier, RecordingNotifier};
pub use order::{
    Actor, ActorType, AuditEntry, ExpirySweeper, Lifecycle, MemoryOrderStore, NewOrder, OrderError,
    OrderId, OrderRecord, OrderStatus, OrderStore, OrderType, PgOrderStore, SweeperConfig,
    TransitionEngine, TransitionOutcome,
};
