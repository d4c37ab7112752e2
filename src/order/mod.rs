//! Order Lifecycle FSM
//!
//! Status transitions for money-moving orders, with an append-only audit
//! trail and at-most-once side-effect semantics enforced one layer up by
//! the approval orchestrator.
//!
//! # State Machine
//!
//! ```text
//! PENDING_APPROVAL → APPROVED → PROCESSING → COMPLETED
//!        ↓                           ↓
//!   REJECTED / CANCELLED           FAILED
//! ```
//!
//! Terminal states: COMPLETED, FAILED, REJECTED, CANCELLED.
//! Direct-execution order types start in PROCESSING.
//!
//! # Safety Invariants
//!
//! 1. **Single choke point**: only `TransitionEngine::transition` writes
//!    `status`; the store's CAS plus audit insert commit atomically.
//! 2. **No approval bypass**: there is no `PENDING_APPROVAL → PROCESSING`
//!    edge; a side effect never runs without a recorded approval.
//! 3. **No-op is success**: requesting the current status succeeds with
//!    `is_noop = true`, which is what makes every retry path safe.
//! 4. **Normalize at the boundary**: legacy status spellings resolve to
//!    canonical values in the stores; the engine never sees raw strings.

pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod memory;
pub mod pg;
pub mod state;
pub mod store;
pub mod sweeper;
pub mod types;

// Re-exports for convenience
pub use engine::{TransitionCtx, TransitionEngine, TransitionOutcome};
pub use error::OrderError;
pub use lifecycle::Lifecycle;
pub use memory::MemoryOrderStore;
pub use pg::PgOrderStore;
pub use state::OrderStatus;
pub use store::{AuditEntry, OrderStore, StatusChange};
pub use sweeper::{ExpirySweeper, SweeperConfig};
pub use types::{
    Actor, ActorType, LastTransition, Metadata, NewOrder, OrderId, OrderRecord, OrderType,
};
