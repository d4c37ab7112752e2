//! Approval orchestration
//!
//! The actor-facing decision path and the guards that sit in front of
//! it. Control flow: handler → guards/gate → lifecycle helpers →
//! transition engine → store, with the balance side effect executed
//! between `processing` and the terminal transition.

pub mod gate;
pub mod guards;
pub mod service;

pub use gate::{ActorDirectory, Capability, StaticActorGate, capability_flags};
pub use guards::{ApprovalAction, ApprovalGuards, GuardConfig};
pub use service::{ApprovalResult, ApprovalService};
