//! Actor permission gate
//!
//! Bot identities must be on the allow-list AND hold the capability flag
//! matching the order's category before a decision is accepted. Human
//! admins authenticate upstream and pass through; end users never reach
//! the decision path.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::order::{Actor, ActorType, OrderType};

// ============================================================================
// Capability flags (bitmask)
// ============================================================================
pub mod capability_flags {
    pub const PAYMENT_APPROVAL: u8 = 0x01;
    pub const WITHDRAWAL_APPROVAL: u8 = 0x02;
    pub const WALLET_LOAD_APPROVAL: u8 = 0x04;
    pub const ALL: u8 = 0x07;
}

/// Approval capability categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Capability {
    PaymentApproval = capability_flags::PAYMENT_APPROVAL,
    WithdrawalApproval = capability_flags::WITHDRAWAL_APPROVAL,
    WalletLoadApproval = capability_flags::WALLET_LOAD_APPROVAL,
}

impl Capability {
    #[inline]
    pub fn flag(&self) -> u8 {
        *self as u8
    }

    /// Capability required to decide an order of the given type
    pub fn for_order_type(order_type: OrderType) -> Self {
        match order_type {
            OrderType::TopUpWallet => Capability::WalletLoadApproval,
            OrderType::WithdrawWallet | OrderType::WithdrawGame => {
                Capability::WithdrawalApproval
            }
            OrderType::AdminCredit
            | OrderType::AdminDebit
            | OrderType::GameLoad
            | OrderType::LegacyDeposit => Capability::PaymentApproval,
        }
    }
}

/// Actor permission lookup, supplied by the bot/admin identity layer
#[async_trait]
pub trait ActorDirectory: Send + Sync {
    async fn is_authorized(&self, actor_id: &str, capability: Capability) -> bool;
}

/// Static allow-list with per-actor capability flags
///
/// Presence in the map IS the allow-list; the flags say which order
/// categories the actor may decide.
#[derive(Debug, Default)]
pub struct StaticActorGate {
    grants: HashMap<String, u8>,
}

impl StaticActorGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant capability flags to an actor id (adds it to the allow-list)
    pub fn grant(mut self, actor_id: impl Into<String>, flags: u8) -> Self {
        self.grants.insert(actor_id.into(), flags);
        self
    }

    /// Check whether an actor may act at all for an order type.
    ///
    /// Convenience for handler layers that gate before invoking the
    /// orchestrator: bots go through the directory, admins and the
    /// system actor pass, end users never decide.
    pub fn permits(&self, actor: &Actor, order_type: OrderType) -> bool {
        match actor.kind {
            ActorType::Admin | ActorType::System => true,
            ActorType::EndUser => false,
            ActorType::ApprovalBot => {
                let needed = Capability::for_order_type(order_type);
                self.grants
                    .get(&actor.id)
                    .is_some_and(|flags| flags & needed.flag() != 0)
            }
        }
    }
}

#[async_trait]
impl ActorDirectory for StaticActorGate {
    async fn is_authorized(&self, actor_id: &str, capability: Capability) -> bool {
        self.grants
            .get(actor_id)
            .is_some_and(|flags| flags & capability.flag() != 0)
    }
}
