//! Order Core Types
//!
//! Type definitions for the order lifecycle FSM.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::error::OrderError;
use super::state::OrderStatus;

/// Open metadata bag attached to every order. Transitions merge keys into
/// it non-destructively; it is never replaced wholesale.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Order ID type - ULID-based unique identifier
///
/// Using ULID provides:
/// - Monotonic, sortable IDs
/// - No coordination needed (no machine_id)
/// - 128-bit with good entropy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OrderId(ulid::Ulid);

impl OrderId {
    /// Generate a new unique OrderId
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }

    /// Get the inner ULID value
    pub fn inner(&self) -> ulid::Ulid {
        self.0
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OrderId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(ulid::Ulid::from_string(s)?))
    }
}

/// Order type (kind of money movement)
///
/// Determines whether the order must pass through the approval step and
/// which way the wallet balance moves when the side effect executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum OrderType {
    /// User loads money into the wallet (credit, needs approval)
    TopUpWallet = 1,
    /// User withdraws wallet funds (debit, needs approval)
    WithdrawWallet = 2,
    /// User withdraws funds swept back from a game (debit, needs approval)
    WithdrawGame = 3,
    /// Admin manual balance credit (needs approval)
    AdminCredit = 4,
    /// Admin manual balance debit (needs approval)
    AdminDebit = 5,
    /// Wallet funds loaded straight into a game (debit, direct execution)
    GameLoad = 6,
    /// Legacy "deposit" intake still produced by old callers (credit)
    LegacyDeposit = 7,
}

impl OrderType {
    /// Numeric ID for storage
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    /// Convert from a stored numeric ID
    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(OrderType::TopUpWallet),
            2 => Some(OrderType::WithdrawWallet),
            3 => Some(OrderType::WithdrawGame),
            4 => Some(OrderType::AdminCredit),
            5 => Some(OrderType::AdminDebit),
            6 => Some(OrderType::GameLoad),
            7 => Some(OrderType::LegacyDeposit),
            _ => None,
        }
    }

    /// Whether this order type must pass the human/bot approval step.
    ///
    /// Direct-execution types start in `processing` and never enter the
    /// approval path.
    #[inline]
    pub fn requires_approval(&self) -> bool {
        !matches!(self, OrderType::GameLoad)
    }

    /// The initial status an order of this type is created in
    #[inline]
    pub fn initial_status(&self) -> OrderStatus {
        if self.requires_approval() {
            OrderStatus::PendingApproval
        } else {
            OrderStatus::Processing
        }
    }

    /// Whether the side effect credits (true) or debits (false) the wallet
    #[inline]
    pub fn is_credit(&self) -> bool {
        matches!(
            self,
            OrderType::TopUpWallet | OrderType::AdminCredit | OrderType::LegacyDeposit
        )
    }

    /// Human-readable name
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::TopUpWallet => "top_up_wallet",
            OrderType::WithdrawWallet => "withdraw_wallet",
            OrderType::WithdrawGame => "withdraw_game",
            OrderType::AdminCredit => "admin_credit",
            OrderType::AdminDebit => "admin_debit",
            OrderType::GameLoad => "game_load",
            OrderType::LegacyDeposit => "legacy_deposit",
        }
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of identity performing a transition, always recorded for audit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    Admin,
    ApprovalBot,
    System,
    EndUser,
}

impl ActorType {
    /// Parse a stored actor-type string
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(ActorType::Admin),
            "approval_bot" => Some(ActorType::ApprovalBot),
            "system" => Some(ActorType::System),
            "end_user" => Some(ActorType::EndUser),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActorType::Admin => "admin",
            ActorType::ApprovalBot => "approval_bot",
            ActorType::System => "system",
            ActorType::EndUser => "end_user",
        }
    }
}

impl fmt::Display for ActorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identity performing a transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub kind: ActorType,
}

impl Actor {
    pub fn new(id: impl Into<String>, kind: ActorType) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self::new(id, ActorType::Admin)
    }

    pub fn bot(id: impl Into<String>) -> Self {
        Self::new(id, ActorType::ApprovalBot)
    }

    pub fn system() -> Self {
        Self::new("system", ActorType::System)
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Strongly typed "last transition" breadcrumb stamped into the metadata
/// bag on every status change. The durable history lives in the audit
/// trail; this is the hot-path snapshot readers get with the order row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastTransition {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub actor_id: String,
    pub actor_type: ActorType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
    pub correlation_id: uuid::Uuid,
}

/// Order creation request
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_type: OrderType,
    pub user_id: i64,
    pub amount: Decimal,
    pub bonus_amount: Decimal,
    /// Caller-supplied key collapsing duplicate creation requests
    pub idempotency_key: Option<String>,
    pub metadata: Metadata,
}

impl NewOrder {
    pub fn new(order_type: OrderType, user_id: i64, amount: Decimal) -> Self {
        Self {
            order_type,
            user_id,
            amount,
            bonus_amount: Decimal::ZERO,
            idempotency_key: None,
            metadata: Metadata::new(),
        }
    }

    pub fn with_bonus(mut self, bonus: Decimal) -> Self {
        self.bonus_amount = bonus;
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Shared validation run by every store implementation before insert
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.amount <= Decimal::ZERO {
            return Err(OrderError::InvalidAmount);
        }
        if self.bonus_amount < Decimal::ZERO {
            return Err(OrderError::InvalidAmount);
        }
        if self.user_id <= 0 {
            return Err(OrderError::AccountNotFound(self.user_id));
        }
        if let Some(key) = &self.idempotency_key
            && key.is_empty()
        {
            return Err(OrderError::InvalidIdempotencyKey);
        }
        Ok(())
    }
}

/// Order record as stored
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRecord {
    pub order_id: OrderId,
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub user_id: i64,
    pub amount: Decimal,
    pub bonus_amount: Decimal,
    pub total_amount: Decimal,
    /// Set once if the amount was adjusted at approval time; the original
    /// value is preserved in metadata
    pub amount_adjusted: bool,
    pub idempotency_key: Option<String>,
    /// Free-form annotation, the only field writable after a terminal state
    pub rejection_reason: Option<String>,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderRecord {
    /// The typed last-transition breadcrumb, if one has been stamped
    pub fn last_transition(&self) -> Option<LastTransition> {
        self.metadata
            .get("last_transition")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

impl fmt::Display for OrderRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Order[{}] {} user={} amount={} status={}",
            self.order_id, self.order_type, self.user_id, self.total_amount, self.status
        )
    }
}

/// Serialize an OrderId as its string form inside JSON payloads
impl Serialize for OrderId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for OrderId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_id_unique_and_parses() {
        let a = OrderId::new();
        let b = OrderId::new();
        assert_ne!(a, b);

        let parsed: OrderId = a.to_string().parse().unwrap();
        assert_eq!(parsed, a);
    }

    #[test]
    fn test_order_type_roundtrip() {
        for id in 1..=7 {
            let t = OrderType::from_id(id).unwrap();
            assert_eq!(t.id(), id);
        }
        assert_eq!(OrderType::from_id(0), None);
        assert_eq!(OrderType::from_id(99), None);
    }

    #[test]
    fn test_initial_status_by_type() {
        assert_eq!(
            OrderType::TopUpWallet.initial_status(),
            super::OrderStatus::PendingApproval
        );
        assert_eq!(
            OrderType::GameLoad.initial_status(),
            super::OrderStatus::Processing
        );
        assert!(!OrderType::GameLoad.requires_approval());
        assert!(OrderType::WithdrawWallet.requires_approval());
    }

    #[test]
    fn test_credit_debit_split() {
        assert!(OrderType::TopUpWallet.is_credit());
        assert!(OrderType::AdminCredit.is_credit());
        assert!(OrderType::LegacyDeposit.is_credit());
        assert!(!OrderType::WithdrawWallet.is_credit());
        assert!(!OrderType::WithdrawGame.is_credit());
        assert!(!OrderType::AdminDebit.is_credit());
        assert!(!OrderType::GameLoad.is_credit());
    }

    #[test]
    fn test_new_order_validation() {
        let ok = NewOrder::new(OrderType::TopUpWallet, 1001, Decimal::from(50));
        assert!(ok.validate().is_ok());

        let zero = NewOrder::new(OrderType::TopUpWallet, 1001, Decimal::ZERO);
        assert!(matches!(zero.validate(), Err(OrderError::InvalidAmount)));

        let neg_bonus =
            NewOrder::new(OrderType::TopUpWallet, 1001, Decimal::ONE).with_bonus(Decimal::from(-1));
        assert!(matches!(neg_bonus.validate(), Err(OrderError::InvalidAmount)));

        let empty_key =
            NewOrder::new(OrderType::TopUpWallet, 1001, Decimal::ONE).with_idempotency_key("");
        assert!(matches!(
            empty_key.validate(),
            Err(OrderError::InvalidIdempotencyKey)
        ));
    }

    #[test]
    fn test_actor_display() {
        assert_eq!(Actor::bot("bot1").to_string(), "approval_bot:bot1");
        assert_eq!(Actor::system().to_string(), "system:system");
    }
}
