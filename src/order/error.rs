//! Order Error Types
//!
//! Single error taxonomy for the order lifecycle core. State-machine
//! errors are returned as values so callers can render a specific
//! message; side-effect errors are caught at the orchestrator boundary
//! and converted into a `failed` transition.

use thiserror::Error;

use super::state::OrderStatus;

/// Order lifecycle error taxonomy
#[derive(Error, Debug, Clone)]
pub enum OrderError {
    // === State machine errors ===
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Invalid transition {from} -> {to}; legal next states: [{allowed}]")]
    InvalidTransition {
        from: OrderStatus,
        to: OrderStatus,
        allowed: String,
    },

    #[error("Order already in terminal state {0}")]
    AlreadyProcessed(OrderStatus),

    #[error("Concurrent modification: expected status {expected}, found {actual}")]
    ConcurrentModification {
        expected: OrderStatus,
        actual: OrderStatus,
    },

    #[error("Order type {0} does not take approval decisions")]
    NotApprovable(String),

    // === Side-effect / account errors ===
    #[error("Insufficient balance")]
    InsufficientBalance,

    #[error("Account not found for user {0}")]
    AccountNotFound(i64),

    #[error("Side-effect execution failed: {0}")]
    ProcessingError(String),

    // === Guard errors ===
    #[error("Approval prompt expired")]
    ApprovalExpired,

    #[error("Actor not authorized for this action")]
    Unauthorized,

    // === Validation errors ===
    #[error("Amount must be greater than zero")]
    InvalidAmount,

    #[error("Idempotency key must not be empty")]
    InvalidIdempotencyKey,

    #[error("Manual retry requires a reason")]
    RetryReasonRequired,

    // === System errors ===
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Stored order is corrupt: {0}")]
    CorruptRecord(String),
}

impl OrderError {
    /// Stable error code for API responses and logs
    pub fn code(&self) -> &'static str {
        match self {
            OrderError::OrderNotFound(_) => "ORDER_NOT_FOUND",
            OrderError::InvalidTransition { .. } => "INVALID_TRANSITION",
            OrderError::AlreadyProcessed(_) => "ALREADY_PROCESSED",
            OrderError::ConcurrentModification { .. } => "CONCURRENT_MODIFICATION",
            OrderError::NotApprovable(_) => "NOT_APPROVABLE",
            OrderError::InsufficientBalance => "INSUFFICIENT_BALANCE",
            OrderError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            OrderError::ProcessingError(_) => "PROCESSING_ERROR",
            OrderError::ApprovalExpired => "APPROVAL_EXPIRED",
            OrderError::Unauthorized => "UNAUTHORIZED",
            OrderError::InvalidAmount => "INVALID_AMOUNT",
            OrderError::InvalidIdempotencyKey => "INVALID_IDEMPOTENCY_KEY",
            OrderError::RetryReasonRequired => "RETRY_REASON_REQUIRED",
            OrderError::Storage(_) => "STORAGE_ERROR",
            OrderError::CorruptRecord(_) => "CORRUPT_RECORD",
        }
    }

    /// HTTP status code suggestion for handler layers
    pub fn http_status(&self) -> u16 {
        match self {
            OrderError::OrderNotFound(_) => 404,
            OrderError::Unauthorized => 403,
            OrderError::InvalidAmount
            | OrderError::InvalidIdempotencyKey
            | OrderError::RetryReasonRequired => 400,
            OrderError::InvalidTransition { .. }
            | OrderError::AlreadyProcessed(_)
            | OrderError::NotApprovable(_)
            | OrderError::InsufficientBalance
            | OrderError::AccountNotFound(_)
            | OrderError::ApprovalExpired => 422,
            OrderError::ConcurrentModification { .. } => 409,
            OrderError::ProcessingError(_)
            | OrderError::Storage(_)
            | OrderError::CorruptRecord(_) => 500,
        }
    }
}

impl From<sqlx::Error> for OrderError {
    fn from(e: sqlx::Error) -> Self {
        OrderError::Storage(e.to_string())
    }
}
