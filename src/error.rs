use axum::http::StatusCode;
use thiserror::Error;

/// Every failure a public economy operation can surface.
///
/// Business-rule rejections and not-found lookups are expected outcomes
/// and map to 4xx; only `Database` is a fault.
#[derive(Debug, Error)]
pub enum EconomyError {
    #[error("player not found")]
    PlayerNotFound,

    #[error("listing {0} not found")]
    ListingNotFound(i64),

    #[error("unknown item type '{0}'")]
    UnknownItemType(String),

    #[error("invalid quantity")]
    InvalidQuantity,

    #[error("invalid amount")]
    InvalidAmount,

    #[error("insufficient funds")]
    InsufficientFunds,

    #[error("not enough of that item in inventory")]
    InsufficientItems,

    #[error("listing {0} is not purchasable")]
    NotPurchasable(i64),

    #[error("listing {0} has not been sold yet")]
    NotYetSold(i64),

    #[error("nothing to claim")]
    NothingToClaim,

    #[error("not enough stock remaining")]
    OutOfStock,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl EconomyError {
    /// HTTP status for this error. The numeric code inside the response
    /// envelope mirrors this value.
    pub fn status(&self) -> StatusCode {
        match self {
            EconomyError::PlayerNotFound
            | EconomyError::ListingNotFound(_)
            | EconomyError::UnknownItemType(_) => StatusCode::NOT_FOUND,

            EconomyError::InvalidQuantity
            | EconomyError::InvalidAmount
            | EconomyError::InsufficientFunds
            | EconomyError::InsufficientItems
            | EconomyError::NotPurchasable(_)
            | EconomyError::NotYetSold(_)
            | EconomyError::NothingToClaim
            | EconomyError::OutOfStock => StatusCode::BAD_REQUEST,

            EconomyError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to return to a client. Storage details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            EconomyError::Database(_) => "internal server error".to_string(),
            other => other.to_string(),
        }
    }
}
