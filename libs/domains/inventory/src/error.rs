use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("Product not found: {0}")]
    ProductNotFound(Uuid),

    #[error("Category not found: {0}")]
    CategoryNotFound(Uuid),

    #[error("Product with name '{0}' already exists")]
    DuplicateName(String),

    #[error("Category with name '{0}' already exists")]
    DuplicateCategory(String),

    #[error("Stock cannot be negative, got {0}")]
    InvalidStock(i32),

    #[error("Quantity must be greater than zero, got {0}")]
    InvalidQuantity(i32),

    #[error(
        "Insufficient stock for product {product_id}: available {available}, requested {requested}"
    )]
    InsufficientStock {
        product_id: Uuid,
        available: i32,
        requested: i32,
    },

    #[error("Timed out waiting for the stock lock of product {0}")]
    LockTimeout(Uuid),

    #[error("Product {0} has stock movements and cannot be deleted")]
    ProductInUse(Uuid),

    #[error("Category {0} still has products")]
    CategoryInUse(Uuid),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type InventoryResult<T> = Result<T, InventoryError>;

/// How a caller is expected to react to an [`InventoryError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad input, rejected before any mutation. Fix the input and resend.
    Validation,
    /// Current state forbids the request (out of stock, lock busy, still referenced).
    Conflict,
    /// The id does not exist. Terminal for that id.
    NotFound,
    /// Storage failed. The transaction was rolled back.
    Persistence,
}

impl InventoryError {
    pub fn class(&self) -> ErrorClass {
        match self {
            InventoryError::ProductNotFound(_) | InventoryError::CategoryNotFound(_) => {
                ErrorClass::NotFound
            }
            InventoryError::DuplicateName(_)
            | InventoryError::DuplicateCategory(_)
            | InventoryError::InvalidStock(_)
            | InventoryError::InvalidQuantity(_)
            | InventoryError::Validation(_) => ErrorClass::Validation,
            InventoryError::InsufficientStock { .. }
            | InventoryError::LockTimeout(_)
            | InventoryError::ProductInUse(_)
            | InventoryError::CategoryInUse(_) => ErrorClass::Conflict,
            InventoryError::Database(_) | InventoryError::Internal(_) => ErrorClass::Persistence,
        }
    }

    /// Only a lock timeout is worth resending unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, InventoryError::LockTimeout(_))
    }

    /// HTTP status the API layer answers with
    pub fn status_code(&self) -> u16 {
        match self {
            InventoryError::ProductNotFound(_) | InventoryError::CategoryNotFound(_) => 404,
            InventoryError::DuplicateName(_)
            | InventoryError::DuplicateCategory(_)
            | InventoryError::InvalidStock(_)
            | InventoryError::InvalidQuantity(_)
            | InventoryError::InsufficientStock { .. }
            | InventoryError::Validation(_) => 400,
            InventoryError::LockTimeout(_)
            | InventoryError::ProductInUse(_)
            | InventoryError::CategoryInUse(_) => 409,
            InventoryError::Database(_) | InventoryError::Internal(_) => 500,
        }
    }
}

impl From<sea_orm::DbErr> for InventoryError {
    fn from(err: sea_orm::DbErr) -> Self {
        InventoryError::Database(err.to_string())
    }
}

impl From<validator::ValidationErrors> for InventoryError {
    fn from(err: validator::ValidationErrors) -> Self {
        InventoryError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes_follow_taxonomy() {
        let id = Uuid::now_v7();

        assert_eq!(InventoryError::ProductNotFound(id).class(), ErrorClass::NotFound);
        assert_eq!(InventoryError::InvalidQuantity(-5).class(), ErrorClass::Validation);
        assert_eq!(
            InventoryError::DuplicateName("Cement".into()).class(),
            ErrorClass::Validation
        );
        assert_eq!(
            InventoryError::InsufficientStock {
                product_id: id,
                available: 0,
                requested: 1
            }
            .class(),
            ErrorClass::Conflict
        );
        assert_eq!(InventoryError::LockTimeout(id).class(), ErrorClass::Conflict);
        assert_eq!(
            InventoryError::Database("connection reset".into()).class(),
            ErrorClass::Persistence
        );
    }

    #[test]
    fn test_only_lock_timeout_is_retryable() {
        let id = Uuid::now_v7();

        assert!(InventoryError::LockTimeout(id).is_retryable());
        assert!(!InventoryError::ProductNotFound(id).is_retryable());
        assert!(
            !InventoryError::InsufficientStock {
                product_id: id,
                available: 3,
                requested: 4
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_status_codes() {
        let id = Uuid::now_v7();

        assert_eq!(InventoryError::ProductNotFound(id).status_code(), 404);
        assert_eq!(InventoryError::InvalidQuantity(0).status_code(), 400);
        assert_eq!(
            InventoryError::InsufficientStock {
                product_id: id,
                available: 0,
                requested: 1
            }
            .status_code(),
            400
        );
        assert_eq!(InventoryError::LockTimeout(id).status_code(), 409);
        assert_eq!(InventoryError::Internal("boom".into()).status_code(), 500);
    }
}
