//! Validation errors raised before any resource is allocated.

use thiserror::Error;

/// Reasons a print batch is rejected before the workflow starts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Product code is required")]
    MissingProduct,

    #[error("Clock number is required")]
    MissingClockNumber,

    #[error("Clock number '{0}' must be numeric")]
    InvalidClockNumber(String),

    #[error("Quantity must be a positive integer")]
    InvalidQuantity,

    #[error("Pallet count must be a positive integer")]
    InvalidCount,

    #[error("Pallet count {count} exceeds the maximum of {max} per batch")]
    CountTooLarge { count: usize, max: usize },

    #[error("ACO order reference is required for ACO products")]
    MissingAcoOrderRef,

    #[error("ACO order reference '{0}' must be numeric and at least {min} digits", min = crate::batch::MIN_ACO_ORDER_REF_LENGTH)]
    InvalidAcoOrderRef(String),

    #[error("ACO order {order_ref} has no line for product {product_code}")]
    AcoOrderNotFound {
        order_ref: String,
        product_code: String,
    },

    #[error(
        "ACO order {order_ref} has {remaining} remaining but {requested} was requested"
    )]
    AcoQuantityExcess {
        order_ref: String,
        requested: i64,
        remaining: i64,
    },

    #[error("Batch number is required for Slate products")]
    MissingSlateBatchNumber,

    #[error("Product type {product_type} does not match the supplied details")]
    ProductTypeMismatch { product_type: String },

    #[error("GRN number is required")]
    MissingGrnNumber,

    #[error("Supplier code is required")]
    MissingSupplier,

    #[error("At least one gross weight is required")]
    MissingGrossWeights,

    #[error("Pallet {index} gross weight {value} is not a positive number")]
    InvalidGrossWeight { index: usize, value: f64 },

    #[error("Pallet {index} net weight {net}kg is not positive")]
    NonPositiveNetWeight { index: usize, net: f64 },
}
