//! ACO order progress.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Remaining quantity for one (order reference, product code) line.
///
/// Remaining quantity never goes negative: excess requests are rejected
/// before printing starts rather than clamped afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderProgress {
    pub order_ref: String,
    pub product_code: String,
    pub required_qty: i64,
    pub remaining_qty: i64,
}

impl OrderProgress {
    pub fn new(
        order_ref: impl Into<String>,
        product_code: impl Into<String>,
        required_qty: i64,
    ) -> Self {
        Self {
            order_ref: order_ref.into(),
            product_code: product_code.into(),
            required_qty,
            remaining_qty: required_qty,
        }
    }

    /// Quantity already consumed by printed pallets.
    pub fn finished_qty(&self) -> i64 {
        self.required_qty - self.remaining_qty
    }

    /// True once nothing is left to print.
    pub fn is_completed(&self) -> bool {
        self.remaining_qty == 0
    }

    /// Checks that `requested` can be consumed without going negative.
    pub fn ensure_can_consume(&self, requested: i64) -> Result<(), ValidationError> {
        if requested > self.remaining_qty {
            return Err(ValidationError::AcoQuantityExcess {
                order_ref: self.order_ref.clone(),
                requested,
                remaining: self.remaining_qty,
            });
        }
        Ok(())
    }

    /// Subtracts `quantity` from the remaining amount.
    pub fn consume(&mut self, quantity: i64) -> Result<(), ValidationError> {
        self.ensure_can_consume(quantity)?;
        self.remaining_qty -= quantity;
        Ok(())
    }
}
