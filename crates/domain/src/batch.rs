//! The print batch: the unit of work submitted by a print action.

use common::BatchId;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::grn::{self, LabelMode, PackageType, PalletType};
use crate::product::{ProductInfo, ProductType};

/// Minimum length of a numeric ACO order reference.
pub const MIN_ACO_ORDER_REF_LENGTH: usize = 5;

/// Storage bucket for QC label PDFs.
pub const QC_BUCKET: &str = "qc-labels";

/// Storage bucket for GRN label PDFs.
pub const GRN_BUCKET: &str = "grn-labels";

/// Product-type-specific metadata for a QC batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProductTypeContext {
    #[default]
    None,
    /// An ACO order. `new_order` is set when the reference is being created
    /// by this print rather than consuming an existing order.
    Aco { order_ref: String, new_order: bool },
    Slate { batch_number: String },
}

/// QC label details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QcDetails {
    /// Units per pallet.
    pub quantity: u32,
    /// Number of pallets (labels) to print.
    pub count: u32,
    /// Optional operator clock number shown on the label.
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub context: ProductTypeContext,
}

/// GRN (goods received) label details. One pallet per gross weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrnDetails {
    pub grn_number: String,
    pub supplier_code: String,
    pub gross_weights: Vec<f64>,
    #[serde(default)]
    pub pallet_type: PalletType,
    #[serde(default)]
    pub package_type: PackageType,
    /// Physical pallet count recorded on the GRN row.
    #[serde(default)]
    pub pallet_count: u32,
    /// Physical package count recorded on the GRN row.
    #[serde(default)]
    pub package_count: u32,
    #[serde(default)]
    pub label_mode: LabelMode,
}

/// Which label flow a batch belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LabelKind {
    Qc(QcDetails),
    Grn(GrnDetails),
}

/// A request to print `n` pallet labels for one product.
///
/// Lives only for the duration of the workflow; it is never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrintBatch {
    #[serde(default)]
    pub batch_id: BatchId,
    pub product: ProductInfo,
    /// Clock number of the person submitting the print, used to attribute
    /// history rows.
    pub clock_number: String,
    pub kind: LabelKind,
}

impl PrintBatch {
    /// Creates a QC batch.
    pub fn qc(product: ProductInfo, clock_number: impl Into<String>, details: QcDetails) -> Self {
        Self {
            batch_id: BatchId::new(),
            product,
            clock_number: clock_number.into(),
            kind: LabelKind::Qc(details),
        }
    }

    /// Creates a GRN batch.
    pub fn grn(product: ProductInfo, clock_number: impl Into<String>, details: GrnDetails) -> Self {
        Self {
            batch_id: BatchId::new(),
            product,
            clock_number: clock_number.into(),
            kind: LabelKind::Grn(details),
        }
    }

    /// Number of pallets (and therefore identifiers) in this batch.
    pub fn pallet_count(&self) -> usize {
        match &self.kind {
            LabelKind::Qc(qc) => qc.count as usize,
            LabelKind::Grn(grn) => grn.gross_weights.len(),
        }
    }

    /// Short name of the label flow, used in logs and metrics.
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            LabelKind::Qc(_) => "qc",
            LabelKind::Grn(_) => "grn",
        }
    }

    /// Storage bucket for this batch's PDFs.
    pub fn bucket(&self) -> &'static str {
        match &self.kind {
            LabelKind::Qc(_) => QC_BUCKET,
            LabelKind::Grn(_) => GRN_BUCKET,
        }
    }

    /// Product-type context. GRN batches never carry one.
    pub fn context(&self) -> &ProductTypeContext {
        static NONE: ProductTypeContext = ProductTypeContext::None;
        match &self.kind {
            LabelKind::Qc(qc) => &qc.context,
            LabelKind::Grn(_) => &NONE,
        }
    }

    /// ACO order reference, if any, trimmed.
    pub fn aco_order_ref(&self) -> Option<&str> {
        match self.context() {
            ProductTypeContext::Aco { order_ref, .. } if !order_ref.trim().is_empty() => {
                Some(order_ref.trim())
            }
            _ => None,
        }
    }

    /// ACO order reference only when an existing order is being consumed.
    pub fn existing_aco_order_ref(&self) -> Option<&str> {
        match self.context() {
            ProductTypeContext::Aco {
                new_order: false, ..
            } if self.product.product_type == ProductType::Aco => self.aco_order_ref(),
            _ => None,
        }
    }

    /// Slate batch number, if any, trimmed.
    pub fn slate_batch_number(&self) -> Option<&str> {
        match self.context() {
            ProductTypeContext::Slate { batch_number } if !batch_number.trim().is_empty() => {
                Some(batch_number.trim())
            }
            _ => None,
        }
    }

    /// Operator shown on the label and in history remarks, or `-`.
    pub fn operator_or_dash(&self) -> &str {
        match &self.kind {
            LabelKind::Qc(QcDetails {
                operator: Some(op), ..
            }) if !op.trim().is_empty() => op.trim(),
            _ => "-",
        }
    }

    /// Per-pallet quantities in label order.
    ///
    /// QC pallets all carry the unit quantity; GRN pallets carry their net
    /// weight rounded to the nearest kilogram.
    pub fn pallet_quantities(&self) -> Result<Vec<i64>, ValidationError> {
        match &self.kind {
            LabelKind::Qc(qc) => Ok(vec![i64::from(qc.quantity); qc.count as usize]),
            LabelKind::Grn(grn) => Ok(self
                .net_weights()?
                .into_iter()
                .map(|net| net.round() as i64)
                .collect()),
        }
    }

    /// GRN net weights; empty for QC batches.
    pub fn net_weights(&self) -> Result<Vec<f64>, ValidationError> {
        match &self.kind {
            LabelKind::Qc(_) => Ok(Vec::new()),
            LabelKind::Grn(grn) => {
                grn::net_weights(&grn.gross_weights, grn.pallet_type, grn.package_type)
            }
        }
    }

    /// Unit quantity for QC batches (used for ACO consumption).
    pub fn unit_quantity(&self) -> Option<i64> {
        match &self.kind {
            LabelKind::Qc(qc) => Some(i64::from(qc.quantity)),
            LabelKind::Grn(_) => None,
        }
    }

    /// Validates everything that can be checked without the system of record.
    ///
    /// ACO remaining-quantity checks need the store and are performed by the
    /// orchestrator through [`crate::OrderProgress::ensure_can_consume`].
    pub fn validate(&self, max_batch_size: usize) -> Result<(), ValidationError> {
        if self.product.code.trim().is_empty() {
            return Err(ValidationError::MissingProduct);
        }

        let clock = self.clock_number.trim();
        if clock.is_empty() {
            return Err(ValidationError::MissingClockNumber);
        }
        if !clock.chars().all(|c| c.is_ascii_digit()) {
            return Err(ValidationError::InvalidClockNumber(clock.to_string()));
        }

        match &self.kind {
            LabelKind::Qc(qc) => self.validate_qc(qc)?,
            LabelKind::Grn(grn) => self.validate_grn(grn)?,
        }

        let count = self.pallet_count();
        if count > max_batch_size {
            return Err(ValidationError::CountTooLarge {
                count,
                max: max_batch_size,
            });
        }
        Ok(())
    }

    fn validate_qc(&self, qc: &QcDetails) -> Result<(), ValidationError> {
        if qc.quantity == 0 {
            return Err(ValidationError::InvalidQuantity);
        }
        if qc.count == 0 {
            return Err(ValidationError::InvalidCount);
        }

        match (&self.product.product_type, &qc.context) {
            (ProductType::Aco, ProductTypeContext::Aco { order_ref, .. }) => {
                let order_ref = order_ref.trim();
                if order_ref.is_empty() {
                    return Err(ValidationError::MissingAcoOrderRef);
                }
                if order_ref.len() < MIN_ACO_ORDER_REF_LENGTH
                    || !order_ref.chars().all(|c| c.is_ascii_digit())
                {
                    return Err(ValidationError::InvalidAcoOrderRef(order_ref.to_string()));
                }
            }
            (ProductType::Aco, _) => return Err(ValidationError::MissingAcoOrderRef),
            (ProductType::Slate, ProductTypeContext::Slate { batch_number }) => {
                if batch_number.trim().is_empty() {
                    return Err(ValidationError::MissingSlateBatchNumber);
                }
            }
            (ProductType::Slate, _) => return Err(ValidationError::MissingSlateBatchNumber),
            (ProductType::Standard, ProductTypeContext::None) => {}
            (product_type, _) => {
                return Err(ValidationError::ProductTypeMismatch {
                    product_type: product_type.to_string(),
                });
            }
        }
        Ok(())
    }

    fn validate_grn(&self, grn: &GrnDetails) -> Result<(), ValidationError> {
        if grn.grn_number.trim().is_empty() {
            return Err(ValidationError::MissingGrnNumber);
        }
        if grn.supplier_code.trim().is_empty() {
            return Err(ValidationError::MissingSupplier);
        }
        if grn.gross_weights.is_empty() {
            return Err(ValidationError::MissingGrossWeights);
        }
        grn::net_weights(&grn.gross_weights, grn.pallet_type, grn.package_type)?;
        Ok(())
    }
}
