//! The dependent rows written for one pallet.

use chrono::{DateTime, Utc};
use common::Identifier;
use serde::{Deserialize, Serialize};

use crate::batch::{LabelKind, PrintBatch};
use crate::product::ProductType;

/// Location every new pallet starts in.
pub const AWAIT_LOCATION: &str = "Await";

/// History action recorded for QC pallets.
pub const QC_ACTION: &str = "Finished QC";

/// History action recorded for GRN pallets.
pub const GRN_ACTION: &str = "GRN Receiving";

/// Pallet remark for a QC pallet.
pub fn pallet_remark(batch: &PrintBatch) -> String {
    match (&batch.product.product_type, batch.aco_order_ref(), batch.slate_batch_number()) {
        (ProductType::Aco, Some(order_ref), _) => {
            format!("Finished In Production ACO Ref : {order_ref}")
        }
        (ProductType::Slate, _, Some(batch_num)) => {
            format!("Finished In Production Batch Num : {batch_num}")
        }
        _ => "Finished In Production".to_string(),
    }
}

/// Short-form remark written to the history row of a QC pallet.
pub fn history_remark(batch: &PrintBatch) -> String {
    match (&batch.product.product_type, batch.aco_order_ref(), batch.slate_batch_number()) {
        (ProductType::Aco, Some(order_ref), _) => format!("ACO Ref : {order_ref}"),
        (ProductType::Slate, _, Some(batch_num)) => format!("Batch Num : {batch_num}"),
        _ => batch.operator_or_dash().to_string(),
    }
}

/// Pallet info row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PalletInfo {
    pub identifier: Identifier,
    pub product_code: String,
    pub product_qty: i64,
    pub remark: String,
    pub generated_at: DateTime<Utc>,
    /// Set after the label PDF has been uploaded.
    pub pdf_url: Option<String>,
}

/// Movement history row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub time: DateTime<Utc>,
    pub operator_id: String,
    pub action: String,
    pub location: String,
    pub remark: String,
}

/// Inventory row: the pallet's quantity waiting in the `Await` location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub product_code: String,
    pub await_qty: i64,
}

/// Slate first-off record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlateRecord {
    pub batch_number: String,
    pub first_off: DateTime<Utc>,
    pub setter: String,
}

/// Goods received row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrnRecord {
    pub grn_ref: String,
    pub supplier_code: String,
    pub material_code: String,
    pub gross_weight: f64,
    pub net_weight: f64,
    pub pallet_type: String,
    pub package_type: String,
    pub pallet_count: u32,
    pub package_count: u32,
}

/// Every row created for one pallet, written as a single unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PalletRecordSet {
    pub pallet: PalletInfo,
    pub history: HistoryEntry,
    pub inventory: InventoryRecord,
    pub slate: Option<SlateRecord>,
    pub grn: Option<GrnRecord>,
}

impl PalletRecordSet {
    /// Builds the row set for the pallet at `index` of `batch`.
    ///
    /// `quantity` is the pallet's quantity (units for QC, rounded net kg for
    /// GRN); `net_weight` is the exact GRN net weight and is ignored for QC.
    pub fn build(
        batch: &PrintBatch,
        identifier: &Identifier,
        index: usize,
        quantity: i64,
        net_weight: Option<f64>,
        now: DateTime<Utc>,
    ) -> Self {
        let clock = batch.clock_number.trim().to_string();
        let product_code = batch.product.code.clone();

        let (remark, action, history_remark, slate, grn) = match &batch.kind {
            LabelKind::Qc(_) => {
                let slate = match (&batch.product.product_type, batch.slate_batch_number()) {
                    (ProductType::Slate, Some(batch_number)) => Some(SlateRecord {
                        batch_number: batch_number.to_string(),
                        first_off: now,
                        setter: batch.operator_or_dash().to_string(),
                    }),
                    _ => None,
                };
                (
                    pallet_remark(batch),
                    QC_ACTION,
                    history_remark(batch),
                    slate,
                    None,
                )
            }
            LabelKind::Grn(details) => {
                let grn_ref = details.grn_number.trim().to_string();
                let record = GrnRecord {
                    grn_ref: grn_ref.clone(),
                    supplier_code: details.supplier_code.trim().to_string(),
                    material_code: product_code.clone(),
                    gross_weight: details.gross_weights.get(index).copied().unwrap_or_default(),
                    net_weight: net_weight.unwrap_or(quantity as f64),
                    pallet_type: details.pallet_type.label().to_string(),
                    package_type: details.package_type.label().to_string(),
                    pallet_count: details.pallet_count,
                    package_count: details.package_count,
                };
                (
                    format!("Material GRN - {grn_ref}"),
                    GRN_ACTION,
                    format!("GRN : {grn_ref}"),
                    None,
                    Some(record),
                )
            }
        };

        Self {
            pallet: PalletInfo {
                identifier: identifier.clone(),
                product_code: product_code.clone(),
                product_qty: quantity,
                remark,
                generated_at: now,
                pdf_url: None,
            },
            history: HistoryEntry {
                time: now,
                operator_id: clock,
                action: action.to_string(),
                location: AWAIT_LOCATION.to_string(),
                remark: history_remark,
            },
            inventory: InventoryRecord {
                product_code,
                await_qty: quantity,
            },
            slate,
            grn,
        }
    }

    pub fn identifier(&self) -> &Identifier {
        &self.pallet.identifier
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{GrnDetails, ProductTypeContext, QcDetails};
    use crate::grn::{LabelMode, PackageType, PalletType};
    use crate::product::ProductInfo;
    use common::{PalletNumber, Series};

    fn id(seq: u32) -> Identifier {
        Identifier::new(
            PalletNumber::new("20240521", seq),
            Series::new(format!("210524-S{seq}")).unwrap(),
        )
    }

    fn qc_batch(product_type: ProductType, context: ProductTypeContext) -> PrintBatch {
        PrintBatch::qc(
            ProductInfo::new("ME6060150", "Cover", product_type),
            "5997",
            QcDetails {
                quantity: 10,
                count: 1,
                operator: Some("1234".to_string()),
                context,
            },
        )
    }

    #[test]
    fn test_plain_remark() {
        let batch = qc_batch(ProductType::Standard, ProductTypeContext::None);
        assert_eq!(pallet_remark(&batch), "Finished In Production");
        assert_eq!(history_remark(&batch), "1234");
    }

    #[test]
    fn test_plain_history_remark_without_operator_is_dash() {
        let mut batch = qc_batch(ProductType::Standard, ProductTypeContext::None);
        if let LabelKind::Qc(qc) = &mut batch.kind {
            qc.operator = None;
        }
        assert_eq!(history_remark(&batch), "-");
    }

    #[test]
    fn test_aco_remark() {
        let batch = qc_batch(
            ProductType::Aco,
            ProductTypeContext::Aco {
                order_ref: " 123456 ".to_string(),
                new_order: false,
            },
        );
        assert_eq!(
            pallet_remark(&batch),
            "Finished In Production ACO Ref : 123456"
        );
        assert_eq!(history_remark(&batch), "ACO Ref : 123456");
    }

    #[test]
    fn test_slate_remark_and_slate_row() {
        let batch = qc_batch(
            ProductType::Slate,
            ProductTypeContext::Slate {
                batch_number: "B-77".to_string(),
            },
        );
        assert_eq!(
            pallet_remark(&batch),
            "Finished In Production Batch Num : B-77"
        );
        assert_eq!(history_remark(&batch), "Batch Num : B-77");

        let now = Utc::now();
        let set = PalletRecordSet::build(&batch, &id(1), 0, 10, None, now);
        let slate = set.slate.expect("slate row");
        assert_eq!(slate.batch_number, "B-77");
        assert_eq!(slate.setter, "1234");
    }

    #[test]
    fn test_aco_type_without_ref_falls_back_to_plain() {
        let batch = qc_batch(
            ProductType::Aco,
            ProductTypeContext::Aco {
                order_ref: "".to_string(),
                new_order: false,
            },
        );
        assert_eq!(pallet_remark(&batch), "Finished In Production");
    }

    #[test]
    fn test_qc_record_set() {
        let batch = qc_batch(ProductType::Standard, ProductTypeContext::None);
        let now = Utc::now();
        let set = PalletRecordSet::build(&batch, &id(3), 0, 10, None, now);

        assert_eq!(set.identifier(), &id(3));
        assert_eq!(set.pallet.product_qty, 10);
        assert_eq!(set.history.action, QC_ACTION);
        assert_eq!(set.history.location, AWAIT_LOCATION);
        assert_eq!(set.history.operator_id, "5997");
        assert_eq!(set.inventory.await_qty, 10);
        assert!(set.slate.is_none());
        assert!(set.grn.is_none());
        assert!(set.pallet.pdf_url.is_none());
    }

    #[test]
    fn test_grn_record_set() {
        let batch = PrintBatch::grn(
            ProductInfo::new("MAT01", "Resin", ProductType::Standard),
            "5997",
            GrnDetails {
                grn_number: "GRN1001".to_string(),
                supplier_code: "SUP01".to_string(),
                gross_weights: vec![500.0, 420.5],
                pallet_type: PalletType::Euro,
                package_type: PackageType::Tote,
                pallet_count: 2,
                package_count: 4,
                label_mode: LabelMode::Weight,
            },
        );
        let set = PalletRecordSet::build(&batch, &id(2), 1, 389, Some(388.5), Utc::now());

        assert_eq!(set.pallet.remark, "Material GRN - GRN1001");
        assert_eq!(set.history.action, GRN_ACTION);
        let grn = set.grn.expect("grn row");
        assert_eq!(grn.gross_weight, 420.5);
        assert_eq!(grn.net_weight, 388.5);
        assert_eq!(grn.pallet_type, "Euro");
        assert_eq!(grn.package_type, "Tote");
    }
}
