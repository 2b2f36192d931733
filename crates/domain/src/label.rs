//! Label data handed to the PDF renderer.

use common::Identifier;
use serde::{Deserialize, Serialize};

use crate::batch::{LabelKind, PrintBatch};
use crate::product::ProductType;

/// Everything printed on one pallet label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelData {
    /// `QC` or `GRN`.
    pub title: String,
    pub product_code: String,
    pub product_description: String,
    pub product_type: ProductType,
    /// Units for QC, net kilograms for GRN.
    pub quantity: i64,
    pub pallet_number: String,
    pub series: String,
    pub operator_clock_num: String,
    pub qc_clock_num: String,
    pub work_order_number: Option<String>,
    pub work_order_name: Option<String>,
    pub grn_number: Option<String>,
    pub supplier_code: Option<String>,
    pub gross_weight: Option<f64>,
}

impl LabelData {
    /// Builds label data for the pallet at `index` (0-based, in ascending
    /// sequence order) of a batch.
    ///
    /// `aco_pallets_before` is the number of pallets already printed for the
    /// batch's ACO order before this batch started.
    pub fn for_pallet(
        batch: &PrintBatch,
        identifier: &Identifier,
        index: usize,
        quantity: i64,
        aco_pallets_before: u32,
    ) -> Self {
        let (work_order_number, work_order_name) = match batch.aco_order_ref() {
            Some(order_ref) if batch.product.product_type == ProductType::Aco => (
                Some(aco_display_text(
                    order_ref,
                    aco_pallets_before + index as u32 + 1,
                )),
                Some("ACO Order".to_string()),
            ),
            _ => (None, None),
        };

        let (title, grn_number, supplier_code, gross_weight) = match &batch.kind {
            LabelKind::Qc(_) => ("QC", None, None, None),
            LabelKind::Grn(grn) => (
                "GRN",
                Some(grn.grn_number.trim().to_string()),
                Some(grn.supplier_code.trim().to_string()),
                grn.gross_weights.get(index).copied(),
            ),
        };

        Self {
            title: title.to_string(),
            product_code: batch.product.code.clone(),
            product_description: batch.product.description.clone(),
            product_type: batch.product.product_type.clone(),
            quantity,
            pallet_number: identifier.pallet_number.to_string(),
            series: identifier.series.to_string(),
            operator_clock_num: batch.operator_or_dash().to_string(),
            qc_clock_num: batch.clock_number.trim().to_string(),
            work_order_number,
            work_order_name,
            grn_number,
            supplier_code,
            gross_weight,
        }
    }

    /// Label lines in print order, used by text renderers.
    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("{} LABEL", self.title),
            format!("Product Code: {}", self.product_code),
            format!("Description: {}", self.product_description),
            format!("Quantity: {}", self.quantity),
            format!("Pallet No: {}", self.pallet_number),
            format!("Series: {}", self.series),
        ];
        if let Some(wo) = &self.work_order_number {
            let name = self.work_order_name.as_deref().unwrap_or("Work Order");
            lines.push(format!("{name}: {wo}"));
        }
        if let Some(grn) = &self.grn_number {
            lines.push(format!("GRN: {grn}"));
        }
        if let Some(sup) = &self.supplier_code {
            lines.push(format!("Supplier: {sup}"));
        }
        if let Some(gw) = self.gross_weight {
            lines.push(format!("Gross Weight: {gw}kg"));
        }
        lines.push(format!("Operator: {}", self.operator_clock_num));
        lines.push(format!("Q.C. Done By: {}", self.qc_clock_num));
        lines
    }
}

/// English ordinal for a positive number: 1st, 2nd, 3rd, 4th, 11th, 21st...
pub fn ordinal_suffix(n: u32) -> String {
    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{n}{suffix}")
}

/// Work order text for an ACO pallet: `"{ref} - {ordinal} Pallet"`.
pub fn aco_display_text(order_ref: &str, pallet_ordinal: u32) -> String {
    format!("{} - {} Pallet", order_ref.trim(), ordinal_suffix(pallet_ordinal))
}
