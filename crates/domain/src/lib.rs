//! Domain layer for QC and GRN pallet label printing.
//!
//! This crate is pure (no I/O) and provides:
//! - Product and print batch types, with validation
//! - Remark derivation and the dependent row set written per pallet
//! - GRN tare weights and net weight arithmetic
//! - ACO order progress bookkeeping
//! - Label data handed to the PDF renderer

pub mod batch;
pub mod error;
pub mod grn;
pub mod label;
pub mod order;
pub mod product;
pub mod record;

pub use batch::{GrnDetails, LabelKind, PrintBatch, ProductTypeContext, QcDetails};
pub use error::ValidationError;
pub use grn::{LabelMode, PackageType, PalletType};
pub use label::{LabelData, aco_display_text, ordinal_suffix};
pub use order::OrderProgress;
pub use product::{ProductInfo, ProductType};
pub use record::{
    GrnRecord, HistoryEntry, InventoryRecord, PalletInfo, PalletRecordSet, SlateRecord,
    history_remark, pallet_remark,
};
pub use common::{BatchId, Identifier, PalletNumber, Series};
