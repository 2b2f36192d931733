//! GRN tare weights and net weight arithmetic.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Pallet type used when receiving goods. Each carries a fixed tare in kg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum PalletType {
    WhiteDry,
    WhiteWet,
    ChepDry,
    ChepWet,
    Euro,
    #[default]
    NotIncluded,
}

impl PalletType {
    pub fn tare_kg(&self) -> f64 {
        match self {
            PalletType::WhiteDry => 14.0,
            PalletType::WhiteWet => 18.0,
            PalletType::ChepDry => 26.0,
            PalletType::ChepWet => 38.0,
            PalletType::Euro => 22.0,
            PalletType::NotIncluded => 0.0,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PalletType::WhiteDry => "White Dry",
            PalletType::WhiteWet => "White Wet",
            PalletType::ChepDry => "Chep Dry",
            PalletType::ChepWet => "Chep Wet",
            PalletType::Euro => "Euro",
            PalletType::NotIncluded => "Not Included",
        }
    }
}

/// Package type wrapped around the received material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum PackageType {
    Still,
    Bag,
    Tote,
    Octo,
    #[default]
    NotIncluded,
}

impl PackageType {
    pub fn tare_kg(&self) -> f64 {
        match self {
            PackageType::Still => 50.0,
            PackageType::Bag => 1.0,
            PackageType::Tote => 10.0,
            PackageType::Octo => 20.0,
            PackageType::NotIncluded => 0.0,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PackageType::Still => "Still",
            PackageType::Bag => "Bag",
            PackageType::Tote => "Tote",
            PackageType::Octo => "Octo",
            PackageType::NotIncluded => "Not Included",
        }
    }
}

/// Whether GRN quantities are measured by weight or by unit count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LabelMode {
    #[default]
    Weight,
    Qty,
}

/// Net weight for one pallet: gross minus pallet and package tares.
pub fn net_weight(gross: f64, pallet: PalletType, package: PackageType) -> f64 {
    gross - pallet.tare_kg() - package.tare_kg()
}

/// Computes net weights for every pallet, rejecting the whole set if any
/// gross weight is not a positive number or leaves a non-positive net.
///
/// Pallet indexes in errors are 1-based, matching what operators see.
pub fn net_weights(
    gross_weights: &[f64],
    pallet: PalletType,
    package: PackageType,
) -> Result<Vec<f64>, ValidationError> {
    gross_weights
        .iter()
        .enumerate()
        .map(|(i, &gross)| {
            if !gross.is_finite() || gross <= 0.0 {
                return Err(ValidationError::InvalidGrossWeight {
                    index: i + 1,
                    value: gross,
                });
            }
            let net = net_weight(gross, pallet, package);
            if net <= 0.0 {
                return Err(ValidationError::NonPositiveNetWeight { index: i + 1, net });
            }
            Ok(net)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_net_weight_subtracts_both_tares() {
        assert_eq!(net_weight(500.0, PalletType::ChepWet, PackageType::Tote), 452.0);
        assert_eq!(
            net_weight(100.0, PalletType::NotIncluded, PackageType::NotIncluded),
            100.0
        );
    }

    #[test]
    fn test_net_weights_rejects_non_positive_net() {
        let err = net_weights(&[200.0, 60.0], PalletType::WhiteDry, PackageType::Still)
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::NonPositiveNetWeight { index: 2, net: -4.0 }
        );
    }

    #[test]
    fn test_net_weights_rejects_bad_gross() {
        let err = net_weights(&[f64::NAN], PalletType::Euro, PackageType::Bag).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidGrossWeight { index: 1, .. }));

        let err = net_weights(&[10.0, 0.0], PalletType::Euro, PackageType::Bag).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidGrossWeight { index: 2, .. }));
    }

    #[test]
    fn test_pallet_type_serde_keys() {
        let t: PalletType = serde_json::from_str("\"chepDry\"").unwrap();
        assert_eq!(t, PalletType::ChepDry);
        assert_eq!(serde_json::to_string(&PackageType::NotIncluded).unwrap(), "\"notIncluded\"");
    }
}
