//! Product descriptors.

use serde::{Deserialize, Serialize};

/// Product type, which drives remark text and required batch metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ProductType {
    #[serde(rename = "ACO")]
    Aco,
    Slate,
    #[default]
    Standard,
}

impl ProductType {
    /// Maps a free-text product type as stored in the product catalogue.
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            l if l.eq_ignore_ascii_case("aco") => ProductType::Aco,
            l if l.eq_ignore_ascii_case("slate") => ProductType::Slate,
            _ => ProductType::Standard,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProductType::Aco => "ACO",
            ProductType::Slate => "Slate",
            ProductType::Standard => "Standard",
        }
    }
}

impl std::fmt::Display for ProductType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved product from the catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductInfo {
    pub code: String,
    pub description: String,
    #[serde(default)]
    pub product_type: ProductType,
}

impl ProductInfo {
    pub fn new(
        code: impl Into<String>,
        description: impl Into<String>,
        product_type: ProductType,
    ) -> Self {
        Self {
            code: code.into(),
            description: description.into(),
            product_type,
        }
    }
}
