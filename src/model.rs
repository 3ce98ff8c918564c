use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

use crate::{Result, StoreError};

/// Stable identity of a catalog record, assigned by the catalog service.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ProductId(pub u64);

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ProductId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<u64>()
            .map(ProductId)
            .map_err(|_| StoreError::Parse)
    }
}

impl From<u64> for ProductId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Read-only copy of a catalog record.
///
/// `quantity` is the remaining stock. `available` is maintained by the
/// operator and does not follow from the stock level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub category: String,
    #[serde(default, alias = "desc")]
    pub description: String,
    pub price: f64,
    #[serde(default, alias = "stockQuantity")]
    pub quantity: u32,
    #[serde(default, alias = "productAvailable")]
    pub available: bool,
    /// `None` when the record carries no usable date.
    #[serde(default, deserialize_with = "release_date")]
    pub release_date: Option<NaiveDate>,
    #[serde(default)]
    pub image_name: Option<String>,
}

impl Product {
    /// Whether the catalog holds a binary image for this product.
    pub fn has_image(&self) -> bool {
        self.image_name
            .as_deref()
            .map(|name| !name.is_empty())
            .unwrap_or(false)
    }
}

/// The catalog service emits either a plain date or a full timestamp;
/// only the calendar date is kept. A null or unreadable date must not sink
/// the whole listing, so it becomes `None`.
fn release_date<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let date = raw.get(..10).unwrap_or(&raw);
    match NaiveDate::parse_from_str(date, "%Y-%m-%d") {
        Ok(date) => Ok(Some(date)),
        Err(err) => {
            log::warn!("catalog: ignoring release date {:?}: {}", raw, err);
            Ok(None)
        }
    }
}

/// Product fields sent by the operator when creating or updating a record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDraft {
    pub name: String,
    pub brand: String,
    pub category: String,
    #[serde(rename = "desc")]
    pub description: String,
    pub price: f64,
    pub quantity: u32,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_date: Option<NaiveDate>,
}

impl From<&Product> for ProductDraft {
    fn from(product: &Product) -> Self {
        Self {
            name: product.name.clone(),
            brand: product.brand.clone(),
            category: product.category.clone(),
            description: product.description.clone(),
            price: product.price,
            quantity: product.quantity,
            available: product.available,
            release_date: product.release_date,
        }
    }
}

/// Image file attached to a create or update request.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// One product inside the cart.
///
/// The product is a snapshot taken when it was first added; later catalog
/// refreshes do not touch it. `quantity` counts units in the cart and is
/// unrelated to `product.quantity`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub product: Product,
    pub quantity: u32,
}

impl CartLine {
    pub fn id(&self) -> ProductId {
        self.product.id
    }

    pub fn subtotal(&self) -> f64 {
        self.product.price * f64::from(self.quantity)
    }
}
