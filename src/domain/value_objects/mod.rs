//! Value Objects for the storefront

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Separator used by the legacy single-string cart key.
pub const KEY_SEPARATOR: char = '-';

/// Product identity as issued by the backend (UUID text in practice).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(String);

impl ProductId {
    pub fn new(value: impl Into<String>) -> Result<Self, IdError> {
        let value = value.into().trim().to_string();
        if value.is_empty() { return Err(IdError::Empty); }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum IdError { Empty }
impl std::error::Error for IdError {}
impl fmt::Display for IdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "identifier empty") }
}

/// Size variant label ("M", "XL", "32", ...).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Size(String);

impl Size {
    pub fn new(value: impl Into<String>) -> Self { Self(value.into().trim().to_string()) }
    pub fn as_str(&self) -> &str { &self.0 }

    /// Display rank; sizes outside the known ladder share the last rank.
    pub fn rank(&self) -> u8 {
        match self.0.as_str() {
            "XS" => 1, "S" => 2, "M" => 3, "L" => 4, "XL" => 5, "XXL" => 6,
            "28" => 7, "30" => 8, "32" => 9, "34" => 10, "36" => 11, "38" => 12, "40" => 13,
            _ => 99,
        }
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

/// Identity of a cart line: product plus optional size.
///
/// Kept as two fields so identifiers containing the separator stay
/// unambiguous. [`CartKey::encode`] and [`CartKey::parse_legacy`] exist only
/// for the older single-string form still found in persisted carts and
/// client payloads.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CartKey {
    pub product_id: ProductId,
    #[serde(default)]
    pub size: Option<Size>,
}

impl CartKey {
    pub fn new(product_id: ProductId, size: Option<Size>) -> Self { Self { product_id, size } }

    pub fn encode(&self) -> String {
        match &self.size {
            Some(size) => format!("{}{}{}", self.product_id, KEY_SEPARATOR, size),
            None => self.product_id.to_string(),
        }
    }

    /// Splits at the last separator: everything after it is the size.
    pub fn parse_legacy(raw: &str) -> Result<Self, IdError> {
        match raw.rsplit_once(KEY_SEPARATOR) {
            Some((product, size)) if !product.is_empty() && !size.is_empty() => {
                Ok(Self::new(ProductId::new(product)?, Some(Size::new(size))))
            }
            _ => Ok(Self::new(ProductId::new(raw)?, None)),
        }
    }
}

impl fmt::Display for CartKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.encode()) }
}

impl PartialOrd for CartKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

impl Ord for CartKey {
    fn cmp(&self, other: &Self) -> Ordering { self.encode().cmp(&other.encode()) }
}

/// Money in minor currency units (cents).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);
    pub fn from_minor(amount: i64) -> Self { Self(amount) }
    pub fn minor(&self) -> i64 { self.0 }
    pub fn add(&self, other: Money) -> Money { Money(self.0.saturating_add(other.0)) }
    pub fn multiply(&self, qty: u32) -> Money { Money(self.0.saturating_mul(i64::from(qty))) }

    /// Formats as euros the way the storefront shows prices: `1.234,50 €`.
    pub fn format_eur(&self) -> String {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let units = (abs / 100).to_string();
        let cents = abs % 100;
        let mut grouped = String::with_capacity(units.len() + units.len() / 3);
        for (i, ch) in units.chars().enumerate() {
            if i > 0 && (units.len() - i) % 3 == 0 { grouped.push('.'); }
            grouped.push(ch);
        }
        format!("{sign}{grouped},{cents:02} €")
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.format_eur()) }
}
