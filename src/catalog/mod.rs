//! Static registry of tradable symbols and their contract parameters.

mod product;

pub use product::{Product, TradingHours, UnitConversion};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::types::Price;

/// Catalog lookup failure.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CatalogError {
    /// The symbol is not in the catalog.
    SymbolUnknown(String),
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::SymbolUnknown(symbol) => write!(f, "unknown symbol: {symbol}"),
        }
    }
}

impl std::error::Error for CatalogError {}

/// Scale applied to the reference rate: a stored rate of `1_000_000`
/// converts one external unit into one quote minor unit.
pub const RATE_SCALE: u128 = 1_000_000;

/// A point-in-time view of the external→quote reference rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateSnapshot {
    /// Rate scaled by [`RATE_SCALE`].
    pub rate_micros: u64,
    /// When the rate was last updated.
    pub ts_ms: u64,
    /// Whether the rate has aged past the staleness threshold. A stale
    /// rate is still usable; conversions carry the tag forward.
    pub stale: bool,
}

/// Tag attached to a converted price describing the rate that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateTag {
    /// Conversion used a fresh rate (or none was needed).
    Fresh,
    /// Conversion fell back to the last known, stale rate.
    Stale,
}

/// Read-only registry of products, indexed by symbol and by external
/// underlying key. Built once at startup; shared as `Arc<ProductCatalog>`.
#[derive(Debug)]
pub struct ProductCatalog {
    by_symbol: HashMap<String, Arc<Product>>,
    by_external: HashMap<String, Vec<Arc<Product>>>,
}

impl ProductCatalog {
    /// Build a catalog from product definitions. Later duplicates of a
    /// symbol replace earlier ones.
    #[must_use]
    pub fn new(products: Vec<Product>) -> Self {
        let mut by_symbol: HashMap<String, Arc<Product>> = HashMap::new();
        for product in products {
            by_symbol.insert(product.symbol.clone(), Arc::new(product));
        }
        let mut by_external: HashMap<String, Vec<Arc<Product>>> = HashMap::new();
        for product in by_symbol.values() {
            by_external
                .entry(product.external_symbol.clone())
                .or_default()
                .push(Arc::clone(product));
        }
        Self {
            by_symbol,
            by_external,
        }
    }

    /// Look up a product by symbol.
    ///
    /// # Errors
    /// `CatalogError::SymbolUnknown` if the symbol is not registered.
    pub fn get(&self, symbol: &str) -> Result<&Arc<Product>, CatalogError> {
        self.by_symbol
            .get(symbol)
            .ok_or_else(|| CatalogError::SymbolUnknown(symbol.to_string()))
    }

    /// Products mapped to an external underlying key. Empty if none.
    #[must_use]
    pub fn by_external_symbol(&self, external_symbol: &str) -> &[Arc<Product>] {
        self.by_external
            .get(external_symbol)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All active symbols, sorted for deterministic iteration.
    #[must_use]
    pub fn active_symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self
            .by_symbol
            .values()
            .filter(|p| p.active)
            .map(|p| p.symbol.clone())
            .collect();
        symbols.sort();
        symbols
    }

    /// All hedgeable symbols, sorted.
    #[must_use]
    pub fn hedgeable_symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self
            .by_symbol
            .values()
            .filter(|p| p.hedgeable)
            .map(|p| p.symbol.clone())
            .collect();
        symbols.sort();
        symbols
    }

    /// Number of registered products.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_symbol.len()
    }

    /// Whether the catalog holds no products.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_symbol.is_empty()
    }

    /// Convert an external price into quote-currency minor units for a
    /// product. Native products pass through untouched; reference-rate
    /// products multiply by the snapshot rate. A stale rate still
    /// converts, tagged [`RateTag::Stale`].
    #[must_use]
    pub fn convert_price(
        &self,
        product: &Product,
        external_price: Price,
        rate: &RateSnapshot,
    ) -> (Price, RateTag) {
        match product.conversion {
            UnitConversion::Native => (external_price, RateTag::Fresh),
            UnitConversion::ViaReferenceRate => {
                let converted = external_price
                    .saturating_mul(rate.rate_micros as u128)
                    / RATE_SCALE;
                let tag = if rate.stale {
                    RateTag::Stale
                } else {
                    RateTag::Fresh
                };
                (converted, tag)
            }
        }
    }
}
