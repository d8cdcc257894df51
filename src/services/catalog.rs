//! Product Catalog
//!
//! In-memory metadata about each pre-computed analytic artifact. Registered
//! once at startup from a static TOML definition and immutable thereafter.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use super::agent::AgentError;

/// Optional row selector applied when loading an artifact slice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowFilter {
    pub column: String,
    pub equals: String,
}

/// Descriptor for one pre-computed analytic artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub use_cases: Vec<String>,
    #[serde(default)]
    pub key_metrics: Vec<String>,
    pub source_file: String,
    #[serde(default)]
    pub filter: Option<RowFilter>,
    /// UI URL fragment the orchestrator surfaces as a `navigation` event
    #[serde(default)]
    pub route_hint: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read catalog file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed catalog file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("duplicate product id: {0}")]
    DuplicateId(String),

    #[error("catalog defines no products")]
    Empty,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    products: Vec<Product>,
}

/// Maps `product_id -> Product` and renders the compact catalog description
/// used by the planner prompt.
#[derive(Debug)]
pub struct Catalog {
    products: Vec<Product>,
    by_id: HashMap<String, usize>,
}

impl Catalog {
    /// Build from products in registration order. Ids are case-sensitive;
    /// duplicates are a startup configuration error.
    pub fn new(products: Vec<Product>) -> Result<Self, CatalogError> {
        if products.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut by_id = HashMap::with_capacity(products.len());
        for (index, product) in products.iter().enumerate() {
            if by_id.insert(product.id.clone(), index).is_some() {
                return Err(CatalogError::DuplicateId(product.id.clone()));
            }
        }

        Ok(Self { products, by_id })
    }

    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let file: CatalogFile = toml::from_str(&content)?;
        Self::new(file.products)
    }

    pub fn get(&self, id: &str) -> Result<&Product, AgentError> {
        self.by_id
            .get(id)
            .map(|&index| &self.products[index])
            .ok_or_else(|| AgentError::UnknownProduct(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    /// Deterministic, stable serialization of the catalog for the planner
    /// prompt: id, description, use cases, and metrics in registration order.
    pub fn describe_for_planner(&self) -> String {
        let mut out = String::new();
        for product in &self.products {
            out.push_str("- id: ");
            out.push_str(&product.id);
            out.push('\n');
            out.push_str("  description: ");
            out.push_str(&product.description);
            out.push('\n');
            if !product.use_cases.is_empty() {
                out.push_str("  use cases: ");
                out.push_str(&product.use_cases.join("; "));
                out.push('\n');
            }
            if !product.key_metrics.is_empty() {
                out.push_str("  key metrics: ");
                out.push_str(&product.key_metrics.join(", "));
                out.push('\n');
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(id: &str) -> Product {
        Product {
            id: id.to_string(),
            description: format!("{} description", id),
            use_cases: vec!["ranking".to_string()],
            key_metrics: vec!["count".to_string()],
            source_file: format!("{}.csv", id),
            filter: None,
            route_hint: None,
        }
    }

    #[test]
    fn get_returns_registered_product() {
        let catalog = Catalog::new(vec![product("top10_volume_30d")]).unwrap();
        let found = catalog.get("top10_volume_30d").unwrap();
        assert_eq!(found.source_file, "top10_volume_30d.csv");
    }

    #[test]
    fn get_unknown_id_is_an_error() {
        let catalog = Catalog::new(vec![product("a")]).unwrap();
        let err = catalog.get("missing").unwrap_err();
        assert_eq!(err.kind(), "UnknownProduct");
    }

    #[test]
    fn ids_are_case_sensitive() {
        let catalog = Catalog::new(vec![product("Top10")]).unwrap();
        assert!(catalog.get("top10").is_err());
        assert!(catalog.get("Top10").is_ok());
    }

    #[test]
    fn duplicate_ids_rejected_at_registration() {
        let err = Catalog::new(vec![product("a"), product("a")]).unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateId(id) if id == "a"));
    }

    #[test]
    fn empty_catalog_rejected() {
        assert!(matches!(Catalog::new(vec![]), Err(CatalogError::Empty)));
    }

    #[test]
    fn describe_is_deterministic_and_ordered() {
        let catalog = Catalog::new(vec![product("b"), product("a")]).unwrap();
        let first = catalog.describe_for_planner();
        let second = catalog.describe_for_planner();
        assert_eq!(first, second);
        // registration order, not sorted
        let b_pos = first.find("id: b").unwrap();
        let a_pos = first.find("id: a").unwrap();
        assert!(b_pos < a_pos);
    }

    #[test]
    fn parses_catalog_toml() {
        let toml_src = r#"
            [[products]]
            id = "top10_volume_30d"
            description = "Top service categories by 30-day request volume"
            use_cases = ["ranking categories", "volume questions"]
            key_metrics = ["request_count"]
            source_file = "top10_volume_30d.csv"
            route_hint = "/dashboard/analytics/frequency"

            [[products]]
            id = "backlog_distribution"
            description = "Open request age distribution"
            source_file = "backlog_distribution.csv"

            [products.filter]
            column = "status"
            equals = "open"
        "#;
        let file: CatalogFile = toml::from_str(toml_src).unwrap();
        let catalog = Catalog::new(file.products).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(
            catalog.get("top10_volume_30d").unwrap().route_hint.as_deref(),
            Some("/dashboard/analytics/frequency")
        );
        let filter = catalog.get("backlog_distribution").unwrap().filter.as_ref().unwrap();
        assert_eq!(filter.column, "status");
        assert_eq!(filter.equals, "open");
    }
}
