//! Per-product merge configuration
//!
//! Every report product groups its rows by a fixed set of key columns and
//! rolls each metric up with a fixed operator. The merge engine must repeat
//! exactly that grouping when it stitches batches back together, otherwise
//! numbers come out wrong without any error. The registry is the single
//! place where those rules live.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ExportError, Result};

/// How values of one column combine within a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggOp {
    Sum,
    Mean,
    Max,
    Min,
    First,
}

impl fmt::Display for AggOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AggOp::Sum => "sum",
            AggOp::Mean => "mean",
            AggOp::Max => "max",
            AggOp::Min => "min",
            AggOp::First => "first",
        };
        f.write_str(name)
    }
}

/// Grouping keys and aggregation operators of one product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Columns identifying a row, in order
    pub merge_keys: Vec<String>,

    /// Operator per metric column; unlisted non-key columns use `first`
    #[serde(default)]
    pub agg: BTreeMap<String, AggOp>,
}

impl MergeConfig {
    pub fn new<K, S>(merge_keys: K, agg: &[(&str, AggOp)]) -> Self
    where
        K: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            merge_keys: merge_keys.into_iter().map(Into::into).collect(),
            agg: agg.iter().map(|(c, op)| (c.to_string(), *op)).collect(),
        }
    }

    /// Operator for a column, `None` for merge keys
    pub fn op_for(&self, column: &str) -> Option<AggOp> {
        if self.merge_keys.iter().any(|k| k == column) {
            return None;
        }
        Some(self.agg.get(column).copied().unwrap_or(AggOp::First))
    }

    /// Check keys are non-empty and unique, and no key is also aggregated
    pub fn validate(&self, product: &str) -> Result<()> {
        if self.merge_keys.is_empty() {
            return Err(ConfigError::MissingField(format!("merge.{product}.merge_keys")).into());
        }
        let mut seen = HashSet::new();
        for key in &self.merge_keys {
            if !seen.insert(key.as_str()) {
                return Err(ConfigError::InvalidValue {
                    field: format!("merge.{product}.merge_keys"),
                    value: format!("duplicate key '{key}'"),
                }
                .into());
            }
            if self.agg.contains_key(key) {
                return Err(ConfigError::InvalidValue {
                    field: format!("merge.{product}.agg"),
                    value: format!("'{key}' is a merge key"),
                }
                .into());
            }
        }
        Ok(())
    }
}

/// Product identifier → merge configuration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeRegistry {
    configs: BTreeMap<String, MergeConfig>,
}

impl MergeRegistry {
    /// Registry with no products
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with the built-in report products
    pub fn builtin() -> Self {
        use AggOp::*;

        let mut registry = Self::empty();

        registry.insert(
            "keyword_lab",
            MergeConfig::new(
                ["keyword_id", "storefront_sid", "month"],
                &[
                    ("search_volume", Sum),
                    ("ads_gmv", Sum),
                    ("cost", Sum),
                    ("click", Sum),
                    ("impression", Sum),
                    ("ads_item_sold", Sum),
                    ("bidding_price", Mean),
                    ("suggested_bidding_price", Mean),
                    ("roas", Mean),
                    ("cr", Mean),
                    ("ctr", Mean),
                    ("cpc", Mean),
                    ("peak_day_ads_gmv", Max),
                    ("peak_day_bau_ads_gmv", Max),
                    ("company_competitor", Max),
                    ("product_competitor", Max),
                    ("storefront_competitor", Max),
                ],
            ),
        );

        registry.insert(
            "keyword_performance",
            MergeConfig::new(
                [
                    "keyword",
                    "storefront_name",
                    "marketplace_code",
                    "created_datetime",
                    "display_type",
                    "device_type",
                    "product_position",
                ],
                &[
                    ("search_volume", Mean),
                    ("atc", Max),
                    ("cost", Max),
                    ("click", Max),
                    ("ads_order", Max),
                    ("conversion", Max),
                    ("direct_atc", Max),
                    ("direct_gmv", Max),
                    ("impression", Max),
                    ("active_skus", Max),
                    ("active_shops", Max),
                    ("direct_order", Max),
                    ("ads_item_sold", Max),
                    ("direct_item_sold", Max),
                    ("direct_conversion", Max),
                    ("escore", Mean),
                    ("ads_gmv", Max),
                    ("benchmark_CPC", Mean),
                    ("cpc", Max),
                ],
            ),
        );

        registry.insert(
            "product_tracking",
            MergeConfig::new(
                [
                    "keyword",
                    "keyword_id",
                    "product_name",
                    "marketplace_name",
                    "global_company_name",
                    "storefront_name",
                    "created_datetime",
                ],
                &[
                    ("item_sold_LT", Mean),
                    ("selling_price", Mean),
                    ("item_sold_l30d", Sum),
                    ("product_slot", Mean),
                ],
            ),
        );

        registry.insert(
            "competition_landscape",
            MergeConfig::new(
                [
                    "global_company_name",
                    "storefront_name",
                    "created_datetime",
                    "marketplace_name",
                    "keyword",
                    "display_type",
                    "product_position",
                    "device_type",
                ],
                &[("search_volume", Mean), ("share_of_search", Mean)],
            ),
        );

        registry.insert(
            "storefront_optimization",
            MergeConfig::new(
                ["storefront_id", "storefront_name", "country_code", "marketplace_code"],
                &[
                    ("gmv", Sum),
                    ("cost", Sum),
                    ("roas", Mean),
                    ("cpc", Mean),
                    ("click", Sum),
                    ("impression", Sum),
                    ("ads_order", Sum),
                    ("direct_gmv", Sum),
                    ("direct_ads_order", Sum),
                    ("direct_item_sold", Sum),
                    ("item_sold", Sum),
                ],
            ),
        );

        registry.insert(
            "campaign_optimization",
            MergeConfig::new(
                [
                    "campaign_name",
                    "storefront_name",
                    "country_code",
                    "marketplace_code",
                    "month",
                ],
                &[
                    ("campaign_clicks", Sum),
                    ("campaign_impressions", Sum),
                    ("campaign_roas", Mean),
                    ("cpc", Mean),
                    ("campaign_gmv", Sum),
                    ("campaign_cost", Sum),
                ],
            ),
        );

        registry.insert(
            "ads_object_optimization",
            MergeConfig::new(
                [
                    "object_name",
                    "campaign_name",
                    "storefront_name",
                    "country_code",
                    "marketplace_code",
                    "month",
                ],
                &[
                    ("object_clicks", Sum),
                    ("object_impressions", Sum),
                    ("object_roas", Mean),
                    ("object_cpc", Mean),
                    ("object_gmv", Sum),
                    ("object_cost", Sum),
                ],
            ),
        );

        registry
    }

    /// Register or replace a product
    pub fn insert(&mut self, product: impl Into<String>, config: MergeConfig) {
        self.configs.insert(product.into(), config);
    }

    /// Look up a product
    ///
    /// # Returns
    /// * `Result<&MergeConfig>` - Config, or `UnknownProduct` listing known products
    pub fn get(&self, product: &str) -> Result<&MergeConfig> {
        self.configs
            .get(product)
            .ok_or_else(|| ExportError::UnknownProduct {
                product: product.to_string(),
                available: self.products().map(str::to_string).collect(),
            })
    }

    pub fn contains(&self, product: &str) -> bool {
        self.configs.contains_key(product)
    }

    /// Registered product identifiers, sorted
    pub fn products(&self) -> impl Iterator<Item = &str> {
        self.configs.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MergeConfig)> {
        self.configs.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Overlay entries from configuration on top of this registry
    pub fn with_overrides(mut self, overrides: &BTreeMap<String, MergeConfig>) -> Self {
        for (product, config) in overrides {
            self.configs.insert(product.clone(), config.clone());
        }
        self
    }

    /// Validate every registered product
    pub fn validate(&self) -> Result<()> {
        self.configs
            .iter()
            .try_for_each(|(product, config)| config.validate(product))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_products_valid() {
        let registry = MergeRegistry::builtin();
        registry.validate().unwrap();
        assert_eq!(registry.products().count(), 7);
        assert!(registry.contains("keyword_lab"));
        assert!(registry.contains("ads_object_optimization"));
    }

    #[test]
    fn test_unknown_product() {
        let registry = MergeRegistry::builtin();
        match registry.get("sales_analytics") {
            Err(ExportError::UnknownProduct { product, available }) => {
                assert_eq!(product, "sales_analytics");
                assert!(available.contains(&"keyword_lab".to_string()));
            }
            other => panic!("expected UnknownProduct, got {other:?}"),
        }
    }

    #[test]
    fn test_op_for_defaults_to_first() {
        let registry = MergeRegistry::builtin();
        let config = registry.get("keyword_lab").unwrap();
        assert_eq!(config.op_for("keyword_id"), None);
        assert_eq!(config.op_for("cost"), Some(AggOp::Sum));
        assert_eq!(config.op_for("roas"), Some(AggOp::Mean));
        assert_eq!(config.op_for("peak_day_ads_gmv"), Some(AggOp::Max));
        assert_eq!(config.op_for("keyword_name"), Some(AggOp::First));
    }

    #[test]
    fn test_product_tracking_keys() {
        let registry = MergeRegistry::builtin();
        let config = registry.get("product_tracking").unwrap();
        assert_eq!(config.merge_keys.len(), 7);
        assert_eq!(config.merge_keys[1], "keyword_id");
        assert_eq!(config.op_for("item_sold_l30d"), Some(AggOp::Sum));
    }

    #[test]
    fn test_validate_rejects_key_in_agg() {
        let config = MergeConfig::new(["a"], &[("a", AggOp::Sum)]);
        assert!(config.validate("broken").is_err());
        let config = MergeConfig::new(["a", "a"], &[]);
        assert!(config.validate("broken").is_err());
        let config = MergeConfig::new(Vec::<String>::new(), &[]);
        assert!(config.validate("broken").is_err());
    }

    #[test]
    fn test_overrides_replace_and_add() {
        let mut overrides = BTreeMap::new();
        overrides.insert(
            "keyword_lab".to_string(),
            MergeConfig::new(["keyword_id"], &[("cost", AggOp::Max)]),
        );
        overrides.insert(
            "sales_analytics".to_string(),
            MergeConfig::new(["sku"], &[("revenue", AggOp::Sum)]),
        );

        let registry = MergeRegistry::builtin().with_overrides(&overrides);
        assert_eq!(registry.products().count(), 8);
        assert_eq!(
            registry.get("keyword_lab").unwrap().op_for("cost"),
            Some(AggOp::Max)
        );
    }

    #[test]
    fn test_merge_config_from_toml() {
        let config: MergeConfig = toml::from_str(
            r#"
            merge_keys = ["sku", "month"]
            [agg]
            revenue = "sum"
            price = "mean"
            "#,
        )
        .unwrap();
        assert_eq!(config.merge_keys, vec!["sku", "month"]);
        assert_eq!(config.op_for("price"), Some(AggOp::Mean));
    }
}
