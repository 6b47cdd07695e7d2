//! Canonical cache keys derived from semantic request inputs
//!
//! Inputs are trimmed, lower-cased and sorted before being joined, so
//! `["Egg", "flour"]` and `["flour", "EGG"]` map to the same key.

use crate::cache::types::CacheKey;
use serde::{Deserialize, Serialize};

/// Category tag prefixed to every derived key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    /// Generated recipe text
    Recipe,

    /// Narration script for a recipe or step
    Narration,

    /// Generated image
    Image,

    /// Synthesized speech audio
    Speech,

    /// Custom category
    Custom(String),
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Category::Recipe => write!(f, "recipe"),
            Category::Narration => write!(f, "narration"),
            Category::Image => write!(f, "image"),
            Category::Speech => write!(f, "speech"),
            Category::Custom(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for Category {
    fn from(s: &str) -> Self {
        match s {
            "recipe" => Category::Recipe,
            "narration" => Category::Narration,
            "image" => Category::Image,
            "speech" => Category::Speech,
            other => Category::Custom(other.to_string()),
        }
    }
}

/// Derive the canonical key for `category` over `inputs`
///
/// An empty input list is a valid, if degenerate, key (`"category:"`).
pub fn derive_key<S: AsRef<str>>(category: impl std::fmt::Display, inputs: &[S]) -> CacheKey {
    let mut normalized: Vec<String> = inputs
        .iter()
        .map(|s| s.as_ref().trim().to_lowercase())
        .collect();
    normalized.sort();

    format!("{}:{}", category, normalized.join(","))
}

/// Incremental builder over [`derive_key`]
pub struct CacheKeyBuilder {
    category: Category,
    inputs: Vec<String>,
}

impl CacheKeyBuilder {
    /// Create a new cache key builder
    pub fn new(category: impl Into<Category>) -> Self {
        Self {
            category: category.into(),
            inputs: Vec::new(),
        }
    }

    /// Add one semantic input
    pub fn input(mut self, input: impl Into<String>) -> Self {
        self.inputs.push(input.into());
        self
    }

    /// Add several semantic inputs
    pub fn inputs<I, S>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs.extend(inputs.into_iter().map(Into::into));
        self
    }

    /// Build the cache key
    pub fn build(self) -> CacheKey {
        derive_key(&self.category, self.inputs.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_and_case_insensitive() {
        assert_eq!(
            derive_key("recipe", &["Egg", "flour"]),
            derive_key("recipe", &["flour", "EGG"])
        );
        assert_eq!(derive_key("recipe", &["Egg", "flour"]), "recipe:egg,flour");
    }

    #[test]
    fn test_every_permutation_agrees() {
        let inputs = ["Tomato", "cheese", "BASIL"];
        let expected = derive_key(Category::Recipe, &inputs);

        let permutations = [
            ["cheese", "BASIL", "Tomato"],
            ["basil", "tomato", "Cheese"],
            ["TOMATO", "CHEESE", "basil"],
            ["cheese", "tomato", "basil"],
        ];
        for p in permutations {
            assert_eq!(derive_key(Category::Recipe, &p), expected);
        }
    }

    #[test]
    fn test_surrounding_whitespace_ignored() {
        assert_eq!(
            derive_key("recipe", &[" egg ", "flour"]),
            derive_key("recipe", &["egg", "flour"])
        );
    }

    #[test]
    fn test_empty_inputs_are_valid() {
        let empty: [&str; 0] = [];
        assert_eq!(derive_key("recipe", &empty), "recipe:");
    }

    #[test]
    fn test_category_prefix_separates_keys() {
        assert_ne!(
            derive_key(Category::Recipe, &["egg"]),
            derive_key(Category::Narration, &["egg"])
        );
    }

    #[test]
    fn test_category_round_trip_from_str() {
        assert_eq!(Category::from("speech"), Category::Speech);
        assert_eq!(
            Category::from("sticker"),
            Category::Custom("sticker".to_string())
        );
        assert_eq!(Category::Custom("sticker".to_string()).to_string(), "sticker");
    }

    #[test]
    fn test_builder_matches_derive_key() {
        let key = CacheKeyBuilder::new(Category::Narration)
            .input("Step 2")
            .inputs(["Whisk", "eggs"])
            .build();

        assert_eq!(key, derive_key("narration", &["eggs", "step 2", "whisk"]));
    }
}
