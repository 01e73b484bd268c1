//! Label to point value mapping
//!
//! Matches a classifier label against ordered keyword groups using
//! case-insensitive substring search. The first matching group wins, so
//! table order is the priority order. Unmatched labels score 0.

use crate::infra::config::CategoryConfig;
use smallvec::SmallVec;

/// A reward category with its keywords pre-lowercased
#[derive(Debug, Clone)]
pub struct RewardCategory {
    name: String,
    /// Most categories carry one term plus one localized synonym
    keywords: SmallVec<[String; 2]>,
    points: u32,
}

impl RewardCategory {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn points(&self) -> u32 {
        self.points
    }

    #[inline]
    fn matches(&self, lowered_label: &str) -> bool {
        self.keywords.iter().any(|k| lowered_label.contains(k.as_str()))
    }
}

impl From<&CategoryConfig> for RewardCategory {
    fn from(config: &CategoryConfig) -> Self {
        Self {
            name: config.name.clone(),
            keywords: config
                .keywords
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
            points: config.points,
        }
    }
}

/// Pure lookup from observed label to reward points
#[derive(Debug, Clone)]
pub struct RewardClassifier {
    categories: Vec<RewardCategory>,
}

impl RewardClassifier {
    pub fn new(categories: &[CategoryConfig]) -> Self {
        Self { categories: categories.iter().map(RewardCategory::from).collect() }
    }

    /// First category whose keywords occur in `label`
    pub fn category_of(&self, label: &str) -> Option<&RewardCategory> {
        let lowered = label.to_lowercase();
        self.categories.iter().find(|c| c.matches(&lowered))
    }

    /// Points for `label`, 0 when no category matches
    pub fn value_of(&self, label: &str) -> u32 {
        self.category_of(label).map_or(0, RewardCategory::points)
    }
}
