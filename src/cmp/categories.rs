//! Coarse consent categories and the TCF ids they grant.
//!
//! The mapping is deployment policy. It has to be revisited whenever purpose
//! semantics change upstream; nothing here is derived from the vendor list.

use std::fmt;
use std::str::FromStr;

use crate::tcf::IdSet;

/// Purposes granted no matter what the user selects.
pub const NECESSARY_PURPOSES: &[u16] = &[1];

const ANALYTICS_PURPOSES: &[u16] = &[7, 8, 9, 10];
const MARKETING_PURPOSES: &[u16] = &[2, 3, 4, 5, 6];
const MARKETING_SPECIAL_FEATURES: &[u16] = &[1, 2];

/// A category the consent banner lets the user toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Necessary,
    Analytics,
    Marketing,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Necessary, Category::Analytics, Category::Marketing];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Necessary => "necessary",
            Category::Analytics => "analytics",
            Category::Marketing => "marketing",
        }
    }

    pub fn purposes(self) -> &'static [u16] {
        match self {
            Category::Necessary => NECESSARY_PURPOSES,
            Category::Analytics => ANALYTICS_PURPOSES,
            Category::Marketing => MARKETING_PURPOSES,
        }
    }

    pub fn special_features(self) -> &'static [u16] {
        match self {
            Category::Marketing => MARKETING_SPECIAL_FEATURES,
            _ => &[],
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown consent category {0:?}")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "necessary" => Ok(Category::Necessary),
            "analytics" => Ok(Category::Analytics),
            "marketing" => Ok(Category::Marketing),
            other => Err(UnknownCategory(other.to_string())),
        }
    }
}

/// Purposes granted by `category`; empty for unrecognised identifiers.
pub fn purposes_for(category: &str) -> IdSet {
    category
        .parse::<Category>()
        .map(|c| c.purposes().iter().copied().collect())
        .unwrap_or_default()
}

/// Special features opted into by `category`; empty for unrecognised identifiers.
pub fn special_features_for(category: &str) -> IdSet {
    category
        .parse::<Category>()
        .map(|c| c.special_features().iter().copied().collect())
        .unwrap_or_default()
}
