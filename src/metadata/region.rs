use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::error::CatalogError;
use crate::fallback::FallbackAttempt;

/// Language/location hint for one metadata lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RegionDescriptor {
    /// Provider defaults, no hint sent
    Default,
    Locale { language: String, location: String },
}

impl RegionDescriptor {
    pub fn locale(language: impl Into<String>, location: impl Into<String>) -> Self {
        Self::Locale {
            language: language.into(),
            location: location.into(),
        }
    }
}

impl fmt::Display for RegionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("default"),
            Self::Locale { language, location } => write!(f, "{language}-{location}"),
        }
    }
}

impl FromStr for RegionDescriptor {
    type Err = CatalogError;

    /// Accepts `en-US`, `en_US` or `default`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("default") {
            return Ok(Self::Default);
        }

        let (language, location) = trimmed
            .split_once(['-', '_'])
            .ok_or_else(|| CatalogError::Invalid(trimmed.to_string()))?;

        let valid = |part: &str, len: std::ops::RangeInclusive<usize>| {
            len.contains(&part.len()) && part.chars().all(|c| c.is_ascii_alphabetic())
        };
        if !valid(language, 2..=3) || !valid(location, 2..=2) {
            return Err(CatalogError::Invalid(trimmed.to_string()));
        }

        Ok(Self::locale(
            language.to_ascii_lowercase(),
            location.to_ascii_uppercase(),
        ))
    }
}

impl Serialize for RegionDescriptor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RegionDescriptor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl FallbackAttempt for RegionDescriptor {
    fn label(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }
}

/// Ordered regions to try for every metadata lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionFallbackDirectory {
    regions: Vec<RegionDescriptor>,
}

impl RegionFallbackDirectory {
    pub fn new(regions: Vec<RegionDescriptor>) -> Result<Self, CatalogError> {
        if regions.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut seen = HashSet::new();
        for region in &regions {
            if !seen.insert(region) {
                return Err(CatalogError::Duplicate(region.to_string()));
            }
        }

        Ok(Self { regions })
    }

    /// Parses a comma-separated list such as `en-US,fr-FR,default`.
    pub fn parse(list: &str) -> Result<Self, CatalogError> {
        let regions = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse::<RegionDescriptor>)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(regions)
    }

    pub fn regions(&self) -> &[RegionDescriptor] {
        &self.regions
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

impl Default for RegionFallbackDirectory {
    fn default() -> Self {
        Self {
            regions: vec![
                RegionDescriptor::locale("en", "US"),
                RegionDescriptor::locale("en", "GB"),
                RegionDescriptor::locale("fr", "FR"),
                RegionDescriptor::locale("en", "CA"),
                RegionDescriptor::locale("en", "AU"),
                RegionDescriptor::locale("pt", "BR"),
                RegionDescriptor::Default,
            ],
        }
    }
}
