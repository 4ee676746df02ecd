//! Variant indices, variant selections, and pipeline execution modes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Number of candidate sub-images in one generation grid.
pub const VARIANT_COUNT: u8 = 4;

/// One of the four grid positions (1 = top-left ... 4 = bottom-right).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct VariantIndex(u8);

impl VariantIndex {
    pub fn get(self) -> u8 {
        self.0
    }

    /// All four indices in ascending order.
    pub fn all() -> [VariantIndex; VARIANT_COUNT as usize] {
        [VariantIndex(1), VariantIndex(2), VariantIndex(3), VariantIndex(4)]
    }
}

impl TryFrom<u8> for VariantIndex {
    type Error = CoreError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if (1..=VARIANT_COUNT).contains(&value) {
            Ok(Self(value))
        } else {
            Err(CoreError::Validation(format!(
                "Variant index must be between 1 and {VARIANT_COUNT}, got {value}"
            )))
        }
    }
}

impl TryFrom<i64> for VariantIndex {
    type Error = CoreError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .map_err(|_| {
                CoreError::Validation(format!(
                    "Variant index must be between 1 and {VARIANT_COUNT}, got {value}"
                ))
            })
            .and_then(VariantIndex::try_from)
    }
}

impl From<VariantIndex> for u8 {
    fn from(value: VariantIndex) -> Self {
        value.0
    }
}

impl fmt::Display for VariantIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A deduplicated, ascending set of variants to upscale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantSelection(Vec<VariantIndex>);

impl VariantSelection {
    pub fn none() -> Self {
        Self(Vec::new())
    }

    pub fn all() -> Self {
        Self(VariantIndex::all().to_vec())
    }

    /// Validate raw indices, dropping duplicates and sorting ascending.
    pub fn from_raw(raw: &[u8]) -> Result<Self, CoreError> {
        let mut indices = raw
            .iter()
            .map(|&i| VariantIndex::try_from(i))
            .collect::<Result<Vec<_>, _>>()?;
        indices.sort();
        indices.dedup();
        Ok(Self(indices))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = VariantIndex> + '_ {
        self.0.iter().copied()
    }
}

impl FromStr for VariantSelection {
    type Err = CoreError;

    /// Parse `"all"`, `"none"`, or a comma-separated list such as `"1,3"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "all" => Ok(Self::all()),
            "" | "none" => Ok(Self::none()),
            list => {
                let raw = list
                    .split(',')
                    .map(|p| {
                        p.trim().parse::<u8>().map_err(|_| {
                            CoreError::Validation(format!("'{}' is not a variant index", p.trim()))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Self::from_raw(&raw)
            }
        }
    }
}

/// How the pipeline schedules per-variant upscales.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Sequential,
    Concurrent,
}

impl FromStr for ExecutionMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" => Ok(ExecutionMode::Sequential),
            "concurrent" | "parallel" => Ok(ExecutionMode::Concurrent),
            other => Err(CoreError::Validation(format!(
                "Unknown execution mode '{other}'. Must be one of: sequential, concurrent"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn index_bounds() {
        assert!(VariantIndex::try_from(1u8).is_ok());
        assert!(VariantIndex::try_from(4u8).is_ok());
        assert_matches!(VariantIndex::try_from(0u8), Err(CoreError::Validation(_)));
        assert_matches!(VariantIndex::try_from(5u8), Err(CoreError::Validation(_)));
        assert_matches!(VariantIndex::try_from(-1i64), Err(CoreError::Validation(_)));
    }

    #[test]
    fn selection_sorts_and_dedups() {
        let sel = VariantSelection::from_raw(&[3, 1, 3, 2]).unwrap();
        let got: Vec<u8> = sel.iter().map(VariantIndex::get).collect();
        assert_eq!(got, vec![1, 2, 3]);
    }

    #[test]
    fn selection_parses_keywords_and_lists() {
        assert_eq!("all".parse::<VariantSelection>().unwrap().len(), 4);
        assert!("none".parse::<VariantSelection>().unwrap().is_empty());
        assert_eq!("2, 4".parse::<VariantSelection>().unwrap().len(), 2);
        assert!("1,x".parse::<VariantSelection>().is_err());
        assert!("1,9".parse::<VariantSelection>().is_err());
    }

    #[test]
    fn index_deserialization_is_validated() {
        assert!(serde_json::from_str::<VariantIndex>("7").is_err());
        assert_eq!(serde_json::from_str::<VariantIndex>("2").unwrap().get(), 2);
    }

    #[test]
    fn mode_parsing() {
        assert_eq!("Concurrent".parse::<ExecutionMode>().unwrap(), ExecutionMode::Concurrent);
        assert_eq!("sequential".parse::<ExecutionMode>().unwrap(), ExecutionMode::Sequential);
        assert!("batch".parse::<ExecutionMode>().is_err());
    }
}
