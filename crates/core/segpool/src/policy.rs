//! Gap selection policies.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::gap_index::GapIndex;
use crate::segment::{SegmentId, SegmentList};

/// How a pool picks the gap that serves an allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AllocPolicy {
    /// The lowest-addressed gap that is large enough.
    FirstFit,
    /// The smallest gap that is large enough; lowest address among ties.
    BestFit,
}

impl AllocPolicy {
    /// Picks a gap of at least `size` bytes, or `None` if none fits.
    pub(crate) fn select(
        self,
        segments: &SegmentList,
        gaps: &GapIndex,
        size: usize,
    ) -> Option<SegmentId> {
        match self {
            Self::FirstFit => segments
                .iter()
                .find(|(_, seg)| seg.is_gap() && seg.size >= size)
                .map(|(id, _)| id),
            Self::BestFit => gaps.best_fit(size),
        }
    }

    /// Returns the kebab-case name used in configs and scripts.
    pub const fn name(self) -> &'static str {
        match self {
            Self::FirstFit => "first-fit",
            Self::BestFit => "best-fit",
        }
    }
}

impl fmt::Display for AllocPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when parsing an unknown policy name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown allocation policy `{0}` (expected `first-fit` or `best-fit`)")]
pub struct ParsePolicyError(String);

impl FromStr for AllocPolicy {
    type Err = ParsePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first-fit" | "first_fit" | "FIRST_FIT" => Ok(Self::FirstFit),
            "best-fit" | "best_fit" | "BEST_FIT" => Ok(Self::BestFit),
            other => Err(ParsePolicyError(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_names() {
        for policy in [AllocPolicy::FirstFit, AllocPolicy::BestFit] {
            assert_eq!(policy.name().parse::<AllocPolicy>(), Ok(policy));
        }
        assert_eq!("BEST_FIT".parse::<AllocPolicy>(), Ok(AllocPolicy::BestFit));
        let err = "worst-fit".parse::<AllocPolicy>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "unknown allocation policy `worst-fit` (expected `first-fit` or `best-fit`)"
        );
    }
}
