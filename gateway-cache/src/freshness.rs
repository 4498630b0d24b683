//! Freshness contracts for cache reads (SPEC_FULL §11 "force-refresh bypass").

/// Staleness tolerance a caller signs up for when reading from the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Freshness {
    /// Accept cached data if its TTL has not expired; the default path used
    /// by every tool-surface read.
    #[default]
    BestEffort,
    /// Force a miss regardless of remaining TTL, e.g.
    /// `check_certifications(force_refresh=true)`.
    Consistent,
}

impl Freshness {
    pub fn from_force_refresh(force_refresh: bool) -> Self {
        if force_refresh {
            Self::Consistent
        } else {
            Self::BestEffort
        }
    }
}
