//! Pricing tiers and their usage limits

use serde::{Deserialize, Serialize};

/// Subscription tier attached to an API key at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PricingTier {
    #[default]
    Free,
    Starter,
    Professional,
    Enterprise,
}

impl PricingTier {
    /// Monthly API call limit. `None` means unlimited.
    pub fn monthly_call_limit(&self) -> Option<u64> {
        match self {
            Self::Free => Some(100),
            Self::Starter => Some(1_000),
            Self::Professional => Some(10_000),
            Self::Enterprise => None,
        }
    }

    /// Requests allowed per minute per key.
    pub fn rate_limit_per_minute(&self) -> u32 {
        match self {
            Self::Free => 10,
            Self::Starter => 50,
            Self::Professional => 200,
            Self::Enterprise => 1_000,
        }
    }

    /// Active keys a single owner may hold. `None` means unlimited.
    pub fn max_api_keys(&self) -> Option<u32> {
        match self {
            Self::Free => Some(1),
            Self::Starter => Some(3),
            Self::Professional => Some(10),
            Self::Enterprise => None,
        }
    }

    pub fn all() -> [PricingTier; 4] {
        [
            Self::Free,
            Self::Starter,
            Self::Professional,
            Self::Enterprise,
        ]
    }
}

impl std::fmt::Display for PricingTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Free => write!(f, "free"),
            Self::Starter => write!(f, "starter"),
            Self::Professional => write!(f, "professional"),
            Self::Enterprise => write!(f, "enterprise"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monthly_limits() {
        assert_eq!(PricingTier::Free.monthly_call_limit(), Some(100));
        assert_eq!(PricingTier::Starter.monthly_call_limit(), Some(1_000));
        assert_eq!(PricingTier::Professional.monthly_call_limit(), Some(10_000));
        assert_eq!(PricingTier::Enterprise.monthly_call_limit(), None);
    }

    #[test]
    fn test_rate_limits() {
        assert_eq!(PricingTier::Free.rate_limit_per_minute(), 10);
        assert_eq!(PricingTier::Enterprise.rate_limit_per_minute(), 1_000);
    }

    #[test]
    fn test_key_quotas() {
        assert_eq!(PricingTier::Free.max_api_keys(), Some(1));
        assert_eq!(PricingTier::Starter.max_api_keys(), Some(3));
        assert_eq!(PricingTier::Enterprise.max_api_keys(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(PricingTier::Free.to_string(), "free");
        assert_eq!(PricingTier::Professional.to_string(), "professional");
    }
}
