//! Public pricing information

use axum::Json;
use serde::Serialize;

use crate::domain::tier::PricingTier;

#[derive(Debug, Serialize)]
pub struct TierInfo {
    pub tier: PricingTier,
    /// Monthly API call allowance; absent means unlimited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_calls_per_month: Option<u64>,
    pub rate_limit_per_minute: u32,
    /// Active keys per owner; absent means unlimited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_api_keys: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct PricingResponse {
    pub tiers: Vec<TierInfo>,
}

/// GET /v1/pricing - tier table. No authentication required.
pub async fn pricing() -> Json<PricingResponse> {
    let tiers = PricingTier::all()
        .into_iter()
        .map(|tier| TierInfo {
            tier,
            api_calls_per_month: tier.monthly_call_limit(),
            rate_limit_per_minute: tier.rate_limit_per_minute(),
            max_api_keys: tier.max_api_keys(),
        })
        .collect();

    Json(PricingResponse { tiers })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pricing_lists_all_tiers() {
        let Json(response) = pricing().await;

        assert_eq!(response.tiers.len(), 4);
        assert_eq!(response.tiers[0].tier, PricingTier::Free);
        assert_eq!(response.tiers[0].api_calls_per_month, Some(100));
        assert!(response.tiers[3].api_calls_per_month.is_none());
    }
}
