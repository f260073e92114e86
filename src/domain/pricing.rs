//! Occupancy-driven price recommendation.

use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_PRICE: f64 = 100.0;
pub const DEFAULT_OCCUPANCY: f64 = 0.5;
pub const PRICE_CONFIDENCE: f64 = 0.75;

/// Occupancy floors and their multipliers, highest first.
const LADDER: [(f64, f64); 4] = [(0.9, 1.5), (0.7, 1.2), (0.5, 1.0), (0.3, 0.9)];
const FLOOR_MULTIPLIER: f64 = 0.85;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceRecommendation {
    pub recommended_price: f64,
    pub confidence: f64,
}

pub fn occupancy_multiplier(occupancy: f64) -> f64 {
    LADDER
        .iter()
        .find(|(floor, _)| occupancy >= *floor)
        .map_or(FLOOR_MULTIPLIER, |(_, m)| *m)
}

/// Recommends a price; missing inputs take the documented defaults.
pub fn optimize_price(base_price: Option<f64>, occupancy: Option<f64>) -> PriceRecommendation {
    let base = base_price.unwrap_or(DEFAULT_BASE_PRICE);
    let occupancy = occupancy.unwrap_or(DEFAULT_OCCUPANCY);
    let recommendation = PriceRecommendation {
        recommended_price: base * occupancy_multiplier(occupancy),
        confidence: PRICE_CONFIDENCE,
    };
    tracing::debug!(base, occupancy, price = recommendation.recommended_price, "price optimized");
    recommendation
}
