use super::{Period, TradeFlow};
use serde::{Deserialize, Serialize};

/// Number of leading characters of a fine product id that form its HS4 code.
pub const COARSE_CODE_LEN: usize = 4;

/// One bilateral trade observation.
///
/// Before aggregation `product_code` holds the fine product id; afterwards it
/// holds the 4-character coarse code and the row is unique per
/// (period, flow, reporter, partner, product).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub period: Period,
    pub flow: TradeFlow,
    pub reporter_id: String,
    pub country_id: String,
    pub country_name: Option<String>,
    pub product_code: String,
    pub trade_value: f64,
    pub quantity: Option<f64>,
    pub product_name: Option<String>,
}

impl TradeRecord {
    pub fn coarse_code(&self) -> &str {
        coarse_product_code(&self.product_code)
    }
}

/// Leading four characters of a product id, or the whole id when shorter.
pub fn coarse_product_code(fine: &str) -> &str {
    match fine.char_indices().nth(COARSE_CODE_LEN) {
        Some((idx, _)) => &fine[..idx],
        None => fine,
    }
}
