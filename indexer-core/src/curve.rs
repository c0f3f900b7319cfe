// Cubic Bézier bonding curve.
//
// B(t) = (1-t)^3 P0 + 3(1-t)^2 t P1 + 3(1-t) t^2 P2 + t^3 P3
//
// Quotes use 18-decimal fixed point and quantize t down to the start of the
// current 1% supply step, the same way the contract prices a step. Display
// helpers (min/max, total ETH) evaluate the smooth curve in f64.

use crate::fixed_point::{self, MathError, ONE};
use crate::models::{CurveSample, PricePoints};
use alloy_primitives::{utils::format_ether, U256};
use serde::Serialize;
use tracing::warn;

/// Number of price steps in the sale phase. Each step is 1% of sale supply.
pub const STEPS: u64 = 100;

/// Width of one step in progress units (ONE / 100).
pub const STEP_PROGRESS: U256 = U256::from_limbs([10_000_000_000_000_000, 0, 0, 0]);

const SCAN_RESOLUTION: u32 = 100;

fn bezier(points_wei: &[U256; 4], t: U256) -> Result<U256, MathError> {
    let three = U256::from(3u64);

    let one_minus_t = fixed_point::sub(ONE, t)?;
    let one_minus_t2 = fixed_point::mul(one_minus_t, one_minus_t)?;
    let one_minus_t3 = fixed_point::mul(one_minus_t2, one_minus_t)?;
    let t2 = fixed_point::mul(t, t)?;
    let t3 = fixed_point::mul(t2, t)?;

    let term1 = fixed_point::mul(one_minus_t3, points_wei[0])?;
    let term2 = fixed_point::mul3(one_minus_t2, t, points_wei[1] * three)?;
    let term3 = fixed_point::mul3(one_minus_t, t2, points_wei[2] * three)?;
    let term4 = fixed_point::mul(t3, points_wei[3])?;

    let sum = fixed_point::add(term1, term2)?;
    let sum = fixed_point::add(sum, term3)?;
    fixed_point::add(sum, term4)
}

fn bezier_f64(points: &[f64; 4], t: f64) -> f64 {
    let one_minus_t = 1.0 - t;
    let t2 = t * t;
    let t3 = t2 * t;
    let one_minus_t2 = one_minus_t * one_minus_t;
    let one_minus_t3 = one_minus_t2 * one_minus_t;

    one_minus_t3 * points[0]
        + 3.0 * one_minus_t2 * t * points[1]
        + 3.0 * one_minus_t * t2 * points[2]
        + t3 * points[3]
}

fn to_f64(v: U256) -> f64 {
    v.to_string().parse().unwrap_or_default()
}

/// Floors `progress` to the start of its 1% step.
pub fn quantize_progress(progress: U256) -> U256 {
    progress / STEP_PROGRESS * STEP_PROGRESS
}

/// Strict form of [`price_at_progress`]. Progress above `ONE` is clamped to `ONE`.
pub fn try_price_at_progress(points: &PricePoints, progress: U256) -> Result<U256, MathError> {
    let t = quantize_progress(progress.min(ONE));
    bezier(&points.to_wei(), t)
}

/// Spot price in wei for a token whose sale is `progress` (fixed point, ONE = 100%) complete.
///
/// Missing price points or an arithmetic failure yield zero.
pub fn price_at_progress(points: Option<&PricePoints>, progress: U256) -> U256 {
    let Some(points) = points else {
        warn!("price requested without price points, returning zero");
        return U256::ZERO;
    };

    try_price_at_progress(points, progress).unwrap_or_else(|err| {
        warn!("price calculation failed for progress {progress}: {err}");
        U256::ZERO
    })
}

/// Samples the smooth curve at `num_steps + 1` evenly spaced points for drawing.
///
/// Unlike [`price_at_progress`], `t` is not quantized. A sample is flagged as a
/// step boundary when its index falls on a 1% mark.
pub fn sample_curve(points: &PricePoints, num_steps: u32) -> Vec<CurveSample> {
    if num_steps == 0 {
        return Vec::new();
    }

    let points_wei = points.to_wei();
    let denom = U256::from(num_steps);

    (0..=num_steps)
        .map(|step| {
            let t = ONE * U256::from(step) / denom;
            CurveSample {
                progress_fraction: f64::from(step) / f64::from(num_steps),
                price_wei: bezier(&points_wei, t).unwrap_or(U256::ZERO),
                // step / num_steps is a whole percent
                is_step_boundary: (u64::from(step) * STEPS) % u64::from(num_steps) == 0,
            }
        })
        .collect()
}

fn scan_prices(points: &PricePoints) -> impl Iterator<Item = f64> {
    let wei = points.to_wei().map(to_f64);
    (0..=SCAN_RESOLUTION).map(move |i| bezier_f64(&wei, f64::from(i) / f64::from(SCAN_RESOLUTION)))
}

/// Lowest price in wei over a 1% scan of the curve. For chart scaling only.
pub fn min_price(points: &PricePoints) -> f64 {
    scan_prices(points).fold(f64::INFINITY, f64::min)
}

/// Highest price in wei over a 1% scan of the curve. For chart scaling only.
pub fn max_price(points: &PricePoints) -> f64 {
    scan_prices(points).fold(f64::NEG_INFINITY, f64::max)
}

/// ETH needed to buy out the sale half of `supply`, as a string with ten decimals.
///
/// Left-endpoint rectangle rule over 100 steps on the raw control points.
pub fn total_eth_for_supply(points: &PricePoints, supply: U256) -> String {
    let raw = points.as_f64();
    let step_size = (to_f64(supply) / 2.0) / STEPS as f64;

    let mut total_eth = 0.0;
    for i in 0..STEPS {
        let t = i as f64 / STEPS as f64;
        let price_in_wei = bezier_f64(&raw, t);
        total_eth += (price_in_wei * 1e-18) * step_size;
    }
    // Unexplained extra scale-down kept as-is; see DESIGN.md.
    total_eth /= 1_000_000_000.0;

    format!("{total_eth:.10}")
}

/// Tokens per 1% step: `floor(floor(max_supply / 2) / 100)`.
pub fn step_size(max_supply: U256) -> Result<U256, MathError> {
    let size = max_supply / U256::from(2u64) / U256::from(STEPS);
    if size.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    Ok(size)
}

/// Zero-based index of the step `total_supply` is in, offset by one as the
/// contract reports it (`-1` before the first boundary).
pub fn current_step(total_supply: U256, max_supply: U256) -> Result<i64, MathError> {
    let completed = total_supply / step_size(max_supply)?;
    let completed = i64::try_from(completed).map_err(|_| MathError::Overflow)?;
    Ok(completed - 1)
}

pub fn step_start_supply(total_supply: U256, max_supply: U256) -> Result<U256, MathError> {
    let size = step_size(max_supply)?;
    Ok(total_supply / size * size)
}

pub fn available_in_current_step(total_supply: U256, max_supply: U256) -> Result<U256, MathError> {
    let size = step_size(max_supply)?;
    let next = fixed_point::add(step_start_supply(total_supply, max_supply)?, size)?;
    fixed_point::sub(next, total_supply)
}

/// Strict form of [`token_progress`].
pub fn try_token_progress(total_supply: U256, max_supply: U256) -> Result<U256, MathError> {
    let sale_supply = max_supply / U256::from(2u64);
    fixed_point::div(total_supply, sale_supply)
}

/// Fraction of sale supply minted, ONE = 100%. Zero when it cannot be computed.
pub fn token_progress(total_supply: U256, max_supply: U256) -> U256 {
    try_token_progress(total_supply, max_supply).unwrap_or_else(|err| {
        warn!("progress calculation failed for max supply {max_supply}: {err}");
        U256::ZERO
    })
}

pub fn format_price(price_wei: U256) -> String {
    format!("{} ETH", format_ether(price_wei))
}

/// Lifecycle of a launched token, derived from its progress.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum TokenStatus {
    Inactive,
    BondingActive { progress_percent: f64 },
    BondingComplete,
    MarketDeployed,
    UnknownStatus { progress_percent: f64 },
}

impl TokenStatus {
    pub fn label(&self) -> &'static str {
        match self {
            TokenStatus::Inactive => "Inactive",
            TokenStatus::BondingActive { .. } => "Bonding Curve Active",
            TokenStatus::BondingComplete => "Bonding Complete - Awaiting Uniswap",
            TokenStatus::MarketDeployed => "Uniswap Market Deployed",
            TokenStatus::UnknownStatus { .. } => "Unknown Status",
        }
    }

    pub fn progress_label(&self) -> Option<String> {
        match self {
            TokenStatus::Inactive => None,
            TokenStatus::BondingActive { progress_percent } => Some(format!("{progress_percent:.8}%")),
            TokenStatus::BondingComplete => Some("100%".to_string()),
            TokenStatus::MarketDeployed => Some("200%".to_string()),
            TokenStatus::UnknownStatus { progress_percent } => Some(format!("{progress_percent:.1}%")),
        }
    }
}

pub fn token_status(progress: Option<U256>) -> TokenStatus {
    let Some(progress) = progress else {
        return TokenStatus::Inactive;
    };

    let progress_percent = to_f64(progress) / 1e18 * 100.0;
    if progress < ONE {
        TokenStatus::BondingActive { progress_percent }
    } else if progress == ONE {
        TokenStatus::BondingComplete
    } else if progress == ONE * U256::from(2u64) {
        TokenStatus::MarketDeployed
    } else {
        TokenStatus::UnknownStatus { progress_percent }
    }
}
