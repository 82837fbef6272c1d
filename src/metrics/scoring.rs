//! Composite scores built from the primary metrics.
//!
//! All weights and tier thresholds are named constants so the scores can
//! be audited and tested.

use crate::metrics::concentration::Concentration;
use crate::metrics::liquidity::{runway, Runway};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

// --- Health score ---

pub const HEALTH_WEIGHT_BURN: f64 = 0.30;
pub const HEALTH_WEIGHT_RUNWAY: f64 = 0.25;
pub const HEALTH_WEIGHT_CONCENTRATION: f64 = 0.20;
pub const HEALTH_WEIGHT_REVENUE_TREND: f64 = 0.25;

/// Runway at or beyond this horizon earns the full runway component.
pub const RUNWAY_HORIZON_MONTHS: u64 = 12;
/// Points per unit of burn relative to mean balance.
pub const BURN_SENSITIVITY: f64 = 50.0;
/// Points per unit of relative revenue slope.
pub const REVENUE_TREND_SENSITIVITY: f64 = 500.0;

pub const HEALTH_HIGH_THRESHOLD: f64 = 80.0;
pub const HEALTH_MEDIUM_THRESHOLD: f64 = 60.0;

/// Inputs of the health score, all already computed for the entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthInputs {
    pub burn_rate: Decimal,
    pub mean_abs_balance: Decimal,
    pub runway: Runway,
    pub hhi: f64,
    pub revenue_trend: f64,
}

/// Weighted health score in `[0, 100]`.
pub fn health_score(inputs: &HealthInputs) -> f64 {
    let score = HEALTH_WEIGHT_BURN * burn_component(inputs.burn_rate, inputs.mean_abs_balance)
        + HEALTH_WEIGHT_RUNWAY * runway_component(inputs.runway)
        + HEALTH_WEIGHT_CONCENTRATION * concentration_component(inputs.hhi)
        + HEALTH_WEIGHT_REVENUE_TREND * revenue_trend_component(inputs.revenue_trend);
    clamp_points(score)
}

/// 50 for a flat balance; 0 when a whole mean balance is burned per month.
pub fn burn_component(burn_rate: Decimal, mean_abs_balance: Decimal) -> f64 {
    if mean_abs_balance.is_zero() {
        return 50.0;
    }
    // A quotient beyond the decimal range pins the component to its bound.
    let ratio = burn_rate
        .checked_div(mean_abs_balance)
        .and_then(|r| r.to_f64())
        .unwrap_or(if burn_rate.is_sign_negative() {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        });
    clamp_points(50.0 + BURN_SENSITIVITY * ratio)
}

pub fn runway_component(runway: Runway) -> f64 {
    match runway {
        Runway::Infinite => 100.0,
        Runway::Months(m) => {
            m.min(RUNWAY_HORIZON_MONTHS) as f64 / RUNWAY_HORIZON_MONTHS as f64 * 100.0
        }
    }
}

/// Higher concentration lowers the score.
pub fn concentration_component(hhi: f64) -> f64 {
    clamp_points((1.0 - hhi) * 100.0)
}

pub fn revenue_trend_component(trend: f64) -> f64 {
    clamp_points(50.0 + REVENUE_TREND_SENSITIVITY * trend)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthBand {
    High,
    Medium,
    Low,
}

impl HealthBand {
    pub fn from_score(score: f64) -> Self {
        if score >= HEALTH_HIGH_THRESHOLD {
            HealthBand::High
        } else if score >= HEALTH_MEDIUM_THRESHOLD {
            HealthBand::Medium
        } else {
            HealthBand::Low
        }
    }
}

impl fmt::Display for HealthBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthBand::High => f.write_str("high"),
            HealthBand::Medium => f.write_str("medium"),
            HealthBand::Low => f.write_str("low"),
        }
    }
}

// --- Dependency risk ---

pub const DEPENDENCY_WEIGHT_CONCENTRATION: f64 = 0.5;
pub const DEPENDENCY_WEIGHT_PARTNERS: f64 = 0.3;
pub const DEPENDENCY_WEIGHT_VOLUME: f64 = 0.2;
/// Risk points removed per distinct counterparty.
pub const DEPENDENCY_POINTS_PER_PARTNER: f64 = 3.0;
/// Volume that removes one risk point.
pub const DEPENDENCY_VOLUME_PER_POINT: f64 = 100_000.0;

pub const DEPENDENCY_HIGH_THRESHOLD: f64 = 70.0;
pub const DEPENDENCY_MEDIUM_THRESHOLD: f64 = 40.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    High,
    Medium,
    Low,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::High => f.write_str("high"),
            RiskLevel::Medium => f.write_str("medium"),
            RiskLevel::Low => f.write_str("low"),
        }
    }
}

/// How dependent an entity is on few counterparties, 0 (none) to 100.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DependencyRisk {
    pub score: f64,
    pub level: RiskLevel,
}

/// Dependency risk, or `None` for an entity without transactions.
pub fn dependency_risk(concentration: &Concentration) -> Option<DependencyRisk> {
    if concentration.transactions == 0 {
        return None;
    }
    let hhi_points = concentration.directional_mean() * 100.0;
    let partner_points = clamp_points(
        100.0 - concentration.counterparties as f64 * DEPENDENCY_POINTS_PER_PARTNER,
    );
    let volume = concentration.volume.to_f64().unwrap_or_default();
    let volume_points = clamp_points(100.0 - volume / DEPENDENCY_VOLUME_PER_POINT);

    let score = clamp_points(
        DEPENDENCY_WEIGHT_CONCENTRATION * hhi_points
            + DEPENDENCY_WEIGHT_PARTNERS * partner_points
            + DEPENDENCY_WEIGHT_VOLUME * volume_points,
    );
    let level = if score >= DEPENDENCY_HIGH_THRESHOLD {
        RiskLevel::High
    } else if score >= DEPENDENCY_MEDIUM_THRESHOLD {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    };
    Some(DependencyRisk { score, level })
}

// --- Credit score ---

/// Runway tiers (months strictly above) for the liquidity dimension.
pub const CREDIT_RUNWAY_TIERS: [(u64, u8); 3] = [(12, 20), (6, 15), (3, 10)];
/// (counterparties strictly above, HHI strictly below, points).
pub const CREDIT_RELATIONSHIP_TIERS: [(usize, f64, u8); 3] =
    [(20, 0.3, 20), (15, 0.5, 15), (10, 0.7, 10)];
pub const CREDIT_MIN_PARTNERS: usize = 5;
/// Balance CV strictly below, for a rising balance.
pub const CREDIT_TREND_CV_TIERS: [(f64, u8); 2] = [(0.2, 20), (0.4, 15)];
/// (volume strictly above, minimum age in months, points).
pub const CREDIT_ACTIVITY_TIERS: [(Decimal, usize, u8); 3] = [
    (dec!(1_000_000), 4, 20),
    (dec!(500_000), 3, 15),
    (dec!(100_000), 2, 10),
];
/// (monthly outflow below this share of balance, CV strictly below, points).
pub const CREDIT_RISK_TIERS: [(Decimal, f64, u8); 3] = [
    (dec!(0.1), 0.3, 20),
    (dec!(0.2), 0.5, 15),
    (dec!(0.3), f64::INFINITY, 10),
];
/// Points for a rising but volatile balance.
pub const CREDIT_RISING_BALANCE_POINTS: u8 = 10;
/// A balance drop within this share of the current balance still earns base points.
pub const CREDIT_TOLERATED_DROP_SHARE: Decimal = dec!(0.1);
/// Floor for dimensions met only at the lowest tier.
pub const CREDIT_BASE_POINTS: u8 = 5;

/// Inputs of the credit score.
///
/// `outflow` is the mean size of the falling months (see
/// [`mean_outflow`](crate::metrics::liquidity::mean_outflow)), so a volatile
/// balance is judged by its drops and not by its net drift.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CreditInputs {
    pub current_balance: Decimal,
    pub outflow: Decimal,
    pub balance_variation: Decimal,
    pub balance_cv: f64,
    pub counterparties: usize,
    pub directional_hhi: f64,
    pub volume: Decimal,
    pub age_months: usize,
}

/// Credit attractiveness in five dimensions of up to 20 points each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditScore {
    pub liquidity: u8,
    pub relationships: u8,
    pub trend: u8,
    pub activity: u8,
    pub risk: u8,
}

impl CreditScore {
    /// Sum of the dimensions, 0 to 100.
    pub fn total(&self) -> u8 {
        self.liquidity + self.relationships + self.trend + self.activity + self.risk
    }
}

impl fmt::Display for CreditScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/100 (liquidity {}, relationships {}, trend {}, activity {}, risk {})",
            self.total(),
            self.liquidity,
            self.relationships,
            self.trend,
            self.activity,
            self.risk
        )
    }
}

pub fn credit_score(inputs: &CreditInputs) -> CreditScore {
    let solvent = inputs.current_balance > Decimal::ZERO;

    let outflow = inputs.outflow.abs();
    let liquidity = if !solvent {
        0
    } else {
        let months = runway(inputs.current_balance, -outflow);
        CREDIT_RUNWAY_TIERS
            .iter()
            .find(|(threshold, _)| months.exceeds(*threshold))
            .map(|(_, points)| *points)
            .unwrap_or(CREDIT_BASE_POINTS)
    };

    let relationships = CREDIT_RELATIONSHIP_TIERS
        .iter()
        .find(|(partners, hhi, _)| {
            inputs.counterparties > *partners && inputs.directional_hhi < *hhi
        })
        .map(|(_, _, points)| *points)
        .unwrap_or(if inputs.counterparties > CREDIT_MIN_PARTNERS {
            CREDIT_BASE_POINTS
        } else {
            0
        });

    let trend = if inputs.balance_variation > Decimal::ZERO {
        CREDIT_TREND_CV_TIERS
            .iter()
            .find(|(cv, _)| inputs.balance_cv < *cv)
            .map(|(_, points)| *points)
            .unwrap_or(CREDIT_RISING_BALANCE_POINTS)
    } else if inputs.balance_variation > -(inputs.current_balance * CREDIT_TOLERATED_DROP_SHARE) {
        CREDIT_BASE_POINTS
    } else {
        0
    };

    let activity = CREDIT_ACTIVITY_TIERS
        .iter()
        .find(|(volume, age, _)| inputs.volume > *volume && inputs.age_months >= *age)
        .map(|(_, _, points)| *points)
        .unwrap_or(if inputs.volume > Decimal::ZERO {
            CREDIT_BASE_POINTS
        } else {
            0
        });

    let risk = if !solvent {
        0
    } else {
        CREDIT_RISK_TIERS
            .iter()
            .find(|(share, cv, _)| {
                outflow < inputs.current_balance * *share && inputs.balance_cv < *cv
            })
            .map(|(_, _, points)| *points)
            .unwrap_or(CREDIT_BASE_POINTS)
    };

    CreditScore {
        liquidity,
        relationships,
        trend,
        activity,
        risk,
    }
}

fn clamp_points(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 100.0)
}
