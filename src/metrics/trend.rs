use crate::core::error::InsufficientDataError;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Entities reporting fewer months than this are [`LifecycleStage::Starting`].
pub const YOUNG_AGE_MONTHS: usize = 3;

/// Relative monthly revenue slope above which an entity is growing.
pub const GROWTH_TREND_THRESHOLD: f64 = 0.02;

/// Relative monthly revenue slope below which an entity is declining.
pub const DECLINE_TREND_THRESHOLD: f64 = -0.02;

/// Where a company is in its life, judged by age and revenue trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStage {
    Starting,
    Growing,
    Mature,
    Declining,
}

impl LifecycleStage {
    pub const ALL: [LifecycleStage; 4] = [
        LifecycleStage::Starting,
        LifecycleStage::Growing,
        LifecycleStage::Mature,
        LifecycleStage::Declining,
    ];
}

impl fmt::Display for LifecycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LifecycleStage::Starting => "Starting",
            LifecycleStage::Growing => "Growing",
            LifecycleStage::Mature => "Mature",
            LifecycleStage::Declining => "Declining",
        };
        f.write_str(label)
    }
}

/// Least-squares slope of revenue per month, relative to mean absolute
/// revenue. `0.05` means revenue grows by about 5% of its mean each month.
///
/// ```
/// use cnpj_insight::metrics::trend::revenue_trend;
/// use rust_decimal_macros::dec;
///
/// let flat = [dec!(100), dec!(100), dec!(100)];
/// assert_eq!(revenue_trend(&flat).unwrap(), 0.0);
/// ```
pub fn revenue_trend(revenues: &[Decimal]) -> Result<f64, InsufficientDataError> {
    if revenues.len() < 2 {
        return Err(InsufficientDataError::new(
            "revenue trend",
            2,
            revenues.len(),
        ));
    }
    let ys: Vec<f64> = revenues
        .iter()
        .map(|r| r.to_f64().unwrap_or_default())
        .collect();
    let n = ys.len() as f64;
    let x_mean = (n - 1.0) / 2.0;
    let y_mean = ys.iter().sum::<f64>() / n;

    let (mut num, mut den) = (0.0, 0.0);
    for (x, y) in ys.iter().enumerate() {
        let dx = x as f64 - x_mean;
        num += dx * (y - y_mean);
        den += dx * dx;
    }
    let slope = num / den;

    let scale = ys.iter().map(|y| y.abs()).sum::<f64>() / n;
    if scale == 0.0 {
        return Ok(0.0);
    }
    Ok(slope / scale)
}

/// Classify an entity from its age and revenue trend.
///
/// Young entities are [`LifecycleStage::Starting`] regardless of trend;
/// older ones need a trend to be classified.
pub fn lifecycle_stage(
    age_months: usize,
    revenue_trend: Option<f64>,
) -> Result<LifecycleStage, InsufficientDataError> {
    if age_months < YOUNG_AGE_MONTHS {
        return Ok(LifecycleStage::Starting);
    }
    let trend = revenue_trend
        .ok_or_else(|| InsufficientDataError::new("lifecycle stage", 2, age_months))?;
    Ok(if trend > GROWTH_TREND_THRESHOLD {
        LifecycleStage::Growing
    } else if trend < DECLINE_TREND_THRESHOLD {
        LifecycleStage::Declining
    } else {
        LifecycleStage::Mature
    })
}
