use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a client company (its CNPJ).
///
/// # Examples
///
/// ```
/// use cnpj_insight::core::entity::EntityId;
///
/// let a = EntityId::new("CNPJ_00001");
/// let b = EntityId::new("CNPJ_00002");
/// assert!(a < b);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Economic activity description of a company (`DS_CNAE`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SectorCode(String);

impl SectorCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SectorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A calendar month, the reporting granularity of company snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Month {
    year: i32,
    month: u32,
}

impl Month {
    /// Returns `None` unless `month` is in `1..=12`.
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    /// January of `year`.
    pub const fn first_of_year(year: i32) -> Self {
        Self { year, month: 1 }
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Parse `YYYY-MM-DD` (day ignored) or `YYYY-MM`.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            return Some(Self::from_date(date));
        }
        let (year, month) = s.split_once('-')?;
        Self::new(year.parse().ok()?, month.parse().ok()?)
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// The following calendar month.
    pub fn succ(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// Number of months from `self` to `later` (negative if `later` is earlier).
    pub fn months_until(&self, later: &Month) -> i64 {
        (later.year as i64 - self.year as i64) * 12 + (later.month as i64 - self.month as i64)
    }

    pub fn first_day(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Inclusive range of months covered by a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportingWindow {
    pub first: Month,
    pub last: Month,
}

impl ReportingWindow {
    pub fn new(first: Month, last: Month) -> Self {
        Self { first, last }
    }

    pub fn contains(&self, month: &Month) -> bool {
        *month >= self.first && *month <= self.last
    }

    /// Number of months in the window.
    pub fn len(&self) -> usize {
        (self.first.months_until(&self.last) + 1).max(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for ReportingWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.first, self.last)
    }
}

/// One month of reported figures for a company.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub month: Month,
    pub revenue: Decimal,
    pub balance: Decimal,
}

/// A client company with its monthly series ordered by month.
///
/// Entities are created by the [`EntityStore`](crate::core::store::EntityStore)
/// and never change afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    id: EntityId,
    sector: SectorCode,
    snapshots: Vec<Snapshot>,
}

impl Entity {
    /// Build an entity. Snapshots are sorted by month.
    pub fn new(id: EntityId, sector: SectorCode, mut snapshots: Vec<Snapshot>) -> Self {
        snapshots.sort_by_key(|s| s.month);
        Self {
            id,
            sector,
            snapshots,
        }
    }

    pub fn id(&self) -> &EntityId {
        &self.id
    }

    pub fn sector(&self) -> &SectorCode {
        &self.sector
    }

    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    /// Age in months, counted as the number of reported months.
    pub fn age_months(&self) -> usize {
        self.snapshots.len()
    }

    pub fn revenue_series(&self) -> Vec<Decimal> {
        self.snapshots.iter().map(|s| s.revenue).collect()
    }

    pub fn balance_series(&self) -> Vec<Decimal> {
        self.snapshots.iter().map(|s| s.balance).collect()
    }

    /// Balance of the most recent month.
    pub fn current_balance(&self) -> Option<Decimal> {
        self.snapshots.last().map(|s| s.balance)
    }

    /// Revenue of the most recent month.
    pub fn current_revenue(&self) -> Option<Decimal> {
        self.snapshots.last().map(|s| s.revenue)
    }

    pub fn first_month(&self) -> Option<Month> {
        self.snapshots.first().map(|s| s.month)
    }

    pub fn last_month(&self) -> Option<Month> {
        self.snapshots.last().map(|s| s.month)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_entity_id_ordering() {
        let a = EntityId::new("00001");
        let b = EntityId::new("00002");
        assert!(a < b);
        assert_eq!(format!("{}", a), "00001");
    }

    #[test]
    fn test_month_parse() {
        assert_eq!(Month::parse("2025-01-31"), Month::new(2025, 1));
        assert_eq!(Month::parse("2025-05"), Month::new(2025, 5));
        assert_eq!(Month::parse("2025-13"), None);
        assert_eq!(Month::parse("janeiro"), None);
    }

    #[test]
    fn test_month_succ_wraps_year() {
        let dec_2024 = Month::new(2024, 12).unwrap();
        assert_eq!(dec_2024.succ(), Month::new(2025, 1).unwrap());
        assert_eq!(dec_2024.months_until(&Month::new(2025, 5).unwrap()), 5);
    }

    #[test]
    fn test_window_len() {
        let w = ReportingWindow::new(Month::new(2025, 1).unwrap(), Month::new(2025, 5).unwrap());
        assert_eq!(w.len(), 5);
        assert!(w.contains(&Month::new(2025, 3).unwrap()));
        assert!(!w.contains(&Month::new(2025, 6).unwrap()));
    }

    #[test]
    fn test_entity_sorts_snapshots() {
        let entity = Entity::new(
            EntityId::new("A"),
            SectorCode::new("Varejo"),
            vec![
                Snapshot {
                    month: Month::new(2025, 2).unwrap(),
                    revenue: dec!(10),
                    balance: dec!(5),
                },
                Snapshot {
                    month: Month::new(2025, 1).unwrap(),
                    revenue: dec!(10),
                    balance: dec!(7),
                },
            ],
        );
        assert_eq!(entity.balance_series(), vec![dec!(7), dec!(5)]);
        assert_eq!(entity.current_balance(), Some(dec!(5)));
        assert_eq!(entity.age_months(), 2);
    }
}
