use serde::Deserialize;
use serde::Serialize;

/// Component of a [Range].
///
/// Can be an interval or an individual value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RangeItem {
    /// Interval (inclusive).
    Interval(f64, f64),
    /// Exact value.
    Value(f64),
}

/// Range of possible values, e.g., the tunable center frequencies of an analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Range {
    items: Vec<RangeItem>,
}

impl Range {
    /// Create a [`Range`] from [`RangeItems`](RangeItem).
    pub fn new(items: Vec<RangeItem>) -> Self {
        Self { items }
    }
    /// Shorthand for a [`Range`] with a single inclusive interval.
    pub fn interval(min: f64, max: f64) -> Self {
        Self::new(vec![RangeItem::Interval(min, max)])
    }
    /// Check if the [`Range`] contains the `value`.
    pub fn contains(&self, value: f64) -> bool {
        self.items.iter().any(|item| match *item {
            RangeItem::Interval(a, b) => a <= value && value <= b,
            RangeItem::Value(v) => (v - value).abs() <= f64::EPSILON,
        })
    }
    /// Returns the value in [`Range`] that is closest to the given `value` or `None`, if the
    /// [`Range`] is empty.
    pub fn closest(&self, value: f64) -> Option<f64> {
        if self.contains(value) {
            return Some(value);
        }
        self.items
            .iter()
            .flat_map(|item| match *item {
                RangeItem::Interval(a, b) => [a, b],
                RangeItem::Value(v) => [v, v],
            })
            .min_by(|a, b| (a - value).abs().total_cmp(&(b - value).abs()))
    }
    /// Smallest and largest value in the [`Range`].
    pub fn bounds(&self) -> Option<(f64, f64)> {
        self.items
            .iter()
            .flat_map(|item| match *item {
                RangeItem::Interval(a, b) => [a, b],
                RangeItem::Value(v) => [v, v],
            })
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }
}

impl std::fmt::Display for Range {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.bounds() {
            Some((lo, hi)) => write!(f, "[{lo}, {hi}]"),
            None => write!(f, "[]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_empty() {
        let r = Range::new(Vec::new());
        assert!(!r.contains(123.0));
        assert_eq!(r.closest(1.0), None);
        assert_eq!(r.bounds(), None);
    }
    #[test]
    fn contains() {
        let r = Range::new(vec![
            RangeItem::Value(123.0),
            RangeItem::Interval(9e3, 6.2e9),
        ]);
        assert!(r.contains(123.0));
        assert!(r.contains(9e3));
        assert!(r.contains(6.2e9));
        assert!(r.contains(2.4e9));
        assert!(!r.contains(1e3));
        assert!(!r.contains(7e9));
    }
    #[test]
    fn closest() {
        let r = Range::new(vec![
            RangeItem::Value(123.0),
            RangeItem::Interval(23.0, 42.0),
        ]);
        assert_eq!(r.closest(122.0), Some(123.0));
        assert_eq!(r.closest(1000.0), Some(123.0));
        assert_eq!(r.closest(30.0), Some(30.0));
        assert_eq!(r.closest(20.0), Some(23.0));
        assert_eq!(r.closest(50.0), Some(42.0));
    }
    #[test]
    fn bounds() {
        let r = Range::new(vec![
            RangeItem::Value(123.0),
            RangeItem::Interval(23.0, 42.0),
        ]);
        assert_eq!(r.bounds(), Some((23.0, 123.0)));
        assert_eq!(Range::interval(-130.0, 30.0).to_string(), "[-130, 30]");
    }
}
