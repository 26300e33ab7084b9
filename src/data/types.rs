use serde::{Deserialize, Serialize};

/// One recorded trade on a market, as returned by the Manifold bets API.
/// Immutable once fetched; owned by the fetch cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bet {
    pub id: String,
    /// Epoch milliseconds.
    pub created_time: i64,
    pub prob_before: f64,
    pub prob_after: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketMetadata {
    pub question: String,
    #[serde(default)]
    pub url: String,
}

/// A point on the probability chart: x is epoch ms, y is a percentage 0-100.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub x: i64,
    pub y: f64,
}

/// Map bets onto chart points and sort ascending by time.
pub fn bets_to_series(bets: &[Bet]) -> Vec<SeriesPoint> {
    let mut points: Vec<SeriesPoint> = bets
        .iter()
        .map(|bet| SeriesPoint {
            x: bet.created_time,
            y: bet.prob_after * 100.0,
        })
        .collect();
    points.sort_by_key(|p| p.x);
    points
}

/// Quick-filter options for the visible time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRange {
    Day,
    Week,
    Month,
    All,
}

impl TimeRange {
    /// Window width in milliseconds; `None` means unbounded.
    pub fn window_ms(&self) -> Option<i64> {
        match self {
            TimeRange::Day => Some(86_400_000),
            TimeRange::Week => Some(604_800_000),
            TimeRange::Month => Some(2_592_000_000),
            TimeRange::All => None,
        }
    }

    pub fn parse(s: &str) -> Option<TimeRange> {
        match s {
            "1D" => Some(TimeRange::Day),
            "1W" => Some(TimeRange::Week),
            "1M" => Some(TimeRange::Month),
            "all" => Some(TimeRange::All),
            _ => None,
        }
    }

    /// Visible x bounds for a series, anchored at its maximum timestamp.
    pub fn bounds(&self, points: &[SeriesPoint]) -> Option<(i64, i64)> {
        let max_x = points.iter().map(|p| p.x).max()?;
        let min_x = points.iter().map(|p| p.x).min()?;
        match self.window_ms() {
            Some(window) => Some((max_x - window, max_x)),
            None => Some((min_x, max_x)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bet(id: &str, t: i64, prob: f64) -> Bet {
        Bet {
            id: id.to_string(),
            created_time: t,
            prob_before: prob,
            prob_after: prob,
        }
    }

    #[test]
    fn test_bets_to_series_sorts_and_scales() {
        let bets = vec![bet("b", 200, 0.75), bet("a", 100, 0.5)];
        let series = bets_to_series(&bets);

        assert_eq!(series[0], SeriesPoint { x: 100, y: 50.0 });
        assert_eq!(series[1], SeriesPoint { x: 200, y: 75.0 });
    }

    #[test]
    fn test_bet_deserializes_camel_case() {
        let json = r#"{"id":"x1","createdTime":1700000000000,"probBefore":0.4,"probAfter":0.45}"#;
        let bet: Bet = serde_json::from_str(json).unwrap();

        assert_eq!(bet.id, "x1");
        assert_eq!(bet.created_time, 1_700_000_000_000);
        assert!((bet.prob_after - 0.45).abs() < 1e-12);
    }

    #[test]
    fn test_time_range_bounds_anchor_at_max() {
        let points = vec![
            SeriesPoint { x: 0, y: 1.0 },
            SeriesPoint { x: 700_000_000, y: 2.0 },
        ];

        let (min, max) = TimeRange::Day.bounds(&points).unwrap();
        assert_eq!(max, 700_000_000);
        assert_eq!(min, 700_000_000 - 86_400_000);

        let (min, max) = TimeRange::All.bounds(&points).unwrap();
        assert_eq!((min, max), (0, 700_000_000));
    }

    #[test]
    fn test_time_range_parse() {
        assert_eq!(TimeRange::parse("1W"), Some(TimeRange::Week));
        assert_eq!(TimeRange::parse("2Y"), None);
    }
}
