use crate::data::types::SeriesPoint;

/// Default smoothing window: 10 minutes.
pub const DEFAULT_WINDOW_MS: i64 = 600_000;

/// Centered moving average over a time-ordered series.
///
/// Each point's y becomes the mean of every y whose x lies within
/// `[x_i - window_ms/2, x_i + window_ms/2]`, inclusive on both ends.
/// x values are untouched and the input is not mutated. Input is expected
/// sorted ascending by x; unsorted input still terminates, the window is
/// just wrong.
pub fn smooth(points: &[SeriesPoint], window_ms: i64) -> Vec<SeriesPoint> {
    let half = window_ms / 2;
    let mut out = Vec::with_capacity(points.len());

    // Sliding window: both edges only ever move forward, so the whole pass
    // is O(n) while keeping the same inclusive boundary semantics as the
    // direct per-point scan.
    let mut lo = 0usize;
    let mut hi = 0usize;
    let mut sum = 0.0;

    for point in points {
        let start = point.x - half;
        let end = point.x + half;

        while hi < points.len() && points[hi].x <= end {
            sum += points[hi].y;
            hi += 1;
        }
        while lo < hi && points[lo].x < start {
            sum -= points[lo].y;
            lo += 1;
        }

        let count = hi - lo;
        let y = if count == 0 { point.y } else { sum / count as f64 };
        out.push(SeriesPoint { x: point.x, y });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pts(raw: &[(i64, f64)]) -> Vec<SeriesPoint> {
        raw.iter().map(|&(x, y)| SeriesPoint { x, y }).collect()
    }

    #[test]
    fn test_empty_input() {
        assert!(smooth(&[], DEFAULT_WINDOW_MS).is_empty());
    }

    #[test]
    fn test_single_point_unchanged() {
        let input = pts(&[(1000, 42.5)]);
        let out = smooth(&input, DEFAULT_WINDOW_MS);
        assert_eq!(out, input);
    }

    #[test]
    fn test_constant_series_stays_constant() {
        let input = pts(&[(0, 7.0), (100, 7.0), (5_000_000, 7.0), (9_000_000, 7.0)]);
        for window in [0, 1_000, DEFAULT_WINDOW_MS, i64::MAX / 4] {
            let out = smooth(&input, window);
            assert!(out.iter().all(|p| (p.y - 7.0).abs() < 1e-12));
        }
    }

    #[test]
    fn test_windowed_average_with_isolated_point() {
        // Points at 0, 5min, 20min; window 10min. The middle point sees
        // [0, 10min] -> mean(10, 20) = 15. The last point has no neighbors
        // within +/-5min and keeps its value.
        let five_min = 300_000;
        let input = pts(&[(0, 10.0), (five_min, 20.0), (4 * five_min, 90.0)]);
        let out = smooth(&input, DEFAULT_WINDOW_MS);

        assert!((out[0].y - 15.0).abs() < 1e-12);
        assert!((out[1].y - 15.0).abs() < 1e-12);
        assert!((out[2].y - 90.0).abs() < 1e-12);
    }

    #[test]
    fn test_boundary_is_inclusive_both_ends() {
        // Neighbors exactly half a window away must be included.
        let input = pts(&[(0, 0.0), (500, 30.0), (1000, 60.0)]);
        let out = smooth(&input, 1000);

        // Middle point's window is [0, 1000], all three included.
        assert!((out[1].y - 30.0).abs() < 1e-12);
        // Edge points each see exactly two.
        assert!((out[0].y - 15.0).abs() < 1e-12);
        assert!((out[2].y - 45.0).abs() < 1e-12);
    }

    #[test]
    fn test_x_values_and_length_preserved() {
        let input = pts(&[(1, 5.0), (2, 6.0), (3, 7.0), (1_000_000, 8.0)]);
        let out = smooth(&input, DEFAULT_WINDOW_MS);

        assert_eq!(out.len(), input.len());
        for (a, b) in input.iter().zip(&out) {
            assert_eq!(a.x, b.x);
        }
    }

    #[test]
    fn test_input_not_mutated() {
        let input = pts(&[(0, 1.0), (10, 99.0)]);
        let copy = input.clone();
        let _ = smooth(&input, DEFAULT_WINDOW_MS);
        assert_eq!(input, copy);
    }

    #[test]
    fn test_matches_direct_definition() {
        // Cross-check the sliding window against the naive O(n^2) scan.
        let input = pts(&[
            (0, 12.0),
            (40_000, 30.0),
            (290_000, 55.0),
            (300_000, 60.0),
            (600_000, 10.0),
            (2_000_000, 80.0),
        ]);
        let window = DEFAULT_WINDOW_MS;
        let fast = smooth(&input, window);

        for (i, point) in input.iter().enumerate() {
            let start = point.x - window / 2;
            let end = point.x + window / 2;
            let inside: Vec<f64> = input
                .iter()
                .filter(|p| p.x >= start && p.x <= end)
                .map(|p| p.y)
                .collect();
            let mean = inside.iter().sum::<f64>() / inside.len() as f64;
            assert!((fast[i].y - mean).abs() < 1e-9, "mismatch at index {}", i);
        }
    }
}
