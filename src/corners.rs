//! Canonical ordering of the four user-placed measure box corners.
//!
//! Users click the corners in any order. Both the homography solve and the
//! outline drawing need them in a fixed winding starting from the upper-left
//! corner, so everything that consumes box corners goes through
//! [`order_corners`].

use std::cmp::Ordering;
use std::f64::consts::TAU;

use crate::geometry::{Point, Winding};

/// Strategy used by [`order_corners`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CornerOrder {
    /// Classify by `x + y` and `x - y`.
    ///
    /// Output is `[top_left, top_right, bottom_right, bottom_left]`.
    /// Only reliable for roughly axis-aligned boxes: a box rotated close to
    /// 45 degrees produces ties on both metrics and the assignment is then
    /// arbitrary (but deterministic).
    SumDifference,
    /// Anchor at the minimal `x + y` point, then sort the other three by
    /// their angle around the anchor, measured in `[0, 2pi)` from the +x
    /// axis.
    ///
    /// Handles boxes tilted clockwise. On a box tilted anticlockwise the top
    /// right corner lies above the anchor, its angle wraps to just under
    /// 2pi and it sorts last, so the output crosses itself.
    Polar(Winding),
}

/// Order four points into a consistent winding starting at the upper-left
/// corner.
///
/// Ties are broken on the full `(metric, y, x)` key so the result does not
/// depend on the order the points were passed in.
pub fn order_corners(points: [Point; 4], mode: CornerOrder) -> [Point; 4] {
    match mode {
        CornerOrder::SumDifference => order_by_sum_difference(points),
        CornerOrder::Polar(winding) => order_by_polar_angle(points, winding),
    }
}

fn sum(p: &Point) -> f64 {
    p.x + p.y
}

fn difference(p: &Point) -> f64 {
    p.x - p.y
}

fn compare_by(metric: fn(&Point) -> f64, a: &Point, b: &Point) -> Ordering {
    metric(a)
        .total_cmp(&metric(b))
        .then(a.y.total_cmp(&b.y))
        .then(a.x.total_cmp(&b.x))
}

fn order_by_sum_difference(points: [Point; 4]) -> [Point; 4] {
    let mut remaining = points.to_vec();

    let top_left = take_extreme(&mut remaining, |a, b| compare_by(sum, a, b));
    let bottom_right = take_extreme(&mut remaining, |a, b| compare_by(sum, b, a));
    // Larger x - y lies towards the upper right.
    let top_right = take_extreme(&mut remaining, |a, b| compare_by(difference, b, a));
    let bottom_left = remaining[0];

    [top_left, top_right, bottom_right, bottom_left]
}

fn order_by_polar_angle(points: [Point; 4], winding: Winding) -> [Point; 4] {
    let mut remaining = points.to_vec();
    let anchor = take_extreme(&mut remaining, |a, b| compare_by(sum, a, b));

    let angle = |p: &Point| (p.y - anchor.y).atan2(p.x - anchor.x).rem_euclid(TAU);
    remaining.sort_by(|a, b| {
        angle(a)
            .total_cmp(&angle(b))
            .then(anchor.distance(a).total_cmp(&anchor.distance(b)))
    });
    if winding == Winding::AntiClockwise {
        remaining.reverse();
    }

    [anchor, remaining[0], remaining[1], remaining[2]]
}

/// Remove and return the smallest element under `cmp`.
fn take_extreme(points: &mut Vec<Point>, cmp: impl Fn(&Point, &Point) -> Ordering) -> Point {
    let idx = points
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| cmp(a, b))
        .map(|(i, _)| i)
        .unwrap_or(0);
    points.remove(idx)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TL: Point = Point::new(0.1, 0.15);
    const TR: Point = Point::new(0.9, 0.2);
    const BR: Point = Point::new(0.85, 0.8);
    const BL: Point = Point::new(0.15, 0.9);

    fn permutations(p: [Point; 4]) -> Vec<[Point; 4]> {
        let mut out = Vec::new();
        for a in 0..4 {
            for b in 0..4 {
                for c in 0..4 {
                    for d in 0..4 {
                        let idx = [a, b, c, d];
                        let mut seen = [false; 4];
                        idx.iter().for_each(|&i| seen[i] = true);
                        if seen.iter().all(|&s| s) {
                            out.push([p[a], p[b], p[c], p[d]]);
                        }
                    }
                }
            }
        }
        out
    }

    #[test]
    fn sum_difference_yields_clockwise_from_top_left() {
        let ordered = order_corners([BR, TL, BL, TR], CornerOrder::SumDifference);
        assert_eq!(ordered, [TL, TR, BR, BL]);
    }

    #[test]
    fn polar_clockwise_matches_screen_winding() {
        let ordered = order_corners([BL, BR, TR, TL], CornerOrder::Polar(Winding::Clockwise));
        assert_eq!(ordered, [TL, TR, BR, BL]);
    }

    #[test]
    fn polar_anticlockwise_reverses_after_anchor() {
        let ordered = order_corners(
            [TR, BL, TL, BR],
            CornerOrder::Polar(Winding::AntiClockwise),
        );
        assert_eq!(ordered, [TL, BL, BR, TR]);
    }

    #[test]
    fn every_permutation_gives_the_same_order() {
        for mode in [
            CornerOrder::SumDifference,
            CornerOrder::Polar(Winding::Clockwise),
            CornerOrder::Polar(Winding::AntiClockwise),
        ] {
            let expected = order_corners([TL, TR, BR, BL], mode);
            for perm in permutations([TL, TR, BR, BL]) {
                assert_eq!(order_corners(perm, mode), expected, "{mode:?}");
            }
        }
    }

    #[test]
    fn polar_orders_a_moderately_rotated_box() {
        // Rotated ~20 degrees clockwise around (0.5, 0.5).
        let tl = Point::new(0.26, 0.13);
        let tr = Point::new(0.87, 0.34);
        let br = Point::new(0.74, 0.87);
        let bl = Point::new(0.13, 0.66);
        let ordered = order_corners([br, bl, tr, tl], CornerOrder::Polar(Winding::Clockwise));
        assert_eq!(ordered, [tl, tr, br, bl]);
    }

    #[test]
    fn polar_misorders_an_anticlockwise_tilted_box() {
        // Known limitation: the top-right corner is above the anchor, so its
        // angle wraps past every other corner.
        let tl = Point::new(0.2, 0.3);
        let tr = Point::new(0.8, 0.1);
        let br = Point::new(0.9, 0.7);
        let bl = Point::new(0.3, 0.9);
        let ordered = order_corners([bl, tr, tl, br], CornerOrder::Polar(Winding::Clockwise));
        assert_eq!(ordered, [tl, br, bl, tr]);
        // The sum/difference strategy gets this one right.
        let ordered = order_corners([bl, tr, tl, br], CornerOrder::SumDifference);
        assert_eq!(ordered, [tl, tr, br, bl]);
    }

    #[test]
    fn diamond_ties_are_deterministic() {
        // Known limitation of the sum/difference heuristic: a 45 degree box
        // ties on x + y. The output must at least be a stable permutation.
        let diamond = [
            Point::new(0.5, 0.0),
            Point::new(1.0, 0.5),
            Point::new(0.5, 1.0),
            Point::new(0.0, 0.5),
        ];
        let first = order_corners(diamond, CornerOrder::SumDifference);
        for perm in permutations(diamond) {
            assert_eq!(order_corners(perm, CornerOrder::SumDifference), first);
        }
        for p in diamond {
            assert!(first.contains(&p));
        }
    }

    #[test]
    fn duplicate_points_still_produce_four_outputs() {
        let p = Point::new(0.3, 0.3);
        let ordered = order_corners([p, p, p, p], CornerOrder::SumDifference);
        assert_eq!(ordered, [p; 4]);
    }
}
