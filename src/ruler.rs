//! Rulers drawn on the rectified image and their physical lengths.
//!
//! Ruler points are normalized to the rectified image, margin included. The
//! reference board only covers the inner `1 - 2 * margin` part of each axis,
//! which is where the scale factor in [`measure`] comes from.

use crate::error::{FishMeshError, Result};
use crate::geometry::Point;
use crate::mapping::ViewFit;
use crate::settings::RectificationSettings;

pub type RulerId = u32;

/// Distance between a ruler endpoint and its label, in marker radii.
const LABEL_OFFSET_RADII: f64 = 3.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ruler {
    pub id: RulerId,
    pub points: [Point; 2],
}

/// Rulers in creation order. The position in this set (1-based) is the
/// number shown to the user, independent of the id.
#[derive(Clone, Debug, Default)]
pub struct RulerSet {
    rulers: Vec<Ruler>,
    next_id: RulerId,
}

impl RulerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a completed ruler and return its fresh id.
    pub fn add(&mut self, start: Point, end: Point) -> RulerId {
        self.next_id += 1;
        let id = self.next_id;
        self.rulers.push(Ruler {
            id,
            points: [
                Point::with_ruler(start.x, start.y, id),
                Point::with_ruler(end.x, end.y, id),
            ],
        });
        id
    }

    pub fn remove(&mut self, id: RulerId) -> Option<Ruler> {
        let idx = self.rulers.iter().position(|r| r.id == id)?;
        Some(self.rulers.remove(idx))
    }

    pub fn get(&self, id: RulerId) -> Option<&Ruler> {
        self.rulers.iter().find(|r| r.id == id)
    }

    pub fn get_mut(&mut self, id: RulerId) -> Option<&mut Ruler> {
        self.rulers.iter_mut().find(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.rulers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rulers.is_empty()
    }

    pub fn clear(&mut self) {
        self.rulers.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Ruler> {
        self.rulers.iter()
    }

    /// `(display_index, ruler)` with the index starting at 1.
    pub fn numbered(&self) -> impl Iterator<Item = (usize, &Ruler)> {
        self.rulers.iter().enumerate().map(|(i, r)| (i + 1, r))
    }

    /// All endpoints, two per ruler, in creation order.
    pub fn points(&self) -> Vec<Point> {
        self.rulers.iter().flat_map(|r| r.points).collect()
    }

    /// Endpoint closest to `target` within `max_distance`, as
    /// `(ruler_id, endpoint_index)`.
    pub fn nearest_endpoint(&self, target: &Point, max_distance: f64) -> Option<(RulerId, usize)> {
        self.rulers
            .iter()
            .flat_map(|r| r.points.iter().enumerate().map(move |(i, p)| (r.id, i, p)))
            .map(|(id, i, p)| (id, i, p.distance(target)))
            .filter(|&(_, _, d)| d <= max_distance)
            .min_by(|a, b| a.2.total_cmp(&b.2))
            .map(|(id, i, _)| (id, i))
    }

    /// Move one endpoint, keeping its ruler tag.
    pub fn move_endpoint(&mut self, id: RulerId, endpoint: usize, to: Point) -> bool {
        match self.get_mut(id).and_then(|r| r.points.get_mut(endpoint)) {
            Some(p) => {
                p.x = to.x;
                p.y = to.y;
                true
            }
            None => false,
        }
    }

    /// Apply `f` to every endpoint.
    pub fn map_points(&mut self, mut f: impl FnMut(Point) -> Point) {
        for ruler in &mut self.rulers {
            for p in &mut ruler.points {
                let moved = f(*p);
                p.x = moved.x;
                p.y = moved.y;
            }
        }
    }
}

/// Group a flat list of tagged points into rulers, keeping the order in
/// which each id first appears.
///
/// Points without a `ruler_id` are not ruler points and are skipped. Any id
/// that does not have exactly two points is an error.
pub fn group_points_into_rulers(points: &[Point]) -> Result<RulerSet> {
    let mut groups: Vec<(RulerId, Vec<Point>)> = Vec::new();
    for p in points {
        let Some(id) = p.ruler_id else { continue };
        match groups.iter_mut().find(|(gid, _)| *gid == id) {
            Some((_, group)) => group.push(*p),
            None => groups.push((id, vec![*p])),
        }
    }

    let mut set = RulerSet::new();
    for (id, group) in groups {
        let [a, b] = group[..] else {
            return Err(FishMeshError::IncompleteRuler {
                ruler_id: id,
                points: group.len(),
            });
        };
        set.rulers.push(Ruler { id, points: [a, b] });
        set.next_id = set.next_id.max(id);
    }
    Ok(set)
}

/// Physical length of a ruler in the reference board's unit.
///
/// The x and y components are scaled independently by the board width and
/// height, then combined. This is exact for axis-aligned rulers and an
/// approximation for diagonal ones.
pub fn measure(points: &[Point; 2], settings: &RectificationSettings) -> f64 {
    let [p1, p2] = points;
    let scale = 1.0 / settings.inner_fraction();
    let dx = scale * settings.reference_width() * (p1.x - p2.x);
    let dy = scale * settings.reference_height() * (p1.y - p2.y);
    dx.hypot(dy)
}

/// Lengths of every ruler in display order.
pub fn measure_all(rulers: &RulerSet, settings: &RectificationSettings) -> Vec<(usize, f64)> {
    rulers
        .numbered()
        .map(|(index, r)| (index, measure(&r.points, settings)))
        .collect()
}

/// Text drawn next to a ruler.
pub fn label_text(display_index: usize, length: f64) -> String {
    format!("{display_index}: {length:.1} cm")
}

/// Side of the labelled endpoint the label goes on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LabelSide {
    Over,
    Under,
    Left,
    Right,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LabelAnchor {
    pub x: f64,
    pub y: f64,
    pub side: LabelSide,
}

/// Pixel frame a normalized point is projected into when placing labels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CoordinateSpace {
    /// The on-screen view of the rectified image, letterbox padding included.
    Canvas(ViewFit),
    /// The rectified image at full resolution (used for exports).
    FullImage { width: f64, height: f64 },
}

impl CoordinateSpace {
    pub fn to_pixels(&self, p: &Point) -> Point {
        match self {
            CoordinateSpace::Canvas(fit) => fit.to_view(p),
            CoordinateSpace::FullImage { width, height } => p.untagged().scale_xy(*width, *height),
        }
    }
}

/// Where to put a ruler's label.
///
/// The label sits next to the endpoint closer to the image center, on the
/// side away from the other endpoint: over/under for rulers steeper than 45
/// degrees, left/right otherwise. Exactly 45 degrees counts as vertical.
/// The fish is assumed to lie along a board edge, so this keeps labels
/// towards the middle of the image.
pub fn find_label_anchor(
    points: &[Point; 2],
    space: &CoordinateSpace,
    point_radius: f64,
) -> LabelAnchor {
    let [p1, p2] = points;
    let dx = p2.x - p1.x;
    let dy = p2.y - p1.y;
    let offset = LABEL_OFFSET_RADII * point_radius;

    let (label_point, side) = if dy.abs() >= dx.abs() {
        let p1_above_p2 = dy >= 0.0;
        if (p1.y - 0.5).abs() <= (p2.y - 0.5).abs() {
            (p1, if p1_above_p2 { LabelSide::Over } else { LabelSide::Under })
        } else {
            (p2, if p1_above_p2 { LabelSide::Under } else { LabelSide::Over })
        }
    } else {
        let p1_left_of_p2 = dx >= 0.0;
        if (p1.x - 0.5).abs() <= (p2.x - 0.5).abs() {
            (p1, if p1_left_of_p2 { LabelSide::Left } else { LabelSide::Right })
        } else {
            (p2, if p1_left_of_p2 { LabelSide::Right } else { LabelSide::Left })
        }
    };

    let Point { x, y, .. } = space.to_pixels(label_point);
    let (x, y) = match side {
        LabelSide::Over => (x, y - offset),
        LabelSide::Under => (x, y + offset),
        LabelSide::Left => (x - offset, y),
        LabelSide::Right => (x + offset, y),
    };
    LabelAnchor { x, y, side }
}

/// Move a normalized coordinate so it keeps pointing at the same physical
/// spot after the margin ratio changes from `old_margin` to `new_margin`.
pub fn rescale_for_margin(coord: f64, old_margin: f64, new_margin: f64) -> f64 {
    let old_scale = 1.0 - 2.0 * old_margin;
    let new_scale = 1.0 - 2.0 * new_margin;
    (coord - 0.5) * (new_scale / old_scale) + 0.5
}

/// [`rescale_for_margin`] applied to both axes of every ruler endpoint.
pub fn rescale_rulers(rulers: &mut RulerSet, old_margin: f64, new_margin: f64) {
    if old_margin == new_margin {
        return;
    }
    log::debug!(
        "Rescaling {} ruler(s) for margin {old_margin} -> {new_margin}",
        rulers.len()
    );
    rulers.map_points(|p| {
        Point::new(
            rescale_for_margin(p.x, old_margin, new_margin),
            rescale_for_margin(p.y, old_margin, new_margin),
        )
    });
}
