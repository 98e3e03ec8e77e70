//! Perspective rectification of the photographed measure box.
//!
//! The box corners are mapped onto an axis-aligned rectangle inset by the
//! margin ratio, the whole photo is resampled through that homography, and
//! the result is finally resized so its aspect ratio follows the box instead
//! of the original photo.

use image::{imageops, Rgb, RgbImage};

use crate::error::{FishMeshError, Result};
use crate::geometry::Point;
use crate::homography::Homography;

/// Upper bound on sub-samples per axis when a destination pixel covers a
/// large source area.
const MAX_SAMPLES_PER_AXIS: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rotation {
    Clockwise,
    AntiClockwise,
}

/// A rectified image together with the transform that produced it.
#[derive(Clone, Debug)]
pub struct RectifiedImage {
    pub image: RgbImage,
    /// Maps source pixels to pixels of the warp before skew correction,
    /// i.e. a frame the size of the source image.
    pub homography: Homography,
    /// Width over height of the traced box, measured on the source photo.
    pub box_aspect_ratio: f64,
}

impl RectifiedImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Target corners `[top_left, top_right, bottom_right, bottom_left]` of the
/// inner box inside a `width` x `height` frame.
pub fn destination_corners(width: f64, height: f64, margin_ratio: f64) -> [Point; 4] {
    let (x0, y0) = (margin_ratio * width, margin_ratio * height);
    let (x1, y1) = ((1.0 - margin_ratio) * width, (1.0 - margin_ratio) * height);
    [
        Point::new(x0, y0),
        Point::new(x1, y0),
        Point::new(x1, y1),
        Point::new(x0, y1),
    ]
}

/// Rectify `image` so the box given by `ordered_corners` (pixel space,
/// `[top_left, top_right, bottom_right, bottom_left]`) becomes axis-aligned,
/// with `margin_ratio` of the output left around it on every side.
pub fn rectify(
    image: &RgbImage,
    ordered_corners: &[Point; 4],
    margin_ratio: f64,
) -> Result<RectifiedImage> {
    let (warped, homography) = warp_to_source_frame(image, ordered_corners, margin_ratio)?;

    let box_aspect_ratio = box_aspect_ratio(ordered_corners);
    let (width, height) = skew_corrected_size(image.width(), image.height(), box_aspect_ratio);
    log::debug!(
        "Rectified {}x{} -> {width}x{height} (box aspect {box_aspect_ratio:.3})",
        image.width(),
        image.height()
    );

    Ok(RectifiedImage {
        image: resize_area(&warped, width, height),
        homography,
        box_aspect_ratio,
    })
}

/// Warp into a frame with the same dimensions as the source image. The
/// result is stretched whenever the box and the photo differ in aspect ratio.
pub fn warp_to_source_frame(
    image: &RgbImage,
    ordered_corners: &[Point; 4],
    margin_ratio: f64,
) -> Result<(RgbImage, Homography)> {
    if image.width() == 0 || image.height() == 0 {
        return Err(FishMeshError::EmptyImage);
    }
    let dst = destination_corners(image.width() as f64, image.height() as f64, margin_ratio);
    let homography = Homography::from_points(ordered_corners, &dst)?;
    let warped = warp_perspective(image, &homography, image.width(), image.height())?;
    Ok((warped, homography))
}

/// Resample `src` through `dst_from_src` into a `width` x `height` image.
///
/// Each destination pixel averages a grid of samples sized to the pixel's
/// footprint in the source, which keeps strongly shrunk regions from
/// aliasing. Samples falling outside the source are black.
pub fn warp_perspective(
    src: &RgbImage,
    dst_from_src: &Homography,
    width: u32,
    height: u32,
) -> Result<RgbImage> {
    let src_from_dst = dst_from_src.inverse()?;
    let mut out = RgbImage::new(width, height);

    for (x, y, pixel) in out.enumerate_pixels_mut() {
        let (fx, fy) = (x as f64, y as f64);
        let (ox, oy) = src_from_dst.project_xy(fx, fy);
        let (rx, ry) = src_from_dst.project_xy(fx + 1.0, fy);
        let (dx, dy) = src_from_dst.project_xy(fx, fy + 1.0);
        let footprint = (rx - ox).hypot(ry - oy).max((dx - ox).hypot(dy - oy));
        // Slack keeps an identity-like map at one sample per pixel.
        let n = if footprint.is_finite() {
            ((footprint - 1e-6).ceil() as usize).clamp(1, MAX_SAMPLES_PER_AXIS)
        } else {
            1
        };

        let mut acc = [0.0_f64; 3];
        for j in 0..n {
            for i in 0..n {
                let sx = fx + (i as f64 + 0.5) / n as f64;
                let sy = fy + (j as f64 + 0.5) / n as f64;
                let (u, v) = src_from_dst.project_xy(sx, sy);
                if let Some(rgb) = sample_bilinear(src, u, v) {
                    acc.iter_mut().zip(rgb).for_each(|(a, c)| *a += c);
                }
            }
        }
        let count = (n * n) as f64;
        *pixel = Rgb(acc.map(|c| (c / count).round().clamp(0.0, 255.0) as u8));
    }

    Ok(out)
}

/// Bilinear lookup at continuous pixel coordinates (pixel centers at +0.5).
fn sample_bilinear(img: &RgbImage, u: f64, v: f64) -> Option<[f64; 3]> {
    let (w, h) = (img.width() as f64, img.height() as f64);
    if !(u >= 0.0 && v >= 0.0 && u <= w && v <= h) {
        return None;
    }
    let cx = (u - 0.5).clamp(0.0, w - 1.0);
    let cy = (v - 0.5).clamp(0.0, h - 1.0);
    let (x0, y0) = (cx.floor() as u32, cy.floor() as u32);
    let x1 = (x0 + 1).min(img.width() - 1);
    let y1 = (y0 + 1).min(img.height() - 1);
    let (tx, ty) = (cx - x0 as f64, cy - y0 as f64);

    let p00 = img.get_pixel(x0, y0).0;
    let p10 = img.get_pixel(x1, y0).0;
    let p01 = img.get_pixel(x0, y1).0;
    let p11 = img.get_pixel(x1, y1).0;

    let mut out = [0.0; 3];
    for c in 0..3 {
        let top = p00[c] as f64 * (1.0 - tx) + p10[c] as f64 * tx;
        let bottom = p01[c] as f64 * (1.0 - tx) + p11[c] as f64 * tx;
        out[c] = top * (1.0 - ty) + bottom * ty;
    }
    Some(out)
}

/// Width over height of the quadrilateral, using the mean of opposite edges.
pub fn box_aspect_ratio(ordered_corners: &[Point; 4]) -> f64 {
    let [tl, tr, br, bl] = ordered_corners;
    let mean_width = (tl.distance(tr) + bl.distance(br)) / 2.0;
    let mean_height = (tl.distance(bl) + tr.distance(br)) / 2.0;
    mean_width / mean_height
}

/// Output size that follows `aspect_ratio` while the longer side keeps the
/// source image's length along that axis. Never smaller than 1x1.
pub fn skew_corrected_size(src_width: u32, src_height: u32, aspect_ratio: f64) -> (u32, u32) {
    let (w, h) = (src_width as f64, src_height as f64);
    let (width, height) = if aspect_ratio.is_nan() {
        (w, h)
    } else if aspect_ratio >= 1.0 {
        (w, w / aspect_ratio)
    } else {
        (h * aspect_ratio, h)
    };
    let clamp = |v: f64| v.round().max(1.0).min(u32::MAX as f64) as u32;
    (clamp(width), clamp(height))
}

/// Resize by averaging every source pixel a destination pixel overlaps,
/// weighted by the overlap.
pub fn resize_area(src: &RgbImage, width: u32, height: u32) -> RgbImage {
    let width = width.max(1);
    let height = height.max(1);
    if src.dimensions() == (width, height) {
        return src.clone();
    }
    let columns = area_weights(src.width(), width);
    let rows = area_weights(src.height(), height);

    RgbImage::from_fn(width, height, |x, y| {
        let mut acc = [0.0_f64; 3];
        let mut total = 0.0;
        for &(sy, wy) in &rows[y as usize] {
            for &(sx, wx) in &columns[x as usize] {
                let weight = wx * wy;
                let p = src.get_pixel(sx, sy).0;
                for c in 0..3 {
                    acc[c] += p[c] as f64 * weight;
                }
                total += weight;
            }
        }
        if total > 0.0 {
            Rgb(acc.map(|c| (c / total).round().clamp(0.0, 255.0) as u8))
        } else {
            Rgb([0, 0, 0])
        }
    })
}

/// For each destination index along one axis, the source indices it covers
/// and the covered length of each.
fn area_weights(src_len: u32, dst_len: u32) -> Vec<Vec<(u32, f64)>> {
    let scale = src_len as f64 / dst_len as f64;
    (0..dst_len)
        .map(|d| {
            let start = d as f64 * scale;
            let end = (start + scale).min(src_len as f64);
            let first = start.floor() as u32;
            let last = (end.ceil() as u32).clamp(first + 1, src_len);
            (first..last)
                .map(|s| {
                    let overlap = (end.min(s as f64 + 1.0) - start.max(s as f64)).max(0.0);
                    (s, overlap)
                })
                .filter(|&(_, w)| w > 0.0)
                .collect()
        })
        .collect()
}

/// Rotate by 90 degrees. Returns a new buffer; `image` stays untouched.
pub fn rotate(image: &RgbImage, rotation: Rotation) -> RgbImage {
    match rotation {
        Rotation::Clockwise => imageops::rotate90(image),
        Rotation::AntiClockwise => imageops::rotate270(image),
    }
}
