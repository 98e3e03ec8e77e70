//! Conversions between view pixels, normalized coordinates and image pixels.
//!
//! Images are shown scaled to fit their view with the aspect ratio kept,
//! centered, so one axis usually has letterbox padding on both sides.

use crate::geometry::Point;

/// Placement of an image scaled into a view.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewFit {
    pub resized_width: f64,
    pub resized_height: f64,
    pub x_padding: f64,
    pub y_padding: f64,
}

/// Region a dragged or clicked point is confined to.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Bounds {
    /// The displayed image.
    Image,
    /// The measure box inside a rectified image, i.e. the image minus
    /// `margin_ratio` on each side.
    InnerBox { margin_ratio: f64 },
}

impl ViewFit {
    /// Scale an `image_width` x `image_height` image to fit a view of
    /// `view_width` x `view_height`, keeping its aspect ratio.
    pub fn fit(image_width: f64, image_height: f64, view_width: f64, view_height: f64) -> Self {
        if image_width <= 0.0 || image_height <= 0.0 {
            return Self::unpadded(view_width, view_height);
        }
        let scaling = (view_width / image_width).min(view_height / image_height);
        let resized_width = (image_width * scaling).floor().max(1.0);
        let resized_height = (image_height * scaling).floor().max(1.0);
        Self {
            resized_width,
            resized_height,
            x_padding: ((view_width - resized_width) / 2.0).floor(),
            y_padding: ((view_height - resized_height) / 2.0).floor(),
        }
    }

    /// A view filled exactly by the image.
    pub fn unpadded(width: f64, height: f64) -> Self {
        Self {
            resized_width: width,
            resized_height: height,
            x_padding: 0.0,
            y_padding: 0.0,
        }
    }

    pub fn to_normalized(&self, pixel_x: f64, pixel_y: f64) -> Point {
        to_normalized(
            pixel_x,
            pixel_y,
            self.resized_width,
            self.resized_height,
            self.x_padding,
            self.y_padding,
        )
    }

    pub fn to_view(&self, p: &Point) -> Point {
        let (x, y) = from_normalized(
            p,
            self.resized_width,
            self.resized_height,
            self.x_padding,
            self.y_padding,
        );
        Point::new(x, y)
    }

    /// Clamp a view pixel position into `bounds`.
    pub fn clamp(&self, pixel_x: f64, pixel_y: f64, bounds: Bounds) -> (f64, f64) {
        let margin = match bounds {
            Bounds::Image => 0.0,
            Bounds::InnerBox { margin_ratio } => margin_ratio,
        };
        let min_x = margin * self.resized_width + self.x_padding;
        let min_y = margin * self.resized_height + self.y_padding;
        let max_x = (1.0 - margin) * self.resized_width + self.x_padding;
        let max_y = (1.0 - margin) * self.resized_height + self.y_padding;
        (pixel_x.clamp(min_x, max_x), pixel_y.clamp(min_y, max_y))
    }

    /// Clamp then normalize, the usual path for pointer input.
    pub fn normalize_clamped(&self, pixel_x: f64, pixel_y: f64, bounds: Bounds) -> Point {
        let (x, y) = self.clamp(pixel_x, pixel_y, bounds);
        self.to_normalized(x, y)
    }

    /// Factor from view pixels to pixels of the full image it shows.
    pub fn view_to_image_scale(&self, image_height: f64) -> f64 {
        image_height / self.resized_height
    }
}

/// View pixel to normalized coordinates. `view_width`/`view_height` are the
/// resized image dimensions, not the view's.
pub fn to_normalized(
    pixel_x: f64,
    pixel_y: f64,
    view_width: f64,
    view_height: f64,
    x_padding: f64,
    y_padding: f64,
) -> Point {
    Point::new(
        (pixel_x - x_padding) / view_width,
        (pixel_y - y_padding) / view_height,
    )
}

/// Inverse of [`to_normalized`].
pub fn from_normalized(
    p: &Point,
    view_width: f64,
    view_height: f64,
    x_padding: f64,
    y_padding: f64,
) -> (f64, f64) {
    (
        p.x * view_width + x_padding,
        p.y * view_height + y_padding,
    )
}

/// Normalized point to pixel coordinates of a `width` x `height` image.
pub fn to_image_pixels(p: &Point, width: u32, height: u32) -> Point {
    p.untagged().scale_xy(width as f64, height as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn wide_image_in_square_view_is_letterboxed_vertically() {
        let fit = ViewFit::fit(400.0, 200.0, 800.0, 800.0);
        assert_eq!(fit.resized_width, 800.0);
        assert_eq!(fit.resized_height, 400.0);
        assert_eq!(fit.x_padding, 0.0);
        assert_eq!(fit.y_padding, 200.0);
    }

    #[test]
    fn normalize_subtracts_padding_before_dividing() {
        let fit = ViewFit::fit(400.0, 200.0, 800.0, 800.0);
        let p = fit.to_normalized(400.0, 400.0);
        assert_abs_diff_eq!(p.x, 0.5);
        assert_abs_diff_eq!(p.y, 0.5);
        let corner = fit.to_normalized(0.0, 200.0);
        assert_abs_diff_eq!(corner.x, 0.0);
        assert_abs_diff_eq!(corner.y, 0.0);
    }

    #[test]
    fn view_round_trip() {
        let fit = ViewFit::fit(3000.0, 4000.0, 1280.0, 720.0);
        for (x, y) in [(500.0, 100.0), (640.0, 360.0), (800.0, 700.0)] {
            let back = fit.to_view(&fit.to_normalized(x, y));
            assert_abs_diff_eq!(back.x, x, epsilon = 1e-9);
            assert_abs_diff_eq!(back.y, y, epsilon = 1e-9);
        }
    }

    #[test]
    fn clamp_to_image_and_box() {
        let fit = ViewFit::fit(100.0, 100.0, 200.0, 100.0);
        // Image spans x in [50, 150].
        assert_eq!(fit.clamp(10.0, -5.0, Bounds::Image), (50.0, 0.0));
        assert_eq!(fit.clamp(180.0, 120.0, Bounds::Image), (150.0, 100.0));
        let inner = Bounds::InnerBox { margin_ratio: 0.1 };
        assert_eq!(fit.clamp(10.0, -5.0, inner), (60.0, 10.0));
        let p = fit.normalize_clamped(500.0, 500.0, inner);
        assert_abs_diff_eq!(p.x, 0.9, epsilon = 1e-12);
        assert_abs_diff_eq!(p.y, 0.9, epsilon = 1e-12);
    }

    #[test]
    fn image_pixel_conversions() {
        let p = to_image_pixels(&Point::new(0.25, 0.5), 400, 300);
        assert_eq!(p, Point::new(100.0, 150.0));
        assert_eq!(p.ruler_id, None);
    }

    #[test]
    fn unnormalized_inputs_pass_through() {
        let fit = ViewFit::unpadded(100.0, 100.0);
        let p = fit.to_normalized(-50.0, 150.0);
        assert_abs_diff_eq!(p.x, -0.5);
        assert_abs_diff_eq!(p.y, 1.5);
    }
}
