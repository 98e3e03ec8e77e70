//! All state for one measuring session, owned by the caller.
//!
//! The geometry modules are stateless; a [`Session`] ties them together for a
//! single photo: the box traced on it, the rectified result and the rulers
//! drawn on that result.

use std::path::{Path, PathBuf};

use ab_glyph::FontVec;
use image::{Rgb, RgbImage};

use crate::corners::{order_corners, CornerOrder};
use crate::error::{FishMeshError, Result};
use crate::export::{self, AnnotationStyle, MeasurementRecord};
use crate::geometry::{default_box_corners, Point};
use crate::mapping::{self, ViewFit};
use crate::rectify::{self, RectifiedImage, Rotation};
use crate::ruler::{self, RulerId, RulerSet};
use crate::settings::Settings;

pub struct Session {
    settings: Settings,
    corner_order: CornerOrder,
    image: Option<RgbImage>,
    image_name: Option<String>,
    /// Box corners normalized to `image`, in the order the user placed them.
    corners: [Point; 4],
    rectified: Option<RectifiedImage>,
    rulers: RulerSet,
    pending_start: Option<Point>,
}

impl Session {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            corner_order: CornerOrder::SumDifference,
            image: None,
            image_name: None,
            corners: default_box_corners(),
            rectified: None,
            rulers: RulerSet::new(),
            pending_start: None,
        }
    }

    pub fn corner_order(&self) -> CornerOrder {
        self.corner_order
    }

    /// Switch the corner ordering strategy and rectify with it.
    pub fn set_corner_order(&mut self, corner_order: CornerOrder) -> Result<()> {
        if self.corner_order == corner_order {
            return Ok(());
        }
        self.corner_order = corner_order;
        self.rectify().map(|_| ())
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn image(&self) -> Option<&RgbImage> {
        self.image.as_ref()
    }

    pub fn image_name(&self) -> Option<&str> {
        self.image_name.as_deref()
    }

    pub fn corners(&self) -> &[Point; 4] {
        &self.corners
    }

    pub fn rectified(&self) -> Option<&RectifiedImage> {
        self.rectified.as_ref()
    }

    pub fn rulers(&self) -> &RulerSet {
        &self.rulers
    }

    pub fn pending_start(&self) -> Option<Point> {
        self.pending_start
    }

    /// Start over with a new photo: default box, no rulers.
    pub fn load_image(&mut self, image: RgbImage, name: Option<String>) -> Result<()> {
        if image.width() == 0 || image.height() == 0 {
            return Err(FishMeshError::EmptyImage);
        }
        log::info!(
            "Loaded image {} ({}x{})",
            name.as_deref().unwrap_or("<unnamed>"),
            image.width(),
            image.height()
        );
        self.image = Some(image);
        self.image_name = name;
        self.reset_box();
        self.rectify().map(|_| ())
    }

    /// Rotate the photo by 90 degrees. The old box no longer matches the
    /// content, so it is reset and the rulers are dropped.
    pub fn rotate(&mut self, rotation: Rotation) -> Result<()> {
        let Some(image) = &self.image else {
            return Ok(());
        };
        self.image = Some(rectify::rotate(image, rotation));
        self.reset_box();
        self.rectify().map(|_| ())
    }

    fn reset_box(&mut self) {
        self.corners = default_box_corners();
        self.rectified = None;
        self.rulers.clear();
        self.pending_start = None;
    }

    /// Index of the corner nearest `target` (normalized), if within
    /// `max_distance`.
    pub fn nearest_corner(&self, target: &Point, max_distance: f64) -> Option<usize> {
        self.corners
            .iter()
            .enumerate()
            .map(|(i, c)| (i, c.distance(target)))
            .filter(|&(_, d)| d <= max_distance)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)
    }

    /// Move one box corner. Positions are normalized to the photo and are
    /// expected to be clamped by the caller.
    pub fn set_corner(&mut self, index: usize, to: Point) {
        if let Some(corner) = self.corners.get_mut(index) {
            *corner = to.untagged();
        }
    }

    /// Box corners in photo pixels, ordered top-left first.
    pub fn ordered_pixel_corners(&self) -> Option<[Point; 4]> {
        let image = self.image.as_ref()?;
        let pixels = self
            .corners
            .map(|c| mapping::to_image_pixels(&c, image.width(), image.height()));
        Some(order_corners(pixels, self.corner_order))
    }

    /// Re-run rectification with the current box and margin. On failure the
    /// previous rectified image is kept.
    pub fn rectify(&mut self) -> Result<Option<&RectifiedImage>> {
        let (Some(image), Some(corners)) = (&self.image, self.ordered_pixel_corners()) else {
            return Ok(None);
        };
        let margin = self.settings.rectification()?.margin_ratio();
        match rectify::rectify(image, &corners, margin) {
            Ok(rectified) => {
                self.rectified = Some(rectified);
                Ok(self.rectified.as_ref())
            }
            Err(e) => {
                log::warn!("Rectification failed, keeping previous result: {e}");
                Err(e)
            }
        }
    }

    /// Record a click on the rectified image. The first click of a pair is
    /// held as a pending start; the second completes a ruler.
    pub fn place_ruler_point(&mut self, at: Point) -> Option<RulerId> {
        match self.pending_start.take() {
            None => {
                self.pending_start = Some(at.untagged());
                None
            }
            Some(start) => {
                let id = self.rulers.add(start, at);
                log::debug!("Added ruler {id}");
                Some(id)
            }
        }
    }

    pub fn cancel_pending(&mut self) {
        self.pending_start = None;
    }

    /// Delete the ruler owning the endpoint nearest `target`.
    pub fn delete_ruler_near(&mut self, target: &Point, max_distance: f64) -> Option<RulerId> {
        let (id, _) = self.rulers.nearest_endpoint(target, max_distance)?;
        self.rulers.remove(id)?;
        log::debug!("Deleted ruler {id}");
        Some(id)
    }

    pub fn nearest_ruler_endpoint(
        &self,
        target: &Point,
        max_distance: f64,
    ) -> Option<(RulerId, usize)> {
        self.rulers.nearest_endpoint(target, max_distance)
    }

    pub fn move_ruler_endpoint(&mut self, id: RulerId, endpoint: usize, to: Point) -> bool {
        self.rulers.move_endpoint(id, endpoint, to)
    }

    /// Swap in new settings. A margin change rectifies again and rescales
    /// existing rulers so they stay on the same features. Nothing changes
    /// if the new settings are invalid or the box cannot be rectified.
    pub fn apply_settings(&mut self, settings: Settings) -> Result<()> {
        settings.validate()?;
        let old_margin = self.settings.measure_box_margin_ratio;
        let new_margin = settings.measure_box_margin_ratio;
        if old_margin == new_margin {
            self.settings = settings;
            return Ok(());
        }

        let rectified = match (&self.image, self.ordered_pixel_corners()) {
            (Some(image), Some(corners)) => Some(rectify::rectify(image, &corners, new_margin)?),
            _ => None,
        };

        self.settings = settings;
        if rectified.is_some() {
            self.rectified = rectified;
        }
        ruler::rescale_rulers(&mut self.rulers, old_margin, new_margin);
        if let Some(start) = &mut self.pending_start {
            start.x = ruler::rescale_for_margin(start.x, old_margin, new_margin);
            start.y = ruler::rescale_for_margin(start.y, old_margin, new_margin);
        }
        Ok(())
    }

    pub fn records(&self) -> Result<Vec<MeasurementRecord>> {
        Ok(export::measurement_records(
            &self.rulers,
            &self.settings.rectification()?,
        ))
    }

    /// Rectified image with the rulers burned in. `view` is how the
    /// rectified image is currently fitted on screen; marker and font sizes
    /// are scaled from it so the export looks like the view.
    pub fn annotated_image(&self, view: &ViewFit, font: Option<&FontVec>) -> Option<RgbImage> {
        let rectified = self.rectified.as_ref()?;
        let settings = self.settings.rectification().ok()?;
        let image_height = rectified.height();
        let scale = view.view_to_image_scale(image_height as f64);
        let style = AnnotationStyle {
            color: Rgb(self.settings.draw_rgb().ok()?),
            font_px: export::export_font_size(
                self.settings.font_size,
                view.resized_height,
                image_height,
            ),
            point_radius: self.settings.point_radius(view.resized_width as f32) as f64 * scale,
        };
        Some(export::annotate(
            &rectified.image,
            &self.rulers,
            &settings,
            &style,
            font,
        ))
    }

    /// Write the annotated image and measurement table into `dir`.
    pub fn export(
        &self,
        dir: &Path,
        stem: &str,
        view: &ViewFit,
        font: Option<&FontVec>,
    ) -> Result<(PathBuf, PathBuf)> {
        let annotated = self
            .annotated_image(view, font)
            .ok_or(FishMeshError::EmptyImage)?;
        export::save_measurements(
            dir,
            stem,
            &annotated,
            &self.settings.rectification()?,
            &self.records()?,
        )
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}
