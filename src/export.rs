//! Saving measurements: a CSV table and an annotated copy of the rectified
//! image at full resolution.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use ab_glyph::{FontVec, PxScale};
use chrono::{DateTime, Utc};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use crate::error::Result;
use crate::geometry::Point;
use crate::ruler::{self, CoordinateSpace, LabelSide, RulerSet};
use crate::settings::RectificationSettings;

/// One row of the measurement table.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeasurementRecord {
    /// 1-based display index of the ruler.
    pub measurement_id: usize,
    pub length_cm: f64,
}

pub fn measurement_records(
    rulers: &RulerSet,
    settings: &RectificationSettings,
) -> Vec<MeasurementRecord> {
    ruler::measure_all(rulers, settings)
        .into_iter()
        .map(|(measurement_id, length_cm)| MeasurementRecord {
            measurement_id,
            length_cm,
        })
        .collect()
}

/// CSV with one row per ruler. Box dimensions and the image file name are
/// repeated on every row so the table can be merged with others.
pub fn measurement_table(
    image_file: &str,
    settings: &RectificationSettings,
    records: &[MeasurementRecord],
) -> String {
    let mut out = String::from("image_file,box_width_cm,box_height_cm,measurement_id,length_cm\n");
    for r in records {
        // Writing to a String cannot fail.
        let _ = writeln!(
            out,
            "{},{:.1},{:.1},{},{:.1}",
            csv_field(image_file),
            settings.reference_width(),
            settings.reference_height(),
            r.measurement_id,
            r.length_cm
        );
    }
    out
}

fn csv_field(value: &str) -> String {
    if value.contains(&[',', '"', '\n'][..]) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_owned()
    }
}

pub fn default_save_stem(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d--%H-%M--UTC").to_string()
}

pub fn save_image_name(stem: &str) -> String {
    format!("P-{stem}.jpg")
}

pub fn data_file_name(stem: &str) -> String {
    format!("D-{stem}.csv")
}

/// Directory and stem for an export from the path picked in a save dialog.
/// A picked `P-<stem>.jpg` or `D-<stem>.csv` yields `<stem>` again.
pub fn save_target(chosen: &Path) -> (PathBuf, String) {
    let dir = chosen
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let stem = chosen
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = stem
        .strip_prefix("P-")
        .or_else(|| stem.strip_prefix("D-"))
        .unwrap_or(&stem)
        .to_owned();
    (dir, stem)
}

/// Font size in image pixels that looks like `font_size` did on a view
/// showing the image `view_height` pixels tall.
pub fn export_font_size(font_size: f32, view_height: f64, image_height: u32) -> f32 {
    if view_height <= 0.0 {
        return font_size;
    }
    (font_size as f64 / view_height * image_height as f64) as f32
}

/// How rulers are burned into an exported image. Sizes are in image pixels.
#[derive(Clone, Copy, Debug)]
pub struct AnnotationStyle {
    pub color: Rgb<u8>,
    pub font_px: f32,
    pub point_radius: f64,
}

/// Copy of `rectified` with the inner box outline, every ruler and its
/// length label drawn in. Labels are skipped when no font is available.
pub fn annotate(
    rectified: &RgbImage,
    rulers: &RulerSet,
    settings: &RectificationSettings,
    style: &AnnotationStyle,
    font: Option<&FontVec>,
) -> RgbImage {
    let mut img = rectified.clone();
    let (width, height) = (img.width() as f64, img.height() as f64);
    let space = CoordinateSpace::FullImage { width, height };

    for (index, r) in rulers.numbered() {
        let start = space.to_pixels(&r.points[0]);
        let end = space.to_pixels(&r.points[1]);
        draw_line_segment_mut(
            &mut img,
            (start.x as f32, start.y as f32),
            (end.x as f32, end.y as f32),
            style.color,
        );

        let Some(font) = font else { continue };
        let anchor = ruler::find_label_anchor(&r.points, &space, style.point_radius);
        let text = ruler::label_text(index, ruler::measure(&r.points, settings));
        let scale = PxScale::from(style.font_px);
        let (text_w, text_h) = text_size(scale, font, &text);
        let (text_w, text_h) = (text_w as f64, text_h as f64);
        // The anchor is the label edge facing the ruler.
        let (x, y) = match anchor.side {
            LabelSide::Over => (anchor.x - text_w / 2.0, anchor.y - text_h),
            LabelSide::Under => (anchor.x - text_w / 2.0, anchor.y),
            LabelSide::Left => (anchor.x - text_w, anchor.y - text_h / 2.0),
            LabelSide::Right => (anchor.x, anchor.y - text_h / 2.0),
        };
        draw_text_mut(&mut img, style.color, x as i32, y as i32, scale, font, &text);
    }

    let margin = settings.margin_ratio();
    let min = Point::new(margin * width, margin * height);
    let max = Point::new((1.0 - margin) * width, (1.0 - margin) * height);
    let box_width = (max.x - min.x).max(1.0) as u32;
    let box_height = (max.y - min.y).max(1.0) as u32;
    draw_hollow_rect_mut(
        &mut img,
        Rect::at(min.x as i32, min.y as i32).of_size(box_width, box_height),
        style.color,
    );

    img
}

/// Label font for exports: a system TTF if one is installed in a usual
/// location, otherwise the font egui ships with.
pub fn load_label_font() -> Option<FontVec> {
    #[cfg(not(target_arch = "wasm32"))]
    if let Some(font) = load_system_font() {
        return Some(font);
    }
    let font = bundled_font();
    if font.is_none() {
        log::warn!("No label font available, exported images will have no labels");
    }
    font
}

#[cfg(not(target_arch = "wasm32"))]
fn load_system_font() -> Option<FontVec> {
    const FONT_PATHS: [&str; 6] = [
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/TTF/DejaVuSans.ttf",
        "/usr/share/fonts/dejavu-sans-fonts/DejaVuSans.ttf",
        "/System/Library/Fonts/Supplemental/Arial.ttf",
        "/System/Library/Fonts/Arial.ttf",
        "C:\\Windows\\Fonts\\arial.ttf",
    ];
    for path in FONT_PATHS {
        if let Ok(data) = std::fs::read(path) {
            if let Ok(font) = FontVec::try_from_vec(data) {
                log::info!("Loaded label font: {path}");
                return Some(font);
            }
        }
    }
    None
}

/// The proportional font bundled with egui.
pub fn bundled_font() -> Option<FontVec> {
    let fonts = egui::FontDefinitions::default();
    let data = fonts.font_data.get("Ubuntu-Light")?;
    FontVec::try_from_vec(data.font.to_vec()).ok()
}

/// Write `P-<stem>.jpg` and `D-<stem>.csv` into `dir`.
pub fn save_measurements(
    dir: &Path,
    stem: &str,
    annotated: &RgbImage,
    settings: &RectificationSettings,
    records: &[MeasurementRecord],
) -> Result<(PathBuf, PathBuf)> {
    let image_name = save_image_name(stem);
    let image_path = dir.join(&image_name);
    annotated.save(&image_path)?;

    let data_path = dir.join(data_file_name(stem));
    std::fs::write(&data_path, measurement_table(&image_name, settings, records))?;

    log::info!(
        "Saved {} measurement(s) to {} and {}",
        records.len(),
        image_path.display(),
        data_path.display()
    );
    Ok((image_path, data_path))
}
