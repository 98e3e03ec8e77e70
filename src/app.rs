use std::future::Future;
use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver, Sender};

use ab_glyph::FontVec;
use anyhow::Context as _;
use egui::{Align2, Color32, Context, FontId, Image, Pos2, Rect, Shape, Stroke, Vec2};
use image::RgbImage;

use crate::corners::{order_corners, CornerOrder};
use crate::geometry::{Point, Winding};
use crate::mapping::{Bounds, ViewFit};
use crate::rectify::Rotation;
use crate::ruler::{self, CoordinateSpace, LabelSide, RulerId};
use crate::session::Session;
use crate::settings::Settings;

/// Pick radius for handles, in marker radii.
const PICK_RADII: f32 = 3.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    DrawBox,
    Measure,
}

struct LoadedImage {
    bytes: Vec<u8>,
    name: Option<String>,
}

pub struct FishMeshApp {
    img_channel: (Sender<LoadedImage>, Receiver<LoadedImage>),
    save_channel: (Sender<PathBuf>, Receiver<PathBuf>),
    session: Session,
    mode: Mode,
    show_preview: bool,
    settings_open: bool,
    settings_draft: Settings,
    photo_texture: Option<egui::TextureHandle>,
    rectified_texture: Option<egui::TextureHandle>,
    /// Where the rectified image was last drawn, used to size exported labels.
    measure_fit: Option<ViewFit>,
    dragged_corner: Option<usize>,
    dragged_endpoint: Option<(RulerId, usize)>,
    label_font: Option<FontVec>,
    status: Option<String>,
}

impl Default for FishMeshApp {
    fn default() -> Self {
        #[cfg(not(target_arch = "wasm32"))]
        let settings = Settings::load_or_default(&Settings::default_path());
        #[cfg(target_arch = "wasm32")]
        let settings = Settings::default();

        Self {
            img_channel: channel(),
            save_channel: channel(),
            show_preview: settings.show_preview_on_start,
            settings_draft: settings.clone(),
            session: Session::new(settings),
            mode: Mode::DrawBox,
            settings_open: false,
            photo_texture: None,
            rectified_texture: None,
            measure_fit: None,
            dragged_corner: None,
            dragged_endpoint: None,
            label_font: None,
            status: None,
        }
    }
}

impl FishMeshApp {
    /// Called once before the first frame.
    pub fn new(_: &eframe::CreationContext<'_>) -> Self {
        let mut app = FishMeshApp::default();
        let sender = app.img_channel.0.clone();

        app.label_font = crate::export::load_label_font();

        #[cfg(not(target_arch = "wasm32"))]
        {
            let sample_path = std::path::Path::new("assets/sample.jpg");
            if let Ok(bytes) = std::fs::read(sample_path) {
                let _ = sender.send(LoadedImage {
                    bytes,
                    name: Some("sample.jpg".to_owned()),
                });
            }
        }

        #[cfg(target_arch = "wasm32")]
        {
            wasm_bindgen_futures::spawn_local(async move {
                let request = ehttp::Request::get("assets/sample.jpg");
                if let Ok(response) = ehttp::fetch_async(request).await {
                    let _ = sender.send(LoadedImage {
                        bytes: response.bytes,
                        name: Some("sample.jpg".to_owned()),
                    });
                }
            });
        }

        app
    }

    fn report(&mut self, result: anyhow::Result<()>) {
        match result {
            Ok(()) => self.status = None,
            Err(e) => {
                log::warn!("{e:#}");
                self.status = Some(format!("{e:#}"));
            }
        }
    }

    fn refresh_textures(&mut self, ctx: &Context) {
        self.photo_texture = self
            .session
            .image()
            .map(|img| load_texture(ctx, "photo", img));
        self.rectified_texture = self
            .session
            .rectified()
            .map(|r| load_texture(ctx, "rectified", &r.image));
    }

    fn load(&mut self, ctx: &Context, loaded: LoadedImage) {
        let result = decode_image(&loaded.bytes)
            .and_then(|img| Ok(self.session.load_image(img, loaded.name)?));
        self.mode = Mode::DrawBox;
        self.refresh_textures(ctx);
        self.report(result);
    }

    fn rotate(&mut self, ctx: &Context, rotation: Rotation) {
        let result = self.session.rotate(rotation).context("rotating image");
        self.refresh_textures(ctx);
        self.report(result);
    }

    fn rectify(&mut self, ctx: &Context) {
        let result = self
            .session
            .rectify()
            .map(|_| ())
            .context("rectifying measure box");
        self.refresh_textures(ctx);
        self.report(result);
    }

    fn apply_settings(&mut self, ctx: &Context) {
        let draft = self.settings_draft.clone();
        let result = self.session.apply_settings(draft).map_err(anyhow::Error::from);
        #[cfg(not(target_arch = "wasm32"))]
        let result = result.and_then(|()| {
            self.session
                .settings()
                .save(&Settings::default_path())
                .context("saving settings")
        });
        self.refresh_textures(ctx);
        self.report(result);
    }

    /// Export next to `chosen`, the file picked in the save dialog.
    fn save(&mut self, chosen: PathBuf) {
        let (dir, stem) = crate::export::save_target(&chosen);
        let fit = self.measure_fit.or_else(|| {
            self.session
                .rectified()
                .map(|r| ViewFit::unpadded(r.width() as f64, r.height() as f64))
        });
        let result = match fit {
            Some(fit) => self
                .session
                .export(&dir, &stem, &fit, self.label_font.as_ref())
                .map(|(image_path, _)| {
                    self.status = Some(format!("Saved {}", image_path.display()));
                })
                .context("saving measurements"),
            None => Err(anyhow::anyhow!("Nothing to save yet")),
        };
        if let Err(e) = result {
            self.report(Err(e));
        }
    }

    fn open_file_dialog(&self, ctx: &Context) {
        let sender = self.img_channel.0.clone();
        let task = rfd::AsyncFileDialog::new()
            .add_filter("Image", &["png", "jpg", "jpeg", "gif", "bmp", "tif", "tiff"])
            .pick_file();
        let ctx = ctx.clone();
        execute(async move {
            let file = task.await;
            if let Some(file) = file {
                let bytes = file.read().await;
                let _ = sender.send(LoadedImage {
                    bytes,
                    name: Some(file.file_name()),
                });
                ctx.request_repaint();
            }
        });
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn save_dialog(&self, ctx: &Context) {
        let sender = self.save_channel.0.clone();
        let stem = crate::export::default_save_stem(chrono::Utc::now());
        let task = rfd::AsyncFileDialog::new()
            .set_file_name(stem)
            .save_file();
        let ctx = ctx.clone();
        execute(async move {
            if let Some(file) = task.await {
                let _ = sender.send(file.path().to_path_buf());
                ctx.request_repaint();
            }
        });
    }

    fn toolbar(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            if ui.button("📂 Open image").clicked() {
                self.open_file_dialog(ui.ctx());
            }
            ui.separator();
            if ui.button("↺").on_hover_text("Rotate anticlockwise").clicked() {
                self.rotate(ui.ctx(), Rotation::AntiClockwise);
            }
            if ui.button("↻").on_hover_text("Rotate clockwise").clicked() {
                self.rotate(ui.ctx(), Rotation::Clockwise);
            }
            ui.separator();
            ui.selectable_value(&mut self.mode, Mode::DrawBox, "Draw box");
            ui.selectable_value(&mut self.mode, Mode::Measure, "Measure");
            ui.checkbox(&mut self.show_preview, "Preview");
            self.corner_order_choice(ui);
            ui.separator();
            if ui.button("⚙ Settings").clicked() {
                self.settings_draft = self.session.settings().clone();
                self.settings_open = true;
            }
            #[cfg(not(target_arch = "wasm32"))]
            if ui
                .add_enabled(self.session.rectified().is_some(), egui::Button::new("💾 Save"))
                .clicked()
            {
                self.save_dialog(ui.ctx());
            }
        });
        if let Some(status) = &self.status {
            ui.colored_label(Color32::LIGHT_RED, status);
        }
    }

    fn corner_order_choice(&mut self, ui: &mut egui::Ui) {
        let mut order = self.session.corner_order();
        egui::ComboBox::from_id_source("corner_order")
            .selected_text(corner_order_name(order))
            .show_ui(ui, |ui| {
                for choice in [
                    CornerOrder::SumDifference,
                    CornerOrder::Polar(Winding::Clockwise),
                ] {
                    ui.selectable_value(&mut order, choice, corner_order_name(choice));
                }
            })
            .response
            .on_hover_text("How the traced corners are matched to the board corners");
        if order != self.session.corner_order() {
            let result = self
                .session
                .set_corner_order(order)
                .context("rectifying measure box");
            self.refresh_textures(ui.ctx());
            self.report(result);
        }
    }

    fn settings_window(&mut self, ctx: &Context) {
        let mut open = self.settings_open;
        let mut apply = false;
        egui::Window::new("Settings")
            .open(&mut open)
            .resizable(false)
            .show(ctx, |ui| {
                let draft = &mut self.settings_draft;
                egui::Grid::new("settings_grid")
                    .num_columns(2)
                    .spacing([8.0, 4.0])
                    .show(ui, |ui| {
                        ui.label("Measure box width (cm)");
                        ui.add(egui::DragValue::new(&mut draft.measure_box_width).speed(0.1));
                        ui.end_row();

                        ui.label("Measure box height (cm)");
                        ui.add(egui::DragValue::new(&mut draft.measure_box_height).speed(0.1));
                        ui.end_row();

                        ui.label("Measure box margin ratio");
                        ui.add(
                            egui::DragValue::new(&mut draft.measure_box_margin_ratio).speed(0.005),
                        );
                        ui.end_row();

                        ui.label("Font size");
                        ui.add(egui::DragValue::new(&mut draft.font_size).speed(0.5));
                        ui.end_row();

                        ui.label("Point size relative to view width");
                        ui.add(
                            egui::DragValue::new(&mut draft.point_size_relative_to_view_width)
                                .speed(0.0005),
                        );
                        ui.end_row();

                        ui.label("Draw color");
                        let mut rgb = draft.draw_rgb().unwrap_or([255, 255, 0]);
                        if ui.color_edit_button_srgb(&mut rgb).changed() {
                            draft.draw_color = crate::settings::to_hex_color(rgb);
                        }
                        ui.end_row();

                        ui.label("Show preview on start");
                        ui.checkbox(&mut draft.show_preview_on_start, "");
                        ui.end_row();
                    });
                apply = ui.button("Apply").clicked();
            });
        self.settings_open = open;
        if apply {
            self.apply_settings(ctx);
        }
    }

    fn draw_color(&self) -> Color32 {
        let [r, g, b] = self.session.settings().draw_rgb().unwrap_or([255, 255, 0]);
        Color32::from_rgb(r, g, b)
    }

    /// Photo with the draggable measure box.
    fn box_view(&mut self, ui: &mut egui::Ui) {
        let (Some(texture), Some(image)) = (self.photo_texture.clone(), self.session.image())
        else {
            ui.label("Open an image to get started.");
            return;
        };
        let (rect, fit) = allocate_fitted(ui, image.width(), image.height());
        ui.put(image_rect(rect, &fit), Image::new(&texture).fit_to_exact_size(size(&fit)));

        let color = self.draw_color();
        let radius = self.session.settings().point_radius(fit.resized_width as f32);
        let pick = (PICK_RADII * radius) as f64 / fit.resized_width;
        let to_screen = |p: &Point| to_pos(rect, fit.to_view(p));
        let to_normalized = |pos: Pos2| {
            let local = pos - rect.min;
            fit.normalize_clamped(local.x as f64, local.y as f64, Bounds::Image)
        };

        let response = ui.interact(rect, ui.id().with("box_area"), egui::Sense::drag());
        if response.drag_started() {
            let origin = ui.input(|i| i.pointer.press_origin());
            self.dragged_corner = origin
                .map(to_normalized)
                .and_then(|p| self.session.nearest_corner(&p, pick));
        }
        if let (Some(i), Some(pos)) = (self.dragged_corner, response.interact_pointer_pos()) {
            if response.dragged() {
                self.session.set_corner(i, to_normalized(pos));
            }
        }
        if response.drag_stopped() && self.dragged_corner.take().is_some() {
            self.rectify(ui.ctx());
        }

        let outline = order_corners(*self.session.corners(), self.session.corner_order());
        ui.painter().add(Shape::closed_line(
            outline.iter().map(to_screen).collect(),
            Stroke::new(2.0, color),
        ));

        for corner in self.session.corners() {
            ui.painter().circle(
                to_screen(corner),
                radius,
                color,
                Stroke::new(1.0, Color32::BLACK),
            );
        }
    }

    /// Rectified image with rulers.
    fn measure_view(&mut self, ui: &mut egui::Ui) {
        let (Some(texture), Some(rectified)) =
            (self.rectified_texture.clone(), self.session.rectified())
        else {
            ui.label("Draw the measure box first.");
            return;
        };
        let (width, height) = (rectified.width(), rectified.height());
        let (rect, fit) = allocate_fitted(ui, width, height);
        self.measure_fit = Some(fit);
        let response = ui.interact(
            rect,
            ui.id().with("measure_area"),
            egui::Sense::click_and_drag(),
        );
        ui.put(image_rect(rect, &fit), Image::new(&texture).fit_to_exact_size(size(&fit)));

        let settings = self.session.settings().clone();
        let Ok(rect_settings) = settings.rectification() else {
            return;
        };
        let margin = rect_settings.margin_ratio();
        let color = self.draw_color();
        let radius = settings.point_radius(fit.resized_width as f32);
        let pick = (PICK_RADII * radius) as f64 / fit.resized_width;
        let space = CoordinateSpace::Canvas(fit);
        let to_screen = |p: &Point| to_pos(rect, fit.to_view(p));
        let bounds = Bounds::InnerBox {
            margin_ratio: margin,
        };

        let to_normalized = |pos: Pos2| {
            let local = pos - rect.min;
            fit.normalize_clamped(local.x as f64, local.y as f64, bounds)
        };

        if response.drag_started() {
            let origin = ui.input(|i| i.pointer.press_origin());
            self.dragged_endpoint = origin
                .map(to_normalized)
                .and_then(|p| self.session.nearest_ruler_endpoint(&p, pick));
        }
        if let (Some((id, endpoint)), Some(pos)) =
            (self.dragged_endpoint, response.interact_pointer_pos())
        {
            if response.dragged() {
                self.session
                    .move_ruler_endpoint(id, endpoint, to_normalized(pos));
            }
        }
        if response.drag_stopped() {
            self.dragged_endpoint = None;
        }

        let inner = Rect::from_min_max(
            to_screen(&Point::new(margin, margin)),
            to_screen(&Point::new(1.0 - margin, 1.0 - margin)),
        );
        ui.painter().rect_stroke(inner, 0.0, Stroke::new(1.0, color));

        for (index, r) in self.session.rulers().numbered() {
            let [a, b] = r.points.map(|p| to_screen(&p));
            ui.painter().line_segment([a, b], Stroke::new(2.0, color));
            ui.painter().circle_filled(a, radius, color);
            ui.painter().circle_filled(b, radius, color);

            let anchor = ruler::find_label_anchor(&r.points, &space, radius as f64);
            let align = match anchor.side {
                LabelSide::Over => Align2::CENTER_BOTTOM,
                LabelSide::Under => Align2::CENTER_TOP,
                LabelSide::Left => Align2::RIGHT_CENTER,
                LabelSide::Right => Align2::LEFT_CENTER,
            };
            ui.painter().text(
                rect.min + Vec2::new(anchor.x as f32, anchor.y as f32),
                align,
                ruler::label_text(index, ruler::measure(&r.points, &rect_settings)),
                FontId::proportional(settings.font_size),
                color,
            );
        }
        if let Some(start) = self.session.pending_start() {
            let start = to_screen(&start);
            ui.painter()
                .circle_stroke(start, radius, Stroke::new(2.0, color));
            // Rubber band to the pointer, confined like a click would be.
            if let Some(pos) = response.hover_pos() {
                let local = pos - rect.min;
                let (x, y) = fit.clamp(local.x as f64, local.y as f64, bounds);
                let end = rect.min + Vec2::new(x as f32, y as f32);
                ui.painter().line_segment([start, end], Stroke::new(1.0, color));
                ui.painter().circle_filled(end, radius, color);
            }
        }

        if let Some(p) = response.interact_pointer_pos().map(to_normalized) {
            if response.clicked() {
                self.session.place_ruler_point(p);
            } else if response.secondary_clicked() {
                if self.session.pending_start().is_some() {
                    self.session.cancel_pending();
                } else {
                    self.session.delete_ruler_near(&p, pick);
                }
            }
        }
    }

    fn preview_window(&mut self, ctx: &Context) {
        let Some(texture) = self.rectified_texture.clone() else {
            return;
        };
        let mut open = self.show_preview;
        egui::Window::new("Preview")
            .open(&mut open)
            .default_size([240.0, 240.0])
            .show(ctx, |ui| {
                let [w, h] = texture.size();
                let max = ui.available_width().max(64.0);
                let scale = (max / w as f32).min(max / h as f32);
                ui.add(Image::new(&texture).fit_to_exact_size(Vec2::new(w as f32, h as f32) * scale));
            });
        self.show_preview = open;
    }
}

impl eframe::App for FishMeshApp {
    fn update(&mut self, ctx: &Context, _frame: &mut eframe::Frame) {
        if let Ok(loaded) = self.img_channel.1.try_recv() {
            self.load(ctx, loaded);
        }
        if let Ok(dir) = self.save_channel.1.try_recv() {
            self.save(dir);
        }

        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| self.toolbar(ui));

        egui::CentralPanel::default().show(ctx, |ui| match self.mode {
            Mode::DrawBox => self.box_view(ui),
            Mode::Measure => self.measure_view(ui),
        });

        if self.settings_open {
            self.settings_window(ctx);
        }
        if self.show_preview && self.mode == Mode::DrawBox {
            self.preview_window(ctx);
        }
    }
}

fn corner_order_name(order: CornerOrder) -> &'static str {
    match order {
        CornerOrder::SumDifference => "Corners: sum/difference",
        CornerOrder::Polar(_) => "Corners: polar angle",
    }
}

fn decode_image(bytes: &[u8]) -> anyhow::Result<RgbImage> {
    Ok(image::load_from_memory(bytes)
        .context("decoding image")?
        .to_rgb8())
}

fn load_texture(ctx: &Context, name: &str, image: &RgbImage) -> egui::TextureHandle {
    let size = [image.width() as _, image.height() as _];
    let color_image = egui::ColorImage::from_rgb(size, image.as_raw());
    ctx.load_texture(name, color_image, egui::TextureOptions::default())
}

/// Claim the remaining space and fit a `width` x `height` image into it.
fn allocate_fitted(ui: &mut egui::Ui, width: u32, height: u32) -> (Rect, ViewFit) {
    let available = ui.available_size();
    let (rect, _) = ui.allocate_exact_size(available, egui::Sense::hover());
    let fit = ViewFit::fit(
        width as f64,
        height as f64,
        rect.width() as f64,
        rect.height() as f64,
    );
    (rect, fit)
}

fn size(fit: &ViewFit) -> Vec2 {
    Vec2::new(fit.resized_width as f32, fit.resized_height as f32)
}

fn image_rect(rect: Rect, fit: &ViewFit) -> Rect {
    Rect::from_min_size(
        rect.min + Vec2::new(fit.x_padding as f32, fit.y_padding as f32),
        size(fit),
    )
}

fn to_pos(rect: Rect, view: Point) -> Pos2 {
    rect.min + Vec2::new(view.x as f32, view.y as f32)
}

#[cfg(not(target_arch = "wasm32"))]
fn execute<F: Future<Output = ()> + Send + 'static>(f: F) {
    std::thread::spawn(move || futures::executor::block_on(f));
}

#[cfg(target_arch = "wasm32")]
fn execute<F: Future<Output = ()> + 'static>(f: F) {
    wasm_bindgen_futures::spawn_local(f);
}
