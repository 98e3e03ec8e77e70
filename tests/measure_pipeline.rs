use approx::assert_abs_diff_eq;
use fish_mesh::geometry::Point;
use fish_mesh::mapping::ViewFit;
use fish_mesh::session::Session;
use fish_mesh::settings::Settings;
use fish_mesh::FishMeshError;
use image::{Rgb, RgbImage};

/// A 400x300 photo of a white board on a dark background. The board is
/// slightly off axis-aligned and its corners are returned top-left first.
fn board_photo() -> (RgbImage, [Point; 4]) {
    let corners = [
        Point::new(62.0, 48.0),
        Point::new(342.0, 55.0),
        Point::new(330.0, 250.0),
        Point::new(70.0, 240.0),
    ];
    let image = RgbImage::from_fn(400, 300, |x, y| {
        let center = Point::new(x as f64 + 0.5, y as f64 + 0.5);
        if inside(&corners, &center) {
            Rgb([250, 250, 250])
        } else {
            Rgb([20, 30, 40])
        }
    });
    (image, corners)
}

/// Point-in-convex-quad test for corners wound clockwise on screen.
fn inside(quad: &[Point; 4], p: &Point) -> bool {
    (0..4).all(|i| {
        let (a, b) = (quad[i], quad[(i + 1) % 4]);
        (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x) >= 0.0
    })
}

fn pixel_at(img: &RgbImage, nx: f64, ny: f64) -> [u8; 3] {
    let x = ((nx * img.width() as f64) as u32).min(img.width() - 1);
    let y = ((ny * img.height() as f64) as u32).min(img.height() - 1);
    img.get_pixel(x, y).0
}

fn traced_session() -> Session {
    let (image, corners) = board_photo();
    let mut session = Session::default();
    session
        .load_image(image, Some("board.png".to_owned()))
        .unwrap();
    // Place corners in a scrambled order to exercise ordering.
    for (i, &c) in [corners[2], corners[0], corners[3], corners[1]].iter().enumerate() {
        session.set_corner(i, Point::new(c.x / 400.0, c.y / 300.0));
    }
    session.rectify().unwrap();
    session
}

#[test]
fn ruler_across_inner_box_measures_board_width() {
    let mut session = traced_session();
    let rectified = session.rectified().unwrap();
    assert!(rectified.width() > 0 && rectified.height() > 0);

    let settings = session.settings().rectification().unwrap();
    let m = settings.margin_ratio();
    session.place_ruler_point(Point::new(m, 0.5));
    session.place_ruler_point(Point::new(1.0 - m, 0.5));
    session.place_ruler_point(Point::new(0.5, m));
    session.place_ruler_point(Point::new(0.5, 1.0 - m));

    let records = session.records().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].measurement_id, 1);
    assert_abs_diff_eq!(records[0].length_cm, 42.0, epsilon = 1e-9);
    assert_eq!(records[1].measurement_id, 2);
    assert_abs_diff_eq!(records[1].length_cm, 29.6, epsilon = 1e-9);
}

#[test]
fn board_fills_the_inner_box_after_rectifying() {
    let session = traced_session();
    let img = &session.rectified().unwrap().image;
    let white = |px: [u8; 3]| px.iter().all(|&c| c > 200);
    let dark = |px: [u8; 3]| px.iter().all(|&c| c < 60);

    for (nx, ny) in [(0.5, 0.5), (0.12, 0.12), (0.88, 0.88), (0.12, 0.88), (0.88, 0.12)] {
        let px = pixel_at(img, nx, ny);
        assert!(white(px), "({nx}, {ny}) should be on the board, got {px:?}");
    }
    for (nx, ny) in [(0.05, 0.05), (0.95, 0.5), (0.5, 0.95)] {
        let px = pixel_at(img, nx, ny);
        assert!(dark(px), "({nx}, {ny}) should be off the board, got {px:?}");
    }
}

#[test]
fn rectified_aspect_follows_traced_box() {
    let session = traced_session();
    let rectified = session.rectified().unwrap();
    // The traced box is wider than tall, so width stays at the photo width.
    assert!(rectified.box_aspect_ratio > 1.0);
    assert_eq!(rectified.width(), 400);
    let expected_height = (400.0 / rectified.box_aspect_ratio).round() as u32;
    assert!(rectified.height().abs_diff(expected_height) <= 1);
}

#[test]
fn collapsed_box_keeps_last_good_result() {
    let mut session = traced_session();
    let before = session.rectified().unwrap().image.clone();
    session.set_corner(0, Point::new(0.1, 0.1));
    session.set_corner(1, Point::new(0.2, 0.2));
    session.set_corner(2, Point::new(0.3, 0.3));
    session.set_corner(3, Point::new(0.4, 0.4));
    assert!(matches!(
        session.rectify(),
        Err(FishMeshError::DegenerateQuadrilateral)
    ));
    assert_eq!(session.rectified().unwrap().image, before);
}

#[test]
fn export_writes_image_and_table() {
    let mut session = traced_session();
    session.place_ruler_point(Point::new(0.2, 0.4));
    session.place_ruler_point(Point::new(0.7, 0.4));

    let dir = std::env::temp_dir().join(format!("fish-mesh-export-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let rectified = session.rectified().unwrap();
    let fit = ViewFit::fit(
        rectified.width() as f64,
        rectified.height() as f64,
        800.0,
        600.0,
    );

    let (image_path, data_path) = session.export(&dir, "test", &fit, None).unwrap();
    assert!(image_path.ends_with("P-test.jpg"));
    assert!(data_path.ends_with("D-test.csv"));

    let saved = image::open(&image_path).unwrap();
    assert_eq!(saved.width(), rectified.width());
    let table = std::fs::read_to_string(&data_path).unwrap();
    let rows: Vec<_> = table.lines().collect();
    assert_eq!(rows.len(), 2);
    assert!(rows[1].starts_with("P-test.jpg,42.0,29.6,1,"));

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn settings_change_rescales_rulers_and_rectifies_again() {
    let mut session = traced_session();
    session.place_ruler_point(Point::new(0.25, 0.3));
    session.place_ruler_point(Point::new(0.75, 0.7));
    let before = session.records().unwrap()[0].length_cm;

    session
        .apply_settings(Settings {
            measure_box_margin_ratio: 0.05,
            ..Settings::default()
        })
        .unwrap();

    let after = session.records().unwrap()[0].length_cm;
    assert_abs_diff_eq!(before, after, epsilon = 1e-9);
    assert!(session.rectified().is_some());
}
