//! End-to-end scenarios driven through the public session API.
//!
//! Each test plays a short user story against a [`ViewerSession`] and checks
//! what a host would observe: outcomes, stored overlays, written files.

use std::str::FromStr;

use image::{Rgb, RgbImage};
use serde_json::json;

use tracelens::ViewerSession;
use tracelens::config::UserPreferences;
use tracelens::editing::{EditOutcome, EditingState, PointerEvent, Tool};
use tracelens::filter::{self, FilterMode};
use tracelens::overlay::{HexColor, OverlayGeometry, OverlayKind};
use tracelens::persistence::{JsonFileStore, KeyValueStore};
use tracelens::source::MemorySource;
use tracelens::store::{OverlayEdit, OverlayStore, StoreError};
use tracelens::zoom::{CoordinateMapper, DevicePoint, ImageSize, Point, ZoomState};
use tracelens::error::ViewerError;

/// Dark traces on a light background, with a colored band.
fn trace_image() -> RgbImage {
    RgbImage::from_fn(200, 120, |x, y| {
        if y == 60 || (x + y) % 37 == 0 {
            Rgb([20, 20, 30])
        } else if y < 10 {
            Rgb([200, 40, 40])
        } else {
            Rgb([235, 235, 225])
        }
    })
}

fn session() -> ViewerSession {
    let mut session = ViewerSession::new(UserPreferences::default());
    session
        .load_from(&mut MemorySource::new(trace_image()))
        .unwrap();
    session
}

fn at(x: i32, y: i32) -> DevicePoint {
    DevicePoint::new(x, y)
}

/// Draw a ruler with the default flow: press, color, drag, release, note.
fn draw_ruler(session: &mut ViewerSession, from: (i32, i32), to: (i32, i32), note: &str) {
    session.select_tool(Tool::Ruler).unwrap();
    session.pointer(PointerEvent::Press(at(from.0, from.1))).unwrap();
    session.commit_color(HexColor::RED).unwrap();
    session.pointer(PointerEvent::Release(at(to.0, to.1))).unwrap();
    session.commit_text(note).unwrap();
}

// ============================================================================
// Coordinate mapping
// ============================================================================

#[test]
fn test_round_trip_at_every_zoom() {
    let size = ImageSize::new(200, 120);
    let mapper = CoordinateMapper::new();
    for percent in (10..=400).step_by(10) {
        let zoom = ZoomState::new(percent);
        for point in [Point::new(0, 0), Point::new(17, 33), Point::new(199, 119)] {
            let device = CoordinateMapper::to_device_space(point, &zoom);
            let back = mapper.to_image_space(device, &zoom, size).unwrap();
            if percent >= 100 {
                assert_eq!(back, point, "zoom {percent}%");
            } else {
                let err = CoordinateMapper::to_device_space(back, &zoom);
                assert!((err.x - device.x).abs() <= 1, "zoom {percent}%");
                assert!((err.y - device.y).abs() <= 1, "zoom {percent}%");
            }
        }
    }
}

#[test]
fn test_out_of_bounds_press_changes_nothing() {
    let mut session = session();
    session.select_tool(Tool::Note).unwrap();

    for device in [at(-1, 5), at(5, -1), at(200, 5), at(5, 120)] {
        let outcome = session.pointer(PointerEvent::Press(device)).unwrap();
        assert_eq!(outcome, EditOutcome::Ignored);
        assert_eq!(session.editing_state(), &EditingState::Armed(Tool::Note));
    }
    assert!(session.overlays().is_empty());
}

#[test]
fn test_overlays_follow_zoom_without_changing() {
    let mut session = session();
    draw_ruler(&mut session, (10, 10), (100, 10), "baseline");
    let stored = session.overlays().overlays().to_vec();

    session.zoom_mut().set_scale(300);
    session.zoom_mut().set_scroll(40, 0);
    session.set_enhanced(true);
    session.set_contrast_mode(FilterMode::Binary);

    assert_eq!(session.overlays().overlays(), stored.as_slice());
    let labels = session.overlay_draw_list();
    assert_eq!(labels.labels(), vec!["90.0px (baseline)"]);
}

// ============================================================================
// Filtering and export
// ============================================================================

#[test]
fn test_filters_are_idempotent_and_none_is_identity() {
    let img = trace_image();
    assert_eq!(filter::apply(&img, FilterMode::None).unwrap(), img);
    for &mode in FilterMode::all() {
        let once = filter::apply(&img, mode).unwrap();
        let twice = filter::apply(&img, mode).unwrap();
        assert_eq!(once, twice, "{mode}");
    }
}

#[test]
fn test_exported_png_matches_preview() {
    let mut session = session();
    session.set_enhanced(true);
    session.set_contrast_mode(FilterMode::EnhancedColor);
    session.set_trace_enhancement(true);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("export.png");
    let size = session.export_view(&path, false).unwrap();
    assert_eq!(size, ImageSize::new(500, 300));

    let written = image::open(&path).unwrap().to_rgb8();
    assert_eq!(written, session.render_bitmap().unwrap());
}

#[test]
fn test_composited_export_differs_only_where_overlays_are() {
    let mut session = session();
    draw_ruler(&mut session, (10, 100), (150, 100), "");

    let plain = session.render_bitmap().unwrap();
    let (composited, labels) = session.render_composited().unwrap();
    assert_eq!(composited.dimensions(), plain.dimensions());
    assert_ne!(composited, plain);
    assert_eq!(composited.get_pixel(190, 20), plain.get_pixel(190, 20));
    assert_eq!(labels.len(), 1);
}

// ============================================================================
// Editing and the overlay store
// ============================================================================

#[test]
fn test_ruler_scenario() {
    let mut session = session();
    session.select_tool(Tool::Ruler).unwrap();

    assert_eq!(
        session.pointer(PointerEvent::Press(at(10, 10))).unwrap(),
        EditOutcome::PromptRulerColor
    );
    session
        .commit_color(HexColor::from_str("#FF0000").unwrap())
        .unwrap();
    assert_eq!(
        session.pointer(PointerEvent::Move(at(50, 10))).unwrap(),
        EditOutcome::PreviewUpdated
    );
    assert_eq!(
        session.pointer(PointerEvent::Release(at(100, 10))).unwrap(),
        EditOutcome::PromptDraftNote
    );
    assert!(session.overlays().is_empty());
    assert_eq!(session.commit_text("baseline").unwrap(), EditOutcome::Committed(0));

    assert_eq!(session.overlays().len(), 1);
    let ruler = session.overlays().get(0).unwrap();
    assert_eq!(ruler.kind(), OverlayKind::Ruler);
    assert_eq!(
        ruler.geometry,
        OverlayGeometry::Ruler {
            start: Point::new(10, 10),
            end: Point::new(100, 10),
        }
    );
    assert_eq!(ruler.color.to_string(), "#FF0000");
    assert_eq!(ruler.note_text(), Some("baseline"));
    assert_eq!(session.editing_state(), &EditingState::Armed(Tool::Ruler));

    let row = &session.overlay_rows()[0];
    assert_eq!(row.position, "(10, 10) to (100, 10)");
    assert_eq!(row.details, "Distance: 90.0px - baseline");
}

#[test]
fn test_tool_change_refused_mid_drawing() {
    let mut session = session();
    session.select_tool(Tool::RegionOfInterest).unwrap();
    session.pointer(PointerEvent::Press(at(20, 20))).unwrap();

    assert!(matches!(
        session.select_tool(Tool::Note),
        Err(ViewerError::Edit(_))
    ));
    assert_eq!(
        session.pointer(PointerEvent::Secondary).unwrap(),
        EditOutcome::Discarded
    );
    assert!(session.select_tool(Tool::Note).is_ok());
}

#[test]
fn test_delete_out_of_range_and_clear() {
    let mut session = session();
    for x in [10, 40, 70] {
        session.select_tool(Tool::Note).unwrap();
        session.pointer(PointerEvent::Press(at(x, 30))).unwrap();
        session.commit_text("spike").unwrap();
    }
    let before = session.overlays().serialize();

    assert!(matches!(
        session.delete_overlay(5),
        Err(ViewerError::Store(StoreError::IndexOutOfRange { index: 5, len: 3 }))
    ));
    assert_eq!(session.overlays().serialize(), before);

    assert!(session.edit_overlay(1, &OverlayEdit::Text("artifact".into())).unwrap());
    assert_eq!(session.overlay_rows()[1].details, "artifact");

    session.clear_overlays();
    assert_eq!(session.overlays().len(), 0);
    assert!(session.overlays().serialize().is_empty());
}

#[test]
fn test_unknown_kind_among_valid_records() {
    let json = json!([
        {"id": "a", "kind": "Note", "data": {"position": [5, 5], "text": "hi", "color": "#00FF00"}},
        {"id": "b", "kind": "Arrow", "data": {"from": [1, 1]}},
        {"id": "c", "type": "ROI", "data": {"top_left": [1, 2], "bottom_right": [30, 20]}}
    ]);
    let (store, report) = OverlayStore::from_json(&json.to_string()).unwrap();

    assert_eq!(store.len(), 2);
    assert_eq!(report.loaded, 2);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].id.as_deref(), Some("b"));
    assert_eq!(store.get(1).unwrap().kind(), OverlayKind::RegionOfInterest);
}

#[test]
fn test_overlay_file_round_trip_through_sessions() {
    let mut first = session();
    draw_ruler(&mut first, (10, 10), (40, 50), "");
    first.select_tool(Tool::RegionOfInterest).unwrap();
    first.pointer(PointerEvent::Press(at(60, 60))).unwrap();
    first.pointer(PointerEvent::Release(at(100, 80))).unwrap();
    first.cancel().unwrap();
    first.select_tool(Tool::Note).unwrap();
    first.pointer(PointerEvent::Press(at(3, 4))).unwrap();
    first.commit_text("start").unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("overlays.json");
    assert_eq!(first.export_overlays(&path).unwrap(), 3);

    let mut second = session();
    let report = second.import_overlays(&path).unwrap();
    assert!(!report.has_skipped());
    assert_eq!(second.overlays().overlays(), first.overlays().overlays());
}

// ============================================================================
// Session persistence
// ============================================================================

#[test]
fn test_session_restored_from_settings_file() {
    let dir = tempfile::tempdir().unwrap();
    let settings_path = dir.path().join("session.json");

    let mut session = session();
    session.set_enhanced(true);
    session.set_contrast_mode(FilterMode::InvertedHCGray);
    session.zoom_mut().set_scroll(12, 8);
    assert!(session.save_position("onset"));
    draw_ruler(&mut session, (10, 10), (40, 50), "");

    let mut store = JsonFileStore::open(&settings_path).unwrap();
    session.close(&mut store).unwrap();
    assert!(settings_path.exists());

    let store = JsonFileStore::open(&settings_path).unwrap();
    assert!(store.get("analysis_overlays").is_some());
    let (mut reopened, report) = ViewerSession::open(UserPreferences::default(), &store);
    assert!(report.settings.is_empty());
    assert_eq!(reopened.zoom().scale_percent(), 250);
    assert_eq!(reopened.pipeline().mode, FilterMode::InvertedHCGray);
    assert_eq!(reopened.overlays().overlays(), session.overlays().overlays());
    assert_eq!(reopened.editing_state(), &EditingState::Armed(Tool::Ruler));

    reopened.zoom_mut().reset();
    assert!(reopened.load_position("onset"));
    assert_eq!(reopened.zoom().scroll(), (12, 8));
}

#[test]
fn test_corrupt_settings_fall_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    std::fs::write(
        &path,
        r#"{"last_zoom": "huge", "contrast_mode": 42, "analysis_overlays": 7}"#,
    )
    .unwrap();

    let store = JsonFileStore::open(&path).unwrap();
    let (session, report) = ViewerSession::open(UserPreferences::default(), &store);
    assert_eq!(session.zoom().scale_percent(), 100);
    assert_eq!(session.pipeline().mode, FilterMode::None);
    assert!(session.overlays().is_empty());
    assert!(!report.settings.is_empty());
}
