use press_layout::constants::*;
use press_layout::*;

#[test]
fn test_reference_square_book_with_bleed() {
    let spec = calculate_layout("8x8", true, 20).unwrap();

    assert_eq!(spec.viewport, PixelSize::new(594, 594));
    assert_eq!(spec.output_pixels, PixelSize::new(2475, 2475));
    assert_eq!(spec.trim_box, PixelRect::new(38, 38, 2400, 2400));
    assert_eq!(spec.safety_box, PixelRect::new(188, 188, 2024, 2024));
    assert!(!spec.has_gutter());
    assert!((spec.scale_factor - 4.1667).abs() < 1e-3);
}

#[test]
fn test_without_bleed_output_equals_trim() {
    let spec = calculate_layout("8x8", false, 20).unwrap();

    assert_eq!(spec.viewport, PixelSize::new(576, 576));
    assert_eq!(spec.output_pixels, PixelSize::new(2400, 2400));
    assert_eq!(spec.bleed_px, 0);
    assert_eq!(spec.trim_box, PixelRect::new(0, 0, 2400, 2400));
    assert_eq!(spec.safety_box, PixelRect::new(150, 150, 2100, 2100));
    assert_eq!(px_to_in(spec.trim_box.width), 8.0);
    assert_eq!(px_to_in(spec.safety_box.width), 7.0);
}

#[test]
fn test_output_is_trim_plus_bleed_for_every_size() {
    for trim in TrimSize::ALL {
        for include_bleed in [false, true] {
            let spec = trim.layout(include_bleed, 24);
            let trim_px = spec.trim_pixels();
            let extra = if include_bleed { 2 * spec.bleed_px } else { 0 };

            let dw = spec.output_pixels.width as i64 - (trim_px.width + extra) as i64;
            let dh = spec.output_pixels.height as i64 - (trim_px.height + extra) as i64;
            assert!(dw.abs() <= 1, "{trim} bleed={include_bleed}: width off by {dw}");
            assert!(dh.abs() <= 1, "{trim} bleed={include_bleed}: height off by {dh}");
        }
    }
}

#[test]
fn test_safety_box_inside_trim_by_margin() {
    let margin = in_to_px(SAFETY_MARGIN_IN);

    for trim in TrimSize::ALL {
        for include_bleed in [false, true] {
            let spec = trim.layout(include_bleed, 10);
            let trim_box = spec.trim_box;
            let safety = spec.safety_box;

            assert!(trim_box.strictly_contains(&safety), "{trim} bleed={include_bleed}");
            assert_eq!(safety.x - trim_box.x, margin);
            assert_eq!(safety.y - trim_box.y, margin);
            assert!(trim_box.right() - safety.right() >= margin);
            assert!(trim_box.bottom() - safety.bottom() >= margin);
        }
    }
}

#[test]
fn test_gutter_boundary_at_threshold() {
    let at_threshold = TrimSize::Square10.layout(true, GUTTER_THRESHOLD_PAGES);
    let over_threshold = TrimSize::Square10.layout(true, GUTTER_THRESHOLD_PAGES + 1);

    assert_eq!(at_threshold.gutter_px, 0);
    assert_eq!(over_threshold.gutter_px, in_to_px(GUTTER_IN));

    // Only the binding edge moves
    assert_eq!(
        over_threshold.safety_box.x,
        at_threshold.safety_box.x + over_threshold.gutter_px
    );
    assert_eq!(over_threshold.safety_box.y, at_threshold.safety_box.y);
    assert_eq!(over_threshold.safety_box.right(), at_threshold.safety_box.right());
    assert_eq!(over_threshold.safety_box.height, at_threshold.safety_box.height);
}

#[test]
fn test_thick_books_get_wide_gutter() {
    let spec = TrimSize::Square12.layout(false, THICK_BOOK_THRESHOLD_PAGES + 1);
    assert_eq!(spec.gutter_px, in_to_px(THICK_BOOK_GUTTER_IN));
    assert!(spec.trim_box.strictly_contains(&spec.safety_box));
}

#[test]
fn test_landscape_dimensions() {
    let spec = calculate_layout("11x8.5", true, 30).unwrap();
    assert_eq!(spec.output_pixels, PixelSize::new(3375, 2625));
    assert_eq!(spec.trim_box.width, 3300);
    assert_eq!(spec.trim_box.height, 2550);
}

#[test]
fn test_unknown_trim_size() {
    let result = calculate_layout("A4", true, 20);
    assert!(matches!(result, Err(LayoutError::InvalidTrimSize(ref key)) if key == "A4"));
}

#[test]
fn test_layout_is_deterministic() {
    let a = calculate_layout("12x12", true, 80).unwrap();
    let b = calculate_layout("12x12", true, 80).unwrap();
    assert_eq!(a, b);
}
