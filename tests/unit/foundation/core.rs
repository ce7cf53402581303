use super::*;

fn approx(a: Point, b: Point) -> bool {
    (a - b).hypot() < 1e-9
}

#[test]
fn viewport_rejects_bad_zoom() {
    let r = Rect::new(0.0, 0.0, 10.0, 10.0);
    assert!(Viewport::new(r, 0.0).is_err());
    assert!(Viewport::new(r, f64::NAN).is_err());
    assert!(Viewport::new(r, -1.0).is_err());
    assert!(Viewport::new(r, 0.5).is_ok());
}

#[test]
fn padded_size_rounds_and_adds_margin() {
    let v = Viewport::new(Rect::new(10.0, 20.0, 110.0, 70.0), 1.5).unwrap();
    assert_eq!(v.screen_size(), (150, 75));
    assert_eq!(v.padded_size(100), (350, 275));
}

#[test]
fn padded_size_saturates_on_huge_pad() {
    let v = Viewport::new(Rect::new(0.0, 0.0, 10.0, 10.0), 1.0).unwrap();
    assert_eq!(v.padded_size(u32::MAX / 2), (u32::MAX, u32::MAX));
}

#[test]
fn buffer_and_world_maps_are_inverse() {
    let v = Viewport::new(Rect::new(-40.0, 12.0, 60.0, 90.0), 2.0).unwrap();
    let to_buf = v.world_to_buffer(100);
    let to_world = v.buffer_to_world(100);
    for p in [
        Point::new(0.0, 0.0),
        Point::new(-40.0, 12.0),
        Point::new(17.25, 33.5),
    ] {
        assert!(approx(to_world * (to_buf * p), p));
    }
    // World origin of the viewport lands at (pad, pad).
    assert!(approx(to_buf * Point::new(-40.0, 12.0), Point::new(100.0, 100.0)));
}

#[test]
fn screen_to_world_matches_world_to_screen() {
    let v = Viewport::new(Rect::new(5.0, 5.0, 25.0, 25.0), 4.0).unwrap();
    let device = Point::new(8.0, 12.0);
    let world = v.screen_to_world(device);
    assert!(approx(world, Point::new(7.0, 8.0)));
    assert!(approx(v.world_to_screen() * world, device));
}
