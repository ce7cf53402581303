use super::*;
use crate::transform::mls::{ControlPoint, fit_deformation};

#[test]
fn grid_resolution_follows_shorter_side() {
    let m = WarpMesh::build(&Affine::IDENTITY, 64.0, 32.0, 4);
    // 8x4 cells, two triangles each.
    assert_eq!(m.triangle_count(), 64);
    assert_eq!(m.size(), (64.0, 32.0));
}

#[test]
fn identity_mesh_visits_every_pixel_once_at_its_center() {
    let m = WarpMesh::build(&Affine::IDENTITY, 10.0, 7.0, 3);
    let mut seen = vec![0u32; 70];
    m.for_each_target_pixel(10, 7, |x, y, s| {
        seen[(y * 10 + x) as usize] += 1;
        assert!((s.x - (f64::from(x) + 0.5)).abs() < 1e-9);
        assert!((s.y - (f64::from(y) + 0.5)).abs() < 1e-9);
    });
    assert!(seen.iter().all(|&n| n == 1));
}

#[test]
fn translated_mesh_leaves_uncovered_pixels_untouched() {
    let m = WarpMesh::build(&Affine::translate((3.0, 0.0)), 8.0, 8.0, 2);
    let mut count = 0;
    m.for_each_target_pixel(8, 8, |x, _, s| {
        count += 1;
        assert!(x >= 3);
        assert!((s.x - (f64::from(x) + 0.5 - 3.0)).abs() < 1e-9);
    });
    assert_eq!(count, 5 * 8);
}

#[test]
fn forward_and_inverse_agree_for_a_deformation() {
    let pts = [
        ControlPoint::new(Point::new(10.0, 10.0), Point::new(12.0, 11.0)),
        ControlPoint::new(Point::new(90.0, 10.0), Point::new(88.0, 14.0)),
        ControlPoint::new(Point::new(50.0, 80.0), Point::new(50.0, 75.0)),
    ];
    let d = fit_deformation(&pts, 1.0).unwrap();
    let m = d.build_mesh(100.0, 100.0, 16);
    for p in [Point::new(25.0, 30.0), Point::new(60.0, 50.0)] {
        let q = m.apply(p).unwrap();
        let back = m.apply_inverse(q).unwrap();
        assert!((back - p).hypot() < 1e-6);
        // The mesh approximates the deformation.
        assert!((q - d.apply(p)).hypot() < 1.0);
    }
    assert!(m.apply(Point::new(-5.0, 0.0)).is_err());
}

#[test]
fn then_composes_on_target_side() {
    let m = WarpMesh::build(&Affine::IDENTITY, 4.0, 4.0, 1).then(Affine::translate((10.0, 0.0)));
    let q = m.apply(Point::new(1.0, 1.0)).unwrap();
    assert!((q - Point::new(11.0, 1.0)).hypot() < 1e-9);
    let b = m.target_bounds().unwrap();
    assert!((b.x0 - 10.0).abs() < 1e-9 && (b.x1 - 14.0).abs() < 1e-9);
    assert_eq!(b.size().height, 4.0);
}
