use super::*;
use crate::foundation::core::Vec2;
use crate::transform::mls::Deformation;

fn close(a: Point, b: Point) -> bool {
    (a - b).hypot() < 1e-9
}

#[test]
fn singular_affine_has_no_inverse() {
    let flat = Affine::new([1.0, 0.0, 0.0, 0.0, 2.0, 3.0]);
    assert!(matches!(
        flat.apply_inverse(Point::ORIGIN),
        Err(WarpError::NonInvertible { .. })
    ));
    assert!(Conjugated::new(flat, Arc::new(Affine::IDENTITY)).is_err());
}

#[test]
fn conjugated_evaluates_inner_in_frame_space() {
    // Frame doubles; inner translates by 4 in framed space, i.e. by 2 outside.
    let c = Conjugated::new(
        Affine::scale(2.0),
        Arc::new(Deformation::Translation(Vec2::new(4.0, 0.0))),
    )
    .unwrap();
    assert!(close(c.apply(Point::new(1.0, 1.0)), Point::new(3.0, 1.0)));
    assert!(close(c.apply_inverse(Point::new(3.0, 1.0)).unwrap(), Point::new(1.0, 1.0)));
    let a = c.as_affine().unwrap();
    assert!(close(a * Point::new(5.0, 5.0), Point::new(7.0, 5.0)));
}

#[test]
fn conjugated_identity_is_identity() {
    let frame = Affine::translate((13.0, -4.0)) * Affine::rotate(0.7);
    let c = Conjugated::new(frame, Arc::new(Deformation::Identity)).unwrap();
    let p = Point::new(8.0, 2.5);
    assert!(close(c.apply(p), p));
}

#[test]
fn chain_applies_in_order_and_folds_affines() {
    let mut chain = TransformChain::new();
    assert!(chain.is_empty());
    assert_eq!(chain.as_affine(), Some(Affine::IDENTITY));

    chain.push(Arc::new(Affine::scale(3.0)));
    chain.push(Arc::new(Affine::translate((1.0, 0.0))));
    assert_eq!(chain.len(), 2);

    let p = Point::new(2.0, 2.0);
    assert!(close(chain.apply(p), Point::new(7.0, 6.0)));
    assert!(close(chain.as_affine().unwrap() * p, Point::new(7.0, 6.0)));
    assert!(close(chain.apply_inverse(Point::new(7.0, 6.0)).unwrap(), p));

    let b = chain.bounds_of(Rect::new(0.0, 0.0, 2.0, 1.0), 4);
    assert_eq!(b, Rect::new(1.0, 0.0, 7.0, 3.0));
}

#[test]
fn chain_bounds_samples_non_affine_members() {
    #[derive(Debug)]
    struct Bulge;
    impl CoordinateTransform for Bulge {
        fn apply(&self, p: Point) -> Point {
            Point::new(p.x, p.y + (p.x * (4.0 - p.x)))
        }
    }
    let mut chain = TransformChain::new();
    chain.push(Arc::new(Bulge));
    assert!(chain.as_affine().is_none());
    let b = chain.bounds_of(Rect::new(0.0, 0.0, 4.0, 1.0), 4);
    // Peak at x = 2 lifts the bottom edge to 1 + 4.
    assert!((b.y1 - 5.0).abs() < 1e-9);
}
