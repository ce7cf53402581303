use super::*;

#[test]
fn over_opaque_source_replaces() {
    assert_eq!(over([1, 2, 3, 255], [9, 8, 7, 255]), [9, 8, 7, 255]);
}

#[test]
fn over_transparent_source_keeps_dst() {
    assert_eq!(over([1, 2, 3, 255], [9, 8, 7, 0]), [1, 2, 3, 255]);
}

#[test]
fn over_half_alpha_mixes() {
    let out = over([0, 0, 200, 255], [128, 0, 0, 128]);
    assert_eq!(out[3], 255);
    assert_eq!(out[0], 128);
    assert!((i32::from(out[2]) - 100).abs() <= 1);
}

#[test]
fn opaque_separable_modes() {
    let dst = [200, 100, 0, 255];
    let src = [100, 200, 50, 255];
    assert_eq!(blend(BlendMode::Add, dst, src), [255, 255, 50, 255]);
    assert_eq!(blend(BlendMode::Subtract, dst, src), [100, 0, 0, 255]);
    assert_eq!(blend(BlendMode::Difference, dst, src), [100, 100, 50, 255]);
    let m = blend(BlendMode::Multiply, dst, src);
    assert!((i32::from(m[0]) - 78).abs() <= 1);
    assert_eq!(m[2], 0);
}

#[test]
fn blend_onto_transparent_is_source() {
    let src = [60, 30, 10, 128];
    for mode in [BlendMode::Add, BlendMode::Multiply, BlendMode::Difference] {
        let out = blend(mode, [0, 0, 0, 0], src);
        for i in 0..4 {
            assert!((i32::from(out[i]) - i32::from(src[i])).abs() <= 1, "{mode:?}");
        }
    }
}

#[test]
fn blend_mode_serde_snake_case() {
    let m: BlendMode = serde_json::from_str("\"difference\"").unwrap();
    assert_eq!(m, BlendMode::Difference);
    assert!(BlendMode::default().is_normal());
}

#[test]
fn coverage_rescales_color() {
    assert_eq!(with_coverage([100, 50, 0, 255], 255), [100, 50, 0, 255]);
    assert_eq!(with_coverage([200, 100, 0, 255], 0), [0, 0, 0, 0]);
    let half = with_coverage([200, 100, 0, 255], 128);
    assert_eq!(half[3], 128);
    assert!((i32::from(half[0]) - 100).abs() <= 1);
}
