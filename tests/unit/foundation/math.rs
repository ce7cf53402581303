use super::*;

#[test]
fn mul_div255_variants_align() {
    for x in [0u16, 1, 127, 255] {
        for y in [0u16, 1, 127, 255] {
            assert_eq!(u16::from(mul_div255_u8(x, y)), mul_div255_u16(x, y));
        }
    }
}

#[test]
fn premultiply_then_unpremultiply_keeps_opaque_pixels() {
    let mut px = [10u8, 200, 33, 255];
    premultiply_rgba8_in_place(&mut px);
    assert_eq!(px, [10, 200, 33, 255]);
    assert_eq!(unpremultiply_rgba8(px), px);
}

#[test]
fn transparent_pixels_clear_color() {
    let mut px = [90u8, 90, 90, 0];
    premultiply_rgba8_in_place(&mut px);
    assert_eq!(px, [0, 0, 0, 0]);
}
