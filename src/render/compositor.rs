use clap::ValueEnum;
use image::{Rgba, RgbaImage};

/// Canvas-style composite operations on straight-alpha pixels
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum CompositeOp {
    /// Replace the surface outright
    Copy,
    #[default]
    SourceOver,
    DestinationOver,
    SourceIn,
    SourceAtop,
    DestinationIn,
    DestinationOut,
    Lighter,
    Multiply,
    Screen,
}

impl CompositeOp {
    /// Porter-Duff coefficients applied to source and destination
    fn factors(self, src_a: f32, dst_a: f32) -> (f32, f32) {
        match self {
            CompositeOp::Copy => (1.0, 0.0),
            CompositeOp::SourceOver
            | CompositeOp::Multiply
            | CompositeOp::Screen => (1.0, 1.0 - src_a),
            CompositeOp::DestinationOver => (1.0 - dst_a, 1.0),
            CompositeOp::SourceIn => (dst_a, 0.0),
            CompositeOp::SourceAtop => (dst_a, 1.0 - src_a),
            CompositeOp::DestinationIn => (0.0, src_a),
            CompositeOp::DestinationOut => (0.0, 1.0 - src_a),
            CompositeOp::Lighter => (1.0, 1.0),
        }
    }

    fn blend(self, src: f32, dst: f32) -> f32 {
        match self {
            CompositeOp::Multiply => src * dst,
            CompositeOp::Screen => src + dst - src * dst,
            _ => src,
        }
    }
}

fn unit(v: u8) -> f32 {
    v as f32 / 255.0
}

fn byte(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn compose_pixel(dst: Rgba<u8>, src: Rgba<u8>, op: CompositeOp) -> Rgba<u8> {
    let (sa, da) = (unit(src[3]), unit(dst[3]));
    let (fa, fb) = op.factors(sa, da);

    let alpha = (sa * fa + da * fb).min(1.0);
    if alpha <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }

    let mut out = [0u8; 4];
    for c in 0..3 {
        let (cs, cb) = (unit(src[c]), unit(dst[c]));
        let mixed = (1.0 - da) * cs + da * op.blend(cs, cb);
        let premul = (sa * fa * mixed + da * fb * cb).min(1.0);
        out[c] = byte(premul / alpha);
    }
    out[3] = byte(alpha);
    Rgba(out)
}

/// Compose `src` onto `dst` in place; both buffers must share dimensions
pub fn composite(dst: &mut RgbaImage, src: &RgbaImage, op: CompositeOp) {
    debug_assert_eq!(dst.dimensions(), src.dimensions());
    for (d, s) in dst.pixels_mut().zip(src.pixels()) {
        *d = compose_pixel(*d, *s, op);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPAQUE_RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const OPAQUE_BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);
    const CLEAR: Rgba<u8> = Rgba([0, 0, 0, 0]);

    #[test]
    fn source_over_opaque_replaces() {
        assert_eq!(compose_pixel(OPAQUE_BLUE, OPAQUE_RED, CompositeOp::SourceOver), OPAQUE_RED);
        assert_eq!(compose_pixel(OPAQUE_BLUE, CLEAR, CompositeOp::SourceOver), OPAQUE_BLUE);
    }

    #[test]
    fn source_over_half_alpha_mixes() {
        let half_red = Rgba([255, 0, 0, 128]);
        let out = compose_pixel(OPAQUE_BLUE, half_red, CompositeOp::SourceOver);
        assert_eq!(out, Rgba([128, 0, 127, 255]));
    }

    #[test]
    fn destination_over_keeps_opaque_destination() {
        assert_eq!(
            compose_pixel(OPAQUE_BLUE, OPAQUE_RED, CompositeOp::DestinationOver),
            OPAQUE_BLUE
        );
        assert_eq!(compose_pixel(CLEAR, OPAQUE_RED, CompositeOp::DestinationOver), OPAQUE_RED);
    }

    #[test]
    fn copy_ignores_destination() {
        let ghost = Rgba([10, 20, 30, 40]);
        assert_eq!(compose_pixel(OPAQUE_BLUE, ghost, CompositeOp::Copy), ghost);
    }

    #[test]
    fn destination_out_erases_under_source() {
        assert_eq!(compose_pixel(OPAQUE_BLUE, OPAQUE_RED, CompositeOp::DestinationOut), CLEAR);
        assert_eq!(compose_pixel(OPAQUE_BLUE, CLEAR, CompositeOp::DestinationOut), OPAQUE_BLUE);
    }

    #[test]
    fn source_in_and_atop_follow_destination_alpha() {
        assert_eq!(compose_pixel(CLEAR, OPAQUE_RED, CompositeOp::SourceIn), CLEAR);
        assert_eq!(compose_pixel(OPAQUE_BLUE, OPAQUE_RED, CompositeOp::SourceIn), OPAQUE_RED);
        assert_eq!(compose_pixel(CLEAR, OPAQUE_RED, CompositeOp::SourceAtop), CLEAR);
        assert_eq!(compose_pixel(OPAQUE_BLUE, OPAQUE_RED, CompositeOp::SourceAtop), OPAQUE_RED);
    }

    #[test]
    fn blend_modes() {
        let grey = Rgba([128, 128, 128, 255]);
        let white = Rgba([255, 255, 255, 255]);
        assert_eq!(compose_pixel(white, grey, CompositeOp::Multiply), grey);
        assert_eq!(compose_pixel(OPAQUE_RED, OPAQUE_BLUE, CompositeOp::Screen), Rgba([255, 0, 255, 255]));
        assert_eq!(compose_pixel(OPAQUE_RED, OPAQUE_BLUE, CompositeOp::Lighter), Rgba([255, 0, 255, 255]));
    }

    #[test]
    fn composite_applies_per_pixel() {
        let mut dst = RgbaImage::from_pixel(2, 1, OPAQUE_BLUE);
        let src = RgbaImage::from_fn(2, 1, |x, _| if x == 0 { OPAQUE_RED } else { CLEAR });

        composite(&mut dst, &src, CompositeOp::SourceOver);

        assert_eq!(*dst.get_pixel(0, 0), OPAQUE_RED);
        assert_eq!(*dst.get_pixel(1, 0), OPAQUE_BLUE);
    }
}
