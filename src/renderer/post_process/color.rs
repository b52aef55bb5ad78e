//! Colour math for grading constants.

use glam::{Vec3, Vec4};

/// Rec. 709 luminance weights for linear colours.
const LUMINANCE_WEIGHTS: Vec3 = Vec3::new(0.212_672_9, 0.715_152_2, 0.072_175);

/// D65 white point in LMS space.
const D65_LMS: Vec3 = Vec3::new(0.949_237, 1.035_42, 1.087_28);

/// CIE x of the D65 white point.
const D65_X: f32 = 0.312_71;

/// sRGB transfer function, gamma to linear.
#[must_use]
pub fn gamma_to_linear(value: f32) -> f32 {
    if value <= 0.040_45 {
        value / 12.92
    } else {
        ((value + 0.055) / 1.055).powf(2.4)
    }
}

/// Converts the rgb channels of an sRGB colour; alpha is untouched.
#[must_use]
pub fn srgb_to_linear(color: Vec4) -> Vec4 {
    Vec4::new(
        gamma_to_linear(color.x),
        gamma_to_linear(color.y),
        gamma_to_linear(color.z),
        color.w,
    )
}

#[inline]
#[must_use]
pub fn luminance(rgb: Vec3) -> f32 {
    rgb.dot(LUMINANCE_WEIGHTS)
}

/// CIE y on the daylight locus for a given x.
#[inline]
#[must_use]
pub fn standard_illuminant_y(x: f32) -> f32 {
    2.87 * x - 3.0 * x * x - 0.275_095_07
}

/// CIE xy chromaticity (Y = 1) to LMS.
#[must_use]
pub fn cie_xy_to_lms(x: f32, y: f32) -> Vec3 {
    let big_y = 1.0;
    let big_x = big_y * x / y;
    let big_z = big_y * (1.0 - x - y) / y;

    let l = 0.7328 * big_x + 0.4296 * big_y - 0.1624 * big_z;
    let m = -0.7036 * big_x + 1.6975 * big_y + 0.0061 * big_z;
    let s = 0.0030 * big_x + 0.0136 * big_y + 0.9834 * big_z;
    Vec3::new(l, m, s)
}

/// White-balance coefficients in LMS space.
///
/// `temperature` and `tint` are in `[-100, 100]`; zero for both yields
/// (almost exactly) identity.
#[must_use]
pub fn color_balance_to_lms(temperature: f32, tint: f32) -> Vec3 {
    let t1 = temperature / 65.0;
    let t2 = tint / 65.0;

    let x = D65_X - t1 * if t1 < 0.0 { 0.1 } else { 0.05 };
    let y = standard_illuminant_y(x) + t2 * 0.05;

    D65_LMS / cie_xy_to_lms(x, y)
}

/// Shader-ready lift, gamma and gain vectors.
#[must_use]
pub fn prepare_lift_gamma_gain(lift: Vec4, gamma: Vec4, gain: Vec4) -> (Vec4, Vec4, Vec4) {
    let lift_rgb = linear_rgb(lift) * 0.15;
    let lift_rgb = lift_rgb - Vec3::splat(luminance(lift_rgb)) + Vec3::splat(lift.w);

    let gamma_rgb = linear_rgb(gamma) * 0.8;
    let gamma_w = gamma.w + 1.0;
    let gamma_rgb = (gamma_rgb - Vec3::splat(luminance(gamma_rgb)) + Vec3::splat(gamma_w))
        .max(Vec3::splat(1e-3))
        .recip();

    let gain_rgb = linear_rgb(gain) * 0.8;
    let gain_w = gain.w + 1.0;
    let gain_rgb = gain_rgb - Vec3::splat(luminance(gain_rgb)) + Vec3::splat(gain_w);

    (lift_rgb.extend(0.0), gamma_rgb.extend(0.0), gain_rgb.extend(0.0))
}

/// Split-toning colours stay in sRGB; the balance rides in `shadows.w`.
#[must_use]
pub fn prepare_split_toning(shadows: Vec4, highlights: Vec4, balance: f32) -> (Vec4, Vec4) {
    (
        shadows.truncate().extend(balance / 100.0),
        highlights.truncate().extend(0.0),
    )
}

fn linear_rgb(color: Vec4) -> Vec3 {
    srgb_to_linear(color).truncate()
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-3;

    #[test]
    fn test_gamma_to_linear_endpoints() {
        assert!(gamma_to_linear(0.0).abs() < EPSILON);
        assert!((gamma_to_linear(1.0) - 1.0).abs() < EPSILON);
        assert!((gamma_to_linear(0.5) - 0.214).abs() < EPSILON);
    }

    #[test]
    fn test_neutral_white_balance_is_identity() {
        let lms = color_balance_to_lms(0.0, 0.0);
        assert!((lms - Vec3::ONE).abs().max_element() < 0.01, "{lms:?}");
    }

    #[test]
    fn test_neutral_lift_gamma_gain() {
        let one = Vec4::new(1.0, 1.0, 1.0, 0.0);
        let (lift, gamma, gain) = prepare_lift_gamma_gain(one, one, one);
        // Equal channels cancel against their own luminance.
        assert!(lift.truncate().abs().max_element() < EPSILON);
        assert!((gamma.truncate() - Vec3::ONE).abs().max_element() < EPSILON);
        assert!((gain.truncate() - Vec3::ONE).abs().max_element() < EPSILON);
    }

    #[test]
    fn test_split_toning_balance_in_w() {
        let (s, h) = prepare_split_toning(Vec4::splat(0.5), Vec4::splat(0.5), 50.0);
        assert!((s.w - 0.5).abs() < EPSILON);
        assert!(h.w.abs() < EPSILON);
    }
}
