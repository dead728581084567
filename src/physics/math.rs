use crate::resources::SharedRng;
use rand::Rng;

/// Scalar type for physics calculations (f64 for precision)
pub type Scalar = f64;

/// 3D vector type for positions, velocities, and accelerations
pub type Vector = bevy::math::DVec3;

/// Rotation type used for orbital orientation
pub type Rotation = bevy::math::DQuat;

/// Replaces a non-finite component with zero.
///
/// Values written into the body arrays pass through here so a single bad input
/// cannot poison every pairwise sum that follows.
#[inline]
pub fn finite_or_zero(value: Scalar) -> Scalar {
    if value.is_finite() { value } else { 0.0 }
}

/// Component-wise [`finite_or_zero`].
#[inline]
pub fn finite_vector(v: Vector) -> Vector {
    Vector::new(finite_or_zero(v.x), finite_or_zero(v.y), finite_or_zero(v.z))
}

/// Angle in radians from its sine and cosine, in `[0, 2π)`.
///
/// Inputs are clamped to `[-1, 1]` first; the orbit code feeds in ratios that
/// drift a few ulps outside that range.
pub fn angle_from_sin_cos(sin: Scalar, cos: Scalar) -> Scalar {
    let sin = sin.clamp(-1.0, 1.0);
    let cos = cos.clamp(-1.0, 1.0);
    let angle = if cos >= 0.0 {
        if sin >= 0.0 {
            libm::asin(sin)
        } else {
            2.0 * std::f64::consts::PI + libm::asin(sin)
        }
    } else {
        std::f64::consts::PI - libm::asin(sin)
    };
    angle.rem_euclid(2.0 * std::f64::consts::PI)
}

/// Normal deviate via the Box-Muller transform.
pub fn gaussian(rng: &mut SharedRng, mean: Scalar, std_dev: Scalar) -> Scalar {
    let u1: Scalar = 1.0 - rng.random::<Scalar>();
    let u2: Scalar = rng.random::<Scalar>();
    let standard = libm::sqrt(-2.0 * libm::log(u1)) * libm::sin(2.0 * std::f64::consts::PI * u2);
    mean + std_dev * standard
}

/// Uniformly distributed unit vector.
pub fn random_unit_vector(rng: &mut SharedRng) -> Vector {
    let theta = rng.random_range(0.0..=2.0 * std::f64::consts::PI);
    let phi = libm::acos(rng.random_range(-1.0..=1.0));

    Vector::new(
        libm::sin(phi) * libm::cos(theta),
        libm::sin(phi) * libm::sin(theta),
        libm::cos(phi),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_angle_from_sin_cos_quadrants() {
        for degrees in [0.0, 30.0, 90.0, 135.0, 180.0, 225.0, 270.0, 315.0, 359.0] {
            let radians: Scalar = degrees * PI / 180.0;
            let recovered = angle_from_sin_cos(radians.sin(), radians.cos());
            assert!(
                (recovered - radians).abs() < 1e-9,
                "{degrees} degrees came back as {}",
                recovered * 180.0 / PI
            );
        }
    }

    #[test]
    fn test_angle_from_sin_cos_clamps() {
        let angle = angle_from_sin_cos(1.0000001, 0.0);
        assert!((angle - PI / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_finite_vector_clears_nan() {
        let v = finite_vector(Vector::new(Scalar::NAN, 1.0, Scalar::INFINITY));
        assert_eq!(v, Vector::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn test_gaussian_moments() {
        let mut rng = SharedRng::from_seed(7);
        let samples: Vec<Scalar> = (0..20_000).map(|_| gaussian(&mut rng, 3.0, 0.5)).collect();
        let n = samples.len() as Scalar;
        let mean = samples.iter().sum::<Scalar>() / n;
        let variance = samples.iter().map(|s| (s - mean).powi(2)).sum::<Scalar>() / n;

        assert!((mean - 3.0).abs() < 0.02, "mean was {mean}");
        assert!((variance.sqrt() - 0.5).abs() < 0.02, "std dev was {}", variance.sqrt());
    }

    #[test]
    fn test_random_unit_vector_length() {
        let mut rng = SharedRng::from_seed(11);
        for _ in 0..1000 {
            let v = random_unit_vector(&mut rng);
            assert!((v.length() - 1.0).abs() < 1e-12);
        }
    }
}
