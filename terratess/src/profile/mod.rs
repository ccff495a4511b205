//! Per-vertex radial profiles.
//!
//! A profile holds the model values stored at one grid vertex, indexed by
//! radius. The five storage shapes share a single query contract: given an
//! attribute index and a target radius, return the interpolated value or
//! signal that the radius falls outside the stored interval.
//!
//! Profiles are a sum type rather than a trait hierarchy so the per-query
//! hot path dispatches with a match instead of a vtable.

use thiserror::Error;

/// What to do when a query radius falls outside a profile's stored range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RadiusPolicy {
    /// Clamp to the nearest stored endpoint.
    #[default]
    Clamp,
    /// Raise [`RangeError`].
    Strict,
}

/// Radius outside a profile's valid interval under [`RadiusPolicy::Strict`].
#[derive(Debug, Clone, PartialEq, Error)]
#[error("radius {radius} km outside profile range [{min}, {max}] km")]
pub struct RangeError {
    pub radius: f64,
    pub min: f64,
    pub max: f64,
}

/// Structural problems detected when constructing a profile.
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("profile radii must be strictly increasing: radii[{index}] = {value} does not exceed its predecessor")]
    RadiiNotIncreasing { index: usize, value: f64 },

    #[error("profile stores {found} values where {expected} were required")]
    ValueCountMismatch { expected: usize, found: usize },

    #[error("an n-point profile requires at least 2 radii, found {found}")]
    TooFewRadii { found: usize },
}

/// Model values at one vertex, variant over radial storage shape.
///
/// Sample rows are stored flat in radius-major order: the value of
/// attribute `a` at radius index `r` lives at `values[r * nattributes + a]`.
#[derive(Debug, Clone, PartialEq)]
pub enum Profile {
    /// No model coverage at this vertex. Every query reports NaN, which is
    /// how "no data" stays distinguishable from a stored zero.
    Empty,
    /// Two endpoint samples; values vary linearly in radius between them.
    Thin { radii: [f64; 2], values: Vec<f64> },
    /// One sample row valid at any radius.
    Constant { values: Vec<f64> },
    /// N radius/value rows, radii strictly increasing.
    NPoint { radii: Vec<f64>, values: Vec<f64> },
    /// One sample row for 2D-only (radius-free) model data.
    Surface { values: Vec<f64> },
}

impl Profile {
    /// Construct a thin profile after validating shape.
    pub fn thin(
        radii: [f64; 2],
        values: Vec<f64>,
        nattributes: usize,
    ) -> Result<Profile, ProfileError> {
        if radii[1] <= radii[0] {
            return Err(ProfileError::RadiiNotIncreasing {
                index: 1,
                value: radii[1],
            });
        }
        if values.len() != 2 * nattributes {
            return Err(ProfileError::ValueCountMismatch {
                expected: 2 * nattributes,
                found: values.len(),
            });
        }
        Ok(Profile::Thin { radii, values })
    }

    /// Construct a constant profile after validating shape.
    pub fn constant(values: Vec<f64>, nattributes: usize) -> Result<Profile, ProfileError> {
        if values.len() != nattributes {
            return Err(ProfileError::ValueCountMismatch {
                expected: nattributes,
                found: values.len(),
            });
        }
        Ok(Profile::Constant { values })
    }

    /// Construct an n-point profile after validating shape and monotonicity.
    pub fn n_point(
        radii: Vec<f64>,
        values: Vec<f64>,
        nattributes: usize,
    ) -> Result<Profile, ProfileError> {
        if radii.len() < 2 {
            return Err(ProfileError::TooFewRadii { found: radii.len() });
        }
        for i in 1..radii.len() {
            if radii[i] <= radii[i - 1] {
                return Err(ProfileError::RadiiNotIncreasing {
                    index: i,
                    value: radii[i],
                });
            }
        }
        if values.len() != radii.len() * nattributes {
            return Err(ProfileError::ValueCountMismatch {
                expected: radii.len() * nattributes,
                found: values.len(),
            });
        }
        Ok(Profile::NPoint { radii, values })
    }

    /// Construct a surface profile after validating shape.
    pub fn surface(values: Vec<f64>, nattributes: usize) -> Result<Profile, ProfileError> {
        if values.len() != nattributes {
            return Err(ProfileError::ValueCountMismatch {
                expected: nattributes,
                found: values.len(),
            });
        }
        Ok(Profile::Surface { values })
    }

    /// Tag byte recorded in binary files.
    pub fn tag(&self) -> u8 {
        match self {
            Profile::Empty => 0,
            Profile::Thin { .. } => 1,
            Profile::Constant { .. } => 2,
            Profile::NPoint { .. } => 3,
            Profile::Surface { .. } => 4,
        }
    }

    /// Type name recorded in ascii files.
    pub fn type_name(&self) -> &'static str {
        match self {
            Profile::Empty => "EMPTY",
            Profile::Thin { .. } => "THIN",
            Profile::Constant { .. } => "CONSTANT",
            Profile::NPoint { .. } => "NPOINT",
            Profile::Surface { .. } => "SURFACE",
        }
    }

    /// Number of attributes this profile stores a value for, or None for
    /// the data-free Empty shape.
    pub fn attribute_count(&self) -> Option<usize> {
        match self {
            Profile::Empty => None,
            Profile::Thin { values, .. } => Some(values.len() / 2),
            Profile::Constant { values } | Profile::Surface { values } => Some(values.len()),
            Profile::NPoint { radii, values } => Some(values.len() / radii.len()),
        }
    }

    /// Stored radius interval, or None for shapes without radial structure.
    pub fn radius_range(&self) -> Option<(f64, f64)> {
        match self {
            Profile::Thin { radii, .. } => Some((radii[0], radii[1])),
            Profile::NPoint { radii, .. } => Some((radii[0], radii[radii.len() - 1])),
            Profile::Empty | Profile::Constant { .. } | Profile::Surface { .. } => None,
        }
    }

    /// Value of `attribute` at `radius` (km).
    ///
    /// Empty profiles yield NaN and never fail. Shapes with radial structure
    /// apply `policy` when the radius falls outside their stored interval.
    pub fn value(
        &self,
        attribute: usize,
        radius: f64,
        policy: RadiusPolicy,
    ) -> Result<f64, RangeError> {
        match self {
            Profile::Empty => Ok(f64::NAN),
            Profile::Constant { values } | Profile::Surface { values } => Ok(values[attribute]),
            Profile::Thin { radii, values } => {
                let r = self.clamp_radius(radius, radii[0], radii[1], policy)?;
                let nattr = values.len() / 2;
                let frac = (r - radii[0]) / (radii[1] - radii[0]);
                let bottom = values[attribute];
                let top = values[nattr + attribute];
                Ok(bottom + frac * (top - bottom))
            }
            Profile::NPoint { radii, values } => {
                let n = radii.len();
                let r = self.clamp_radius(radius, radii[0], radii[n - 1], policy)?;
                let nattr = values.len() / n;
                // Index of the first stored radius >= r; r is bracketed by
                // rows hi-1 and hi after the endpoint clamp above.
                let hi = radii.partition_point(|&stored| stored < r).min(n - 1);
                if hi == 0 {
                    return Ok(values[attribute]);
                }
                let lo = hi - 1;
                let frac = (r - radii[lo]) / (radii[hi] - radii[lo]);
                let below = values[lo * nattr + attribute];
                let above = values[hi * nattr + attribute];
                Ok(below + frac * (above - below))
            }
        }
    }

    /// True when the value at (`attribute`, `radius`) is NaN: always for
    /// Empty, otherwise when the stored data itself is NaN.
    pub fn is_nan(&self, attribute: usize, radius: f64) -> bool {
        self.value(attribute, radius, RadiusPolicy::Clamp)
            .map(f64::is_nan)
            .unwrap_or(false)
    }

    fn clamp_radius(
        &self,
        radius: f64,
        min: f64,
        max: f64,
        policy: RadiusPolicy,
    ) -> Result<f64, RangeError> {
        if radius >= min && radius <= max {
            return Ok(radius);
        }
        match policy {
            RadiusPolicy::Clamp => Ok(radius.clamp(min, max)),
            RadiusPolicy::Strict => Err(RangeError { radius, min, max }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_npoint() -> Profile {
        // Two attributes over three radii.
        Profile::n_point(
            vec![6000.0, 6200.0, 6371.0],
            vec![
                1.0, 10.0, // r = 6000
                3.0, 30.0, // r = 6200
                4.0, 40.0, // r = 6371
            ],
            2,
        )
        .unwrap()
    }

    #[test]
    fn test_npoint_interpolates_between_samples() {
        let p = sample_npoint();
        let v = p.value(0, 6100.0, RadiusPolicy::Strict).unwrap();
        assert!((v - 2.0).abs() < 1e-12, "midpoint value {v}");
        let v = p.value(1, 6100.0, RadiusPolicy::Strict).unwrap();
        assert!((v - 20.0).abs() < 1e-12);
    }

    #[test]
    fn test_npoint_exact_sample_radii() {
        let p = sample_npoint();
        assert_eq!(p.value(0, 6000.0, RadiusPolicy::Strict).unwrap(), 1.0);
        assert_eq!(p.value(0, 6200.0, RadiusPolicy::Strict).unwrap(), 3.0);
        assert_eq!(p.value(0, 6371.0, RadiusPolicy::Strict).unwrap(), 4.0);
    }

    #[test]
    fn test_npoint_no_overshoot_between_monotonic_samples() {
        let p = sample_npoint();
        for step in 0..=100 {
            let r = 6000.0 + (6371.0 - 6000.0) * (step as f64) / 100.0;
            let v = p.value(0, r, RadiusPolicy::Strict).unwrap();
            assert!((1.0..=4.0).contains(&v), "overshoot at r={r}: {v}");
        }
    }

    #[test]
    fn test_out_of_range_clamps_or_errors() {
        let p = sample_npoint();
        assert_eq!(p.value(0, 5000.0, RadiusPolicy::Clamp).unwrap(), 1.0);
        assert_eq!(p.value(0, 7000.0, RadiusPolicy::Clamp).unwrap(), 4.0);

        let err = p.value(0, 5000.0, RadiusPolicy::Strict).unwrap_err();
        assert_eq!(err.min, 6000.0);
        assert_eq!(err.max, 6371.0);
    }

    #[test]
    fn test_empty_reports_nan_not_zero() {
        let p = Profile::Empty;
        let v = p.value(0, 6371.0, RadiusPolicy::Strict).unwrap();
        assert!(v.is_nan());
        assert!(p.is_nan(0, 6371.0));

        let zero = Profile::constant(vec![0.0], 1).unwrap();
        assert!(!zero.is_nan(0, 6371.0));
    }

    #[test]
    fn test_constant_ignores_radius() {
        let p = Profile::constant(vec![2.5], 1).unwrap();
        for r in [0.0, 3000.0, 6371.0, 9000.0] {
            assert_eq!(p.value(0, r, RadiusPolicy::Strict).unwrap(), 2.5);
        }
    }

    #[test]
    fn test_thin_linear_between_endpoints() {
        let p = Profile::thin([6300.0, 6371.0], vec![8.0, 100.0, 10.0, 200.0], 2).unwrap();
        let mid = 0.5 * (6300.0 + 6371.0);
        assert!((p.value(0, mid, RadiusPolicy::Strict).unwrap() - 9.0).abs() < 1e-12);
        assert!((p.value(1, mid, RadiusPolicy::Strict).unwrap() - 150.0).abs() < 1e-12);
    }

    #[test]
    fn test_constructors_reject_bad_shapes() {
        assert!(matches!(
            Profile::n_point(vec![2.0, 1.0], vec![0.0, 0.0], 1),
            Err(ProfileError::RadiiNotIncreasing { index: 1, .. })
        ));
        assert!(matches!(
            Profile::n_point(vec![1.0], vec![0.0], 1),
            Err(ProfileError::TooFewRadii { found: 1 })
        ));
        assert!(matches!(
            Profile::constant(vec![1.0, 2.0], 1),
            Err(ProfileError::ValueCountMismatch {
                expected: 1,
                found: 2
            })
        ));
        assert!(matches!(
            Profile::thin([1.0, 2.0], vec![0.0], 2),
            Err(ProfileError::ValueCountMismatch {
                expected: 4,
                found: 1
            })
        ));
    }

    #[test]
    fn test_radius_range() {
        assert_eq!(Profile::Empty.radius_range(), None);
        assert_eq!(sample_npoint().radius_range(), Some((6000.0, 6371.0)));
    }
}
