//! Reference Earth shapes.
//!
//! Provides conversions between geographic coordinates (latitude/longitude in
//! degrees) and unit direction vectors on the reference sphere or ellipsoid,
//! plus the surface radius under a given direction. All grid vertices are
//! unit vectors; the shape decides how those map to geodetic coordinates and
//! to kilometres.

use std::fmt;

/// Mean Earth radius in km, used by the spherical shape.
pub const SPHERE_RADIUS_KM: f64 = 6371.0;

/// Reference shapes supported by model files.
///
/// Ellipsoidal shapes convert between geodetic latitude (what maps and GPS
/// report) and geocentric latitude (what a unit vector encodes). The
/// spherical shape treats the two as identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EarthShape {
    /// Sphere of radius 6371 km; geographic and geocentric latitudes agree.
    Sphere,
    /// GRS80 ellipsoid.
    Grs80,
    /// WGS84 ellipsoid.
    #[default]
    Wgs84,
    /// IERS2003 ellipsoid.
    Iers2003,
}

impl EarthShape {
    /// Equatorial radius in km.
    pub fn equatorial_radius_km(self) -> f64 {
        match self {
            EarthShape::Sphere => SPHERE_RADIUS_KM,
            EarthShape::Grs80 => 6378.137,
            EarthShape::Wgs84 => 6378.137,
            EarthShape::Iers2003 => 6378.1366,
        }
    }

    /// Inverse flattening `1/f`, infinite for the sphere.
    pub fn inverse_flattening(self) -> f64 {
        match self {
            EarthShape::Sphere => f64::INFINITY,
            EarthShape::Grs80 => 298.257222101,
            EarthShape::Wgs84 => 298.257223563,
            EarthShape::Iers2003 => 298.25642,
        }
    }

    /// First eccentricity squared, `e² = f(2 - f)`.
    fn eccentricity_sq(self) -> f64 {
        let f = 1.0 / self.inverse_flattening();
        f * (2.0 - f)
    }

    /// Name recorded in model files.
    pub fn name(self) -> &'static str {
        match self {
            EarthShape::Sphere => "SPHERE",
            EarthShape::Grs80 => "GRS80",
            EarthShape::Wgs84 => "WGS84",
            EarthShape::Iers2003 => "IERS2003",
        }
    }

    /// Look up a shape by the name recorded in a model file.
    pub fn from_name(name: &str) -> Option<EarthShape> {
        match name.trim().to_ascii_uppercase().as_str() {
            "SPHERE" => Some(EarthShape::Sphere),
            "GRS80" => Some(EarthShape::Grs80),
            "WGS84" => Some(EarthShape::Wgs84),
            "IERS2003" => Some(EarthShape::Iers2003),
            _ => None,
        }
    }

    /// Convert geographic (geodetic) coordinates in degrees to a unit
    /// direction vector.
    pub fn unit_vector(self, lat_deg: f64, lon_deg: f64) -> [f64; 3] {
        let lat_geocentric = self.geocentric_latitude(lat_deg.to_radians());
        let lon = lon_deg.to_radians();
        [
            lat_geocentric.cos() * lon.cos(),
            lat_geocentric.cos() * lon.sin(),
            lat_geocentric.sin(),
        ]
    }

    /// Convert a unit direction vector to geographic (geodetic) coordinates
    /// in degrees.
    pub fn geographic(self, v: &[f64; 3]) -> (f64, f64) {
        let lat_geocentric = v[2].clamp(-1.0, 1.0).asin();
        let lon = v[1].atan2(v[0]);
        let lat = self.geodetic_latitude(lat_geocentric);
        (lat.to_degrees(), lon.to_degrees())
    }

    /// Radius of the shape's surface, in km, along the given direction.
    pub fn surface_radius_km(self, v: &[f64; 3]) -> f64 {
        let e2 = self.eccentricity_sq();
        if e2 == 0.0 {
            return self.equatorial_radius_km();
        }
        // Geocentric radius of an ellipse of revolution at geocentric
        // latitude asin(v_z): r² = a²(1 - e²) / (1 - e² cos²φ).
        let sin_sq = (v[2] * v[2]).min(1.0);
        let cos_sq = 1.0 - sin_sq;
        self.equatorial_radius_km() * ((1.0 - e2) / (1.0 - e2 * cos_sq)).sqrt()
    }

    /// Geodetic latitude -> geocentric latitude, radians.
    fn geocentric_latitude(self, geodetic: f64) -> f64 {
        let e2 = self.eccentricity_sq();
        if e2 == 0.0 {
            return geodetic;
        }
        // Poles and equator are fixed points of the conversion.
        ((1.0 - e2) * geodetic.tan()).atan().copysign(geodetic)
    }

    /// Geocentric latitude -> geodetic latitude, radians.
    fn geodetic_latitude(self, geocentric: f64) -> f64 {
        let e2 = self.eccentricity_sq();
        if e2 == 0.0 {
            return geocentric;
        }
        (geocentric.tan() / (1.0 - e2)).atan().copysign(geocentric)
    }
}

impl fmt::Display for EarthShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Normalize a vector to unit length in place. Returns false for a vector
/// too short to normalize.
pub fn normalize(v: &mut [f64; 3]) -> bool {
    let len = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if len < 1e-300 {
        return false;
    }
    v[0] /= len;
    v[1] /= len;
    v[2] /= len;
    true
}

/// Scalar triple product `a . (b x c)`.
///
/// Positive when `c` is on the left of the great circle from `a` to `b`,
/// which makes it the workhorse predicate for triangle containment and
/// barycentric weights on the unit sphere.
pub fn scalar_triple(a: &[f64; 3], b: &[f64; 3], c: &[f64; 3]) -> f64 {
    a[0] * (b[1] * c[2] - b[2] * c[1]) - a[1] * (b[0] * c[2] - b[2] * c[0])
        + a[2] * (b[0] * c[1] - b[1] * c[0])
}

/// Angular separation of two unit vectors in radians.
pub fn angle(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    let dot = a[0] * b[0] + a[1] * b[1] + a[2] * b[2];
    dot.clamp(-1.0, 1.0).acos()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sphere_round_trip() {
        let shape = EarthShape::Sphere;
        let v = shape.unit_vector(35.5, -101.25);
        let (lat, lon) = shape.geographic(&v);
        assert!((lat - 35.5).abs() < 1e-12, "latitude drifted: {lat}");
        assert!((lon + 101.25).abs() < 1e-12, "longitude drifted: {lon}");
    }

    #[test]
    fn test_wgs84_round_trip() {
        let shape = EarthShape::Wgs84;
        for &(lat, lon) in &[(0.0, 0.0), (45.0, 90.0), (-60.0, -170.0), (89.5, 10.0)] {
            let v = shape.unit_vector(lat, lon);
            let (lat2, lon2) = shape.geographic(&v);
            assert!(
                (lat - lat2).abs() < 1e-9 && (lon - lon2).abs() < 1e-9,
                "({lat}, {lon}) -> ({lat2}, {lon2})"
            );
        }
    }

    #[test]
    fn test_unit_vector_is_unit_length() {
        let v = EarthShape::Wgs84.unit_vector(12.0, 34.0);
        let len = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
        assert!((len - 1.0).abs() < 1e-14);
    }

    #[test]
    fn test_geodetic_exceeds_geocentric_at_mid_latitude() {
        // On an oblate ellipsoid the geodetic latitude of a direction is
        // farther from the equator than the geocentric latitude.
        let shape = EarthShape::Wgs84;
        let v = shape.unit_vector(45.0, 0.0);
        let geocentric = v[2].asin().to_degrees();
        assert!(
            geocentric < 45.0,
            "geocentric {geocentric} should be south of geodetic 45"
        );
    }

    #[test]
    fn test_surface_radius_polar_flattening() {
        let shape = EarthShape::Wgs84;
        let equator = shape.surface_radius_km(&[1.0, 0.0, 0.0]);
        let pole = shape.surface_radius_km(&[0.0, 0.0, 1.0]);
        assert!((equator - 6378.137).abs() < 1e-9);
        assert!((pole - 6356.752).abs() < 1e-2, "polar radius {pole}");
    }

    #[test]
    fn test_sphere_radius_is_constant() {
        let shape = EarthShape::Sphere;
        let a = shape.surface_radius_km(&[1.0, 0.0, 0.0]);
        let b = shape.surface_radius_km(&[0.0, 0.0, 1.0]);
        assert_eq!(a, SPHERE_RADIUS_KM);
        assert_eq!(b, SPHERE_RADIUS_KM);
    }

    #[test]
    fn test_shape_names_round_trip() {
        for shape in [
            EarthShape::Sphere,
            EarthShape::Grs80,
            EarthShape::Wgs84,
            EarthShape::Iers2003,
        ] {
            assert_eq!(EarthShape::from_name(shape.name()), Some(shape));
        }
        assert_eq!(EarthShape::from_name("MARS"), None);
    }

    #[test]
    fn test_scalar_triple_orientation() {
        let x = [1.0, 0.0, 0.0];
        let y = [0.0, 1.0, 0.0];
        let z = [0.0, 0.0, 1.0];
        assert!(scalar_triple(&x, &y, &z) > 0.0);
        assert!(scalar_triple(&y, &x, &z) < 0.0);
    }
}
