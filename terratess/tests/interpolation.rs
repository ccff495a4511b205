//! Integration tests for point-query interpolation.
//!
//! These tests verify the interpolation engine end to end:
//! - The tetrahedron scenario (face centroid yields the corner mean)
//! - Barycentric weight guarantees over many probes
//! - Walk termination within the mesh-diameter budget for antipodal jumps
//! - Composition of horizontal and radial interpolation
//! - Concurrent cursors over one shared model
//! - Polygon masking of grid vertices
//!
//! Run with: `cargo test --test interpolation`

use std::sync::Arc;

use terratess::earth::EarthShape;
use terratess::grid::GridBuilder;
use terratess::model::{Metadata, Model};
use terratess::polygon::Polygon;
use terratess::profile::Profile;

/// A single-level tetrahedron with Constant profiles 1.0, 2.0, 3.0, 4.0
/// at its four vertices.
fn tetrahedron_model() -> Model {
    let mut grid = GridBuilder::tetrahedron().build();
    grid.initialize().unwrap();

    let mut metadata = Metadata::with_attributes(&["value"], &["counts"]).unwrap();
    metadata.set_earth_shape(EarthShape::Sphere);

    let mut model = Model::new(metadata, Arc::new(grid));
    for vertex in 0..4 {
        model
            .set_profile(
                vertex,
                Profile::constant(vec![(vertex + 1) as f64], 1).unwrap(),
            )
            .unwrap();
    }
    model
}

/// A finer model whose single attribute varies linearly with radius at
/// every vertex, so radial interpolation has an exact expected value.
fn radial_model(subdivisions: usize) -> Model {
    let mut grid = GridBuilder::icosahedron().subdivide(subdivisions).build();
    grid.initialize().unwrap();

    let mut metadata = Metadata::with_attributes(&["temperature"], &["K"]).unwrap();
    metadata.set_earth_shape(EarthShape::Sphere);

    let nvertices = grid.vertex_count();
    let mut model = Model::new(metadata, Arc::new(grid));
    for vertex in 0..nvertices {
        // value(r) = r / 1000 at every vertex, independent of position.
        model
            .set_profile(
                vertex,
                Profile::n_point(
                    vec![6000.0, 6200.0, 6371.0],
                    vec![6.0, 6.2, 6.371],
                    1,
                )
                .unwrap(),
            )
            .unwrap();
    }
    model
}

#[test]
fn test_tetrahedron_face_centroid_returns_corner_mean() {
    let model = tetrahedron_model();
    let shape = model.metadata().earth_shape();
    let mut position = model.position();

    for id in 0..4u32 {
        let centroid = model.grid().centroid(id);
        let (lat, lon) = shape.geographic(&centroid);
        position.set(lat, lon, 6371.0).unwrap();

        let corners = model.grid().triangle(id).vertices;
        let mean: f64 = corners.iter().map(|&v| (v + 1) as f64).sum::<f64>() / 3.0;
        let value = position.value(0).unwrap();
        assert!(
            (value - mean).abs() < 1e-9,
            "face {id}: expected mean {mean}, got {value}"
        );
    }
}

#[test]
fn test_barycentric_weights_bounded_and_normalized() {
    let model = radial_model(3);
    let mut position = model.position();

    for seed in 0..200u32 {
        let a = 0.05 + seed as f64 * 0.691;
        let b = seed as f64 * 2.417;
        position
            .set_unit_vector([a.sin() * b.cos(), a.sin() * b.sin(), a.cos()], 6200.0)
            .unwrap();

        let coefficients = position.coefficients().unwrap();
        let sum: f64 = coefficients.iter().map(|(_, w)| w).sum();
        assert!(
            (sum - 1.0).abs() < 1e-9,
            "probe {seed}: weight sum {sum} not normalized"
        );
        for (vertex, weight) in coefficients {
            assert!(
                (0.0..=1.0).contains(&weight),
                "probe {seed}: weight {weight} for vertex {vertex} out of [0, 1]"
            );
        }
    }
}

#[test]
fn test_walk_reaches_antipode_within_budget() {
    let model = radial_model(3);
    let finest = model.grid().last_level();
    let level_count = model.grid().level(finest).count as f64;
    // Mesh-diameter bound: the same budget the walk itself enforces.
    let budget = 32 + (4.0 * level_count.sqrt()) as u32;

    let mut position = model.position();
    position.set(17.0, 33.0, 6200.0).unwrap();

    // Jump to the antipode of the current query point.
    position.set(-17.0, 33.0 - 180.0, 6200.0).unwrap();
    assert!(
        !position.last_walk_fell_back(),
        "antipodal walk should stay within its budget"
    );
    assert!(
        position.last_walk_steps() <= budget,
        "antipodal walk took {} steps, budget {budget}",
        position.last_walk_steps()
    );
}

#[test]
fn test_hot_start_accelerates_coherent_queries() {
    let model = radial_model(3);
    let mut position = model.position();

    position.set(40.0, -100.0, 6300.0).unwrap();
    let mut max_steps = 0;
    for step in 1..=20 {
        position.set(40.0 + 0.05 * step as f64, -100.0, 6300.0).unwrap();
        max_steps = max_steps.max(position.last_walk_steps());
    }
    assert!(
        max_steps <= 3,
        "spatially coherent queries should walk a few steps, saw {max_steps}"
    );
}

#[test]
fn test_radial_and_horizontal_interpolation_compose() {
    let model = radial_model(2);
    let mut position = model.position();

    for (lat, lon, radius) in [
        (0.0, 0.0, 6100.0),
        (33.0, 120.0, 6285.5),
        (-71.0, -45.0, 6000.0),
    ] {
        position.set(lat, lon, radius).unwrap();
        let value = position.value(0).unwrap();
        let expected = radius / 1000.0;
        assert!(
            (value - expected).abs() < 1e-9,
            "at ({lat}, {lon}, {radius}): {value} != {expected}"
        );
    }
}

#[test]
fn test_concurrent_cursors_share_one_model() {
    let model = radial_model(2);

    std::thread::scope(|scope| {
        for worker in 0..4 {
            let model = &model;
            scope.spawn(move || {
                let mut position = model.position();
                for i in 0..100 {
                    let lat = -80.0 + (worker * 100 + i) as f64 * 0.4;
                    let lon = -170.0 + i as f64 * 3.3;
                    position.set(lat, lon, 6150.0).unwrap();
                    let value = position.value(0).unwrap();
                    assert!((value - 6.15).abs() < 1e-9, "worker {worker}: {value}");
                }
            });
        }
    });
}

#[test]
fn test_polygon_masks_grid_vertices() {
    let model = radial_model(1);
    let shape = EarthShape::Sphere;
    let cap = Polygon::small_circle(shape.unit_vector(90.0, 0.0), 0.5, 48).unwrap();

    let inside: Vec<usize> = (0..model.grid().vertex_count())
        .filter(|&v| cap.contains(model.grid().vertex(v)))
        .collect();

    // The polar cap must select some vertices but not most of the sphere.
    assert!(!inside.is_empty(), "polar cap selected no vertices");
    assert!(
        inside.len() < model.grid().vertex_count() / 2,
        "polar cap selected {} of {} vertices",
        inside.len(),
        model.grid().vertex_count()
    );
    // Every selected vertex really is within the cap's angular radius
    // (plus the slack of the polygonal approximation).
    for &v in &inside {
        let z = model.grid().vertex(v)[2];
        assert!(
            z.asin() >= std::f64::consts::FRAC_PI_2 - 0.51,
            "vertex {v} outside the cap was selected"
        );
    }

    let mut inverted = cap.clone();
    inverted.invert();
    let outside_count = (0..model.grid().vertex_count())
        .filter(|&v| inverted.contains(model.grid().vertex(v)))
        .count();
    // Boundary vertices count as inside for both senses; none of the
    // icosahedral vertices sit on the cap boundary, so the two sets
    // partition the vertices exactly.
    assert_eq!(
        inside.len() + outside_count,
        model.grid().vertex_count(),
        "invert() must complement the selected vertex set"
    );
}
