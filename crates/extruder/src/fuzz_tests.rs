//! Pseudo-random and adversarial input tests for the extruder. These chase
//! the state-machine interactions that hand-written scenarios miss: repeated
//! self-intersections, breaks and partial clears interleaved with save
//! points, and numerically hostile positions.

use crate::geometry::Geometry;
use crate::geometry_tests::{assert_same_geometry, check_invariants};
use crate::math::{point, vector, Point, Vector};
use crate::TipState;

// A small deterministic xorshift generator so the sequences are reproducible
// without external dependencies.
struct XorShift(u64);

impl XorShift {
    fn new(seed: u64) -> Self {
        XorShift(seed.max(1))
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    // A float in [0, 1).
    fn next_f32(&mut self) -> f32 {
        (self.next_u64() >> 40) as f32 / (1u64 << 24) as f32
    }

    fn next_range(&mut self, min: f32, max: f32) -> f32 {
        min + (max - min) * self.next_f32()
    }
}

#[derive(Clone, Debug)]
enum Op {
    AppendPair(Point, Point),
    Process(f32),
    Break,
    ClearSinceBreak,
}

// Generates a meandering stroke that regularly turns sharply enough to cross
// itself, interleaved with processing and the occasional break or clear.
fn random_stroke_ops(rng: &mut XorShift, n_steps: usize) -> Vec<Op> {
    let mut ops = Vec::new();
    let mut position = vector(0.0, 0.0);
    let mut angle: f32 = rng.next_range(0.0, std::f32::consts::TAU);
    let half_width = 0.5;

    for step in 0..n_steps {
        // Sharp turns are the interesting part; take them often.
        angle += rng.next_range(-1.2, 1.2);
        let direction = vector(angle.cos(), angle.sin());
        position += direction * rng.next_range(0.1, 1.0);
        let normal: Vector = vector(-direction.y, direction.x);
        let left = (position + normal * half_width).to_point();
        let right = (position - normal * half_width).to_point();
        ops.push(Op::AppendPair(left, right));

        if step % 3 == 2 {
            ops.push(Op::Process(rng.next_range(0.0, 0.2)));
        }
        if step % 17 == 16 {
            ops.push(Op::Break);
        }
        if step % 29 == 28 {
            ops.push(Op::ClearSinceBreak);
        }
    }
    ops.push(Op::Process(0.1));
    ops
}

fn apply_op(geometry: &mut Geometry, op: &Op) {
    let tip = TipState::default();
    match op {
        Op::AppendPair(left, right) => {
            geometry.append_left_vertex(*left);
            geometry.append_right_vertex(*right);
        }
        Op::Process(threshold) => geometry.process_new_vertices(*threshold, &tip),
        Op::Break => geometry.add_extrusion_break(),
        Op::ClearSinceBreak => geometry.clear_since_last_extrusion_break(),
    }
}

#[test]
fn random_strokes_keep_invariants() {
    for seed in 1..=8u64 {
        let mut rng = XorShift::new(seed * 7919);
        let ops = random_stroke_ops(&mut rng, 60);

        let mut geometry = Geometry::new();
        for op in &ops {
            apply_op(&mut geometry, op);
            if !matches!(op, Op::AppendPair(..)) {
                check_invariants(&geometry);
            }
        }
        geometry.update_mesh_derivatives();
        check_invariants(&geometry);
    }
}

#[test]
fn save_extend_revert_matches_twin() {
    for seed in 1..=6u64 {
        let mut rng = XorShift::new(seed * 104729);
        let prefix = random_stroke_ops(&mut rng, 25);
        let suffix = random_stroke_ops(&mut rng, 20);

        let mut engine = Geometry::new();
        let mut twin = Geometry::new();
        for op in &prefix {
            apply_op(&mut engine, op);
            apply_op(&mut twin, op);
        }

        engine.set_save_point();
        for op in &suffix {
            apply_op(&mut engine, op);
        }
        engine.revert_to_save_point();

        assert_same_geometry(&engine, &twin);
        check_invariants(&engine);
    }
}

#[test]
fn immediate_revert_matches_twin() {
    for seed in 1..=4u64 {
        let mut rng = XorShift::new(seed * 1299709);
        let ops = random_stroke_ops(&mut rng, 30);

        let mut engine = Geometry::new();
        let mut twin = Geometry::new();
        for op in &ops {
            apply_op(&mut engine, op);
            apply_op(&mut twin, op);
        }

        engine.set_save_point();
        engine.revert_to_save_point();

        assert_same_geometry(&engine, &twin);
    }
}

#[test]
fn non_finite_positions_are_skipped() {
    let mut geometry = Geometry::new();
    let tip = TipState::default();

    geometry.append_left_vertex(point(-1.0, 0.0));
    geometry.append_right_vertex(point(1.0, 0.0));
    geometry.append_left_vertex(point(f32::NAN, 1.0));
    geometry.append_right_vertex(point(1.0, f32::INFINITY));
    geometry.append_left_vertex(point(-1.0, 1.0));
    geometry.append_right_vertex(point(1.0, 1.0));
    geometry.append_left_vertex(point(f32::NEG_INFINITY, f32::NAN));
    geometry.append_right_vertex(point(1.0, 2.0));
    geometry.append_left_vertex(point(-1.0, 2.0));
    geometry.process_new_vertices(0.1, &tip);

    let mesh = geometry.mesh();
    assert!(mesh.triangle_count() > 0);
    for index in 0..mesh.vertex_count() {
        let position = mesh.position(index);
        assert!(
            position.x.is_finite() && position.y.is_finite(),
            "non-finite position leaked into the mesh at {}",
            index
        );
    }
    check_invariants(&geometry);
}

#[test]
fn huge_coordinates_do_not_panic() {
    let mut geometry = Geometry::new();
    let tip = TipState {
        width: 1e30,
        height: 1e30,
        ..TipState::default()
    };
    let mut rng = XorShift::new(42);

    for step in 0..20 {
        let y = step as f32 * 1e30;
        let jitter = rng.next_range(-1e30, 1e30);
        geometry.append_left_vertex(point(-1e30 + jitter, y));
        geometry.append_right_vertex(point(1e30 + jitter, y));
        if step % 4 == 3 {
            geometry.process_new_vertices(1e28, &tip);
        }
    }
    geometry.process_new_vertices(1e28, &tip);
    geometry.update_mesh_derivatives();
    check_invariants(&geometry);
}

#[test]
fn tiny_stroke_spiral() {
    // A spiral tighter than the brush width keeps intersection handling
    // active almost continuously.
    let mut geometry = Geometry::new();
    let tip = TipState::default();

    for step in 0..80 {
        let angle = step as f32 * 0.35;
        let radius = 0.3 + step as f32 * 0.01;
        let center = vector(angle.cos(), angle.sin()) * radius;
        let normal = vector(-angle.sin(), angle.cos());
        geometry.append_left_vertex((center + normal * 0.5).to_point());
        geometry.append_right_vertex((center - normal * 0.5).to_point());
        if step % 2 == 1 {
            geometry.process_new_vertices(0.05, &tip);
            check_invariants(&geometry);
        }
    }
    geometry.update_mesh_derivatives();
    check_invariants(&geometry);

    let region = geometry.visually_updated_region();
    assert!(!region.is_empty());
}
