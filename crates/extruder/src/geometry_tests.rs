use crate::geometry::{Geometry, IntersectionHandling};
use crate::math::point;
use crate::side::SideId;
use crate::vertex::{ForwardCategory, Label, SideCategory};
use crate::TipState;

fn tip_with_size(size: f32) -> TipState {
    TipState {
        width: size,
        height: size,
        ..TipState::default()
    }
}

// Checks the structural invariants that must hold after every public
// operation.
pub(crate) fn check_invariants(geometry: &Geometry) {
    let mesh = geometry.mesh();
    let side_ids = geometry.vertex_side_ids();
    let side_offsets = geometry.side_offsets();
    assert_eq!(side_ids.len(), mesh.vertex_count() as usize);
    assert_eq!(side_offsets.len(), mesh.vertex_count() as usize);
    assert_eq!(
        geometry.opposite_side_offsets().len(),
        mesh.vertex_count() as usize
    );

    // Side/id consistency.
    for index in 0..mesh.vertex_count() {
        let side = match side_ids[index as usize] {
            SideId::Left => geometry.left_side(),
            SideId::Right => geometry.right_side(),
        };
        assert_eq!(
            side.indices[side_offsets[index as usize] as usize],
            index,
            "side offset of vertex {} does not map back to it",
            index
        );
    }

    // Partition bounds.
    for side in [geometry.left_side(), geometry.right_side()].iter() {
        assert!(
            side.partition_start.adjacent_first_index_offset as usize <= side.indices.len()
        );
    }

    // Triangle indices are valid.
    for triangle in 0..mesh.triangle_count() {
        for &index in &mesh.triangle_indices(triangle) {
            assert!(index < mesh.vertex_count());
        }
    }

    // Labels encode margins in [0, 4].
    for index in 0..mesh.vertex_count() {
        let side_margin = mesh.side_label(index).decode_margin();
        let forward_margin = mesh.forward_label(index).decode_margin();
        assert!((0.0..=Label::MAXIMUM_MARGIN).contains(&side_margin));
        assert!((0.0..=Label::MAXIMUM_MARGIN).contains(&forward_margin));
    }

    // Intersection discontinuities are sorted, non-overlapping and in range.
    for side in [geometry.left_side(), geometry.right_side()].iter() {
        let mut previous_last = None;
        for range in &side.intersection_discontinuities {
            assert!(range.first <= range.last);
            assert!((range.last as usize) < side.indices.len());
            if let Some(previous_last) = previous_last {
                assert!(range.first >= previous_last);
            }
            previous_last = Some(range.last);
        }
    }
}

// Compares the externally observable geometric state of two engines;
// mutation-tracking state (envelopes, first-mutated markers) is not part of
// the comparison.
pub(crate) fn assert_same_geometry(a: &Geometry, b: &Geometry) {
    assert_eq!(a.mesh().vertices(), b.mesh().vertices());
    assert_eq!(a.mesh().indices(), b.mesh().indices());
    assert_eq!(a.vertex_side_ids(), b.vertex_side_ids());
    assert_eq!(a.side_offsets(), b.side_offsets());
    assert_eq!(a.opposite_side_offsets(), b.opposite_side_offsets());
    assert_eq!(a.extrusion_break_count(), b.extrusion_break_count());
    assert_eq!(
        a.index_counts_at_last_extrusion_break(),
        b.index_counts_at_last_extrusion_break()
    );

    for (side_a, side_b) in [
        (a.left_side(), b.left_side()),
        (a.right_side(), b.right_side()),
    ]
    .iter()
    {
        assert_eq!(side_a.indices, side_b.indices);
        assert_eq!(
            side_a.intersection_discontinuities,
            side_b.intersection_discontinuities
        );
        assert_eq!(side_a.partition_start, side_b.partition_start);
        assert_eq!(
            side_a.first_simplifiable_index_offset,
            side_b.first_simplifiable_index_offset
        );
        assert_eq!(side_a.vertex_buffer, side_b.vertex_buffer);
        assert_eq!(
            side_a.next_buffered_vertex_offset,
            side_b.next_buffered_vertex_offset
        );
        assert_eq!(side_a.intersection, side_b.intersection);
        assert_eq!(
            side_a.last_simplified_vertex_positions,
            side_b.last_simplified_vertex_positions
        );
    }
}

fn extrude_straight_strip(geometry: &mut Geometry) {
    geometry.append_left_vertex(point(-1.0, 0.0));
    geometry.append_right_vertex(point(1.0, 0.0));
    geometry.append_left_vertex(point(-1.0, 1.0));
    geometry.append_right_vertex(point(1.0, 1.0));
    geometry.process_new_vertices(0.1, &TipState::default());
}

// Builds the left-turn-with-self-intersection stroke: a straight strip of
// brush size 2 whose left side then turns back into the interior.
fn extrude_left_turn(geometry: &mut Geometry) {
    let tip = tip_with_size(2.0);
    geometry.append_left_vertex(point(-1.0, 0.0));
    geometry.append_right_vertex(point(1.0, 0.0));
    geometry.append_left_vertex(point(-1.0, 2.0));
    geometry.append_right_vertex(point(1.0, 2.0));
    geometry.append_left_vertex(point(-1.0, 4.0));
    geometry.append_right_vertex(point(1.0, 4.0));
    geometry.process_new_vertices(0.0, &tip);

    geometry.append_left_vertex(point(1.0, 3.0));
    geometry.process_new_vertices(0.0, &tip);

    geometry.append_left_vertex(point(0.75, 3.0));
    geometry.append_right_vertex(point(0.75, 5.0));
    geometry.process_new_vertices(0.0, &tip);
}

#[test]
fn straight_strip() {
    let mut geometry = Geometry::new();
    extrude_straight_strip(&mut geometry);

    let mesh = geometry.mesh();
    assert_eq!(mesh.vertex_count(), 4);
    assert_eq!(mesh.triangle_count(), 2);
    for triangle in 0..mesh.triangle_count() {
        assert!(
            mesh.triangle(triangle).signed_area() > 0.0,
            "triangle {} is not counter-clockwise",
            triangle
        );
    }

    let region = geometry.visually_updated_region();
    let bounds = region.bounds().unwrap();
    assert_eq!(bounds.min, point(-1.0, 0.0));
    assert_eq!(bounds.max, point(1.0, 1.0));

    // Front edge and side labels.
    assert_eq!(
        mesh.forward_label(0).decode_forward_category(),
        ForwardCategory::ExteriorFront
    );
    assert_eq!(
        mesh.side_label(0).decode_side_category(),
        SideCategory::ExteriorLeft
    );
    assert_eq!(
        mesh.side_label(1).decode_side_category(),
        SideCategory::ExteriorRight
    );

    check_invariants(&geometry);
}

#[test]
fn straight_strip_derivatives() {
    let mut geometry = Geometry::new();
    extrude_straight_strip(&mut geometry);
    geometry.update_mesh_derivatives();

    let mesh = geometry.mesh();
    for index in 0..mesh.vertex_count() {
        // Side derivatives span the stroke width, pointing left-to-right.
        assert_eq!(mesh.side_derivative(index), crate::math::vector(2.0, 0.0));
        // Forward derivatives follow the direction of travel.
        assert_eq!(
            mesh.forward_derivative(index),
            crate::math::vector(0.0, 1.0)
        );
        // Categories survive the margin re-encoding.
        assert_ne!(
            mesh.side_label(index).decode_side_category(),
            SideCategory::Interior
        );
    }
    check_invariants(&geometry);
}

#[test]
fn simplification_removes_collinear_pair() {
    let mut geometry = Geometry::new();
    let tip = TipState::default();
    geometry.append_left_vertex(point(-1.0, 0.0));
    geometry.append_right_vertex(point(1.0, 0.0));
    geometry.append_left_vertex(point(-1.0, 1.0));
    geometry.append_right_vertex(point(1.0, 1.0));
    geometry.process_new_vertices(0.1, &tip);

    geometry.append_left_vertex(point(-1.0, 2.0));
    geometry.append_right_vertex(point(1.0, 2.0));
    geometry.process_new_vertices(0.1, &tip);

    // The middle pair was removed: still two triangles, now spanning
    // y in [0, 2].
    let mesh = geometry.mesh();
    assert_eq!(mesh.vertex_count(), 4);
    assert_eq!(mesh.triangle_count(), 2);
    assert_eq!(mesh.position(2).y, 2.0);
    assert_eq!(mesh.position(3).y, 2.0);

    let region = geometry.visually_updated_region();
    let bounds = region.bounds().unwrap();
    assert_eq!(bounds.min, point(-1.0, 0.0));
    assert_eq!(bounds.max, point(1.0, 2.0));

    check_invariants(&geometry);
}

#[test]
fn zero_threshold_disables_simplification() {
    let mut geometry = Geometry::new();
    let tip = TipState::default();
    geometry.append_left_vertex(point(-1.0, 0.0));
    geometry.append_right_vertex(point(1.0, 0.0));
    geometry.append_left_vertex(point(-1.0, 1.0));
    geometry.append_right_vertex(point(1.0, 1.0));
    geometry.process_new_vertices(0.0, &tip);
    geometry.append_left_vertex(point(-1.0, 2.0));
    geometry.append_right_vertex(point(1.0, 2.0));
    geometry.process_new_vertices(0.0, &tip);

    // The collinear middle pair stays.
    assert_eq!(geometry.mesh().vertex_count(), 6);
    assert_eq!(geometry.mesh().triangle_count(), 4);
    check_invariants(&geometry);
}

#[test]
fn left_turn_starts_intersection_handling() {
    let mut geometry = Geometry::new();
    let tip = tip_with_size(2.0);
    geometry.append_left_vertex(point(-1.0, 0.0));
    geometry.append_right_vertex(point(1.0, 0.0));
    geometry.append_left_vertex(point(-1.0, 2.0));
    geometry.append_right_vertex(point(1.0, 2.0));
    geometry.append_left_vertex(point(-1.0, 4.0));
    geometry.append_right_vertex(point(1.0, 4.0));
    geometry.process_new_vertices(0.0, &tip);
    check_invariants(&geometry);

    // The left side turns back into the interior of the stroke.
    geometry.append_left_vertex(point(1.0, 3.0));
    geometry.process_new_vertices(0.0, &tip);
    check_invariants(&geometry);

    let left = geometry.left_side();
    let intersection = left.intersection.as_ref().expect("no active intersection");
    assert!(intersection.retriangulation_started);
    assert!(geometry.right_side().intersection.is_none());

    // The left outline now carries four exterior vertices and the interior
    // pivot; the right outline is all exterior.
    let mesh = geometry.mesh();
    assert_eq!(left.indices.len(), 5);
    for offset in 0..4 {
        assert_eq!(
            mesh.side_label(left.indices[offset]).decode_side_category(),
            SideCategory::ExteriorLeft,
            "left outline vertex {} should be exterior",
            offset
        );
    }
    assert_eq!(
        mesh.side_label(left.indices[4]).decode_side_category(),
        SideCategory::Interior
    );
    for &index in &geometry.right_side().indices {
        assert_eq!(
            mesh.side_label(index).decode_side_category(),
            SideCategory::ExteriorRight
        );
    }

    // Continuing the turn keeps the intersection active and the mesh valid.
    geometry.append_left_vertex(point(0.75, 3.0));
    geometry.append_right_vertex(point(0.75, 5.0));
    geometry.process_new_vertices(0.0, &tip);
    check_invariants(&geometry);
    assert!(geometry.left_side().intersection.is_some());
}

#[test]
fn extrusion_break_during_retriangulation_keeps_interior_labels() {
    let mut geometry = Geometry::new();
    extrude_left_turn(&mut geometry);
    assert!(geometry.left_side().is_retriangulating());

    geometry.add_extrusion_break();
    check_invariants(&geometry);

    // Because retriangulation was in progress, the back edge is not labeled
    // forward-exterior.
    let mesh = geometry.mesh();
    let last_left = *geometry.left_side().indices.last().unwrap();
    let last_right = *geometry.right_side().indices.last().unwrap();
    assert_eq!(
        mesh.forward_label(last_left).decode_forward_category(),
        ForwardCategory::Interior
    );
    assert_eq!(
        mesh.forward_label(last_right).decode_forward_category(),
        ForwardCategory::Interior
    );
}

#[test]
fn extrusion_break_labels_back_edge() {
    let mut geometry = Geometry::new();
    extrude_straight_strip(&mut geometry);
    geometry.add_extrusion_break();
    check_invariants(&geometry);

    let mesh = geometry.mesh();
    assert_eq!(
        mesh.forward_label(2).decode_forward_category(),
        ForwardCategory::ExteriorBack
    );
    assert_eq!(
        mesh.forward_label(3).decode_forward_category(),
        ForwardCategory::ExteriorBack
    );
    assert_eq!(geometry.extrusion_break_count(), 1);
    let counts = geometry.index_counts_at_last_extrusion_break();
    assert_eq!(counts.left, 2);
    assert_eq!(counts.right, 2);
}

#[test]
fn extrusion_break_is_idempotent() {
    let mut a = Geometry::new();
    let mut b = Geometry::new();
    extrude_straight_strip(&mut a);
    extrude_straight_strip(&mut b);

    a.add_extrusion_break();
    a.add_extrusion_break();
    b.add_extrusion_break();

    assert_same_geometry(&a, &b);
    check_invariants(&a);
}

#[test]
fn give_up_records_partition_and_discontinuity() {
    let mut geometry = Geometry::new();
    extrude_left_turn(&mut geometry);
    assert!(geometry.left_side().is_retriangulating());

    // A proposed left vertex landing exactly on the opposite side's last
    // position makes the sides touch, which abandons the repair.
    let tip = tip_with_size(2.0);
    geometry.append_left_vertex(point(0.75, 5.0));
    geometry.append_right_vertex(point(0.8, 5.5));
    geometry.process_new_vertices(0.0, &tip);

    check_invariants(&geometry);
    assert!(geometry.left_side().intersection.is_none());
    assert!(geometry.right_side().intersection.is_none());

    // The abandoned repair started a new partition on the intersecting side
    // and recorded the triangles left wrapped around the pivot.
    let left = geometry.left_side();
    assert!(left.partition_start.adjacent_first_index_offset > 0);
    assert!(!left.partition_start.is_forward_exterior);
    assert_eq!(left.intersection_discontinuities.len(), 1);
    let range = left.intersection_discontinuities[0];
    assert!(range.first < range.last);
    assert!((range.last as usize) < left.indices.len());
}

#[test]
fn save_point_round_trip_is_identity() {
    let mut a = Geometry::new();
    let mut b = Geometry::new();
    extrude_straight_strip(&mut a);
    extrude_straight_strip(&mut b);

    a.set_save_point();
    a.revert_to_save_point();

    assert_same_geometry(&a, &b);
    check_invariants(&a);
}

#[test]
fn revert_without_save_point_does_nothing() {
    let mut a = Geometry::new();
    let mut b = Geometry::new();
    extrude_straight_strip(&mut a);
    extrude_straight_strip(&mut b);

    a.revert_to_save_point();
    assert_same_geometry(&a, &b);
}

#[test]
fn save_extend_revert_round_trip() {
    let mut a = Geometry::new();
    let mut b = Geometry::new();
    let tip = tip_with_size(2.0);

    extrude_left_turn(&mut a);
    extrude_left_turn(&mut b);

    a.set_save_point();

    // Predicted continuation, thrown away by the revert.
    a.append_left_vertex(point(0.5, 2.5));
    a.append_right_vertex(point(0.4, 4.5));
    a.process_new_vertices(0.0, &tip);
    a.append_left_vertex(point(0.25, 2.0));
    a.append_right_vertex(point(0.0, 4.0));
    a.process_new_vertices(0.0, &tip);
    a.revert_to_save_point();

    assert_same_geometry(&a, &b);
    check_invariants(&a);
}

#[test]
fn save_clear_since_break_revert_round_trip() {
    let mut a = Geometry::new();
    let mut b = Geometry::new();
    let tip = TipState::default();

    for geometry in [&mut a, &mut b].iter_mut() {
        extrude_straight_strip(geometry);
        geometry.add_extrusion_break();
        extrude_left_turn(geometry);
    }

    a.set_save_point();

    // Extend, delete the whole post-break partition, and extend differently
    // before rolling all of it back.
    a.append_left_vertex(point(0.5, 2.5));
    a.append_right_vertex(point(0.4, 4.5));
    a.process_new_vertices(0.1, &tip);
    a.clear_since_last_extrusion_break();
    check_invariants(&a);
    a.append_left_vertex(point(2.0, 0.0));
    a.append_right_vertex(point(3.0, 0.0));
    a.append_left_vertex(point(2.0, 1.5));
    a.append_right_vertex(point(3.0, 1.5));
    a.process_new_vertices(0.1, &tip);
    check_invariants(&a);

    a.revert_to_save_point();

    assert_same_geometry(&a, &b);
    check_invariants(&a);
}

#[test]
fn clear_since_last_extrusion_break_removes_partition() {
    let mut a = Geometry::new();
    let mut b = Geometry::new();
    extrude_straight_strip(&mut a);
    extrude_straight_strip(&mut b);
    a.add_extrusion_break();
    b.add_extrusion_break();

    a.append_left_vertex(point(-1.0, 3.0));
    a.append_right_vertex(point(1.0, 3.0));
    a.append_left_vertex(point(-1.0, 4.0));
    a.append_right_vertex(point(1.0, 4.0));
    a.process_new_vertices(0.1, &TipState::default());
    assert!(a.mesh().vertex_count() > b.mesh().vertex_count());

    a.clear_since_last_extrusion_break();
    assert_same_geometry(&a, &b);
    check_invariants(&a);

    // Clearing again is a no-op.
    a.clear_since_last_extrusion_break();
    assert_same_geometry(&a, &b);
}

#[test]
fn fast_path_is_order_independent() {
    let mut a = Geometry::new();
    let mut b = Geometry::new();
    let tip = TipState::default();

    a.append_left_vertex(point(-1.0, 0.0));
    a.append_right_vertex(point(1.0, 0.0));
    a.append_left_vertex(point(-1.0, 1.0));
    a.append_right_vertex(point(1.0, 1.0));

    b.append_right_vertex(point(1.0, 0.0));
    b.append_left_vertex(point(-1.0, 0.0));
    b.append_right_vertex(point(1.0, 1.0));
    b.append_left_vertex(point(-1.0, 1.0));

    a.process_new_vertices(0.0, &tip);
    b.process_new_vertices(0.0, &tip);

    // Both meshes triangulate the same strip; the vertex order within each
    // pair differs but the triangles cover the same region CCW.
    assert_eq!(a.mesh().vertex_count(), b.mesh().vertex_count());
    assert_eq!(a.mesh().triangle_count(), b.mesh().triangle_count());
    check_invariants(&a);
    check_invariants(&b);
}

#[test]
fn process_without_vertices_on_both_sides_is_a_no_op() {
    let mut geometry = Geometry::new();
    geometry.append_left_vertex(point(-1.0, 0.0));
    geometry.append_left_vertex(point(-1.0, 1.0));
    let vertex_count = geometry.mesh().vertex_count();

    geometry.process_new_vertices(0.1, &TipState::default());

    assert_eq!(geometry.mesh().vertex_count(), vertex_count);
    assert_eq!(geometry.mesh().triangle_count(), 0);
    check_invariants(&geometry);
}

#[test]
fn stable_triangle_count() {
    let mut geometry = Geometry::new();
    extrude_straight_strip(&mut geometry);
    // Intersection handling is enabled by default, so nothing is stable.
    assert_eq!(geometry.stable_triangle_count(), 0);

    let mut geometry = Geometry::new();
    geometry.set_intersection_handling(IntersectionHandling::Disabled);
    extrude_straight_strip(&mut geometry);
    geometry.append_left_vertex(point(-1.0, 2.0));
    geometry.append_right_vertex(point(1.0, 2.0));
    geometry.process_new_vertices(0.0, &TipState::default());

    // All but the final two triangles are stable: simplification can still
    // rewrite the last vertex on each side.
    let triangle_count = geometry.mesh().triangle_count();
    assert_eq!(geometry.stable_triangle_count(), triangle_count - 2);
    check_invariants(&geometry);
}

#[test]
fn reset_clears_everything() {
    let mut geometry = Geometry::new();
    extrude_left_turn(&mut geometry);
    geometry.reset();

    assert_eq!(geometry.mesh().vertex_count(), 0);
    assert_eq!(geometry.mesh().triangle_count(), 0);
    assert!(geometry.left_side().indices.is_empty());
    assert!(geometry.right_side().indices.is_empty());
    assert!(geometry.left_side().intersection.is_none());
    assert_eq!(geometry.extrusion_break_count(), 0);
    assert!(geometry.visually_updated_region().is_empty());

    // The engine is reusable after a reset.
    extrude_straight_strip(&mut geometry);
    assert_eq!(geometry.mesh().triangle_count(), 2);
    check_invariants(&geometry);
}

#[test]
fn derivative_update_after_intersection() {
    let mut geometry = Geometry::new();
    extrude_left_turn(&mut geometry);
    geometry.update_mesh_derivatives();
    check_invariants(&geometry);

    // Every vertex of a triangle spanning the stroke has a nonzero side
    // derivative after the update.
    let mesh = geometry.mesh();
    for triangle in 0..mesh.triangle_count() {
        let indices = mesh.triangle_indices(triangle);
        let sides = [
            geometry.vertex_side_ids()[indices[0] as usize],
            geometry.vertex_side_ids()[indices[1] as usize],
            geometry.vertex_side_ids()[indices[2] as usize],
        ];
        if sides[0] == sides[1] && sides[1] == sides[2] {
            continue;
        }
        for &index in &indices {
            let derivative = mesh.side_derivative(index);
            assert!(
                derivative.x.is_finite() && derivative.y.is_finite(),
                "non-finite derivative on vertex {}",
                index
            );
        }
    }
}

#[test]
fn winding_mode_fan_uses_sentinel_pivot() {
    use crate::geometry::{winding_texture_uv_sentinel, TextureCoordType};

    let mut geometry = Geometry::new();
    geometry.set_texture_coord_type(TextureCoordType::Winding);

    // Three extra vertices on the left against one on the right produce a
    // two-triangle fan, which in winding mode gets a super-imposed pivot.
    geometry.append_left_vertex(point(-1.0, 0.0));
    geometry.append_right_vertex(point(1.0, 0.0));
    geometry.append_left_vertex(point(-1.0, 1.0));
    geometry.append_left_vertex(point(-1.0, 2.0));
    geometry.append_left_vertex(point(-1.0, 3.0));
    geometry.append_right_vertex(point(1.0, 1.0));
    geometry.process_new_vertices(0.0, &TipState::default());

    check_invariants(&geometry);
    let mesh = geometry.mesh();
    let sentinel_count = (0..mesh.vertex_count())
        .filter(|&index| mesh.vertex(index).attributes.surface_uv == winding_texture_uv_sentinel())
        .count();
    assert_eq!(sentinel_count, 1);

    // The fan pivot run is three super-imposed right-side vertices.
    let right = geometry.right_side();
    assert!(right.indices.len() >= 3);
    let n = right.indices.len();
    assert_eq!(
        mesh.position(right.indices[n - 2]),
        mesh.position(right.indices[n - 3])
    );
}
