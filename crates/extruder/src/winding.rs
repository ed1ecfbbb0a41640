//! Detection of clockwise-winding segments in the triangle fans that
//! intersection handling would create around a pivot position.

use crate::math::{IndexType, LineSegment, Point, Triangle};
use crate::mesh_view::MutableMeshView;
use crate::side::{IndexOffsetRange, Side, SideId};

/// Finds the last segment along the outside of a triangle fan that is part of
/// a clockwise-winding triangle, if any exists.
///
/// The fan is constructed from the positions of `outer_indices` and a
/// `central_position` assumed to be in the interior of the stroke.
/// `outer_indices` holds mesh indices for a portion of the left or right
/// outline (per `outer_side`), ordered from the back of the stroke to the
/// front.
pub fn find_last_clockwise_fan_segment(
    mesh: &MutableMeshView,
    outer_indices: &[IndexType],
    outer_side: SideId,
    central_position: Point,
) -> Option<LineSegment> {
    if outer_indices.len() < 2 {
        return None;
    }

    // Construct each triangle that would make up the fan and check whether any
    // has negative signed area, which indicates clockwise winding. Degenerate
    // triangles are ok. Left vs right determines the order of positions in the
    // proposed triangle.
    let mut last_position = mesh.position(*outer_indices.last().unwrap());
    for i in (1..outer_indices.len()).rev() {
        let current_position = mesh.position(outer_indices[i - 1]);
        if current_position == last_position {
            continue;
        }
        let mut triangle = Triangle {
            a: central_position,
            b: current_position,
            c: last_position,
        };
        if outer_side == SideId::Left {
            std::mem::swap(&mut triangle.b, &mut triangle.c);
        }
        if triangle.signed_area() < 0.0 {
            return Some(triangle.edge(1));
        }
        last_position = current_position;
    }

    None
}

/// Discontinuity-aware variant of [`find_last_clockwise_fan_segment`].
///
/// The fan is constructed from the positions along `outer_side` between
/// `outer_index_offset_range.first` and `.last`, taking into account that the
/// outer vertices can come in multiple contiguous sections of
/// `outer_side.indices` separated by the side's intersection-discontinuity
/// ranges. The closing segment of each discontinuity is tested separately.
pub fn find_last_clockwise_multi_fan_segment(
    mesh: &MutableMeshView,
    outer_side: &Side,
    outer_index_offset_range: IndexOffsetRange,
    central_position: Point,
) -> Option<LineSegment> {
    if outer_side.indices.is_empty()
        || outer_index_offset_range.last <= outer_index_offset_range.first
    {
        return None;
    }

    let mut upper_bound = outer_side.indices.len() as u32 - 1;
    for discontinuity in outer_side.intersection_discontinuities.iter().rev() {
        if upper_bound < outer_index_offset_range.first {
            return None;
        }

        let lower_bound = discontinuity.last;
        let first = lower_bound.max(outer_index_offset_range.first);
        let last = upper_bound.min(outer_index_offset_range.last);
        upper_bound = discontinuity.first;
        if last < first {
            continue;
        }

        let indices = &outer_side.indices[first as usize..=last as usize];
        let segment =
            find_last_clockwise_fan_segment(mesh, indices, outer_side.self_id, central_position);
        if segment.is_some() {
            return segment;
        }

        // Test the triangle connecting the first and last indices of the
        // discontinuity if necessary.
        if outer_index_offset_range.first <= discontinuity.first {
            let closing = [
                outer_side.indices[discontinuity.first as usize],
                outer_side.indices[discontinuity.last as usize],
            ];
            let segment = find_last_clockwise_fan_segment(
                mesh,
                &closing,
                outer_side.self_id,
                central_position,
            );
            if segment.is_some() {
                return segment;
            }
        }
    }

    let first = outer_index_offset_range.first;
    let last = upper_bound.min(outer_index_offset_range.last);
    if last <= first {
        return None;
    }
    find_last_clockwise_fan_segment(
        mesh,
        &outer_side.indices[first as usize..=last as usize],
        outer_side.self_id,
        central_position,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::point;
    use crate::vertex::ExtrudedVertex;

    fn mesh_with_positions(positions: &[(f32, f32)]) -> MutableMeshView {
        let mut mesh = MutableMeshView::new();
        for &(x, y) in positions {
            mesh.append_vertex(ExtrudedVertex {
                position: point(x, y),
                ..ExtrudedVertex::default()
            });
        }
        mesh
    }

    #[test]
    fn too_few_indices() {
        let mesh = mesh_with_positions(&[(0.0, 0.0)]);
        assert!(
            find_last_clockwise_fan_segment(&mesh, &[0], SideId::Left, point(1.0, 0.0)).is_none()
        );
    }

    #[test]
    fn convex_fan_has_no_clockwise_segment() {
        // A right-side outline bending around a central position to its left.
        let mesh = mesh_with_positions(&[(1.0, 0.0), (1.0, 1.0), (0.5, 2.0)]);
        let result =
            find_last_clockwise_fan_segment(&mesh, &[0, 1, 2], SideId::Right, point(0.0, 0.0));
        assert!(result.is_none());
    }

    #[test]
    fn reflex_fan_reports_last_clockwise_segment() {
        // The last segment of this right-side outline bends back across the
        // fan, producing a clockwise triangle with the central position.
        let mesh = mesh_with_positions(&[(1.0, 0.0), (1.0, 1.0), (2.0, 0.5)]);
        let result =
            find_last_clockwise_fan_segment(&mesh, &[0, 1, 2], SideId::Right, point(0.0, 0.0));
        let segment = result.unwrap();
        assert_eq!(segment.from, point(1.0, 1.0));
        assert_eq!(segment.to, point(2.0, 0.5));
    }

    #[test]
    fn left_side_winding_is_mirrored() {
        // Mirrored across the central position, the reflex shape belongs to
        // the left side and is still reported.
        let mesh = mesh_with_positions(&[(-1.0, 0.0), (-1.0, 1.0), (-2.0, 0.5)]);
        assert!(find_last_clockwise_fan_segment(
            &mesh,
            &[0, 1, 2],
            SideId::Left,
            point(0.0, 0.0)
        )
        .is_some());
        // The mirrored convex shape is fine.
        let mesh = mesh_with_positions(&[(-1.0, 0.0), (-1.0, 1.0), (-0.5, 2.0)]);
        assert!(find_last_clockwise_fan_segment(
            &mesh,
            &[0, 1, 2],
            SideId::Left,
            point(0.0, 0.0)
        )
        .is_none());
    }

    #[test]
    fn coincident_positions_are_skipped() {
        let mesh = mesh_with_positions(&[(1.0, 0.0), (1.0, 0.0), (1.0, 1.0), (1.0, 1.0)]);
        let result =
            find_last_clockwise_fan_segment(&mesh, &[0, 1, 2, 3], SideId::Right, point(0.0, 0.0));
        assert!(result.is_none());
    }

    #[test]
    fn multi_fan_honors_discontinuities() {
        let mut side = Side::new(SideId::Right);
        // Offsets 1..=3 form a discontinuity; the clockwise jog at offset 2 is
        // wrapped inside it and must not be reported.
        let mesh = mesh_with_positions(&[
            (1.0, 0.0),
            (1.0, 1.0),
            (3.0, 0.5),
            (1.0, 2.0),
            (1.0, 3.0),
        ]);
        side.indices = vec![0, 1, 2, 3, 4];
        side.intersection_discontinuities = vec![IndexOffsetRange { first: 1, last: 3 }];

        let range = IndexOffsetRange { first: 0, last: 4 };
        assert!(
            find_last_clockwise_multi_fan_segment(&mesh, &side, range, point(0.0, 0.0)).is_none()
        );

        // Without the discontinuity the jog is part of the fan and reported.
        side.intersection_discontinuities.clear();
        assert!(
            find_last_clockwise_multi_fan_segment(&mesh, &side, range, point(0.0, 0.0)).is_some()
        );
    }
}
