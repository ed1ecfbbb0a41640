//! A logical "U" shaped traversal over a portion of the stroke outline, and
//! the outline/segment intersection search used by intersection handling.

use crate::math::{distance_between, IndexType, LineSegment, Point, Triangle};
use crate::mesh_view::MutableMeshView;
use crate::side::Side;

/// A "U" shaped partial outline created by connecting two ranges of vertices:
/// iteration proceeds backwards down the starting side's indices and then
/// forwards up the ending side's.
///
/// For example, with starting indices `{1, 2, 3}` and ending indices
/// `{4, 5, 6}`, looping over the outline gives `{3, 2, 1, 4, 5, 6}`.
///
/// The outline takes a snapshot of the index ranges it covers. Entries of
/// `Side::indices` are only ever appended or truncated, never overwritten, so
/// appending to the underlying sides cannot invalidate an outline.
#[derive(Clone, Debug, Default)]
pub struct DirectedPartialOutline {
    indices: Vec<IndexType>,
    starting_side_size: u32,
}

impl DirectedPartialOutline {
    pub fn new(
        starting_indices: &[IndexType],
        starting_first: u32,
        n_starting: u32,
        ending_indices: &[IndexType],
        ending_first: u32,
        n_ending: u32,
    ) -> Self {
        let mut indices = Vec::with_capacity((n_starting + n_ending) as usize);
        indices.extend(
            starting_indices[starting_first as usize..(starting_first + n_starting) as usize]
                .iter()
                .rev(),
        );
        indices.extend_from_slice(
            &ending_indices[ending_first as usize..(ending_first + n_ending) as usize],
        );
        DirectedPartialOutline {
            indices,
            starting_side_size: n_starting,
        }
    }

    #[inline]
    pub fn size(&self) -> u32 {
        self.indices.len() as u32
    }

    /// The number of outline indices that come from the starting side.
    #[inline]
    pub fn starting_side_size(&self) -> u32 {
        self.starting_side_size
    }

    #[inline]
    pub fn index(&self, i: u32) -> IndexType {
        self.indices[i as usize]
    }
}

/// Returns the offset into `Side::indices` of the last index that should be
/// considered part of the stroke's outline. This is the last index on the
/// side, unless the side is modifying triangulation.
pub fn last_outline_index_offset(side: &Side) -> u32 {
    if side.is_retriangulating() {
        side.intersection.as_ref().unwrap().starting_offset
    } else {
        side.indices.len() as u32 - 1
    }
}

/// Creates the partial outline that starts at `starting_side`'s most recent
/// partition and runs to the end of `ending_side`'s outline.
pub fn construct_partial_outline(starting_side: &Side, ending_side: &Side) -> DirectedPartialOutline {
    if starting_side.indices.is_empty() {
        return DirectedPartialOutline::default();
    }

    let partition_start = &starting_side.partition_start;
    let starting_first = partition_start.adjacent_first_index_offset;
    let starting_last = last_outline_index_offset(starting_side);
    let n_starting = starting_last - starting_first + 1;

    let ending_first = partition_start.opposite_first_index_offset;
    let n_ending = if partition_start.outline_connects_sides && !ending_side.indices.is_empty() {
        last_outline_index_offset(ending_side) - ending_first + 1
    } else {
        0
    };

    DirectedPartialOutline::new(
        &starting_side.indices,
        starting_first,
        n_starting,
        &ending_side.indices,
        ending_first,
        n_ending,
    )
}

/// An intersection between a [`DirectedPartialOutline`] and a segment. The
/// true intersection may not be a single point when parallel segments
/// overlap, in which case this holds the earliest position along the outline.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SegmentIntersection {
    pub position: Point,
    /// Index into the outline for the start of the intersecting segment.
    pub starting_index: u32,
    /// Index into the outline for the end of the intersecting segment. This is
    /// usually `starting_index + 1`, but equals `starting_index` when the
    /// outline consisted of a single index or only degenerate positions.
    pub ending_index: u32,
    /// Value in [0, 1] locating the intersection along the outline segment: 0
    /// at the vertex `outline[starting_index]`, 1 at `outline[ending_index]`.
    pub outline_interpolation_value: f32,
    /// Value in [0, 1] locating the intersection along the query segment: 0 at
    /// `segment.from`, 1 at `segment.to`.
    pub segment_interpolation_value: f32,
}

/// Return type for [`find_outline_intersection`].
#[derive(Clone, Debug, PartialEq)]
pub struct OutlineIntersectionResult {
    pub segment_intersection: Option<SegmentIntersection>,
    /// How much search budget remains after the search.
    pub remaining_search_budget: f32,
}

/// Searches for an intersection between a partial outline and a segment.
///
/// The search tests segments made from adjacent pairs of outline indices,
/// keeping track of the distance traveled along the outline, and exits once
/// the traveled distance exceeds `search_budget`. If `containing_triangle` is
/// provided, the search also terminates (with no hit and a zero budget) as
/// soon as a visited outline segment ends outside of the triangle.
///
/// The search looks for the first nondegenerate intersecting segment. If the
/// outline consists of a single index, or all of its vertices share one
/// position, the result is instead the last vertex if it lies on `segment`.
pub fn find_outline_intersection(
    outline: &DirectedPartialOutline,
    segment: &LineSegment,
    mesh: &MutableMeshView,
    mut search_budget: f32,
    containing_triangle: Option<Triangle>,
) -> OutlineIntersectionResult {
    let mut i = 1;
    while i < outline.size() && search_budget > 0.0 {
        let outline_segment = LineSegment {
            from: mesh.position(outline.index(i - 1)),
            to: mesh.position(outline.index(i)),
        };
        if !outline_segment.is_degenerate() {
            if let Some((outline_t, segment_t)) = outline_segment.intersection_t(segment) {
                let position = outline_segment.sample(outline_t);
                search_budget -= distance_between(outline_segment.from, position);
                return OutlineIntersectionResult {
                    segment_intersection: Some(SegmentIntersection {
                        position,
                        starting_index: i - 1,
                        ending_index: i,
                        outline_interpolation_value: outline_t,
                        segment_interpolation_value: segment_t,
                    }),
                    remaining_search_budget: search_budget.max(0.0),
                };
            }
            if let Some(triangle) = &containing_triangle {
                if !triangle.contains_point(outline_segment.to) {
                    search_budget = 0.0;
                    break;
                }
            }
            search_budget -= outline_segment.length();
        }
        i += 1;
    }

    // If we made it this far, check the degenerate segment made up of just the
    // last index's position.
    if outline.size() > 0 && search_budget > 0.0 {
        let last = outline.size() - 1;
        let last_position = mesh.position(outline.index(last));
        let degenerate = LineSegment {
            from: last_position,
            to: last_position,
        };
        if let Some((outline_t, segment_t)) = degenerate.intersection_t(segment) {
            return OutlineIntersectionResult {
                segment_intersection: Some(SegmentIntersection {
                    position: last_position,
                    starting_index: last,
                    ending_index: last,
                    outline_interpolation_value: outline_t,
                    segment_interpolation_value: segment_t,
                }),
                remaining_search_budget: search_budget.max(0.0),
            };
        }
    }

    OutlineIntersectionResult {
        segment_intersection: None,
        remaining_search_budget: search_budget.max(0.0),
    }
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
    fn traversal_order() {
        let starting = vec![1, 2, 3];
        let ending = vec![4, 5, 6];
        let outline = DirectedPartialOutline::new(&starting, 0, 3, &ending, 0, 3);

        assert_eq!(outline.size(), 6);
        assert_eq!(outline.starting_side_size(), 3);
        let collected: Vec<_> = (0..outline.size()).map(|i| outline.index(i)).collect();
        assert_eq!(collected, vec![3, 2, 1, 4, 5, 6]);
    }

    #[test]
    fn traversal_subranges() {
        let starting = vec![10, 11, 12, 13];
        let ending = vec![20, 21, 22];
        let outline = DirectedPartialOutline::new(&starting, 1, 2, &ending, 2, 1);

        let collected: Vec<_> = (0..outline.size()).map(|i| outline.index(i)).collect();
        assert_eq!(collected, vec![12, 11, 22]);
    }

    #[test]
    fn finds_first_intersection() {
        // Outline runs up the y-axis; the query segment crosses it at y = 1.
        let mesh = mesh_with_positions(&[(0.0, 0.0), (0.0, 2.0), (0.0, 4.0)]);
        let outline = DirectedPartialOutline::new(&[], 0, 0, &[0, 1, 2], 0, 3);
        let segment = LineSegment {
            from: point(-1.0, 1.0),
            to: point(1.0, 1.0),
        };

        let result = find_outline_intersection(&outline, &segment, &mesh, 10.0, None);
        let hit = result.segment_intersection.unwrap();
        assert_eq!(hit.position, point(0.0, 1.0));
        assert_eq!(hit.starting_index, 0);
        assert_eq!(hit.ending_index, 1);
        assert!((hit.outline_interpolation_value - 0.5).abs() < 1e-6);
        assert!((hit.segment_interpolation_value - 0.5).abs() < 1e-6);
        // One unit of outline was consumed before the hit.
        assert!((result.remaining_search_budget - 9.0).abs() < 1e-6);
    }

    #[test]
    fn budget_exhaustion_stops_search() {
        let mesh = mesh_with_positions(&[(0.0, 0.0), (0.0, 2.0), (0.0, 4.0)]);
        let outline = DirectedPartialOutline::new(&[], 0, 0, &[0, 1, 2], 0, 3);
        let segment = LineSegment {
            from: point(-1.0, 3.0),
            to: point(1.0, 3.0),
        };

        // The hit is at distance 3 along the outline but the budget runs out
        // after the first segment.
        let result = find_outline_intersection(&outline, &segment, &mesh, 2.0, None);
        assert!(result.segment_intersection.is_none());
        assert_eq!(result.remaining_search_budget, 0.0);
    }

    #[test]
    fn containing_triangle_stops_search() {
        let mesh = mesh_with_positions(&[(0.0, 0.0), (0.0, 2.0), (0.0, 40.0)]);
        let outline = DirectedPartialOutline::new(&[], 0, 0, &[0, 1, 2], 0, 3);
        let segment = LineSegment {
            from: point(5.0, 39.0),
            to: point(6.0, 39.0),
        };
        let triangle = Triangle {
            a: point(-1.0, -1.0),
            b: point(1.0, -1.0),
            c: point(0.0, 3.0),
        };

        let result =
            find_outline_intersection(&outline, &segment, &mesh, 1000.0, Some(triangle));
        assert!(result.segment_intersection.is_none());
        assert_eq!(result.remaining_search_budget, 0.0);
    }

    #[test]
    fn degenerate_outline_tests_last_vertex() {
        // All outline vertices share one position, which lies on the segment.
        let mesh = mesh_with_positions(&[(1.0, 1.0), (1.0, 1.0)]);
        let outline = DirectedPartialOutline::new(&[0, 1], 0, 2, &[], 0, 0);
        let segment = LineSegment {
            from: point(0.0, 0.0),
            to: point(2.0, 2.0),
        };

        let result = find_outline_intersection(&outline, &segment, &mesh, 10.0, None);
        let hit = result.segment_intersection.unwrap();
        assert_eq!(hit.starting_index, hit.ending_index);
        assert_eq!(hit.position, point(1.0, 1.0));
        assert!((hit.segment_interpolation_value - 0.5).abs() < 1e-6);
    }
}
