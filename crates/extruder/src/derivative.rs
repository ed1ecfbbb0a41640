//! Recalculation of the per-vertex derivative and label attributes that the
//! renderer uses for anti-aliasing.

use crate::math::{distance_between, vector, IndexType, Point, Vector};
use crate::mesh_view::MutableMeshView;
use crate::side::SideId;
use crate::vertex::{ForwardCategory, Label};

/// Return type for [`find_first_exterior_vertices`].
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct OptionalSideIndexPair {
    pub left: Option<IndexType>,
    pub right: Option<IndexType>,
}

fn vertex_is_exterior(mesh: &MutableMeshView, index: IndexType) -> bool {
    mesh.side_label(index) != Label::INTERIOR || mesh.forward_label(index) != Label::INTERIOR
}

/// Iterates over the mesh triangle indices beginning with `starting_triangle`
/// to find the first encountered index on each side that has an exterior
/// label.
///
/// `vertex_side_ids` is expected to map each index to its [`SideId`].
pub fn find_first_exterior_vertices(
    mesh: &MutableMeshView,
    vertex_side_ids: &[SideId],
    starting_triangle: u32,
) -> OptionalSideIndexPair {
    let mut index_pair = OptionalSideIndexPair::default();

    for i in starting_triangle..mesh.triangle_count() {
        for &index in &mesh.triangle_indices(i) {
            if vertex_side_ids[index as usize] == SideId::Left {
                if index_pair.left.is_none() && vertex_is_exterior(mesh, index) {
                    index_pair.left = Some(index);
                }
            } else if index_pair.right.is_none() && vertex_is_exterior(mesh, index) {
                index_pair.right = Some(index);
            }
        }
        if index_pair.left.is_some() && index_pair.right.is_some() {
            break;
        }
    }

    index_pair
}

/// Returns the offset into `side_indices` for the start of the "coincident"
/// vertex range that includes the vertex at `side_indices[included_offset]`.
///
/// Coincident vertices sit at adjacent offsets and share a position, but must
/// not straddle the boundary of two disconnected partitions, which is detected
/// through the forward label categories. The returned value is less than or
/// equal to the passed-in offset.
pub fn starting_offset_for_coincident_connected_vertices(
    mesh: &MutableMeshView,
    side_indices: &[IndexType],
    included_offset: u32,
) -> u32 {
    assert!((included_offset as usize) < side_indices.len());

    let position = mesh.position(side_indices[included_offset as usize]);
    let mut forward_category = mesh
        .forward_label(side_indices[included_offset as usize])
        .decode_forward_category();
    for i in (1..=included_offset).rev() {
        let index = side_indices[i as usize - 1];
        let current_forward_category = mesh.forward_label(index).decode_forward_category();
        if mesh.position(index) != position
            || (current_forward_category != forward_category
                && forward_category == ForwardCategory::ExteriorFront)
        {
            // This is a boundary between disconnected partitions that happen
            // to have coincident vertices.
            return i;
        }
        forward_category = current_forward_category;
    }
    0
}

// One coincident-position run of outline vertices, as offsets into the slice
// of side indices being updated.
#[derive(Copy, Clone, Debug)]
struct CoincidentRun {
    first: usize,
    last: usize,
    position: Point,
}

/// Computes per-vertex side and forward derivatives and re-encodes label
/// margins for a range of outline vertices.
///
/// Side derivatives are averaged over the triangles that join a vertex to the
/// opposite side of the stroke and point left-to-right regardless of side, so
/// that [`Label::derivative_outset_sign`] holds. Forward derivatives are
/// central differences over coincident-position runs along the outline.
/// Margins bound the shader outset to half the distance to the neighboring
/// runs; a margin can only decrease, so seams the engine closed with a zero
/// margin stay closed.
#[derive(Clone, Debug, Default)]
pub struct DerivativeCalculator {
    accumulators: Vec<(Vector, u32)>,
    runs: Vec<CoincidentRun>,
}

impl DerivativeCalculator {
    pub fn new() -> Self {
        DerivativeCalculator::default()
    }

    /// Updates the derivative and label attributes of the vertices listed in
    /// `left_indices` and `right_indices`, which must be contiguous tail
    /// ranges of the respective sides' outline indices.
    pub fn update_mesh(
        &mut self,
        left_indices: &[IndexType],
        right_indices: &[IndexType],
        vertex_side_ids: &[SideId],
        mesh: &mut MutableMeshView,
    ) {
        if left_indices.is_empty() && right_indices.is_empty() {
            return;
        }

        let min_index = left_indices
            .iter()
            .chain(right_indices.iter())
            .copied()
            .min()
            .unwrap();

        self.accumulate_side_derivatives(min_index, vertex_side_ids, mesh);
        self.update_side(left_indices, min_index, mesh);
        self.update_side(right_indices, min_index, mesh);
    }

    // Walks the triangles that reference any vertex at or after `min_index`
    // and accumulates, for every such vertex, the vectors joining it to the
    // opposite side of its triangles.
    fn accumulate_side_derivatives(
        &mut self,
        min_index: IndexType,
        vertex_side_ids: &[SideId],
        mesh: &MutableMeshView,
    ) {
        self.accumulators.clear();
        self.accumulators
            .resize((mesh.vertex_count() - min_index) as usize, (vector(0.0, 0.0), 0));

        // Find the first triangle that can reference an updated vertex.
        // Triangle indices are mostly increasing toward the end of the mesh,
        // but retriangulation can break that, so walk back past the first
        // fully-older triangle and keep scanning while recent ones remain.
        let mut first_triangle = mesh.triangle_count();
        while first_triangle > 0 {
            let indices = mesh.triangle_indices(first_triangle - 1);
            if indices.iter().all(|&index| index < min_index) {
                break;
            }
            first_triangle -= 1;
        }

        for triangle in first_triangle..mesh.triangle_count() {
            let indices = mesh.triangle_indices(triangle);
            for corner in 0..3 {
                let index = indices[corner];
                if index < min_index {
                    continue;
                }
                let own_side = vertex_side_ids[index as usize];

                // Average over the opposite-side corners of the triangle,
                // oriented left-to-right regardless of the vertex's own side.
                let mut opposite_sum = vector(0.0, 0.0);
                let mut opposite_count = 0;
                for &other in &indices {
                    if vertex_side_ids[other as usize] != own_side {
                        opposite_sum += mesh.position(other).to_vector();
                        opposite_count += 1;
                    }
                }
                if opposite_count == 0 {
                    // All three corners belong to one side; such triangles do
                    // not span the stroke width.
                    continue;
                }
                let opposite_position = (opposite_sum / opposite_count as f32).to_point();
                let delta = match own_side {
                    SideId::Left => opposite_position - mesh.position(index),
                    SideId::Right => mesh.position(index) - opposite_position,
                };
                let (sum, count) = &mut self.accumulators[(index - min_index) as usize];
                *sum += delta;
                *count += 1;
            }
        }
    }

    fn averaged_accumulator(&self, index: IndexType, min_index: IndexType) -> Vector {
        let (sum, count) = self.accumulators[(index - min_index) as usize];
        if count == 0 {
            return vector(0.0, 0.0);
        }
        let averaged = sum / count as f32;
        if averaged.x.is_finite() && averaged.y.is_finite() {
            averaged
        } else {
            vector(0.0, 0.0)
        }
    }

    fn update_side(
        &mut self,
        side_indices: &[IndexType],
        min_index: IndexType,
        mesh: &mut MutableMeshView,
    ) {
        if side_indices.is_empty() {
            return;
        }

        self.runs.clear();
        for (offset, &index) in side_indices.iter().enumerate() {
            let position = mesh.position(index);
            match self.runs.last_mut() {
                Some(run) if run.position == position => run.last = offset,
                _ => self.runs.push(CoincidentRun {
                    first: offset,
                    last: offset,
                    position,
                }),
            }
        }

        for r in 0..self.runs.len() {
            let run = self.runs[r];
            let previous_position = if r > 0 {
                Some(self.runs[r - 1].position)
            } else {
                None
            };
            let next_position = self.runs.get(r + 1).map(|run| run.position);

            let forward_derivative = match (previous_position, next_position) {
                (Some(previous), Some(next)) => (next - previous) * 0.5,
                (None, Some(next)) => next - run.position,
                (Some(previous), None) => run.position - previous,
                (None, None) => vector(0.0, 0.0),
            };

            // Direction across the stroke, pointing left-to-right: the travel
            // direction rotated a quarter turn clockwise. Projecting the
            // triangle-derived vectors onto it removes the along-stroke
            // component the triangle diagonals contribute.
            let forward_length = forward_derivative.length();
            let across = if forward_length > 0.0 {
                Some(vector(forward_derivative.y, -forward_derivative.x) / forward_length)
            } else {
                None
            };
            let oriented = |raw: Vector| match across {
                Some(direction) => direction * raw.dot(direction),
                None => raw,
            };

            // Average the triangle-derived side derivative across the
            // coincident exterior vertices of the run.
            let mut exterior_sum = vector(0.0, 0.0);
            let mut exterior_count = 0;
            for offset in run.first..=run.last {
                let index = side_indices[offset];
                if mesh.side_label(index) != Label::INTERIOR {
                    exterior_sum += self.averaged_accumulator(index, min_index);
                    exterior_count += 1;
                }
            }
            let exterior_average = if exterior_count > 0 {
                exterior_sum / exterior_count as f32
            } else {
                vector(0.0, 0.0)
            };

            let half_min_neighbor_distance = {
                let previous = previous_position
                    .map(|position| distance_between(run.position, position));
                let next = next_position.map(|position| distance_between(run.position, position));
                match (previous, next) {
                    (Some(a), Some(b)) => Some(0.5 * a.min(b)),
                    (Some(a), None) => Some(0.5 * a),
                    (None, Some(b)) => Some(0.5 * b),
                    (None, None) => None,
                }
            };

            for offset in run.first..=run.last {
                let index = side_indices[offset];
                let side_label = mesh.side_label(index);
                let side_derivative = if side_label != Label::INTERIOR {
                    oriented(exterior_average)
                } else {
                    oriented(self.averaged_accumulator(index, min_index))
                };
                mesh.set_side_derivative(index, side_derivative);
                mesh.set_forward_derivative(index, forward_derivative);

                if let Some(half_distance) = half_min_neighbor_distance {
                    if side_label != Label::INTERIOR {
                        let magnitude = side_derivative.length();
                        if magnitude > 0.0 {
                            let margin =
                                side_label.decode_margin().min(half_distance / magnitude);
                            mesh.set_side_label(index, side_label.with_margin(margin));
                        }
                    }
                    let forward_label = mesh.forward_label(index);
                    if forward_label != Label::INTERIOR {
                        let magnitude = forward_derivative.length();
                        if magnitude > 0.0 {
                            let margin =
                                forward_label.decode_margin().min(half_distance / magnitude);
                            mesh.set_forward_label(index, forward_label.with_margin(margin));
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::point;
    use crate::vertex::ExtrudedVertex;

    fn labeled_vertex(x: f32, y: f32, side_label: Label) -> ExtrudedVertex {
        let mut vertex = ExtrudedVertex {
            position: point(x, y),
            ..ExtrudedVertex::default()
        };
        vertex.attributes.side_label = side_label;
        vertex
    }

    // A two-triangle strip: L0, R0, L1, R1 with the standard triangulation.
    fn strip() -> (MutableMeshView, Vec<SideId>) {
        let mut mesh = MutableMeshView::new();
        mesh.append_vertex(labeled_vertex(-1.0, 0.0, Label::EXTERIOR_LEFT));
        mesh.append_vertex(labeled_vertex(1.0, 0.0, Label::EXTERIOR_RIGHT));
        mesh.append_vertex(labeled_vertex(-1.0, 1.0, Label::EXTERIOR_LEFT));
        mesh.append_vertex(labeled_vertex(1.0, 1.0, Label::EXTERIOR_RIGHT));
        mesh.append_triangle_indices([0, 1, 2]);
        mesh.append_triangle_indices([2, 1, 3]);
        let side_ids = vec![SideId::Left, SideId::Right, SideId::Left, SideId::Right];
        (mesh, side_ids)
    }

    #[test]
    fn find_first_exterior() {
        let (mut mesh, side_ids) = strip();
        let pair = find_first_exterior_vertices(&mesh, &side_ids, 0);
        assert_eq!(pair.left, Some(0));
        assert_eq!(pair.right, Some(1));

        let pair = find_first_exterior_vertices(&mesh, &side_ids, 1);
        assert_eq!(pair.left, Some(2));
        assert_eq!(pair.right, Some(1));

        // Interior vertices are skipped.
        mesh.set_side_label(2, Label::INTERIOR);
        let pair = find_first_exterior_vertices(&mesh, &side_ids, 1);
        assert_eq!(pair.left, None);
        assert_eq!(pair.right, Some(1));
    }

    #[test]
    fn coincident_run_start() {
        let mut mesh = MutableMeshView::new();
        mesh.append_vertex(labeled_vertex(0.0, 0.0, Label::EXTERIOR_LEFT));
        mesh.append_vertex(labeled_vertex(0.0, 1.0, Label::EXTERIOR_LEFT));
        mesh.append_vertex(labeled_vertex(0.0, 1.0, Label::EXTERIOR_LEFT));
        mesh.append_vertex(labeled_vertex(0.0, 1.0, Label::EXTERIOR_LEFT));
        let indices = vec![0, 1, 2, 3];

        assert_eq!(
            starting_offset_for_coincident_connected_vertices(&mesh, &indices, 3),
            1
        );
        assert_eq!(
            starting_offset_for_coincident_connected_vertices(&mesh, &indices, 0),
            0
        );

        // A front-exterior boundary splits otherwise coincident vertices.
        mesh.set_forward_label(2, Label::EXTERIOR_FRONT);
        mesh.set_forward_label(1, Label::EXTERIOR_BACK);
        assert_eq!(
            starting_offset_for_coincident_connected_vertices(&mesh, &indices, 3),
            2
        );
    }

    #[test]
    fn strip_derivatives() {
        let (mut mesh, side_ids) = strip();
        let mut calculator = DerivativeCalculator::new();
        calculator.update_mesh(&[0, 2], &[1, 3], &side_ids, &mut mesh);

        // Side derivatives point left-to-right and span the stroke width.
        assert_eq!(mesh.side_derivative(0), vector(2.0, 0.0));
        assert_eq!(mesh.side_derivative(1), vector(2.0, 0.0));
        assert_eq!(mesh.side_derivative(2), vector(2.0, 0.0));
        assert_eq!(mesh.side_derivative(3), vector(2.0, 0.0));

        // Forward derivatives follow the direction of travel.
        assert_eq!(mesh.forward_derivative(0), vector(0.0, 1.0));
        assert_eq!(mesh.forward_derivative(2), vector(0.0, 1.0));

        // Labels keep their categories; margins are bounded by the outline
        // spacing.
        assert_eq!(
            mesh.side_label(0).decode_side_category(),
            crate::vertex::SideCategory::ExteriorLeft
        );
        assert!(mesh.side_label(0).decode_margin() <= 0.5);
    }

    #[test]
    fn margins_only_decrease() {
        let (mut mesh, side_ids) = strip();
        // A seam vertex the engine closed: margin 0 encodes as interior and
        // must stay that way.
        mesh.set_side_label(2, Label::EXTERIOR_LEFT.with_margin(0.0));
        let mut calculator = DerivativeCalculator::new();
        calculator.update_mesh(&[0, 2], &[1, 3], &side_ids, &mut mesh);

        assert_eq!(mesh.side_label(2), Label::INTERIOR);
    }

    #[test]
    fn coincident_exterior_vertices_share_derivatives() {
        let mut mesh = MutableMeshView::new();
        mesh.append_vertex(labeled_vertex(-1.0, 0.0, Label::EXTERIOR_LEFT));
        mesh.append_vertex(labeled_vertex(1.0, 0.0, Label::EXTERIOR_RIGHT));
        mesh.append_vertex(labeled_vertex(-1.0, 1.0, Label::EXTERIOR_LEFT));
        mesh.append_vertex(labeled_vertex(-1.0, 1.0, Label::EXTERIOR_LEFT));
        mesh.append_vertex(labeled_vertex(1.0, 1.0, Label::EXTERIOR_RIGHT));
        mesh.append_triangle_indices([0, 1, 2]);
        mesh.append_triangle_indices([3, 1, 4]);
        let side_ids = vec![
            SideId::Left,
            SideId::Right,
            SideId::Left,
            SideId::Left,
            SideId::Right,
        ];

        let mut calculator = DerivativeCalculator::new();
        calculator.update_mesh(&[0, 2, 3], &[1, 4], &side_ids, &mut mesh);

        // The coincident pair gets one shared, averaged side derivative.
        assert_eq!(mesh.side_derivative(2), mesh.side_derivative(3));
        assert_eq!(mesh.side_derivative(2), vector(2.0, 0.0));
        // And one shared forward derivative for the whole run.
        assert_eq!(mesh.forward_derivative(2), mesh.forward_derivative(3));
    }
}
