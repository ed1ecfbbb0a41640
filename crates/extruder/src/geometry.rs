//! The incremental triangulation engine.

use std::collections::BTreeMap;

use crate::derivative::{
    find_first_exterior_vertices, starting_offset_for_coincident_connected_vertices,
    DerivativeCalculator,
};
use crate::math::{
    distance_between, point, Envelope, IndexType, LineSegment, Point, Triangle,
};
use crate::mesh_view::MutableMeshView;
use crate::outline::{
    construct_partial_outline, find_outline_intersection, last_outline_index_offset,
    DirectedPartialOutline, SegmentIntersection,
};
use crate::side::{
    IndexOffsetRange, IndexOffsetRanges, MeshPartitionStart, SelfIntersection, Side, SideId,
};
use crate::simplify::simplify_polyline;
use crate::vertex::{barycentric_lerp, ExtrudedVertex, Label};
use crate::winding::find_last_clockwise_multi_fan_segment;
use crate::TipState;

#[cfg(debug_assertions)]
macro_rules! ext_log {
    ($obj:ident, $fmt:expr) => (
        if $obj.log {
            println!($fmt);
        }
    );
    ($obj:ident, $fmt:expr, $($arg:tt)*) => (
        if $obj.log {
            println!($fmt, $($arg)*);
        }
    );
}

#[cfg(not(debug_assertions))]
macro_rules! ext_log {
    ($obj:ident, $fmt:expr) => {};
    ($obj:ident, $fmt:expr, $($arg:tt)*) => {};
}

/// Whether the engine repairs self-intersections of the stroke outline.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IntersectionHandling {
    Enabled,
    Disabled,
}

/// How the brush maps textures onto the stroke.
///
/// In `Winding` mode, the pivot of an intersection triangle fan is marked for
/// the shader with the sentinel `surface_uv` value returned by
/// [`winding_texture_uv_sentinel`]. `Tiling` mode uses no sentinel.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TextureCoordType {
    Tiling,
    Winding,
}

/// The `surface_uv` value that marks a fan pivot vertex in winding texture
/// mode.
#[inline]
pub fn winding_texture_uv_sentinel() -> Point {
    point(0.0, -1.0)
}

/// Counts of left and right side indices.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct IndexCounts {
    pub left: usize,
    pub right: usize,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum TriangleWinding {
    CounterClockwise,
    Clockwise,
    Degenerate,
}

fn winding_of(signed_area: f32) -> TriangleWinding {
    if signed_area > 0.0 {
        TriangleWinding::CounterClockwise
    } else if signed_area < 0.0 {
        TriangleWinding::Clockwise
    } else {
        TriangleWinding::Degenerate
    }
}

fn default_exterior_side_label(side_id: SideId) -> Label {
    match side_id {
        SideId::Left => Label::EXTERIOR_LEFT,
        SideId::Right => Label::EXTERIOR_RIGHT,
    }
}

fn update_first_mutated_index(index: IndexType, first_mutated: &mut Option<IndexType>) {
    match first_mutated {
        Some(value) => *value = (*value).min(index),
        None => *first_mutated = Some(index),
    }
}

fn initial_outline_reposition_budget(average_tip_dimension: f32) -> f32 {
    average_tip_dimension
}

fn intersection_travel_limit(average_tip_dimension: f32) -> f32 {
    // Should stay equal to or greater than the outline reposition budget.
    1.25 * average_tip_dimension
}

fn retriangulation_travel_threshold(average_tip_dimension: f32) -> f32 {
    0.125 * average_tip_dimension
}

fn simplification_travel_limit(average_tip_dimension: f32) -> f32 {
    // Keeps simplification from creating triangles that stretch much longer
    // than the stroke is wide.
    8.0 * average_tip_dimension
}

// Returns the envelope of positions in all `mesh` triangles from
// `first_triangle` to the end of the mesh.
fn envelope_of_triangles(mesh: &MutableMeshView, first_triangle: u32) -> Envelope {
    let mut envelope = Envelope::new();
    for i in first_triangle..mesh.triangle_count() {
        for corner in 0..3 {
            envelope.add_point(mesh.position(mesh.vertex_index(i, corner)));
        }
    }
    envelope
}

// Every vertex added to the mesh becomes part of a triangle, so when all
// triangles are in play the envelope can be computed from positions alone.
fn envelope_of_all_positions(mesh: &MutableMeshView) -> Envelope {
    let mut envelope = Envelope::new();
    for i in 0..mesh.vertex_count() {
        envelope.add_point(mesh.position(i));
    }
    envelope
}

// Number of quads created as the first step of triangulating a new batch.
fn number_of_starting_quads(n_left: u32, n_right: u32) -> u32 {
    n_left.min(n_right) / 2
}

// Size of the triangle fan created after the first batch of quads.
fn number_of_fan_triangles(n_left: u32, n_right: u32) -> u32 {
    n_left.max(n_right) - n_left.min(n_right)
}

// Number of quads created as the last step of triangulating a batch.
fn number_of_ending_quads(n_left: u32, n_right: u32) -> u32 {
    (n_left.min(n_right) - 1) / 2
}

/// Metadata about the engine at the last extrusion break, i.e. the point
/// where the current stroke outline began.
#[derive(Clone, Debug, Default)]
struct SideBreakInfo {
    index_count: u32,
    intersection_discontinuity_count: u32,
}

#[derive(Clone, Debug, Default)]
struct LastExtrusionBreakMetadata {
    break_count: u32,
    vertex_count: u32,
    triangle_count: u32,
    left_side_info: SideBreakInfo,
    right_side_info: SideBreakInfo,
}

#[derive(Clone, Debug, Default)]
struct SideSaveState {
    n_indices: u32,
    n_intersection_discontinuities: u32,
    // Values of `Side::indices` and `Side::intersection_discontinuities` past
    // the counts above. Only populated when geometry was deleted after the
    // save point, via `clear_since_last_extrusion_break`.
    saved_indices: Vec<IndexType>,
    saved_intersection_discontinuities: Vec<IndexOffsetRange>,
    partition_start: MeshPartitionStart,
    first_simplifiable_index_offset: u32,
    vertex_buffer: Vec<ExtrudedVertex>,
    next_buffered_vertex_offset: u32,
    intersection: Option<SelfIntersection>,
    last_simplified_vertex_positions: Vec<Point>,
}

#[derive(Clone, Debug, Default)]
struct SavePointState {
    is_active: bool,
    // True once the save point holds the complete geometry after the last
    // extrusion break that has been cleared by
    // `clear_since_last_extrusion_break`.
    contains_all_geometry_since_last_extrusion_break: bool,
    n_mesh_vertices: u32,
    n_mesh_triangles: u32,
    // Saved tails of `vertex_side_ids` and `side_offsets`; existing entries of
    // those arrays are only deleted (never overwritten), so contiguous chunks
    // suffice.
    saved_vertex_side_ids: Vec<SideId>,
    saved_side_offsets: Vec<u32>,
    // Pre-mutation values of any entries that existed when the save point was
    // set and have been modified since. Ordered maps: the revert path must
    // re-append entries past the truncation point in index order.
    saved_vertices: BTreeMap<IndexType, ExtrudedVertex>,
    saved_triangle_indices: BTreeMap<u32, [IndexType; 3]>,
    saved_opposite_side_offsets: BTreeMap<IndexType, u32>,
    saved_last_extrusion_break: LastExtrusionBreakMetadata,
    left_side_state: SideSaveState,
    right_side_state: SideSaveState,
}

/// The working budgets derived from the last tip state for one call to
/// [`Geometry::process_new_vertices`].
#[derive(Copy, Clone, Debug)]
struct Budgets {
    initial_outline_reposition_budget: f32,
    intersection_travel_limit: f32,
    retriangulation_travel_threshold: f32,
}

// Data gathered for one slow-path triangle append. "Adjacent" refers to the
// side receiving the new vertex; "opposite" is the other side.
struct SlowPathInfo {
    adjacent: SideId,
    adjacent_position: Point,
    opposite_position: Point,
    proposed_vertex: ExtrudedVertex,
    // An existing mesh triangle containing `proposed_vertex`, if one was
    // found.
    proposed_vertex_triangle: Option<u32>,
}

/// Incrementally builds the triangle mesh representing the stroke out of the
/// appended outline vertices.
///
/// See the [crate documentation](crate) for an overview of the data flow.
pub struct Geometry {
    handle_self_intersections: bool,
    texture_coord_type: TextureCoordType,
    mesh: MutableMeshView,
    // Identifies which side each mesh vertex comes from.
    vertex_side_ids: Vec<SideId>,
    // For each mesh vertex, its offset into `Side::indices` on the side
    // identified by `vertex_side_ids`.
    side_offsets: Vec<u32>,
    // For each mesh vertex, the first offset into the opposite side's
    // `indices` for a vertex that can be part of the same triangle.
    opposite_side_offsets: Vec<u32>,
    left_side: Side,
    right_side: Side,
    last_extrusion_break: LastExtrusionBreakMetadata,
    // Scratch storage for `simplify_buffered_vertices`, kept to reuse the
    // allocation.
    simplification_vertex_buffer: Vec<ExtrudedVertex>,
    save_point_state: SavePointState,
    // Mutations that could not be recovered by inspecting the mesh: positions
    // that were overwritten or removed from the triangulation.
    envelope_of_removed_geometry: Envelope,
    first_mutated_left_index: Option<IndexType>,
    first_mutated_right_index: Option<IndexType>,
    first_mutated_left_index_offset_in_current_partition: u32,
    first_mutated_right_index_offset_in_current_partition: u32,
    derivative_calculator: DerivativeCalculator,
    log: bool,
}

impl Default for Geometry {
    fn default() -> Self {
        Geometry::new()
    }
}

impl Geometry {
    pub fn new() -> Self {
        Geometry {
            handle_self_intersections: true,
            texture_coord_type: TextureCoordType::Tiling,
            mesh: MutableMeshView::new(),
            vertex_side_ids: Vec::new(),
            side_offsets: Vec::new(),
            opposite_side_offsets: Vec::new(),
            left_side: Side::new(SideId::Left),
            right_side: Side::new(SideId::Right),
            last_extrusion_break: LastExtrusionBreakMetadata::default(),
            simplification_vertex_buffer: Vec::new(),
            save_point_state: SavePointState::default(),
            envelope_of_removed_geometry: Envelope::new(),
            first_mutated_left_index: None,
            first_mutated_right_index: None,
            first_mutated_left_index_offset_in_current_partition: 0,
            first_mutated_right_index_offset_in_current_partition: 0,
            derivative_calculator: DerivativeCalculator::new(),
            log: false,
        }
    }

    /// Enable some verbose logging of the engine's internal state transitions,
    /// for debugging purposes.
    pub fn enable_logging(&mut self) {
        self.log = true;
    }

    pub fn set_texture_coord_type(&mut self, texture_coord_type: TextureCoordType) {
        self.texture_coord_type = texture_coord_type;
    }

    /// Sets whether to handle self-intersections. Enabled by default.
    pub fn set_intersection_handling(&mut self, intersection_handling: IntersectionHandling) {
        self.handle_self_intersections =
            intersection_handling == IntersectionHandling::Enabled;
        if !self.handle_self_intersections {
            self.left_side.intersection = None;
            self.right_side.intersection = None;
        }
    }

    pub fn mesh(&self) -> &MutableMeshView {
        &self.mesh
    }

    pub fn left_side(&self) -> &Side {
        &self.left_side
    }

    pub fn right_side(&self) -> &Side {
        &self.right_side
    }

    /// The side each mesh vertex belongs to, parallel to the vertex array.
    pub fn vertex_side_ids(&self) -> &[SideId] {
        &self.vertex_side_ids
    }

    /// Each vertex's offset within its side's `indices`, parallel to the
    /// vertex array.
    pub fn side_offsets(&self) -> &[u32] {
        &self.side_offsets
    }

    /// For each vertex, the first offset on the opposite side that could form
    /// a triangle with it, parallel to the vertex array.
    pub fn opposite_side_offsets(&self) -> &[u32] {
        &self.opposite_side_offsets
    }

    /// Offset into the left side's `indices` of the first new or modified
    /// index in the current partition.
    pub fn first_mutated_left_index_offset_in_current_partition(&self) -> u32 {
        self.first_mutated_left_index_offset_in_current_partition
    }

    /// Offset into the right side's `indices` of the first new or modified
    /// index in the current partition.
    pub fn first_mutated_right_index_offset_in_current_partition(&self) -> u32 {
        self.first_mutated_right_index_offset_in_current_partition
    }

    /// Resets the engine to begin a new stroke, keeping allocations.
    pub fn reset(&mut self) {
        self.mesh.clear();
        self.vertex_side_ids.clear();
        self.side_offsets.clear();
        self.opposite_side_offsets.clear();
        self.left_side.clear();
        self.right_side.clear();
        self.last_extrusion_break = LastExtrusionBreakMetadata::default();
        self.save_point_state.is_active = false;
        self.reset_mutation_tracking();
    }

    /// Resets the mutation tracking of the engine and of the mesh view, so
    /// that everything currently in the mesh is considered "not mutated".
    pub fn reset_mutation_tracking(&mut self) {
        self.mesh.reset_mutation_tracking();
        self.envelope_of_removed_geometry.reset();
        self.first_mutated_left_index = None;
        self.first_mutated_right_index = None;
        self.first_mutated_left_index_offset_in_current_partition =
            self.left_side.indices.len() as u32;
        self.first_mutated_right_index_offset_in_current_partition =
            self.right_side.indices.len() as u32;
    }

    /// Returns the bounding region of the mesh that has visually changed since
    /// construction or the most recent call to [`reset`](Self::reset) or
    /// [`reset_mutation_tracking`](Self::reset_mutation_tracking).
    ///
    /// A triangle counts as visually changed if it has new or modified
    /// indices, or contains new or modified vertices. The envelope includes
    /// positions that were removed or overwritten.
    pub fn visually_updated_region(&self) -> Envelope {
        let mut region = self.envelope_of_removed_geometry.clone();
        if self.mesh.triangle_count() == 0 {
            return region;
        }
        let first_visually_mutated_triangle = self.first_visually_mutated_triangle();
        if first_visually_mutated_triangle == 0 {
            region.add(&envelope_of_all_positions(&self.mesh));
        } else {
            // Walking the mutated triangles revisits some vertices, but it
            // cannot miss or pick up extra positions for incremental updates.
            region.add(&envelope_of_triangles(
                &self.mesh,
                first_visually_mutated_triangle,
            ));
        }
        region
    }

    /// Returns the number of triangles at the front of the mesh that are
    /// guaranteed not to change on further extension.
    ///
    /// Non-zero only when intersection handling is disabled.
    pub fn stable_triangle_count(&self) -> u32 {
        if self.handle_self_intersections {
            // Some triangles are in practice too old for intersection handling
            // to reach, but the bound is not worth computing.
            return 0;
        }
        // The last two triangles can still change through simplification of
        // the final vertex on each side.
        let n_triangles = if self.save_point_state.is_active {
            self.save_point_state.n_mesh_triangles
        } else {
            self.mesh.triangle_count()
        };
        n_triangles - n_triangles.min(2)
    }

    // ------------------------------------------------------------------
    // Appending

    /// Appends a vertex to the left side of the stroke.
    ///
    /// The vertex does not become part of the mesh until
    /// [`process_new_vertices`](Self::process_new_vertices) is called.
    pub fn append_left_vertex(&mut self, position: Point) {
        self.append_left_vertex_with_attributes(position, 0.0, [0.0; 3], point(0.0, 0.0), 0.0);
    }

    /// Appends a vertex to the right side of the stroke.
    pub fn append_right_vertex(&mut self, position: Point) {
        self.append_right_vertex_with_attributes(position, 0.0, [0.0; 3], point(0.0, 0.0), 0.0);
    }

    pub fn append_left_vertex_with_attributes(
        &mut self,
        position: Point,
        opacity_shift: f32,
        hsl_shift: [f32; 3],
        surface_uv: Point,
        animation_offset: f32,
    ) {
        let mut vertex = ExtrudedVertex {
            position,
            ..ExtrudedVertex::default()
        };
        vertex.attributes.opacity_shift = opacity_shift;
        vertex.attributes.hsl_shift = hsl_shift;
        vertex.attributes.side_label = Label::EXTERIOR_LEFT;
        vertex.attributes.surface_uv = surface_uv;
        vertex.attributes.animation_offset = animation_offset;
        self.append_vertex_to_side(SideId::Left, vertex);
    }

    pub fn append_right_vertex_with_attributes(
        &mut self,
        position: Point,
        opacity_shift: f32,
        hsl_shift: [f32; 3],
        surface_uv: Point,
        animation_offset: f32,
    ) {
        let mut vertex = ExtrudedVertex {
            position,
            ..ExtrudedVertex::default()
        };
        vertex.attributes.opacity_shift = opacity_shift;
        vertex.attributes.hsl_shift = hsl_shift;
        vertex.attributes.side_label = Label::EXTERIOR_RIGHT;
        vertex.attributes.surface_uv = surface_uv;
        vertex.attributes.animation_offset = animation_offset;
        self.append_vertex_to_side(SideId::Right, vertex);
    }

    // Buffers `vertex` on `side_id`, and appends it to the mesh right away if
    // it is the first vertex of the current partition on this side.
    fn append_vertex_to_side(&mut self, side_id: SideId, vertex: ExtrudedVertex) {
        if !vertex.position.x.is_finite() || !vertex.position.y.is_finite() {
            // A non-finite position would poison every downstream winding and
            // budget computation; skip the step entirely.
            return;
        }

        let side = self.side_mut(side_id);
        side.vertex_buffer.push(vertex);
        if side.indices.len() as u32 == side.partition_start.adjacent_first_index_offset {
            let mut next_vertex = side.vertex_buffer[side.next_buffered_vertex_offset as usize];
            if side.partition_start.is_forward_exterior {
                next_vertex.attributes.forward_label = Label::EXTERIOR_FRONT;
            }
            self.append_vertex_to_mesh(side_id, &next_vertex);
            self.side_mut(side_id).next_buffered_vertex_offset += 1;
        }
    }

    /// Appends and triangulates all buffered vertices not already in the
    /// mesh.
    ///
    /// `simplification_threshold` is the epsilon used to first drop buffered
    /// vertices that do not meaningfully contribute to the curvature of the
    /// stroke; a threshold of zero disables simplification. `last_tip_state`
    /// is the most recent tip state used to create the buffered vertices; its
    /// dimensions determine the engine's working budgets.
    ///
    /// Does nothing unless both sides have buffered vertices.
    pub fn process_new_vertices(
        &mut self,
        simplification_threshold: f32,
        last_tip_state: &TipState,
    ) {
        if self.left_side.vertex_buffer.is_empty() || self.right_side.vertex_buffer.is_empty() {
            // The buffers are only empty right after the start of the stroke
            // or of a new disconnected partition; processing needs vertices on
            // both sides.
            return;
        }

        let average_tip_dimension = last_tip_state.average_dimension();
        let outline_reposition_budget = initial_outline_reposition_budget(average_tip_dimension);
        self.simplify_all_buffered_vertices(
            outline_reposition_budget,
            simplification_threshold,
            simplification_travel_limit(average_tip_dimension),
        );

        let left_index_count_before = self.left_side.indices.len();
        let right_index_count_before = self.right_side.indices.len();

        self.triangulate_buffered_vertices(&Budgets {
            initial_outline_reposition_budget: outline_reposition_budget,
            intersection_travel_limit: intersection_travel_limit(average_tip_dimension),
            retriangulation_travel_threshold: retriangulation_travel_threshold(
                average_tip_dimension,
            ),
        });

        // Triangulation only appends new indices. If it appended any, the
        // positions recorded by simplification no longer immediately precede
        // the side's last vertex and must be dropped.
        if left_index_count_before != self.left_side.indices.len() {
            self.left_side.last_simplified_vertex_positions.clear();
        }
        if right_index_count_before != self.right_side.indices.len() {
            self.right_side.last_simplified_vertex_positions.clear();
        }
    }

    // ------------------------------------------------------------------
    // Extrusion breaks

    /// Starts a new logical partition of the stroke mesh that will be visibly
    /// disconnected from the existing geometry.
    ///
    /// Labels the closed front edge of the preceding partition, sets up new
    /// partition tracking on both sides, clears buffered vertices, and resets
    /// any ongoing self-intersections. Adding a break when no vertices have
    /// been appended since the last break is a no-op.
    pub fn add_extrusion_break(&mut self) {
        if self.mesh.vertex_count() == self.last_extrusion_break.vertex_count {
            return;
        }

        if !self.left_side.is_retriangulating() && !self.right_side.is_retriangulating() {
            self.label_last_vertex_as_forward_exterior(SideId::Left);
            self.label_last_vertex_as_forward_exterior(SideId::Right);
        }

        let triangle_count = self.mesh.triangle_count();
        let right_count = self.right_side.indices.len() as u32;
        let left_count = self.left_side.indices.len() as u32;
        set_extrusion_break_partition_on_side(&mut self.left_side, triangle_count, right_count);
        set_extrusion_break_partition_on_side(&mut self.right_side, triangle_count, left_count);

        self.last_extrusion_break = LastExtrusionBreakMetadata {
            break_count: self.last_extrusion_break.break_count + 1,
            vertex_count: self.mesh.vertex_count(),
            triangle_count: self.mesh.triangle_count(),
            left_side_info: side_extrusion_break_info(&self.left_side),
            right_side_info: side_extrusion_break_info(&self.right_side),
        };
        self.first_mutated_left_index_offset_in_current_partition =
            self.left_side.indices.len() as u32;
        self.first_mutated_right_index_offset_in_current_partition =
            self.right_side.indices.len() as u32;
        ext_log!(self, "added extrusion break #{}", self.last_extrusion_break.break_count);
    }

    fn label_last_vertex_as_forward_exterior(&mut self, side_id: SideId) {
        let side = self.side(side_id);
        if side.partition_start.adjacent_first_index_offset >= side.indices.len() as u32 {
            // No new indices since the start of the current partition.
            return;
        }
        let last_index = *side.indices.last().unwrap();
        let mut vertex = self.mesh.vertex(last_index);
        vertex.attributes.forward_label = Label::EXTERIOR_BACK;
        self.set_vertex(last_index, &vertex);
    }

    /// Number of extrusion breaks.
    pub fn extrusion_break_count(&self) -> u32 {
        self.last_extrusion_break.break_count
    }

    /// Counts of left and right indices at the last extrusion break.
    pub fn index_counts_at_last_extrusion_break(&self) -> IndexCounts {
        IndexCounts {
            left: self.last_extrusion_break.left_side_info.index_count as usize,
            right: self.last_extrusion_break.right_side_info.index_count as usize,
        }
    }

    /// Deletes the geometry added since the last extrusion break.
    ///
    /// If a save point is active and has not yet captured the post-break
    /// geometry, it is captured first so that a later revert can restore it.
    pub fn clear_since_last_extrusion_break(&mut self) {
        if self.mesh.vertex_count() == self.last_extrusion_break.vertex_count {
            // Nothing has been added since the start of the current connected
            // extrusion.
            return;
        }

        // Capture at most once: clearing twice after one save point must not
        // overwrite the first capture with post-save geometry.
        if self.save_point_state.is_active
            && !self
                .save_point_state
                .contains_all_geometry_since_last_extrusion_break
            && self.save_point_state.n_mesh_triangles >= self.last_extrusion_break.triangle_count
        {
            self.capture_geometry_since_last_extrusion_break();
        }

        self.envelope_of_removed_geometry.add(&envelope_of_triangles(
            &self.mesh,
            self.last_extrusion_break.triangle_count,
        ));

        let left_info = self.last_extrusion_break.left_side_info.clone();
        let right_info = self.last_extrusion_break.right_side_info.clone();
        self.left_side.indices.truncate(left_info.index_count as usize);
        self.left_side
            .intersection_discontinuities
            .truncate(left_info.intersection_discontinuity_count as usize);
        self.right_side.indices.truncate(right_info.index_count as usize);
        self.right_side
            .intersection_discontinuities
            .truncate(right_info.intersection_discontinuity_count as usize);

        debug_assert!(self.last_extrusion_break.triangle_count <= self.mesh.triangle_count());
        debug_assert!(self.last_extrusion_break.vertex_count <= self.mesh.vertex_count());

        self.mesh
            .truncate_triangles(self.last_extrusion_break.triangle_count);
        self.mesh
            .truncate_vertices(self.last_extrusion_break.vertex_count);
        let vertex_count = self.last_extrusion_break.vertex_count as usize;
        self.vertex_side_ids.truncate(vertex_count);
        self.side_offsets.truncate(vertex_count);
        self.opposite_side_offsets.truncate(vertex_count);

        self.first_mutated_left_index_offset_in_current_partition = self
            .first_mutated_left_index_offset_in_current_partition
            .min(self.left_side.indices.len() as u32);
        self.first_mutated_right_index_offset_in_current_partition = self
            .first_mutated_right_index_offset_in_current_partition
            .min(self.right_side.indices.len() as u32);

        let triangle_count = self.mesh.triangle_count();
        let right_count = self.right_side.indices.len() as u32;
        let left_count = self.left_side.indices.len() as u32;
        set_extrusion_break_partition_on_side(&mut self.left_side, triangle_count, right_count);
        set_extrusion_break_partition_on_side(&mut self.right_side, triangle_count, left_count);
    }

    fn capture_geometry_since_last_extrusion_break(&mut self) {
        let break_vertex_count = self.last_extrusion_break.vertex_count;
        let break_triangle_count = self.last_extrusion_break.triangle_count;
        assert!(break_vertex_count <= self.save_point_state.n_mesh_vertices);
        assert!(break_triangle_count <= self.save_point_state.n_mesh_triangles);

        let vertex_range = break_vertex_count as usize..self.save_point_state.n_mesh_vertices as usize;
        self.save_point_state
            .saved_vertex_side_ids
            .extend_from_slice(&self.vertex_side_ids[vertex_range.clone()]);
        self.save_point_state
            .saved_side_offsets
            .extend_from_slice(&self.side_offsets[vertex_range]);

        for triangle in break_triangle_count..self.save_point_state.n_mesh_triangles {
            let indices = self.mesh.triangle_indices(triangle);
            self.save_point_state
                .saved_triangle_indices
                .entry(triangle)
                .or_insert(indices);
        }
        for index in break_vertex_count..self.save_point_state.n_mesh_vertices {
            let vertex = self.mesh.vertex(index);
            self.save_point_state
                .saved_vertices
                .entry(index)
                .or_insert(vertex);
            let offset = self.opposite_side_offsets[index as usize];
            self.save_point_state
                .saved_opposite_side_offsets
                .entry(index)
                .or_insert(offset);
        }

        capture_side_since_break(
            &self.left_side,
            &self.last_extrusion_break.left_side_info,
            &mut self.save_point_state.left_side_state,
        );
        capture_side_since_break(
            &self.right_side,
            &self.last_extrusion_break.right_side_info,
            &mut self.save_point_state.right_side_state,
        );

        self.save_point_state
            .contains_all_geometry_since_last_extrusion_break = true;
    }

    // ------------------------------------------------------------------
    // Save / revert

    /// Marks the current state so that subsequent extrusions can be undone by
    /// [`revert_to_save_point`](Self::revert_to_save_point).
    pub fn set_save_point(&mut self) {
        self.save_point_state.is_active = true;
        self.save_point_state
            .contains_all_geometry_since_last_extrusion_break = false;
        self.save_point_state.n_mesh_vertices = self.mesh.vertex_count();
        self.save_point_state.n_mesh_triangles = self.mesh.triangle_count();
        self.save_point_state.saved_vertex_side_ids.clear();
        self.save_point_state.saved_side_offsets.clear();
        self.save_point_state.saved_vertices.clear();
        self.save_point_state.saved_triangle_indices.clear();
        self.save_point_state.saved_opposite_side_offsets.clear();
        set_side_save_state(&self.left_side, &mut self.save_point_state.left_side_state);
        set_side_save_state(&self.right_side, &mut self.save_point_state.right_side_state);
        self.save_point_state.saved_last_extrusion_break = self.last_extrusion_break.clone();

        // Simplification cannot take color or texture coordinates into
        // account when removing vertices, which is a problem when a solid
        // stroke has a partially transparent prediction after the save point.
        // Keep the last vertex prior to the save point out of its reach.
        for side in [&mut self.left_side, &mut self.right_side].iter_mut() {
            if side.vertex_buffer.len() > 1 {
                let last = *side.vertex_buffer.last().unwrap();
                side.vertex_buffer.clear();
                side.vertex_buffer.push(last);
                side.next_buffered_vertex_offset = 1;
            }
        }
    }

    /// Reverts to the last save point and clears it.
    ///
    /// Does nothing if no save point is active.
    pub fn revert_to_save_point(&mut self) {
        if !self.save_point_state.is_active {
            return;
        }

        // Everything past the save point is about to be erased or changed.
        self.envelope_of_removed_geometry.add(&envelope_of_triangles(
            &self.mesh,
            self.save_point_state.n_mesh_triangles,
        ));

        let old_vertex_count = self.mesh.vertex_count();
        let old_triangle_count = self.mesh.triangle_count();

        // If the mesh grew past the save point, drop the extra geometry; if
        // it shrank (via `clear_since_last_extrusion_break`), the loops below
        // re-append the missing entries from the saved maps.
        self.mesh
            .truncate_triangles(self.save_point_state.n_mesh_triangles);
        self.mesh
            .truncate_vertices(self.save_point_state.n_mesh_vertices);

        let n_vertices = self.save_point_state.n_mesh_vertices as usize;
        self.vertex_side_ids.resize(n_vertices, SideId::Left);
        self.side_offsets.resize(n_vertices, 0);
        self.opposite_side_offsets.resize(n_vertices, 0);

        let saved_vertices = std::mem::take(&mut self.save_point_state.saved_vertices);
        for (&index, vertex) in &saved_vertices {
            if index < old_vertex_count {
                self.set_vertex_impl(index, vertex, false, true);
            } else {
                debug_assert!(index == self.mesh.vertex_count());
                self.mesh.append_vertex(*vertex);
            }
        }
        let saved_triangles = std::mem::take(&mut self.save_point_state.saved_triangle_indices);
        for (&triangle, &indices) in &saved_triangles {
            if triangle < old_triangle_count {
                self.mesh.set_triangle_indices(triangle, indices);
            } else {
                debug_assert!(triangle == self.mesh.triangle_count());
                self.mesh.append_triangle_indices(indices);
            }
        }
        let saved_offsets = std::mem::take(&mut self.save_point_state.saved_opposite_side_offsets);
        for (&index, &offset) in &saved_offsets {
            self.update_opposite_side_offset(index, offset, false);
        }

        let n_saved_ids = self.save_point_state.saved_vertex_side_ids.len();
        let start = self.vertex_side_ids.len() - n_saved_ids;
        self.vertex_side_ids[start..]
            .copy_from_slice(&self.save_point_state.saved_vertex_side_ids);
        let n_saved_offsets = self.save_point_state.saved_side_offsets.len();
        let start = self.side_offsets.len() - n_saved_offsets;
        self.side_offsets[start..].copy_from_slice(&self.save_point_state.saved_side_offsets);

        revert_side(
            &mut self.left_side,
            &mut self.first_mutated_left_index_offset_in_current_partition,
            &mut self.save_point_state.left_side_state,
        );
        revert_side(
            &mut self.right_side,
            &mut self.first_mutated_right_index_offset_in_current_partition,
            &mut self.save_point_state.right_side_state,
        );
        self.last_extrusion_break = self.save_point_state.saved_last_extrusion_break.clone();

        self.save_point_state.is_active = false;
    }

    // ------------------------------------------------------------------
    // Derivatives

    /// Updates the derivative and label attributes inside the current mesh.
    ///
    /// Vertices are updated from the first visually mutated triangle onward,
    /// backtracking to the start of any coincident-vertex run. Call once per
    /// mutation-tracking cycle: updating generally lowers the first visually
    /// mutated triangle.
    pub fn update_mesh_derivatives(&mut self) {
        let first_visually_mutated_triangle = self.first_visually_mutated_triangle();

        let (left_start, right_start) = if first_visually_mutated_triangle == 0 {
            (
                if self.left_side.indices.is_empty() { None } else { Some(0) },
                if self.right_side.indices.is_empty() { None } else { Some(0) },
            )
        } else {
            let index_pair = find_first_exterior_vertices(
                &self.mesh,
                &self.vertex_side_ids,
                first_visually_mutated_triangle,
            );
            // Backtrack to the start of any coincident run, because
            // derivatives are averaged across coincident vertices.
            let left = index_pair.left.map(|index| {
                starting_offset_for_coincident_connected_vertices(
                    &self.mesh,
                    &self.left_side.indices,
                    self.side_offsets[index as usize],
                ) as usize
            });
            let right = index_pair.right.map(|index| {
                starting_offset_for_coincident_connected_vertices(
                    &self.mesh,
                    &self.right_side.indices,
                    self.side_offsets[index as usize],
                ) as usize
            });
            (left, right)
        };

        if let Some(start) = left_start {
            update_first_mutated_index(
                self.left_side.indices[start],
                &mut self.first_mutated_left_index,
            );
        }
        if let Some(start) = right_start {
            update_first_mutated_index(
                self.right_side.indices[start],
                &mut self.first_mutated_right_index,
            );
        }

        let left_indices: &[IndexType] = match left_start {
            Some(start) => &self.left_side.indices[start..],
            None => &[],
        };
        let right_indices: &[IndexType] = match right_start {
            Some(start) => &self.right_side.indices[start..],
            None => &[],
        };
        self.derivative_calculator.update_mesh(
            left_indices,
            right_indices,
            &self.vertex_side_ids,
            &mut self.mesh,
        );
    }

    // ------------------------------------------------------------------
    // Internal side plumbing

    fn side(&self, side_id: SideId) -> &Side {
        match side_id {
            SideId::Left => &self.left_side,
            SideId::Right => &self.right_side,
        }
    }

    fn side_mut(&mut self, side_id: SideId) -> &mut Side {
        match side_id {
            SideId::Left => &mut self.left_side,
            SideId::Right => &mut self.right_side,
        }
    }

    fn last_vertex(&self, side_id: SideId) -> ExtrudedVertex {
        self.mesh.vertex(*self.side(side_id).indices.last().unwrap())
    }

    fn last_position(&self, side_id: SideId) -> Point {
        self.mesh.position(*self.side(side_id).indices.last().unwrap())
    }

    // Winding of the triangle made from the last left position, the last
    // right position and `proposed_position`, in this order.
    fn proposed_triangle_winding(&self, proposed_position: Point) -> TriangleWinding {
        winding_of(
            Triangle {
                a: self.last_position(SideId::Left),
                b: self.last_position(SideId::Right),
                c: proposed_position,
            }
            .signed_area(),
        )
    }

    // Winding of the triangle made from the last proposed intersection vertex
    // of `side_id`, the last vertex of the opposing side, and
    // `proposed_position`.
    fn proposed_intersection_triangle_winding(
        &self,
        side_id: SideId,
        proposed_position: Point,
    ) -> TriangleWinding {
        let intersection = match &self.side(side_id).intersection {
            Some(intersection) => intersection,
            None => {
                debug_assert!(false, "no active intersection");
                return TriangleWinding::Degenerate;
            }
        };
        let mut triangle = Triangle {
            a: self.last_position(side_id.opposite()),
            b: intersection.last_proposed_vertex.position,
            c: proposed_position,
        };
        if side_id == SideId::Left {
            std::mem::swap(&mut triangle.a, &mut triangle.b);
        }
        winding_of(triangle.signed_area())
    }

    fn append_vertex_to_mesh(&mut self, side_id: SideId, vertex: &ExtrudedVertex) {
        let new_index = self.mesh.vertex_count();
        self.mesh.append_vertex(*vertex);
        self.vertex_side_ids.push(side_id);

        let (side, opposite) = match side_id {
            SideId::Left => (&mut self.left_side, &mut self.right_side),
            SideId::Right => (&mut self.right_side, &mut self.left_side),
        };
        let side_offset = side.indices.len() as u32;
        side.indices.push(new_index);
        let n = opposite.indices.len() as u32;
        let partition_offset = side
            .partition_start
            .opposite_first_index_offset
            .max(opposite.partition_start.adjacent_first_index_offset);
        self.side_offsets.push(side_offset);
        self.opposite_side_offsets.push(if n > partition_offset {
            n - 1
        } else {
            partition_offset
        });
    }

    // Appends `vertex` and a triangle using its index, if the triangle would
    // have counter-clockwise winding.
    fn try_append_vertex_and_triangle_to_mesh(&mut self, side_id: SideId, vertex: &ExtrudedVertex) {
        if self.proposed_triangle_winding(vertex.position) != TriangleWinding::CounterClockwise {
            return;
        }
        let last_left = *self.left_side.indices.last().unwrap();
        let last_right = *self.right_side.indices.last().unwrap();
        self.append_vertex_to_mesh(side_id, vertex);
        let new_index = *self.side(side_id).indices.last().unwrap();
        self.mesh
            .append_triangle_indices([last_left, last_right, new_index]);
    }

    fn triangle_is_left_right_conforming(&self, indices: &[IndexType; 3]) -> bool {
        self.vertex_side_ids[indices[0] as usize] == SideId::Left
            && self.vertex_side_ids[indices[1] as usize] == SideId::Right
    }

    fn triangle_indices_all_belong_to(&self, indices: &[IndexType; 3], side_id: SideId) -> bool {
        self.vertex_side_ids[indices[0] as usize] == side_id
            && self.vertex_side_ids[indices[1] as usize] == side_id
            && self.vertex_side_ids[indices[2] as usize] == side_id
    }

    // ------------------------------------------------------------------
    // Tracked mutations

    fn set_vertex(&mut self, index: IndexType, vertex: &ExtrudedVertex) {
        self.set_vertex_impl(index, vertex, true, true);
    }

    fn set_vertex_impl(
        &mut self,
        index: IndexType,
        vertex: &ExtrudedVertex,
        update_save_state: bool,
        update_envelope_of_removed_geometry: bool,
    ) {
        if update_save_state
            && self.save_point_state.is_active
            && index < self.save_point_state.n_mesh_vertices
        {
            let current = self.mesh.vertex(index);
            self.save_point_state
                .saved_vertices
                .entry(index)
                .or_insert(current);
        }
        if update_envelope_of_removed_geometry {
            let position = self.mesh.position(index);
            self.envelope_of_removed_geometry.add_point(position);
        }
        match self.vertex_side_ids[index as usize] {
            SideId::Left => update_first_mutated_index(index, &mut self.first_mutated_left_index),
            SideId::Right => update_first_mutated_index(index, &mut self.first_mutated_right_index),
        }
        self.mesh.set_vertex(index, *vertex);
    }

    fn set_triangle_indices(&mut self, triangle: u32, indices: [IndexType; 3]) {
        self.set_triangle_indices_impl(triangle, indices, true);
    }

    fn set_triangle_indices_impl(
        &mut self,
        triangle: u32,
        indices: [IndexType; 3],
        update_save_state: bool,
    ) {
        if update_save_state
            && self.save_point_state.is_active
            && triangle < self.save_point_state.n_mesh_triangles
        {
            let current = self.mesh.triangle_indices(triangle);
            self.save_point_state
                .saved_triangle_indices
                .entry(triangle)
                .or_insert(current);
        }
        self.mesh.set_triangle_indices(triangle, indices);
    }

    fn update_opposite_side_offset(
        &mut self,
        index: IndexType,
        new_offset: u32,
        update_save_state: bool,
    ) {
        let current = self.opposite_side_offsets[index as usize];
        if current == new_offset {
            return;
        }
        if update_save_state
            && self.save_point_state.is_active
            && index < self.save_point_state.n_mesh_vertices
        {
            self.save_point_state
                .saved_opposite_side_offsets
                .entry(index)
                .or_insert(current);
        }
        self.opposite_side_offsets[index as usize] = new_offset;
    }

    // Assigns every vertex of `side_id` with offsets in `[start, end)` to the
    // value of `target`.
    fn assign_vertices_in_offset_range(
        &mut self,
        side_id: SideId,
        start: usize,
        end: usize,
        target: &ExtrudedVertex,
    ) {
        for offset in start..end {
            let index = self.side(side_id).indices[offset];
            self.set_vertex(index, target);
        }
    }

    // ------------------------------------------------------------------
    // Mutation bookkeeping

    // The first mesh triangle that should be considered visually updated. No
    // greater than the mesh's first mutated triangle, and smaller when needed
    // to include triangles connected to mutated side indices.
    fn first_visually_mutated_triangle(&self) -> u32 {
        let first_mutated_triangle = self.mesh.first_mutated_triangle();
        if first_mutated_triangle == 0
            || (self.first_mutated_left_index.is_none() && self.first_mutated_right_index.is_none())
        {
            return first_mutated_triangle;
        }

        let left_index_lower_bound = self
            .first_mutated_left_index
            .unwrap_or_else(|| self.mesh.vertex_count());
        let right_index_lower_bound = self
            .first_mutated_right_index
            .unwrap_or_else(|| self.mesh.vertex_count());

        let mut i = (first_mutated_triangle + 1).min(self.mesh.triangle_count());
        while i > 0 {
            let triangle_indices = self.mesh.triangle_indices(i - 1);
            if !self.triangle_is_left_right_conforming(&triangle_indices) {
                i -= 1;
                continue;
            }

            let (max_left_index, max_right_index) =
                if self.vertex_side_ids[triangle_indices[2] as usize] == SideId::Left {
                    (triangle_indices[2], triangle_indices[1])
                } else {
                    (triangle_indices[0], triangle_indices[2])
                };

            if max_left_index < left_index_lower_bound && max_right_index < right_index_lower_bound
            {
                break;
            }
            i -= 1;
        }

        first_mutated_triangle.min(i)
    }
}

// Resets a side's partition tracking for a new extrusion break.
fn set_extrusion_break_partition_on_side(
    side: &mut Side,
    first_triangle_index: u32,
    opposite_side_index_count: u32,
) {
    side.partition_start = MeshPartitionStart {
        adjacent_first_index_offset: side.indices.len() as u32,
        opposite_first_index_offset: opposite_side_index_count,
        first_triangle: first_triangle_index,
        opposite_side_initial_position: None,
        non_ccw_connection_index: None,
        outline_connects_sides: true,
        is_forward_exterior: true,
    };
    side.first_simplifiable_index_offset = side.partition_start.adjacent_first_index_offset;
    side.vertex_buffer.clear();
    side.next_buffered_vertex_offset = 0;
    side.intersection = None;
    side.last_simplified_vertex_positions.clear();
}

fn side_extrusion_break_info(side: &Side) -> SideBreakInfo {
    SideBreakInfo {
        index_count: side.indices.len() as u32,
        intersection_discontinuity_count: side.intersection_discontinuities.len() as u32,
    }
}

fn set_side_save_state(side: &Side, side_state: &mut SideSaveState) {
    side_state.n_indices = side.indices.len() as u32;
    side_state.n_intersection_discontinuities = side.intersection_discontinuities.len() as u32;
    side_state.saved_indices.clear();
    side_state.saved_intersection_discontinuities.clear();
    side_state.partition_start = side.partition_start.clone();
    side_state.first_simplifiable_index_offset = side.first_simplifiable_index_offset;
    side_state.vertex_buffer = side.vertex_buffer.clone();
    side_state.next_buffered_vertex_offset = side.next_buffered_vertex_offset;
    side_state.intersection = side.intersection.clone();
    side_state.last_simplified_vertex_positions = side.last_simplified_vertex_positions.clone();
}

fn capture_side_since_break(
    side: &Side,
    side_break_info: &SideBreakInfo,
    side_state: &mut SideSaveState,
) {
    assert!(side_break_info.index_count <= side_state.n_indices);

    side_state.saved_indices.extend_from_slice(
        &side.indices[side_break_info.index_count as usize..side_state.n_indices as usize],
    );
    side_state.saved_intersection_discontinuities.extend_from_slice(
        &side.intersection_discontinuities[side_break_info.intersection_discontinuity_count
            as usize
            ..side_state.n_intersection_discontinuities as usize],
    );
}

fn revert_side(
    side: &mut Side,
    first_mutated_index_offset: &mut u32,
    side_state: &mut SideSaveState,
) {
    side.indices.resize(side_state.n_indices as usize, 0);
    let start = side.indices.len() - side_state.saved_indices.len();
    side.indices[start..].copy_from_slice(&side_state.saved_indices);
    *first_mutated_index_offset = (*first_mutated_index_offset)
        .min(side_state.n_indices - side_state.saved_indices.len() as u32);

    side.intersection_discontinuities.resize(
        side_state.n_intersection_discontinuities as usize,
        IndexOffsetRange { first: 0, last: 0 },
    );
    let start = side.intersection_discontinuities.len()
        - side_state.saved_intersection_discontinuities.len();
    side.intersection_discontinuities[start..]
        .copy_from_slice(&side_state.saved_intersection_discontinuities);

    side.partition_start = side_state.partition_start.clone();
    side.first_simplifiable_index_offset = side_state.first_simplifiable_index_offset;
    std::mem::swap(&mut side.vertex_buffer, &mut side_state.vertex_buffer);
    side.next_buffered_vertex_offset = side_state.next_buffered_vertex_offset;
    std::mem::swap(&mut side.intersection, &mut side_state.intersection);
    std::mem::swap(
        &mut side.last_simplified_vertex_positions,
        &mut side_state.last_simplified_vertex_positions,
    );
}

fn lerp_along_exterior(
    side_id: SideId,
    from: &ExtrudedVertex,
    to: &ExtrudedVertex,
    t: f32,
    margin: f32,
) -> ExtrudedVertex {
    let mut result = from.lerp(to, t);
    result.attributes.side_label = default_exterior_side_label(side_id).with_margin(margin);
    result
}

impl Geometry {
    // ------------------------------------------------------------------
    // Simplification

    fn simplify_all_buffered_vertices(
        &mut self,
        initial_outline_reposition_budget: f32,
        simplification_threshold: f32,
        simplification_travel_limit: f32,
    ) {
        self.simplify_buffered_vertices(
            SideId::Left,
            initial_outline_reposition_budget,
            simplification_threshold,
            simplification_travel_limit,
        );
        self.simplify_buffered_vertices(
            SideId::Right,
            initial_outline_reposition_budget,
            simplification_threshold,
            simplification_travel_limit,
        );
    }

    // Removes vertices from `side_id`'s buffer that do not contribute to the
    // curvature of the stroke.
    fn simplify_buffered_vertices(
        &mut self,
        side_id: SideId,
        initial_outline_reposition_budget: f32,
        simplification_threshold: f32,
        simplification_travel_limit: f32,
    ) {
        if simplification_threshold <= 0.0 || self.side(side_id).vertex_buffer.len() < 3 {
            return;
        }

        let mut scratch = std::mem::take(&mut self.simplification_vertex_buffer);
        scratch.clear();
        let mut starting = 0usize;
        {
            let side = self.side(side_id);
            if side.next_buffered_vertex_offset == 2 {
                // The vertex at offset 1 is the last one committed by the
                // previous extrusion. Keep it out of the simplifier's reach if
                // removing it would create too large a gap, or would
                // invalidate a previous simplification.
                let mut skip_vertex = distance_between(
                    side.vertex_buffer[0].position,
                    side.vertex_buffer[2].position,
                ) > simplification_travel_limit;
                if !skip_vertex && !side.last_simplified_vertex_positions.is_empty() {
                    let segment = LineSegment {
                        from: side.vertex_buffer[0].position,
                        to: side.vertex_buffer[2].position,
                    };
                    for &position in &side.last_simplified_vertex_positions {
                        if segment.distance_to_point(position) > simplification_threshold {
                            skip_vertex = true;
                            break;
                        }
                    }
                }
                if skip_vertex {
                    scratch.push(side.vertex_buffer[0]);
                    starting = 1;
                }
            }
        }

        simplify_polyline(
            &self.side(side_id).vertex_buffer[starting..],
            simplification_threshold,
            &mut scratch,
        );

        if scratch.len() == self.side(side_id).vertex_buffer.len() {
            // No vertices were removed.
            self.simplification_vertex_buffer = scratch;
            return;
        }

        // When the cursor sits at offset 2 and the vertex of the previous
        // extrusion was dropped by the simplifier, try to replace the side's
        // last committed vertex with the next retained one.
        let last_vertex_simplified = self.side(side_id).next_buffered_vertex_offset == 2
            && scratch[1].position != self.last_vertex(side_id).position;
        let mut should_replace_last_vertex = last_vertex_simplified;

        if should_replace_last_vertex
            && self.proposed_triangle_winding(scratch[1].position)
                != TriangleWinding::CounterClockwise
        {
            // Simplification would have made us miss a non-CCW triangle.
            should_replace_last_vertex = false;
        }

        // Replacing a vertex while the opposite side is retriangulating is
        // conceptually an appended CCW opposite triangle and needs the same
        // outline repositioning.
        let opposite_id = side_id.opposite();
        if should_replace_last_vertex && self.side(opposite_id).is_retriangulating() {
            let current_last_position = self.last_vertex(side_id).position;
            let replacement_last_position = scratch[1].position;
            let intersection_position = self.last_vertex(opposite_id).position;
            let left_right_edge = LineSegment {
                from: replacement_last_position,
                to: intersection_position,
            };
            let containing_triangle = Triangle {
                a: intersection_position,
                b: current_last_position,
                c: replacement_last_position,
            };
            let outline = construct_partial_outline(self.side(opposite_id), self.side(side_id));
            let intersection_found = self.move_starting_vertices_to_intersection(
                opposite_id,
                &outline,
                &left_right_edge,
                initial_outline_reposition_budget,
                Some(containing_triangle),
            );
            if !intersection_found {
                self.give_up_intersection_handling(opposite_id);
                should_replace_last_vertex = false;
            }
        }

        if should_replace_last_vertex {
            // Keep the replaced position so later calls can check that it does
            // not drift past the threshold; cleared by `process_new_vertices`
            // once new vertices are appended after the replacement.
            let last_position = self.last_position(side_id);
            self.side_mut(side_id)
                .last_simplified_vertex_positions
                .push(last_position);
            let last_index = *self.side(side_id).indices.last().unwrap();
            let replacement = scratch[1];
            self.set_vertex(last_index, &replacement);
        }

        if last_vertex_simplified && !should_replace_last_vertex {
            let side = self.side_mut(side_id);
            side.vertex_buffer.truncate(2);
            side.vertex_buffer.extend_from_slice(&scratch[1..]);
            self.simplification_vertex_buffer = scratch;
        } else {
            std::mem::swap(&mut self.side_mut(side_id).vertex_buffer, &mut scratch);
            self.simplification_vertex_buffer = scratch;
        }
    }

    // ------------------------------------------------------------------
    // Triangulation driver

    fn triangulate_buffered_vertices(&mut self, budgets: &Budgets) {
        let n_left_positions = self.left_side.vertex_buffer.len() as u32
            - self.left_side.next_buffered_vertex_offset
            + 1;
        let n_right_positions = self.right_side.vertex_buffer.len() as u32
            - self.right_side.next_buffered_vertex_offset
            + 1;

        if n_left_positions < 2 && n_right_positions < 2 {
            // No new triangles to add.
            return;
        }

        // The batch is split into quads made of one vertex pair each, plus a
        // triangle fan for the surplus vertices of the longer side. Making
        // half of the quads, then the fan, then the remaining quads keeps the
        // triangulation forward-backward symmetric, which lets the simplifier
        // remove more vertices.
        for _ in 0..number_of_starting_quads(n_left_positions, n_right_positions) {
            self.try_append_next_vertex(SideId::Right, budgets);
            self.try_append_next_vertex(SideId::Left, budgets);
            self.right_side.next_buffered_vertex_offset += 1;
            self.left_side.next_buffered_vertex_offset += 1;
        }

        let n_fan_triangles = number_of_fan_triangles(n_left_positions, n_right_positions);
        if n_fan_triangles != 0 {
            let needs_extra_pivot_vertices =
                n_fan_triangles >= 2 && self.texture_coord_type == TextureCoordType::Winding;
            let (fan_pivot_id, fan_outer_id) = if n_left_positions > n_right_positions {
                (SideId::Right, SideId::Left)
            } else {
                (SideId::Left, SideId::Right)
            };

            if needs_extra_pivot_vertices {
                self.begin_super_imposed_pivot_fan(fan_pivot_id, fan_outer_id);
            }
            for _ in 0..n_fan_triangles {
                self.try_append_next_vertex(fan_outer_id, budgets);
                self.side_mut(fan_outer_id).next_buffered_vertex_offset += 1;
            }
            if needs_extra_pivot_vertices {
                self.end_super_imposed_pivot_fan(fan_pivot_id, fan_outer_id);
            }
        }

        for _ in 0..number_of_ending_quads(n_left_positions, n_right_positions) {
            self.try_append_next_vertex(SideId::Right, budgets);
            self.try_append_next_vertex(SideId::Left, budgets);
            self.right_side.next_buffered_vertex_offset += 1;
            self.left_side.next_buffered_vertex_offset += 1;
        }

        // Whether a vertex gets rejected can depend on the order in which left
        // and right vertices are interleaved; retry a rejected vertex once.
        if n_right_positions > 1
            && self.last_proposed_vertex_was_rejected(
                SideId::Left,
                budgets.retriangulation_travel_threshold,
            )
        {
            let last_proposed = self
                .left_side
                .intersection
                .as_ref()
                .unwrap()
                .last_proposed_vertex;
            self.left_side.vertex_buffer.push(last_proposed);
            self.try_append_next_vertex(SideId::Left, budgets);
        }
        if n_left_positions > 1
            && self.last_proposed_vertex_was_rejected(
                SideId::Right,
                budgets.retriangulation_travel_threshold,
            )
        {
            let last_proposed = self
                .right_side
                .intersection
                .as_ref()
                .unwrap()
                .last_proposed_vertex;
            self.right_side.vertex_buffer.push(last_proposed);
            self.try_append_next_vertex(SideId::Right, budgets);
        }

        let must_keep_last_vertices = self.mesh_ends_in_super_imposed_pivot();
        self.prep_buffered_vertices_for_next_extrusion(SideId::Left, must_keep_last_vertices);
        self.prep_buffered_vertices_for_next_extrusion(SideId::Right, must_keep_last_vertices);
    }

    // True if `side_id` is undergoing intersection and appending its last
    // proposed vertex was rejected.
    fn last_proposed_vertex_was_rejected(
        &self,
        side_id: SideId,
        retriangulation_travel_threshold: f32,
    ) -> bool {
        let side = self.side(side_id);
        let intersection = match &side.intersection {
            Some(intersection) => intersection,
            None => return false,
        };
        if intersection.retriangulation_started {
            intersection.last_proposed_vertex.position
                != self.mesh.position(*side.indices.last().unwrap())
        } else {
            distance_between(
                intersection.last_proposed_vertex.position,
                intersection.starting_position,
            ) >= retriangulation_travel_threshold
        }
    }

    // Empties the buffer except for the last one or two committed vertices
    // needed by the simplification algorithm on the next extrusion. Vertices
    // that are part of a self-intersection stay out of the simplifier's
    // reach, as does a fan pivot, which intersection handling may keep
    // repositioning.
    fn prep_buffered_vertices_for_next_extrusion(
        &mut self,
        side_id: SideId,
        must_keep_last_vertex: bool,
    ) {
        {
            let side = self.side_mut(side_id);
            side.vertex_buffer.clear();
            side.next_buffered_vertex_offset = 0;
        }
        if self.side(side_id).indices.is_empty() {
            return;
        }

        let keep_second_to_last = {
            let side = self.side(side_id);
            !must_keep_last_vertex
                && side.indices.len() as u32 > side.first_simplifiable_index_offset
                && side.intersection.is_none()
                && {
                    let n_triangles = self.mesh.triangle_count();
                    let last = *side.indices.last().unwrap();
                    (n_triangles > 0 && last == self.mesh.vertex_index(n_triangles - 1, 2))
                        || (n_triangles > 1 && last == self.mesh.vertex_index(n_triangles - 2, 2))
                }
        };
        if keep_second_to_last {
            let side = self.side(side_id);
            let second_to_last = self.mesh.vertex(side.indices[side.indices.len() - 2]);
            let side = self.side_mut(side_id);
            side.vertex_buffer.push(second_to_last);
            side.next_buffered_vertex_offset += 1;
        }

        let last = self.last_vertex(side_id);
        let side = self.side_mut(side_id);
        side.vertex_buffer.push(last);
        side.next_buffered_vertex_offset += 1;
    }

    // ------------------------------------------------------------------
    // Super-imposed pivots (winding texture mode)

    fn begin_super_imposed_pivot_fan(&mut self, fan_pivot_id: SideId, fan_outer_id: SideId) {
        // Sync the pivot start's texture coordinate with the outside of the
        // turn, then append the central vertex of the fan with the sentinel.
        let pivot_index = *self.side(fan_pivot_id).indices.last().unwrap();
        let mut pivot = self.mesh.vertex(pivot_index);
        pivot.attributes.surface_uv.x = self.last_vertex(fan_outer_id).attributes.surface_uv.x;
        self.set_vertex(pivot_index, &pivot);
        pivot.attributes.surface_uv = winding_texture_uv_sentinel();
        self.append_vertex_to_mesh(fan_pivot_id, &pivot);
    }

    fn end_super_imposed_pivot_fan(&mut self, fan_pivot_id: SideId, fan_outer_id: SideId) {
        // Append the end of the pivot, synced with the outside of the turn.
        let side = self.side(fan_pivot_id);
        let mut pivot_end = self.mesh.vertex(side.indices[side.indices.len() - 2]);
        pivot_end.attributes.surface_uv.x =
            self.last_vertex(fan_outer_id).attributes.surface_uv.x;
        self.append_vertex_to_mesh(fan_pivot_id, &pivot_end);
    }

    fn mesh_ends_in_super_imposed_pivot(&self) -> bool {
        if self.texture_coord_type == TextureCoordType::Tiling {
            return false;
        }
        let ends_in_pivot = |side: &Side| {
            side.indices.len() > 1
                && self
                    .mesh
                    .vertex(side.indices[side.indices.len() - 2])
                    .attributes
                    .surface_uv
                    == winding_texture_uv_sentinel()
        };
        ends_in_pivot(&self.left_side) || ends_in_pivot(&self.right_side)
    }

    // ------------------------------------------------------------------
    // Appending one triangle

    // Tries to append the next buffered vertex from `side_id` and a triangle
    // made from it and the last appended vertices on the left and right
    // sides. The vertex and/or triangle may be rejected, and old geometry may
    // be modified.
    fn try_append_next_vertex(&mut self, side_id: SideId, budgets: &Budgets) {
        let next_vertex = {
            let side = self.side(side_id);
            side.vertex_buffer[side.next_buffered_vertex_offset as usize]
        };
        let proposed_winding = self.proposed_triangle_winding(next_vertex.position);

        // The new vertex may show that the handling of a previous non-ccw
        // vertex needs to be undone first.
        self.undo_non_ccw_partition_separation_if_needed(proposed_winding, side_id, &next_vertex);

        // Fast path: no intersection on either side and the new triangle has
        // the desired counter-clockwise winding.
        if self.left_side.intersection.is_none()
            && self.right_side.intersection.is_none()
            && proposed_winding == TriangleWinding::CounterClockwise
        {
            let last_left = *self.left_side.indices.last().unwrap();
            let last_right = *self.right_side.indices.last().unwrap();
            self.append_vertex_to_mesh(side_id, &next_vertex);
            let new_index = *self.side(side_id).indices.last().unwrap();
            self.mesh
                .append_triangle_indices([last_left, last_right, new_index]);
            return;
        }

        if !self.handle_self_intersections {
            self.append_vertex_to_mesh(side_id, &next_vertex);
            return;
        }

        if self.opposite_side_moved_partition_initial_position(side_id) {
            self.disconnect_partition_sides(side_id);
        }

        let info = self.make_slow_path_info(proposed_winding, side_id, next_vertex);
        self.try_append_slow_path(proposed_winding, &info, budgets);

        if let Some(triangle) = info.proposed_vertex_triangle {
            if let Some(intersection) = self.side_mut(side_id).intersection.as_mut() {
                intersection.last_proposed_vertex = info.proposed_vertex;
                intersection.last_proposed_vertex_triangle = triangle;
            }
        }
    }

    fn make_slow_path_info(
        &self,
        proposed_winding: TriangleWinding,
        side_id: SideId,
        proposed_vertex: ExtrudedVertex,
    ) -> SlowPathInfo {
        let adjacent_position = self.last_position(side_id);
        let opposite_position = self.last_position(side_id.opposite());
        let mut info = SlowPathInfo {
            adjacent: side_id,
            adjacent_position,
            opposite_position,
            proposed_vertex,
            proposed_vertex_triangle: None,
        };

        if self.side(side_id).intersection.is_some()
            || proposed_winding != TriangleWinding::CounterClockwise
        {
            // Search the end of the mesh to find whether the new point is in
            // the interior. During intersection handling the search must at
            // least cover all of the modified triangulation.
            let mut max_early_exit_triangle = u32::MAX;
            let mut segment_start = adjacent_position;
            if let Some(intersection) = &self.side(side_id).intersection {
                max_early_exit_triangle = max_early_exit_triangle
                    .min(intersection.last_proposed_vertex_triangle)
                    .min(intersection.oldest_retriangulation_triangle);
                segment_start = intersection.last_proposed_vertex.position;
            }
            if let Some(intersection) = &self.side(side_id.opposite()).intersection {
                max_early_exit_triangle =
                    max_early_exit_triangle.min(intersection.oldest_retriangulation_triangle);
            }
            info.proposed_vertex_triangle = self.find_last_triangle_containing_segment_end(
                side_id,
                &LineSegment {
                    from: segment_start,
                    to: proposed_vertex.position,
                },
                max_early_exit_triangle,
            );
        }

        info
    }

    // True when the adjacent and opposite sides of the proposed triangle
    // touch, a special subcase of a degenerate triangle.
    fn sides_touch(&self, info: &SlowPathInfo) -> bool {
        distance_between(info.proposed_vertex.position, info.opposite_position) == 0.0
            || distance_between(info.adjacent_position, info.opposite_position) == 0.0
    }

    // The slow path: the eight combinations of proposed winding and per-side
    // intersection state. CCW with neither side intersecting is the fast path
    // handled by the caller.
    fn try_append_slow_path(
        &mut self,
        proposed_winding: TriangleWinding,
        info: &SlowPathInfo,
        budgets: &Budgets,
    ) {
        let adjacent = info.adjacent;
        let opposite = adjacent.opposite();

        if proposed_winding == TriangleWinding::CounterClockwise {
            debug_assert!(
                self.side(adjacent).intersection.is_some()
                    || self.side(opposite).intersection.is_some()
            );

            if self.side(opposite).intersection.is_none() {
                self.handle_ccw_adjacent_intersecting(info, budgets);
                return;
            }
            if self.side(adjacent).intersection.is_none() {
                self.handle_ccw_opposite_intersecting(info, budgets);
                return;
            }
            self.handle_ccw_both_sides_intersecting(info, budgets);
            return;
        }

        if self.sides_touch(info) {
            // Accept the vertex but skip the degenerate triangle and stop any
            // ongoing intersections; otherwise every future triangle would be
            // degenerate as well and get rejected.
            if self.side(adjacent).intersection.is_some() {
                self.give_up_intersection_handling(adjacent);
            }
            if self.side(opposite).intersection.is_some() {
                self.give_up_intersection_handling(opposite);
            }
            self.append_vertex_to_mesh(adjacent, &info.proposed_vertex);
            return;
        }

        if self.side(adjacent).intersection.is_none()
            && self.side(opposite).intersection.is_none()
        {
            self.handle_non_ccw_non_intersecting(info, budgets);
            return;
        }
        if self.side(opposite).intersection.is_none() {
            self.handle_non_ccw_adjacent_intersecting(info, budgets);
            return;
        }
        if self.side(adjacent).intersection.is_none() {
            self.handle_non_ccw_opposite_intersecting(info, budgets);
            return;
        }
        self.handle_non_ccw_both_sides_intersecting(info, budgets);
    }

    fn make_adjacent_self_intersection(
        &self,
        info: &SlowPathInfo,
        budgets: &Budgets,
    ) -> SelfIntersection {
        SelfIntersection {
            starting_position: info.adjacent_position,
            last_proposed_vertex: info.proposed_vertex,
            last_proposed_vertex_triangle: info.proposed_vertex_triangle.unwrap(),
            starting_offset: self.side(info.adjacent).indices.len() as u32,
            retriangulation_started: false,
            undo_stack_starting_triangle: self.mesh.triangle_count(),
            oldest_retriangulation_triangle: u32::MAX,
            undo_triangulation_stack: Vec::new(),
            outline_reposition_budget: budgets.initial_outline_reposition_budget,
            initial_outline_reposition_budget: budgets.initial_outline_reposition_budget,
            travel_limit_from_starting_position: budgets.intersection_travel_limit,
        }
    }
}

impl Geometry {
    // ------------------------------------------------------------------
    // Slow-path handlers

    fn handle_ccw_adjacent_intersecting(&mut self, info: &SlowPathInfo, budgets: &Budgets) {
        // Only one side may modify the triangulation at a time. With only the
        // adjacent side intersecting, it is free to start.
        self.handle_ccw_adjacent_intersecting_helper(info, true, budgets);
    }

    fn handle_ccw_adjacent_intersecting_helper(
        &mut self,
        info: &SlowPathInfo,
        allowed_to_begin_retriangulation: bool,
        budgets: &Budgets,
    ) {
        let adjacent = info.adjacent;
        let start_adjacent_outline =
            construct_partial_outline(self.side(adjacent), self.side(adjacent.opposite()));
        let triangle = match info.proposed_vertex_triangle {
            None => {
                // The new point is outside the stroke; finish up.
                self.try_finish_intersection_handling(
                    adjacent,
                    &info.proposed_vertex,
                    &start_adjacent_outline,
                );
                return;
            }
            Some(triangle) => triangle,
        };

        let (starting_position, travel_limit, budget, initial_budget, started) = {
            let intersection = self.side(adjacent).intersection.as_ref().unwrap();
            (
                intersection.starting_position,
                intersection.travel_limit_from_starting_position,
                intersection.outline_reposition_budget,
                intersection.initial_outline_reposition_budget,
                intersection.retriangulation_started,
            )
        };

        // Give up if the proposed vertex has traveled too far.
        if distance_between(info.proposed_vertex.position, starting_position) > travel_limit
            && budget <= initial_budget
        {
            ext_log!(self, "intersection exceeded travel limit, giving up");
            self.give_up_intersection_handling(adjacent);
            self.try_append_vertex_and_triangle_to_mesh(adjacent, &info.proposed_vertex);
            return;
        }

        let should_continue_retriangulation = started;
        if !started {
            let exceeds_travel_threshold =
                distance_between(info.proposed_vertex.position, starting_position)
                    >= budgets.retriangulation_travel_threshold;
            if allowed_to_begin_retriangulation && exceeds_travel_threshold {
                if !self.try_begin_intersection_retriangulation(
                    adjacent,
                    &info.proposed_vertex,
                    triangle,
                ) {
                    return;
                }
                let proposed_left_right_edge = LineSegment {
                    from: info.opposite_position,
                    to: info.proposed_vertex.position,
                };
                let _ = self.move_starting_vertices_to_intersection(
                    adjacent,
                    &start_adjacent_outline,
                    &proposed_left_right_edge,
                    budgets.initial_outline_reposition_budget,
                    None,
                );
                return;
            }
        }

        // The new triangle has correct winding order and the opposite part of
        // the triangle is outside the existing geometry.
        let proposed_left_right_edge = LineSegment {
            from: info.opposite_position,
            to: info.proposed_vertex.position,
        };
        let saved_budget = self
            .side(adjacent)
            .intersection
            .as_ref()
            .unwrap()
            .outline_reposition_budget;
        let saved_adjacent = self.mesh.vertex(start_adjacent_outline.index(0));
        let intersection_found = self.move_starting_vertices_to_intersection(
            adjacent,
            &start_adjacent_outline,
            &proposed_left_right_edge,
            budgets.initial_outline_reposition_budget,
            None,
        );
        if !intersection_found {
            // Either the edge does not intersect the outline at all or the
            // reposition budget ran out; accept this amount of self-overlap.
            self.give_up_intersection_handling(adjacent);
            self.try_append_vertex_and_triangle_to_mesh(adjacent, &info.proposed_vertex);
            return;
        }

        if should_continue_retriangulation {
            let corrected = self.make_winding_corrected_intersection_vertex(
                adjacent,
                &info.proposed_vertex,
                triangle,
            );
            let mut corrected = match corrected {
                None => {
                    // The new position cannot be accepted. Give up if the
                    // reposition budget is below its initial value; otherwise
                    // skip this vertex: the intersection is in its early
                    // stage, where the first pivot vertex still sits on the
                    // opposite side and the small concavity it causes will be
                    // drawn over by the outgoing stroke.
                    let (budget_now, initial_now) = {
                        let intersection = self.side(adjacent).intersection.as_ref().unwrap();
                        (
                            intersection.outline_reposition_budget,
                            intersection.initial_outline_reposition_budget,
                        )
                    };
                    if budget_now < initial_now {
                        self.give_up_intersection_handling(adjacent);
                        self.try_append_vertex_and_triangle_to_mesh(
                            adjacent,
                            &info.proposed_vertex,
                        );
                    } else {
                        self.side_mut(adjacent)
                            .intersection
                            .as_mut()
                            .unwrap()
                            .outline_reposition_budget = saved_budget;
                    }
                    self.set_vertex(start_adjacent_outline.index(0), &saved_adjacent);
                    return;
                }
                Some(corrected) => corrected,
            };

            self.continue_intersection_retriangulation(adjacent, &info.proposed_vertex, triangle);
            corrected.attributes.side_label = Label::INTERIOR;
            self.update_intersection_pivot_vertices(adjacent, &corrected);
        }
    }

    fn handle_ccw_opposite_intersecting_helper(&mut self, info: &SlowPathInfo, budgets: &Budgets) {
        // The opposite side is undergoing intersection and would cross the new
        // triangle; move it out of the way.
        let adjacent = info.adjacent;
        let opposite = adjacent.opposite();
        let left_right_edge = LineSegment {
            from: info.opposite_position,
            to: info.proposed_vertex.position,
        };
        let outline = construct_partial_outline(self.side(opposite), self.side(adjacent));
        let containing_triangle = Triangle {
            a: info.adjacent_position,
            b: info.opposite_position,
            c: info.proposed_vertex.position,
        };
        let intersection_found = self.move_starting_vertices_to_intersection(
            opposite,
            &outline,
            &left_right_edge,
            budgets.initial_outline_reposition_budget,
            Some(containing_triangle),
        );
        if !intersection_found {
            // No intersection with the outline, an exhausted budget, or a
            // move that would cause a clockwise triangle; accept this amount
            // of self-overlap.
            self.give_up_intersection_handling(opposite);
        }
    }

    fn handle_ccw_opposite_intersecting(&mut self, info: &SlowPathInfo, budgets: &Budgets) {
        // The helper may give up the intersection, so it must run before the
        // next buffered vertex is appended.
        self.handle_ccw_opposite_intersecting_helper(info, budgets);
        self.try_append_vertex_and_triangle_to_mesh(info.adjacent, &info.proposed_vertex);
    }

    fn handle_ccw_both_sides_intersecting(&mut self, info: &SlowPathInfo, budgets: &Budgets) {
        self.handle_ccw_opposite_intersecting_helper(info, budgets);

        // Only one side may modify the triangulation at a time: the adjacent
        // side may begin retriangulation only if the opposite side has not.
        let opposite = info.adjacent.opposite();
        let adjacent_side_allowed_to_retriangulate = !self.side(opposite).is_retriangulating();
        self.handle_ccw_adjacent_intersecting_helper(
            info,
            adjacent_side_allowed_to_retriangulate,
            budgets,
        );

        // The adjacent side may have modified the triangulation, which can
        // move the triangle containing the opposite side's last proposed
        // vertex.
        if adjacent_side_allowed_to_retriangulate {
            if let Some(intersection) = &self.side(opposite).intersection {
                let position = intersection.last_proposed_vertex.position;
                let first_triangle = self.side(opposite).partition_start.first_triangle;
                let triangle = self.find_last_triangle_containing_segment_end(
                    opposite,
                    &LineSegment {
                        from: position,
                        to: position,
                    },
                    first_triangle,
                );
                if let Some(triangle) = triangle {
                    self.side_mut(opposite)
                        .intersection
                        .as_mut()
                        .unwrap()
                        .last_proposed_vertex_triangle = triangle;
                }
            }
        }
    }

    fn handle_non_ccw_non_intersecting(&mut self, info: &SlowPathInfo, budgets: &Budgets) {
        let adjacent = info.adjacent;
        let opposite = adjacent.opposite();

        if let Some(triangle) = info.proposed_vertex_triangle {
            ext_log!(self, "starting self-intersection on {:?}", adjacent);
            let intersection = self.make_adjacent_self_intersection(info, budgets);
            self.side_mut(adjacent).intersection = Some(intersection);

            if distance_between(info.proposed_vertex.position, info.adjacent_position)
                >= budgets.retriangulation_travel_threshold
            {
                self.try_begin_intersection_retriangulation(
                    adjacent,
                    &info.proposed_vertex,
                    triangle,
                );
            }
            return;
        }

        // The adjacent side is travelling backwards while the new position is
        // outside the stroke. Try to move adjacent-side vertices backwards so
        // that the new position would create a CCW triangle.
        let start_adjacent_outline =
            construct_partial_outline(self.side(adjacent), self.side(opposite));
        let segment = LineSegment {
            from: info.opposite_position,
            to: info.proposed_vertex.position,
        };
        let intersection_result = find_outline_intersection(
            &start_adjacent_outline,
            &segment,
            &self.mesh,
            budgets.initial_outline_reposition_budget,
            None,
        );

        // Unlike `move_starting_vertices_to_intersection`, the target of the
        // repositioning is not the outline hit itself.
        let mut target_vertex = ExtrudedVertex::default();
        if let Some(segment_intersection) = &intersection_result.segment_intersection {
            let ending_index = segment_intersection.ending_index;
            if ending_index == start_adjacent_outline.starting_side_size() {
                // The hit crosses the seam connecting the two sides at the
                // start of the partition. For better results under partial
                // transparency, connect overlapping regions through the
                // partition's connection helper when the opposite side's
                // first vertex has not moved since the partition was created.
                let opposite_side_current_first_position =
                    self.mesh.position(start_adjacent_outline.index(ending_index));
                let partition_start = &self.side(adjacent).partition_start;
                if partition_start.opposite_side_initial_position
                    == Some(opposite_side_current_first_position)
                    && partition_start.non_ccw_connection_index.is_some()
                {
                    target_vertex = self
                        .mesh
                        .vertex(partition_start.non_ccw_connection_index.unwrap());
                } else {
                    target_vertex = info.proposed_vertex;
                }
            } else {
                target_vertex = self.mesh.vertex(start_adjacent_outline.index(ending_index));
            }
        }

        if let Some(segment_intersection) = &intersection_result.segment_intersection {
            if !self.moving_starting_outline_vertices_would_cause_clockwise_triangle(
                adjacent,
                &start_adjacent_outline,
                segment_intersection,
                target_vertex.position,
                true,
            ) {
                self.move_outline_vertices_to_target(
                    &start_adjacent_outline,
                    0,
                    segment_intersection.ending_index,
                    &target_vertex,
                );
                self.try_append_vertex_and_triangle_to_mesh(adjacent, &info.proposed_vertex);
                return;
            }
        }

        // No workable intersection between the adjacent side and the
        // left-right edge. If the sides have crossed or are about to cross,
        // the stroke is starting to travel in the opposite direction over
        // itself: reject the adjacent position in favor of the opposite
        // position to force the sides to touch.
        let mut sides_cross_over = false;
        let adjacent_segment = LineSegment {
            from: info.adjacent_position,
            to: info.proposed_vertex.position,
        };
        let start_opposite_outline =
            construct_partial_outline(self.side(opposite), self.side(adjacent));
        let result = find_outline_intersection(
            &start_opposite_outline,
            &adjacent_segment,
            &self.mesh,
            budgets.initial_outline_reposition_budget,
            None,
        )
        .segment_intersection;
        if result.map_or(false, |intersection| {
            intersection.ending_index < start_opposite_outline.starting_side_size()
        }) {
            sides_cross_over = true;
        } else if self.side(opposite).next_buffered_vertex_offset
            < self.side(opposite).vertex_buffer.len() as u32
        {
            let opposite_side = self.side(opposite);
            let opposite_segment = LineSegment {
                from: info.opposite_position,
                to: opposite_side.vertex_buffer
                    [opposite_side.next_buffered_vertex_offset as usize]
                    .position,
            };
            sides_cross_over = adjacent_segment.intersection_t(&opposite_segment).is_some();
        }
        if sides_cross_over {
            let opposite_vertex = self.last_vertex(opposite);
            self.append_vertex_to_mesh(adjacent, &opposite_vertex);
        }
    }

    fn handle_non_ccw_adjacent_intersecting(&mut self, info: &SlowPathInfo, budgets: &Budgets) {
        let adjacent = info.adjacent;
        let triangle = match info.proposed_vertex_triangle {
            None => {
                if self.proposed_intersection_triangle_winding(
                    adjacent,
                    info.proposed_vertex.position,
                ) != TriangleWinding::CounterClockwise
                {
                    // Reject the vertex and wait to decide the correct action.
                    return;
                }
                let outline =
                    construct_partial_outline(self.side(adjacent), self.side(adjacent.opposite()));
                self.try_finish_intersection_handling(adjacent, &info.proposed_vertex, &outline);
                return;
            }
            Some(triangle) => triangle,
        };

        if !self.side(adjacent).is_retriangulating() {
            let starting_position = self
                .side(adjacent)
                .intersection
                .as_ref()
                .unwrap()
                .starting_position;
            if distance_between(info.proposed_vertex.position, starting_position)
                >= budgets.retriangulation_travel_threshold
            {
                self.try_begin_intersection_retriangulation(
                    adjacent,
                    &info.proposed_vertex,
                    triangle,
                );
            }
            return;
        }

        let corrected = match self.make_winding_corrected_intersection_vertex(
            adjacent,
            &info.proposed_vertex,
            triangle,
        ) {
            // Reject the proposed vertex; wait for a proposed CCW triangle or
            // an exterior position before giving up.
            None => return,
            Some(corrected) => corrected,
        };

        // Following the new vertices naively would leave a gap in the
        // geometry; undo a little of the outline repositioning to fill it.
        let max_extension_distance =
            distance_between(info.adjacent_position, info.opposite_position).max(
                distance_between(info.adjacent_position, corrected.position),
            );
        let outline =
            construct_partial_outline(self.side(adjacent), self.side(adjacent.opposite()));
        let extension_succeeded = self.extend_outline_to_segment(
            adjacent,
            &outline,
            &LineSegment {
                from: info.opposite_position,
                to: corrected.position,
            },
            max_extension_distance,
        );
        if !extension_succeeded {
            // The shifted geometry could not be backtracked; reject the
            // vertex.
            return;
        }

        self.continue_intersection_retriangulation(adjacent, &info.proposed_vertex, triangle);
        let mut corrected = corrected;
        corrected.attributes.side_label = Label::INTERIOR;
        self.update_intersection_pivot_vertices(adjacent, &corrected);
    }

    fn handle_non_ccw_opposite_intersecting(&mut self, info: &SlowPathInfo, budgets: &Budgets) {
        if let Some(triangle) = info.proposed_vertex_triangle {
            let intersection = self.make_adjacent_self_intersection(info, budgets);
            self.side_mut(info.adjacent).intersection = Some(intersection);

            // The adjacent side may begin retriangulation only if the opposite
            // side has not, and the intersecting point has traveled far
            // enough.
            if !self.side(info.adjacent.opposite()).is_retriangulating()
                && distance_between(info.proposed_vertex.position, info.adjacent_position)
                    >= budgets.retriangulation_travel_threshold
            {
                self.try_begin_intersection_retriangulation(
                    info.adjacent,
                    &info.proposed_vertex,
                    triangle,
                );
            }
        }
    }

    fn handle_non_ccw_both_sides_intersecting(&mut self, info: &SlowPathInfo, budgets: &Budgets) {
        // With both sides intersecting, the first side that attempts
        // retriangulation owns it until its intersection completes.
        let adjacent = info.adjacent;
        let opposite = adjacent.opposite();

        if !self.side(opposite).is_retriangulating() {
            // The opposite side does not own retriangulation; handle this as
            // though it were not intersecting at all.
            self.handle_non_ccw_adjacent_intersecting(info, budgets);

            // The adjacent side may have modified the triangulation; refresh
            // the triangle containing the opposite side's last proposed
            // vertex.
            if let Some(intersection) = &self.side(opposite).intersection {
                let position = intersection.last_proposed_vertex.position;
                let first_triangle = self.side(opposite).partition_start.first_triangle;
                let triangle = self.find_last_triangle_containing_segment_end(
                    opposite,
                    &LineSegment {
                        from: position,
                        to: position,
                    },
                    first_triangle,
                );
                if let Some(triangle) = triangle {
                    self.side_mut(opposite)
                        .intersection
                        .as_mut()
                        .unwrap()
                        .last_proposed_vertex_triangle = triangle;
                }
            }
            return;
        }

        if info.proposed_vertex_triangle.is_some() {
            // Nothing to do: the adjacent side is not allowed to modify the
            // mesh.
            return;
        }

        if self.proposed_intersection_triangle_winding(adjacent, info.proposed_vertex.position)
            != TriangleWinding::CounterClockwise
        {
            // Reject the vertex and wait to decide the correct action.
            return;
        }

        let outline = construct_partial_outline(self.side(adjacent), self.side(opposite));
        self.try_finish_intersection_handling(adjacent, &info.proposed_vertex, &outline);

        // Finishing the adjacent intersection on a CW proposed vertex moved
        // the leading left-right edge backwards; extend the opposite side to
        // fill the resulting gap.
        let start_opposite_outline =
            construct_partial_outline(self.side(opposite), self.side(adjacent));
        if start_opposite_outline.size() < 2 {
            return;
        }
        let opposite_outline_first_position =
            self.mesh.position(start_opposite_outline.index(0));
        let leading_left_right_edge = LineSegment {
            from: self.last_position(opposite),
            to: self.last_position(adjacent),
        };
        let max_extension_distance =
            distance_between(opposite_outline_first_position, leading_left_right_edge.from).max(
                distance_between(opposite_outline_first_position, leading_left_right_edge.to),
            );
        if self.extend_outline_to_segment(
            opposite,
            &start_opposite_outline,
            &leading_left_right_edge,
            max_extension_distance,
        ) {
            return;
        }

        // The outline could not be extended along its first segment because of
        // how far backward the adjacent side has moved. Try to move the first
        // opposite outline vertex to the newest adjacent-side vertex, checking
        // that the triangle made from the leading left-right edge and the
        // second outline position would wind correctly.
        let opposite_outline_second_vertex = self.mesh.vertex(start_opposite_outline.index(1));
        if self.proposed_triangle_winding(opposite_outline_second_vertex.position)
            == TriangleWinding::CounterClockwise
        {
            let opposite_outline_first_index = start_opposite_outline.index(0);
            let adjacent_last_vertex = self.last_vertex(adjacent);
            let to_second = distance_between(
                self.mesh.position(opposite_outline_first_index),
                opposite_outline_second_vertex.position,
            );
            let to_adjacent = distance_between(
                opposite_outline_second_vertex.position,
                adjacent_last_vertex.position,
            );
            if let Some(intersection) = self.side_mut(opposite).intersection.as_mut() {
                intersection.outline_reposition_budget -= to_second;
                intersection.outline_reposition_budget += to_adjacent;
            }
            self.set_vertex(opposite_outline_first_index, &adjacent_last_vertex);
        } else {
            // The adjacent side has moved backwards far enough that the
            // intersection position on the opposite side is no longer
            // contained in the stroke. Finish using the second outline vertex.
            let end_intersection_vertex = opposite_outline_second_vertex;
            self.try_finish_intersection_handling(
                opposite,
                &end_intersection_vertex,
                &start_opposite_outline,
            );
        }
    }
}

impl Geometry {
    // ------------------------------------------------------------------
    // Triangle and outline searches

    // Searches backwards through a sufficiently convex part of the mesh for a
    // triangle containing `segment.to`.
    //
    // Triangles are tested in reverse from the end of the mesh until the
    // start of `side_id`'s partition, exiting early once the search passes
    // `max_early_exit_triangle` and `segment` leaves the partition.
    fn find_last_triangle_containing_segment_end(
        &self,
        side_id: SideId,
        segment: &LineSegment,
        max_early_exit_triangle: u32,
    ) -> Option<u32> {
        let search_side = self.side(side_id);
        // Threshold for an adjacent-side index that could be the pivot of the
        // current intersection.
        let mut current_pivot_index_threshold = IndexType::MAX;
        if search_side.is_retriangulating() {
            current_pivot_index_threshold = search_side.indices
                [search_side.intersection.as_ref().unwrap().starting_offset as usize];
        }
        let opposite_first_triangle_vertex = self.side(side_id.opposite()).first_triangle_vertex;

        let mut i = self.mesh.triangle_count();
        while i > search_side.partition_start.first_triangle {
            let indices = self.mesh.triangle_indices(i - 1);

            // A triangle is a candidate if it is left-right conforming or one
            // of the triangles split by the current intersection.
            let conforming = self.triangle_is_left_right_conforming(&indices);
            if !conforming
                && !(self.triangle_indices_all_belong_to(&indices, side_id)
                    && indices[opposite_first_triangle_vertex] >= current_pivot_index_threshold)
            {
                i -= 1;
                continue;
            }

            let triangle = self.mesh.triangle(i - 1);
            if triangle.contains_point(segment.to) {
                return Some(i - 1);
            }

            if i - 1 <= max_early_exit_triangle && conforming {
                // If `segment` misses the triangle's left-to-right edge, a
                // portion of it lies outside the partition; stop searching.
                let triangle_edge = triangle.edge(0);
                if !segment.intersects(&triangle_edge) {
                    break;
                }
            }
            i -= 1;
        }
        None
    }

    // Repositions `outline` vertices to the first intersection between an
    // outline segment and `segment`, where "first" means as the outline is
    // traversed from `side_id`.
    //
    // Returns true if an intersection was found. An ongoing intersection on
    // `side_id` supplies (and gets charged) the search budget; otherwise
    // `default_outline_reposition_budget` is used. A `containing_triangle`
    // requires every repositioned outline position to stay inside it.
    fn move_starting_vertices_to_intersection(
        &mut self,
        side_id: SideId,
        outline: &DirectedPartialOutline,
        segment: &LineSegment,
        default_outline_reposition_budget: f32,
        containing_triangle: Option<Triangle>,
    ) -> bool {
        {
            let side = self.side(side_id);
            if outline.size() == 0
                || side
                    .intersection
                    .as_ref()
                    .map_or(false, |intersection| {
                        intersection.outline_reposition_budget == 0.0
                    })
            {
                return false;
            }
        }

        let search_budget = match &self.side(side_id).intersection {
            Some(intersection) => intersection.outline_reposition_budget,
            None => default_outline_reposition_budget,
        };
        let result = find_outline_intersection(
            outline,
            segment,
            &self.mesh,
            search_budget,
            containing_triangle,
        );
        let segment_intersection = match result.segment_intersection {
            Some(segment_intersection) => segment_intersection,
            None => return false,
        };
        if self.moving_starting_outline_vertices_would_cause_clockwise_triangle(
            side_id,
            outline,
            &segment_intersection,
            segment_intersection.position,
            true,
        ) {
            return false;
        }

        let from_vertex = self.mesh.vertex(outline.index(segment_intersection.starting_index));
        let to_vertex = self.mesh.vertex(outline.index(segment_intersection.ending_index));

        // Interpolate with zero margin: outline vertices shifted during an
        // ongoing intersection must not open small gaps in the geometry when
        // the shader outsets them.
        let result_vertex = lerp_along_exterior(
            side_id,
            &from_vertex,
            &to_vertex,
            segment_intersection.outline_interpolation_value,
            0.0,
        );

        self.move_outline_vertices_to_target(
            outline,
            0,
            segment_intersection.ending_index,
            &result_vertex,
        );

        if let Some(intersection) = self.side_mut(side_id).intersection.as_mut() {
            intersection.outline_reposition_budget = result.remaining_search_budget;
        }

        true
    }

    // Moves vertices of `outline` with indices in `[start, end)` to `target`.
    fn move_outline_vertices_to_target(
        &mut self,
        outline: &DirectedPartialOutline,
        start: u32,
        end: u32,
        target: &ExtrudedVertex,
    ) {
        for i in start..end {
            let index = outline.index(i);
            self.set_vertex(index, target);
        }
    }

    // The first vertex of `outline` that is not coincident with `outline[0]`.
    fn first_vertex_not_at_outline_start(&self, outline: &DirectedPartialOutline) -> Option<u32> {
        if outline.size() == 0 {
            return None;
        }
        let first = self.mesh.position(outline.index(0));
        for i in 1..outline.size() {
            if self.mesh.position(outline.index(i)) != first {
                return Some(i);
            }
        }
        None
    }

    // Tries to extend the start of `outline` to meet `segment`, moving any
    // degenerate starting vertices together, and by no more than
    // `max_extension_distance`. Returns true if extension succeeds.
    fn extend_outline_to_segment(
        &mut self,
        side_id: SideId,
        outline: &DirectedPartialOutline,
        segment: &LineSegment,
        max_extension_distance: f32,
    ) -> bool {
        // Adversarial (but valid) stroke inputs can blow intermediate
        // calculations up into NaN; `!(x > 0)` also rejects that.
        if self.side(side_id).intersection.is_none() || !(max_extension_distance > 0.0) {
            return false;
        }

        let non_start_vertex = match self.first_vertex_not_at_outline_start(outline) {
            Some(offset) => offset,
            None => return false,
        };

        // Extend the first non-degenerate outline segment by
        // `max_extension_distance` and intersect it with `segment`.
        let from = self.mesh.vertex(outline.index(non_start_vertex));
        let to = self.mesh.vertex(outline.index(0));
        let delta = to.position - from.position;
        let t = 1.0 + max_extension_distance / delta.length();
        let extended_to = from.lerp(&to, t);
        let extended_outline_segment = LineSegment {
            from: from.position,
            to: extended_to.position,
        };

        if let Some((outline_t, _)) = extended_outline_segment.intersection_t(segment) {
            let result_vertex = from.lerp(&extended_to, outline_t);

            // Give back to the reposition budget: this undoes a little of
            // what `move_starting_vertices_to_intersection` did.
            let returned = distance_between(to.position, result_vertex.position);
            if let Some(intersection) = self.side_mut(side_id).intersection.as_mut() {
                intersection.outline_reposition_budget += returned;
            }
            self.move_outline_vertices_to_target(outline, 0, non_start_vertex, &result_vertex);
            return true;
        }

        false
    }

    // True if moving the `outline` vertices preceding `segment_intersection`
    // to `target_position` would produce one or more clockwise triangles in
    // the opposite side's fan.
    fn moving_starting_outline_vertices_would_cause_clockwise_triangle(
        &self,
        side_id: SideId,
        outline: &DirectedPartialOutline,
        segment_intersection: &SegmentIntersection,
        target_position: Point,
        stop_at_oldest_retriangulation_triangle: bool,
    ) -> bool {
        let oldest_to_be_moved = outline.index(segment_intersection.starting_index);
        let opposite_id = side_id.opposite();

        let first = if self.vertex_side_ids[oldest_to_be_moved as usize] == side_id {
            self.opposite_side_offsets[oldest_to_be_moved as usize]
        } else {
            // The intersection indices are already on the opposite side; any
            // fan triangle before the hit's ending index would be made
            // degenerate by the repositioning.
            self.side_offsets[outline.index(segment_intersection.ending_index) as usize]
        };

        let side = self.side(side_id);
        let last = if side.is_retriangulating() && stop_at_oldest_retriangulation_triangle {
            let oldest = side
                .intersection
                .as_ref()
                .unwrap()
                .oldest_retriangulation_triangle;
            let opposite_last_index = self
                .mesh
                .vertex_index(oldest, self.side(opposite_id).first_triangle_vertex);
            if self.vertex_side_ids[opposite_last_index as usize] != opposite_id {
                // The oldest retriangulation triangle should always conform to
                // L-R-(L|R); guard against the impossible anyway.
                return false;
            }
            self.side_offsets[opposite_last_index as usize]
        } else {
            last_outline_index_offset(self.side(opposite_id))
        };

        find_last_clockwise_multi_fan_segment(
            &self.mesh,
            self.side(opposite_id),
            IndexOffsetRange { first, last },
            target_position,
        )
        .is_some()
    }

    // ------------------------------------------------------------------
    // Retriangulation

    // Tries to break up the triangles between the end of the mesh and
    // `intersection_vertex_triangle` around the intersection pivot. Fails and
    // does nothing if that would create clockwise-winding triangles and a
    // corrected pivot position cannot be computed.
    fn try_begin_intersection_retriangulation(
        &mut self,
        side_id: SideId,
        intersection_vertex: &ExtrudedVertex,
        intersection_vertex_triangle: u32,
    ) -> bool {
        {
            let side = self.side(side_id);
            if side.intersection.is_none() || side.is_retriangulating() {
                return false;
            }
        }

        let mut can_begin = true;
        let corrected_vertex = self.make_winding_corrected_intersection_vertex(
            side_id,
            intersection_vertex,
            intersection_vertex_triangle,
        );
        if corrected_vertex.is_none() {
            // Breaking up triangles would cause bad winding.
            can_begin = false;
        }

        let indices = self.mesh.triangle_indices(intersection_vertex_triangle);
        if !self.triangle_is_left_right_conforming(&indices) {
            // This *should* be impossible: any old triangle an intersection
            // can start on conforms to L-R-(L|R). Protect against it anyway.
            can_begin = false;
        }
        let mut saved_left = indices[0];
        let mut saved_right = indices[1];

        if !can_begin {
            // A counter-clockwise proposed winding means the intersection gets
            // given up; otherwise the vertex is just rejected.
            if self.proposed_triangle_winding(intersection_vertex.position)
                == TriangleWinding::CounterClockwise
            {
                self.give_up_intersection_handling(side_id);
                self.try_append_vertex_and_triangle_to_mesh(side_id, intersection_vertex);
            }
            return false;
        }
        let mut corrected_vertex = corrected_vertex.unwrap();
        ext_log!(
            self,
            "beginning retriangulation on {:?} at triangle {}",
            side_id,
            intersection_vertex_triangle
        );

        let proposed_winding = self.proposed_triangle_winding(corrected_vertex.position);

        // Append two new vertices to the intersecting side. The first may be
        // repositioned to the opposite side below; the second follows the
        // intersection position as its pivot.
        let last = self.last_vertex(side_id);
        self.append_vertex_to_mesh(side_id, &last);
        corrected_vertex.attributes.side_label = Label::INTERIOR;
        self.append_vertex_to_mesh(side_id, &corrected_vertex);

        let starting_offset = self.side(side_id).intersection.as_ref().unwrap().starting_offset
            as usize;
        debug_assert!(starting_offset >= 1);
        let pivot_index = self.side(side_id).indices[starting_offset + 1];
        let prev_index = self.side(side_id).indices[starting_offset - 1];

        // The saved index on the intersecting side must not be one of the
        // vertices about to be repositioned, which can happen when
        // `intersection_vertex_triangle` is at or past the undo stack's
        // starting triangle.
        match side_id {
            SideId::Left => saved_left = saved_left.min(prev_index),
            SideId::Right => saved_right = saved_right.min(prev_index),
        }

        // "Unzip" the triangles around the pivot by swapping one index of
        // each, creating an incomplete fan:
        //
        //    X----X      X    X      X    X
        //    | \  |      | \ /|      |\  /|
        //    | o\ |  =>  | o\ |  =>  | o  |
        //    |   \|      |   \|      |/  \|
        //    X----X      X----X      X    X
        //
        let undo_stack_starting_triangle = self
            .side(side_id)
            .intersection
            .as_ref()
            .unwrap()
            .undo_stack_starting_triangle;
        let mut i = self.mesh.triangle_count();
        while i > intersection_vertex_triangle {
            let mesh_indices = self.mesh.triangle_indices(i - 1);

            // Save every triangle: all of them shift when the gap-filling
            // triangle is inserted after this loop.
            if self.save_point_state.is_active && i - 1 < self.save_point_state.n_mesh_triangles {
                self.save_point_state
                    .saved_triangle_indices
                    .entry(i - 1)
                    .or_insert(mesh_indices);
            }

            if i <= undo_stack_starting_triangle {
                self.side_mut(side_id)
                    .intersection
                    .as_mut()
                    .unwrap()
                    .undo_triangulation_stack
                    .push(mesh_indices);
            }

            if !self.triangle_is_left_right_conforming(&mesh_indices) {
                // Triangles that do not conform to {left, right, left-or-right}
                // come from a previous intersection and are only shifted.
                i -= 1;
                continue;
            }

            let mut new_indices = mesh_indices;
            if self.vertex_side_ids[mesh_indices[2] as usize] == SideId::Left {
                new_indices[1] = pivot_index;
            } else {
                new_indices[0] = pivot_index;
            }
            self.set_triangle_indices_impl(i - 1, new_indices, false);
            i -= 1;
        }

        // The unzipping leaves a gap before the unzipped triangles; fill it by
        // inserting a new triangle. Depending on the winding of the proposed
        // triangle there may also be a gap after, covered by an appended one.
        self.mesh.insert_triangle_indices(
            intersection_vertex_triangle,
            [saved_left, saved_right, pivot_index],
        );

        if proposed_winding != TriangleWinding::CounterClockwise {
            let first_pivot_index = self.side(side_id).indices[starting_offset];
            let appended_indices = match side_id {
                SideId::Left => [prev_index, pivot_index, first_pivot_index],
                SideId::Right => [pivot_index, prev_index, first_pivot_index],
            };
            // The last index reuses the first intersecting vertex while it
            // moves to the opposite side; subsequent extrusions push it back
            // as this part of the stroke is overwritten by outgoing triangles.
            self.mesh.append_triangle_indices(appended_indices);

            // The first intersection vertex is about to be repositioned across
            // to the other side of the stroke; grow the reposition budget so
            // it can make it all the way back, and keep the intersecting
            // side's exterior label on it.
            let mut newest_opposite_vertex_copy = self.last_vertex(side_id.opposite());
            let distance = distance_between(
                self.mesh.position(first_pivot_index),
                newest_opposite_vertex_copy.position,
            );
            self.side_mut(side_id)
                .intersection
                .as_mut()
                .unwrap()
                .outline_reposition_budget += distance;
            newest_opposite_vertex_copy.attributes.side_label =
                default_exterior_side_label(side_id);
            self.set_vertex(first_pivot_index, &newest_opposite_vertex_copy);
        }

        let intersection = self.side_mut(side_id).intersection.as_mut().unwrap();
        intersection.retriangulation_started = true;
        intersection.oldest_retriangulation_triangle = intersection_vertex_triangle;
        true
    }

    // Continues triangle break-up for an ongoing intersection: undoes
    // retriangulation when `intersection_vertex_triangle` is newer than the
    // oldest modified triangle, and otherwise unzips further backwards.
    fn continue_intersection_retriangulation(
        &mut self,
        side_id: SideId,
        intersection_vertex: &ExtrudedVertex,
        intersection_vertex_triangle: u32,
    ) {
        let oldest = {
            let side = self.side(side_id);
            if !side.is_retriangulating() {
                return;
            }
            side.intersection
                .as_ref()
                .unwrap()
                .oldest_retriangulation_triangle
        };
        if intersection_vertex_triangle == oldest {
            return;
        }

        if intersection_vertex_triangle > oldest {
            // The intersection point may have started to travel forward within
            // the stroke; undo retriangulation to keep interior triangles from
            // expanding too much.
            self.undo_intersection_retriangulation(
                side_id,
                Some(intersection_vertex.position),
            );
            return;
        }

        let starting_offset = self.side(side_id).intersection.as_ref().unwrap().starting_offset
            as usize;
        let pivot_index = self.side(side_id).indices[starting_offset + 1];

        // The same unzipping as `try_begin_intersection_retriangulation`, but
        // also shifting each triangle one slot toward the end of the stroke,
        // which moves the gap-filling triangle to its new location at
        // `intersection_vertex_triangle`.
        let mut i = oldest;
        while i > intersection_vertex_triangle {
            let indices = self.mesh.triangle_indices(i - 1);
            self.side_mut(side_id)
                .intersection
                .as_mut()
                .unwrap()
                .undo_triangulation_stack
                .push(indices);

            let mut new_indices = indices;
            if self.triangle_is_left_right_conforming(&indices) {
                if self.vertex_side_ids[indices[2] as usize] == SideId::Left {
                    new_indices[1] = pivot_index;
                } else {
                    new_indices[0] = pivot_index;
                }
            }
            self.set_triangle_indices(i, new_indices);
            i -= 1;
        }

        // The first two indices of the new gap-filling triangle are already
        // correct; only the third needs resetting.
        let mut indices = self.mesh.triangle_indices(intersection_vertex_triangle);
        indices[2] = pivot_index;
        self.set_triangle_indices(intersection_vertex_triangle, indices);

        self.side_mut(side_id)
            .intersection
            .as_mut()
            .unwrap()
            .oldest_retriangulation_triangle = intersection_vertex_triangle;
    }

    // Restores triangles broken up by retriangulation by walking the undo
    // stack, stopping early at a triangle containing `stop_at_position` (which
    // stays broken up).
    fn undo_intersection_retriangulation(
        &mut self,
        side_id: SideId,
        stop_at_position: Option<Point>,
    ) {
        if !self.side(side_id).is_retriangulating() || self.mesh.triangle_count() == 0 {
            return;
        }

        let oldest = self
            .side(side_id)
            .intersection
            .as_ref()
            .unwrap()
            .oldest_retriangulation_triangle;
        let mut triangle_index = oldest;
        let mut last_left = self.mesh.vertex_index(triangle_index, 0);
        let mut last_right = self.mesh.vertex_index(triangle_index, 1);

        loop {
            let stack_top = {
                let side = self.side(side_id);
                match side
                    .intersection
                    .as_ref()
                    .unwrap()
                    .undo_triangulation_stack
                    .last()
                {
                    Some(&indices) => indices,
                    None => break,
                }
            };
            if triangle_index >= self.mesh.triangle_count() {
                break;
            }

            if let Some(position) = stop_at_position {
                let triangle = Triangle {
                    a: self.mesh.position(stack_top[0]),
                    b: self.mesh.position(stack_top[1]),
                    c: self.mesh.position(stack_top[2]),
                };
                // This old triangle should remain broken up.
                if triangle.contains_point(position) {
                    break;
                }
            }

            // Put the original triangle back into the mesh triangulation.
            self.set_triangle_indices(triangle_index, stack_top);

            if self.triangle_is_left_right_conforming(&stack_top) {
                if self.vertex_side_ids[stack_top[2] as usize] == SideId::Left {
                    last_left = stack_top[2];
                    last_right = stack_top[1];
                } else {
                    last_left = stack_top[0];
                    last_right = stack_top[2];
                }
            }

            triangle_index += 1;
            self.side_mut(side_id)
                .intersection
                .as_mut()
                .unwrap()
                .undo_triangulation_stack
                .pop();
        }

        if triangle_index == oldest {
            // No triangles were restored.
            return;
        }

        if triangle_index >= self.mesh.triangle_count() {
            let last_triangle = self.mesh.triangle_count() - 1;
            self.side_mut(side_id)
                .intersection
                .as_mut()
                .unwrap()
                .oldest_retriangulation_triangle = last_triangle;
            return;
        }

        self.side_mut(side_id)
            .intersection
            .as_mut()
            .unwrap()
            .oldest_retriangulation_triangle = triangle_index;

        // Move the extra gap-filling triangle forward in the stroke, the
        // mirror image of how continuing retriangulation moves it backward.
        let starting_offset = self.side(side_id).intersection.as_ref().unwrap().starting_offset
            as usize;
        let pivot_index = self.side(side_id).indices[starting_offset + 1];
        self.set_triangle_indices(triangle_index, [last_left, last_right, pivot_index]);
    }

    // The offset ranges of the left and right sides that would form triangle
    // fans around `intersection_vertex`.
    fn get_intersection_triangle_fan_offset_ranges(
        &self,
        side_id: SideId,
        intersection_vertex: &ExtrudedVertex,
        intersection_vertex_triangle: u32,
    ) -> IndexOffsetRanges {
        let side = self.side(side_id);
        let zero = IndexOffsetRange { first: 0, last: 0 };
        let intersection = match &side.intersection {
            Some(intersection) => intersection,
            None => {
                return IndexOffsetRanges {
                    left: zero,
                    right: zero,
                }
            }
        };

        // When the containing triangle index is increasing, search the undo
        // stack first, the same way undoing retriangulation will, so the
        // result reflects what the oldest retriangulation triangle is about
        // to become.
        let mut triangle_indices = None;
        if intersection.retriangulation_started
            && intersection_vertex_triangle > intersection.oldest_retriangulation_triangle
        {
            for indices in intersection.undo_triangulation_stack.iter().rev() {
                if self.triangle_is_left_right_conforming(indices)
                    && (Triangle {
                        a: self.mesh.position(indices[0]),
                        b: self.mesh.position(indices[1]),
                        c: self.mesh.position(indices[2]),
                    })
                    .contains_point(intersection_vertex.position)
                {
                    triangle_indices = Some(*indices);
                    break;
                }
            }
        }
        let triangle_indices = triangle_indices.unwrap_or_else(|| {
            let mut indices = self.mesh.triangle_indices(intersection_vertex_triangle);
            // The triangle at `intersection_vertex_triangle` should always be
            // left-right conforming; fall back to the nearest one that is.
            if !self.triangle_is_left_right_conforming(&indices)
                && intersection_vertex_triangle > side.partition_start.first_triangle
            {
                let mut i = intersection_vertex_triangle;
                while i > side.partition_start.first_triangle {
                    indices = self.mesh.triangle_indices(i - 1);
                    if self.triangle_is_left_right_conforming(&indices) {
                        break;
                    }
                    i -= 1;
                }
            }
            indices
        });

        IndexOffsetRanges {
            left: IndexOffsetRange {
                first: if self.vertex_side_ids[triangle_indices[0] as usize] == SideId::Left {
                    self.side_offsets[triangle_indices[0] as usize]
                } else {
                    self.left_side.indices.len() as u32 - 1
                },
                last: last_outline_index_offset(&self.left_side),
            },
            right: IndexOffsetRange {
                first: if self.vertex_side_ids[triangle_indices[1] as usize] == SideId::Right {
                    self.side_offsets[triangle_indices[1] as usize]
                } else {
                    self.right_side.indices.len() as u32 - 1
                },
                last: last_outline_index_offset(&self.right_side),
            },
        }
    }

    // If possible, returns a corrected `intersection_vertex` that will not
    // cause clockwise-winding triangles when used as the new intersection
    // pivot. The correction stretches toward the opposite side while keeping
    // the same containing triangle.
    fn make_winding_corrected_intersection_vertex(
        &self,
        side_id: SideId,
        intersection_vertex: &ExtrudedVertex,
        intersection_vertex_triangle: u32,
    ) -> Option<ExtrudedVertex> {
        if self.side(side_id).intersection.is_none() {
            return None;
        }

        let affected_offset_ranges = self.get_intersection_triangle_fan_offset_ranges(
            side_id,
            intersection_vertex,
            intersection_vertex_triangle,
        );

        let last_cw_left_segment = find_last_clockwise_multi_fan_segment(
            &self.mesh,
            &self.left_side,
            affected_offset_ranges.left,
            intersection_vertex.position,
        );
        let last_cw_right_segment = find_last_clockwise_multi_fan_segment(
            &self.mesh,
            &self.right_side,
            affected_offset_ranges.right,
            intersection_vertex.position,
        );
        if last_cw_left_segment.is_none() && last_cw_right_segment.is_none() {
            // No correction needed.
            return Some(*intersection_vertex);
        }

        {
            let intersection = self.side(side_id).intersection.as_ref().unwrap();
            if intersection.retriangulation_started
                && intersection.outline_reposition_budget
                    < intersection.initial_outline_reposition_budget
            {
                // The budget already dipped below its initial value; no
                // correction attempt.
                return None;
            }
        }

        let opposite_vertex = self.last_vertex(side_id.opposite());
        let mut interpolation: f32 = 0.0;

        // Hunting for "X" below:
        //
        //          opposite_vertex            interpolation = 1
        //                  |
        //                  |
        //   L----L         X
        //                  |       R-----R
        //                  |
        //        intersection_vertex          interpolation = 0
        //
        let adjacent_opposite_segment = LineSegment {
            from: intersection_vertex.position,
            to: opposite_vertex.position,
        };
        // Interpolation amount along `adjacent_opposite_segment` at which the
        // line through `outline_segment` is crossed.
        let non_cw_interpolation_amount = |outline_segment: LineSegment| -> f32 {
            let extension_distance = distance_between(
                adjacent_opposite_segment.from,
                outline_segment.from,
            )
            .max(distance_between(
                adjacent_opposite_segment.from,
                outline_segment.to,
            ))
            .max(distance_between(
                adjacent_opposite_segment.to,
                outline_segment.from,
            ))
            .max(distance_between(
                adjacent_opposite_segment.to,
                outline_segment.to,
            ));
            let outline_segment_length = outline_segment.length();
            if outline_segment_length == 0.0 {
                return 0.0;
            }

            let ratio = extension_distance / outline_segment_length;
            let extended = LineSegment {
                from: outline_segment.sample(-ratio),
                to: outline_segment.sample(1.0 + ratio),
            };
            match adjacent_opposite_segment.intersection_t(&extended) {
                Some((t, _)) => t,
                None => 0.0,
            }
        };

        if let Some(segment) = last_cw_left_segment {
            interpolation = interpolation.max(non_cw_interpolation_amount(segment));
        }
        if let Some(segment) = last_cw_right_segment {
            interpolation = interpolation.max(non_cw_interpolation_amount(segment));
        }

        // The correction must lie strictly between the intersection vertex and
        // the opposite vertex.
        if interpolation <= 0.0 || interpolation >= 1.0 {
            return None;
        }

        // Bump a little toward the opposite vertex to avoid a triangle with
        // very slightly negative signed area.
        const INTERPOLATION_BUMP: f32 = 0.01;
        if interpolation < 1.0 - INTERPOLATION_BUMP {
            interpolation += INTERPOLATION_BUMP;
        }

        let corrected_position = intersection_vertex
            .position
            .lerp(opposite_vertex.position, interpolation);
        if !corrected_position.x.is_finite() || !corrected_position.y.is_finite() {
            return None;
        }

        // The correction must still be contained in a mesh triangle, form a
        // non-CW leading triangle with the first indices of each affected fan
        // range (the containing triangle stays the same), and no longer cause
        // CW fan segments on either side.
        if self
            .find_last_triangle_containing_segment_end(
                side_id,
                &LineSegment {
                    from: intersection_vertex.position,
                    to: corrected_position,
                },
                intersection_vertex_triangle,
            )
            .is_none()
            || (Triangle {
                a: self
                    .mesh
                    .position(self.left_side.indices[affected_offset_ranges.left.first as usize]),
                b: self
                    .mesh
                    .position(self.right_side.indices[affected_offset_ranges.right.first as usize]),
                c: corrected_position,
            })
            .signed_area()
                < 0.0
            || find_last_clockwise_multi_fan_segment(
                &self.mesh,
                &self.left_side,
                affected_offset_ranges.left,
                corrected_position,
            )
            .is_some()
            || find_last_clockwise_multi_fan_segment(
                &self.mesh,
                &self.right_side,
                affected_offset_ranges.right,
                corrected_position,
            )
            .is_some()
        {
            return None;
        }

        Some(intersection_vertex.lerp(&opposite_vertex, interpolation))
    }

    // Updates the pivot vertices of an ongoing intersection to follow
    // `new_pivot_vertex`.
    fn update_intersection_pivot_vertices(
        &mut self,
        side_id: SideId,
        new_pivot_vertex: &ExtrudedVertex,
    ) {
        if !self.side(side_id).is_retriangulating() {
            return;
        }

        if self.texture_coord_type == TextureCoordType::Tiling {
            // Without winding texture coordinates the single vertex at the
            // pivot follows the most recent proposed vertex.
            let last_index = *self.side(side_id).indices.last().unwrap();
            self.set_vertex(last_index, new_pivot_vertex);
            return;
        }

        // With winding texture coordinates, keep appending super-imposed
        // vertices at the intersection.
        self.append_vertex_to_mesh(side_id, new_pivot_vertex);

        let starting_offset = self.side(side_id).intersection.as_ref().unwrap().starting_offset
            as usize;

        // Only the positions of the pivot follow the most recent vertex. The
        // vertex starting the pivot connects to vertices preceding the
        // intersection, so it is interpolated from the triangle currently
        // being intersected.
        let triangle_indices = {
            let side = self.side(side_id);
            let intersection = side.intersection.as_ref().unwrap();
            match intersection.undo_triangulation_stack.last() {
                Some(&indices) => indices,
                None => self
                    .mesh
                    .triangle_indices(intersection.oldest_retriangulation_triangle),
            }
        };
        let a = self.mesh.vertex(triangle_indices[0]);
        let b = self.mesh.vertex(triangle_indices[1]);
        let c = self.mesh.vertex(triangle_indices[2]);
        let mut replacement = barycentric_lerp(&a, &b, &c, new_pivot_vertex.position);

        self.assign_vertices_in_offset_range(
            side_id,
            starting_offset + 1,
            starting_offset + 2,
            &replacement,
        );

        // The rest of the pivot vertices up to the new one carry the sentinel
        // texture coordinates.
        replacement.attributes.surface_uv = winding_texture_uv_sentinel();
        let end = self.side(side_id).indices.len() - 1;
        self.assign_vertices_in_offset_range(side_id, starting_offset + 2, end, &replacement);

        // Newly broken-up triangles need one vertex swapped: the inside of the
        // turn keeps using the interpolated vertex at `starting_offset + 1`,
        // while the outside joins the fan through the sentinel vertex at
        // `starting_offset + 2`.
        if self.side(side_id).indices.len() - starting_offset > 2 {
            let replacement_triangle_vertex = self.side(side_id).first_triangle_vertex;
            let replacement_index = self.side(side_id).indices[starting_offset + 2];
            let starting_triangle = self
                .side(side_id)
                .intersection
                .as_ref()
                .unwrap()
                .oldest_retriangulation_triangle
                + 1;
            let mut i = starting_triangle;
            while i < self.mesh.triangle_count() {
                // The triangles of interest have two vertices opposite to the
                // intersecting side, so the last index is not on it.
                let indices = self.mesh.triangle_indices(i);
                if !self.triangle_is_left_right_conforming(&indices)
                    || self.vertex_side_ids[indices[2] as usize] == side_id
                {
                    i += 1;
                    continue;
                }
                if indices[replacement_triangle_vertex] >= replacement_index {
                    break;
                }

                let mut new_indices = indices;
                new_indices[replacement_triangle_vertex] = replacement_index;
                self.set_triangle_indices(i, new_indices);
                i += 1;
            }
        }
    }
}

impl Geometry {
    // ------------------------------------------------------------------
    // Finishing and giving up intersections

    // Tries to cleanly finish intersection handling assuming `new_vertex` is
    // now on the exterior of the stroke. Falls through to
    // `give_up_intersection_handling` when the outline intersection cannot be
    // found or used. The new vertex is appended at the very end either way.
    fn try_finish_intersection_handling(
        &mut self,
        side_id: SideId,
        new_vertex: &ExtrudedVertex,
        outline: &DirectedPartialOutline,
    ) {
        self.try_finish_intersection_handling_inner(side_id, new_vertex, outline);
        self.try_append_vertex_and_triangle_to_mesh(side_id, new_vertex);
    }

    fn try_finish_intersection_handling_inner(
        &mut self,
        side_id: SideId,
        new_vertex: &ExtrudedVertex,
        outline: &DirectedPartialOutline,
    ) {
        let (last_proposed_vertex, budget, initial_budget, started, starting_offset, oldest) = {
            let intersection = match self.side(side_id).intersection.as_ref() {
                Some(intersection) => intersection,
                None => return,
            };
            (
                intersection.last_proposed_vertex,
                intersection.outline_reposition_budget,
                intersection.initial_outline_reposition_budget,
                intersection.retriangulation_started,
                intersection.starting_offset as usize,
                intersection.oldest_retriangulation_triangle,
            )
        };

        let segment = LineSegment {
            from: last_proposed_vertex.position,
            to: new_vertex.position,
        };
        let result = find_outline_intersection(outline, &segment, &self.mesh, budget, None);
        let mut segment_intersection = match result.segment_intersection {
            Some(segment_intersection) => segment_intersection,
            None => {
                self.give_up_intersection_handling(side_id);
                return;
            }
        };

        let pivot_start_vertex;
        let pivot_end_vertex;
        if result.remaining_search_budget < initial_budget {
            let outline_from_vertex =
                self.mesh.vertex(outline.index(segment_intersection.starting_index));
            let outline_to_vertex =
                self.mesh.vertex(outline.index(segment_intersection.ending_index));
            pivot_start_vertex = lerp_along_exterior(
                side_id,
                &outline_from_vertex,
                &outline_to_vertex,
                segment_intersection.outline_interpolation_value,
                f32::INFINITY,
            );
            let mut pivot_end = lerp_along_exterior(
                side_id,
                &last_proposed_vertex,
                new_vertex,
                segment_intersection.segment_interpolation_value,
                f32::INFINITY,
            );
            // Make the positions exactly equal.
            pivot_end.position = pivot_start_vertex.position;
            pivot_end_vertex = pivot_end;
        } else {
            // Edge case: the reposition budget is greater than its initial
            // value. Use the ending index of the outline hit instead of the
            // hit itself to avoid a sharp concavity in the outline.
            pivot_start_vertex = self.mesh.vertex(outline.index(segment_intersection.ending_index));
            pivot_end_vertex = pivot_start_vertex;
            segment_intersection.outline_interpolation_value = 1.0;
            segment_intersection.position = pivot_start_vertex.position;
        }

        if self.moving_starting_outline_vertices_would_cause_clockwise_triangle(
            side_id,
            outline,
            &segment_intersection,
            segment_intersection.position,
            false,
        ) {
            // Cannot exit cleanly without causing CW triangles; give up. If
            // retriangulation has started it is kept, and some overlap can
            // still be reduced.
            if started {
                if !self.moving_starting_outline_vertices_would_cause_clockwise_triangle(
                    side_id,
                    outline,
                    &segment_intersection,
                    segment_intersection.position,
                    true,
                ) {
                    // Repositioning only up to the oldest retriangulation
                    // triangle stays clean.
                    self.move_outline_vertices_to_target(
                        outline,
                        0,
                        segment_intersection.ending_index,
                        &pivot_start_vertex,
                    );
                } else {
                    // Otherwise collapse the intersecting side's fan around
                    // the intersection pivot.
                    let result_start = outline.index(segment_intersection.starting_index);
                    let indices = self.mesh.triangle_indices(oldest);
                    if self.vertex_side_ids[result_start as usize] == side_id
                        && self.triangle_is_left_right_conforming(&indices)
                    {
                        let first_triangle_vertex = self.side(side_id).first_triangle_vertex;
                        let target_offset = self.side_offsets
                            [indices[first_triangle_vertex] as usize]
                            .max(self.side_offsets[result_start as usize])
                            as usize;
                        let pivot_offset = starting_offset + 1;
                        let target_vertex =
                            self.mesh.vertex(self.side(side_id).indices[target_offset]);
                        self.assign_vertices_in_offset_range(
                            side_id,
                            target_offset + 1,
                            pivot_offset,
                            &target_vertex,
                        );
                    }
                }
            }

            self.give_up_intersection_handling(side_id);
            self.try_append_vertex_and_triangle_to_mesh(side_id, &pivot_end_vertex);
            return;
        }

        if self.texture_coord_type == TextureCoordType::Tiling {
            self.move_outline_vertices_to_target(
                outline,
                0,
                segment_intersection.ending_index,
                &pivot_start_vertex,
            );

            if started {
                let first_vertex = self.mesh.vertex(self.side(side_id).indices[starting_offset]);
                let end = self.side(side_id).indices.len();
                self.assign_vertices_in_offset_range(
                    side_id,
                    starting_offset + 1,
                    end,
                    &first_vertex,
                );
                self.undo_intersection_retriangulation(side_id, None);
            }
            self.side_mut(side_id).intersection = None;
            ext_log!(self, "finished intersection on {:?}", side_id);
            return;
        }

        // Winding textures: the pivot stays as a run of super-imposed
        // vertices carrying the sentinel texture coordinate.
        let hit_offset = segment_intersection.starting_index;
        self.set_vertex(outline.index(hit_offset), &pivot_start_vertex);
        let mut sentinel_vertex = pivot_start_vertex;
        sentinel_vertex.attributes.surface_uv = winding_texture_uv_sentinel();
        self.move_outline_vertices_to_target(outline, 0, hit_offset, &sentinel_vertex);

        if starting_offset < self.side(side_id).indices.len() {
            let first_vertex = self.mesh.vertex(self.side(side_id).indices[starting_offset]);
            let end = self.side(side_id).indices.len() - 1;
            self.assign_vertices_in_offset_range(side_id, starting_offset + 1, end, &first_vertex);
        }
        let last_index = *self.side(side_id).indices.last().unwrap();
        self.set_vertex(last_index, &pivot_end_vertex);
        self.undo_intersection_retriangulation(side_id, None);
        self.side_mut(side_id).intersection = None;
        ext_log!(self, "finished intersection on {:?}", side_id);
    }

    // Exits an unfinished self-intersection. If retriangulation was underway,
    // starts a new partition on the intersecting side and records the
    // leftover all-one-side triangles as an intersection discontinuity.
    fn give_up_intersection_handling(&mut self, side_id: SideId) {
        let intersection = match self.side(side_id).intersection.clone() {
            Some(intersection) => intersection,
            None => return,
        };

        if !intersection.retriangulation_started {
            // No partition needed; just retry the last proposed vertex in
            // case it was rejected.
            self.try_append_vertex_and_triangle_to_mesh(
                side_id,
                &intersection.last_proposed_vertex,
            );
            self.side_mut(side_id).intersection = None;
            return;
        }
        ext_log!(self, "giving up intersection on {:?}", side_id);

        let opposite_id = side_id.opposite();

        // Start a new partition on the intersecting side, used for better
        // subjective continuity of self-overlap if the side keeps turning in
        // the same direction. The partition must be set before the duplicate
        // vertices below are appended, so that their opposite-side offsets
        // come out right.
        let adjacent_count = self.side(side_id).indices.len() as u32;
        let opposite_count = self.side(opposite_id).indices.len() as u32;
        let opposite_last_position = self.last_position(opposite_id);
        let connection_index =
            self.side(side_id).indices[intersection.starting_offset as usize];
        self.side_mut(side_id).partition_start = MeshPartitionStart {
            adjacent_first_index_offset: adjacent_count,
            opposite_first_index_offset: opposite_count,
            first_triangle: self.mesh.triangle_count(),
            opposite_side_initial_position: Some(opposite_last_position),
            non_ccw_connection_index: Some(connection_index),
            outline_connects_sides: true,
            is_forward_exterior: false,
        };

        // The split triangles stay split, so update `opposite_side_offsets`
        // for the pivot and for the outer fan vertices that now only connect
        // to the pivot.
        let intersection_pivot_offset = intersection.starting_offset + 1;
        let mut first_outer_triangle = None;
        for i in intersection.oldest_retriangulation_triangle + 1..self.mesh.triangle_count() {
            // Outer fan triangles are left-right conforming; inner fan
            // triangles belong entirely to the intersecting side.
            let indices = self.mesh.triangle_indices(i);
            if self.triangle_is_left_right_conforming(&indices) {
                first_outer_triangle = Some(i);
                break;
            }
        }
        if let Some(first_outer) = first_outer_triangle {
            let outer_indices = self.mesh.triangle_indices(first_outer);
            if self.vertex_side_ids[outer_indices[2] as usize] == opposite_id {
                // The pivot connects to the first opposing-side vertex of the
                // first outer triangle.
                let opposite_first_triangle_vertex =
                    self.side(opposite_id).first_triangle_vertex;
                let pivot_index =
                    self.side(side_id).indices[intersection_pivot_offset as usize];
                let new_offset =
                    self.side_offsets[outer_indices[opposite_first_triangle_vertex] as usize];
                self.update_opposite_side_offset(pivot_index, new_offset, true);

                // The subsequent opposite-side vertices connect to the pivot.
                let start = self.side_offsets[outer_indices[2] as usize];
                for offset in start..self.side(opposite_id).indices.len() as u32 {
                    let index = self.side(opposite_id).indices[offset as usize];
                    self.update_opposite_side_offset(index, intersection_pivot_offset, true);
                }
            }
        }

        // If the intersection traveled backward enough to break up the
        // opposite partition's first triangle, the seamless connection of
        // self-overlap is broken anyway; disconnect that partition's sides.
        if intersection.oldest_retriangulation_triangle
            < self.side(opposite_id).partition_start.first_triangle
        {
            self.disconnect_partition_sides(opposite_id);
        }

        // Record the discontinuity caused by the leftover triangles whose
        // vertices all belong to the intersecting side: they span the
        // intersecting side's indices of the oldest retriangulation triangle.
        let oldest_indices = self
            .mesh
            .triangle_indices(intersection.oldest_retriangulation_triangle);
        let first_triangle_vertex = self.side(side_id).first_triangle_vertex;
        if self.triangle_is_left_right_conforming(&oldest_indices)
            && self.vertex_side_ids[oldest_indices[2] as usize] == side_id
            && self.side_offsets[oldest_indices[first_triangle_vertex] as usize]
                < self.side_offsets[oldest_indices[2] as usize]
        {
            let range = IndexOffsetRange {
                first: self.side_offsets[oldest_indices[first_triangle_vertex] as usize],
                last: self.side_offsets[oldest_indices[2] as usize],
            };
            self.side_mut(side_id).intersection_discontinuities.push(range);
        }

        // Start the next connected partition with a copy of the last vertex
        // from each side. The intersecting side's copy gets a zero margin:
        // repositioning it in the shader would open a small gap in the
        // geometry.
        let mut intersection_pivot_copy = self.last_vertex(side_id);
        intersection_pivot_copy.attributes.side_label =
            default_exterior_side_label(side_id).with_margin(0.0);
        self.append_vertex_to_mesh(side_id, &intersection_pivot_copy);
        let opposite_copy = self.last_vertex(opposite_id);
        self.append_vertex_to_mesh(opposite_id, &opposite_copy);
        self.left_side.first_simplifiable_index_offset = self.left_side.indices.len() as u32;
        self.right_side.first_simplifiable_index_offset = self.right_side.indices.len() as u32;

        self.side_mut(side_id).intersection = None;
        // An intersecting opposite side has not started retriangulating, but
        // its starting offset must account for the duplicate vertex just
        // appended.
        let opposite_index_count = self.side(opposite_id).indices.len() as u32;
        if let Some(opposite_intersection) = self.side_mut(opposite_id).intersection.as_mut() {
            opposite_intersection.starting_offset = opposite_index_count;
        }
    }

    // ------------------------------------------------------------------
    // Partition-separation undo

    // Handling a non-ccw exterior vertex assumes a stroke that will continue
    // to loop. Later vertices can reveal jittery left-right behavior or a
    // turn in the opposite direction instead, in which case the collapsed,
    // moved partition front must be reconnected to the previous partition.
    fn undo_non_ccw_partition_separation_if_needed(
        &mut self,
        proposed_winding: TriangleWinding,
        side_id: SideId,
        proposed_vertex: &ExtrudedVertex,
    ) {
        if proposed_winding == TriangleWinding::CounterClockwise
            && self.side(side_id).intersection.is_none()
            && self.side(side_id).partition_start.adjacent_first_index_offset > 0
            && !self.side(side_id).partition_start.is_forward_exterior
            && self.partition_was_collapsed_and_moved(side_id)
            && self.proposed_winding_from_last_partition(side_id, proposed_vertex.position)
                == TriangleWinding::CounterClockwise
        {
            self.move_vertices_to_end_of_last_partition(side_id);
            return;
        }

        let opposite_id = side_id.opposite();
        if proposed_winding == TriangleWinding::Clockwise
            && self.side(opposite_id).intersection.is_none()
            && self.side(opposite_id).partition_start.adjacent_first_index_offset > 0
            && !self.side(opposite_id).partition_start.is_forward_exterior
            && self.partition_was_collapsed_and_moved(opposite_id)
            && self.proposed_winding_from_last_partition(opposite_id, proposed_vertex.position)
                == TriangleWinding::Clockwise
        {
            self.move_vertices_to_end_of_last_partition(opposite_id);
        }
    }

    // True if all vertices since the start of the partition share a position
    // that differs from the last position of the previous partition.
    fn partition_was_collapsed_and_moved(&self, side_id: SideId) -> bool {
        let side = self.side(side_id);
        debug_assert!(side.partition_start.adjacent_first_index_offset > 0);

        let first_offset = side.partition_start.adjacent_first_index_offset as usize;
        let last_position = self.last_position(side_id);
        for i in (first_offset + 1..side.indices.len()).rev() {
            if self.mesh.position(side.indices[i - 1]) != last_position {
                return false;
            }
        }

        last_position != self.mesh.position(side.indices[first_offset - 1])
    }

    // The proposed triangle winding when using the last position of the
    // previous partition instead of this side's current last position.
    fn proposed_winding_from_last_partition(
        &self,
        side_id: SideId,
        proposed_position: Point,
    ) -> TriangleWinding {
        let side = self.side(side_id);
        debug_assert!(side.partition_start.adjacent_first_index_offset > 0);

        let first_offset = side.partition_start.adjacent_first_index_offset as usize;
        let mut triangle = Triangle {
            a: self.last_position(side_id.opposite()),
            b: self.mesh.position(side.indices[first_offset - 1]),
            c: proposed_position,
        };
        if side_id == SideId::Left {
            std::mem::swap(&mut triangle.a, &mut triangle.b);
        }
        winding_of(triangle.signed_area())
    }

    fn move_vertices_to_end_of_last_partition(&mut self, side_id: SideId) {
        let side = self.side(side_id);
        debug_assert!(side.partition_start.adjacent_first_index_offset > 0);

        let target_offset = side.partition_start.adjacent_first_index_offset as usize - 1;
        let target = self.mesh.vertex(side.indices[target_offset]);
        let end = side.indices.len();
        self.assign_vertices_in_offset_range(side_id, target_offset + 1, end, &target);
    }

    // True if the opposite side has repositioned the vertex at this side's
    // partition start.
    fn opposite_side_moved_partition_initial_position(&self, side_id: SideId) -> bool {
        let side = self.side(side_id);
        let initial_position = match side.partition_start.opposite_side_initial_position {
            Some(position) => position,
            None => return false,
        };

        let opposite_first_position = self.mesh.position(
            self.side(side_id.opposite()).indices
                [side.partition_start.opposite_first_index_offset as usize],
        );
        if opposite_first_position == initial_position {
            return false;
        }

        let adjacent_first_position = self.mesh.position(
            side.indices[side.partition_start.adjacent_first_index_offset as usize],
        );
        if opposite_first_position == adjacent_first_position {
            // The first opposite vertex moved, but not by the opposite side:
            // the first adjacent and opposite vertices sit on top of each
            // other.
            return false;
        }

        true
    }

    fn disconnect_partition_sides(&mut self, side_id: SideId) {
        let partition_start = &mut self.side_mut(side_id).partition_start;
        partition_start.first_triangle = 0;
        partition_start.opposite_side_initial_position = None;
        partition_start.non_ccw_connection_index = None;
        partition_start.outline_connects_sides = false;
    }
}
