//! Per-side state of the extruded stroke.

use crate::math::{IndexType, Point};
use crate::vertex::ExtrudedVertex;

/// Identifies to which side of the geometry something belongs.
///
/// "Left" and "right" are defined at each section of the stroke when viewed
/// from the positive z-axis in the direction of travel.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub enum SideId {
    Left,
    Right,
}

impl SideId {
    /// Returns the other side.
    #[inline]
    pub fn opposite(self) -> SideId {
        match self {
            SideId::Left => SideId::Right,
            SideId::Right => SideId::Left,
        }
    }
}

/// State of an in-progress repair of the stroke outline crossing itself.
#[derive(Clone, Debug, PartialEq)]
pub struct SelfIntersection {
    /// The position after which the intersection began.
    pub starting_position: Point,
    /// The last vertex we tried to append in this self-intersection handling.
    pub last_proposed_vertex: ExtrudedVertex,
    /// Index of the mesh triangle that contained `last_proposed_vertex`.
    pub last_proposed_vertex_triangle: u32,
    /// Offset into `Side::indices` at which to find the index corresponding to
    /// the start of this intersection.
    pub starting_offset: u32,
    /// True if the intersection has begun modifying previously appended mesh
    /// triangles.
    pub retriangulation_started: bool,
    /// The newest triangle that should be put into the undo stack. Not every
    /// triangle goes into the stack, since retriangulation can be delayed.
    pub undo_stack_starting_triangle: u32,
    /// Once retriangulation has started, the index of the oldest mesh triangle
    /// that has been modified.
    pub oldest_retriangulation_triangle: u32,
    /// Triangle indices that were written over by retriangulation. Since
    /// retriangulation travels backwards, the newest triangles are at the
    /// bottom of the stack and the oldest are at the top.
    pub undo_triangulation_stack: Vec<[IndexType; 3]>,
    /// The maximum remaining distance that vertices in the outline may be
    /// moved while handling this intersection.
    pub outline_reposition_budget: f32,
    /// The reposition budget when the intersection began. Note that
    /// `outline_reposition_budget` will initially become larger than this
    /// value when retriangulation starts.
    pub initial_outline_reposition_budget: f32,
    /// The maximum distance that proposed intersection vertices are allowed to
    /// travel from `starting_position`.
    pub travel_limit_from_starting_position: f32,
}

/// The start of the current logical partition of the mesh, used for searching
/// mesh triangles and constructing partial outlines during intersection
/// handling.
#[derive(Clone, Debug, PartialEq)]
pub struct MeshPartitionStart {
    /// Offset into this side's `indices` for the first index that is part of
    /// the partition's outline.
    pub adjacent_first_index_offset: u32,
    /// Offset into the opposite side's `indices` for the first index that is
    /// part of the partition's outline.
    pub opposite_first_index_offset: u32,
    /// The first triangle in the mesh that is considered part of this
    /// partition.
    pub first_triangle: u32,
    /// If set, the position of the vertex at `opposite_first_index_offset` at
    /// the time this partition was created.
    pub opposite_side_initial_position: Option<Point>,
    /// If set, an index for a helper vertex that may be used when handling
    /// non-ccw proposed triangles that extend to the beginning of this
    /// partition.
    pub non_ccw_connection_index: Option<IndexType>,
    /// Whether the partition's outline connects the first adjacent and
    /// opposite vertices.
    pub outline_connects_sides: bool,
    /// Whether this partition's starting position lies on the exterior of the
    /// stroke geometry with respect to the forward direction.
    pub is_forward_exterior: bool,
}

impl Default for MeshPartitionStart {
    fn default() -> Self {
        MeshPartitionStart {
            adjacent_first_index_offset: 0,
            opposite_first_index_offset: 0,
            first_triangle: 0,
            opposite_side_initial_position: None,
            non_ccw_connection_index: None,
            outline_connects_sides: true,
            is_forward_exterior: true,
        }
    }
}

/// A range of a side's indices, given by offsets into `Side::indices`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct IndexOffsetRange {
    pub first: u32,
    pub last: u32,
}

/// Offset ranges on both sides of the stroke.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct IndexOffsetRanges {
    pub left: IndexOffsetRange,
    pub right: IndexOffsetRange,
}

/// The state of the left or right side of the stroke.
#[derive(Clone, Debug)]
pub struct Side {
    pub self_id: SideId,
    /// Given the three indices of a left-right conforming triangle, the
    /// position of the first index belonging to this side: 0 for the left
    /// side and 1 for the right side.
    pub first_triangle_vertex: usize,
    /// Indices into the mesh for the vertices that make up this side of the
    /// stroke, ordered from the start of the stroke to the end.
    pub indices: Vec<IndexType>,
    /// Ranges of offsets into `indices` that represent discontinuities from
    /// giving up intersection handling. Indices within each range are
    /// permanently part of triangles whose vertices all belong to this side;
    /// only the first and last index of each range connect to the opposite
    /// side.
    pub intersection_discontinuities: Vec<IndexOffsetRange>,
    pub partition_start: MeshPartitionStart,
    /// Offset into `indices` for the first index whose vertex may be removed
    /// by the simplification algorithm.
    pub first_simplifiable_index_offset: u32,
    /// Vertices that still need to be processed. Up to two vertices that are
    /// already in the mesh stay at the front of the buffer, because the
    /// simplification algorithm may reconsider them.
    pub vertex_buffer: Vec<ExtrudedVertex>,
    /// Offset into `vertex_buffer` for the next vertex to triangulate.
    pub next_buffered_vertex_offset: u32,
    pub intersection: Option<SelfIntersection>,
    /// Positions of consecutive vertices removed by simplification that
    /// immediately precede this side's most recent mesh vertex.
    ///
    /// Used to double-check that previously dropped vertices do not become
    /// relevant again if the next vertex is also dropped: vertex 1 can be
    /// close to segment 0-2 and vertex 2 close to segment 0-3, while some
    /// vertex in between ends up too far from segment 0-n.
    pub last_simplified_vertex_positions: Vec<Point>,
}

impl Side {
    pub fn new(self_id: SideId) -> Self {
        Side {
            self_id,
            first_triangle_vertex: match self_id {
                SideId::Left => 0,
                SideId::Right => 1,
            },
            indices: Vec::new(),
            intersection_discontinuities: Vec::new(),
            partition_start: MeshPartitionStart::default(),
            first_simplifiable_index_offset: 0,
            vertex_buffer: Vec::new(),
            next_buffered_vertex_offset: 0,
            intersection: None,
            last_simplified_vertex_positions: Vec::new(),
        }
    }

    /// Resets this side for a new stroke, keeping allocations.
    pub fn clear(&mut self) {
        self.indices.clear();
        self.intersection_discontinuities.clear();
        self.partition_start = MeshPartitionStart::default();
        self.first_simplifiable_index_offset = 0;
        self.vertex_buffer.clear();
        self.next_buffered_vertex_offset = 0;
        self.intersection = None;
        self.last_simplified_vertex_positions.clear();
    }

    /// True if this side is undergoing an intersection that has started
    /// modifying existing triangles.
    #[inline]
    pub fn is_retriangulating(&self) -> bool {
        self.intersection
            .as_ref()
            .map_or(false, |intersection| intersection.retriangulation_started)
    }
}
