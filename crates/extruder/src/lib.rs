#![deny(bare_trait_objects)]
#![deny(unconditional_recursion)]
#![allow(clippy::float_cmp)]
#![allow(clippy::too_many_arguments)]

//! Incremental extrusion of freehand stroke geometry.
//!
//! This crate is reexported in [freehand](https://docs.rs/freehand/).
//!
//! ## Overview
//!
//! A freehand stroke is a ribbon of variable width traced along a sequence of
//! modeled input samples. An external tip modeler turns those samples into
//! brush-tip states, and an outline generator derives one pair of outline
//! vertices (left, right) per tip state edge. This crate turns that stream of
//! outline vertices into an indexed triangle mesh, incrementally:
//!
//! - [`Geometry`] buffers appended left/right vertices and triangulates them
//!   pair by pair, taking a fast path when the new triangle winds
//!   counter-clockwise and falling back to self-intersection handling when the
//!   stroke turns sharply enough to cross itself.
//! - [`MutableMeshView`] is the uniform read/write interface over the mesh's
//!   vertex and triangle-index storage, with mutation tracking used to compute
//!   minimal redraw regions.
//! - [`DerivativeCalculator`] rewrites per-vertex derivative and label
//!   attributes that the renderer uses for anti-aliasing.
//!
//! The engine supports interactive prediction: [`Geometry::set_save_point`]
//! snapshots the state, [`Geometry::revert_to_save_point`] rolls back to it,
//! and [`Geometry::clear_since_last_extrusion_break`] deletes the geometry of
//! the current partition, all restoring previously overwritten vertices and
//! triangles exactly.

pub use freehand_geom as geom;

#[cfg(feature = "serialization")]
#[macro_use]
extern crate serde;

mod derivative;
mod geometry;
mod math;
mod mesh_view;
mod outline;
mod side;
mod simplify;
mod vertex;
mod winding;

#[cfg(test)]
mod fuzz_tests;
#[cfg(test)]
mod geometry_tests;

#[doc(inline)]
pub use crate::derivative::{
    find_first_exterior_vertices, starting_offset_for_coincident_connected_vertices,
    DerivativeCalculator, OptionalSideIndexPair,
};
#[doc(inline)]
pub use crate::geometry::{
    winding_texture_uv_sentinel, Geometry, IndexCounts, IntersectionHandling, TextureCoordType,
};
#[doc(inline)]
pub use crate::math::{Envelope, IndexType, Point, Vector};
#[doc(inline)]
pub use crate::mesh_view::MutableMeshView;
#[doc(inline)]
pub use crate::outline::{
    construct_partial_outline, find_outline_intersection, last_outline_index_offset,
    DirectedPartialOutline, OutlineIntersectionResult, SegmentIntersection,
};
#[doc(inline)]
pub use crate::side::{
    IndexOffsetRange, IndexOffsetRanges, MeshPartitionStart, SelfIntersection, Side, SideId,
};
#[doc(inline)]
pub use crate::simplify::simplify_polyline;
#[doc(inline)]
pub use crate::vertex::{
    barycentric_lerp, ExtrudedVertex, ForwardCategory, Label, NonPositionAttributes, SideCategory,
};
#[doc(inline)]
pub use crate::winding::{find_last_clockwise_fan_segment, find_last_clockwise_multi_fan_segment};

use crate::geom::math::point;
use crate::geom::euclid::Angle;

/// A point in the time-parameterized brush-tip configuration from which one
/// pair of outline vertices is derived.
///
/// Tip states are produced by an external tip modeler; the extruder only reads
/// the dimensions of the most recent state to derive its working budgets (see
/// [`Geometry::process_new_vertices`]).
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct TipState {
    /// The position of the tip's center in stroke coordinates.
    pub position: Point,
    /// The width of the tip shape.
    pub width: f32,
    /// The height of the tip shape.
    pub height: f32,
    /// Normalized corner rounding of the tip shape in [0, 1], where 0 is a
    /// rectangle and 1 is an ellipse.
    pub corner_rounding: f32,
    /// Rotation of the tip shape about its center.
    pub rotation: Angle<f32>,
    /// Slant applied to the tip shape.
    pub slant: Angle<f32>,
    /// Normalized pinch of the tip shape in [0, 1].
    pub pinch: f32,
    /// Opacity shift carried to the generated vertices.
    pub opacity_shift: f32,
    /// Hue, saturation and luminosity shifts carried to the generated
    /// vertices.
    pub hsl_shift: [f32; 3],
    /// True if this state is an isolated particle rather than part of a
    /// connected extrusion.
    pub is_particle: bool,
}

impl TipState {
    /// The average of the tip's width and height, which the extruder uses as
    /// its approximate stroke width when deriving budgets.
    #[inline]
    pub fn average_dimension(&self) -> f32 {
        0.5 * (self.width + self.height)
    }
}

impl Default for TipState {
    fn default() -> Self {
        TipState {
            position: point(0.0, 0.0),
            width: 1.0,
            height: 1.0,
            corner_rounding: 1.0,
            rotation: Angle::zero(),
            slant: Angle::zero(),
            pinch: 0.0,
            opacity_shift: 0.0,
            hsl_shift: [0.0, 0.0, 0.0],
            is_particle: false,
        }
    }
}
