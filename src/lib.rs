//! Incremental triangle-strip mesh extrusion for freehand strokes.
//!
//! A freehand stroke is rendered as a ribbon of variable width traced along a
//! sequence of input samples. This crate builds the triangle mesh for such a
//! ribbon incrementally: outline vertices computed from brush-tip states are
//! appended to the left and right sides of the stroke and triangulated as the
//! stroke advances, with on-the-fly simplification, self-intersection repair,
//! and rollback support for predicted (not yet committed) stroke segments.
//!
//! This crate is a facade that reexports the actual functionality:
//!
//! - [`extruder`] - The extruder core: the [`Geometry`](extruder::Geometry)
//!   engine, the mesh view, and the derivative calculator.
//! - [`geom`] - 2D geometric primitives the extruder is built on, on top of
//!   [euclid](https://docs.rs/euclid/).

pub use freehand_extruder as extruder;
pub use freehand_geom as geom;

pub use crate::extruder::{Geometry, MutableMeshView, TipState};
