#![deny(bare_trait_objects)]
#![deny(unconditional_recursion)]
#![allow(clippy::many_single_char_names)]

//! Simple 2D geometric primitives on top of euclid.
//!
//! This crate is reexported in [freehand](https://docs.rs/freehand/).
//!
//! It implements the small amount of math that mesh extrusion needs:
//!
//! - line segments, including segment/segment intersections that report the
//!   parameter of the intersection on both segments,
//! - triangles, including signed area and barycentric containment tests.
//!
//! All primitives are generic over the scalar type through the [`Scalar`]
//! trait, with `f32` aliases in the [`math`] module.

// Reexport dependencies.
pub use euclid;

#[cfg(feature = "serialization")]
#[macro_use]
pub extern crate serde;

mod line;
mod triangle;

#[doc(inline)]
pub use crate::line::LineSegment;
#[doc(inline)]
pub use crate::triangle::Triangle;

pub use crate::scalar::Scalar;

mod scalar {
    pub(crate) use euclid::Trig;
    pub(crate) use num_traits::{Float, FloatConst, NumCast};

    use core::fmt::{Debug, Display};
    use core::ops::{AddAssign, DivAssign, MulAssign, SubAssign};

    /// The scalar bound shared by all primitives in this crate.
    pub trait Scalar:
        Float
        + NumCast
        + FloatConst
        + Sized
        + Display
        + Debug
        + Trig
        + AddAssign
        + SubAssign
        + MulAssign
        + DivAssign
    {
        const HALF: Self;
        const ZERO: Self;
        const ONE: Self;
        const TWO: Self;

        const EPSILON: Self;

        fn value(v: f32) -> Self;
    }

    impl Scalar for f32 {
        const HALF: Self = 0.5;
        const ZERO: Self = 0.0;
        const ONE: Self = 1.0;
        const TWO: Self = 2.0;

        const EPSILON: Self = 1e-4;

        #[inline]
        fn value(v: f32) -> Self {
            v
        }
    }

    impl Scalar for f64 {
        const HALF: Self = 0.5;
        const ZERO: Self = 0.0;
        const ONE: Self = 1.0;
        const TWO: Self = 2.0;

        const EPSILON: Self = 1e-8;

        #[inline]
        fn value(v: f32) -> Self {
            v as f64
        }
    }
}

/// Alias for `euclid::default::Point2D`.
pub type Point<S> = euclid::default::Point2D<S>;

/// Alias for `euclid::default::Vector2D`.
pub type Vector<S> = euclid::default::Vector2D<S>;

/// Alias for `euclid::default::Box2D`.
pub type Box2D<S> = euclid::default::Box2D<S>;

/// Shorthand for `Point::new`.
#[inline]
pub fn point<S>(x: S, y: S) -> Point<S> {
    Point::new(x, y)
}

/// Shorthand for `Vector::new`.
#[inline]
pub fn vector<S>(x: S, y: S) -> Vector<S> {
    Vector::new(x, y)
}

/// `f32` aliases of the generic primitives.
///
/// The extruder does all of its work in `f32`, like the rest of the 2D
/// rendering stack.
pub mod math {
    /// A 2D point in stroke coordinates.
    pub type Point = super::Point<f32>;
    /// A 2D vector in stroke coordinates.
    pub type Vector = super::Vector<f32>;
    /// An axis-aligned rectangle in stroke coordinates.
    pub type Box2D = super::Box2D<f32>;
    /// A line segment in stroke coordinates.
    pub type LineSegment = super::LineSegment<f32>;
    /// A triangle in stroke coordinates.
    pub type Triangle = super::Triangle<f32>;

    pub use super::{point, vector};
}
