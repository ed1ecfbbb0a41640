use crate::scalar::Scalar;
use crate::{LineSegment, Point};

/// A 2D triangle defined by three points `a`, `b` and `c`.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct Triangle<S> {
    pub a: Point<S>,
    pub b: Point<S>,
    pub c: Point<S>,
}

impl<S: Scalar> Triangle<S> {
    /// Computes the barycentric coordinates of `point` relative to this
    /// triangle.
    ///
    /// The coordinates are not meaningful if the triangle is degenerate.
    #[inline]
    pub fn barycentric_coords_for_point(&self, point: Point<S>) -> (S, S, S) {
        let v0 = self.b - self.a;
        let v1 = self.c - self.a;
        let v2 = point - self.a;
        let inv = S::ONE / v0.cross(v1);
        let a = v0.cross(v2) * inv;
        let b = v2.cross(v1) * inv;
        let c = S::ONE - a - b;

        (c, b, a)
    }

    /// Returns true if `point` lies inside this triangle or on its boundary.
    ///
    /// Always false for degenerate triangles.
    pub fn contains_point(&self, point: Point<S>) -> bool {
        let area = (self.b - self.a).cross(self.c - self.a);
        if area == S::ZERO {
            return false;
        }
        let sign = S::signum(area);
        let e0 = (self.b - self.a).cross(point - self.a) * sign;
        let e1 = (self.c - self.b).cross(point - self.b) * sign;
        let e2 = (self.a - self.c).cross(point - self.c) * sign;

        e0 >= S::ZERO && e1 >= S::ZERO && e2 >= S::ZERO
    }

    /// Computes the signed area of this triangle.
    ///
    /// The area is positive when the points `a`, `b`, `c` wind
    /// counter-clockwise in a y-up coordinate system.
    #[inline]
    pub fn signed_area(&self) -> S {
        (self.b - self.a).cross(self.c - self.a) * S::HALF
    }

    /// Returns the edge starting at the `i`-th point, in the order
    /// `ab`, `bc`, `ca`.
    #[inline]
    pub fn edge(&self, i: usize) -> LineSegment<S> {
        match i {
            0 => LineSegment {
                from: self.a,
                to: self.b,
            },
            1 => LineSegment {
                from: self.b,
                to: self.c,
            },
            2 => LineSegment {
                from: self.c,
                to: self.a,
            },
            _ => panic!("triangle edge index out of range: {}", i),
        }
    }
}

#[cfg(test)]
use crate::point;

#[test]
fn test_contains() {
    let t = Triangle {
        a: point(0.0f32, 0.0),
        b: point(4.0, 0.0),
        c: point(0.0, 4.0),
    };

    assert!(t.contains_point(point(1.0, 1.0)));
    assert!(!t.contains_point(point(3.0, 3.0)));
    // The boundary is inclusive.
    assert!(t.contains_point(point(2.0, 0.0)));
    assert!(t.contains_point(point(0.0, 0.0)));

    // Clockwise winding is accepted too.
    let cw = Triangle {
        a: t.a,
        b: t.c,
        c: t.b,
    };
    assert!(cw.contains_point(point(1.0, 1.0)));
    assert!(!cw.contains_point(point(3.0, 3.0)));

    // Degenerate triangles contain nothing.
    let degenerate = Triangle {
        a: point(0.0f32, 0.0),
        b: point(2.0, 0.0),
        c: point(4.0, 0.0),
    };
    assert!(!degenerate.contains_point(point(1.0, 0.0)));
}

#[test]
fn test_signed_area() {
    let t = Triangle {
        a: point(0.0f32, 0.0),
        b: point(2.0, 0.0),
        c: point(0.0, 2.0),
    };
    assert_eq!(t.signed_area(), 2.0);

    let cw = Triangle {
        a: t.a,
        b: t.c,
        c: t.b,
    };
    assert_eq!(cw.signed_area(), -2.0);
}

#[test]
fn test_barycentric() {
    let t = Triangle {
        a: point(0.0f32, 0.0),
        b: point(4.0, 0.0),
        c: point(0.0, 4.0),
    };

    let (wa, wb, wc) = t.barycentric_coords_for_point(point(0.0, 0.0));
    assert!((wa - 1.0).abs() < 1e-6);
    assert!(wb.abs() < 1e-6);
    assert!(wc.abs() < 1e-6);

    let (wa, wb, wc) = t.barycentric_coords_for_point(point(2.0, 2.0));
    assert!(wa.abs() < 1e-6);
    assert!((wb - 0.5).abs() < 1e-6);
    assert!((wc - 0.5).abs() < 1e-6);
}
