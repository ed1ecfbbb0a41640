use crate::scalar::Scalar;
use crate::{point, Point, Vector};

/// A linear segment.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct LineSegment<S> {
    pub from: Point<S>,
    pub to: Point<S>,
}

impl<S: Scalar> LineSegment<S> {
    /// Sample the segment at t (expecting t between 0 and 1).
    #[inline]
    pub fn sample(&self, t: S) -> Point<S> {
        self.from.lerp(self.to, t)
    }

    #[inline]
    pub fn to_vector(&self) -> Vector<S> {
        self.to - self.from
    }

    /// Computes the length of this segment.
    #[inline]
    pub fn length(&self) -> S {
        self.to_vector().length()
    }

    /// Computes the squared length of this segment.
    #[inline]
    pub fn square_length(&self) -> S {
        self.to_vector().square_length()
    }

    #[inline]
    pub fn is_degenerate(&self) -> bool {
        self.from == self.to
    }

    /// Computes the closest point on this segment to `p`.
    #[inline]
    pub fn closest_point(&self, p: Point<S>) -> Point<S> {
        let v1 = self.to - self.from;
        let v2 = p - self.from;
        let denom = v1.dot(v1);
        if denom == S::ZERO {
            return self.from;
        }
        let t = S::min(S::max(v2.dot(v1) / denom, S::ZERO), S::ONE);

        self.from + v1 * t
    }

    /// Computes the squared distance between this segment and a point.
    ///
    /// Can be useful to save a square root and a division when comparing
    /// against a distance that can be squared.
    #[inline]
    pub fn square_distance_to_point(&self, p: Point<S>) -> S {
        (self.closest_point(p) - p).square_length()
    }

    /// Computes the distance between this segment and a point.
    #[inline]
    pub fn distance_to_point(&self, p: Point<S>) -> S {
        self.square_distance_to_point(p).sqrt()
    }

    /// Computes the intersection (if any) between this segment and another
    /// one, including intersections at the segments' endpoints.
    ///
    /// The result is provided in the form of the `t` parameter of each
    /// segment. To get the intersection point, sample one of the segments at
    /// the corresponding value.
    ///
    /// Collinear overlapping segments intersect over an interval; the returned
    /// parameters point at the earliest overlapping point along `self`.
    /// A degenerate segment intersects wherever its single point lies exactly
    /// on the other segment.
    pub fn intersection_t(&self, other: &Self) -> Option<(S, S)> {
        if self.is_degenerate() {
            if other.is_degenerate() {
                return if self.from == other.from {
                    Some((S::ZERO, S::ZERO))
                } else {
                    None
                };
            }
            return point_on_segment_t(self.from, other).map(|u| (S::ZERO, u));
        }
        if other.is_degenerate() {
            return point_on_segment_t(other.from, self).map(|t| (t, S::ZERO));
        }

        let v1 = self.to_vector();
        let v2 = other.to_vector();

        let v1_cross_v2 = v1.cross(v2);
        let v3 = other.from - self.from;

        if v1_cross_v2 == S::ZERO {
            // The segments are parallel. They only intersect if they are also
            // collinear, in which case the intersection is the earliest point
            // of the overlapping interval.
            if v3.cross(v1) != S::ZERO {
                return None;
            }

            let inv_len = S::ONE / v1.dot(v1);
            let t0 = v3.dot(v1) * inv_len;
            let t1 = (other.to - self.from).dot(v1) * inv_len;
            let start = S::max(S::ZERO, S::min(t0, t1));
            let end = S::min(S::ONE, S::max(t0, t1));
            if start > end {
                return None;
            }

            let position = self.sample(start);
            let u = S::min(
                S::max((position - other.from).dot(v2) / v2.dot(v2), S::ZERO),
                S::ONE,
            );
            return Some((start, u));
        }

        let sign_v1_cross_v2 = S::signum(v1_cross_v2);
        let abs_v1_cross_v2 = S::abs(v1_cross_v2);

        // t and u should be divided by v1_cross_v2, but we postpone that to not
        // lose precision. We have to respect the sign of v1_cross_v2 (and
        // therefore t and u) so we apply it now and will use the absolute value
        // of v1_cross_v2 afterwards.
        let t = v3.cross(v2) * sign_v1_cross_v2;
        let u = v3.cross(v1) * sign_v1_cross_v2;

        if t < S::ZERO || t > abs_v1_cross_v2 || u < S::ZERO || u > abs_v1_cross_v2 {
            return None;
        }

        Some((t / abs_v1_cross_v2, u / abs_v1_cross_v2))
    }

    #[inline]
    pub fn intersection(&self, other: &Self) -> Option<Point<S>> {
        self.intersection_t(other).map(|(t, _)| self.sample(t))
    }

    #[inline]
    pub fn intersects(&self, other: &Self) -> bool {
        self.intersection_t(other).is_some()
    }

    #[inline]
    pub fn to_f32(&self) -> LineSegment<f32> {
        LineSegment {
            from: self.from.to_f32(),
            to: self.to.to_f32(),
        }
    }
}

/// Returns the parameter of `p` along `segment` if `p` lies exactly on it.
fn point_on_segment_t<S: Scalar>(p: Point<S>, segment: &LineSegment<S>) -> Option<S> {
    let v = segment.to_vector();
    let w = p - segment.from;
    if w.cross(v) != S::ZERO {
        return None;
    }
    let t = w.dot(v) / v.dot(v);
    if t < S::ZERO || t > S::ONE {
        return None;
    }

    Some(t)
}

#[cfg(test)]
fn fuzzy_eq_f32(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-6
}

#[test]
fn intersection_rotated() {
    use std::f32::consts::PI;
    let epsilon = 0.0001;
    let count: u32 = 100;

    for i in 0..count {
        for j in 0..count {
            if i % (count / 2) == j % (count / 2) {
                // Avoid the colinear case.
                continue;
            }

            let angle1 = i as f32 / (count as f32) * 2.0 * PI;
            let angle2 = j as f32 / (count as f32) * 2.0 * PI;

            let center = point(10.0, 3.0);

            let l1 = LineSegment {
                from: center + vector_from_angle(angle1) * 100.0,
                to: center + vector_from_angle(angle1) * -100.0,
            };

            let l2 = LineSegment {
                from: center + vector_from_angle(angle2) * 100.0,
                to: center + vector_from_angle(angle2) * -100.0,
            };

            let intersection = l1.intersection(&l2).unwrap();
            assert!((intersection.x - center.x).abs() < epsilon);
            assert!((intersection.y - center.y).abs() < epsilon);
        }
    }

    fn vector_from_angle(angle: f32) -> Vector<f32> {
        crate::vector(angle.cos(), angle.sin())
    }
}

#[test]
fn intersection_touching() {
    let l1 = LineSegment {
        from: point(0.0f32, 0.0),
        to: point(10.0, 6.0),
    };

    let l2 = LineSegment {
        from: point(10.0, 6.0),
        to: point(5.0, 0.0),
    };

    // Segments sharing an endpoint intersect at that endpoint.
    let (t, u) = l1.intersection_t(&l2).unwrap();
    assert!(fuzzy_eq_f32(t, 1.0));
    assert!(fuzzy_eq_f32(u, 0.0));
}

#[test]
fn intersection_overlap() {
    let l1 = LineSegment {
        from: point(0.0f32, 0.0),
        to: point(10.0, 0.0),
    };

    let l2 = LineSegment {
        from: point(5.0, 0.0),
        to: point(15.0, 0.0),
    };

    // The overlap covers t in [0.5, 1]; the earliest point wins.
    let (t, u) = l1.intersection_t(&l2).unwrap();
    assert!(fuzzy_eq_f32(t, 0.5));
    assert!(fuzzy_eq_f32(u, 0.0));

    let l3 = LineSegment {
        from: point(11.0, 0.0),
        to: point(15.0, 0.0),
    };
    assert!(l1.intersection_t(&l3).is_none());
}

#[test]
fn intersection_degenerate() {
    let l1 = LineSegment {
        from: point(4.0f32, 0.0),
        to: point(4.0, 0.0),
    };

    let l2 = LineSegment {
        from: point(0.0, 0.0),
        to: point(8.0, 0.0),
    };

    let (t, u) = l1.intersection_t(&l2).unwrap();
    assert!(fuzzy_eq_f32(t, 0.0));
    assert!(fuzzy_eq_f32(u, 0.5));

    let off_segment = LineSegment {
        from: point(4.0, 1.0),
        to: point(4.0, 1.0),
    };
    assert!(off_segment.intersection_t(&l2).is_none());
}

#[test]
fn distance_to_point() {
    let l = LineSegment {
        from: point(0.0f32, 0.0),
        to: point(10.0, 0.0),
    };

    assert!(fuzzy_eq_f32(l.distance_to_point(point(5.0, 3.0)), 3.0));
    assert!(fuzzy_eq_f32(l.distance_to_point(point(-4.0, 3.0)), 5.0));
    assert!(fuzzy_eq_f32(l.distance_to_point(point(7.0, 0.0)), 0.0));
}
