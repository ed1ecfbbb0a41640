//! Scratch math shared by the extruder modules.

pub use crate::geom::math::{point, vector, Box2D, LineSegment, Point, Triangle, Vector};

/// The index type used for both vertices and triangles in the extruded mesh.
pub type IndexType = u32;

/// Distance between two points.
#[inline]
pub fn distance_between(a: Point, b: Point) -> f32 {
    (a - b).length()
}

/// A growable bounding rectangle.
///
/// Starts out empty; adding points or other envelopes expands it.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct Envelope {
    bounds: Option<Box2D>,
}

impl Envelope {
    pub fn new() -> Self {
        Envelope { bounds: None }
    }

    pub fn from_point(position: Point) -> Self {
        Envelope {
            bounds: Some(Box2D {
                min: position,
                max: position,
            }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bounds.is_none()
    }

    /// The accumulated bounds, or `None` if nothing has been added.
    pub fn bounds(&self) -> Option<&Box2D> {
        self.bounds.as_ref()
    }

    pub fn reset(&mut self) {
        self.bounds = None;
    }

    pub fn add_point(&mut self, position: Point) {
        match &mut self.bounds {
            Some(bounds) => {
                bounds.min.x = bounds.min.x.min(position.x);
                bounds.min.y = bounds.min.y.min(position.y);
                bounds.max.x = bounds.max.x.max(position.x);
                bounds.max.y = bounds.max.y.max(position.y);
            }
            None => {
                self.bounds = Some(Box2D {
                    min: position,
                    max: position,
                });
            }
        }
    }

    pub fn add(&mut self, other: &Envelope) {
        if let Some(bounds) = &other.bounds {
            self.add_point(bounds.min);
            self.add_point(bounds.max);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_accumulates() {
        let mut envelope = Envelope::new();
        assert!(envelope.is_empty());

        envelope.add_point(point(1.0, 2.0));
        envelope.add_point(point(-3.0, 0.5));

        let bounds = envelope.bounds().unwrap();
        assert_eq!(bounds.min, point(-3.0, 0.5));
        assert_eq!(bounds.max, point(1.0, 2.0));

        let mut other = Envelope::from_point(point(5.0, -1.0));
        other.add_point(point(6.0, 4.0));
        envelope.add(&other);

        let bounds = envelope.bounds().unwrap();
        assert_eq!(bounds.min, point(-3.0, -1.0));
        assert_eq!(bounds.max, point(6.0, 4.0));

        envelope.reset();
        assert!(envelope.is_empty());
    }
}
