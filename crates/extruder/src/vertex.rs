//! The vertex type written into extruded meshes, and the label encoding the
//! renderer uses for anti-aliasing.

use crate::math::{point, vector, Point, Triangle, Vector};

/// Classifier of a vertex's placement across the width of the stroke.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SideCategory {
    ExteriorLeft,
    Interior,
    ExteriorRight,
}

/// Classifier of a vertex's placement along the direction of travel.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ForwardCategory {
    ExteriorFront,
    Interior,
    ExteriorBack,
}

/// An encoded label for the vertex, to be consumed in shader code.
///
/// Each label stores either a [`SideCategory`] or a [`ForwardCategory`] in its
/// sign and a "margin" in its magnitude, in a signed-magnitude 8-bit encoding.
///
/// In order to perform anti-aliasing in the shader without visibly shrinking
/// the stroke, vertex positions are outset by roughly half a pixel during
/// rendering, along the derivative attribute associated with the label. If
/// every vertex were allowed to move by the full target outset, two adjacent
/// vertices along a concave part of the stroke could move past one another and
/// introduce extra self-overlap in partially transparent strokes. The margin
/// bounds the reposition distance, in units of the derivative magnitude, to
/// prevent this.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct Label {
    pub encoded: i8,
}

impl Label {
    /// The maximum margin value that can be encoded without clipping, in
    /// multiples of the approximate stroke width.
    pub const MAXIMUM_MARGIN: f32 = 4.0;

    /// The label carried by every interior vertex.
    pub const INTERIOR: Label = Label { encoded: 0 };
    /// Exterior labels carry the largest encodable margin.
    pub const EXTERIOR_LEFT: Label = Label { encoded: -127 };
    pub const EXTERIOR_RIGHT: Label = Label { encoded: 127 };
    pub const EXTERIOR_FRONT: Label = Label { encoded: -127 };
    pub const EXTERIOR_BACK: Label = Label { encoded: 127 };

    /// Returns a label with the same category, encoded with a replacement
    /// value for `margin`.
    ///
    /// The encoding is lossy: the margin is clipped to
    /// `[0, Self::MAXIMUM_MARGIN]` and rounded to the nearest of 127 steps.
    /// Interior labels have no margin and are returned unchanged.
    pub fn with_margin(self, margin: f32) -> Label {
        if self.encoded == 0 {
            return self;
        }
        let clipped = margin.max(0.0).min(Self::MAXIMUM_MARGIN);
        let magnitude = (clipped / Self::MAXIMUM_MARGIN * 127.0).round() as i8;
        Label {
            encoded: if self.encoded < 0 { -magnitude } else { magnitude },
        }
    }

    /// Decodes the margin, in multiples of the approximate stroke width.
    #[inline]
    pub fn decode_margin(self) -> f32 {
        (self.encoded as f32).abs() / 127.0 * Self::MAXIMUM_MARGIN
    }

    #[inline]
    pub fn decode_side_category(self) -> SideCategory {
        if self.encoded < 0 {
            SideCategory::ExteriorLeft
        } else if self.encoded == 0 {
            SideCategory::Interior
        } else {
            SideCategory::ExteriorRight
        }
    }

    #[inline]
    pub fn decode_forward_category(self) -> ForwardCategory {
        if self.encoded < 0 {
            ForwardCategory::ExteriorFront
        } else if self.encoded == 0 {
            ForwardCategory::Interior
        } else {
            ForwardCategory::ExteriorBack
        }
    }

    /// Returns the sign (-1, 0, or 1) by which the derivative associated with
    /// this label should be multiplied so that it points toward the stroke
    /// exterior.
    ///
    /// For example, this returns -1 for the side label of a vertex on the left
    /// exterior, because side derivatives point left-to-right.
    #[inline]
    pub fn derivative_outset_sign(self) -> f32 {
        if self.encoded > 0 {
            1.0
        } else if self.encoded < 0 {
            -1.0
        } else {
            0.0
        }
    }
}

/// All vertex attributes other than the position.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct NonPositionAttributes {
    /// Value used by a renderer to shift the per-vertex opacity, usually in
    /// [-1, 1] although extrapolation may produce values outside that range.
    pub opacity_shift: f32,
    /// Per-vertex hue, saturation and luminosity shifts, usually in [-1, 1].
    pub hsl_shift: [f32; 3],
    /// Approximate derivative of position with respect to the barycentric
    /// coordinate that points across the width of the stroke in triangles that
    /// include this vertex.
    pub side_derivative: Vector,
    /// Vertex label used together with `side_derivative`.
    pub side_label: Label,
    /// Approximate derivative of position with respect to the barycentric
    /// coordinate that points in the direction of stroke travel in triangles
    /// that include this vertex.
    pub forward_derivative: Vector,
    /// Vertex label used together with `forward_derivative`.
    pub forward_label: Label,
    /// Texture UV coordinates for winding textures. A fan pivot in winding
    /// mode carries the sentinel value (0, -1).
    pub surface_uv: Point,
    /// Offset for texture animation progress, in the range [0, 1).
    pub animation_offset: f32,
}

impl Default for NonPositionAttributes {
    fn default() -> Self {
        NonPositionAttributes {
            opacity_shift: 0.0,
            hsl_shift: [0.0, 0.0, 0.0],
            side_derivative: vector(0.0, 0.0),
            side_label: Label::INTERIOR,
            forward_derivative: vector(0.0, 0.0),
            forward_label: Label::INTERIOR,
            surface_uv: point(0.0, 0.0),
            animation_offset: 0.0,
        }
    }
}

/// Vertex type used for building stroke meshes.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct ExtrudedVertex {
    pub position: Point,
    pub attributes: NonPositionAttributes,
}

impl Default for ExtrudedVertex {
    fn default() -> Self {
        ExtrudedVertex {
            position: point(0.0, 0.0),
            attributes: NonPositionAttributes::default(),
        }
    }
}

fn lerp_label(a: Label, b: Label, t: f32) -> Label {
    if t <= 0.0 {
        a
    } else if t >= 1.0 {
        b
    } else if a == b {
        a
    } else {
        Label::INTERIOR
    }
}

fn lerp_f32(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

impl ExtrudedVertex {
    /// Computes the linear interpolation between `self` and `other` when `t`
    /// is in [0, 1], and the linear extrapolation otherwise.
    ///
    /// Behavior for the different kinds of attributes:
    ///
    /// - Derivatives come back zeroed: they must be recalculated for any new
    ///   or repositioned vertex.
    /// - Each label is the value on `self` if `t <= 0`, the value on `other`
    ///   if `t >= 1`, either value if they are equal, and interior otherwise.
    /// - The animation offset is taken from `self`; it does not vary within a
    ///   single extrusion.
    pub fn lerp(&self, other: &ExtrudedVertex, t: f32) -> ExtrudedVertex {
        let a = &self.attributes;
        let b = &other.attributes;
        ExtrudedVertex {
            position: self.position.lerp(other.position, t),
            attributes: NonPositionAttributes {
                opacity_shift: lerp_f32(a.opacity_shift, b.opacity_shift, t),
                hsl_shift: [
                    lerp_f32(a.hsl_shift[0], b.hsl_shift[0], t),
                    lerp_f32(a.hsl_shift[1], b.hsl_shift[1], t),
                    lerp_f32(a.hsl_shift[2], b.hsl_shift[2], t),
                ],
                side_derivative: vector(0.0, 0.0),
                side_label: lerp_label(a.side_label, b.side_label, t),
                forward_derivative: vector(0.0, 0.0),
                forward_label: lerp_label(a.forward_label, b.forward_label, t),
                surface_uv: a.surface_uv.lerp(b.surface_uv, t),
                animation_offset: a.animation_offset,
            },
        }
    }
}

/// Computes the vertex that would have the given `position` using the
/// barycentric coordinates of the point relative to the vertices `a`, `b` and
/// `c`.
///
/// Labels follow the rule of [`ExtrudedVertex::lerp`] along whichever triangle
/// edge the position lies on, and are interior anywhere strictly inside the
/// triangle. Derivatives come back zeroed. For a degenerate triangle the
/// attributes of `a` are used.
pub fn barycentric_lerp(
    a: &ExtrudedVertex,
    b: &ExtrudedVertex,
    c: &ExtrudedVertex,
    position: Point,
) -> ExtrudedVertex {
    let triangle = Triangle {
        a: a.position,
        b: b.position,
        c: c.position,
    };
    if triangle.signed_area() == 0.0 {
        let mut result = *a;
        result.position = position;
        result.attributes.side_derivative = vector(0.0, 0.0);
        result.attributes.forward_derivative = vector(0.0, 0.0);
        return result;
    }

    let (wa, wb, wc) = triangle.barycentric_coords_for_point(position);
    let weighted = |va: f32, vb: f32, vc: f32| va * wa + vb * wb + vc * wc;

    let (side_label, forward_label) = if wc == 0.0 {
        (
            lerp_label(a.attributes.side_label, b.attributes.side_label, wb),
            lerp_label(a.attributes.forward_label, b.attributes.forward_label, wb),
        )
    } else if wb == 0.0 {
        (
            lerp_label(a.attributes.side_label, c.attributes.side_label, wc),
            lerp_label(a.attributes.forward_label, c.attributes.forward_label, wc),
        )
    } else if wa == 0.0 {
        (
            lerp_label(b.attributes.side_label, c.attributes.side_label, wc),
            lerp_label(b.attributes.forward_label, c.attributes.forward_label, wc),
        )
    } else {
        (Label::INTERIOR, Label::INTERIOR)
    };

    let (aa, ab, ac) = (&a.attributes, &b.attributes, &c.attributes);
    ExtrudedVertex {
        position,
        attributes: NonPositionAttributes {
            opacity_shift: weighted(aa.opacity_shift, ab.opacity_shift, ac.opacity_shift),
            hsl_shift: [
                weighted(aa.hsl_shift[0], ab.hsl_shift[0], ac.hsl_shift[0]),
                weighted(aa.hsl_shift[1], ab.hsl_shift[1], ac.hsl_shift[1]),
                weighted(aa.hsl_shift[2], ab.hsl_shift[2], ac.hsl_shift[2]),
            ],
            side_derivative: vector(0.0, 0.0),
            side_label,
            forward_derivative: vector(0.0, 0.0),
            forward_label,
            surface_uv: point(
                weighted(aa.surface_uv.x, ab.surface_uv.x, ac.surface_uv.x),
                weighted(aa.surface_uv.y, ab.surface_uv.y, ac.surface_uv.y),
            ),
            animation_offset: aa.animation_offset,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_constants_round_trip() {
        assert_eq!(Label::INTERIOR.decode_margin(), 0.0);
        assert_eq!(Label::EXTERIOR_LEFT.decode_margin(), Label::MAXIMUM_MARGIN);
        assert_eq!(Label::EXTERIOR_RIGHT.decode_margin(), Label::MAXIMUM_MARGIN);

        assert_eq!(
            Label::EXTERIOR_LEFT.decode_side_category(),
            SideCategory::ExteriorLeft
        );
        assert_eq!(
            Label::EXTERIOR_RIGHT.decode_side_category(),
            SideCategory::ExteriorRight
        );
        assert_eq!(Label::INTERIOR.decode_side_category(), SideCategory::Interior);
        assert_eq!(
            Label::EXTERIOR_FRONT.decode_forward_category(),
            ForwardCategory::ExteriorFront
        );
        assert_eq!(
            Label::EXTERIOR_BACK.decode_forward_category(),
            ForwardCategory::ExteriorBack
        );
    }

    #[test]
    fn with_margin_clips_and_rounds() {
        let label = Label::EXTERIOR_LEFT.with_margin(2.0);
        assert_eq!(label.encoded, -64);
        assert_eq!(label.decode_side_category(), SideCategory::ExteriorLeft);
        assert!((label.decode_margin() - 2.0).abs() < Label::MAXIMUM_MARGIN / 127.0);

        // Out-of-range margins clip to the encodable range.
        assert_eq!(Label::EXTERIOR_RIGHT.with_margin(100.0).encoded, 127);
        assert_eq!(Label::EXTERIOR_RIGHT.with_margin(-1.0).encoded, 0);

        // Interior labels have no margin to replace.
        assert_eq!(Label::INTERIOR.with_margin(3.0), Label::INTERIOR);
    }

    #[test]
    fn margin_zero_keeps_category() {
        let label = Label::EXTERIOR_RIGHT.with_margin(0.0);
        assert_eq!(label.decode_margin(), 0.0);
        // A zero margin encodes to zero magnitude, which reads back as
        // interior; the engine relies on this to close give-up seams.
        assert_eq!(label.encoded, 0);
    }

    #[test]
    fn derivative_outset_sign() {
        assert_eq!(Label::EXTERIOR_LEFT.derivative_outset_sign(), -1.0);
        assert_eq!(Label::EXTERIOR_RIGHT.derivative_outset_sign(), 1.0);
        assert_eq!(Label::INTERIOR.derivative_outset_sign(), 0.0);
    }

    #[test]
    fn lerp_labels() {
        let mut a = ExtrudedVertex::default();
        a.attributes.side_label = Label::EXTERIOR_LEFT;
        let mut b = ExtrudedVertex {
            position: point(2.0, 0.0),
            ..ExtrudedVertex::default()
        };
        b.attributes.side_label = Label::EXTERIOR_RIGHT;

        assert_eq!(a.lerp(&b, 0.0).attributes.side_label, Label::EXTERIOR_LEFT);
        assert_eq!(a.lerp(&b, 1.0).attributes.side_label, Label::EXTERIOR_RIGHT);
        assert_eq!(a.lerp(&b, 0.5).attributes.side_label, Label::INTERIOR);

        b.attributes.side_label = Label::EXTERIOR_LEFT;
        assert_eq!(a.lerp(&b, 0.5).attributes.side_label, Label::EXTERIOR_LEFT);
        assert_eq!(a.lerp(&b, 0.5).position, point(1.0, 0.0));
    }

    #[test]
    fn lerp_zeroes_derivatives() {
        let mut a = ExtrudedVertex::default();
        a.attributes.side_derivative = vector(1.0, 2.0);
        a.attributes.forward_derivative = vector(3.0, 4.0);
        let b = a;

        let result = a.lerp(&b, 0.5);
        assert_eq!(result.attributes.side_derivative, vector(0.0, 0.0));
        assert_eq!(result.attributes.forward_derivative, vector(0.0, 0.0));
    }

    #[test]
    fn barycentric_lerp_attributes() {
        let mut a = ExtrudedVertex::default();
        a.attributes.opacity_shift = 1.0;
        let mut b = ExtrudedVertex {
            position: point(4.0, 0.0),
            ..ExtrudedVertex::default()
        };
        b.attributes.opacity_shift = 0.0;
        let mut c = ExtrudedVertex {
            position: point(0.0, 4.0),
            ..ExtrudedVertex::default()
        };
        c.attributes.opacity_shift = 0.0;
        a.attributes.side_label = Label::EXTERIOR_LEFT;
        b.attributes.side_label = Label::EXTERIOR_LEFT;
        c.attributes.side_label = Label::EXTERIOR_RIGHT;

        // On edge ab, labels interpolate along that edge.
        let on_edge = barycentric_lerp(&a, &b, &c, point(2.0, 0.0));
        assert!((on_edge.attributes.opacity_shift - 0.5).abs() < 1e-6);
        assert_eq!(on_edge.attributes.side_label, Label::EXTERIOR_LEFT);

        // Strictly inside, labels become interior.
        let inside = barycentric_lerp(&a, &b, &c, point(1.0, 1.0));
        assert_eq!(inside.attributes.side_label, Label::INTERIOR);
        assert!((inside.attributes.opacity_shift - 0.5).abs() < 1e-6);
    }
}
