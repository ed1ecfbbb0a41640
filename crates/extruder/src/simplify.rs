//! Polyline simplification for buffered extrusion vertices.

use crate::math::LineSegment;
use crate::vertex::ExtrudedVertex;

fn simplify_interior(
    segment: LineSegment,
    interior: &[ExtrudedVertex],
    epsilon: f32,
    output: &mut Vec<ExtrudedVertex>,
) {
    if interior.is_empty() {
        return;
    }

    // Find the point that is farthest from the segment.
    let mut farthest = 0;
    let mut max_distance = 0.0;
    for (i, vertex) in interior.iter().enumerate() {
        let distance = segment.distance_to_point(vertex.position);
        if distance > max_distance {
            farthest = i;
            max_distance = distance;
        }
    }

    if max_distance > epsilon {
        // Recursively simplify the points before the farthest point.
        simplify_interior(
            LineSegment {
                from: segment.from,
                to: interior[farthest].position,
            },
            &interior[..farthest],
            epsilon,
            output,
        );

        output.push(interior[farthest]);

        // Recursively simplify the points after the farthest point.
        simplify_interior(
            LineSegment {
                from: interior[farthest].position,
                to: segment.to,
            },
            &interior[farthest + 1..],
            epsilon,
            output,
        );
    }
}

/// Ramer-Douglas-Peucker simplification of `input`, appended to `output`.
///
/// The first and last vertices are always preserved. An intermediate vertex is
/// retained whenever its perpendicular distance to the segment joining the
/// current endpoints exceeds `epsilon`; the output is always an in-order
/// subset of the input. An `epsilon` of zero or fewer than three vertices
/// leaves the input unchanged.
pub fn simplify_polyline(input: &[ExtrudedVertex], epsilon: f32, output: &mut Vec<ExtrudedVertex>) {
    if input.len() < 3 || epsilon <= 0.0 {
        output.extend_from_slice(input);
        return;
    }

    output.push(input[0]);
    simplify_interior(
        LineSegment {
            from: input[0].position,
            to: input[input.len() - 1].position,
        },
        &input[1..input.len() - 1],
        epsilon,
        output,
    );
    output.push(input[input.len() - 1]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::point;

    fn vertices(positions: &[(f32, f32)]) -> Vec<ExtrudedVertex> {
        positions
            .iter()
            .map(|&(x, y)| ExtrudedVertex {
                position: point(x, y),
                ..ExtrudedVertex::default()
            })
            .collect()
    }

    fn positions(vertices: &[ExtrudedVertex]) -> Vec<(f32, f32)> {
        vertices
            .iter()
            .map(|v| (v.position.x, v.position.y))
            .collect()
    }

    #[test]
    fn short_input_is_unchanged() {
        let input = vertices(&[(0.0, 0.0), (5.0, 5.0)]);
        let mut output = Vec::new();
        simplify_polyline(&input, 1.0, &mut output);
        assert_eq!(positions(&output), positions(&input));
    }

    #[test]
    fn zero_epsilon_is_unchanged() {
        let input = vertices(&[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0)]);
        let mut output = Vec::new();
        simplify_polyline(&input, 0.0, &mut output);
        assert_eq!(positions(&output), positions(&input));
    }

    #[test]
    fn collinear_interior_is_removed() {
        let input = vertices(&[(0.0, 0.0), (1.0, 0.01), (2.0, -0.01), (3.0, 0.0)]);
        let mut output = Vec::new();
        simplify_polyline(&input, 0.1, &mut output);
        assert_eq!(positions(&output), vec![(0.0, 0.0), (3.0, 0.0)]);
    }

    #[test]
    fn corner_is_kept() {
        let input = vertices(&[(0.0, 0.0), (1.0, 0.0), (2.0, 1.0), (3.0, 4.0), (4.0, 4.0)]);
        let mut output = Vec::new();
        simplify_polyline(&input, 0.5, &mut output);

        // The far point of the corner survives; near-collinear points do not.
        assert!(output.len() < input.len());
        assert_eq!(output.first().unwrap().position, point(0.0, 0.0));
        assert_eq!(output.last().unwrap().position, point(4.0, 4.0));
        assert!(output.iter().any(|v| v.position == point(3.0, 4.0)));
    }

    #[test]
    fn output_is_ordered_subset() {
        let input = vertices(&[
            (0.0, 0.0),
            (1.0, 2.0),
            (2.0, -1.0),
            (3.0, 3.0),
            (4.0, 0.5),
            (5.0, 0.0),
        ]);
        let mut output = Vec::new();
        simplify_polyline(&input, 0.75, &mut output);

        let mut search_from = 0;
        for vertex in &output {
            let found = input[search_from..]
                .iter()
                .position(|v| v.position == vertex.position)
                .expect("output vertex not found in input order");
            search_from += found + 1;
        }
    }
}
