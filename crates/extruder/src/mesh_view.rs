//! Uniform read/write interface over the mesh's vertex and triangle-index
//! storage.

use crate::math::{IndexType, Point, Triangle, Vector};
use crate::vertex::{ExtrudedVertex, Label};

/// An indexed triangle mesh that keeps track of mesh mutations.
///
/// The view tracks the first vertex and the first triangle that have been
/// modified through it since the last call to
/// [`reset_mutation_tracking`](MutableMeshView::reset_mutation_tracking).
/// This is what makes it cheap to sync incremental changes with GPU buffers:
/// the expected mutations consist of appending or modifying values close to
/// the end of the mesh.
///
/// The view owns its vertex and index storage. Cross-references into the mesh
/// are indices, never references, so appending can reallocate freely without
/// invalidating anything. Only constant-time validation is performed: reading
/// out of bounds panics, but no check is made that triangle indices are valid
/// at the time of appending or remain valid when vertices are truncated.
#[derive(Clone, Debug, Default)]
pub struct MutableMeshView {
    vertices: Vec<ExtrudedVertex>,
    indices: Vec<IndexType>,
    first_mutated_vertex: u32,
    first_mutated_triangle: u32,
}

impl MutableMeshView {
    pub fn new() -> Self {
        MutableMeshView::default()
    }

    /// Removes all triangles and vertices.
    pub fn clear(&mut self) {
        self.vertices.clear();
        self.indices.clear();
        self.first_mutated_vertex = 0;
        self.first_mutated_triangle = 0;
    }

    #[inline]
    pub fn vertex_count(&self) -> u32 {
        self.vertices.len() as u32
    }

    #[inline]
    pub fn triangle_count(&self) -> u32 {
        (self.indices.len() / 3) as u32
    }

    /// The backing vertex array.
    #[inline]
    pub fn vertices(&self) -> &[ExtrudedVertex] {
        &self.vertices
    }

    /// The backing triangle-index array.
    #[inline]
    pub fn indices(&self) -> &[IndexType] {
        &self.indices
    }

    #[inline]
    pub fn position(&self, index: IndexType) -> Point {
        self.vertices[index as usize].position
    }

    #[inline]
    pub fn vertex(&self, index: IndexType) -> ExtrudedVertex {
        self.vertices[index as usize]
    }

    #[inline]
    pub fn side_derivative(&self, index: IndexType) -> Vector {
        self.vertices[index as usize].attributes.side_derivative
    }

    #[inline]
    pub fn forward_derivative(&self, index: IndexType) -> Vector {
        self.vertices[index as usize].attributes.forward_derivative
    }

    #[inline]
    pub fn side_label(&self, index: IndexType) -> Label {
        self.vertices[index as usize].attributes.side_label
    }

    #[inline]
    pub fn forward_label(&self, index: IndexType) -> Label {
        self.vertices[index as usize].attributes.forward_label
    }

    pub fn triangle(&self, triangle: u32) -> Triangle {
        let [a, b, c] = self.triangle_indices(triangle);
        Triangle {
            a: self.position(a),
            b: self.position(b),
            c: self.position(c),
        }
    }

    #[inline]
    pub fn triangle_indices(&self, triangle: u32) -> [IndexType; 3] {
        let i = triangle as usize * 3;
        [self.indices[i], self.indices[i + 1], self.indices[i + 2]]
    }

    /// Returns the vertex index at corner `triangle_vertex` of `triangle`.
    #[inline]
    pub fn vertex_index(&self, triangle: u32, triangle_vertex: usize) -> IndexType {
        debug_assert!(triangle_vertex < 3);
        self.indices[triangle as usize * 3 + triangle_vertex]
    }

    pub fn append_vertex(&mut self, vertex: ExtrudedVertex) {
        self.vertices.push(vertex);
    }

    pub fn append_triangle_indices(&mut self, indices: [IndexType; 3]) {
        self.indices.extend_from_slice(&indices);
    }

    pub fn set_vertex(&mut self, index: IndexType, vertex: ExtrudedVertex) {
        self.vertices[index as usize] = vertex;
        self.first_mutated_vertex = self.first_mutated_vertex.min(index);
    }

    pub fn set_side_derivative(&mut self, index: IndexType, derivative: Vector) {
        self.vertices[index as usize].attributes.side_derivative = derivative;
        self.first_mutated_vertex = self.first_mutated_vertex.min(index);
    }

    pub fn set_forward_derivative(&mut self, index: IndexType, derivative: Vector) {
        self.vertices[index as usize].attributes.forward_derivative = derivative;
        self.first_mutated_vertex = self.first_mutated_vertex.min(index);
    }

    pub fn set_side_label(&mut self, index: IndexType, label: Label) {
        self.vertices[index as usize].attributes.side_label = label;
        self.first_mutated_vertex = self.first_mutated_vertex.min(index);
    }

    pub fn set_forward_label(&mut self, index: IndexType, label: Label) {
        self.vertices[index as usize].attributes.forward_label = label;
        self.first_mutated_vertex = self.first_mutated_vertex.min(index);
    }

    pub fn set_triangle_indices(&mut self, triangle: u32, indices: [IndexType; 3]) {
        let i = triangle as usize * 3;
        self.indices[i..i + 3].copy_from_slice(&indices);
        self.first_mutated_triangle = self.first_mutated_triangle.min(triangle);
    }

    /// Inserts a new triplet of indices, shifting every triangle at or after
    /// `triangle` toward the end of the mesh.
    pub fn insert_triangle_indices(&mut self, triangle: u32, indices: [IndexType; 3]) {
        let i = triangle as usize * 3;
        assert!(i <= self.indices.len());
        self.indices.splice(i..i, indices.iter().copied());
        self.first_mutated_triangle = self.first_mutated_triangle.min(triangle);
    }

    /// Removes triangles from the end of the mesh if `new_triangle_count` is
    /// smaller than the current count; no effect otherwise.
    pub fn truncate_triangles(&mut self, new_triangle_count: u32) {
        if new_triangle_count >= self.triangle_count() {
            return;
        }
        self.indices.truncate(new_triangle_count as usize * 3);
        self.first_mutated_triangle = self.first_mutated_triangle.min(new_triangle_count);
    }

    /// Removes vertices from the end of the mesh if `new_vertex_count` is
    /// smaller than the current count; no effect otherwise.
    pub fn truncate_vertices(&mut self, new_vertex_count: u32) {
        if new_vertex_count >= self.vertex_count() {
            return;
        }
        self.vertices.truncate(new_vertex_count as usize);
        self.first_mutated_vertex = self.first_mutated_vertex.min(new_vertex_count);
    }

    /// The index of the first new or updated vertex since construction or the
    /// last call to `reset_mutation_tracking`.
    #[inline]
    pub fn first_mutated_vertex(&self) -> u32 {
        self.first_mutated_vertex
    }

    /// The index of the first new or updated triangle since construction or
    /// the last call to `reset_mutation_tracking`.
    #[inline]
    pub fn first_mutated_triangle(&self) -> u32 {
        self.first_mutated_triangle
    }

    /// Resets mutation tracking so that all vertices and triangle indices
    /// currently in the mesh are considered "not mutated".
    pub fn reset_mutation_tracking(&mut self) {
        self.first_mutated_vertex = self.vertex_count();
        self.first_mutated_triangle = self.triangle_count();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::point;

    fn vertex_at(x: f32, y: f32) -> ExtrudedVertex {
        ExtrudedVertex {
            position: point(x, y),
            ..ExtrudedVertex::default()
        }
    }

    #[test]
    fn append_and_get() {
        let mut mesh = MutableMeshView::new();
        mesh.append_vertex(vertex_at(0.0, 0.0));
        mesh.append_vertex(vertex_at(1.0, 0.0));
        mesh.append_vertex(vertex_at(0.0, 1.0));
        mesh.append_triangle_indices([0, 1, 2]);

        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.triangle_count(), 1);
        assert_eq!(mesh.position(1), point(1.0, 0.0));
        assert_eq!(mesh.triangle_indices(0), [0, 1, 2]);
        assert_eq!(mesh.vertex_index(0, 2), 2);
        assert!(mesh.triangle(0).signed_area() > 0.0);
    }

    #[test]
    fn mutation_tracking_appends() {
        let mut mesh = MutableMeshView::new();
        mesh.append_vertex(vertex_at(0.0, 0.0));
        mesh.append_triangle_indices([0, 0, 0]);
        mesh.reset_mutation_tracking();
        assert_eq!(mesh.first_mutated_vertex(), 1);
        assert_eq!(mesh.first_mutated_triangle(), 1);

        // Appends alone do not move the trackers backwards; they only extend
        // the mesh past the tracked prefix.
        mesh.append_vertex(vertex_at(1.0, 0.0));
        mesh.append_triangle_indices([0, 1, 0]);
        assert_eq!(mesh.first_mutated_vertex(), 1);
        assert_eq!(mesh.first_mutated_triangle(), 1);
    }

    #[test]
    fn mutation_tracking_set() {
        let mut mesh = MutableMeshView::new();
        for i in 0..4 {
            mesh.append_vertex(vertex_at(i as f32, 0.0));
        }
        mesh.append_triangle_indices([0, 1, 2]);
        mesh.append_triangle_indices([1, 2, 3]);
        mesh.reset_mutation_tracking();

        mesh.set_vertex(2, vertex_at(2.0, 5.0));
        assert_eq!(mesh.first_mutated_vertex(), 2);
        mesh.set_side_label(1, Label::EXTERIOR_LEFT);
        assert_eq!(mesh.first_mutated_vertex(), 1);

        mesh.set_triangle_indices(1, [1, 3, 2]);
        assert_eq!(mesh.first_mutated_triangle(), 1);
        mesh.set_triangle_indices(0, [0, 2, 1]);
        assert_eq!(mesh.first_mutated_triangle(), 0);
    }

    #[test]
    fn mutation_tracking_truncate() {
        let mut mesh = MutableMeshView::new();
        for i in 0..4 {
            mesh.append_vertex(vertex_at(i as f32, 0.0));
            mesh.append_triangle_indices([0, 0, 0]);
        }
        mesh.reset_mutation_tracking();

        mesh.truncate_vertices(2);
        mesh.truncate_triangles(3);
        assert_eq!(mesh.vertex_count(), 2);
        assert_eq!(mesh.triangle_count(), 3);
        assert_eq!(mesh.first_mutated_vertex(), 2);
        assert_eq!(mesh.first_mutated_triangle(), 3);

        // Growing truncations are no-ops.
        mesh.truncate_vertices(10);
        mesh.truncate_triangles(10);
        assert_eq!(mesh.vertex_count(), 2);
        assert_eq!(mesh.first_mutated_vertex(), 2);
    }

    #[test]
    fn insert_shifts_triangles() {
        let mut mesh = MutableMeshView::new();
        for _ in 0..3 {
            mesh.append_vertex(vertex_at(0.0, 0.0));
        }
        mesh.append_triangle_indices([0, 1, 2]);
        mesh.append_triangle_indices([2, 1, 0]);
        mesh.reset_mutation_tracking();

        mesh.insert_triangle_indices(1, [1, 1, 1]);
        assert_eq!(mesh.triangle_count(), 3);
        assert_eq!(mesh.triangle_indices(0), [0, 1, 2]);
        assert_eq!(mesh.triangle_indices(1), [1, 1, 1]);
        assert_eq!(mesh.triangle_indices(2), [2, 1, 0]);
        assert_eq!(mesh.first_mutated_triangle(), 1);
    }

    #[test]
    #[should_panic]
    fn out_of_bounds_get_panics() {
        let mesh = MutableMeshView::new();
        mesh.position(0);
    }
}
