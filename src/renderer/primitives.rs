use glam::{Vec2, Vec3};

/// Vertices in a cube: six faces of two triangles.
pub const CUBE_VERTEX_COUNT: u32 = 36;
/// Vertices in a quad: two triangles.
pub const QUAD_VERTEX_COUNT: u32 = 6;

/// Outward normal, then the U and V axes of each face. `u x v == normal`,
/// so the emitted triangles wind counter-clockwise seen from outside.
const CUBE_FACES: [(Vec3, Vec3, Vec3); 6] = [
    (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
    (Vec3::Z, Vec3::X, Vec3::Y),
    (Vec3::NEG_X, Vec3::Z, Vec3::Y),
    (Vec3::X, Vec3::NEG_Z, Vec3::Y),
    (Vec3::NEG_Y, Vec3::X, Vec3::Z),
    (Vec3::Y, Vec3::X, Vec3::NEG_Z),
];

/// Corner order of the two triangles making up a face, in face-local units.
const FACE_CORNERS: [(f32, f32); 6] = [
    (-1.0, -1.0),
    (1.0, -1.0),
    (1.0, 1.0),
    (1.0, 1.0),
    (-1.0, 1.0),
    (-1.0, -1.0),
];

fn cube_corners(half_extent: f32) -> impl Iterator<Item = (Vec3, Vec3, Vec2)> {
    CUBE_FACES.into_iter().flat_map(move |(normal, u, v)| {
        FACE_CORNERS.into_iter().map(move |(a, b)| {
            let position = (normal + u * a + v * b) * half_extent;
            let uv = Vec2::new((a + 1.0) * 0.5, (b + 1.0) * 0.5);
            (position, normal, uv)
        })
    })
}

/// Interleaved position/normal/uv cube spanning [-1, 1] on every axis.
pub fn cube_vertices() -> Vec<f32> {
    cube_corners(1.0)
        .flat_map(|(p, n, uv)| [p.x, p.y, p.z, n.x, n.y, n.z, uv.x, uv.y])
        .collect()
}

/// Position-only cube spanning [-0.5, 0.5], used for light markers.
pub fn light_cube_vertices() -> Vec<f32> {
    cube_corners(0.5)
        .flat_map(|(p, _, _)| [p.x, p.y, p.z])
        .collect()
}

/// Position-only cube spanning [-1, 1], sampled from the inside by skyboxes.
pub fn skybox_vertices() -> Vec<f32> {
    cube_corners(1.0)
        .flat_map(|(p, _, _)| [p.x, p.y, p.z])
        .collect()
}

/// Four corners of a planar quad, listed counter-clockwise from the
/// bottom-left as seen from the side the normal points to.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QuadGeometry {
    pub bottom_left: Vec3,
    pub bottom_right: Vec3,
    pub top_right: Vec3,
    pub top_left: Vec3,
}

impl Default for QuadGeometry {
    fn default() -> Self {
        Self {
            bottom_left: Vec3::new(-1.0, -1.0, 0.0),
            bottom_right: Vec3::new(1.0, -1.0, 0.0),
            top_right: Vec3::new(1.0, 1.0, 0.0),
            top_left: Vec3::new(-1.0, 1.0, 0.0),
        }
    }
}

impl QuadGeometry {
    pub fn new(bottom_left: Vec3, bottom_right: Vec3, top_right: Vec3, top_left: Vec3) -> Self {
        Self {
            bottom_left,
            bottom_right,
            top_right,
            top_left,
        }
    }

    /// Unit normal of the plane spanned by the bottom and left edges.
    pub fn normal(&self) -> Vec3 {
        (self.bottom_right - self.bottom_left)
            .cross(self.top_left - self.bottom_left)
            .normalize_or_zero()
    }

    /// Texture coordinates reach the edge lengths, so textures tile once per
    /// world unit when the sampler repeats.
    pub fn uv_extent(&self) -> Vec2 {
        Vec2::new(
            (self.bottom_right - self.bottom_left).length(),
            (self.top_left - self.bottom_left).length(),
        )
    }

    pub fn vertices(&self) -> Vec<f32> {
        let n = self.normal();
        let extent = self.uv_extent();
        let corners = [
            (self.bottom_left, Vec2::ZERO),
            (self.bottom_right, Vec2::new(extent.x, 0.0)),
            (self.top_right, extent),
            (self.top_right, extent),
            (self.top_left, Vec2::new(0.0, extent.y)),
            (self.bottom_left, Vec2::ZERO),
        ];
        corners
            .iter()
            .flat_map(|(p, uv)| [p.x, p.y, p.z, n.x, n.y, n.z, uv.x, uv.y])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle_normal(vertices: &[f32], stride: usize, first: usize) -> Vec3 {
        let at = |i: usize| Vec3::from_slice(&vertices[(first + i) * stride..]);
        (at(1) - at(0)).cross(at(2) - at(0)).normalize()
    }

    #[test]
    fn cube_has_36_vertices_with_unit_extent() {
        let vertices = cube_vertices();
        assert_eq!(vertices.len(), CUBE_VERTEX_COUNT as usize * 8);
        for vertex in vertices.chunks_exact(8) {
            for coord in &vertex[..3] {
                assert_eq!(coord.abs(), 1.0);
            }
        }
    }

    #[test]
    fn cube_triangles_wind_outward() {
        let vertices = cube_vertices();
        for triangle in 0..12 {
            let stored = Vec3::from_slice(&vertices[triangle * 3 * 8 + 3..]);
            let wound = triangle_normal(&vertices, 8, triangle * 3);
            assert!(wound.abs_diff_eq(stored, 1e-6), "triangle {triangle}");
        }
    }

    #[test]
    fn light_cube_is_half_size() {
        let vertices = light_cube_vertices();
        assert_eq!(vertices.len(), CUBE_VERTEX_COUNT as usize * 3);
        assert!(vertices.iter().all(|c| c.abs() == 0.5));
    }

    #[test]
    fn default_quad_faces_positive_z_with_two_by_two_uvs() {
        let quad = QuadGeometry::default();
        assert!(quad.normal().abs_diff_eq(Vec3::Z, 1e-6));
        assert!(quad.uv_extent().abs_diff_eq(Vec2::new(2.0, 2.0), 1e-6));

        let vertices = quad.vertices();
        assert_eq!(vertices.len(), QUAD_VERTEX_COUNT as usize * 8);
        // top-right corner carries the full extent
        assert_eq!(&vertices[2 * 8 + 6..2 * 8 + 8], &[2.0, 2.0]);
    }

    #[test]
    fn floor_quad_faces_up() {
        let floor = QuadGeometry::new(
            Vec3::new(-25.0, -0.5, 25.0),
            Vec3::new(25.0, -0.5, 25.0),
            Vec3::new(25.0, -0.5, -25.0),
            Vec3::new(-25.0, -0.5, -25.0),
        );
        assert!(floor.normal().abs_diff_eq(Vec3::Y, 1e-6));
        assert!(floor.uv_extent().abs_diff_eq(Vec2::splat(50.0), 1e-4));
    }
}
