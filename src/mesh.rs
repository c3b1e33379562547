use bevy::{
    asset::RenderAssetUsages,
    mesh::{Indices, PrimitiveTopology},
    prelude::*,
};

/// Corner positions of the unit box centered on the origin.
///
/// Corners are ordered bottom face first, back (-Z) before front (+Z):
/// ```text
///     3----2          Y
///    /|   /|          |
///   7----6 |          *-- X
///   | 0--|-1         /
///   |/   |/         Z
///   4----5
/// ```
pub const BOX_CORNERS: [[f32; 3]; 8] = [
    [-0.5, -0.5, -0.5],
    [0.5, -0.5, -0.5],
    [0.5, 0.5, -0.5],
    [-0.5, 0.5, -0.5],
    [-0.5, -0.5, 0.5],
    [0.5, -0.5, 0.5],
    [0.5, 0.5, 0.5],
    [-0.5, 0.5, 0.5],
];

/// Triangle indices into [`BOX_CORNERS`], counter-clockwise when seen from outside.
pub const BOX_INDICES: [u32; 36] = [
    0, 2, 1, 0, 3, 2, // -Z
    4, 5, 6, 4, 6, 7, // +Z
    0, 4, 7, 0, 7, 3, // -X
    1, 2, 6, 1, 6, 5, // +X
    0, 1, 5, 0, 5, 4, // -Y
    3, 7, 6, 3, 6, 2, // +Y
];

/// Builds the proxy geometry the marcher is drawn on.
///
/// Positions only; the fragment shader derives everything else from the ray.
pub fn unit_box_mesh() -> Mesh {
    let mut mesh = Mesh::new(
        PrimitiveTopology::TriangleList,
        RenderAssetUsages::RENDER_WORLD,
    );
    mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, BOX_CORNERS.to_vec());
    mesh.insert_indices(Indices::U32(BOX_INDICES.to_vec()));
    mesh
}
