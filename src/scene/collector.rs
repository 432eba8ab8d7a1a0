//! Mesh/material collection from a scene tree.

use super::{Scene, Surface};
use crate::types::{MeshId, NodeId};
use glam::Affine3A;

/// One surface found while walking the scene.
#[derive(Debug, Clone, Copy)]
pub struct SurfaceRecord<'a> {
    /// Node instancing the mesh.
    pub node: NodeId,
    /// Mesh the surface belongs to.
    pub mesh: MeshId,
    /// Surface index within the mesh.
    pub surface_index: usize,
    /// The surface geometry.
    pub surface: &'a Surface,
    /// Node-to-world transform.
    pub world: Affine3A,
}

/// Collect every surface of every visible mesh instance, depth-first from the root.
///
/// Traversal order decides output ordering only. Invisible nodes are skipped but
/// their children are still visited.
pub fn collect_surfaces(scene: &Scene) -> Vec<SurfaceRecord<'_>> {
    let mut records = Vec::new();
    let root = scene.root();
    visit(scene, root, scene.node(root).transform, &mut records);
    records
}

fn visit<'a>(scene: &'a Scene, id: NodeId, world: Affine3A, out: &mut Vec<SurfaceRecord<'a>>) {
    let node = scene.node(id);

    if let (true, Some(mesh_id)) = (node.visible, node.mesh) {
        for (surface_index, surface) in scene.mesh(mesh_id).surfaces.iter().enumerate() {
            out.push(SurfaceRecord {
                node: id,
                mesh: mesh_id,
                surface_index,
                surface,
                world,
            });
        }
    }

    for &child in &node.children {
        let child_world = world * scene.node(child).transform;
        visit(scene, child, child_world, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{Material, SceneMesh, Vertex};
    use glam::Vec3;

    fn triangle_mesh(scene: &mut Scene, surfaces: usize) -> MeshId {
        let material = scene.add_material(Material::new("m", [1.0; 4]));
        let mut mesh = SceneMesh::new("tri");
        for _ in 0..surfaces {
            let mut surface = Surface::new(material);
            surface.add_vertex(Vertex::default());
            surface.add_vertex(Vertex::default());
            surface.add_vertex(Vertex::default());
            surface.add_triangle(0, 1, 2);
            mesh.surfaces.push(surface);
        }
        scene.add_mesh(mesh)
    }

    #[test]
    fn test_collect_depth_first() {
        let mut scene = Scene::new("root");
        let root = scene.root();
        let mesh = triangle_mesh(&mut scene, 2);

        let a = scene.add_mesh_instance(root, "a", Affine3A::IDENTITY, mesh);
        let a_child = scene.add_mesh_instance(a, "a_child", Affine3A::IDENTITY, mesh);
        let b = scene.add_mesh_instance(root, "b", Affine3A::IDENTITY, mesh);

        let records = collect_surfaces(&scene);
        let nodes: Vec<_> = records.iter().map(|r| (r.node, r.surface_index)).collect();
        assert_eq!(
            nodes,
            vec![(a, 0), (a, 1), (a_child, 0), (a_child, 1), (b, 0), (b, 1)]
        );
    }

    #[test]
    fn test_collect_skips_invisible_but_visits_children() {
        let mut scene = Scene::new("root");
        let root = scene.root();
        let mesh = triangle_mesh(&mut scene, 1);

        let hidden = scene.add_mesh_instance(root, "hidden", Affine3A::IDENTITY, mesh);
        scene.node_mut(hidden).visible = false;
        let child = scene.add_mesh_instance(hidden, "child", Affine3A::IDENTITY, mesh);

        let records = collect_surfaces(&scene);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].node, child);
    }

    #[test]
    fn test_collect_world_transform() {
        let mut scene = Scene::new("root");
        let root = scene.root();
        let mesh = triangle_mesh(&mut scene, 1);

        let parent = scene.add_node(root, "parent", Affine3A::from_translation(Vec3::X));
        let node = scene.add_mesh_instance(
            parent,
            "node",
            Affine3A::from_translation(Vec3::Y),
            mesh,
        );

        let records = collect_surfaces(&scene);
        assert_eq!(records.len(), 1);
        let world = records[0].world.transform_point3(Vec3::ZERO);
        assert!((world - Vec3::new(1.0, 1.0, 0.0)).length() < 1e-6);
        assert_eq!(records[0].world, scene.world_transform(node));
    }
}
