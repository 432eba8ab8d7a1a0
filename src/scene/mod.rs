//! Arena-backed scene graph.
//!
//! Nodes, meshes and materials live in flat arenas owned by [`Scene`] and
//! refer to each other through [`NodeId`], [`MeshId`] and [`MaterialId`]
//! handles, so merge results never borrow from the input scene.

pub mod collector;
pub mod geometry;

pub use collector::{collect_surfaces, SurfaceRecord};
pub use geometry::{Surface, Vertex};

use crate::types::{MaterialId, MeshId, NodeId};
use glam::Affine3A;
use image::DynamicImage;

/// A surface material: a tint color and an optional albedo texture.
#[derive(Debug, Clone)]
pub struct Material {
    /// Material name, used for logging and export.
    pub name: String,
    /// Albedo tint (linear RGBA, 0-1).
    pub albedo: [f32; 4],
    /// Albedo texture, if any.
    pub albedo_texture: Option<DynamicImage>,
    /// Disable back-face culling when rendering.
    pub double_sided: bool,
}

impl Material {
    /// Create an untextured material with a flat tint.
    pub fn new(name: impl Into<String>, albedo: [f32; 4]) -> Self {
        Self {
            name: name.into(),
            albedo,
            albedo_texture: None,
            double_sided: false,
        }
    }

    /// Attach an albedo texture.
    pub fn with_texture(mut self, texture: DynamicImage) -> Self {
        self.albedo_texture = Some(texture);
        self
    }

    /// Check if the material has a usable albedo texture.
    pub fn has_texture(&self) -> bool {
        self.albedo_texture
            .as_ref()
            .is_some_and(|t| t.width() > 0 && t.height() > 0)
    }
}

/// A mesh resource: one or more surfaces.
#[derive(Debug, Clone, Default)]
pub struct SceneMesh {
    pub name: String,
    pub surfaces: Vec<Surface>,
}

impl SceneMesh {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            surfaces: Vec::new(),
        }
    }

    pub fn with_surface(mut self, surface: Surface) -> Self {
        self.surfaces.push(surface);
        self
    }

    /// Total vertex count across all surfaces.
    pub fn vertex_count(&self) -> usize {
        self.surfaces.iter().map(Surface::vertex_count).sum()
    }
}

/// A node in the scene tree.
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    /// Transform relative to the parent node.
    pub transform: Affine3A,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// Invisible nodes (and their meshes) are not merged; their children still are.
    pub visible: bool,
    /// Mesh instanced at this node.
    pub mesh: Option<MeshId>,
}

/// A scene: a node tree plus the mesh and material resources it references.
#[derive(Debug, Clone)]
pub struct Scene {
    nodes: Vec<Node>,
    meshes: Vec<SceneMesh>,
    materials: Vec<Material>,
    root: NodeId,
}

impl Scene {
    /// Create a scene with a single root node.
    pub fn new(root_name: impl Into<String>) -> Self {
        Self {
            nodes: vec![Node {
                name: root_name.into(),
                transform: Affine3A::IDENTITY,
                parent: None,
                children: Vec::new(),
                visible: true,
                mesh: None,
            }],
            meshes: Vec::new(),
            materials: Vec::new(),
            root: NodeId(0),
        }
    }

    /// Get the root node handle.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Add a node under `parent` and return its handle.
    pub fn add_node(&mut self, parent: NodeId, name: impl Into<String>, transform: Affine3A) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            name: name.into(),
            transform,
            parent: Some(parent),
            children: Vec::new(),
            visible: true,
            mesh: None,
        });
        self.nodes[parent.index()].children.push(id);
        id
    }

    /// Add a node instancing `mesh` under `parent`.
    pub fn add_mesh_instance(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
        transform: Affine3A,
        mesh: MeshId,
    ) -> NodeId {
        let id = self.add_node(parent, name, transform);
        self.nodes[id.index()].mesh = Some(mesh);
        id
    }

    /// Register a mesh resource.
    pub fn add_mesh(&mut self, mesh: SceneMesh) -> MeshId {
        let id = MeshId(self.meshes.len() as u32);
        self.meshes.push(mesh);
        id
    }

    /// Register a material resource.
    pub fn add_material(&mut self, material: Material) -> MaterialId {
        let id = MaterialId(self.materials.len() as u32);
        self.materials.push(material);
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    pub fn mesh(&self, id: MeshId) -> &SceneMesh {
        &self.meshes[id.index()]
    }

    pub fn material(&self, id: MaterialId) -> &Material {
        &self.materials[id.index()]
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn meshes(&self) -> &[SceneMesh] {
        &self.meshes
    }

    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    /// Iterate node handles in arena order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    /// Find the first node with the given name.
    pub fn find_node(&self, name: &str) -> Option<NodeId> {
        self.node_ids().find(|&id| self.node(id).name == name)
    }

    /// Compose local transforms from the root down to `id`.
    pub fn world_transform(&self, id: NodeId) -> Affine3A {
        let mut xform = self.node(id).transform;
        let mut parent = self.node(id).parent;
        while let Some(p) = parent {
            let node = self.node(p);
            xform = node.transform * xform;
            parent = node.parent;
        }
        xform
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_scene_tree() {
        let mut scene = Scene::new("root");
        let root = scene.root();
        let a = scene.add_node(root, "a", Affine3A::IDENTITY);
        let b = scene.add_node(a, "b", Affine3A::IDENTITY);

        assert_eq!(scene.node(root).children, vec![a]);
        assert_eq!(scene.node(b).parent, Some(a));
        assert_eq!(scene.find_node("b"), Some(b));
        assert_eq!(scene.find_node("missing"), None);
    }

    #[test]
    fn test_world_transform_composes_parents() {
        let mut scene = Scene::new("root");
        let root = scene.root();
        scene.node_mut(root).transform = Affine3A::from_translation(Vec3::new(1.0, 0.0, 0.0));
        let a = scene.add_node(root, "a", Affine3A::from_scale(Vec3::splat(2.0)));
        let b = scene.add_node(a, "b", Affine3A::from_translation(Vec3::new(0.0, 1.0, 0.0)));

        let p = scene.world_transform(b).transform_point3(Vec3::ZERO);
        assert!((p - Vec3::new(1.0, 2.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn test_material_has_texture() {
        let plain = Material::new("plain", [1.0, 0.0, 0.0, 1.0]);
        assert!(!plain.has_texture());

        let textured = plain.clone().with_texture(DynamicImage::new_rgba8(4, 4));
        assert!(textured.has_texture());

        let empty = Material::new("empty", [1.0; 4]).with_texture(DynamicImage::new_rgba8(0, 0));
        assert!(!empty.has_texture());
    }
}
