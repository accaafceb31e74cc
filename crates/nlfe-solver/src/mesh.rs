//! Mesh data structures for nonlinear finite element analysis.
//!
//! This module owns the nodes (reference coordinates and current
//! displacements), the elements (topology, material and integration point
//! state) and the node groups. All entities are addressed through typed
//! handles handed out at creation time.
//!
//! Every node carries three displacement DOFs. The global (full) index of DOF
//! `k` of node `n` is `3 * n + k`.

use crate::constraints::Constraints;
use crate::dofs::DofNumbering;
use crate::elements::{ElementKind, ElementResponse, IntegrationPoint};
use crate::error::{FemError, Result};
use crate::materials::{MaterialId, MaterialLibrary, Voigt};
use nalgebra::{DVector, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Handle of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

/// Handle of an element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementId(pub usize);

/// Handle of a node group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(pub usize);

/// A node in the finite element mesh
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    coordinates: Vector3<f64>,
    displacement: Vector3<f64>,
}

impl Node {
    /// Reference coordinates
    pub fn coordinates(&self) -> Vector3<f64> {
        self.coordinates
    }

    /// Current displacement (ux, uy, uz)
    pub fn displacement(&self) -> Vector3<f64> {
        self.displacement
    }
}

/// A finite element
#[derive(Debug, Clone)]
pub struct Element {
    kind: ElementKind,
    nodes: Vec<NodeId>,
    material: MaterialId,
    points: Vec<IntegrationPoint>,
}

impl Element {
    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn material(&self) -> MaterialId {
        self.material
    }

    pub fn integration_points(&self) -> &[IntegrationPoint] {
        &self.points
    }

    /// Full DOF indices of the element, node by node
    pub fn dof_indices(&self) -> Vec<usize> {
        self.nodes
            .iter()
            .flat_map(|node| (0..3).map(move |k| 3 * node.0 + k))
            .collect()
    }
}

/// Finite element mesh
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    nodes: Vec<Node>,
    elements: Vec<Element>,
    /// Deleted groups leave a `None` slot, handles are never reused
    groups: Vec<Option<BTreeSet<NodeId>>>,
    /// Bumped whenever nodes, elements or group memberships change
    topology_revision: u64,
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a node at the given reference coordinates
    pub fn create_node(&mut self, coordinates: Vector3<f64>) -> NodeId {
        self.nodes.push(Node {
            coordinates,
            displacement: Vector3::zeros(),
        });
        self.topology_revision += 1;
        NodeId(self.nodes.len() - 1)
    }

    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes
            .get(id.0)
            .ok_or_else(|| FemError::config(format!("unknown node {}", id.0)))
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Number of displacement DOFs of the whole mesh (3 per node)
    pub fn num_dofs(&self) -> usize {
        3 * self.nodes.len()
    }

    pub fn node_displacement(&self, id: NodeId) -> Result<Vector3<f64>> {
        Ok(self.node(id)?.displacement)
    }

    /// Create an element
    ///
    /// # Arguments
    /// * `kind` - Element type
    /// * `nodes` - Node handles in the element's node ordering
    /// * `material` - Constitutive law of the element
    /// * `materials` - Library the material handle refers to
    ///
    /// # Errors
    /// Wrong node count, unknown node or material, invalid geometry.
    pub fn create_element(
        &mut self,
        kind: ElementKind,
        nodes: &[NodeId],
        material: MaterialId,
        materials: &MaterialLibrary,
    ) -> Result<ElementId> {
        if nodes.len() != kind.num_nodes() {
            return Err(FemError::config(format!(
                "{} requires {} nodes, got {}",
                kind.name(),
                kind.num_nodes(),
                nodes.len()
            )));
        }
        let coordinates = nodes
            .iter()
            .map(|&id| self.node(id).map(|node| node.coordinates))
            .collect::<Result<Vec<_>>>()?;
        kind.check_geometry(&coordinates)?;

        let history = materials.get(material)?.initial_history();
        self.elements.push(Element {
            kind,
            nodes: nodes.to_vec(),
            material,
            points: vec![IntegrationPoint::new(history); kind.num_integration_points()],
        });
        self.topology_revision += 1;
        Ok(ElementId(self.elements.len() - 1))
    }

    pub fn element(&self, id: ElementId) -> Result<&Element> {
        self.elements
            .get(id.0)
            .ok_or_else(|| FemError::config(format!("unknown element {}", id.0)))
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn num_elements(&self) -> usize {
        self.elements.len()
    }

    /// Reference coordinates of the element's nodes
    pub fn element_coordinates(&self, element: &Element) -> Result<Vec<Vector3<f64>>> {
        element
            .nodes
            .iter()
            .map(|&id| self.node(id).map(|node| node.coordinates))
            .collect()
    }

    /// Current displacements of the element's nodes
    pub fn element_displacements(&self, element: &Element) -> Result<Vec<Vector3<f64>>> {
        element
            .nodes
            .iter()
            .map(|&id| self.node(id).map(|node| node.displacement))
            .collect()
    }

    pub fn create_group(&mut self) -> GroupId {
        self.groups.push(Some(BTreeSet::new()));
        GroupId(self.groups.len() - 1)
    }

    fn group_members(&self, group: GroupId) -> Result<&BTreeSet<NodeId>> {
        self.groups
            .get(group.0)
            .and_then(Option::as_ref)
            .ok_or_else(|| FemError::config(format!("unknown group {}", group.0)))
    }

    /// Add a node to a group
    ///
    /// # Returns
    /// `true` if the node was not yet a member. Adding a member again is a
    /// no-op and keeps existing DOF numberings valid.
    pub fn group_add_node(&mut self, group: GroupId, node: NodeId) -> Result<bool> {
        self.node(node)?;
        let members = self
            .groups
            .get_mut(group.0)
            .and_then(Option::as_mut)
            .ok_or_else(|| FemError::config(format!("unknown group {}", group.0)))?;
        let inserted = members.insert(node);
        if inserted {
            self.topology_revision += 1;
        }
        Ok(inserted)
    }

    /// Members of a group, in ascending node order
    pub fn group_nodes(&self, group: GroupId) -> Result<&BTreeSet<NodeId>> {
        self.group_members(group)
    }

    pub fn group_num_members(&self, group: GroupId) -> Result<usize> {
        Ok(self.group_members(group)?.len())
    }

    /// Delete a group; its handle becomes invalid
    ///
    /// Constraints still referring to the group fail at the next DOF numbering.
    pub fn group_delete(&mut self, group: GroupId) -> Result<()> {
        self.group_members(group)?;
        self.groups[group.0] = None;
        self.topology_revision += 1;
        Ok(())
    }

    /// New group with the nodes of either group
    pub fn group_union(&mut self, first: GroupId, second: GroupId) -> Result<GroupId> {
        self.combine_groups(first, second, |a, b| a.union(b).copied().collect())
    }

    /// New group with the nodes of `first` that are not in `second`
    pub fn group_difference(&mut self, first: GroupId, second: GroupId) -> Result<GroupId> {
        self.combine_groups(first, second, |a, b| a.difference(b).copied().collect())
    }

    /// New group with the nodes of both groups
    pub fn group_intersection(&mut self, first: GroupId, second: GroupId) -> Result<GroupId> {
        self.combine_groups(first, second, |a, b| a.intersection(b).copied().collect())
    }

    /// New group with the nodes of exactly one of the groups
    pub fn group_symmetric_difference(
        &mut self,
        first: GroupId,
        second: GroupId,
    ) -> Result<GroupId> {
        self.combine_groups(first, second, |a, b| {
            a.symmetric_difference(b).copied().collect()
        })
    }

    fn combine_groups(
        &mut self,
        first: GroupId,
        second: GroupId,
        combine: impl Fn(&BTreeSet<NodeId>, &BTreeSet<NodeId>) -> BTreeSet<NodeId>,
    ) -> Result<GroupId> {
        let members = combine(self.group_members(first)?, self.group_members(second)?);
        if !members.is_empty() {
            self.topology_revision += 1;
        }
        self.groups.push(Some(members));
        Ok(GroupId(self.groups.len() - 1))
    }

    pub fn topology_revision(&self) -> u64 {
        self.topology_revision
    }

    /// Write solver values back to the nodes
    ///
    /// Active DOFs take their value from `active`, dependent DOFs are
    /// recomputed from the constraint relations and the current prescribed
    /// values.
    pub fn merge_active_dof_values(
        &mut self,
        numbering: &DofNumbering,
        constraints: &Constraints,
        active: &DVector<f64>,
    ) -> Result<()> {
        numbering.check_current(self, constraints)?;
        let full = numbering.expand(constraints, active)?;
        for (i, node) in self.nodes.iter_mut().enumerate() {
            node.displacement = Vector3::new(full[3 * i], full[3 * i + 1], full[3 * i + 2]);
        }
        Ok(())
    }

    /// Displacements of all nodes as a full DOF vector
    pub fn displacement_vector(&self) -> DVector<f64> {
        DVector::from_iterator(
            self.num_dofs(),
            self.nodes.iter().flat_map(|node| node.displacement.iter().copied()),
        )
    }

    pub(crate) fn snapshot_displacements(&self) -> Vec<Vector3<f64>> {
        self.nodes.iter().map(|node| node.displacement).collect()
    }

    pub(crate) fn restore_displacements(&mut self, snapshot: &[Vector3<f64>]) {
        for (node, displacement) in self.nodes.iter_mut().zip(snapshot) {
            node.displacement = *displacement;
        }
    }

    /// Record provisional integration point states from an assembly pass
    pub fn store_responses(&mut self, responses: &[ElementResponse]) -> Result<()> {
        if responses.len() != self.elements.len() {
            return Err(FemError::config(format!(
                "{} element responses for {} elements",
                responses.len(),
                self.elements.len()
            )));
        }
        for (index, (element, response)) in self.elements.iter_mut().zip(responses).enumerate() {
            if response.points.len() != element.points.len() {
                return Err(FemError::config(format!(
                    "element {}: {} point states for {} integration points",
                    index,
                    response.points.len(),
                    element.points.len()
                )));
            }
            for (point, state) in element.points.iter_mut().zip(&response.points) {
                point.current = *state;
            }
        }
        Ok(())
    }

    /// Commit the provisional state of every integration point
    ///
    /// Only valid after a load step converged.
    pub fn update_static_data(&mut self) {
        for point in self.elements.iter_mut().flat_map(|e| e.points.iter_mut()) {
            point.committed = point.current;
        }
    }

    /// Reset every integration point to its committed state
    pub fn discard_provisional_state(&mut self) {
        for point in self.elements.iter_mut().flat_map(|e| e.points.iter_mut()) {
            point.current = point.committed;
        }
    }

    fn point_values(&self, id: ElementId, value: impl Fn(&IntegrationPoint) -> Voigt) -> Result<Vec<Voigt>> {
        Ok(self.element(id)?.points.iter().map(value).collect())
    }

    /// Engineering strain of every integration point
    pub fn element_strain(&self, id: ElementId) -> Result<Vec<Voigt>> {
        self.point_values(id, |p| p.current.strain)
    }

    /// Stress of every integration point
    pub fn element_stress(&self, id: ElementId) -> Result<Vec<Voigt>> {
        self.point_values(id, |p| p.current.stress)
    }

    /// Plastic strain of every integration point (engineering shear)
    pub fn element_plastic_strain(&self, id: ElementId) -> Result<Vec<Voigt>> {
        self.point_values(id, |p| p.current.history.plastic_strain)
    }

    /// Global coordinates of the integration points
    pub fn element_integration_point_coordinates(&self, id: ElementId) -> Result<Vec<Vector3<f64>>> {
        let element = self.element(id)?;
        let coordinates = self.element_coordinates(element)?;
        element.kind.integration_point_coordinates(&coordinates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materials::{ConstitutiveLaw, LinearElastic};

    fn make_materials() -> (MaterialLibrary, MaterialId) {
        let mut materials = MaterialLibrary::new();
        let id = materials.add(ConstitutiveLaw::LinearElastic(
            LinearElastic::new(100.0, 0.3).unwrap(),
        ));
        (materials, id)
    }

    fn make_cube_nodes(mesh: &mut Mesh) -> Vec<NodeId> {
        [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
            [1.0, 0.0, 1.0],
            [1.0, 1.0, 1.0],
            [0.0, 1.0, 1.0],
        ]
        .iter()
        .map(|&[x, y, z]| mesh.create_node(Vector3::new(x, y, z)))
        .collect()
    }

    #[test]
    fn create_element_validates_topology() {
        let (materials, steel) = make_materials();
        let mut mesh = Mesh::new();
        let nodes = make_cube_nodes(&mut mesh);

        assert!(mesh
            .create_element(ElementKind::Brick8, &nodes[..7], steel, &materials)
            .is_err());

        let mut unknown = nodes.clone();
        unknown[3] = NodeId(42);
        assert!(mesh
            .create_element(ElementKind::Brick8, &unknown, steel, &materials)
            .is_err());

        assert!(mesh
            .create_element(ElementKind::Brick8, &nodes, MaterialId(9), &materials)
            .is_err());

        let id = mesh
            .create_element(ElementKind::Brick8, &nodes, steel, &materials)
            .unwrap();
        assert_eq!(mesh.element(id).unwrap().integration_points().len(), 8);
        assert_eq!(mesh.element(id).unwrap().dof_indices()[3..6], [3, 4, 5]);
    }

    fn make_two_groups(mesh: &mut Mesh) -> (Vec<NodeId>, GroupId, GroupId) {
        let nodes = make_cube_nodes(mesh);
        let bottom = mesh.create_group();
        let left = mesh.create_group();
        for &node in &nodes {
            let x = mesh.node(node).unwrap().coordinates();
            if x[2] == 0.0 {
                mesh.group_add_node(bottom, node).unwrap();
            }
            if x[0] == 0.0 {
                mesh.group_add_node(left, node).unwrap();
            }
        }
        (nodes, bottom, left)
    }

    #[test]
    fn group_set_operations_create_new_groups() {
        let mut mesh = Mesh::new();
        let (nodes, bottom, left) = make_two_groups(&mut mesh);
        let members = |mesh: &Mesh, group| -> Vec<NodeId> {
            mesh.group_nodes(group).unwrap().iter().copied().collect()
        };

        let union = mesh.group_union(bottom, left).unwrap();
        assert_eq!(
            members(&mesh, union),
            vec![nodes[0], nodes[1], nodes[2], nodes[3], nodes[4], nodes[7]]
        );

        let intersection = mesh.group_intersection(bottom, left).unwrap();
        assert_eq!(members(&mesh, intersection), vec![nodes[0], nodes[3]]);

        let difference = mesh.group_difference(bottom, left).unwrap();
        assert_eq!(members(&mesh, difference), vec![nodes[1], nodes[2]]);

        let symmetric = mesh.group_symmetric_difference(bottom, left).unwrap();
        assert_eq!(
            members(&mesh, symmetric),
            vec![nodes[1], nodes[2], nodes[4], nodes[7]]
        );
        assert_eq!(mesh.group_num_members(symmetric).unwrap(), 4);

        // operands are left untouched
        assert_eq!(mesh.group_num_members(bottom).unwrap(), 4);
        assert_eq!(mesh.group_num_members(left).unwrap(), 4);
        assert!(mesh.group_union(bottom, GroupId(42)).is_err());
    }

    #[test]
    fn group_operations_track_topology_revision() {
        let mut mesh = Mesh::new();
        let (_, bottom, left) = make_two_groups(&mut mesh);

        let before = mesh.topology_revision();
        let union = mesh.group_union(bottom, left).unwrap();
        assert!(mesh.topology_revision() > before);

        // an empty result adds no membership
        let top = mesh.create_group();
        let before = mesh.topology_revision();
        let empty = mesh.group_intersection(top, bottom).unwrap();
        assert_eq!(mesh.group_num_members(empty).unwrap(), 0);
        assert_eq!(mesh.topology_revision(), before);

        mesh.group_delete(union).unwrap();
        assert!(mesh.topology_revision() > before);
        assert!(mesh.group_nodes(union).is_err());
        assert!(mesh.group_delete(union).is_err());

        // handles are not reused after deletion
        let next = mesh.create_group();
        assert_ne!(next, union);
    }

    #[test]
    fn group_membership_is_idempotent() {
        let mut mesh = Mesh::new();
        let a = mesh.create_node(Vector3::zeros());
        let group = mesh.create_group();

        assert!(mesh.group_add_node(group, a).unwrap());
        let revision = mesh.topology_revision();
        assert!(!mesh.group_add_node(group, a).unwrap());
        assert_eq!(mesh.topology_revision(), revision);
        assert_eq!(mesh.group_nodes(group).unwrap().len(), 1);

        assert!(mesh.group_add_node(GroupId(3), a).is_err());
        assert!(mesh.group_add_node(group, NodeId(5)).is_err());
    }

    #[test]
    fn integration_point_coordinates_follow_geometry() {
        let (materials, steel) = make_materials();
        let mut mesh = Mesh::new();
        let nodes = make_cube_nodes(&mut mesh);
        let id = mesh
            .create_element(ElementKind::Brick8, &nodes, steel, &materials)
            .unwrap();

        let points = mesh.element_integration_point_coordinates(id).unwrap();
        let centroid = points.iter().fold(Vector3::zeros(), |acc, p| acc + p) / 8.0;
        assert!((centroid - Vector3::new(0.5, 0.5, 0.5)).norm() < 1e-14);
    }

    #[test]
    fn provisional_state_is_committed_or_discarded() {
        let (materials, steel) = make_materials();
        let mut mesh = Mesh::new();
        let nodes = make_cube_nodes(&mut mesh);
        let id = mesh
            .create_element(ElementKind::Brick8, &nodes, steel, &materials)
            .unwrap();

        let mut response = crate::assembly::evaluate_elements(&mesh, &materials, false).unwrap();
        for point in &mut response[0].points {
            point.strain[0] = 0.01;
        }

        mesh.store_responses(&response).unwrap();
        assert_eq!(mesh.element_strain(id).unwrap()[0][0], 0.01);

        mesh.discard_provisional_state();
        assert_eq!(mesh.element_strain(id).unwrap()[0][0], 0.0);

        mesh.store_responses(&response).unwrap();
        mesh.update_static_data();
        mesh.discard_provisional_state();
        assert_eq!(mesh.element_strain(id).unwrap()[0][0], 0.01);

        assert!(mesh.store_responses(&[]).is_err());
    }
}
