//! Global DOF numbering with constraint elimination.
//!
//! Every constraint contributes one linear equation per constrained node:
//!
//! ```text
//! Σ_k d_k · u_(node, k) = value
//! ```
//!
//! The equations are brought to reduced row echelon form by Gauss-Jordan
//! elimination. The pivot of each equation is the DOF with the largest
//! coefficient (first DOF on ties); pivot DOFs become *dependent*, all
//! remaining DOFs stay *active*. Each dependent DOF is then expressed as
//!
//! ```text
//! u_dep = Σ_c w_c · value_c − Σ_a c_a · u_active_a
//! ```
//!
//! Active and dependent DOFs are numbered contiguously in node order.
//! The full displacement vector is `u = T·a + g`, where `T` maps active values
//! to all DOFs and `g` carries the prescribed values.

use crate::constraints::{ConstraintId, ConstraintTarget, Constraints};
use crate::error::{FemError, Result};
use crate::mesh::{Mesh, NodeId};
use nalgebra::DVector;
use std::collections::BTreeMap;

/// Pivots below this magnitude indicate conflicting or redundant constraints
const PIVOT_TOLERANCE: f64 = 1e-10;

/// Coefficients below this magnitude are dropped during elimination
const DROP_TOLERANCE: f64 = 1e-14;

/// Status of a DOF in a numbering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DofStatus {
    /// Unknown solved for, with its active index
    Active(usize),
    /// Value follows from the constraints, with its dependent index
    Dependent(usize),
}

/// Relation of one dependent DOF
#[derive(Debug, Clone, PartialEq)]
struct DependentRelation {
    /// Full index of the dependent DOF
    dof: usize,
    /// `(active index, coefficient)`: u_dep −= coefficient · u_active
    coupling: Vec<(usize, f64)>,
    /// `(constraint, weight)`: u_dep += weight · value
    rhs_weights: Vec<(ConstraintId, f64)>,
}

/// One constraint equation during elimination
struct Equation {
    /// Full DOF index → coefficient
    coefficients: BTreeMap<usize, f64>,
    /// Combination of original equations, i.e. one row of the tracking matrix
    combination: BTreeMap<usize, f64>,
}

impl Equation {
    /// self −= factor · other
    fn subtract(&mut self, factor: f64, other: &Equation) {
        axpy(&mut self.coefficients, -factor, &other.coefficients);
        axpy(&mut self.combination, -factor, &other.combination);
    }

    fn scale(&mut self, factor: f64) {
        self.coefficients.values_mut().for_each(|v| *v *= factor);
        self.combination.values_mut().for_each(|v| *v *= factor);
    }

    /// DOF with the largest coefficient magnitude, first index on ties
    fn pivot(&self) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for (&dof, &value) in &self.coefficients {
            if best.is_none_or(|(_, b)| value.abs() > b.abs()) {
                best = Some((dof, value));
            }
        }
        best.filter(|(_, value)| value.abs() > PIVOT_TOLERANCE)
    }
}

fn axpy(target: &mut BTreeMap<usize, f64>, factor: f64, source: &BTreeMap<usize, f64>) {
    for (&key, &value) in source {
        let entry = target.entry(key).or_insert(0.0);
        *entry += factor * value;
        if entry.abs() < DROP_TOLERANCE {
            target.remove(&key);
        }
    }
}

/// Partition of all displacement DOFs into active and dependent sets
#[derive(Debug, Clone, PartialEq)]
pub struct DofNumbering {
    /// Status of every full DOF index
    status: Vec<DofStatus>,
    /// Full index of every active DOF
    active_dofs: Vec<usize>,
    /// Relation of every dependent DOF, by dependent index
    relations: Vec<DependentRelation>,
    constraint_revision: u64,
    topology_revision: u64,
}

impl DofNumbering {
    /// Number all DOFs of the mesh subject to the constraints
    ///
    /// # Errors
    /// Constraints on unknown nodes or groups, and conflicting or linearly
    /// dependent constraint equations.
    pub fn build(mesh: &Mesh, constraints: &Constraints) -> Result<Self> {
        let num_dofs = mesh.num_dofs();

        // one equation per (constraint, node)
        let mut sources: Vec<ConstraintId> = Vec::new();
        let mut equations: Vec<Equation> = Vec::new();
        for (id, constraint) in constraints.iter() {
            let nodes: Vec<NodeId> = match constraint.target {
                ConstraintTarget::Node(node) => {
                    mesh.node(node)?;
                    vec![node]
                }
                ConstraintTarget::Group(group) => mesh.group_nodes(group)?.iter().copied().collect(),
            };
            for node in nodes {
                let coefficients = (0..3)
                    .filter(|&k| constraint.direction[k].abs() > DROP_TOLERANCE)
                    .map(|k| (3 * node.0 + k, constraint.direction[k]))
                    .collect();
                let row = equations.len();
                equations.push(Equation {
                    coefficients,
                    combination: BTreeMap::from([(row, 1.0)]),
                });
                sources.push(id);
            }
        }

        // Gauss-Jordan elimination, row by row
        let mut pivots: Vec<usize> = Vec::with_capacity(equations.len());
        for row in 0..equations.len() {
            let (pivot, value) = equations[row].pivot().ok_or_else(|| {
                FemError::config(format!(
                    "constraint {} conflicts with or duplicates previous constraints",
                    sources[row].0
                ))
            })?;
            equations[row].scale(1.0 / value);

            let (before, rest) = equations.split_at_mut(row);
            let (current, after) = rest.split_at_mut(1);
            let current = &current[0];
            for other in before.iter_mut().chain(after.iter_mut()) {
                if let Some(&factor) = other.coefficients.get(&pivot) {
                    other.subtract(factor, current);
                    other.coefficients.remove(&pivot);
                }
            }
            pivots.push(pivot);
        }

        // number dependent and active DOFs in node order
        let mut pivot_rows: BTreeMap<usize, usize> = BTreeMap::new();
        for (row, &pivot) in pivots.iter().enumerate() {
            pivot_rows.insert(pivot, row);
        }

        let mut status = Vec::with_capacity(num_dofs);
        let mut active_dofs = Vec::new();
        let mut dependent_count = 0;
        for dof in 0..num_dofs {
            if pivot_rows.contains_key(&dof) {
                status.push(DofStatus::Dependent(dependent_count));
                dependent_count += 1;
            } else {
                status.push(DofStatus::Active(active_dofs.len()));
                active_dofs.push(dof);
            }
        }

        let mut relations = Vec::with_capacity(dependent_count);
        for (&dof, &row) in &pivot_rows {
            let equation = &equations[row];
            let mut coupling = Vec::new();
            for (&other, &coefficient) in &equation.coefficients {
                if other == dof {
                    continue;
                }
                match status[other] {
                    DofStatus::Active(index) => coupling.push((index, coefficient)),
                    DofStatus::Dependent(_) => {
                        return Err(FemError::config(format!(
                            "elimination left dependent DOF {} coupled to dependent DOF {}",
                            dof, other
                        )));
                    }
                }
            }

            // several equations may stem from the same constraint (groups)
            let mut weights: BTreeMap<ConstraintId, f64> = BTreeMap::new();
            for (&source_row, &weight) in &equation.combination {
                *weights.entry(sources[source_row]).or_insert(0.0) += weight;
            }

            relations.push(DependentRelation {
                dof,
                coupling,
                rhs_weights: weights.into_iter().filter(|(_, w)| *w != 0.0).collect(),
            });
        }

        Ok(Self {
            status,
            active_dofs,
            relations,
            constraint_revision: constraints.revision(),
            topology_revision: mesh.topology_revision(),
        })
    }

    pub fn num_active_dofs(&self) -> usize {
        self.active_dofs.len()
    }

    pub fn num_dependent_dofs(&self) -> usize {
        self.relations.len()
    }

    /// Number of all DOFs (active and dependent)
    pub fn num_dofs(&self) -> usize {
        self.status.len()
    }

    /// Status of DOF `direction` (0..3) of a node
    pub fn status(&self, node: NodeId, direction: usize) -> Result<DofStatus> {
        if direction >= 3 {
            return Err(FemError::config(format!("invalid DOF direction {}", direction)));
        }
        self.status
            .get(3 * node.0 + direction)
            .copied()
            .ok_or_else(|| FemError::config(format!("node {} is not numbered", node.0)))
    }

    /// Whether the numbering still matches the mesh and the constraints
    pub fn is_current(&self, mesh: &Mesh, constraints: &Constraints) -> bool {
        self.topology_revision == mesh.topology_revision()
            && self.constraint_revision == constraints.revision()
            && self.status.len() == mesh.num_dofs()
    }

    pub fn check_current(&self, mesh: &Mesh, constraints: &Constraints) -> Result<()> {
        if !self.is_current(mesh, constraints) {
            return Err(FemError::config(
                "DOF numbering is stale: constraints or mesh changed since it was built",
            ));
        }
        Ok(())
    }

    fn check_topology(&self, mesh: &Mesh) -> Result<()> {
        if self.topology_revision != mesh.topology_revision() || self.status.len() != mesh.num_dofs() {
            return Err(FemError::config(
                "DOF numbering is stale: mesh changed since it was built",
            ));
        }
        Ok(())
    }

    fn check_active_len(&self, active: &DVector<f64>) -> Result<()> {
        if active.len() != self.num_active_dofs() {
            return Err(FemError::config(format!(
                "active vector has {} entries, numbering has {} active DOFs",
                active.len(),
                self.num_active_dofs()
            )));
        }
        Ok(())
    }

    /// Column entries of `T` for a full DOF: `(active index, coefficient)`
    ///
    /// `dof` must be below `num_dofs()`; callers check the numbering first.
    pub(crate) fn transformation(&self, dof: usize) -> Vec<(usize, f64)> {
        match self.status[dof] {
            DofStatus::Active(index) => vec![(index, 1.0)],
            DofStatus::Dependent(index) => self.relations[index]
                .coupling
                .iter()
                .map(|&(active, coefficient)| (active, -coefficient))
                .collect(),
        }
    }

    /// Value of a dependent DOF for the given active values
    fn dependent_value(
        &self,
        index: usize,
        constraints: &Constraints,
        active: &DVector<f64>,
    ) -> Result<f64> {
        let relation = &self.relations[index];
        let mut value = 0.0;
        for &(id, weight) in &relation.rhs_weights {
            value += weight * constraints.rhs(id)?;
        }
        for &(a, coefficient) in &relation.coupling {
            value -= coefficient * active[a];
        }
        Ok(value)
    }

    /// Full DOF vector `T·a + g` for the given active values
    pub fn expand(&self, constraints: &Constraints, active: &DVector<f64>) -> Result<DVector<f64>> {
        self.check_active_len(active)?;
        let mut full = DVector::zeros(self.num_dofs());
        for (index, &dof) in self.active_dofs.iter().enumerate() {
            full[dof] = active[index];
        }
        for index in 0..self.relations.len() {
            full[self.relations[index].dof] = self.dependent_value(index, constraints, active)?;
        }
        Ok(full)
    }

    /// Active values of the current nodal displacements
    pub fn gather_active(&self, mesh: &Mesh) -> Result<DVector<f64>> {
        self.check_topology(mesh)?;
        let full = mesh.displacement_vector();
        Ok(DVector::from_iterator(
            self.num_active_dofs(),
            self.active_dofs.iter().map(|&dof| full[dof]),
        ))
    }

    /// Reduce a full vector to active ordering: `Tᵀ·v`
    pub fn reduce(&self, full: &DVector<f64>) -> Result<DVector<f64>> {
        if full.len() != self.num_dofs() {
            return Err(FemError::config(format!(
                "full vector has {} entries, numbering has {} DOFs",
                full.len(),
                self.num_dofs()
            )));
        }
        let mut reduced = DVector::zeros(self.num_active_dofs());
        for (dof, &value) in full.iter().enumerate() {
            if value == 0.0 {
                continue;
            }
            for (index, coefficient) in self.transformation(dof) {
                reduced[index] += coefficient * value;
            }
        }
        Ok(reduced)
    }

    /// Difference between the prescribed and the current nodal displacements
    ///
    /// Zero at active DOFs. Non-zero entries mean new Dirichlet data has not
    /// been applied to the nodes yet.
    pub fn dirichlet_increment(&self, mesh: &Mesh, constraints: &Constraints) -> Result<DVector<f64>> {
        self.check_current(mesh, constraints)?;
        let current = mesh.displacement_vector();
        let active = self.gather_active(mesh)?;
        let mut increment = DVector::zeros(self.num_dofs());
        for index in 0..self.relations.len() {
            let dof = self.relations[index].dof;
            increment[dof] = self.dependent_value(index, constraints, &active)? - current[dof];
        }
        Ok(increment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    fn make_mesh(num_nodes: usize) -> (Mesh, Vec<NodeId>) {
        let mut mesh = Mesh::new();
        let nodes = (0..num_nodes)
            .map(|i| mesh.create_node(Vector3::new(i as f64, 0.0, 0.0)))
            .collect();
        (mesh, nodes)
    }

    #[test]
    fn axis_constraints_partition_dofs() {
        let (mesh, nodes) = make_mesh(2);
        let mut constraints = Constraints::new();
        constraints.set_displacement_node(nodes[0], Vector3::x(), 0.0).unwrap();
        constraints.set_displacement_node(nodes[0], Vector3::y(), 0.0).unwrap();
        constraints.set_displacement_node(nodes[1], Vector3::z(), 0.5).unwrap();

        let numbering = DofNumbering::build(&mesh, &constraints).unwrap();
        assert_eq!(numbering.num_active_dofs(), 3);
        assert_eq!(numbering.num_dependent_dofs(), 3);
        assert_eq!(numbering.status(nodes[0], 0).unwrap(), DofStatus::Dependent(0));
        assert_eq!(numbering.status(nodes[0], 2).unwrap(), DofStatus::Active(0));
        assert_eq!(numbering.status(nodes[1], 2).unwrap(), DofStatus::Dependent(2));

        let full = numbering
            .expand(&constraints, &DVector::from_vec(vec![1.0, 2.0, 3.0]))
            .unwrap();
        assert_eq!(full.as_slice(), &[0.0, 0.0, 1.0, 2.0, 3.0, 0.5]);
    }

    #[test]
    fn oblique_constraint_couples_components() {
        let (mesh, nodes) = make_mesh(1);
        let mut constraints = Constraints::new();
        // (u_x + 2 u_y) / √5 = 1
        constraints
            .set_displacement_node(nodes[0], Vector3::new(1.0, 2.0, 0.0), 1.0)
            .unwrap();

        let numbering = DofNumbering::build(&mesh, &constraints).unwrap();
        assert_eq!(numbering.status(nodes[0], 1).unwrap(), DofStatus::Dependent(0));
        assert_eq!(numbering.num_active_dofs(), 2);

        let full = numbering
            .expand(&constraints, &DVector::from_vec(vec![0.4, -1.0]))
            .unwrap();
        let d = Vector3::new(1.0, 2.0, 0.0).normalize();
        let u = Vector3::new(full[0], full[1], full[2]);
        assert!((d.dot(&u) - 1.0).abs() < 1e-14);
        assert_eq!(full[0], 0.4);
        assert_eq!(full[2], -1.0);
    }

    #[test]
    fn dependent_constraints_are_rejected() {
        let (mut mesh, nodes) = make_mesh(1);
        let group = mesh.create_group();
        mesh.group_add_node(group, nodes[0]).unwrap();

        let mut constraints = Constraints::new();
        constraints.set_displacement_node(nodes[0], Vector3::x(), 0.0).unwrap();
        constraints.set_displacement_group(group, Vector3::x(), 1.0).unwrap();

        assert!(matches!(
            DofNumbering::build(&mesh, &constraints),
            Err(FemError::Config(_))
        ));
    }

    #[test]
    fn three_oblique_directions_fix_a_node() {
        let (mesh, nodes) = make_mesh(1);
        let mut constraints = Constraints::new();
        constraints
            .set_displacement_node(nodes[0], Vector3::new(1.0, 1.0, 0.0), 1.0)
            .unwrap();
        constraints
            .set_displacement_node(nodes[0], Vector3::new(1.0, -1.0, 0.0), 0.0)
            .unwrap();
        constraints
            .set_displacement_node(nodes[0], Vector3::new(0.0, 1.0, 1.0), 0.0)
            .unwrap();

        let numbering = DofNumbering::build(&mesh, &constraints).unwrap();
        assert_eq!(numbering.num_active_dofs(), 0);

        let full = numbering.expand(&constraints, &DVector::zeros(0)).unwrap();
        let half = 1.0 / f64::sqrt(2.0);
        assert!((full[0] - half).abs() < 1e-12);
        assert!((full[1] - half).abs() < 1e-12);
        assert!((full[2] + half).abs() < 1e-12);
    }

    #[test]
    fn numbering_goes_stale_on_constraint_change() {
        let (mesh, nodes) = make_mesh(2);
        let mut constraints = Constraints::new();
        let id = constraints.set_displacement_node(nodes[0], Vector3::x(), 0.0).unwrap();
        let numbering = DofNumbering::build(&mesh, &constraints).unwrap();

        constraints.set_rhs(id, 0.3).unwrap();
        assert!(numbering.is_current(&mesh, &constraints));

        constraints.set_displacement_node(nodes[1], Vector3::x(), 0.0).unwrap();
        assert!(!numbering.is_current(&mesh, &constraints));
        assert!(numbering.dirichlet_increment(&mesh, &constraints).is_err());
    }

    #[test]
    fn numbering_of_a_smaller_mesh_reports_errors() {
        let (mut mesh, nodes) = make_mesh(1);
        let mut constraints = Constraints::new();
        constraints.set_displacement_node(nodes[0], Vector3::x(), 0.0).unwrap();
        let numbering = DofNumbering::build(&mesh, &constraints).unwrap();

        let extra = mesh.create_node(Vector3::new(5.0, 0.0, 0.0));
        assert!(numbering.status(extra, 0).is_err());
        assert!(numbering.status(nodes[0], 3).is_err());
        assert!(numbering.reduce(&DVector::zeros(mesh.num_dofs())).is_err());
        assert!(numbering.gather_active(&mesh).is_err());
        assert!(numbering.check_current(&mesh, &constraints).is_err());

        // every DOF of the numbered mesh has a column in T
        for dof in 0..numbering.num_dofs() {
            let column = numbering.transformation(dof);
            assert!(column.iter().all(|&(index, _)| index < numbering.num_active_dofs()));
        }
    }

    #[test]
    fn reduce_is_transpose_of_expand() {
        let (mesh, nodes) = make_mesh(1);
        let mut constraints = Constraints::new();
        constraints
            .set_displacement_node(nodes[0], Vector3::new(0.0, 1.0, 1.0), 0.0)
            .unwrap();
        let numbering = DofNumbering::build(&mesh, &constraints).unwrap();

        // with zero prescribed values expand is linear: <T a, v> == <a, Tᵀ v>
        let a = DVector::from_vec(vec![0.3, -0.7]);
        let v = DVector::from_vec(vec![1.0, 2.0, -4.0]);
        let lhs = numbering.expand(&constraints, &a).unwrap().dot(&v);
        let rhs = a.dot(&numbering.reduce(&v).unwrap());
        assert!((lhs - rhs).abs() < 1e-14);
    }
}
