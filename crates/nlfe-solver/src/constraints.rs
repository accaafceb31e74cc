//! Prescribed displacement constraints.
//!
//! A constraint prescribes the displacement component of a node, or of every
//! node in a group, along a direction:
//!
//! ```text
//! d · u_node = value
//! ```
//!
//! Directions are normalized at registration and may be oblique. A node may
//! carry several constraints in independent directions. The prescribed value
//! (right-hand side) can be changed per load step with [`Constraints::set_rhs`]
//! without invalidating an existing DOF numbering; registering a new
//! constraint does invalidate it.

use crate::error::{FemError, Result};
use crate::mesh::{GroupId, NodeId};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Two unit directions closer than this are considered parallel
const PARALLEL_TOLERANCE: f64 = 1e-10;

/// Handle of a constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConstraintId(pub usize);

/// Entity a constraint applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintTarget {
    Node(NodeId),
    Group(GroupId),
}

/// A displacement constraint
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub target: ConstraintTarget,
    /// Unit direction
    pub direction: Vector3<f64>,
    /// Prescribed value along `direction`
    pub value: f64,
}

/// Registry of displacement constraints
#[derive(Debug, Clone, Default)]
pub struct Constraints {
    constraints: Vec<Constraint>,
    /// Bumped when a constraint is registered, not when a value changes
    revision: u64,
}

impl Constraints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prescribe the displacement of a node along `direction`
    ///
    /// # Errors
    /// Zero-length direction, or a constraint on the same node with a
    /// parallel direction already exists.
    pub fn set_displacement_node(
        &mut self,
        node: NodeId,
        direction: Vector3<f64>,
        value: f64,
    ) -> Result<ConstraintId> {
        self.register(ConstraintTarget::Node(node), direction, value)
    }

    /// Prescribe the displacement of every node in a group along `direction`
    pub fn set_displacement_group(
        &mut self,
        group: GroupId,
        direction: Vector3<f64>,
        value: f64,
    ) -> Result<ConstraintId> {
        self.register(ConstraintTarget::Group(group), direction, value)
    }

    fn register(
        &mut self,
        target: ConstraintTarget,
        direction: Vector3<f64>,
        value: f64,
    ) -> Result<ConstraintId> {
        let direction = normalize_direction(direction)?;
        if !value.is_finite() {
            return Err(FemError::config(format!(
                "prescribed value must be finite, got {}",
                value
            )));
        }
        if let Some(existing) = self.constraints.iter().position(|c| {
            c.target == target && (c.direction.dot(&direction).abs() - 1.0).abs() < PARALLEL_TOLERANCE
        }) {
            return Err(FemError::config(format!(
                "{:?} is already constrained along a parallel direction by constraint {}",
                target, existing
            )));
        }

        self.constraints.push(Constraint {
            target,
            direction,
            value,
        });
        self.revision += 1;
        Ok(ConstraintId(self.constraints.len() - 1))
    }

    /// Change the prescribed value of a constraint
    pub fn set_rhs(&mut self, id: ConstraintId, value: f64) -> Result<()> {
        if !value.is_finite() {
            return Err(FemError::config(format!(
                "prescribed value must be finite, got {}",
                value
            )));
        }
        let constraint = self
            .constraints
            .get_mut(id.0)
            .ok_or_else(|| FemError::config(format!("unknown constraint {}", id.0)))?;
        constraint.value = value;
        Ok(())
    }

    pub fn rhs(&self, id: ConstraintId) -> Result<f64> {
        Ok(self.get(id)?.value)
    }

    pub fn get(&self, id: ConstraintId) -> Result<&Constraint> {
        self.constraints
            .get(id.0)
            .ok_or_else(|| FemError::config(format!("unknown constraint {}", id.0)))
    }

    pub fn iter(&self) -> impl Iterator<Item = (ConstraintId, &Constraint)> {
        self.constraints
            .iter()
            .enumerate()
            .map(|(i, c)| (ConstraintId(i), c))
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }
}

/// Normalize a direction vector, rejecting zero and non-finite input
pub(crate) fn normalize_direction(direction: Vector3<f64>) -> Result<Vector3<f64>> {
    let norm = direction.norm();
    if !norm.is_finite() || norm < 1e-12 {
        return Err(FemError::config(format!(
            "direction [{}, {}, {}] cannot be normalized",
            direction[0], direction[1], direction[2]
        )));
    }
    Ok(direction / norm)
}
