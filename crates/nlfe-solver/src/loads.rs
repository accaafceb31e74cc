//! Explicit nodal forces.

use crate::constraints::normalize_direction;
use crate::error::{FemError, Result};
use crate::mesh::{Mesh, NodeId};
use nalgebra::{DVector, Vector3};
use serde::{Deserialize, Serialize};

/// Handle of a nodal force
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LoadId(pub usize);

/// Force of magnitude `value` acting on a node along a unit direction
#[derive(Debug, Clone, PartialEq)]
pub struct NodalForce {
    pub node: NodeId,
    pub direction: Vector3<f64>,
    pub value: f64,
}

/// External nodal forces of a model
#[derive(Debug, Clone, Default)]
pub struct NodalLoads {
    forces: Vec<NodalForce>,
}

impl NodalLoads {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node_force(&mut self, node: NodeId, direction: Vector3<f64>, value: f64) -> Result<LoadId> {
        let direction = normalize_direction(direction)?;
        check_finite(value)?;
        self.forces.push(NodalForce {
            node,
            direction,
            value,
        });
        Ok(LoadId(self.forces.len() - 1))
    }

    pub fn set_value(&mut self, id: LoadId, value: f64) -> Result<()> {
        check_finite(value)?;
        let force = self
            .forces
            .get_mut(id.0)
            .ok_or_else(|| FemError::config(format!("unknown load {}", id.0)))?;
        force.value = value;
        Ok(())
    }

    pub fn value(&self, id: LoadId) -> Result<f64> {
        self.forces
            .get(id.0)
            .map(|force| force.value)
            .ok_or_else(|| FemError::config(format!("unknown load {}", id.0)))
    }

    pub fn iter(&self) -> impl Iterator<Item = (LoadId, &NodalForce)> {
        self.forces.iter().enumerate().map(|(i, f)| (LoadId(i), f))
    }

    pub fn len(&self) -> usize {
        self.forces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forces.is_empty()
    }

    /// Sum of all forces as a full DOF vector
    pub fn full_vector(&self, mesh: &Mesh) -> Result<DVector<f64>> {
        let mut full = DVector::zeros(mesh.num_dofs());
        for force in &self.forces {
            mesh.node(force.node)?;
            for k in 0..3 {
                full[3 * force.node.0 + k] += force.value * force.direction[k];
            }
        }
        Ok(full)
    }
}

fn check_finite(value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(FemError::config(format!("load value must be finite, got {}", value)));
    }
    Ok(())
}
