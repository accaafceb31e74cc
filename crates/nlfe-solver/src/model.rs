//! A complete model: mesh, materials, constraints and loads.

use crate::constraints::Constraints;
use crate::elements::ElementKind;
use crate::error::Result;
use crate::loads::NodalLoads;
use crate::materials::{ConstitutiveLaw, MaterialId, MaterialLibrary};
use crate::mesh::{ElementId, Mesh, NodeId};

/// Everything the nonlinear driver needs to advance a solution
#[derive(Debug, Clone, Default)]
pub struct Model {
    pub mesh: Mesh,
    pub materials: MaterialLibrary,
    pub constraints: Constraints,
    pub loads: NodalLoads,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constitutive law
    pub fn add_material(&mut self, law: ConstitutiveLaw) -> MaterialId {
        self.materials.add(law)
    }

    /// Create an element using the model's material library
    pub fn create_element(
        &mut self,
        kind: ElementKind,
        nodes: &[NodeId],
        material: MaterialId,
    ) -> Result<ElementId> {
        self.mesh
            .create_element(kind, nodes, material, &self.materials)
    }
}
