//! Finite element library for nonlinear solid mechanics.
//!
//! Element types form a closed set ([`ElementKind`]); every call site
//! dispatches on it exhaustively. An element evaluation is a pure function of
//! the reference geometry, the current nodal displacements and the committed
//! history of its integration points.

use crate::error::Result;
use crate::materials::{ConstitutiveLaw, PlasticHistory, Voigt};
use crate::reporting::equivalent_stress;
use nalgebra::{DMatrix, DVector, Vector3};
use serde::{Deserialize, Serialize};

pub mod brick8;

pub use brick8::Brick8;

/// Supported element types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementKind {
    /// 8-node hexahedron, 2×2×2 Gauss integration
    Brick8,
}

impl ElementKind {
    pub fn num_nodes(self) -> usize {
        match self {
            ElementKind::Brick8 => Brick8::NUM_NODES,
        }
    }

    pub fn num_integration_points(self) -> usize {
        match self {
            ElementKind::Brick8 => Brick8::NUM_INTEGRATION_POINTS,
        }
    }

    /// Number of displacement DOFs of the element (3 per node)
    pub fn num_dofs(self) -> usize {
        3 * self.num_nodes()
    }

    pub fn name(self) -> &'static str {
        match self {
            ElementKind::Brick8 => "Brick8",
        }
    }

    /// Reject invalid geometry (wrong node count, non-positive Jacobian)
    pub fn check_geometry(self, coordinates: &[Vector3<f64>]) -> Result<()> {
        match self {
            ElementKind::Brick8 => Brick8::check_geometry(coordinates),
        }
    }

    pub fn integration_point_coordinates(
        self,
        coordinates: &[Vector3<f64>],
    ) -> Result<Vec<Vector3<f64>>> {
        match self {
            ElementKind::Brick8 => Brick8::integration_point_coordinates(coordinates),
        }
    }

    /// Tangent stiffness, internal force and provisional point states
    pub fn evaluate(
        self,
        coordinates: &[Vector3<f64>],
        displacements: &[Vector3<f64>],
        law: &ConstitutiveLaw,
        committed: &[PlasticHistory],
    ) -> Result<ElementResponse> {
        match self {
            ElementKind::Brick8 => Brick8::evaluate(coordinates, displacements, law, committed),
        }
    }
}

/// State of one integration point
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PointState {
    /// Total engineering strain
    pub strain: Voigt,
    pub stress: Voigt,
    pub history: PlasticHistory,
}

impl PointState {
    pub fn plastic_strain(&self) -> Voigt {
        self.history.plastic_strain
    }

    /// Von Mises equivalent stress
    pub fn equivalent_stress(&self) -> f64 {
        equivalent_stress(&self.stress)
    }
}

/// Integration point with committed (static) and provisional (current) state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntegrationPoint {
    pub committed: PointState,
    pub current: PointState,
}

impl IntegrationPoint {
    pub(crate) fn new(history: PlasticHistory) -> Self {
        let state = PointState {
            history,
            ..PointState::default()
        };
        Self {
            committed: state,
            current: state,
        }
    }
}

/// Result of one element evaluation
#[derive(Debug, Clone)]
pub struct ElementResponse {
    /// Element tangent stiffness (num_dofs × num_dofs)
    pub stiffness: DMatrix<f64>,
    /// Element internal force (num_dofs)
    pub internal_force: DVector<f64>,
    /// Provisional state of every integration point
    pub points: Vec<PointState>,
}
