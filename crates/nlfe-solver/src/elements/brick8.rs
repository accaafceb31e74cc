//! 8-node hexahedral solid element
//!
//! Trilinear isoparametric brick with full 2×2×2 Gauss integration, small
//! strain kinematics and an arbitrary constitutive law per integration point.

use super::{ElementResponse, PointState};
use crate::error::{FemError, Result};
use crate::materials::{ConstitutiveLaw, PlasticHistory, Voigt};
use nalgebra::{DMatrix, DVector, Matrix3, SMatrix, SVector, Vector3};

/// Strain-displacement operator of one integration point
type StrainDisplacement = SMatrix<f64, 6, 24>;

/// Brick8: 8-node hexahedral (brick) element
///
/// Node ordering:
/// ```text
///        8----------7
///       /|         /|
///      / |        / |
///     5----------6  |
///     |  4-------|--3
///     | /        | /
///     |/         |/
///     1----------2
/// ```
///
/// - Bottom face: nodes 1,2,3,4 (ζ = -1 in local coords), counter-clockwise
/// - Top face: nodes 5,6,7,8 (ζ = +1 in local coords)
/// - Local coordinates: ξ, η, ζ ∈ [-1, 1]³
/// - Integration: 2×2×2 Gauss quadrature (8 integration points, weight 1)
/// - DOFs: 3 per node (ux, uy, uz)
#[derive(Debug, Clone, Copy)]
pub struct Brick8;

impl Brick8 {
    pub const NUM_NODES: usize = 8;
    pub const NUM_INTEGRATION_POINTS: usize = 8;

    /// Natural coordinates of the corner nodes
    pub const NATURAL_COORDINATES: [[f64; 3]; 8] = [
        [-1.0, -1.0, -1.0],
        [1.0, -1.0, -1.0],
        [1.0, 1.0, -1.0],
        [-1.0, 1.0, -1.0],
        [-1.0, -1.0, 1.0],
        [1.0, -1.0, 1.0],
        [1.0, 1.0, 1.0],
        [-1.0, 1.0, 1.0],
    ];

    /// Gauss points of the 2×2×2 rule, in the corner order of the nodes
    pub fn integration_points() -> [[f64; 3]; 8] {
        let gp = 1.0 / f64::sqrt(3.0);
        Self::NATURAL_COORDINATES.map(|[xi, eta, zeta]| [xi * gp, eta * gp, zeta * gp])
    }

    /// Shape functions N_i = (1 + ξξ_i)(1 + ηη_i)(1 + ζζ_i) / 8
    pub fn shape_functions(xi: f64, eta: f64, zeta: f64) -> [f64; 8] {
        Self::NATURAL_COORDINATES
            .map(|[xn, en, zn]| (1.0 + xi * xn) * (1.0 + eta * en) * (1.0 + zeta * zn) / 8.0)
    }

    /// Derivatives of the shape functions with respect to natural coordinates
    ///
    /// # Returns
    /// Array of shape [3][8]: rows dN/dξ, dN/dη, dN/dζ
    pub fn shape_derivatives(xi: f64, eta: f64, zeta: f64) -> [[f64; 8]; 3] {
        let mut dn = [[0.0; 8]; 3];
        for (i, &[xn, en, zn]) in Self::NATURAL_COORDINATES.iter().enumerate() {
            dn[0][i] = xn * (1.0 + eta * en) * (1.0 + zeta * zn) / 8.0;
            dn[1][i] = (1.0 + xi * xn) * en * (1.0 + zeta * zn) / 8.0;
            dn[2][i] = (1.0 + xi * xn) * (1.0 + eta * en) * zn / 8.0;
        }
        dn
    }

    /// Jacobian J[r][c] = Σ dN_i/dξ_r · x_i[c]
    fn jacobian(coordinates: &[Vector3<f64>], dn: &[[f64; 8]; 3]) -> Matrix3<f64> {
        let mut j = Matrix3::zeros();
        for (i, x) in coordinates.iter().enumerate() {
            for r in 0..3 {
                for c in 0..3 {
                    j[(r, c)] += dn[r][i] * x[c];
                }
            }
        }
        j
    }

    fn check_node_count(values: &[Vector3<f64>]) -> Result<()> {
        if values.len() != Self::NUM_NODES {
            return Err(FemError::config(format!(
                "Brick8 requires {} nodes, got {}",
                Self::NUM_NODES,
                values.len()
            )));
        }
        Ok(())
    }

    /// Strain-displacement matrix and Jacobian determinant at a point
    ///
    /// Strain components (engineering Voigt):
    /// {ε} = [εxx, εyy, εzz, γxy, γyz, γzx]ᵀ
    fn strain_displacement(
        coordinates: &[Vector3<f64>],
        xi: f64,
        eta: f64,
        zeta: f64,
    ) -> Result<(StrainDisplacement, f64)> {
        let dn = Self::shape_derivatives(xi, eta, zeta);
        let j = Self::jacobian(coordinates, &dn);
        let det_j = j.determinant();
        if !(det_j > 0.0) {
            return Err(FemError::config(format!(
                "non-positive Jacobian determinant {:.6e} at ({:.3}, {:.3}, {:.3})",
                det_j, xi, eta, zeta
            )));
        }
        let j_inv = j
            .try_inverse()
            .ok_or_else(|| FemError::config("singular Jacobian matrix"))?;

        let mut b = StrainDisplacement::zeros();
        for i in 0..8 {
            let dn_global = j_inv * Vector3::new(dn[0][i], dn[1][i], dn[2][i]);
            let (dx, dy, dz) = (dn_global[0], dn_global[1], dn_global[2]);
            let col = i * 3;

            b[(0, col)] = dx;
            b[(1, col + 1)] = dy;
            b[(2, col + 2)] = dz;
            // γxy = du/dy + dv/dx
            b[(3, col)] = dy;
            b[(3, col + 1)] = dx;
            // γyz = dv/dz + dw/dy
            b[(4, col + 1)] = dz;
            b[(4, col + 2)] = dy;
            // γzx = dw/dx + du/dz
            b[(5, col)] = dz;
            b[(5, col + 2)] = dx;
        }

        Ok((b, det_j))
    }

    /// Reject distorted or inverted geometry
    pub fn check_geometry(coordinates: &[Vector3<f64>]) -> Result<()> {
        Self::check_node_count(coordinates)?;
        for [xi, eta, zeta] in Self::integration_points() {
            Self::strain_displacement(coordinates, xi, eta, zeta)?;
        }
        Ok(())
    }

    /// Global coordinates of the integration points
    pub fn integration_point_coordinates(coordinates: &[Vector3<f64>]) -> Result<Vec<Vector3<f64>>> {
        Self::check_node_count(coordinates)?;
        Ok(Self::integration_points()
            .iter()
            .map(|&[xi, eta, zeta]| {
                Self::shape_functions(xi, eta, zeta)
                    .iter()
                    .zip(coordinates)
                    .fold(Vector3::zeros(), |acc, (n, x)| acc + x * *n)
            })
            .collect())
    }

    /// Tangent stiffness, internal force and provisional point states
    ///
    /// K_e = Σ B_iᵀ D_i B_i |J_i|, f_e = Σ B_iᵀ σ_i |J_i| over the Gauss points.
    ///
    /// # Arguments
    /// * `coordinates` - Reference coordinates of the 8 nodes
    /// * `displacements` - Current displacements of the 8 nodes
    /// * `law` - Constitutive law of the element
    /// * `committed` - Committed history of each integration point
    pub fn evaluate(
        coordinates: &[Vector3<f64>],
        displacements: &[Vector3<f64>],
        law: &ConstitutiveLaw,
        committed: &[PlasticHistory],
    ) -> Result<ElementResponse> {
        Self::check_node_count(coordinates)?;
        Self::check_node_count(displacements)?;
        if committed.len() != Self::NUM_INTEGRATION_POINTS {
            return Err(FemError::config(format!(
                "Brick8 requires {} integration point states, got {}",
                Self::NUM_INTEGRATION_POINTS,
                committed.len()
            )));
        }

        let u = SVector::<f64, 24>::from_iterator(displacements.iter().flat_map(|d| d.iter().copied()));

        let mut k = SMatrix::<f64, 24, 24>::zeros();
        let mut f = SVector::<f64, 24>::zeros();
        let mut points = Vec::with_capacity(Self::NUM_INTEGRATION_POINTS);

        for ([xi, eta, zeta], history) in Self::integration_points().into_iter().zip(committed) {
            let (b, det_j) = Self::strain_displacement(coordinates, xi, eta, zeta)?;
            let strain: Voigt = b * u;
            let response = law.evaluate(&strain, history);

            k += b.transpose() * response.tangent * b * det_j;
            f += b.transpose() * response.stress * det_j;

            points.push(PointState {
                strain,
                stress: response.stress,
                history: response.history,
            });
        }

        Ok(ElementResponse {
            stiffness: DMatrix::from_column_slice(24, 24, k.as_slice()),
            internal_force: DVector::from_column_slice(f.as_slice()),
            points,
        })
    }
}
