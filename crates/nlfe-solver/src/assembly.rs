//! Global assembly of the reduced system.
//!
//! Assembly happens in two phases:
//! 1. [`evaluate_elements`] computes every element's tangent stiffness,
//!    internal force and provisional point states. Elements are independent
//!    at fixed displacements, so this runs on the rayon thread pool.
//! 2. The per-element results are scattered sequentially into the reduced
//!    (active DOF) matrix and vectors.
//!
//! With `u = T·a + g` (see [`crate::dofs`]) the reduced quantities are
//!
//! ```text
//! K_red   = Tᵀ K T
//! f_eq    = −Tᵀ K δ        δ = prescribed − current dependent values
//! f_ext   = Tᵀ f_ext,full
//! f_int   = Tᵀ f_int,full
//! ```

use crate::constraints::Constraints;
use crate::dofs::DofNumbering;
use crate::elements::ElementResponse;
use crate::error::{FemError, Result};
use crate::loads::NodalLoads;
use crate::materials::{MaterialLibrary, PlasticHistory};
use crate::mesh::{Element, GroupId, Mesh};
use crate::sparse::{MatrixStorage, SparseMatrixBuilder, SparseMatrixCsr};
use nalgebra::{DVector, Vector3};
use rayon::prelude::*;

/// Evaluate all elements at the current nodal displacements
///
/// Pure with respect to the mesh: point states are returned, not stored.
/// Every evaluation starts from the committed point history.
///
/// # Arguments
/// * `mesh` - Mesh with current nodal displacements
/// * `materials` - Constitutive laws referenced by the elements
/// * `parallel` - Evaluate elements on the rayon thread pool
pub fn evaluate_elements(
    mesh: &Mesh,
    materials: &MaterialLibrary,
    parallel: bool,
) -> Result<Vec<ElementResponse>> {
    let evaluate = |(index, element): (usize, &Element)| -> Result<ElementResponse> {
        let law = materials.get(element.material())?;
        let coordinates = mesh.element_coordinates(element)?;
        let displacements = mesh.element_displacements(element)?;
        let committed: Vec<PlasticHistory> = element
            .integration_points()
            .iter()
            .map(|point| point.committed.history)
            .collect();
        element
            .kind()
            .evaluate(&coordinates, &displacements, law, &committed)
            .map_err(|err| match err {
                FemError::Config(message) => {
                    FemError::Config(format!("element {}: {}", index, message))
                }
                other => other,
            })
    };

    if parallel {
        mesh.elements().par_iter().enumerate().map(evaluate).collect()
    } else {
        mesh.elements().iter().enumerate().map(evaluate).collect()
    }
}

fn check_responses(mesh: &Mesh, responses: &[ElementResponse]) -> Result<()> {
    if responses.len() != mesh.num_elements() {
        return Err(FemError::config(format!(
            "{} element responses for {} elements",
            responses.len(),
            mesh.num_elements()
        )));
    }
    for (index, (element, response)) in mesh.elements().iter().zip(responses).enumerate() {
        let n = element.kind().num_dofs();
        if response.stiffness.shape() != (n, n) || response.internal_force.len() != n {
            return Err(FemError::config(format!(
                "element {}: response size does not match {} DOFs",
                index, n
            )));
        }
    }
    Ok(())
}

/// Assemble the reduced tangent stiffness and the equivalent load
///
/// # Returns
/// `(K_red, f_eq)`; in symmetric storage only the upper triangle of `K_red`
/// is stored.
///
/// # Errors
/// Stale numbering or responses that do not match the mesh.
pub fn assemble_stiffness(
    mesh: &Mesh,
    constraints: &Constraints,
    numbering: &DofNumbering,
    responses: &[ElementResponse],
    storage: MatrixStorage,
) -> Result<(SparseMatrixCsr, DVector<f64>)> {
    numbering.check_current(mesh, constraints)?;
    check_responses(mesh, responses)?;

    let n = numbering.num_active_dofs();
    let increment = numbering.dirichlet_increment(mesh, constraints)?;
    let mut builder = SparseMatrixBuilder::new(n, n, storage);
    let mut equivalent_load = DVector::zeros(n);

    for (element, response) in mesh.elements().iter().zip(responses) {
        let dofs = element.dof_indices();
        let maps: Vec<Vec<(usize, f64)>> = dofs
            .iter()
            .map(|&dof| numbering.transformation(dof))
            .collect();

        for a in 0..dofs.len() {
            for b in 0..dofs.len() {
                let k_ab = response.stiffness[(a, b)];
                if k_ab == 0.0 {
                    continue;
                }
                for &(i, t_i) in &maps[a] {
                    for &(j, t_j) in &maps[b] {
                        if storage == MatrixStorage::Symmetric && j < i {
                            continue;
                        }
                        builder.add_entry(i, j, t_i * k_ab * t_j)?;
                    }
                }

                let delta = increment[dofs[b]];
                if delta != 0.0 {
                    for &(i, t_i) in &maps[a] {
                        equivalent_load[i] -= t_i * k_ab * delta;
                    }
                }
            }
        }
    }

    Ok((builder.build()?, equivalent_load))
}

/// Reduced external force `Tᵀ f_ext`
pub fn assemble_external_force(
    mesh: &Mesh,
    loads: &NodalLoads,
    numbering: &DofNumbering,
) -> Result<DVector<f64>> {
    numbering.reduce(&loads.full_vector(mesh)?)
}

/// Internal force of all elements in full DOF ordering
pub fn full_internal_force(mesh: &Mesh, responses: &[ElementResponse]) -> Result<DVector<f64>> {
    check_responses(mesh, responses)?;
    let mut full = DVector::zeros(mesh.num_dofs());
    for (element, response) in mesh.elements().iter().zip(responses) {
        for (a, dof) in element.dof_indices().into_iter().enumerate() {
            full[dof] += response.internal_force[a];
        }
    }
    Ok(full)
}

/// Reduced internal force `Tᵀ f_int`
pub fn assemble_internal_force(
    mesh: &Mesh,
    numbering: &DofNumbering,
    responses: &[ElementResponse],
) -> Result<DVector<f64>> {
    numbering.reduce(&full_internal_force(mesh, responses)?)
}

/// Sum of the internal forces acting on the nodes of a group
///
/// At constrained boundaries this is the reaction force.
pub fn group_internal_force(
    mesh: &Mesh,
    group: GroupId,
    responses: &[ElementResponse],
) -> Result<Vector3<f64>> {
    let full = full_internal_force(mesh, responses)?;
    Ok(mesh
        .group_nodes(group)?
        .iter()
        .fold(Vector3::zeros(), |sum, node| {
            sum + Vector3::new(full[3 * node.0], full[3 * node.0 + 1], full[3 * node.0 + 2])
        }))
}
