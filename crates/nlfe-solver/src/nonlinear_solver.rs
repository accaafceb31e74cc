//! Incremental-iterative static analysis using Newton-Raphson iteration.
//!
//! Solves the reduced equilibrium equation at every load step:
//!
//! ```text
//! R(a) = Tᵀ (F_ext − F_int(T·a + g)) = 0
//! ```
//!
//! where `a` are the active DOF values and `g` the prescribed displacements
//! of the step (see [`crate::dofs`]).
//!
//! # Load stepping
//!
//! A [`LoadPath`] ramps prescribed values and nodal forces linearly over a
//! fixed number of steps. Each step runs through an explicit state machine:
//!
//! ```text
//! StepInit ──► Iterating ──► Converged ──► Committed ──► StepInit (next step)
//!                 │  ▲                          │
//!                 └──┘                          └──► Finished
//! ```
//!
//! - `StepInit`: apply the step's prescribed values and forces, evaluate the
//!   elements at the current displacements
//! - `Iterating`: check convergence; otherwise assemble `K_red` and the
//!   equivalent load, solve `K_red·Δa = f_eq + f_ext − f_int`, update and
//!   re-evaluate
//! - `Converged`: commit the integration point history and report
//!
//! # Convergence
//!
//! A step has converged when the prescribed values are applied to the nodes
//! and `‖R‖ < tolerance` (absolute). The number of linear solves per step is
//! bounded by `max_iterations`; exceeding it is a fatal
//! [`FemError::Convergence`], load steps are never subdivided.
//!
//! Steps are transactional: on any failure the nodal displacements,
//! prescribed values and nodal forces are restored to the last committed
//! step and the provisional integration point states are discarded.

use crate::assembly::{
    assemble_external_force, assemble_internal_force, assemble_stiffness, evaluate_elements,
    group_internal_force,
};
use crate::backend::LinearSolver;
use crate::constraints::ConstraintId;
use crate::dofs::DofNumbering;
use crate::elements::ElementResponse;
use crate::error::{FemError, Result};
use crate::loads::LoadId;
use crate::mesh::GroupId;
use crate::model::Model;
use crate::sparse::MatrixStorage;
use nalgebra::{DVector, Vector3};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

/// Nonlinear solver configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NonlinearConfig {
    /// Absolute tolerance on the reduced residual norm
    pub tolerance: f64,
    /// Maximum number of linear solves per load step
    pub max_iterations: usize,
    /// Storage of the reduced tangent handed to the linear solver
    pub matrix_storage: MatrixStorage,
    /// Evaluate elements on the rayon thread pool
    pub parallel_assembly: bool,
}

impl Default for NonlinearConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-6,
            max_iterations: 25,
            matrix_storage: MatrixStorage::General,
            parallel_assembly: true,
        }
    }
}

impl NonlinearConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(FemError::config(format!(
                "tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        if self.max_iterations == 0 {
            return Err(FemError::config("max_iterations must be at least 1"));
        }
        Ok(())
    }
}

/// Linear load stepping of prescribed values and nodal forces
#[derive(Debug, Clone, PartialEq)]
pub struct LoadPath {
    num_steps: usize,
    constraint_ramps: Vec<(ConstraintId, f64)>,
    force_ramps: Vec<(LoadId, f64)>,
    monitored_groups: Vec<GroupId>,
}

impl LoadPath {
    pub fn new(num_steps: usize) -> Result<Self> {
        if num_steps == 0 {
            return Err(FemError::config("a load path needs at least one step"));
        }
        Ok(Self {
            num_steps,
            constraint_ramps: Vec::new(),
            force_ramps: Vec::new(),
            monitored_groups: Vec::new(),
        })
    }

    /// Ramp a prescribed value from zero to `final_value`
    pub fn ramp_constraint(mut self, id: ConstraintId, final_value: f64) -> Self {
        self.constraint_ramps.push((id, final_value));
        self
    }

    /// Ramp a nodal force from zero to `final_value`
    pub fn ramp_force(mut self, id: LoadId, final_value: f64) -> Self {
        self.force_ramps.push((id, final_value));
        self
    }

    /// Report the internal force of a group after every step
    pub fn monitor_group(mut self, group: GroupId) -> Self {
        self.monitored_groups.push(group);
        self
    }

    pub fn num_steps(&self) -> usize {
        self.num_steps
    }

    /// Load factor of zero-based step `step`: (step + 1) / num_steps
    pub fn load_factor(&self, step: usize) -> f64 {
        (step + 1) as f64 / self.num_steps as f64
    }

    fn validate(&self, model: &Model) -> Result<()> {
        for &(id, value) in &self.constraint_ramps {
            model.constraints.rhs(id)?;
            check_final_value(value)?;
        }
        for &(id, value) in &self.force_ramps {
            model.loads.value(id)?;
            check_final_value(value)?;
        }
        for &group in &self.monitored_groups {
            model.mesh.group_nodes(group)?;
        }
        Ok(())
    }

    fn apply_step(&self, model: &mut Model, step: usize) -> Result<()> {
        let factor = self.load_factor(step);
        for &(id, value) in &self.constraint_ramps {
            model.constraints.set_rhs(id, factor * value)?;
        }
        for &(id, value) in &self.force_ramps {
            model.loads.set_value(id, factor * value)?;
        }
        Ok(())
    }
}

fn check_final_value(value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(FemError::config(format!("ramp target must be finite, got {}", value)));
    }
    Ok(())
}

/// Prescribed value of a constraint at the end of a step
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PrescribedValue {
    pub constraint: ConstraintId,
    pub value: f64,
}

/// Internal force summed over a monitored group
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GroupForce {
    pub group: GroupId,
    pub force: [f64; 3],
}

/// Summary of one converged load step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepReport {
    /// Zero-based step index
    pub step: usize,
    pub load_factor: f64,
    /// Linear solves needed to converge
    pub iterations: usize,
    /// Reduced residual norm at convergence
    pub residual_norm: f64,
    /// Norm of the right-hand side before every linear solve, then the final residual
    pub residual_history: Vec<f64>,
    pub prescribed: Vec<PrescribedValue>,
    pub group_forces: Vec<GroupForce>,
}

impl StepReport {
    pub fn prescribed_value(&self, constraint: ConstraintId) -> Option<f64> {
        self.prescribed
            .iter()
            .find(|p| p.constraint == constraint)
            .map(|p| p.value)
    }

    pub fn group_force(&self, group: GroupId) -> Option<Vector3<f64>> {
        self.group_forces
            .iter()
            .find(|g| g.group == group)
            .map(|g| Vector3::from(g.force))
    }
}

/// States of the load stepping loop
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SolverState {
    StepInit { step: usize },
    Iterating { step: usize, iteration: usize },
    Converged { step: usize, iterations: usize, residual: f64 },
    Committed { step: usize },
    Finished,
}

/// State restored when a step fails
struct Checkpoint {
    displacements: Vec<Vector3<f64>>,
    constraint_values: Vec<(ConstraintId, f64)>,
    load_values: Vec<(LoadId, f64)>,
}

impl Checkpoint {
    fn capture(model: &Model, path: &LoadPath) -> Result<Self> {
        Ok(Self {
            displacements: model.mesh.snapshot_displacements(),
            constraint_values: path
                .constraint_ramps
                .iter()
                .map(|&(id, _)| model.constraints.rhs(id).map(|v| (id, v)))
                .collect::<Result<_>>()?,
            load_values: path
                .force_ramps
                .iter()
                .map(|&(id, _)| model.loads.value(id).map(|v| (id, v)))
                .collect::<Result<_>>()?,
        })
    }

    fn restore(&self, model: &mut Model) -> Result<()> {
        model.mesh.restore_displacements(&self.displacements);
        model.mesh.discard_provisional_state();
        for &(id, value) in &self.constraint_values {
            model.constraints.set_rhs(id, value)?;
        }
        for &(id, value) in &self.load_values {
            model.loads.set_value(id, value)?;
        }
        Ok(())
    }
}

/// Outcome of one pass through the `Iterating` state
enum IterationOutcome {
    Converged { residual: f64 },
    Updated { rhs_norm: f64 },
}

/// Newton-Raphson driver with an injected linear solver
pub struct NonlinearSolver<'a> {
    config: NonlinearConfig,
    linear_solver: &'a dyn LinearSolver,
}

impl<'a> NonlinearSolver<'a> {
    /// Create a new nonlinear solver
    ///
    /// # Arguments
    /// * `config` - Tolerance, iteration bound, matrix storage, parallelism
    /// * `linear_solver` - Backend used for every linear solve
    pub fn new(config: NonlinearConfig, linear_solver: &'a dyn LinearSolver) -> Self {
        Self {
            config,
            linear_solver,
        }
    }

    pub fn config(&self) -> &NonlinearConfig {
        &self.config
    }

    /// Run all load steps and collect the step reports
    pub fn run(&self, model: &mut Model, path: &LoadPath) -> Result<Vec<StepReport>> {
        let mut reports = Vec::with_capacity(path.num_steps());
        self.run_with(model, path, |report| reports.push(report.clone()))?;
        Ok(reports)
    }

    /// Run all load steps, handing every committed step to `on_step`
    ///
    /// # Errors
    /// - [`FemError::Config`] for invalid configuration or model data
    /// - [`FemError::Numerical`] when the linear solver fails
    /// - [`FemError::Convergence`] when a step exceeds `max_iterations`
    ///
    /// Steps committed before a failure stay committed.
    pub fn run_with<F>(&self, model: &mut Model, path: &LoadPath, mut on_step: F) -> Result<()>
    where
        F: FnMut(&StepReport),
    {
        self.config.validate()?;
        path.validate(model)?;

        // the partition is fixed for the whole run
        let numbering = DofNumbering::build(&model.mesh, &model.constraints)?;
        info!(
            active = numbering.num_active_dofs(),
            dependent = numbering.num_dependent_dofs(),
            steps = path.num_steps(),
            solver = self.linear_solver.name(),
            "starting nonlinear analysis"
        );

        let mut state = SolverState::StepInit { step: 0 };
        let mut checkpoint: Option<Checkpoint> = None;
        let mut responses: Vec<ElementResponse> = Vec::new();
        let mut residual_history: Vec<f64> = Vec::new();

        loop {
            trace!(?state, "solver state");
            state = match state {
                SolverState::StepInit { step } => {
                    let snapshot = Checkpoint::capture(model, path)?;
                    if let Err(err) = self.begin_step(model, path, step, &mut responses) {
                        return Err(self.roll_back(model, &snapshot, step, err));
                    }
                    checkpoint = Some(snapshot);
                    residual_history.clear();
                    info!(step, load_factor = path.load_factor(step), "load step started");
                    SolverState::Iterating { step, iteration: 0 }
                }
                SolverState::Iterating { step, iteration } => {
                    let outcome = self.iterate(model, &numbering, &mut responses, iteration, step);
                    match outcome {
                        Ok(IterationOutcome::Converged { residual }) => {
                            residual_history.push(residual);
                            SolverState::Converged {
                                step,
                                iterations: iteration,
                                residual,
                            }
                        }
                        Ok(IterationOutcome::Updated { rhs_norm }) => {
                            residual_history.push(rhs_norm);
                            SolverState::Iterating {
                                step,
                                iteration: iteration + 1,
                            }
                        }
                        Err(err) => {
                            return Err(match &checkpoint {
                                Some(snapshot) => self.roll_back(model, snapshot, step, err),
                                None => err,
                            });
                        }
                    }
                }
                SolverState::Converged {
                    step,
                    iterations,
                    residual,
                } => {
                    let outcome = self.commit_step(
                        model,
                        path,
                        &responses,
                        step,
                        iterations,
                        residual,
                        &residual_history,
                    );
                    let report = match outcome {
                        Ok(report) => report,
                        Err(err) => {
                            return Err(match &checkpoint {
                                Some(snapshot) => self.roll_back(model, snapshot, step, err),
                                None => err,
                            });
                        }
                    };
                    info!(step, iterations, residual, "load step converged");
                    on_step(&report);
                    SolverState::Committed { step }
                }
                SolverState::Committed { step } => {
                    if step + 1 < path.num_steps() {
                        SolverState::StepInit { step: step + 1 }
                    } else {
                        SolverState::Finished
                    }
                }
                SolverState::Finished => break,
            };
        }

        info!(steps = path.num_steps(), "nonlinear analysis finished");
        Ok(())
    }

    fn evaluate(&self, model: &Model) -> Result<Vec<ElementResponse>> {
        evaluate_elements(&model.mesh, &model.materials, self.config.parallel_assembly)
    }

    /// Apply the step's load level and evaluate the elements at the
    /// displacements of the last committed step
    fn begin_step(
        &self,
        model: &mut Model,
        path: &LoadPath,
        step: usize,
        responses: &mut Vec<ElementResponse>,
    ) -> Result<()> {
        path.apply_step(model, step)?;
        *responses = self.evaluate(model)?;
        model.mesh.store_responses(responses)
    }

    /// One pass of the `Iterating` state
    ///
    /// Converges without solving when the prescribed values are applied and
    /// the residual is below tolerance; otherwise performs one Newton update.
    fn iterate(
        &self,
        model: &mut Model,
        numbering: &DofNumbering,
        responses: &mut Vec<ElementResponse>,
        iteration: usize,
        step: usize,
    ) -> Result<IterationOutcome> {
        let f_ext = assemble_external_force(&model.mesh, &model.loads, numbering)?;
        let f_int = assemble_internal_force(&model.mesh, numbering, responses)?;
        let residual = f_ext - f_int;
        let residual_norm = residual.norm();

        let increment = numbering.dirichlet_increment(&model.mesh, &model.constraints)?;
        let dirichlet_pending = increment.iter().any(|&delta| delta != 0.0);

        if !dirichlet_pending && residual_norm < self.config.tolerance {
            return Ok(IterationOutcome::Converged {
                residual: residual_norm,
            });
        }
        if iteration >= self.config.max_iterations {
            return Err(FemError::Convergence {
                step,
                iterations: iteration,
                residual: residual_norm,
            });
        }

        let (stiffness, equivalent_load) = assemble_stiffness(
            &model.mesh,
            &model.constraints,
            numbering,
            responses,
            self.config.matrix_storage,
        )?;
        let rhs: DVector<f64> = equivalent_load + residual;
        let rhs_norm = rhs.norm();

        let (delta, info) = self.linear_solver.solve(&stiffness, &rhs)?;
        debug!(
            step,
            iteration,
            residual = residual_norm,
            rhs = rhs_norm,
            solver = %info.solver_name,
            linear_residual = ?info.residual_norm,
            "newton iteration"
        );

        let active = numbering.gather_active(&model.mesh)? + delta;
        model
            .mesh
            .merge_active_dof_values(numbering, &model.constraints, &active)?;
        *responses = self.evaluate(model)?;
        model.mesh.store_responses(responses)?;

        Ok(IterationOutcome::Updated { rhs_norm })
    }

    fn roll_back(
        &self,
        model: &mut Model,
        checkpoint: &Checkpoint,
        step: usize,
        err: FemError,
    ) -> FemError {
        warn!(step, error = %err, "load step failed, restoring last committed state");
        if let Err(restore_err) = checkpoint.restore(model) {
            warn!(step, error = %restore_err, "could not restore prescribed values");
        }
        err
    }

    /// Build the step report, then commit the provisional point states
    ///
    /// Nothing is committed when the report cannot be built.
    #[allow(clippy::too_many_arguments)]
    fn commit_step(
        &self,
        model: &mut Model,
        path: &LoadPath,
        responses: &[ElementResponse],
        step: usize,
        iterations: usize,
        residual: f64,
        residual_history: &[f64],
    ) -> Result<StepReport> {
        let report = self.report(
            model,
            path,
            responses,
            step,
            iterations,
            residual,
            residual_history,
        )?;
        model.mesh.update_static_data();
        Ok(report)
    }

    #[allow(clippy::too_many_arguments)]
    fn report(
        &self,
        model: &Model,
        path: &LoadPath,
        responses: &[ElementResponse],
        step: usize,
        iterations: usize,
        residual: f64,
        residual_history: &[f64],
    ) -> Result<StepReport> {
        let prescribed = path
            .constraint_ramps
            .iter()
            .map(|&(id, _)| {
                model.constraints.rhs(id).map(|value| PrescribedValue {
                    constraint: id,
                    value,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let group_forces = path
            .monitored_groups
            .iter()
            .map(|&group| {
                group_internal_force(&model.mesh, group, responses).map(|force| GroupForce {
                    group,
                    force: [force[0], force[1], force[2]],
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(StepReport {
            step,
            load_factor: path.load_factor(step),
            iterations,
            residual_norm: residual,
            residual_history: residual_history.to_vec(),
            prescribed,
            group_forces,
        })
    }
}
