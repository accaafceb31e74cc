//! Nonlinear finite element engine for small-strain solid mechanics.
//!
//! The engine assembles element contributions into a reduced global system,
//! eliminates prescribed displacements through the DOF numbering and drives
//! an incremental-iterative Newton-Raphson procedure with elasto-plastic
//! integration point history.
//!
//! # Architecture
//!
//! ```text
//! Mesh + Constraints ──► DofNumbering ──► Assembly ──► NonlinearSolver
//!                                            │               │
//!                                            ▼               ▼
//!                                   Element engine     LinearSolver backend
//!                                            │
//!                                            ▼
//!                                   Constitutive laws
//! ```
//!
//! # Example
//!
//! ```no_run
//! use nalgebra::Vector3;
//! use nlfe_solver::{
//!     DenseLuSolver, ElementKind, LinearElastic, ConstitutiveLaw, LoadPath, Model,
//!     NonlinearConfig, NonlinearSolver,
//! };
//!
//! # fn example() -> nlfe_solver::Result<()> {
//! let mut model = Model::new();
//! let steel = model.add_material(ConstitutiveLaw::LinearElastic(LinearElastic::new(210e3, 0.3)?));
//! // ... create nodes, elements, groups and constraints ...
//! # let pull = model.constraints.set_displacement_node(nlfe_solver::NodeId(0), Vector3::x(), 0.0)?;
//! let path = LoadPath::new(10)?.ramp_constraint(pull, 0.5);
//! let solver = NonlinearSolver::new(NonlinearConfig::default(), &DenseLuSolver);
//! for report in solver.run(&mut model, &path)? {
//!     println!("step {} converged in {} iterations", report.step, report.iterations);
//! }
//! # let _ = steel;
//! # Ok(())
//! # }
//! ```

pub mod assembly;
pub mod backend;
pub mod constraints;
pub mod dofs;
pub mod elements;
pub mod error;
pub mod loads;
pub mod materials;
pub mod mesh;
pub mod model;
pub mod nonlinear_solver;
pub mod reporting;
pub mod sparse;

pub use assembly::{
    assemble_external_force, assemble_internal_force, assemble_stiffness, evaluate_elements,
    group_internal_force,
};
pub use backend::{
    default_backend, DenseLuSolver, LinearSolver, LinearSolverError, SolveInfo,
    SparseCholeskySolver,
};
pub use constraints::{Constraint, ConstraintId, ConstraintTarget, Constraints};
pub use dofs::{DofNumbering, DofStatus};
pub use elements::{Brick8, ElementKind, ElementResponse, IntegrationPoint, PointState};
pub use error::{FemError, Result};
pub use loads::{LoadId, NodalForce, NodalLoads};
pub use materials::{
    ConstitutiveLaw, ConstitutiveResponse, HardeningCurve, LinearElastic, MaterialId,
    MaterialLibrary, MisesPlasticity, PlasticHistory, Voigt, VoigtMatrix,
};
pub use mesh::{Element, ElementId, GroupId, Mesh, Node, NodeId};
pub use model::Model;
pub use nonlinear_solver::{
    GroupForce, LoadPath, NonlinearConfig, NonlinearSolver, PrescribedValue, SolverState,
    StepReport,
};
pub use reporting::{equivalent_stress, load_displacement_curve};
pub use sparse::{IndexBase, MatrixStorage, SparseMatrixBuilder, SparseMatrixCsr};
