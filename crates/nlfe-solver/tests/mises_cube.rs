//! Load-displacement validation of a single Mises brick
//!
//! Setup: unit cube, E = 100, ν = 0, σ_y0 = 100, hardening pairs
//! (0.25, 150), (0.3, 150). Symmetry conditions on the faces x = 0, y = 0,
//! z = 0; the face x = 1 is pulled to u = 2 in 10 equal steps.
//!
//! The stress state is homogeneous and uniaxial, so the reaction force equals
//! σ_xx. Yielding starts at u = 1 (step 5); afterwards
//! E (u − α) = σ_y(α) gives α and the reaction force.

use nalgebra::Vector3;
use nlfe_io::LoadDisplacementCurve;
use nlfe_solver::{
    load_displacement_curve, Brick8, ConstitutiveLaw, ConstraintId, DenseLuSolver, ElementId,
    ElementKind, FemError, GroupId, HardeningCurve, LinearElastic, LinearSolver, LoadPath,
    MatrixStorage, MisesPlasticity, Model, NonlinearConfig, NonlinearSolver, SparseCholeskySolver,
    StepReport,
};

const EXPECTED_REACTIONS: [f64; 10] = [
    20.0,
    40.0,
    60.0,
    80.0,
    100.0,
    100.0 + 40.0 / 3.0,
    100.0 + 80.0 / 3.0,
    140.0,
    150.0,
    150.0,
];

struct PlasticCube {
    model: Model,
    element: ElementId,
    pulled_face: GroupId,
    fixed_face: GroupId,
    pull: ConstraintId,
}

fn make_plastic_cube() -> PlasticCube {
    let mut model = Model::new();
    let hardening = HardeningCurve::from_pairs(100.0, &[(0.25, 150.0), (0.3, 150.0)]).unwrap();
    let material = model.add_material(ConstitutiveLaw::MisesPlasticity(MisesPlasticity::new(
        LinearElastic::new(100.0, 0.0).unwrap(),
        hardening,
    )));

    let nodes: Vec<_> = Brick8::NATURAL_COORDINATES
        .iter()
        .map(|&[x, y, z]| {
            model
                .mesh
                .create_node(Vector3::new((x + 1.0) / 2.0, (y + 1.0) / 2.0, (z + 1.0) / 2.0))
        })
        .collect();
    let element = model
        .create_element(ElementKind::Brick8, &nodes, material)
        .unwrap();

    let pulled_face = model.mesh.create_group();
    let fixed_face = model.mesh.create_group();
    let axes = [Vector3::x(), Vector3::y(), Vector3::z()];
    for &node in &nodes {
        let x = model.mesh.node(node).unwrap().coordinates();
        for k in 0..3 {
            if x[k] == 0.0 {
                model
                    .constraints
                    .set_displacement_node(node, axes[k], 0.0)
                    .unwrap();
            }
        }
        if x[0] == 0.0 {
            model.mesh.group_add_node(fixed_face, node).unwrap();
        } else {
            model.mesh.group_add_node(pulled_face, node).unwrap();
        }
    }
    let pull = model
        .constraints
        .set_displacement_group(pulled_face, Vector3::x(), 0.0)
        .unwrap();

    PlasticCube {
        model,
        element,
        pulled_face,
        fixed_face,
        pull,
    }
}

fn run_cube(config: NonlinearConfig, linear_solver: &dyn LinearSolver) -> (PlasticCube, Vec<StepReport>) {
    let mut cube = make_plastic_cube();
    let path = LoadPath::new(10)
        .unwrap()
        .ramp_constraint(cube.pull, 2.0)
        .monitor_group(cube.pulled_face)
        .monitor_group(cube.fixed_face);
    let reports = NonlinearSolver::new(config, linear_solver)
        .run(&mut cube.model, &path)
        .unwrap();
    (cube, reports)
}

#[test]
fn reaction_force_follows_hardening_curve() {
    let (cube, reports) = run_cube(NonlinearConfig::default(), &DenseLuSolver);
    assert_eq!(reports.len(), 10);

    let mut previous = 0.0;
    for (report, expected) in reports.iter().zip(EXPECTED_REACTIONS) {
        assert!(report.residual_norm < 1e-6);
        assert!(report.iterations <= 25);

        let displacement = report.prescribed_value(cube.pull).unwrap();
        assert!((displacement - 0.2 * (report.step + 1) as f64).abs() < 1e-12);

        let pulled = report.group_force(cube.pulled_face).unwrap();
        let fixed = report.group_force(cube.fixed_face).unwrap();
        assert!(
            (pulled[0] - expected).abs() < 1e-6,
            "step {}: reaction {} expected {}",
            report.step,
            pulled[0],
            expected
        );
        // equilibrium between both faces
        assert!((pulled[0] + fixed[0]).abs() < 1e-6);
        assert!(pulled[0] >= previous - 1e-9, "reaction must not decrease");
        previous = pulled[0];
    }
}

#[test]
fn plastic_state_is_committed_after_final_step() {
    let (cube, _) = run_cube(NonlinearConfig::default(), &DenseLuSolver);
    let mesh = &cube.model.mesh;

    let element = mesh.element(cube.element).unwrap();
    for point in element.integration_points() {
        assert!((point.committed.history.equivalent_plastic_strain - 0.5).abs() < 1e-8);
        assert!((point.committed.history.yield_strength - 150.0).abs() < 1e-8);
        assert!((point.committed.equivalent_stress() - 150.0).abs() < 1e-6);
    }

    for plastic_strain in mesh.element_plastic_strain(cube.element).unwrap() {
        assert!((plastic_strain[0] - 0.5).abs() < 1e-8);
        assert!((plastic_strain[1] + 0.25).abs() < 1e-8);
        assert!((plastic_strain[2] + 0.25).abs() < 1e-8);
    }
    for strain in mesh.element_strain(cube.element).unwrap() {
        assert!((strain[0] - 2.0).abs() < 1e-10);
    }
    for stress in mesh.element_stress(cube.element).unwrap() {
        assert!((stress[0] - 150.0).abs() < 1e-6);
        assert!(stress[1].abs() < 1e-6);
    }
}

#[test]
fn symmetric_cholesky_path_matches_general_lu_path() {
    let (cube, general) = run_cube(NonlinearConfig::default(), &DenseLuSolver);
    let config = NonlinearConfig {
        matrix_storage: MatrixStorage::Symmetric,
        parallel_assembly: false,
        ..NonlinearConfig::default()
    };
    let (_, symmetric) = run_cube(config, &SparseCholeskySolver);

    let a = load_displacement_curve(&general, cube.pull, cube.pulled_face, 0, "u F").unwrap();
    let b = load_displacement_curve(&symmetric, cube.pull, cube.pulled_face, 0, "u F").unwrap();
    assert!(a.max_deviation(&b).unwrap() < 1e-8);
}

#[test]
fn load_displacement_curve_round_trips_through_a_file() {
    let (cube, reports) = run_cube(NonlinearConfig::default(), &DenseLuSolver);
    let curve = load_displacement_curve(
        &reports,
        cube.pull,
        cube.pulled_face,
        0,
        "prescribed displacement, reaction force",
    )
    .unwrap();
    assert_eq!(curve.len(), 10);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("load_displacement.txt");
    curve.write_to_file(&path).unwrap();

    let reference = LoadDisplacementCurve::read_from_file(&path).unwrap();
    assert_eq!(reference.header, "prescribed displacement, reaction force");
    assert!(curve.max_deviation(&reference).unwrap() < 1e-9);
}

#[test]
fn iteration_bound_fails_and_keeps_committed_state() {
    let mut cube = make_plastic_cube();
    let config = NonlinearConfig {
        max_iterations: 1,
        ..NonlinearConfig::default()
    };
    // one big elastic-plastic step cannot converge in a single update
    let path = LoadPath::new(1).unwrap().ramp_constraint(cube.pull, 2.0);
    let err = NonlinearSolver::new(config, &DenseLuSolver)
        .run(&mut cube.model, &path)
        .unwrap_err();

    match err {
        FemError::Convergence { step, iterations, .. } => {
            assert_eq!(step, 0);
            assert_eq!(iterations, 1);
        }
        other => panic!("expected a convergence failure, got {}", other),
    }

    let element = cube.model.mesh.element(cube.element).unwrap();
    for point in element.integration_points() {
        assert_eq!(point.committed.history.equivalent_plastic_strain, 0.0);
        assert_eq!(point.current, point.committed);
    }
    assert_eq!(cube.model.constraints.rhs(cube.pull).unwrap(), 0.0);
    for node in cube.model.mesh.nodes() {
        assert_eq!(node.displacement(), Vector3::zeros());
    }
}
