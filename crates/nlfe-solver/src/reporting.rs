//! Derived results for post-processing.
//!
//! The solver streams one [`StepReport`] per converged load step; the helpers
//! here turn those reports and the integration point stresses into the
//! quantities consumed outside the engine.

use crate::constraints::ConstraintId;
use crate::error::{FemError, Result};
use crate::materials::Voigt;
use crate::mesh::GroupId;
use crate::nonlinear_solver::StepReport;
use nlfe_io::LoadDisplacementCurve;

/// Von Mises equivalent stress of a stress vector `[xx, yy, zz, xy, yz, zx]`
///
/// σ_vm = √(½[(σxx−σyy)² + (σyy−σzz)² + (σzz−σxx)²] + 3(τxy² + τyz² + τzx²))
pub fn equivalent_stress(stress: &Voigt) -> f64 {
    let (sxx, syy, szz) = (stress[0], stress[1], stress[2]);
    let (sxy, syz, szx) = (stress[3], stress[4], stress[5]);

    let normal = (sxx - syy).powi(2) + (syy - szz).powi(2) + (szz - sxx).powi(2);
    let shear = sxy * sxy + syz * syz + szx * szx;
    (0.5 * normal + 3.0 * shear).sqrt()
}

/// Load-displacement curve from step reports
///
/// One row per step: the prescribed value of `constraint` and component
/// `component` (0..3) of the internal force of the monitored `group`.
///
/// # Errors
/// A report that lacks the constraint or the group, or an invalid component.
pub fn load_displacement_curve(
    reports: &[StepReport],
    constraint: ConstraintId,
    group: GroupId,
    component: usize,
    header: &str,
) -> Result<LoadDisplacementCurve> {
    if component >= 3 {
        return Err(FemError::config(format!(
            "force component must be 0, 1 or 2, got {}",
            component
        )));
    }

    let mut curve = LoadDisplacementCurve::new(header);
    for report in reports {
        let displacement = report.prescribed_value(constraint).ok_or_else(|| {
            FemError::config(format!(
                "step {} does not report constraint {}",
                report.step, constraint.0
            ))
        })?;
        let force = report.group_force(group).ok_or_else(|| {
            FemError::config(format!(
                "step {} does not report group {}",
                report.step, group.0
            ))
        })?;
        curve.push(displacement, force[component]);
    }
    Ok(curve)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mises_stress_uniaxial() {
        let stress = Voigt::from_column_slice(&[100.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        assert!((equivalent_stress(&stress) - 100.0).abs() < 1e-12);
    }

    #[test]
    fn mises_stress_pure_shear() {
        let stress = Voigt::from_column_slice(&[0.0, 0.0, 0.0, 50.0, 0.0, 0.0]);
        let expected = 50.0 * f64::sqrt(3.0);
        assert!((equivalent_stress(&stress) - expected).abs() < 1e-10);
    }

    #[test]
    fn mises_stress_hydrostatic_is_zero() {
        let stress = Voigt::from_column_slice(&[-70.0, -70.0, -70.0, 0.0, 0.0, 0.0]);
        assert!(equivalent_stress(&stress).abs() < 1e-12);
    }

    #[test]
    fn curve_rejects_invalid_component() {
        assert!(load_displacement_curve(&[], ConstraintId(0), GroupId(0), 3, "u f").is_err());
        let curve = load_displacement_curve(&[], ConstraintId(0), GroupId(0), 2, "u f").unwrap();
        assert!(curve.is_empty());
    }
}
