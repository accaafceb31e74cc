//! Constitutive laws for small-strain solid mechanics.
//!
//! Two material families are supported:
//! - Linear elastic isotropic
//! - Mises plasticity with isotropic, piecewise-linear hardening
//!
//! All tensors use engineering Voigt notation ordered `[xx, yy, zz, xy, yz, zx]`.
//! Strain-like quantities carry engineering shear components (γ = 2ε), stress-like
//! quantities carry the tensor shear components. The tangent maps an engineering
//! strain increment onto a stress increment.
//!
//! The plastic history of an integration point (plastic strain, accumulated
//! plastic strain, current yield strength) is owned by the element, not by the
//! law: a law is stateless and every evaluation starts from the committed
//! history handed in by the caller.

use crate::error::{FemError, Result};
use nalgebra::{SMatrix, SVector};

/// Engineering Voigt vector `[xx, yy, zz, xy, yz, zx]`
pub type Voigt = SVector<f64, 6>;

/// 6×6 matrix acting on engineering Voigt vectors
pub type VoigtMatrix = SMatrix<f64, 6, 6>;

const SQRT_2_3: f64 = 0.816_496_580_927_726;
const SQRT_3_2: f64 = 1.224_744_871_391_589;

/// Handle of a constitutive law stored in a [`MaterialLibrary`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(pub usize);

/// Linear elastic isotropic material
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearElastic {
    /// Young's modulus (E)
    youngs_modulus: f64,
    /// Poisson's ratio (ν)
    poissons_ratio: f64,
}

impl LinearElastic {
    /// Create a linear elastic material
    ///
    /// # Errors
    /// Rejects a non-positive Young's modulus and a Poisson's ratio outside (-1, 0.5).
    pub fn new(youngs_modulus: f64, poissons_ratio: f64) -> Result<Self> {
        if !(youngs_modulus.is_finite() && youngs_modulus > 0.0) {
            return Err(FemError::config(format!(
                "Young's modulus must be positive, got {}",
                youngs_modulus
            )));
        }
        if !(poissons_ratio > -1.0 && poissons_ratio < 0.5) {
            return Err(FemError::config(format!(
                "Poisson's ratio must lie in (-1, 0.5), got {}",
                poissons_ratio
            )));
        }
        Ok(Self {
            youngs_modulus,
            poissons_ratio,
        })
    }

    pub fn youngs_modulus(&self) -> f64 {
        self.youngs_modulus
    }

    pub fn poissons_ratio(&self) -> f64 {
        self.poissons_ratio
    }

    /// Shear modulus G = E / (2(1 + ν))
    pub fn shear_modulus(&self) -> f64 {
        self.youngs_modulus / (2.0 * (1.0 + self.poissons_ratio))
    }

    /// Bulk modulus K = E / (3(1 - 2ν))
    pub fn bulk_modulus(&self) -> f64 {
        self.youngs_modulus / (3.0 * (1.0 - 2.0 * self.poissons_ratio))
    }

    /// Isotropic elasticity matrix D = K 1⊗1 + 2G I_dev
    pub fn tangent(&self) -> VoigtMatrix {
        let k = self.bulk_modulus();
        let g = self.shear_modulus();
        volumetric_projector() * k + deviatoric_projector() * (2.0 * g)
    }
}

/// Isotropic hardening curve of a Mises material
///
/// The curve starts at `(0, initial_yield_strength)` and passes through the
/// user supplied `(accumulated plastic strain, yield strength)` pairs, which
/// must be strictly increasing in plastic strain. Beyond the last pair the
/// yield strength stays constant.
#[derive(Debug, Clone, PartialEq)]
pub struct HardeningCurve {
    /// Breakpoints, the first one is always `(0, initial_yield_strength)`
    points: Vec<(f64, f64)>,
}

impl HardeningCurve {
    /// Create a curve with only the initial yield strength (perfect plasticity)
    pub fn new(initial_yield_strength: f64) -> Result<Self> {
        if !(initial_yield_strength.is_finite() && initial_yield_strength > 0.0) {
            return Err(FemError::config(format!(
                "initial yield strength must be positive, got {}",
                initial_yield_strength
            )));
        }
        Ok(Self {
            points: vec![(0.0, initial_yield_strength)],
        })
    }

    /// Create a curve from the initial yield strength and the hardening pairs
    pub fn from_pairs(initial_yield_strength: f64, pairs: &[(f64, f64)]) -> Result<Self> {
        let mut curve = Self::new(initial_yield_strength)?;
        for &(plastic_strain, yield_strength) in pairs {
            curve.add_yield_strength(plastic_strain, yield_strength)?;
        }
        Ok(curve)
    }

    /// Append a `(accumulated plastic strain, yield strength)` pair
    ///
    /// # Errors
    /// The plastic strain must be strictly larger than that of the previous
    /// pair (and strictly positive for the first pair).
    pub fn add_yield_strength(&mut self, plastic_strain: f64, yield_strength: f64) -> Result<()> {
        let (last_strain, _) = self.points[self.points.len() - 1];
        if !(plastic_strain.is_finite() && plastic_strain > last_strain) {
            return Err(FemError::config(format!(
                "hardening pairs must be strictly increasing in plastic strain: {} follows {}",
                plastic_strain, last_strain
            )));
        }
        if !(yield_strength.is_finite() && yield_strength > 0.0) {
            return Err(FemError::config(format!(
                "yield strength must be positive, got {}",
                yield_strength
            )));
        }
        self.points.push((plastic_strain, yield_strength));
        Ok(())
    }

    pub fn initial_yield_strength(&self) -> f64 {
        self.points[0].1
    }

    /// User supplied hardening pairs (without the initial point)
    pub fn pairs(&self) -> &[(f64, f64)] {
        &self.points[1..]
    }

    /// Yield strength at the given accumulated plastic strain
    pub fn yield_strength(&self, plastic_strain: f64) -> f64 {
        let (first_strain, first_strength) = self.points[0];
        if plastic_strain <= first_strain {
            return first_strength;
        }

        for window in self.points.windows(2) {
            let (a, b) = (window[0], window[1]);
            if plastic_strain <= b.0 {
                return a.1 + (b.1 - a.1) * (plastic_strain - a.0) / (b.0 - a.0);
            }
        }

        self.points[self.points.len() - 1].1
    }

    /// Slope of the curve on the segment starting at the given plastic strain
    pub fn hardening_modulus(&self, plastic_strain: f64) -> f64 {
        for window in self.points.windows(2) {
            let (a, b) = (window[0], window[1]);
            if plastic_strain < b.0 {
                return (b.1 - a.1) / (b.0 - a.0);
            }
        }
        0.0
    }

    /// Radial return on the piecewise-linear curve
    ///
    /// Solves `‖s_trial‖ - 2G √(3/2) (α - α_n) - √(2/3) σ_y(α) = 0` for the new
    /// accumulated plastic strain α. The residual is linear on every segment, so
    /// the root is found exactly by walking segments from α_n onwards.
    ///
    /// Returns `(α, hardening modulus of the segment containing α)`.
    fn return_map(&self, trial_norm: f64, plastic_strain: f64, shear_modulus: f64) -> (f64, f64) {
        let elastic_slope = 2.0 * shear_modulus * SQRT_3_2;
        let residual = |alpha: f64| {
            trial_norm - elastic_slope * (alpha - plastic_strain) - SQRT_2_3 * self.yield_strength(alpha)
        };

        let mut lo = plastic_strain;
        let mut r_lo = residual(lo);

        for &(breakpoint, _) in self.points.iter().filter(|p| p.0 > plastic_strain) {
            let r_hi = residual(breakpoint);
            if r_hi <= 0.0 {
                let alpha = lo + r_lo / (r_lo - r_hi) * (breakpoint - lo);
                let slope = (self.yield_strength(breakpoint) - self.yield_strength(lo)) / (breakpoint - lo);
                return (alpha, slope);
            }
            lo = breakpoint;
            r_lo = r_hi;
        }

        // constant yield strength beyond the last breakpoint
        (lo + r_lo / elastic_slope, 0.0)
    }
}

/// Mises plasticity with isotropic hardening
#[derive(Debug, Clone, PartialEq)]
pub struct MisesPlasticity {
    pub elastic: LinearElastic,
    pub hardening: HardeningCurve,
}

impl MisesPlasticity {
    pub fn new(elastic: LinearElastic, hardening: HardeningCurve) -> Self {
        Self { elastic, hardening }
    }

    fn evaluate(&self, strain: &Voigt, history: &PlasticHistory) -> ConstitutiveResponse {
        let d_elastic = self.elastic.tangent();
        let trial = d_elastic * (strain - history.plastic_strain);

        let deviator = deviatoric_part(&trial);
        let trial_norm = stress_norm(&deviator);
        let yield_strength = self
            .hardening
            .yield_strength(history.equivalent_plastic_strain);

        if trial_norm - SQRT_2_3 * yield_strength <= 0.0 {
            return ConstitutiveResponse {
                stress: trial,
                tangent: d_elastic,
                history: *history,
                yielding: false,
            };
        }

        let g = self.elastic.shear_modulus();
        let k = self.elastic.bulk_modulus();
        let alpha_n = history.equivalent_plastic_strain;
        let (alpha, hardening_modulus) = self.hardening.return_map(trial_norm, alpha_n, g);
        let delta_gamma = SQRT_3_2 * (alpha - alpha_n);

        let normal = deviator / trial_norm;
        let stress = trial - normal * (2.0 * g * delta_gamma);

        let mut plastic_strain = history.plastic_strain;
        for i in 0..6 {
            let factor = if i < 3 { 1.0 } else { 2.0 };
            plastic_strain[i] += delta_gamma * factor * normal[i];
        }

        // consistent tangent: K 1⊗1 + 2Gθ I_dev - 2Gθ̄ n⊗n
        let theta = 1.0 - 2.0 * g * delta_gamma / trial_norm;
        let theta_bar = 1.0 / (1.0 + hardening_modulus / (3.0 * g)) - (1.0 - theta);
        let tangent = volumetric_projector() * k + deviatoric_projector() * (2.0 * g * theta)
            - normal * normal.transpose() * (2.0 * g * theta_bar);

        ConstitutiveResponse {
            stress,
            tangent,
            history: PlasticHistory {
                plastic_strain,
                equivalent_plastic_strain: alpha,
                yield_strength: self.hardening.yield_strength(alpha),
            },
            yielding: true,
        }
    }
}

/// Constitutive law families
#[derive(Debug, Clone, PartialEq)]
pub enum ConstitutiveLaw {
    LinearElastic(LinearElastic),
    MisesPlasticity(MisesPlasticity),
}

impl ConstitutiveLaw {
    /// Stress, tangent and updated (provisional) history for a total strain
    ///
    /// `history` is the committed state of the integration point; it is never
    /// modified, the caller decides when the returned history becomes committed.
    pub fn evaluate(&self, strain: &Voigt, history: &PlasticHistory) -> ConstitutiveResponse {
        match self {
            ConstitutiveLaw::LinearElastic(law) => {
                let tangent = law.tangent();
                ConstitutiveResponse {
                    stress: tangent * strain,
                    tangent,
                    history: *history,
                    yielding: false,
                }
            }
            ConstitutiveLaw::MisesPlasticity(law) => law.evaluate(strain, history),
        }
    }

    /// History of a virgin integration point
    pub fn initial_history(&self) -> PlasticHistory {
        match self {
            ConstitutiveLaw::LinearElastic(_) => PlasticHistory::default(),
            ConstitutiveLaw::MisesPlasticity(law) => PlasticHistory {
                yield_strength: law.hardening.initial_yield_strength(),
                ..PlasticHistory::default()
            },
        }
    }

    pub fn elastic(&self) -> &LinearElastic {
        match self {
            ConstitutiveLaw::LinearElastic(law) => law,
            ConstitutiveLaw::MisesPlasticity(law) => &law.elastic,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ConstitutiveLaw::LinearElastic(_) => "LinearElastic",
            ConstitutiveLaw::MisesPlasticity(_) => "MisesPlasticity",
        }
    }
}

/// Plastic history of one integration point
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlasticHistory {
    /// Plastic strain (engineering Voigt)
    pub plastic_strain: Voigt,
    /// Accumulated (equivalent) plastic strain α
    pub equivalent_plastic_strain: f64,
    /// Yield strength at α (zero for elastic laws)
    pub yield_strength: f64,
}

/// Result of a constitutive evaluation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstitutiveResponse {
    pub stress: Voigt,
    pub tangent: VoigtMatrix,
    pub history: PlasticHistory,
    /// Whether the evaluation went through the return mapping
    pub yielding: bool,
}

/// Material library holding all constitutive laws of a model
#[derive(Debug, Clone, Default)]
pub struct MaterialLibrary {
    laws: Vec<ConstitutiveLaw>,
}

impl MaterialLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a law and return its handle
    pub fn add(&mut self, law: ConstitutiveLaw) -> MaterialId {
        self.laws.push(law);
        MaterialId(self.laws.len() - 1)
    }

    pub fn get(&self, id: MaterialId) -> Result<&ConstitutiveLaw> {
        self.laws
            .get(id.0)
            .ok_or_else(|| FemError::config(format!("unknown material {}", id.0)))
    }

    pub fn len(&self) -> usize {
        self.laws.len()
    }

    pub fn is_empty(&self) -> bool {
        self.laws.is_empty()
    }
}

/// 1⊗1 in engineering Voigt form
fn volumetric_projector() -> VoigtMatrix {
    let mut p = VoigtMatrix::zeros();
    for i in 0..3 {
        for j in 0..3 {
            p[(i, j)] = 1.0;
        }
    }
    p
}

/// Deviatoric projector acting on engineering strains
fn deviatoric_projector() -> VoigtMatrix {
    let mut p = VoigtMatrix::zeros();
    for i in 0..3 {
        for j in 0..3 {
            p[(i, j)] = if i == j { 2.0 / 3.0 } else { -1.0 / 3.0 };
        }
        p[(i + 3, i + 3)] = 0.5;
    }
    p
}

fn deviatoric_part(stress: &Voigt) -> Voigt {
    let mean = (stress[0] + stress[1] + stress[2]) / 3.0;
    let mut s = *stress;
    for i in 0..3 {
        s[i] -= mean;
    }
    s
}

/// Frobenius norm of a stress-like Voigt vector
fn stress_norm(s: &Voigt) -> f64 {
    (s[0] * s[0] + s[1] * s[1] + s[2] * s[2] + 2.0 * (s[3] * s[3] + s[4] * s[4] + s[5] * s[5]))
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporting::equivalent_stress;

    fn example_curve() -> HardeningCurve {
        HardeningCurve::from_pairs(100.0, &[(0.25, 150.0), (0.3, 150.0)]).unwrap()
    }

    fn example_mises(poissons_ratio: f64) -> MisesPlasticity {
        MisesPlasticity::new(
            LinearElastic::new(100.0, poissons_ratio).unwrap(),
            example_curve(),
        )
    }

    #[test]
    fn yield_strength_interpolation() {
        let curve = example_curve();
        assert_eq!(curve.yield_strength(0.0), 100.0);
        assert!((curve.yield_strength(0.125) - 125.0).abs() < 1e-12);
        assert!((curve.yield_strength(0.25) - 150.0).abs() < 1e-12);
        assert!((curve.yield_strength(0.3) - 150.0).abs() < 1e-12);
        assert_eq!(curve.yield_strength(5.0), 150.0);
    }

    #[test]
    fn hardening_modulus_per_segment() {
        let curve = example_curve();
        assert!((curve.hardening_modulus(0.1) - 200.0).abs() < 1e-9);
        assert_eq!(curve.hardening_modulus(0.27), 0.0);
        assert_eq!(curve.hardening_modulus(1.0), 0.0);
    }

    #[test]
    fn rejects_non_monotonic_hardening_pairs() {
        assert!(HardeningCurve::from_pairs(100.0, &[(0.3, 150.0), (0.25, 160.0)]).is_err());
        assert!(HardeningCurve::from_pairs(100.0, &[(0.25, 150.0), (0.25, 160.0)]).is_err());
        assert!(HardeningCurve::from_pairs(100.0, &[(0.0, 150.0)]).is_err());
        assert!(HardeningCurve::from_pairs(100.0, &[(0.1, -1.0)]).is_err());
        assert!(HardeningCurve::new(0.0).is_err());
    }

    #[test]
    fn rejects_invalid_elastic_constants() {
        assert!(LinearElastic::new(0.0, 0.2).is_err());
        assert!(LinearElastic::new(100.0, 0.5).is_err());
        assert!(LinearElastic::new(100.0, -1.0).is_err());
        assert!(LinearElastic::new(100.0, 0.0).is_ok());
    }

    #[test]
    fn elastic_tangent_matches_lame_form() {
        let law = LinearElastic::new(210.0, 0.3).unwrap();
        let d = law.tangent();
        let e = 210.0;
        let nu = 0.3;
        let lambda = e * nu / ((1.0 + nu) * (1.0 - 2.0 * nu));
        let mu = e / (2.0 * (1.0 + nu));
        assert!((d[(0, 0)] - (lambda + 2.0 * mu)).abs() < 1e-9);
        assert!((d[(0, 1)] - lambda).abs() < 1e-9);
        assert!((d[(3, 3)] - mu).abs() < 1e-9);
        assert_eq!(d[(0, 3)], 0.0);
    }

    #[test]
    fn mises_reproduces_linear_elastic_below_yield() {
        let mises = ConstitutiveLaw::MisesPlasticity(example_mises(0.25));
        let elastic = ConstitutiveLaw::LinearElastic(LinearElastic::new(100.0, 0.25).unwrap());
        let strain = Voigt::from_column_slice(&[0.3, -0.1, 0.05, 0.2, -0.1, 0.05]);

        let a = mises.evaluate(&strain, &mises.initial_history());
        let b = elastic.evaluate(&strain, &elastic.initial_history());

        assert!(!a.yielding);
        assert_eq!(a.stress, b.stress);
        assert_eq!(a.tangent, b.tangent);
        assert_eq!(a.history.equivalent_plastic_strain, 0.0);
    }

    #[test]
    fn return_mapping_lands_on_yield_surface() {
        let law = ConstitutiveLaw::MisesPlasticity(example_mises(0.2));
        let strain = Voigt::from_column_slice(&[1.4, -0.2, -0.2, 0.1, 0.0, 0.05]);

        let response = law.evaluate(&strain, &law.initial_history());
        assert!(response.yielding);

        let alpha = response.history.equivalent_plastic_strain;
        assert!(alpha > 0.0);
        let sigma_vm = equivalent_stress(&response.stress);
        assert!(
            (sigma_vm - response.history.yield_strength).abs() < 1e-9,
            "σ_vm = {}, σ_y = {}",
            sigma_vm,
            response.history.yield_strength
        );

        // plastic flow is volume preserving
        let p = &response.history.plastic_strain;
        assert!((p[0] + p[1] + p[2]).abs() < 1e-12);
    }

    #[test]
    fn perfectly_plastic_beyond_last_pair() {
        let law = ConstitutiveLaw::MisesPlasticity(example_mises(0.0));
        let strain = Voigt::from_column_slice(&[4.0, 0.0, 0.0, 0.0, 0.0, 0.0]);

        let response = law.evaluate(&strain, &law.initial_history());
        assert!(response.history.equivalent_plastic_strain > 0.3);
        assert!((equivalent_stress(&response.stress) - 150.0).abs() < 1e-9);
    }

    #[test]
    fn evaluation_starts_from_committed_history() {
        let law = ConstitutiveLaw::MisesPlasticity(example_mises(0.0));
        let strain = Voigt::from_column_slice(&[1.5, 0.0, 0.0, 0.0, 0.0, 0.0]);
        let committed = law.initial_history();

        let first = law.evaluate(&strain, &committed);
        let second = law.evaluate(&strain, &committed);
        assert_eq!(first, second);
        assert_eq!(committed.equivalent_plastic_strain, 0.0);
    }

    #[test]
    fn consistent_tangent_matches_finite_differences() {
        let law = ConstitutiveLaw::MisesPlasticity(MisesPlasticity::new(
            LinearElastic::new(100.0, 0.3).unwrap(),
            HardeningCurve::from_pairs(100.0, &[(10.0, 1100.0)]).unwrap(),
        ));
        let history = law.initial_history();
        let strain = Voigt::from_column_slice(&[2.0, -0.4, -0.3, 0.3, 0.1, -0.2]);

        let response = law.evaluate(&strain, &history);
        assert!(response.yielding);

        let h = 1e-6;
        let scale = response.tangent.abs().max();
        for j in 0..6 {
            let mut plus = strain;
            let mut minus = strain;
            plus[j] += h;
            minus[j] -= h;
            let column = (law.evaluate(&plus, &history).stress - law.evaluate(&minus, &history).stress)
                / (2.0 * h);
            for i in 0..6 {
                assert!(
                    (column[i] - response.tangent[(i, j)]).abs() < 1e-5 * scale,
                    "D[{},{}] = {} vs finite difference {}",
                    i,
                    j,
                    response.tangent[(i, j)],
                    column[i]
                );
            }
        }
    }

    #[test]
    fn material_library_hands_out_typed_ids() {
        let mut library = MaterialLibrary::new();
        let steel = library.add(ConstitutiveLaw::LinearElastic(
            LinearElastic::new(210.0, 0.3).unwrap(),
        ));
        let plastic = library.add(ConstitutiveLaw::MisesPlasticity(example_mises(0.0)));

        assert_eq!(library.len(), 2);
        assert_eq!(library.get(steel).unwrap().name(), "LinearElastic");
        assert_eq!(library.get(plastic).unwrap().name(), "MisesPlasticity");
        assert!(library.get(MaterialId(7)).is_err());
    }
}
