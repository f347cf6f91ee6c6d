use std::cell::OnceCell;
use std::collections::BTreeMap;
use std::fmt;

use log::{info, warn};
use serde::Serialize;

use crate::Float;
use crate::config::{ConsistencyConfig, ExprInput, SchemeConfig, StabilityConfig, expression_vector};
use crate::consistency::{self, ConsistencyResult};
use crate::conserved::ConservedMomentIndex;
use crate::equilibrium::Normalized;
use crate::error::{Result, SchemeError};
use crate::generator::Generator;
use crate::moments::{MomentMatrices, evaluate};
use crate::stability::StabilityAnalysis;
use crate::stencil::Stencil;
use crate::symbolic::{Expr, Symbol};

/// A lattice Boltzmann scheme made of one or more elementary schemes.
///
/// Everything is derived in [`Scheme::new`]: the symbolic vectors, the
/// conserved-moment index, the moment matrices and their numeric
/// counterparts. Nothing is mutated afterwards; the analyses the
/// configuration enables run once and are kept for later calls.
#[derive(Debug, Clone)]
pub struct Scheme {
    config: SchemeConfig,
    stencil: Stencil,
    parameters: BTreeMap<Symbol, Expr>,
    la: Float,
    la_symbolic: Expr,
    polynomials: Vec<Vec<Expr>>,
    equilibria: Vec<Vec<Expr>>,
    relaxation: Vec<Vec<Expr>>,
    conserved: ConservedMomentIndex,
    normalized: Normalized,
    initialization: BTreeMap<(usize, usize), Expr>,
    moments: MomentMatrices,
    analysis: OnceCell<AnalysisReport>,
}

/// Verdicts and results of the analyses a configuration asks for.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AnalysisReport {
    pub monotonically_stable: Option<bool>,
    pub l2_stable: Option<bool>,
    pub consistency: Option<ConsistencyResult>,
}

impl Scheme {
    pub fn new(config: SchemeConfig) -> Result<Self> {
        config.validate()?;
        info!(
            "Building scheme: dim={}, {} elementary scheme(s)",
            config.dim,
            config.schemes.len()
        );

        let numbers: Vec<Vec<usize>> = config.schemes.iter().map(|s| s.velocities.clone()).collect();
        let stencil = Stencil::new(config.dim, &numbers)?;
        let nv = stencil.nv();

        let mut parameters = BTreeMap::new();
        for (name, &value) in &config.parameters {
            let e = Expr::from_f64(value)
                .ok_or_else(|| SchemeError::conversion(value, format!("parameter {name}")))?;
            parameters.insert(Symbol::new(name), e);
        }

        let la_symbolic = config.scheme_velocity.to_expr()?;
        let la = evaluate(&la_symbolic, &parameters, "scheme velocity")?;

        let mut polynomials = Vec::with_capacity(nv.len());
        let mut equilibria = Vec::with_capacity(nv.len());
        let mut relaxation = Vec::with_capacity(nv.len());
        let mut declared = Vec::with_capacity(nv.len());
        for (k, scheme) in config.schemes.iter().enumerate() {
            polynomials.push(expression_vector(k, "polynomials", &scheme.polynomials, nv[k])?);
            equilibria.push(expression_vector(k, "equilibrium", &scheme.equilibrium, nv[k])?);
            relaxation.push(expression_vector(
                k,
                "relaxation_parameters",
                &scheme.relaxation_parameters,
                nv[k],
            )?);
            declared.push(scheme.conserved_names().iter().map(Symbol::new).collect::<Vec<_>>());
        }

        let conserved = ConservedMomentIndex::resolve(&equilibria, &declared)?;
        info!("{} conserved moment(s)", conserved.len());
        let normalized = Normalized::build(&equilibria, &relaxation, &conserved, &parameters)?;
        let initialization = resolve_initialization(&config, &conserved)?;
        let moments = MomentMatrices::build(&stencil, &polynomials, &parameters)?;

        Ok(Scheme {
            config,
            stencil,
            parameters,
            la,
            la_symbolic,
            polynomials,
            equilibria,
            relaxation,
            conserved,
            normalized,
            initialization,
            moments,
            analysis: OnceCell::new(),
        })
    }

    pub fn config(&self) -> &SchemeConfig {
        &self.config
    }

    pub fn dim(&self) -> usize {
        self.stencil.dim()
    }

    pub fn nscheme(&self) -> usize {
        self.stencil.nstencils()
    }

    pub fn stencil(&self) -> &Stencil {
        &self.stencil
    }

    pub fn parameters(&self) -> &BTreeMap<Symbol, Expr> {
        &self.parameters
    }

    /// Numeric scheme velocity `la = dx/dt`.
    pub fn scheme_velocity(&self) -> Float {
        self.la
    }

    /// Scheme velocity as given, a number or a symbol.
    pub fn scheme_velocity_symbolic(&self) -> &Expr {
        &self.la_symbolic
    }

    pub fn polynomials(&self) -> &[Vec<Expr>] {
        &self.polynomials
    }

    pub fn equilibria(&self) -> &[Vec<Expr>] {
        &self.equilibria
    }

    pub fn relaxation_symbolic(&self) -> &[Vec<Expr>] {
        &self.relaxation
    }

    pub fn relaxation_values(&self) -> &[Vec<Float>] {
        &self.normalized.relaxation
    }

    pub fn conserved(&self) -> &ConservedMomentIndex {
        &self.conserved
    }

    pub fn normalized(&self) -> &Normalized {
        &self.normalized
    }

    pub fn moments(&self) -> &MomentMatrices {
        &self.moments
    }

    /// Initial values keyed by `(scheme, slot)`.
    pub fn initialization(&self) -> &BTreeMap<(usize, usize), Expr> {
        &self.initialization
    }

    pub fn stability(&self, linearization: &BTreeMap<String, Float>) -> Result<StabilityAnalysis> {
        StabilityAnalysis::new(
            &self.stencil,
            &self.moments,
            &self.normalized,
            &self.conserved,
            linearization,
        )
    }

    pub fn consistency(&self, config: &ConsistencyConfig) -> Result<ConsistencyResult> {
        consistency::compute(self, config)
    }

    /// Run the analyses the configuration enables; later calls return the
    /// stored report.
    pub fn analyze(&self) -> Result<&AnalysisReport> {
        if let Some(report) = self.analysis.get() {
            return Ok(report);
        }
        let report = self.run_analyses()?;
        Ok(self.analysis.get_or_init(|| report))
    }

    fn run_analyses(&self) -> Result<AnalysisReport> {
        let mut report = AnalysisReport::default();
        if let Some(stability) = &self.config.stability {
            self.run_stability(stability, &mut report)?;
        }
        if let Some(consistency) = &self.config.consistency {
            let result = self.consistency(consistency)?;
            info!("Consistency analysis:\n{result}");
            report.consistency = Some(result);
        }
        Ok(report)
    }

    fn run_stability(&self, config: &StabilityConfig, report: &mut AnalysisReport) -> Result<()> {
        let analysis = self.stability(&config.linearization)?;
        if config.test_monotonic_stability {
            let stable = analysis.is_monotonically_stable();
            if stable {
                info!("The scheme is monotonically stable");
            } else {
                info!("The scheme is not monotonically stable");
            }
            report.monotonically_stable = Some(stable);
        }
        if config.test_l2_stability {
            let stable = analysis.is_l2_stable(config.resolution, config.progress)?;
            if stable {
                info!("The scheme is stable for the norm L2");
            } else {
                info!("The scheme is not stable for the norm L2");
            }
            report.l2_stable = Some(stable);
        }
        Ok(())
    }

    /// Hand the matrices, equilibria and relaxation rates to a generator.
    pub fn generate<G: Generator>(&self, generator: &mut G) -> Result<()> {
        generator.setup();
        generator.m2f(&self.moments.inv_mnum_glob, self.dim())?;
        generator.f2m(&self.moments.mnum_glob, self.dim())?;
        generator.transport(&self.stencil)?;
        generator.equilibrium(&self.stencil, &self.normalized.equilibria_num)?;
        generator.relaxation(
            &self.stencil,
            &self.normalized.relaxation,
            &self.normalized.equilibria_num,
        )?;
        generator.compile()
    }
}

/// Keys are conserved-moment names or slot indices of the scheme.
fn resolve_initialization(
    config: &SchemeConfig,
    conserved: &ConservedMomentIndex,
) -> Result<BTreeMap<(usize, usize), Expr>> {
    let mut init = BTreeMap::new();
    for (k, scheme) in config.schemes.iter().enumerate() {
        let Some(entries) = &scheme.init else {
            warn!("No initialization given for the conserved moments of elementary scheme {k}");
            continue;
        };
        for (key, value) in entries {
            let position = match key.parse::<usize>() {
                Ok(slot) if slot < scheme.velocities.len() => (k, slot),
                Ok(slot) => {
                    return Err(SchemeError::scheme_config(
                        k,
                        "init",
                        format!("slot {slot} is out of range"),
                    ));
                }
                Err(_) => conserved.get(&Symbol::new(key)).ok_or_else(|| {
                    SchemeError::scheme_config(
                        k,
                        "init",
                        format!("`{key}` is neither a conserved moment nor a slot index"),
                    )
                })?,
            };
            init.insert(position, init_value(k, key, value)?);
        }
    }
    Ok(init)
}

fn init_value(k: usize, key: &str, value: &ExprInput) -> Result<Expr> {
    value
        .to_expr()
        .map_err(|e| SchemeError::scheme_config(k, format!("init.{key}"), e.to_string()))
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Scheme informations")?;
        writeln!(f, "\t spatial dimension: dim={}", self.dim())?;
        writeln!(f, "\t number of schemes: nscheme={}", self.nscheme())?;
        writeln!(f, "\t number of velocities:")?;
        for (k, nv) in self.stencil.nv().iter().enumerate() {
            writeln!(f, "    Stencil.nv[{k}]={nv}")?;
        }
        writeln!(f, "\t velocities value:")?;
        for k in 0..self.nscheme() {
            let list: Vec<String> = self
                .stencil
                .velocities(k)
                .iter()
                .map(|v| format!("({}: {:?})", v.num, &v.v[..self.dim()]))
                .collect();
            writeln!(f, "    v[{k}]={}", list.join(", "))?;
        }
        writeln!(f, "\t polynomials:")?;
        for (k, p) in self.polynomials.iter().enumerate() {
            writeln!(f, "    P[{k}]={}", join(p))?;
        }
        writeln!(f, "\t equilibria:")?;
        for (k, eq) in self.equilibria.iter().enumerate() {
            writeln!(f, "    EQ[{k}]={}", join(eq))?;
        }
        writeln!(f, "\t relaxation parameters:")?;
        for (k, s) in self.normalized.relaxation.iter().enumerate() {
            writeln!(f, "    s[{k}]={s:?}")?;
        }
        writeln!(f, "\t moments matrices")?;
        for (k, (m, inv)) in self.moments.m.iter().zip(&self.moments.inv_m).enumerate() {
            writeln!(f, "M[{k}] = {m}")?;
            writeln!(f, "invM[{k}] = {inv}")?;
        }
        Ok(())
    }
}

fn join(list: &[Expr]) -> String {
    let items: Vec<String> = list.iter().map(Expr::to_string).collect();
    format!("[{}]", items.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const D1Q3: &str = r#"{
        "dim": 1,
        "scheme_velocity": "la",
        "parameters": {"la": 1.0},
        "schemes": [{
            "velocities": [2, 0, 1],
            "conserved_moments": ["m0", "m1"],
            "polynomials": [1, "la*X", "X^2/2"],
            "equilibrium": ["m0", "m1", "(la/2)**2*m0/2"],
            "relaxation_parameters": [0, 0, 1.9],
            "init": {"m0": 1.0, "1": "0"}
        }]
    }"#;

    fn d1q3() -> Scheme {
        Scheme::new(SchemeConfig::from_json(D1Q3).unwrap()).unwrap()
    }

    #[test]
    fn test_construction() {
        let scheme = d1q3();
        assert_eq!(scheme.nscheme(), 1);
        assert_eq!(scheme.scheme_velocity(), 1.0);
        assert_eq!(scheme.conserved().len(), 2);
        assert_eq!(scheme.conserved().non_conserved(0), &[2]);
        assert!((&scheme.moments().m[0] * &scheme.moments().inv_m[0]).is_identity());
        assert_eq!(scheme.initialization().len(), 2);
        assert_eq!(scheme.initialization()[&(0, 0)], Expr::one());
        assert_relative_eq!(scheme.relaxation_values()[0][2], 1.9, epsilon = 1e-15);
    }

    #[test]
    fn test_init_keys_checked() {
        let json = D1Q3.replace("\"1\": \"0\"", "\"rho\": \"0\"");
        let err = Scheme::new(SchemeConfig::from_json(&json).unwrap()).unwrap_err();
        assert!(matches!(err, SchemeError::Configuration { key, .. } if key == "init"));
    }

    #[test]
    fn test_missing_scheme_velocity_value() {
        let json = D1Q3.replace("\"parameters\": {\"la\": 1.0},", "");
        let err = Scheme::new(SchemeConfig::from_json(&json).unwrap()).unwrap_err();
        assert!(matches!(err, SchemeError::NumericConversion { .. }));
    }

    #[test]
    fn test_analysis_runs_once() {
        let json = D1Q3.replace(
            "\n    }",
            r#",
        "stability": {"test_monotonic_stability": true}
    }"#,
        );
        let scheme = Scheme::new(SchemeConfig::from_json(&json).unwrap()).unwrap();
        let first = scheme.analyze().unwrap();
        assert_eq!(first.monotonically_stable, Some(false));
        assert!(std::ptr::eq(first, scheme.analyze().unwrap()));
    }

    #[test]
    fn test_display_lists_matrices() {
        let text = d1q3().to_string();
        assert!(text.contains("nscheme=1"));
        assert!(text.contains("M[0] = "));
        assert!(text.contains("invM[0] = "));
    }

    #[test]
    fn test_generate_listing() {
        let mut generator = crate::generator::ListingGenerator::new();
        d1q3().generate(&mut generator).unwrap();
        let code = generator.code();
        for section in ["m2f:", "f2m:", "transport:", "equilibrium:", "relaxation:"] {
            assert!(code.contains(section), "missing {section}");
        }
        assert!(code.contains("m[0][2] = (1 - 1.9)*m[0][2] + 1.9*(1/8*m[0][0])"));
        assert!(generator.is_compiled());
    }
}
