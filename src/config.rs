use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::Float;
use crate::error::{Result, SchemeError};
use crate::symbolic::{Expr, Symbol, is_symbol_name, parse_expr};

/// Symbols the consistency expansion introduces for itself.
pub const RESERVED_SYMBOLS: [&str; 5] = ["h", "dt", "dx", "dy", "dz"];

/// Consistency expansions above this order are refused.
pub const MAX_CONSISTENCY_ORDER: usize = 4;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemeConfig {
    pub dim: usize,
    /// Ratio of the space step over the time step (`la = dx/dt`).
    pub scheme_velocity: ExprInput,
    #[serde(default)]
    pub parameters: BTreeMap<String, Float>,
    pub schemes: Vec<ElementarySchemeConfig>,
    #[serde(default)]
    pub stability: Option<StabilityConfig>,
    #[serde(default)]
    pub consistency: Option<ConsistencyConfig>,
    #[serde(default)]
    pub output: Option<OutputConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ElementarySchemeConfig {
    pub velocities: Vec<usize>,
    #[serde(default)]
    pub conserved_moments: Option<ConservedMoments>,
    pub polynomials: Vec<ExprInput>,
    pub equilibrium: Vec<ExprInput>,
    pub relaxation_parameters: Vec<ExprInput>,
    /// Initial values keyed by conserved-moment name or slot index.
    #[serde(default)]
    pub init: Option<BTreeMap<String, ExprInput>>,
}

/// One conserved moment name or a list of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConservedMoments {
    One(String),
    Many(Vec<String>),
}

impl ConservedMoments {
    pub fn names(&self) -> &[String] {
        match self {
            ConservedMoments::One(name) => std::slice::from_ref(name),
            ConservedMoments::Many(names) => names,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StabilityConfig {
    /// Reference values of conserved moments for the equilibrium Jacobian.
    #[serde(default)]
    pub linearization: BTreeMap<String, Float>,
    #[serde(default)]
    pub test_monotonic_stability: bool,
    #[serde(default, rename = "test_L2_stability")]
    pub test_l2_stability: bool,
    /// Sample points per axis of the wave-vector grid.
    #[serde(default = "default_resolution")]
    pub resolution: usize,
    #[serde(default)]
    pub progress: bool,
}

fn default_resolution() -> usize {
    101
}

impl Default for StabilityConfig {
    fn default() -> Self {
        StabilityConfig {
            linearization: BTreeMap::new(),
            test_monotonic_stability: false,
            test_l2_stability: false,
            resolution: default_resolution(),
            progress: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConsistencyConfig {
    pub order: i64,
    /// Reference values (numbers or expressions) of conserved moments.
    #[serde(default)]
    pub linearization: BTreeMap<String, ExprInput>,
}

impl ConsistencyConfig {
    /// The order actually used: requests below 1 become 1.
    pub fn effective_order(&self) -> usize {
        usize::try_from(self.order.max(1)).unwrap_or(1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    pub output_directory: String,
    #[serde(default = "default_write_json")]
    pub write_json: bool,
}

fn default_write_json() -> bool {
    true
}

/// An expression-valued entry of the configuration.
///
/// JSON numbers become `Number`, strings that are a single symbol name become
/// `Symbol`, and every other string is a `Formula`. Built schemes may also be
/// described programmatically with ready-made expressions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawExpr", into = "RawExpr")]
pub enum ExprInput {
    Number(Float),
    Symbol(String),
    Formula(String),
    Expression(Expr),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawExpr {
    Number(Float),
    Text(String),
}

impl From<RawExpr> for ExprInput {
    fn from(raw: RawExpr) -> Self {
        match raw {
            RawExpr::Number(x) => ExprInput::Number(x),
            RawExpr::Text(text) => {
                let text = text.trim().to_string();
                if is_symbol_name(&text) {
                    ExprInput::Symbol(text)
                } else {
                    ExprInput::Formula(text)
                }
            }
        }
    }
}

impl From<ExprInput> for RawExpr {
    fn from(input: ExprInput) -> Self {
        match input {
            ExprInput::Number(x) => RawExpr::Number(x),
            ExprInput::Symbol(s) | ExprInput::Formula(s) => RawExpr::Text(s),
            ExprInput::Expression(e) => RawExpr::Text(e.to_string()),
        }
    }
}

impl From<Float> for ExprInput {
    fn from(x: Float) -> Self {
        ExprInput::Number(x)
    }
}

impl From<i32> for ExprInput {
    fn from(n: i32) -> Self {
        ExprInput::Expression(Expr::integer(i64::from(n)))
    }
}

impl From<&str> for ExprInput {
    fn from(text: &str) -> Self {
        ExprInput::from(RawExpr::Text(text.to_string()))
    }
}

impl From<Expr> for ExprInput {
    fn from(e: Expr) -> Self {
        ExprInput::Expression(e)
    }
}

impl ExprInput {
    /// Resolve to the internal symbolic representation.
    pub fn to_expr(&self) -> Result<Expr> {
        match self {
            ExprInput::Number(x) => {
                Expr::from_f64(*x).ok_or_else(|| SchemeError::conversion(x, "number literal"))
            }
            ExprInput::Symbol(name) => Ok(Expr::symbol(Symbol::new(name))),
            ExprInput::Formula(text) => Ok(parse_expr(text)?),
            ExprInput::Expression(e) => Ok(e.clone()),
        }
    }
}

/// Resolve one per-scheme list into a symbolic vector of length `nv`.
pub fn expression_vector(
    scheme: usize,
    key: &str,
    entries: &[ExprInput],
    nv: usize,
) -> Result<Vec<Expr>> {
    if entries.len() != nv {
        return Err(SchemeError::scheme_config(
            scheme,
            key,
            format!("{} entries for a stencil of {nv} velocities", entries.len()),
        ));
    }
    entries
        .iter()
        .map(|input| {
            input
                .to_expr()
                .map_err(|e| SchemeError::scheme_config(scheme, key, e.to_string()))
        })
        .collect()
}

impl fmt::Display for ExprInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExprInput::Number(x) => write!(f, "{x}"),
            ExprInput::Symbol(s) | ExprInput::Formula(s) => f.write_str(s),
            ExprInput::Expression(e) => write!(f, "{e}"),
        }
    }
}

impl SchemeConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: SchemeConfig = serde_json::from_str(json)?;
        Ok(config)
    }

    /// Check that the configuration is well formed without building anything.
    pub fn validate(&self) -> Result<()> {
        if !(1..=3).contains(&self.dim) {
            return Err(SchemeError::config(
                "dim",
                format!("must be 1, 2 or 3, got {}", self.dim),
            ));
        }
        if self.schemes.is_empty() {
            return Err(SchemeError::config("schemes", "at least one elementary scheme is needed"));
        }
        for name in self.parameters.keys() {
            if !is_symbol_name(name) {
                return Err(SchemeError::config(
                    "parameters",
                    format!("`{name}` is not a symbol name"),
                ));
            }
        }
        self.scheme_velocity
            .to_expr()
            .map_err(|e| SchemeError::config("scheme_velocity", e.to_string()))?;

        for (k, scheme) in self.schemes.iter().enumerate() {
            scheme.validate(k)?;
        }

        if let Some(stability) = &self.stability {
            if stability.resolution < 2 {
                return Err(SchemeError::config(
                    "stability.resolution",
                    "at least two sample points per axis are needed",
                ));
            }
        }

        if let Some(consistency) = &self.consistency {
            if consistency.effective_order() > MAX_CONSISTENCY_ORDER {
                return Err(SchemeError::config(
                    "consistency.order",
                    format!(
                        "order {} exceeds the supported maximum {MAX_CONSISTENCY_ORDER}",
                        consistency.order
                    ),
                ));
            }
            for (name, value) in &consistency.linearization {
                value.to_expr().map_err(|e| {
                    SchemeError::config(format!("consistency.linearization.{name}"), e.to_string())
                })?;
            }
            self.check_reserved_symbols(&consistency.linearization)?;
        }
        Ok(())
    }

    /// The consistency analysis owns `h`, `dt`, `dx`, `dy` and `dz`; none of
    /// the inputs it reads may use them.
    pub(crate) fn check_reserved_symbols(
        &self,
        linearization: &BTreeMap<String, ExprInput>,
    ) -> Result<()> {
        if let Some(name) = self.parameters.keys().find(|n| is_reserved(n)) {
            return Err(SchemeError::config(
                "parameters",
                format!("`{name}` is reserved by the consistency analysis"),
            ));
        }
        reject_reserved("scheme_velocity", &self.scheme_velocity)?;
        for (name, value) in linearization {
            if is_reserved(name) {
                return Err(SchemeError::config(
                    "consistency.linearization",
                    format!("`{name}` is reserved by the consistency analysis"),
                ));
            }
            reject_reserved(&format!("consistency.linearization.{name}"), value)?;
        }
        for (k, scheme) in self.schemes.iter().enumerate() {
            for (key, list) in scheme.expression_lists() {
                for input in list {
                    let e = input.to_expr()?;
                    if let Some(s) = e.free_symbols().iter().find(|s| is_reserved(s.name())) {
                        return Err(SchemeError::scheme_config(
                            k,
                            key,
                            format!("`{s}` is reserved by the consistency analysis"),
                        ));
                    }
                }
            }
            for name in scheme.conserved_names() {
                if is_reserved(name) {
                    return Err(SchemeError::scheme_config(
                        k,
                        "conserved_moments",
                        format!("`{name}` is reserved by the consistency analysis"),
                    ));
                }
            }
        }
        Ok(())
    }
}

fn is_reserved(name: &str) -> bool {
    RESERVED_SYMBOLS.contains(&name)
}

fn reject_reserved(key: &str, input: &ExprInput) -> Result<()> {
    let e = input.to_expr()?;
    match e.free_symbols().iter().find(|s| is_reserved(s.name())) {
        Some(s) => Err(SchemeError::config(
            key,
            format!("`{s}` is reserved by the consistency analysis"),
        )),
        None => Ok(()),
    }
}

impl ElementarySchemeConfig {
    pub fn conserved_names(&self) -> &[String] {
        self.conserved_moments
            .as_ref()
            .map(ConservedMoments::names)
            .unwrap_or_default()
    }

    fn expression_lists(&self) -> [(&'static str, &[ExprInput]); 3] {
        [
            ("polynomials", &self.polynomials),
            ("equilibrium", &self.equilibrium),
            ("relaxation_parameters", &self.relaxation_parameters),
        ]
    }

    fn validate(&self, k: usize) -> Result<()> {
        let nv = self.velocities.len();
        for (key, list) in self.expression_lists() {
            expression_vector(k, key, list, nv)?;
        }
        for name in self.conserved_names() {
            if !is_symbol_name(name) {
                return Err(SchemeError::scheme_config(
                    k,
                    "conserved_moments",
                    format!("`{name}` is not a symbol name"),
                ));
            }
        }
        if let Some(init) = &self.init {
            for (key, value) in init {
                value
                    .to_expr()
                    .map_err(|e| SchemeError::scheme_config(k, format!("init.{key}"), e.to_string()))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const D1Q3: &str = r#"{
        "dim": 1,
        "scheme_velocity": "la",
        "parameters": {"la": 1.0},
        "schemes": [{
            "velocities": [2, 0, 1],
            "conserved_moments": "rho",
            "polynomials": [1, "la*X", "X^2/2"],
            "equilibrium": ["rho", "q", "(la/2)**2*rho/2"],
            "relaxation_parameters": [0, 0, 1.9],
            "init": {"rho": 1.0}
        }],
        "stability": {"test_L2_stability": true}
    }"#;

    #[test]
    fn test_parse_and_classify_entries() {
        let config = SchemeConfig::from_json(D1Q3).unwrap();
        let scheme = &config.schemes[0];
        assert_eq!(scheme.conserved_names(), &["rho".to_string()]);
        assert_eq!(scheme.polynomials[0], ExprInput::Number(1.0));
        assert_eq!(scheme.polynomials[1], ExprInput::Formula("la*X".into()));
        assert_eq!(scheme.equilibrium[1], ExprInput::Symbol("q".into()));
        assert_eq!(config.scheme_velocity, ExprInput::Symbol("la".into()));

        let stability = config.stability.as_ref().unwrap();
        assert!(stability.test_l2_stability);
        assert!(!stability.test_monotonic_stability);
        assert_eq!(stability.resolution, 101);
        config.validate().unwrap();
    }

    #[test]
    fn test_moment_symbol_is_a_symbol() {
        assert_eq!(ExprInput::from("m[0][1]"), ExprInput::Symbol("m[0][1]".into()));
        assert_eq!(ExprInput::from(" 2*m[0][1] "), ExprInput::Formula("2*m[0][1]".into()));
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let json = D1Q3.replace("\"init\"", "\"initial\"");
        assert!(matches!(SchemeConfig::from_json(&json), Err(SchemeError::Json(_))));
    }

    #[test]
    fn test_size_mismatch_names_scheme_and_key() {
        let json = D1Q3.replace("[0, 0, 1.9]", "[0, 1.9]");
        let err = SchemeConfig::from_json(&json).unwrap().validate().unwrap_err();
        match err {
            SchemeError::Configuration { scheme, key, .. } => {
                assert_eq!(scheme, Some(0));
                assert_eq!(key, "relaxation_parameters");
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_bad_formula_is_configuration_error() {
        let json = D1Q3.replace("X^2/2", "X^^2");
        let err = SchemeConfig::from_json(&json).unwrap().validate().unwrap_err();
        assert!(matches!(err, SchemeError::Configuration { key, .. } if key == "polynomials"));
    }

    #[test]
    fn test_consistency_limits() {
        let mut config = SchemeConfig::from_json(D1Q3).unwrap();
        config.consistency = Some(ConsistencyConfig {
            order: 0,
            linearization: BTreeMap::new(),
        });
        config.validate().unwrap();
        assert_eq!(config.consistency.as_ref().unwrap().effective_order(), 1);

        config.consistency = Some(ConsistencyConfig {
            order: 5,
            linearization: BTreeMap::new(),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reserved_symbol_collision() {
        let mut config = SchemeConfig::from_json(&D1Q3.replace("\"q\"", "\"dx\"")).unwrap();
        config.validate().unwrap();
        config.consistency = Some(ConsistencyConfig {
            order: 1,
            linearization: BTreeMap::new(),
        });
        let err = config.validate().unwrap_err();
        assert!(matches!(err, SchemeError::Configuration { key, .. } if key == "equilibrium"));
    }
}
