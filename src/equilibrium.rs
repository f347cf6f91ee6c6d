use std::collections::BTreeMap;

use log::warn;

use crate::Float;
use crate::conserved::ConservedMomentIndex;
use crate::error::{Result, SchemeError};
use crate::moments::evaluate;
use crate::symbolic::{Expr, Symbol};

/// Equilibria and relaxation rates prepared for a code generator.
#[derive(Debug, Clone)]
pub struct Normalized {
    /// Equilibria with every conserved moment written `m[i][j]`.
    pub equilibria: Vec<Vec<Expr>>,
    /// Same, with the parameters substituted.
    pub equilibria_num: Vec<Vec<Expr>>,
    pub relaxation: Vec<Vec<Float>>,
}

impl Normalized {
    pub fn build(
        equilibria: &[Vec<Expr>],
        relaxation: &[Vec<Expr>],
        index: &ConservedMomentIndex,
        parameters: &BTreeMap<Symbol, Expr>,
    ) -> Result<Self> {
        let equilibria = rename_moments(equilibria, index);
        let equilibria_num = substitute(&equilibria, parameters)?;
        let relaxation = relaxation_values(relaxation, parameters)?;
        Ok(Normalized {
            equilibria,
            equilibria_num,
            relaxation,
        })
    }
}

/// Rewrite conserved moments with the `m[i][j]` convention, across schemes.
pub fn rename_moments(equilibria: &[Vec<Expr>], index: &ConservedMomentIndex) -> Vec<Vec<Expr>> {
    let names = index.to_moment_symbols();
    equilibria
        .iter()
        .map(|eq| eq.iter().map(|e| e.rename(&names)).collect())
        .collect()
}

pub fn substitute(
    equilibria: &[Vec<Expr>],
    parameters: &BTreeMap<Symbol, Expr>,
) -> Result<Vec<Vec<Expr>>> {
    equilibria
        .iter()
        .map(|eq| {
            eq.iter()
                .map(|e| {
                    e.subs(parameters)
                        .ok_or_else(|| SchemeError::conversion(e, "equilibrium"))
                })
                .collect()
        })
        .collect()
}

/// Numeric relaxation rates; rates outside `[0, 2]` only warn.
pub fn relaxation_values(
    relaxation: &[Vec<Expr>],
    parameters: &BTreeMap<Symbol, Expr>,
) -> Result<Vec<Vec<Float>>> {
    let mut values = Vec::with_capacity(relaxation.len());
    for (k, rates) in relaxation.iter().enumerate() {
        let mut vk = Vec::with_capacity(rates.len());
        for (j, s) in rates.iter().enumerate() {
            let value = evaluate(s, parameters, "relaxation parameter")?;
            if !(0.0..=2.0).contains(&value) {
                warn!("relaxation parameter s[{k}][{j}] = {value} is outside [0, 2]");
            }
            vk.push(value);
        }
        values.push(vk);
    }
    Ok(values)
}
