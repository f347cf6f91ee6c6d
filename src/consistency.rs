//! Equivalent equations of a scheme by multi-scale expansion in the time step.
//!
//! The one-step operator is written in moment space with the conserved
//! moments first. Shifting a distribution along velocity `v` acts as
//! `exp(-la*h*v.grad)`, so the `n`-th order term of the operator is
//! `M * D_n * invM * J` with `D_n = diag((-la*v_k.grad)^n / n!)`. Its blocks
//! `A` (conserved to conserved), `B`, `C` and `D` feed a recurrence that
//! eliminates the non-conserved moments order by order.

use std::fmt;
use std::time::Instant;

use log::{debug, info, warn};
use serde::Serialize;

use crate::config::{ConsistencyConfig, MAX_CONSISTENCY_ORDER};
use crate::error::{Result, SchemeError};
use crate::scheme::Scheme;
use crate::stability::reference_state;
use crate::symbolic::{Expr, SymMatrix, Symbol};

/// The macroscopic equation satisfied by one conserved moment.
#[derive(Debug, Clone, Serialize)]
pub struct ConservationLaw {
    pub moment: String,
    /// Time derivative and leading-order flux divergence.
    pub lhs: Vec<Expr>,
    /// Corrections of order `h`, `h^2`, ...
    pub rhs: Vec<Expr>,
}

impl ConservationLaw {
    pub fn lhs_sum(&self) -> Expr {
        self.lhs.iter().cloned().sum()
    }

    pub fn rhs_sum(&self) -> Expr {
        self.rhs.iter().cloned().sum()
    }
}

impl fmt::Display for ConservationLaw {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.lhs_sum(), self.rhs_sum())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsistencyResult {
    pub order: usize,
    pub laws: Vec<ConservationLaw>,
}

impl ConsistencyResult {
    pub fn law(&self, moment: &str) -> Option<&ConservationLaw> {
        self.laws.iter().find(|law| law.moment == moment)
    }
}

impl fmt::Display for ConsistencyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "*".repeat(50);
        for law in &self.laws {
            writeln!(f, "{rule}")?;
            writeln!(f, "Conservation equation for {} at order {}", law.moment, self.order)?;
            writeln!(f, "    {}", law.lhs_sum())?;
            writeln!(f, "  =")?;
            writeln!(f, "    {}", law.rhs_sum())?;
        }
        writeln!(f, "{rule}")
    }
}

/// Blocks of `M * D_n * invM * J` for one expansion order.
struct Blocks {
    a: SymMatrix,
    b: SymMatrix,
    c: SymMatrix,
    d: SymMatrix,
}

/// Values the recurrence has settled for one order.
struct OrderTerms {
    a: SymMatrix,
    c: SymMatrix,
    gamma: Vec<SymMatrix>,
}

pub fn compute(scheme: &Scheme, config: &ConsistencyConfig) -> Result<ConsistencyResult> {
    let t0 = Instant::now();
    if config.order < 1 {
        warn!("consistency order {} raised to 1", config.order);
    }
    let order = config.effective_order();
    if order > MAX_CONSISTENCY_ORDER {
        return Err(SchemeError::config(
            "consistency.order",
            format!("order {order} exceeds the supported maximum {MAX_CONSISTENCY_ORDER}"),
        ));
    }

    scheme.config().check_reserved_symbols(&config.linearization)?;

    let index = scheme.conserved();
    let n_cons = index.len();
    if n_cons == 0 {
        return Err(SchemeError::Analysis(
            "consistency analysis needs at least one conserved moment".into(),
        ));
    }
    let stencil = scheme.stencil();
    let ptr = stencil.nv_ptr();
    let nvtot = stencil.nvtot();
    let reference = reference_state(index, &config.linearization)?;

    // global matrices with the conserved moments first
    let order_of_moments = index.global_order();
    let moments = scheme.moments();
    let mut m = SymMatrix::zeros(nvtot, nvtot);
    let mut inv_m = SymMatrix::zeros(nvtot, nvtot);
    for (il, &(n, k)) in order_of_moments.iter().enumerate() {
        for c in 0..stencil.nv()[n] {
            m[(il, ptr[n] + c)] = moments.m[n][(k, c)].clone();
            inv_m[(ptr[n] + c, il)] = moments.inv_m[n][(c, k)].clone();
        }
    }

    let equilibria = &scheme.normalized().equilibria;
    let mut eeq = SymMatrix::zeros(nvtot, nvtot);
    for il in 0..n_cons {
        eeq[(il, il)] = Expr::one();
    }
    for (il, &(n_i, k_i)) in order_of_moments.iter().enumerate().skip(n_cons) {
        let eqk = &equilibria[n_i][k_i];
        for (ic, &(n_j, k_j)) in order_of_moments[..n_cons].iter().enumerate() {
            let derivative = eqk.diff(&Symbol::moment(n_j, k_j));
            eeq[(il, ic)] = derivative.subs(&reference).ok_or_else(|| {
                SchemeError::conversion(&derivative, "linearized equilibrium Jacobian")
            })?;
        }
    }

    let relaxation = scheme.relaxation_symbolic();
    let rates: Vec<Expr> = order_of_moments
        .iter()
        .map(|&(n, k)| relaxation[n][k].clone())
        .collect();
    let s = SymMatrix::from_diagonal(&rates);
    let identity = SymMatrix::identity(nvtot);
    let j = &(&identity - &s) + &(&s * &eeq);

    let t1 = Instant::now();
    info!("consistency: initialization took {:.3}s", (t1 - t0).as_secs_f64());

    let la = scheme.scheme_velocity_symbolic();
    let gradient = [Symbol::new("dx"), Symbol::new("dy"), Symbol::new("dz")];
    let shifts: Vec<Expr> = stencil
        .all_velocities()
        .map(|v| {
            let transport: Expr = gradient
                .iter()
                .zip(v.v)
                .take(stencil.dim())
                .map(|(d, c)| &Expr::integer(i64::from(c)) * &Expr::symbol(d.clone()))
                .sum();
            -(la * &transport)
        })
        .collect();

    let nnc = nvtot - n_cons;
    let mut blocks = Vec::with_capacity(order + 1);
    for n in 0..=order {
        let n_factorial = Expr::integer(factorial(n));
        let mut scaled = m.clone();
        for (col, shift) in shifts.iter().enumerate() {
            let dn = shift
                .powi(n as i32)
                .and_then(|p| p.checked_div(&n_factorial))
                .unwrap_or_else(Expr::one);
            for row in 0..nvtot {
                let entry = &scaled[(row, col)] * &dn;
                scaled[(row, col)] = entry;
            }
        }
        let full = (&(&scaled * &inv_m) * &j).simplify();
        blocks.push(Blocks {
            a: full.block(0, 0, n_cons, n_cons),
            b: full.block(0, n_cons, n_cons, nnc),
            c: full.block(n_cons, 0, nnc, n_cons),
            d: full.block(n_cons, n_cons, nnc, nnc),
        });
    }

    let t2 = Instant::now();
    info!("consistency: blocks A, B, C, D took {:.3}s", (t2 - t1).as_secs_f64());

    let inv_s = s.block(n_cons, n_cons, nnc, nnc).try_inverse().ok_or_else(|| {
        SchemeError::Analysis(
            "the relaxation parameters of the non-conserved moments must not vanish".into(),
        )
    })?;

    let terms = eliminate(&blocks, &inv_s, order);

    let t3 = Instant::now();
    info!("consistency: elimination took {:.3}s", (t3 - t2).as_secs_f64());

    let names = index.from_moment_symbols();
    let conserved = index.ordered();
    let w = SymMatrix::column(
        conserved
            .iter()
            .map(|(name, _)| Expr::symbol(name.clone()))
            .collect(),
    );
    let flux: Vec<SymMatrix> = terms.iter().map(|t| &t.a * &w).collect();
    let time_step = Expr::symbol(Symbol::new("h"));
    let time_derivative = Expr::symbol(Symbol::new("dt"));

    let laws = conserved
        .iter()
        .enumerate()
        .map(|(k, (name, _))| {
            let lhs = vec![
                (&time_derivative * &w[(k, 0)]).rename(&names),
                (-&flux[1][(k, 0)]).rename(&names),
            ];
            let rhs = (1..order)
                .map(|n| {
                    let hn = time_step.powi(n as i32).unwrap_or_else(Expr::one);
                    (&hn * &flux[n + 1][(k, 0)]).rename(&names)
                })
                .collect();
            ConservationLaw {
                moment: name.to_string(),
                lhs,
                rhs,
            }
        })
        .collect();

    let result = ConsistencyResult { order, laws };
    debug!("{result}");
    let t4 = Instant::now();
    info!("consistency: equations took {:.3}s", (t4 - t3).as_secs_f64());
    info!("consistency: total {:.3}s", (t4 - t0).as_secs_f64());
    Ok(result)
}

/// Eliminate the non-conserved moments order by order.
///
/// Each order's terms are computed from the raw blocks and the terms already
/// settled for lower orders.
fn eliminate(blocks: &[Blocks], inv_s: &SymMatrix, order: usize) -> Vec<OrderTerms> {
    let mut terms = Vec::with_capacity(order + 1);
    terms.push(OrderTerms {
        a: blocks[0].a.clone(),
        c: (inv_s * &blocks[0].c).simplify(),
        gamma: Vec::new(),
    });

    for k in 1..=order {
        let mut a = blocks[k].a.clone();
        for j in 1..=k {
            a = &a + &(&blocks[j].b * &terms[k - j].c);
        }

        let mut gamma = Vec::with_capacity(k);
        gamma.push(a.clone());
        for j in 0..k.saturating_sub(1) {
            let n = a.nrows();
            let mut g = SymMatrix::zeros(n, n);
            for l in 1..k - j {
                g = &g + &(&terms[l].a * &terms[k - l].gamma[j]);
            }
            gamma.push(g.simplify());
        }

        for (j, g) in gamma.iter().enumerate().skip(1) {
            a = &a - &g.scale(&inverse_factorial(j + 1));
        }
        let a = a.simplify();

        let mut c = blocks[k].c.clone();
        for j in 1..=k {
            c = &c + &(&blocks[j].d * &terms[k - j].c);
        }
        for j in 0..k {
            let mut kkj = SymMatrix::zeros(c.nrows(), c.ncols());
            for l in 0..k - j {
                let g = if l == 0 { &gamma[j] } else { &terms[k - l].gamma[j] };
                kkj = &kkj + &(&terms[l].c * g);
            }
            c = &c - &kkj.scale(&inverse_factorial(j + 1));
        }
        let c = (inv_s * &c).simplify();

        terms.push(OrderTerms { a, c, gamma });
    }
    terms
}

fn factorial(n: usize) -> i64 {
    (1..=n as i64).product()
}

fn inverse_factorial(n: usize) -> Expr {
    Expr::integer(factorial(n)).recip().unwrap_or_else(Expr::one)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchemeConfig;
    use crate::symbolic::parse_expr;
    use std::collections::BTreeMap;

    fn d1q2(extra: &str) -> Scheme {
        let json = format!(
            r#"{{
            "dim": 1,
            "scheme_velocity": "la",
            "parameters": {{"la": 1.0, "s": 1.5, "u": 0.5{extra}}},
            "schemes": [{{
                "velocities": [1, 2],
                "conserved_moments": "rho",
                "polynomials": [1, "la*X"],
                "equilibrium": ["rho", "u*rho"],
                "relaxation_parameters": [0, "s"]
            }}]
        }}"#
        );
        Scheme::new(SchemeConfig::from_json(&json).unwrap()).unwrap()
    }

    fn order(order: i64) -> ConsistencyConfig {
        ConsistencyConfig {
            order,
            linearization: BTreeMap::new(),
        }
    }

    #[test]
    fn test_third_order_dispersion() {
        let result = compute(&d1q2(""), &order(3)).unwrap();
        let rho = result.law("rho").unwrap();
        assert_eq!(rho.lhs_sum(), parse_expr("dt*rho + u*dx*rho").unwrap());
        assert_eq!(rho.rhs.len(), 2);
        assert_eq!(
            rho.rhs[0],
            parse_expr("h*(1/s - 1/2)*(la^2 - u^2)*dx^2*rho").unwrap()
        );
        assert_eq!(
            rho.rhs[1],
            parse_expr(
                "-dx^3*h^2*rho*u*(-4*la^2*s^2 + 24*la^2*s - 24*la^2 \
                 + 7*s^2*u^2 - 30*s*u^2 + 24*u^2)/(12*s^2)"
            )
            .unwrap()
        );
    }

    #[test]
    fn test_order_below_one_is_raised() {
        let result = compute(&d1q2(""), &order(0)).unwrap();
        assert_eq!(result.order, 1);
        assert!(result.laws[0].rhs.is_empty());
    }

    #[test]
    fn test_order_above_maximum_is_rejected() {
        let err = compute(&d1q2(""), &order(5)).unwrap_err();
        assert!(matches!(err, SchemeError::Configuration { key, .. } if key == "consistency.order"));
    }

    #[test]
    fn test_reserved_parameter_rejected_without_consistency_block() {
        let scheme = d1q2(r#", "h": 0.5"#);
        let err = compute(&scheme, &order(2)).unwrap_err();
        assert!(matches!(err, SchemeError::Configuration { key, .. } if key == "parameters"));
    }

    #[test]
    fn test_reserved_linearization_value_rejected() {
        let mut config = order(1);
        config.linearization.insert("rho".into(), "dx".into());
        let err = compute(&d1q2(""), &config).unwrap_err();
        assert!(matches!(
            err,
            SchemeError::Configuration { key, .. } if key == "consistency.linearization.rho"
        ));
    }

    #[test]
    fn test_law_display() {
        let result = compute(&d1q2(""), &order(1)).unwrap();
        let text = result.to_string();
        assert!(text.contains("Conservation equation for rho at order 1"));
        assert_eq!(result.laws[0].to_string(), format!("{} = 0", result.laws[0].lhs_sum()));
    }

    #[test]
    fn test_factorials() {
        assert_eq!(factorial(0), 1);
        assert_eq!(factorial(4), 24);
        assert_eq!(inverse_factorial(3) * Expr::integer(6), Expr::one());
    }
}
