use std::collections::BTreeMap;

use log::debug;
use nalgebra::DMatrix;

use crate::Float;
use crate::error::{Result, SchemeError};
use crate::stencil::{Stencil, Velocity};
use crate::symbolic::{Expr, SymMatrix, Symbol};

/// Moment matrices of every elementary scheme.
///
/// `m[k]` maps the distribution functions of scheme `k` to its moments
/// (`M[i,j] = P_i(v_j)`), `inv_m[k]` is its exact inverse. The numeric
/// counterparts have the parameters substituted; the global ones are
/// block-diagonal with blocks placed by the stencil pointer table.
#[derive(Debug, Clone)]
pub struct MomentMatrices {
    pub m: Vec<SymMatrix>,
    pub inv_m: Vec<SymMatrix>,
    pub mnum: Vec<DMatrix<Float>>,
    pub inv_mnum: Vec<DMatrix<Float>>,
    pub mnum_glob: DMatrix<Float>,
    pub inv_mnum_glob: DMatrix<Float>,
}

impl MomentMatrices {
    pub fn build(
        stencil: &Stencil,
        polynomials: &[Vec<Expr>],
        parameters: &BTreeMap<Symbol, Expr>,
    ) -> Result<Self> {
        let mut m = Vec::with_capacity(polynomials.len());
        let mut inv_m = Vec::with_capacity(polynomials.len());
        for (k, polys) in polynomials.iter().enumerate() {
            let mk = moment_matrix(k, stencil.velocities(k), polys)?;
            let inv = mk.try_inverse().ok_or(SchemeError::Algebraic { scheme: k })?;
            debug!("M[{k}] = {mk}");
            m.push(mk);
            inv_m.push(inv);
        }

        let mut mnum = Vec::with_capacity(m.len());
        let mut inv_mnum = Vec::with_capacity(m.len());
        for (k, (mk, ik)) in m.iter().zip(&inv_m).enumerate() {
            mnum.push(to_numeric(mk, parameters, &format!("moment matrix of scheme {k}"))?);
            inv_mnum.push(to_numeric(ik, parameters, &format!("inverse moment matrix of scheme {k}"))?);
        }

        let ptr = stencil.nv_ptr();
        let mnum_glob = block_diagonal(&mnum, ptr);
        let inv_mnum_glob = block_diagonal(&inv_mnum, ptr);

        Ok(MomentMatrices {
            m,
            inv_m,
            mnum,
            inv_mnum,
            mnum_glob,
            inv_mnum_glob,
        })
    }
}

/// Evaluate every polynomial at every velocity of the scheme.
pub fn moment_matrix(scheme: usize, velocities: &[Velocity], polynomials: &[Expr]) -> Result<SymMatrix> {
    let axes = [Symbol::new("X"), Symbol::new("Y"), Symbol::new("Z")];
    let at_velocity: Vec<BTreeMap<Symbol, Expr>> = velocities
        .iter()
        .map(|v| {
            axes.iter()
                .zip(v.v)
                .map(|(axis, c)| (axis.clone(), Expr::integer(i64::from(c))))
                .collect()
        })
        .collect();

    let n = velocities.len();
    let mut m = SymMatrix::zeros(polynomials.len(), n);
    for (i, p) in polynomials.iter().enumerate() {
        for (j, values) in at_velocity.iter().enumerate() {
            m[(i, j)] = p.subs(values).ok_or_else(|| {
                SchemeError::scheme_config(
                    scheme,
                    "polynomials",
                    format!("`{p}` is undefined at velocity {:?}", velocities[j].v),
                )
            })?;
        }
    }
    Ok(m)
}

/// Substitute the parameters and evaluate every entry.
pub fn to_numeric(
    m: &SymMatrix,
    parameters: &BTreeMap<Symbol, Expr>,
    context: &str,
) -> Result<DMatrix<Float>> {
    let mut out = DMatrix::zeros(m.nrows(), m.ncols());
    for i in 0..m.nrows() {
        for j in 0..m.ncols() {
            out[(i, j)] = evaluate(&m[(i, j)], parameters, context)?;
        }
    }
    Ok(out)
}

/// Numeric value of an expression once the parameters are substituted.
pub fn evaluate(e: &Expr, parameters: &BTreeMap<Symbol, Expr>, context: &str) -> Result<Float> {
    e.subs(parameters)
        .and_then(|v| v.to_f64())
        .ok_or_else(|| SchemeError::conversion(e, context))
}

/// Place square blocks along the diagonal; block `k` starts at `ptr[k]`.
pub fn block_diagonal(blocks: &[DMatrix<Float>], ptr: &[usize]) -> DMatrix<Float> {
    let n = ptr.last().copied().unwrap_or(0);
    let mut glob = DMatrix::zeros(n, n);
    for (block, &start) in blocks.iter().zip(ptr) {
        glob.view_mut((start, start), block.shape()).copy_from(block);
    }
    glob
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbolic::parse_expr;
    use approx::assert_relative_eq;

    fn exprs(list: &[&str]) -> Vec<Expr> {
        list.iter().map(|s| parse_expr(s).unwrap()).collect()
    }

    fn params(list: &[(&str, &str)]) -> BTreeMap<Symbol, Expr> {
        list.iter()
            .map(|(k, v)| (Symbol::new(k), parse_expr(v).unwrap()))
            .collect()
    }

    #[test]
    fn test_d1q3_matrices() {
        let stencil = Stencil::new(1, &[vec![2, 0, 1]]).unwrap();
        let polys = vec![exprs(&["1", "la*X", "X^2/2"])];
        let mm = MomentMatrices::build(&stencil, &polys, &params(&[("la", "2")])).unwrap();

        assert!((&mm.m[0] * &mm.inv_m[0]).is_identity());
        assert!((&mm.inv_m[0] * &mm.m[0]).is_identity());
        assert_eq!(mm.m[0][(1, 0)], parse_expr("-la").unwrap());

        let product = &mm.mnum[0] * &mm.inv_mnum[0];
        assert_relative_eq!(product, DMatrix::identity(3, 3), epsilon = 1e-12);
        assert_relative_eq!(mm.mnum[0][(1, 2)], 2.0);
    }

    #[test]
    fn test_block_diagonal_assembly() {
        let stencil = Stencil::new(1, &[vec![1, 2], vec![0, 1, 2]]).unwrap();
        let polys = vec![exprs(&["1", "X"]), exprs(&["1", "X", "X^2"])];
        let mm = MomentMatrices::build(&stencil, &polys, &BTreeMap::new()).unwrap();
        assert_eq!(mm.mnum_glob.shape(), (5, 5));
        assert_relative_eq!(mm.mnum_glob[(1, 1)], -1.0);
        assert_relative_eq!(mm.mnum_glob[(0, 2)], 0.0);
        assert_relative_eq!(mm.mnum_glob[(4, 4)], 1.0);
        let product = &mm.mnum_glob * &mm.inv_mnum_glob;
        assert_relative_eq!(product, DMatrix::identity(5, 5), epsilon = 1e-12);
    }

    #[test]
    fn test_singular_polynomials() {
        let stencil = Stencil::new(1, &[vec![1, 2]]).unwrap();
        let polys = vec![exprs(&["X^2", "1"])];
        let err = MomentMatrices::build(&stencil, &polys, &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, SchemeError::Algebraic { scheme: 0 }));
    }

    #[test]
    fn test_missing_parameter() {
        let stencil = Stencil::new(1, &[vec![1, 2]]).unwrap();
        let polys = vec![exprs(&["1", "la*X"])];
        let err = MomentMatrices::build(&stencil, &polys, &BTreeMap::new()).unwrap_err();
        match err {
            SchemeError::NumericConversion { expression, .. } => assert!(expression.contains("la")),
            other => panic!("unexpected error {other}"),
        }
    }
}
