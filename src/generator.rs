use nalgebra::DMatrix;

use crate::Float;
use crate::error::Result;
use crate::stencil::Stencil;
use crate::symbolic::Expr;

/// Backend turning a built scheme into executable routines.
///
/// The scheme calls the methods in order: `setup`, `m2f`, `f2m`,
/// `transport`, `equilibrium`, `relaxation`, `compile`.
pub trait Generator {
    fn setup(&mut self) {}

    /// Distributions from moments, with the block-diagonal `invM`.
    fn m2f(&mut self, inv_m: &DMatrix<Float>, dim: usize) -> Result<()>;

    /// Moments from distributions, with the block-diagonal `M`.
    fn f2m(&mut self, m: &DMatrix<Float>, dim: usize) -> Result<()>;

    fn transport(&mut self, stencil: &Stencil) -> Result<()>;

    /// `equilibria` use the `m[i][j]` convention with parameters substituted.
    fn equilibrium(&mut self, stencil: &Stencil, equilibria: &[Vec<Expr>]) -> Result<()>;

    fn relaxation(
        &mut self,
        stencil: &Stencil,
        rates: &[Vec<Float>],
        equilibria: &[Vec<Expr>],
    ) -> Result<()>;

    fn compile(&mut self) -> Result<()>;
}

/// Writes the routines as a readable listing instead of compiling them.
#[derive(Debug, Default, Clone)]
pub struct ListingGenerator {
    code: String,
    compiled: bool,
}

impl ListingGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled
    }

    fn line(&mut self, text: impl AsRef<str>) {
        self.code.push_str(text.as_ref());
        self.code.push('\n');
    }

    fn linear_map(&mut self, name: &str, out: &str, input: &str, matrix: &DMatrix<Float>) {
        self.line(format!("{name}:"));
        for i in 0..matrix.nrows() {
            let terms: Vec<String> = (0..matrix.ncols())
                .filter(|&j| matrix[(i, j)] != 0.0)
                .map(|j| format!("{:+}*{input}[{j}]", matrix[(i, j)]))
                .collect();
            let rhs = if terms.is_empty() { "0".to_string() } else { terms.join(" ") };
            self.line(format!("    {out}[{i}] = {rhs}"));
        }
    }
}

impl Generator for ListingGenerator {
    fn setup(&mut self) {
        self.code.clear();
        self.compiled = false;
    }

    fn m2f(&mut self, inv_m: &DMatrix<Float>, _dim: usize) -> Result<()> {
        self.linear_map("m2f", "f", "m", inv_m);
        Ok(())
    }

    fn f2m(&mut self, m: &DMatrix<Float>, _dim: usize) -> Result<()> {
        self.linear_map("f2m", "m", "f", m);
        Ok(())
    }

    fn transport(&mut self, stencil: &Stencil) -> Result<()> {
        let axes = ["x", "y", "z"];
        self.line("transport:");
        for (row, v) in stencil.all_velocities().enumerate() {
            let shift: Vec<String> = axes
                .iter()
                .zip(v.v)
                .take(stencil.dim())
                .map(|(axis, c)| match c {
                    0 => axis.to_string(),
                    c => format!("{axis}{:+}", -c),
                })
                .collect();
            let position = axes[..stencil.dim()].join(", ");
            self.line(format!("    f[{row}]({position}) = f[{row}]({})", shift.join(", ")));
        }
        Ok(())
    }

    fn equilibrium(&mut self, stencil: &Stencil, equilibria: &[Vec<Expr>]) -> Result<()> {
        self.line("equilibrium:");
        for (n, eqs) in equilibria.iter().enumerate().take(stencil.nstencils()) {
            for (i, eq) in eqs.iter().enumerate() {
                self.line(format!("    m[{n}][{i}] = {eq}"));
            }
        }
        Ok(())
    }

    fn relaxation(
        &mut self,
        stencil: &Stencil,
        rates: &[Vec<Float>],
        equilibria: &[Vec<Expr>],
    ) -> Result<()> {
        self.line("relaxation:");
        for n in 0..stencil.nstencils() {
            for (i, (&s, eq)) in rates[n].iter().zip(&equilibria[n]).enumerate() {
                if s == 0.0 {
                    continue;
                }
                self.line(format!("    m[{n}][{i}] = (1 - {s})*m[{n}][{i}] + {s}*({eq})"));
            }
        }
        Ok(())
    }

    fn compile(&mut self) -> Result<()> {
        self.compiled = true;
        Ok(())
    }
}
