use std::collections::BTreeMap;
use std::f64::consts::PI;

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use nalgebra::{Complex, DMatrix};

use crate::Float;
use crate::config::ExprInput;
use crate::conserved::ConservedMomentIndex;
use crate::equilibrium::Normalized;
use crate::error::{Result, SchemeError};
use crate::moments::MomentMatrices;
use crate::stencil::Stencil;
use crate::symbolic::{Expr, Symbol};

/// Spectral radii up to this much above one still count as stable.
pub const L2_TOLERANCE: Float = 1e-14;

/// Linear stability of a scheme around a reference state.
///
/// Holds the relaxation amplification matrix `I + invM R (E - I) M`, built
/// once; the Fourier operator for a wave vector is derived from it on demand.
#[derive(Debug, Clone)]
pub struct StabilityAnalysis {
    dim: usize,
    velocities: Vec<[i32; 3]>,
    relaxation_matrix: DMatrix<Float>,
}

impl StabilityAnalysis {
    pub fn new(
        stencil: &Stencil,
        moments: &MomentMatrices,
        normalized: &Normalized,
        index: &ConservedMomentIndex,
        linearization: &BTreeMap<String, Float>,
    ) -> Result<Self> {
        let reference = reference_state(index, linearization)?;
        let nv = stencil.nv();
        let ptr = stencil.nv_ptr();
        let nvtot = stencil.nvtot();

        let moment_symbols: Vec<Vec<Symbol>> = nv
            .iter()
            .enumerate()
            .map(|(n, &len)| (0..len).map(|j| Symbol::moment(n, j)).collect())
            .collect();

        let mut e = DMatrix::<Float>::zeros(nvtot, nvtot);
        for (n, eqs) in normalized.equilibria_num.iter().enumerate() {
            for (i, eq) in eqs.iter().enumerate() {
                let row = ptr[n] + i;
                if index.is_conserved(n, i) {
                    e[(row, row)] = 1.0;
                    continue;
                }
                for (mm, symbols) in moment_symbols.iter().enumerate() {
                    for (j, m) in symbols.iter().enumerate() {
                        let derivative = eq.diff(m);
                        if derivative.is_zero() {
                            continue;
                        }
                        let value = derivative
                            .subs(&reference)
                            .and_then(|d| d.to_f64())
                            .ok_or_else(|| {
                                SchemeError::conversion(
                                    &derivative,
                                    format!(
                                        "equilibrium Jacobian d EQ[{n}][{i}] / d {m}; \
                                         add the moment to the stability linearization"
                                    ),
                                )
                            })?;
                        e[(row, ptr[mm] + j)] = value;
                    }
                }
            }
        }

        let rates: Vec<Float> = normalized.relaxation.iter().flatten().copied().collect();
        let r = DMatrix::from_diagonal(&nalgebra::DVector::from_vec(rates));
        let identity = DMatrix::<Float>::identity(nvtot, nvtot);
        let relaxation_matrix =
            &identity + &moments.inv_mnum_glob * (r * (e - &identity)) * &moments.mnum_glob;
        debug!("relaxation amplification matrix: {relaxation_matrix}");

        Ok(StabilityAnalysis {
            dim: stencil.dim(),
            velocities: stencil.all_velocities().map(|v| v.v).collect(),
            relaxation_matrix,
        })
    }

    /// Amplification matrix of the relaxation step alone.
    pub fn amplification_matrix_relaxation(&self) -> &DMatrix<Float> {
        &self.relaxation_matrix
    }

    /// One transport and relaxation step acting on the Fourier mode `k`.
    pub fn amplification_matrix(&self, wave_vector: &[Float]) -> Result<DMatrix<Complex<Float>>> {
        if wave_vector.len() != self.dim {
            return Err(SchemeError::config(
                "wave_vector",
                format!("{} components in dimension {}", wave_vector.len(), self.dim),
            ));
        }
        let mut j = self.relaxation_matrix.map(|x| Complex::new(x, 0.0));
        for (row, v) in self.velocities.iter().enumerate() {
            let phase: Float = wave_vector
                .iter()
                .zip(v)
                .map(|(k, &c)| k * Float::from(c))
                .sum();
            let factor = Complex::from_polar(1.0, phase);
            for x in j.row_mut(row).iter_mut() {
                *x *= factor;
            }
        }
        Ok(j)
    }

    pub fn eigenvalues(&self, wave_vector: &[Float]) -> Result<Vec<Complex<Float>>> {
        let j = self.amplification_matrix(wave_vector)?;
        let values = j.eigenvalues().ok_or_else(|| {
            SchemeError::Analysis(format!(
                "eigenvalue solver did not converge for wave vector {wave_vector:?}"
            ))
        })?;
        Ok(values.iter().copied().collect())
    }

    pub fn spectral_radius(&self, wave_vector: &[Float]) -> Result<Float> {
        Ok(self
            .eigenvalues(wave_vector)?
            .iter()
            .map(|z| z.norm())
            .fold(0.0, Float::max))
    }

    /// Von Neumann test on a uniform grid of `[0, 2pi]^dim`.
    ///
    /// Stops at the first wave vector whose spectral radius exceeds one.
    pub fn is_l2_stable(&self, resolution: usize, progress: bool) -> Result<bool> {
        if resolution < 2 {
            return Err(SchemeError::config(
                "stability.resolution",
                "at least two sample points per axis are needed",
            ));
        }
        let total = u32::try_from(self.dim)
            .ok()
            .and_then(|dim| resolution.checked_pow(dim))
            .ok_or_else(|| {
                SchemeError::config(
                    "stability.resolution",
                    format!("{resolution}^{} wave vectors is too many", self.dim),
                )
            })?;
        let axis: Vec<Float> = (0..resolution)
            .map(|i| 2.0 * PI * i as Float / (resolution - 1) as Float)
            .collect();

        let bar = if progress {
            let bar = ProgressBar::new(total as u64);
            if let Ok(style) = ProgressStyle::with_template("{bar:40} {pos}/{len} wave vectors ({eta})") {
                bar.set_style(style);
            }
            bar
        } else {
            ProgressBar::hidden()
        };

        let mut k = vec![0.0; self.dim];
        for flat in 0..total {
            let mut rest = flat;
            for component in k.iter_mut() {
                *component = axis[rest % resolution];
                rest /= resolution;
            }
            let radius = self.spectral_radius(&k)?;
            bar.inc(1);
            if radius > 1.0 + L2_TOLERANCE {
                bar.finish_and_clear();
                info!("spectral radius {radius} at wave vector {k:?}");
                return Ok(false);
            }
        }
        bar.finish_and_clear();
        Ok(true)
    }

    /// Every entry of the relaxation amplification matrix is non-negative.
    pub fn is_monotonically_stable(&self) -> bool {
        self.relaxation_matrix.iter().all(|&x| x >= 0.0)
    }
}

/// Map linearization names to the `m[i][j]` symbols of conserved moments.
pub(crate) fn reference_state<V: TryIntoExpr>(
    index: &ConservedMomentIndex,
    linearization: &BTreeMap<String, V>,
) -> Result<BTreeMap<Symbol, Expr>> {
    let mut reference = BTreeMap::new();
    for (name, value) in linearization {
        let (k, j) = index.get(&Symbol::new(name)).ok_or_else(|| {
            SchemeError::config("linearization", format!("`{name}` is not a conserved moment"))
        })?;
        reference.insert(Symbol::moment(k, j), value.try_into_expr(name)?);
    }
    Ok(reference)
}

/// Values accepted as linearization references.
pub(crate) trait TryIntoExpr {
    fn try_into_expr(&self, name: &str) -> Result<Expr>;
}

impl TryIntoExpr for Float {
    fn try_into_expr(&self, name: &str) -> Result<Expr> {
        Expr::from_f64(*self)
            .ok_or_else(|| SchemeError::conversion(self, format!("linearization of {name}")))
    }
}

impl TryIntoExpr for ExprInput {
    fn try_into_expr(&self, _name: &str) -> Result<Expr> {
        self.to_expr()
    }
}
