use std::fmt;
use std::ops::{Add, Index, IndexMut, Mul, Sub};

use super::Expr;

/// Dense row-major matrix of symbolic expressions.
#[derive(Debug, Clone, PartialEq)]
pub struct SymMatrix {
    nrows: usize,
    ncols: usize,
    data: Vec<Expr>,
}

impl SymMatrix {
    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        SymMatrix {
            nrows,
            ncols,
            data: vec![Expr::zero(); nrows * ncols],
        }
    }

    pub fn identity(n: usize) -> Self {
        SymMatrix::from_fn(n, n, |i, j| if i == j { Expr::one() } else { Expr::zero() })
    }

    pub fn from_fn(nrows: usize, ncols: usize, mut f: impl FnMut(usize, usize) -> Expr) -> Self {
        let mut data = Vec::with_capacity(nrows * ncols);
        for i in 0..nrows {
            for j in 0..ncols {
                data.push(f(i, j));
            }
        }
        SymMatrix { nrows, ncols, data }
    }

    pub fn from_diagonal(diag: &[Expr]) -> Self {
        let n = diag.len();
        SymMatrix::from_fn(n, n, |i, j| if i == j { diag[i].clone() } else { Expr::zero() })
    }

    pub fn column(entries: Vec<Expr>) -> Self {
        SymMatrix {
            nrows: entries.len(),
            ncols: 1,
            data: entries,
        }
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn is_square(&self) -> bool {
        self.nrows == self.ncols
    }

    pub fn row(&self, i: usize) -> &[Expr] {
        &self.data[i * self.ncols..(i + 1) * self.ncols]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Expr> {
        self.data.iter()
    }

    pub fn block(&self, r0: usize, c0: usize, nrows: usize, ncols: usize) -> SymMatrix {
        SymMatrix::from_fn(nrows, ncols, |i, j| self[(r0 + i, c0 + j)].clone())
    }

    pub fn map(&self, f: impl FnMut(&Expr) -> Expr) -> SymMatrix {
        SymMatrix {
            nrows: self.nrows,
            ncols: self.ncols,
            data: self.data.iter().map(f).collect(),
        }
    }

    pub fn simplify(&self) -> SymMatrix {
        self.map(Expr::simplify)
    }

    pub fn scale(&self, factor: &Expr) -> SymMatrix {
        self.map(|e| e * factor)
    }

    pub fn is_zero(&self) -> bool {
        self.data.iter().all(Expr::is_zero)
    }

    pub fn is_identity(&self) -> bool {
        self.is_square()
            && (0..self.nrows).all(|i| {
                (0..self.ncols).all(|j| {
                    let e = &self[(i, j)];
                    if i == j { e.is_one() } else { e.is_zero() }
                })
            })
    }

    fn swap_rows(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        for j in 0..self.ncols {
            self.data.swap(a * self.ncols + j, b * self.ncols + j);
        }
    }

    /// Exact inverse by Gauss-Jordan elimination; `None` when singular.
    pub fn try_inverse(&self) -> Option<SymMatrix> {
        if !self.is_square() {
            return None;
        }
        let n = self.nrows;
        let mut a = self.clone();
        let mut inv = SymMatrix::identity(n);
        for col in 0..n {
            let pivot = (col..n).find(|&r| !a[(r, col)].is_zero())?;
            a.swap_rows(pivot, col);
            inv.swap_rows(pivot, col);
            let p = a[(col, col)].recip()?;
            for j in 0..n {
                let (x, y) = (&a[(col, j)] * &p, &inv[(col, j)] * &p);
                a[(col, j)] = x;
                inv[(col, j)] = y;
            }
            for r in 0..n {
                if r == col || a[(r, col)].is_zero() {
                    continue;
                }
                let factor = a[(r, col)].clone();
                for j in 0..n {
                    let x = &a[(r, j)] - &(&factor * &a[(col, j)]);
                    let y = &inv[(r, j)] - &(&factor * &inv[(col, j)]);
                    a[(r, j)] = x;
                    inv[(r, j)] = y;
                }
            }
        }
        Some(inv)
    }
}

impl Index<(usize, usize)> for SymMatrix {
    type Output = Expr;

    fn index(&self, (i, j): (usize, usize)) -> &Expr {
        assert!(i < self.nrows && j < self.ncols, "index ({i}, {j}) out of bounds");
        &self.data[i * self.ncols + j]
    }
}

impl IndexMut<(usize, usize)> for SymMatrix {
    fn index_mut(&mut self, (i, j): (usize, usize)) -> &mut Expr {
        assert!(i < self.nrows && j < self.ncols, "index ({i}, {j}) out of bounds");
        &mut self.data[i * self.ncols + j]
    }
}

impl Mul for &SymMatrix {
    type Output = SymMatrix;

    fn mul(self, rhs: &SymMatrix) -> SymMatrix {
        assert_eq!(self.ncols, rhs.nrows, "matrix product dimension mismatch");
        SymMatrix::from_fn(self.nrows, rhs.ncols, |i, j| {
            let mut acc = Expr::zero();
            for k in 0..self.ncols {
                let (a, b) = (&self[(i, k)], &rhs[(k, j)]);
                if a.is_zero() || b.is_zero() {
                    continue;
                }
                acc = &acc + &(a * b);
            }
            acc
        })
    }
}

impl Add for &SymMatrix {
    type Output = SymMatrix;

    fn add(self, rhs: &SymMatrix) -> SymMatrix {
        assert_eq!((self.nrows, self.ncols), (rhs.nrows, rhs.ncols));
        SymMatrix::from_fn(self.nrows, self.ncols, |i, j| &self[(i, j)] + &rhs[(i, j)])
    }
}

impl Sub for &SymMatrix {
    type Output = SymMatrix;

    fn sub(self, rhs: &SymMatrix) -> SymMatrix {
        assert_eq!((self.nrows, self.ncols), (rhs.nrows, rhs.ncols));
        SymMatrix::from_fn(self.nrows, self.ncols, |i, j| &self[(i, j)] - &rhs[(i, j)])
    }
}

impl fmt::Display for SymMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for i in 0..self.nrows {
            if i > 0 {
                f.write_str(",\n ")?;
            }
            f.write_str("[")?;
            for (j, e) in self.row(i).iter().enumerate() {
                if j > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{e}")?;
            }
            f.write_str("]")?;
        }
        f.write_str("]")
    }
}
