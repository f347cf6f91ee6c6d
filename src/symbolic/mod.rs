//! Exact symbolic algebra used to derive and analyze schemes.
//!
//! Expressions are rational functions with exact rational coefficients in a set
//! of named symbols. That covers everything a scheme description needs:
//! polynomials in the velocity components, equilibria in the moments, symbolic
//! relaxation rates, and the derivative symbols of the consistency expansion.

mod expr;
mod matrix;
mod parser;
mod poly;

use std::fmt;
use std::sync::Arc;

pub use expr::Expr;
pub use matrix::SymMatrix;
pub use parser::{ParseError, is_symbol_name, parse_decimal, parse_expr};
pub use poly::{Monomial, Poly};

/// A named symbolic variable.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol(Arc<str>);

impl Symbol {
    pub fn new(name: impl AsRef<str>) -> Self {
        Symbol(Arc::from(name.as_ref()))
    }

    /// The `m[scheme][slot]` symbol naming a moment of an elementary scheme.
    pub fn moment(scheme: usize, slot: usize) -> Self {
        Symbol::new(format!("m[{scheme}][{slot}]"))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(name: &str) -> Self {
        Symbol::new(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_moment_symbol_roundtrip() {
        let s = Symbol::moment(2, 11);
        assert_eq!(s.name(), "m[2][11]");
        assert_eq!(s, Symbol::new("m[2][11]"));
        assert_ne!(s, Symbol::moment(21, 1));
    }
}
