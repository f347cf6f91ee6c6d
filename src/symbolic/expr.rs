use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, ToPrimitive};

use super::parser::parse_decimal;
use super::poly::{Monomial, Poly, fmt_rational};
use super::Symbol;

/// Exact rational function `num / den`.
///
/// Every constructor normalizes: shared monomial factors are cancelled, an
/// exact polynomial quotient replaces the fraction when one exists, and the
/// denominator is made monic. Equality compares `a*d == b*c`, so it does not
/// depend on how far cancellation got.
#[derive(Debug, Clone)]
pub struct Expr {
    num: Poly,
    den: Poly,
}

impl Expr {
    pub fn zero() -> Self {
        Expr::from_poly(Poly::zero())
    }

    pub fn one() -> Self {
        Expr::from_poly(Poly::one())
    }

    pub fn integer(n: i64) -> Self {
        Expr::rational(BigRational::from_integer(BigInt::from(n)))
    }

    pub fn rational(r: BigRational) -> Self {
        Expr::from_poly(Poly::constant(r))
    }

    pub fn symbol(symbol: Symbol) -> Self {
        Expr::from_poly(Poly::var(symbol))
    }

    pub fn from_poly(p: Poly) -> Self {
        Expr {
            num: p,
            den: Poly::one(),
        }
    }

    /// Exact value of a float, read through its shortest decimal form so that
    /// `1.9` becomes `19/10`.
    pub fn from_f64(x: f64) -> Option<Self> {
        if !x.is_finite() {
            return None;
        }
        parse_decimal(&x.to_string()).map(Expr::rational)
    }

    fn from_parts(num: Poly, den: Poly) -> Self {
        debug_assert!(!den.is_zero());
        if num.is_zero() {
            return Expr::zero();
        }
        let common = num.monomial_content().gcd(&den.monomial_content());
        let (mut num, mut den) = if common.is_one() {
            (num, den)
        } else {
            (
                num.div_monomial(&common).unwrap_or_default(),
                den.div_monomial(&common).unwrap_or_default(),
            )
        };
        if !den.is_monomial() {
            if let Some(q) = num.exact_div(&den) {
                return Expr::from_poly(q);
            }
            if num.len() > 1 {
                if let Some(q) = den.exact_div(&num) {
                    num = Poly::one();
                    den = q;
                }
            }
        }
        let lc = den.leading().map(|(_, c)| c.clone()).unwrap_or_else(BigRational::one);
        if !lc.is_one() {
            let inv = lc.recip();
            num = num.scale(&inv);
            den = den.scale(&inv);
        }
        Expr { num, den }
    }

    pub fn numerator(&self) -> &Poly {
        &self.num
    }

    pub fn denominator(&self) -> &Poly {
        &self.den
    }

    pub fn is_zero(&self) -> bool {
        self.num.is_zero()
    }

    pub fn is_one(&self) -> bool {
        self.num == self.den
    }

    /// The value of an expression without symbols.
    pub fn as_rational(&self) -> Option<BigRational> {
        let n = self.num.as_constant()?;
        let d = self.den.as_constant()?;
        Some(n / d)
    }

    pub fn to_f64(&self) -> Option<f64> {
        let r = self.as_rational()?;
        let value = r.numer().to_f64()? / r.denom().to_f64()?;
        value.is_finite().then_some(value)
    }

    pub fn free_symbols(&self) -> BTreeSet<Symbol> {
        let mut s = self.num.symbols();
        s.extend(self.den.symbols());
        s
    }

    pub fn recip(&self) -> Option<Expr> {
        if self.is_zero() {
            return None;
        }
        Some(Expr::from_parts(self.den.clone(), self.num.clone()))
    }

    pub fn checked_div(&self, rhs: &Expr) -> Option<Expr> {
        Some(self * &rhs.recip()?)
    }

    /// Integer power; `None` for a negative power of zero or when an
    /// exponent would overflow.
    pub fn powi(&self, n: i32) -> Option<Expr> {
        let base = if n < 0 { self.recip()? } else { self.clone() };
        let e = n.unsigned_abs();
        Some(Expr::from_parts(base.num.checked_pow(e)?, base.den.checked_pow(e)?))
    }

    pub fn diff(&self, symbol: &Symbol) -> Expr {
        let dn = self.num.derivative(symbol);
        if self.den.is_one() {
            return Expr::from_poly(dn);
        }
        let dd = self.den.derivative(symbol);
        let num = &(&dn * &self.den) - &(&self.num * &dd);
        Expr::from_parts(num, &self.den * &self.den)
    }

    /// Substitute symbols. `None` when a denominator vanishes.
    pub fn subs(&self, values: &BTreeMap<Symbol, Expr>) -> Option<Expr> {
        if values.is_empty() {
            return Some(self.clone());
        }
        let num = eval_poly(&self.num, values);
        let den = eval_poly(&self.den, values);
        num.checked_div(&den)
    }

    /// Rename symbols; never fails since a symbol is never zero.
    pub fn rename(&self, names: &BTreeMap<Symbol, Symbol>) -> Expr {
        let values: BTreeMap<Symbol, Expr> = names
            .iter()
            .map(|(from, to)| (from.clone(), Expr::symbol(to.clone())))
            .collect();
        self.subs(&values).unwrap_or_else(|| self.clone())
    }

    /// Re-run cancellation from scratch.
    pub fn simplify(&self) -> Expr {
        Expr::from_parts(self.num.clone(), self.den.clone())
    }

    fn add_impl(&self, rhs: &Expr, negate: bool) -> Expr {
        let c = if negate { -&rhs.num } else { rhs.num.clone() };
        if self.den == rhs.den {
            return Expr::from_parts(&self.num + &c, self.den.clone());
        }
        if self.den.is_monomial() && rhs.den.is_monomial() {
            // monic monomial denominators
            let ma = self.den.leading().map(|(m, _)| m.clone()).unwrap_or_default();
            let mb = rhs.den.leading().map(|(m, _)| m.clone()).unwrap_or_default();
            let l = ma.lcm(&mb);
            let fa = l.div(&ma).unwrap_or_default();
            let fb = l.div(&mb).unwrap_or_default();
            let one = BigRational::one();
            let num = &self.num.mul_term(&fa, &one) + &c.mul_term(&fb, &one);
            return Expr::from_parts(num, Poly::term(l, one));
        }
        if let Some(q) = rhs.den.exact_div(&self.den) {
            return Expr::from_parts(&(&self.num * &q) + &c, rhs.den.clone());
        }
        if let Some(q) = self.den.exact_div(&rhs.den) {
            return Expr::from_parts(&self.num + &(&c * &q), self.den.clone());
        }
        let num = &(&self.num * &rhs.den) + &(&c * &self.den);
        Expr::from_parts(num, &self.den * &rhs.den)
    }
}

fn eval_poly(p: &Poly, values: &BTreeMap<Symbol, Expr>) -> Expr {
    let mut acc = Expr::zero();
    for (m, c) in p.terms() {
        let mut rest = Monomial::one();
        let mut factor = Expr::rational(c.clone());
        for (s, e) in m.factors() {
            match values.get(s) {
                // positive exponent, so never a negative power of zero
                Some(v) => factor = &factor * &v.powi(e as i32).unwrap_or_else(Expr::zero),
                None => rest = rest.mul(&Monomial::power(s.clone(), e)),
            }
        }
        let kept = Expr::from_poly(Poly::term(rest, BigRational::one()));
        acc = &acc + &(&factor * &kept);
    }
    acc
}

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        if self.den == other.den {
            return self.num == other.num;
        }
        &self.num * &other.den == &other.num * &self.den
    }
}

impl Default for Expr {
    fn default() -> Self {
        Expr::zero()
    }
}

impl From<i64> for Expr {
    fn from(n: i64) -> Self {
        Expr::integer(n)
    }
}

impl From<Symbol> for Expr {
    fn from(s: Symbol) -> Self {
        Expr::symbol(s)
    }
}

impl From<BigRational> for Expr {
    fn from(r: BigRational) -> Self {
        Expr::rational(r)
    }
}

impl Add for &Expr {
    type Output = Expr;

    fn add(self, rhs: &Expr) -> Expr {
        if self.is_zero() {
            return rhs.clone();
        }
        if rhs.is_zero() {
            return self.clone();
        }
        self.add_impl(rhs, false)
    }
}

impl Sub for &Expr {
    type Output = Expr;

    fn sub(self, rhs: &Expr) -> Expr {
        if rhs.is_zero() {
            return self.clone();
        }
        self.add_impl(rhs, true)
    }
}

impl Mul for &Expr {
    type Output = Expr;

    fn mul(self, rhs: &Expr) -> Expr {
        if self.is_zero() || rhs.is_zero() {
            return Expr::zero();
        }
        if self.den.is_one() && rhs.den.is_one() {
            return Expr::from_poly(&self.num * &rhs.num);
        }
        Expr::from_parts(&self.num * &rhs.num, &self.den * &rhs.den)
    }
}

impl Neg for &Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        Expr {
            num: -&self.num,
            den: self.den.clone(),
        }
    }
}

macro_rules! forward_owned_binop {
    ($imp:ident, $method:ident) => {
        impl $imp for Expr {
            type Output = Expr;

            fn $method(self, rhs: Expr) -> Expr {
                (&self).$method(&rhs)
            }
        }

        impl $imp<&Expr> for Expr {
            type Output = Expr;

            fn $method(self, rhs: &Expr) -> Expr {
                (&self).$method(rhs)
            }
        }

        impl $imp<Expr> for &Expr {
            type Output = Expr;

            fn $method(self, rhs: Expr) -> Expr {
                self.$method(&rhs)
            }
        }
    };
}

forward_owned_binop!(Add, add);
forward_owned_binop!(Sub, sub);
forward_owned_binop!(Mul, mul);

impl Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        -&self
    }
}

impl std::iter::Sum for Expr {
    fn sum<I: Iterator<Item = Expr>>(iter: I) -> Expr {
        iter.fold(Expr::zero(), |acc, e| &acc + &e)
    }
}

/// Expressions serialize as their printed form, which `parse_expr` reads back.
impl serde::Serialize for Expr {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

fn needs_parens(p: &Poly) -> bool {
    p.len() > 1
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den.is_one() {
            return write!(f, "{}", self.num);
        }
        if needs_parens(&self.num) {
            write!(f, "({})", self.num)?;
        } else {
            write!(f, "{}", self.num)?;
        }
        match self.den.leading() {
            Some((m, c)) if self.den.is_monomial() && c.is_one() && m.degree() == 1 => {
                write!(f, "/{m}")
            }
            Some((m, c)) if self.den.is_monomial() && m.is_one() => {
                f.write_str("/")?;
                fmt_rational(c, f)
            }
            _ => write!(f, "/({})", self.den),
        }
    }
}
