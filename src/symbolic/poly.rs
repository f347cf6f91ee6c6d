use std::cmp::Ordering;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed, Zero};

use super::Symbol;

/// Product of symbols raised to positive powers.
///
/// Factors are kept sorted by symbol with no zero exponents, so structural
/// equality is mathematical equality. The ordering is lexicographic with
/// alphabetically earlier symbols taking precedence, which is a monomial order
/// and lets [`Poly::exact_div`] run the division algorithm.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Monomial(Vec<(Symbol, u32)>);

impl Monomial {
    pub fn one() -> Self {
        Monomial(Vec::new())
    }

    pub fn var(symbol: Symbol) -> Self {
        Monomial(vec![(symbol, 1)])
    }

    pub fn is_one(&self) -> bool {
        self.0.is_empty()
    }

    pub fn degree(&self) -> u32 {
        self.0.iter().map(|(_, e)| e).sum()
    }

    pub fn max_exponent(&self) -> u32 {
        self.0.iter().map(|(_, e)| *e).max().unwrap_or(0)
    }

    pub fn factors(&self) -> impl Iterator<Item = (&Symbol, u32)> {
        self.0.iter().map(|(s, e)| (s, *e))
    }

    fn merge(&self, other: &Monomial, combine: impl Fn(u32, u32) -> Option<u32>) -> Option<Monomial> {
        let mut out = Vec::with_capacity(self.0.len().max(other.0.len()));
        let (mut a, mut b) = (self.0.iter().peekable(), other.0.iter().peekable());
        loop {
            let (symbol, ea, eb) = match (a.peek(), b.peek()) {
                (None, None) => break,
                (Some((s, e)), None) => {
                    let r = (s.clone(), *e, 0);
                    a.next();
                    r
                }
                (None, Some((s, e))) => {
                    let r = (s.clone(), 0, *e);
                    b.next();
                    r
                }
                (Some((sa, ea)), Some((sb, eb))) => match sa.cmp(sb) {
                    Ordering::Less => {
                        let r = (sa.clone(), *ea, 0);
                        a.next();
                        r
                    }
                    Ordering::Greater => {
                        let r = (sb.clone(), 0, *eb);
                        b.next();
                        r
                    }
                    Ordering::Equal => {
                        let r = (sa.clone(), *ea, *eb);
                        a.next();
                        b.next();
                        r
                    }
                },
            };
            let e = combine(ea, eb)?;
            if e > 0 {
                out.push((symbol, e));
            }
        }
        Some(Monomial(out))
    }

    /// Exponents are bounded well below `u32::MAX` by the parser and by
    /// [`Poly::checked_pow`], so the sum cannot overflow.
    pub fn mul(&self, other: &Monomial) -> Monomial {
        self.merge(other, |a, b| Some(a + b)).unwrap_or_default()
    }


    /// `self / other`, if `other` divides `self`.
    pub fn div(&self, other: &Monomial) -> Option<Monomial> {
        self.merge(other, |a, b| a.checked_sub(b))
    }

    pub fn gcd(&self, other: &Monomial) -> Monomial {
        self.merge(other, |a, b| Some(a.min(b))).unwrap_or_default()
    }

    pub fn lcm(&self, other: &Monomial) -> Monomial {
        self.merge(other, |a, b| Some(a.max(b))).unwrap_or_default()
    }

    /// `symbol^e`.
    pub fn power(symbol: Symbol, e: u32) -> Monomial {
        if e == 0 {
            return Monomial::one();
        }
        Monomial(vec![(symbol, e)])
    }

    /// Exponent of `symbol` and the monomial with that factor removed.
    pub fn split_off(&self, symbol: &Symbol) -> (u32, Monomial) {
        let mut rest = self.0.clone();
        match rest.binary_search_by(|(s, _)| s.cmp(symbol)) {
            Ok(i) => {
                let (_, e) = rest.remove(i);
                (e, Monomial(rest))
            }
            Err(_) => (0, Monomial(rest)),
        }
    }
}

impl Ord for Monomial {
    fn cmp(&self, other: &Self) -> Ordering {
        let (mut a, mut b) = (self.0.iter().peekable(), other.0.iter().peekable());
        loop {
            match (a.peek(), b.peek()) {
                (None, None) => return Ordering::Equal,
                (Some(_), None) => return Ordering::Greater,
                (None, Some(_)) => return Ordering::Less,
                (Some((sa, ea)), Some((sb, eb))) => match sa.cmp(sb) {
                    // the earlier symbol is missing from `other`
                    Ordering::Less => return Ordering::Greater,
                    Ordering::Greater => return Ordering::Less,
                    Ordering::Equal => match ea.cmp(eb) {
                        Ordering::Equal => {
                            a.next();
                            b.next();
                        }
                        ord => return ord,
                    },
                },
            }
        }
    }
}

impl PartialOrd for Monomial {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Monomial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_one() {
            return f.write_str("1");
        }
        for (i, (s, e)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("*")?;
            }
            if *e == 1 {
                write!(f, "{s}")?;
            } else {
                write!(f, "{s}^{e}")?;
            }
        }
        Ok(())
    }
}

/// Sparse multivariate polynomial with exact rational coefficients.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Poly {
    terms: BTreeMap<Monomial, BigRational>,
}

impl Poly {
    pub fn zero() -> Self {
        Poly::default()
    }

    pub fn one() -> Self {
        Poly::constant(BigRational::one())
    }

    pub fn constant(c: BigRational) -> Self {
        Poly::term(Monomial::one(), c)
    }

    pub fn var(symbol: Symbol) -> Self {
        Poly::term(Monomial::var(symbol), BigRational::one())
    }

    pub fn term(monomial: Monomial, coeff: BigRational) -> Self {
        let mut p = Poly::zero();
        p.add_term(monomial, coeff);
        p
    }

    pub fn is_zero(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn is_one(&self) -> bool {
        self.as_constant().is_some_and(|c| c.is_one())
    }

    /// The value of a polynomial without symbols.
    pub fn as_constant(&self) -> Option<BigRational> {
        match self.terms.len() {
            0 => Some(BigRational::zero()),
            1 => self
                .terms
                .iter()
                .next()
                .filter(|(m, _)| m.is_one())
                .map(|(_, c)| c.clone()),
            _ => None,
        }
    }

    pub fn is_monomial(&self) -> bool {
        self.terms.len() == 1
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Terms in decreasing monomial order.
    pub fn terms(&self) -> impl Iterator<Item = (&Monomial, &BigRational)> {
        self.terms.iter().rev()
    }

    pub fn leading(&self) -> Option<(&Monomial, &BigRational)> {
        self.terms.last_key_value()
    }

    pub fn add_term(&mut self, monomial: Monomial, coeff: BigRational) {
        if coeff.is_zero() {
            return;
        }
        match self.terms.entry(monomial) {
            Entry::Vacant(slot) => {
                slot.insert(coeff);
            }
            Entry::Occupied(mut slot) => {
                *slot.get_mut() += coeff;
                if slot.get().is_zero() {
                    slot.remove();
                }
            }
        }
    }

    pub fn scale(&self, c: &BigRational) -> Poly {
        if c.is_zero() {
            return Poly::zero();
        }
        Poly {
            terms: self.terms.iter().map(|(m, k)| (m.clone(), k * c)).collect(),
        }
    }

    pub fn mul_term(&self, monomial: &Monomial, c: &BigRational) -> Poly {
        if c.is_zero() {
            return Poly::zero();
        }
        Poly {
            terms: self
                .terms
                .iter()
                .map(|(m, k)| (m.mul(monomial), k * c))
                .collect(),
        }
    }

    /// `self^n`, or `None` when an exponent of the result overflows.
    pub fn checked_pow(&self, n: u32) -> Option<Poly> {
        self.max_exponent().checked_mul(n)?;
        Some(self.pow(n))
    }

    fn pow(&self, n: u32) -> Poly {
        let mut result = Poly::one();
        let mut base = self.clone();
        let mut n = n;
        while n > 0 {
            if n & 1 == 1 {
                result = &result * &base;
            }
            n >>= 1;
            if n > 0 {
                base = &base * &base;
            }
        }
        result
    }

    pub fn derivative(&self, symbol: &Symbol) -> Poly {
        let mut out = Poly::zero();
        for (m, c) in &self.terms {
            let (e, rest) = m.split_off(symbol);
            if e == 0 {
                continue;
            }
            let factor = if e == 1 {
                rest
            } else {
                rest.mul(&Monomial::power(symbol.clone(), e - 1))
            };
            out.add_term(factor, c * BigRational::from_integer(BigInt::from(e)));
        }
        out
    }

    /// Greatest monomial dividing every term.
    pub fn monomial_content(&self) -> Monomial {
        let mut it = self.terms.keys();
        let Some(first) = it.next() else {
            return Monomial::one();
        };
        it.fold(first.clone(), |g, m| if g.is_one() { g } else { g.gcd(m) })
    }

    pub fn div_monomial(&self, monomial: &Monomial) -> Option<Poly> {
        let mut terms = BTreeMap::new();
        for (m, c) in &self.terms {
            terms.insert(m.div(monomial)?, c.clone());
        }
        Some(Poly { terms })
    }

    /// Quotient of an exact division, or `None` when a remainder is left or the
    /// divisor is zero.
    pub fn exact_div(&self, divisor: &Poly) -> Option<Poly> {
        let (lm, lc) = divisor.leading()?;
        let (lm, lc) = (lm.clone(), lc.clone());
        let mut rem = self.clone();
        let mut quot = Poly::zero();
        while let Some((m, c)) = rem.leading() {
            let qm = m.div(&lm)?;
            let qc = c / &lc;
            rem = &rem - &divisor.mul_term(&qm, &qc);
            quot.add_term(qm, qc);
        }
        Some(quot)
    }

    pub fn symbols(&self) -> BTreeSet<Symbol> {
        self.terms
            .keys()
            .flat_map(|m| m.factors().map(|(s, _)| s.clone()))
            .collect()
    }

    /// Largest exponent of any symbol in any term.
    pub fn max_exponent(&self) -> u32 {
        self.terms.keys().map(Monomial::max_exponent).max().unwrap_or(0)
    }

    /// Bits needed by the largest numerator or denominator among the coefficients.
    pub fn coefficient_bits(&self) -> u64 {
        self.terms
            .values()
            .map(|c| c.numer().bits().max(c.denom().bits()))
            .max()
            .unwrap_or(0)
    }
}

impl Add for &Poly {
    type Output = Poly;

    fn add(self, rhs: &Poly) -> Poly {
        let mut out = self.clone();
        for (m, c) in &rhs.terms {
            out.add_term(m.clone(), c.clone());
        }
        out
    }
}

impl Sub for &Poly {
    type Output = Poly;

    fn sub(self, rhs: &Poly) -> Poly {
        let mut out = self.clone();
        for (m, c) in &rhs.terms {
            out.add_term(m.clone(), -c.clone());
        }
        out
    }
}

impl Mul for &Poly {
    type Output = Poly;

    fn mul(self, rhs: &Poly) -> Poly {
        let mut out = Poly::zero();
        for (ma, ca) in &self.terms {
            for (mb, cb) in &rhs.terms {
                out.add_term(ma.mul(mb), ca * cb);
            }
        }
        out
    }
}

impl Neg for &Poly {
    type Output = Poly;

    fn neg(self) -> Poly {
        Poly {
            terms: self.terms.iter().map(|(m, c)| (m.clone(), -c.clone())).collect(),
        }
    }
}

pub(crate) fn fmt_rational(c: &BigRational, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if c.is_integer() {
        write!(f, "{}", c.numer())
    } else {
        write!(f, "{}/{}", c.numer(), c.denom())
    }
}

impl fmt::Display for Poly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            return f.write_str("0");
        }
        for (i, (m, c)) in self.terms().enumerate() {
            let magnitude = c.abs();
            if i == 0 {
                if c.is_negative() {
                    f.write_str("-")?;
                }
            } else if c.is_negative() {
                f.write_str(" - ")?;
            } else {
                f.write_str(" + ")?;
            }
            if m.is_one() {
                fmt_rational(&magnitude, f)?;
            } else if magnitude.is_one() {
                write!(f, "{m}")?;
            } else {
                fmt_rational(&magnitude, f)?;
                write!(f, "*{m}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn int(n: i64) -> BigRational {
        BigRational::from_integer(BigInt::from(n))
    }

    fn x() -> Poly {
        Poly::var(Symbol::new("x"))
    }

    fn y() -> Poly {
        Poly::var(Symbol::new("y"))
    }

    #[test]
    fn test_lex_order_prefers_earlier_symbol() {
        let a = Monomial::var(Symbol::new("a"));
        let b2 = Monomial::power(Symbol::new("b"), 2);
        assert!(a > b2);
        assert!(b2 > Monomial::one());
        assert!(a.mul(&b2) > a);
    }

    #[test]
    fn test_checked_pow_overflow() {
        let big = Poly::term(Monomial::power(Symbol::new("x"), 70000), int(1));
        assert_eq!(big.max_exponent(), 70000);
        assert!(big.checked_pow(70000).is_none());
        assert_eq!(big.checked_pow(2).map(|p| p.max_exponent()), Some(140000));
        assert_eq!(Poly::constant(int(-12)).coefficient_bits(), 4);
    }

    #[test]
    fn test_monomial_division() {
        let xy2 = Monomial::var(Symbol::new("x")).mul(&Monomial::power(Symbol::new("y"), 2));
        let y = Monomial::var(Symbol::new("y"));
        assert_eq!(
            xy2.div(&y).map(|m| m.to_string()),
            Some("x*y".to_string())
        );
        assert_eq!(y.div(&xy2), None);
    }

    #[test]
    fn test_exact_division() {
        // (x^2 - y^2) / (x - y) = x + y
        let num = &x().checked_pow(2).unwrap() - &y().checked_pow(2).unwrap();
        let den = &x() - &y();
        assert_eq!(num.exact_div(&den), Some(&x() + &y()));
        // x^2 + 1 is not divisible by x - y
        let num = &x().checked_pow(2).unwrap() + &Poly::one();
        assert_eq!(num.exact_div(&den), None);
        assert_eq!(num.exact_div(&Poly::zero()), None);
    }

    #[test]
    fn test_derivative() {
        // d/dx (3 x^2 y + y) = 6 x y
        let p = &(&x().checked_pow(2).unwrap() * &y()).scale(&int(3)) + &y();
        let d = p.derivative(&Symbol::new("x"));
        assert_eq!(d, (&x() * &y()).scale(&int(6)));
        assert!(p.derivative(&Symbol::new("z")).is_zero());
    }

    #[test]
    fn test_display() {
        let p = &(&x().checked_pow(2).unwrap()).scale(&BigRational::new(BigInt::from(3), BigInt::from(8))) - &y();
        assert_eq!(p.to_string(), "3/8*x^2 - y");
        assert_eq!((-&Poly::one()).to_string(), "-1");
    }

    #[test]
    fn test_monomial_content() {
        let p = &(&x().checked_pow(2).unwrap() * &y()) + &(&x() * &y().checked_pow(3).unwrap());
        assert_eq!(p.monomial_content().to_string(), "x*y");
    }

    fn small_poly() -> impl Strategy<Value = Poly> {
        prop::collection::vec((-5i64..5, 0u32..3, 0u32..3), 0..4).prop_map(|terms| {
            let mut p = Poly::zero();
            for (c, ex, ey) in terms {
                let m = Monomial::power(Symbol::new("x"), ex)
                    .mul(&Monomial::power(Symbol::new("y"), ey));
                p.add_term(m, int(c));
            }
            p
        })
    }

    proptest! {
        #[test]
        fn prop_distributive(a in small_poly(), b in small_poly(), c in small_poly()) {
            prop_assert_eq!(&(&a + &b) * &c, &(&a * &c) + &(&b * &c));
        }

        #[test]
        fn prop_product_divides_back(a in small_poly(), b in small_poly()) {
            prop_assume!(!b.is_zero());
            prop_assert_eq!((&a * &b).exact_div(&b), Some(a));
        }
    }
}
