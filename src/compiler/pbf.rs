use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Neg, Sub};

use itertools::Itertools;

use super::error::{Error, Result};

/// Index of a variable. Source-space and target-space indices live in
/// separate namespaces; equality is identity.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Vi(pub u32);

impl fmt::Display for Vi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.0)
    }
}

/// A term is a set of variables; the empty set is the constant term.
/// Multilinearity (x² = x over {0,1}) is what makes a set sufficient.
pub type Term = BTreeSet<Vi>;

pub fn term<I: IntoIterator<Item = Vi>>(vars: I) -> Term {
    vars.into_iter().collect()
}

/// Multilinear pseudo-Boolean function: a finite map from terms to nonzero
/// coefficients, f(x) = Σ_ω c_ω · Π_{j∈ω} x_j with x_j ∈ {0,1}.
///
/// Invariants: no stored coefficient is zero, and the sorted-key map gives
/// deterministic iteration (terms ordered lexicographically), which the
/// stable quadratization path depends on.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Pbf {
    terms: BTreeMap<Term, f64>,
}

impl Pbf {
    pub fn new() -> Self {
        Self { terms: BTreeMap::new() }
    }

    pub fn constant(c: f64) -> Self {
        let mut f = Self::new();
        f.insert(Term::new(), c);
        f
    }

    /// The function x_v.
    pub fn variable(v: Vi) -> Self {
        let mut f = Self::new();
        f.insert(term([v]), 1.0);
        f
    }

    /// Set the coefficient of `ω` to `c`; a zero coefficient deletes the term.
    pub fn insert(&mut self, omega: Term, c: f64) {
        if c == 0.0 {
            self.terms.remove(&omega);
        } else {
            self.terms.insert(omega, c);
        }
    }

    /// Add `c` to the coefficient of `ω`, deleting the term if it cancels.
    pub fn add_term(&mut self, omega: Term, c: f64) {
        use std::collections::btree_map::Entry;
        match self.terms.entry(omega) {
            Entry::Vacant(e) => {
                if c != 0.0 {
                    e.insert(c);
                }
            }
            Entry::Occupied(mut e) => {
                *e.get_mut() += c;
                if *e.get() == 0.0 {
                    e.remove();
                }
            }
        }
    }

    pub fn coefficient(&self, omega: &Term) -> f64 {
        self.terms.get(omega).copied().unwrap_or(0.0)
    }

    pub fn constant_term(&self) -> f64 {
        self.terms.get(&Term::new()).copied().unwrap_or(0.0)
    }

    pub fn remove(&mut self, omega: &Term) -> f64 {
        self.terms.remove(omega).unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// The constant zero has empty support.
    pub fn is_zero(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Term, f64)> {
        self.terms.iter().map(|(w, c)| (w, *c))
    }

    /// Variables appearing in the support.
    pub fn variables(&self) -> BTreeSet<Vi> {
        self.terms.keys().flatten().copied().collect()
    }

    /// Largest term size; the constant zero has degree 0.
    pub fn degree(&self) -> usize {
        self.terms.keys().map(|w| w.len()).max().unwrap_or(0)
    }

    /// In-place f += w·g. The assembler leans on this to avoid cloning
    /// penalty polynomials.
    pub fn add_scaled(&mut self, g: &Pbf, w: f64) {
        if w == 0.0 {
            return;
        }
        for (omega, c) in &g.terms {
            self.add_term(omega.clone(), w * c);
        }
    }

    /// Multiply every coefficient by `k`.
    pub fn scale(&mut self, k: f64) {
        if k == 0.0 {
            self.terms.clear();
            return;
        }
        for c in self.terms.values_mut() {
            *c *= k;
        }
    }

    /// Divide every coefficient by `k`; k = 0 is an arithmetic failure.
    pub fn checked_div(&self, k: f64) -> Result<Pbf> {
        if k == 0.0 {
            return Err(Error::ArithmeticFailure(
                "division of a pseudo-Boolean function by zero".into(),
            ));
        }
        let mut out = self.clone();
        out.scale(1.0 / k);
        Ok(out)
    }

    /// f^n by fast exponentiation with the multilinear product; n < 0 fails.
    pub fn powi(&self, n: i32) -> Result<Pbf> {
        if n < 0 {
            return Err(Error::ArithmeticFailure(format!(
                "negative exponent {n} on a pseudo-Boolean function"
            )));
        }
        let mut acc = Pbf::constant(1.0);
        let mut base = self.clone();
        let mut n = n as u32;
        while n > 0 {
            if n & 1 == 1 {
                acc = &acc * &base;
            }
            n >>= 1;
            if n > 0 {
                base = &base * &base;
            }
        }
        Ok(acc)
    }

    /// Partial evaluation: fix the given variables and return the residual
    /// function. Terms containing a variable fixed to 0 vanish; variables
    /// fixed to 1 drop out of their terms.
    pub fn substitute(&self, assignment: &HashMap<Vi, bool>) -> Pbf {
        let mut out = Pbf::new();
        'term: for (omega, c) in &self.terms {
            let mut residual = Term::new();
            for &v in omega {
                match assignment.get(&v) {
                    Some(false) => continue 'term,
                    Some(true) => {}
                    None => {
                        residual.insert(v);
                    }
                }
            }
            out.add_term(residual, *c);
        }
        out
    }

    /// Full evaluation: Σ { c_ω : ω ⊆ {j : x_j = 1} }. Variables absent from
    /// the assignment count as 0.
    pub fn evaluate(&self, assignment: &HashMap<Vi, bool>) -> f64 {
        self.terms
            .iter()
            .filter(|(omega, _)| omega.iter().all(|v| assignment.get(v).copied().unwrap_or(false)))
            .map(|(_, c)| c)
            .sum()
    }

    /// The scalar value of a constant function; errors on nonempty support.
    pub fn as_constant(&self) -> Result<f64> {
        if self.degree() > 0 {
            return Err(Error::ArithmeticFailure(
                "expected a constant pseudo-Boolean function".into(),
            ));
        }
        Ok(self.constant_term())
    }

    /// Sum of negative coefficients plus the constant. Loose, cheap, and
    /// exactly what penalty sizing wants.
    pub fn lower_bound(&self) -> f64 {
        self.terms
            .iter()
            .map(|(w, c)| if w.is_empty() { *c } else { c.min(0.0) })
            .sum()
    }

    /// Sum of positive coefficients plus the constant.
    pub fn upper_bound(&self) -> f64 {
        self.terms
            .iter()
            .map(|(w, c)| if w.is_empty() { *c } else { c.max(0.0) })
            .sum()
    }

    pub fn gap(&self) -> f64 {
        self.upper_bound() - self.lower_bound()
    }

    /// Rescale so every coefficient is within `tol` of an integer, then
    /// round. Already-integral functions come back unchanged with factor 1;
    /// otherwise coefficients are divided by their tolerance-relaxed gcd.
    /// Returns the rounded function and the factor λ with self ≈ λ·rounded.
    pub fn discretize(&self, tol: f64) -> Result<(Pbf, f64)> {
        if tol <= 0.0 {
            return Err(Error::DomainError(format!(
                "discretization tolerance must be positive, got {tol}"
            )));
        }
        if self.terms.is_empty() {
            return Ok((self.clone(), 1.0));
        }
        let integral = self.terms.values().all(|c| (c - c.round()).abs() <= tol);
        let factor = if integral {
            1.0
        } else {
            self.terms
                .values()
                .fold(0.0, |g, &c| relaxed_gcd(g, c.abs(), tol))
        };
        let mut out = Pbf::new();
        for (omega, c) in &self.terms {
            out.insert(omega.clone(), (c / factor).round());
        }
        Ok((out, factor))
    }

    /// Coefficient-wise approximate comparison.
    pub fn approx_eq(&self, other: &Pbf, atol: f64) -> bool {
        let keys: BTreeSet<&Term> = self.terms.keys().chain(other.terms.keys()).collect();
        keys.into_iter()
            .all(|w| (self.coefficient(w) - other.coefficient(w)).abs() <= atol)
    }
}

fn relaxed_gcd(a: f64, b: f64, tol: f64) -> f64 {
    let (mut a, mut b) = (a.max(b), a.min(b));
    while b > tol {
        let r = a % b;
        a = b;
        b = r;
    }
    a
}

impl fmt::Display for Pbf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.terms.is_empty() {
            return write!(f, "0");
        }
        let rendered = self
            .terms
            .iter()
            .map(|(omega, c)| {
                if omega.is_empty() {
                    format!("{c}")
                } else {
                    format!("{c}·{}", omega.iter().map(|v| v.to_string()).join("·"))
                }
            })
            .join(" + ");
        write!(f, "{rendered}")
    }
}

impl Add for &Pbf {
    type Output = Pbf;

    fn add(self, rhs: &Pbf) -> Pbf {
        let mut out = self.clone();
        out.add_scaled(rhs, 1.0);
        out
    }
}

impl AddAssign<&Pbf> for Pbf {
    fn add_assign(&mut self, rhs: &Pbf) {
        self.add_scaled(rhs, 1.0);
    }
}

impl Sub for &Pbf {
    type Output = Pbf;

    fn sub(self, rhs: &Pbf) -> Pbf {
        let mut out = self.clone();
        out.add_scaled(rhs, -1.0);
        out
    }
}

impl Neg for &Pbf {
    type Output = Pbf;

    fn neg(self) -> Pbf {
        let mut out = self.clone();
        out.scale(-1.0);
        out
    }
}

/// Multilinear product: coefficients multiply, term sets take their union.
impl Mul for &Pbf {
    type Output = Pbf;

    fn mul(self, rhs: &Pbf) -> Pbf {
        let mut out = Pbf::new();
        for (wi, ci) in &self.terms {
            for (wj, cj) in &rhs.terms {
                let union: Term = wi.union(wj).copied().collect();
                out.add_term(union, ci * cj);
            }
        }
        out
    }
}

impl Mul<f64> for &Pbf {
    type Output = Pbf;

    fn mul(self, k: f64) -> Pbf {
        let mut out = self.clone();
        out.scale(k);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x(i: u32) -> Vi {
        Vi(i)
    }

    // p = 0.5 + x − 2xy, q = 0.5 + y + 2xy
    fn sample_pair() -> (Pbf, Pbf) {
        let mut p = Pbf::constant(0.5);
        p.insert(term([x(0)]), 1.0);
        p.insert(term([x(0), x(1)]), -2.0);
        let mut q = Pbf::constant(0.5);
        q.insert(term([x(1)]), 1.0);
        q.insert(term([x(0), x(1)]), 2.0);
        (p, q)
    }

    #[test]
    fn sum_difference_product_quotient() {
        let (p, q) = sample_pair();

        // p + q = 1 + x + y
        let mut expected = Pbf::constant(1.0);
        expected.insert(term([x(0)]), 1.0);
        expected.insert(term([x(1)]), 1.0);
        assert_eq!(&p + &q, expected);

        // p − q = x − y − 4xy
        let mut expected = Pbf::new();
        expected.insert(term([x(0)]), 1.0);
        expected.insert(term([x(1)]), -1.0);
        expected.insert(term([x(0), x(1)]), -4.0);
        assert_eq!(&p - &q, expected);

        // p·q = 0.25 + 0.5x + 0.5y − 3xy
        let mut expected = Pbf::constant(0.25);
        expected.insert(term([x(0)]), 0.5);
        expected.insert(term([x(1)]), 0.5);
        expected.insert(term([x(0), x(1)]), -3.0);
        assert!((&p * &q).approx_eq(&expected, 1e-12));

        // p / 2 = 0.25 + 0.5x − xy
        let mut expected = Pbf::constant(0.25);
        expected.insert(term([x(0)]), 0.5);
        expected.insert(term([x(0), x(1)]), -1.0);
        assert_eq!(p.checked_div(2.0).unwrap(), expected);

        assert!(p.checked_div(0.0).is_err());
    }

    #[test]
    fn ring_laws() {
        let (p, q) = sample_pair();
        let mut r = Pbf::constant(-1.5);
        r.insert(term([x(2)]), 3.0);

        assert_eq!(&p + &q, &q + &p);
        assert!((&p * &q).approx_eq(&(&q * &p), 1e-12));
        assert_eq!(&(&p + &q) + &r, &p + &(&q + &r));
        let lhs = &p * &(&q + &r);
        let rhs = &(&p * &q) + &(&p * &r);
        assert!(lhs.approx_eq(&rhs, 1e-12));
    }

    #[test]
    fn multilinear_idempotence() {
        let (p, _) = sample_pair();
        let xv = Pbf::variable(x(0));
        // (f·x)·x ≡ f·x
        let fx = &p * &xv;
        assert!((&fx * &xv).approx_eq(&fx, 1e-12));
    }

    #[test]
    fn additive_and_multiplicative_identities() {
        let (p, _) = sample_pair();
        assert!((&p - &p).is_zero());
        assert!((&p * &Pbf::new()).is_zero());
        assert_eq!(p.powi(0).unwrap(), Pbf::constant(1.0));
        assert!(p.powi(-1).is_err());
    }

    #[test]
    fn powers_match_repeated_products() {
        let (p, _) = sample_pair();
        let cubed = p.powi(3).unwrap();
        let manual = &(&p * &p) * &p;
        assert!(cubed.approx_eq(&manual, 1e-12));
    }

    #[test]
    fn zero_coefficients_never_stored() {
        let mut f = Pbf::new();
        f.insert(term([x(0)]), 0.0);
        assert!(f.is_zero());
        f.add_term(term([x(0)]), 2.0);
        f.add_term(term([x(0)]), -2.0);
        assert!(f.is_zero());
        assert_eq!(f.degree(), 0);
    }

    #[test]
    fn substitute_and_evaluate() {
        let (p, _) = sample_pair();

        // fix x = 1: residual 1.5 − 2y
        let fixed: HashMap<Vi, bool> = [(x(0), true)].into();
        let residual = p.substitute(&fixed);
        let mut expected = Pbf::constant(1.5);
        expected.insert(term([x(1)]), -2.0);
        assert_eq!(residual, expected);

        // fix x = 0: terms containing x vanish
        let fixed: HashMap<Vi, bool> = [(x(0), false)].into();
        assert_eq!(p.substitute(&fixed), Pbf::constant(0.5));

        // full evaluation against the set definition
        for (xv, yv) in [(false, false), (false, true), (true, false), (true, true)] {
            let full: HashMap<Vi, bool> = [(x(0), xv), (x(1), yv)].into();
            let direct =
                0.5 + (xv as u8 as f64) - 2.0 * (xv as u8 as f64) * (yv as u8 as f64);
            assert!((p.evaluate(&full) - direct).abs() < 1e-12);
        }
    }

    #[test]
    fn as_constant_rejects_nonconstant() {
        let (p, _) = sample_pair();
        assert!(p.as_constant().is_err());
        assert_eq!(Pbf::constant(4.5).as_constant().unwrap(), 4.5);
        assert_eq!(Pbf::new().as_constant().unwrap(), 0.0);
    }

    #[test]
    fn loose_bounds() {
        let mut f = Pbf::constant(1.0);
        f.insert(term([x(0)]), -3.0);
        f.insert(term([x(1)]), 2.0);
        f.insert(term([x(0), x(1)]), 4.0);
        assert_eq!(f.lower_bound(), -2.0);
        assert_eq!(f.upper_bound(), 7.0);
        assert_eq!(f.gap(), 9.0);
    }

    #[test]
    fn discretize_round_trips_integral_functions() {
        let mut f = Pbf::constant(3.0);
        f.insert(term([x(0)]), -2.0);
        f.insert(term([x(0), x(1)]), 7.0);
        let (g, factor) = f.discretize(1e-6).unwrap();
        assert_eq!(g, f);
        assert_eq!(factor, 1.0);
    }

    #[test]
    fn discretize_scales_fractional_functions() {
        let mut f = Pbf::constant(0.5);
        f.insert(term([x(0)]), 1.5);
        f.insert(term([x(1)]), -2.5);
        let (g, factor) = f.discretize(1e-6).unwrap();
        assert!((factor - 0.5).abs() < 1e-9);
        assert_eq!(g.constant_term(), 1.0);
        assert_eq!(g.coefficient(&term([x(0)])), 3.0);
        assert_eq!(g.coefficient(&term([x(1)])), -5.0);

        assert!(f.discretize(0.0).is_err());
        assert!(f.discretize(-1.0).is_err());
    }

    #[test]
    fn display_is_readable() {
        let (p, _) = sample_pair();
        let s = p.to_string();
        assert!(s.contains("x0"));
        assert_eq!(Pbf::new().to_string(), "0");
    }
}
