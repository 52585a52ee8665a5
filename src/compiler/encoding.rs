use super::error::{Error, Result};
use super::pbf::{term, Pbf, Vi};

/// Encoding strategy for one source variable. A tagged variant instead of
/// open dispatch: `encode` switches on the tag and every arm produces the
/// same `VirtualVariable` shape.
#[derive(Clone, Debug, PartialEq)]
pub enum EncodingMethod {
    /// One-to-one binary passthrough, used for binary sources and for
    /// sourceless auxiliaries (quadratization, slack bits).
    Mirror,
    /// Explicit ξ(y) = offset + Σ coeffs[i]·y_i.
    Linear { coeffs: Vec<f64>, offset: f64 },
    Unary,
    Binary,
    Arithmetic,
    OneHot,
    DomainWall,
}

/// How many target bits a real-bounded encoding gets. Integer domains
/// derive their width from the domain itself and ignore the sizing.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Sizing {
    /// No explicit budget; only valid for integer/binary domains.
    Derived,
    Bits(u32),
    Tolerance(f64),
}

/// Domain of a source variable, fixed before compilation.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Domain {
    Binary,
    Integer { lo: f64, hi: f64 },
    Real { lo: f64, hi: f64 },
}

/// One encoded variable: its strategy, optional source index (auxiliaries
/// have none), the ordered fresh targets, the expansion ξ over the targets,
/// and the validity penalty h when the encoding has invalid patterns.
#[derive(Clone, Debug)]
pub struct VirtualVariable {
    pub method: EncodingMethod,
    pub source: Option<Vi>,
    pub targets: Vec<Vi>,
    pub expansion: Pbf,
    pub penalty: Option<Pbf>,
}

impl VirtualVariable {
    pub fn is_auxiliary(&self) -> bool {
        self.source.is_none()
    }
}

/// Integer conventioning: α = ⌈min(a,b)⌉, β = ⌊max(a,b)⌋, M = β − α ≥ 0.
fn integer_bounds(lo: f64, hi: f64) -> Result<(i64, i64)> {
    let a = lo.min(hi).ceil();
    let b = lo.max(hi).floor();
    if b < a {
        return Err(Error::DomainError(format!(
            "integer domain [{lo}, {hi}] contains no integer"
        )));
    }
    Ok((a as i64, b as i64))
}

fn real_bounds(lo: f64, hi: f64) -> (f64, f64) {
    (lo.min(hi), lo.max(hi))
}

fn check_tolerance(tol: f64) -> Result<f64> {
    if tol <= 0.0 {
        return Err(Error::DomainError(format!(
            "encoding tolerance must be positive, got {tol}"
        )));
    }
    Ok(tol)
}

fn check_bits(bits: u32) -> Result<u32> {
    if bits == 0 {
        return Err(Error::DomainError("encoding bit budget must be nonzero".into()));
    }
    Ok(bits)
}

/// Closed-form bit counts for a desired absolute tolerance τ over [a, b].
pub fn bits_for_tolerance(method: &EncodingMethod, lo: f64, hi: f64, tol: f64) -> Result<u32> {
    let tol = check_tolerance(tol)?;
    let span = (hi - lo).abs();
    let n = match method {
        EncodingMethod::Unary => (1.0 + span / (4.0 * tol)).ceil(),
        EncodingMethod::Binary => (1.0 + span / (4.0 * tol)).log2().ceil(),
        EncodingMethod::Arithmetic => ((1.0 + (3.0 + span / (2.0 * tol)).sqrt()) / 2.0).ceil(),
        // level encodings: n levels with spacing ≤ 2τ
        EncodingMethod::OneHot => (1.0 + span / (2.0 * tol)).ceil(),
        EncodingMethod::DomainWall => (span / (2.0 * tol)).ceil(),
        EncodingMethod::Mirror | EncodingMethod::Linear { .. } => {
            return Err(Error::DomainError(
                "tolerance sizing does not apply to mirror/linear encodings".into(),
            ))
        }
    };
    Ok((n as u32).max(1))
}

fn resolve_real_bits(method: &EncodingMethod, lo: f64, hi: f64, sizing: Sizing) -> Result<u32> {
    match sizing {
        Sizing::Bits(n) => check_bits(n),
        Sizing::Tolerance(tol) => bits_for_tolerance(method, lo, hi, tol),
        Sizing::Derived => Err(Error::DomainError(
            "a real-bounded variable needs an explicit bit budget or tolerance".into(),
        )),
    }
}

/// Build the virtual variable for ξ(y) = offset + Σ coeffs[i]·y_i, allocating
/// one fresh target per coefficient. The workhorse behind every linear arm.
fn linear_vv(
    method: EncodingMethod,
    source: Option<Vi>,
    offset: f64,
    coeffs: &[f64],
    alloc: &mut dyn FnMut() -> Vi,
) -> VirtualVariable {
    let targets: Vec<Vi> = coeffs.iter().map(|_| alloc()).collect();
    let mut expansion = Pbf::constant(offset);
    for (&y, &g) in targets.iter().zip(coeffs) {
        expansion.add_term(term([y]), g);
    }
    VirtualVariable { method, source, targets, expansion, penalty: None }
}

/// One-hot over the given value list: ξ = Σ γ_i·y_i, h = (1 − Σ y_i)².
fn one_hot_vv(source: Option<Vi>, values: &[f64], alloc: &mut dyn FnMut() -> Vi) -> VirtualVariable {
    let targets: Vec<Vi> = values.iter().map(|_| alloc()).collect();
    let mut expansion = Pbf::new();
    let mut ones = Pbf::constant(1.0);
    for (&y, &v) in targets.iter().zip(values) {
        expansion.add_term(term([y]), v);
        ones.add_term(term([y]), -1.0);
    }
    let penalty = &ones * &ones;
    VirtualVariable {
        method: EncodingMethod::OneHot,
        source,
        targets,
        expansion,
        penalty: Some(penalty),
    }
}

/// Sequential (domain-wall) encoding over the given ascending level list:
/// n levels on n−1 bits, ξ = γ_1 + Σ (γ_{i+1} − γ_i)·y_i, and
/// h = 2·Σ_{i≥2} (y_i − y_i·y_{i−1}) forcing a monotone prefix of ones.
fn domain_wall_vv(
    source: Option<Vi>,
    levels: &[f64],
    alloc: &mut dyn FnMut() -> Vi,
) -> VirtualVariable {
    let targets: Vec<Vi> = (1..levels.len()).map(|_| alloc()).collect();
    let mut expansion = Pbf::constant(levels[0]);
    for (i, &y) in targets.iter().enumerate() {
        expansion.add_term(term([y]), levels[i + 1] - levels[i]);
    }
    let mut penalty = Pbf::new();
    for pair in targets.windows(2) {
        penalty.add_term(term([pair[1]]), 2.0);
        penalty.add_term(term([pair[0], pair[1]]), -2.0);
    }
    VirtualVariable {
        method: EncodingMethod::DomainWall,
        source,
        targets,
        expansion,
        penalty: (!penalty.is_zero()).then_some(penalty),
    }
}

fn constant_vv(method: EncodingMethod, source: Option<Vi>, value: f64) -> VirtualVariable {
    VirtualVariable {
        method,
        source,
        targets: Vec::new(),
        expansion: Pbf::constant(value),
        penalty: None,
    }
}

fn evenly_spaced(lo: f64, hi: f64, n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![lo];
    }
    let step = (hi - lo) / (n - 1) as f64;
    (0..n).map(|i| lo + step * i as f64).collect()
}

/// Binary (bounded-coefficient) ladder for an integer width M:
/// γ_i = 2^i below the top bit, γ_{N−1} = M − 2^{N−1} + 1, N = ⌈log₂(M+1)⌉.
fn binary_ladder(m: u64) -> Vec<f64> {
    let n = (64 - m.leading_zeros()) as usize; // ⌈log₂(M+1)⌉ for M ≥ 1
    let mut coeffs: Vec<f64> = (0..n - 1).map(|i| (1u64 << i) as f64).collect();
    coeffs.push((m - (1u64 << (n - 1)) + 1) as f64);
    coeffs
}

/// Arithmetic-progression ladder: γ_i = i for i < N, γ_N = M − N(N−1)/2,
/// N = ⌈(√(1+8M) − 1)/2⌉.
fn arithmetic_ladder(m: u64) -> Vec<f64> {
    let n = (((1.0 + 8.0 * m as f64).sqrt() - 1.0) / 2.0).ceil() as u64;
    let mut coeffs: Vec<f64> = (1..n).map(|i| i as f64).collect();
    coeffs.push((m - n * (n - 1) / 2) as f64);
    coeffs
}

/// Expand one source variable (or allocate an auxiliary when `source` is
/// absent) into fresh binary targets under the requested strategy.
pub fn encode(
    method: &EncodingMethod,
    domain: Domain,
    source: Option<Vi>,
    sizing: Sizing,
    alloc: &mut dyn FnMut() -> Vi,
) -> Result<VirtualVariable> {
    // A binary domain is the unit integer interval for every strategy but
    // mirror, which passes it through untouched.
    let domain = match (method, domain) {
        (EncodingMethod::Mirror, d) => d,
        (_, Domain::Binary) => Domain::Integer { lo: 0.0, hi: 1.0 },
        (_, d) => d,
    };

    match (method, domain) {
        (EncodingMethod::Mirror, _) => {
            let y = alloc();
            Ok(VirtualVariable {
                method: EncodingMethod::Mirror,
                source,
                targets: vec![y],
                expansion: Pbf::variable(y),
                penalty: None,
            })
        }
        (EncodingMethod::Linear { coeffs, offset }, _) => Ok(linear_vv(
            method.clone(),
            source,
            *offset,
            coeffs,
            alloc,
        )),
        (m, Domain::Integer { lo, hi }) => {
            let (a, b) = integer_bounds(lo, hi)?;
            let width = (b - a) as u64;
            if width == 0 {
                return Ok(constant_vv(m.clone(), source, a as f64));
            }
            match m {
                EncodingMethod::Unary => Ok(linear_vv(
                    m.clone(),
                    source,
                    a as f64,
                    &vec![1.0; width as usize],
                    alloc,
                )),
                EncodingMethod::Binary => {
                    Ok(linear_vv(m.clone(), source, a as f64, &binary_ladder(width), alloc))
                }
                EncodingMethod::Arithmetic => Ok(linear_vv(
                    m.clone(),
                    source,
                    a as f64,
                    &arithmetic_ladder(width),
                    alloc,
                )),
                EncodingMethod::OneHot => {
                    let values: Vec<f64> = (a..=b).map(|v| v as f64).collect();
                    Ok(one_hot_vv(source, &values, alloc))
                }
                EncodingMethod::DomainWall => {
                    let levels: Vec<f64> = (a..=b).map(|v| v as f64).collect();
                    Ok(domain_wall_vv(source, &levels, alloc))
                }
                EncodingMethod::Mirror | EncodingMethod::Linear { .. } => unreachable!(),
            }
        }
        (m, Domain::Real { lo, hi }) => {
            let (a, b) = real_bounds(lo, hi);
            if a == b {
                return Ok(constant_vv(m.clone(), source, a));
            }
            let n = resolve_real_bits(m, a, b, sizing)? as usize;
            match m {
                EncodingMethod::Unary => Ok(linear_vv(
                    m.clone(),
                    source,
                    a,
                    &vec![(b - a) / n as f64; n],
                    alloc,
                )),
                EncodingMethod::Binary => {
                    let scale = (b - a) / ((1u64 << n) - 1) as f64;
                    let coeffs: Vec<f64> =
                        (0..n).map(|i| scale * (1u64 << i) as f64).collect();
                    Ok(linear_vv(m.clone(), source, a, &coeffs, alloc))
                }
                EncodingMethod::Arithmetic => {
                    let total = (n * (n + 1) / 2) as f64;
                    let coeffs: Vec<f64> =
                        (1..=n).map(|i| (b - a) * i as f64 / total).collect();
                    Ok(linear_vv(m.clone(), source, a, &coeffs, alloc))
                }
                EncodingMethod::OneHot => {
                    Ok(one_hot_vv(source, &evenly_spaced(a, b, n.max(2)), alloc))
                }
                EncodingMethod::DomainWall => {
                    Ok(domain_wall_vv(source, &evenly_spaced(a, b, n + 1), alloc))
                }
                EncodingMethod::Mirror | EncodingMethod::Linear { .. } => unreachable!(),
            }
        }
        (_, Domain::Binary) => unreachable!(),
    }
}
