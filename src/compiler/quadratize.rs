use std::collections::BTreeMap;

use tracing::debug;

use super::error::Result;
use super::pbf::{term, Pbf, Term, Vi};

/// Rewrite every term of degree ≥ 3 into degree ≤ 2 by substituting variable
/// pairs with fresh auxiliary binaries.
///
/// Terms are visited in sorted order (the map keys are sorted, so allocation
/// order is reproducible). Within a term, an already-cached pair is reused
/// when one fits; otherwise the two smallest variables become a new pair.
/// The cache is shared across terms, so a pair substituted once serves every
/// term containing it.
///
/// Each substitution (u,v) → w is pinned by the Rosenberg coupling
/// μ·(uv − 2uw − 2vw + 3w), zero exactly when w = u·v and at least μ
/// otherwise; μ is sized past the total weight the rewritten terms could
/// gain from w ≠ u·v, walking the auxiliaries last-to-first so couplings of
/// later auxiliaries are dominated as well. Ground states therefore project
/// onto ground states of the input on the original variables.
///
/// `alloc` hands out fresh target indices; the caller registers them as
/// mirror virtual variables.
pub fn quadratize(h: &Pbf, alloc: &mut dyn FnMut(usize) -> Vec<Vi>) -> Result<Pbf> {
    if h.degree() <= 2 {
        return Ok(h.clone());
    }
    let mut out = Pbf::new();
    let mut cache: BTreeMap<(Vi, Vi), Vi> = BTreeMap::new();
    let mut introduced: Vec<((Vi, Vi), Vi)> = Vec::new();

    for (omega, c) in h.iter() {
        if omega.len() <= 2 {
            out.add_term(omega.clone(), c);
            continue;
        }
        let mut vars: Term = omega.clone();
        while vars.len() > 2 {
            let cached = cache
                .iter()
                .find(|((u, v), _)| vars.contains(u) && vars.contains(v))
                .map(|(&pair, &w)| (pair, w));
            let ((u, v), w) = match cached {
                Some(hit) => hit,
                None => {
                    let mut it = vars.iter().copied();
                    let pair = (it.next().unwrap(), it.next().unwrap());
                    let w = alloc(1)[0];
                    cache.insert(pair, w);
                    introduced.push((pair, w));
                    (pair, w)
                }
            };
            vars.remove(&u);
            vars.remove(&v);
            vars.insert(w);
        }
        out.add_term(vars, c);
    }

    for &((u, v), w) in introduced.iter().rev() {
        let mu = 1.0
            + out
                .iter()
                .filter(|(omega, _)| omega.contains(&w))
                .map(|(_, c)| c.abs())
                .sum::<f64>();
        out.add_term(term([u, v]), mu);
        out.add_term(term([u, w]), -2.0 * mu);
        out.add_term(term([v, w]), -2.0 * mu);
        out.add_term(term([w]), 3.0 * mu);
    }

    debug!(
        auxiliaries = introduced.len(),
        degree = out.degree(),
        terms = out.len(),
        "quadratized hamiltonian"
    );
    Ok(out)
}
