use tracing::debug;

use super::encoding::{encode, Domain, EncodingMethod, Sizing};
use super::error::{Error, Result};
use super::model::VirtualModel;
use super::pbf::Pbf;
use super::source::{Constraint, ConstraintFunction, ConstraintSet, QuadExpr, Sense};

/// φ: rewrite a source-space expression over target binaries by substituting
/// every source variable with its expansion. Quadratic terms go through the
/// multilinear product, so x·x collapses correctly for any encoding.
pub fn expand_expr(expr: &QuadExpr, model: &VirtualModel) -> Result<Pbf> {
    let mut out = Pbf::constant(expr.constant);
    for &(v, c) in &expr.affine {
        let xi = model
            .expansion_of(v)
            .ok_or_else(|| Error::CompilationFailure(format!("variable {v} is not encoded")))?;
        out.add_scaled(xi, c);
    }
    for &(x, y, c) in &expr.quadratic {
        let xi = model
            .expansion_of(x)
            .ok_or_else(|| Error::CompilationFailure(format!("variable {x} is not encoded")))?;
        let xj = model
            .expansion_of(y)
            .ok_or_else(|| Error::CompilationFailure(format!("variable {y} is not encoded")))?;
        out.add_scaled(&(xi * xj), c);
    }
    Ok(out)
}

/// A constraint lowered to target space: the nonnegative violation function
/// g (zero exactly on feasible assignments) and the index of the slack
/// virtual variable when the lowering introduced one.
#[derive(Clone, Debug)]
pub struct TranslatedConstraint {
    pub violation: Pbf,
    pub slack: Option<usize>,
}

/// Lower one constraint into its violation function, allocating slack
/// variables in the model as needed.
pub fn translate_constraint(
    con: &Constraint,
    model: &mut VirtualModel,
    slack_encoding: &EncodingMethod,
) -> Result<TranslatedConstraint> {
    match (&con.function, con.set) {
        (ConstraintFunction::Scalar(expr), ConstraintSet::EqualTo(k)) => {
            let mut phi = expand_expr(expr, model)?;
            phi.add_term(Default::default(), -k);
            Ok(TranslatedConstraint { violation: phi.powi(2)?, slack: None })
        }
        (ConstraintFunction::Scalar(expr), ConstraintSet::LessEq(k)) => {
            let phi = expand_expr(expr, model)?;
            let lb = phi.lower_bound();
            if k < lb {
                return Err(Error::CompilationFailure(format!(
                    "constraint bound {k} is below the function's lower bound {lb}"
                )));
            }
            // φ − k + s = 0 for some s ∈ [0, k − lb]
            let (slack, s) = slack_variable(model, slack_encoding, k - lb)?;
            let mut residue = &phi + &s;
            residue.add_term(Default::default(), -k);
            Ok(TranslatedConstraint { violation: residue.powi(2)?, slack: Some(slack) })
        }
        (ConstraintFunction::Scalar(expr), ConstraintSet::GreaterEq(k)) => {
            let phi = expand_expr(expr, model)?;
            let ub = phi.upper_bound();
            if k > ub {
                return Err(Error::CompilationFailure(format!(
                    "constraint bound {k} is above the function's upper bound {ub}"
                )));
            }
            // φ − k − s = 0 for some s ∈ [0, ub − k]
            let (slack, s) = slack_variable(model, slack_encoding, ub - k)?;
            let mut residue = &phi - &s;
            residue.add_term(Default::default(), -k);
            Ok(TranslatedConstraint { violation: residue.powi(2)?, slack: Some(slack) })
        }
        (ConstraintFunction::VariableList(vars), ConstraintSet::Sos1) => {
            // Σ xᵢ + z = 1 with one auxiliary binary z absorbing the
            // all-zero case: zero exactly when at most one xᵢ is nonzero.
            let mut total = Pbf::constant(-1.0);
            for &v in vars {
                let xi = model.expansion_of(v).ok_or_else(|| {
                    Error::CompilationFailure(format!("variable {v} is not encoded"))
                })?;
                total.add_scaled(xi, 1.0);
            }
            let (slack, z) = slack_variable(model, &EncodingMethod::Mirror, 1.0)?;
            total += &z;
            Ok(TranslatedConstraint { violation: total.powi(2)?, slack: Some(slack) })
        }
        (function, set) => Err(Error::UnsupportedFeature(format!(
            "constraint pairing {function:?} in {set:?}"
        ))),
    }
}

/// Allocate a sourceless slack over the integer interval [0, bound] and
/// return its registry index and expansion.
fn slack_variable(
    model: &mut VirtualModel,
    encoding: &EncodingMethod,
    bound: f64,
) -> Result<(usize, Pbf)> {
    debug_assert!(bound >= 0.0);
    let domain = match encoding {
        EncodingMethod::Mirror => Domain::Binary,
        _ => Domain::Integer { lo: 0.0, hi: bound },
    };
    let vv = {
        let mut alloc = || model.new_target();
        encode(encoding, domain, None, Sizing::Derived, &mut alloc)?
    };
    debug!(targets = vv.targets.len(), "allocated slack variable");
    let expansion = vv.expansion.clone();
    let index = model.register(vv)?;
    Ok((index, expansion))
}

/// Default penalty magnitude ρ = σ·(1 + ⌈gap(f)⌉); the sign σ opposes the
/// objective direction so violations can never pay for themselves.
pub fn default_penalty(objective: &Pbf, sense: Sense) -> f64 {
    let w = 1.0 + objective.gap().ceil();
    match sense {
        Sense::Minimize => w,
        Sense::Maximize => -w,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::pbf::{term, Vi};
    use std::collections::HashMap;

    fn register_source(model: &mut VirtualModel, v: Vi, method: &EncodingMethod, domain: Domain) {
        let vv = {
            let mut alloc = || model.new_target();
            encode(method, domain, Some(v), Sizing::Derived, &mut alloc).unwrap()
        };
        model.register(vv).unwrap();
    }

    fn mirrored_model(n: u32) -> VirtualModel {
        let mut model = VirtualModel::new();
        for i in 0..n {
            register_source(&mut model, Vi(i), &EncodingMethod::Mirror, Domain::Binary);
        }
        model
    }

    fn bits(model: &VirtualModel, mask: u32) -> HashMap<Vi, bool> {
        (0..model.num_targets() as u32)
            .map(|i| (Vi(i), mask >> i & 1 == 1))
            .collect()
    }

    #[test]
    fn affine_terms_flow_through_expansions() {
        let mut model = VirtualModel::new();
        register_source(
            &mut model,
            Vi(0),
            &EncodingMethod::Unary,
            Domain::Integer { lo: 0.0, hi: 2.0 },
        );
        let mut expr = QuadExpr::constant(1.0);
        expr.add_linear(Vi(0), 2.0);
        let phi = expand_expr(&expr, &model).unwrap();

        // ξ = y₀ + y₁, so φ = 1 + 2y₀ + 2y₁
        assert_eq!(phi.constant_term(), 1.0);
        assert_eq!(phi.coefficient(&term([Vi(0)])), 2.0);
        assert_eq!(phi.coefficient(&term([Vi(1)])), 2.0);
    }

    #[test]
    fn quadratic_self_product_collapses_multilinearly() {
        let mut model = VirtualModel::new();
        register_source(
            &mut model,
            Vi(0),
            &EncodingMethod::Unary,
            Domain::Integer { lo: 0.0, hi: 2.0 },
        );
        let mut expr = QuadExpr::new();
        expr.add_quadratic(Vi(0), Vi(0), 1.0);
        let phi = expand_expr(&expr, &model).unwrap();

        // (y₀ + y₁)² = y₀ + y₁ + 2y₀y₁
        assert_eq!(phi.coefficient(&term([Vi(0)])), 1.0);
        assert_eq!(phi.coefficient(&term([Vi(1)])), 1.0);
        assert_eq!(phi.coefficient(&term([Vi(0), Vi(1)])), 2.0);
    }

    #[test]
    fn unencoded_variable_is_a_compile_failure() {
        let model = VirtualModel::new();
        let expr = QuadExpr::variable(Vi(0));
        assert!(matches!(
            expand_expr(&expr, &model),
            Err(Error::CompilationFailure(_))
        ));
    }

    #[test]
    fn equality_violation_vanishes_exactly_on_feasible_points() {
        let mut model = mirrored_model(2);
        let mut expr = QuadExpr::new();
        expr.add_linear(Vi(0), 1.0);
        expr.add_linear(Vi(1), 1.0);
        let con = Constraint {
            function: ConstraintFunction::Scalar(expr),
            set: ConstraintSet::EqualTo(1.0),
        };
        let t = translate_constraint(&con, &mut model, &EncodingMethod::Binary).unwrap();
        assert!(t.slack.is_none());

        for mask in 0..4u32 {
            let x = bits(&model, mask);
            let ones = mask.count_ones();
            let g = t.violation.evaluate(&x);
            assert!(g >= 0.0);
            assert_eq!(g == 0.0, ones == 1, "mask {mask:#b}");
        }
    }

    #[test]
    fn inequality_gets_an_integer_slack() {
        let mut model = mirrored_model(2);
        let mut expr = QuadExpr::new();
        expr.add_linear(Vi(0), 1.0);
        expr.add_linear(Vi(1), 1.0);
        let con = Constraint {
            function: ConstraintFunction::Scalar(expr),
            set: ConstraintSet::LessEq(1.0),
        };
        let t = translate_constraint(&con, &mut model, &EncodingMethod::Binary).unwrap();
        let slack = model.get(t.slack.unwrap()).unwrap();
        assert!(slack.is_auxiliary());
        assert_eq!(slack.targets.len(), 1); // [0, 1] fits one bit

        // min over slack bits of g is zero exactly on x₀ + x₁ ≤ 1
        for mask in 0..1u32 << model.num_targets() {
            let x = bits(&model, mask);
            let g = t.violation.evaluate(&x);
            assert!(g >= 0.0);
        }
        for xmask in 0..4u32 {
            let best = (0..2u32)
                .map(|s| t.violation.evaluate(&bits(&model, xmask | s << 2)))
                .fold(f64::INFINITY, f64::min);
            let feasible = xmask.count_ones() <= 1;
            assert_eq!(best == 0.0, feasible, "x mask {xmask:#b}");
        }
    }

    #[test]
    fn greater_eq_mirrors_less_eq() {
        let mut model = mirrored_model(2);
        let mut expr = QuadExpr::new();
        expr.add_linear(Vi(0), 1.0);
        expr.add_linear(Vi(1), 1.0);
        let con = Constraint {
            function: ConstraintFunction::Scalar(expr),
            set: ConstraintSet::GreaterEq(1.0),
        };
        let t = translate_constraint(&con, &mut model, &EncodingMethod::Binary).unwrap();
        assert!(t.slack.is_some());
        for xmask in 0..4u32 {
            let best = (0..2u32)
                .map(|s| t.violation.evaluate(&bits(&model, xmask | s << 2)))
                .fold(f64::INFINITY, f64::min);
            let feasible = xmask.count_ones() >= 1;
            assert_eq!(best == 0.0, feasible, "x mask {xmask:#b}");
        }
    }

    #[test]
    fn infeasible_bound_fails_at_translation() {
        let mut model = mirrored_model(1);
        let con = Constraint {
            function: ConstraintFunction::Scalar(QuadExpr::variable(Vi(0))),
            set: ConstraintSet::LessEq(-1.0),
        };
        assert!(matches!(
            translate_constraint(&con, &mut model, &EncodingMethod::Binary),
            Err(Error::CompilationFailure(_))
        ));
    }

    #[test]
    fn sos1_violation_allows_at_most_one_nonzero() {
        let mut model = mirrored_model(3);
        let con = Constraint {
            function: ConstraintFunction::VariableList(vec![Vi(0), Vi(1), Vi(2)]),
            set: ConstraintSet::Sos1,
        };
        let t = translate_constraint(&con, &mut model, &EncodingMethod::Binary).unwrap();
        assert_eq!(model.num_targets(), 4);

        for xmask in 0..8u32 {
            let best = (0..2u32)
                .map(|z| t.violation.evaluate(&bits(&model, xmask | z << 3)))
                .fold(f64::INFINITY, f64::min);
            let feasible = xmask.count_ones() <= 1;
            assert_eq!(best == 0.0, feasible, "x mask {xmask:#b}");
        }
    }

    #[test]
    fn default_penalty_opposes_the_objective() {
        let mut f = Pbf::constant(1.0);
        f.insert(term([Vi(0)]), -3.0);
        f.insert(term([Vi(1)]), 2.0);
        // gap = 5 → magnitude 6
        assert_eq!(default_penalty(&f, Sense::Minimize), 6.0);
        assert_eq!(default_penalty(&f, Sense::Maximize), -6.0);
        // empty objective → unit penalty
        assert_eq!(default_penalty(&Pbf::new(), Sense::Minimize), 1.0);
    }

    #[test]
    fn unsupported_pairing_is_reported() {
        let mut model = mirrored_model(1);
        let con = Constraint {
            function: ConstraintFunction::Scalar(QuadExpr::variable(Vi(0))),
            set: ConstraintSet::Sos1,
        };
        assert!(matches!(
            translate_constraint(&con, &mut model, &EncodingMethod::Binary),
            Err(Error::UnsupportedFeature(_))
        ));
    }
}
