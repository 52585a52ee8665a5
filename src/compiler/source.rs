use std::collections::HashMap;

use super::encoding::Domain;
use super::error::{Error, Result};
use super::pbf::Vi;

/// Optimization direction of the source objective.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum Sense {
    #[default]
    Minimize,
    Maximize,
}

/// Scalar function over source variables:
/// Σ c·x_i·x_j + Σ c·x_i + constant, with every product listed once and
/// x_i·x_i collapsing to x_i on binary domains.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QuadExpr {
    pub quadratic: Vec<(Vi, Vi, f64)>,
    pub affine: Vec<(Vi, f64)>,
    pub constant: f64,
}

impl QuadExpr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn constant(c: f64) -> Self {
        Self { constant: c, ..Self::default() }
    }

    pub fn variable(v: Vi) -> Self {
        let mut e = Self::new();
        e.add_linear(v, 1.0);
        e
    }

    pub fn add_linear(&mut self, v: Vi, c: f64) -> &mut Self {
        self.affine.push((v, c));
        self
    }

    pub fn add_quadratic(&mut self, x: Vi, y: Vi, c: f64) -> &mut Self {
        self.quadratic.push((x, y, c));
        self
    }

    pub fn add_constant(&mut self, c: f64) -> &mut Self {
        self.constant += c;
        self
    }

    pub fn is_affine(&self) -> bool {
        self.quadratic.is_empty()
    }
}

/// Right-hand side of a constraint.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ConstraintSet {
    EqualTo(f64),
    LessEq(f64),
    GreaterEq(f64),
    /// At most one variable of the list may be nonzero.
    Sos1,
}

/// Left-hand side of a constraint.
#[derive(Clone, Debug, PartialEq)]
pub enum ConstraintFunction {
    Scalar(QuadExpr),
    VariableList(Vec<Vi>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Constraint {
    pub function: ConstraintFunction,
    pub set: ConstraintSet,
}

/// Whether the translator handles the function/set pairing. Never errors;
/// callers query this instead of attempting an unsupported constraint.
pub fn supports(function: &ConstraintFunction, set: &ConstraintSet) -> bool {
    matches!(
        (function, set),
        (
            ConstraintFunction::Scalar(_),
            ConstraintSet::EqualTo(_) | ConstraintSet::LessEq(_) | ConstraintSet::GreaterEq(_)
        ) | (ConstraintFunction::VariableList(_), ConstraintSet::Sos1)
    )
}

/// The ingested optimization model: variables with fully-determined domains,
/// constraints, and a sensed objective. Purely declarative; the compiler
/// reads it and never writes back.
#[derive(Clone, Debug, Default)]
pub struct SourceModel {
    variables: Vec<Vi>,
    domains: HashMap<Vi, Domain>,
    constraints: Vec<Constraint>,
    pub sense: Sense,
    pub objective: QuadExpr,
    next_var: u32,
}

impl SourceModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_variable(&mut self, domain: Domain) -> Vi {
        let v = Vi(self.next_var);
        self.next_var += 1;
        self.variables.push(v);
        self.domains.insert(v, domain);
        v
    }

    pub fn set_domain(&mut self, v: Vi, domain: Domain) -> Result<()> {
        if !self.domains.contains_key(&v) {
            return Err(Error::CompilationFailure(format!("unknown variable {v}")));
        }
        self.domains.insert(v, domain);
        Ok(())
    }

    pub fn domain(&self, v: Vi) -> Option<Domain> {
        self.domains.get(&v).copied()
    }

    pub fn variables(&self) -> &[Vi] {
        &self.variables
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Append a constraint, rejecting pairings the translator cannot handle.
    /// Returns the constraint index used by per-constraint attributes.
    pub fn add_constraint(
        &mut self,
        function: ConstraintFunction,
        set: ConstraintSet,
    ) -> Result<usize> {
        if !supports(&function, &set) {
            return Err(Error::UnsupportedFeature(format!(
                "constraint pairing {function:?} in {set:?}"
            )));
        }
        if let ConstraintFunction::VariableList(vars) = &function {
            if vars.is_empty() {
                return Err(Error::UnsupportedFeature("SOS1 over an empty list".into()));
            }
        }
        self.constraints.push(Constraint { function, set });
        Ok(self.constraints.len() - 1)
    }

    pub fn set_objective(&mut self, sense: Sense, objective: QuadExpr) {
        self.sense = sense;
        self.objective = objective;
    }
}
