use std::collections::HashMap;

use super::encoding::{EncodingMethod, Sizing, VirtualVariable};
use super::error::{Error, Result};
use super::pbf::{Pbf, Vi};

/// Compilation state machine: NotStarted → InProgress → LocallyCompiled,
/// or Failed on any fatal error. Reset returns to NotStarted.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    NotStarted,
    InProgress,
    LocallyCompiled,
    Failed,
}

/// Architecture-specialized code paths. Only the generic target exists
/// here; the variant keeps the selection surface of the attribute table.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum Architecture {
    #[default]
    Generic,
}

/// Degree-reduction algorithm selector.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum QuadratizationMethod {
    /// Pairwise substitution with a shared auxiliary cache and Rosenberg
    /// couplings.
    #[default]
    PairReduction,
}

/// Model-wide attributes. Per-entity overrides live beside this record and
/// win over the defaults here.
#[derive(Clone, Debug)]
pub struct ModelAttributes {
    pub architecture: Architecture,
    pub quadratize: bool,
    pub quadratization_method: QuadratizationMethod,
    /// Deterministic term visiting and auxiliary allocation. Term storage is
    /// already sorted, so compilation is reproducible with or without this;
    /// the flag remains the contract callers rely on.
    pub stable_quadratization: bool,
    pub default_encoding: EncodingMethod,
    pub default_encoding_bits: Option<u32>,
    pub default_encoding_atol: f64,
    pub slack_encoding: EncodingMethod,
}

impl Default for ModelAttributes {
    fn default() -> Self {
        Self {
            architecture: Architecture::Generic,
            quadratize: true,
            quadratization_method: QuadratizationMethod::PairReduction,
            stable_quadratization: false,
            default_encoding: EncodingMethod::Binary,
            default_encoding_bits: None,
            default_encoding_atol: 0.25,
            slack_encoding: EncodingMethod::Binary,
        }
    }
}

/// Per-source-variable overrides.
#[derive(Clone, Debug, Default)]
pub struct VariableAttributes {
    pub encoding: Option<EncodingMethod>,
    pub bits: Option<u32>,
    pub atol: Option<f64>,
    /// Overrides the computed θ.
    pub penalty: Option<f64>,
}

/// Per-constraint overrides.
#[derive(Copy, Clone, Debug, Default)]
pub struct ConstraintAttributes {
    /// Overrides the computed ρ.
    pub penalty: Option<f64>,
    /// Overrides the computed η of the constraint's slack.
    pub slack_penalty: Option<f64>,
}

#[derive(Clone, Debug, Default)]
pub struct Attributes {
    pub model: ModelAttributes,
    pub variables: HashMap<Vi, VariableAttributes>,
    pub constraints: HashMap<usize, ConstraintAttributes>,
}

impl Attributes {
    pub fn variable(&mut self, v: Vi) -> &mut VariableAttributes {
        self.variables.entry(v).or_default()
    }

    pub fn constraint(&mut self, c: usize) -> &mut ConstraintAttributes {
        self.constraints.entry(c).or_default()
    }

    /// Encoding method for a source variable: override, else model default.
    pub fn encoding_for(&self, v: Vi) -> &EncodingMethod {
        self.variables
            .get(&v)
            .and_then(|a| a.encoding.as_ref())
            .unwrap_or(&self.model.default_encoding)
    }

    /// Bit budget / tolerance resolution: per-variable bits, per-variable
    /// tolerance, model bits, model tolerance, in that order.
    pub fn sizing_for(&self, v: Vi) -> Sizing {
        let attrs = self.variables.get(&v);
        if let Some(bits) = attrs.and_then(|a| a.bits) {
            return Sizing::Bits(bits);
        }
        if let Some(atol) = attrs.and_then(|a| a.atol) {
            return Sizing::Tolerance(atol);
        }
        if let Some(bits) = self.model.default_encoding_bits {
            return Sizing::Bits(bits);
        }
        Sizing::Tolerance(self.model.default_encoding_atol)
    }
}

/// Registry binding source variables to their encodings, plus the
/// per-component PBFs and weights the assembler combines. Targets are
/// allocated here in a deterministic monotone order; each target belongs
/// to exactly one virtual variable.
#[derive(Clone, Debug, Default)]
pub struct VirtualModel {
    entries: Vec<VirtualVariable>,
    by_source: HashMap<Vi, usize>,
    by_target: HashMap<Vi, usize>,
    next_target: u32,

    /// f: the translated objective.
    pub objective: Pbf,
    /// g_i: per-constraint violation functions.
    pub constraints: Vec<Pbf>,
    /// ρ_i.
    pub constraint_weights: Vec<f64>,
    /// θ per penalized source variable.
    pub variable_weights: HashMap<Vi, f64>,
    /// (constraint index, slack virtual-variable index, η).
    pub slacks: Vec<(usize, usize, f64)>,
    /// H: the assembled Hamiltonian.
    pub hamiltonian: Pbf,
}

impl VirtualModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_target(&mut self) -> Vi {
        let v = Vi(self.next_target);
        self.next_target += 1;
        v
    }

    pub fn alloc_targets(&mut self, n: usize) -> Vec<Vi> {
        (0..n).map(|_| self.new_target()).collect()
    }

    pub fn num_targets(&self) -> usize {
        self.next_target as usize
    }

    /// Append a virtual variable, wiring the source and target lookup maps.
    /// A source encoded twice or a target owned twice is a hard failure.
    pub fn register(&mut self, vv: VirtualVariable) -> Result<usize> {
        let index = self.entries.len();
        if let Some(src) = vv.source {
            if self.by_source.insert(src, index).is_some() {
                return Err(Error::CompilationFailure(format!(
                    "source variable {src} encoded twice"
                )));
            }
        }
        for &t in &vv.targets {
            if self.by_target.insert(t, index).is_some() {
                return Err(Error::CompilationFailure(format!(
                    "target variable {t} owned by two virtual variables"
                )));
            }
        }
        self.entries.push(vv);
        Ok(index)
    }

    /// Allocate a fresh sourceless mirror auxiliary and register it. The
    /// quadratizer draws its helper binaries from here; a fresh target can
    /// never collide, so this cannot fail.
    pub fn new_mirror_aux(&mut self) -> Vi {
        let y = self.new_target();
        let index = self.entries.len();
        self.by_target.insert(y, index);
        self.entries.push(VirtualVariable {
            method: EncodingMethod::Mirror,
            source: None,
            targets: vec![y],
            expansion: Pbf::variable(y),
            penalty: None,
        });
        y
    }

    pub fn lookup_source(&self, v: Vi) -> Option<&VirtualVariable> {
        self.by_source.get(&v).map(|&i| &self.entries[i])
    }

    pub fn lookup_target(&self, t: Vi) -> Option<&VirtualVariable> {
        self.by_target.get(&t).map(|&i| &self.entries[i])
    }

    /// ξ of the virtual variable owning the given source variable.
    pub fn expansion_of(&self, v: Vi) -> Option<&Pbf> {
        self.lookup_source(v).map(|vv| &vv.expansion)
    }

    pub fn get(&self, index: usize) -> Option<&VirtualVariable> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &VirtualVariable> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
