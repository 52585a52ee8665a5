use std::collections::HashMap;
use std::time::Instant;

use tracing::{debug, info};

pub mod emit;
pub mod encoding;
pub mod error;
pub mod model;
pub mod pbf;
pub mod quadratize;
pub mod source;
pub mod translate;

use emit::QuboForm;
use encoding::{encode, Domain, EncodingMethod};
use error::{Error, Result};
use model::{Architecture, Attributes, QuadratizationMethod, Status, VirtualModel};
use pbf::Vi;
use source::{ConstraintFunction, ConstraintSet, QuadExpr, Sense, SourceModel};

/// The compiler facade: ingests a source model, and on `compile` encodes
/// every source variable, translates objective and constraints, assembles
/// and quadratizes the Hamiltonian, and emits the canonical quadratic form.
///
/// Single-writer: operations on one compiler must not run concurrently.
/// Distinct compilers are fully independent.
pub struct QuboCompiler {
    source: SourceModel,
    attributes: Attributes,
    model: VirtualModel,
    status: Status,
    status_detail: Option<String>,
    compilation_time: Option<f64>,
    output: Option<QuboForm>,
}

impl Default for QuboCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl QuboCompiler {
    pub fn new() -> Self {
        Self {
            source: SourceModel::new(),
            attributes: Attributes::default(),
            model: VirtualModel::new(),
            status: Status::NotStarted,
            status_detail: None,
            compilation_time: None,
            output: None,
        }
    }

    // --- ingest -----------------------------------------------------------

    pub fn add_variable(&mut self, domain: Domain) -> Vi {
        self.source.add_variable(domain)
    }

    pub fn set_objective(&mut self, sense: Sense, objective: QuadExpr) {
        self.source.set_objective(sense, objective);
    }

    pub fn add_constraint(
        &mut self,
        function: ConstraintFunction,
        set: ConstraintSet,
    ) -> Result<usize> {
        self.source.add_constraint(function, set)
    }

    pub fn source(&self) -> &SourceModel {
        &self.source
    }

    // --- attributes -------------------------------------------------------

    pub fn set_architecture(&mut self, arch: Architecture) {
        self.attributes.model.architecture = arch;
    }

    pub fn architecture(&self) -> Architecture {
        self.attributes.model.architecture
    }

    pub fn set_quadratize(&mut self, on: bool) {
        self.attributes.model.quadratize = on;
    }

    pub fn set_quadratization_method(&mut self, method: QuadratizationMethod) {
        self.attributes.model.quadratization_method = method;
    }

    pub fn set_stable_quadratization(&mut self, on: bool) {
        self.attributes.model.stable_quadratization = on;
    }

    pub fn set_default_encoding_method(&mut self, method: EncodingMethod) {
        self.attributes.model.default_encoding = method;
    }

    pub fn set_default_encoding_bits(&mut self, bits: Option<u32>) {
        self.attributes.model.default_encoding_bits = bits;
    }

    pub fn set_default_encoding_atol(&mut self, atol: f64) {
        self.attributes.model.default_encoding_atol = atol;
    }

    pub fn set_variable_encoding_method(&mut self, v: Vi, method: EncodingMethod) {
        self.attributes.variable(v).encoding = Some(method);
    }

    pub fn set_variable_encoding_bits(&mut self, v: Vi, bits: u32) {
        self.attributes.variable(v).bits = Some(bits);
    }

    pub fn set_variable_encoding_atol(&mut self, v: Vi, atol: f64) {
        self.attributes.variable(v).atol = Some(atol);
    }

    /// Override the computed θ for one source variable.
    pub fn set_variable_encoding_penalty(&mut self, v: Vi, weight: f64) {
        self.attributes.variable(v).penalty = Some(weight);
    }

    /// Override the computed ρ for one constraint.
    pub fn set_constraint_encoding_penalty(&mut self, constraint: usize, weight: f64) {
        self.attributes.constraint(constraint).penalty = Some(weight);
    }

    /// Override the computed η for one constraint's slack.
    pub fn set_slack_encoding_penalty(&mut self, constraint: usize, weight: f64) {
        self.attributes.constraint(constraint).slack_penalty = Some(weight);
    }

    // --- observation ------------------------------------------------------

    pub fn status(&self) -> Status {
        self.status
    }

    /// Raw reason string of the last failure, if any.
    pub fn status_detail(&self) -> Option<&str> {
        self.status_detail.as_deref()
    }

    /// Wall-clock seconds of the last `compile`.
    pub fn compilation_time(&self) -> Option<f64> {
        self.compilation_time
    }

    pub fn qubo(&self) -> Option<&QuboForm> {
        self.output.as_ref()
    }

    pub fn virtual_model(&self) -> &VirtualModel {
        &self.model
    }

    // --- lifecycle --------------------------------------------------------

    /// Drop all derived state (encodings, PBFs, the emitted form) and return
    /// to `NotStarted`. The ingested source model and attributes survive.
    /// Idempotent.
    pub fn reset(&mut self) {
        self.model = VirtualModel::new();
        self.status = Status::NotStarted;
        self.status_detail = None;
        self.compilation_time = None;
        self.output = None;
    }

    /// Run the full pipeline. On success the status is `LocallyCompiled` and
    /// `qubo()` holds the target model; on failure the status is `Failed`
    /// with the raw reason retained, no target model is emitted, and a
    /// `reset` is required before retrying.
    pub fn compile(&mut self) -> Result<()> {
        self.reset();
        self.status = Status::InProgress;
        let started = Instant::now();
        let result = self.compile_inner();
        self.compilation_time = Some(started.elapsed().as_secs_f64());
        match &result {
            Ok(()) => {
                self.status = Status::LocallyCompiled;
                info!(
                    targets = self.model.num_targets(),
                    seconds = self.compilation_time.unwrap_or_default(),
                    "compiled model"
                );
            }
            Err(e) => {
                self.status = Status::Failed;
                self.status_detail = Some(e.to_string());
                self.output = None;
            }
        }
        result
    }

    fn compile_inner(&mut self) -> Result<()> {
        // Encode every source variable in declaration order.
        let vars: Vec<Vi> = self.source.variables().to_vec();
        for v in vars {
            let domain = self.source.domain(v).ok_or_else(|| {
                Error::CompilationFailure(format!("variable {v} has no domain"))
            })?;
            let override_method = self
                .attributes
                .variables
                .get(&v)
                .and_then(|a| a.encoding.clone());
            // Binary sources pass through untouched unless the caller says
            // otherwise; everything else takes the per-variable or default
            // method.
            let method = match (override_method, domain) {
                (Some(m), _) => m,
                (None, Domain::Binary) => EncodingMethod::Mirror,
                (None, _) => self.attributes.model.default_encoding.clone(),
            };
            let sizing = self.attributes.sizing_for(v);
            let vv = {
                let model = &mut self.model;
                let mut alloc = || model.new_target();
                encode(&method, domain, Some(v), sizing, &mut alloc)?
            };
            self.model.register(vv)?;
        }
        debug!(
            sources = self.model.len(),
            targets = self.model.num_targets(),
            "encoded source variables"
        );

        // Translate the objective.
        self.model.objective = translate::expand_expr(&self.source.objective, &self.model)?;
        let sense = self.source.sense;

        // Translate constraints and fix their weights.
        let constraints = self.source.constraints().to_vec();
        for (index, con) in constraints.iter().enumerate() {
            let lowered = translate::translate_constraint(
                con,
                &mut self.model,
                &self.attributes.model.slack_encoding,
            )?;
            let rho = self
                .attributes
                .constraints
                .get(&index)
                .and_then(|a| a.penalty)
                .unwrap_or_else(|| translate::default_penalty(&self.model.objective, sense));
            self.model.constraints.push(lowered.violation);
            self.model.constraint_weights.push(rho);
            if let Some(slack) = lowered.slack {
                let eta = self
                    .attributes
                    .constraints
                    .get(&index)
                    .and_then(|a| a.slack_penalty)
                    .unwrap_or_else(|| translate::default_penalty(&self.model.objective, sense));
                self.model.slacks.push((index, slack, eta));
            }
        }
        debug!(constraints = self.model.constraints.len(), "translated constraints");

        // θ for every source encoding that carries a validity penalty.
        let thetas: HashMap<Vi, f64> = self
            .model
            .iter()
            .filter(|vv| vv.penalty.is_some())
            .filter_map(|vv| vv.source)
            .map(|src| {
                let theta = self
                    .attributes
                    .variables
                    .get(&src)
                    .and_then(|a| a.penalty)
                    .unwrap_or_else(|| translate::default_penalty(&self.model.objective, sense));
                (src, theta)
            })
            .collect();
        self.model.variable_weights = thetas;

        // Assemble H = f + Σ ρ·g + Σ θ·h + Σ η·s.
        let mut h = self.model.objective.clone();
        for (g, &rho) in self.model.constraints.iter().zip(&self.model.constraint_weights) {
            h.add_scaled(g, rho);
        }
        for vv in self.model.iter() {
            if let (Some(src), Some(hp)) = (vv.source, vv.penalty.as_ref()) {
                h.add_scaled(hp, self.model.variable_weights[&src]);
            }
        }
        for &(_, slack_index, eta) in &self.model.slacks {
            if let Some(hs) = self.model.get(slack_index).and_then(|vv| vv.penalty.as_ref()) {
                h.add_scaled(hs, eta);
            }
        }
        debug!(terms = h.len(), degree = h.degree(), "assembled hamiltonian");

        // Degree reduction assumes minimization; wrap it in negations when
        // maximizing so auxiliary couplings push the right way.
        if self.attributes.model.quadratize && h.degree() > 2 {
            if sense == Sense::Maximize {
                h.scale(-1.0);
            }
            h = match self.attributes.model.quadratization_method {
                QuadratizationMethod::PairReduction => {
                    let model = &mut self.model;
                    let mut alloc =
                        |n: usize| -> Vec<Vi> { (0..n).map(|_| model.new_mirror_aux()).collect() };
                    quadratize::quadratize(&h, &mut alloc)?
                }
            };
            if sense == Sense::Maximize {
                h.scale(-1.0);
            }
        }

        self.model.hamiltonian = h;
        self.output = Some(emit::emit(
            &self.model.hamiltonian,
            self.model.num_targets(),
            sense,
        )?);
        Ok(())
    }

    /// Map a target-space assignment back to source-variable values through
    /// the expansions.
    pub fn decode(&self, x: &[bool]) -> Result<HashMap<Vi, f64>> {
        if self.status != Status::LocallyCompiled {
            return Err(Error::CompilationFailure(
                "decode requires a locally-compiled model".into(),
            ));
        }
        if x.len() != self.model.num_targets() {
            return Err(Error::CompilationFailure(format!(
                "assignment has {} bits, model has {} targets",
                x.len(),
                self.model.num_targets()
            )));
        }
        let assignment: HashMap<Vi, bool> =
            x.iter().enumerate().map(|(i, &b)| (Vi(i as u32), b)).collect();
        Ok(self
            .model
            .iter()
            .filter_map(|vv| Some((vv.source?, vv.expansion.evaluate(&assignment))))
            .collect())
    }
}
