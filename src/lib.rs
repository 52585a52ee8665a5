//! Compile mixed-variable optimization models into Quadratic Unconstrained
//! Binary Optimization (QUBO) problems.
//!
//! The pipeline encodes every bounded integer/real source variable into
//! binary targets, translates the objective and constraints into
//! pseudo-Boolean penalty functions, assembles a single Hamiltonian,
//! reduces it to degree ≤ 2 with auxiliary binaries, and emits a canonical
//! quadratic form together with a back-mapping from binary solutions to
//! source-variable values.
//!
//! ```
//! use miniqubo::{ConstraintFunction, ConstraintSet, Domain, QuadExpr, QuboCompiler};
//!
//! let mut compiler = QuboCompiler::new();
//! let p = compiler.add_variable(Domain::Integer { lo: 2.0, hi: 4.0 });
//! let q = compiler.add_variable(Domain::Integer { lo: 4.0, hi: 8.0 });
//! let mut product = QuadExpr::new();
//! product.add_quadratic(p, q, 1.0);
//! compiler
//!     .add_constraint(ConstraintFunction::Scalar(product), ConstraintSet::EqualTo(15.0))
//!     .unwrap();
//! compiler.compile().unwrap();
//! let qubo = compiler.qubo().unwrap();
//! assert!(qubo.num_variables() >= 5);
//! ```

pub mod compiler;

pub use compiler::emit::QuboForm;
pub use compiler::encoding::{Domain, EncodingMethod, Sizing, VirtualVariable};
pub use compiler::error::Error;
pub use compiler::model::{Architecture, QuadratizationMethod, Status, VirtualModel};
pub use compiler::pbf::{term, Pbf, Term, Vi};
pub use compiler::source::{
    supports, Constraint, ConstraintFunction, ConstraintSet, QuadExpr, Sense, SourceModel,
};
pub use compiler::QuboCompiler;
