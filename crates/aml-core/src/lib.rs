//! AML Core - front end for the ArduinoML chained-declaration language
//!
//! Turns a textual description of a reactive controller (bricks wired to
//! pins, states with entry actions, guarded transitions) into a validated,
//! fully linked application model ready for code generation.
//!
//! # Architecture
//!
//! ```text
//! AML Text → Tokenizer → Parser → ParseNode tree
//!                                     ↓
//!                                 Validator → ValidationReport (all errors + warnings)
//!                                     ↓ (valid only)
//!                                  Builder → Application (fail-fast, linked states)
//!
//!                               Normalizer → canonical text + SHA-256
//! ```
//!
//! # Guarantees
//!
//! - **Deterministic**: same input always produces an equal tree, report and model
//! - **Order-preserving**: bricks, states and diagnostics follow declaration order
//! - **Linked**: every transition of a built application targets one of its states

pub mod builder;
pub mod error;
pub mod expression;
pub mod model;
pub mod normalizer;
pub mod parser;
pub mod validator;

pub use error::{Error, Result};
pub use expression::{LogicalExpression, ReadIdiom};
pub use model::{Action, Application, Brick, BrickKind, Signal, State, StateId, Transition};
pub use parser::ast::{NodeKind, ParseNode};
pub use validator::{Diagnostic, DiagnosticKind, Severity, ValidationReport};

/// Output of the full front-end pipeline
#[derive(Debug, Clone)]
pub struct Compilation {
    pub tree: ParseNode,
    pub report: ValidationReport,
    /// Present only when the report has no errors
    pub application: Option<Application>,
}

impl Compilation {
    pub fn is_valid(&self) -> bool {
        self.report.is_valid()
    }
}

/// Parse, validate and, if the program is valid, build it
///
/// # Errors
/// `LexError` / `SyntaxError` from parsing. A program with semantic errors
/// is not an `Err`: it comes back with `application: None` and the report
/// listing every problem. Link errors only surface here if the validator
/// and builder disagree.
pub fn compile(source: &str) -> Result<Compilation> {
    let tree = parser::parse(source)?;
    let report = validator::validate(&tree);

    let application = if report.is_valid() {
        Some(builder::build(&tree)?)
    } else {
        tracing::debug!(
            errors = report.errors().len(),
            "validation failed, skipping build"
        );
        None
    };

    Ok(Compilation {
        tree,
        report,
        application,
    })
}
