//! Semantic validator — symbol-table checks over the parse tree
//!
//! The validator walks the tree once, in document order, dispatching on the
//! node kind. It builds the brick table (name → kind) and the state-name set
//! as it goes, and accumulates every violation rather than stopping at the
//! first, so an author can fix everything in one pass.
//!
//! Transition targets are checked after the walk: a transition may name a
//! state declared further down.
//!
//! # Checks
//!
//! Errors (make the report invalid):
//! - empty application name
//! - duplicate brick or state names (the first declaration wins)
//! - actions on undeclared bricks or on sensors
//! - guards on undeclared bricks or on actuators
//! - signal literals other than `HIGH` / `LOW`
//! - transitions to undeclared states
//!
//! Warnings (informational only):
//! - application name not capitalized
//! - pin shared by two bricks, or one of the serial pins 0/1
//! - state unreachable from the initial state

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::model::BrickKind;
use crate::parser::ast::{NodeKind, ParseNode};
use crate::parser::tokenizer::SIGNALS;

/// Pins wired to the serial port on common boards
const SERIAL_PINS: [u32; 2] = [0, 1];

// ── Validation Result Types ───────────────────────────────

/// Result of semantic validation, accumulating all diagnostics
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if no errors were found (warnings are OK)
    pub fn is_valid(&self) -> bool {
        !self.diagnostics.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn errors(&self) -> Vec<&Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .collect()
    }

    pub fn warnings(&self) -> Vec<&Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .collect()
    }

    /// Error messages in the order they were found; empty iff valid
    pub fn messages(&self) -> Vec<String> {
        self.errors().into_iter().map(|d| d.message.clone()).collect()
    }

    pub fn warning_messages(&self) -> Vec<String> {
        self.warnings().into_iter().map(|d| d.message.clone()).collect()
    }

    /// `{"valid": bool, "errors": [...], "warnings": [...]}`
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "valid": self.is_valid(),
            "errors": self.errors(),
            "warnings": self.warnings(),
        })
    }

    fn add_error(&mut self, kind: DiagnosticKind, message: String, offset: usize) {
        self.diagnostics.push(Diagnostic {
            severity: Severity::Error,
            kind,
            message,
            offset: Some(offset),
        });
    }

    fn add_warning(&mut self, kind: DiagnosticKind, message: String, offset: Option<usize>) {
        self.diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            kind,
            message,
            offset,
        });
    }
}

/// A single validation diagnostic
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub message: String,
    /// Byte offset of the offending node
    pub offset: Option<usize>,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let prefix = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        match self.offset {
            Some(offset) => write!(f, "{} [{}] at offset {}: {}", prefix, self.kind, offset, self.message),
            None => write!(f, "{} [{}]: {}", prefix, self.kind, self.message),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// Category of validation issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    EmptyName,
    DuplicateName,
    UndefinedReference,
    KindMismatch,
    InvalidSignal,
    Style,
    PinConflict,
    Unreachable,
}

impl std::fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            DiagnosticKind::EmptyName => "name",
            DiagnosticKind::DuplicateName => "duplicate",
            DiagnosticKind::UndefinedReference => "reference",
            DiagnosticKind::KindMismatch => "kind",
            DiagnosticKind::InvalidSignal => "signal",
            DiagnosticKind::Style => "style",
            DiagnosticKind::PinConflict => "pin",
            DiagnosticKind::Unreachable => "reachability",
        };
        f.write_str(name)
    }
}

// ── Public API ────────────────────────────────────────────

/// Validate a parse tree. Never fails; all findings are in the report.
pub fn validate(tree: &ParseNode) -> ValidationReport {
    let mut validator = SemanticValidator::default();
    validator.visit(tree);
    validator.check_target_states();
    validator.check_reachability();

    tracing::debug!(
        errors = validator.report.errors().len(),
        warnings = validator.report.warnings().len(),
        "validated application"
    );
    validator.report
}

// ── Tree walk ─────────────────────────────────────────────

#[derive(Default)]
struct SemanticValidator {
    report: ValidationReport,
    bricks: BTreeMap<String, BrickKind>,
    pins: BTreeMap<u32, String>,
    states: BTreeSet<String>,
    /// (state, target, offset) in document order; checked after the walk
    targets: Vec<(Option<String>, String, usize)>,
    /// Name of the state whose subtree is being visited
    current_state: Option<String>,
    /// First declared state
    initial_state: Option<String>,
}

/// Where a brick reference appears; selects wording and required kind
#[derive(Clone, Copy)]
enum RefSite {
    Action,
    Transition,
    Condition,
}

impl SemanticValidator {
    fn visit(&mut self, node: &ParseNode) {
        match node.kind {
            NodeKind::Application => self.visit_application(node),
            NodeKind::Sensor => self.visit_brick(node, BrickKind::Sensor),
            NodeKind::Actuator => self.visit_brick(node, BrickKind::Actuator),
            NodeKind::State => self.visit_state(node),
            NodeKind::Action => self.visit_action(node),
            NodeKind::SimpleTransition => self.visit_simple_transition(node),
            NodeKind::AndTransition | NodeKind::OrTransition | NodeKind::ConditionTransition => {
                self.visit_compound_transition(node)
            }
            NodeKind::Condition => self.visit_condition(node),
            NodeKind::AppName
            | NodeKind::Bricks
            | NodeKind::Name
            | NodeKind::Pin
            | NodeKind::States
            | NodeKind::Actions
            | NodeKind::ActuatorRef
            | NodeKind::Signal
            | NodeKind::Conditions
            | NodeKind::SensorRef
            | NodeKind::NextState
            | NodeKind::All
            | NodeKind::Any
            | NodeKind::Not => self.visit_children(node),
        }
    }

    fn visit_children(&mut self, node: &ParseNode) {
        for child in &node.children {
            self.visit(child);
        }
    }

    fn visit_application(&mut self, node: &ParseNode) {
        if let Some(name_node) = node.child(NodeKind::AppName) {
            let name = name_node.as_text().unwrap_or("");
            if name.trim().is_empty() {
                self.report.add_error(
                    DiagnosticKind::EmptyName,
                    "Application name cannot be empty".to_string(),
                    name_node.offset,
                );
            } else if name.starts_with(|c: char| c.is_lowercase()) {
                self.report.add_warning(
                    DiagnosticKind::Style,
                    format!("App name '{}' should start with a capital letter", name),
                    Some(name_node.offset),
                );
            }
        }
        self.visit_children(node);
    }

    fn visit_brick(&mut self, node: &ParseNode, kind: BrickKind) {
        let Some(name) = node.text_of(NodeKind::Name) else {
            return;
        };

        if let Some(existing) = self.bricks.get(name) {
            self.report.add_error(
                DiagnosticKind::DuplicateName,
                format!("Duplicate brick name '{}': already declared as {}", name, existing),
                node.offset,
            );
            return;
        }
        self.bricks.insert(name.to_string(), kind);

        if let Some(pin_node) = node.child(NodeKind::Pin) {
            if let Some(pin) = pin_node.as_number() {
                self.check_pin(name, pin, pin_node.offset);
            }
        }
    }

    fn check_pin(&mut self, name: &str, pin: u32, offset: usize) {
        if SERIAL_PINS.contains(&pin) {
            self.report.add_warning(
                DiagnosticKind::PinConflict,
                format!("Pin {} of '{}' is reserved for serial communication", pin, name),
                Some(offset),
            );
        }
        match self.pins.get(&pin) {
            Some(owner) => {
                let message = format!("Pin {} is shared by '{}' and '{}'", pin, owner, name);
                self.report
                    .add_warning(DiagnosticKind::PinConflict, message, Some(offset));
            }
            None => {
                self.pins.insert(pin, name.to_string());
            }
        }
    }

    fn visit_state(&mut self, node: &ParseNode) {
        let name = node.text_of(NodeKind::Name).map(str::to_string);
        if let Some(ref name) = name {
            if !self.states.insert(name.clone()) {
                self.report.add_error(
                    DiagnosticKind::DuplicateName,
                    format!("Duplicate state name '{}'", name),
                    node.offset,
                );
            }
            if self.initial_state.is_none() {
                self.initial_state = Some(name.clone());
            }
        }

        let outer = std::mem::replace(&mut self.current_state, name);
        self.visit_children(node);
        self.current_state = outer;
    }

    fn visit_action(&mut self, node: &ParseNode) {
        if let Some(actuator) = node.child(NodeKind::ActuatorRef) {
            self.check_brick_ref(actuator, RefSite::Action);
        }
        self.check_signal(node);
    }

    fn visit_simple_transition(&mut self, node: &ParseNode) {
        if let Some(sensor) = node.child(NodeKind::SensorRef) {
            self.check_brick_ref(sensor, RefSite::Transition);
        }
        self.check_signal(node);
        self.record_target(node);
    }

    fn visit_compound_transition(&mut self, node: &ParseNode) {
        for child in &node.children {
            if child.kind != NodeKind::NextState {
                self.visit(child);
            }
        }
        self.record_target(node);
    }

    fn visit_condition(&mut self, node: &ParseNode) {
        if let Some(sensor) = node.child(NodeKind::SensorRef) {
            self.check_brick_ref(sensor, RefSite::Condition);
        }
        self.check_signal(node);
    }

    // ── Rule helpers ──────────────────────────────────────

    fn check_brick_ref(&mut self, reference: &ParseNode, site: RefSite) {
        let Some(name) = reference.as_text() else {
            return;
        };

        let (context, required) = match site {
            RefSite::Action => ("action", BrickKind::Actuator),
            RefSite::Transition => ("transition", BrickKind::Sensor),
            RefSite::Condition => ("condition", BrickKind::Sensor),
        };

        match self.bricks.get(name) {
            None => self.report.add_error(
                DiagnosticKind::UndefinedReference,
                format!("Undefined brick '{}' in {}", name, context),
                reference.offset,
            ),
            Some(&kind) if kind != required => {
                let message = match site {
                    RefSite::Action => format!(
                        "Cannot set '{}': it is a {}, not an actuator",
                        name, kind
                    ),
                    RefSite::Transition | RefSite::Condition => format!(
                        "Cannot check '{}' in {}: it is an {}, not a sensor",
                        name, context, kind
                    ),
                };
                self.report
                    .add_error(DiagnosticKind::KindMismatch, message, reference.offset);
            }
            Some(_) => {}
        }
    }

    fn check_signal(&mut self, node: &ParseNode) {
        let Some(signal) = node.child(NodeKind::Signal) else {
            return;
        };
        let value = signal.as_text().unwrap_or("");
        if !SIGNALS.contains(&value) {
            self.report.add_error(
                DiagnosticKind::InvalidSignal,
                format!("Invalid signal value '{}': must be HIGH or LOW", value),
                signal.offset,
            );
        }
    }

    fn record_target(&mut self, node: &ParseNode) {
        if let Some(target) = node.child(NodeKind::NextState) {
            if let Some(name) = target.as_text() {
                self.targets
                    .push((self.current_state.clone(), name.to_string(), target.offset));
            }
        }
    }

    // ── Deferred checks ───────────────────────────────────

    fn check_target_states(&mut self) {
        let targets = std::mem::take(&mut self.targets);
        for (_, target, offset) in &targets {
            if !self.states.contains(target) {
                self.report.add_error(
                    DiagnosticKind::UndefinedReference,
                    format!("Undefined state '{}' referenced in transition", target),
                    *offset,
                );
            }
        }
        self.targets = targets;
    }

    /// Follow transitions from the initial state; only meaningful once every
    /// target resolves.
    fn check_reachability(&mut self) {
        if self.targets.iter().any(|(_, t, _)| !self.states.contains(t)) {
            return;
        }
        let Some(initial) = self.initial_state.clone() else {
            return;
        };

        // First transition recorded per state wins, matching duplicate handling
        let mut edges: BTreeMap<&str, &str> = BTreeMap::new();
        let mut order: Vec<&str> = Vec::new();
        for (from, to, _) in &self.targets {
            if let Some(from) = from {
                if !edges.contains_key(from.as_str()) {
                    edges.insert(from, to);
                    order.push(from);
                }
            }
        }

        let mut reached = BTreeSet::new();
        let mut current = initial.as_str();
        while reached.insert(current) {
            match edges.get(current) {
                Some(next) => current = *next,
                None => break,
            }
        }

        let unreachable: Vec<String> = order
            .iter()
            .filter(|s| !reached.contains(*s))
            .map(|s| s.to_string())
            .collect();
        for state in unreachable {
            self.report.add_warning(
                DiagnosticKind::Unreachable,
                format!(
                    "State '{}' is unreachable from initial state '{}'",
                    state, initial
                ),
                None,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn parse_and_validate(input: &str) -> ValidationReport {
        let tree = parse(input).expect("should parse");
        validate(&tree)
    }

    fn program(bricks: &str, states: &str) -> String {
        format!(
            "AppBuilder(\"Test\")\n{}\n{}\n    .get_contents()",
            bricks, states
        )
    }

    const BRICKS: &str = r#"    .sensor("BUTTON").on_pin(9)
    .actuator("LED").on_pin(11)"#;

    const SWITCH_STATES: &str = r#"    .state("off")
        .set("LED").to(LOW)
        .when("BUTTON").has_value(HIGH).go_to_state("on")
    .state("on")
        .set("LED").to(HIGH)
        .when("BUTTON").has_value(LOW).go_to_state("off")"#;

    // ── Valid programs ────────────────────────────────────

    #[test]
    fn test_switch_is_valid() {
        let report = parse_and_validate(&program(BRICKS, SWITCH_STATES));
        assert!(report.is_valid(), "{:?}", report.errors());
        assert!(report.messages().is_empty());
        assert!(report.warnings().is_empty(), "{:?}", report.warnings());
    }

    #[test]
    fn test_forward_reference_is_valid() {
        let states = r#"    .state("a").set("LED").to(HIGH).when("BUTTON").has_value(HIGH).go_to_state("c")
    .state("b").set("LED").to(LOW).when("BUTTON").has_value(LOW).go_to_state("a")
    .state("c").set("LED").to(LOW).when("BUTTON").has_value(LOW).go_to_state("b")"#;
        let report = parse_and_validate(&program(BRICKS, states));
        assert!(report.is_valid(), "{:?}", report.errors());
    }

    // ── Names ─────────────────────────────────────────────

    #[test]
    fn test_empty_app_name() {
        let input = program(BRICKS, SWITCH_STATES).replacen("\"Test\"", "\"\"", 1);
        let report = parse_and_validate(&input);
        assert_eq!(report.messages(), vec!["Application name cannot be empty"]);
    }

    #[test]
    fn test_lowercase_app_name_warns_only() {
        let input = program(BRICKS, SWITCH_STATES).replacen("\"Test\"", "\"switch\"", 1);
        let report = parse_and_validate(&input);
        assert!(report.is_valid());
        assert_eq!(
            report.warning_messages(),
            vec!["App name 'switch' should start with a capital letter"]
        );
    }

    #[test]
    fn test_duplicate_brick_reported_once_per_extra() {
        let bricks = r#"    .sensor("BUTTON").on_pin(9)
    .actuator("BUTTON").on_pin(10)
    .actuator("BUTTON").on_pin(12)
    .actuator("LED").on_pin(11)"#;
        let report = parse_and_validate(&program(bricks, SWITCH_STATES));
        assert_eq!(
            report.messages(),
            vec![
                "Duplicate brick name 'BUTTON': already declared as sensor",
                "Duplicate brick name 'BUTTON': already declared as sensor",
            ]
        );
    }

    #[test]
    fn test_duplicate_state() {
        let states = format!(
            "{}\n{}",
            SWITCH_STATES,
            r#"    .state("on").set("LED").to(HIGH).when("BUTTON").has_value(HIGH).go_to_state("off")"#
        );
        let report = parse_and_validate(&program(BRICKS, &states));
        assert_eq!(report.messages(), vec!["Duplicate state name 'on'"]);
    }

    // ── Brick references ──────────────────────────────────

    #[test]
    fn test_action_on_undefined_brick() {
        let states = SWITCH_STATES.replacen("set(\"LED\").to(LOW)", "set(\"BUZZER\").to(LOW)", 1);
        let report = parse_and_validate(&program(BRICKS, &states));
        assert_eq!(report.messages(), vec!["Undefined brick 'BUZZER' in action"]);
    }

    #[test]
    fn test_action_on_sensor() {
        let states = SWITCH_STATES.replacen("set(\"LED\").to(LOW)", "set(\"BUTTON\").to(LOW)", 1);
        let report = parse_and_validate(&program(BRICKS, &states));
        assert_eq!(
            report.messages(),
            vec!["Cannot set 'BUTTON': it is a sensor, not an actuator"]
        );
    }

    #[test]
    fn test_transition_on_undefined_brick() {
        let states = SWITCH_STATES.replacen("when(\"BUTTON\")", "when(\"KNOB\")", 1);
        let report = parse_and_validate(&program(BRICKS, &states));
        assert_eq!(report.messages(), vec!["Undefined brick 'KNOB' in transition"]);
    }

    #[test]
    fn test_transition_on_actuator() {
        let states = SWITCH_STATES.replacen("when(\"BUTTON\")", "when(\"LED\")", 1);
        let report = parse_and_validate(&program(BRICKS, &states));
        assert_eq!(
            report.messages(),
            vec!["Cannot check 'LED' in transition: it is an actuator, not a sensor"]
        );
        assert_eq!(report.errors()[0].kind, DiagnosticKind::KindMismatch);
    }

    #[test]
    fn test_when_all_undefined_sensor() {
        let states = r#"    .state("off").set("LED").to(LOW)
        .when_all(("BUTTON", HIGH), ("GHOST", HIGH)).go_to_state("off")"#;
        let report = parse_and_validate(&program(BRICKS, states));
        assert!(!report.is_valid());
        assert_eq!(report.messages(), vec!["Undefined brick 'GHOST' in condition"]);
    }

    #[test]
    fn test_when_any_on_actuator() {
        let states = r#"    .state("off").set("LED").to(LOW)
        .when_any(("LED", HIGH)).go_to_state("off")"#;
        let report = parse_and_validate(&program(BRICKS, states));
        assert_eq!(
            report.messages(),
            vec!["Cannot check 'LED' in condition: it is an actuator, not a sensor"]
        );
    }

    #[test]
    fn test_when_condition_checks_every_leaf() {
        let states = r#"    .state("off").set("LED").to(LOW)
        .when_condition(any(all(("BUTTON", HIGH), ("A", HIGH)), not(("LED", LOW))))
        .go_to_state("off")"#;
        let report = parse_and_validate(&program(BRICKS, states));
        assert_eq!(
            report.messages(),
            vec![
                "Undefined brick 'A' in condition",
                "Cannot check 'LED' in condition: it is an actuator, not a sensor",
            ]
        );
    }

    // ── States ────────────────────────────────────────────

    #[test]
    fn test_undefined_target_state_reported_after_walk() {
        let states = SWITCH_STATES.replacen("go_to_state(\"off\")", "go_to_state(\"standby\")", 1);
        let report = parse_and_validate(&program(BRICKS, &states));
        assert_eq!(
            report.messages(),
            vec!["Undefined state 'standby' referenced in transition"]
        );
    }

    #[test]
    fn test_all_errors_accumulated_in_document_order() {
        let bricks = r#"    .sensor("BUTTON").on_pin(9)
    .sensor("BUTTON").on_pin(10)"#;
        let states = r#"    .state("s").set("LED").to(HIGH).when("LED").has_value(LOW).go_to_state("t")
    .state("s").set("BUTTON").to(LOW).when_all(("X", HIGH)).go_to_state("s")"#;
        let input = program(bricks, states).replacen("\"Test\"", "\"\"", 1);
        let report = parse_and_validate(&input);
        assert_eq!(
            report.messages(),
            vec![
                "Application name cannot be empty",
                "Duplicate brick name 'BUTTON': already declared as sensor",
                "Undefined brick 'LED' in action",
                "Undefined brick 'LED' in transition",
                "Duplicate state name 's'",
                "Cannot set 'BUTTON': it is a sensor, not an actuator",
                "Undefined brick 'X' in condition",
                "Undefined state 't' referenced in transition",
            ]
        );
    }

    // ── Signals (hand-built trees) ────────────────────────

    #[test]
    fn test_invalid_signal_literal() {
        let mut tree = parse(&program(BRICKS, SWITCH_STATES)).unwrap();
        let states = tree
            .children
            .iter_mut()
            .find(|c| c.kind == NodeKind::States)
            .unwrap();
        let action = &mut states.children[0].children[1].children[0];
        assert_eq!(action.kind, NodeKind::Action);
        action.children[1] = ParseNode::text(NodeKind::Signal, "low", 0);

        let report = validate(&tree);
        assert_eq!(
            report.messages(),
            vec!["Invalid signal value 'low': must be HIGH or LOW"]
        );
    }

    // ── Warnings ──────────────────────────────────────────

    #[test]
    fn test_pin_warnings() {
        let bricks = r#"    .sensor("BUTTON").on_pin(1)
    .actuator("LED").on_pin(1)"#;
        let report = parse_and_validate(&program(bricks, SWITCH_STATES));
        assert!(report.is_valid());
        assert_eq!(
            report.warning_messages(),
            vec![
                "Pin 1 of 'BUTTON' is reserved for serial communication",
                "Pin 1 of 'LED' is reserved for serial communication",
                "Pin 1 is shared by 'BUTTON' and 'LED'",
            ]
        );
    }

    #[test]
    fn test_unreachable_state_warning() {
        let states = format!(
            "{}\n{}",
            SWITCH_STATES,
            r#"    .state("orphan").set("LED").to(LOW).when("BUTTON").has_value(HIGH).go_to_state("off")"#
        );
        let report = parse_and_validate(&program(BRICKS, &states));
        assert!(report.is_valid());
        assert_eq!(
            report.warning_messages(),
            vec!["State 'orphan' is unreachable from initial state 'off'"]
        );
    }

    #[test]
    fn test_display_and_json() {
        let states = SWITCH_STATES.replacen("when(\"BUTTON\")", "when(\"KNOB\")", 1);
        let report = parse_and_validate(&program(BRICKS, &states));
        let rendered = report.errors()[0].to_string();
        assert!(rendered.starts_with("error [reference] at offset "), "{}", rendered);

        let json = report.to_json();
        assert_eq!(json["valid"], false);
        assert_eq!(json["errors"][0]["kind"], "undefined_reference");
        assert_eq!(json["errors"][0]["message"], "Undefined brick 'KNOB' in transition");
    }

    // ── Determinism Tests ─────────────────────────────────

    #[test]
    fn test_validation_determinism_100_iterations() {
        let states = SWITCH_STATES.replacen("when(\"BUTTON\")", "when(\"LED\")", 1);
        let tree = parse(&program(BRICKS, &states)).unwrap();
        let first = validate(&tree);
        for i in 0..100 {
            let result = validate(&tree);
            assert_eq!(
                first.diagnostics, result.diagnostics,
                "Determinism failure at iteration {}",
                i
            );
        }
    }
}
