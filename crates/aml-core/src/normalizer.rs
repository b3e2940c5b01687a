//! Canonical normalizer — renders a parse tree back to deterministic AML text
//!
//! # Pipeline
//!
//! `AML text → parse → ParseNode → format → SHA-256`
//!
//! # Guarantees
//!
//! - **Idempotent**: `normalize(normalize(x)) == normalize(x)`
//! - **Deterministic**: same tree always produces the same text
//! - **Layout-blind**: whitespace, line continuations and comments never
//!   reach the canonical form, so they never change the semantic hash
//!
//! Declaration order is significant in AML (the first state is the initial
//! state, the first duplicate wins), so nothing is sorted.

use sha2::{Digest, Sha256};

use crate::parser::ast::{NodeKind, ParseNode};
use crate::Result;

const INDENT: &str = "    ";

// ── Public API ─────────────────────────────────────────────

/// Parse AML text and re-render it canonically
///
/// # Errors
/// Returns `LexError` or `SyntaxError` for input that does not parse.
pub fn normalize(source: &str) -> Result<String> {
    let tree = crate::parser::parse(source)?;
    Ok(format(&tree))
}

/// Render an `Application` tree as canonical AML text
///
/// Produces:
/// - `AppBuilder(...)` on the first line
/// - one brick, state, action or transition per line
/// - four-space indentation per nesting level
/// - a trailing newline after `.get_contents()`
pub fn format(tree: &ParseNode) -> String {
    let mut out = String::new();

    out.push_str(&format!("AppBuilder({})\n", quoted(tree.text_of(NodeKind::AppName))));

    for brick in tree.brick_decls() {
        let keyword = match brick.kind {
            NodeKind::Actuator => "actuator",
            _ => "sensor",
        };
        let pin = brick
            .child(NodeKind::Pin)
            .and_then(ParseNode::as_number)
            .unwrap_or_default();
        out.push_str(&format!(
            "{}.{}({}).on_pin({})\n",
            INDENT,
            keyword,
            quoted(brick.text_of(NodeKind::Name)),
            pin
        ));
    }

    for state in tree.state_decls() {
        write_state(&mut out, state);
    }

    out.push_str(INDENT);
    out.push_str(".get_contents()\n");
    out
}

/// Lowercase hex SHA-256 of the canonical text
pub fn semantic_hash(tree: &ParseNode) -> String {
    let canonical = format(tree);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}

// ── Declaration serializers ────────────────────────────────

fn write_state(out: &mut String, state: &ParseNode) {
    out.push_str(&format!(
        "{}.state({})\n",
        INDENT,
        quoted(state.text_of(NodeKind::Name))
    ));

    if let Some(actions) = state.child(NodeKind::Actions) {
        for action in actions.children_of(NodeKind::Action) {
            out.push_str(&format!(
                "{}{}.set({}).to({})\n",
                INDENT,
                INDENT,
                quoted(action.text_of(NodeKind::ActuatorRef)),
                signal(action)
            ));
        }
    }

    if let Some(transition) = state.transition() {
        out.push_str(INDENT);
        out.push_str(INDENT);
        write_transition(out, transition);
        out.push('\n');
    }
}

fn write_transition(out: &mut String, node: &ParseNode) {
    match node.kind {
        NodeKind::SimpleTransition => {
            out.push_str(&format!(
                ".when({}).has_value({})",
                quoted(node.text_of(NodeKind::SensorRef)),
                signal(node)
            ));
        }
        NodeKind::AndTransition | NodeKind::OrTransition => {
            let keyword = if node.kind == NodeKind::AndTransition {
                "when_all"
            } else {
                "when_any"
            };
            let conditions = node
                .child(NodeKind::Conditions)
                .map(|c| c.children.as_slice())
                .unwrap_or_default();
            out.push_str(&format!(".{}(", keyword));
            write_list(out, conditions);
            out.push(')');
        }
        NodeKind::ConditionTransition => {
            out.push_str(".when_condition(");
            if let Some(expr) = node.children.iter().find(|c| c.kind.is_guard_expression()) {
                write_guard(out, expr);
            }
            out.push(')');
        }
        _ => {}
    }

    out.push_str(&format!(
        ".go_to_state({})",
        quoted(node.text_of(NodeKind::NextState))
    ));
}

fn write_guard(out: &mut String, node: &ParseNode) {
    match node.kind {
        NodeKind::Condition => {
            out.push_str(&format!(
                "({}, {})",
                quoted(node.text_of(NodeKind::SensorRef)),
                signal(node)
            ));
        }
        NodeKind::All | NodeKind::Any | NodeKind::Not => {
            let keyword = match node.kind {
                NodeKind::All => "all",
                NodeKind::Any => "any",
                _ => "not",
            };
            out.push_str(keyword);
            out.push('(');
            write_list(out, &node.children);
            out.push(')');
        }
        _ => {}
    }
}

fn write_list(out: &mut String, items: &[ParseNode]) {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_guard(out, item);
    }
}

// ── Helpers ────────────────────────────────────────────────

fn quoted(text: Option<&str>) -> String {
    format!("\"{}\"", text.unwrap_or_default())
}

fn signal(node: &ParseNode) -> &str {
    node.text_of(NodeKind::Signal).unwrap_or_default()
}
