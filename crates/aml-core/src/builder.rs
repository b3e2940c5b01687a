//! Model builder — turns a parse tree into a linked `Application`
//!
//! Construction runs in passes because a transition may target a state that
//! is declared later in the source:
//!
//! 0. `build_bricks`: brick table, declaration order
//! 1. `build_states`: every state with its actions, transition absent
//! 2. `link_transitions`: guards and targets resolved against the now
//!    complete tables
//!
//! Unlike the validator, the builder fails fast: the first name it cannot
//! resolve aborts the build with `UndefinedBrick` or `UndefinedState`. It
//! expects input that already validated clean.

use std::collections::BTreeSet;

use crate::expression::LogicalExpression;
use crate::model::{
    Action, Application, Brick, BrickKind, BrickTable, Signal, State, StateTable, Transition,
};
use crate::parser::ast::{NodeKind, ParseNode};
use crate::{Error, Result};

/// Run all passes over an `Application` parse tree
pub fn build(tree: &ParseNode) -> Result<Application> {
    if tree.kind != NodeKind::Application {
        return Err(Error::MalformedTree(format!(
            "expected application node, found {:?}",
            tree.kind
        )));
    }
    let name = required_text(tree, NodeKind::AppName)?.to_string();

    let bricks = build_bricks(tree)?;
    let mut states = build_states(tree, &bricks)?;
    link_transitions(tree, &bricks, &mut states)?;

    tracing::debug!(
        app = %name,
        bricks = bricks.len(),
        states = states.len(),
        "built application"
    );
    Ok(Application {
        name,
        bricks,
        states,
    })
}

// ── Pass 0: Bricks ────────────────────────────────────────

/// Collect brick declarations; a repeated name keeps its first declaration
pub fn build_bricks(tree: &ParseNode) -> Result<BrickTable> {
    let mut bricks = BrickTable::new();

    for decl in tree.brick_decls() {
        let kind = match decl.kind {
            NodeKind::Sensor => BrickKind::Sensor,
            NodeKind::Actuator => BrickKind::Actuator,
            other => {
                return Err(Error::MalformedTree(format!(
                    "unexpected {:?} among brick declarations",
                    other
                )))
            }
        };
        let name = required_text(decl, NodeKind::Name)?;
        let pin = decl
            .child(NodeKind::Pin)
            .and_then(ParseNode::as_number)
            .ok_or_else(|| Error::MalformedTree(format!("brick '{}' has no pin", name)))?;

        let brick = Brick {
            name: name.to_string(),
            kind,
            pin,
        };
        if !bricks.insert(brick) {
            tracing::warn!(brick = name, "duplicate brick ignored");
        }
    }

    Ok(bricks)
}

// ── Pass 1: States ────────────────────────────────────────

/// Materialize every state with its actions and no transition
pub fn build_states(tree: &ParseNode, bricks: &BrickTable) -> Result<StateTable> {
    let mut states = StateTable::new();

    for decl in tree.state_decls() {
        let name = required_text(decl, NodeKind::Name)?;
        if states.id(name).is_some() {
            tracing::warn!(state = name, "duplicate state ignored");
            continue;
        }

        let mut actions = Vec::new();
        if let Some(list) = decl.child(NodeKind::Actions) {
            for action in list.children_of(NodeKind::Action) {
                actions.push(build_action(action, bricks)?);
            }
        }

        states.insert(State {
            name: name.to_string(),
            actions,
            transition: None,
        });
    }

    Ok(states)
}

fn build_action(node: &ParseNode, bricks: &BrickTable) -> Result<Action> {
    let actuator = required_text(node, NodeKind::ActuatorRef)?;
    let brick = resolve_brick(bricks, actuator, BrickKind::Actuator)?;
    Ok(Action {
        actuator: brick.name.clone(),
        signal: signal_of(node)?,
    })
}

// ── Pass 2: Transitions ───────────────────────────────────

/// Resolve every state's guard and target, fail-fast
pub fn link_transitions(
    tree: &ParseNode,
    bricks: &BrickTable,
    states: &mut StateTable,
) -> Result<()> {
    let mut linked = BTreeSet::new();

    for decl in tree.state_decls() {
        let name = required_text(decl, NodeKind::Name)?;
        if !linked.insert(name) {
            // Later duplicates were dropped in pass 1
            continue;
        }

        let node = decl.transition().ok_or_else(|| {
            Error::MalformedTree(format!("state '{}' has no transition", name))
        })?;
        let transition = build_transition(node, bricks, states)?;

        let source = states.id(name).ok_or_else(|| undefined_state(name))?;
        if let Some(state) = states.get_mut(source) {
            state.transition = Some(transition);
        }
    }

    Ok(())
}

fn build_transition(
    node: &ParseNode,
    bricks: &BrickTable,
    states: &StateTable,
) -> Result<Transition> {
    let guard = match node.kind {
        NodeKind::SimpleTransition => {
            let sensor = required_text(node, NodeKind::SensorRef)?;
            let brick = resolve_brick(bricks, sensor, BrickKind::Sensor)?;
            LogicalExpression::sensor(brick.name.clone(), signal_of(node)?)
        }
        NodeKind::AndTransition | NodeKind::OrTransition => {
            let conditions = node
                .child(NodeKind::Conditions)
                .ok_or_else(|| Error::MalformedTree("transition has no conditions".into()))?;
            let operands = conditions
                .children
                .iter()
                .map(|c| build_condition(c, bricks))
                .collect::<Result<Vec<_>>>()?;
            if node.kind == NodeKind::AndTransition {
                LogicalExpression::and(operands)
            } else {
                LogicalExpression::or(operands)
            }
        }
        NodeKind::ConditionTransition => {
            let expr = node
                .children
                .iter()
                .find(|c| c.kind.is_guard_expression())
                .ok_or_else(|| Error::MalformedTree("transition has no condition".into()))?;
            build_guard(expr, bricks)?
        }
        other => {
            return Err(Error::MalformedTree(format!(
                "expected transition, found {:?}",
                other
            )))
        }
    };

    let target_name = required_text(node, NodeKind::NextState)?;
    let target = states
        .id(target_name)
        .ok_or_else(|| undefined_state(target_name))?;

    Ok(Transition { guard, target })
}

/// `(sensor, signal)` pair
fn build_condition(node: &ParseNode, bricks: &BrickTable) -> Result<LogicalExpression> {
    if node.kind != NodeKind::Condition {
        return Err(Error::MalformedTree(format!(
            "expected condition, found {:?}",
            node.kind
        )));
    }
    let sensor = required_text(node, NodeKind::SensorRef)?;
    let brick = resolve_brick(bricks, sensor, BrickKind::Sensor)?;
    Ok(LogicalExpression::sensor(brick.name.clone(), signal_of(node)?))
}

/// Nested `when_condition` guard
fn build_guard(node: &ParseNode, bricks: &BrickTable) -> Result<LogicalExpression> {
    match node.kind {
        NodeKind::Condition => build_condition(node, bricks),
        NodeKind::All | NodeKind::Any => {
            let operands = node
                .children
                .iter()
                .map(|c| build_guard(c, bricks))
                .collect::<Result<Vec<_>>>()?;
            Ok(if node.kind == NodeKind::All {
                LogicalExpression::and(operands)
            } else {
                LogicalExpression::or(operands)
            })
        }
        NodeKind::Not => match node.children.as_slice() {
            [inner] => Ok(LogicalExpression::not(build_guard(inner, bricks)?)),
            _ => Err(Error::MalformedTree(
                "negation must have exactly one operand".into(),
            )),
        },
        other => Err(Error::MalformedTree(format!(
            "expected condition expression, found {:?}",
            other
        ))),
    }
}

// ── Lookup helpers ────────────────────────────────────────

/// A brick of the wrong kind counts as unresolved
fn resolve_brick<'a>(bricks: &'a BrickTable, name: &str, kind: BrickKind) -> Result<&'a Brick> {
    bricks.get_kind(name, kind).ok_or_else(|| {
        tracing::warn!(brick = name, expected = %kind, "unresolved brick reference");
        Error::UndefinedBrick
    })
}

fn undefined_state(name: &str) -> Error {
    tracing::warn!(state = name, "unresolved state reference");
    Error::UndefinedState
}

fn required_text(node: &ParseNode, kind: NodeKind) -> Result<&str> {
    node.text_of(kind).ok_or_else(|| {
        Error::MalformedTree(format!("{:?} node has no {:?} child", node.kind, kind))
    })
}

fn signal_of(node: &ParseNode) -> Result<Signal> {
    required_text(node, NodeKind::Signal)?
        .parse::<Signal>()
        .map_err(Error::MalformedTree)
}
