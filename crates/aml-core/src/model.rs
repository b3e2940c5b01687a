//! Application model — bricks, states and linked transitions
//!
//! States live in an arena owned by the `Application`. A `Transition` holds a
//! `StateId` handle into that arena rather than a second owning copy, so the
//! state graph may cycle (`off → on → off`) and many transitions may target
//! the same state.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::expression::LogicalExpression;

/// Two-valued logic level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    High,
    Low,
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Signal::High => f.write_str("HIGH"),
            Signal::Low => f.write_str("LOW"),
        }
    }
}

impl FromStr for Signal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HIGH" => Ok(Signal::High),
            "LOW" => Ok(Signal::Low),
            other => Err(format!("invalid signal '{}'", other)),
        }
    }
}

/// Read (sensor) or write (actuator) endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BrickKind {
    Sensor,
    Actuator,
}

impl std::fmt::Display for BrickKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            BrickKind::Sensor => f.write_str("sensor"),
            BrickKind::Actuator => f.write_str("actuator"),
        }
    }
}

/// A named, pinned hardware endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Brick {
    pub name: String,
    pub kind: BrickKind,
    pub pin: u32,
}

/// Bricks in declaration order, indexed by name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrickTable {
    bricks: Vec<Brick>,
    index: BTreeMap<String, usize>,
}

impl BrickTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a brick; returns false (and keeps the first) if the name is taken
    pub fn insert(&mut self, brick: Brick) -> bool {
        if self.index.contains_key(&brick.name) {
            return false;
        }
        self.index.insert(brick.name.clone(), self.bricks.len());
        self.bricks.push(brick);
        true
    }

    pub fn get(&self, name: &str) -> Option<&Brick> {
        self.index.get(name).map(|&i| &self.bricks[i])
    }

    /// Look up a brick that must be of the given kind
    pub fn get_kind(&self, name: &str, kind: BrickKind) -> Option<&Brick> {
        self.get(name).filter(|b| b.kind == kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Brick> {
        self.bricks.iter()
    }

    pub fn len(&self) -> usize {
        self.bricks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bricks.is_empty()
    }
}

/// Drive an actuator to a signal when a state is entered
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Action {
    pub actuator: String,
    pub signal: Signal,
}

/// Handle of a state in its application's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct StateId(pub(crate) usize);

impl StateId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Guarded edge to another state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub guard: LogicalExpression,
    pub target: StateId,
}

/// A controller state: entry actions plus exactly one outgoing transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct State {
    pub name: String,
    pub actions: Vec<Action>,
    /// `None` only between the builder's two passes
    pub transition: Option<Transition>,
}

/// States in declaration order with a name index
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateTable {
    states: Vec<State>,
    index: BTreeMap<String, StateId>,
}

impl StateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a state; returns `None` (and keeps the first) if the name is taken
    pub fn insert(&mut self, state: State) -> Option<StateId> {
        if self.index.contains_key(&state.name) {
            return None;
        }
        let id = StateId(self.states.len());
        self.index.insert(state.name.clone(), id);
        self.states.push(state);
        Some(id)
    }

    pub fn id(&self, name: &str) -> Option<StateId> {
        self.index.get(name).copied()
    }

    pub fn get(&self, id: StateId) -> Option<&State> {
        self.states.get(id.0)
    }

    pub fn get_mut(&mut self, id: StateId) -> Option<&mut State> {
        self.states.get_mut(id.0)
    }

    pub fn by_name(&self, name: &str) -> Option<&State> {
        self.id(name).and_then(|id| self.get(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = (StateId, &State)> {
        self.states.iter().enumerate().map(|(i, s)| (StateId(i), s))
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

/// Root aggregate: owns every brick and state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Application {
    pub name: String,
    pub bricks: BrickTable,
    pub states: StateTable,
}

impl Application {
    pub fn brick(&self, name: &str) -> Option<&Brick> {
        self.bricks.get(name)
    }

    pub fn state(&self, name: &str) -> Option<&State> {
        self.states.by_name(name)
    }

    /// The first declared state
    pub fn initial_state(&self) -> Option<&State> {
        self.states.get(StateId(0))
    }

    /// The state a transition leads to
    ///
    /// Every transition produced by the builder targets a state of the same
    /// application, so this only returns `None` for foreign handles.
    pub fn target(&self, transition: &Transition) -> Option<&State> {
        self.states.get(transition.target)
    }

    /// Target of the named state's transition
    pub fn successor(&self, name: &str) -> Option<&State> {
        self.state(name)
            .and_then(|s| s.transition.as_ref())
            .and_then(|t| self.target(t))
    }
}

// ── Serialization ─────────────────────────────────────────

// Transitions serialize their target by name so the JSON stays readable
// without the arena.

#[derive(Serialize)]
struct TransitionView<'a> {
    guard: &'a LogicalExpression,
    condition: String,
    target: &'a str,
}

#[derive(Serialize)]
struct StateView<'a> {
    name: &'a str,
    actions: &'a [Action],
    transition: Option<TransitionView<'a>>,
}

#[derive(Serialize)]
struct ApplicationView<'a> {
    name: &'a str,
    bricks: Vec<&'a Brick>,
    states: Vec<StateView<'a>>,
}

impl Serialize for Application {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let states = self
            .states
            .iter()
            .map(|(_, state)| StateView {
                name: &state.name,
                actions: &state.actions,
                transition: state.transition.as_ref().map(|t| TransitionView {
                    guard: &t.guard,
                    condition: t.guard.render(),
                    target: self.target(t).map(|s| s.name.as_str()).unwrap_or(""),
                }),
            })
            .collect();

        ApplicationView {
            name: &self.name,
            bricks: self.bricks.iter().collect(),
            states,
        }
        .serialize(serializer)
    }
}
