//! AML parse tree — typed, ordered nodes produced by the parser
//!
//! Every node carries a closed `NodeKind` tag, an optional literal value and
//! its ordered children. The tree is immutable after parsing and is read by
//! the validator, the builder and the normalizer.

use serde::Serialize;

/// Closed set of parse-tree node kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Application,
    AppName,
    Bricks,
    Sensor,
    Actuator,
    Name,
    Pin,
    States,
    State,
    Actions,
    Action,
    ActuatorRef,
    Signal,
    SimpleTransition,
    AndTransition,
    OrTransition,
    ConditionTransition,
    Conditions,
    Condition,
    SensorRef,
    NextState,
    All,
    Any,
    Not,
}

impl NodeKind {
    /// True for the four transition productions
    pub fn is_transition(self) -> bool {
        matches!(
            self,
            NodeKind::SimpleTransition
                | NodeKind::AndTransition
                | NodeKind::OrTransition
                | NodeKind::ConditionTransition
        )
    }

    /// True for nodes allowed inside a `when_condition` guard
    pub fn is_guard_expression(self) -> bool {
        matches!(
            self,
            NodeKind::All | NodeKind::Any | NodeKind::Not | NodeKind::Condition
        )
    }
}

/// Literal payload of a leaf node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Literal {
    Text(String),
    Number(u32),
}

/// A node of the parse tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseNode {
    pub kind: NodeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Literal>,
    /// Byte offset of the token that introduced this node
    #[serde(skip)]
    pub offset: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ParseNode>,
}

impl ParseNode {
    /// Interior node with no literal
    pub fn branch(kind: NodeKind, offset: usize, children: Vec<ParseNode>) -> Self {
        ParseNode {
            kind,
            value: None,
            offset,
            children,
        }
    }

    /// Leaf node holding text (names, signals)
    pub fn text(kind: NodeKind, value: impl Into<String>, offset: usize) -> Self {
        ParseNode {
            kind,
            value: Some(Literal::Text(value.into())),
            offset,
            children: Vec::new(),
        }
    }

    /// Leaf node holding a number (pins)
    pub fn number(kind: NodeKind, value: u32, offset: usize) -> Self {
        ParseNode {
            kind,
            value: Some(Literal::Number(value)),
            offset,
            children: Vec::new(),
        }
    }

    /// First direct child of the given kind
    pub fn child(&self, kind: NodeKind) -> Option<&ParseNode> {
        self.children.iter().find(|c| c.kind == kind)
    }

    /// All direct children of the given kind, in order
    pub fn children_of(&self, kind: NodeKind) -> impl Iterator<Item = &ParseNode> {
        self.children.iter().filter(move |c| c.kind == kind)
    }

    pub fn as_text(&self) -> Option<&str> {
        match &self.value {
            Some(Literal::Text(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<u32> {
        match self.value {
            Some(Literal::Number(n)) => Some(n),
            _ => None,
        }
    }

    /// Text of the first direct child of the given kind
    pub fn text_of(&self, kind: NodeKind) -> Option<&str> {
        self.child(kind).and_then(ParseNode::as_text)
    }

    /// The transition child of a `State` node
    pub fn transition(&self) -> Option<&ParseNode> {
        self.children.iter().find(|c| c.kind.is_transition())
    }

    /// Brick declarations of an `Application` node, in document order
    pub fn brick_decls(&self) -> impl Iterator<Item = &ParseNode> {
        self.child(NodeKind::Bricks)
            .into_iter()
            .flat_map(|b| b.children.iter())
    }

    /// State declarations of an `Application` node, in document order
    pub fn state_decls(&self) -> impl Iterator<Item = &ParseNode> {
        self.child(NodeKind::States)
            .into_iter()
            .flat_map(|s| s.children_of(NodeKind::State))
    }
}
