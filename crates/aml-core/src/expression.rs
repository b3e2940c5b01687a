//! Logical guard expressions
//!
//! A guard is a small boolean tree over sensor readings: a sensor leaf, or
//! And/Or/Not combinators. Rendering is deterministic and bit-exact, since
//! downstream emitters paste the text straight into generated programs:
//!
//! | Expression        | Rendering                         |
//! |-------------------|-----------------------------------|
//! | `Sensor(B, HIGH)` | `B == HIGH`                       |
//! | `And([])`         | `true`                            |
//! | `Or([])`          | `false`                           |
//! | `And([x])`        | `x`                               |
//! | `And([x, y])`     | `(x && y)`                        |
//! | `Or([x, y])`      | `(x \|\| y)`                      |
//! | `Not(x)`          | `!(x)`                            |

use serde::Serialize;

use crate::model::Signal;

/// How a sensor leaf reads its brick in rendered text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadIdiom {
    /// `BUTTON == HIGH`
    #[default]
    Plain,
    /// `digitalRead(BUTTON) == HIGH`
    DigitalRead,
}

impl ReadIdiom {
    fn read(self, brick: &str) -> String {
        match self {
            ReadIdiom::Plain => brick.to_string(),
            ReadIdiom::DigitalRead => format!("digitalRead({})", brick),
        }
    }
}

/// Boolean guard over sensor signals
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum LogicalExpression {
    Sensor { brick: String, signal: Signal },
    And { operands: Vec<LogicalExpression> },
    Or { operands: Vec<LogicalExpression> },
    Not { operand: Box<LogicalExpression> },
}

impl LogicalExpression {
    pub fn sensor(brick: impl Into<String>, signal: Signal) -> Self {
        LogicalExpression::Sensor {
            brick: brick.into(),
            signal,
        }
    }

    pub fn and(operands: Vec<LogicalExpression>) -> Self {
        LogicalExpression::And { operands }
    }

    pub fn or(operands: Vec<LogicalExpression>) -> Self {
        LogicalExpression::Or { operands }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(operand: LogicalExpression) -> Self {
        LogicalExpression::Not {
            operand: Box::new(operand),
        }
    }

    /// Render with the plain read idiom
    pub fn render(&self) -> String {
        self.render_with(ReadIdiom::Plain)
    }

    pub fn render_with(&self, idiom: ReadIdiom) -> String {
        match self {
            LogicalExpression::Sensor { brick, signal } => {
                format!("{} == {}", idiom.read(brick), signal)
            }
            LogicalExpression::And { operands } => join(operands, " && ", "true", idiom),
            LogicalExpression::Or { operands } => join(operands, " || ", "false", idiom),
            LogicalExpression::Not { operand } => format!("!({})", operand.render_with(idiom)),
        }
    }

    /// Brick names referenced by sensor leaves, left to right
    pub fn sensors(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_sensors(&mut names);
        names
    }

    fn collect_sensors<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            LogicalExpression::Sensor { brick, .. } => names.push(brick),
            LogicalExpression::And { operands } | LogicalExpression::Or { operands } => {
                for operand in operands {
                    operand.collect_sensors(names);
                }
            }
            LogicalExpression::Not { operand } => operand.collect_sensors(names),
        }
    }
}

/// Empty lists render the identity literal, singletons collapse unparenthesized
fn join(operands: &[LogicalExpression], separator: &str, identity: &str, idiom: ReadIdiom) -> String {
    match operands {
        [] => identity.to_string(),
        [only] => only.render_with(idiom),
        _ => {
            let parts: Vec<String> = operands.iter().map(|e| e.render_with(idiom)).collect();
            format!("({})", parts.join(separator))
        }
    }
}

impl std::fmt::Display for LogicalExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}
