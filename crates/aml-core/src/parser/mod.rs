//! AML Parser — tokenizer, parse-tree types, and recursive descent parser
//!
//! Converts chained-declaration text into a `ParseNode` tree.
//!
//! ```text
//! application   := "AppBuilder" "(" NAME ")" brick_decl* state_decl+ "." "get_contents" "(" ")"
//! brick_decl    := "." ("sensor"|"actuator") "(" NAME ")" "." "on_pin" "(" NUMBER ")"
//! state_decl    := "." "state" "(" NAME ")" action+ transition
//! action        := "." "set" "(" NAME ")" "." "to" "(" SIGNAL ")"
//! transition    := "." ( simple | and | or | condition ) "." "go_to_state" "(" NAME ")"
//! simple        := "when" "(" NAME ")" "." "has_value" "(" SIGNAL ")"
//! and / or      := ("when_all" | "when_any") "(" condition ("," condition)* ")"
//! condition     := "when_condition" "(" guard_expr ")"
//! guard_expr    := ("all" | "any") "(" guard_expr ("," guard_expr)* ")"
//!                | "not" "(" guard_expr ")"
//!                | "(" NAME "," SIGNAL ")"
//! ```
//!
//! Every declaration starts with the same `.` separator, so the parser peeks
//! one token past it to pick a production. Syntax errors are fatal: there is
//! no recovery.

pub mod ast;
pub mod tokenizer;

use ast::{NodeKind, ParseNode};
use tokenizer::{Token, TokenKind};

use crate::{Error, Result};

/// Nesting limit for `when_condition` guards
const MAX_GUARD_DEPTH: usize = 64;

/// Parse AML text into a parse tree
///
/// # Guarantees
/// - Deterministic: same input always produces an equal tree
///
/// # Errors
/// `LexError` for unrecognized characters, `SyntaxError` for the first
/// grammar violation.
pub fn parse(input: &str) -> Result<ParseNode> {
    let tokens = tokenizer::tokenize(input)?;
    let tree = Parser::new(tokens).parse()?;
    tracing::debug!(states = tree.state_decls().count(), "parsed application");
    Ok(tree)
}

/// Recursive descent parser over a token stream
pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    /// `tokens` should end with `Eof`, as produced by the tokenizer
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if tokens.last().map(|t| t.kind) != Some(TokenKind::Eof) {
            let span = tokens
                .last()
                .map(|t| t.span.clone())
                .unwrap_or(tokenizer::Span { line: 1, column: 1, offset: 0 });
            tokens.push(Token {
                kind: TokenKind::Eof,
                lexeme: String::new(),
                span,
            });
        }
        Parser {
            tokens,
            position: 0,
        }
    }

    /// Parse the whole token stream as one application
    pub fn parse(mut self) -> Result<ParseNode> {
        let tree = self.parse_application()?;
        self.consume(TokenKind::Eof, None)?;
        Ok(tree)
    }

    // ── Token helpers ──────────────────────────────────────

    fn current(&self) -> &Token {
        // The stream always ends with Eof and consume() never moves past it
        &self.tokens[self.position.min(self.tokens.len() - 1)]
    }

    fn peek(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.position + offset)
    }

    /// Keyword following a `.` separator, without consuming anything
    fn peek_method(&self) -> Option<&str> {
        if self.current().kind != TokenKind::Dot {
            return None;
        }
        self.peek(1)
            .filter(|t| t.kind == TokenKind::Keyword)
            .map(|t| t.lexeme.as_str())
    }

    /// Consume the current token if it has the expected kind (and lexeme)
    pub fn consume(&mut self, kind: TokenKind, expected: Option<&str>) -> Result<Token> {
        let token = self.current().clone();
        let kind_ok = token.kind == kind;
        let lexeme_ok = expected.map_or(true, |e| token.lexeme == e);

        if !kind_ok || !lexeme_ok {
            let wanted = match expected {
                Some(e) => format!("{} '{}'", kind, e),
                None => kind.to_string(),
            };
            return Err(self.error(format!("Expected {}, found {}", wanted, token)));
        }

        if token.kind != TokenKind::Eof {
            self.position += 1;
        }
        Ok(token)
    }

    fn error(&self, message: String) -> Error {
        let span = self.current().span.clone();
        Error::SyntaxError {
            message: format!("{} at offset {} ({})", message, span.offset, span),
            span: Some(span),
        }
    }

    /// `keyword "(" STRING ")"`
    fn call_with_name(&mut self, keyword: &str) -> Result<Token> {
        self.consume(TokenKind::Keyword, Some(keyword))?;
        self.consume(TokenKind::LParen, None)?;
        let name = self.consume(TokenKind::String, None)?;
        self.consume(TokenKind::RParen, None)?;
        Ok(name)
    }

    /// `keyword "(" SIGNAL ")"`
    fn call_with_signal(&mut self, keyword: &str) -> Result<Token> {
        self.consume(TokenKind::Keyword, Some(keyword))?;
        self.consume(TokenKind::LParen, None)?;
        let signal = self.consume(TokenKind::Signal, None)?;
        self.consume(TokenKind::RParen, None)?;
        Ok(signal)
    }

    fn leaf(kind: NodeKind, token: Token) -> ParseNode {
        ParseNode::text(kind, token.lexeme, token.span.offset)
    }

    // ── Application ────────────────────────────────────────

    fn parse_application(&mut self) -> Result<ParseNode> {
        let start = self.consume(TokenKind::Keyword, Some("AppBuilder"))?;
        self.consume(TokenKind::LParen, None)?;
        let name = self.consume(TokenKind::String, None)?;
        self.consume(TokenKind::RParen, None)?;

        let mut children = vec![Self::leaf(NodeKind::AppName, name)];

        // Decision point 1: brick vs state vs end of bricks
        let bricks_offset = self.current().span.offset;
        let mut bricks = Vec::new();
        while matches!(self.peek_method(), Some("sensor") | Some("actuator")) {
            bricks.push(self.parse_brick_decl()?);
        }
        if !bricks.is_empty() {
            children.push(ParseNode::branch(NodeKind::Bricks, bricks_offset, bricks));
        }

        // Decision point 2: state vs end of states
        let states_offset = self.current().span.offset;
        let mut states = Vec::new();
        while self.peek_method() == Some("state") {
            states.push(self.parse_state_decl()?);
        }
        if states.is_empty() {
            return Err(self.error("At least one state declaration is required".to_string()));
        }
        children.push(ParseNode::branch(NodeKind::States, states_offset, states));

        self.consume(TokenKind::Dot, None)?;
        self.consume(TokenKind::Keyword, Some("get_contents"))?;
        self.consume(TokenKind::LParen, None)?;
        self.consume(TokenKind::RParen, None)?;

        Ok(ParseNode::branch(
            NodeKind::Application,
            start.span.offset,
            children,
        ))
    }

    // ── Bricks ─────────────────────────────────────────────

    fn parse_brick_decl(&mut self) -> Result<ParseNode> {
        self.consume(TokenKind::Dot, None)?;
        let keyword = self.current().clone();
        let kind = match keyword.lexeme.as_str() {
            "sensor" => NodeKind::Sensor,
            "actuator" => NodeKind::Actuator,
            _ => {
                return Err(self.error(format!(
                    "Expected 'sensor' or 'actuator', found {}",
                    keyword
                )))
            }
        };

        let name = self.call_with_name(&keyword.lexeme)?;

        self.consume(TokenKind::Dot, None)?;
        self.consume(TokenKind::Keyword, Some("on_pin"))?;
        self.consume(TokenKind::LParen, None)?;
        let pin_token = self.consume(TokenKind::Number, None)?;
        self.consume(TokenKind::RParen, None)?;

        // The tokenizer only emits numbers that fit in u32
        let pin = pin_token.lexeme.parse::<u32>().map_err(|_| Error::LexError {
            character: pin_token.lexeme.chars().next().unwrap_or('0'),
            span: pin_token.span.clone(),
        })?;

        Ok(ParseNode::branch(
            kind,
            keyword.span.offset,
            vec![
                Self::leaf(NodeKind::Name, name),
                ParseNode::number(NodeKind::Pin, pin, pin_token.span.offset),
            ],
        ))
    }

    // ── States ─────────────────────────────────────────────

    fn parse_state_decl(&mut self) -> Result<ParseNode> {
        self.consume(TokenKind::Dot, None)?;
        let offset = self.current().span.offset;
        let name = self.call_with_name("state")?;
        let state_name = name.lexeme.clone();

        let actions_offset = self.current().span.offset;
        let mut actions = Vec::new();
        while self.peek_method() == Some("set") {
            actions.push(self.parse_action()?);
        }
        if actions.is_empty() {
            return Err(self.error(format!(
                "State '{}' must have at least one action",
                state_name
            )));
        }

        let transition = self.parse_transition()?;

        Ok(ParseNode::branch(
            NodeKind::State,
            offset,
            vec![
                Self::leaf(NodeKind::Name, name),
                ParseNode::branch(NodeKind::Actions, actions_offset, actions),
                transition,
            ],
        ))
    }

    fn parse_action(&mut self) -> Result<ParseNode> {
        self.consume(TokenKind::Dot, None)?;
        let offset = self.current().span.offset;
        let actuator = self.call_with_name("set")?;
        self.consume(TokenKind::Dot, None)?;
        let signal = self.call_with_signal("to")?;

        Ok(ParseNode::branch(
            NodeKind::Action,
            offset,
            vec![
                Self::leaf(NodeKind::ActuatorRef, actuator),
                Self::leaf(NodeKind::Signal, signal),
            ],
        ))
    }

    // ── Transitions ────────────────────────────────────────

    fn parse_transition(&mut self) -> Result<ParseNode> {
        // Decision point 3: which transition production
        let keyword = match self.peek_method() {
            Some(k @ ("when" | "when_all" | "when_any" | "when_condition")) => k.to_string(),
            _ => {
                let found = self
                    .peek(1)
                    .filter(|_| self.current().kind == TokenKind::Dot)
                    .unwrap_or_else(|| self.current())
                    .to_string();
                return Err(self.error(format!(
                    "Expected transition (when/when_all/when_any/when_condition), found {}",
                    found
                )));
            }
        };
        self.consume(TokenKind::Dot, None)?;
        let offset = self.current().span.offset;

        let (kind, mut children) = match keyword.as_str() {
            "when" => {
                let sensor = self.call_with_name("when")?;
                self.consume(TokenKind::Dot, None)?;
                let signal = self.call_with_signal("has_value")?;
                (
                    NodeKind::SimpleTransition,
                    vec![
                        Self::leaf(NodeKind::SensorRef, sensor),
                        Self::leaf(NodeKind::Signal, signal),
                    ],
                )
            }
            "when_all" | "when_any" => {
                self.consume(TokenKind::Keyword, Some(keyword.as_str()))?;
                let list_offset = self.consume(TokenKind::LParen, None)?.span.offset;
                let conditions = self.parse_condition_list()?;
                self.consume(TokenKind::RParen, None)?;
                let kind = if keyword == "when_all" {
                    NodeKind::AndTransition
                } else {
                    NodeKind::OrTransition
                };
                (
                    kind,
                    vec![ParseNode::branch(NodeKind::Conditions, list_offset, conditions)],
                )
            }
            _ => {
                self.consume(TokenKind::Keyword, Some("when_condition"))?;
                self.consume(TokenKind::LParen, None)?;
                let guard = self.parse_guard_expression(0)?;
                self.consume(TokenKind::RParen, None)?;
                (NodeKind::ConditionTransition, vec![guard])
            }
        };

        self.consume(TokenKind::Dot, None)?;
        let target = self.call_with_name("go_to_state")?;
        children.push(Self::leaf(NodeKind::NextState, target));

        Ok(ParseNode::branch(kind, offset, children))
    }

    fn parse_condition_list(&mut self) -> Result<Vec<ParseNode>> {
        let mut conditions = vec![self.parse_condition()?];
        while self.current().kind == TokenKind::Comma {
            self.consume(TokenKind::Comma, None)?;
            conditions.push(self.parse_condition()?);
        }
        Ok(conditions)
    }

    /// `"(" NAME "," SIGNAL ")"`
    fn parse_condition(&mut self) -> Result<ParseNode> {
        let open = self.consume(TokenKind::LParen, None)?;
        let sensor = self.consume(TokenKind::String, None)?;
        self.consume(TokenKind::Comma, None)?;
        let signal = self.consume(TokenKind::Signal, None)?;
        self.consume(TokenKind::RParen, None)?;

        Ok(ParseNode::branch(
            NodeKind::Condition,
            open.span.offset,
            vec![
                Self::leaf(NodeKind::SensorRef, sensor),
                Self::leaf(NodeKind::Signal, signal),
            ],
        ))
    }

    fn parse_guard_expression(&mut self, depth: usize) -> Result<ParseNode> {
        if depth >= MAX_GUARD_DEPTH {
            return Err(self.error(format!(
                "Condition nesting exceeds {} levels",
                MAX_GUARD_DEPTH
            )));
        }

        let token = self.current().clone();
        match (token.kind, token.lexeme.as_str()) {
            (TokenKind::LParen, _) => self.parse_condition(),
            (TokenKind::Keyword, "all") | (TokenKind::Keyword, "any") => {
                self.consume(TokenKind::Keyword, None)?;
                self.consume(TokenKind::LParen, None)?;
                let mut operands = vec![self.parse_guard_expression(depth + 1)?];
                while self.current().kind == TokenKind::Comma {
                    self.consume(TokenKind::Comma, None)?;
                    operands.push(self.parse_guard_expression(depth + 1)?);
                }
                self.consume(TokenKind::RParen, None)?;
                let kind = if token.lexeme == "all" {
                    NodeKind::All
                } else {
                    NodeKind::Any
                };
                Ok(ParseNode::branch(kind, token.span.offset, operands))
            }
            (TokenKind::Keyword, "not") => {
                self.consume(TokenKind::Keyword, None)?;
                self.consume(TokenKind::LParen, None)?;
                let inner = self.parse_guard_expression(depth + 1)?;
                self.consume(TokenKind::RParen, None)?;
                Ok(ParseNode::branch(NodeKind::Not, token.span.offset, vec![inner]))
            }
            _ => Err(self.error(format!(
                "Expected condition, 'all', 'any' or 'not', found {}",
                token
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SWITCH: &str = r#"AppBuilder("Switch")
    .sensor("BUTTON").on_pin(9)
    .actuator("LED").on_pin(11)
    .state("off")
        .set("LED").to(LOW)
        .when("BUTTON").has_value(HIGH).go_to_state("on")
    .state("on")
        .set("LED").to(HIGH)
        .when("BUTTON").has_value(LOW).go_to_state("off")
    .get_contents()"#;

    fn syntax_err(input: &str) -> String {
        match parse(input).unwrap_err() {
            Error::SyntaxError { message, .. } => message,
            other => panic!("expected SyntaxError, got {:?}", other),
        }
    }

    fn with_states(states: &str) -> String {
        format!(
            r#"AppBuilder("App")
    .sensor("B1").on_pin(2)
    .sensor("B2").on_pin(3)
    .actuator("LED").on_pin(11)
{}
    .get_contents()"#,
            states
        )
    }

    // ── Valid programs ─────────────────────────────────

    #[test]
    fn test_parse_switch_tree_shape() {
        let tree = parse(SWITCH).unwrap();
        assert_eq!(tree.kind, NodeKind::Application);
        assert_eq!(tree.text_of(NodeKind::AppName), Some("Switch"));

        let bricks: Vec<_> = tree.brick_decls().collect();
        assert_eq!(bricks.len(), 2);
        assert_eq!(bricks[0].kind, NodeKind::Sensor);
        assert_eq!(bricks[0].text_of(NodeKind::Name), Some("BUTTON"));
        assert_eq!(bricks[0].child(NodeKind::Pin).and_then(ParseNode::as_number), Some(9));
        assert_eq!(bricks[1].kind, NodeKind::Actuator);

        let states: Vec<_> = tree.state_decls().collect();
        assert_eq!(states.len(), 2);
        assert_eq!(states[0].text_of(NodeKind::Name), Some("off"));

        let actions = states[0].child(NodeKind::Actions).unwrap();
        assert_eq!(actions.children.len(), 1);
        assert_eq!(actions.children[0].text_of(NodeKind::ActuatorRef), Some("LED"));
        assert_eq!(actions.children[0].text_of(NodeKind::Signal), Some("LOW"));

        let transition = states[0].transition().unwrap();
        assert_eq!(transition.kind, NodeKind::SimpleTransition);
        assert_eq!(transition.text_of(NodeKind::SensorRef), Some("BUTTON"));
        assert_eq!(transition.text_of(NodeKind::Signal), Some("HIGH"));
        assert_eq!(transition.text_of(NodeKind::NextState), Some("on"));
    }

    #[test]
    fn test_parse_without_bricks() {
        let tree = parse(
            r#"AppBuilder("Bare").state("s").set("X").to(HIGH)
               .when("Y").has_value(LOW).go_to_state("s").get_contents()"#,
        )
        .unwrap();
        assert!(tree.child(NodeKind::Bricks).is_none());
        assert_eq!(tree.state_decls().count(), 1);
    }

    #[test]
    fn test_parse_multiple_actions() {
        let input = with_states(
            r#"    .state("s").set("LED").to(HIGH).set("LED").to(LOW)
        .when("B1").has_value(HIGH).go_to_state("s")"#,
        );
        let tree = parse(&input).unwrap();
        let state = tree.state_decls().next().unwrap();
        assert_eq!(state.child(NodeKind::Actions).unwrap().children.len(), 2);
    }

    #[test]
    fn test_parse_when_all() {
        let input = with_states(
            r#"    .state("s").set("LED").to(HIGH)
        .when_all(("B1", HIGH), ("B2", LOW)).go_to_state("s")"#,
        );
        let tree = parse(&input).unwrap();
        let transition = tree.state_decls().next().unwrap().transition().unwrap();
        assert_eq!(transition.kind, NodeKind::AndTransition);
        let conditions = transition.child(NodeKind::Conditions).unwrap();
        assert_eq!(conditions.children.len(), 2);
        assert_eq!(conditions.children[1].text_of(NodeKind::SensorRef), Some("B2"));
        assert_eq!(conditions.children[1].text_of(NodeKind::Signal), Some("LOW"));
        assert_eq!(transition.text_of(NodeKind::NextState), Some("s"));
    }

    #[test]
    fn test_parse_when_any_single_condition() {
        let input = with_states(
            r#"    .state("s").set("LED").to(HIGH)
        .when_any(("B1", HIGH)).go_to_state("s")"#,
        );
        let tree = parse(&input).unwrap();
        let transition = tree.state_decls().next().unwrap().transition().unwrap();
        assert_eq!(transition.kind, NodeKind::OrTransition);
        assert_eq!(transition.child(NodeKind::Conditions).unwrap().children.len(), 1);
    }

    #[test]
    fn test_parse_when_condition_nested() {
        let input = with_states(
            r#"    .state("s").set("LED").to(HIGH)
        .when_condition(any(all(("B1", HIGH), ("B2", HIGH)), not(("B1", LOW))))
        .go_to_state("s")"#,
        );
        let tree = parse(&input).unwrap();
        let transition = tree.state_decls().next().unwrap().transition().unwrap();
        assert_eq!(transition.kind, NodeKind::ConditionTransition);

        let guard = &transition.children[0];
        assert_eq!(guard.kind, NodeKind::Any);
        assert_eq!(guard.children[0].kind, NodeKind::All);
        assert_eq!(guard.children[0].children.len(), 2);
        assert_eq!(guard.children[1].kind, NodeKind::Not);
        assert_eq!(guard.children[1].children[0].kind, NodeKind::Condition);
    }

    #[test]
    fn test_parse_empty_app_name_is_syntactically_valid() {
        let tree = parse(
            r#"AppBuilder("").state("s").set("L").to(LOW)
               .when("B").has_value(HIGH).go_to_state("s").get_contents()"#,
        )
        .unwrap();
        assert_eq!(tree.text_of(NodeKind::AppName), Some(""));
    }

    // ── Syntax errors ──────────────────────────────────

    #[test]
    fn test_missing_get_contents() {
        let input = SWITCH.trim_end_matches(".get_contents()");
        let msg = syntax_err(input);
        assert!(msg.contains("Expected '.'"), "{}", msg);
        assert!(msg.contains("end of input"), "{}", msg);
    }

    #[test]
    fn test_no_states() {
        let msg = syntax_err(
            r#"AppBuilder("x").sensor("B").on_pin(9).actuator("L").on_pin(11).get_contents()"#,
        );
        assert!(msg.contains("At least one state declaration is required"), "{}", msg);
    }

    #[test]
    fn test_state_without_transition() {
        let msg = syntax_err(&with_states(r#"    .state("off").set("LED").to(LOW)"#));
        assert!(msg.contains("Expected transition"), "{}", msg);
        assert!(msg.contains("get_contents"), "{}", msg);
    }

    #[test]
    fn test_state_without_action() {
        let msg = syntax_err(&with_states(
            r#"    .state("off").when("B1").has_value(HIGH).go_to_state("off")"#,
        ));
        assert!(msg.contains("State 'off' must have at least one action"), "{}", msg);
    }

    #[test]
    fn test_missing_pin() {
        let msg = syntax_err(
            r#"AppBuilder("x").sensor("B").actuator("L").on_pin(11)
               .state("s").set("L").to(LOW).when("B").has_value(HIGH).go_to_state("s")
               .get_contents()"#,
        );
        assert!(msg.contains("Expected keyword 'on_pin'"), "{}", msg);
    }

    #[test]
    fn test_pin_must_be_number() {
        let msg = syntax_err(
            r#"AppBuilder("x").sensor("B").on_pin("nine")
               .state("s").set("B").to(LOW).when("B").has_value(HIGH).go_to_state("s")
               .get_contents()"#,
        );
        assert!(msg.contains("Expected number, found string \"nine\""), "{}", msg);
    }

    #[test]
    fn test_wrong_method_order() {
        let msg = syntax_err(
            r#"AppBuilder("x")
               .state("s").set("L").to(LOW).when("B").has_value(HIGH).go_to_state("s")
               .sensor("B").on_pin(9)
               .get_contents()"#,
        );
        assert!(msg.contains("Expected keyword 'get_contents', found keyword 'sensor'"), "{}", msg);
    }

    #[test]
    fn test_missing_go_to_state() {
        let msg = syntax_err(&with_states(
            r#"    .state("off").set("LED").to(LOW).when("B1").has_value(HIGH)"#,
        ));
        assert!(msg.contains("Expected keyword 'go_to_state'"), "{}", msg);
    }

    #[test]
    fn test_missing_app_name() {
        let msg = syntax_err(r#"AppBuilder().get_contents()"#);
        assert!(msg.contains("Expected string, found ')'"), "{}", msg);
    }

    #[test]
    fn test_trailing_tokens_rejected() {
        let msg = syntax_err(&format!("{} .get_contents()", SWITCH));
        assert!(msg.contains("Expected end of input"), "{}", msg);
    }

    #[test]
    fn test_syntax_error_reports_offset() {
        let err = parse(r#"AppBuilder("x") ("#).unwrap_err();
        let span = err.span().cloned().unwrap();
        assert_eq!(span.offset, 16);
        assert!(err.to_string().contains("at offset 16"));
    }

    #[test]
    fn test_misspelled_keyword_is_lex_error() {
        let input = SWITCH.replacen(".state(\"off\")", ".states(\"off\")", 1);
        assert!(matches!(parse(&input), Err(Error::LexError { character: 's', .. })));
    }

    #[test]
    fn test_guard_nesting_limit() {
        let mut guard = String::from("(\"B1\", HIGH)");
        for _ in 0..MAX_GUARD_DEPTH + 1 {
            guard = format!("not({})", guard);
        }
        let input = with_states(&format!(
            "    .state(\"s\").set(\"LED\").to(HIGH).when_condition({}).go_to_state(\"s\")",
            guard
        ));
        let msg = syntax_err(&input);
        assert!(msg.contains("nesting exceeds"), "{}", msg);
    }

    #[test]
    fn test_consume_reports_expected_and_actual() {
        let tokens = tokenizer::tokenize("HIGH").unwrap();
        let mut parser = Parser::new(tokens);
        let err = parser.consume(TokenKind::String, None).unwrap_err();
        assert!(err.to_string().contains("Expected string, found signal 'HIGH' at offset 0"));
    }

    // ── Determinism proof ──────────────────────────────

    #[test]
    fn test_parse_determinism_100_iterations() {
        let first = parse(SWITCH).unwrap();
        for i in 0..100 {
            let result = parse(SWITCH).unwrap();
            assert_eq!(first, result, "Determinism failure at iteration {}", i);
        }
    }
}
