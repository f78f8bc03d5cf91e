//! Recursive descent parser for CARRI expression and effect lines.
//!
//! Each line is lexed separately and parsed against the domain's
//! [`SymbolTable`] and the parameter [`Scope`] in effect at that line, so
//! every name in the resulting AST is already resolved.

use crate::ast::*;
use crate::error::{ParseError, ParseResult};
use crate::lexer::Lexer;
use crate::symbols::{Scope, SlotKind, SymbolTable};
use crate::token::{Span, Token, TokenKind};

/// Parser over the tokens of one line.
pub struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    eof: Token,
    symbols: &'a SymbolTable,
    scope: &'a Scope,
}

/// Left-hand side of an assignment.
enum Target {
    Local { slot: usize, name: String },
    Var { var: VarRef, name: String, index: Expr },
}

impl<'a> Parser<'a> {
    /// Lex `text`, which starts at `column` of `line` in its file.
    pub fn new(
        text: &str,
        line: u32,
        column: u32,
        symbols: &'a SymbolTable,
        scope: &'a Scope,
    ) -> ParseResult<Self> {
        let tokens = Lexer::at_position(text, line, column).tokenize()?;
        let end = text.len();
        let eof = tokens
            .last()
            .cloned()
            .unwrap_or_else(|| Token::new(TokenKind::Eof, Span::new(end, end, line, column)));
        Ok(Self {
            tokens,
            pos: 0,
            eof,
            symbols,
            scope,
        })
    }

    /// Parse the whole line as one expression.
    pub fn parse_expression(&mut self) -> ParseResult<Expr> {
        let expr = self.parse_expr()?;
        self.expect_end()?;
        Ok(expr)
    }

    /// Parse `<lhs>: <rhs>`.
    pub fn parse_assignment(&mut self) -> ParseResult<Update> {
        let target = self.parse_target()?;
        self.expect(TokenKind::Colon)?;
        let value = self.parse_expr()?;
        self.expect_end()?;
        Ok(match target {
            Target::Local { slot, name } => Update::SetLocal { slot, name, value },
            Target::Var {
                var,
                name,
                index: Expr::Int(index),
            } => Update::SetIndexed {
                var,
                name,
                index,
                value,
            },
            Target::Var { var, name, index } => Update::SetComputedIndex {
                var,
                name,
                index,
                value,
            },
        })
    }

    /// Parse `(<expr>, ...)`, the field list of `add`/`replace`.
    pub fn parse_field_list(&mut self) -> ParseResult<Vec<Expr>> {
        self.expect(TokenKind::LParen)?;
        let mut fields = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                fields.push(self.parse_expr()?);
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(fields)
    }

    /// Fail unless every token has been consumed.
    pub fn expect_end(&self) -> ParseResult<()> {
        if self.is_at_end() {
            Ok(())
        } else {
            Err(ParseError::UnexpectedToken {
                expected: "end of line".to_string(),
                found: self.peek_kind().to_string(),
                span: self.current_span(),
            })
        }
    }

    fn parse_target(&mut self) -> ParseResult<Target> {
        let span = self.current_span();
        let TokenKind::Ident(word) = self.peek_kind() else {
            return Err(ParseError::UnexpectedToken {
                expected: "assignment target".to_string(),
                found: self.peek_kind().to_string(),
                span,
            });
        };

        if let Some((slot, kind)) = self.scope.lookup(&word) {
            self.advance();
            return match kind {
                SlotKind::Local => Ok(Target::Local { slot, name: word }),
                SlotKind::Entity(_) => Err(ParseError::syntax(
                    format!("cannot assign to parameter '{}'", word),
                    span,
                )),
            };
        }

        let (name, span) = self.parse_name()?;
        let var = self
            .symbols
            .lookup_variable(&name)
            .ok_or_else(|| ParseError::UnknownVariable {
                name: name.clone(),
                span,
            })?;
        if var.is_constant() {
            return Err(ParseError::syntax(
                format!("cannot assign to constant '{}'", name),
                span,
            ));
        }
        let index = self.parse_index()?;
        Ok(Target::Var { var, name, index })
    }

    // === Expressions ===

    fn parse_expr(&mut self) -> ParseResult<Expr> {
        self.parse_expr_impl(0)
    }

    fn parse_expr_impl(&mut self, min_prec: u8) -> ParseResult<Expr> {
        let mut left = self.parse_unary_expr()?;

        while let Some(op) = self.peek_binop() {
            let prec = op.precedence();
            if prec < min_prec {
                break;
            }
            self.advance();

            // All binary operators are left-associative.
            let right = self.parse_expr_impl(prec + 1)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn peek_binop(&self) -> Option<BinOp> {
        match self.peek_kind() {
            TokenKind::Or => Some(BinOp::Or),
            TokenKind::And => Some(BinOp::And),
            TokenKind::Assign | TokenKind::Eq => Some(BinOp::Eq),
            TokenKind::Ne => Some(BinOp::Ne),
            TokenKind::Lt => Some(BinOp::Lt),
            TokenKind::Le => Some(BinOp::Le),
            TokenKind::Gt => Some(BinOp::Gt),
            TokenKind::Ge => Some(BinOp::Ge),
            TokenKind::Question => Some(BinOp::In),
            TokenKind::Plus => Some(BinOp::Add),
            TokenKind::Minus => Some(BinOp::Sub),
            TokenKind::Star => Some(BinOp::Mul),
            TokenKind::Slash => Some(BinOp::Div),
            _ => None,
        }
    }

    fn parse_unary_expr(&mut self) -> ParseResult<Expr> {
        if self.match_token(TokenKind::Not) {
            // `not a = b and c` parses as `(not (a = b)) and c`
            let operand = self.parse_expr_impl(COMPARISON_PRECEDENCE)?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }

        if self.match_token(TokenKind::Minus) {
            let operand = self.parse_unary_expr()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(operand),
            });
        }

        if self.match_token(TokenKind::Plus) {
            return self.parse_unary_expr();
        }

        self.parse_postfix_expr()
    }

    fn parse_postfix_expr(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_primary_expr()?;
        while self.match_token(TokenKind::At) {
            let index = self.parse_primary_expr()?;
            expr = Expr::Binary {
                op: BinOp::Index,
                left: Box::new(expr),
                right: Box::new(index),
            };
        }
        Ok(expr)
    }

    fn parse_primary_expr(&mut self) -> ParseResult<Expr> {
        let span = self.current_span();
        match self.peek_kind() {
            TokenKind::Integer(n) => {
                self.advance();
                Ok(Expr::Int(n))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::Bool(true))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::Bool(false))
            }
            TokenKind::Entity => {
                self.advance();
                let (name, span) = self.parse_name()?;
                let index = self.lookup_entity(&name, span)?;
                Ok(Expr::Entity { index, name })
            }
            TokenKind::LParen => {
                self.advance();
                let first = self.parse_expr()?;
                if self.match_token(TokenKind::Comma) {
                    let mut elements = vec![first];
                    loop {
                        elements.push(self.parse_expr()?);
                        if !self.match_token(TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(TokenKind::RParen)?;
                    Ok(Expr::SetLit(elements))
                } else {
                    self.expect(TokenKind::RParen)?;
                    Ok(first)
                }
            }
            TokenKind::Ident(word) => {
                if let Some((slot, _)) = self.scope.lookup(&word) {
                    self.advance();
                    return Ok(Expr::Param { slot, name: word });
                }

                let (name, span) = self.parse_name()?;
                if self.match_token(TokenKind::Exists) {
                    let entity = self.lookup_entity(&name, span)?;
                    let id = self.parse_primary_expr()?;
                    return Ok(Expr::Exists {
                        entity,
                        name,
                        id: Box::new(id),
                    });
                }

                let var = self
                    .symbols
                    .lookup_variable(&name)
                    .ok_or_else(|| ParseError::UnknownVariable {
                        name: name.clone(),
                        span,
                    })?;
                let index = self.parse_index()?;
                Ok(Expr::Read {
                    var,
                    name,
                    index: Box::new(index),
                })
            }
            other => Err(ParseError::UnexpectedToken {
                expected: "expression".to_string(),
                found: other.to_string(),
                span,
            }),
        }
    }

    /// Index following a variable name: a parenthesized expression or a
    /// single number or parameter. Defaults to 0.
    fn parse_index(&mut self) -> ParseResult<Expr> {
        match self.peek_kind() {
            TokenKind::LParen => {
                self.advance();
                let index = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(index)
            }
            TokenKind::Integer(n) => {
                self.advance();
                Ok(Expr::Int(n))
            }
            TokenKind::Ident(word) => match self.scope.lookup(&word) {
                Some((slot, _)) => {
                    self.advance();
                    Ok(Expr::Param { slot, name: word })
                }
                None => Ok(Expr::Int(0)),
            },
            _ => Ok(Expr::Int(0)),
        }
    }

    /// Join consecutive identifiers into one name, stopping before a bound
    /// parameter name, any other token, or the end of the line.
    fn parse_name(&mut self) -> ParseResult<(String, Span)> {
        let start = self.current_span();
        let mut words: Vec<String> = Vec::new();
        let mut span = start;
        while let TokenKind::Ident(word) = self.peek_kind() {
            if self.scope.contains(&word) {
                break;
            }
            span = span.merge(self.current_span());
            words.push(word);
            self.advance();
        }
        if words.is_empty() {
            return Err(ParseError::UnexpectedToken {
                expected: "name".to_string(),
                found: self.peek_kind().to_string(),
                span: start,
            });
        }
        Ok((words.join(" "), span))
    }

    fn lookup_entity(&self, name: &str, span: Span) -> ParseResult<usize> {
        self.symbols
            .lookup_entity(name)
            .ok_or_else(|| ParseError::UnknownEntity {
                name: name.to_string(),
                span,
            })
    }

    // === Token helpers ===

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&self.eof)
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek().kind.clone()
    }

    fn current_span(&self) -> Span {
        self.peek().span
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Eof)
    }

    fn check(&self, kind: TokenKind) -> bool {
        std::mem::discriminant(&self.peek_kind()) == std::mem::discriminant(&kind)
    }

    fn match_token(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn advance(&mut self) {
        if !self.is_at_end() {
            self.pos += 1;
        }
    }

    fn expect(&mut self, kind: TokenKind) -> ParseResult<()> {
        if self.check(kind.clone()) {
            self.advance();
            Ok(())
        } else {
            Err(ParseError::UnexpectedToken {
                expected: kind.to_string(),
                found: self.peek_kind().to_string(),
                span: self.current_span(),
            })
        }
    }
}

/// Parse one expression line.
pub fn parse_expr(
    text: &str,
    line: u32,
    column: u32,
    symbols: &SymbolTable,
    scope: &Scope,
) -> ParseResult<Expr> {
    Parser::new(text, line, column, symbols, scope)?.parse_expression()
}

/// Column of the byte offset `offset` in `text`, given the column `text` starts at.
pub(crate) fn column_at(text: &str, column: u32, offset: usize) -> u32 {
    column + text[..offset].chars().count() as u32
}

#[derive(Clone, Copy)]
enum EntityCommand {
    Add,
    Remove,
    Replace,
}

/// Parse one effect line other than `NewVal`.
///
/// `<Entity> remove:`, `<Entity> add:` and `<Entity> replace:` take priority
/// over plain assignment.
pub fn parse_statement(
    text: &str,
    line: u32,
    column: u32,
    symbols: &SymbolTable,
    scope: &Scope,
) -> ParseResult<Update> {
    if let Some(colon) = text.find(':') {
        let head = text[..colon].trim_end();
        if let Some((prefix, command)) = split_command(head) {
            if let Some(entity) = symbols.lookup_entity(prefix) {
                let tail = &text[colon + 1..];
                let tail_column = column_at(text, column, colon + 1);
                return parse_entity_command(
                    entity,
                    prefix,
                    command,
                    tail,
                    line,
                    tail_column,
                    symbols,
                    scope,
                );
            }
            if symbols.lookup_variable(head).is_none() {
                return Err(ParseError::UnknownEntity {
                    name: prefix.to_string(),
                    span: Span::new(0, prefix.len(), line, column),
                });
            }
        }
    }

    Parser::new(text, line, column, symbols, scope)?.parse_assignment()
}

fn split_command(head: &str) -> Option<(&str, EntityCommand)> {
    let (prefix, word) = head.rsplit_once(char::is_whitespace)?;
    let command = match word {
        "remove" => EntityCommand::Remove,
        "add" => EntityCommand::Add,
        "replace" => EntityCommand::Replace,
        _ => return None,
    };
    Some((prefix.trim_end(), command))
}

#[allow(clippy::too_many_arguments)]
fn parse_entity_command(
    entity: usize,
    name: &str,
    command: EntityCommand,
    tail: &str,
    line: u32,
    column: u32,
    symbols: &SymbolTable,
    scope: &Scope,
) -> ParseResult<Update> {
    let span = Span::new(0, tail.len(), line, column);
    let collection = symbols.collection_of(entity).ok_or_else(|| {
        ParseError::syntax(
            format!("entity '{}' has no item collection", name),
            span,
        )
    })?;
    let expected = symbols.field_count(collection);
    let check_fields = |fields: &[Expr]| {
        if fields.len() == expected {
            Ok(())
        } else {
            Err(ParseError::syntax(
                format!(
                    "expected {} field values for '{}', found {}",
                    expected,
                    name,
                    fields.len()
                ),
                span,
            ))
        }
    };

    let mut parser = Parser::new(tail, line, column, symbols, scope)?;
    let update = match command {
        EntityCommand::Remove => {
            let id = parser.parse_expr()?;
            Update::RemoveEntity {
                entity,
                collection,
                id,
            }
        }
        EntityCommand::Add => {
            let fields = parser.parse_field_list()?;
            check_fields(&fields)?;
            Update::AddEntity {
                entity,
                collection,
                fields,
            }
        }
        EntityCommand::Replace => {
            let id = parser.parse_expr()?;
            let fields = parser.parse_field_list()?;
            check_fields(&fields)?;
            Update::ReplaceEntity {
                entity,
                collection,
                id,
                fields,
            }
        }
    };
    parser.expect_end()?;
    Ok(update)
}
