//! Effect blocks: line structuring and update parsing.
//!
//! Effect sections are first grouped into [`Block`]s by a line scanner
//! (`Case`/`Else`/`End`, `All`, `Repeat`), then each block is parsed into
//! [`Update`]s against a parameter [`Scope`].

use crate::ast::{CostExpr, Update};
use crate::error::{ParseError, ParseResult};
use crate::parser::{column_at, parse_expr, parse_statement};
use crate::symbols::{Scope, SlotKind, SymbolTable};
use crate::token::{Span, TokenKind};

/// One non-empty source line with comments stripped.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceLine {
    pub text: String,
    /// Line number in the file (1-indexed).
    pub line: u32,
    /// Column the trimmed text starts at (1-indexed).
    pub column: u32,
}

impl SourceLine {
    pub fn new(text: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            text: text.into(),
            line,
            column,
        }
    }

    pub fn span(&self) -> Span {
        Span::new(0, self.text.len(), self.line, self.column)
    }

    /// The trimmed text between byte offsets `start` and `end`.
    pub fn slice(&self, start: usize, end: usize) -> SourceLine {
        let raw = &self.text[start..end];
        let lead = raw.len() - raw.trim_start().len();
        SourceLine {
            text: raw.trim().to_string(),
            line: self.line,
            column: column_at(&self.text, self.column, start + lead),
        }
    }

    /// The trimmed text after byte offset `start`.
    pub fn tail(&self, start: usize) -> SourceLine {
        self.slice(start, self.text.len())
    }
}

/// A structured effect line.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Line(SourceLine),
    Case {
        condition: SourceLine,
        then_blocks: Vec<Block>,
        else_blocks: Vec<Block>,
    },
    All {
        /// `<param> - <Entity>[(<filter>)]`, without the outer parentheses.
        header: SourceLine,
        body: Vec<Block>,
    },
    Repeat {
        condition: SourceLine,
        body: Vec<Block>,
    },
}

enum Terminator {
    End,
    Else,
    Eof,
}

/// Group effect lines into nested blocks.
pub fn scan_blocks(lines: &[SourceLine]) -> ParseResult<Vec<Block>> {
    let mut pos = 0;
    let (blocks, _) = scan_until(lines, &mut pos, None)?;
    Ok(blocks)
}

fn scan_until(
    lines: &[SourceLine],
    pos: &mut usize,
    opener: Option<&SourceLine>,
) -> ParseResult<(Vec<Block>, Terminator)> {
    let mut blocks = Vec::new();
    while let Some(line) = lines.get(*pos) {
        *pos += 1;
        let text = line.text.as_str();

        if text == "End" || text == "Else:" || text == "Else" {
            if opener.is_none() {
                return Err(ParseError::syntax(
                    format!("'{}' without an open block", text),
                    line.span(),
                ));
            }
            let terminator = if text == "End" {
                Terminator::End
            } else {
                Terminator::Else
            };
            return Ok((blocks, terminator));
        }

        if let Some(condition) = block_header(line, "Case")? {
            let (then_blocks, terminator) = scan_until(lines, pos, Some(line))?;
            let else_blocks = match terminator {
                Terminator::Else => {
                    let (else_blocks, terminator) = scan_until(lines, pos, Some(line))?;
                    if let Terminator::Else = terminator {
                        return Err(ParseError::syntax("duplicate 'Else'", line.span()));
                    }
                    else_blocks
                }
                _ => Vec::new(),
            };
            blocks.push(Block::Case {
                condition,
                then_blocks,
                else_blocks,
            });
            continue;
        }

        if let Some(header) = block_header(line, "All")? {
            let header = strip_parens(&header)?;
            let body = scan_body(lines, pos, line)?;
            blocks.push(Block::All { header, body });
            continue;
        }

        if let Some(condition) = block_header(line, "Repeat")? {
            let body = scan_body(lines, pos, line)?;
            blocks.push(Block::Repeat { condition, body });
            continue;
        }

        blocks.push(Block::Line(line.clone()));
    }

    match opener {
        Some(open) => Err(ParseError::syntax(
            "unterminated block, expected 'End'",
            open.span(),
        )),
        None => Ok((blocks, Terminator::Eof)),
    }
}

fn scan_body(lines: &[SourceLine], pos: &mut usize, opener: &SourceLine) -> ParseResult<Vec<Block>> {
    let (body, terminator) = scan_until(lines, pos, Some(opener))?;
    match terminator {
        Terminator::Else => Err(ParseError::syntax(
            "'Else' outside of a 'Case' block",
            opener.span(),
        )),
        _ => Ok(body),
    }
}

/// `<keyword> <rest>:` returns `<rest>`.
fn block_header(line: &SourceLine, keyword: &str) -> ParseResult<Option<SourceLine>> {
    let text = line.text.as_str();
    let Some(rest) = text.strip_prefix(keyword) else {
        return Ok(None);
    };
    if !rest.starts_with(|c: char| c.is_whitespace() || c == '(') {
        return Ok(None);
    }
    if !text.ends_with(':') {
        return Err(ParseError::syntax(
            format!("expected ':' at the end of the '{}' header", keyword),
            line.span(),
        ));
    }
    Ok(Some(line.slice(keyword.len(), text.len() - 1)))
}

fn strip_parens(line: &SourceLine) -> ParseResult<SourceLine> {
    let text = line.text.as_str();
    if text.starts_with('(') && text.ends_with(')') && text.len() >= 2 {
        Ok(line.slice(1, text.len() - 1))
    } else {
        Err(ParseError::syntax(
            "expected a parenthesized header",
            line.span(),
        ))
    }
}

/// Check that `name` can name a parameter or local.
pub fn check_identifier(name: &str, span: Span) -> ParseResult<()> {
    let valid = name
        .chars()
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_alphanumeric() || c == '_')
        && TokenKind::keyword(name).is_none();
    if valid {
        Ok(())
    } else {
        Err(ParseError::syntax(
            format!("'{}' is not a valid parameter name", name),
            span,
        ))
    }
}

/// Parse blocks into updates.
///
/// Returns the updates together with the scope in effect after the last
/// line, which includes every `NewVal` local introduced at this level.
pub fn parse_updates(
    blocks: &[Block],
    symbols: &SymbolTable,
    scope: &Scope,
) -> ParseResult<(Vec<Update>, Scope)> {
    let mut updates = Vec::new();

    for (i, block) in blocks.iter().enumerate() {
        match block {
            Block::Line(line) => {
                if let Some((name, value)) = new_val(line)? {
                    let value = parse_expr(&value.text, value.line, value.column, symbols, scope)?;
                    let inner = scope.extend(name.clone(), SlotKind::Local);
                    let slot = inner.len() - 1;
                    // The rest of the block is the body of the binding.
                    let (body, scope) = parse_updates(&blocks[i + 1..], symbols, &inner)?;
                    updates.push(Update::BindParameter {
                        slot,
                        name,
                        value,
                        body,
                    });
                    return Ok((updates, scope));
                }
                updates.push(parse_statement(
                    &line.text,
                    line.line,
                    line.column,
                    symbols,
                    scope,
                )?);
            }
            Block::Case {
                condition,
                then_blocks,
                else_blocks,
            } => {
                let condition = parse_expr(
                    &condition.text,
                    condition.line,
                    condition.column,
                    symbols,
                    scope,
                )?;
                let (then_branch, _) = parse_updates(then_blocks, symbols, scope)?;
                let (else_branch, _) = parse_updates(else_blocks, symbols, scope)?;
                updates.push(Update::Conditional {
                    condition,
                    then_branch,
                    else_branch,
                });
            }
            Block::All { header, body } => {
                updates.push(parse_for_all(header, body, symbols, scope)?);
            }
            Block::Repeat { condition, body } => {
                let condition = parse_expr(
                    &condition.text,
                    condition.line,
                    condition.column,
                    symbols,
                    scope,
                )?;
                let (body, _) = parse_updates(body, symbols, scope)?;
                updates.push(Update::RepeatWhile { condition, body });
            }
        }
    }

    Ok((updates, scope.clone()))
}

/// `NewVal <name>: <expr>` returns the name and the expression text.
fn new_val(line: &SourceLine) -> ParseResult<Option<(String, SourceLine)>> {
    let text = line.text.as_str();
    let Some(rest) = text.strip_prefix("NewVal") else {
        return Ok(None);
    };
    if !rest.starts_with(char::is_whitespace) {
        return Ok(None);
    }
    let colon = text.find(':').ok_or_else(|| {
        ParseError::syntax("expected ':' after the NewVal name", line.span())
    })?;
    let name = line.slice("NewVal".len(), colon);
    check_identifier(&name.text, name.span())?;
    Ok(Some((name.text, line.tail(colon + 1))))
}

fn parse_for_all(
    header: &SourceLine,
    body: &[Block],
    symbols: &SymbolTable,
    scope: &Scope,
) -> ParseResult<Update> {
    let text = header.text.as_str();
    let dash = text.find('-').ok_or_else(|| {
        ParseError::syntax("expected '<param> - <Entity>' in 'All' header", header.span())
    })?;
    let name = header.slice(0, dash);
    check_identifier(&name.text, name.span())?;

    let (entity_part, filter_part) = match text[dash..].find('(') {
        Some(paren) => (
            header.slice(dash + 1, dash + paren),
            Some(header.tail(dash + paren)),
        ),
        None => (header.tail(dash + 1), None),
    };
    let entity = symbols
        .lookup_entity(&entity_part.text)
        .ok_or_else(|| ParseError::UnknownEntity {
            name: entity_part.text.clone(),
            span: entity_part.span(),
        })?;

    let inner = scope.extend(name.text.clone(), SlotKind::Entity(entity));
    let filter = filter_part
        .map(|f| parse_expr(&f.text, f.line, f.column, symbols, &inner))
        .transpose()?;
    let (body, _) = parse_updates(body, symbols, &inner)?;

    Ok(Update::ForAllEntities {
        slot: inner.len() - 1,
        name: name.text,
        entity,
        filter,
        body,
    })
}

/// Parse a cost section: updates followed by the numeric cost expression.
pub fn parse_cost(
    blocks: &[Block],
    symbols: &SymbolTable,
    scope: &Scope,
) -> ParseResult<CostExpr> {
    let Some((last, preceding)) = blocks.split_last() else {
        return Ok(CostExpr::zero());
    };
    let Block::Line(value) = last else {
        return Err(ParseError::syntax(
            "cost section must end with a numeric expression",
            first_line(last).span(),
        ));
    };
    let (updates, scope) = parse_updates(preceding, symbols, scope)?;
    let value = parse_expr(&value.text, value.line, value.column, symbols, &scope)?;
    Ok(CostExpr { updates, value })
}

fn first_line(block: &Block) -> &SourceLine {
    match block {
        Block::Line(line) => line,
        Block::Case { condition, .. } | Block::Repeat { condition, .. } => condition,
        Block::All { header, .. } => header,
    }
}
