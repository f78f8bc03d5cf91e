//! Lexer, parser, and AST for the CARRI logistics domain language.

pub mod ast;
pub mod document;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod pretty;
pub mod statement;
pub mod symbols;
pub mod token;

pub use ast::*;
pub use document::{parse_domain, parse_problem};
pub use error::{LoadError, LoadResult, ParseError, ParseResult};
pub use lexer::Lexer;
pub use parser::{parse_expr, parse_statement, Parser};
pub use pretty::{pretty_print_cost, pretty_print_expr, pretty_print_updates};
pub use statement::{parse_cost, parse_updates, scan_blocks, Block, SourceLine};
pub use symbols::{Scope, SlotKind, SymbolTable};
pub use token::{Span, Token, TokenKind};
