//! Pretty printer for CARRI expressions and effects.
//!
//! Output uses the surface syntax, so printed lines parse back under the
//! same scope.

use crate::ast::*;
use crate::symbols::SymbolTable;
use std::fmt;

/// Pretty print an expression to a string.
pub fn pretty_print_expr(expr: &Expr) -> String {
    let mut printer = PrettyPrinter::new(None);
    printer.print_expr(expr);
    printer.output
}

/// Pretty print effect lines, one per line, with block indentation.
pub fn pretty_print_updates(updates: &[Update], symbols: &SymbolTable) -> String {
    let mut printer = PrettyPrinter::new(Some(symbols));
    printer.print_updates(updates);
    printer.output
}

/// Pretty print a cost section.
pub fn pretty_print_cost(cost: &CostExpr, symbols: &SymbolTable) -> String {
    let mut printer = PrettyPrinter::new(Some(symbols));
    printer.print_updates(&cost.updates);
    printer.write_indent();
    printer.print_expr(&cost.value);
    printer.newline();
    printer.output
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&pretty_print_expr(self))
    }
}

struct PrettyPrinter<'a> {
    output: String,
    indent: usize,
    symbols: Option<&'a SymbolTable>,
}

impl<'a> PrettyPrinter<'a> {
    fn new(symbols: Option<&'a SymbolTable>) -> Self {
        Self {
            output: String::new(),
            indent: 0,
            symbols,
        }
    }

    fn write(&mut self, s: &str) {
        self.output.push_str(s);
    }

    fn newline(&mut self) {
        self.output.push('\n');
    }

    fn write_indent(&mut self) {
        for _ in 0..self.indent {
            self.output.push_str("  ");
        }
    }

    fn entity_name(&self, index: usize) -> String {
        match self.symbols {
            Some(symbols) => symbols.entity_name(index).to_string(),
            None => format!("#{}", index),
        }
    }

    // === Effects ===

    fn print_updates(&mut self, updates: &[Update]) {
        for update in updates {
            self.print_update(update);
        }
    }

    fn print_block(&mut self, body: &[Update]) {
        self.indent += 1;
        self.print_updates(body);
        self.indent -= 1;
    }

    fn print_update(&mut self, update: &Update) {
        self.write_indent();
        match update {
            Update::SetIndexed {
                name, index, value, ..
            } => {
                self.write(name);
                if *index != 0 {
                    self.write(&format!(" {}", index));
                }
                self.write(": ");
                self.print_expr(value);
            }
            Update::SetComputedIndex {
                name, index, value, ..
            } => {
                self.write(name);
                self.write(" ");
                self.print_index(index);
                self.write(": ");
                self.print_expr(value);
            }
            Update::SetLocal { name, value, .. } => {
                self.write(name);
                self.write(": ");
                self.print_expr(value);
            }
            Update::AddEntity { entity, fields, .. } => {
                let name = self.entity_name(*entity);
                self.write(&format!("{} add: ", name));
                self.print_field_list(fields);
            }
            Update::RemoveEntity { entity, id, .. } => {
                let name = self.entity_name(*entity);
                self.write(&format!("{} remove: ", name));
                self.print_expr(id);
            }
            Update::ReplaceEntity {
                entity, id, fields, ..
            } => {
                let name = self.entity_name(*entity);
                self.write(&format!("{} replace: ", name));
                self.print_primary(id);
                self.write(" ");
                self.print_field_list(fields);
            }
            Update::BindParameter {
                name, value, body, ..
            } => {
                self.write(&format!("NewVal {}: ", name));
                self.print_expr(value);
                self.newline();
                // The body continues the enclosing block.
                self.print_updates(body);
                return;
            }
            Update::Conditional {
                condition,
                then_branch,
                else_branch,
            } => {
                self.write("Case (");
                self.print_expr(condition);
                self.write("):");
                self.newline();
                self.print_block(then_branch);
                if !else_branch.is_empty() {
                    self.write_indent();
                    self.write("Else:");
                    self.newline();
                    self.print_block(else_branch);
                }
                self.write_indent();
                self.write("End");
            }
            Update::ForAllEntities {
                name,
                entity,
                filter,
                body,
                ..
            } => {
                let entity = self.entity_name(*entity);
                self.write(&format!("All ({} - {}", name, entity));
                if let Some(filter) = filter {
                    self.write(" (");
                    self.print_expr(filter);
                    self.write(")");
                }
                self.write("):");
                self.newline();
                self.print_block(body);
                self.write_indent();
                self.write("End");
            }
            Update::RepeatWhile { condition, body } => {
                self.write("Repeat (");
                self.print_expr(condition);
                self.write("):");
                self.newline();
                self.print_block(body);
                self.write_indent();
                self.write("End");
            }
        }
        self.newline();
    }

    fn print_field_list(&mut self, fields: &[Expr]) {
        self.write("(");
        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                self.write(", ");
            }
            self.print_expr(field);
        }
        self.write(")");
    }

    // === Expressions ===

    fn print_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Int(n) => self.write(&n.to_string()),
            Expr::Bool(b) => self.write(if *b { "true" } else { "false" }),
            Expr::SetLit(elements) => {
                self.write("(");
                for (i, e) in elements.iter().enumerate() {
                    if i > 0 {
                        self.write(", ");
                    }
                    self.print_expr(e);
                }
                self.write(")");
            }
            Expr::Param { name, .. } => self.write(name),
            Expr::Read { name, index, .. } => {
                self.write(name);
                if **index != Expr::Int(0) {
                    self.write(" ");
                    self.print_index(index);
                }
            }
            Expr::Exists { name, id, .. } => {
                self.write(&format!("{} exists ", name));
                self.print_primary(id);
            }
            Expr::Entity { name, .. } => {
                self.write("entity ");
                self.write(name);
            }
            Expr::Unary { op, operand } => {
                match op {
                    UnaryOp::Not => self.write("not "),
                    UnaryOp::Neg => self.write("-"),
                }
                let needs_parens = match (op, operand.as_ref()) {
                    (UnaryOp::Not, Expr::Binary { op, .. }) => {
                        op.precedence() < COMPARISON_PRECEDENCE
                    }
                    (UnaryOp::Neg, Expr::Binary { op, .. }) => *op != BinOp::Index,
                    _ => false,
                };
                self.print_maybe_parens(operand, needs_parens);
            }
            Expr::Binary {
                op: BinOp::Index,
                left,
                right,
            } => {
                let needs_parens = !matches!(
                    left.as_ref(),
                    Expr::Binary {
                        op: BinOp::Index,
                        ..
                    }
                ) && !is_atomic(left);
                self.print_maybe_parens(left, needs_parens);
                self.write(" @ ");
                self.print_primary(right);
            }
            Expr::Binary { op, left, right } => {
                let prec = op.precedence();
                let left_parens = binary_precedence(left).is_some_and(|p| p < prec);
                let right_parens = binary_precedence(right).is_some_and(|p| p <= prec);
                self.print_maybe_parens(left, left_parens);
                self.write(&format!(" {} ", op.symbol()));
                self.print_maybe_parens(right, right_parens);
            }
        }
    }

    /// Index after a variable name: bare for numbers and parameters.
    fn print_index(&mut self, index: &Expr) {
        match index {
            Expr::Int(n) if *n >= 0 => self.write(&n.to_string()),
            Expr::Param { name, .. } => self.write(name),
            other => self.print_maybe_parens(other, true),
        }
    }

    fn print_primary(&mut self, expr: &Expr) {
        let needs_parens = !is_atomic(expr);
        self.print_maybe_parens(expr, needs_parens);
    }

    fn print_maybe_parens(&mut self, expr: &Expr, parens: bool) {
        if parens {
            self.write("(");
            self.print_expr(expr);
            self.write(")");
        } else {
            self.print_expr(expr);
        }
    }
}

/// Binding power of an infix expression; `None` for everything that binds
/// at least as tightly as a postfix.
fn binary_precedence(expr: &Expr) -> Option<u8> {
    match expr {
        Expr::Binary { op, .. } if *op != BinOp::Index => Some(op.precedence()),
        // `not` extends over a whole comparison.
        Expr::Unary {
            op: UnaryOp::Not, ..
        } => Some(COMPARISON_PRECEDENCE),
        _ => None,
    }
}

fn is_atomic(expr: &Expr) -> bool {
    match expr {
        Expr::Int(n) => *n >= 0,
        Expr::Bool(_) | Expr::Param { .. } | Expr::SetLit(_) | Expr::Entity { .. } => true,
        Expr::Read { index, .. } => **index == Expr::Int(0),
        _ => false,
    }
}
