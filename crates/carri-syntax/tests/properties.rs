//! Property tests for the lexer and expression parser.

use carri_syntax::{parse_expr, pretty_print_expr, Lexer, Scope, SymbolTable, TokenKind};
use proptest::prelude::*;

fn arithmetic() -> impl Strategy<Value = String> {
    let leaf = (0i64..1000).prop_map(|n| n.to_string());
    leaf.prop_recursive(4, 32, 2, |inner| {
        (
            inner.clone(),
            prop::sample::select(vec!["+", "-", "*", "/", "<", "=", "and", "or"]),
            inner,
        )
            .prop_map(|(l, op, r)| format!("({} {} {})", l, op, r))
    })
}

proptest! {
    #[test]
    fn lexer_never_panics(source in "\\PC{0,64}") {
        let _ = Lexer::new(&source).tokenize();
    }

    #[test]
    fn lexer_always_ends_with_eof(source in "[a-z0-9 +*/()<>=?@:,-]{0,64}") {
        // Long digit runs overflow i64 and are rejected.
        let result = Lexer::new(&source).tokenize();
        prop_assume!(result.is_ok());
        let tokens = result.unwrap();
        prop_assert_eq!(&tokens.last().unwrap().kind, &TokenKind::Eof);
        for pair in tokens.windows(2) {
            prop_assert!(pair[0].span.end <= pair[1].span.start);
        }
    }

    #[test]
    fn printed_expressions_parse_to_the_same_tree(source in arithmetic()) {
        let symbols = SymbolTable::new();
        let scope = Scope::new();
        let expr = parse_expr(&source, 1, 1, &symbols, &scope).unwrap();
        let printed = pretty_print_expr(&expr);
        let again = parse_expr(&printed, 1, 1, &symbols, &scope).unwrap();
        prop_assert_eq!(expr, again);
    }
}
