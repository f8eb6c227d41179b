use std::path::Path;

use super::{tokenize, Token, TokenKind};

fn lex(source: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    tokenize(source, &mut tokens, Path::new(".")).unwrap();
    tokens
}

fn kinds(source: &str) -> Vec<TokenKind> {
    lex(source).into_iter().map(|t| t.kind).collect()
}

// ========================================
// Basic Lexer Tests
// ========================================

#[test]
fn test_lexer_simple_declaration() {
    let tokens = kinds("int x = 42");
    assert_eq!(
        tokens,
        vec![
            TokenKind::TypeInt,
            TokenKind::Identifier("x".to_string()),
            TokenKind::Assign,
            TokenKind::IntLiteral(42),
            TokenKind::End,
        ]
    );
}

#[test]
fn test_lexer_keywords() {
    let tokens = kinds("goto if else then match loop while dowhile for in continue break fn return int char");
    assert_eq!(
        tokens,
        vec![
            TokenKind::Goto,
            TokenKind::If,
            TokenKind::Else,
            TokenKind::Then,
            TokenKind::Match,
            TokenKind::Loop,
            TokenKind::While,
            TokenKind::DoWhile,
            TokenKind::For,
            TokenKind::In,
            TokenKind::Continue,
            TokenKind::Break,
            TokenKind::Fn,
            TokenKind::Return,
            TokenKind::TypeInt,
            TokenKind::TypeChar,
            TokenKind::End,
        ]
    );
}

#[test]
fn test_lexer_negative_literal() {
    // '-' glued to digits is part of the literal; spaced it is an operator
    assert_eq!(
        kinds("x = -5"),
        vec![
            TokenKind::Identifier("x".to_string()),
            TokenKind::Assign,
            TokenKind::IntLiteral(-5),
            TokenKind::End,
        ]
    );
    assert_eq!(
        kinds("a - 5"),
        vec![
            TokenKind::Identifier("a".to_string()),
            TokenKind::Subtract,
            TokenKind::IntLiteral(5),
            TokenKind::End,
        ]
    );
}

#[test]
fn test_lexer_operators_maximal_munch() {
    assert_eq!(
        kinds("= == => < <= > >= !="),
        vec![
            TokenKind::Assign,
            TokenKind::IsEqual,
            TokenKind::DArrow,
            TokenKind::LessThan,
            TokenKind::LessThanOrEqual,
            TokenKind::GreaterThan,
            TokenKind::GreaterThanOrEqual,
            TokenKind::NotEqual,
            TokenKind::End,
        ]
    );
}

#[test]
fn test_lexer_pointer_vs_multiply() {
    assert_eq!(
        kinds("a * b"),
        vec![
            TokenKind::Identifier("a".to_string()),
            TokenKind::Multiply,
            TokenKind::Identifier("b".to_string()),
            TokenKind::End,
        ]
    );
    assert_eq!(
        kinds("*ptr"),
        vec![TokenKind::Pointer("ptr".to_string()), TokenKind::End]
    );
}

#[test]
fn test_lexer_label_vs_colon() {
    assert_eq!(
        kinds(":top"),
        vec![TokenKind::Label("top".to_string()), TokenKind::End]
    );
    assert_eq!(kinds(": int"), vec![TokenKind::Colon, TokenKind::TypeInt, TokenKind::End]);
}

#[test]
fn test_lexer_address_of() {
    assert_eq!(
        kinds("&var"),
        vec![TokenKind::AddressOf("var".to_string()), TokenKind::End]
    );
}

#[test]
fn test_lexer_ellipsis_and_underscore() {
    assert_eq!(
        kinds("1...10 _"),
        vec![
            TokenKind::IntLiteral(1),
            TokenKind::Ellipsis,
            TokenKind::IntLiteral(10),
            TokenKind::Underscore,
            TokenKind::End,
        ]
    );
    // A leading underscore with more identifier characters is an identifier
    assert_eq!(
        kinds("_tmp"),
        vec![TokenKind::Identifier("_tmp".to_string()), TokenKind::End]
    );
}

// ========================================
// Literal Tests
// ========================================

#[test]
fn test_lexer_char_literal_escapes() {
    assert_eq!(
        kinds(r"'a' '\n' '\t' '\\' '\'' '\0'"),
        vec![
            TokenKind::CharLiteral('a'),
            TokenKind::CharLiteral('\n'),
            TokenKind::CharLiteral('\t'),
            TokenKind::CharLiteral('\\'),
            TokenKind::CharLiteral('\''),
            TokenKind::CharLiteral('\0'),
            TokenKind::End,
        ]
    );
}

#[test]
fn test_lexer_string_literal() {
    assert_eq!(
        kinds(r#""hello\nworld""#),
        vec![
            TokenKind::StringLiteral("hello\nworld".to_string()),
            TokenKind::End,
        ]
    );
    assert_eq!(
        kinds(r#""""#),
        vec![TokenKind::StringLiteral(String::new()), TokenKind::End]
    );
}

#[test]
fn test_lexer_unterminated_string_is_invalid() {
    let tokens = lex("\"oops");
    assert!(matches!(tokens[0].kind, TokenKind::Invalid(_)));
}

#[test]
fn test_lexer_invalid_escape_is_invalid() {
    let tokens = lex(r"'\q'");
    assert!(matches!(tokens[0].kind, TokenKind::Invalid(_)));
}

#[test]
fn test_lexer_unknown_character_is_invalid() {
    let tokens = lex("int x @");
    assert_eq!(tokens[2].kind, TokenKind::Invalid("@".to_string()));
}

// ========================================
// Comment Tests
// ========================================

#[test]
fn test_lexer_line_comment() {
    assert_eq!(
        kinds("int x -- the counter\nint y"),
        vec![
            TokenKind::TypeInt,
            TokenKind::Identifier("x".to_string()),
            TokenKind::TypeInt,
            TokenKind::Identifier("y".to_string()),
            TokenKind::End,
        ]
    );
}

#[test]
fn test_lexer_block_comment() {
    assert_eq!(
        kinds("int x -* a\nblock\ncomment *- int y"),
        vec![
            TokenKind::TypeInt,
            TokenKind::Identifier("x".to_string()),
            TokenKind::TypeInt,
            TokenKind::Identifier("y".to_string()),
            TokenKind::End,
        ]
    );
}

// ========================================
// Line Tracking Tests
// ========================================

#[test]
fn test_lexer_line_numbers() {
    let tokens = lex("int x\nint y\nint z");
    assert_eq!(tokens[0].line, 1);
    assert_eq!(tokens[2].line, 2);
    assert_eq!(tokens[4].line, 3);
}

#[test]
fn test_lexer_string_newline_advances_line() {
    let tokens = lex("\"a\nb\"\nint x");
    assert_eq!(tokens[1].kind, TokenKind::TypeInt);
    assert_eq!(tokens[1].line, 3);
}

// ========================================
// Round-trip Tests
// ========================================

#[test]
fn test_lexer_print_back_round_trip() {
    let source = r#"
        fn main(int argc, char *args) : int {
            int total = 0
            :again
            if total < 10 then goto again
            total[2] = 'x'
            puts("done\n")
            return total % 3
        }
    "#;
    let tokens = lex(source);
    let printed = tokens
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<String>>()
        .join(" ");
    let relexed = lex(&printed);

    let left: Vec<&TokenKind> = tokens.iter().map(|t| &t.kind).collect();
    let right: Vec<&TokenKind> = relexed.iter().map(|t| &t.kind).collect();
    assert_eq!(left, right);
}
