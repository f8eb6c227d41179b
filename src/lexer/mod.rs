use std::fs;
use std::path::Path;

use crate::error::CompileError;

pub mod token;

#[cfg(test)]
mod tests;

pub use token::{Token, TokenKind};

const EOF: u8 = 0;

/// Scanner state over one source buffer.
struct Lexer<'s> {
    buffer: &'s [u8],
    line: usize,
    pos: usize,
    read_pos: usize,
    ch: u8,
}

impl<'s> Lexer<'s> {
    fn new(buffer: &'s [u8]) -> Self {
        let mut l = Self {
            buffer,
            line: 1,
            pos: 0,
            read_pos: 0,
            ch: EOF,
        };
        l.read_char();
        l
    }

    fn peek_char(&self) -> u8 {
        if self.read_pos >= self.buffer.len() {
            EOF
        } else {
            self.buffer[self.read_pos]
        }
    }

    fn read_char(&mut self) -> u8 {
        if self.ch == b'\n' {
            self.line += 1;
        }
        self.ch = self.peek_char();
        self.pos = self.read_pos;
        self.read_pos += 1;
        self.ch
    }

    fn skip_whitespace(&mut self) {
        while self.ch.is_ascii_whitespace() {
            self.read_char();
        }
    }

    fn is_ident_char(c: u8) -> bool {
        c.is_ascii_alphanumeric() || c == b'_'
    }

    fn read_ident_body(&mut self) -> String {
        let start = self.pos;
        while Self::is_ident_char(self.ch) {
            self.read_char();
        }
        String::from_utf8_lossy(&self.buffer[start..self.pos]).into_owned()
    }

    fn read_int(&mut self) -> i64 {
        let start = self.pos;
        while self.ch.is_ascii_digit() {
            self.read_char();
        }
        std::str::from_utf8(&self.buffer[start..self.pos])
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0)
    }

    fn keyword_or_identifier(&self, value: String) -> Token {
        let kind = match value.as_str() {
            // Types
            "int" => TokenKind::TypeInt,
            "char" => TokenKind::TypeChar,
            // Control flow
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "then" => TokenKind::Then,
            "match" => TokenKind::Match,
            "goto" => TokenKind::Goto,
            // Loops
            "loop" => TokenKind::Loop,
            "while" => TokenKind::While,
            "dowhile" => TokenKind::DoWhile,
            "in" => TokenKind::In,
            "for" => TokenKind::For,
            "continue" => TokenKind::Continue,
            "break" => TokenKind::Break,
            // Functions
            "fn" => TokenKind::Fn,
            "return" => TokenKind::Return,
            _ => TokenKind::Identifier(value),
        };
        Token::new(kind, self.line)
    }

    fn read_escape(&mut self, quote: u8) -> Result<char, u8> {
        self.read_char();
        match self.ch {
            b'n' => Ok('\n'),
            b't' => Ok('\t'),
            b'r' => Ok('\r'),
            b'\\' => Ok('\\'),
            b'0' => Ok('\0'),
            c if c == quote => Ok(quote as char),
            other => Err(other),
        }
    }

    fn next_token(&mut self) -> Token {
        // Comments restart the scan from the top.
        loop {
            self.skip_whitespace();

            match self.ch {
                EOF => {
                    self.read_char();
                    return Token::new(TokenKind::End, self.line);
                }

                b'0'..=b'9' => {
                    let value = self.read_int();
                    return Token::new(TokenKind::IntLiteral(value), self.line);
                }

                b'\'' => {
                    self.read_char();
                    let value = if self.ch == b'\\' {
                        match self.read_escape(b'\'') {
                            Ok(c) => c,
                            Err(other) => {
                                return Token::new(
                                    TokenKind::Invalid((other as char).to_string()),
                                    self.line,
                                );
                            }
                        }
                    } else {
                        self.ch as char
                    };
                    self.read_char();
                    if self.ch != b'\'' {
                        return Token::new(
                            TokenKind::Invalid((self.ch as char).to_string()),
                            self.line,
                        );
                    }
                    self.read_char();
                    return Token::new(TokenKind::CharLiteral(value), self.line);
                }

                b'"' => {
                    self.read_char();
                    let mut value = String::new();
                    while self.ch != b'"' && self.ch != EOF {
                        if self.ch == b'\\' {
                            match self.read_escape(b'"') {
                                Ok(c) => value.push(c),
                                Err(other) => {
                                    return Token::new(
                                        TokenKind::Invalid((other as char).to_string()),
                                        self.line,
                                    );
                                }
                            }
                        } else {
                            value.push(self.ch as char);
                        }
                        self.read_char();
                    }
                    if self.ch != b'"' {
                        // Unterminated string literal
                        return Token::new(TokenKind::Invalid(value), self.line);
                    }
                    self.read_char();
                    return Token::new(TokenKind::StringLiteral(value), self.line);
                }

                // Delimiters
                b'(' => return self.one_char(TokenKind::LParen),
                b')' => return self.one_char(TokenKind::RParen),
                b'{' => return self.one_char(TokenKind::LBrace),
                b'}' => return self.one_char(TokenKind::RBrace),
                b'[' => return self.one_char(TokenKind::LSqBr),
                b']' => return self.one_char(TokenKind::RSqBr),
                b',' => return self.one_char(TokenKind::Comma),

                // Simple arithmetic operators
                b'+' => return self.one_char(TokenKind::Add),
                b'/' => return self.one_char(TokenKind::Divide),
                b'%' => return self.one_char(TokenKind::Modulo),

                // Relational operators
                b'!' => {
                    self.read_char();
                    if self.ch == b'=' {
                        return self.one_char(TokenKind::NotEqual);
                    }
                    return Token::new(TokenKind::Invalid("!".to_string()), self.line);
                }
                b'<' => {
                    self.read_char();
                    if self.ch == b'=' {
                        return self.one_char(TokenKind::LessThanOrEqual);
                    }
                    return Token::new(TokenKind::LessThan, self.line);
                }
                b'>' => {
                    self.read_char();
                    if self.ch == b'=' {
                        return self.one_char(TokenKind::GreaterThanOrEqual);
                    }
                    return Token::new(TokenKind::GreaterThan, self.line);
                }

                b'=' => {
                    self.read_char();
                    if self.ch == b'=' {
                        return self.one_char(TokenKind::IsEqual);
                    } else if self.ch == b'>' {
                        return self.one_char(TokenKind::DArrow);
                    }
                    return Token::new(TokenKind::Assign, self.line);
                }

                b'-' => {
                    self.read_char();
                    if self.ch == b'-' {
                        // Line comment, runs to the newline
                        while self.ch != b'\n' && self.ch != EOF {
                            self.read_char();
                        }
                        continue;
                    } else if self.ch == b'*' {
                        // Block comment, terminated by *-
                        self.read_char();
                        loop {
                            match self.ch {
                                EOF => break,
                                b'*' => {
                                    self.read_char();
                                    if self.ch == b'-' {
                                        self.read_char();
                                        break;
                                    }
                                }
                                _ => {
                                    self.read_char();
                                }
                            }
                        }
                        continue;
                    } else if self.ch.is_ascii_digit() {
                        // A '-' glued to digits is part of the literal
                        let value = self.read_int();
                        return Token::new(TokenKind::IntLiteral(-value), self.line);
                    } else if Self::is_ident_char(self.ch) {
                        let directive = self.read_ident_body();
                        if directive == "include" {
                            return Token::new(TokenKind::PdirInclude, self.line);
                        }
                        return Token::new(TokenKind::Invalid(format!("-{}", directive)), self.line);
                    }
                    return Token::new(TokenKind::Subtract, self.line);
                }

                b'*' => {
                    self.read_char();
                    if Self::is_ident_char(self.ch) {
                        let name = self.read_ident_body();
                        return Token::new(TokenKind::Pointer(name), self.line);
                    }
                    return Token::new(TokenKind::Multiply, self.line);
                }

                b'&' => {
                    self.read_char();
                    if Self::is_ident_char(self.ch) {
                        let name = self.read_ident_body();
                        return Token::new(TokenKind::AddressOf(name), self.line);
                    }
                    return Token::new(TokenKind::Invalid("&".to_string()), self.line);
                }

                b':' => {
                    self.read_char();
                    if Self::is_ident_char(self.ch) {
                        let name = self.read_ident_body();
                        return Token::new(TokenKind::Label(name), self.line);
                    }
                    return Token::new(TokenKind::Colon, self.line);
                }

                b'.' => {
                    self.read_char();
                    if self.ch == b'.' {
                        self.read_char();
                        if self.ch == b'.' {
                            return self.one_char(TokenKind::Ellipsis);
                        }
                    }
                    return Token::new(TokenKind::Invalid(".".to_string()), self.line);
                }

                b'_' => {
                    if Self::is_ident_char(self.peek_char()) {
                        let value = self.read_ident_body();
                        return self.keyword_or_identifier(value);
                    }
                    return self.one_char(TokenKind::Underscore);
                }

                c if c.is_ascii_alphabetic() => {
                    let value = self.read_ident_body();
                    return self.keyword_or_identifier(value);
                }

                other => {
                    self.read_char();
                    return Token::new(
                        TokenKind::Invalid((other as char).to_string()),
                        self.line,
                    );
                }
            }
        }
    }

    fn one_char(&mut self, kind: TokenKind) -> Token {
        self.read_char();
        Token::new(kind, self.line)
    }
}

/// Tokenize a source buffer into `tokens`, ending with an `End` sentinel.
///
/// `-include "path"` directives are expanded in place: the referenced file is
/// read relative to `include_dir`, lexed recursively into the same stream,
/// and the included stream's trailing `End` dropped. A failure to read an
/// included file is fatal.
pub fn tokenize(
    buffer: &str,
    tokens: &mut Vec<Token>,
    include_dir: &Path,
) -> Result<(), CompileError> {
    let mut lexer = Lexer::new(buffer.as_bytes());

    loop {
        let tok = lexer.next_token();

        if tok.kind == TokenKind::PdirInclude {
            let path_token = lexer.next_token();
            let relative = match path_token.kind {
                TokenKind::StringLiteral(s) => s,
                _ => {
                    tokens.push(Token::new(
                        TokenKind::Invalid("-include".to_string()),
                        path_token.line,
                    ));
                    continue;
                }
            };
            let full_path = include_dir.join(&relative);
            let included = fs::read_to_string(&full_path).map_err(|source| CompileError::Io {
                path: full_path.clone(),
                source,
            })?;
            tokenize(&included, tokens, include_dir)?;
            tokens.pop();
            continue;
        }

        let is_end = tok.kind == TokenKind::End;
        tokens.push(tok);
        if is_end {
            break;
        }
    }

    Ok(())
}
