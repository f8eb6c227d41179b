use bumpalo::collections::Vec as BumpVec;
use bumpalo::Bump;

use crate::diag::Diagnostics;
use crate::lexer::token::{Token, TokenKind};
use crate::symbols::Type;

use super::node::{
    BinaryOp, CondBlock, ExprKind, ExprNode, FnBody, FnNode, InstrKind, InstrNode, LoopKind,
    LoopNode, MatchCase, MatchPattern, Param, RelNode, RelOp, TermKind, TermNode, VarDecl,
};
use super::Ast;

static END_TOKEN: Token = Token {
    kind: TokenKind::End,
    line: 0,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopStyle {
    Unconditional,
    While,
    DoWhile,
}

/// Recursive-descent parser over a token slice.
///
/// Nodes are allocated into the arena passed at construction; identifier
/// strings are copied into the same arena, so the resulting tree borrows
/// only from it. On a syntax error the parser reports, advances past the
/// offending token and keeps going, so every error in the file surfaces in
/// one run.
pub struct Parser<'a, 't> {
    tokens: &'t [Token],
    pos: usize,
    arena: &'a Bump,
    diag: &'t mut Diagnostics,
}

impl<'a, 't> Parser<'a, 't> {
    pub fn new(tokens: &'t [Token], arena: &'a Bump, diag: &'t mut Diagnostics) -> Self {
        Self {
            tokens,
            pos: 0,
            arena,
            diag,
        }
    }

    // ========== Navigation ==========

    fn current(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&END_TOKEN)
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.current().is(kind)
    }

    fn line(&self) -> usize {
        self.current().line
    }

    fn alloc_str(&self, s: &str) -> &'a str {
        self.arena.alloc_str(s)
    }

    /// Consume the expected token or report "expected X, got Y".
    fn expect(&mut self, kind: TokenKind, what: &str) -> bool {
        if self.current().is(&kind) {
            self.advance();
            true
        } else {
            let msg = format!("Expected {}, got '{}'", what, self.current());
            let line = self.line();
            self.diag.error_at(line, msg);
            false
        }
    }

    // ========== Entry point ==========

    pub fn parse_program(&mut self) -> Ast<'a> {
        let mut instrs = Vec::new();
        while !self.check(&TokenKind::End) {
            let before = self.pos;
            if let Some(instr) = self.parse_instr() {
                instrs.push(instr);
            }
            // Recovery: always make progress, even on a malformed instruction
            if self.pos == before {
                self.advance();
            }
        }
        Ast { instrs }
    }

    // ========== Instructions ==========

    fn parse_instr(&mut self) -> Option<InstrNode<'a>> {
        let line = self.line();
        match self.current().kind {
            TokenKind::TypeInt | TokenKind::TypeChar => self.parse_declare(),
            TokenKind::Identifier(_) | TokenKind::Pointer(_) => self.parse_assign(),
            TokenKind::If => self.parse_if(),
            TokenKind::Match => self.parse_match(),
            TokenKind::Goto => self.parse_goto(),
            TokenKind::Label(_) => self.parse_label(),
            TokenKind::Loop => self.parse_loop(LoopStyle::Unconditional),
            TokenKind::While => self.parse_loop(LoopStyle::While),
            TokenKind::DoWhile => self.parse_loop(LoopStyle::DoWhile),
            TokenKind::For => self.parse_for(),
            TokenKind::Break => {
                self.advance();
                Some(InstrNode {
                    kind: InstrKind::Break,
                    line,
                })
            }
            TokenKind::Continue => {
                self.advance();
                Some(InstrNode {
                    kind: InstrKind::Continue,
                    line,
                })
            }
            TokenKind::Fn => self.parse_fn(),
            TokenKind::Return => self.parse_ret(),
            _ => {
                let msg = format!("Unexpected token '{}'", self.current());
                self.diag.error_at(line, msg);
                self.advance();
                None
            }
        }
    }

    /// `int`/`char` lookahead: declaration, array declaration, or either of
    /// the initializing forms.
    fn parse_declare(&mut self) -> Option<InstrNode<'a>> {
        let line = self.line();
        let base = match self.current().kind {
            TokenKind::TypeInt => Type::Int,
            TokenKind::TypeChar => Type::Char,
            _ => unreachable!(),
        };
        self.advance();

        // `char *name` declares a string, `int *name` a pointer
        let tok = self.current().clone();
        let (ty, name) = match tok.kind {
            TokenKind::Identifier(n) => (base, self.alloc_str(&n)),
            TokenKind::Pointer(n) => {
                let ty = if base == Type::Char {
                    Type::String
                } else {
                    Type::Pointer
                };
                (ty, self.alloc_str(&n))
            }
            _ => {
                let msg = format!("Expected identifier after type, got '{}'", tok);
                self.diag.error_at(tok.line, msg);
                return None;
            }
        };
        self.advance();
        let var = VarDecl { ty, name, line };

        let mut size = None;
        if self.check(&TokenKind::LSqBr) {
            self.advance();
            size = Some(self.parse_expr());
            if !self.expect(TokenKind::RSqBr, "']'") {
                return None;
            }
        }

        if self.check(&TokenKind::Assign) {
            self.advance();
            if let Some(size) = size {
                return self.parse_initialize_array(var, size, line);
            }
            let expr = self.parse_expr();
            return Some(InstrNode {
                kind: InstrKind::Initialize { var, expr },
                line,
            });
        }

        match size {
            Some(size) => Some(InstrNode {
                kind: InstrKind::DeclareArray { var, size },
                line,
            }),
            None => Some(InstrNode {
                kind: InstrKind::Declare(var),
                line,
            }),
        }
    }

    fn parse_initialize_array(
        &mut self,
        var: VarDecl<'a>,
        size: &'a ExprNode<'a>,
        line: usize,
    ) -> Option<InstrNode<'a>> {
        if !self.expect(TokenKind::LBrace, "'{'") {
            return None;
        }

        let mut elements = BumpVec::new_in(self.arena);
        loop {
            if self.check(&TokenKind::RBrace) {
                break;
            }
            elements.push(*self.parse_expr());

            if self.check(&TokenKind::Comma) {
                self.advance();
            } else if self.check(&TokenKind::RBrace) {
                break;
            } else {
                let msg = format!("Expected '}}' or ',', got '{}'", self.current());
                let l = self.line();
                self.diag.error_at(l, msg);
                return None;
            }
        }
        self.advance();

        Some(InstrNode {
            kind: InstrKind::InitializeArray {
                var,
                size,
                elements: elements.into_bump_slice(),
            },
            line,
        })
    }

    /// Identifier or pointer lookahead: assignment, subscript assignment,
    /// or a bare call statement.
    fn parse_assign(&mut self) -> Option<InstrNode<'a>> {
        let tok = self.current().clone();
        let line = tok.line;
        let (name, is_pointer) = match tok.kind {
            TokenKind::Identifier(n) => (self.alloc_str(&n), false),
            TokenKind::Pointer(n) => (self.alloc_str(&n), true),
            _ => unreachable!(),
        };
        self.advance();

        if self.check(&TokenKind::LSqBr) {
            self.advance();
            let index = self.parse_expr();
            if !self.expect(TokenKind::RSqBr, "']'") {
                return None;
            }
            if !self.expect(TokenKind::Assign, "'='") {
                return None;
            }
            let expr = self.parse_expr();
            let array = VarDecl {
                ty: Type::Void,
                name,
                line,
            };
            return Some(InstrNode {
                kind: InstrKind::AssignToSubscript { array, index, expr },
                line,
            });
        }

        if self.check(&TokenKind::LParen) {
            self.advance();
            let args = self.parse_call_args()?;
            return Some(InstrNode {
                kind: InstrKind::Call { name, args },
                line,
            });
        }

        if !self.expect(TokenKind::Assign, "'='") {
            return None;
        }
        let expr = self.parse_expr();
        let ty = if is_pointer { Type::Pointer } else { Type::Void };
        let target = VarDecl { ty, name, line };
        Some(InstrNode {
            kind: InstrKind::Assign { target, expr },
            line,
        })
    }

    /// Arguments of a call; the opening parenthesis is already consumed.
    fn parse_call_args(&mut self) -> Option<&'a [ExprNode<'a>]> {
        let mut args = BumpVec::new_in(self.arena);
        while !self.check(&TokenKind::RParen) {
            if self.check(&TokenKind::End) {
                let msg = "Expected ')' after call arguments".to_string();
                let line = self.line();
                self.diag.error_at(line, msg);
                return None;
            }
            args.push(*self.parse_expr());
            if self.check(&TokenKind::Comma) {
                self.advance();
            }
        }
        self.advance();
        Some(args.into_bump_slice())
    }

    fn parse_if(&mut self) -> Option<InstrNode<'a>> {
        let line = self.line();
        self.advance();
        let rel = self.parse_rel();

        let then = self.parse_then_block()?;
        let mut else_ = None;
        if self.check(&TokenKind::Else) {
            self.advance();
            else_ = Some(self.parse_else_block()?);
        }
        Some(InstrNode {
            kind: InstrKind::If { rel, then, else_ },
            line,
        })
    }

    /// A single-statement branch uses the `then` keyword; braced bodies do
    /// not.
    fn parse_then_block(&mut self) -> Option<CondBlock<'a>> {
        if self.check(&TokenKind::Then) {
            self.advance();
            let instr = self.parse_instr()?;
            Some(CondBlock::Single(&*self.arena.alloc(instr)))
        } else if self.check(&TokenKind::LBrace) {
            self.advance();
            Some(CondBlock::Multi(self.parse_block_until_rbrace()))
        } else {
            let msg = format!("Expected 'then' or '{{', got '{}'", self.current());
            let line = self.line();
            self.diag.error_at(line, msg);
            None
        }
    }

    fn parse_else_block(&mut self) -> Option<CondBlock<'a>> {
        if self.check(&TokenKind::LBrace) {
            self.advance();
            Some(CondBlock::Multi(self.parse_block_until_rbrace()))
        } else {
            // `else if ...` and `else <instr>` both land here
            let instr = self.parse_instr()?;
            Some(CondBlock::Single(&*self.arena.alloc(instr)))
        }
    }

    fn parse_block_until_rbrace(&mut self) -> &'a [InstrNode<'a>] {
        let mut instrs = BumpVec::new_in(self.arena);
        while !self.check(&TokenKind::RBrace) && !self.check(&TokenKind::End) {
            let before = self.pos;
            if let Some(instr) = self.parse_instr() {
                instrs.push(instr);
            }
            if self.pos == before {
                self.advance();
            }
        }
        self.expect(TokenKind::RBrace, "'}'");
        instrs.into_bump_slice()
    }

    fn parse_match(&mut self) -> Option<InstrNode<'a>> {
        let line = self.line();
        self.advance();
        let expr = self.parse_expr();
        if !self.expect(TokenKind::LBrace, "'{'") {
            return None;
        }

        let mut cases = BumpVec::new_in(self.arena);
        while !self.check(&TokenKind::RBrace) && !self.check(&TokenKind::End) {
            let pattern = self.parse_match_pattern();
            if !self.expect(TokenKind::Colon, "':'") {
                return None;
            }
            let body = if self.check(&TokenKind::LBrace) {
                self.advance();
                CondBlock::Multi(self.parse_block_until_rbrace())
            } else {
                let instr = self.parse_instr()?;
                CondBlock::Single(&*self.arena.alloc(instr))
            };
            cases.push(MatchCase { pattern, body });
        }
        self.expect(TokenKind::RBrace, "'}'");

        Some(InstrNode {
            kind: InstrKind::Match {
                expr,
                cases: cases.into_bump_slice(),
            },
            line,
        })
    }

    fn parse_match_pattern(&mut self) -> MatchPattern<'a> {
        if self.check(&TokenKind::Underscore) {
            self.advance();
            return MatchPattern::Default;
        }

        let first = self.parse_expr();
        if self.check(&TokenKind::Ellipsis) {
            self.advance();
            let end = self.parse_expr();
            return MatchPattern::Range { start: first, end };
        }

        let mut values = BumpVec::new_in(self.arena);
        values.push(*first);
        while self.check(&TokenKind::Comma) {
            self.advance();
            values.push(*self.parse_expr());
        }
        MatchPattern::Values(values.into_bump_slice())
    }

    fn parse_goto(&mut self) -> Option<InstrNode<'a>> {
        let line = self.line();
        self.advance();
        let tok = self.current().clone();
        match tok.kind {
            TokenKind::Label(name) | TokenKind::Identifier(name) => {
                self.advance();
                Some(InstrNode {
                    kind: InstrKind::Goto(self.alloc_str(&name)),
                    line,
                })
            }
            _ => {
                let msg = format!("Expected label, got '{}'", tok);
                self.diag.error_at(tok.line, msg);
                None
            }
        }
    }

    fn parse_label(&mut self) -> Option<InstrNode<'a>> {
        let tok = self.current().clone();
        match tok.kind {
            TokenKind::Label(name) => {
                self.advance();
                Some(InstrNode {
                    kind: InstrKind::Label(self.alloc_str(&name)),
                    line: tok.line,
                })
            }
            _ => unreachable!(),
        }
    }

    fn parse_loop(&mut self, style: LoopStyle) -> Option<InstrNode<'a>> {
        let line = self.line();
        self.advance();

        let mut rel = None;
        if style == LoopStyle::While {
            rel = Some(self.parse_rel());
        }

        if !self.expect(TokenKind::LBrace, "'{'") {
            return None;
        }
        let body = self.parse_block_until_rbrace();

        let kind = match style {
            LoopStyle::Unconditional => LoopKind::Unconditional,
            LoopStyle::While => LoopKind::While(rel?),
            LoopStyle::DoWhile => LoopKind::DoWhile(self.parse_rel()),
        };
        Some(InstrNode {
            kind: InstrKind::Loop(LoopNode { kind, body }),
            line,
        })
    }

    fn parse_for(&mut self) -> Option<InstrNode<'a>> {
        let line = self.line();
        self.advance();

        let tok = self.current().clone();
        let iterator = match tok.kind {
            TokenKind::Identifier(n) => {
                self.advance();
                self.alloc_str(&n)
            }
            _ => {
                let msg = format!("Expected iterator name, got '{}'", tok);
                self.diag.error_at(tok.line, msg);
                return None;
            }
        };

        if !self.expect(TokenKind::In, "'in'") {
            return None;
        }
        let start = self.parse_expr();
        if !self.expect(TokenKind::Ellipsis, "'...'") {
            return None;
        }
        let end = self.parse_expr();

        if !self.expect(TokenKind::LBrace, "'{'") {
            return None;
        }
        let body = self.parse_block_until_rbrace();

        Some(InstrNode {
            kind: InstrKind::Loop(LoopNode {
                kind: LoopKind::For {
                    iterator,
                    start,
                    end,
                },
                body,
            }),
            line,
        })
    }

    fn parse_fn(&mut self) -> Option<InstrNode<'a>> {
        let line = self.line();
        self.advance();

        let tok = self.current().clone();
        let name = match tok.kind {
            TokenKind::Identifier(n) => {
                self.advance();
                self.alloc_str(&n)
            }
            _ => {
                let msg = format!("Expected function name, got '{}'", tok);
                self.diag.error_at(tok.line, msg);
                return None;
            }
        };

        if !self.expect(TokenKind::LParen, "'('") {
            return None;
        }

        let mut params = BumpVec::new_in(self.arena);
        let mut is_variadic = false;
        while !self.check(&TokenKind::RParen) && !self.check(&TokenKind::End) {
            // A trailing `...` marks the function variadic
            if self.check(&TokenKind::Ellipsis) {
                is_variadic = true;
                self.advance();
                break;
            }

            let ty_tok = self.current().clone();
            let base = match ty_tok.kind {
                TokenKind::TypeInt => Type::Int,
                TokenKind::TypeChar => Type::Char,
                _ => {
                    let msg = format!("Expected parameter type, got '{}'", ty_tok);
                    self.diag.error_at(ty_tok.line, msg);
                    return None;
                }
            };
            self.advance();

            let name_tok = self.current().clone();
            let (pty, pname) = match name_tok.kind {
                TokenKind::Identifier(n) => (base, self.alloc_str(&n)),
                TokenKind::Pointer(n) => (Type::Pointer, self.alloc_str(&n)),
                _ => {
                    let msg = format!("Expected parameter name, got '{}'", name_tok);
                    self.diag.error_at(name_tok.line, msg);
                    return None;
                }
            };
            self.advance();
            params.push(Param {
                ty: pty,
                name: pname,
                line: name_tok.line,
            });

            if self.check(&TokenKind::Comma) {
                self.advance();
            }
        }
        self.expect(TokenKind::RParen, "')'");

        // Return-type list, introduced by ':' and read until the body or
        // the end of the header
        let mut return_types = BumpVec::new_in(self.arena);
        if self.check(&TokenKind::Colon) {
            self.advance();
            loop {
                match self.current().kind {
                    TokenKind::TypeInt => {
                        return_types.push(Type::Int);
                        self.advance();
                    }
                    TokenKind::TypeChar => {
                        return_types.push(Type::Char);
                        self.advance();
                    }
                    _ => break,
                }
                if self.check(&TokenKind::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }

        // An immediately following '{' promotes declaration to definition
        if self.check(&TokenKind::LBrace) {
            self.advance();
            let body = self.parse_block_until_rbrace();
            return Some(InstrNode {
                kind: InstrKind::Fn(FnNode {
                    name,
                    params: params.into_bump_slice(),
                    return_types: return_types.into_bump_slice(),
                    is_variadic,
                    body: FnBody::Defined(body),
                }),
                line,
            });
        }

        Some(InstrNode {
            kind: InstrKind::Fn(FnNode {
                name,
                params: params.into_bump_slice(),
                return_types: return_types.into_bump_slice(),
                is_variadic,
                body: FnBody::Declared,
            }),
            line,
        })
    }

    fn parse_ret(&mut self) -> Option<InstrNode<'a>> {
        let line = self.line();
        self.advance();

        let mut values = BumpVec::new_in(self.arena);
        while self.can_start_expr() {
            values.push(*self.parse_expr());
            if self.check(&TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        Some(InstrNode {
            kind: InstrKind::Return(values.into_bump_slice()),
            line,
        })
    }

    fn can_start_expr(&self) -> bool {
        matches!(
            self.current().kind,
            TokenKind::IntLiteral(_)
                | TokenKind::CharLiteral(_)
                | TokenKind::StringLiteral(_)
                | TokenKind::Identifier(_)
                | TokenKind::Pointer(_)
                | TokenKind::AddressOf(_)
                | TokenKind::LParen
        )
    }

    // ========== Expressions ==========

    /// `+`/`-`, left-associative.
    fn parse_expr(&mut self) -> &'a ExprNode<'a> {
        let mut left = self.parse_term();
        loop {
            let op = match self.current().kind {
                TokenKind::Add => BinaryOp::Add,
                TokenKind::Subtract => BinaryOp::Subtract,
                _ => break,
            };
            let line = self.line();
            self.advance();
            let right = self.parse_term();
            left = &*self.arena.alloc(ExprNode {
                kind: ExprKind::Binary { op, left, right },
                line,
            });
        }
        left
    }

    /// `*`/`/`/`%`, left-associative.
    fn parse_term(&mut self) -> &'a ExprNode<'a> {
        let mut left = self.parse_factor();
        loop {
            let op = match self.current().kind {
                TokenKind::Multiply => BinaryOp::Multiply,
                TokenKind::Divide => BinaryOp::Divide,
                TokenKind::Modulo => BinaryOp::Modulo,
                _ => break,
            };
            let line = self.line();
            self.advance();
            let right = self.parse_factor();
            left = &*self.arena.alloc(ExprNode {
                kind: ExprKind::Binary { op, left, right },
                line,
            });
        }
        left
    }

    /// Atoms and parenthesized expressions.
    fn parse_factor(&mut self) -> &'a ExprNode<'a> {
        if self.check(&TokenKind::LParen) {
            self.advance();
            let node = self.parse_expr();
            self.expect(TokenKind::RParen, "')'");
            return node;
        }
        let term = self.parse_term_node();
        let line = term.line;
        &*self.arena.alloc(ExprNode {
            kind: ExprKind::Term(term),
            line,
        })
    }

    /// A bare term, as used by relations and as the factor atom.
    fn parse_term_node(&mut self) -> TermNode<'a> {
        let tok = self.current().clone();
        let line = tok.line;
        match tok.kind {
            TokenKind::IntLiteral(v) => {
                self.advance();
                TermNode {
                    kind: TermKind::Int(v),
                    line,
                }
            }
            TokenKind::CharLiteral(c) => {
                self.advance();
                TermNode {
                    kind: TermKind::Char(c),
                    line,
                }
            }
            TokenKind::StringLiteral(s) => {
                self.advance();
                TermNode {
                    kind: TermKind::Str(self.alloc_str(&s)),
                    line,
                }
            }
            TokenKind::Identifier(n) => {
                let name = self.alloc_str(&n);
                self.advance();
                if self.check(&TokenKind::LSqBr) {
                    self.advance();
                    let index = self.parse_expr();
                    self.expect(TokenKind::RSqBr, "']'");
                    TermNode {
                        kind: TermKind::ArrayAccess { array: name, index },
                        line,
                    }
                } else if self.check(&TokenKind::LParen) {
                    self.advance();
                    let args = self.parse_call_args().unwrap_or(&[]);
                    TermNode {
                        kind: TermKind::Call { name, args },
                        line,
                    }
                } else {
                    TermNode {
                        kind: TermKind::Identifier(name),
                        line,
                    }
                }
            }
            TokenKind::AddressOf(n) => {
                let name = self.alloc_str(&n);
                self.advance();
                TermNode {
                    kind: TermKind::AddressOf(name),
                    line,
                }
            }
            TokenKind::Pointer(n) => {
                let name = self.alloc_str(&n);
                self.advance();
                TermNode {
                    kind: TermKind::Deref(name),
                    line,
                }
            }
            other => {
                let msg = format!(
                    "Expected a term (int, char, string, identifier, addof, pointer), got '{}'",
                    Token::new(other, line)
                );
                self.diag.error_at(line, msg);
                self.advance();
                TermNode {
                    kind: TermKind::Int(0),
                    line,
                }
            }
        }
    }

    // ========== Relations ==========

    /// One pair of terms joined by one comparison operator.
    fn parse_rel(&mut self) -> RelNode<'a> {
        let lhs = self.parse_term_node();
        let line = self.line();

        let op = match self.current().kind {
            TokenKind::IsEqual => Some(RelOp::IsEqual),
            TokenKind::NotEqual => Some(RelOp::NotEqual),
            TokenKind::LessThan => Some(RelOp::LessThan),
            TokenKind::LessThanOrEqual => Some(RelOp::LessThanOrEqual),
            TokenKind::GreaterThan => Some(RelOp::GreaterThan),
            TokenKind::GreaterThanOrEqual => Some(RelOp::GreaterThanOrEqual),
            _ => None,
        };

        match op {
            Some(op) => {
                self.advance();
                let rhs = self.parse_term_node();
                RelNode { op, line, lhs, rhs }
            }
            None => {
                let msg = format!(
                    "Expected a relation (==, !=, <, <=, >, >=), got '{}'",
                    self.current()
                );
                self.diag.error_at(line, msg);
                RelNode {
                    op: RelOp::IsEqual,
                    line,
                    lhs,
                    rhs: TermNode {
                        kind: TermKind::Int(0),
                        line,
                    },
                }
            }
        }
    }
}
