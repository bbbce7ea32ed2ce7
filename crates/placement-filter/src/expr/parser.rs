//! Recursive-descent parser producing the expression AST
//!
//! Grammar:
//!
//! ```text
//! expr    := primary ( "&&" primary )*
//! primary := INT | STRING | BYTES | IDENT "(" [ expr ( "," expr )* ] ")" | "(" expr ")"
//! ```

use super::lexer::{tokenize, Token, TokenKind};
use placement_core::ExpressionError;

/// Deepest nesting of calls and parentheses accepted.
///
/// Registered filters are held to the same limit, so anything the registry
/// renders parses again.
pub const MAX_DEPTH: usize = 64;

/// Expression syntax tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// Integer literal
    Int(i64),
    /// String literal
    Str(String),
    /// Byte string literal
    Bytes(Vec<u8>),
    /// Builtin function call
    Call {
        /// Function name as written
        name: String,
        /// Argument expressions
        args: Vec<Expr>,
        /// Byte offset of the function name
        position: usize,
    },
    /// `a && b && ...`, two or more operands in source order
    And(Vec<Expr>),
}

/// Parse a complete expression.
pub fn parse(src: &str) -> Result<Expr, ExpressionError> {
    let tokens = tokenize(src)?;
    let mut parser = Parser {
        tokens,
        index: 0,
        depth: 0,
    };
    let expr = parser.expr()?;
    match parser.peek() {
        Token {
            kind: TokenKind::Eof,
            ..
        } => Ok(expr),
        token => Err(ExpressionError::syntax(
            token.position,
            format!("unexpected {} after expression", token.kind.describe()),
        )),
    }
}

struct Parser {
    tokens: Vec<Token>,
    index: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        // tokenize always ends with Eof, and Eof is never consumed
        &self.tokens[self.index.min(self.tokens.len() - 1)]
    }

    fn next(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.index += 1;
        }
        token
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, ExpressionError> {
        let token = self.next();
        if token.kind == kind {
            Ok(token)
        } else {
            Err(ExpressionError::syntax(
                token.position,
                format!("expected {}, found {}", kind.describe(), token.kind.describe()),
            ))
        }
    }

    fn expr(&mut self) -> Result<Expr, ExpressionError> {
        let first = self.primary()?;
        if self.peek().kind != TokenKind::AndAnd {
            return Ok(first);
        }
        // chains stay flat so their length never adds nesting
        let mut operands = vec![first];
        while self.peek().kind == TokenKind::AndAnd {
            self.next();
            operands.push(self.primary()?);
        }
        Ok(Expr::And(operands))
    }

    fn primary(&mut self) -> Result<Expr, ExpressionError> {
        let token = self.next();
        match token.kind {
            TokenKind::Int(value) => Ok(Expr::Int(value)),
            TokenKind::Str(value) => Ok(Expr::Str(value)),
            TokenKind::Bytes(value) => Ok(Expr::Bytes(value)),
            TokenKind::LParen => {
                let inner = self.nested(token.position, Self::expr)?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::Ident(name) => {
                if self.peek().kind != TokenKind::LParen {
                    return Err(ExpressionError::syntax(
                        token.position,
                        format!("{name:?} is not a function call; expected '(' after it"),
                    ));
                }
                self.next();
                let args = self.nested(token.position, Self::arguments)?;
                Ok(Expr::Call {
                    name,
                    args,
                    position: token.position,
                })
            }
            other => Err(ExpressionError::syntax(
                token.position,
                format!("expected an expression, found {}", other.describe()),
            )),
        }
    }

    fn arguments(&mut self) -> Result<Vec<Expr>, ExpressionError> {
        let mut args = Vec::new();
        if self.peek().kind == TokenKind::RParen {
            self.next();
            return Ok(args);
        }
        loop {
            args.push(self.expr()?);
            let token = self.next();
            match token.kind {
                TokenKind::Comma => continue,
                TokenKind::RParen => return Ok(args),
                other => {
                    return Err(ExpressionError::syntax(
                        token.position,
                        format!("expected ',' or ')', found {}", other.describe()),
                    ))
                }
            }
        }
    }

    fn nested<T>(
        &mut self,
        position: usize,
        f: fn(&mut Self) -> Result<T, ExpressionError>,
    ) -> Result<T, ExpressionError> {
        if self.depth >= MAX_DEPTH {
            return Err(ExpressionError::syntax(
                position,
                format!("expression nested deeper than {MAX_DEPTH} levels"),
            ));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }
}
