use thiserror::Error;

use crate::ast::{BinaryOperator, Expression, Statement, UnaryOperator};
use crate::error::Error;
use crate::lexer::Lexer;
use crate::token::{Position, Token, TokenKind};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Expected {expected}, got '{found}' at {position}")]
    UnexpectedToken {
        expected: String,
        found: String,
        position: Position,
    },
    #[error("Unexpected end of input, expected {expected}")]
    UnexpectedEnd { expected: String },
    #[error("Return statement outside of function body at {position}")]
    ReturnOutsideFunction { position: Position },
}

/// Recursive-descent parser over a token stream.
///
/// Implemented as an iterator of top-level statements: each `next` call pulls
/// just enough tokens to finish one statement, so the consumer can execute it
/// before the rest of the source exists. A lex or parse failure fuses the
/// iterator.
pub struct Parser<I: Iterator<Item = char>> {
    lexer: Lexer<I>,
    current: Option<Token>,
    peeked: Option<Option<Token>>,
    primed: bool,
    failed: bool,
}

impl<I: Iterator<Item = char>> Parser<I> {
    pub fn new(lexer: Lexer<I>) -> Self {
        Self {
            lexer,
            current: None,
            peeked: None,
            primed: false,
            failed: false,
        }
    }

    fn parse_top_level(&mut self) -> Result<Statement, Error> {
        if let Some(token) = &self.current {
            if token.kind == TokenKind::Return {
                return Err(ParseError::ReturnOutsideFunction {
                    position: token.position,
                }
                .into());
            }
        }
        self.parse_statement()
    }

    fn parse_statement(&mut self) -> Result<Statement, Error> {
        if matches!(self.current_kind(), Some(TokenKind::If)) {
            return self.parse_if();
        }
        if matches!(self.current_kind(), Some(TokenKind::While)) {
            return self.parse_while();
        }
        if matches!(self.current_kind(), Some(TokenKind::Def)) {
            return self.parse_function_def();
        }
        if matches!(self.current_kind(), Some(TokenKind::Return)) {
            return self.parse_return();
        }
        if matches!(self.current_kind(), Some(TokenKind::Identifier(_))) {
            if matches!(self.peek_kind()?, Some(TokenKind::Equal)) {
                return self.parse_assignment();
            }
            if matches!(self.peek_kind()?, Some(TokenKind::LParen)) {
                let call = self.parse_call()?;
                return Ok(Statement::Expr(call));
            }
            return Err(self.error("'=' or '(' after identifier"));
        }
        Err(self.error("a statement"))
    }

    fn parse_assignment(&mut self) -> Result<Statement, Error> {
        let name = self.expect_identifier()?;
        self.expect(&TokenKind::Equal)?;
        let value = self.parse_expression()?;
        Ok(Statement::Assign { name, value })
    }

    fn parse_if(&mut self) -> Result<Statement, Error> {
        self.advance()?; // if
        let condition = self.parse_expression()?;
        // 'then' is optional in the grammar
        if matches!(self.current_kind(), Some(TokenKind::Then)) {
            self.advance()?;
        }
        let then_body =
            self.parse_block(&[TokenKind::Else, TokenKind::EndIf], "'else' or 'end-if'")?;
        let else_body = if matches!(self.current_kind(), Some(TokenKind::Else)) {
            self.advance()?;
            self.parse_block(&[TokenKind::EndIf], "'end-if'")?
        } else {
            Vec::new()
        };
        self.expect(&TokenKind::EndIf)?;
        Ok(Statement::If {
            condition,
            then_body,
            else_body,
        })
    }

    fn parse_while(&mut self) -> Result<Statement, Error> {
        self.advance()?; // while
        let condition = self.parse_expression()?;
        self.expect(&TokenKind::Do)?;
        let body = self.parse_block(&[TokenKind::EndWhile], "'end-while'")?;
        self.expect(&TokenKind::EndWhile)?;
        Ok(Statement::While { condition, body })
    }

    fn parse_function_def(&mut self) -> Result<Statement, Error> {
        self.advance()?; // def
        let name = self.expect_identifier()?;
        self.expect(&TokenKind::LParen)?;
        let mut params = Vec::new();
        if !matches!(self.current_kind(), Some(TokenKind::RParen)) {
            loop {
                params.push(self.expect_identifier()?);
                if matches!(self.current_kind(), Some(TokenKind::Comma)) {
                    self.advance()?;
                } else {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen)?;
        let body = self.parse_block(&[TokenKind::EndDef], "'end-def'")?;
        self.expect(&TokenKind::EndDef)?;
        Ok(Statement::FunctionDef { name, params, body })
    }

    fn parse_return(&mut self) -> Result<Statement, Error> {
        self.advance()?; // return
        let value = match &self.current {
            Some(token) if starts_expression(&token.kind) => Some(self.parse_expression()?),
            _ => None,
        };
        Ok(Statement::Return(value))
    }

    /// Parses statements until one of `terminators` is the current token.
    /// The terminator itself is left for the caller to consume.
    fn parse_block(
        &mut self,
        terminators: &[TokenKind],
        expected: &str,
    ) -> Result<Vec<Statement>, Error> {
        let mut body = Vec::new();
        loop {
            let at_terminator = match &self.current {
                Some(token) => terminators.contains(&token.kind),
                None => {
                    return Err(ParseError::UnexpectedEnd {
                        expected: expected.to_string(),
                    }
                    .into());
                }
            };
            if at_terminator {
                return Ok(body);
            }
            body.push(self.parse_statement()?);
        }
    }

    fn parse_expression(&mut self) -> Result<Expression, Error> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expression, Error> {
        self.parse_left_assoc(Self::parse_and, |kind| match kind {
            TokenKind::Or => Some(BinaryOperator::Or),
            _ => None,
        })
    }

    fn parse_and(&mut self) -> Result<Expression, Error> {
        self.parse_left_assoc(Self::parse_not, |kind| match kind {
            TokenKind::And => Some(BinaryOperator::And),
            _ => None,
        })
    }

    fn parse_not(&mut self) -> Result<Expression, Error> {
        if matches!(self.current_kind(), Some(TokenKind::Not)) {
            self.advance()?;
            let operand = self.parse_not()?;
            return Ok(Expression::UnaryOp {
                op: UnaryOperator::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expression, Error> {
        self.parse_left_assoc(Self::parse_additive, |kind| match kind {
            TokenKind::EqualEqual => Some(BinaryOperator::Equal),
            TokenKind::NotEqual => Some(BinaryOperator::NotEqual),
            TokenKind::Less => Some(BinaryOperator::Less),
            TokenKind::Greater => Some(BinaryOperator::Greater),
            TokenKind::LessEqual => Some(BinaryOperator::LessEqual),
            TokenKind::GreaterEqual => Some(BinaryOperator::GreaterEqual),
            _ => None,
        })
    }

    fn parse_additive(&mut self) -> Result<Expression, Error> {
        self.parse_left_assoc(Self::parse_multiplicative, |kind| match kind {
            TokenKind::Plus => Some(BinaryOperator::Add),
            TokenKind::Minus => Some(BinaryOperator::Sub),
            _ => None,
        })
    }

    fn parse_multiplicative(&mut self) -> Result<Expression, Error> {
        self.parse_left_assoc(Self::parse_unary, |kind| match kind {
            TokenKind::Star => Some(BinaryOperator::Mul),
            TokenKind::Slash => Some(BinaryOperator::Div),
            TokenKind::Percent => Some(BinaryOperator::Mod),
            _ => None,
        })
    }

    /// One precedence level: parse a tighter-binding operand, then left-fold
    /// further operands while the current token maps to an operator of this
    /// level. The left fold is what makes `a - b - c` parse as `(a - b) - c`.
    fn parse_left_assoc(
        &mut self,
        operand: fn(&mut Self) -> Result<Expression, Error>,
        operator_at_level: fn(&TokenKind) -> Option<BinaryOperator>,
    ) -> Result<Expression, Error> {
        let mut expr = operand(self)?;
        while let Some(op) = self
            .current
            .as_ref()
            .and_then(|token| operator_at_level(&token.kind))
        {
            self.advance()?;
            let right = operand(self)?;
            expr = Expression::BinaryOp {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> Result<Expression, Error> {
        if matches!(self.current_kind(), Some(TokenKind::Minus)) {
            self.advance()?;
            let operand = self.parse_unary()?;
            return Ok(Expression::UnaryOp {
                op: UnaryOperator::Negate,
                operand: Box::new(operand),
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expression, Error> {
        let mut expr = self.parse_primary()?;
        while matches!(self.current_kind(), Some(TokenKind::LBracket)) {
            self.advance()?;
            let index = self.parse_expression()?;
            self.expect(&TokenKind::RBracket)?;
            expr = Expression::Index {
                object: Box::new(expr),
                index: Box::new(index),
            };
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expression, Error> {
        let kind = match &self.current {
            Some(token) => token.kind.clone(),
            None => return Err(self.error("an expression")),
        };
        match kind {
            TokenKind::Integer(value) => {
                self.advance()?;
                Ok(Expression::Integer(value))
            }
            TokenKind::String(value) => {
                self.advance()?;
                Ok(Expression::String(value))
            }
            TokenKind::True => {
                self.advance()?;
                Ok(Expression::Boolean(true))
            }
            TokenKind::False => {
                self.advance()?;
                Ok(Expression::Boolean(false))
            }
            TokenKind::Identifier(name) => {
                if matches!(self.peek_kind()?, Some(TokenKind::LParen)) {
                    return self.parse_call();
                }
                self.advance()?;
                Ok(Expression::Identifier(name))
            }
            TokenKind::LParen => {
                self.advance()?;
                let expr = self.parse_expression()?;
                self.expect(&TokenKind::RParen)?;
                Ok(expr)
            }
            TokenKind::LBracket => self.parse_array_literal(),
            _ => Err(self.error("an expression")),
        }
    }

    fn parse_call(&mut self) -> Result<Expression, Error> {
        let name = self.expect_identifier()?;
        self.expect(&TokenKind::LParen)?;
        let mut args = Vec::new();
        if !matches!(self.current_kind(), Some(TokenKind::RParen)) {
            loop {
                args.push(self.parse_expression()?);
                if matches!(self.current_kind(), Some(TokenKind::Comma)) {
                    self.advance()?;
                } else {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen)?;
        Ok(Expression::Call { name, args })
    }

    fn parse_array_literal(&mut self) -> Result<Expression, Error> {
        self.advance()?; // [
        let mut elements = Vec::new();
        if !matches!(self.current_kind(), Some(TokenKind::RBracket)) {
            loop {
                elements.push(self.parse_expression()?);
                if matches!(self.current_kind(), Some(TokenKind::Comma)) {
                    self.advance()?;
                } else {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RBracket)?;
        Ok(Expression::Array(elements))
    }

    fn current_kind(&self) -> Option<&TokenKind> {
        self.current.as_ref().map(|token| &token.kind)
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<(), Error> {
        if self.current_kind() == Some(kind) {
            self.advance()?;
            Ok(())
        } else {
            Err(self.error(&format!("'{kind}'")))
        }
    }

    fn expect_identifier(&mut self) -> Result<String, Error> {
        if let Some(TokenKind::Identifier(_)) = self.current_kind() {
            let token = self.advance()?;
            match token {
                Some(Token {
                    kind: TokenKind::Identifier(name),
                    ..
                }) => Ok(name),
                _ => Err(self.error("an identifier")),
            }
        } else {
            Err(self.error("an identifier"))
        }
    }

    /// Replaces the current token with the next one, returning the old.
    fn advance(&mut self) -> Result<Option<Token>, Error> {
        let next = match self.peeked.take() {
            Some(token) => token,
            None => self.lexer.next_token()?,
        };
        Ok(std::mem::replace(&mut self.current, next))
    }

    fn peek_kind(&mut self) -> Result<Option<&TokenKind>, Error> {
        if self.peeked.is_none() {
            self.peeked = Some(self.lexer.next_token()?);
        }
        Ok(self
            .peeked
            .as_ref()
            .expect("peeked token missing")
            .as_ref()
            .map(|token| &token.kind))
    }

    fn error(&self, expected: &str) -> Error {
        match &self.current {
            Some(token) => ParseError::UnexpectedToken {
                expected: expected.to_string(),
                found: token.to_string(),
                position: token.position,
            }
            .into(),
            None => ParseError::UnexpectedEnd {
                expected: expected.to_string(),
            }
            .into(),
        }
    }
}

fn starts_expression(kind: &TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Integer(_)
            | TokenKind::String(_)
            | TokenKind::True
            | TokenKind::False
            | TokenKind::Identifier(_)
            | TokenKind::LParen
            | TokenKind::LBracket
            | TokenKind::Minus
            | TokenKind::Not
    )
}

impl<I: Iterator<Item = char>> Iterator for Parser<I> {
    type Item = Result<Statement, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        if !self.primed {
            self.primed = true;
            if let Err(error) = self.advance() {
                self.failed = true;
                return Some(Err(error));
            }
        }
        self.current.as_ref()?;
        match self.parse_top_level() {
            Ok(statement) => Some(Ok(statement)),
            Err(error) => {
                self.failed = true;
                Some(Err(error))
            }
        }
    }
}

/// Parses a complete source string into its top-level statements.
pub fn parse(input: &str) -> Result<Vec<Statement>, Error> {
    Parser::new(Lexer::new(input.chars())).collect()
}
