use std::iter::Peekable;

use thiserror::Error;

use crate::token::{Position, Token, TokenKind};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LexError {
    #[error("Unexpected character '{character}' at {position}")]
    UnexpectedCharacter { character: char, position: Position },
    #[error("Unterminated string literal starting at {position}")]
    UnterminatedString { position: Position },
    #[error("Invalid integer literal '{literal}' at {position}")]
    InvalidIntegerLiteral { literal: String, position: Position },
    #[error("Unknown keyword '{word}' at {position}")]
    UnknownKeyword { word: String, position: Position },
}

/// Pull-based scanner over an arbitrary character source.
///
/// The source is consumed one character at a time, so a token is produced as
/// soon as its final character has been read. This is what lets the rest of
/// the pipeline execute statements before the whole program has arrived.
pub struct Lexer<I: Iterator<Item = char>> {
    chars: Peekable<I>,
    line: usize,
    column: usize,
}

impl<I: Iterator<Item = char>> Lexer<I> {
    pub fn new(source: I) -> Self {
        Self {
            chars: source.peekable(),
            line: 1,
            column: 1,
        }
    }

    /// Scans the next token, or `None` at end of input.
    pub fn next_token(&mut self) -> Result<Option<Token>, LexError> {
        self.skip_whitespace();

        let position = self.current_position();
        let Some(&ch) = self.chars.peek() else {
            return Ok(None);
        };

        let kind = match ch {
            '(' => self.single(TokenKind::LParen),
            ')' => self.single(TokenKind::RParen),
            '[' => self.single(TokenKind::LBracket),
            ']' => self.single(TokenKind::RBracket),
            ',' => self.single(TokenKind::Comma),
            '+' => self.single(TokenKind::Plus),
            '-' => self.single(TokenKind::Minus),
            '*' => self.single(TokenKind::Star),
            '/' => self.single(TokenKind::Slash),
            '%' => self.single(TokenKind::Percent),
            '=' => self.single_or_double(TokenKind::Equal, TokenKind::EqualEqual),
            '<' => self.single_or_double(TokenKind::Less, TokenKind::LessEqual),
            '>' => self.single_or_double(TokenKind::Greater, TokenKind::GreaterEqual),
            '!' => {
                self.advance();
                if self.chars.peek() == Some(&'=') {
                    self.advance();
                    TokenKind::NotEqual
                } else {
                    return Err(LexError::UnexpectedCharacter {
                        character: '!',
                        position,
                    });
                }
            }
            '"' => self.read_string(position)?,
            c if c.is_ascii_digit() => self.read_integer(position)?,
            c if c.is_alphabetic() || c == '_' => self.read_word(position)?,
            other => {
                return Err(LexError::UnexpectedCharacter {
                    character: other,
                    position,
                });
            }
        };

        Ok(Some(Token::new(kind, position)))
    }

    // Not named `position`: that would be shadowed by `Iterator::position`
    // on `&mut self` receivers.
    fn current_position(&self) -> Position {
        Position {
            line: self.line,
            column: self.column,
        }
    }

    fn advance(&mut self) -> Option<char> {
        let next = self.chars.next();
        match next {
            Some('\n') => {
                self.line += 1;
                self.column = 1;
            }
            Some(_) => self.column += 1,
            None => {}
        }
        next
    }

    fn skip_whitespace(&mut self) {
        while let Some(&c) = self.chars.peek() {
            if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.advance();
        kind
    }

    /// Longest-match scan for `=`/`==`, `<`/`<=` and `>`/`>=`.
    fn single_or_double(&mut self, single: TokenKind, double: TokenKind) -> TokenKind {
        self.advance();
        if self.chars.peek() == Some(&'=') {
            self.advance();
            double
        } else {
            single
        }
    }

    fn read_alphanumeric_run(&mut self) -> String {
        let mut run = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' {
                run.push(c);
                self.advance();
            } else {
                break;
            }
        }
        run
    }

    fn read_word(&mut self, position: Position) -> Result<TokenKind, LexError> {
        let mut word = self.read_alphanumeric_run();

        // The block terminators are the only words containing '-'. A bare
        // "end" run followed by '-' keeps scanning so "end-if" is one token.
        if word == "end" && self.chars.peek() == Some(&'-') {
            self.advance();
            word.push('-');
            word.push_str(&self.read_alphanumeric_run());
        }

        let kind = match word.as_str() {
            "if" => TokenKind::If,
            "then" => TokenKind::Then,
            "else" => TokenKind::Else,
            "end-if" => TokenKind::EndIf,
            "while" => TokenKind::While,
            "do" => TokenKind::Do,
            "end-while" => TokenKind::EndWhile,
            "def" => TokenKind::Def,
            "end-def" => TokenKind::EndDef,
            "return" => TokenKind::Return,
            "or" => TokenKind::Or,
            "and" => TokenKind::And,
            "not" => TokenKind::Not,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            _ if word.starts_with("end-") => {
                return Err(LexError::UnknownKeyword { word, position });
            }
            _ => TokenKind::Identifier(word),
        };
        Ok(kind)
    }

    fn read_integer(&mut self, position: Position) -> Result<TokenKind, LexError> {
        let mut literal = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_digit() {
                literal.push(c);
                self.advance();
            } else {
                break;
            }
        }
        let value = literal
            .parse::<i64>()
            .map_err(|_| LexError::InvalidIntegerLiteral { literal, position })?;
        Ok(TokenKind::Integer(value))
    }

    /// Reads a `"`-delimited literal. There is no escape processing: the
    /// next quote always terminates the string.
    fn read_string(&mut self, position: Position) -> Result<TokenKind, LexError> {
        self.advance(); // opening quote
        let mut content = String::new();
        loop {
            match self.advance() {
                Some('"') => return Ok(TokenKind::String(content)),
                Some(c) => content.push(c),
                None => return Err(LexError::UnterminatedString { position }),
            }
        }
    }
}

impl<I: Iterator<Item = char>> Iterator for Lexer<I> {
    type Item = Result<Token, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token().transpose()
    }
}

pub fn tokenize(input: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(input.chars()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input)
            .expect("tokenize should succeed")
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn tokenizes_every_token_kind() {
        let input = indoc! {r#"
            if then else end-if while do end-while = 100 some_string
            ("a string") [false, true ] def return end-def or and not
            > < >= <= == != + - * / %
        "#};
        let expected = vec![
            TokenKind::If,
            TokenKind::Then,
            TokenKind::Else,
            TokenKind::EndIf,
            TokenKind::While,
            TokenKind::Do,
            TokenKind::EndWhile,
            TokenKind::Equal,
            TokenKind::Integer(100),
            TokenKind::Identifier("some_string".to_string()),
            TokenKind::LParen,
            TokenKind::String("a string".to_string()),
            TokenKind::RParen,
            TokenKind::LBracket,
            TokenKind::False,
            TokenKind::Comma,
            TokenKind::True,
            TokenKind::RBracket,
            TokenKind::Def,
            TokenKind::Return,
            TokenKind::EndDef,
            TokenKind::Or,
            TokenKind::And,
            TokenKind::Not,
            TokenKind::Greater,
            TokenKind::Less,
            TokenKind::GreaterEqual,
            TokenKind::LessEqual,
            TokenKind::EqualEqual,
            TokenKind::NotEqual,
            TokenKind::Plus,
            TokenKind::Minus,
            TokenKind::Star,
            TokenKind::Slash,
            TokenKind::Percent,
        ];
        assert_eq!(kinds(input), expected);
    }

    #[test]
    fn tokenizes_operators_without_surrounding_whitespace() {
        assert_eq!(
            kinds("x=1%1"),
            vec![
                TokenKind::Identifier("x".to_string()),
                TokenKind::Equal,
                TokenKind::Integer(1),
                TokenKind::Percent,
                TokenKind::Integer(1),
            ]
        );
        assert_eq!(
            kinds("a<=b"),
            vec![
                TokenKind::Identifier("a".to_string()),
                TokenKind::LessEqual,
                TokenKind::Identifier("b".to_string()),
            ]
        );
    }

    #[test]
    fn keeps_end_keywords_whole_but_splits_minus_elsewhere() {
        assert_eq!(
            kinds("count-1"),
            vec![
                TokenKind::Identifier("count".to_string()),
                TokenKind::Minus,
                TokenKind::Integer(1),
            ]
        );
        assert_eq!(kinds("end-while"), vec![TokenKind::EndWhile]);
    }

    #[test]
    fn records_token_positions() {
        let tokens = tokenize("x = 1\ny = 2").expect("tokenize should succeed");
        let positions: Vec<(usize, usize)> = tokens
            .iter()
            .map(|token| (token.position.line, token.position.column))
            .collect();
        assert_eq!(
            positions,
            vec![(1, 1), (1, 3), (1, 5), (2, 1), (2, 3), (2, 5)]
        );
    }

    #[test]
    fn quote_always_terminates_string() {
        // No escape processing: a quote inside a string ends it.
        assert_eq!(
            kinds(r#""he said ""#),
            vec![TokenKind::String("he said ".to_string())]
        );
    }

    #[test]
    fn errors_on_unterminated_string() {
        let err = tokenize("x = \"oops").expect_err("expected lexing failure");
        assert_eq!(
            err,
            LexError::UnterminatedString {
                position: Position { line: 1, column: 5 }
            }
        );
    }

    #[test]
    fn errors_on_unexpected_character() {
        let err = tokenize("x = 1 @ 2").expect_err("expected lexing failure");
        assert_eq!(
            err,
            LexError::UnexpectedCharacter {
                character: '@',
                position: Position { line: 1, column: 7 }
            }
        );
    }

    #[test]
    fn errors_on_bare_bang() {
        let err = tokenize("x = !true").expect_err("expected lexing failure");
        assert!(matches!(err, LexError::UnexpectedCharacter { character: '!', .. }));
    }

    #[test]
    fn errors_on_unknown_end_keyword() {
        let err = tokenize("end-loop").expect_err("expected lexing failure");
        assert_eq!(
            err,
            LexError::UnknownKeyword {
                word: "end-loop".to_string(),
                position: Position { line: 1, column: 1 }
            }
        );
    }

    #[test]
    fn errors_on_integer_overflow() {
        let err = tokenize("n = 99999999999999999999").expect_err("expected overflow");
        assert!(matches!(err, LexError::InvalidIntegerLiteral { .. }));
    }

    #[test]
    fn token_stream_survives_render_and_relex() {
        let input = indoc! {r#"
            def fib(n)
                if n < 2 then return n end-if
                return fib(n - 1) + fib(n - 2)
            end-def
            print(fib(10))
        "#};
        let tokens = tokenize(input).expect("tokenize should succeed");
        let rendered = tokens
            .iter()
            .map(|token| token.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        let relexed = tokenize(&rendered).expect("relex should succeed");
        let original_kinds: Vec<_> = tokens.into_iter().map(|token| token.kind).collect();
        let relexed_kinds: Vec<_> = relexed.into_iter().map(|token| token.kind).collect();
        assert_eq!(original_kinds, relexed_kinds);
    }
}
