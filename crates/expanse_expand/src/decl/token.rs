//! Token trees for macro definitions and call bodies.
//!
//! The lexer recognises just enough of the language to split text into
//! identifiers, lifetimes, literals, punctuation and delimited groups. Every
//! token keeps its byte range in the source, which is how expansion ranges
//! are mapped back to the call body.

use std::ops::Range;

/// Version of the token tree grammar. Bumped whenever tokenisation changes
/// in a way that could change an expansion.
pub const PARSER_VERSION: u32 = 1;

/// The class of a leaf token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Identifier or keyword, including raw identifiers.
    Ident,
    /// `'a`
    Lifetime,
    /// Number, string, byte string, or character literal.
    Literal,
    /// A single punctuation character.
    Punct,
}

/// A leaf token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Token class.
    pub kind: TokenKind,
    /// Source text.
    pub text: String,
    /// Byte range in the source.
    pub range: Range<usize>,
    /// For punctuation: the next character is punctuation too, with no
    /// whitespace in between (`=` in `=>`).
    pub joint: bool,
    /// Whitespace or a comment precedes the token.
    pub spaced: bool,
}

impl Token {
    /// Returns `true` if this is the punctuation character `ch`.
    pub fn is_punct(&self, ch: char) -> bool {
        self.kind == TokenKind::Punct && self.text.len() == ch.len_utf8() && self.text.starts_with(ch)
    }
}

/// Group delimiters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    /// `( )`
    Parenthesis,
    /// `[ ]`
    Bracket,
    /// `{ }`
    Brace,
}

impl Delimiter {
    fn from_open(ch: char) -> Option<Self> {
        match ch {
            '(' => Some(Delimiter::Parenthesis),
            '[' => Some(Delimiter::Bracket),
            '{' => Some(Delimiter::Brace),
            _ => None,
        }
    }

    fn from_close(ch: char) -> Option<Self> {
        match ch {
            ')' => Some(Delimiter::Parenthesis),
            ']' => Some(Delimiter::Bracket),
            '}' => Some(Delimiter::Brace),
            _ => None,
        }
    }

    /// Opening character.
    pub fn open(self) -> char {
        match self {
            Delimiter::Parenthesis => '(',
            Delimiter::Bracket => '[',
            Delimiter::Brace => '{',
        }
    }

    /// Closing character.
    pub fn close(self) -> char {
        match self {
            Delimiter::Parenthesis => ')',
            Delimiter::Bracket => ']',
            Delimiter::Brace => '}',
        }
    }
}

/// A delimited sequence of token trees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    /// The delimiter pair.
    pub delimiter: Delimiter,
    /// Trees between the delimiters.
    pub children: Vec<TokenTree>,
    /// Byte range including both delimiters.
    pub range: Range<usize>,
    /// Whitespace precedes the opening delimiter.
    pub open_spaced: bool,
    /// Whitespace precedes the closing delimiter.
    pub close_spaced: bool,
}

/// A leaf token or a delimited group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenTree {
    /// A single token.
    Leaf(Token),
    /// A delimited group.
    Group(Group),
}

impl TokenTree {
    /// Byte range in the source.
    pub fn range(&self) -> Range<usize> {
        match self {
            TokenTree::Leaf(token) => token.range.clone(),
            TokenTree::Group(group) => group.range.clone(),
        }
    }

    /// The token, if this is a leaf.
    pub fn as_leaf(&self) -> Option<&Token> {
        match self {
            TokenTree::Leaf(token) => Some(token),
            TokenTree::Group(_) => None,
        }
    }

    /// Returns `true` if this is the punctuation character `ch`.
    pub fn is_punct(&self, ch: char) -> bool {
        self.as_leaf().is_some_and(|t| t.is_punct(ch))
    }

    /// Returns `true` if this is the identifier `name`.
    pub fn is_ident(&self, name: &str) -> bool {
        self.as_leaf()
            .is_some_and(|t| t.kind == TokenKind::Ident && t.text == name)
    }
}

/// A tokenisation failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LexError {
    /// A literal, comment, or group was not closed.
    #[error("unterminated {what} starting at offset {offset}")]
    Unterminated {
        /// What was left open.
        what: &'static str,
        /// Where it started.
        offset: usize,
    },
    /// A character that cannot start a token.
    #[error("unexpected character `{ch}` at offset {offset}")]
    Unexpected {
        /// The character.
        ch: char,
        /// Its offset.
        offset: usize,
    },
    /// A closing delimiter that does not match the innermost open one.
    #[error("mismatched closing delimiter `{ch}` at offset {offset}")]
    Mismatched {
        /// The closing delimiter.
        ch: char,
        /// Its offset.
        offset: usize,
    },
}

const PUNCT_CHARS: &str = "+-*/%^!&|=<>@.,;:#$?~";

fn is_punct_char(ch: char) -> bool {
    PUNCT_CHARS.contains(ch)
}

fn is_ident_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_'
}

fn is_ident_continue(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

enum Lexeme {
    Token(Token),
    Open(Delimiter, usize, bool),
    Close(Delimiter, char, usize, bool),
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_nth(&self, n: usize) -> Option<char> {
        self.src[self.pos..].chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn eat_while(&mut self, pred: impl Fn(char) -> bool) {
        while self.peek().is_some_and(&pred) {
            self.bump();
        }
    }

    fn skip_trivia(&mut self) -> Result<(), LexError> {
        loop {
            match (self.peek(), self.peek_nth(1)) {
                (Some(ch), _) if ch.is_whitespace() => {
                    self.bump();
                }
                (Some('/'), Some('/')) => self.eat_while(|c| c != '\n'),
                (Some('/'), Some('*')) => self.block_comment()?,
                _ => return Ok(()),
            }
        }
    }

    fn block_comment(&mut self) -> Result<(), LexError> {
        let start = self.pos;
        self.pos += 2;
        let mut depth = 1usize;
        while depth > 0 {
            match (self.peek(), self.peek_nth(1)) {
                (Some('/'), Some('*')) => {
                    self.pos += 2;
                    depth += 1;
                }
                (Some('*'), Some('/')) => {
                    self.pos += 2;
                    depth -= 1;
                }
                (Some(_), _) => {
                    self.bump();
                }
                (None, _) => {
                    return Err(LexError::Unterminated {
                        what: "block comment",
                        offset: start,
                    })
                }
            }
        }
        Ok(())
    }

    fn next_lexeme(&mut self) -> Result<Option<Lexeme>, LexError> {
        let before = self.pos;
        self.skip_trivia()?;
        let start = self.pos;
        let spaced = start > before;
        let Some(ch) = self.peek() else {
            return Ok(None);
        };

        if let Some(delim) = Delimiter::from_open(ch) {
            self.bump();
            return Ok(Some(Lexeme::Open(delim, start, spaced)));
        }
        if let Some(delim) = Delimiter::from_close(ch) {
            self.bump();
            return Ok(Some(Lexeme::Close(delim, ch, start, spaced)));
        }

        let kind = if self.at_prefixed_literal() {
            self.prefixed_literal(start)?;
            TokenKind::Literal
        } else if ch == 'r' && self.peek_nth(1) == Some('#') && self.peek_nth(2).is_some_and(is_ident_start) {
            self.pos += 2;
            self.eat_while(is_ident_continue);
            TokenKind::Ident
        } else if is_ident_start(ch) {
            self.eat_while(is_ident_continue);
            TokenKind::Ident
        } else if ch.is_ascii_digit() {
            self.number();
            TokenKind::Literal
        } else if ch == '"' {
            self.bump();
            self.quoted('"', start)?;
            TokenKind::Literal
        } else if ch == '\'' {
            self.quote_or_lifetime(start)?
        } else if is_punct_char(ch) {
            self.bump();
            let joint = self.peek().is_some_and(is_punct_char);
            return Ok(Some(Lexeme::Token(Token {
                kind: TokenKind::Punct,
                text: ch.to_string(),
                range: start..self.pos,
                joint,
                spaced,
            })));
        } else {
            return Err(LexError::Unexpected { ch, offset: start });
        };

        Ok(Some(Lexeme::Token(Token {
            kind,
            text: self.src[start..self.pos].to_string(),
            range: start..self.pos,
            joint: false,
            spaced,
        })))
    }

    /// `b"..."`, `b'x'`, `r"..."`, `r#"..."#`, `br"..."`, `c"..."`.
    fn at_prefixed_literal(&self) -> bool {
        let rest = &self.src[self.pos..];
        let after_prefix = if rest.starts_with("br") || rest.starts_with("cr") {
            &rest[2..]
        } else if rest.starts_with('b') || rest.starts_with('c') || rest.starts_with('r') {
            &rest[1..]
        } else {
            return false;
        };
        let raw = rest.starts_with('r') || rest[1..].starts_with('r');
        if raw {
            let hashes = after_prefix.trim_start_matches('#');
            hashes.starts_with('"')
        } else {
            after_prefix.starts_with('"') || (rest.starts_with('b') && after_prefix.starts_with('\''))
        }
    }

    fn prefixed_literal(&mut self, start: usize) -> Result<(), LexError> {
        let mut raw = false;
        while let Some(ch) = self.peek() {
            match ch {
                'b' | 'c' => {
                    self.bump();
                }
                'r' => {
                    raw = true;
                    self.bump();
                }
                _ => break,
            }
        }
        if raw {
            let mut hashes = 0usize;
            while self.peek() == Some('#') {
                self.bump();
                hashes += 1;
            }
            self.bump();
            let terminator = format!("\"{}", "#".repeat(hashes));
            match self.src[self.pos..].find(&terminator) {
                Some(end) => {
                    self.pos += end + terminator.len();
                    self.eat_while(is_ident_continue);
                    Ok(())
                }
                None => Err(LexError::Unterminated {
                    what: "raw string literal",
                    offset: start,
                }),
            }
        } else {
            let quote = self.bump().unwrap_or('"');
            self.quoted(quote, start)
        }
    }

    /// Consumes up to and including the closing `quote`, honouring escapes,
    /// then any literal suffix.
    fn quoted(&mut self, quote: char, start: usize) -> Result<(), LexError> {
        loop {
            match self.bump() {
                Some('\\') => {
                    self.bump();
                }
                Some(ch) if ch == quote => break,
                Some(_) => {}
                None => {
                    return Err(LexError::Unterminated {
                        what: if quote == '"' {
                            "string literal"
                        } else {
                            "character literal"
                        },
                        offset: start,
                    })
                }
            }
        }
        self.eat_while(is_ident_continue);
        Ok(())
    }

    fn quote_or_lifetime(&mut self, start: usize) -> Result<TokenKind, LexError> {
        let is_lifetime = self.peek_nth(1).is_some_and(is_ident_start) && self.peek_nth(2) != Some('\'');
        self.bump();
        if is_lifetime {
            self.eat_while(is_ident_continue);
            Ok(TokenKind::Lifetime)
        } else {
            self.quoted('\'', start)?;
            Ok(TokenKind::Literal)
        }
    }

    fn number(&mut self) {
        self.eat_while(is_ident_continue);
        if self.peek() == Some('.') && self.peek_nth(1).is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
            self.eat_while(is_ident_continue);
        }
    }
}

/// Splits `src` into token trees.
pub fn parse_token_trees(src: &str) -> Result<Vec<TokenTree>, LexError> {
    let mut lexer = Lexer { src, pos: 0 };
    let mut stack: Vec<(Delimiter, usize, bool, Vec<TokenTree>)> = Vec::new();
    let mut top: Vec<TokenTree> = Vec::new();

    while let Some(lexeme) = lexer.next_lexeme()? {
        match lexeme {
            Lexeme::Token(token) => match stack.last_mut() {
                Some((_, _, _, children)) => children.push(TokenTree::Leaf(token)),
                None => top.push(TokenTree::Leaf(token)),
            },
            Lexeme::Open(delimiter, offset, spaced) => {
                stack.push((delimiter, offset, spaced, Vec::new()))
            }
            Lexeme::Close(delimiter, ch, offset, close_spaced) => {
                let Some((open, start, open_spaced, children)) = stack.pop() else {
                    return Err(LexError::Mismatched { ch, offset });
                };
                if open != delimiter {
                    return Err(LexError::Mismatched { ch, offset });
                }
                let group = TokenTree::Group(Group {
                    delimiter,
                    children,
                    range: start..offset + 1,
                    open_spaced,
                    close_spaced,
                });
                match stack.last_mut() {
                    Some((_, _, _, parent)) => parent.push(group),
                    None => top.push(group),
                }
            }
        }
    }

    match stack.pop() {
        Some((_, offset, _, _)) => Err(LexError::Unterminated {
            what: "delimited group",
            offset,
        }),
        None => Ok(top),
    }
}
