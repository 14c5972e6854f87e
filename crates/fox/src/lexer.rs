//! Hand-written lexer producing the token stream the parser consumes.
//!
//! Ambient scaffolding: spec §2 treats the token stream as an externally produced artifact, but
//! nothing upstream supplies one, so this module is the minimal scanner that feeds
//! [`crate::parser::Parser`]. String/char literal text is kept verbatim (delimiters included,
//! escapes unprocessed) per spec §4.1 - escape normalization is the parser's job.

use crate::{
    diagnostic::{DiagId, DiagnosticEngine},
    intern::Interner,
    source::{FileId, SourceLoc, SourceManager, SourceRange},
    token::{Keyword, LiteralValue, Punct, Token, TokenKind},
};

/// Scans `file`'s buffer into a flat token stream, interning identifiers into `interner` and
/// reporting lexical errors (unterminated literals, unrecognized characters) via `diags`.
pub fn lex(files: &SourceManager, file: FileId, interner: &mut Interner, diags: &mut DiagnosticEngine) -> Vec<Token> {
    Lexer { files, file, bytes: files.buffer(file).as_bytes(), pos: 0, interner, diags }.run()
}

struct Lexer<'a> {
    files: &'a SourceManager,
    file: FileId,
    bytes: &'a [u8],
    pos: usize,
    interner: &'a mut Interner,
    diags: &'a mut DiagnosticEngine,
}

impl Lexer<'_> {
    fn run(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia();
            let start = self.pos;
            let Some(c) = self.peek() else {
                tokens.push(Token { kind: TokenKind::Eof, range: self.range_from(start) });
                break;
            };
            let kind = if c.is_ascii_alphabetic() || c == b'_' {
                self.lex_word()
            } else if c.is_ascii_digit() {
                self.lex_number()
            } else if c == b'"' {
                self.lex_delimited(b'"', LiteralValue::Str as fn(String) -> LiteralValue)
            } else if c == b'\'' {
                self.lex_delimited(b'\'', LiteralValue::Char as fn(String) -> LiteralValue)
            } else {
                self.lex_punct()
            };
            tokens.push(Token { kind, range: self.range_from(start) });
        }
        tokens
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn loc(&self, offset: usize) -> SourceLoc {
        self.files.loc_at(self.file, u32::try_from(offset).expect("file too large"))
    }

    fn range_from(&self, start: usize) -> SourceRange {
        SourceRange::new(self.loc(start), self.loc(self.pos))
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(b' ' | b'\t' | b'\r' | b'\n') => {
                    self.pos += 1;
                }
                Some(b'/') if self.peek_at(1) == Some(b'/') => {
                    while !matches!(self.peek(), None | Some(b'\n')) {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
    }

    fn lex_word(&mut self) -> TokenKind {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == b'_') {
            self.pos += 1;
        }
        // SAFETY: bounded by ASCII alnum/underscore scanning above, always valid UTF-8.
        let text = std::str::from_utf8(&self.bytes[start..self.pos]).unwrap();
        match text {
            "true" => TokenKind::Literal(LiteralValue::Bool(true)),
            "false" => TokenKind::Literal(LiteralValue::Bool(false)),
            _ => {
                if let Ok(kw) = text.parse::<Keyword>() {
                    TokenKind::Keyword(kw)
                } else {
                    TokenKind::Identifier(self.interner.intern(text))
                }
            }
        }
    }

    fn lex_number(&mut self) -> TokenKind {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.pos += 1;
        }
        let mut is_double = false;
        if self.peek() == Some(b'.') && matches!(self.peek_at(1), Some(c) if c.is_ascii_digit()) {
            is_double = true;
            self.pos += 1;
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            let save = self.pos;
            self.pos += 1;
            if matches!(self.peek(), Some(b'+' | b'-')) {
                self.pos += 1;
            }
            if matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                is_double = true;
                while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                    self.pos += 1;
                }
            } else {
                self.pos = save;
            }
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos]).unwrap();
        if is_double {
            TokenKind::Literal(LiteralValue::Double(text.parse().unwrap_or(0.0)))
        } else {
            TokenKind::Literal(LiteralValue::Int(text.parse().unwrap_or(0)))
        }
    }

    /// Scans a `"..."` or `'...'` literal, keeping delimiters and escapes verbatim.
    fn lex_delimited(&mut self, quote: u8, variant: fn(String) -> LiteralValue) -> TokenKind {
        let start = self.pos;
        self.pos += 1; // opening quote
        loop {
            match self.peek() {
                None | Some(b'\n') => {
                    self.diags
                        .report(DiagId::UnclosedBracket, self.range_from(start))
                        .add_arg(quote as char);
                    break;
                }
                Some(b'\\') => {
                    self.pos += 1;
                    if self.peek().is_some() {
                        self.pos += 1;
                    }
                }
                Some(c) if c == quote => {
                    self.pos += 1;
                    break;
                }
                Some(_) => self.pos += 1,
            }
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos]).unwrap_or_default().to_owned();
        TokenKind::Literal(variant(text))
    }

    /// Scans one punctuator/operator token, skipping and diagnosing unrecognized bytes until
    /// one is found (or the file ends).
    fn lex_punct(&mut self) -> TokenKind {
        loop {
            let start = self.pos;
            let c = self.bump();
            let Some(c) = c else { return TokenKind::Eof };
            let c2 = self.peek();
            macro_rules! two {
                ($second:literal, $two:expr, $one:expr) => {
                    if c2 == Some($second) {
                        self.pos += 1;
                        $two
                    } else {
                        $one
                    }
                };
            }
            let p = match c {
                b'(' => Punct::LParen,
                b')' => Punct::RParen,
                b'[' => Punct::LBracket,
                b']' => Punct::RBracket,
                b'{' => Punct::LBrace,
                b'}' => Punct::RBrace,
                b',' => Punct::Comma,
                b';' => Punct::Semi,
                b':' => Punct::Colon,
                b'.' => Punct::Dot,
                b'=' => two!(b'=', Punct::EqualEqual, Punct::Equal),
                b'!' => two!(b'=', Punct::BangEqual, Punct::Bang),
                b'<' => two!(b'=', Punct::LessEqual, Punct::Less),
                b'>' => two!(b'=', Punct::GreaterEqual, Punct::Greater),
                b'+' => Punct::Plus,
                b'-' => Punct::Minus,
                b'*' => two!(b'*', Punct::StarStar, Punct::Star),
                b'/' => Punct::Slash,
                b'%' => Punct::Percent,
                b'&' if c2 == Some(b'&') => {
                    self.pos += 1;
                    Punct::AmpAmp
                }
                b'|' if c2 == Some(b'|') => {
                    self.pos += 1;
                    Punct::PipePipe
                }
                _ => {
                    self.diags.report(DiagId::ExpectedToken, self.range_from(start)).add_arg("a valid token");
                    continue;
                }
            };
            return TokenKind::Punct(p);
        }
    }
}
