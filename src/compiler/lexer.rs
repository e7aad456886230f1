//! Tokenizer for Numscript source

use super::{SourcePosition, SyntaxError};
use crate::typed::ValueType;
use num_bigint::BigInt;
use num_rational::BigRational;
use std::fmt;

/// Reserved words of the language
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Vars,
    Meta,
    Balance,
    SetTxMeta,
    SetAccountMeta,
    Print,
    Fail,
    Send,
    Save,
    Source,
    Destination,
    From,
    To,
    Max,
    Remaining,
    Kept,
    Allowing,
    Unbounded,
    Overdraft,
    Up,
}

impl Keyword {
    fn from_word(word: &str) -> Option<Self> {
        let keyword = match word {
            "vars" => Keyword::Vars,
            "meta" => Keyword::Meta,
            "balance" => Keyword::Balance,
            "set_tx_meta" => Keyword::SetTxMeta,
            "set_account_meta" => Keyword::SetAccountMeta,
            "print" => Keyword::Print,
            "fail" => Keyword::Fail,
            "send" => Keyword::Send,
            "save" => Keyword::Save,
            "source" => Keyword::Source,
            "destination" => Keyword::Destination,
            "from" => Keyword::From,
            "to" => Keyword::To,
            "max" => Keyword::Max,
            "remaining" => Keyword::Remaining,
            "kept" => Keyword::Kept,
            "allowing" => Keyword::Allowing,
            "unbounded" => Keyword::Unbounded,
            "overdraft" => Keyword::Overdraft,
            "up" => Keyword::Up,
            _ => return None,
        };
        Some(keyword)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Keyword::Vars => "vars",
            Keyword::Meta => "meta",
            Keyword::Balance => "balance",
            Keyword::SetTxMeta => "set_tx_meta",
            Keyword::SetAccountMeta => "set_account_meta",
            Keyword::Print => "print",
            Keyword::Fail => "fail",
            Keyword::Send => "send",
            Keyword::Save => "save",
            Keyword::Source => "source",
            Keyword::Destination => "destination",
            Keyword::From => "from",
            Keyword::To => "to",
            Keyword::Max => "max",
            Keyword::Remaining => "remaining",
            Keyword::Kept => "kept",
            Keyword::Allowing => "allowing",
            Keyword::Unbounded => "unbounded",
            Keyword::Overdraft => "overdraft",
            Keyword::Up => "up",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// `@name`, stored without the `@`
    Account(String),
    /// Word starting with an uppercase letter
    Asset(String),
    Number(BigInt),
    /// `15%`, `12.5%` or `1/3`
    Portion(BigRational),
    String(String),
    /// `$name`, stored without the `$`
    Variable(String),
    Keyword(Keyword),
    Type(ValueType),
    /// Lowercase word that is not a keyword
    Word(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Equals,
    Comma,
    Plus,
    Minus,
    Star,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Account(name) => write!(f, "'@{}'", name),
            TokenKind::Asset(name) => write!(f, "'{}'", name),
            TokenKind::Number(n) => write!(f, "'{}'", n),
            TokenKind::Portion(ratio) => write!(f, "'{}'", crate::typed::format_ratio(ratio)),
            TokenKind::String(s) => write!(f, "'\"{}\"'", s),
            TokenKind::Variable(name) => write!(f, "'${}'", name),
            TokenKind::Keyword(keyword) => write!(f, "'{}'", keyword.as_str()),
            TokenKind::Type(ty) => write!(f, "'{}'", ty),
            TokenKind::Word(word) => write!(f, "'{}'", word),
            TokenKind::LParen => f.write_str("'('"),
            TokenKind::RParen => f.write_str("')'"),
            TokenKind::LBracket => f.write_str("'['"),
            TokenKind::RBracket => f.write_str("']'"),
            TokenKind::LBrace => f.write_str("'{'"),
            TokenKind::RBrace => f.write_str("'}'"),
            TokenKind::Equals => f.write_str("'='"),
            TokenKind::Comma => f.write_str("','"),
            TokenKind::Plus => f.write_str("'+'"),
            TokenKind::Minus => f.write_str("'-'"),
            TokenKind::Star => f.write_str("'*'"),
            TokenKind::Eof => f.write_str("end of input"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: SourcePosition,
}

struct Lexer {
    chars: Vec<char>,
    index: usize,
    line: usize,
    column: usize,
}

/// Split source text into tokens, ending with `TokenKind::Eof`
pub fn tokenize(source: &str) -> Result<Vec<Token>, SyntaxError> {
    let mut lexer = Lexer {
        chars: source.chars().collect(),
        index: 0,
        line: 1,
        column: 1,
    };
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}

impl Lexer {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.index).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.index + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.index += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn position(&self) -> SourcePosition {
        SourcePosition::new(self.line, self.column)
    }

    fn take_while(&mut self, accept: impl Fn(char) -> bool) -> String {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if !accept(c) {
                break;
            }
            text.push(c);
            self.bump();
        }
        text
    }

    fn error(&self, pos: SourcePosition, expected: &str, found: impl Into<String>) -> SyntaxError {
        SyntaxError::new(pos, expected, found)
    }

    /// Skip whitespace and comments
    fn skip_trivia(&mut self) -> Result<(), SyntaxError> {
        loop {
            match (self.peek(), self.peek_at(1)) {
                (Some(c), _) if c.is_whitespace() => {
                    self.bump();
                }
                (Some('/'), Some('/')) => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                (Some('/'), Some('*')) => {
                    let start = self.position();
                    self.bump();
                    self.bump();
                    loop {
                        match (self.peek(), self.peek_at(1)) {
                            (Some('*'), Some('/')) => {
                                self.bump();
                                self.bump();
                                break;
                            }
                            (Some(_), _) => {
                                self.bump();
                            }
                            (None, _) => {
                                return Err(self.error(start, "'*/'", "unterminated comment"));
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, SyntaxError> {
        self.skip_trivia()?;
        let pos = self.position();
        let c = match self.peek() {
            Some(c) => c,
            None => {
                return Ok(Token {
                    kind: TokenKind::Eof,
                    pos,
                })
            }
        };

        let kind = match c {
            '(' | ')' | '[' | ']' | '{' | '}' | '=' | ',' | '+' | '-' | '*' => {
                self.bump();
                match c {
                    '(' => TokenKind::LParen,
                    ')' => TokenKind::RParen,
                    '[' => TokenKind::LBracket,
                    ']' => TokenKind::RBracket,
                    '{' => TokenKind::LBrace,
                    '}' => TokenKind::RBrace,
                    '=' => TokenKind::Equals,
                    ',' => TokenKind::Comma,
                    '+' => TokenKind::Plus,
                    '-' => TokenKind::Minus,
                    _ => TokenKind::Star,
                }
            }
            '@' => {
                self.bump();
                let name = self.take_while(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':');
                if name.is_empty() {
                    return Err(self.error(pos, "account name after '@'", self.found_here()));
                }
                TokenKind::Account(name)
            }
            '$' => {
                self.bump();
                let name = self.take_while(|c| c.is_ascii_alphanumeric() || c == '_');
                if name.is_empty() {
                    return Err(self.error(pos, "variable name after '$'", self.found_here()));
                }
                TokenKind::Variable(name)
            }
            '"' => {
                self.bump();
                let text = self.take_while(|c| c != '"' && c != '\n');
                if self.bump() != Some('"') {
                    return Err(self.error(pos, "closing '\"'", "unterminated string"));
                }
                TokenKind::String(text)
            }
            c if c.is_ascii_digit() => self.number(pos)?,
            c if c.is_ascii_uppercase() => {
                TokenKind::Asset(self.take_while(|c| c.is_ascii_alphanumeric() || c == '_' || c == '/'))
            }
            c if c.is_ascii_lowercase() || c == '_' => {
                let word = self.take_while(|c| c.is_ascii_alphanumeric() || c == '_');
                if let Some(keyword) = Keyword::from_word(&word) {
                    TokenKind::Keyword(keyword)
                } else if let Some(ty) = ValueType::from_keyword(&word) {
                    TokenKind::Type(ty)
                } else {
                    TokenKind::Word(word)
                }
            }
            other => {
                return Err(self.error(pos, "a token", format!("'{}'", other)));
            }
        };

        Ok(Token { kind, pos })
    }

    fn found_here(&self) -> String {
        match self.peek() {
            Some(c) if !c.is_whitespace() => format!("'{}'", c),
            Some(_) => "whitespace".to_string(),
            None => "end of input".to_string(),
        }
    }

    /// Numbers, percentages and fractions
    fn number(&mut self, pos: SourcePosition) -> Result<TokenKind, SyntaxError> {
        let start = self.index;
        let digits = self.take_while(|c| c.is_ascii_digit());

        match self.peek() {
            Some('%') => {
                self.bump();
                return self.portion(pos, start);
            }
            Some('.') => {
                self.bump();
                let decimals = self.take_while(|c| c.is_ascii_digit());
                if decimals.is_empty() || self.peek() != Some('%') {
                    return Err(self.error(pos, "a percentage such as '12.5%'", self.found_here()));
                }
                self.bump();
                return self.portion(pos, start);
            }
            _ => {}
        }

        // a fraction may have spaces around its slash
        let mut offset = 0;
        while matches!(self.peek_at(offset), Some(' ') | Some('\t')) {
            offset += 1;
        }
        if self.peek_at(offset) == Some('/') {
            let mut after = offset + 1;
            while matches!(self.peek_at(after), Some(' ') | Some('\t')) {
                after += 1;
            }
            if self.peek_at(after).map_or(false, |c| c.is_ascii_digit()) {
                for _ in 0..after {
                    self.bump();
                }
                self.take_while(|c| c.is_ascii_digit());
                return self.portion(pos, start);
            }
        }

        digits
            .parse::<BigInt>()
            .map(TokenKind::Number)
            .map_err(|_| self.error(pos, "a number", digits.clone()))
    }

    fn portion(&self, pos: SourcePosition, start: usize) -> Result<TokenKind, SyntaxError> {
        let text: String = self.chars[start..self.index].iter().collect();
        crate::typed::parse_ratio(&text)
            .map(TokenKind::Portion)
            .map_err(|_| self.error(pos, "a portion", text))
    }
}
