//! Recursive-descent parser building the syntax tree from tokens

use super::ast::*;
use super::lexer::{tokenize, Keyword, Token, TokenKind};
use super::SourcePosition;
use thiserror::Error;

/// Malformed source text
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Syntax error at {pos}: expected {expected}, found {found}")]
pub struct SyntaxError {
    pub pos: SourcePosition,
    pub expected: String,
    pub found: String,
}

impl SyntaxError {
    pub fn new(pos: SourcePosition, expected: &str, found: impl Into<String>) -> Self {
        Self {
            pos,
            expected: expected.to_string(),
            found: found.into(),
        }
    }
}

/// Deepest nesting of blocks, and longest operator chain in one expression
pub const MAX_NESTING: usize = 64;

/// Parse source text into a script
pub fn parse(source: &str) -> Result<Script, SyntaxError> {
    let tokens = tokenize(source)?;
    Parser::new(tokens).script()
}

struct Parser {
    tokens: Vec<Token>,
    index: usize,
    depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            index: 0,
            depth: 0,
        }
    }

    /// Run a parse one nesting level deeper
    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, SyntaxError>,
    ) -> Result<T, SyntaxError> {
        if self.depth >= MAX_NESTING {
            let expected = format!("at most {} levels of nesting", MAX_NESTING);
            return Err(self.unexpected(&expected));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[(self.index + offset).min(last)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.index += 1;
        }
        token
    }

    fn at(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn at_keyword(&self, keyword: Keyword) -> bool {
        self.at(&TokenKind::Keyword(keyword))
    }

    fn unexpected(&self, expected: &str) -> SyntaxError {
        let token = self.peek();
        SyntaxError::new(token.pos, expected, token.kind.to_string())
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> Result<Token, SyntaxError> {
        if self.at(&kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> Result<Token, SyntaxError> {
        let expected = format!("'{}'", keyword.as_str());
        self.expect(TokenKind::Keyword(keyword), &expected)
    }

    fn string(&mut self) -> Result<String, SyntaxError> {
        match self.peek().kind.clone() {
            TokenKind::String(s) => {
                self.advance();
                Ok(s)
            }
            _ => Err(self.unexpected("a string")),
        }
    }

    fn script(&mut self) -> Result<Script, SyntaxError> {
        let vars = if self.at_keyword(Keyword::Vars) {
            self.vars()?
        } else {
            Vec::new()
        };

        let mut statements = Vec::new();
        while !self.at(&TokenKind::Eof) {
            statements.push(self.statement()?);
        }
        if statements.is_empty() {
            return Err(self.unexpected("a statement"));
        }

        Ok(Script { vars, statements })
    }

    fn vars(&mut self) -> Result<Vec<VarDecl>, SyntaxError> {
        self.expect_keyword(Keyword::Vars)?;
        self.expect(TokenKind::LBrace, "'{'")?;

        let mut vars = Vec::new();
        while !self.at(&TokenKind::RBrace) {
            let pos = self.peek().pos;
            let ty = match self.peek().kind {
                TokenKind::Type(ty) => ty,
                _ => return Err(self.unexpected("a type or '}'")),
            };
            self.advance();

            let name = match self.peek().kind.clone() {
                TokenKind::Variable(name) => name,
                _ => return Err(self.unexpected("a variable name")),
            };
            self.advance();

            let origin = if self.at(&TokenKind::Equals) {
                self.advance();
                Some(self.origin()?)
            } else {
                None
            };

            vars.push(VarDecl {
                ty,
                name,
                origin,
                pos,
            });
        }
        self.advance();

        Ok(vars)
    }

    fn origin(&mut self) -> Result<Origin, SyntaxError> {
        if self.at_keyword(Keyword::Meta) {
            self.advance();
            self.expect(TokenKind::LParen, "'('")?;
            let account = self.expr()?;
            self.expect(TokenKind::Comma, "','")?;
            let key = self.string()?;
            self.expect(TokenKind::RParen, "')'")?;
            Ok(Origin::Meta { account, key })
        } else if self.at_keyword(Keyword::Balance) {
            self.advance();
            self.expect(TokenKind::LParen, "'('")?;
            let account = self.expr()?;
            self.expect(TokenKind::Comma, "','")?;
            let asset = self.expr()?;
            self.expect(TokenKind::RParen, "')'")?;
            Ok(Origin::Balance { account, asset })
        } else {
            Err(self.unexpected("'meta' or 'balance'"))
        }
    }

    fn statement(&mut self) -> Result<Statement, SyntaxError> {
        let pos = self.peek().pos;
        let keyword = match self.peek().kind {
            TokenKind::Keyword(keyword) => keyword,
            _ => return Err(self.unexpected("a statement")),
        };

        match keyword {
            Keyword::Send => {
                self.advance();
                let amount = self.send_amount()?;
                self.expect(TokenKind::LParen, "'('")?;
                let (source, destination) = if self.at_keyword(Keyword::Destination) {
                    let destination = self.destination_clause()?;
                    let source = self.source_clause()?;
                    (source, destination)
                } else {
                    let source = self.source_clause()?;
                    let destination = self.destination_clause()?;
                    (source, destination)
                };
                self.expect(TokenKind::RParen, "')'")?;
                Ok(Statement::Send {
                    amount,
                    source,
                    destination,
                    pos,
                })
            }
            Keyword::Save => {
                self.advance();
                let amount = self.send_amount()?;
                self.expect_keyword(Keyword::From)?;
                let account = self.primary()?;
                Ok(Statement::Save {
                    amount,
                    account,
                    pos,
                })
            }
            Keyword::SetTxMeta => {
                self.advance();
                self.expect(TokenKind::LParen, "'('")?;
                let key = self.string()?;
                self.expect(TokenKind::Comma, "','")?;
                let value = self.expr()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(Statement::SetTxMeta { key, value, pos })
            }
            Keyword::SetAccountMeta => {
                self.advance();
                self.expect(TokenKind::LParen, "'('")?;
                let account = self.expr()?;
                self.expect(TokenKind::Comma, "','")?;
                let key = self.string()?;
                self.expect(TokenKind::Comma, "','")?;
                let value = self.expr()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(Statement::SetAccountMeta {
                    account,
                    key,
                    value,
                    pos,
                })
            }
            Keyword::Print => {
                self.advance();
                let value = self.expr()?;
                Ok(Statement::Print { value, pos })
            }
            Keyword::Fail => {
                self.advance();
                Ok(Statement::Fail { pos })
            }
            _ => Err(self.unexpected("a statement")),
        }
    }

    fn source_clause(&mut self) -> Result<ValueAwareSource, SyntaxError> {
        self.expect_keyword(Keyword::Source)?;
        self.expect(TokenKind::Equals, "'='")?;
        self.value_aware_source()
    }

    fn destination_clause(&mut self) -> Result<Destination, SyntaxError> {
        self.expect_keyword(Keyword::Destination)?;
        self.expect(TokenKind::Equals, "'='")?;
        self.destination()
    }

    /// `[ASSET *]` or a monetary expression
    fn send_amount(&mut self) -> Result<SendAmount, SyntaxError> {
        if self.at(&TokenKind::LBracket) && self.peek_at(2).kind == TokenKind::Star {
            self.advance();
            let asset = self.primary()?;
            self.expect(TokenKind::Star, "'*'")?;
            self.expect(TokenKind::RBracket, "']'")?;
            return Ok(SendAmount::All { asset });
        }
        Ok(SendAmount::Monetary(self.expr()?))
    }

    fn expr(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.primary()?;
        let mut operators = 0;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            operators += 1;
            if operators > MAX_NESTING {
                let expected = format!("at most {} operators in an expression", MAX_NESTING);
                return Err(self.unexpected(&expected));
            }
            let pos = self.advance().pos;
            let rhs = self.primary()?;
            lhs = Expr::new(
                ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                pos,
            );
        }
    }

    fn primary(&mut self) -> Result<Expr, SyntaxError> {
        let token = self.peek().clone();
        let kind = match token.kind {
            TokenKind::Account(name) => ExprKind::Literal(Literal::Account(name)),
            TokenKind::Asset(name) => ExprKind::Literal(Literal::Asset(name)),
            TokenKind::Number(n) => ExprKind::Literal(Literal::Number(n)),
            TokenKind::String(s) => ExprKind::Literal(Literal::String(s)),
            TokenKind::Portion(ratio) => ExprKind::Literal(Literal::Portion(ratio)),
            TokenKind::Variable(name) => ExprKind::Variable(name),
            TokenKind::LBracket => {
                self.advance();
                let asset = self.nested(Self::primary)?;
                let amount = match self.peek().kind.clone() {
                    TokenKind::Number(n) => n,
                    _ => return Err(self.unexpected("an amount")),
                };
                self.advance();
                self.expect(TokenKind::RBracket, "']'")?;
                return Ok(Expr::new(
                    ExprKind::Literal(Literal::Monetary {
                        asset: Box::new(asset),
                        amount,
                    }),
                    token.pos,
                ));
            }
            _ => return Err(self.unexpected("an expression")),
        };
        self.advance();
        Ok(Expr::new(kind, token.pos))
    }

    /// Whether the tokens after an opening brace start an allotment clause
    fn allotment_ahead(&self) -> bool {
        match self.peek_at(1).kind {
            TokenKind::Portion(_) | TokenKind::Keyword(Keyword::Remaining) => true,
            TokenKind::Variable(_) => self.peek_at(2).kind == TokenKind::Keyword(Keyword::From),
            _ => false,
        }
    }

    fn value_aware_source(&mut self) -> Result<ValueAwareSource, SyntaxError> {
        if !(self.at(&TokenKind::LBrace) && self.allotment_ahead()) {
            return Ok(ValueAwareSource::Source(self.source()?));
        }

        let pos = self.advance().pos;
        let mut clauses = Vec::new();
        while !self.at(&TokenKind::RBrace) {
            let clause_pos = self.peek().pos;
            let portion = self.allotment_portion()?;
            self.expect_keyword(Keyword::From)?;
            let target = self.nested(Self::value_aware_source)?;
            let is_remaining = portion == AllotmentPortion::Remaining;
            clauses.push(AllotmentClause {
                portion,
                target,
                pos: clause_pos,
            });
            if is_remaining && !self.at(&TokenKind::RBrace) {
                return Err(self.unexpected("'}' after the remaining clause"));
            }
        }
        self.advance();

        Ok(ValueAwareSource::Allotment { clauses, pos })
    }

    fn allotment_portion(&mut self) -> Result<AllotmentPortion, SyntaxError> {
        let portion = match self.peek().kind.clone() {
            TokenKind::Portion(ratio) => AllotmentPortion::Literal(ratio),
            TokenKind::Variable(name) => AllotmentPortion::Variable(name),
            TokenKind::Keyword(Keyword::Remaining) => AllotmentPortion::Remaining,
            _ => return Err(self.unexpected("a portion")),
        };
        self.advance();
        Ok(portion)
    }

    fn source(&mut self) -> Result<Source, SyntaxError> {
        if self.at_keyword(Keyword::Max) {
            self.advance();
            let max = self.expr()?;
            self.expect_keyword(Keyword::From)?;
            let source = self.nested(Self::source)?;
            return Ok(Source::Maxed {
                max,
                source: Box::new(source),
            });
        }

        if self.at(&TokenKind::LBrace) {
            let pos = self.advance().pos;
            let mut sources = Vec::new();
            while !self.at(&TokenKind::RBrace) {
                sources.push(self.nested(Self::source)?);
            }
            if sources.is_empty() {
                return Err(self.unexpected("a source"));
            }
            self.advance();
            return Ok(Source::InOrder { sources, pos });
        }

        let account = self.primary()?;
        let overdraft = if self.at_keyword(Keyword::Allowing) {
            self.advance();
            if self.at_keyword(Keyword::Unbounded) {
                self.advance();
                self.expect_keyword(Keyword::Overdraft)?;
                Some(Overdraft::Unbounded)
            } else {
                self.expect_keyword(Keyword::Overdraft)?;
                self.expect_keyword(Keyword::Up)?;
                self.expect_keyword(Keyword::To)?;
                Some(Overdraft::Bounded(self.expr()?))
            }
        } else {
            None
        };

        Ok(Source::Account { account, overdraft })
    }

    fn destination(&mut self) -> Result<Destination, SyntaxError> {
        if !self.at(&TokenKind::LBrace) {
            return Ok(Destination::Account(self.primary()?));
        }

        let pos = self.advance().pos;
        if self.at_keyword(Keyword::Max) {
            return self.in_order_destination(pos);
        }

        let mut clauses = Vec::new();
        while !self.at(&TokenKind::RBrace) {
            let clause_pos = self.peek().pos;
            let portion = self.allotment_portion()?;
            let target = self.kept_or_destination()?;
            let is_remaining = portion == AllotmentPortion::Remaining;
            clauses.push(AllotmentClause {
                portion,
                target,
                pos: clause_pos,
            });
            if is_remaining && !self.at(&TokenKind::RBrace) {
                return Err(self.unexpected("'}' after the remaining clause"));
            }
        }
        if clauses.is_empty() {
            return Err(self.unexpected("a portion or 'max'"));
        }
        self.advance();

        Ok(Destination::Allotment { clauses, pos })
    }

    fn in_order_destination(&mut self, pos: SourcePosition) -> Result<Destination, SyntaxError> {
        let mut clauses = Vec::new();
        while self.at_keyword(Keyword::Max) {
            self.advance();
            let max = self.expr()?;
            let target = self.kept_or_destination()?;
            clauses.push((max, target));
        }
        self.expect_keyword(Keyword::Remaining)?;
        let remaining = self.kept_or_destination()?;
        self.expect(TokenKind::RBrace, "'}'")?;

        Ok(Destination::InOrder {
            clauses,
            remaining: Box::new(remaining),
            pos,
        })
    }

    fn kept_or_destination(&mut self) -> Result<KeptOrDestination, SyntaxError> {
        match self.peek().kind {
            TokenKind::Keyword(Keyword::Kept) => {
                self.advance();
                Ok(KeptOrDestination::Kept)
            }
            TokenKind::Keyword(Keyword::To) | TokenKind::Keyword(Keyword::From) => {
                self.advance();
                Ok(KeptOrDestination::Destination(self.nested(Self::destination)?))
            }
            _ => Err(self.unexpected("'to' or 'kept'")),
        }
    }
}
