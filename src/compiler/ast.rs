//! Syntax tree produced by the parser
//!
//! Account and asset literals keep their raw text; the checker validates
//! them and the emitter turns them into typed values.

use super::SourcePosition;
use crate::typed::ValueType;
use num_bigint::BigInt;
use num_rational::BigRational;

/// A parsed script: optional variable declarations followed by statements
#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    pub vars: Vec<VarDecl>,
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub ty: ValueType,
    pub name: String,
    pub origin: Option<Origin>,
    pub pos: SourcePosition,
}

/// Where a variable's value comes from when it is not supplied by the caller
#[derive(Debug, Clone, PartialEq)]
pub enum Origin {
    /// `meta(account, "key")`
    Meta { account: Expr, key: String },

    /// `balance(account, ASSET)`
    Balance { account: Expr, asset: Expr },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Send {
        amount: SendAmount,
        source: ValueAwareSource,
        destination: Destination,
        pos: SourcePosition,
    },
    Save {
        amount: SendAmount,
        account: Expr,
        pos: SourcePosition,
    },
    SetTxMeta {
        key: String,
        value: Expr,
        pos: SourcePosition,
    },
    SetAccountMeta {
        account: Expr,
        key: String,
        value: Expr,
        pos: SourcePosition,
    },
    Print {
        value: Expr,
        pos: SourcePosition,
    },
    Fail {
        pos: SourcePosition,
    },
}

/// Amount of a `send` or `save`
#[derive(Debug, Clone, PartialEq)]
pub enum SendAmount {
    /// Monetary expression
    Monetary(Expr),

    /// `[ASSET *]`: everything available
    All { asset: Expr },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub pos: SourcePosition,
}

impl Expr {
    pub fn new(kind: ExprKind, pos: SourcePosition) -> Self {
        Self { kind, pos }
    }

    /// Whether this expression is the literal `@world`
    pub fn is_world(&self) -> bool {
        matches!(&self.kind, ExprKind::Literal(Literal::Account(name)) if name == crate::typed::WORLD)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Literal),
    Variable(String),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Account(String),
    Asset(String),
    Number(BigInt),
    String(String),
    Portion(BigRational),
    /// `[ASSET amount]`, the asset being a literal or a variable
    Monetary { asset: Box<Expr>, amount: BigInt },
}

/// Source of a `send` that may split the requested amount
#[derive(Debug, Clone, PartialEq)]
pub enum ValueAwareSource {
    Source(Source),
    Allotment {
        clauses: Vec<AllotmentClause<ValueAwareSource>>,
        pos: SourcePosition,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Account {
        account: Expr,
        overdraft: Option<Overdraft>,
    },
    /// `max <monetary> from <source>`
    Maxed { max: Expr, source: Box<Source> },
    /// `{ a b c }`: drain in order
    InOrder {
        sources: Vec<Source>,
        pos: SourcePosition,
    },
}

impl Source {
    pub fn pos(&self) -> SourcePosition {
        match self {
            Source::Account { account, .. } => account.pos,
            Source::Maxed { max, .. } => max.pos,
            Source::InOrder { pos, .. } => *pos,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Overdraft {
    /// `allowing overdraft up to <monetary>`
    Bounded(Expr),
    /// `allowing unbounded overdraft`
    Unbounded,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AllotmentClause<T> {
    pub portion: AllotmentPortion,
    pub target: T,
    pub pos: SourcePosition,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AllotmentPortion {
    Literal(BigRational),
    Variable(String),
    Remaining,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Destination {
    Account(Expr),
    /// `{ max <m> to <dest> ... remaining to <dest> }`
    InOrder {
        clauses: Vec<(Expr, KeptOrDestination)>,
        remaining: Box<KeptOrDestination>,
        pos: SourcePosition,
    },
    Allotment {
        clauses: Vec<AllotmentClause<KeptOrDestination>>,
        pos: SourcePosition,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum KeptOrDestination {
    /// Funds stay with the source accounts
    Kept,
    Destination(Destination),
}
