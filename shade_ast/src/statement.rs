use smol_str::SmolStr;

use crate::{expr::Expr, Span, VarId};

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, PartialEq, Clone)]
pub struct Statement {
    pub kind: StatementKind,
    #[cfg_attr(feature = "serde", serde(default))]
    pub span: Span,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, PartialEq, Clone)]
pub enum StatementKind {
    Expression(Expr),
    /// Local variable declarations like `float a = 1.0, b;`.
    /// Initializers are stored on the declared variables.
    Declaration(Vec<VarId>),
    /// A braced block that opens a new scope.
    Block(Vec<Statement>),
    /// A sequence of statements without a new scope.
    List(Vec<Statement>),
    If {
        condition: Expr,
        then: Box<Statement>,
        otherwise: Option<Box<Statement>>,
    },
    For {
        init: Option<Box<Statement>>,
        condition: Option<Expr>,
        step: Option<Expr>,
        body: Box<Statement>,
        attributes: Vec<Attribute>,
    },
    While {
        condition: Expr,
        body: Box<Statement>,
        do_while: bool,
        attributes: Vec<Attribute>,
    },
    Switch {
        selector: Expr,
        cases: Vec<SwitchCase>,
    },
    Return(Option<Expr>),
    /// Inline assembly that has no GLSL equivalent.
    Asm(String),
    Empty,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, PartialEq, Clone)]
pub struct SwitchCase {
    /// The case labels with `None` for `default`.
    pub labels: Vec<Option<Expr>>,
    pub body: Vec<Statement>,
}

/// An attribute like `[unroll]` or `[numthreads(8, 8, 1)]`.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, PartialEq, Clone)]
pub struct Attribute {
    pub name: SmolStr,
    #[cfg_attr(feature = "serde", serde(default))]
    pub args: Vec<Expr>,
}

impl Statement {
    pub fn new(kind: StatementKind) -> Self {
        Self {
            kind,
            span: Span::default(),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn expr(expr: Expr) -> Self {
        let span = expr.span;
        Self::new(StatementKind::Expression(expr)).with_span(span)
    }

    pub fn block(statements: Vec<Statement>) -> Self {
        Self::new(StatementKind::Block(statements))
    }

    pub fn list(statements: Vec<Statement>) -> Self {
        Self::new(StatementKind::List(statements))
    }

    pub fn declaration(vars: Vec<VarId>) -> Self {
        Self::new(StatementKind::Declaration(vars))
    }

    pub fn if_then(condition: Expr, then: Statement) -> Self {
        Self::new(StatementKind::If {
            condition,
            then: Box::new(then),
            otherwise: None,
        })
    }

    /// The expression of an expression statement.
    pub fn as_expr(&self) -> Option<&Expr> {
        match &self.kind {
            StatementKind::Expression(e) => Some(e),
            _ => None,
        }
    }

    /// The statements of a block or statement list.
    pub fn statements(&self) -> Option<&Vec<Statement>> {
        match &self.kind {
            StatementKind::Block(s) | StatementKind::List(s) => Some(s),
            _ => None,
        }
    }

    pub fn statements_mut(&mut self) -> Option<&mut Vec<Statement>> {
        match &mut self.kind {
            StatementKind::Block(s) | StatementKind::List(s) => Some(s),
            _ => None,
        }
    }
}

/// Find an attribute by case insensitive name like `unroll`.
pub fn find_attribute<'a>(attributes: &'a [Attribute], name: &str) -> Option<&'a Attribute> {
    attributes.iter().find(|a| a.name.eq_ignore_ascii_case(name))
}
