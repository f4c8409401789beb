use ordered_float::OrderedFloat;
use smol_str::SmolStr;

use crate::{types::Type, DeclRef, Span};

/// An expression with its upstream inferred type.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, PartialEq, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    #[cfg_attr(feature = "serde", serde(default))]
    pub ty: Option<Type>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub span: Span,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, PartialEq, Clone)]
pub enum ExprKind {
    Literal(Literal),
    /// A name like `tex` resolved to its declaration.
    /// Intrinsics like `lerp` have no declaration.
    Variable {
        name: SmolStr,
        decl: Option<DeclRef>,
    },
    /// A field or swizzle access like `a.xyz` or a method target like `tex.Sample`.
    Member {
        target: Box<Expr>,
        member: SmolStr,
    },
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        target: Box<Expr>,
        args: Vec<Expr>,
    },
    /// A type constructor like `float4(a, 1.0)`.
    Constructor {
        ty: Type,
        args: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Assign {
        op: AssignOp,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Conditional {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Parenthesized(Box<Expr>),
    Cast {
        ty: Type,
        expr: Box<Expr>,
    },
    /// A comma separated sequence like `a = 1, b = 2`.
    List(Vec<Expr>),
    /// An aggregate initializer like `{1, 2, 3}`.
    Initializer(Vec<Expr>),
    /// `break`, `continue`, or `discard` parsed in expression position.
    Keyword(Keyword),
    /// An effect state block like `sampler_state { Filter = LINEAR; }`.
    StateInitializer(Vec<StateAssignment>),
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, PartialEq, Clone)]
pub enum Literal {
    Bool(bool),
    Int(i64),
    Uint(u64),
    /// A float constant like `1.0`, `0.5f`, or `2.0h`.
    Float {
        value: OrderedFloat<f64>,
        suffix: Option<char>,
    },
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Keyword {
    Break,
    Continue,
    Discard,
}

impl Keyword {
    pub fn name(&self) -> &'static str {
        match self {
            Keyword::Break => "break",
            Keyword::Continue => "continue",
            Keyword::Discard => "discard",
        }
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, PartialEq, Clone)]
pub struct StateAssignment {
    pub name: SmolStr,
    pub value: Expr,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum UnaryOp {
    Negate,
    Plus,
    Not,
    Complement,
    PreIncrement,
    PreDecrement,
    PostIncrement,
    PostDecrement,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    LeftShift,
    RightShift,
    BitOr,
    BitXor,
    BitAnd,
    Equal,
    NotEqual,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    Or,
    And,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::LeftShift => "<<",
            BinaryOp::RightShift => ">>",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::BitAnd => "&",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Less => "<",
            BinaryOp::Greater => ">",
            BinaryOp::LessEqual => "<=",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
        }
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum AssignOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    LeftShift,
    RightShift,
    BitAnd,
    BitOr,
    BitXor,
}

impl AssignOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            AssignOp::Assign => "=",
            AssignOp::Add => "+=",
            AssignOp::Sub => "-=",
            AssignOp::Mul => "*=",
            AssignOp::Div => "/=",
            AssignOp::Mod => "%=",
            AssignOp::LeftShift => "<<=",
            AssignOp::RightShift => ">>=",
            AssignOp::BitAnd => "&=",
            AssignOp::BitOr => "|=",
            AssignOp::BitXor => "^=",
        }
    }
}

impl Expr {
    pub fn new(kind: ExprKind) -> Self {
        Self {
            kind,
            ty: None,
            span: Span::default(),
        }
    }

    pub fn with_type(mut self, ty: Type) -> Self {
        self.ty = Some(ty);
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// A reference to a declared variable or method.
    pub fn reference(name: impl Into<SmolStr>, decl: DeclRef) -> Self {
        Self::new(ExprKind::Variable {
            name: name.into(),
            decl: Some(decl),
        })
    }

    /// An unresolved name like an intrinsic function.
    pub fn name(name: impl Into<SmolStr>) -> Self {
        Self::new(ExprKind::Variable {
            name: name.into(),
            decl: None,
        })
    }

    pub fn member(target: Expr, member: impl Into<SmolStr>) -> Self {
        Self::new(ExprKind::Member {
            target: Box::new(target),
            member: member.into(),
        })
    }

    pub fn index(target: Expr, index: Expr) -> Self {
        Self::new(ExprKind::Index {
            target: Box::new(target),
            index: Box::new(index),
        })
    }

    pub fn call(target: Expr, args: Vec<Expr>) -> Self {
        Self::new(ExprKind::Call {
            target: Box::new(target),
            args,
        })
    }

    /// A call to an intrinsic like `texture(s, uv)`.
    pub fn function(name: impl Into<SmolStr>, args: Vec<Expr>) -> Self {
        Self::call(Self::name(name), args)
    }

    /// A call like `tex.Sample(samp, uv)`.
    pub fn method_call(object: Expr, method: impl Into<SmolStr>, args: Vec<Expr>) -> Self {
        Self::call(Self::member(object, method), args)
    }

    pub fn constructor(ty: Type, args: Vec<Expr>) -> Self {
        Self::new(ExprKind::Constructor { ty, args })
    }

    pub fn unary(op: UnaryOp, expr: Expr) -> Self {
        Self::new(ExprKind::Unary {
            op,
            expr: Box::new(expr),
        })
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Self::new(ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn assign(op: AssignOp, target: Expr, value: Expr) -> Self {
        Self::new(ExprKind::Assign {
            op,
            target: Box::new(target),
            value: Box::new(value),
        })
    }

    pub fn parenthesized(expr: Expr) -> Self {
        let ty = expr.ty.clone();
        Self {
            kind: ExprKind::Parenthesized(Box::new(expr)),
            ty,
            span: Span::default(),
        }
    }

    pub fn keyword(keyword: Keyword) -> Self {
        Self::new(ExprKind::Keyword(keyword))
    }

    pub fn float(value: f64) -> Self {
        Self::new(ExprKind::Literal(Literal::Float {
            value: value.into(),
            suffix: None,
        }))
        .with_type(Type::float())
    }

    pub fn int(value: i64) -> Self {
        Self::new(ExprKind::Literal(Literal::Int(value))).with_type(Type::int())
    }

    pub fn bool(value: bool) -> Self {
        Self::new(ExprKind::Literal(Literal::Bool(value))).with_type(Type::bool())
    }

    /// The declaration of a plain name expression.
    pub fn decl(&self) -> Option<DeclRef> {
        match &self.kind {
            ExprKind::Variable { decl, .. } => *decl,
            _ => None,
        }
    }

    /// Strip member and index accesses like `a.b[i].x` down to the root name `a`.
    pub fn root(&self) -> &Expr {
        match &self.kind {
            ExprKind::Member { target, .. } | ExprKind::Index { target, .. } => target.root(),
            ExprKind::Parenthesized(e) => e.root(),
            _ => self,
        }
    }

    /// The name of an unresolved function call target like `lerp` in `lerp(a, b, t)`.
    pub fn intrinsic_name(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Variable { name, decl: None } => Some(name),
            _ => None,
        }
    }

    pub fn is_keyword(&self, keyword: Keyword) -> bool {
        matches!(&self.kind, ExprKind::Keyword(k) if *k == keyword)
    }
}

/// The number of components written by a swizzle like `xy` or `_m00_m11`.
/// Returns `None` if `member` is not a swizzle.
pub fn swizzle_len(member: &str) -> Option<usize> {
    if member.starts_with('_') {
        // Matrix swizzles like _m00_m01 or _11_12.
        let parts: Vec<_> = member.split('_').skip(1).collect();
        let valid = parts.iter().all(|&p| {
            let p = p.strip_prefix('m').unwrap_or(p);
            p.len() == 2 && p.chars().all(|c| c.is_ascii_digit())
        });
        (valid && !parts.is_empty()).then_some(parts.len())
    } else if !member.is_empty()
        && member.len() <= 4
        && (member.chars().all(|c| "xyzw".contains(c)) || member.chars().all(|c| "rgba".contains(c)))
    {
        Some(member.len())
    } else {
        None
    }
}
