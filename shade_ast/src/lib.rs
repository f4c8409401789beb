//! # shade_ast
//! The resolved AST of an HLSL-like shading language.
//!
//! Parsing and name resolution happen upstream.
//! Every name reference already points to its declaration using [DeclRef],
//! and declarations live in the arenas of [Shader].
//! Arena ids are the only identity used by later analysis,
//! so two variables with the same name in different scopes never collide.
use smol_str::SmolStr;

pub mod clone;
pub mod expr;
pub mod statement;
pub mod types;
pub mod visit;

pub use expr::{AssignOp, BinaryOp, Expr, ExprKind, Keyword, Literal, StateAssignment, UnaryOp};
pub use statement::{Attribute, Statement, StatementKind, SwitchCase};
pub use types::{SamplerType, ScalarType, TextureDim, Type};

/// A byte range in the original source text.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Default)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }
}

/// The index of a [Variable] in [Shader::variables].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
pub struct VarId(pub u32);

/// The index of a [MethodDefinition] in [Shader::methods].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
pub struct MethodId(pub u32);

/// The declaration a name expression resolves to.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum DeclRef {
    Variable(VarId),
    Method(MethodId),
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum Qualifier {
    Static,
    Const,
    Uniform,
    Extern,
    Shared,
    GroupShared,
    Volatile,
    Precise,
    In,
    Out,
    InOut,
    Linear,
    Centroid,
    NoInterpolation,
    NoPerspective,
    Sample,
    RowMajor,
    ColumnMajor,
}

impl Qualifier {
    pub fn name(&self) -> &'static str {
        match self {
            Qualifier::Static => "static",
            Qualifier::Const => "const",
            Qualifier::Uniform => "uniform",
            Qualifier::Extern => "extern",
            Qualifier::Shared => "shared",
            Qualifier::GroupShared => "groupshared",
            Qualifier::Volatile => "volatile",
            Qualifier::Precise => "precise",
            Qualifier::In => "in",
            Qualifier::Out => "out",
            Qualifier::InOut => "inout",
            Qualifier::Linear => "linear",
            Qualifier::Centroid => "centroid",
            Qualifier::NoInterpolation => "nointerpolation",
            Qualifier::NoPerspective => "noperspective",
            Qualifier::Sample => "sample",
            Qualifier::RowMajor => "row_major",
            Qualifier::ColumnMajor => "column_major",
        }
    }
}

/// A single `key` or `key = value` entry of a `layout(...)` qualifier.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct LayoutEntry {
    pub key: SmolStr,
    pub value: Option<SmolStr>,
}

/// An effect annotation like `<string UIName = "Color";>`.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, PartialEq, Clone)]
pub struct Annotation {
    pub ty: Type,
    pub name: SmolStr,
    pub value: Option<Expr>,
}

/// A global, local, parameter, or constant buffer member variable.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, PartialEq, Clone)]
pub struct Variable {
    pub name: SmolStr,
    pub ty: Type,
    #[cfg_attr(feature = "serde", serde(default))]
    pub qualifiers: Vec<Qualifier>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub initializer: Option<Expr>,
    /// A semantic like `TEXCOORD0`.
    #[cfg_attr(feature = "serde", serde(default))]
    pub semantic: Option<SmolStr>,
    /// A register like `t0` or `s1`.
    #[cfg_attr(feature = "serde", serde(default))]
    pub register: Option<SmolStr>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub packoffset: Option<SmolStr>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub annotations: Vec<Annotation>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub layout: Vec<LayoutEntry>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub span: Span,
}

impl Variable {
    pub fn new(name: impl Into<SmolStr>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
            qualifiers: Vec::new(),
            initializer: None,
            semantic: None,
            register: None,
            packoffset: None,
            annotations: Vec::new(),
            layout: Vec::new(),
            span: Span::default(),
        }
    }

    pub fn with_qualifiers(mut self, qualifiers: Vec<Qualifier>) -> Self {
        self.qualifiers = qualifiers;
        self
    }

    pub fn with_initializer(mut self, initializer: Expr) -> Self {
        self.initializer = Some(initializer);
        self
    }

    pub fn with_register(mut self, register: impl Into<SmolStr>) -> Self {
        self.register = Some(register.into());
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn has_qualifier(&self, qualifier: Qualifier) -> bool {
        self.qualifiers.contains(&qualifier)
    }

    /// `true` for `out` but not `inout` or `in out` parameters.
    pub fn is_out(&self) -> bool {
        self.has_qualifier(Qualifier::Out) && !self.is_inout()
    }

    pub fn is_inout(&self) -> bool {
        self.has_qualifier(Qualifier::InOut)
            || (self.has_qualifier(Qualifier::In) && self.has_qualifier(Qualifier::Out))
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, PartialEq, Clone)]
pub struct MethodDefinition {
    pub name: SmolStr,
    pub return_type: Type,
    #[cfg_attr(feature = "serde", serde(default))]
    pub parameters: Vec<VarId>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub body: Vec<Statement>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub attributes: Vec<Attribute>,
    /// The semantic of the return value like `SV_Target`.
    #[cfg_attr(feature = "serde", serde(default))]
    pub semantic: Option<SmolStr>,
    /// Intrinsics declared by the upstream library with no body to visit.
    #[cfg_attr(feature = "serde", serde(default))]
    pub builtin: bool,
    #[cfg_attr(feature = "serde", serde(default))]
    pub span: Span,
}

impl MethodDefinition {
    pub fn new(name: impl Into<SmolStr>, return_type: Type) -> Self {
        Self {
            name: name.into(),
            return_type,
            parameters: Vec::new(),
            body: Vec::new(),
            attributes: Vec::new(),
            semantic: None,
            builtin: false,
            span: Span::default(),
        }
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum BufferKind {
    CBuffer,
    TBuffer,
}

/// A `cbuffer Name : register(b0) { ... }` declaration.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, PartialEq, Clone)]
pub struct ConstantBuffer {
    pub name: SmolStr,
    pub kind: BufferKind,
    #[cfg_attr(feature = "serde", serde(default))]
    pub register: Option<SmolStr>,
    pub members: Vec<VarId>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub span: Span,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, PartialEq, Clone)]
pub struct StructField {
    pub name: SmolStr,
    pub ty: Type,
    #[cfg_attr(feature = "serde", serde(default))]
    pub qualifiers: Vec<Qualifier>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub semantic: Option<SmolStr>,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, PartialEq, Clone)]
pub struct StructType {
    pub name: SmolStr,
    pub fields: Vec<StructField>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub span: Span,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, PartialEq, Clone)]
pub struct Pass {
    pub name: SmolStr,
    pub states: Vec<StateAssignment>,
}

/// A top level declaration in source order.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, PartialEq, Clone)]
pub enum Declaration {
    Variable(VarId),
    Method(MethodId),
    ConstantBuffer(ConstantBuffer),
    Struct(StructType),
    Typedef {
        name: SmolStr,
        ty: Type,
    },
    Class {
        name: SmolStr,
    },
    Interface {
        name: SmolStr,
    },
    Technique {
        name: SmolStr,
        passes: Vec<Pass>,
    },
}

/// A parsed and resolved shader.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, PartialEq, Clone, Default)]
pub struct Shader {
    /// Every variable including locals and parameters indexed by [VarId].
    pub variables: Vec<Variable>,
    /// Every method indexed by [MethodId].
    pub methods: Vec<MethodDefinition>,
    pub declarations: Vec<Declaration>,
}

impl Shader {
    pub fn variable(&self, id: VarId) -> &Variable {
        &self.variables[id.0 as usize]
    }

    pub fn variable_mut(&mut self, id: VarId) -> &mut Variable {
        &mut self.variables[id.0 as usize]
    }

    pub fn method(&self, id: MethodId) -> &MethodDefinition {
        &self.methods[id.0 as usize]
    }

    pub fn method_mut(&mut self, id: MethodId) -> &mut MethodDefinition {
        &mut self.methods[id.0 as usize]
    }

    /// Add a variable to the arena without declaring it anywhere.
    pub fn add_variable(&mut self, variable: Variable) -> VarId {
        self.variables.push(variable);
        VarId(self.variables.len() as u32 - 1)
    }

    /// Add a method to the arena without declaring it anywhere.
    pub fn add_method(&mut self, method: MethodDefinition) -> MethodId {
        self.methods.push(method);
        MethodId(self.methods.len() as u32 - 1)
    }

    /// Add a variable and declare it at the end of the shader.
    pub fn push_global(&mut self, variable: Variable) -> VarId {
        let id = self.add_variable(variable);
        self.declarations.push(Declaration::Variable(id));
        id
    }

    /// Add a method and declare it at the end of the shader.
    pub fn push_method(&mut self, method: MethodDefinition) -> MethodId {
        let id = self.add_method(method);
        self.declarations.push(Declaration::Method(id));
        id
    }

    /// `true` if `id` is declared at shader scope outside of constant buffers.
    pub fn is_global(&self, id: VarId) -> bool {
        self.declarations
            .iter()
            .any(|d| matches!(d, Declaration::Variable(v) if *v == id))
    }

    /// `true` if `id` is a member of a constant buffer.
    pub fn is_buffer_member(&self, id: VarId) -> bool {
        self.constant_buffers().any(|b| b.members.contains(&id))
    }

    pub fn constant_buffers(&self) -> impl Iterator<Item = &ConstantBuffer> {
        self.declarations.iter().filter_map(|d| match d {
            Declaration::ConstantBuffer(b) => Some(b),
            _ => None,
        })
    }

    /// The top level declaration index of a variable or method.
    pub fn declaration_index(&self, decl: DeclRef) -> Option<usize> {
        self.declarations.iter().position(|d| match (d, decl) {
            (Declaration::Variable(a), DeclRef::Variable(b)) => *a == b,
            (Declaration::Method(a), DeclRef::Method(b)) => *a == b,
            _ => false,
        })
    }

    /// Find the first declared method with the given name that has a body.
    pub fn find_method(&self, name: &str) -> Option<MethodId> {
        self.declarations.iter().find_map(|d| match d {
            Declaration::Method(id) => {
                let method = self.method(*id);
                (method.name == name && !method.builtin).then_some(*id)
            }
            _ => None,
        })
    }

    /// A typed reference expression to a variable.
    pub fn var_ref(&self, id: VarId) -> Expr {
        let var = self.variable(id);
        Expr::reference(var.name.clone(), DeclRef::Variable(id)).with_type(var.ty.clone())
    }
}
