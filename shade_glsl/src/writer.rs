//! Print a converted shader as GLSL text.
//!
//! The writer assumes earlier passes already replaced every texture access
//! with a combined sampler, so textures and separate samplers are simply skipped.
use std::collections::BTreeMap;

use shade_ast::{
    ConstantBuffer, DeclRef, Declaration, Expr, ExprKind, LayoutEntry, Literal, MethodId,
    Qualifier, ScalarType, Shader, Statement, StatementKind, StructType, SwitchCase, Type,
    UnaryOp, VarId, Variable,
};

use crate::{
    diagnostics::Diagnostics,
    uniforms::{is_uniform_global, UniformUsage},
    Dialect, GlslOptions,
};

const INDENT: &str = "    ";

/// Sampler types without a default precision in GLSL ES 3.x.
const ES_LOWP_SAMPLERS: &[&str] = &[
    "sampler3D",
    "samplerCubeShadow",
    "sampler2DShadow",
    "sampler2DArray",
    "sampler2DArrayShadow",
    "isampler2D",
    "isampler3D",
    "isamplerCube",
    "isampler2DArray",
    "usampler2D",
    "usampler3D",
    "usamplerCube",
    "usampler2DArray",
];

const ES_LOWP_BUFFER_SAMPLERS: &[&str] = &["samplerBuffer", "isamplerBuffer", "usamplerBuffer"];

/// Write the GLSL for `shader` with `entry` renamed to `main`.
pub fn write_glsl(
    shader: &Shader,
    entry: MethodId,
    options: &GlslOptions,
    uniforms: &UniformUsage,
    diagnostics: &mut Diagnostics,
) -> String {
    GlslWriter::new(shader, options, uniforms).write(entry, diagnostics)
}

/// The GLSL for a missing pixel shader that only writes depth.
pub fn write_stub_glsl(options: &GlslOptions) -> String {
    let mut output = preamble(options);
    output += "\nvoid main() {\n";
    output += &format!("{INDENT}gl_FragDepth = gl_FragCoord.z;\n");
    output += "}\n";
    output
}

pub struct GlslWriter<'a> {
    shader: &'a Shader,
    options: &'a GlslOptions,
    uniforms: &'a UniformUsage,
    /// Writable copies of uniforms modified by the shader.
    copies: BTreeMap<VarId, String>,
}

impl<'a> GlslWriter<'a> {
    pub fn new(shader: &'a Shader, options: &'a GlslOptions, uniforms: &'a UniformUsage) -> Self {
        let copies = uniforms
            .written
            .iter()
            .filter(|id| !uniforms.is_temporary(**id) && is_uniform_global(shader, **id))
            .map(|id| (*id, format!("local_{}", shader.variable(*id).name)))
            .collect();

        Self {
            shader,
            options,
            uniforms,
            copies,
        }
    }

    pub fn write(&self, entry: MethodId, diagnostics: &mut Diagnostics) -> String {
        let mut output = preamble(self.options);

        let mut previous_block = None;
        for declaration in &self.shader.declarations {
            let text = match declaration {
                Declaration::Variable(id) => self.global_glsl(*id, diagnostics),
                Declaration::Method(id) => self.method_glsl(*id, entry),
                Declaration::ConstantBuffer(buffer) => self.buffer_glsl(buffer, diagnostics),
                Declaration::Struct(s) => self.struct_glsl(s),
                Declaration::Typedef { .. }
                | Declaration::Class { .. }
                | Declaration::Interface { .. }
                | Declaration::Technique { .. } => String::new(),
            };
            if text.is_empty() {
                continue;
            }

            // Separate blocks from the surrounding declarations.
            let is_block = !matches!(declaration, Declaration::Variable(_))
                && !(matches!(declaration, Declaration::ConstantBuffer(_))
                    && !self.options.uniform_blocks);
            match previous_block {
                None => output.push('\n'),
                Some(previous) if previous || is_block => output.push('\n'),
                _ => (),
            }
            previous_block = Some(is_block);

            output += &text;
        }

        output
    }

    fn global_glsl(&self, id: VarId, diagnostics: &mut Diagnostics) -> String {
        let var = self.shader.variable(id);
        if !is_printed_type(&var.ty) {
            return String::new();
        }

        let is_uniform = is_uniform_global(self.shader, id) && !self.uniforms.is_temporary(id);
        let mut initializer = self.var_initializer(var);
        if is_uniform && initializer.is_some() && self.options.dialect == Dialect::Es {
            diagnostics.warning(
                format!("initializer for uniform {} is not supported and was removed", var.name),
                var.span,
            );
            initializer = None;
        }

        let mut output = layout_glsl(&var.layout);
        output += &qualifiers_glsl(var, is_uniform);
        output += &declarator(&var.ty, &var.name);
        if let Some(init) = initializer {
            output += &format!(" = {init}");
        }
        output += ";\n";

        if let Some(copy) = self.copies.get(&id) {
            output += &format!("{};\n", declarator(&var.ty, copy));
        }
        output
    }

    fn method_glsl(&self, id: MethodId, entry: MethodId) -> String {
        let method = self.shader.method(id);
        if method.builtin {
            return String::new();
        }

        let name = if id == entry { "main" } else { method.name.as_str() };
        let parameters: Vec<_> = method
            .parameters
            .iter()
            .map(|p| self.shader.variable(*p))
            .filter(|p| is_printed_type(&p.ty))
            .map(|p| format!("{}{}", qualifiers_glsl(p, false), declarator(&p.ty, &p.name)))
            .collect();

        let mut output = format!(
            "{} {name}({}) {{\n",
            type_glsl(&method.return_type),
            parameters.join(", ")
        );
        if id == entry {
            for (var, copy) in &self.copies {
                output += &format!("{INDENT}{copy} = {};\n", self.shader.variable(*var).name);
            }
        }
        for statement in &method.body {
            output += &self.statement_glsl(statement, 1);
        }
        output += "}\n";
        output
    }

    fn buffer_glsl(&self, buffer: &ConstantBuffer, diagnostics: &mut Diagnostics) -> String {
        let mut members = String::new();
        for member in &buffer.members {
            let var = self.shader.variable(*member);
            if var.initializer.is_some() {
                diagnostics.warning(
                    format!(
                        "initializer for {} in constant buffer {} was removed",
                        var.name, buffer.name
                    ),
                    var.span,
                );
            }

            if self.options.uniform_blocks {
                members += &format!("{INDENT}{};\n", declarator(&var.ty, &var.name));
            } else {
                members += &format!("uniform {};\n", declarator(&var.ty, &var.name));
            }
        }

        if !self.options.uniform_blocks || members.is_empty() {
            return members;
        }

        let binding = buffer
            .register
            .as_ref()
            .and_then(|r| r.strip_prefix(['b', 'B']))
            .and_then(|r| r.parse::<u32>().ok())
            .filter(|_| self.supports_binding());
        let layout = match binding {
            Some(binding) => format!("layout(std140, binding = {binding})"),
            None => "layout(std140)".to_string(),
        };
        format!("{layout} uniform {} {{\n{members}}};\n", buffer.name)
    }

    fn supports_binding(&self) -> bool {
        match self.options.dialect {
            Dialect::Desktop => self.options.version >= 420,
            Dialect::Es => self.options.version >= 310,
            Dialect::Vulkan => true,
        }
    }

    fn struct_glsl(&self, s: &StructType) -> String {
        let mut output = format!("struct {} {{\n", s.name);
        for field in &s.fields {
            output += &format!("{INDENT}{};\n", declarator(&field.ty, &field.name));
        }
        output += "};\n";
        output
    }

    /// The GLSL for `statement` at the given indentation level.
    /// Each line including the last ends with a newline.
    pub fn statement_glsl(&self, statement: &Statement, indent: usize) -> String {
        let pad = INDENT.repeat(indent);
        match &statement.kind {
            StatementKind::Expression(e) => format!("{pad}{};\n", self.expr_glsl(e)),
            StatementKind::Declaration(vars) => vars
                .iter()
                .filter_map(|v| self.local_glsl(*v))
                .map(|l| format!("{pad}{l};\n"))
                .collect(),
            StatementKind::Block(statements) => {
                format!("{pad}{{\n{}{pad}}}\n", self.statements_glsl(statements, indent + 1))
            }
            StatementKind::List(statements) => self.statements_glsl(statements, indent),
            StatementKind::If { .. } => format!("{pad}{}", self.if_glsl(statement, indent)),
            StatementKind::For {
                init,
                condition,
                step,
                body,
                ..
            } => {
                let init = init
                    .as_ref()
                    .map(|i| self.inline_statement_glsl(i))
                    .unwrap_or_default();
                let condition = condition
                    .as_ref()
                    .map(|c| format!(" {}", self.expr_glsl(c)))
                    .unwrap_or_default();
                let step = step
                    .as_ref()
                    .map(|s| format!(" {}", self.expr_glsl(s)))
                    .unwrap_or_default();
                format!(
                    "{pad}for ({init};{condition};{step}) {{\n{}{pad}}}\n",
                    self.body_glsl(body, indent)
                )
            }
            StatementKind::While {
                condition,
                body,
                do_while,
                ..
            } => {
                let condition = self.expr_glsl(condition);
                let body = self.body_glsl(body, indent);
                if *do_while {
                    format!("{pad}do {{\n{body}{pad}}} while ({condition});\n")
                } else {
                    format!("{pad}while ({condition}) {{\n{body}{pad}}}\n")
                }
            }
            StatementKind::Switch { selector, cases } => {
                let mut output = format!("{pad}switch ({}) {{\n", self.expr_glsl(selector));
                for case in cases {
                    output += &self.case_glsl(case, indent + 1);
                }
                output += &format!("{pad}}}\n");
                output
            }
            StatementKind::Return(Some(e)) => format!("{pad}return {};\n", self.expr_glsl(e)),
            StatementKind::Return(None) => format!("{pad}return;\n"),
            StatementKind::Asm(_) | StatementKind::Empty => String::new(),
        }
    }

    fn statements_glsl(&self, statements: &[Statement], indent: usize) -> String {
        statements
            .iter()
            .map(|s| self.statement_glsl(s, indent))
            .collect()
    }

    /// The contents of a braced body with single statements wrapped in braces.
    fn body_glsl(&self, body: &Statement, indent: usize) -> String {
        match &body.kind {
            StatementKind::Block(statements) => self.statements_glsl(statements, indent + 1),
            _ => self.statement_glsl(body, indent + 1),
        }
    }

    /// An if statement without leading indentation so else if chains stay on one line.
    fn if_glsl(&self, statement: &Statement, indent: usize) -> String {
        let StatementKind::If {
            condition,
            then,
            otherwise,
        } = &statement.kind
        else {
            return self.statement_glsl(statement, indent);
        };

        let pad = INDENT.repeat(indent);
        let mut output = format!(
            "if ({}) {{\n{}{pad}}}",
            self.expr_glsl(condition),
            self.body_glsl(then, indent)
        );
        match otherwise.as_deref() {
            Some(s) if matches!(s.kind, StatementKind::If { .. }) => {
                output += " else ";
                output += &self.if_glsl(s, indent);
                return output;
            }
            Some(s) => {
                output += &format!(" else {{\n{}{pad}}}", self.body_glsl(s, indent));
            }
            None => (),
        }
        output.push('\n');
        output
    }

    fn case_glsl(&self, case: &SwitchCase, indent: usize) -> String {
        let pad = INDENT.repeat(indent);
        let mut output = String::new();
        for label in &case.labels {
            match label {
                Some(l) => output += &format!("{pad}case {}:\n", self.expr_glsl(l)),
                None => output += &format!("{pad}default:\n"),
            }
        }
        output += &self.statements_glsl(&case.body, indent + 1);
        output
    }

    /// A for loop initializer without the trailing semicolon.
    fn inline_statement_glsl(&self, statement: &Statement) -> String {
        match &statement.kind {
            StatementKind::Expression(e) => self.expr_glsl(e),
            StatementKind::Declaration(vars) => {
                let mut vars = vars.iter().filter_map(|v| {
                    let var = self.shader.variable(*v);
                    is_printed_type(&var.ty).then_some(var)
                });
                let Some(first) = vars.next() else {
                    return String::new();
                };
                let mut output = self.local_declarator(first);
                for var in vars {
                    output += ", ";
                    output += &var.name;
                    output += &array_suffix(&var.ty);
                    if let Some(init) = self.var_initializer(var) {
                        output += &format!(" = {init}");
                    }
                }
                output
            }
            _ => String::new(),
        }
    }

    fn local_glsl(&self, id: VarId) -> Option<String> {
        let var = self.shader.variable(id);
        is_printed_type(&var.ty).then(|| self.local_declarator(var))
    }

    fn local_declarator(&self, var: &Variable) -> String {
        let mut output = qualifiers_glsl(var, false);
        output += &declarator(&var.ty, &var.name);
        if let Some(init) = self.var_initializer(var) {
            output += &format!(" = {init}");
        }
        output
    }

    fn var_initializer(&self, var: &Variable) -> Option<String> {
        match var.initializer.as_ref().map(|e| &e.kind) {
            Some(ExprKind::StateInitializer(_)) | None => None,
            Some(ExprKind::Initializer(values)) => Some(self.initializer_glsl(&var.ty, values)),
            Some(_) => var.initializer.as_ref().map(|e| self.expr_glsl(e)),
        }
    }

    /// An aggregate initializer like `{1, 2}` as a constructor like `float[2](1, 2)`.
    fn initializer_glsl(&self, ty: &Type, values: &[Expr]) -> String {
        let element = match ty {
            Type::Array(element, _) => Some(element.as_ref()),
            _ => None,
        };
        let args: Vec<_> = values
            .iter()
            .map(|v| match (&v.kind, element) {
                (ExprKind::Initializer(inner), Some(element)) => {
                    self.initializer_glsl(element, inner)
                }
                _ => self.expr_glsl(v),
            })
            .collect();
        format!("{}({})", constructor_type_glsl(ty), args.join(", "))
    }

    pub fn expr_glsl(&self, expr: &Expr) -> String {
        match &expr.kind {
            ExprKind::Literal(l) => self.literal_glsl(l),
            ExprKind::Variable { name, decl } => match decl {
                Some(DeclRef::Variable(id)) => self
                    .copies
                    .get(id)
                    .cloned()
                    .unwrap_or_else(|| name.to_string()),
                _ => name.to_string(),
            },
            ExprKind::Member { target, member } => {
                format!("{}.{member}", self.expr_glsl(target))
            }
            ExprKind::Index { target, index } => {
                format!("{}[{}]", self.expr_glsl(target), self.expr_glsl(index))
            }
            ExprKind::Call { target, args } => {
                format!("{}({})", self.expr_glsl(target), self.args_glsl(args))
            }
            ExprKind::Constructor { ty, args } => {
                format!("{}({})", constructor_type_glsl(ty), self.args_glsl(args))
            }
            ExprKind::Unary { op, expr } => {
                let e = self.expr_glsl(expr);
                match op {
                    UnaryOp::Negate => format!("-{e}"),
                    UnaryOp::Plus => format!("+{e}"),
                    UnaryOp::Not => format!("!{e}"),
                    UnaryOp::Complement => format!("~{e}"),
                    UnaryOp::PreIncrement => format!("++{e}"),
                    UnaryOp::PreDecrement => format!("--{e}"),
                    UnaryOp::PostIncrement => format!("{e}++"),
                    UnaryOp::PostDecrement => format!("{e}--"),
                }
            }
            ExprKind::Binary { op, left, right } => format!(
                "{} {} {}",
                self.expr_glsl(left),
                op.symbol(),
                self.expr_glsl(right)
            ),
            ExprKind::Assign { op, target, value } => format!(
                "{} {} {}",
                self.expr_glsl(target),
                op.symbol(),
                self.expr_glsl(value)
            ),
            ExprKind::Conditional {
                condition,
                then,
                otherwise,
            } => format!(
                "{} ? {} : {}",
                self.expr_glsl(condition),
                self.expr_glsl(then),
                self.expr_glsl(otherwise)
            ),
            ExprKind::Parenthesized(e) => format!("({})", self.expr_glsl(e)),
            ExprKind::Cast { ty, expr } => {
                format!("{}({})", constructor_type_glsl(ty), self.expr_glsl(expr))
            }
            ExprKind::List(exprs) => self.args_glsl(exprs),
            ExprKind::Initializer(values) => match &expr.ty {
                Some(ty) => self.initializer_glsl(ty, values),
                None => format!("{{{}}}", self.args_glsl(values)),
            },
            ExprKind::Keyword(k) => k.name().to_string(),
            ExprKind::StateInitializer(_) => String::new(),
        }
    }

    fn args_glsl(&self, args: &[Expr]) -> String {
        args.iter()
            .map(|a| self.expr_glsl(a))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn literal_glsl(&self, literal: &Literal) -> String {
        match literal {
            Literal::Bool(b) => b.to_string(),
            Literal::Int(i) => i.to_string(),
            Literal::Uint(u) => format!("{u}u"),
            Literal::Float { value, suffix } => {
                let suffix = match suffix {
                    Some('f' | 'F') if !self.options.trim_float_suffix => "f",
                    _ => "",
                };
                format!("{:?}{suffix}", value.0)
            }
        }
    }
}

/// Version, precision, and compatibility defines.
fn preamble(options: &GlslOptions) -> String {
    let mut output = match options.dialect {
        Dialect::Es if options.version >= 300 => format!("#version {} es\n", options.version),
        _ => format!("#version {}\n", options.version),
    };

    if options.dialect == Dialect::Es {
        output += "precision highp float;\n";
        if options.version >= 300 {
            for sampler in ES_LOWP_SAMPLERS {
                output += &format!("precision lowp {sampler};\n");
            }
            if options.version >= 320 || options.texture_buffer_support {
                for sampler in ES_LOWP_BUFFER_SAMPLERS {
                    output += &format!("precision lowp {sampler};\n");
                }
            }
        }

        if options.version < 320 {
            if options.texture_buffer_support {
                output += "#extension GL_EXT_texture_buffer : enable\n";
                output += "#define texelFetchBuffer(sampler, P) texelFetch(sampler, P)\n";
            } else {
                // Emulate buffers with 4096 texel wide 2D textures.
                output += "#define samplerBuffer sampler2D\n";
                output += "#define isamplerBuffer isampler2D\n";
                output += "#define usamplerBuffer usampler2D\n";
                output += "#define texelFetchBuffer(sampler, P) texelFetch(sampler, ivec2((P) & 0xFFF, (P) >> 12), 0)\n";
            }
        }
    }

    output
}

/// Textures and separate samplers only exist until fetches are converted.
fn is_printed_type(ty: &Type) -> bool {
    match ty {
        Type::Texture { .. } | Type::SamplerState { .. } | Type::Sampler(None) => false,
        Type::Array(element, _) => is_printed_type(element),
        _ => true,
    }
}

fn qualifiers_glsl(var: &Variable, uniform: bool) -> String {
    let inout = var.is_inout();
    let mut qualifiers: Vec<_> = var
        .qualifiers
        .iter()
        .filter_map(|q| {
            let (rank, name) = match q {
                Qualifier::Precise => (0, "precise"),
                Qualifier::NoInterpolation => (1, "flat"),
                Qualifier::NoPerspective => (1, "noperspective"),
                Qualifier::Centroid => (2, "centroid"),
                Qualifier::Sample => (2, "sample"),
                Qualifier::Const => (3, "const"),
                Qualifier::GroupShared => (3, "shared"),
                Qualifier::InOut => (3, "inout"),
                Qualifier::In | Qualifier::Out if inout => (3, "inout"),
                Qualifier::In => (3, "in"),
                Qualifier::Out => (3, "out"),
                _ => return None,
            };
            Some((rank, name))
        })
        .collect();
    if uniform {
        qualifiers.push((3, "uniform"));
    }
    qualifiers.sort_by_key(|(rank, _)| *rank);
    qualifiers.dedup();

    qualifiers
        .iter()
        .map(|(_, name)| format!("{name} "))
        .collect()
}

fn layout_glsl(layout: &[LayoutEntry]) -> String {
    if layout.is_empty() {
        return String::new();
    }
    let entries: Vec<_> = layout
        .iter()
        .map(|e| match &e.value {
            Some(value) => format!("{} = {value}", e.key),
            None => e.key.to_string(),
        })
        .collect();
    format!("layout({}) ", entries.join(", "))
}

/// A declaration like `vec4 colors[4]` with array sizes after the name.
fn declarator(ty: &Type, name: &str) -> String {
    let mut element = ty;
    while let Type::Array(inner, _) = element {
        element = inner;
    }
    format!("{} {name}{}", type_glsl(element), array_suffix(ty))
}

fn array_suffix(ty: &Type) -> String {
    match ty {
        Type::Array(inner, Some(size)) => format!("[{size}]{}", array_suffix(inner)),
        Type::Array(inner, None) => format!("[]{}", array_suffix(inner)),
        _ => String::new(),
    }
}

/// Type names in constructors keep array sizes like `float[2]`.
fn constructor_type_glsl(ty: &Type) -> String {
    match ty {
        Type::Array(inner, _) => {
            let mut element = inner.as_ref();
            while let Type::Array(inner, _) = element {
                element = inner;
            }
            format!("{}{}", type_glsl(element), array_suffix(ty))
        }
        _ => type_glsl(ty),
    }
}

pub fn type_glsl(ty: &Type) -> String {
    match ty {
        Type::Void => "void".to_string(),
        Type::Scalar(s) => scalar_glsl(*s).to_string(),
        Type::Vector(s, 1) => scalar_glsl(*s).to_string(),
        Type::Vector(s, n) => format!("{}vec{n}", vector_prefix(*s)),
        // HLSL floatRxC has R rows, but GLSL matCxR has C columns.
        Type::Matrix {
            scalar,
            rows,
            columns,
        } => {
            let prefix = if *scalar == ScalarType::Double { "d" } else { "" };
            if rows == columns {
                format!("{prefix}mat{rows}")
            } else {
                format!("{prefix}mat{columns}x{rows}")
            }
        }
        Type::Array(element, _) => type_glsl(element),
        Type::Texture { .. } => ty
            .texture_sampler(false)
            .map(|s| s.to_string())
            .unwrap_or_default(),
        Type::SamplerState { comparison: true } => "samplerShadow".to_string(),
        Type::SamplerState { comparison: false } => "sampler".to_string(),
        Type::Sampler(Some(s)) => s.to_string(),
        Type::Sampler(None) => "sampler2D".to_string(),
        Type::Named(name) => name.to_string(),
    }
}

fn scalar_glsl(scalar: ScalarType) -> &'static str {
    match scalar {
        ScalarType::Bool => "bool",
        ScalarType::Int => "int",
        ScalarType::Uint => "uint",
        ScalarType::Half | ScalarType::Float => "float",
        ScalarType::Double => "double",
    }
}

fn vector_prefix(scalar: ScalarType) -> &'static str {
    match scalar {
        ScalarType::Bool => "b",
        ScalarType::Int => "i",
        ScalarType::Uint => "u",
        ScalarType::Half | ScalarType::Float => "",
        ScalarType::Double => "d",
    }
}
