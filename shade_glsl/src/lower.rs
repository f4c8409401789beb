//! Rewrite HLSL texture methods and intrinsics to their GLSL equivalents.
//!
//! Texture methods like `tex.Sample(samp, uv)` become free functions on the
//! combined sampler created by [map_samplers](crate::sampler_mapping::map_samplers).
use log::trace;
use shade_ast::{
    visit::{walk_statements_mut, VisitorMut},
    AssignOp, BinaryOp, DeclRef, Expr, ExprKind, MethodId, ScalarType, Shader, Span, Statement,
    StatementKind, TextureDim, Type, VarId,
};

use crate::{
    error::{InternalError, StructuralError, TranspileError},
    sampler_mapping::{resolve_global, SamplerMapping, TextureMethod},
    Dialect, GlslOptions,
};

/// Lower texture accesses and intrinsics in the bodies of `methods`.
pub fn lower_methods(
    shader: &mut Shader,
    methods: &[MethodId],
    mapping: &SamplerMapping,
    options: &GlslOptions,
) -> Result<(), TranspileError> {
    let mut lowering = Lowering {
        shader,
        mapping,
        options,
    };
    for method in methods {
        let mut body = std::mem::take(&mut lowering.shader.method_mut(*method).body);
        let result = walk_statements_mut(&mut lowering, &mut body);
        lowering.shader.method_mut(*method).body = body;
        result?;
    }
    Ok(())
}

struct Lowering<'a> {
    shader: &'a mut Shader,
    mapping: &'a SamplerMapping,
    options: &'a GlslOptions,
}

/// A texture method call with its texture resolved to a global.
struct TextureCall {
    method: TextureMethod,
    texture: VarId,
    dim: TextureDim,
    sampler: Option<VarId>,
}

impl Lowering<'_> {
    fn is_es_below(&self, version: u32) -> bool {
        self.options.dialect == Dialect::Es && self.options.version < version
    }

    fn texture_call(&self, expr: &Expr) -> Result<Option<TextureCall>, TranspileError> {
        let ExprKind::Call { target, args } = &expr.kind else {
            return Ok(None);
        };
        let ExprKind::Member {
            target: object,
            member,
        } = &target.kind
        else {
            return Ok(None);
        };
        let Some(method) = TextureMethod::from_name(member) else {
            return Ok(None);
        };
        let Some(texture) = resolve_global(self.shader, object) else {
            return Ok(None);
        };
        let Type::Texture { dim, .. } = &self.shader.variable(texture).ty else {
            return Ok(None);
        };

        let sampler = if method.uses_sampler() {
            let sampler = args
                .first()
                .ok_or_else(|| StructuralError::InvalidFetchArguments {
                    method: member.clone(),
                    span: expr.span,
                })?;
            Some(resolve_global(self.shader, sampler).ok_or_else(|| {
                self.missing_combined_sampler(texture)
            })?)
        } else {
            None
        };

        Ok(Some(TextureCall {
            method,
            texture,
            dim: *dim,
            sampler,
        }))
    }

    fn missing_combined_sampler(&self, texture: VarId) -> TranspileError {
        InternalError::MissingCombinedSampler {
            texture: self.shader.variable(texture).name.clone(),
        }
        .into()
    }

    fn combined_sampler(&self, call: &TextureCall) -> Result<Expr, TranspileError> {
        let combined = match call.method {
            TextureMethod::GetDimensions => self.mapping.any_combined(call.texture),
            _ => self.mapping.combined(call.sampler, call.texture),
        };
        combined
            .map(|c| self.shader.var_ref(c))
            .ok_or_else(|| self.missing_combined_sampler(call.texture))
    }

    /// The GLSL function name for a sampling function like `textureLod`.
    fn texture_function(&self, dim: TextureDim, suffix: &str) -> String {
        let dim = if self.options.texture_function_compatibility {
            match dim {
                TextureDim::Texture1D => "1D",
                TextureDim::Texture2D => "2D",
                TextureDim::Texture3D => "3D",
                TextureDim::TextureCube => "Cube",
                _ => "",
            }
        } else {
            ""
        };
        format!("texture{dim}{suffix}")
    }

    fn lower_fetch(&self, expr: &mut Expr, call: TextureCall) -> Result<(), TranspileError> {
        let combined = self.combined_sampler(&call)?;
        let ty = expr.ty.clone();
        let span = expr.span;
        let ExprKind::Call { args, .. } = &mut expr.kind else {
            return Ok(());
        };
        let mut args = std::mem::take(args);

        if call.method == TextureMethod::Load {
            let fetch = self.lower_load(call.dim, combined, args, span)?;
            *expr = gvec4_to(fetch, ty).with_span(span);
            return Ok(());
        }

        // Replace the sampler with the combined sampler.
        args.remove(0);
        let (suffix, mut args) = match (call.method, args.len()) {
            (TextureMethod::Sample, 1) => ("", args),
            (TextureMethod::Sample, 2) => ("Offset", args),
            (TextureMethod::SampleBias, 2) => ("", args),
            (TextureMethod::SampleBias, 3) => {
                // The bias is the last argument of textureOffset.
                args.swap(1, 2);
                ("Offset", args)
            }
            (TextureMethod::SampleGrad, 3) => ("Grad", args),
            (TextureMethod::SampleGrad, 4) => ("GradOffset", args),
            (TextureMethod::SampleLevel, 2) => ("Lod", args),
            (TextureMethod::SampleLevel, 3) => ("LodOffset", args),
            (TextureMethod::SampleCmp, 2) => ("", compare_coordinates(args, call.dim)),
            (TextureMethod::SampleCmp, 3) => ("Offset", compare_coordinates(args, call.dim)),
            (TextureMethod::SampleCmpLevelZero, n @ (2 | 3)) => {
                let mut args = compare_coordinates(args, call.dim);
                args.insert(1, Expr::float(0.0));
                (if n == 3 { "LodOffset" } else { "Lod" }, args)
            }
            (method, _) => {
                return Err(StructuralError::InvalidFetchArguments {
                    method: format!("{method:?}").into(),
                    span,
                }
                .into())
            }
        };
        args.insert(0, combined);

        let name = self.texture_function(call.dim, suffix);
        trace!("lower {:?} to {name}", call.method);
        *expr = Expr::function(name, args).with_span(span);
        expr.ty = ty;
        Ok(())
    }

    /// Convert integer texel loads like `tex.Load(p)` to `texelFetch(tex_NoSampler, (p).xy, (p).z)`.
    fn lower_load(
        &self,
        dim: TextureDim,
        combined: Expr,
        args: Vec<Expr>,
        span: Span,
    ) -> Result<Expr, TranspileError> {
        let invalid = || StructuralError::InvalidFetchArguments {
            method: "Load".into(),
            span,
        };

        let mut args = args.into_iter();
        let location = args.next().ok_or_else(invalid)?;
        let mut rest: Vec<_> = args.collect();

        let (name, args) = match dim {
            TextureDim::Buffer if rest.is_empty() => {
                let name = if self.is_es_below(320) {
                    "texelFetchBuffer"
                } else {
                    "texelFetch"
                };
                (name.to_string(), vec![combined, location])
            }
            TextureDim::Texture2DMS | TextureDim::Texture2DMSArray if matches!(rest.len(), 1 | 2) => {
                // GLSL has no offset variant for multisampled fetches.
                let sample = rest.remove(0);
                let location = match rest.pop() {
                    Some(offset) => {
                        Expr::parenthesized(Expr::binary(BinaryOp::Add, location, offset))
                    }
                    None => location,
                };
                ("texelFetch".to_string(), vec![combined, location, sample])
            }
            TextureDim::Texture1D
            | TextureDim::Texture1DArray
            | TextureDim::Texture2D
            | TextureDim::Texture2DArray
            | TextureDim::Texture3D
                if rest.len() <= 1 =>
            {
                let (coordinates, mip) = match dim {
                    TextureDim::Texture1D => ("x", "y"),
                    TextureDim::Texture1DArray | TextureDim::Texture2D => ("xy", "z"),
                    _ => ("xyz", "w"),
                };
                let coordinate_count = coordinates.len() as u8;
                let coords = swizzle(location.clone(), coordinates);
                let mip = swizzle(location, mip);

                if self.is_es_below(300) {
                    // Sample the base level with normalized coordinates.
                    let size = Expr::function("textureSize", vec![combined.clone(), Expr::int(0)]);
                    let normalized = Expr::parenthesized(Expr::binary(
                        BinaryOp::Div,
                        Expr::constructor(Type::vec(coordinate_count), vec![coords]),
                        Expr::constructor(Type::vec(coordinate_count), vec![size]),
                    ));
                    let suffix = if rest.is_empty() { "Lod" } else { "LodOffset" };
                    let mut args = vec![
                        combined,
                        normalized,
                        Expr::constructor(Type::float(), vec![mip]),
                    ];
                    args.extend(rest);
                    (self.texture_function(dim, suffix), args)
                } else {
                    let name = if rest.is_empty() {
                        "texelFetch"
                    } else {
                        "texelFetchOffset"
                    };
                    let mut args = vec![combined, coords, mip];
                    args.extend(rest);
                    (name.to_string(), args)
                }
            }
            _ => return Err(invalid().into()),
        };

        trace!("lower Load to {name}");
        Ok(Expr::function(name, args))
    }

    /// Convert `tex.GetDimensions(w, h)` statements to `w = textureSize(tex_NoSampler, 0).x;` assignments.
    fn lower_get_dimensions(&self, statement: &Statement) -> Result<Option<Statement>, TranspileError> {
        let StatementKind::Expression(expr) = &statement.kind else {
            return Ok(None);
        };
        let Some(call) = self.texture_call(expr)? else {
            return Ok(None);
        };
        if call.method != TextureMethod::GetDimensions {
            return Ok(None);
        }
        let ExprKind::Call { args, .. } = &expr.kind else {
            return Ok(None);
        };

        let combined = self.combined_sampler(&call)?;
        let size_count = call.dim.size_count() as usize;
        let invalid = || StructuralError::InvalidFetchArguments {
            method: "GetDimensions".into(),
            span: expr.span,
        };

        let size = |lod: Option<Expr>| {
            let mut args = vec![combined.clone()];
            args.extend(lod);
            Expr::function("textureSize", args)
        };

        let mut assignments = Vec::new();
        match call.dim {
            TextureDim::Buffer if args.len() == 1 => {
                assignments.extend(size_assignments(size(None), args, size_count))
            }
            TextureDim::Texture2DMS | TextureDim::Texture2DMSArray
                if args.len() == size_count + 1 =>
            {
                assignments.extend(size_assignments(size(None), &args[..size_count], size_count));
                let samples = Expr::function("textureSamples", vec![combined.clone()]);
                assignments.push(assign_converted(&args[size_count], samples));
            }
            TextureDim::Buffer | TextureDim::Texture2DMS | TextureDim::Texture2DMSArray => {
                return Err(invalid().into())
            }
            _ if args.len() == size_count => {
                assignments.extend(size_assignments(size(Some(Expr::int(0))), args, size_count))
            }
            _ if args.len() == size_count + 2 => {
                let lod = int_value(args[0].clone());
                assignments.extend(size_assignments(
                    size(Some(lod)),
                    &args[1..=size_count],
                    size_count,
                ));
                let levels = Expr::function("textureQueryLevels", vec![combined.clone()]);
                assignments.push(assign_converted(&args[size_count + 1], levels));
            }
            _ => return Err(invalid().into()),
        }

        trace!("lower GetDimensions to {} assignments", assignments.len());
        Ok(Some(Statement::list(assignments).with_span(statement.span)))
    }

    fn lower_intrinsic(&self, expr: &mut Expr) {
        let ExprKind::Call { target, args } = &mut expr.kind else {
            return;
        };
        let name = match &target.kind {
            ExprKind::Variable { name, decl: None } => name.clone(),
            ExprKind::Variable {
                name,
                decl: Some(DeclRef::Method(m)),
            } if self.shader.method(*m).builtin => name.clone(),
            _ => return,
        };

        let renamed = match name.as_str() {
            "lerp" => "mix",
            "frac" => "fract",
            "rsqrt" => "inversesqrt",
            "ddx" => "dFdx",
            "ddy" => "dFdy",
            "atan2" => "atan",
            "fmod" => "mod",
            "saturate" if args.len() == 1 => {
                args.push(Expr::float(0.0));
                args.push(Expr::float(1.0));
                "clamp"
            }
            "mul" if args.len() == 2 => {
                let right = args.pop();
                let left = args.pop();
                if let (Some(left), Some(right)) = (left, right) {
                    let ty = expr.ty.take();
                    let span = expr.span;
                    let product = Expr::binary(BinaryOp::Mul, operand(left), operand(right));
                    *expr = Expr::parenthesized(product).with_span(span);
                    expr.ty = ty;
                }
                return;
            }
            "log10" if args.len() == 1 => {
                let ty = expr.ty.take();
                let span = expr.span;
                let log = Expr::function("log", std::mem::take(args));
                let log10 = Expr::function("log", vec![Expr::float(10.0)]);
                *expr =
                    Expr::parenthesized(Expr::binary(BinaryOp::Div, log, log10)).with_span(span);
                expr.ty = ty;
                return;
            }
            _ => return,
        };
        **target = Expr::name(renamed).with_span(target.span);
    }
}

/// Keep a lower precedence argument grouped when it becomes a `*` operand.
fn operand(expr: Expr) -> Expr {
    match expr.kind {
        ExprKind::Binary { .. }
        | ExprKind::Assign { .. }
        | ExprKind::Conditional { .. }
        | ExprKind::List(_) => {
            let span = expr.span;
            let ty = expr.ty.clone();
            let mut grouped = Expr::parenthesized(expr).with_span(span);
            grouped.ty = ty;
            grouped
        }
        _ => expr,
    }
}

impl VisitorMut for Lowering<'_> {
    type Error = TranspileError;

    fn shader_mut(&mut self) -> Option<&mut Shader> {
        Some(&mut *self.shader)
    }

    fn leave_expr(&mut self, expr: &mut Expr) -> Result<(), Self::Error> {
        match self.texture_call(expr)? {
            // Queries are expanded into statements once the whole call has been visited.
            Some(call) if call.method == TextureMethod::GetDimensions => Ok(()),
            Some(call) => self.lower_fetch(expr, call),
            None => {
                self.lower_intrinsic(expr);
                Ok(())
            }
        }
    }

    fn leave_statement(&mut self, statement: &mut Statement) -> Result<(), Self::Error> {
        if let Some(lowered) = self.lower_get_dimensions(statement)? {
            *statement = lowered;
        }
        Ok(())
    }
}

/// Combine coordinates and the comparison reference like `vec3(uv, ref)`.
fn compare_coordinates(mut args: Vec<Expr>, dim: TextureDim) -> Vec<Expr> {
    let reference = args.remove(1);
    let coordinates = args.remove(0);
    let count = coordinates
        .ty
        .as_ref()
        .and_then(|t| t.component_count())
        .unwrap_or_else(|| dim.coordinate_count());
    let mut result = if count < 4 {
        vec![Expr::constructor(Type::vec(count + 1), vec![coordinates, reference])]
    } else {
        // Cube array shadow lookups pass the reference separately.
        vec![coordinates, reference]
    };
    result.extend(args);
    result
}

/// Swizzle integer texel coordinates like `(p).xy`.
fn swizzle(location: Expr, components: &str) -> Expr {
    let ty = match components.len() {
        1 => Type::int(),
        n => Type::Vector(ScalarType::Int, n as u8),
    };
    Expr::member(Expr::parenthesized(location), components).with_type(ty)
}

/// Texel fetches return 4 components regardless of the texture's element type.
fn gvec4_to(fetch: Expr, ty: Option<Type>) -> Expr {
    match &ty {
        Some(t @ (Type::Scalar(_) | Type::Vector(_, 1..=3))) => {
            Expr::constructor(t.clone(), vec![fetch]).with_type(t.clone())
        }
        _ => Expr { ty, ..fetch },
    }
}

/// Assign each component of a `textureSize` result to an output like `w = textureSize(t, 0).x;`.
fn size_assignments(size: Expr, outputs: &[Expr], size_count: usize) -> Vec<Statement> {
    outputs
        .iter()
        .zip(["x", "y", "z"])
        .map(|(output, component)| {
            let value = if size_count > 1 {
                Expr::member(size.clone(), component)
            } else {
                size.clone()
            };
            assign_converted(output, value)
        })
        .collect()
}

fn int_value(expr: Expr) -> Expr {
    match expr.ty {
        Some(Type::Scalar(ScalarType::Int)) => expr,
        _ => Expr::constructor(Type::int(), vec![expr]).with_type(Type::int()),
    }
}

/// Assign an integer query result with a conversion for non integer outputs.
fn assign_converted(output: &Expr, value: Expr) -> Statement {
    let value = match &output.ty {
        Some(ty @ Type::Scalar(s)) if *s != ScalarType::Int => {
            Expr::constructor(ty.clone(), vec![value])
        }
        _ => value,
    };
    Statement::expr(Expr::assign(AssignOp::Assign, output.clone(), value))
}
