//! Fuse separate textures and samplers into GLSL combined samplers.
//!
//! HLSL samples a texture with any sampler like `tex.Sample(samp, uv)`.
//! GLSL only has combined samplers, so each distinct (sampler, texture) pair
//! reachable from the entry point becomes a new `uniform sampler2D tex_samp;`.
//!
//! Helper methods taking textures or samplers as parameters can't be expressed in GLSL.
//! Each call binding these parameters to globals is redirected to a specialized copy
//! of the helper that references the globals directly.
use std::collections::BTreeMap;

use indexmap::{IndexMap, IndexSet};
use log::debug;
use shade_ast::{
    clone::clone_method,
    visit::VisitorMut,
    DeclRef, Declaration, Expr, ExprKind, MethodDefinition, MethodId, Qualifier, SamplerType,
    Shader, Statement, TextureDim, Type, VarId, Variable,
};
use smol_str::SmolStr;

use crate::{
    call_graph::{self, CallGraphVisitor},
    diagnostics::Diagnostics,
    error::{StructuralError, TranspileError},
};

/// A texture and the optional sampler used to access it.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct SamplerTextureKey {
    pub sampler: Option<VarId>,
    pub texture: VarId,
}

/// A helper method specialized for the globals bound to its resource parameters.
#[derive(Debug, PartialEq, Clone)]
pub struct Specialization {
    pub method: MethodId,
    /// The global bound to each resource parameter in parameter order.
    pub bound: Vec<VarId>,
    pub clone: MethodId,
}

#[derive(Debug, Default, PartialEq, Clone)]
pub struct SamplerMapping {
    /// The combined sampler variable for each pair in order of first use.
    pub samplers: IndexMap<SamplerTextureKey, VarId>,
    /// Specialized methods with the most recently used last.
    pub specializations: Vec<Specialization>,
}

impl SamplerMapping {
    pub fn combined(&self, sampler: Option<VarId>, texture: VarId) -> Option<VarId> {
        self.samplers
            .get(&SamplerTextureKey { sampler, texture })
            .copied()
    }

    /// The first combined sampler for `texture` using any sampler.
    pub fn any_combined(&self, texture: VarId) -> Option<VarId> {
        self.samplers
            .iter()
            .find(|(k, _)| k.texture == texture)
            .map(|(_, v)| *v)
    }
}

/// Member functions on textures that access texture data.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TextureMethod {
    Sample,
    SampleBias,
    SampleGrad,
    SampleLevel,
    SampleCmp,
    SampleCmpLevelZero,
    Load,
    GetDimensions,
}

impl TextureMethod {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Sample" => Some(Self::Sample),
            "SampleBias" => Some(Self::SampleBias),
            "SampleGrad" => Some(Self::SampleGrad),
            "SampleLevel" => Some(Self::SampleLevel),
            "SampleCmp" => Some(Self::SampleCmp),
            "SampleCmpLevelZero" => Some(Self::SampleCmpLevelZero),
            "Load" => Some(Self::Load),
            "GetDimensions" => Some(Self::GetDimensions),
            _ => None,
        }
    }

    pub fn uses_sampler(&self) -> bool {
        !matches!(self, Self::Load | Self::GetDimensions)
    }

    pub fn is_comparison(&self) -> bool {
        matches!(self, Self::SampleCmp | Self::SampleCmpLevelZero)
    }
}

/// The variant of a legacy `tex2D` style fetch.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum LegacyFetch {
    Default,
    Lod,
    Grad,
    Bias,
    Proj,
}

/// Parse names like `tex2Dlod` into the dimension and fetch variant.
/// Cube textures use dimension 4.
fn parse_legacy_fetch(name: &str) -> Option<(u8, LegacyFetch)> {
    let name = name.strip_prefix("tex")?;
    let (dimension, rest) = if let Some(rest) = name.strip_prefix("CUBE") {
        (4, rest)
    } else {
        let dimension = match name.get(..2)? {
            "1D" => 1,
            "2D" => 2,
            "3D" => 3,
            _ => return None,
        };
        (dimension, &name[2..])
    };

    let fetch = match rest {
        "" => LegacyFetch::Default,
        "lod" => LegacyFetch::Lod,
        "grad" => LegacyFetch::Grad,
        "bias" => LegacyFetch::Bias,
        "proj" => LegacyFetch::Proj,
        _ => return None,
    };
    Some((dimension, fetch))
}

/// Find the global variable accessed by `expr`.
///
/// Member and index accesses are stripped down to the root variable.
/// Locals initialized from another variable like `Texture2D t = tex;` are followed to the global.
pub fn resolve_global(shader: &Shader, expr: &Expr) -> Option<VarId> {
    resolve_global_bound(shader, &BTreeMap::new(), expr)
}

fn resolve_global_bound(shader: &Shader, bindings: &BTreeMap<VarId, VarId>, expr: &Expr) -> Option<VarId> {
    match expr.root().decl() {
        Some(DeclRef::Variable(id)) => {
            if let Some(global) = bindings.get(&id) {
                Some(*global)
            } else if shader.is_global(id) {
                Some(id)
            } else {
                let init = shader.variable(id).initializer.as_ref()?;
                resolve_global_bound(shader, bindings, init)
            }
        }
        _ => None,
    }
}

/// Fuse texture and sampler pairs and specialize resource helpers reachable from `entry`.
pub fn map_samplers(
    shader: &mut Shader,
    entry: MethodId,
    texture_function_compatibility: bool,
    diagnostics: &mut Diagnostics,
) -> Result<SamplerMapping, TranspileError> {
    let mut visitor = SamplerMappingVisitor {
        shader,
        call_stack: Vec::new(),
        diagnostics,
        texture_function_compatibility,
        mapping: SamplerMapping::default(),
        textures_touched: IndexSet::new(),
        bindings: BTreeMap::new(),
    };
    call_graph::run(&mut visitor, entry)?;
    visitor.finish();
    Ok(visitor.mapping)
}

struct SamplerMappingVisitor<'a> {
    shader: &'a mut Shader,
    call_stack: Vec<MethodId>,
    diagnostics: &'a mut Diagnostics,
    texture_function_compatibility: bool,
    mapping: SamplerMapping,
    /// Textures that only need a combined sampler if no other access creates one.
    textures_touched: IndexSet<VarId>,
    /// The global bound to each resource parameter of the call being processed.
    bindings: BTreeMap<VarId, VarId>,
}

impl SamplerMappingVisitor<'_> {
    fn resolve_global(&self, expr: &Expr) -> Option<VarId> {
        resolve_global_bound(&*self.shader, &self.bindings, expr)
    }

    fn fuse(&mut self, sampler: Option<VarId>, texture: VarId, needs_comparison: bool) {
        let key = SamplerTextureKey { sampler, texture };
        if self.mapping.samplers.contains_key(&key) {
            return;
        }

        let texture_var = self.shader.variable(texture);
        let ty = match texture_var.ty.texture_sampler(needs_comparison) {
            Some(ty) => ty,
            None => SamplerType {
                shadow: needs_comparison,
                ..SamplerType::new(TextureDim::Texture2D)
            },
        };

        let (name, span) = match sampler {
            Some(s) => {
                let sampler_var = self.shader.variable(s);
                (
                    format!("{}_{}", texture_var.name, sampler_var.name),
                    sampler_var.span,
                )
            }
            None => (format!("{}_NoSampler", texture_var.name), texture_var.span),
        };
        debug!("combined sampler {name} for {key:?}");

        let combined = self.shader.add_variable(
            Variable::new(name, Type::Sampler(Some(ty)))
                .with_qualifiers(vec![Qualifier::Uniform])
                .with_span(span),
        );
        self.mapping.samplers.insert(key, combined);
    }

    fn texture_method_call(&mut self, expr: &Expr) -> Result<(), TranspileError> {
        let ExprKind::Call { target, args } = &expr.kind else {
            return Ok(());
        };
        let ExprKind::Member { target: object, member } = &target.kind else {
            return Ok(());
        };
        let Some(method) = TextureMethod::from_name(member) else {
            return Ok(());
        };
        let Some(texture) = self.resolve_global(object) else {
            return Ok(());
        };
        if !self.shader.variable(texture).ty.is_texture() {
            return Ok(());
        }

        match method {
            TextureMethod::Load => self.fuse(None, texture, false),
            TextureMethod::GetDimensions => {
                self.textures_touched.insert(texture);
            }
            _ => {
                let sampler_arg = args.first().ok_or_else(|| StructuralError::InvalidFetchArguments {
                    method: member.clone(),
                    span: expr.span,
                })?;
                let sampler = self.resolve_global(sampler_arg).ok_or_else(|| {
                    StructuralError::UnresolvedSampler {
                        texture: self.shader.variable(texture).name.clone(),
                        span: sampler_arg.span,
                    }
                })?;
                self.fuse(Some(sampler), texture, method.is_comparison());
            }
        }
        Ok(())
    }

    fn legacy_fetch_call(&mut self, expr: &mut Expr) {
        let ExprKind::Call { target, args } = &mut expr.kind else {
            return;
        };
        let ExprKind::Variable { name, decl } = &mut target.kind else {
            return;
        };
        if let Some(DeclRef::Method(m)) = decl {
            if !self.shader.method(*m).builtin {
                return;
            }
        }
        let Some((dimension, fetch)) = parse_legacy_fetch(name) else {
            return;
        };
        if args.len() < 2 {
            return;
        }

        let suffix = match fetch {
            LegacyFetch::Default if args.len() == 4 => "Grad",
            LegacyFetch::Default | LegacyFetch::Bias => "",
            LegacyFetch::Grad => "Grad",
            LegacyFetch::Proj => "Proj",
            LegacyFetch::Lod => "Lod",
        };
        if matches!(fetch, LegacyFetch::Bias | LegacyFetch::Lod) {
            // The bias or lod is packed in the w component of the coordinates.
            args.push(Expr::member(Expr::parenthesized(args[1].clone()), "w").with_type(Type::float()));
        }

        let new_name = if self.texture_function_compatibility {
            let dim = if dimension == 4 {
                "Cube".to_string()
            } else {
                format!("{dimension}D")
            };
            format!("texture{dim}{suffix}")
        } else {
            format!("texture{suffix}")
        };
        *name = SmolStr::from(&new_name);
        *decl = None;

        if fetch != LegacyFetch::Proj {
            let size = if dimension == 4 { 3 } else { dimension };
            let matches_size = match &args[1].ty {
                Some(Type::Vector(_, n)) => *n == size,
                Some(Type::Scalar(_)) => size == 1,
                _ => false,
            };
            if !matches_size {
                let coords = std::mem::replace(&mut args[1], Expr::bool(false));
                let ty = coords.ty.as_ref().and_then(|t| t.scalar()).unwrap_or(shade_ast::ScalarType::Float);
                args[1] = Expr::member(Expr::parenthesized(coords), &"xyzw"[..size as usize])
                    .with_type(Type::Vector(ty, size));
            }
        }

        let dim = match dimension {
            1 => TextureDim::Texture1D,
            2 => TextureDim::Texture2D,
            3 => TextureDim::Texture3D,
            _ => TextureDim::TextureCube,
        };
        match args[0].decl() {
            Some(DeclRef::Variable(sampler)) => {
                self.set_sampler_type(sampler, Type::Sampler(Some(SamplerType::new(dim))))
            }
            _ => self.diagnostics.warning(
                format!("unable to determine the sampler type for {new_name}"),
                args[0].span,
            ),
        }
    }

    /// Set the type of a sampler and any variables it was initialized from.
    fn set_sampler_type(&mut self, id: VarId, ty: Type) {
        self.shader.variable_mut(id).ty = ty.clone();
        let is_parameter = self.shader.methods.iter().any(|m| m.parameters.contains(&id));
        if is_parameter {
            return;
        }
        if let Some(DeclRef::Variable(source)) =
            self.shader.variable(id).initializer.as_ref().and_then(|e| e.decl())
        {
            self.set_sampler_type(source, ty);
        }
    }

    fn specialize(&mut self, method: MethodId, bound: &[VarId]) -> MethodId {
        let original_parameters = self.shader.method(method).parameters.clone();
        let copy = clone_method(&mut *self.shader, method);

        let mut parameters = Vec::new();
        let mut body = Vec::new();
        for (original, parameter) in original_parameters.iter().zip(copy.parameters) {
            match self.bindings.get(original) {
                Some(global) => {
                    let initializer = self.shader.var_ref(*global);
                    let var = self.shader.variable_mut(parameter);
                    var.initializer = Some(initializer);
                    var.qualifiers
                        .retain(|q| !matches!(q, Qualifier::In | Qualifier::Uniform));
                    body.push(Statement::declaration(vec![parameter]));
                }
                None => parameters.push(parameter),
            }
        }
        body.extend(copy.body);

        let mut name = copy.name.to_string();
        for global in bound {
            name.push('_');
            name.push_str(&self.shader.variable(*global).name);
        }
        debug!("specialize {} as {name}", copy.name);

        self.shader.add_method(MethodDefinition {
            name: name.into(),
            parameters,
            body,
            ..copy
        })
    }

    fn finish(&mut self) {
        // Textures only used for queries still need a declaration.
        for texture in std::mem::take(&mut self.textures_touched) {
            if self.mapping.any_combined(texture).is_none() {
                self.fuse(None, texture, false);
            }
        }

        let mut inserted_after: BTreeMap<VarId, usize> = BTreeMap::new();
        for (key, combined) in &self.mapping.samplers {
            let count = inserted_after.entry(key.texture).or_default();
            let index = match self.shader.declaration_index(DeclRef::Variable(key.texture)) {
                Some(i) => i + 1 + *count,
                None => self.shader.declarations.len(),
            };
            self.shader
                .declarations
                .insert(index, Declaration::Variable(*combined));
            *count += 1;
        }

        // Inserting in reverse places each clone before its original in cache order.
        for specialization in self.mapping.specializations.iter().rev() {
            let index = self
                .shader
                .declaration_index(DeclRef::Method(specialization.method))
                .unwrap_or(self.shader.declarations.len());
            self.shader
                .declarations
                .insert(index, Declaration::Method(specialization.clone));
        }
    }
}

impl VisitorMut for SamplerMappingVisitor<'_> {
    type Error = TranspileError;

    fn shader_mut(&mut self) -> Option<&mut Shader> {
        Some(&mut *self.shader)
    }

    fn leave_expr(&mut self, expr: &mut Expr) -> Result<(), Self::Error> {
        call_graph::visit_call(self, expr)?;
        self.texture_method_call(expr)?;
        self.legacy_fetch_call(expr);
        Ok(())
    }
}

impl CallGraphVisitor for SamplerMappingVisitor<'_> {
    fn shader(&mut self) -> &mut Shader {
        &mut *self.shader
    }

    fn call_stack(&mut self) -> &mut Vec<MethodId> {
        &mut self.call_stack
    }

    fn process_call(&mut self, call: &mut Expr, method: MethodId) -> Result<(), TranspileError> {
        let ExprKind::Call { target, args } = &mut call.kind else {
            return call_graph::visit_method(self, method);
        };

        let parameters = self.shader.method(method).parameters.clone();
        let mut bound = Vec::new();
        let mut resource_args = Vec::new();
        let mut sampler_args = Vec::new();
        for (i, parameter) in parameters.iter().enumerate() {
            let ty = &self.shader.variable(*parameter).ty;
            if ty.is_resource() {
                let global = args.get(i).and_then(|a| self.resolve_global(a)).ok_or_else(|| {
                    StructuralError::UnresolvedResourceArgument {
                        method: self.shader.method(method).name.clone(),
                        index: i,
                        span: args.get(i).map(|a| a.span).unwrap_or(call.span),
                    }
                })?;
                self.bindings.insert(*parameter, global);
                bound.push(global);
                resource_args.push(i);
            } else if ty.is_sampler() && i < args.len() {
                sampler_args.push(i);
            }
        }

        if !bound.is_empty() {
            let existing = self
                .mapping
                .specializations
                .iter()
                .position(|s| s.method == method && s.bound == bound);
            let (clone, is_new) = match existing {
                Some(i) => {
                    // Keep the cache ordered by most recent use.
                    let specialization = self.mapping.specializations.remove(i);
                    let clone = specialization.clone;
                    self.mapping.specializations.push(specialization);
                    (clone, false)
                }
                None => {
                    let clone = self.specialize(method, &bound);
                    self.mapping.specializations.push(Specialization {
                        method,
                        bound,
                        clone,
                    });
                    (clone, true)
                }
            };

            let clone_name: SmolStr = self.shader.method(clone).name.clone();
            let return_type = target.ty.clone();
            **target = Expr::reference(clone_name, DeclRef::Method(clone)).with_span(target.span);
            target.ty = return_type;
            let mut i = 0;
            args.retain(|_| {
                let keep = !resource_args.contains(&i);
                i += 1;
                keep
            });

            for parameter in &parameters {
                self.bindings.remove(parameter);
            }

            if is_new {
                call_graph::visit_method(self, clone)?;
            }
        } else {
            call_graph::visit_method(self, method)?;

            // Legacy sampler parameters may have a concrete type after visiting the callee.
            for i in sampler_args {
                let ty = self.shader.variable(parameters[i]).ty.clone();
                if matches!(ty, Type::Sampler(Some(_))) {
                    if let Some(DeclRef::Variable(arg)) = args[i].decl() {
                        self.set_sampler_type(arg, ty);
                    }
                }
            }
        }

        Ok(())
    }
}
