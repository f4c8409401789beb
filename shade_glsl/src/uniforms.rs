//! Classify how global uniforms are used across the call graph of an entry point.
//!
//! GLSL uniforms are read only.
//! Globals that are completely overwritten before being read are plain global temporaries.
//! Globals that are read and later modified need a writable copy of the uniform value.
use indexmap::IndexSet;
use shade_ast::{
    expr::swizzle_len,
    visit::{walk_expr_mut, Visit, VisitorMut},
    AssignOp, DeclRef, Expr, ExprKind, MethodId, Qualifier, Shader, VarId,
};

use crate::{
    call_graph::{self, CallGraphVisitor},
    error::TranspileError,
};

/// Usage of qualifying globals in insertion order.
#[derive(Debug, Default, PartialEq, Clone)]
pub struct UniformUsage {
    pub read: IndexSet<VarId>,
    pub write_first: IndexSet<VarId>,
    pub read_write: IndexSet<VarId>,
    /// Every global that is modified somewhere regardless of its classification.
    pub written: IndexSet<VarId>,
}

impl UniformUsage {
    pub fn is_read(&self, var: VarId) -> bool {
        self.read.contains(&var)
    }

    /// `true` if `var` is always written before being read and can be a plain global.
    pub fn is_temporary(&self, var: VarId) -> bool {
        self.write_first.contains(&var)
    }

    pub fn is_read_write(&self, var: VarId) -> bool {
        self.read_write.contains(&var)
    }

    pub fn is_written(&self, var: VarId) -> bool {
        self.written.contains(&var)
    }

    fn is_classified(&self, var: VarId) -> bool {
        self.read.contains(&var) || self.write_first.contains(&var) || self.read_write.contains(&var)
    }
}

/// Find usages of global uniforms reachable from `entry`.
pub fn analyze_uniforms(shader: &mut Shader, entry: MethodId) -> Result<UniformUsage, TranspileError> {
    let mut visitor = UniformVisitor {
        shader,
        call_stack: Vec::new(),
        usage: UniformUsage::default(),
    };
    call_graph::run(&mut visitor, entry)?;
    Ok(visitor.usage)
}

/// `true` for shader scope variables that would be emitted as uniforms.
pub fn is_uniform_global(shader: &Shader, id: VarId) -> bool {
    let var = shader.variable(id);
    shader.is_global(id)
        && !var.ty.is_resource()
        && !var.qualifiers.iter().any(|q| {
            matches!(
                q,
                Qualifier::Static
                    | Qualifier::Const
                    | Qualifier::In
                    | Qualifier::Out
                    | Qualifier::InOut
                    | Qualifier::GroupShared
            )
        })
}

struct UniformVisitor<'a> {
    shader: &'a mut Shader,
    call_stack: Vec<MethodId>,
    usage: UniformUsage,
}

impl UniformVisitor<'_> {
    fn qualifying_global(&self, expr: &Expr) -> Option<VarId> {
        match expr.root().decl() {
            Some(DeclRef::Variable(id)) if is_uniform_global(self.shader, id) => Some(id),
            _ => None,
        }
    }

    /// `true` if assigning to `target` replaces every component of its root variable.
    fn is_whole_write(&self, target: &Expr) -> bool {
        match &target.kind {
            ExprKind::Variable { .. } => true,
            ExprKind::Parenthesized(e) => self.is_whole_write(e),
            ExprKind::Member { target, member } => match target.decl() {
                Some(DeclRef::Variable(id)) => {
                    let count = self.shader.variable(id).ty.component_count();
                    match (swizzle_len(member), count) {
                        (Some(len), Some(count)) => len >= count as usize,
                        _ => false,
                    }
                }
                _ => false,
            },
            _ => false,
        }
    }

    /// Visit the index expressions of an assignment target without reading the target itself.
    fn visit_target_indices(&mut self, target: &mut Expr) -> Result<(), TranspileError> {
        match &mut target.kind {
            ExprKind::Variable { .. } => Ok(()),
            ExprKind::Member { target, .. } | ExprKind::Parenthesized(target) => {
                self.visit_target_indices(target)
            }
            ExprKind::Index { target, index } => {
                self.visit_target_indices(target)?;
                walk_expr_mut(self, index)
            }
            _ => walk_expr_mut(self, target),
        }
    }

    fn assign(&mut self, op: AssignOp, target: &Expr) {
        if let Some(id) = self.qualifying_global(target) {
            if !self.usage.is_classified(id) {
                if op != AssignOp::Assign {
                    self.usage.read_write.insert(id);
                } else if self.is_whole_write(target) {
                    self.usage.write_first.insert(id);
                } else {
                    self.usage.read.insert(id);
                }
            }
            self.usage.written.insert(id);
        }
    }

    fn call_arguments(&mut self, method: Option<MethodId>, args: &mut [Expr]) -> Result<(), TranspileError> {
        for (i, arg) in args.iter_mut().enumerate() {
            let param = method.and_then(|m| self.shader.method(m).parameters.get(i).copied());
            let (is_out, is_inout) = param
                .map(|p| {
                    let p = self.shader.variable(p);
                    (p.is_out(), p.is_inout())
                })
                .unwrap_or_default();

            if is_out {
                // Out arguments are only written by the callee.
                self.visit_target_indices(arg)?;
                self.assign(AssignOp::Assign, arg);
            } else if is_inout {
                // Same as a compound assignment to the argument.
                self.visit_target_indices(arg)?;
                self.assign(AssignOp::Add, arg);
            } else {
                walk_expr_mut(self, arg)?;
            }
        }
        Ok(())
    }
}

impl VisitorMut for UniformVisitor<'_> {
    type Error = TranspileError;

    fn shader_mut(&mut self) -> Option<&mut Shader> {
        Some(&mut *self.shader)
    }

    fn visit_expr(&mut self, expr: &mut Expr) -> Result<Visit, Self::Error> {
        if matches!(expr.kind, ExprKind::Variable { .. }) {
            if let Some(id) = self.qualifying_global(expr) {
                if !self.usage.is_classified(id) {
                    self.usage.read.insert(id);
                }
            }
            return Ok(Visit::Children);
        }

        match &mut expr.kind {
            ExprKind::Assign { op, target, value } => {
                walk_expr_mut(self, value)?;
                self.visit_target_indices(target)?;
                self.assign(*op, target);
                Ok(Visit::Skip)
            }
            ExprKind::Call { target, args } => {
                let method = match target.decl() {
                    Some(DeclRef::Method(id)) => Some(id),
                    _ => None,
                };
                if method.is_none() {
                    // Method calls like buffer.Load(i) read the object.
                    walk_expr_mut(self, target)?;
                }
                self.call_arguments(method, args)?;

                // Callees are visited once the arguments have been classified.
                call_graph::visit_call(self, expr)?;
                Ok(Visit::Skip)
            }
            _ => Ok(Visit::Children),
        }
    }
}

impl CallGraphVisitor for UniformVisitor<'_> {
    fn shader(&mut self) -> &mut Shader {
        &mut *self.shader
    }

    fn call_stack(&mut self) -> &mut Vec<MethodId> {
        &mut self.call_stack
    }
}
