//! Transitive traversal of method bodies starting from an entry point.
//!
//! Analysis passes implement [CallGraphVisitor] and call [visit_call]
//! from [VisitorMut::leave_expr] so that callee bodies are visited
//! after the arguments of each call.
use shade_ast::{
    visit::{walk_statements_mut, VisitorMut},
    DeclRef, Expr, ExprKind, MethodId, Shader,
};

use crate::error::{StructuralError, TranspileError};

/// The maximum number of nested calls before aborting.
pub const MAX_CALL_DEPTH: usize = 64;

pub trait CallGraphVisitor: VisitorMut<Error = TranspileError> {
    fn shader(&mut self) -> &mut Shader;

    /// The methods currently being visited with the innermost method last.
    fn call_stack(&mut self) -> &mut Vec<MethodId>;

    /// Process a call to a method with a body.
    /// The default implementation visits the body of `method`.
    fn process_call(&mut self, _call: &mut Expr, method: MethodId) -> Result<(), TranspileError> {
        visit_method(self, method)
    }
}

/// Visit `entry` and every method it transitively calls.
pub fn run<V: CallGraphVisitor + ?Sized>(v: &mut V, entry: MethodId) -> Result<(), TranspileError> {
    visit_method(v, entry)
}

/// Visit the body of `method`.
///
/// The body is moved out of the shader while it is walked,
/// so the visitor can modify other methods and declarations.
pub fn visit_method<V: CallGraphVisitor + ?Sized>(
    v: &mut V,
    method: MethodId,
) -> Result<(), TranspileError> {
    let (name, span) = {
        let m = v.shader().method(method);
        (m.name.clone(), m.span)
    };

    if v.call_stack().contains(&method) {
        return Err(StructuralError::RecursiveCall { method: name, span }.into());
    }
    if v.call_stack().len() >= MAX_CALL_DEPTH {
        return Err(StructuralError::CallDepthExceeded {
            method: name,
            limit: MAX_CALL_DEPTH,
        }
        .into());
    }

    v.call_stack().push(method);
    let mut body = std::mem::take(&mut v.shader().method_mut(method).body);
    let result = walk_statements_mut(v, &mut body);
    v.shader().method_mut(method).body = body;
    v.call_stack().pop();

    result
}

/// Call [CallGraphVisitor::process_call] if `expr` calls a method with a body.
pub fn visit_call<V: CallGraphVisitor + ?Sized>(
    v: &mut V,
    expr: &mut Expr,
) -> Result<(), TranspileError> {
    if let Some(method) = called_method(v.shader(), expr) {
        v.process_call(expr, method)?;
    }
    Ok(())
}

/// The method with a body called by `expr`.
pub fn called_method(shader: &Shader, expr: &Expr) -> Option<MethodId> {
    match &expr.kind {
        ExprKind::Call { target, .. } => match target.decl() {
            Some(DeclRef::Method(id)) if !shader.method(id).builtin => Some(id),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::test_utils::*;
    use pretty_assertions::assert_eq;
    use shade_ast::{Statement, Type};

    struct CallOrder<'a> {
        shader: &'a mut Shader,
        call_stack: Vec<MethodId>,
        visited: Vec<String>,
    }

    impl<'a> CallOrder<'a> {
        fn new(shader: &'a mut Shader) -> Self {
            Self {
                shader,
                call_stack: Vec::new(),
                visited: Vec::new(),
            }
        }
    }

    impl VisitorMut for CallOrder<'_> {
        type Error = TranspileError;

        fn shader_mut(&mut self) -> Option<&mut Shader> {
            Some(&mut *self.shader)
        }

        fn leave_expr(&mut self, expr: &mut Expr) -> Result<(), Self::Error> {
            visit_call(self, expr)
        }
    }

    impl CallGraphVisitor for CallOrder<'_> {
        fn shader(&mut self) -> &mut Shader {
            &mut *self.shader
        }

        fn call_stack(&mut self) -> &mut Vec<MethodId> {
            &mut self.call_stack
        }

        fn process_call(&mut self, _call: &mut Expr, method: MethodId) -> Result<(), TranspileError> {
            self.visited.push(self.shader.method(method).name.to_string());
            visit_method(self, method)
        }
    }

    #[test]
    fn visit_callees_transitively() {
        let mut shader = Shader::default();
        let c = method(&mut shader, "c", Type::Void, Vec::new(), Vec::new());
        let body = vec![Statement::expr(call(&shader, c, Vec::new()))];
        let b = method(&mut shader, "b", Type::Void, Vec::new(), body);
        let body = vec![
            Statement::expr(call(&shader, b, Vec::new())),
            Statement::expr(call(&shader, c, Vec::new())),
        ];
        let main = method(&mut shader, "main", Type::Void, Vec::new(), body);

        let mut visitor = CallOrder::new(&mut shader);
        run(&mut visitor, main).unwrap();
        assert_eq!(vec!["b", "c", "c"], visitor.visited);
        assert!(visitor.call_stack.is_empty());
        // Bodies are restored after visiting.
        assert_eq!(2, shader.method(main).body.len());
    }

    #[test]
    fn call_arguments_before_callee() {
        let mut shader = Shader::default();
        let f = method(&mut shader, "f", Type::float(), Vec::new(), Vec::new());
        let g = method(&mut shader, "g", Type::float(), Vec::new(), Vec::new());
        let body = vec![Statement::expr(call(
            &shader,
            f,
            vec![call(&shader, g, Vec::new())],
        ))];
        let main = method(&mut shader, "main", Type::Void, Vec::new(), body);

        let mut visitor = CallOrder::new(&mut shader);
        run(&mut visitor, main).unwrap();
        assert_eq!(vec!["g", "f"], visitor.visited);
    }

    #[test]
    fn recursive_call() {
        let mut shader = Shader::default();
        let f = shader.add_method(shade_ast::MethodDefinition::new("f", Type::Void));
        let body = vec![Statement::expr(call(&shader, f, Vec::new()))];
        shader.method_mut(f).body = body;
        shader.declarations.push(shade_ast::Declaration::Method(f));

        let mut visitor = CallOrder::new(&mut shader);
        assert_eq!(
            Err(TranspileError::Structural(StructuralError::RecursiveCall {
                method: "f".into(),
                span: Default::default()
            })),
            run(&mut visitor, f)
        );
    }

    #[test]
    fn call_depth_limit() {
        let mut shader = Shader::default();
        let mut callee = method(&mut shader, "f0", Type::Void, Vec::new(), Vec::new());
        for i in 1..=MAX_CALL_DEPTH {
            let body = vec![Statement::expr(call(&shader, callee, Vec::new()))];
            callee = method(&mut shader, &format!("f{i}"), Type::Void, Vec::new(), body);
        }

        let mut visitor = CallOrder::new(&mut shader);
        assert_eq!(
            Err(TranspileError::Structural(
                StructuralError::CallDepthExceeded {
                    method: "f0".into(),
                    limit: MAX_CALL_DEPTH
                }
            )),
            run(&mut visitor, callee)
        );
    }

    #[test]
    fn builtin_methods_are_not_visited() {
        let mut shader = Shader::default();
        let mut builtin = shade_ast::MethodDefinition::new("lerp", Type::float());
        builtin.builtin = true;
        let lerp = shader.push_method(builtin);
        let body = vec![Statement::expr(call(&shader, lerp, Vec::new()))];
        let main = method(&mut shader, "main", Type::Void, Vec::new(), body);

        let mut visitor = CallOrder::new(&mut shader);
        run(&mut visitor, main).unwrap();
        assert!(visitor.visited.is_empty());
    }
}
