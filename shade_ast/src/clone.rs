//! Deep copies of code that declare new local variables.
//!
//! Copying a statement that declares a local would otherwise
//! leave two declarations sharing the same [VarId].
//! The [Cloner] issues fresh ids for every copied local and parameter
//! and rewrites references to them in the copy.
//! References to globals and methods keep their identity.
use std::{collections::BTreeMap, convert::Infallible};

use crate::{
    expr::{Expr, ExprKind},
    statement::{Statement, StatementKind},
    visit::{walk_expr_mut, walk_statements_mut, Visit, VisitorMut},
    DeclRef, MethodDefinition, MethodId, Shader, VarId,
};

pub struct Cloner<'a> {
    shader: &'a mut Shader,
    remap: BTreeMap<VarId, VarId>,
}

impl<'a> Cloner<'a> {
    pub fn new(shader: &'a mut Shader) -> Self {
        Self {
            shader,
            remap: BTreeMap::new(),
        }
    }

    /// The new id for each copied variable.
    pub fn remap(&self) -> &BTreeMap<VarId, VarId> {
        &self.remap
    }

    /// Add a copy of a variable to the arena and redirect later references to the copy.
    pub fn fresh_variable(&mut self, id: VarId) -> VarId {
        let mut variable = self.shader.variable(id).clone();
        variable.initializer = variable.initializer.map(|e| self.expr(&e));
        let new_id = self.shader.add_variable(variable);
        self.remap.insert(id, new_id);
        new_id
    }

    pub fn statements(&mut self, statements: &[Statement]) -> Vec<Statement> {
        let mut statements = statements.to_vec();
        walk_statements_mut(self, &mut statements).unwrap_or_else(|never| match never {});
        statements
    }

    pub fn statement(&mut self, statement: &Statement) -> Statement {
        let mut statements = self.statements(std::slice::from_ref(statement));
        statements.remove(0)
    }

    pub fn expr(&mut self, expr: &Expr) -> Expr {
        let mut expr = expr.clone();
        walk_expr_mut(self, &mut expr).unwrap_or_else(|never| match never {});
        expr
    }
}

impl VisitorMut for Cloner<'_> {
    type Error = Infallible;

    fn shader_mut(&mut self) -> Option<&mut Shader> {
        Some(&mut *self.shader)
    }

    fn visit_statement(&mut self, statement: &mut Statement) -> Result<Visit, Self::Error> {
        if let StatementKind::Declaration(vars) = &mut statement.kind {
            // Initializers are copied here and remapped when the walker visits them.
            for id in vars.iter_mut() {
                let variable = self.shader.variable(*id).clone();
                let new_id = self.shader.add_variable(variable);
                self.remap.insert(*id, new_id);
                *id = new_id;
            }
        }
        Ok(Visit::Children)
    }

    fn leave_expr(&mut self, expr: &mut Expr) -> Result<(), Self::Error> {
        if let ExprKind::Variable {
            decl: Some(DeclRef::Variable(id)),
            ..
        } = &mut expr.kind
        {
            if let Some(new_id) = self.remap.get(id) {
                *id = *new_id;
            }
        }
        Ok(())
    }
}

/// Copy a method with fresh parameters and locals.
/// The copy is not added to the shader.
pub fn clone_method(shader: &mut Shader, id: MethodId) -> MethodDefinition {
    let method = shader.method(id).clone();
    let mut cloner = Cloner::new(shader);
    let parameters = method
        .parameters
        .iter()
        .map(|p| cloner.fresh_variable(*p))
        .collect();
    let body = cloner.statements(&method.body);
    MethodDefinition {
        parameters,
        body,
        ..method
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{expr::AssignOp, Type, Variable};
    use pretty_assertions::assert_eq;

    #[test]
    fn clone_method_fresh_locals() {
        let mut shader = Shader::default();
        let global = shader.push_global(Variable::new("g", Type::float()));
        let p = shader.add_variable(Variable::new("p", Type::float()));
        let local = shader.add_variable(
            Variable::new("x", Type::float()).with_initializer(shader_ref(p, "p")),
        );

        let mut method = MethodDefinition::new("f", Type::float());
        method.parameters = vec![p];
        method.body = vec![
            Statement::declaration(vec![local]),
            Statement::expr(Expr::assign(
                AssignOp::Add,
                shader_ref(local, "x"),
                shader_ref(global, "g"),
            )),
        ];
        let f = shader.push_method(method);

        let copy = clone_method(&mut shader, f);
        let new_p = copy.parameters[0];
        assert_ne!(p, new_p);
        assert_eq!("p", shader.variable(new_p).name);

        let StatementKind::Declaration(vars) = &copy.body[0].kind else {
            panic!("expected declaration")
        };
        let new_local = vars[0];
        assert_ne!(local, new_local);
        assert_eq!(
            Some(shader_ref(new_p, "p")),
            shader.variable(new_local).initializer
        );
        // The original is unchanged.
        assert_eq!(
            Some(shader_ref(p, "p")),
            shader.variable(local).initializer
        );
        assert_eq!(
            Statement::expr(Expr::assign(
                AssignOp::Add,
                shader_ref(new_local, "x"),
                shader_ref(global, "g"),
            )),
            copy.body[1]
        );
    }

    fn shader_ref(id: VarId, name: &str) -> Expr {
        Expr::reference(name, DeclRef::Variable(id))
    }
}
