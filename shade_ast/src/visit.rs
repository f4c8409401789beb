//! Exhaustive traversal of statements and expressions.
//!
//! Pre hooks decide whether to walk the children of a node with [Visit].
//! Post hooks run after the children regardless of the returned [Visit].
//! The first error returned by a hook stops the walk.
use crate::{
    expr::{Expr, ExprKind},
    statement::{Statement, StatementKind},
    Shader, VarId,
};

/// Whether to visit the children of a node.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Visit {
    Children,
    Skip,
}

/// A read only visitor.
pub trait Visitor<'a> {
    type Error;

    /// The shader used to look up initializers of local declarations.
    /// Initializers are not visited if this returns `None`.
    fn shader(&self) -> Option<&'a Shader> {
        None
    }

    fn visit_statement(&mut self, _statement: &'a Statement) -> Result<Visit, Self::Error> {
        Ok(Visit::Children)
    }

    fn leave_statement(&mut self, _statement: &'a Statement) -> Result<(), Self::Error> {
        Ok(())
    }

    fn visit_expr(&mut self, _expr: &'a Expr) -> Result<Visit, Self::Error> {
        Ok(Visit::Children)
    }

    fn leave_expr(&mut self, _expr: &'a Expr) -> Result<(), Self::Error> {
        Ok(())
    }

    fn enter_scope(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn leave_scope(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// A visitor that can rewrite nodes in place.
pub trait VisitorMut {
    type Error;

    /// The shader used to look up initializers of local declarations.
    /// Initializers are not visited if this returns `None`.
    fn shader_mut(&mut self) -> Option<&mut Shader> {
        None
    }

    fn visit_statement(&mut self, _statement: &mut Statement) -> Result<Visit, Self::Error> {
        Ok(Visit::Children)
    }

    fn leave_statement(&mut self, _statement: &mut Statement) -> Result<(), Self::Error> {
        Ok(())
    }

    fn visit_expr(&mut self, _expr: &mut Expr) -> Result<Visit, Self::Error> {
        Ok(Visit::Children)
    }

    fn leave_expr(&mut self, _expr: &mut Expr) -> Result<(), Self::Error> {
        Ok(())
    }

    fn enter_scope(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn leave_scope(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

pub fn walk_statements<'a, V: Visitor<'a> + ?Sized>(
    v: &mut V,
    statements: &'a [Statement],
) -> Result<(), V::Error> {
    for statement in statements {
        walk_statement(v, statement)?;
    }
    Ok(())
}

pub fn walk_statement<'a, V: Visitor<'a> + ?Sized>(
    v: &mut V,
    statement: &'a Statement,
) -> Result<(), V::Error> {
    if v.visit_statement(statement)? == Visit::Children {
        match &statement.kind {
            StatementKind::Expression(e) => walk_expr(v, e)?,
            StatementKind::Declaration(vars) => {
                if let Some(shader) = v.shader() {
                    for id in vars {
                        if let Some(init) = &shader.variable(*id).initializer {
                            walk_expr(v, init)?;
                        }
                    }
                }
            }
            StatementKind::Block(statements) => {
                v.enter_scope()?;
                walk_statements(v, statements)?;
                v.leave_scope()?;
            }
            StatementKind::List(statements) => walk_statements(v, statements)?,
            StatementKind::If {
                condition,
                then,
                otherwise,
            } => {
                walk_expr(v, condition)?;
                walk_statement(v, then)?;
                if let Some(otherwise) = otherwise {
                    walk_statement(v, otherwise)?;
                }
            }
            StatementKind::For {
                init,
                condition,
                step,
                body,
                ..
            } => {
                if let Some(init) = init {
                    walk_statement(v, init)?;
                }
                if let Some(condition) = condition {
                    walk_expr(v, condition)?;
                }
                if let Some(step) = step {
                    walk_expr(v, step)?;
                }
                walk_statement(v, body)?;
            }
            StatementKind::While {
                condition, body, ..
            } => {
                walk_expr(v, condition)?;
                walk_statement(v, body)?;
            }
            StatementKind::Switch { selector, cases } => {
                walk_expr(v, selector)?;
                for case in cases {
                    for label in case.labels.iter().flatten() {
                        walk_expr(v, label)?;
                    }
                    walk_statements(v, &case.body)?;
                }
            }
            StatementKind::Return(e) => {
                if let Some(e) = e {
                    walk_expr(v, e)?;
                }
            }
            StatementKind::Asm(_) | StatementKind::Empty => (),
        }
    }
    v.leave_statement(statement)
}

pub fn walk_expr<'a, V: Visitor<'a> + ?Sized>(v: &mut V, expr: &'a Expr) -> Result<(), V::Error> {
    if v.visit_expr(expr)? == Visit::Children {
        match &expr.kind {
            ExprKind::Literal(_) | ExprKind::Variable { .. } | ExprKind::Keyword(_) => (),
            ExprKind::Member { target, .. } => walk_expr(v, target)?,
            ExprKind::Index { target, index } => {
                walk_expr(v, target)?;
                walk_expr(v, index)?;
            }
            ExprKind::Call { target, args } => {
                walk_expr(v, target)?;
                for arg in args {
                    walk_expr(v, arg)?;
                }
            }
            ExprKind::Constructor { args, .. }
            | ExprKind::List(args)
            | ExprKind::Initializer(args) => {
                for arg in args {
                    walk_expr(v, arg)?;
                }
            }
            ExprKind::Unary { expr, .. }
            | ExprKind::Parenthesized(expr)
            | ExprKind::Cast { expr, .. } => walk_expr(v, expr)?,
            ExprKind::Binary { left, right, .. } => {
                walk_expr(v, left)?;
                walk_expr(v, right)?;
            }
            ExprKind::Assign { target, value, .. } => {
                walk_expr(v, value)?;
                walk_expr(v, target)?;
            }
            ExprKind::Conditional {
                condition,
                then,
                otherwise,
            } => {
                walk_expr(v, condition)?;
                walk_expr(v, then)?;
                walk_expr(v, otherwise)?;
            }
            ExprKind::StateInitializer(states) => {
                for state in states {
                    walk_expr(v, &state.value)?;
                }
            }
        }
    }
    v.leave_expr(expr)
}

pub fn walk_statements_mut<V: VisitorMut + ?Sized>(
    v: &mut V,
    statements: &mut [Statement],
) -> Result<(), V::Error> {
    for statement in statements {
        walk_statement_mut(v, statement)?;
    }
    Ok(())
}

pub fn walk_statement_mut<V: VisitorMut + ?Sized>(
    v: &mut V,
    statement: &mut Statement,
) -> Result<(), V::Error> {
    if v.visit_statement(statement)? == Visit::Children {
        match &mut statement.kind {
            StatementKind::Expression(e) => walk_expr_mut(v, e)?,
            StatementKind::Declaration(vars) => {
                for id in vars.clone() {
                    walk_initializer_mut(v, id)?;
                }
            }
            StatementKind::Block(statements) => {
                v.enter_scope()?;
                walk_statements_mut(v, statements)?;
                v.leave_scope()?;
            }
            StatementKind::List(statements) => walk_statements_mut(v, statements)?,
            StatementKind::If {
                condition,
                then,
                otherwise,
            } => {
                walk_expr_mut(v, condition)?;
                walk_statement_mut(v, then)?;
                if let Some(otherwise) = otherwise {
                    walk_statement_mut(v, otherwise)?;
                }
            }
            StatementKind::For {
                init,
                condition,
                step,
                body,
                ..
            } => {
                if let Some(init) = init {
                    walk_statement_mut(v, init)?;
                }
                if let Some(condition) = condition {
                    walk_expr_mut(v, condition)?;
                }
                if let Some(step) = step {
                    walk_expr_mut(v, step)?;
                }
                walk_statement_mut(v, body)?;
            }
            StatementKind::While {
                condition, body, ..
            } => {
                walk_expr_mut(v, condition)?;
                walk_statement_mut(v, body)?;
            }
            StatementKind::Switch { selector, cases } => {
                walk_expr_mut(v, selector)?;
                for case in cases {
                    for label in case.labels.iter_mut().flatten() {
                        walk_expr_mut(v, label)?;
                    }
                    walk_statements_mut(v, &mut case.body)?;
                }
            }
            StatementKind::Return(e) => {
                if let Some(e) = e {
                    walk_expr_mut(v, e)?;
                }
            }
            StatementKind::Asm(_) | StatementKind::Empty => (),
        }
    }
    v.leave_statement(statement)
}

/// Walk the initializer of a variable stored in the shader arena.
///
/// The initializer is taken out of the arena while it is walked,
/// so hooks can freely access [VisitorMut::shader_mut].
pub fn walk_initializer_mut<V: VisitorMut + ?Sized>(v: &mut V, id: VarId) -> Result<(), V::Error> {
    let initializer = v
        .shader_mut()
        .and_then(|s| s.variable_mut(id).initializer.take());
    if let Some(mut initializer) = initializer {
        let result = walk_expr_mut(v, &mut initializer);
        if let Some(shader) = v.shader_mut() {
            shader.variable_mut(id).initializer = Some(initializer);
        }
        result?;
    }
    Ok(())
}

pub fn walk_expr_mut<V: VisitorMut + ?Sized>(v: &mut V, expr: &mut Expr) -> Result<(), V::Error> {
    if v.visit_expr(expr)? == Visit::Children {
        match &mut expr.kind {
            ExprKind::Literal(_) | ExprKind::Variable { .. } | ExprKind::Keyword(_) => (),
            ExprKind::Member { target, .. } => walk_expr_mut(v, target)?,
            ExprKind::Index { target, index } => {
                walk_expr_mut(v, target)?;
                walk_expr_mut(v, index)?;
            }
            ExprKind::Call { target, args } => {
                walk_expr_mut(v, target)?;
                for arg in args {
                    walk_expr_mut(v, arg)?;
                }
            }
            ExprKind::Constructor { args, .. }
            | ExprKind::List(args)
            | ExprKind::Initializer(args) => {
                for arg in args {
                    walk_expr_mut(v, arg)?;
                }
            }
            ExprKind::Unary { expr, .. }
            | ExprKind::Parenthesized(expr)
            | ExprKind::Cast { expr, .. } => walk_expr_mut(v, expr)?,
            ExprKind::Binary { left, right, .. } => {
                walk_expr_mut(v, left)?;
                walk_expr_mut(v, right)?;
            }
            ExprKind::Assign { target, value, .. } => {
                walk_expr_mut(v, value)?;
                walk_expr_mut(v, target)?;
            }
            ExprKind::Conditional {
                condition,
                then,
                otherwise,
            } => {
                walk_expr_mut(v, condition)?;
                walk_expr_mut(v, then)?;
                walk_expr_mut(v, otherwise)?;
            }
            ExprKind::StateInitializer(states) => {
                for state in states {
                    walk_expr_mut(v, &mut state.value)?;
                }
            }
        }
    }
    v.leave_expr(expr)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{
        expr::{AssignOp, BinaryOp},
        Type, Variable,
    };
    use pretty_assertions::assert_eq;
    use std::convert::Infallible;

    #[derive(Default)]
    struct Names<'a> {
        shader: Option<&'a Shader>,
        names: Vec<String>,
        scopes: usize,
    }

    impl<'a> Visitor<'a> for Names<'a> {
        type Error = Infallible;

        fn shader(&self) -> Option<&'a Shader> {
            self.shader
        }

        fn visit_expr(&mut self, expr: &'a Expr) -> Result<Visit, Self::Error> {
            if let ExprKind::Variable { name, .. } = &expr.kind {
                self.names.push(name.to_string());
            }
            Ok(Visit::Children)
        }

        fn enter_scope(&mut self) -> Result<(), Self::Error> {
            self.scopes += 1;
            Ok(())
        }
    }

    #[test]
    fn assignment_walks_value_before_target() {
        let statement = Statement::block(vec![Statement::expr(Expr::assign(
            AssignOp::Assign,
            Expr::name("a"),
            Expr::binary(BinaryOp::Add, Expr::name("b"), Expr::name("c")),
        ))]);

        let mut visitor = Names::default();
        walk_statement(&mut visitor, &statement).unwrap();
        assert_eq!(vec!["b", "c", "a"], visitor.names);
        assert_eq!(1, visitor.scopes);
    }

    #[test]
    fn declaration_initializers_need_shader() {
        let mut shader = Shader::default();
        let x = shader.add_variable(Variable::new("x", Type::float()).with_initializer(Expr::name("y")));
        let statement = Statement::declaration(vec![x]);

        let mut visitor = Names::default();
        walk_statement(&mut visitor, &statement).unwrap();
        assert!(visitor.names.is_empty());

        let mut visitor = Names {
            shader: Some(&shader),
            ..Default::default()
        };
        walk_statement(&mut visitor, &statement).unwrap();
        assert_eq!(vec!["y"], visitor.names);
    }

    struct Rename<'a> {
        shader: &'a mut Shader,
    }

    impl VisitorMut for Rename<'_> {
        type Error = Infallible;

        fn shader_mut(&mut self) -> Option<&mut Shader> {
            Some(&mut *self.shader)
        }

        fn leave_expr(&mut self, expr: &mut Expr) -> Result<(), Self::Error> {
            if let ExprKind::Variable { name, decl: None } = &mut expr.kind {
                // The initializer is detached from the arena while it is walked.
                assert!(self.shader.variables[0].initializer.is_none());
                *name = name.to_uppercase().into();
            }
            Ok(())
        }
    }

    #[test]
    fn rewrite_initializer_in_place() {
        let mut shader = Shader::default();
        let x = shader.add_variable(
            Variable::new("x", Type::float()).with_initializer(Expr::function("f", vec![Expr::name("y")])),
        );
        let mut statement = Statement::declaration(vec![x]);

        walk_statement_mut(&mut Rename { shader: &mut shader }, &mut statement).unwrap();
        assert_eq!(
            Some(Expr::function("F", vec![Expr::name("Y")])),
            shader.variable(x).initializer
        );
    }
}
