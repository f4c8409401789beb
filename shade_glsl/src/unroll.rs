//! Expand `[unroll]` for loops with constant iteration counts into straight line copies.
use log::debug;
use shade_ast::{
    clone::Cloner,
    statement::find_attribute,
    visit::{walk_statements_mut, VisitorMut},
    AssignOp, BinaryOp, DeclRef, Expr, ExprKind, Keyword, Literal, MethodId, Shader, Statement,
    StatementKind, Type, UnaryOp, VarId, Variable,
};

use crate::{
    diagnostics::Diagnostics,
    error::{StructuralError, TranspileError},
    loop_exit::{contains_loop_exit, restructure_loop_exits},
};

/// The maximum number of copies created for a single loop.
pub const MAX_UNROLL_ITERATIONS: usize = 1024;

/// Unroll every `[unroll]` for loop in the bodies of `methods`.
///
/// Nested loops are unrolled before the loops containing them.
pub fn unroll_loops(
    shader: &mut Shader,
    methods: &[MethodId],
    diagnostics: &mut Diagnostics,
) -> Result<(), TranspileError> {
    let mut unroller = Unroller {
        shader,
        diagnostics,
        flag_count: 0,
    };
    for method in methods {
        let mut body = std::mem::take(&mut unroller.shader.method_mut(*method).body);
        let result = walk_statements_mut(&mut unroller, &mut body);
        unroller.shader.method_mut(*method).body = body;
        result?;
    }
    Ok(())
}

/// A for loop in the form `for (i = start; i < stop; i += step)`.
#[derive(Debug, PartialEq)]
struct LoopBounds {
    start: i64,
    condition: BinaryOp,
    stop: i64,
    step: i64,
}

impl LoopBounds {
    fn parse(
        init: Option<&Statement>,
        condition: Option<&Expr>,
        step: Option<&Expr>,
        shader: &Shader,
    ) -> Option<Self> {
        let (var, start) = match &init?.kind {
            StatementKind::Declaration(vars) => match vars.as_slice() {
                [var] => (*var, literal_value(shader.variable(*var).initializer.as_ref()?)?),
                _ => return None,
            },
            StatementKind::Expression(Expr {
                kind:
                    ExprKind::Assign {
                        op: AssignOp::Assign,
                        target,
                        value,
                    },
                ..
            }) => (loop_var(target)?, literal_value(value)?),
            _ => return None,
        };

        let (condition, stop) = match &condition?.kind {
            ExprKind::Binary { op, left, right } if loop_var(left) == Some(var) => {
                (*op, literal_value(right)?)
            }
            _ => return None,
        };

        let step = match &step?.kind {
            ExprKind::Unary { op, expr } if loop_var(expr) == Some(var) => match op {
                UnaryOp::PreIncrement | UnaryOp::PostIncrement => 1,
                UnaryOp::PreDecrement | UnaryOp::PostDecrement => -1,
                _ => return None,
            },
            ExprKind::Assign { op, target, value } if loop_var(target) == Some(var) => match op {
                AssignOp::Add => literal_value(value)?,
                AssignOp::Sub => -literal_value(value)?,
                AssignOp::Assign => match &value.kind {
                    // i = i + 2 or i = 2 + i
                    ExprKind::Binary {
                        op: BinaryOp::Add,
                        left,
                        right,
                    } => {
                        if loop_var(left) == Some(var) {
                            literal_value(right)?
                        } else if loop_var(right) == Some(var) {
                            literal_value(left)?
                        } else {
                            return None;
                        }
                    }
                    ExprKind::Binary {
                        op: BinaryOp::Sub,
                        left,
                        right,
                    } if loop_var(left) == Some(var) => -literal_value(right)?,
                    _ => return None,
                },
                _ => return None,
            },
            _ => return None,
        };

        Some(Self {
            start,
            condition,
            stop,
            step,
        })
    }

    /// The number of iterations or `None` if the loop doesn't terminate quickly enough.
    fn iteration_count(&self) -> Option<usize> {
        let mut i = self.start;
        for count in 0..=MAX_UNROLL_ITERATIONS {
            let continues = match self.condition {
                BinaryOp::Less => i < self.stop,
                BinaryOp::LessEqual => i <= self.stop,
                BinaryOp::Greater => i > self.stop,
                BinaryOp::GreaterEqual => i >= self.stop,
                BinaryOp::NotEqual => i != self.stop,
                _ => return None,
            };
            if !continues {
                return Some(count);
            }
            i = i.checked_add(self.step)?;
        }
        None
    }
}

fn loop_var(expr: &Expr) -> Option<VarId> {
    match expr.decl() {
        Some(DeclRef::Variable(id)) => Some(id),
        _ => None,
    }
}

fn literal_value(expr: &Expr) -> Option<i64> {
    match &expr.kind {
        ExprKind::Literal(Literal::Int(i)) => Some(*i),
        ExprKind::Literal(Literal::Uint(u)) => i64::try_from(*u).ok(),
        ExprKind::Unary {
            op: UnaryOp::Negate,
            expr,
        } => literal_value(expr).map(|v| -v),
        ExprKind::Parenthesized(e) => literal_value(e),
        _ => None,
    }
}

struct Unroller<'a> {
    shader: &'a mut Shader,
    diagnostics: &'a mut Diagnostics,
    flag_count: usize,
}

impl Unroller<'_> {
    /// Number every loop's flags but only declare the flags the loop uses.
    fn flag(&mut self, name: &str, used: bool) -> Option<VarId> {
        let name = format!("{name}{}", self.flag_count);
        self.flag_count += 1;
        used.then(|| {
            self.shader
                .add_variable(Variable::new(name, Type::bool()).with_initializer(Expr::bool(false)))
        })
    }

    fn unroll(&mut self, statement: &Statement) -> Result<Option<Statement>, TranspileError> {
        let StatementKind::For {
            init,
            condition,
            step,
            body,
            attributes,
        } = &statement.kind
        else {
            return Ok(None);
        };
        if find_attribute(attributes, "unroll").is_none() {
            return Ok(None);
        }

        let count = LoopBounds::parse(init.as_deref(), condition.as_ref(), step.as_ref(), self.shader)
            .and_then(|bounds| bounds.iteration_count());
        let Some(count) = count else {
            self.diagnostics
                .error("unable to unroll for statement", statement.span);
            return Err(StructuralError::UnrollFailed {
                span: statement.span,
            }
            .into());
        };
        debug!("unroll loop at {:?} with {count} iterations", statement.span);

        if count == 0 {
            return Ok(Some(Statement::new(StatementKind::Empty).with_span(statement.span)));
        }

        let mut body = match &body.kind {
            StatementKind::Block(statements) => statements.clone(),
            _ => vec![(**body).clone()],
        };

        let break_flag = self.flag("isBreak", contains_loop_exit(&body, Keyword::Break));
        let break_ref = break_flag.map(|f| self.shader.var_ref(f));
        if let Some(flag) = &break_ref {
            restructure_loop_exits(&mut body, flag, Keyword::Break, self.diagnostics)?;
        }

        let continue_flag = self.flag("isContinue", contains_loop_exit(&body, Keyword::Continue));
        let continue_ref = continue_flag.map(|f| self.shader.var_ref(f));
        if let Some(flag) = &continue_ref {
            restructure_loop_exits(&mut body, flag, Keyword::Continue, self.diagnostics)?;
        }

        let mut statements = Vec::new();
        if let Some(init) = init {
            statements.push((**init).clone());
        }
        if let Some(flag) = break_flag {
            statements.push(Statement::declaration(vec![flag]));
        }
        if let Some(flag) = continue_flag {
            statements.push(Statement::declaration(vec![flag]));
        }

        let mut copies = Vec::new();
        for _ in 0..count {
            let mut cloner = Cloner::new(&mut *self.shader);
            let mut copy = cloner.statements(&body);
            if let Some(step) = step {
                copy.push(Statement::expr(cloner.expr(step)));
            }
            if let Some(flag) = &continue_ref {
                copy.push(Statement::expr(Expr::assign(
                    AssignOp::Assign,
                    flag.clone(),
                    Expr::bool(false),
                )));
            }
            copies.push(copy);
        }

        if let Some(flag) = break_ref {
            // Each copy only runs if the previous copies didn't break.
            let nested = copies.into_iter().rev().fold(None, |inner, mut copy| {
                if let Some(inner) = inner {
                    copy.push(inner);
                }
                Some(Statement::if_then(
                    Expr::unary(UnaryOp::Not, flag.clone()),
                    Statement::block(copy),
                ))
            });
            statements.extend(nested);
        } else {
            statements.extend(copies.into_iter().map(Statement::block));
        }

        Ok(Some(Statement::block(statements).with_span(statement.span)))
    }
}

impl VisitorMut for Unroller<'_> {
    type Error = TranspileError;

    fn shader_mut(&mut self) -> Option<&mut Shader> {
        Some(&mut *self.shader)
    }

    fn leave_statement(&mut self, statement: &mut Statement) -> Result<(), Self::Error> {
        if let Some(unrolled) = self.unroll(statement)? {
            *statement = unrolled;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::test_utils::*;
    use pretty_assertions::assert_eq;
    use shade_ast::Attribute;

    fn unroll_attribute() -> Vec<Attribute> {
        vec![Attribute {
            name: "unroll".into(),
            args: Vec::new(),
        }]
    }

    /// `[unroll] for (int i = start; i <condition> stop; i++) { body }`
    fn for_loop(
        shader: &mut Shader,
        start: i64,
        condition: BinaryOp,
        stop: i64,
        body: Vec<Statement>,
    ) -> (VarId, Statement) {
        let i = local(shader, "i", Type::int(), Some(Expr::int(start)));
        let statement = Statement::new(StatementKind::For {
            init: Some(Box::new(Statement::declaration(vec![i]))),
            condition: Some(Expr::binary(condition, var(shader, i), Expr::int(stop))),
            step: Some(increment(shader, i)),
            body: Box::new(Statement::block(body)),
            attributes: unroll_attribute(),
        });
        (i, statement)
    }

    fn increment(shader: &Shader, i: VarId) -> Expr {
        Expr::unary(UnaryOp::PostIncrement, var(shader, i))
    }

    fn bounds(start: i64, condition: BinaryOp, stop: i64, step: i64) -> LoopBounds {
        LoopBounds {
            start,
            condition,
            stop,
            step,
        }
    }

    fn run(shader: &mut Shader, body: Vec<Statement>) -> Result<Vec<Statement>, TranspileError> {
        let main = method(shader, "main", Type::Void, Vec::new(), body);
        unroll_loops(shader, &[main], &mut Diagnostics::default())?;
        Ok(shader.method(main).body.clone())
    }

    #[test]
    fn iteration_counts() {
        assert_eq!(Some(4), bounds(0, BinaryOp::Less, 4, 1).iteration_count());
        assert_eq!(Some(4), bounds(0, BinaryOp::LessEqual, 3, 1).iteration_count());
        assert_eq!(Some(4), bounds(4, BinaryOp::Greater, 0, -1).iteration_count());
        assert_eq!(Some(5), bounds(4, BinaryOp::GreaterEqual, 0, -1).iteration_count());
        assert_eq!(Some(3), bounds(0, BinaryOp::NotEqual, 6, 2).iteration_count());
        assert_eq!(Some(2), bounds(0, BinaryOp::Less, 3, 2).iteration_count());
        assert_eq!(Some(0), bounds(5, BinaryOp::Less, 0, 1).iteration_count());
        assert_eq!(None, bounds(0, BinaryOp::Less, 4, 0).iteration_count());
        assert_eq!(None, bounds(0, BinaryOp::NotEqual, 5, 2).iteration_count());
        assert_eq!(None, bounds(0, BinaryOp::Equal, 0, 1).iteration_count());
    }

    #[test]
    fn parse_step_forms() {
        let mut shader = Shader::default();
        let i = local(&mut shader, "i", Type::int(), Some(Expr::int(1)));
        let init = Statement::declaration(vec![i]);
        let condition = Expr::binary(BinaryOp::Less, var(&shader, i), Expr::int(8));

        let steps = [
            (Expr::unary(UnaryOp::PreDecrement, var(&shader, i)), -1),
            (Expr::assign(AssignOp::Add, var(&shader, i), Expr::int(2)), 2),
            (Expr::assign(AssignOp::Sub, var(&shader, i), Expr::int(3)), -3),
            (
                Expr::assign(
                    AssignOp::Assign,
                    var(&shader, i),
                    Expr::binary(BinaryOp::Add, Expr::int(4), var(&shader, i)),
                ),
                4,
            ),
        ];
        for (step, expected) in steps {
            let bounds = LoopBounds::parse(Some(&init), Some(&condition), Some(&step), &shader).unwrap();
            assert_eq!(expected, bounds.step);
            assert_eq!(1, bounds.start);
            assert_eq!(8, bounds.stop);
        }
    }

    #[test]
    fn unroll_without_exits() {
        let mut shader = Shader::default();
        let i = local(&mut shader, "i", Type::int(), Some(Expr::int(0)));
        let body = vec![Statement::expr(Expr::function("f", vec![var(&shader, i)]))];
        let statement = Statement::new(StatementKind::For {
            init: Some(Box::new(Statement::declaration(vec![i]))),
            condition: Some(Expr::binary(BinaryOp::Less, var(&shader, i), Expr::int(2))),
            step: Some(increment(&shader, i)),
            body: Box::new(Statement::block(body.clone())),
            attributes: unroll_attribute(),
        });

        let copy = Statement::block(vec![
            Statement::expr(Expr::function("f", vec![var(&shader, i)])),
            Statement::expr(increment(&shader, i)),
        ]);
        assert_eq!(
            vec![Statement::block(vec![
                Statement::declaration(vec![i]),
                copy.clone(),
                copy
            ])],
            run(&mut shader, vec![statement]).unwrap()
        );
    }

    #[test]
    fn unroll_with_break_nests_copies() {
        let mut shader = Shader::default();
        let body = vec![
            Statement::if_then(
                Expr::name("c"),
                Statement::expr(Expr::keyword(Keyword::Break)),
            ),
            Statement::expr(Expr::function("f", Vec::new())),
        ];
        let i = local(&mut shader, "i", Type::int(), Some(Expr::int(0)));
        let statement = Statement::new(StatementKind::For {
            init: Some(Box::new(Statement::declaration(vec![i]))),
            condition: Some(Expr::binary(BinaryOp::Less, var(&shader, i), Expr::int(2))),
            step: Some(increment(&shader, i)),
            body: Box::new(Statement::block(body)),
            attributes: unroll_attribute(),
        });

        let body = run(&mut shader, vec![statement]).unwrap();

        let flag = shader
            .variables
            .iter()
            .position(|v| v.name == "isBreak0")
            .map(|i| VarId(i as u32))
            .unwrap();
        // The loop has no continue, so only its number is reserved.
        assert!(!shader.variables.iter().any(|v| v.name == "isContinue1"));
        let flag_ref = shader.var_ref(flag);

        let copy = |inner: Option<Statement>| {
            let mut statements = vec![
                Statement::if_then(
                    Expr::name("c"),
                    Statement::expr(Expr::assign(
                        AssignOp::Assign,
                        flag_ref.clone(),
                        Expr::bool(true),
                    )),
                ),
                Statement::if_then(
                    Expr::unary(UnaryOp::Not, flag_ref.clone()),
                    Statement::block(vec![Statement::expr(Expr::function("f", Vec::new()))]),
                ),
                Statement::expr(increment(&shader, i)),
            ];
            statements.extend(inner);
            Statement::if_then(
                Expr::unary(UnaryOp::Not, flag_ref.clone()),
                Statement::block(statements),
            )
        };

        assert_eq!(
            vec![Statement::block(vec![
                Statement::declaration(vec![i]),
                Statement::declaration(vec![flag]),
                copy(Some(copy(None))),
            ])],
            body
        );
    }

    #[test]
    fn declare_only_used_flags() {
        let mut shader = Shader::default();
        let exit = |keyword| {
            vec![
                Statement::if_then(Expr::name("c"), Statement::expr(Expr::keyword(keyword))),
                Statement::expr(Expr::function("f", Vec::new())),
            ]
        };
        let (_, first) = for_loop(&mut shader, 0, BinaryOp::Less, 2, exit(Keyword::Continue));
        let (_, second) = for_loop(&mut shader, 0, BinaryOp::Less, 2, exit(Keyword::Break));
        let (_, third) = for_loop(&mut shader, 0, BinaryOp::Less, 2, Vec::new());
        run(&mut shader, vec![first, second, third]).unwrap();

        let flags: Vec<_> = shader
            .variables
            .iter()
            .filter(|v| v.ty == Type::bool())
            .map(|v| v.name.as_str())
            .collect();
        assert_eq!(vec!["isContinue1", "isBreak2"], flags);
    }

    #[test]
    fn copies_declare_fresh_locals() {
        let mut shader = Shader::default();
        let x = local(&mut shader, "x", Type::float(), Some(Expr::float(1.0)));
        let body = vec![
            Statement::declaration(vec![x]),
            Statement::expr(Expr::function("f", vec![var(&shader, x)])),
        ];
        let (_, statement) = for_loop(&mut shader, 0, BinaryOp::Less, 3, body);

        let body = run(&mut shader, vec![statement]).unwrap();
        let StatementKind::Block(statements) = &body[0].kind else {
            panic!("expected block")
        };

        let mut declared = Vec::new();
        for copy in &statements[1..] {
            let StatementKind::Block(copy) = &copy.kind else {
                panic!("expected block")
            };
            let StatementKind::Declaration(vars) = &copy[0].kind else {
                panic!("expected declaration")
            };
            declared.push(vars[0]);
            // References point to the local declared in the same copy.
            assert_eq!(
                Some(DeclRef::Variable(vars[0])),
                match &copy[1].as_expr().unwrap().kind {
                    ExprKind::Call { args, .. } => args[0].decl(),
                    _ => None,
                }
            );
        }
        assert_eq!(3, declared.len());
        assert!(!declared.contains(&x));
        assert_ne!(declared[0], declared[1]);
        assert_ne!(declared[1], declared[2]);
    }

    #[test]
    fn zero_iterations() {
        let mut shader = Shader::default();
        let (_, statement) = for_loop(&mut shader, 4, BinaryOp::Less, 0, Vec::new());
        assert_eq!(
            vec![Statement::new(StatementKind::Empty)],
            run(&mut shader, vec![statement]).unwrap()
        );
    }

    #[test]
    fn unknown_iteration_count() {
        let mut shader = Shader::default();
        let i = local(&mut shader, "i", Type::int(), Some(Expr::int(0)));
        let statement = Statement::new(StatementKind::For {
            init: Some(Box::new(Statement::declaration(vec![i]))),
            condition: Some(Expr::binary(BinaryOp::Less, var(&shader, i), Expr::name("count"))),
            step: Some(increment(&shader, i)),
            body: Box::new(Statement::block(Vec::new())),
            attributes: unroll_attribute(),
        });

        let main = method(&mut shader, "main", Type::Void, Vec::new(), vec![statement]);
        let mut diagnostics = Diagnostics::default();
        assert_eq!(
            Err(TranspileError::Structural(StructuralError::UnrollFailed {
                span: Default::default()
            })),
            unroll_loops(&mut shader, &[main], &mut diagnostics)
        );
        assert_eq!(1, diagnostics.error_count());
    }

    #[test]
    fn loops_without_unroll_are_unchanged() {
        let mut shader = Shader::default();
        let i = local(&mut shader, "i", Type::int(), Some(Expr::int(0)));
        let statement = Statement::new(StatementKind::For {
            init: Some(Box::new(Statement::declaration(vec![i]))),
            condition: Some(Expr::binary(BinaryOp::Less, var(&shader, i), Expr::int(4))),
            step: Some(increment(&shader, i)),
            body: Box::new(Statement::block(vec![Statement::expr(Expr::keyword(
                Keyword::Break,
            ))])),
            attributes: Vec::new(),
        });
        assert_eq!(
            vec![statement.clone()],
            run(&mut shader, vec![statement]).unwrap()
        );
    }
}
