//! Replace `break` and `continue` in unrolled loop bodies with flag guarded branches.
//!
//! An unrolled body is no longer inside a loop, so each keyword statement becomes `flag = true;`
//! and every statement that would be skipped by the keyword moves into an `if (!flag) { ... }` block.
use std::convert::Infallible;

use shade_ast::{
    visit::{walk_expr, Visit, Visitor},
    AssignOp, Expr, Keyword, Span, Statement, StatementKind, UnaryOp,
};

use crate::{
    diagnostics::Diagnostics,
    error::{InternalError, StructuralError, TranspileError},
};

/// The child of a statement on the path to a keyword.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum Step {
    /// A statement in a block, statement list, or switch case.
    Index(usize),
    Then,
    Else,
    Case(usize),
}

/// Restructure every `keyword` in `statements` to set `flag` instead.
///
/// Nested loops are left unchanged since their keywords apply to the nested loop.
/// Returns `true` if any keyword was replaced.
pub fn restructure_loop_exits(
    statements: &mut Vec<Statement>,
    flag: &Expr,
    keyword: Keyword,
    diagnostics: &mut Diagnostics,
) -> Result<bool, TranspileError> {
    let mut collector = KeywordCollector {
        keyword,
        path: Vec::new(),
        occurrences: Vec::new(),
        misplaced: Vec::new(),
    };
    collector.list(statements);

    if let Some(span) = collector.misplaced.first().copied() {
        for span in &collector.misplaced {
            diagnostics.error(
                format!("{} must be a statement of its own", keyword.name()),
                *span,
            );
        }
        return Err(StructuralError::KeywordNotStatement {
            keyword: keyword.name(),
            span,
        }
        .into());
    }

    // Later occurrences only move statements after themselves,
    // so the paths of earlier occurrences stay valid.
    for path in collector.occurrences.iter().rev() {
        restructure_list(statements, path, flag)?;
    }

    Ok(!collector.occurrences.is_empty())
}

/// `true` if `statements` use `keyword` to exit the enclosing loop.
pub fn contains_loop_exit(statements: &[Statement], keyword: Keyword) -> bool {
    let mut collector = KeywordCollector {
        keyword,
        path: Vec::new(),
        occurrences: Vec::new(),
        misplaced: Vec::new(),
    };
    collector.list(statements);
    !collector.occurrences.is_empty() || !collector.misplaced.is_empty()
}

struct KeywordCollector {
    keyword: Keyword,
    path: Vec<Step>,
    occurrences: Vec<Vec<Step>>,
    misplaced: Vec<Span>,
}

impl KeywordCollector {
    fn list(&mut self, statements: &[Statement]) {
        for (i, statement) in statements.iter().enumerate() {
            self.path.push(Step::Index(i));
            self.statement(statement);
            self.path.pop();
        }
    }

    fn statement(&mut self, statement: &Statement) {
        match &statement.kind {
            StatementKind::Expression(e) => {
                if e.is_keyword(self.keyword) {
                    self.occurrences.push(self.path.clone());
                } else {
                    self.expr(e);
                }
            }
            StatementKind::Block(statements) | StatementKind::List(statements) => {
                self.list(statements)
            }
            StatementKind::If {
                condition,
                then,
                otherwise,
            } => {
                self.expr(condition);
                self.path.push(Step::Then);
                self.statement(then);
                self.path.pop();
                if let Some(otherwise) = otherwise {
                    self.path.push(Step::Else);
                    self.statement(otherwise);
                    self.path.pop();
                }
            }
            StatementKind::Switch { selector, cases } => {
                self.expr(selector);
                // A break inside a switch exits the switch instead.
                if self.keyword == Keyword::Continue {
                    for (i, case) in cases.iter().enumerate() {
                        self.path.push(Step::Case(i));
                        self.list(&case.body);
                        self.path.pop();
                    }
                }
            }
            StatementKind::Return(Some(e)) => self.expr(e),
            StatementKind::For { .. }
            | StatementKind::While { .. }
            | StatementKind::Declaration(_)
            | StatementKind::Return(None)
            | StatementKind::Asm(_)
            | StatementKind::Empty => (),
        }
    }

    fn expr(&mut self, expr: &Expr) {
        let mut finder = KeywordFinder {
            keyword: self.keyword,
            spans: Vec::new(),
        };
        walk_expr(&mut finder, expr).unwrap_or_else(|never| match never {});
        self.misplaced.extend(finder.spans);
    }
}

struct KeywordFinder {
    keyword: Keyword,
    spans: Vec<Span>,
}

impl<'a> Visitor<'a> for KeywordFinder {
    type Error = Infallible;

    fn visit_expr(&mut self, expr: &'a Expr) -> Result<Visit, Self::Error> {
        if expr.is_keyword(self.keyword) {
            self.spans.push(expr.span);
        }
        Ok(Visit::Children)
    }
}

fn restructure_list(
    statements: &mut Vec<Statement>,
    path: &[Step],
    flag: &Expr,
) -> Result<(), TranspileError> {
    let (index, rest) = match path.split_first() {
        Some((Step::Index(i), rest)) if *i < statements.len() => (*i, rest),
        Some((Step::Index(i), _)) => return Err(InternalError::ScopeNotFound { index: *i }.into()),
        _ => return Err(InternalError::ScopeNotFound { index: path.len() }.into()),
    };

    if rest.is_empty() {
        // Statements after the keyword in the same list are never executed.
        statements.truncate(index + 1);
        set_flag(&mut statements[index], flag);
    } else {
        let trailing = statements.split_off(index + 1);
        if !trailing.is_empty() {
            statements.push(Statement::if_then(
                Expr::unary(UnaryOp::Not, flag.clone()),
                Statement::block(trailing),
            ));
        }
        restructure_statement(&mut statements[index], rest, flag)?;
    }
    Ok(())
}

fn restructure_statement(
    statement: &mut Statement,
    path: &[Step],
    flag: &Expr,
) -> Result<(), TranspileError> {
    if path.is_empty() {
        set_flag(statement, flag);
        return Ok(());
    }

    match (&mut statement.kind, path[0]) {
        (StatementKind::Block(statements) | StatementKind::List(statements), Step::Index(_)) => {
            restructure_list(statements, path, flag)
        }
        (StatementKind::If { then, .. }, Step::Then) => restructure_statement(then, &path[1..], flag),
        (
            StatementKind::If {
                otherwise: Some(otherwise),
                ..
            },
            Step::Else,
        ) => restructure_statement(otherwise, &path[1..], flag),
        (StatementKind::Switch { cases, .. }, Step::Case(i)) => match cases.get_mut(i) {
            Some(case) => restructure_list(&mut case.body, &path[1..], flag),
            None => Err(InternalError::ScopeNotFound { index: i }.into()),
        },
        _ => Err(InternalError::ScopeNotFound { index: path.len() }.into()),
    }
}

fn set_flag(statement: &mut Statement, flag: &Expr) {
    let span = statement.span;
    *statement = Statement::expr(Expr::assign(AssignOp::Assign, flag.clone(), Expr::bool(true)))
        .with_span(span);
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use shade_ast::{DeclRef, StatementKind, VarId};

    fn flag() -> Expr {
        Expr::reference("isBreak0", DeclRef::Variable(VarId(0)))
    }

    fn stmt(name: &str) -> Statement {
        Statement::expr(Expr::function(name, Vec::new()))
    }

    fn keyword(keyword: Keyword) -> Statement {
        Statement::expr(Expr::keyword(keyword))
    }

    fn set() -> Statement {
        Statement::expr(Expr::assign(AssignOp::Assign, flag(), Expr::bool(true)))
    }

    fn guard(statements: Vec<Statement>) -> Statement {
        Statement::if_then(
            Expr::unary(UnaryOp::Not, flag()),
            Statement::block(statements),
        )
    }

    #[test]
    fn final_break_sets_flag_without_guard() {
        let mut statements = vec![stmt("a"), keyword(Keyword::Break)];
        let found = restructure_loop_exits(
            &mut statements,
            &flag(),
            Keyword::Break,
            &mut Diagnostics::default(),
        )
        .unwrap();
        assert!(found);
        assert_eq!(vec![stmt("a"), set()], statements);
    }

    #[test]
    fn break_discards_trailing_statements() {
        let mut statements = vec![keyword(Keyword::Break), stmt("a")];
        restructure_loop_exits(
            &mut statements,
            &flag(),
            Keyword::Break,
            &mut Diagnostics::default(),
        )
        .unwrap();
        assert_eq!(vec![set()], statements);
    }

    #[test]
    fn nested_break_guards_trailing_statements() {
        // a; if (c) { b; break; d; } e; f;
        let mut statements = vec![
            stmt("a"),
            Statement::if_then(
                Expr::name("c"),
                Statement::block(vec![stmt("b"), keyword(Keyword::Break), stmt("d")]),
            ),
            stmt("e"),
            stmt("f"),
        ];
        restructure_loop_exits(
            &mut statements,
            &flag(),
            Keyword::Break,
            &mut Diagnostics::default(),
        )
        .unwrap();
        assert_eq!(
            vec![
                stmt("a"),
                Statement::if_then(Expr::name("c"), Statement::block(vec![stmt("b"), set()])),
                guard(vec![stmt("e"), stmt("f")]),
            ],
            statements
        );
    }

    #[test]
    fn break_in_else_without_block() {
        // if (c) a; else break; b;
        let mut statements = vec![
            Statement::new(StatementKind::If {
                condition: Expr::name("c"),
                then: Box::new(stmt("a")),
                otherwise: Some(Box::new(keyword(Keyword::Break))),
            }),
            stmt("b"),
        ];
        restructure_loop_exits(
            &mut statements,
            &flag(),
            Keyword::Break,
            &mut Diagnostics::default(),
        )
        .unwrap();
        assert_eq!(
            vec![
                Statement::new(StatementKind::If {
                    condition: Expr::name("c"),
                    then: Box::new(stmt("a")),
                    otherwise: Some(Box::new(set())),
                }),
                guard(vec![stmt("b")]),
            ],
            statements
        );
    }

    #[test]
    fn multiple_continues() {
        // if (a) { continue; } b; if (c) { continue; } d;
        let mut statements = vec![
            Statement::if_then(Expr::name("a"), Statement::block(vec![keyword(Keyword::Continue)])),
            stmt("b"),
            Statement::if_then(Expr::name("c"), Statement::block(vec![keyword(Keyword::Continue)])),
            stmt("d"),
        ];
        restructure_loop_exits(
            &mut statements,
            &flag(),
            Keyword::Continue,
            &mut Diagnostics::default(),
        )
        .unwrap();
        assert_eq!(
            vec![
                Statement::if_then(Expr::name("a"), Statement::block(vec![set()])),
                guard(vec![
                    stmt("b"),
                    Statement::if_then(Expr::name("c"), Statement::block(vec![set()])),
                    guard(vec![stmt("d")]),
                ]),
            ],
            statements
        );
    }

    #[test]
    fn nested_loops_keep_their_keywords() {
        let nested = Statement::new(StatementKind::While {
            condition: Expr::bool(true),
            body: Box::new(Statement::block(vec![keyword(Keyword::Break)])),
            do_while: false,
            attributes: Vec::new(),
        });
        let mut statements = vec![nested.clone(), stmt("a")];
        let found = restructure_loop_exits(
            &mut statements,
            &flag(),
            Keyword::Break,
            &mut Diagnostics::default(),
        )
        .unwrap();
        assert!(!found);
        assert_eq!(vec![nested, stmt("a")], statements);
    }

    #[test]
    fn switch_break_is_not_a_loop_exit() {
        let switch = Statement::new(StatementKind::Switch {
            selector: Expr::name("x"),
            cases: vec![shade_ast::SwitchCase {
                labels: vec![None],
                body: vec![stmt("a"), keyword(Keyword::Break)],
            }],
        });
        let mut statements = vec![switch.clone()];
        let found = restructure_loop_exits(
            &mut statements,
            &flag(),
            Keyword::Break,
            &mut Diagnostics::default(),
        )
        .unwrap();
        assert!(!found);
        assert_eq!(vec![switch], statements);
    }

    #[test]
    fn continue_inside_switch_case() {
        let mut statements = vec![
            Statement::new(StatementKind::Switch {
                selector: Expr::name("x"),
                cases: vec![shade_ast::SwitchCase {
                    labels: vec![Some(Expr::int(0))],
                    body: vec![keyword(Keyword::Continue), stmt("a")],
                }],
            }),
            stmt("b"),
        ];
        restructure_loop_exits(
            &mut statements,
            &flag(),
            Keyword::Continue,
            &mut Diagnostics::default(),
        )
        .unwrap();
        assert_eq!(
            vec![
                Statement::new(StatementKind::Switch {
                    selector: Expr::name("x"),
                    cases: vec![shade_ast::SwitchCase {
                        labels: vec![Some(Expr::int(0))],
                        body: vec![set()],
                    }],
                }),
                guard(vec![stmt("b")]),
            ],
            statements
        );
    }

    #[test]
    fn continue_as_condition() {
        let misplaced = Expr::keyword(Keyword::Continue).with_span(Span::new(4, 12));
        let mut statements = vec![
            Statement::if_then(misplaced.clone(), stmt("a")),
            Statement::if_then(misplaced, stmt("b")),
        ];
        let original = statements.clone();

        let mut diagnostics = Diagnostics::default();
        assert_eq!(
            Err(TranspileError::Structural(
                StructuralError::KeywordNotStatement {
                    keyword: "continue",
                    span: Span::new(4, 12)
                }
            )),
            restructure_loop_exits(&mut statements, &flag(), Keyword::Continue, &mut diagnostics)
        );
        assert_eq!(2, diagnostics.error_count());
        assert_eq!(original, statements);
    }

    #[test]
    fn missing_scope() {
        let mut statements = vec![stmt("a")];
        assert_eq!(
            Err(TranspileError::Internal(InternalError::ScopeNotFound {
                index: 3
            })),
            restructure_list(&mut statements, &[Step::Index(3)], &flag())
        );
        assert_eq!(
            Err(TranspileError::Internal(InternalError::ScopeNotFound {
                index: 1
            })),
            restructure_list(&mut statements, &[Step::Index(0), Step::Else], &flag())
        );
    }
}
