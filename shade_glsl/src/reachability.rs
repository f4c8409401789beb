use std::convert::Infallible;

use indexmap::IndexSet;
use log::debug;
use shade_ast::{
    visit::{walk_statements, Visit, Visitor},
    Declaration, Expr, MethodId, Shader,
};

use crate::call_graph::called_method;

/// Methods with a body transitively called from `entry` starting with `entry`.
pub fn reachable_methods(shader: &Shader, entry: MethodId) -> Vec<MethodId> {
    let mut reachable = IndexSet::new();
    reachable.insert(entry);

    let mut i = 0;
    while let Some(method) = reachable.get_index(i).copied() {
        let mut calls = Calls {
            shader,
            methods: Vec::new(),
        };
        walk_statements(&mut calls, &shader.method(method).body)
            .unwrap_or_else(|never| match never {});
        reachable.extend(calls.methods);
        i += 1;
    }

    reachable.into_iter().collect()
}

/// Remove method declarations not reachable from `entry`.
pub fn strip_unreachable(shader: &mut Shader, entry: MethodId) {
    let reachable = reachable_methods(shader, entry);
    shader.declarations.retain(|d| match d {
        Declaration::Method(m) => {
            let keep = reachable.contains(m);
            if !keep {
                debug!("strip unreachable method {}", shader.methods[m.0 as usize].name);
            }
            keep
        }
        _ => true,
    });
}

struct Calls<'a> {
    shader: &'a Shader,
    methods: Vec<MethodId>,
}

impl<'a> Visitor<'a> for Calls<'a> {
    type Error = Infallible;

    fn shader(&self) -> Option<&'a Shader> {
        Some(self.shader)
    }

    fn visit_expr(&mut self, expr: &'a Expr) -> Result<Visit, Self::Error> {
        if let Some(method) = called_method(self.shader, expr) {
            self.methods.push(method);
        }
        Ok(Visit::Children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::test_utils::*;
    use pretty_assertions::assert_eq;
    use shade_ast::{Statement, Type};

    #[test]
    fn strip_uncalled_methods() {
        let mut shader = Shader::default();
        let unused = method(&mut shader, "unused", Type::Void, Vec::new(), Vec::new());
        let c = method(&mut shader, "c", Type::Void, Vec::new(), Vec::new());
        let body = vec![Statement::expr(call(&shader, c, Vec::new()))];
        let b = method(&mut shader, "b", Type::Void, Vec::new(), body);
        let body = vec![Statement::expr(call(&shader, b, Vec::new()))];
        let main = method(&mut shader, "main", Type::Void, Vec::new(), body);

        assert_eq!(vec![main, b, c], reachable_methods(&shader, main));

        strip_unreachable(&mut shader, main);
        assert_eq!(
            vec![
                Declaration::Method(c),
                Declaration::Method(b),
                Declaration::Method(main)
            ],
            shader.declarations
        );
        // The arena keeps the method so ids stay valid.
        assert_eq!("unused", shader.method(unused).name);
    }

    #[test]
    fn calls_in_local_initializers() {
        let mut shader = Shader::default();
        let f = method(&mut shader, "f", Type::float(), Vec::new(), Vec::new());
        let init = Some(call(&shader, f, Vec::new()));
        let x = local(&mut shader, "x", Type::float(), init);
        let main = method(
            &mut shader,
            "main",
            Type::Void,
            Vec::new(),
            vec![Statement::declaration(vec![x])],
        );
        assert_eq!(vec![main, f], reachable_methods(&shader, main));
    }
}
