//! Shorthand for building resolved shaders in tests.
use shade_ast::{
    DeclRef, Expr, MethodDefinition, MethodId, Qualifier, SamplerType, ScalarType, Shader,
    Statement, TextureDim, Type, VarId, Variable,
};

pub fn global(shader: &mut Shader, name: &str, ty: Type) -> VarId {
    shader.push_global(Variable::new(name, ty))
}

pub fn local(shader: &mut Shader, name: &str, ty: Type, init: Option<Expr>) -> VarId {
    let mut var = Variable::new(name, ty);
    var.initializer = init;
    shader.add_variable(var)
}

pub fn param(shader: &mut Shader, name: &str, ty: Type, qualifiers: Vec<Qualifier>) -> VarId {
    shader.add_variable(Variable::new(name, ty).with_qualifiers(qualifiers))
}

pub fn method(
    shader: &mut Shader,
    name: &str,
    return_type: Type,
    parameters: Vec<VarId>,
    body: Vec<Statement>,
) -> MethodId {
    let mut method = MethodDefinition::new(name, return_type);
    method.parameters = parameters;
    method.body = body;
    shader.push_method(method)
}

pub fn var(shader: &Shader, id: VarId) -> Expr {
    shader.var_ref(id)
}

pub fn call(shader: &Shader, method: MethodId, args: Vec<Expr>) -> Expr {
    let m = shader.method(method);
    Expr::call(
        Expr::reference(m.name.clone(), DeclRef::Method(method)),
        args,
    )
    .with_type(m.return_type.clone())
}

pub fn texture2d() -> Type {
    Type::Texture {
        dim: TextureDim::Texture2D,
        element: None,
    }
}

pub fn texture(dim: TextureDim, element: Option<Type>) -> Type {
    Type::Texture {
        dim,
        element: element.map(Box::new),
    }
}

pub fn sampler_state() -> Type {
    Type::SamplerState { comparison: false }
}

pub fn sampler2d() -> Type {
    Type::Sampler(Some(SamplerType::new(TextureDim::Texture2D)))
}

pub fn vec2() -> Type {
    Type::Vector(ScalarType::Float, 2)
}

pub fn vec4() -> Type {
    Type::Vector(ScalarType::Float, 4)
}
