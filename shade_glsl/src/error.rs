use shade_ast::Span;
use smol_str::SmolStr;
use thiserror::Error;

/// Errors caused by input the converter does not support.
#[derive(Debug, Error, PartialEq)]
pub enum StructuralError {
    #[error("{keyword} at {span:?} must be a statement of its own")]
    KeywordNotStatement { keyword: &'static str, span: Span },

    #[error("unable to resolve the sampler for texture {texture} at {span:?}")]
    UnresolvedSampler { texture: SmolStr, span: Span },

    #[error("argument {index} of call to {method} must be a global texture or sampler")]
    UnresolvedResourceArgument { method: SmolStr, index: usize, span: Span },

    #[error("no shader provided for {stage} stage")]
    MissingShader { stage: String },

    #[error("entry point {name} not found")]
    MissingEntryPoint { name: String },

    #[error("recursive call to {method} is not supported")]
    RecursiveCall { method: SmolStr, span: Span },

    #[error("call depth exceeded the limit of {limit} calling {method}")]
    CallDepthExceeded { method: SmolStr, limit: usize },

    #[error("unable to determine the iteration count of loop at {span:?}")]
    UnrollFailed { span: Span },

    #[error("invalid arguments for {method} at {span:?}")]
    InvalidFetchArguments { method: SmolStr, span: Span },
}

/// Errors caused by inconsistent state between passes.
#[derive(Debug, Error, PartialEq)]
pub enum InternalError {
    #[error("unable to find nested scope {index} while restructuring loop exits")]
    ScopeNotFound { index: usize },

    #[error("no combined sampler for texture {texture}")]
    MissingCombinedSampler { texture: SmolStr },
}

#[derive(Debug, Error, PartialEq)]
pub enum TranspileError {
    #[error("unsupported shader structure")]
    Structural(#[from] StructuralError),

    #[error("internal conversion error")]
    Internal(#[from] InternalError),
}
