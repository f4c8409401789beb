//! # shade_glsl
//! Convert resolved HLSL-like shaders from [shade_ast] to GLSL text.
//!
//! HLSL textures and samplers are separate objects that can be passed to functions.
//! GLSL only has combined samplers that can't be function parameters.
//! [transpile] bridges the two models by fusing each texture and sampler pair
//! into a new combined sampler and specializing helper functions for the globals they use.
//!
//! The remaining passes classify global uniform usage, unroll loops marked with `[unroll]`,
//! and rewrite texture methods and intrinsics before printing the GLSL.
use indexmap::IndexSet;
use shade_ast::{Shader, VarId};
use smol_str::SmolStr;
use strum::{Display, EnumString};

use crate::{
    diagnostics::Diagnostics,
    error::{StructuralError, TranspileError},
    lower::lower_methods,
    reachability::{reachable_methods, strip_unreachable},
    sampler_mapping::{map_samplers, SamplerMapping},
    uniforms::{analyze_uniforms, UniformUsage},
    unroll::unroll_loops,
    writer::{type_glsl, write_glsl, write_stub_glsl},
};

pub mod call_graph;
pub mod diagnostics;
pub mod error;
pub mod loop_exit;
pub mod lower;
pub mod reachability;
pub mod sampler_mapping;
pub mod uniforms;
pub mod unroll;
pub mod writer;

#[cfg(test)]
mod test_utils;

/// The GLSL flavor to generate.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, PartialEq, Eq, Clone, Copy, Display, EnumString, clap::ValueEnum)]
#[strum(serialize_all = "lowercase")]
pub enum Dialect {
    /// Desktop OpenGL GLSL.
    Desktop,
    /// OpenGL ES GLSL like `#version 300 es`.
    Es,
    /// GLSL for compiling to SPIR-V.
    Vulkan,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, PartialEq, Eq, Clone, Copy, Display, EnumString, clap::ValueEnum)]
#[strum(serialize_all = "lowercase")]
pub enum Stage {
    Vertex,
    Hull,
    Domain,
    Geometry,
    Pixel,
    Compute,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct GlslOptions {
    pub dialect: Dialect,
    /// The number for `#version` like `450` or `300`.
    pub version: u32,
    pub stage: Stage,
    /// Emit constant buffers as uniform blocks instead of individual uniforms.
    pub uniform_blocks: bool,
    /// Remove the `f` suffix from float literals.
    pub trim_float_suffix: bool,
    /// Use `GL_EXT_texture_buffer` on GLSL ES instead of emulating buffers with 2D textures.
    pub texture_buffer_support: bool,
    /// Use legacy fetch names like `texture2DLod` instead of `textureLod`.
    pub texture_function_compatibility: bool,
}

impl Default for GlslOptions {
    fn default() -> Self {
        Self {
            dialect: Dialect::Desktop,
            version: 450,
            stage: Stage::Pixel,
            uniform_blocks: true,
            trim_float_suffix: false,
            texture_buffer_support: false,
            texture_function_compatibility: false,
        }
    }
}

/// The converted GLSL and the resource metadata needed to bind it.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, PartialEq, Clone)]
pub struct Transpiled {
    pub glsl: String,
    pub samplers: Vec<CombinedSampler>,
    pub uniforms: UniformUsageMap,
}

/// A GLSL sampler created from a texture and the sampler used to access it.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, PartialEq, Clone)]
pub struct CombinedSampler {
    pub texture: SmolStr,
    /// `None` for textures that are only loaded or queried.
    pub sampler: Option<SmolStr>,
    pub name: SmolStr,
    /// The GLSL type like `sampler2DShadow`.
    pub ty: String,
}

/// Global uniform names by usage.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, PartialEq, Clone, Default)]
pub struct UniformUsageMap {
    pub read: Vec<SmolStr>,
    /// Globals always written before being read that don't need to be uniforms.
    pub temporary: Vec<SmolStr>,
    pub read_write: Vec<SmolStr>,
}

impl UniformUsageMap {
    fn new(shader: &Shader, usage: &UniformUsage) -> Self {
        let names = |ids: &IndexSet<VarId>| {
            ids.iter()
                .map(|id| shader.variable(*id).name.clone())
                .collect()
        };
        Self {
            read: names(&usage.read),
            temporary: names(&usage.write_first),
            read_write: names(&usage.read_write),
        }
    }
}

/// Convert the method named `entry` and everything it calls to GLSL.
///
/// A `shader` of `None` means the stage has no code.
/// Pixel shaders without code only write depth, and all other stages are an error.
pub fn transpile(
    shader: Option<Shader>,
    entry: &str,
    options: &GlslOptions,
    diagnostics: &mut Diagnostics,
) -> Result<Transpiled, TranspileError> {
    let Some(mut shader) = shader else {
        return match options.stage {
            Stage::Pixel => Ok(Transpiled {
                glsl: write_stub_glsl(options),
                samplers: Vec::new(),
                uniforms: UniformUsageMap::default(),
            }),
            stage => Err(StructuralError::MissingShader {
                stage: stage.to_string(),
            }
            .into()),
        };
    };

    let entry = shader
        .find_method(entry)
        .ok_or_else(|| StructuralError::MissingEntryPoint {
            name: entry.to_string(),
        })?;

    let mapping = map_samplers(
        &mut shader,
        entry,
        options.texture_function_compatibility,
        diagnostics,
    )?;
    let uniforms = analyze_uniforms(&mut shader, entry)?;

    let methods = reachable_methods(&shader, entry);
    lower_methods(&mut shader, &methods, &mapping, options)?;
    unroll_loops(&mut shader, &methods, diagnostics)?;
    strip_unreachable(&mut shader, entry);

    let glsl = write_glsl(&shader, entry, options, &uniforms, diagnostics);

    Ok(Transpiled {
        glsl,
        samplers: combined_samplers(&shader, &mapping),
        uniforms: UniformUsageMap::new(&shader, &uniforms),
    })
}

fn combined_samplers(shader: &Shader, mapping: &SamplerMapping) -> Vec<CombinedSampler> {
    mapping
        .samplers
        .iter()
        .map(|(key, combined)| {
            let var = shader.variable(*combined);
            CombinedSampler {
                texture: shader.variable(key.texture).name.clone(),
                sampler: key.sampler.map(|s| shader.variable(s).name.clone()),
                name: var.name.clone(),
                ty: type_glsl(&var.ty),
            }
        })
        .collect()
}
