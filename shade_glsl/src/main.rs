use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use log::{error, info};
use rayon::prelude::*;
use shade_ast::Shader;
use shade_glsl::{diagnostics::Diagnostics, transpile, Dialect, GlslOptions, Stage};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log the decisions made by each conversion pass.
    #[arg(long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a JSON shader AST to GLSL.
    /// The JSON may be null for stages without code.
    Convert {
        /// The input JSON shader AST.
        input: String,
        /// The output GLSL file.
        output: String,
        /// Save the combined samplers and uniform usage to a JSON file.
        #[arg(long)]
        metadata: Option<String>,
        #[command(flatten)]
        options: OptionArgs,
    },
    /// Convert each JSON shader AST in a folder to GLSL.
    /// JSON metadata for each shader will also be saved in the output folder.
    ConvertFolder {
        /// The folder containing .json shader ASTs.
        input_folder: String,
        /// The output folder for the converted shaders.
        output_folder: String,
        #[command(flatten)]
        options: OptionArgs,
    },
}

#[derive(Args)]
struct OptionArgs {
    /// The name of the entry point method.
    #[arg(long, default_value = "main")]
    entry: String,
    #[arg(long, value_enum, default_value_t = Dialect::Desktop)]
    dialect: Dialect,
    /// The number for the #version directive.
    #[arg(long = "glsl-version", default_value_t = 450)]
    glsl_version: u32,
    #[arg(long, value_enum, default_value_t = Stage::Pixel)]
    stage: Stage,
    /// Emit constant buffer members as individual uniforms instead of uniform blocks.
    #[arg(long)]
    flat_uniforms: bool,
    /// Remove the f suffix from float literals.
    #[arg(long)]
    trim_float_suffix: bool,
    /// Use GL_EXT_texture_buffer for buffer loads on GLSL ES.
    #[arg(long)]
    texture_buffers: bool,
    /// Use legacy texture function names like texture2D.
    #[arg(long)]
    texture_compat: bool,
}

impl OptionArgs {
    fn glsl_options(&self) -> GlslOptions {
        GlslOptions {
            dialect: self.dialect,
            version: self.glsl_version,
            stage: self.stage,
            uniform_blocks: !self.flat_uniforms,
            trim_float_suffix: self.trim_float_suffix,
            texture_buffer_support: self.texture_buffers,
            texture_function_compatibility: self.texture_compat,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Conversion warnings are useful by default, but per pass logs are very noisy.
    simple_logger::SimpleLogger::new()
        .with_level(if cli.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Warn
        })
        .init()?;

    let start = std::time::Instant::now();
    match cli.command {
        Commands::Convert {
            input,
            output,
            metadata,
            options,
        } => convert_file(
            Path::new(&input),
            Path::new(&output),
            metadata.as_deref().map(Path::new),
            &options.entry,
            &options.glsl_options(),
        )?,
        Commands::ConvertFolder {
            input_folder,
            output_folder,
            options,
        } => convert_folder(&input_folder, &output_folder, &options)?,
    }

    println!("Finished in {:?}", start.elapsed());
    Ok(())
}

fn convert_file(
    input: &Path,
    output: &Path,
    metadata: Option<&Path>,
    entry: &str,
    options: &GlslOptions,
) -> anyhow::Result<()> {
    let json =
        std::fs::read_to_string(input).with_context(|| format!("failed to read {input:?}"))?;
    let shader: Option<Shader> = serde_json::from_str(&json)
        .with_context(|| format!("failed to parse shader AST from {input:?}"))?;

    let mut diagnostics = Diagnostics::default();
    let transpiled = transpile(shader, entry, options, &mut diagnostics)
        .with_context(|| format!("failed to convert {input:?}"))?;
    info!(
        "converted {input:?} with {} warnings",
        diagnostics.entries().len()
    );

    std::fs::write(output, &transpiled.glsl)
        .with_context(|| format!("failed to write {output:?}"))?;

    if let Some(metadata) = metadata {
        let json = serde_json::to_string_pretty(&transpiled)?;
        std::fs::write(metadata, json).with_context(|| format!("failed to write {metadata:?}"))?;
    }
    Ok(())
}

fn convert_folder(input: &str, output: &str, options: &OptionArgs) -> anyhow::Result<()> {
    std::fs::create_dir_all(output).with_context(|| format!("failed to create {output:?}"))?;
    let glsl_options = options.glsl_options();

    globwalk::GlobWalkerBuilder::from_patterns(input, &["*.json"])
        .build()
        .with_context(|| format!("failed to search {input:?}"))?
        .par_bridge()
        .for_each(|entry| match entry {
            Ok(entry) => {
                let path = entry.path();

                // Assume that file names are unique even across different folders.
                let (glsl, metadata) = output_paths(output, path);
                if let Err(e) =
                    convert_file(path, &glsl, Some(&metadata), &options.entry, &glsl_options)
                {
                    error!("{e:?}");
                }
            }
            Err(e) => error!("{e}"),
        });

    Ok(())
}

/// Use the name like "shader.json" -> "shader.glsl" and "shader.metadata.json".
fn output_paths(output_folder: &str, path: &Path) -> (PathBuf, PathBuf) {
    let name = path
        .file_stem()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let folder = Path::new(output_folder);
    (
        folder.join(format!("{name}.glsl")),
        folder.join(format!("{name}.metadata.json")),
    )
}
