//! # Geomkit CLI
//!
//! Command-line tools for JSON mesh files.
//!
//! ## Commands
//! - `info` - Print buffer layout and statistics
//! - `normals` - Compute smooth normals
//! - `tangents` - Compute tangents
//! - `wireframe` - Compute the wireframe index stream
//! - `merge` - Merge meshes with identical layouts
//! - `bounds` - Print the bounding box

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use geomkit_assets::{MeshImportSettings, MeshLoader, mesh_to_json};
use geomkit_renderer::{IngestConfig, MemoryDevice, Mesh, RenderContext};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Geomkit mesh tools
#[derive(Parser)]
#[command(name = "geomkit")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Settings file (JSON)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Print buffer layout and statistics
    Info {
        /// Mesh file
        input: PathBuf,
    },

    /// Compute smooth normals
    Normals {
        /// Mesh file
        input: PathBuf,

        /// Output file, stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Compute tangents, generating normals first when missing
    Tangents {
        /// Mesh file
        input: PathBuf,

        /// Output file, stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Compute the wireframe index stream
    Wireframe {
        /// Mesh file
        input: PathBuf,

        /// Output file, stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Merge meshes with identical buffer layouts
    Merge {
        /// Mesh files, in merge order
        #[arg(required = true, num_args = 2..)]
        inputs: Vec<PathBuf>,

        /// Output file, stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the bounding box
    Bounds {
        /// Mesh file
        input: PathBuf,
    },
}

/// Contents of the `--config` file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Buffer ingestion
    pub ingest: IngestConfig,
    /// Import post-processing
    pub import: MeshImportSettings,
}

impl CliConfig {
    /// Read settings from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("Invalid config {}", path.display()))
    }
}

/// Execute the CLI command
pub fn execute(cli: Cli) -> Result<()> {
    if cli.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    let stdout = std::io::stdout();
    run(cli, &mut stdout.lock())
}

/// Run a command, printing results to `out`
pub fn run(cli: Cli, out: &mut impl Write) -> Result<()> {
    let config = match &cli.config {
        Some(path) => CliConfig::load(path)?,
        None => CliConfig::default(),
    };
    let context = RenderContext::with_config(Arc::new(MemoryDevice::new()), config.ingest);
    let loader = MeshLoader::with_settings(Arc::new(context), config.import);

    match cli.command {
        Commands::Info { input } => {
            let mut mesh = load(&loader, &input)?;
            emit(&describe(&mut mesh)?, None, out)?;
        }

        Commands::Normals { input, output } => {
            let mut mesh = load(&loader, &input)?;
            mesh.compute_normals(None)?;
            log::info!("Computed normals for {} vertices", mesh.num_vertices());
            emit(&mesh_to_json(&mesh)?, output.as_deref(), out)?;
        }

        Commands::Tangents { input, output } => {
            let mut mesh = load(&loader, &input)?;
            if !mesh.has_vertex_buffer("normals") {
                mesh.compute_normals(None)?;
            }
            if mesh.compute_tangents()?.is_none() {
                bail!("{} needs coords and triangles to compute tangents", input.display());
            }
            log::info!("Computed tangents for {} vertices", mesh.num_vertices());
            emit(&mesh_to_json(&mesh)?, output.as_deref(), out)?;
        }

        Commands::Wireframe { input, output } => {
            let mut mesh = load(&loader, &input)?;
            let wireframe = mesh.compute_wireframe()?;
            log::info!("Computed {} wireframe edges", wireframe.read().len() / 2);
            emit(&mesh_to_json(&mesh)?, output.as_deref(), out)?;
        }

        Commands::Merge { inputs, output } => {
            let meshes = inputs
                .iter()
                .map(|input| load(&loader, input))
                .collect::<Result<Vec<_>>>()?;
            let refs: Vec<&Mesh> = meshes.iter().collect();
            let merged = Mesh::merge_meshes(&refs).context("Failed to merge meshes")?;
            log::info!("Merged {} meshes", meshes.len());
            emit(&mesh_to_json(&merged)?, output.as_deref(), out)?;
        }

        Commands::Bounds { input } => {
            let mut mesh = load(&loader, &input)?;
            let bounding = mesh.update_bounding()?;
            let value = json!({
                "center": bounding.center,
                "half_size": bounding.half_size,
                "min": bounding.min(),
                "max": bounding.max(),
            });
            emit(&value, None, out)?;
        }
    }

    Ok(())
}

fn load(loader: &MeshLoader, path: &Path) -> Result<Mesh> {
    loader
        .load_file(path)
        .with_context(|| format!("Failed to load {}", path.display()))
}

fn describe(mesh: &mut Mesh) -> Result<Value> {
    let metadata = mesh.generate_metadata()?;
    let vertex_buffers: Vec<Value> = mesh
        .vertex_buffers()
        .map(|(name, buffer)| {
            let buffer = buffer.read();
            json!({
                "name": name,
                "attribute": buffer.attribute(),
                "spacing": buffer.spacing(),
                "type": buffer.element_type(),
                "elements": buffer.element_count(),
            })
        })
        .collect();
    let index_buffers: Vec<Value> = mesh
        .index_buffers()
        .map(|(name, buffer)| {
            let buffer = buffer.read();
            json!({
                "name": name,
                "type": buffer.element_type(),
                "length": buffer.len(),
            })
        })
        .collect();
    let properties: serde_json::Map<String, Value> = mesh
        .properties()
        .iter()
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();

    Ok(json!({
        "metadata": metadata,
        "vertex_buffers": vertex_buffers,
        "index_buffers": index_buffers,
        "bounding": mesh.bounding(),
        "properties": properties,
    }))
}

fn emit(value: &Value, output: Option<&Path>, out: &mut impl Write) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => {
            std::fs::write(path, text)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            log::info!("Wrote {}", path.display());
        }
        None => writeln!(out, "{text}")?,
    }
    Ok(())
}
