//! CLI module for k3d-provider
//!
//! - `k3d-provider create <kind> -f FILE` - Create a resource from an attribute file
//! - `k3d-provider read <kind> -f FILE` - Read back a resource's computed attributes
//! - `k3d-provider delete <kind> -f FILE` - Delete a resource
//! - `k3d-provider get <kind> NAME` - Look up an existing resource by name
//! - `k3d-provider plan -f FILE` - Resolve a cluster without creating it
//! - `k3d-provider init` - Write the effective settings to the settings file

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

mod commands;
mod display;

pub use commands::*;
pub use display::*;

#[derive(Parser, Debug)]
#[command(name = "k3d-provider")]
#[command(about = "Declarative k3d clusters, nodes and registries")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging output (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to settings file (default: ~/.k3d-provider/config.yaml)
    #[arg(long, global = true, env = "K3D_PROVIDER_CONFIG")]
    pub config: Option<PathBuf>,

    /// k3d executable
    #[arg(long, global = true, env = "K3D_PROVIDER_K3D_BINARY")]
    pub k3d_binary: Option<PathBuf>,

    /// Kubeconfig file credentials are merged into
    #[arg(long, global = true, env = "K3D_PROVIDER_KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// Node image used when an attribute file names none
    #[arg(long, global = true, env = "K3D_PROVIDER_DEFAULT_IMAGE")]
    pub default_image: Option<String>,

    /// Path to a .env file loaded before anything else
    #[arg(long, global = true, value_name = "FILE")]
    pub env_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a resource
    Create(ResourceArgs),

    /// Read back a resource
    Read(ResourceArgs),

    /// Delete a resource
    Delete(ResourceArgs),

    /// Look up an existing resource by name
    Get(GetArgs),

    /// Resolve and validate a cluster without creating it
    Plan(PlanArgs),

    /// Write the effective settings (file, flags and environment) to the settings file
    Init(InitArgs),
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    Cluster,
    Node,
    Registry,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Yaml,
    Table,
}

/// Arguments for create, read and delete
#[derive(Parser, Debug)]
pub struct ResourceArgs {
    /// Resource type
    #[arg(value_enum)]
    pub kind: ResourceType,

    /// Attribute file (YAML or JSON)
    #[arg(short, long, value_name = "FILE")]
    pub file: PathBuf,
}

/// Arguments for the get command
#[derive(Parser, Debug)]
pub struct GetArgs {
    /// Resource type
    #[arg(value_enum)]
    pub kind: ResourceType,

    /// Resource name, without the k3d- prefix
    pub name: String,
}

/// Arguments for the plan command
#[derive(Parser, Debug)]
pub struct PlanArgs {
    /// Cluster attribute file (YAML or JSON)
    #[arg(short, long, value_name = "FILE")]
    pub file: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Yaml)]
    pub output: OutputFormat,
}

/// Arguments for the init command
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Overwrite an existing settings file
    #[arg(long)]
    pub force: bool,
}
