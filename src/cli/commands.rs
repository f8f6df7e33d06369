//! Command implementations for the CLI
//!
//! SBIO pattern: commands return rendered output, the caller prints it

use std::path::{Path, PathBuf};

use thiserror::Error;

use super::display::{format_deleted, format_outcome, format_plan_table, format_yaml};
use super::{Commands, GetArgs, InitArgs, OutputFormat, PlanArgs, ResourceArgs, ResourceType};
use crate::attributes::{
    load_attributes, AttributeError, ClusterAttributes, NodeAttributes, RegistryAttributes,
};
use crate::pipeline::{ProvisionError, Provisioner, Severity};
use crate::settings::{save_settings_to, Settings, SettingsError};

/// Errors that can occur during command execution
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Attribute error: {0}")]
    Attributes(#[from] AttributeError),

    #[error("{0}")]
    Provision(#[from] ProvisionError),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Settings file {} already exists (use --force to overwrite)", .0.display())]
    SettingsExist(PathBuf),

    #[error("Failed to render output: {0}")]
    Output(String),
}

impl CommandError {
    /// Process exit code: 2 when resources may have been left behind
    pub fn exit_code(&self) -> i32 {
        match self {
            CommandError::Provision(e) if e.severity() == Severity::Fatal => 2,
            _ => 1,
        }
    }
}

/// Result type for commands
pub type CommandResult<T> = Result<T, CommandError>;

/// Settings in effect and the file they are persisted to
#[derive(Debug, Clone)]
pub struct SettingsFile {
    pub path: PathBuf,
    pub settings: Settings,
}

/// Run one command and return what to print
pub async fn execute(
    provisioner: &Provisioner,
    settings: &SettingsFile,
    command: &Commands,
) -> CommandResult<String> {
    match command {
        Commands::Init(args) => init(settings, args),
        Commands::Create(args) => create(provisioner, args).await,
        Commands::Read(args) => read(provisioner, args).await,
        Commands::Delete(args) => delete(provisioner, args).await,
        Commands::Get(args) => get(provisioner, args).await,
        Commands::Plan(args) => plan(provisioner, args).await,
    }
}

fn cluster_file(path: &Path) -> CommandResult<ClusterAttributes> {
    Ok(load_attributes(path)?)
}

fn node_file(path: &Path) -> CommandResult<NodeAttributes> {
    Ok(load_attributes(path)?)
}

fn registry_file(path: &Path) -> CommandResult<RegistryAttributes> {
    Ok(load_attributes(path)?)
}

pub async fn create(provisioner: &Provisioner, args: &ResourceArgs) -> CommandResult<String> {
    match args.kind {
        ResourceType::Cluster => {
            let attrs = cluster_file(&args.file)?;
            format_outcome(&provisioner.create_cluster(&attrs).await?)
        }
        ResourceType::Node => {
            let attrs = node_file(&args.file)?;
            format_outcome(&provisioner.create_node(&attrs).await?)
        }
        ResourceType::Registry => {
            let attrs = registry_file(&args.file)?;
            format_outcome(&provisioner.create_registry(&attrs).await?)
        }
    }
}

pub async fn read(provisioner: &Provisioner, args: &ResourceArgs) -> CommandResult<String> {
    match args.kind {
        ResourceType::Cluster => {
            let attrs = cluster_file(&args.file)?;
            format_outcome(&provisioner.read_cluster(&attrs).await?)
        }
        ResourceType::Node => {
            let attrs = node_file(&args.file)?;
            format_outcome(&provisioner.read_node(&attrs).await?)
        }
        ResourceType::Registry => {
            let attrs = registry_file(&args.file)?;
            format_outcome(&provisioner.read_registry(&attrs).await?)
        }
    }
}

pub async fn delete(provisioner: &Provisioner, args: &ResourceArgs) -> CommandResult<String> {
    let id = match args.kind {
        ResourceType::Cluster => {
            let attrs = cluster_file(&args.file)?;
            provisioner.delete_cluster(&attrs.name).await?
        }
        ResourceType::Node => {
            let attrs = node_file(&args.file)?;
            provisioner.delete_node(&attrs.name).await?
        }
        ResourceType::Registry => {
            let attrs = registry_file(&args.file)?;
            provisioner.delete_registry(&attrs.name).await?
        }
    };
    Ok(format_deleted(&id))
}

pub async fn get(provisioner: &Provisioner, args: &GetArgs) -> CommandResult<String> {
    match args.kind {
        ResourceType::Cluster => format_outcome(&provisioner.get_cluster(&args.name).await?),
        ResourceType::Node => format_outcome(&provisioner.get_node(&args.name).await?),
        ResourceType::Registry => format_outcome(&provisioner.get_registry(&args.name).await?),
    }
}

pub async fn plan(provisioner: &Provisioner, args: &PlanArgs) -> CommandResult<String> {
    let attrs = cluster_file(&args.file)?;
    let spec = provisioner.plan_cluster(&attrs).await?;
    match args.output {
        OutputFormat::Yaml => format_yaml(&spec),
        OutputFormat::Table => Ok(format_plan_table(&spec)),
    }
}

pub fn init(file: &SettingsFile, args: &InitArgs) -> CommandResult<String> {
    if file.path.exists() && !args.force {
        return Err(CommandError::SettingsExist(file.path.clone()));
    }
    save_settings_to(&file.settings, &file.path)?;
    Ok(format!("Wrote settings to {}\n", file.path.display()))
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Arc;

    use super::*;
    use crate::kubeconfig::KubeconfigStore;
    use crate::runtime::{DefaultImage, FailPoint, InMemoryRuntime};

    fn provisioner(runtime: Arc<InMemoryRuntime>, dir: &tempfile::TempDir) -> Provisioner {
        Provisioner::new(
            runtime,
            Arc::new(DefaultImage::fixed("docker.io/rancher/k3s:v1.31.4-k3s1")),
            Arc::new(KubeconfigStore::new(dir.path().join("kubeconfig"))),
        )
    }

    fn attribute_file(dir: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[tokio::test]
    async fn test_create_read_delete_cluster() {
        let dir = tempfile::tempdir().unwrap();
        let p = provisioner(Arc::new(InMemoryRuntime::new()), &dir);
        let file = attribute_file(&dir, "bar.yaml", "name: bar\nagents: 1\n");
        let args = ResourceArgs {
            kind: ResourceType::Cluster,
            file,
        };

        let settings = SettingsFile {
            path: dir.path().join("config.yaml"),
            settings: Settings::default(),
        };
        let created = execute(&p, &settings, &Commands::Create(args)).await.unwrap();
        assert!(created.contains("id: k3d-bar"));
        assert!(created.contains("network: k3d-bar"));

        let args = ResourceArgs {
            kind: ResourceType::Cluster,
            file: dir.path().join("bar.yaml"),
        };
        let read = read(&p, &args).await.unwrap();
        assert!(read.contains("client_certificate"));

        assert_eq!(delete(&p, &args).await.unwrap(), "Deleted k3d-bar\n");
        assert!(read_missing(&p, &args).await);
    }

    async fn read_missing(p: &Provisioner, args: &ResourceArgs) -> bool {
        matches!(
            read(p, args).await,
            Err(CommandError::Provision(ref e)) if e.is_not_found()
        )
    }

    #[tokio::test]
    async fn test_plan_table() {
        let dir = tempfile::tempdir().unwrap();
        let p = provisioner(Arc::new(InMemoryRuntime::new()), &dir);
        let file = attribute_file(&dir, "bar.json", r#"{"name": "bar", "agents": 2}"#);

        let out = plan(
            &p,
            &PlanArgs {
                file,
                output: OutputFormat::Table,
            },
        )
        .await
        .unwrap();
        assert!(out.contains("k3d-bar-agent-1"));
        assert!(out.contains("k3d-bar-serverlb"));
    }

    #[tokio::test]
    async fn test_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let p = provisioner(Arc::new(InMemoryRuntime::new()), &dir);
        let file = attribute_file(&dir, "bad.yaml", "name: bar\nservers: lots\n");
        let err = create(
            &p,
            &ResourceArgs {
                kind: ResourceType::Cluster,
                file,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CommandError::Attributes(_)));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_init_writes_settings_once() {
        let dir = tempfile::tempdir().unwrap();
        let file = SettingsFile {
            path: dir.path().join("k3d-provider").join("config.yaml"),
            settings: Settings {
                default_image: Some("rancher/k3s:v1.30.0-k3s1".to_string()),
                ..Default::default()
            },
        };

        let out = init(&file, &InitArgs { force: false }).unwrap();
        assert!(out.starts_with("Wrote settings to"));
        assert_eq!(
            crate::settings::load_settings_from(&file.path).unwrap(),
            file.settings
        );

        let err = init(&file, &InitArgs { force: false }).unwrap_err();
        assert!(matches!(err, CommandError::SettingsExist(_)));
        assert_eq!(err.exit_code(), 1);
        assert!(init(&file, &InitArgs { force: true }).is_ok());
    }

    #[tokio::test]
    async fn test_failed_rollback_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Arc::new(InMemoryRuntime::new());
        runtime.fail(FailPoint::ClusterRun);
        runtime.fail(FailPoint::ClusterDelete);
        let p = provisioner(runtime, &dir);
        let file = attribute_file(&dir, "bar.yaml", "name: bar\n");

        let err = create(
            &p,
            &ResourceArgs {
                kind: ResourceType::Cluster,
                file,
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
