use std::process;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use tracing::{debug, error, warn};
use tracing_subscriber::EnvFilter;

use k3d_provider::cli::{execute, Cli, CommandError, SettingsFile};
use k3d_provider::kubeconfig::KubeconfigStore;
use k3d_provider::pipeline::Provisioner;
use k3d_provider::runtime::{ChannelServer, DefaultImage, K3dCli};
use k3d_provider::settings::{default_settings_path, load_settings_from, Overrides, Settings};

fn build_provisioner(settings: &Settings) -> Provisioner {
    let runtime = Arc::new(K3dCli::new(settings.k3d_binary()));
    let images = match &settings.default_image {
        Some(image) => DefaultImage::fixed(image.clone()),
        None => DefaultImage::new(
            Arc::new(ChannelServer::new(settings.channel_url())),
            settings.image_channel(),
        ),
    };
    let kubeconfig = KubeconfigStore::new(settings.kubeconfig_path());
    Provisioner::new(runtime, Arc::new(images), Arc::new(kubeconfig))
}

fn load_settings(cli: &Cli) -> anyhow::Result<SettingsFile> {
    let path = cli.config.clone().unwrap_or_else(default_settings_path);
    let settings = load_settings_from(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    let settings = settings.with_overrides(Overrides {
        k3d_binary: cli.k3d_binary.clone(),
        kubeconfig: cli.kubeconfig.clone(),
        default_image: cli.default_image.clone(),
    });
    Ok(SettingsFile { path, settings })
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    // Load .env file if specified
    if let Some(ref env_file) = cli.env_file {
        if let Err(e) = dotenvy::from_path(env_file) {
            error!("Failed to load env file {}: {}", env_file.display(), e);
            process::exit(1);
        }
    }

    // Settings file, then flags and environment on top
    let settings = match load_settings(&cli) {
        Ok(settings) => settings,
        Err(e) => {
            error!("{:#}", e);
            process::exit(1);
        }
    };
    debug!(path = %settings.path.display(), settings = ?settings.settings, "Loaded settings");

    // Run the command; 2 means resources may have been left behind
    let provisioner = build_provisioner(&settings.settings);
    match execute(&provisioner, &settings, &cli.command).await {
        Ok(output) => print!("{}", output),
        Err(e) => {
            report(&e);
            process::exit(e.exit_code());
        }
    }
}

fn report(e: &CommandError) {
    if e.exit_code() > 1 {
        error!("{}", e);
    } else {
        warn!("{}", e);
    }
    eprintln!("Error: {}", e);
}
