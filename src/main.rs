use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use ftp_cdn_uploader::app::App;
use ftp_cdn_uploader::models::{Caller, Environment, UploadOutcome};
use ftp_cdn_uploader::settings::{SettingsInput, SettingsStore};
use ftp_cdn_uploader::Error;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "ftp-cdn-uploader")]
#[command(about = "Upload media to an FTP-fed CDN and rewrite attachment URLs")]
struct CliArgs {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Upload a newly added media file and record the outcome.
    Upload {
        #[arg(long)]
        id: u64,
        path: PathBuf,
    },
    /// Print the URL to publish for an attachment.
    Resolve {
        #[arg(long)]
        id: u64,
        url: String,
    },
    /// Print the CDN status of an attachment.
    Status {
        #[arg(long)]
        id: u64,
    },
    /// Check connectivity, credentials and the base directory.
    Test,
    /// Update the saved settings.
    Configure(ConfigureArgs),
    /// Print the saved settings with the password masked.
    Show,
}

#[derive(Debug, Args)]
struct ConfigureArgs {
    #[arg(long)]
    server: Option<String>,
    #[arg(long)]
    port: Option<String>,
    #[arg(long)]
    user: Option<String>,
    #[arg(long)]
    password: Option<String>,
    #[arg(long = "cdn-url")]
    cdn_base_url: Option<String>,
    #[arg(long)]
    cdn_base_path: Option<String>,
    #[arg(long)]
    cdn_prefix: Option<String>,
    /// Comma-separated list, e.g. "mp4,webm".
    #[arg(long = "file-types")]
    allowed_extensions: Option<String>,
    #[arg(long = "delete-local")]
    delete_local: Option<bool>,
}

impl ConfigureArgs {
    fn overlay(self, mut input: SettingsInput) -> SettingsInput {
        let fields = [
            (self.server, &mut input.server),
            (self.port, &mut input.port),
            (self.user, &mut input.user),
            (self.password, &mut input.password),
            (self.cdn_base_url, &mut input.cdn_base_url),
            (self.cdn_base_path, &mut input.cdn_base_path),
            (self.cdn_prefix, &mut input.cdn_prefix),
            (self.allowed_extensions, &mut input.allowed_extensions),
        ];
        for (value, slot) in fields {
            if value.is_some() {
                *slot = value;
            }
        }

        if let Some(delete_local) = self.delete_local {
            input.delete_local_after_upload = delete_local.then(|| "1".to_string());
        }
        input
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ftp_cdn_uploader=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = CliArgs::parse();

    match run(args.command).await {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}

async fn run(command: Command) -> Result<()> {
    match command {
        Command::Upload { id, path } => {
            let app = App::new().await?;
            match app.handle_attachment_added(id, &path).await? {
                None => println!("Skipped {}: file type not sent to CDN", path.display()),
                Some(UploadOutcome::Success { remote_url, .. }) => println!("{}", remote_url),
                Some(UploadOutcome::Failure { reason }) => bail!("{}", reason),
            }
        }
        Command::Resolve { id, url } => {
            let app = App::new().await?;
            println!("{}", app.resolve_attachment_url(&url, id).await?);
        }
        Command::Status { id } => {
            let app = App::new().await?;
            println!("{}", app.status(id).await?);
        }
        Command::Test => {
            let app = App::new().await?;
            let response = app.run_diagnostic(&Caller::administrator()).await;
            println!("{}", serde_json::to_string(&response)?);
            if !response.success {
                bail!("{}", response.message);
            }
        }
        Command::Configure(args) => {
            let env = Environment::from_env();
            let store = SettingsStore::new(&env.settings_path);
            let current = store.load().await?;

            match store.save(args.overlay(SettingsInput::from_config(&current))).await {
                Ok(_) => info!("Settings updated"),
                Err(Error::InvalidSettings(errors)) => {
                    for e in &errors {
                        eprintln!("  - {}", e);
                    }
                    bail!("Settings not saved ({} problems)", errors.len());
                }
                Err(e) => return Err(e.into()),
            }
        }
        Command::Show => {
            let app = App::new().await?;
            let mut config = app.config().clone();
            if !config.password.is_empty() {
                config.password = "********".to_string();
            }
            println!("{}", serde_json::to_string_pretty(&config)?);
            if let Some(notice) = app.admin_notice() {
                eprintln!("{}", notice);
            }
        }
    }
    Ok(())
}
