#![forbid(unsafe_code)]

//! `fleetctl`: request fleet changes and wait for them to land.

use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use fleet_client::{OrchestratorClient, ServerConfig};
use fleet_core::{ops, DeploymentTarget, NullProgress, ProgressSink, WaitConfig, WaitError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod progress;

use crate::config::{FileConfig, Overrides};
use crate::progress::ConsoleProgress;

#[derive(Parser, Debug)]
#[command(name = "fleetctl", version)]
struct Args {
    /// Config file (TOML). Defaults to ~/.fleetctl/config.toml when present.
    #[arg(long, global = true)]
    config: Option<String>,

    /// Orchestrator URL, e.g. https://127.0.0.1:9005
    #[arg(long, global = true)]
    url: Option<String>,

    /// Bearer token.
    #[arg(long, global = true, conflicts_with = "username")]
    token: Option<String>,

    /// Basic-auth user name.
    #[arg(long, global = true)]
    username: Option<String>,

    /// Basic-auth password.
    #[arg(long, global = true, requires = "username")]
    password: Option<String>,

    /// Extra CA certificate (PEM).
    #[arg(long, global = true)]
    ca_cert: Option<String>,

    /// Accept any server certificate.
    #[arg(long, global = true)]
    insecure: bool,

    /// Wait budget in seconds.
    #[arg(long, global = true)]
    wait_timeout: Option<u64>,

    /// Suppress progress output.
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Log level (env-filter syntax).
    #[arg(long, global = true, default_value = "warn")]
    log: String,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Wait for an operation that was requested elsewhere.
    Wait {
        #[command(subcommand)]
        what: WaitCmd,
    },
    /// Scale a bundle up and wait until the instances are started.
    Run {
        bundle: String,
        #[arg(long, default_value_t = 1)]
        scale: u32,
        #[arg(long)]
        no_wait: bool,
    },
    /// Scale a bundle to zero.
    Stop {
        bundle: String,
        #[arg(long)]
        no_wait: bool,
    },
    /// Uninstall a bundle from every node.
    Unload {
        bundle: String,
        #[arg(long)]
        no_wait: bool,
    },
    /// Deploy a bundle; prints the deployment batch id.
    Deploy {
        bundle: String,
        #[arg(long)]
        no_wait: bool,
    },
}

#[derive(Subcommand, Debug)]
enum WaitCmd {
    Install {
        bundle: String,
    },
    Uninstall {
        bundle: String,
    },
    Scale {
        bundle: String,
        #[arg(long)]
        scale: u32,
    },
    Deployment {
        id: String,
        /// Treat the id as a deployment batch id.
        #[arg(long)]
        batch: bool,
    },
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            url: self.url.clone(),
            token: self.token.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            ca_cert: self.ca_cert.clone(),
            insecure: self.insecure,
            wait_timeout: self.wait_timeout,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&args.log))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tokio::select! {
        res = run(args) => match res {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("error: {err:#}");
                exit_code(&err)
            }
        },
        _ = tokio::signal::ctrl_c() => {
            eprintln!("interrupted");
            ExitCode::from(130)
        }
    }
}

fn exit_code(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<WaitError>() {
        Some(WaitError::Timeout { .. }) => ExitCode::from(2),
        Some(WaitError::OperationFailed { .. }) => ExitCode::from(3),
        _ => ExitCode::from(1),
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let file = FileConfig::load(args.config.as_deref())?;
    let (server, wait) = file.resolve(&args.overrides())?;
    tracing::debug!(url = %server.url, timeout_secs = wait.wait_timeout.as_secs(), "resolved config");

    let mut console = ConsoleProgress::stdout();
    let mut quiet = NullProgress;
    let progress: &mut dyn ProgressSink = if args.quiet {
        &mut quiet
    } else {
        &mut console
    };

    match args.cmd {
        Cmd::Wait { what } => wait_only(what, &server, &wait, progress).await?,
        Cmd::Run {
            bundle,
            scale,
            no_wait,
        } => {
            let client = client(server)?;
            client
                .scale_bundle(&bundle, scale)
                .await
                .with_context(|| format!("scale bundle {bundle} to {scale}"))?;
            if !no_wait {
                ops::wait_for_scale(&client, &bundle, scale, &wait, progress).await?;
            }
        }
        Cmd::Stop { bundle, no_wait } => {
            let client = client(server)?;
            client
                .scale_bundle(&bundle, 0)
                .await
                .with_context(|| format!("stop bundle {bundle}"))?;
            if !no_wait {
                ops::wait_for_scale(&client, &bundle, 0, &wait, progress).await?;
            }
        }
        Cmd::Unload { bundle, no_wait } => {
            let client = client(server)?;
            client
                .unload_bundle(&bundle)
                .await
                .with_context(|| format!("unload bundle {bundle}"))?;
            if !no_wait {
                ops::wait_for_uninstallation(&client, &bundle, &wait, progress).await?;
            }
        }
        Cmd::Deploy { bundle, no_wait } => {
            let client = client(server)?;
            let batch_id = client
                .deploy_bundle(&bundle)
                .await
                .with_context(|| format!("deploy bundle {bundle}"))?;
            println!("{batch_id}");
            if !no_wait {
                let target = DeploymentTarget::Batch(batch_id);
                ops::wait_for_deployment_complete(&client, &target, &wait, progress).await?;
            }
        }
    }

    Ok(())
}

async fn wait_only(
    what: WaitCmd,
    server: &ServerConfig,
    wait: &WaitConfig,
    progress: &mut dyn ProgressSink,
) -> Result<(), WaitError> {
    match what {
        WaitCmd::Install { bundle } => {
            fleet_client::wait_for_installation(&bundle, server, wait, progress).await
        }
        WaitCmd::Uninstall { bundle } => {
            fleet_client::wait_for_uninstallation(&bundle, server, wait, progress).await
        }
        WaitCmd::Scale { bundle, scale } => {
            fleet_client::wait_for_scale(&bundle, scale, server, wait, progress).await
        }
        WaitCmd::Deployment { id, batch } => {
            let target = if batch {
                DeploymentTarget::Batch(id)
            } else {
                DeploymentTarget::Deployment(id)
            };
            fleet_client::wait_for_deployment_complete(&target, server, wait, progress).await
        }
    }
}

fn client(server: ServerConfig) -> anyhow::Result<OrchestratorClient> {
    OrchestratorClient::new(server).context("build http client")
}
