//! Command line front end
//!
//! - `exec`: run a build payload against the local Docker daemon
//! - `check`: compile a build payload and list the resulting steps

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use pipexec::infrastructure::{Config as HostConfig, ContainerRuntime, init_logging, logging};
use pipexec::runner::{self, Payload, StageFlags};
use pipexec::ExecutionState;

/// CLI arguments for pipexec
#[derive(Parser, Debug)]
#[command(name = "pipexec")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the build described by a payload
    Exec(ExecArgs),

    /// Compile a payload and print the steps it would run
    Check {
        /// Payload file, stdin if not specified
        payload: Option<PathBuf>,
    },
}

#[derive(ClapArgs, Debug)]
#[allow(clippy::struct_excessive_bools)]
struct ExecArgs {
    /// Restore and save the cache
    #[arg(long)]
    cache: bool,
    /// Clone the repository
    #[arg(long)]
    clone: bool,
    /// Run services and build steps
    #[arg(long)]
    build: bool,
    /// Run publish and deploy plugins
    #[arg(long)]
    deploy: bool,
    /// Run notify plugins
    #[arg(long)]
    notify: bool,
    /// Always pull images
    #[arg(long)]
    pull: bool,
    /// Verbose logs
    #[arg(long)]
    debug: bool,
    /// Payload file, stdin if not specified
    payload: Option<PathBuf>,
}

impl ExecArgs {
    /// Requested walks; none requested means every walk
    fn flags(&self) -> StageFlags {
        let flags = StageFlags {
            cache: self.cache,
            clone: self.clone,
            build: self.build,
            deploy: self.deploy,
            notify: self.notify,
        };
        if flags.is_empty() {
            StageFlags::all()
        } else {
            flags
        }
    }
}

fn read_payload(path: Option<&PathBuf>) -> Result<Payload> {
    let text = match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read payload {}", path.display()))?,
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read payload from stdin")?;
            text
        }
    };
    serde_json::from_str(&text).context("Failed to decode payload")
}

/// Parse arguments and run the selected command, returning the exit code
pub fn run() -> Result<i32> {
    let args = Args::parse();
    let host = HostConfig::from_env();

    match args.command {
        Command::Check { payload } => {
            init_logging(&host.log_level);
            let payload = read_payload(payload.as_ref())?;
            let prepared = runner::prepare(&payload, &host, false)?;
            for container in prepared.tree.containers() {
                println!(
                    "{:<8} {:<24} {}",
                    container.stage().as_str(),
                    container.step.name,
                    container.step.image
                );
            }
            Ok(0)
        }
        Command::Exec(exec) => {
            let payload = read_payload(exec.payload.as_ref())?;
            let debug = exec.debug || runner::wants_debug(&payload.config);
            init_logging(logging::level_for(debug, &host.log_level));

            let prepared = match runner::prepare(&payload, &host, exec.pull) {
                Ok(prepared) => prepared,
                Err(e) => {
                    error!(error = %e, "Unable to prepare build");
                    return Ok(1);
                }
            };

            let rt = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
            rt.block_on(execute(payload, prepared, &host, exec.flags()))
        }
    }
}

#[cfg(feature = "docker")]
fn connect() -> Result<Arc<dyn ContainerRuntime>> {
    let runtime = pipexec::infrastructure::DockerRuntime::connect()?;
    Ok(Arc::new(runtime))
}

#[cfg(not(feature = "docker"))]
fn connect() -> Result<Arc<dyn ContainerRuntime>> {
    anyhow::bail!("pipexec was built without a container runtime")
}

async fn execute(
    payload: Payload,
    prepared: runner::Prepared,
    host: &HostConfig,
    flags: StageFlags,
) -> Result<i32> {
    let runtime = match connect() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Unable to connect to the container runtime");
            return Ok(1);
        }
    };
    info!(runtime = runtime.name(), "Connected to container runtime");

    let cancel = CancellationToken::new();
    tokio::spawn(watch_signals(cancel.clone()));

    let timeout = host.timeout(payload.repo.timeout);
    let state = ExecutionState::new(
        payload.repo,
        payload.build,
        payload.job,
        payload.system,
        prepared.workspace,
        runtime,
    )
    .with_cancel(cancel)
    .with_timeout(timeout)
    .with_stop_grace(host.stop_grace());

    if let Err(e) = runner::execute(&prepared.tree, &state, flags, prepared.decision).await {
        warn!(error = %e, "Build interrupted");
    }
    Ok(state.exit_code())
}

async fn watch_signals(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let Ok(mut term) = signal(SignalKind::terminate()) else {
            let _ = tokio::signal::ctrl_c().await;
            cancel.cancel();
            return;
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("Received interrupt, cancelling build");
    cancel.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_no_flags_means_every_walk() {
        let args = Args::parse_from(["pipexec", "exec"]);
        let Command::Exec(exec) = args.command else {
            panic!("expected exec");
        };
        assert_eq!(exec.flags(), StageFlags::all());
    }

    #[test]
    fn test_selected_flags() {
        let args = Args::parse_from(["pipexec", "exec", "--clone", "--build", "payload.json"]);
        let Command::Exec(exec) = args.command else {
            panic!("expected exec");
        };
        let flags = exec.flags();
        assert!(flags.clone && flags.build);
        assert!(!flags.cache && !flags.deploy && !flags.notify);
        assert_eq!(exec.payload, Some(PathBuf::from("payload.json")));
    }

    #[test]
    fn test_read_payload_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"config": "build: {{}}", "build": {{"number": 3}}}}"#).unwrap();
        let path = file.path().to_path_buf();

        let payload = read_payload(Some(&path)).unwrap();
        assert_eq!(payload.build.number, 3);
        assert_eq!(payload.config, "build: {}");
    }
}
