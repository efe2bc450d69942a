/*
[INPUT]:  CLI arguments, optional YAML configuration file, OS shutdown signals
[OUTPUT]: Submitted and tracked emotion-recognition jobs, downloaded artifacts
[POS]:    Binary entry point
[UPDATE]: When changing CLI flags, subcommands, or shutdown handling
*/

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use emovid_adapter::{EmovidClient, VideoPayload};
use emovid_tracker::{
    Advisory, ControllerStatus, JobManager, LifecycleController, LifecycleState, TrackerConfig,
    save_artifact,
};

#[derive(Parser, Debug)]
#[command(name = "emovid", version, about = "Submit videos for emotion recognition and track them")]
struct Cli {
    #[arg(long = "config", value_name = "PATH", global = true)]
    config_path: Option<PathBuf>,
    #[arg(long = "backend-url", value_name = "URL", env = "BACKEND_URL", global = true)]
    backend_url: Option<String>,
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info", global = true)]
    log_level: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that the processing service is reachable
    Probe,
    /// Upload a video and track it to completion
    Submit {
        file: PathBuf,
        /// Write the annotated video here once processing completes
        #[arg(long, value_name = "PATH")]
        output: Option<PathBuf>,
        /// Print the task id and exit without tracking
        #[arg(long = "no-wait")]
        no_wait: bool,
    },
    /// Poll a task once and print what the service reports
    Status { task_id: String },
    /// Download the artifact of a completed task
    Download {
        task_id: String,
        #[arg(long, value_name = "PATH")]
        output: PathBuf,
    },
    /// Submit several videos and track them concurrently
    Batch {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(&args.log_level)?;

    let config = load_config(args.config_path.as_deref(), args.backend_url.as_deref())?;
    info!(backend_url = %config.backend_url, "configuration loaded");
    let client = Arc::new(config.build_client()?);

    match args.command {
        Command::Probe => probe(&client).await,
        Command::Submit {
            file,
            output,
            no_wait,
        } => submit(client, &config, &file, output.as_deref(), no_wait).await,
        Command::Status { task_id } => status(&client, &task_id).await,
        Command::Download { task_id, output } => download(&client, &task_id, &output).await,
        Command::Batch { files } => batch(client, &config, &files).await,
    }
}

fn init_tracing(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(log_level).context("invalid log level")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow!(err))
        .context("initialize tracing subscriber")?;
    Ok(())
}

fn load_config(path: Option<&Path>, backend_url: Option<&str>) -> Result<TrackerConfig> {
    let config = match path {
        Some(path) => TrackerConfig::from_file(path).context("load config")?,
        None => TrackerConfig::default(),
    };
    let config = match backend_url {
        Some(url) => config.with_backend_url(url),
        None => config,
    };
    config.validate().context("validate config")?;
    Ok(config)
}

async fn probe(client: &EmovidClient) -> Result<()> {
    client
        .probe()
        .await
        .with_context(|| format!("backend {} is not reachable", client.base_url()))?;
    println!("backend {} is reachable", client.base_url());
    Ok(())
}

async fn read_payload(file: &Path) -> Result<VideoPayload> {
    VideoPayload::from_path(file)
        .await
        .with_context(|| format!("read video {}", file.display()))
}

async fn submit(
    client: Arc<EmovidClient>,
    config: &TrackerConfig,
    file: &Path,
    output: Option<&Path>,
    no_wait: bool,
) -> Result<()> {
    let payload = read_payload(file).await?;
    let mut controller = LifecycleController::new(Arc::clone(&client), config.lifecycle_config());
    let task_id = controller
        .submit(payload)
        .await
        .context("submit video")?
        .task_id()
        .to_string();
    println!("{task_id}");

    if no_wait {
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    setup_signal_handlers(shutdown.clone());

    let handle = controller.spawn(shutdown);
    let printer = tokio::spawn(print_status_changes(handle.subscribe()));
    let controller = handle.join().await.context("track job")?;
    printer.abort();

    let status = controller.status();
    report_terminal(&status);
    match status.state {
        LifecycleState::Completed => {
            if let Some(output) = output {
                let written = controller
                    .save_result(output)
                    .await
                    .with_context(|| format!("save artifact to {}", output.display()))?;
                println!("saved {written} bytes to {}", output.display());
            }
            Ok(())
        }
        state => bail!("job {task_id} ended {state}"),
    }
}

async fn status(client: &EmovidClient, task_id: &str) -> Result<()> {
    let snapshot = client
        .poll(task_id)
        .await
        .with_context(|| format!("poll task {task_id}"))?;
    println!("status: {}", snapshot.status.as_str());
    if let Some(result_path) = &snapshot.result_path {
        println!("result: {result_path}");
        let location = client.result_location(task_id)?;
        println!("download: {location}");
    }
    if let Some(error) = &snapshot.error {
        println!("error: {error}");
    }
    Ok(())
}

async fn download(client: &EmovidClient, task_id: &str, output: &Path) -> Result<()> {
    let written = save_artifact(client, task_id, output)
        .await
        .with_context(|| format!("download artifact of task {task_id}"))?;
    println!("saved {written} bytes to {}", output.display());
    Ok(())
}

async fn batch(client: Arc<EmovidClient>, config: &TrackerConfig, files: &[PathBuf]) -> Result<()> {
    let mut manager = JobManager::new(client, config.lifecycle_config());
    setup_signal_handlers(manager.shutdown_token());

    for file in files {
        let payload = read_payload(file).await?;
        match manager.start(payload).await {
            Ok(task_id) => println!("{} -> {task_id}", file.display()),
            Err(err) => warn!(file = %file.display(), error = %err, "submission failed"),
        }
    }

    if manager.is_empty() {
        bail!("no video was accepted");
    }
    info!(jobs = manager.len(), "tracking jobs");

    let controllers = manager.wait_all().await.context("track jobs")?;
    let mut failed = 0usize;
    for controller in &controllers {
        let status = controller.status();
        report_terminal(&status);
        if status.state != LifecycleState::Completed {
            failed += 1;
        }
    }

    if failed > 0 {
        bail!("{failed} of {} jobs did not complete", controllers.len());
    }
    Ok(())
}

async fn print_status_changes(mut status_rx: watch::Receiver<ControllerStatus>) {
    let mut last_state = None;
    while status_rx.changed().await.is_ok() {
        let status = status_rx.borrow_and_update().clone();
        if last_state != Some(status.state) {
            eprintln!("[{}] {}", task_label(&status), status.state);
            last_state = Some(status.state);
        }
        if let Some(Advisory::Retrying {
            attempt,
            max_attempts,
            message,
        }) = &status.advisory
        {
            eprintln!(
                "[{}] connection problem, retry {attempt}/{max_attempts}: {message}",
                task_label(&status)
            );
        }
    }
}

fn report_terminal(status: &ControllerStatus) {
    let label = task_label(status);
    match (&status.download_url, &status.error) {
        (Some(url), _) => println!("[{label}] completed: {url}"),
        (None, Some(error)) => println!("[{label}] {}: {error}", status.state),
        (None, None) => println!("[{label}] {}", status.state),
    }
}

fn task_label(status: &ControllerStatus) -> &str {
    status.task_id.as_deref().unwrap_or("-")
}

fn setup_signal_handlers(shutdown: CancellationToken) {
    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to install SIGINT handler");
            return;
        }
        info!("received SIGINT; cancelling locally");
        shutdown_clone.cancel();
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        tokio::spawn(async move {
            match signal(SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                    info!("received SIGTERM; cancelling locally");
                    shutdown.cancel();
                }
                Err(err) => {
                    warn!(error = %err, "failed to install SIGTERM handler");
                }
            }
        });
    }
}
