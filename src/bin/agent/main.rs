mod brain;
mod dom;
mod hands;
mod store;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, anyhow, bail};
use chrono::Utc;
use clap::Parser;
use dotenvy::dotenv;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use workflow_capture::util::{app_name_from_url, app_url};
use workflow_capture::{CaptureConfig, RunController, RunReport, RunRequest};

/// Drive a web app through a task and record the steps it took.
#[derive(Debug, Parser)]
#[command(name = "agent", version)]
struct Cli {
    /// What to accomplish, in plain language
    #[arg(short, long)]
    task: String,

    /// Start page; defaults to the known start page of --app
    #[arg(short, long)]
    url: Option<String>,

    /// App name, used for the output folder and browser profile
    #[arg(short, long)]
    app: Option<String>,

    #[arg(long)]
    max_steps: Option<usize>,

    /// Successful actions required before "done" is accepted
    #[arg(long)]
    min_successful: Option<usize>,

    #[arg(short, long, env = "OUTPUT_DIR", default_value = "output")]
    output: PathBuf,

    /// Parent directory of the per-app browser profiles
    #[arg(long, default_value = "auth_states")]
    profiles: PathBuf,

    #[arg(long)]
    headless: bool,

    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init_logging(level: &str) -> Result<()> {
    let level: tracing::Level = level.parse().context("Invalid log level")?;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string())),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    Ok(())
}

/// Start URL and app name from whichever of the two was given.
fn resolve_target(url: Option<&str>, app: Option<&str>) -> Result<(String, String)> {
    match (url, app) {
        (Some(url), Some(app)) => Ok((url.to_string(), app.to_string())),
        (Some(url), None) => Ok((url.to_string(), app_name_from_url(url))),
        (None, Some(app)) => match app_url(app) {
            Some(url) => Ok((url.to_string(), app.to_lowercase())),
            None => bail!("unknown app '{app}'; pass --url"),
        },
        (None, None) => bail!("pass --url or --app"),
    }
}

fn load_config(cli: &Cli) -> Result<CaptureConfig> {
    let mut config = CaptureConfig::from_env()?;
    if let Some(max_steps) = cli.max_steps {
        config = config.with_max_steps(max_steps);
    }
    if let Some(min) = cli.min_successful {
        config = config.with_min_successful_actions(min);
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenv().ok();
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let (start_url, app) = resolve_target(cli.url.as_deref(), cli.app.as_deref())?;
    let config = load_config(&cli)?;
    let oracle = brain::Brain::from_env(tokio::runtime::Handle::current())?;
    info!(
        task = %cli.task,
        app = %app,
        url = %start_url,
        max_steps = config.max_steps,
        "starting"
    );

    let settings = hands::LaunchSettings {
        headless: cli.headless,
        app: app.clone(),
        profiles_dir: cli.profiles.clone(),
    };
    let task = cli.task.clone();

    // The engine blocks on every page primitive; keep it off the runtime threads.
    let report = tokio::task::spawn_blocking(move || -> Result<RunReport> {
        let mut page = hands::ChromePage::launch(&settings)?;
        let mut oracle = oracle;
        let controller = RunController::new(config);
        Ok(controller.run(
            &mut page,
            &mut oracle,
            RunRequest {
                task: &task,
                app: &app,
                start_url: &start_url,
            },
        ))
    })
    .await
    .map_err(|e| anyhow!("capture run panicked: {e}"))??;

    let dir = store::save(&report, &cli.output, Utc::now())?;
    let outcome = &report.outcome;
    println!("{}", dir.display());
    match &outcome.failure_reason {
        None => {
            info!(steps = outcome.steps, "workflow captured");
            Ok(ExitCode::SUCCESS)
        }
        Some(reason) => {
            info!(steps = outcome.steps, %reason, "workflow incomplete");
            Ok(ExitCode::from(2))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_from_url_or_app() {
        assert_eq!(
            resolve_target(Some("https://app.asana.com/0"), None).unwrap(),
            ("https://app.asana.com/0".to_string(), "asana".to_string())
        );
        assert_eq!(
            resolve_target(None, Some("Notion")).unwrap(),
            ("https://www.notion.so".to_string(), "notion".to_string())
        );
        assert!(resolve_target(None, Some("jira")).is_err());
        assert!(resolve_target(None, None).is_err());
    }

    #[test]
    fn cli_flags_override_config() {
        let cli = Cli::parse_from([
            "agent",
            "--task",
            "Create a project",
            "--app",
            "linear",
            "--max-steps",
            "4",
            "--min-successful",
            "1",
        ]);
        let config = load_config(&cli).unwrap();
        assert_eq!(config.max_steps, 4);
        assert_eq!(config.min_successful_actions, 1);
        assert!(!cli.headless);
    }
}
