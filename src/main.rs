use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use petstore_inventory::config::{FlowParams, DEFAULT_BASE_URL, DEFAULT_PATH};
use petstore_inventory::database_ops::inventory_history;
use petstore_inventory::logging::{init_tracing, DEFAULT_FILTER};
use petstore_inventory::orchestrator::{self, RetryPolicy};
use petstore_inventory::pipeline;
use petstore_inventory::util::db::{DbSettings, DEFAULT_PG_PORT};
use petstore_inventory::util::env as env_util;
use std::time::Duration;
use tracing::{info, warn};

/// Collect pet store inventory counts into Postgres.
#[derive(Debug, Parser)]
#[command(name = "petstore-inventory", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    flow: FlowArgs,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Register the deployment and run it on a fixed interval until Ctrl-C.
    Serve {
        #[arg(long, env = "SCHEDULE_INTERVAL_SECS", default_value_t = 3600)]
        interval_secs: u64,
    },
    /// Execute a single run and exit; non-zero exit status on failure.
    Run,
}

#[derive(Debug, Args)]
struct FlowArgs {
    #[arg(long, global = true, env = "PETSTORE_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    #[arg(long, global = true, env = "PETSTORE_PATH", default_value = DEFAULT_PATH)]
    path: String,

    /// Use https; pass `--secure false` for plain http.
    #[arg(long, global = true, env = "PETSTORE_SECURE", default_value_t = true, action = clap::ArgAction::Set)]
    secure: bool,

    /// Full `postgres://` DSN; when set it replaces the discrete --db-* options.
    #[arg(long, global = true, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    #[arg(long, global = true, env = "DB_HOST", default_value = "localhost")]
    db_host: String,

    #[arg(long, global = true, env = "DB_PORT", default_value_t = DEFAULT_PG_PORT)]
    db_port: u16,

    #[arg(long, global = true, env = "DB_USER", default_value = "root")]
    db_user: String,

    #[arg(long, global = true, env = "DB_PASS", default_value = "root", hide_env_values = true)]
    db_pass: String,

    #[arg(long, global = true, env = "DB_NAME", default_value = "petstore")]
    db_name: String,

    /// Extra attempts for the fetch and insert tasks.
    #[arg(long, global = true, env = "TASK_RETRIES", default_value_t = 0)]
    retries: u32,

    #[arg(long, global = true, env = "TASK_RETRY_DELAY_SECS", default_value_t = 10)]
    retry_delay_secs: u64,

    #[arg(long, global = true, env = "HTTP_TIMEOUT_SECS", default_value_t = 30)]
    http_timeout_secs: u64,

    /// Create inventory_history if missing before the first run.
    #[arg(long, global = true)]
    auto_migrate: bool,
}

impl FlowArgs {
    fn into_params(self) -> Result<FlowParams> {
        let db = match self.database_url.as_deref() {
            Some(dsn) => DbSettings::from_url(dsn).context("invalid --database-url")?,
            None => DbSettings {
                host: self.db_host,
                port: self.db_port,
                user: self.db_user,
                password: self.db_pass,
                dbname: self.db_name,
            },
        };
        Ok(FlowParams {
            base_url: self.base_url,
            path: self.path,
            secure: self.secure,
            db,
            retry: RetryPolicy::new(self.retries, Duration::from_secs(self.retry_delay_secs)),
            http_timeout: Duration::from_secs(self.http_timeout_secs),
        })
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c; serving until killed");
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_util::init_env();
    init_tracing(DEFAULT_FILTER)?;

    let cli = Cli::parse();
    let auto_migrate = cli.flow.auto_migrate || env_util::env_flag("AUTO_MIGRATE", false);
    let params = cli.flow.into_params()?;
    params.log_snapshot();

    if auto_migrate {
        info!("AUTO_MIGRATE on; ensuring inventory_history exists");
        inventory_history::ensure_schema(&params.db)
            .await
            .context("failed to ensure inventory_history schema")?;
    }

    let deployment = pipeline::deployment(params).context("failed to build deployment")?;

    match cli.command.unwrap_or(Command::Serve {
        interval_secs: env_util::env_parse("SCHEDULE_INTERVAL_SECS", 3600),
    }) {
        Command::Serve { interval_secs } => {
            let deployment = deployment.every(Duration::from_secs(interval_secs));
            let stats = orchestrator::serve(deployment, shutdown_signal()).await;
            info!(
                runs = stats.runs,
                failures = stats.failures,
                last_error = stats.last_error.as_deref(),
                "deployment stopped"
            );
        }
        Command::Run => {
            let outcome = orchestrator::run_once(&deployment).await;
            info!(outcome = %serde_json::to_string(&outcome)?, "run finished");
            if let orchestrator::RunState::Failed { error } = outcome.state {
                anyhow::bail!("run {} failed: {error}", outcome.id);
            }
        }
    }
    Ok(())
}
