mod tracing_setup;

use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context as AnyhowContext, Result};
use clap::Parser;
use tracing::{debug, error};
use uuid::Uuid;

use evalbench::{
    Cli, Commands,
    adapters::{
        inbound::{
            cli::{CliAdapter, ServeArgs},
            server::{ServeOptions, ServerAdapter},
        },
        llm::ChatCompletionsClient,
        persistence::SqliteResultStore,
        telemetry::TracingTelemetrySink,
    },
    application::{AppService, Orchestrator},
    config::{EvalbenchConfig, Secrets},
    core::ports::{EvaluationService, ModelClient, ResultStore, TelemetrySink},
};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let run_id = cli.log_file.then(|| Uuid::new_v4().to_string());
    let _guard = tracing_setup::init(
        cli.verbose,
        cli.log_json,
        cli.log_json_format,
        run_id.as_deref(),
    );

    let result = start(cli);
    if let Err(err) = &result {
        error!(error = %format!("{err:#}"), "evalbench failed");
    }
    result
}

fn start(cli: Cli) -> Result<()> {
    let config = EvalbenchConfig::load(cli.config.as_deref())?;
    // `.env` loading writes the process environment, so it happens before any runtime thread exists.
    let secrets = Secrets::resolve(cli.api_key, cli.database)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;
    runtime.block_on(run(config, secrets, cli.command))
}

async fn run(config: EvalbenchConfig, secrets: Secrets, command: Commands) -> Result<()> {
    let service = build_service(&config, &secrets).await?;
    match command {
        Commands::Serve(args) => serve_command(service, args).await,
        command => CliAdapter::new(service).execute(command).await,
    }
}

async fn build_service(
    config: &EvalbenchConfig,
    secrets: &Secrets,
) -> Result<Arc<dyn EvaluationService>> {
    let store = SqliteResultStore::open(&secrets.database_url)?;
    debug!(database = %store.location().describe(), "opened evaluation database");
    store
        .ensure_schema()
        .await
        .context("Failed to prepare the evaluation table")?;
    let store: Arc<dyn ResultStore> = Arc::new(store);

    let client = ChatCompletionsClient::new(secrets.api_key.clone(), config.endpoint.clone())?;
    debug!(endpoint = client.endpoint(), "completions client ready");
    let client: Arc<dyn ModelClient> = Arc::new(client);
    let telemetry: Arc<dyn TelemetrySink> = Arc::new(TracingTelemetrySink::new());

    let orchestrator = Orchestrator::new(
        client,
        store.clone(),
        telemetry,
        config.catalog()?,
        config.orchestrator_options(),
    );
    Ok(Arc::new(AppService::new(orchestrator, store)))
}

async fn serve_command(service: Arc<dyn EvaluationService>, args: ServeArgs) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", args.bind, args.port)
        .parse()
        .context("Invalid bind/port combination for serve command")?;
    let options = ServeOptions {
        default_limit: args.limit,
    };
    eprintln!("Serving evaluation API on http://{addr}");
    ServerAdapter::new(service, options).run(addr).await
}
