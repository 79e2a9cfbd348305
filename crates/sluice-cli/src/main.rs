//! 🚀 sluice — the front door, the bouncer, the maitre d' of the bulk loader.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//! 📦 Thin CLI wrapper: loads config, sets up logging, then either pours an NDJSON
//! bulk file into the cluster or fires one raw request through the failover loop.
//! Like a manager. 🦆

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use futures::StreamExt;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use sluice::bulk::{BulkBatch, parse_ndjson};
use sluice::{Action, AppConfig, Client, ClientError, Method, TransportError};

mod progress;

use progress::{BulkProgress, FailureRow, failure_table};

/// 🌊 Keep the bulk flowing while cluster nodes come and go.
#[derive(Debug, Parser)]
#[command(name = "sluice", version)]
struct Cli {
    /// 🔧 TOML config file. Missing is fine: env vars (SLUICE_*) and defaults take over.
    #[arg(long, short, global = true, default_value = "sluice.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 📦 Send an NDJSON bulk file in batches.
    Bulk(BulkArgs),
    /// 📨 Send one raw request and print what came back.
    Request(RequestArgs),
}

#[derive(Debug, Args)]
struct BulkArgs {
    /// NDJSON file in bulk format (action line, then source line unless delete)
    file: PathBuf,
    /// Default `_index` for actions without one
    #[arg(long)]
    index: Option<String>,
    /// Default `_type` for actions without one
    #[arg(long = "type")]
    type_name: Option<String>,
    /// Actions per request [default: from config, 500]
    #[arg(long)]
    batch_size: Option<usize>,
    /// Requests in flight at once [default: from config, 1]
    #[arg(long)]
    parallelism: Option<usize>,
    /// Fire and forget over UDP. No outcomes, no failover, no regrets.
    #[arg(long)]
    udp: bool,
}

#[derive(Debug, Args)]
struct RequestArgs {
    /// GET, POST, PUT, DELETE or HEAD
    method: String,
    /// Path relative to the node, e.g. `_cluster/health`
    path: String,
    /// Request body, sent verbatim
    #[arg(long)]
    body: Option<String>,
}

/// 🚀 main() — the "I pressed enter and held my breath" moment.
///
/// 🔧 Steps:
/// 1. Init tracing (so we can see what goes wrong, and when)
/// 2. Parse args
/// 3. Load config (the moment of truth)
/// 4. Run the subcommand (send it and pray 🙏)
/// 5. Handle errors (cry, but helpfully)
#[tokio::main]
async fn main() -> Result<()> {
    // 📡 println! debugging is a lifestyle choice we're trying to move past
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        error!("💀 error: {}", err);
        // -- 🧅 peel the onion of sadness, one layer at a time
        for cause in err.chain().skip(1) {
            error!("⚠️  cause: {}", cause);
        }
        let the_vibes_are_giving_connection_issues = looks_like_connectivity(&err);

        if the_vibes_are_giving_connection_issues {
            error!(
                "🔧 hint: looks like the cluster isn't reachable. \
                Double-check that the nodes in your config are actually running and the \
                host/port are right. If you're using Docker, try `docker ps` to see what's up, \
                or `docker compose up -d` to resurrect it. Even servers need a nudge sometimes. ☕"
            );
        }

        // 🗑️ Exit with prejudice.
        std::process::exit(1);
    }

    Ok(())
}

// -- 🕵️ typed errors first. then sniff the message like a truffle pig, for the ones that lost their type.
fn looks_like_connectivity(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        if let Some(client_error) = cause.downcast_ref::<ClientError>() {
            return client_error.is_connectivity() || client_error.is_pool_exhausted();
        }
        if let Some(transport_error) = cause.downcast_ref::<TransportError>() {
            return transport_error.is_connectivity();
        }
        let message = cause.to_string();
        [
            "error sending request",
            "connection refused",
            "Connection refused",
            "tcp connect error",
            "dns error",
            "could not connect",
            "request timed out",
            "no enabled connection",
        ]
        .iter()
        .any(|needle| message.contains(needle))
    })
}

async fn run(cli: Cli) -> Result<()> {
    let app_config = load(&cli.config)?;
    match cli.command {
        Command::Bulk(args) => run_bulk(app_config, args).await,
        Command::Request(args) => run_request(app_config, args).await,
    }
}

fn load(config_file: &Path) -> Result<AppConfig> {
    let config_file_which_may_exist = match config_file.try_exists().context(format!(
        "💀 Couldn't even check whether the configuration file exists. Permissions, maybe? \
         Was checking here: '{}'",
        config_file.display()
    ))? {
        true => Some(config_file),
        false => {
            info!(
                "🔧 No config file at '{}', running on env vars and defaults",
                config_file.display()
            );
            None
        }
    };

    sluice::load_config(config_file_which_may_exist).context(
        "💀 In sluice, main, we couldn't load the config. Take a look at the file and the SLUICE_* \
         env vars, make sure you didn't forget something obvious",
    )
}

/// 🔪 Split actions into batches of at most `batch_size`.
fn into_batches(
    actions: Vec<Action>,
    batch_size: usize,
    client: &Client,
    index: Option<&str>,
    type_name: Option<&str>,
) -> Vec<BulkBatch> {
    let mut batches = Vec::new();
    let mut actions = actions.into_iter().peekable();
    while actions.peek().is_some() {
        let mut batch = BulkBatch::new(client.clone());
        if let Some(index) = index {
            batch = batch.with_index(index);
        }
        if let Some(type_name) = type_name {
            batch = batch.with_type(type_name);
        }
        batch.add_actions(actions.by_ref().take(batch_size));
        batches.push(batch);
    }
    batches
}

// 📋 what one batch's failure looks like in the summary table
fn failure_rows(batch_number: usize, error: &ClientError) -> Vec<FailureRow> {
    match error.bulk_outcomes() {
        Some(outcomes) => outcomes
            .failures()
            .map(|(position, outcome)| FailureRow {
                batch: batch_number,
                position: Some(position),
                op_type: outcome.op_type.clone(),
                id: outcome.id().unwrap_or_else(|| "-".to_string()),
                error: outcome.error().unwrap_or_default(),
            })
            .collect(),
        None => vec![FailureRow {
            batch: batch_number,
            position: None,
            op_type: "-".to_string(),
            id: "-".to_string(),
            error: error.to_string(),
        }],
    }
}

async fn run_bulk(app_config: AppConfig, args: BulkArgs) -> Result<()> {
    let text = tokio::fs::read_to_string(&args.file).await.context(format!(
        "💀 Couldn't read the bulk file '{}'. Check the path, check the permissions, check your horoscope.",
        args.file.display()
    ))?;
    let actions = parse_ndjson(&text).context(format!(
        "💀 '{}' isn't valid bulk NDJSON (action line, then a source line unless it's a delete)",
        args.file.display()
    ))?;
    let total_actions = actions.len();
    if total_actions == 0 {
        info!("🤷 '{}' holds no actions. Nothing to do.", args.file.display());
        return Ok(());
    }

    let batch_size = args.batch_size.unwrap_or(app_config.cli.batch_size).max(1);
    let parallelism = args.parallelism.unwrap_or(app_config.cli.parallelism).max(1);
    let client = Client::new(app_config.client).context("💀 Couldn't build the client from config")?;
    let batches = into_batches(
        actions,
        batch_size,
        &client,
        args.index.as_deref(),
        args.type_name.as_deref(),
    );
    info!(
        "🚀 {} action(s) in {} batch(es) of up to {}, {} in flight",
        total_actions,
        batches.len(),
        batch_size,
        parallelism
    );

    if args.udp {
        // 📮 fire and forget. the only thing we can report is bytes handed to the kernel.
        let mut bytes = 0usize;
        for batch in &batches {
            bytes += batch
                .send_udp()
                .await
                .context("💀 Couldn't hand the batch to the UDP socket")?;
        }
        info!(
            "📮 Sent {} datagram(s), {} bytes, to udp://{}:{}. Whether anyone caught them is between them and the network.",
            batches.len(),
            bytes,
            client.config().udp.host,
            client.config().udp.port
        );
        return Ok(());
    }

    let mut progress = BulkProgress::new(args.file.display().to_string(), total_actions as u64);
    let mut failures: Vec<FailureRow> = Vec::new();

    let mut in_flight = futures::stream::iter(batches.into_iter().enumerate())
        .map(|(batch_number, mut batch)| async move {
            let result = batch.send().await;
            (batch_number, batch.len(), result)
        })
        .buffer_unordered(parallelism);

    while let Some((batch_number, len, result)) = in_flight.next().await {
        let failed = match result {
            Ok(_) => 0,
            Err(err) => {
                let rows = failure_rows(batch_number, &err);
                // 💀 a whole-batch failure counts every action in it
                let failed = match err.bulk_outcomes() {
                    Some(outcomes) => outcomes.failures().count(),
                    None => len,
                };
                failures.extend(rows);
                failed
            }
        };
        progress.record_batch(len as u64, failed as u64);
    }
    progress.finish();

    info!(
        "✅ Done in {:.1}s: {} action(s), {} failed",
        progress.elapsed().as_secs_f64(),
        total_actions,
        progress.actions_failed()
    );

    if !failures.is_empty() {
        failures.sort_by_key(|row| (row.batch, row.position));
        println!("{}", failure_table(&failures));
        bail!(
            "⚠️ {} action(s) across {} batch(es) did not make it",
            progress.actions_failed(),
            progress.batches_failed()
        );
    }
    Ok(())
}

async fn run_request(app_config: AppConfig, args: RequestArgs) -> Result<()> {
    let method = Method::from_str(&args.method).context("💀 That's not a method we speak")?;
    let client = Client::new(app_config.client).context("💀 Couldn't build the client from config")?;
    let response = client
        .request(args.path.as_str(), method, args.body, Vec::new())
        .await
        .context(format!("💀 {} {} never got an answer", method, args.path))?;

    println!("{}", response.status());
    println!("{}", response.body());

    if !response.is_success() {
        bail!(
            "⚠️ the server answered {}: {}",
            response.status(),
            response.error_message().unwrap_or_default()
        );
    }
    Ok(())
}
