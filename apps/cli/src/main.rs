use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    CalculatorClient, ClientOptions, ContractView, LedgerClient, MissingSigner, ObjectView,
    RemoteSigner, RpcLedgerClient, Signer, SqliteFragmentStore, SubmissionOutcome,
};
use serde::Serialize;
use shared::{
    domain::{Address, CalculationInput, ObjectId, OperatorSymbol},
    error::SessionException,
};
use storage::Storage;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;

use config::{load_settings, Settings};

#[derive(Parser, Debug)]
#[command(name = "calc", about = "Submit calculations to the on-chain calculator contract")]
struct Cli {
    /// Config file; defaults to ./calc.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Print machine-readable JSON on stdout.
    #[arg(long)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign, execute and track `a op b`.
    #[command(allow_negative_numbers = true)]
    Submit {
        a: f64,
        op: OperatorSymbol,
        b: f64,
    },
    /// Re-read the tracked record from the ledger.
    Show,
    /// Track an existing record by id or `#fragment`.
    Track { object_id: String },
    /// Print local session state without contacting the ledger.
    Status,
    /// Forget the tracked record.
    Clear,
}

#[derive(Serialize)]
struct Report<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<&'a SubmissionOutcome>,
    view: &'a ContractView,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_deref())?;

    let signer: Arc<dyn Signer> = match cli.command {
        Command::Submit { .. } => Arc::new(
            RemoteSigner::connect(
                &settings.signer_url,
                settings.sender_address.clone().map(Address::new),
                settings.request_timeout(),
            )
            .await
            .context("failed to set up signer")?,
        ),
        _ => Arc::new(MissingSigner),
    };
    let client = open_client(&settings, signer).await?;

    match cli.command {
        Command::Submit { a, op, b } => {
            let input = CalculationInput::new(a, b, op);
            client.set_input(input).await;
            let outcome = client.submit_current().await;
            let view = client.view().await;
            print_report(cli.json, Some(&outcome), &view)?;
            if let SubmissionOutcome::Failed { error } = outcome {
                return Err(SessionException::from(error).into());
            }
        }
        Command::Show => {
            client.refetch().await;
            print_report(cli.json, None, &client.view().await)?;
        }
        Command::Track { object_id } => {
            let Some(object_id) = ObjectId::from_fragment(&object_id) else {
                bail!("object id must not be empty");
            };
            client.track_object(object_id).await;
            print_report(cli.json, None, &client.view().await)?;
        }
        Command::Status => {
            print_report(cli.json, None, &client.view().await)?;
        }
        Command::Clear => {
            client.clear_session().await;
            print_report(cli.json, None, &client.view().await)?;
        }
    }

    Ok(())
}

async fn open_client(
    settings: &Settings,
    signer: Arc<dyn Signer>,
) -> Result<Arc<CalculatorClient>> {
    let storage = Storage::new(&settings.database_url)
        .await
        .with_context(|| format!("failed to open database '{}'", settings.database_url))?;
    let fragments = SqliteFragmentStore::new(storage, settings.session_key.clone());
    let ledger: Arc<dyn LedgerClient> = Arc::new(RpcLedgerClient::new(
        &settings.rpc_url,
        settings.retry_policy(),
        settings.request_timeout(),
    )?);
    info!(
        rpc_url = %settings.rpc_url,
        session_key = %settings.session_key,
        package = %settings.package_id,
        "cli: client ready"
    );

    let mut options = ClientOptions::new(settings.contract_target());
    options.anomaly_policy = settings.anomaly_policy;
    Ok(CalculatorClient::open(options, signer, ledger, Arc::new(fragments)).await)
}

fn print_report(
    json: bool,
    outcome: Option<&SubmissionOutcome>,
    view: &ContractView,
) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&Report { outcome, view })?);
    } else {
        print!("{}", render_text(outcome, view));
    }
    Ok(())
}

fn render_text(outcome: Option<&SubmissionOutcome>, view: &ContractView) -> String {
    let mut out = String::new();
    if let Some(outcome) = outcome {
        out.push_str(&format!("outcome: {}\n", describe_outcome(outcome)));
    }

    let state = &view.state;
    match &state.object_id {
        Some(object_id) => out.push_str(&format!("tracked object: {object_id}\n")),
        None => out.push_str("tracked object: none\n"),
    }
    match &view.object {
        ObjectView::NoObjectTracked => {}
        ObjectView::ExistsValid(record) => {
            out.push_str(&format!("record: {record} (owner {})\n", record.owner))
        }
        ObjectView::ExistsButInvalid => {
            out.push_str("record: object exists but is not a calculation\n")
        }
        ObjectView::NotFoundOrLoading => out.push_str("record: not found or still loading\n"),
    }
    if let Some(hash) = &state.last_hash {
        let status = if view.is_confirmed { "confirmed" } else { "pending" };
        out.push_str(&format!("last transaction: {hash} ({status})\n"));
    }
    if let Some(error) = &state.error {
        out.push_str(&format!("error: {error}\n"));
    }
    out
}

fn describe_outcome(outcome: &SubmissionOutcome) -> String {
    match outcome {
        SubmissionOutcome::Reconciled { object_id, .. } => format!("created {object_id}"),
        SubmissionOutcome::Anomaly { anomaly, .. } => format!("settled, but {anomaly}"),
        SubmissionOutcome::SettlementUnconfirmed { digest } => {
            format!("executed as {digest}, settlement not confirmed yet")
        }
        SubmissionOutcome::Discarded { .. } => "discarded, session was cleared".into(),
        SubmissionOutcome::Failed { error } => format!("failed ({error})"),
        SubmissionOutcome::Busy => "another submission is in flight".into(),
    }
}
