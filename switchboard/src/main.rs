#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod args;
mod replay;

use std::path::Path;

use args::{Args, CallArgs, Command};
use clap::Parser;
use futures_util::StreamExt;
use replay::ReplayClient;
use switchboard_config::Config;
use switchboard_llm::{ChatCompletionRequest, Diagnostic, Dispatcher, Provider};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    switchboard_telemetry::init(&config.telemetry)?;

    let dispatcher = Dispatcher::new(&config.llm)?;

    match args.command {
        Command::Translate(call) => translate(&dispatcher, &call),
        Command::Complete { call, response } => complete(&dispatcher, &call, &response).await,
        Command::Stream { call, events } => stream(&dispatcher, &call, &events).await,
    }
}

fn translate(dispatcher: &Dispatcher, call: &CallArgs) -> anyhow::Result<()> {
    let request = read_request(&call.request)?;
    let provider = provider(dispatcher, call)?;

    let translation = dispatcher.adapter(provider).translate(&request)?;
    report(&translation.diagnostics);

    let output = serde_json::json!({
        "provider": provider,
        "request": translation.request,
        "diagnostics": translation.diagnostics,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}

async fn complete(dispatcher: &Dispatcher, call: &CallArgs, recording: &Path) -> anyhow::Result<()> {
    let request = read_request(&call.request)?;
    let provider = provider(dispatcher, call)?;
    let client = ReplayClient::new(recording.to_path_buf());

    let response = dispatcher.route(&request, &provider.to_string(), &client).await?;
    report(&response.diagnostics);

    println!("{}", serde_json::to_string_pretty(&response)?);

    Ok(())
}

async fn stream(dispatcher: &Dispatcher, call: &CallArgs, recording: &Path) -> anyhow::Result<()> {
    let request = read_request(&call.request)?;
    let provider = provider(dispatcher, call)?;
    let client = ReplayClient::new(recording.to_path_buf());

    let mut chunks = dispatcher.route_stream(&request, &provider.to_string(), &client).await?;
    let mut count = 0_usize;

    while let Some(chunk) = chunks.next().await {
        let chunk = chunk?;
        report(&chunk.diagnostics);
        println!("{}", serde_json::to_string(&chunk)?);
        count += 1;
    }

    tracing::debug!(%provider, chunks = count, "stream replay finished");

    Ok(())
}

fn read_request(path: &Path) -> anyhow::Result<ChatCompletionRequest> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read request file {}: {e}", path.display()))?;

    serde_json::from_str(&raw).map_err(|e| anyhow::anyhow!("invalid chat completion request {}: {e}", path.display()))
}

fn provider(dispatcher: &Dispatcher, call: &CallArgs) -> anyhow::Result<Provider> {
    match (&call.provider, dispatcher.default_provider()) {
        (Some(name), _) => Ok(Provider::from_name(name)?),
        (None, Some(provider)) => Ok(provider),
        (None, None) => anyhow::bail!("no provider selected; pass --provider or set llm.default_provider"),
    }
}

/// Log diagnostics at `warn`
fn report(diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        tracing::warn!(kind = %diagnostic.kind(), "{diagnostic}");
    }
}
