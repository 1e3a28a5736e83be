use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use txnscope_streamer::config::{Cli, ConfigError, StreamerConfig};
use txnscope_streamer::{ApiKeyTokenSource, GrpcBlockSource, OutputSink, ProtoBlockDecoder, Session};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match StreamerConfig::from_env(cli) {
        Ok(config) => config,
        Err(err) => usage_error(err),
    };

    info!(
        endpoint = %config.client.endpoint,
        range = %config.range,
        cursor = %config.start_cursor,
        handle_forks = config.fork_steps.handles_forks(),
        dedup_scope = %config.dedup_scope,
        "Starting streamer"
    );

    let sink = OutputSink::open(&config.output, &config.redis_channel)
        .await
        .with_context(|| format!("unable to open output {:?}", config.output))?;
    let tokens = ApiKeyTokenSource::new(config.auth_url.clone(), config.api_key.clone());
    let source = GrpcBlockSource::connect_lazy(&config.client)
        .with_context(|| format!("unable to set up connection to {}", config.client.endpoint))?;

    let mut session = Session::new(config.session_settings(), tokens, source, ProtoBlockDecoder, sink);
    let summary = session.run().await.context("streaming session failed")?;

    eprintln!("{summary}");
    Ok(())
}

fn usage_error(err: ConfigError) -> ! {
    use clap::CommandFactory;

    eprintln!("error: {err}\n");
    eprintln!("{}", Cli::command().render_usage());
    std::process::exit(2);
}
