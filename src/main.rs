use asc::{
    DebugSettings,
    cli::{Cli, run_cli},
};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// `RUST_LOG` wins; otherwise `asc=warn`, or `asc=debug` when debug is on.
/// `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing(settings: DebugSettings) {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let default = if settings.enabled { "asc=debug" } else { "asc=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let settings = cli.debug_settings();
    init_tracing(settings);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted, cancelling in-flight requests");
                cancel.cancel();
            }
        }
    });

    if let Err(err) = run_cli(cli, settings, cancel).await {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}
