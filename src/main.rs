use tracing_subscriber::EnvFilter;

fn main() {
    // Diagnostics go to stderr; stdout carries the UCI protocol.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    graphite::uci::run();
}
