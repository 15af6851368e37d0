use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVES: &str = "yapper_backend=info,tower_http=info";

fn filter_from_env() -> EnvFilter {
    match std::env::var("RUST_LOG") {
        Ok(raw) if !raw.trim().is_empty() => EnvFilter::try_new(raw.trim()).unwrap_or_else(|err| {
            eprintln!("ignoring invalid RUST_LOG ({err}); using {DEFAULT_DIRECTIVES}");
            EnvFilter::new(DEFAULT_DIRECTIVES)
        }),
        _ => EnvFilter::new(DEFAULT_DIRECTIVES),
    }
}

/// Installs the global subscriber. A second call is a no-op, so the binary
/// and test harnesses can both call it.
pub fn init_tracing() {
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(filter_from_env())
        .with_target(true)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
