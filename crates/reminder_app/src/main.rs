use reminder_app::{run, AppConfig};
use tracing_subscriber::EnvFilter;

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(%err, "falling back to default configuration");
            AppConfig::default()
        }
    };
    if let Err(err) = run(config) {
        eprintln!("Failed to run reminder driver: {err:#}");
        std::process::exit(1);
    }
}
