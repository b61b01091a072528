use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVES: &str = "storylens=debug,tower_http=debug";

pub struct Logger {}

impl Logger {
    /// Install the global subscriber. `RUST_LOG` overrides the defaults.
    pub fn init() {
        let filter = EnvFilter::builder()
            .with_default_directive(LevelFilter::INFO.into())
            .parse_lossy(
                std::env::var(EnvFilter::DEFAULT_ENV)
                    .unwrap_or_else(|_| DEFAULT_DIRECTIVES.to_string()),
            );

        tracing_subscriber::fmt()
            .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_string()))
            .with_env_filter(filter)
            .init();
    }
}
