use tracing_subscriber::EnvFilter;
use tracing_subscriber::util::SubscriberInitExt;

const TARGETS: [&str; 3] = ["filestream", "tail", "tripwire"];

/// Install the global subscriber, events are written to stderr so they never
/// mix with the content of the followed file.
///
/// `levels` is either a single level applied to our own crates, or a full
/// filter directive like `tail=debug,tripwire=trace`.
#[allow(clippy::print_stderr)]
pub fn init(color: bool, levels: &str) {
    let directives = if levels.contains('=') {
        levels.to_string()
    } else {
        TARGETS
            .iter()
            .map(|target| format!("{target}={levels}"))
            .collect::<Vec<_>>()
            .join(",")
    };

    let filter = match EnvFilter::try_new(&directives) {
        Ok(filter) => filter,
        Err(err) => {
            eprintln!("invalid log level {levels:?}, fallback to info, {err}");
            EnvFilter::new("info")
        }
    };

    let result = tracing_subscriber::fmt::SubscriberBuilder::default()
        .with_ansi(color)
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish()
        .try_init();
    if let Err(err) = result {
        eprintln!("install tracing subscriber failed, {err}");
    }
}
