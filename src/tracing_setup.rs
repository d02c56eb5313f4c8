use std::fs;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, filter::Targets, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

use evalbench::{adapters::inbound::cli::LogJsonFormat, paths};

/// Installs the global subscriber.
///
/// Console output goes to stderr so that `--json` command output on stdout stays
/// machine readable. When `run_id` is set, every debug event is also written as
/// JSON to `<data dir>/logs/evalbench-<run_id>.log`.
///
/// The returned guard must stay alive until exit so the file writer flushes.
pub fn init(
    verbose: bool,
    log_json: bool,
    json_format: LogJsonFormat,
    run_id: Option<&str>,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let registry = tracing_subscriber::registry();
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| default_env_filter(verbose));

    let (file_layer, guard) = match run_id {
        Some(id) => {
            let log_dir = paths::log_dir();
            if let Err(err) = fs::create_dir_all(&log_dir) {
                eprintln!(
                    "Warning: failed to create log dir {}: {err}",
                    log_dir.display()
                );
                (None, None)
            } else {
                let file_appender =
                    tracing_appender::rolling::never(&log_dir, format!("evalbench-{id}.log"));
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
                let layer = fmt::layer()
                    .json()
                    .with_writer(non_blocking)
                    .with_filter(Targets::new().with_default(tracing::Level::DEBUG));
                (Some(layer), Some(guard))
            }
        }
        None => (None, None),
    };

    let console_layer: Box<dyn Layer<Registry> + Send + Sync> = if log_json {
        match json_format {
            LogJsonFormat::Pretty => Box::new(
                fmt::layer()
                    .json()
                    .with_writer(|| PrettyJsonWriter::new(std::io::stderr()))
                    .with_filter(console_filter),
            ),
            LogJsonFormat::Compact => Box::new(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_filter(console_filter),
            ),
        }
    } else if verbose {
        Box::new(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
    } else {
        Box::new(
            fmt::layer()
                .with_writer(std::io::stderr)
                .without_time()
                .with_target(false)
                .with_level(true)
                .with_filter(console_filter),
        )
    };

    registry.with(console_layer).with(file_layer).init();

    guard
}

struct PrettyJsonWriter<W: std::io::Write> {
    inner: W,
}

impl<W: std::io::Write> PrettyJsonWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner }
    }
}

impl<W: std::io::Write> std::io::Write for PrettyJsonWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        // The JSON formatter emits one event per write.
        if let Ok(s) = std::str::from_utf8(buf) {
            let trimmed = s.trim();
            if trimmed.starts_with('{')
                && trimmed.ends_with('}')
                && let Ok(val) = serde_json::from_str::<serde_json::Value>(trimmed)
                && serde_json::to_writer_pretty(&mut self.inner, &val).is_ok()
            {
                self.inner.write_all(b"\n")?;
                return Ok(buf.len());
            }
        }
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

fn default_env_filter(verbose: bool) -> EnvFilter {
    let spec = if verbose {
        "evalbench=debug,warn"
    } else {
        "evalbench=info,warn"
    };
    EnvFilter::new(spec)
}
