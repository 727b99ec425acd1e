use std::{
    io::IsTerminal,
    time::{SystemTime, UNIX_EPOCH},
};

use tracing::Level;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, filter::Directive, fmt, layer::SubscriberExt,
};

use crate::cli::{LogColor, Options};

/// Installs the global subscriber: stdout always, plus a log file when
/// `--log.dir` is set. Keep the returned guard alive until exit so the file
/// writer flushes.
pub fn init_tracing(
    opts: &Options,
) -> eyre::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let log_filter = EnvFilter::builder()
        .with_default_directive(Directive::from(opts.log_level))
        .from_env_lossy();

    let use_color = match opts.log_color {
        LogColor::Always => true,
        LogColor::Never => false,
        LogColor::Auto => std::io::stdout().is_terminal(),
    };

    let include_target = matches!(opts.log_level, Level::DEBUG | Level::TRACE);

    let fmt_layer = fmt::layer()
        .with_target(include_target)
        .with_ansi(use_color);

    let (file_layer, guard) = if let Some(log_dir) = &opts.log_dir {
        std::fs::create_dir_all(log_dir)?;
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let log_file = log_dir.join(format!(
            "arbdeploy_{}_{timestamp}.log",
            std::process::id()
        ));

        let file = std::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(log_file)?;

        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let file_layer = fmt::layer()
            .with_target(include_target)
            .with_ansi(false)
            .with_writer(non_blocking);
        (Some(file_layer), Some(guard))
    } else {
        (None, None)
    };

    let subscriber =
        Registry::default().with(fmt_layer.and_then(file_layer).with_filter(log_filter));

    tracing::subscriber::set_global_default(subscriber)?;

    Ok(guard)
}
