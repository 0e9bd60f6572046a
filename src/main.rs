use anyhow::Context;
use link_preview::LinkPreviewer;
use link_preview::config::load_settings;
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize rustls crypto provider
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    // Logs go to stderr; stdout carries the expansions
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("link_preview=debug"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_line_number(true);
    if std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    tracing::info!("🚀 Starting link previewer");

    let settings = load_settings().context("failed to load configuration")?;
    tracing::info!("✅ Configuration loaded");
    tracing::debug!(
        "Config: ttl={:?}, timeout={:?}, guard={:?}",
        settings.preview.cache_ttl,
        settings.preview.fetch_timeout,
        settings.preview.fetch_guard
    );

    let previewer =
        LinkPreviewer::from_settings(&settings).context("failed to build link previewer")?;
    let sweeper = previewer
        .cache()
        .spawn_sweeper(settings.preview.sweep_interval);
    tracing::info!("Fetch cache initialized");

    // Setup shutdown signal handler in background
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::mpsc::channel::<String>(1);
    tokio::spawn(async move {
        match setup_shutdown_handler().await {
            Ok(signal_name) => {
                let _ = shutdown_tx.send(signal_name).await;
            }
            Err(e) => tracing::error!(error = %e, "Failed to install signal handlers"),
        }
    });

    let run_result = tokio::select! {
        result = run(&previewer) => {
            tracing::info!("Input closed");
            result
        }
        Some(signal_name) = shutdown_rx.recv() => {
            tracing::info!(
                signal = %signal_name,
                "Received shutdown signal, initiating graceful shutdown"
            );
            Ok(())
        }
    };

    sweeper.abort();
    previewer.cache().log_stats().await;
    tracing::info!("Shutdown complete");
    run_result
}

/// Read messages line by line from stdin and print one JSON object per expansion
async fn run(previewer: &LinkPreviewer) -> anyhow::Result<()> {
    let mut reader = BufReader::new(tokio::io::stdin());
    let mut buf = Vec::new();

    while let Some(line) = next_message(&mut reader, &mut buf)
        .await
        .context("failed to read stdin")?
    {
        let expansions = previewer.process(&line).await;

        let mut stdout = std::io::stdout().lock();
        for (url, expansion) in expansions {
            let record = serde_json::json!({
                "url": url.as_str(),
                "expansion": expansion,
            });
            serde_json::to_writer(&mut stdout, &record)?;
            writeln!(stdout)?;
        }
        stdout.flush()?;
    }

    Ok(())
}

/// Next input line without its terminator, or `None` at end of input.
/// Invalid UTF-8 is replaced rather than rejected; only I/O errors fail.
async fn next_message<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(None);
    }

    if buf.ends_with(b"\n") {
        buf.pop();
        if buf.ends_with(b"\r") {
            buf.pop();
        }
    }

    let line = String::from_utf8_lossy(buf);
    if matches!(line, std::borrow::Cow::Owned(_)) {
        tracing::warn!(len = buf.len(), "Input line is not valid UTF-8, decoding lossily");
    }

    Ok(Some(line.into_owned()))
}

/// Setup signal handlers for graceful shutdown
/// Handles SIGINT (Ctrl+C), SIGTERM, and SIGQUIT on Unix systems
async fn setup_shutdown_handler() -> std::io::Result<String> {
    #[cfg(unix)]
    {
        use signal::unix::{SignalKind, signal};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigquit = signal(SignalKind::quit())?;

        let name = tokio::select! {
            _ = sigint.recv() => "SIGINT (Ctrl+C)",
            _ = sigterm.recv() => "SIGTERM",
            _ = sigquit.recv() => "SIGQUIT",
        };
        tracing::debug!(signal = name, "Caught signal");
        Ok(name.to_string())
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        tracing::debug!("Caught Ctrl+C signal");
        Ok("Ctrl+C".to_string())
    }
}
