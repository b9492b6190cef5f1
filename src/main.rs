use std::sync::Arc;
use std::sync::atomic::Ordering;

use inbox_autoreply::channels::{
    AuthProvider, EmailConfig, GmailGateway, ImapGateway, OAuthTokenProvider, StaticTokenProvider,
    TokenStore,
};
use inbox_autoreply::config::{GatewayBackend, GmailAuthConfig, GmailConfig, ResponderConfig};
use inbox_autoreply::error::{ConfigError, Error};
use inbox_autoreply::pipeline::poller::spawn_autoresponder;
use inbox_autoreply::pipeline::{AutoResponder, KeywordExtractor, MailboxGateway, load_templates};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install rustls crypto provider before any TLS usage
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("Warning: rustls crypto provider already installed");
    }

    let config = ResponderConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {}", Error::from(e));
        std::process::exit(2);
    });

    let _log_guard = init_tracing(&config);

    eprintln!("📬 inbox-autoreply v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Backend: {:?} (user: {})", config.backend, config.user_id);

    // A bad catalog is fatal before any mailbox access.
    let catalog = load_templates(config.templates_path.as_deref(), config.keyword_case)
        .unwrap_or_else(|e| {
            eprintln!("Error: {}", Error::from(e));
            std::process::exit(1);
        });
    eprintln!(
        "   Templates: {} ({})",
        catalog.len(),
        config
            .templates_path
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "built-in".to_string())
    );

    let gateway = build_gateway(&config)?;

    let responder = Arc::new(
        AutoResponder::new(
            gateway,
            KeywordExtractor::lexicon().with_case(config.keyword_case),
            Arc::new(catalog),
            config.user_id.clone(),
        )
        .with_dry_run(config.dry_run),
    );

    if config.dry_run {
        eprintln!("   Dry run: replies are logged, not sent");
    }

    match config.poll_interval {
        None => {
            let summary = responder.run_once().await?;
            eprintln!(
                "   Done: {} unread, {} replied, {} unmatched, {} skipped, {} failed",
                summary.total, summary.replied, summary.unmatched, summary.skipped, summary.failed
            );
        }
        Some(interval) => {
            eprintln!("   Polling every {}s. Ctrl-C to stop.\n", interval.as_secs());
            let (handle, shutdown) = spawn_autoresponder(responder, interval);
            tokio::signal::ctrl_c().await?;
            tracing::info!("Shutdown requested");
            shutdown.store(true, Ordering::Relaxed);
            handle.abort();
        }
    }

    Ok(())
}

/// Stderr always; a daily-rotated file too when `AUTOREPLY_LOG_DIR` is set.
fn init_tracing(config: &ResponderConfig) -> Option<WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "autoreply.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    guard
}

fn build_gateway(config: &ResponderConfig) -> inbox_autoreply::error::Result<Arc<dyn MailboxGateway>> {
    match config.backend {
        GatewayBackend::Gmail => {
            let gmail = GmailConfig::from_env()?;
            let auth: Arc<dyn AuthProvider> = match gmail.auth {
                GmailAuthConfig::Static(token) => Arc::new(StaticTokenProvider::new(token)),
                GmailAuthConfig::OAuth {
                    token_path,
                    client_id,
                    client_secret,
                } => {
                    eprintln!("   OAuth token: {}", token_path.display());
                    Arc::new(OAuthTokenProvider::new(
                        TokenStore::new(token_path),
                        client_id,
                        client_secret,
                    ))
                }
            };
            Ok(Arc::new(
                GmailGateway::with_base_url(auth, &gmail.api_base)
                    .with_from_address(gmail.from_address),
            ))
        }
        GatewayBackend::Imap => {
            let email = EmailConfig::from_env().ok_or_else(|| ConfigError::MissingRequired {
                key: "EMAIL_IMAP_HOST".into(),
                hint: "Required when AUTOREPLY_BACKEND=imap".into(),
            })?;
            eprintln!(
                "   IMAP: {}:{}, SMTP: {}:{}",
                email.imap_host, email.imap_port, email.smtp_host, email.smtp_port
            );
            Ok(Arc::new(ImapGateway::new(email)))
        }
    }
}
