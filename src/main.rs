//! Back-office service entry point.

use std::sync::Arc;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use backoffice::api;
use backoffice::config::Config;
use backoffice::domain::events::EventPublisher;
use backoffice::notify::{LogNotifier, MessageComposer, Notifier, SmtpNotifier};
use backoffice::store::{MemoryStore, PgStore};
use backoffice::OrderWorkflow;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let notifier: Box<dyn Notifier> = match &config.smtp {
        Some(smtp) => {
            let notifier = SmtpNotifier::new(smtp)
                .map_err(|e| anyhow::anyhow!("invalid SMTP settings: {e}"))?;
            tracing::info!(host = %smtp.host, port = smtp.port, "Sending notifications over SMTP");
            Box::new(notifier)
        }
        None => {
            tracing::warn!("SMTP_HOST not set; notifications will only be logged");
            Box::new(LogNotifier)
        }
    };

    let nats = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "NATS unavailable; order events disabled");
                None
            }
        },
        None => None,
    };
    let events = EventPublisher::new(nats);
    let composer = MessageComposer::new(config.store_name.clone());

    let app = match &config.database_url {
        Some(url) => {
            let db = PgPoolOptions::new()
                .max_connections(config.max_connections)
                .connect(url)
                .await?;
            sqlx::migrate!("./migrations").run(&db).await?;
            let workflow = OrderWorkflow::new(PgStore::new(db.clone()), notifier, composer)
                .with_events(events);
            api::router(Arc::new(workflow), Some(db))
        }
        None => {
            tracing::warn!(
                "DATABASE_URL not set; using the in-memory order store, catalog screens disabled"
            );
            let workflow =
                OrderWorkflow::new(MemoryStore::new(), notifier, composer).with_events(events);
            api::router(Arc::new(workflow), None)
        }
    };

    tracing::info!("Back-office listening on 0.0.0.0:{}", config.port);
    axum::serve(tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?, app).await?;
    Ok(())
}
