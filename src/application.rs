use crate::config::Settings;
use crate::infrastructure::log_messages::application as messages;
use crate::infrastructure::{Database, LogSink, PostgresLogSink, TracingLogSink};
use crate::proxy::{AuditPath, DiagnosticsReporter, ProxyService};
use crate::Result;
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, instrument, warn};

/// Main application struct that coordinates all components
pub struct Application {
    database: Option<Database>,
    listener: TcpListener,
    router: Router,
    reporter: DiagnosticsReporter,
}

impl Application {
    /// Build the application from the process environment
    pub async fn new() -> Result<Self> {
        Self::build(Settings::new()?).await
    }

    /// Connect storage, assemble the proxy and bind the listener
    #[instrument(skip_all)]
    pub async fn build(settings: Settings) -> Result<Self> {
        info!("{}", messages::STARTING);

        let proxy_config = settings.proxy_config()?;
        if proxy_config.control_token.is_none() {
            warn!("{}", messages::NO_CONTROL_TOKEN);
        }

        let (sink, database): (Arc<dyn LogSink>, Option<Database>) = match settings.database_url()
        {
            Some(url) => {
                let database = Database::connect(url, settings.database.max_connections).await?;
                database.health_check().await?;
                if settings.database.run_migrations {
                    database.run_migrations().await?;
                }
                let sink = PostgresLogSink::new(database.pool().clone());
                (Arc::new(sink), Some(database))
            }
            None => {
                warn!("{}", messages::NO_DATABASE);
                (Arc::new(TracingLogSink), None)
            }
        };

        let (audit, reporter) = AuditPath::new(sink, &settings.audit_config());
        let router = ProxyService::new(proxy_config, audit)?.into_router();
        let listener = TcpListener::bind(settings.listen_address()).await?;

        Ok(Self {
            database,
            listener,
            router,
            reporter,
        })
    }

    pub fn database(&self) -> Option<&Database> {
        self.database.as_ref()
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until Ctrl-C or SIGTERM
    pub async fn run(self) -> Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Serve until `shutdown` resolves, then drain in-flight connections
    #[instrument(skip_all)]
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let address = self.local_addr()?;
        let reporter = tokio::spawn(self.reporter.run());

        info!(address = %address, "{}", messages::LISTENING);
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        // The reporter stops once every sender is gone with the router
        if let Err(join_error) = reporter.await {
            error!(error = %join_error, "Diagnostics reporter failed");
        }

        info!("{}", messages::STOPPED);
        Ok(())
    }
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            error!(error = %error, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(error) => {
                error!(error = %error, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("{}", messages::SHUTDOWN_SIGNAL);
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::Map;

    fn local_settings() -> Settings {
        let vars: Map<String, String> = [
            ("AUDIT_PROXY__APPLICATION__HOST", "127.0.0.1"),
            ("PORT", "0"),
            ("TARGET", "http://127.0.0.1:9/"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        Settings::from_env(vars).unwrap()
    }

    #[tokio::test]
    async fn test_application_without_database_uses_tracing_sink() {
        let app = Application::build(local_settings()).await.unwrap();

        assert!(app.database().is_none());
        assert_ne!(app.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn test_application_stops_on_shutdown() {
        let app = Application::build(local_settings()).await.unwrap();
        let (stop, stopped) = tokio::sync::oneshot::channel::<()>();

        let server = tokio::spawn(app.run_until(async {
            let _ = stopped.await;
        }));
        stop.send(()).unwrap();

        let result = tokio::time::timeout(std::time::Duration::from_secs(5), server)
            .await
            .expect("server should stop")
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_target_fails_build() {
        let mut settings = local_settings();
        settings.proxy.target = "upstream.example".to_string();

        assert!(matches!(
            Application::build(settings).await,
            Err(crate::Error::InvalidSetting { .. })
        ));
    }
}
