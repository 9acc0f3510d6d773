//! Application state.

use anyhow::Context;
use axum::http::HeaderValue;
use std::future::Future;
use std::sync::Arc;
use taskpulse_core::ticker::{default_seed, RandomWalk};
use taskpulse_core::{ServerConfig, SessionHub, TaskStore, TickerCore};
use tokio::sync::watch;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub hub: SessionHub,
    pub ticker: Arc<TickerCore>,
    pub config: Arc<ServerConfig>,
    pub cors_origin: HeaderValue,
    closing: Arc<watch::Sender<bool>>,
}

impl AppState {
    /// Build state from configuration, with the default stock seed and a random walk.
    pub fn new(config: ServerConfig) -> anyhow::Result<Self> {
        let generator = RandomWalk::new(config.max_swing_percent);
        let ticker = TickerCore::new(default_seed(), Box::new(generator))?;
        Self::with_ticker(config, ticker)
    }

    /// Build state around an existing ticker.
    pub fn with_ticker(config: ServerConfig, ticker: TickerCore) -> anyhow::Result<Self> {
        config.validate()?;
        let cors_origin = HeaderValue::from_str(&config.cors_origin)
            .with_context(|| format!("Invalid CORS origin '{}'", config.cors_origin))?;
        let (closing, _) = watch::channel(false);

        Ok(Self {
            hub: SessionHub::new(Arc::new(TaskStore::new())),
            ticker: Arc::new(ticker),
            config: Arc::new(config),
            cors_origin,
            closing: Arc::new(closing),
        })
    }

    /// Tell long-lived connections (WebSocket sessions, SSE streams) to finish.
    pub fn begin_shutdown(&self) {
        self.closing.send_replace(true);
    }

    /// Resolves once [`AppState::begin_shutdown`] has been called.
    pub fn closed(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.closing.subscribe();
        async move {
            let _ = rx.wait_for(|closing| *closing).await;
        }
    }
}
