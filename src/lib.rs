// Declare the modules
pub mod api;
pub mod commands;
pub mod config;
pub mod controller;
pub mod error;
pub mod history;
pub mod models;
pub mod notifications;
pub mod presentation;
pub mod rate_limit;
pub mod single_flight;
pub mod state;

#[cfg(test)]
pub(crate) mod test_support;

use crate::api::{HttpGateway, RemoteGateway};
use crate::commands::TerminalSurface;
use crate::config::AppConfig;
use crate::presentation::{NoopTypesetter, PlainTextRenderer};
use anyhow::{Context, Result};
use state::AppState;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;

pub fn run() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let config = AppConfig::from_env()?;

    // All state changes happen between awaits on one thread
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    runtime.block_on(async move {
        let gateway: Arc<dyn RemoteGateway> =
            Arc::new(HttpGateway::new(&config.gateway_url, config.request_timeout)?);

        let app_state = AppState::new(
            config,
            gateway,
            Arc::new(TerminalSurface),
            Arc::new(PlainTextRenderer),
            Arc::new(NoopTypesetter),
        );

        let input = Arc::new(Mutex::new(BufReader::new(tokio::io::stdin()).lines()));
        commands::run_loop(app_state, input).await
    })
}
