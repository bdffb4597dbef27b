// HTTP server bootstrap shared by both services

use crate::api::{auth, middleware};
use crate::util::env::{env_opt, init_env};
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};

pub struct ApiServer {
    pub host: String,
    pub port: u16,
    /// Bearer token required on every route except `/health`
    pub api_secret: Option<String>,
}

impl ApiServer {
    /// Create server from environment variables
    pub fn from_env() -> Result<Self> {
        init_env();

        let host = env_opt("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = env_opt("PORT")
            .unwrap_or_else(|| "8080".to_string())
            .trim()
            .parse()
            .context("Invalid PORT")?;

        Ok(Self {
            host,
            port,
            api_secret: env_opt("API_SECRET"),
        })
    }

    /// Bind and serve until shutdown.
    pub async fn run<F>(self, service: &'static str, configure: F) -> Result<()>
    where
        F: Fn(&mut web::ServiceConfig) + Clone + Send + 'static,
    {
        let bind_addr = format!("{}:{}", self.host, self.port);

        tracing::info!(
            service,
            host = %self.host,
            port = %self.port,
            auth = self.api_secret.is_some(),
            "starting HTTP server"
        );

        let api_secret = self.api_secret.clone();
        HttpServer::new(move || {
            App::new()
                .wrap(auth::Auth::new(api_secret.clone()))
                .wrap(middleware::request_logger())
                .configure(configure.clone())
        })
        .bind(&bind_addr)
        .with_context(|| format!("Failed to bind to {}", bind_addr))?
        .run()
        .await
        .context("HTTP server error")?;

        Ok(())
    }
}
