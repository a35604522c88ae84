use actix_files::Files;
use actix_web::{web, App, HttpServer};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::config::Config;
use crate::library::Library;
use crate::web::handlers::routes;

pub async fn run_server(
    config: &Config,
    library: web::Data<Library>,
    shutdown_signal: Arc<Notify>,
) -> std::io::Result<()> {
    let addr = format!("{}:{}", config.host, config.port)
        .parse::<SocketAddr>()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    let static_dir = config.static_dir.is_dir().then(|| config.static_dir.clone());
    match &static_dir {
        Some(dir) => info!("Serving front-end from {}", dir.display()),
        None => warn!(
            "Static directory {} not found, serving API only",
            config.static_dir.display()
        ),
    }

    let server = HttpServer::new(move || {
        let mut app = App::new().app_data(library.clone()).configure(routes);
        // Registered last so the API routes take precedence.
        if let Some(dir) = &static_dir {
            app = app.service(Files::new("/", dir).index_file("index.html"));
        }
        app
    })
    .bind(addr)?;

    info!("Starting clip server on: {addr}");

    let server_handle = server.run();

    tokio::select! {
        result = server_handle => result,
        _ = shutdown_signal.notified() => {
            info!("Shutdown signal received, stopping web server");
            Ok(())
        }
    }
}
