//! HTTP Server module
//!
//! HTTP/1.1 front end using Hyper and Tokio. Every request is routed and
//! dispatched through the [`Application`]; on Unix, SIGHUP reloads the route
//! table from the configuration file.

mod handler;

pub use handler::RequestHandler;

use crate::app::{Application, ControllerRegistry, Response as AppResponse};
use crate::config::Config;
use crate::router::RouterHandle;

use anyhow::Result;
use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// mvcroute HTTP Server
pub struct Server {
    config: Arc<Config>,
    config_path: Option<PathBuf>,
    app: Application,
}

impl Server {
    /// Create a server answering every target with a description of the
    /// matched route
    pub fn new(config: Config, config_path: Option<PathBuf>) -> Result<Self> {
        Self::with_controllers(config, config_path, inspection_controllers())
    }

    /// Create a server dispatching to the given controllers
    pub fn with_controllers(
        config: Config,
        config_path: Option<PathBuf>,
        controllers: ControllerRegistry,
    ) -> Result<Self> {
        let router = config.build_router()?;
        info!("Loaded {} routes", router.len());

        Ok(Self {
            config: Arc::new(config),
            config_path,
            app: Application::new(RouterHandle::new(router), controllers),
        })
    }

    pub fn application(&self) -> &Application {
        &self.app
    }

    /// Run the server
    pub async fn run(&self) -> Result<()> {
        let addr: SocketAddr = self.config.server.listen.parse()?;

        info!("Starting mvcroute on {}", addr);
        self.write_pid_file();

        #[cfg(unix)]
        {
            if let Some(path) = self.config_path.clone() {
                spawn_reload_task(path, self.app.router().clone())?;
            }
        }

        // Create TCP listener
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on http://{}", addr);

        let handler = Arc::new(RequestHandler::new(
            self.app.clone(),
            &self.config.application.base_path,
        ));

        // Accept connections
        loop {
            let (stream, remote_addr) = listener.accept().await?;
            debug!("Accepted connection from {}", remote_addr);

            let handler = handler.clone();

            tokio::spawn(async move {
                let io = TokioIo::new(stream);

                let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                    let handler = handler.clone();

                    async move { handle_request(req, remote_addr, handler).await }
                });

                let conn = http1::Builder::new()
                    .keep_alive(true)
                    .serve_connection(io, service);

                if let Err(e) = conn.await {
                    if !is_connection_closed_error(&e) {
                        error!("Connection error: {}", e);
                    }
                }
            });
        }
    }

    fn write_pid_file(&self) {
        let pid_file = &self.config.server.pid_file;
        if let Err(e) = std::fs::write(pid_file, std::process::id().to_string()) {
            warn!("Cannot write PID file {}: {}", pid_file, e);
        }
    }
}

/// Multi-threaded runtime sized by `server.workers`
pub fn build_runtime(config: &Config) -> std::io::Result<tokio::runtime::Runtime> {
    let workers = config.worker_threads();
    info!("Using {} worker threads", workers);

    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(workers)
        .enable_all()
        .build()
}

/// Reload the route table on SIGHUP. A configuration that fails to load
/// leaves the current table in place.
#[cfg(unix)]
fn spawn_reload_task(path: PathBuf, router: RouterHandle) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup())?;
    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            info!("SIGHUP received, reloading {:?}", path);
            match Config::load(&path).and_then(|config| config.build_router()) {
                Ok(table) => router.reload(table),
                Err(e) => error!("Reload failed, keeping current routes: {}", e),
            }
        }
    });
    Ok(())
}

/// Controllers used by the standalone binary: every target answers with
/// the matched route as JSON
pub fn inspection_controllers() -> ControllerRegistry {
    let mut controllers = ControllerRegistry::new();
    controllers.fallback(|ctx| {
        let body = serde_json::json!({
            "route": ctx.route_name(),
            "controller": ctx.controller(),
            "action": ctx.action(),
            "params": ctx.params(),
            "self": ctx.url("self", &Default::default()),
            "code": ctx.param_str("code"),
        });
        Ok(AppResponse::json(&body)?)
    });
    controllers
}

/// Check if error is just a closed connection (not worth logging)
fn is_connection_closed_error(e: &hyper::Error) -> bool {
    if e.is_incomplete_message() {
        return true;
    }
    if let Some(source) = e.source() {
        if let Some(io_err) = source.downcast_ref::<std::io::Error>() {
            return matches!(
                io_err.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
            );
        }
    }
    false
}

/// Handle incoming HTTP request
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    remote_addr: SocketAddr,
    handler: Arc<RequestHandler>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let start = std::time::Instant::now();

    debug!("{} {} from {}", method, uri, remote_addr);

    let response = match handler.handle(req).await {
        Ok(resp) => resp,
        Err(e) => {
            error!("Request handling error: {}", e);
            let mut resp = Response::new(Full::new(Bytes::from("Internal Server Error")));
            *resp.status_mut() = hyper::StatusCode::INTERNAL_SERVER_ERROR;
            resp
        }
    };

    let duration = start.elapsed();
    let status = response.status();

    info!(
        "{} {} {} {} {:?}",
        remote_addr,
        method,
        uri,
        status.as_u16(),
        duration
    );

    Ok(response)
}

use std::error::Error;
