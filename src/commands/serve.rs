use std::{convert::Infallible, net::SocketAddr, sync::Arc};

use clap::Args;
use eyre::Context;
use http::{Request, Response, StatusCode};
use hyper::{body::Incoming, server::conn::http1};
use hyper_util::{rt::TokioIo, service::TowerToHyperService};
use logwright::{
    config::ConfigManager,
    middleware::{RemoteAddr, RequestLogLayer},
    Registry,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;

use super::open_provider;

#[derive(Args, Debug)]
pub struct Cmd {
    #[arg(
        short,
        long,
        default_value = "127.0.0.1:8080",
        help = "Address to listen on."
    )]
    pub listen: SocketAddr,
}

impl Cmd {
    pub async fn run(&self, config: &impl ConfigManager) -> eyre::Result<()> {
        let provider = open_provider(config)?;
        let registry = Arc::new(
            Registry::from_settings(&provider.current()).context("Failed configuring loggers")?,
        );
        let follower = registry.follow(provider.subscribe());

        let listener = TcpListener::bind(self.listen)
            .await
            .with_context(|| format!("Failed binding {}", self.listen))?;
        tracing::info!(target: "logwright", "listening on {}", self.listen);

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = accepted.context("Failed accepting connection")?;
                    let service = ServiceBuilder::new()
                        .map_request(move |mut request: Request<Incoming>| {
                            request.extensions_mut().insert(RemoteAddr(peer));
                            request
                        })
                        .layer(RequestLogLayer::new(registry.clone()))
                        .service_fn(respond);

                    tokio::spawn(async move {
                        if let Err(err) = http1::Builder::new()
                            .serve_connection(TokioIo::new(stream), TowerToHyperService::new(service))
                            .await
                        {
                            tracing::debug!(target: "logwright", "connection from {} failed: {}", peer, err);
                        }
                    });
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!(target: "logwright", "shutting down");
                    break;
                }
            }
        }

        follower.abort();
        registry.flush();
        Ok(())
    }
}

async fn respond(request: Request<Incoming>) -> Result<Response<String>, Infallible> {
    let (status, body) = match request.uri().path() {
        "/" => (StatusCode::OK, "ok\n".to_string()),
        path => (StatusCode::NOT_FOUND, format!("{} not found\n", path)),
    };

    let mut response = Response::new(body);
    *response.status_mut() = status;
    Ok(response)
}
