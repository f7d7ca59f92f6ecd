use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};

use standin_common::accept_retry_delay;

/// An HTTP application the bridge can drive
#[async_trait]
pub trait Application: Send + Sync + 'static {
    async fn handle(&self, request: Request<Incoming>) -> Response<Full<Bytes>>;
}

#[async_trait]
impl<A: Application + ?Sized> Application for Arc<A> {
    async fn handle(&self, request: Request<Incoming>) -> Response<Full<Bytes>> {
        (**self).handle(request).await
    }
}

/// Adapter turning an async closure into an [`Application`]
pub struct FnApplication<F>(F);

/// Wrap an async closure as an [`Application`]
pub fn application_fn<F, Fut>(f: F) -> FnApplication<F>
where
    F: Fn(Request<Incoming>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response<Full<Bytes>>> + Send + 'static,
{
    FnApplication(f)
}

#[async_trait]
impl<F, Fut> Application for FnApplication<F>
where
    F: Fn(Request<Incoming>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response<Full<Bytes>>> + Send + 'static,
{
    async fn handle(&self, request: Request<Incoming>) -> Response<Full<Bytes>> {
        (self.0)(request).await
    }
}

/// Serve `application` on every connection accepted by `listener`
///
/// Runs until the owning runtime shuts down.
pub(crate) async fn serve(listener: TcpListener, application: Arc<dyn Application>) {
    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                // Accept errors concern one pending connection or a
                // momentary resource shortage; the listener stays usable
                let delay = accept_retry_delay(&e);
                tracing::warn!("Bridge accept failed, retrying in {:?}: {}", delay, e);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                continue;
            }
        };

        let application = application.clone();
        tokio::spawn(serve_connection(stream, peer_addr, application));
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    application: Arc<dyn Application>,
) {
    let service = service_fn(move |req: Request<Incoming>| {
        let application = application.clone();
        async move { Ok::<_, Infallible>(application.handle(req).await) }
    });

    if let Err(e) = http1::Builder::new()
        .serve_connection(TokioIo::new(stream), service)
        .await
    {
        tracing::debug!("Application connection error from {}: {}", peer_addr, e);
    }
}
