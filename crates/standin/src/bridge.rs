//! Synchronous bridge over a single-threaded tokio runtime
//!
//! The bridge owns a current-thread runtime, binds the application under
//! test to an ephemeral loopback port on it, and lets plain (non-async)
//! test code issue requests against it. The runtime only runs while a
//! request is in flight: each call drives it until the response has been
//! read or the request deadline passes, then hands control back.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use tokio::net::TcpListener;
use tokio::runtime::{Handle, Runtime};
use url::Url;

use standin_common::encode_query;

use crate::application::{serve, Application};
use crate::completion::{run_with_deadline, Outcome};
use crate::config::BridgeConfig;
use crate::error::BridgeError;

/// Lifecycle of a [`Bridge`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BridgeState {
    Idle,
    Started,
    /// A request is in flight
    Waiting,
    Stopped,
}

/// Per-request options
#[derive(Clone, Debug, Default)]
pub struct RequestOptions {
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    /// Extra query parameters, appended sorted
    pub query: Vec<(String, String)>,
    /// Overrides the configured request timeout
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header; invalid names or values are skipped with a warning
    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => tracing::warn!("Skipping invalid header {:?}: {:?}", name, value),
        }
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A fully read response from the application under test
#[derive(Clone, Debug)]
pub struct BridgeResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Final URL of the request
    pub url: Url,
}

impl BridgeResponse {
    async fn read(response: reqwest::Response) -> Result<Self, reqwest::Error> {
        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body = response.bytes().await?;
        Ok(Self {
            status,
            headers,
            body,
            url,
        })
    }

    /// Body as text (invalid UTF-8 is replaced)
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}

/// Everything that exists between `start` and `stop`
struct Running {
    runtime: Runtime,
    client: reqwest::Client,
    url_root: Url,
    local_addr: SocketAddr,
}

/// Drives an async [`Application`] from synchronous test code
///
/// ```no_run
/// use standin::{application_fn, Bridge, BridgeConfig, RequestOptions};
/// use bytes::Bytes;
/// use http_body_util::Full;
///
/// let mut bridge = Bridge::new(BridgeConfig::default());
/// bridge
///     .start(application_fn(|_req| async {
///         hyper::Response::new(Full::new(Bytes::from("hello")))
///     }))
///     .unwrap();
///
/// let response = bridge.get("/index", RequestOptions::new()).unwrap();
/// assert_eq!(response.text(), "hello");
/// bridge.stop().unwrap();
/// ```
///
/// Requests are strictly sequential. The bridge must not be used from
/// inside an async context, since it blocks the calling thread.
pub struct Bridge {
    config: BridgeConfig,
    state: BridgeState,
    running: Option<Running>,
}

impl Bridge {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            state: BridgeState::Idle,
            running: None,
        }
    }

    /// Bridge configured from the environment
    pub fn from_env() -> Self {
        Self::new(BridgeConfig::from_env())
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn state(&self) -> BridgeState {
        self.state
    }

    /// Bind an ephemeral port and attach `application` to it
    pub fn start<A: Application>(&mut self, application: A) -> Result<(), BridgeError> {
        match self.state {
            BridgeState::Idle => {}
            BridgeState::Started | BridgeState::Waiting => return Err(BridgeError::AlreadyStarted),
            BridgeState::Stopped => return Err(BridgeError::Stopped),
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let listener = std::net::TcpListener::bind((self.config.bind_host, 0))?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;
        let url_root = Url::parse(&format!("http://{}/", local_addr))?;

        let listener = {
            let _guard = runtime.enter();
            TcpListener::from_std(listener)?
        };
        let client = reqwest::Client::builder().no_proxy().build()?;

        let application: Arc<dyn Application> = Arc::new(application);
        runtime.spawn(serve(listener, application));

        tracing::info!("Bridge started on {}", local_addr);
        self.running = Some(Running {
            runtime,
            client,
            url_root,
            local_addr,
        });
        self.state = BridgeState::Started;
        Ok(())
    }

    /// Shut the runtime down and release every socket it owns
    pub fn stop(&mut self) -> Result<(), BridgeError> {
        match self.state {
            BridgeState::Started => {}
            BridgeState::Idle => return Err(BridgeError::NotStarted),
            BridgeState::Waiting => return Err(BridgeError::AlreadyStarted),
            BridgeState::Stopped => return Err(BridgeError::Stopped),
        }

        if let Some(running) = self.running.take() {
            drop(running.client);
            running.runtime.shutdown_timeout(Duration::from_millis(100));
            tracing::info!("Bridge on {} stopped", running.local_addr);
        }
        self.state = BridgeState::Stopped;
        Ok(())
    }

    /// Root URL of the application under test, e.g. `http://127.0.0.1:4321/`
    pub fn url_root(&self) -> Option<&Url> {
        self.running.as_ref().map(|running| &running.url_root)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|running| running.local_addr)
    }

    /// Handle to the bridge runtime, for attaching other servers to it
    pub fn handle(&self) -> Result<Handle, BridgeError> {
        self.running
            .as_ref()
            .map(|running| running.runtime.handle().clone())
            .ok_or(match self.state {
                BridgeState::Stopped => BridgeError::Stopped,
                _ => BridgeError::NotStarted,
            })
    }

    /// Issue a request and block until it completes or times out
    ///
    /// `path` may be relative to the URL root or an absolute URL. A timeout
    /// is a hard failure ([`BridgeError::Timeout`]); nothing is retried.
    pub fn request(
        &mut self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<BridgeResponse, BridgeError> {
        let running = match self.state {
            BridgeState::Started => self.running.as_ref().ok_or(BridgeError::NotStarted)?,
            BridgeState::Idle => return Err(BridgeError::NotStarted),
            BridgeState::Waiting => return Err(BridgeError::AlreadyStarted),
            BridgeState::Stopped => return Err(BridgeError::Stopped),
        };

        let mut url = running.url_root.join(path)?;
        if !options.query.is_empty() {
            let extra = encode_query(options.query.iter().map(|(k, v)| (k, v)));
            let query = match url.query() {
                Some(existing) if !existing.is_empty() => format!("{}&{}", existing, extra),
                _ => extra,
            };
            url.set_query(Some(&query));
        }

        let timeout = options.timeout.unwrap_or(self.config.request_timeout);
        let mut builder = running
            .client
            .request(method.clone(), url.clone())
            .headers(options.headers);
        if let Some(body) = options.body {
            builder = builder.body(body);
        }

        tracing::debug!("Bridge request: {} {}", method, url);
        self.state = BridgeState::Waiting;
        let outcome = run_with_deadline(&running.runtime, timeout, async move {
            match builder.send().await {
                Ok(response) => BridgeResponse::read(response).await,
                Err(e) => Err(e),
            }
        });
        self.state = BridgeState::Started;

        match outcome {
            Outcome::Completed(result) => {
                let response = result?;
                tracing::debug!("Bridge response: {} {} -> {}", method, url, response.status);
                Ok(response)
            }
            Outcome::TimedOut => {
                tracing::warn!("Bridge request {} {} timed out after {:?}", method, url, timeout);
                Err(BridgeError::Timeout {
                    method,
                    url: url.to_string(),
                    after: timeout,
                })
            }
            Outcome::Abandoned => Err(BridgeError::Abandoned {
                method,
                url: url.to_string(),
            }),
        }
    }

    /// Issue a `DELETE` request
    pub fn delete(&mut self, path: &str, options: RequestOptions) -> Result<BridgeResponse, BridgeError> {
        self.request(Method::DELETE, path, options)
    }

    /// Issue a `GET` request
    pub fn get(&mut self, path: &str, options: RequestOptions) -> Result<BridgeResponse, BridgeError> {
        self.request(Method::GET, path, options)
    }

    /// Issue a `POST` request
    pub fn post(
        &mut self,
        path: &str,
        body: impl Into<Bytes>,
        options: RequestOptions,
    ) -> Result<BridgeResponse, BridgeError> {
        self.request(Method::POST, path, options.body(body))
    }

    /// Issue a `PUT` request
    pub fn put(
        &mut self,
        path: &str,
        body: impl Into<Bytes>,
        options: RequestOptions,
    ) -> Result<BridgeResponse, BridgeError> {
        self.request(Method::PUT, path, options.body(body))
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        if self.state == BridgeState::Started {
            let _ = self.stop();
        }
    }
}
