//! HTTP access to the remote API.
//!
//! [`HttpTransport`] performs single exchanges for the client, [`HttpProbe`]
//! answers whether the remote side is reachable at all.

use std::time::Duration;

use futures::future::BoxFuture;
use tether_engine::{
    ConnectivityProbe, Method, Transport, TransportError, TransportRequest, TransportResponse,
    TransportResult,
};

/// Timeout of a single reachability check.
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

fn to_reqwest(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}

fn classify(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else if err.is_builder() {
        TransportError::InvalidTarget(err.to_string())
    } else {
        TransportError::Io(err.to_string())
    }
}

/// [`Transport`] over `reqwest`, resolving targets against a base URL.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Create a transport for `base_url` with a per-attempt `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// The absolute URL for `target`.
    pub fn url_for(&self, target: &str) -> TransportResult<String> {
        if !target.starts_with('/') {
            return Err(TransportError::InvalidTarget(target.to_string()));
        }
        Ok(format!("{}{}", self.base_url, target))
    }

    /// A probe checking the same upstream.
    pub fn probe(&self) -> HttpProbe {
        HttpProbe {
            http: self.http.clone(),
            url: format!("{}/health", self.base_url),
        }
    }
}

impl Transport for HttpTransport {
    fn call<'a>(
        &'a self,
        target: &'a str,
        request: &'a TransportRequest,
    ) -> BoxFuture<'a, TransportResult<TransportResponse>> {
        Box::pin(async move {
            let url = self.url_for(target)?;

            let mut builder = self.http.request(to_reqwest(request.method), &url);
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }

            let response = builder.send().await.map_err(classify)?;
            let status = response.status().as_u16();
            let body = response.bytes().await.map_err(classify)?;

            tracing::debug!(method = %request.method, url = %url, status, "upstream exchange");
            Ok(TransportResponse {
                status,
                body: body.to_vec(),
            })
        })
    }
}

/// Reachability check against `GET {base}/health`.
///
/// Any HTTP response counts as reachable; only failing to get one does not.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    http: reqwest::Client,
    url: String,
}

impl ConnectivityProbe for HttpProbe {
    fn check(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            match self.http.get(&self.url).timeout(PROBE_TIMEOUT).send().await {
                Ok(_) => true,
                Err(e) => {
                    tracing::debug!(url = %self.url, error = %e, "probe failed");
                    false
                }
            }
        })
    }
}
