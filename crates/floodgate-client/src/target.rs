//! Direct HTTP caller for local-first attempts.

use futures_util::future::BoxFuture;

use floodgate_core::step::{TargetCaller, TargetRequest, TargetResponse, TransportError};
use floodgate_types::error::FloodgateError;

/// [`TargetCaller`] backed by reqwest. Timeouts are per-request, taken
/// from the job's local-first strategy.
#[derive(Debug, Clone)]
pub struct DirectCaller {
    http: reqwest::Client,
}

impl DirectCaller {
    pub fn new() -> Result<Self, FloodgateError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|err| FloodgateError::Config(format!("http client: {err}")))?;
        Ok(Self { http })
    }

    async fn call_inner(&self, request: TargetRequest) -> Result<TargetResponse, TransportError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|_| TransportError::Other(format!("invalid method {:?}", request.method)))?;

        let mut builder = self
            .http
            .request(method, &request.url)
            .timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        match builder.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                let body = response
                    .text()
                    .await
                    .map_err(|err| TransportError::Other(format!("reading body: {err}")))?;
                Ok(TargetResponse { status, body })
            }
            Err(err) if err.is_timeout() => Err(TransportError::Timeout(request.timeout)),
            Err(err) if err.is_connect() => Err(TransportError::Connect(err.to_string())),
            Err(err) => Err(TransportError::Other(err.to_string())),
        }
    }
}

impl TargetCaller for DirectCaller {
    fn call(&self, request: TargetRequest) -> BoxFuture<'_, Result<TargetResponse, TransportError>> {
        Box::pin(self.call_inner(request))
    }
}
