//! Network execution of `HttpRequest` values.
//!
//! # Design
//! The client never opens sockets itself. A `Transport` takes the plain-data
//! request and returns the plain-data response, reporting only failures where
//! no HTTP response was read. Every status code, 5xx included, comes back as
//! `Ok(HttpResponse)` so the client can normalize it.

use std::time::Duration;

use crate::error::TransportError;
use crate::http::{HttpRequest, HttpResponse};

pub trait Transport: Send + Sync {
    fn execute(&self, request: &HttpRequest, timeout: Duration) -> Result<HttpResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn execute(&self, request: &HttpRequest, timeout: Duration) -> Result<HttpResponse, TransportError> {
        (**self).execute(request, timeout)
    }
}

#[cfg(feature = "ureq")]
pub use self::blocking::UreqTransport;

#[cfg(feature = "ureq")]
mod blocking {
    use std::time::Duration;

    use ureq::http;

    use super::Transport;
    use crate::error::TransportError;
    use crate::http::{HttpRequest, HttpResponse};

    /// Blocking transport backed by a `ureq` agent.
    ///
    /// Redirects are not followed and status codes are never turned into
    /// errors.
    #[derive(Clone)]
    pub struct UreqTransport {
        timeout: Duration,
        agent: ureq::Agent,
    }

    impl UreqTransport {
        pub fn new(timeout: Duration) -> Self {
            Self {
                timeout,
                agent: agent(timeout),
            }
        }
    }

    impl Default for UreqTransport {
        fn default() -> Self {
            Self::new(crate::config::DEFAULT_TIMEOUT)
        }
    }

    fn agent(timeout: Duration) -> ureq::Agent {
        ureq::Agent::config_builder()
            .http_status_as_error(false)
            .max_redirects(0)
            .timeout_global(Some(timeout))
            .build()
            .new_agent()
    }

    impl Transport for UreqTransport {
        fn execute(
            &self,
            request: &HttpRequest,
            timeout: Duration,
        ) -> Result<HttpResponse, TransportError> {
            // Reuse the pooled agent unless the caller asks for another timeout.
            let custom;
            let agent = if timeout == self.timeout {
                &self.agent
            } else {
                custom = agent(timeout);
                &custom
            };

            let mut builder = http::Request::builder()
                .method(request.method.as_str())
                .uri(request.url.as_str());
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }

            let result = match &request.body {
                Some(body) => builder
                    .body(body.clone())
                    .map_err(|e| TransportError::Other(e.to_string()))
                    .and_then(|req| agent.run(req).map_err(classify)),
                None => builder
                    .body(())
                    .map_err(|e| TransportError::Other(e.to_string()))
                    .and_then(|req| agent.run(req).map_err(classify)),
            };
            let mut response = result?;

            let status = response.status().as_u16();
            let headers = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.as_str().to_string(), v.to_string()))
                })
                .collect();
            let body = response
                .body_mut()
                .read_to_string()
                .map_err(classify)?;

            Ok(HttpResponse {
                status,
                headers,
                body,
            })
        }
    }

    fn classify(err: ureq::Error) -> TransportError {
        match err {
            ureq::Error::Timeout(_)
            | ureq::Error::Io(_)
            | ureq::Error::HostNotFound
            | ureq::Error::ConnectionFailed => TransportError::NoResponse(err.to_string()),
            other => TransportError::Other(other.to_string()),
        }
    }
}
