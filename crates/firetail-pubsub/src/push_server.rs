// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP endpoint receiving one pushed Pub/Sub message per request.
//!
//! The status code is the acknowledgement: `200` once the log is accepted by
//! FireTail, `400` for bodies that are not a log event, `500` when delivery
//! failed. Push subscriptions redeliver on anything but success.

use std::io;
use std::sync::Arc;

use firetail_logs::flusher::LogShipper;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{http, Method, Request, StatusCode};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::EventError;
use crate::event::handle_event;
use crate::http_utils::{log_and_create_http_response, HttpResponse};

pub const DEFAULT_MAX_REQUEST_CONTENT_LENGTH: usize = 10 * 1024 * 1024;

pub struct PushServer {
    shipper: Arc<dyn LogShipper>,
    max_request_content_length: usize,
}

impl PushServer {
    #[must_use]
    pub fn new(shipper: Arc<dyn LogShipper>) -> Self {
        PushServer {
            shipper,
            max_request_content_length: DEFAULT_MAX_REQUEST_CONTENT_LENGTH,
        }
    }

    #[must_use]
    pub fn with_max_request_content_length(mut self, max_request_content_length: usize) -> Self {
        self.max_request_content_length = max_request_content_length;
        self
    }

    /// Accepts connections on `listener` until `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns non-transient accept errors.
    pub async fn serve(&self, listener: TcpListener, cancel: CancellationToken) -> io::Result<()> {
        let shipper = Arc::clone(&self.shipper);
        let max_request_content_length = self.max_request_content_length;
        let service = service_fn(move |req| {
            Self::event_endpoint_handler(req, Arc::clone(&shipper), max_request_content_length)
        });

        if let Ok(addr) = listener.local_addr() {
            debug!("Push endpoint listening on {addr}");
        }

        let server = hyper::server::conn::http1::Builder::new();
        let mut joinset = tokio::task::JoinSet::new();

        loop {
            let conn = tokio::select! {
                con_res = listener.accept() => match con_res {
                    Err(e)
                        if matches!(
                            e.kind(),
                            io::ErrorKind::ConnectionAborted
                                | io::ErrorKind::ConnectionReset
                                | io::ErrorKind::ConnectionRefused
                        ) =>
                    {
                        continue;
                    }
                    Err(e) => {
                        error!("Server error: {e}");
                        return Err(e);
                    }
                    Ok((conn, _)) => conn,
                },
                finished = async {
                    match joinset.join_next().await {
                        Some(finished) => finished,
                        None => std::future::pending().await,
                    }
                } => match finished {
                    Err(e) if e.is_panic() => {
                        error!("Connection handler panicked: {:?}", e);
                        continue;
                    },
                    Ok(()) | Err(_) => continue,
                },
                () = cancel.cancelled() => {
                    debug!("Push endpoint shutting down");
                    return Ok(());
                },
            };
            let conn = hyper_util::rt::TokioIo::new(conn);
            let server = server.clone();
            let service = service.clone();
            joinset.spawn(async move {
                if let Err(e) = server.serve_connection(conn, service).await {
                    error!("Connection error: {e}");
                }
            });
        }
    }

    async fn event_endpoint_handler(
        req: Request<Incoming>,
        shipper: Arc<dyn LogShipper>,
        max_request_content_length: usize,
    ) -> http::Result<HttpResponse> {
        if req.method() != Method::POST {
            return log_and_create_http_response(
                &format!("Unsupported method {} for push endpoint", req.method()),
                StatusCode::METHOD_NOT_ALLOWED,
            );
        }

        let body = match Limited::new(req.into_body(), max_request_content_length)
            .collect()
            .await
        {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
                return log_and_create_http_response(
                    "Error reading push request: Payload too large",
                    StatusCode::PAYLOAD_TOO_LARGE,
                );
            }
            Err(e) => {
                return log_and_create_http_response(
                    &format!("Error reading push request: {e}"),
                    StatusCode::BAD_REQUEST,
                );
            }
        };

        match handle_event(shipper.as_ref(), &body).await {
            Ok(_) => log_and_create_http_response("Shipped log to FireTail", StatusCode::OK),
            Err(err @ (EventError::Envelope(_) | EventError::Decode(_))) => {
                log_and_create_http_response(
                    &format!("Error processing event: {err}"),
                    StatusCode::BAD_REQUEST,
                )
            }
            Err(err @ EventError::Delivery(_)) => log_and_create_http_response(
                &format!("Error processing event: {err}"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        }
    }
}
