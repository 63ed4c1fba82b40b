// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{env, process, sync::Arc, time::Duration};

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use firetail_logs::{
    constants::LOG_VERSION,
    flusher::{Flusher, FlusherConfig, LogShipper},
    http::build_client,
};
use firetail_pubsub::{
    access_token::AccessTokenSource,
    config::{Config, Mode},
    consumer::{Consumer, ConsumerConfig, DEFAULT_IDLE_BACKOFF},
    push_server::PushServer,
    subscriber::PubSubSubscriber,
};

const AGENT_HOST: &str = "0.0.0.0";
const PUBSUB_REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

#[tokio::main]
pub async fn main() {
    let log_level = env::var("FIRETAIL_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = format!("h2=off,hyper=off,rustls=off,reqwest=off,{}", log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let config = match Config::new() {
        Ok(c) => c,
        Err(e) => {
            error!("Error creating config on FireTail forwarder startup: {e}");
            process::exit(1);
        }
    };

    info!(
        "Starting FireTail GCP API Gateway forwarder (log version {LOG_VERSION}), shipping to {}",
        config.firetail_api
    );

    let flusher = match Flusher::new(FlusherConfig {
        app_key: config.app_token.clone(),
        endpoint: config.firetail_api.clone(),
        https_proxy: config.proxy_url.clone(),
        timeout: config.request_timeout,
    }) {
        Ok(flusher) => flusher,
        Err(e) => {
            error!("Error creating FireTail flusher: {e}");
            process::exit(1);
        }
    };
    let shipper: Arc<dyn LogShipper> = Arc::new(flusher);

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_shutdown(cancel.clone()));

    match config.mode.clone() {
        Mode::Pull {
            project_id,
            subscription_id,
            max_messages,
        } => {
            run_consumer(
                &config,
                &project_id,
                &subscription_id,
                max_messages,
                shipper,
                cancel,
            )
            .await;
        }
        Mode::Push { port } => run_push_server(&config, port, shipper, cancel).await,
    }
}

async fn run_consumer(
    config: &Config,
    project_id: &str,
    subscription_id: &str,
    max_messages: usize,
    shipper: Arc<dyn LogShipper>,
    cancel: CancellationToken,
) {
    let client = match build_client(config.proxy_url.as_deref(), PUBSUB_REQUEST_TIMEOUT) {
        Ok(client) => client,
        Err(e) => {
            error!("Error creating Pub/Sub client: {e}");
            process::exit(1);
        }
    };

    let access_token = if config.pubsub_emulator {
        debug!("Using Pub/Sub emulator at {}", config.pubsub_url);
        AccessTokenSource::Anonymous
    } else if let Some(token) = &config.access_token {
        AccessTokenSource::Static(token.clone())
    } else {
        AccessTokenSource::metadata(client.clone(), config.metadata_host.as_deref())
    };

    let subscriber = PubSubSubscriber::new(
        client,
        &config.pubsub_url,
        project_id,
        subscription_id,
        access_token,
    );
    let consumer = Consumer::new(
        Arc::new(subscriber),
        shipper,
        ConsumerConfig {
            max_messages,
            idle_backoff: DEFAULT_IDLE_BACKOFF,
        },
    );

    info!("Consuming projects/{project_id}/subscriptions/{subscription_id}");

    tokio::select! {
        res = consumer.run() => {
            if let Err(e) = res {
                error!("Consumer stopped, messages of the failed cycle will be redelivered: {e}");
                process::exit(1);
            }
        }
        () = cancel.cancelled() => info!("Shutting down consumer"),
    }
}

async fn run_push_server(
    config: &Config,
    port: u16,
    shipper: Arc<dyn LogShipper>,
    cancel: CancellationToken,
) {
    let listener = match TcpListener::bind((AGENT_HOST, port)).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Error binding push endpoint to port {port}: {e}");
            process::exit(1);
        }
    };
    info!("Push endpoint listening on port {port}");

    let server = PushServer::new(shipper)
        .with_max_request_content_length(config.max_request_content_length);
    if let Err(e) = server.serve(listener, cancel).await {
        error!("Push endpoint stopped: {e}");
        process::exit(1);
    }
}

async fn cancel_on_shutdown(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(e) => {
                    error!("Unable to listen for SIGTERM: {e}");
                    return;
                }
            };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = sigterm.recv() => {},
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("Shutdown signal received");
    cancel.cancel();
}
