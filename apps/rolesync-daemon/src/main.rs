//! rolesync daemon
//!
//! Wires the directory gateway, mirror store and notification hook into the
//! reconciliation engine, routes lifecycle events from the HTTP ingest to
//! it, and drains in-flight reconciliations on SIGTERM or Ctrl+C.

mod config;
mod ingest;
mod logging;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use config::Config;
use ingest::{ingest_router, IngestState};
use rolesync_directory::{DirectoryGateway, LdapDirectory};
use rolesync_engine::{
    EngineConfig, EventRouter, LogOnlyNotifier, NotificationSink, ReconciliationEngine,
    RoleRenamer, RouterConfig, ScriptNotifier,
};
use rolesync_mirror::MySqlMirror;
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

/// Capacity of the ingest-to-router channel.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[tokio::main]
async fn main() {
    // Fail fast on missing or invalid configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    logging::init_logging(&config.rust_log);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        listen = %config.listen_addr,
        concurrency = config.concurrency,
        ldap = %config.directory.server,
        base_dn = %config.directory.base_dn,
        "Starting rolesync"
    );

    // Directory
    let directory = match LdapDirectory::new(config.directory.clone()) {
        Ok(d) => Arc::new(d),
        Err(e) => {
            error!(error = %e, "Invalid directory configuration");
            std::process::exit(1);
        }
    };
    if let Err(e) = directory.ensure_structure().await {
        error!(error = %e, code = e.error_code(), "Failed to prepare directory structure");
        std::process::exit(1);
    }
    if let Err(e) = directory.ensure_placeholder().await {
        error!(error = %e, code = e.error_code(), "Failed to prepare placeholder entry");
        std::process::exit(1);
    }

    // Mirror
    let mirror = match MySqlMirror::connect(
        config.mirror.options.clone(),
        config.mirror.max_connections,
        Duration::from_secs(5),
    )
    .await
    {
        Ok(m) => Arc::new(m),
        Err(e) => {
            error!(error = %e, "Failed to connect to mirror database");
            std::process::exit(1);
        }
    };

    // Notifications
    let notifier: Arc<dyn NotificationSink> = match &config.hook {
        Some(hook) => {
            let mut script = ScriptNotifier::new(&hook.script);
            if let Some(interpreter) = &hook.interpreter {
                script = script.with_interpreter(interpreter.clone());
            }
            info!(script = %script.script().display(), "Role hook configured");
            Arc::new(script)
        }
        None => {
            warn!("ROLE_HOOK not set, transitions will only be logged");
            Arc::new(LogOnlyNotifier)
        }
    };

    let engine = Arc::new(
        ReconciliationEngine::new(
            directory.clone(),
            mirror.clone(),
            notifier.clone(),
            EngineConfig {
                posix: config.posix.clone(),
                mail_domain: config.mail_domain.clone(),
            },
        )
        .with_uid_allocator(Arc::new(config.uid_allocator)),
    );
    let renamer = Arc::new(RoleRenamer::new(
        directory.clone(),
        mirror.clone(),
        notifier,
    ));
    let router = EventRouter::new(
        engine,
        renamer,
        RouterConfig {
            concurrency: config.concurrency,
        },
    );

    // Shutdown fan-out: the HTTP server and the router both stop on it.
    let shutting_down = Arc::new(AtomicBool::new(false));
    let (stop_tx, stop_rx) = watch::channel(false);

    let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let router_task = tokio::spawn({
        let router = router.clone();
        let mut stop_rx = stop_rx.clone();
        async move {
            router
                .run(events_rx, async move {
                    let _ = stop_rx.wait_for(|stop| *stop).await;
                })
                .await;
        }
    });

    let app = ingest_router(IngestState::new(
        events_tx,
        config.lifecycle_token.as_str(),
        shutting_down.clone(),
    ));

    let listener = match tokio::net::TcpListener::bind(config.listen_addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind to address {}: {e}", config.listen_addr);
            std::process::exit(1);
        }
    };
    info!(addr = %config.listen_addr, "Lifecycle ingest listening");

    let server_stop = {
        let mut stop_rx = stop_rx;
        async move {
            let _ = stop_rx.wait_for(|stop| *stop).await;
        }
    };
    tokio::spawn(shutdown_signal(shutting_down, stop_tx));

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(server_stop)
        .await
    {
        error!("Server error: {e}");
    }

    if let Err(e) = router_task.await {
        error!(error = %e, "Router task failed");
    }

    directory.close().await;
    mirror.close().await;
    info!("rolesync shutdown complete");
}

/// Wait for Ctrl+C or SIGTERM, then flag shutdown to every component.
async fn shutdown_signal(shutting_down: Arc<AtomicBool>, stop: watch::Sender<bool>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }

    // Ingest answers 503 from here on; the router stops dispatching.
    shutting_down.store(true, Ordering::Release);
    let _ = stop.send(true);
}
