use crate::handler::DebugService;
use debugd_core::DebugdError;
use debugd_core::config::ServerConfig;
use debugd_observability::{AccessLogBuffer, AccessLogStore};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

/// Shared state across all worker threads.
///
/// The access log behind `service` is the ONLY shared mutable state.
pub struct SharedState {
    pub service: Arc<DebugService>,
    pub config: Arc<ServerConfig>,
}

impl SharedState {
    /// Wire a fresh access ring sized from the config.
    pub fn new(config: ServerConfig) -> Arc<Self> {
        let access_log: Arc<dyn AccessLogStore> =
            Arc::new(AccessLogBuffer::new(config.log_capacity));
        Self::with_access_log(config, access_log)
    }

    pub fn with_access_log(config: ServerConfig, access_log: Arc<dyn AccessLogStore>) -> Arc<Self> {
        Arc::new(Self {
            service: Arc::new(DebugService::new(access_log)),
            config: Arc::new(config),
        })
    }
}

type BindResult = Result<SocketAddr, DebugdError>;

/// Running worker threads and the address the first of them bound.
///
/// With port 0 each worker gets its own ephemeral port, so only run a
/// single worker in that case.
pub struct Workers {
    pub local_addr: SocketAddr,
    pub handles: Vec<std::thread::JoinHandle<()>>,
}

/// Spawn monoio worker threads, one per core.
///
/// Each thread runs an independent monoio runtime with its own
/// TCP listener (via SO_REUSEPORT) and event loop. Returns once every
/// worker has bound its listener; the first bind failure is returned
/// instead.
pub fn spawn_workers(
    shared: Arc<SharedState>,
    num_workers: usize,
) -> anyhow::Result<Workers> {
    let listen_addr = shared.config.listen_addr();
    let num_workers = num_workers.max(1);
    let (ready_tx, ready_rx) = crossbeam_channel::bounded::<BindResult>(num_workers);
    let mut handles = Vec::with_capacity(num_workers);

    for worker_id in 0..num_workers {
        let shared = Arc::clone(&shared);
        let ready = ready_tx.clone();

        let handle = std::thread::Builder::new()
            .name(format!("debugd-worker-{}", worker_id))
            .spawn(move || {
                let mut rt = match monoio::RuntimeBuilder::<monoio::FusionDriver>::new()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        let _ = ready.send(Err(DebugdError::Io(e)));
                        return;
                    }
                };

                rt.block_on(worker_loop(worker_id, shared, listen_addr, ready));
            })?;

        handles.push(handle);
    }
    drop(ready_tx);

    let mut local_addr = None;
    for _ in 0..num_workers {
        let bound = ready_rx.recv()??;
        local_addr.get_or_insert(bound);
    }
    let local_addr = local_addr.unwrap_or(listen_addr);

    info!(workers = num_workers, addr = %local_addr, "Workers spawned");
    Ok(Workers { local_addr, handles })
}

/// Main loop for a single worker thread.
///
/// Every accepted connection becomes its own task on this thread's runtime.
async fn worker_loop(
    worker_id: usize,
    shared: Arc<SharedState>,
    addr: SocketAddr,
    ready: crossbeam_channel::Sender<BindResult>,
) {
    use monoio::net::{ListenerConfig, TcpListener};

    // Every worker joins the same SO_REUSEPORT group on `addr`.
    let listener_config = ListenerConfig::default().reuse_port(true).backlog(1024);
    let listener = match TcpListener::bind_with_config(addr, &listener_config) {
        Ok(listener) => listener,
        Err(e) => {
            let _ = ready.send(Err(DebugdError::Bind {
                addr: addr.to_string(),
                source: e,
            }));
            return;
        }
    };
    let local_addr = listener.local_addr().unwrap_or(addr);
    let _ = ready.send(Ok(local_addr));
    drop(ready);

    info!(worker = worker_id, addr = %local_addr, "Worker listening");

    loop {
        match listener.accept().await {
            Ok((stream, peer_addr)) => {
                // TCP_NODELAY: disable Nagle's for lowest latency
                let _ = stream.set_nodelay(true);

                let service = Arc::clone(&shared.service);

                monoio::spawn(async move {
                    if let Err(e) =
                        crate::connection::handle_connection(stream, peer_addr, service).await
                    {
                        tracing::debug!(error = %e, "Connection closed");
                    }
                });
            }
            Err(e) => {
                error!(worker = worker_id, error = %e, "Accept error");
            }
        }
    }
}
