//! The accept loop and the per-connection I/O driver.
//!
//! This is the only place that touches sockets. Each connection task
//! shuttles bytes between its `TcpStream` and the state machine through
//! the driver contract: read into the input window, hand the count to
//! the machine, write out whatever the scatter view offers, report how
//! much was sent. Timeouts are enforced here; the machine itself never
//! waits.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::signal;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, trace, warn};

use crate::access::{AccessSink, DiscardSink, FileSink};
use crate::config::Config;
use crate::conn::Connection;
use crate::error::{ServerError, ServerResult};

pub struct Server {
    config: Arc<Config>,
    sink: Arc<dyn AccessSink>,
}

impl Server {
    pub fn new(config: Config) -> Self {
        let sink: Arc<dyn AccessSink> = if config.logfile_root.is_empty() {
            Arc::new(DiscardSink)
        } else {
            Arc::new(FileSink::new(&config.logfile_root))
        };
        Server { config: Arc::new(config), sink }
    }

    /// Bind the configured address and serve until a shutdown signal
    /// arrives.
    pub async fn run(&self) -> ServerResult<()> {
        let listener = TcpListener::bind(&self.config.listen_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: self.config.listen_addr.clone(),
                source,
            })?;
        info!("listening on {}", self.config.listen_addr);
        self.run_on(listener).await
    }

    /// Accept connections on an already-bound listener until a shutdown
    /// signal arrives. Connections that are mid-transaction at that
    /// point run to completion on their own tasks.
    pub async fn run_on(&self, listener: TcpListener) -> ServerResult<()> {
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let config = self.config.clone();
                            let sink = self.sink.clone();
                            tokio::spawn(async move {
                                handle_connection(stream, peer, config, sink).await;
                            });
                        }
                        Err(e) => {
                            warn!("accept failed: {}", e);
                        }
                    }
                }
                _ = shutdown_signal() => {
                    info!("shutdown signal received, no longer accepting connections");
                    break;
                }
            }
        }
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    config: Arc<Config>,
    sink: Arc<dyn AccessSink>,
) {
    let _ = stream.set_nodelay(true);
    let read_timeout = Duration::from_secs(config.network_read_timeout);
    let write_timeout = Duration::from_secs(config.network_write_timeout);
    let mut conn = Connection::new(config, sink, Some(peer));

    loop {
        // Drain whatever the machine has queued before asking for more
        // input; the scatter view stays valid only until the next call
        // into the machine.
        while conn.has_output() {
            let sent = {
                let view = conn.output_view();
                match timeout(write_timeout, stream.write_vectored(&view)).await {
                    Ok(Ok(n)) if n > 0 => n,
                    Ok(Ok(_)) | Ok(Err(_)) => {
                        debug!("write to {} failed, dropping connection", peer);
                        return;
                    }
                    Err(_) => {
                        debug!("write to {} timed out, dropping connection", peer);
                        return;
                    }
                }
            };
            conn.drop_output(sent);
        }

        if conn.is_terminated() {
            break;
        }

        let received = {
            let window = conn.input_window();
            match timeout(read_timeout, stream.read(window)).await {
                Ok(Ok(n)) => n,
                Ok(Err(e)) => {
                    debug!("read from {} failed: {}", peer, e);
                    return;
                }
                Err(_) => {
                    trace!("read from {} timed out, dropping connection", peer);
                    return;
                }
            }
        };
        if received == 0 {
            if conn.peer_closed() {
                trace!("peer {} closed an idle connection", peer);
            }
            continue; // drain anything still queued, then terminate
        }
        conn.append_input(received);
    }

    let _ = stream.shutdown().await;
    trace!("closing connection to {}", peer);
}
