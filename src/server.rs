//! TCP accept loop: one task per client.

use std::net::SocketAddr;
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::connection::{serve_connection, ServerContext};
use crate::registry::SessionRegistry;
use crate::store::{FileMatchStore, FileUserStore, UserStore};
use crate::transport::tcp::TcpTransport;

pub struct Server {
    listener: TcpListener,
    ctx: ServerContext,
}

impl Server {
    /// Bind with explicit collaborators.
    pub async fn bind(
        config: ServerConfig,
        registry: Arc<SessionRegistry>,
        users: Arc<dyn UserStore>,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(&config.bind).await?;
        Ok(Self {
            listener,
            ctx: ServerContext {
                registry,
                users,
                config: Arc::new(config),
            },
        })
    }

    /// Bind with file-backed stores under `config.data_dir`.
    pub async fn from_config(config: ServerConfig) -> anyhow::Result<Self> {
        let users = FileUserStore::open(config.data_dir.join("users.json"))?;
        let matches = FileMatchStore::new(config.data_dir.join("matches"));
        let registry = SessionRegistry::new(Arc::new(matches)).with_starter(config.starter);
        Self::bind(config, Arc::new(registry), Arc::new(users)).await
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn registry(&self) -> Arc<SessionRegistry> {
        self.ctx.registry.clone()
    }

    /// Accept clients forever. A failed accept is logged and skipped.
    pub async fn run(self) -> anyhow::Result<()> {
        info!("Listening on {}", self.local_addr()?);
        let config = self.ctx.config.clone();
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    warn!("Accept failed: {}", e);
                    continue;
                }
            };
            if let Err(e) = stream.set_nodelay(true) {
                debug!("set_nodelay on {}: {}", peer, e);
            }
            info!("Client connected from {}", peer);
            let transport =
                TcpTransport::with_timeouts(stream, Some(config.idle_timeout), config.write_timeout);
            let ctx = self.ctx.clone();
            tokio::spawn(async move {
                match serve_connection(transport, ctx).await {
                    Ok(()) => info!("Client {} closed the session", peer),
                    Err(e) => info!("Client {} dropped: {}", peer, e),
                }
            });
        }
    }
}
