//! Per-launcher socket nodes
//!
//! Every published launcher gets a Unix socket at
//! `<node_dir>/<node_prefix><minor>`. A connection is one session and end
//! of stream closes it. A stream socket keeps no write boundaries, so every
//! received byte is delivered as its own single-byte write. Nothing is ever
//! sent back.

use crate::config::DriverConfig;
use crate::error::DriverError;
use crate::launcher::{Interrupt, Registry, Session};
use parking_lot::Mutex;
use protocol::Minor;
use std::collections::HashMap;
use std::io::{self, Read};
use std::net::Shutdown;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::UnixListener;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Bytes read from the socket at a time
const CHUNK_SIZE: usize = 64;

/// Serve one session on `stream` until end of stream
pub fn serve_connection<R: Read>(
    registry: &Registry,
    minor: Minor,
    mut stream: R,
    interrupt: Interrupt,
) -> Result<(), DriverError> {
    let mut session = Session::open(registry, minor, interrupt)?;
    let mut buf = [0u8; CHUNK_SIZE];

    loop {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                for byte in buf[..n].chunks(1) {
                    if let Err(e) = session.write(byte) {
                        warn!("launcher{}: write failed: {} ({})", minor, e, e.code());
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                debug!("launcher{}: connection read failed: {}", minor, e);
                break;
            }
        }
    }

    session.close()
}

/// Open connections of one node, so they can be hung up
#[derive(Default)]
struct Connections {
    next_id: u64,
    open: HashMap<u64, (StdUnixStream, Interrupt)>,
}

impl Connections {
    fn hang_up_all(&mut self) {
        for (id, (stream, interrupt)) in self.open.drain() {
            interrupt.raise();
            if let Err(e) = stream.shutdown(Shutdown::Both) {
                debug!("session {}: hang-up failed: {}", id, e);
            }
        }
    }
}

struct Node {
    path: PathBuf,
    accept: JoinHandle<()>,
    connections: Arc<Mutex<Connections>>,
}

/// Creates and removes socket nodes as launchers come and go
pub struct NodeServer {
    registry: Arc<Registry>,
    config: DriverConfig,
    nodes: HashMap<Minor, Node>,
}

impl NodeServer {
    pub fn new(registry: Arc<Registry>, config: DriverConfig) -> Self {
        Self {
            registry,
            config,
            nodes: HashMap::new(),
        }
    }

    pub fn node_path(&self, minor: Minor) -> PathBuf {
        self.config.node_path(minor)
    }

    pub fn published(&self) -> Vec<Minor> {
        let mut minors: Vec<_> = self.nodes.keys().copied().collect();
        minors.sort();
        minors
    }

    /// Create the node for `minor` and start accepting sessions on it
    pub fn publish(&mut self, minor: Minor) -> io::Result<PathBuf> {
        if let Some(node) = self.nodes.get(&minor) {
            return Ok(node.path.clone());
        }

        let path = self.node_path(minor);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        remove_stale(&path)?;

        let listener = UnixListener::bind(&path)?;
        let connections = Arc::new(Mutex::new(Connections::default()));
        let accept = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&self.registry),
            minor,
            Arc::clone(&connections),
        ));

        info!("launcher{}: node {}", minor, path.display());
        self.nodes.insert(
            minor,
            Node {
                path: path.clone(),
                accept,
                connections,
            },
        );
        Ok(path)
    }

    /// Remove the node for `minor` and hang up its sessions
    pub fn unpublish(&mut self, minor: Minor) {
        let Some(node) = self.nodes.remove(&minor) else {
            return;
        };

        node.accept.abort();
        node.connections.lock().hang_up_all();
        if let Err(e) = std::fs::remove_file(&node.path)
            && e.kind() != io::ErrorKind::NotFound
        {
            warn!("Failed to remove {}: {}", node.path.display(), e);
        }
        info!("launcher{}: node removed", minor);
    }

    pub fn shutdown(&mut self) {
        for minor in self.published() {
            self.unpublish(minor);
        }
    }
}

fn remove_stale(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!("Removed stale node {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

async fn accept_loop(
    listener: UnixListener,
    registry: Arc<Registry>,
    minor: Minor,
    connections: Arc<Mutex<Connections>>,
) {
    loop {
        let stream = match listener.accept().await {
            Ok((stream, _)) => stream,
            Err(e) => {
                warn!("launcher{}: accept failed: {}", minor, e);
                continue;
            }
        };

        if let Err(e) = spawn_session(stream, &registry, minor, &connections) {
            warn!("launcher{}: could not start session: {}", minor, e);
        }
    }
}

fn spawn_session(
    stream: tokio::net::UnixStream,
    registry: &Arc<Registry>,
    minor: Minor,
    connections: &Arc<Mutex<Connections>>,
) -> io::Result<()> {
    let stream = stream.into_std()?;
    stream.set_nonblocking(false)?;
    let hang_up = stream.try_clone()?;
    let interrupt = Interrupt::new();

    let id = {
        let mut conns = connections.lock();
        let id = conns.next_id;
        conns.next_id += 1;
        conns.open.insert(id, (hang_up, interrupt.clone()));
        id
    };

    let registry = Arc::clone(registry);
    let connections = Arc::clone(connections);
    tokio::task::spawn_blocking(move || {
        debug!("launcher{}: session {} started", minor, id);
        if let Err(e) = serve_connection(&registry, minor, stream, interrupt) {
            warn!("launcher{}: session {} ended: {}", minor, id, e);
        }
        connections.lock().open.remove(&id);
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usb::mock::MockTransport;
    use std::io::{Cursor, Write};
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_each_byte_is_one_write() {
        let mock = Arc::new(MockTransport::new());
        let registry = Registry::new();
        let minor = registry.attach(mock.clone()).unwrap();

        serve_connection(&registry, minor, Cursor::new(vec![0x04, 0x20]), Interrupt::new())
            .unwrap();

        assert_eq!(
            mock.control_frames(),
            vec![
                vec![0x02, 0x04, 0, 0, 0, 0, 0, 0],
                vec![0x02, 0x20, 0, 0, 0, 0, 0, 0],
            ]
        );
        assert_eq!(registry.get(minor).unwrap().open_count(), 0);
    }

    #[test]
    fn test_unknown_minor_refused() {
        let registry = Registry::new();
        let result = serve_connection(&registry, Minor(4), Cursor::new(vec![0x20]), Interrupt::new());
        assert_eq!(result, Err(DriverError::NoDevice));
    }

    #[test]
    fn test_hang_up_raises_interrupts() {
        let (ours, peer) = StdUnixStream::pair().unwrap();
        drop(peer);
        let interrupt = Interrupt::new();

        let mut connections = Connections::default();
        connections.open.insert(0, (ours, interrupt.clone()));
        connections.hang_up_all();

        assert!(interrupt.is_raised());
        assert!(connections.open.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_socket_node_session() {
        let dir = TempDir::new().unwrap();
        let mut config = DriverConfig::default();
        config.driver.node_dir = dir.path().to_path_buf();

        let mock = Arc::new(MockTransport::new());
        let registry = Arc::new(Registry::new());
        let minor = registry.attach(mock.clone()).unwrap();

        let mut server = NodeServer::new(registry.clone(), config);
        let path = server.publish(minor).unwrap();
        assert_eq!(path, dir.path().join("launcher0"));

        let mut client = StdUnixStream::connect(&path).unwrap();
        client.write_all(&[0x08]).unwrap();
        drop(client);

        let mut frames = Vec::new();
        for _ in 0..100 {
            frames = mock.control_frames();
            if !frames.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(frames, vec![vec![0x02, 0x08, 0, 0, 0, 0, 0, 0]]);

        server.unpublish(minor);
        assert!(!path.exists());
        assert!(server.published().is_empty());
    }
}
