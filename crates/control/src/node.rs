//! Launcher node the commands are written to
//!
//! Either a device file (character device or plain file) or a socket node
//! published by `launcher-driver`.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::FileTypeExt;
use std::os::unix::net::UnixStream;
use std::path::Path;

#[derive(Debug)]
pub enum DeviceNode {
    File(File),
    Socket(UnixStream),
}

impl DeviceNode {
    pub fn open(path: &Path) -> io::Result<Self> {
        let metadata = std::fs::metadata(path)?;
        if metadata.file_type().is_socket() {
            return Ok(DeviceNode::Socket(UnixStream::connect(path)?));
        }

        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(DeviceNode::File(file))
    }
}

impl Write for DeviceNode {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            DeviceNode::File(file) => file.write(buf),
            DeviceNode::Socket(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            DeviceNode::File(file) => file.flush(),
            DeviceNode::Socket(stream) => stream.flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::os::unix::net::UnixListener;
    use tempfile::TempDir;

    #[test]
    fn test_plain_file_node() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("launcher0");
        std::fs::write(&path, b"").unwrap();

        let mut node = DeviceNode::open(&path).unwrap();
        assert!(matches!(node, DeviceNode::File(_)));
        node.write_all(&[0x10]).unwrap();
        drop(node);

        assert_eq!(std::fs::read(&path).unwrap(), vec![0x10]);
    }

    #[test]
    fn test_socket_node() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("launcher0");
        let listener = UnixListener::bind(&path).unwrap();

        let mut node = DeviceNode::open(&path).unwrap();
        assert!(matches!(node, DeviceNode::Socket(_)));
        node.write_all(&[0x04]).unwrap();
        drop(node);

        let (mut peer, _) = listener.accept().unwrap();
        let mut received = Vec::new();
        peer.read_to_end(&mut received).unwrap();
        assert_eq!(received, vec![0x04]);
    }

    #[test]
    fn test_missing_node() {
        let dir = TempDir::new().unwrap();
        let err = DeviceNode::open(&dir.path().join("absent")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
