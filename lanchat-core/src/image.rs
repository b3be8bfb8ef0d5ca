//! Per-sender chunked image reassembly, and the send-side chunker.
//!
//! Keyed by `(source SocketAddr, filename)` exactly as SPEC_FULL.md §4.5
//! describes, but as a typed `HashMap` key rather than the original tool's
//! linear scan for "the first entry whose key's address matches" — the
//! richer key is available up front here, so the scan is unnecessary.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tokio::fs;
use tracing::{trace, warn};

use lanchat_codec::{chunk_count, encode_frame, Frame, DEFAULT_CHUNK_SIZE};
use lanchat_types::Handle;

use crate::error::EngineError;
use crate::transport::Transport;

/// Transfers idle this long are evicted by the periodic sweep (SPEC_FULL.md
/// §3, resolving the open question on incomplete transfers).
pub const TRANSFER_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct TransferState {
    sender_handle: Handle,
    filename: String,
    total_chunks: u32,
    chunks: BTreeMap<u32, Vec<u8>>,
    last_activity: Instant,
}

impl TransferState {
    fn received_count(&self) -> u32 {
        self.chunks.len() as u32
    }

    fn is_complete(&self) -> bool {
        self.received_count() == self.total_chunks
    }

    fn concatenated(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for i in 0..self.total_chunks {
            if let Some(bytes) = self.chunks.get(&i) {
                out.extend_from_slice(bytes);
            }
        }
        out
    }
}

/// A notification the Image Transfer subsystem hands back to the caller for
/// forwarding to the front-end IPC (`IMG <sender> <filename>`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReceived {
    pub sender: Handle,
    pub filename: String,
}

/// In-memory table of active inbound transfers.
#[derive(Default)]
pub struct ImageTransferTable {
    active: HashMap<(SocketAddr, String), TransferState>,
}

impl ImageTransferTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_img_start(&mut self, source: SocketAddr, sender: Handle, filename: String, total_chunks: u32) {
        self.active.insert(
            (source, filename.clone()),
            TransferState {
                sender_handle: sender,
                filename,
                total_chunks,
                chunks: BTreeMap::new(),
                last_activity: Instant::now(),
            },
        );
    }

    /// Store a chunk for the most recently started transfer from `source`
    /// (there is normally exactly one in-flight transfer per source).
    pub fn on_chunk(&mut self, source: SocketAddr, index: u32, bytes: Vec<u8>) {
        if let Some(state) = self
            .active
            .iter_mut()
            .filter(|((addr, _), _)| *addr == source)
            .max_by_key(|(_, state)| state.last_activity)
            .map(|(_, state)| state)
        {
            state.chunks.insert(index, bytes);
            state.last_activity = Instant::now();
        } else {
            trace!("CHUNK {index} from {source} with no matching IMG_START; dropped");
        }
    }

    /// Finalize every transfer from `source` whose chunk set is complete:
    /// write the file, return an [`ImageReceived`] for each, and remove the
    /// entry. Incomplete transfers from `source` are left pending.
    pub async fn on_img_end(
        &mut self,
        source: SocketAddr,
        image_dir: &Path,
    ) -> Result<Vec<ImageReceived>, EngineError> {
        let ready: Vec<(SocketAddr, String)> = self
            .active
            .iter()
            .filter(|((addr, _), state)| *addr == source && state.is_complete())
            .map(|(key, _)| key.clone())
            .collect();

        let mut finalized = Vec::new();
        for key in ready {
            if let Some(state) = self.active.remove(&key) {
                fs::create_dir_all(image_dir).await?;
                let path: PathBuf = image_dir.join(&state.filename);
                fs::write(&path, state.concatenated()).await?;
                finalized.push(ImageReceived {
                    sender: state.sender_handle,
                    filename: state.filename,
                });
            }
        }
        Ok(finalized)
    }

    /// Evict transfers idle longer than [`TRANSFER_IDLE_TIMEOUT`], logging
    /// one `TransferIncomplete` warning per eviction. Returns the number
    /// evicted.
    pub fn sweep_stale(&mut self) -> usize {
        let before = self.active.len();
        self.active.retain(|_, state| {
            let fresh = state.last_activity.elapsed() < TRANSFER_IDLE_TIMEOUT;
            if !fresh {
                warn_transfer_incomplete(&state.sender_handle, &state.filename, state.received_count(), state.total_chunks);
            }
            fresh
        });
        before - self.active.len()
    }

    #[cfg(test)]
    fn pending_count(&self) -> usize {
        self.active.len()
    }
}

/// Send-side chunker: given a file already read into memory, emit
/// IMG_START, the CHUNK sequence, then IMG_END to `target` over `transport`.
pub async fn send_image(
    transport: &Transport,
    target: lanchat_types::PeerAddress,
    own_handle: &Handle,
    filename: &str,
    data: &[u8],
    chunk_size: usize,
) {
    let chunk_size = if chunk_size == 0 { DEFAULT_CHUNK_SIZE } else { chunk_size };
    let total = chunk_count(data.len() as u64, chunk_size);

    let start = Frame::ImgStart {
        sender: own_handle.clone(),
        filename: filename.to_string(),
        total_chunks: total,
    };
    transport.send_to_peer(&encode_frame(&start), target).await;

    for i in 0..total {
        let begin = i as usize * chunk_size;
        let end = (begin + chunk_size).min(data.len());
        let chunk = Frame::Chunk {
            index: i,
            bytes: data[begin..end].to_vec(),
        };
        transport.send_to_peer(&encode_frame(&chunk), target).await;
    }

    transport.send_to_peer(&encode_frame(&Frame::ImgEnd), target).await;
}

pub fn basename(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string())
}

pub fn warn_transfer_incomplete(sender: &Handle, filename: &str, received: u32, total: u32) {
    warn!(
        "transfer incomplete: {filename} from {sender} ({received}/{total} chunks) evicted after idle timeout"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, SocketAddrV4};
    use tempfile::tempdir;

    fn h(s: &str) -> Handle {
        Handle::new(s).unwrap()
    }

    fn src() -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(192, 168, 0, 5), 5001))
    }

    #[tokio::test]
    async fn full_transfer_roundtrips_bytes_exactly() {
        let dir = tempdir().unwrap();
        let mut table = ImageTransferTable::new();
        let data: Vec<u8> = (0u8..=255).cycle().take(2500).collect();

        table.on_img_start(src(), h("alice"), "photo.png".into(), chunk_count(2500, 1024));
        for (i, chunk) in data.chunks(1024).enumerate() {
            table.on_chunk(src(), i as u32, chunk.to_vec());
        }
        let finalized = table.on_img_end(src(), dir.path()).await.unwrap();

        assert_eq!(finalized.len(), 1);
        assert_eq!(finalized[0].filename, "photo.png");
        assert_eq!(finalized[0].sender, h("alice"));
        let written = std::fs::read(dir.path().join("photo.png")).unwrap();
        assert_eq!(written, data);
        assert_eq!(table.pending_count(), 0);
    }

    #[tokio::test]
    async fn zero_byte_image_finalizes_immediately() {
        let dir = tempdir().unwrap();
        let mut table = ImageTransferTable::new();
        table.on_img_start(src(), h("alice"), "empty.png".into(), 0);
        let finalized = table.on_img_end(src(), dir.path()).await.unwrap();
        assert_eq!(finalized.len(), 1);
        let written = std::fs::read(dir.path().join("empty.png")).unwrap();
        assert!(written.is_empty());
    }

    #[tokio::test]
    async fn incomplete_transfer_stays_pending_after_img_end() {
        let dir = tempdir().unwrap();
        let mut table = ImageTransferTable::new();
        table.on_img_start(src(), h("alice"), "partial.png".into(), 3);
        table.on_chunk(src(), 0, vec![1, 2, 3]);
        let finalized = table.on_img_end(src(), dir.path()).await.unwrap();
        assert!(finalized.is_empty());
        assert_eq!(table.pending_count(), 1);
    }

    #[test]
    fn stale_sweep_evicts_after_timeout() {
        let mut table = ImageTransferTable::new();
        table.on_img_start(src(), h("alice"), "stuck.png".into(), 5);
        if let Some(state) = table.active.values_mut().next() {
            state.last_activity = Instant::now() - TRANSFER_IDLE_TIMEOUT - Duration::from_secs(1);
        }
        let evicted = table.sweep_stale();
        assert_eq!(evicted, 1);
        assert_eq!(table.pending_count(), 0);
    }

    #[test]
    fn basename_strips_directories() {
        assert_eq!(basename("/home/alice/pics/photo.png"), "photo.png");
        assert_eq!(basename("photo.png"), "photo.png");
    }
}
