//! Fragment reassembly for inbound datagrams.
//!
//! Fragments of concurrently arriving datagrams are aggregated per
//! originating datagram, identified by the (source, destination,
//! identification, protocol) tuple. Fragments may arrive in any order and
//! may overlap; later arrivals overwrite earlier overlapping bytes.
//!
//! # Fragment lifecycle
//!
//! 1. **Reception**: the first fragment of a tuple creates a
//!    [`ReassemblyEntry`]; further fragments accumulate into it.
//! 2. **Completion**: once the last fragment (`more_fragments == false`) has
//!    been seen and the received ranges cover the whole payload without a
//!    gap, the entry is removed and a single reassembled datagram is
//!    returned.
//! 3. **Timeout**: entries that do not complete within the timeout, measured
//!    from the first fragment's arrival, are swept to bound memory. The
//!    sweep is driven opportunistically by the caller; no timer is needed.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ipflow_proto::{Datagram, Payload};

/// Identifies which original datagram a fragment belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FragmentKey {
    /// Source address of the fragment.
    pub src: Ipv4Addr,
    /// Destination address of the fragment.
    pub dst: Ipv4Addr,
    /// Identification field shared by all fragments of one datagram.
    pub identification: u16,
    /// Transport protocol number.
    pub protocol: u8,
}

impl FragmentKey {
    /// Derives the key from a fragment's header.
    pub fn from_datagram(datagram: &Datagram) -> Self {
        Self {
            src: datagram.src(),
            dst: datagram.dst(),
            identification: datagram.identification(),
            protocol: datagram.protocol(),
        }
    }
}

/// One received fragment: its declared byte range and its payload.
#[derive(Debug)]
struct FragmentPiece {
    offset_bytes: u32,
    len_bytes: u32,
    payload: Payload,
}

/// Accumulates the fragments of a single original datagram.
#[derive(Debug)]
struct ReassemblyEntry {
    /// Received fragments in arrival order.
    pieces: Vec<FragmentPiece>,
    /// Header of the offset-0 fragment, payload removed; the reassembled
    /// datagram adopts it.
    first_header: Option<Datagram>,
    /// Total payload length, known once the last fragment has been seen.
    total_len: Option<u32>,
    /// Arrival time of the first fragment, for timeout detection.
    created_at: Instant,
}

impl ReassemblyEntry {
    fn new(created_at: Instant) -> Self {
        Self { pieces: Vec::new(), first_header: None, total_len: None, created_at }
    }

    fn insert(&mut self, mut datagram: Datagram) {
        let offset_bytes = datagram.fragment_offset_bytes();
        let len_bytes = u32::from(datagram.payload_length());
        if !datagram.more_fragments() {
            self.total_len = Some(offset_bytes + len_bytes);
        }
        let payload = match datagram.decapsulate() {
            Some(payload) => payload,
            None => {
                tracing::warn!(
                    offset = offset_bytes,
                    "fragment arrived without a payload, ignoring"
                );
                return;
            }
        };
        if offset_bytes == 0 {
            self.first_header = Some(datagram);
        }
        self.pieces.push(FragmentPiece { offset_bytes, len_bytes, payload });
    }

    /// Complete when the total length is known and the received ranges cover
    /// `[0, total)` without a gap. Overlap is fine.
    fn is_complete(&self) -> bool {
        let total = match self.total_len {
            Some(total) => total,
            None => return false,
        };
        let mut ranges: Vec<(u32, u32)> = self
            .pieces
            .iter()
            .map(|p| (p.offset_bytes, p.offset_bytes + p.len_bytes))
            .collect();
        ranges.sort_unstable();

        let mut covered = 0u32;
        for (start, end) in ranges {
            if start > covered {
                return false;
            }
            covered = covered.max(end);
        }
        covered >= total
    }

    /// Builds the reassembled datagram. The header comes from the offset-0
    /// fragment with the fragment fields cleared; payload bytes are written
    /// in arrival order so later fragments win overlaps.
    fn assemble(mut self) -> Option<Datagram> {
        let total = self.total_len? as usize;
        let mut header = self.first_header.take()?;

        let mut buffer = vec![0u8; total];
        let mut typed: Option<Payload> = None;
        for piece in &self.pieces {
            let start = piece.offset_bytes as usize;
            if start >= total {
                continue;
            }
            let end = (start + piece.len_bytes as usize).min(total);
            match &piece.payload {
                Payload::Transport(bytes) => {
                    // A fragment may carry either exactly its slice or the
                    // entire original payload with the range declared in the
                    // header; extract accordingly.
                    let src: &[u8] = if bytes.len() >= end && bytes.len() > end - start {
                        &bytes[start..end]
                    } else {
                        &bytes[..bytes.len().min(end - start)]
                    };
                    buffer[start..start + src.len()].copy_from_slice(src);
                }
                other => {
                    // Non-byte payloads travel whole in every fragment.
                    typed = Some(other.clone());
                }
            }
        }

        header.set_more_fragments(false);
        header.set_fragment_offset(0);
        match typed {
            Some(payload) => header.encapsulate(payload),
            None => header.encapsulate(Payload::Transport(Arc::from(buffer.into_boxed_slice()))),
        }
        Some(header)
    }
}

/// Concurrent reassembly of fragmented datagrams, keyed by
/// (src, dst, identification, protocol).
#[derive(Debug, Default)]
pub struct ReassemblyBuffer {
    entries: HashMap<FragmentKey, ReassemblyEntry>,
}

impl ReassemblyBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self { entries: HashMap::new() }
    }

    /// Inserts a fragment, taking ownership of it. Returns the reassembled
    /// datagram when this fragment completes the set, `None` otherwise.
    pub fn add_fragment(&mut self, datagram: Datagram, now: Instant) -> Option<Datagram> {
        let key = FragmentKey::from_datagram(&datagram);
        let entry = self
            .entries
            .entry(key)
            .or_insert_with(|| ReassemblyEntry::new(now));
        entry.insert(datagram);

        if entry.is_complete() {
            let entry = self.entries.remove(&key)?;
            let reassembled = entry.assemble();
            if reassembled.is_none() {
                tracing::warn!(?key, "complete fragment set failed to assemble, discarding");
            }
            reassembled
        } else {
            None
        }
    }

    /// Drops every entry whose first fragment arrived more than `timeout`
    /// ago. Partial datagrams are discarded silently; upper-layer timers are
    /// responsible for end-to-end recovery.
    pub fn purge_stale(&mut self, now: Instant, timeout: Duration) {
        let stale: Vec<FragmentKey> = self
            .entries
            .iter()
            .filter_map(|(key, entry)| {
                if now.duration_since(entry.created_at) > timeout {
                    Some(*key)
                } else {
                    None
                }
            })
            .collect();

        if !stale.is_empty() {
            tracing::warn!(
                "discarding {} partially reassembled datagram(s) older than {:?}",
                stale.len(),
                timeout
            );
            for key in stale {
                self.entries.remove(&key);
            }
        }
    }

    /// Number of datagrams currently awaiting fragments.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is awaiting reassembly.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
