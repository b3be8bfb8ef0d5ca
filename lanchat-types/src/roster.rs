//! The live handle → address map shared by the Discovery Engine and the
//! Message Router, each of which owns its own independent instance.
//!
//! Own-handle filtering lives here and only here: every mutating method
//! takes the owner's `Handle` and silently refuses to insert or return it,
//! so the Discovery Engine, Message Router, and Presence Controller never
//! need to re-derive the "is this me?" check themselves (see SPEC_FULL.md
//! §9, "Own-handle filtering").

use std::collections::HashMap;

use crate::handle::Handle;
use crate::peer::PeerAddress;

/// In-memory roster: at most one `PeerAddress` per `Handle`, and never an
/// entry for the roster owner's own handle.
#[derive(Debug, Default, Clone)]
pub struct Roster {
    entries: HashMap<Handle, PeerAddress>,
}

impl Roster {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Insert or replace an entry, unless `handle` equals `own`.
    ///
    /// Last-writer-wins on address, matching the Discovery Engine's JOIN
    /// tie-break rule (a JOIN for an existing handle from a new address
    /// replaces the old one).
    pub fn upsert(&mut self, own: &Handle, handle: Handle, addr: PeerAddress) {
        if &handle == own {
            return;
        }
        self.entries.insert(handle, addr);
    }

    /// Remove an entry. A second removal of the same handle is a no-op.
    pub fn remove(&mut self, handle: &Handle) {
        self.entries.remove(handle);
    }

    pub fn get(&self, handle: &Handle) -> Option<PeerAddress> {
        self.entries.get(handle).copied()
    }

    pub fn contains(&self, handle: &Handle) -> bool {
        self.entries.contains_key(handle)
    }

    /// Address whose IP matches `ip`, used by the Discovery Engine to answer
    /// WHO (the requester must already have JOINed to be found).
    pub fn find_by_ip(&self, ip: std::net::Ipv4Addr) -> Option<(&Handle, &PeerAddress)> {
        self.entries.iter().find(|(_, addr)| addr.ip == ip)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Handle, &PeerAddress)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge a KNOWNUSERS listing into the existing roster: upsert every
    /// listed handle but never evict an entry the listing simply omits.
    ///
    /// This is the reinterpretation documented in SPEC_FULL.md §4.4/§9: a
    /// naive wholesale replace can transiently drop entries this peer
    /// already learned via JOIN fanout, before its own WHO reply arrives.
    pub fn merge_known_users(&mut self, own: &Handle, listed: impl IntoIterator<Item = (Handle, PeerAddress)>) {
        for (handle, addr) in listed {
            self.upsert(own, handle, addr);
        }
    }

    /// Snapshot suitable for rendering a KNOWNUSERS line or a front-end
    /// notification.
    pub fn snapshot(&self) -> Vec<(Handle, PeerAddress)> {
        self.entries
            .iter()
            .map(|(h, a)| (h.clone(), *a))
            .collect()
    }
}
