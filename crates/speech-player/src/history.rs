//! In-memory history of generated speech clips.
//!
//! Each entry pairs the prompt text with its generated audio. Entries start pending
//! while the speech service works, then settle as ready or failed. Newest first.

use std::fmt;
use std::time::SystemTime;

use crate::pcm::EncodedAudio;

/// Logical identifier of a clip, used by the controller to tell clips apart.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(u64);

impl EntryId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Generation state of a history entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntryStatus {
    Pending,
    Ready(EncodedAudio),
    Failed(String),
}

#[derive(Clone, Debug)]
pub struct AudioEntry {
    pub id: EntryId,
    pub text: String,
    /// Wall-clock creation time, for display. Ordering uses `id`.
    pub timestamp: SystemTime,
    pub status: EntryStatus,
}

impl AudioEntry {
    pub fn audio(&self) -> Option<&EncodedAudio> {
        match &self.status {
            EntryStatus::Ready(audio) => Some(audio),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.status, EntryStatus::Pending)
    }
}

/// Ordered clip history with at most one generation in flight.
#[derive(Debug, Default)]
pub struct SpeechHistory {
    entries: Vec<AudioEntry>,
    next_id: u64,
}

impl SpeechHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new pending entry for `text`.
    ///
    /// Returns `None` for blank text or while another entry is still pending.
    pub fn begin(&mut self, text: &str) -> Option<EntryId> {
        if text.trim().is_empty() || self.has_pending() {
            return None;
        }
        self.next_id += 1;
        let id = EntryId(self.next_id);
        self.entries.insert(
            0,
            AudioEntry {
                id,
                text: text.to_string(),
                timestamp: SystemTime::now(),
                status: EntryStatus::Pending,
            },
        );
        Some(id)
    }

    /// Attach generated audio to a pending entry. Returns `false` if `id` is not pending.
    pub fn complete(&mut self, id: EntryId, audio: EncodedAudio) -> bool {
        self.settle(id, EntryStatus::Ready(audio))
    }

    /// Mark a pending entry as failed. Returns `false` if `id` is not pending.
    pub fn fail(&mut self, id: EntryId, reason: impl Into<String>) -> bool {
        self.settle(id, EntryStatus::Failed(reason.into()))
    }

    pub fn remove(&mut self, id: EntryId) -> Option<AudioEntry> {
        let pos = self.entries.iter().position(|e| e.id == id)?;
        Some(self.entries.remove(pos))
    }

    pub fn get(&self, id: EntryId) -> Option<&AudioEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Entries newest first.
    pub fn iter(&self) -> impl Iterator<Item = &AudioEntry> {
        self.entries.iter()
    }

    pub fn has_pending(&self) -> bool {
        self.entries.iter().any(AudioEntry::is_pending)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn settle(&mut self, id: EntryId, status: EntryStatus) -> bool {
        match self.entries.iter_mut().find(|e| e.id == id) {
            Some(entry) if entry.is_pending() => {
                entry.status = status;
                true
            }
            _ => false,
        }
    }
}
