//! The progress snapshot published to the UI.
//!
//! Grounded on `torrent_handler/status.rs`'s `AtomicTorrentStatus`: atomics
//! plus a mutex for the field that needs a collection, with plain getters.
//! The snapshot itself is a single cloneable struct built on demand rather
//! than many individually-locked counters, since the UI consumes it as one
//! unit every ~250 ms.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Where the download currently stands, named for direct display to a UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    NoTorrent,
    Loading,
    Connecting,
    Downloading,
    Paused,
    Completed,
    Error,
    Stopped,
}

/// A point-in-time view of a download, safe to clone and hand to a UI
/// thread.
#[derive(Debug, Clone)]
pub struct Progress {
    pub file_name: String,
    pub status: Status,
    pub percentage: f64,
    pub total_bytes: u64,
    pub downloaded_bytes: u64,
    pub connected_peers: usize,
    pub total_peers: usize,
    pub total_pieces: usize,
    pub downloaded_pieces: usize,
    pub missing_pieces: Vec<u32>,
    pub started_at: Instant,
    pub last_update: Instant,
}

/// The shared, atomically-updated state a `Progress` snapshot is built from.
///
/// Every worker and the orchestrator hold a `&ProgressTracker`; reads and
/// writes never block each other beyond the brief critical sections the
/// individual atomics and the `missing_pieces` mutex require.
pub struct ProgressTracker {
    file_name: String,
    status: Mutex<Status>,
    total_bytes: u64,
    piece_length: u64,
    total_pieces: usize,
    downloaded_pieces: AtomicUsize,
    connected_peers: AtomicU32,
    total_peers: AtomicUsize,
    started_at: Instant,
    last_update: Mutex<Instant>,
    missing_pieces: Mutex<Vec<u32>>,
    downloaded_bytes: AtomicU64,
}

impl ProgressTracker {
    pub fn new(file_name: String, total_bytes: u64, piece_length: u64, total_pieces: usize) -> Self {
        let now = Instant::now();
        ProgressTracker {
            file_name,
            status: Mutex::new(Status::NoTorrent),
            total_bytes,
            piece_length,
            total_pieces,
            downloaded_pieces: AtomicUsize::new(0),
            connected_peers: AtomicU32::new(0),
            total_peers: AtomicUsize::new(0),
            started_at: now,
            last_update: Mutex::new(now),
            missing_pieces: Mutex::new((0..total_pieces as u32).collect()),
            downloaded_bytes: AtomicU64::new(0),
        }
    }

    pub fn set_status(&self, status: Status) {
        if let Ok(mut guard) = self.status.lock() {
            *guard = status;
        }
        self.touch();
    }

    pub fn set_total_peers(&self, total: usize) {
        self.total_peers.store(total, Ordering::Relaxed);
        self.touch();
    }

    pub fn set_connected_peers(&self, connected: usize) {
        self.connected_peers.store(connected as u32, Ordering::Relaxed);
        self.touch();
    }

    /// Records one more saved piece and removes it from the missing list.
    pub fn piece_saved(&self, index: u32, piece_bytes: u64) {
        self.downloaded_pieces.fetch_add(1, Ordering::Relaxed);
        self.downloaded_bytes.fetch_add(piece_bytes, Ordering::Relaxed);
        if let Ok(mut missing) = self.missing_pieces.lock() {
            missing.retain(|&i| i != index);
        }
        self.touch();
    }

    /// Replaces the downloaded/missing counters wholesale from a storage
    /// poll, used by the orchestrator's progress loop instead of tracking
    /// each `piece_saved` call individually.
    pub fn sync(&self, downloaded_pieces: usize, downloaded_bytes: u64, missing: Vec<u32>) {
        self.downloaded_pieces.store(downloaded_pieces, Ordering::Relaxed);
        self.downloaded_bytes.store(downloaded_bytes, Ordering::Relaxed);
        if let Ok(mut guard) = self.missing_pieces.lock() {
            *guard = missing;
        }
        self.touch();
    }

    fn touch(&self) {
        if let Ok(mut guard) = self.last_update.lock() {
            *guard = Instant::now();
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Builds a consistent point-in-time snapshot. Not perfectly atomic
    /// across fields (there is no single lock over all of them) but every
    /// field individually reflects a real past state, which is all a
    /// progress display needs.
    pub fn snapshot(&self) -> Progress {
        let downloaded_pieces = self.downloaded_pieces.load(Ordering::Relaxed);
        let percentage = if self.total_pieces == 0 {
            0.0
        } else {
            (downloaded_pieces as f64 / self.total_pieces as f64) * 100.0
        };

        Progress {
            file_name: self.file_name.clone(),
            status: self.status.lock().map(|guard| *guard).unwrap_or(Status::Error),
            percentage,
            total_bytes: self.total_bytes,
            downloaded_bytes: self.downloaded_bytes.load(Ordering::Relaxed),
            connected_peers: self.connected_peers.load(Ordering::Relaxed) as usize,
            total_peers: self.total_peers.load(Ordering::Relaxed),
            total_pieces: self.total_pieces,
            downloaded_pieces,
            missing_pieces: self.missing_pieces.lock().map(|guard| guard.clone()).unwrap_or_default(),
            started_at: self.started_at,
            last_update: self.last_update.lock().map(|guard| *guard).unwrap_or(self.started_at),
        }
    }

    pub fn piece_length(&self) -> u64 {
        self.piece_length
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_every_piece_missing() {
        let tracker = ProgressTracker::new("movie.mp4".to_string(), 300, 100, 3);
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.missing_pieces, vec![0, 1, 2]);
        assert_eq!(snapshot.downloaded_pieces, 0);
        assert_eq!(snapshot.percentage, 0.0);
    }

    #[test]
    fn piece_saved_updates_percentage_and_missing_list() {
        let tracker = ProgressTracker::new("movie.mp4".to_string(), 300, 100, 3);
        tracker.piece_saved(1, 100);
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.downloaded_pieces, 1);
        assert_eq!(snapshot.downloaded_bytes, 100);
        assert_eq!(snapshot.missing_pieces, vec![0, 2]);
        assert!((snapshot.percentage - 33.333).abs() < 0.01);
    }

    #[test]
    fn status_transitions_are_visible_in_the_snapshot() {
        let tracker = ProgressTracker::new("movie.mp4".to_string(), 300, 100, 3);
        tracker.set_status(Status::Connecting);
        assert_eq!(tracker.snapshot().status, Status::Connecting);
        tracker.set_status(Status::Downloading);
        assert_eq!(tracker.snapshot().status, Status::Downloading);
    }

    #[test]
    fn peer_counts_round_trip() {
        let tracker = ProgressTracker::new("movie.mp4".to_string(), 300, 100, 3);
        tracker.set_total_peers(12);
        tracker.set_connected_peers(5);
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.total_peers, 12);
        assert_eq!(snapshot.connected_peers, 5);
    }
}
