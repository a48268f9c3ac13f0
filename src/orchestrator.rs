//! The client orchestrator: discovers peers, spawns one session per peer,
//! and drives the progress loop until the download completes or fails.
//!
//! Grounded on `bt_client/client.rs`'s top-level run loop (tracker fan-out,
//! one thread per peer, a shared `AtomicTorrentStatus`) and on
//! `original_source/src/core/TorrentClient.cpp`'s `DownloadFromTracker` for
//! the backup UDP tracker list and the progress-line throttle.

use std::collections::HashSet;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rand::random;

use crate::config::Cfg;
use crate::error::ClientError;
use crate::logger::LoggerSender;
use crate::metainfo::TorrentMeta;
use crate::peer::session::{PeerSession, SessionState};
use crate::progress::{ProgressTracker, Status};
use crate::storage::PieceStorage;
use crate::tracker::peer_addr::PeerAddr;
use crate::tracker::{http, udp};

/// Carried over from the original's hard-coded fallback list (see
/// SPEC_FULL §11): queried in addition to the torrent's own announce URL so
/// a dead or private tracker doesn't strand the download with zero peers.
const BACKUP_UDP_TRACKERS: &[&str] = &[
    "tracker.opentrackr.org:1337",
    "open.stealth.si:80",
    "exodus.desync.com:6969",
    "tracker.torrent.eu.org:451",
];

const PROGRESS_TICK: Duration = Duration::from_millis(250);
const ENDGAME_PIECE_THRESHOLD: usize = 10;
const ENDGAME_REQUEUE_INTERVAL: Duration = Duration::from_secs(10);
const ENDGAME_MAX_STALL_RETRIES: u32 = 10;
const PROGRESS_LOG_THROTTLE: usize = 5;
const MISSING_PIECES_DUMP_LIMIT: usize = 20;

pub struct Orchestrator {
    storage: Arc<PieceStorage>,
    progress: Arc<ProgressTracker>,
    config: Cfg,
    logger: LoggerSender,
    stop: Arc<AtomicBool>,
    pause: Arc<AtomicBool>,
}

impl Orchestrator {
    pub fn new(meta: &TorrentMeta, storage: PieceStorage, config: Cfg, logger: LoggerSender) -> Self {
        let progress = ProgressTracker::new(
            meta.name.clone(),
            meta.total_length,
            meta.piece_length,
            meta.piece_hashes.len(),
        );
        Orchestrator {
            storage: Arc::new(storage),
            progress: Arc::new(progress),
            config,
            logger,
            stop: Arc::new(AtomicBool::new(false)),
            pause: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn progress(&self) -> Arc<ProgressTracker> {
        Arc::clone(&self.progress)
    }

    /// Requests a graceful shutdown; `run` returns once workers have joined.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn pause(&self) {
        self.pause.store(true, Ordering::SeqCst);
        self.progress.set_status(Status::Paused);
    }

    pub fn resume(&self) {
        self.pause.store(false, Ordering::SeqCst);
        self.progress.set_status(Status::Downloading);
    }

    /// Discovers peers, spawns sessions, and blocks until completion,
    /// requested stop, or an unrecoverable `IncompleteDownload`.
    pub fn run(&self, meta: &TorrentMeta) -> Result<(), ClientError> {
        self.progress.set_status(Status::Connecting);

        let peers = discover_peers(meta, &self.logger);
        if peers.is_empty() {
            self.progress.set_status(Status::Error);
            return Err(ClientError::NoPeersDiscovered);
        }
        self.progress.set_total_peers(peers.len());

        let local_peer_id = generate_peer_id();
        let terminated = Arc::new(AtomicBool::new(false));
        let n_pieces = meta.piece_hashes.len();

        let mut sessions: Vec<(Arc<PeerSession>, JoinHandle<()>)> = Vec::new();
        for peer in peers.into_iter().take(self.config.max_peers_per_torrent as usize) {
            let session = Arc::new(PeerSession::new(
                SocketAddr::new(peer.ip.into(), peer.port),
                meta.info_hash,
                local_peer_id,
                Arc::clone(&self.storage),
                self.config.clone(),
                self.logger.clone(),
                n_pieces,
                Arc::clone(&terminated),
            ));
            let worker_session = Arc::clone(&session);
            let handle = thread::spawn(move || worker_session.run());
            sessions.push((session, handle));
        }

        self.progress.set_status(Status::Downloading);
        let outcome = self.progress_loop(&sessions);

        self.logger.info("orchestrator: shutting down, terminating all sessions");
        for (session, _) in &sessions {
            session.terminate();
        }
        for (_, handle) in sessions {
            let _ = handle.join();
        }
        self.storage.close()?;

        outcome
    }

    fn progress_loop(&self, sessions: &[(Arc<PeerSession>, JoinHandle<()>)]) -> Result<(), ClientError> {
        let mut last_force_requeue = Instant::now() - ENDGAME_REQUEUE_INTERVAL;
        let mut endgame_stall_retries: u32 = 0;
        let mut last_logged_saved = 0usize;

        loop {
            thread::sleep(PROGRESS_TICK);

            if self.stop.load(Ordering::SeqCst) {
                self.progress.set_status(Status::Stopped);
                return Ok(());
            }

            if self.storage.is_complete()? {
                self.progress.set_status(Status::Completed);
                return Ok(());
            }

            if self.pause.load(Ordering::SeqCst) {
                continue;
            }

            let connected = sessions
                .iter()
                .filter(|(session, _)| session.state() != SessionState::Closed)
                .count();
            self.progress.set_connected_peers(connected);

            let saved = self.storage.pieces_saved_count()?;
            if saved / PROGRESS_LOG_THROTTLE > last_logged_saved / PROGRESS_LOG_THROTTLE {
                self.logger
                    .info(&format!("progress: {saved}/{} pieces saved", self.storage.total_piece_count()));
            }
            last_logged_saved = saved;

            let missing = self.storage.missing_pieces()?;
            self.progress.sync(saved, self.storage.downloaded_bytes()?, missing.clone());
            if missing.len() <= ENDGAME_PIECE_THRESHOLD {
                let queue_empty = self.storage.queue_is_empty()?;
                if queue_empty && last_force_requeue.elapsed() >= ENDGAME_REQUEUE_INTERVAL {
                    self.storage.force_requeue_missing()?;
                    last_force_requeue = Instant::now();
                    endgame_stall_retries += 1;

                    if endgame_stall_retries >= ENDGAME_MAX_STALL_RETRIES {
                        self.progress.set_status(Status::Error);
                        self.log_missing_pieces_dump(&missing);
                        return Err(ClientError::IncompleteDownload(missing));
                    }
                } else if !queue_empty {
                    endgame_stall_retries = 0;
                }
            }
        }
    }

    fn log_missing_pieces_dump(&self, missing: &[u32]) {
        let shown: Vec<String> = missing
            .iter()
            .take(MISSING_PIECES_DUMP_LIMIT)
            .map(|index| index.to_string())
            .collect();
        self.logger.error(&format!(
            "incomplete download: {} piece(s) missing, first {}: [{}]",
            missing.len(),
            shown.len(),
            shown.join(", ")
        ));
    }
}

/// Queries the torrent's declared tracker plus the static backup UDP
/// trackers, aggregating and deduplicating by `(ip, port)`.
fn discover_peers(meta: &TorrentMeta, logger: &LoggerSender) -> Vec<PeerAddr> {
    let local_peer_id = generate_peer_id();
    let mut seen: HashSet<(std::net::Ipv4Addr, u16)> = HashSet::new();
    let mut peers = Vec::new();

    if let Some(declared) = announce_one(&meta.announce_url, meta, local_peer_id, logger) {
        for peer in declared {
            if seen.insert((peer.ip, peer.port)) {
                peers.push(peer);
            }
        }
    }

    for backup in BACKUP_UDP_TRACKERS {
        let Some(addr) = resolve_udp_tracker(backup) else {
            logger.warn(&format!("could not resolve backup tracker {backup}"));
            continue;
        };
        let request = udp::AnnounceRequest {
            info_hash: meta.info_hash,
            peer_id: local_peer_id,
            port: 6881,
            left: meta.total_length,
        };
        match udp::announce(addr, &request) {
            Ok(response) => {
                for peer in response.peers {
                    if seen.insert((peer.ip, peer.port)) {
                        peers.push(peer);
                    }
                }
            }
            Err(err) => logger.warn(&format!("backup tracker {backup} failed: {err:?}")),
        }
    }

    peers
}

fn announce_one(
    announce_url: &str,
    meta: &TorrentMeta,
    local_peer_id: [u8; 20],
    logger: &LoggerSender,
) -> Option<Vec<PeerAddr>> {
    if let Some(rest) = announce_url.strip_prefix("udp://") {
        let host_port = rest.split('/').next().unwrap_or(rest);
        let addr = resolve_udp_tracker(host_port)?;
        let request = udp::AnnounceRequest {
            info_hash: meta.info_hash,
            peer_id: local_peer_id,
            port: 6881,
            left: meta.total_length,
        };
        match udp::announce(addr, &request) {
            Ok(response) => Some(response.peers),
            Err(err) => {
                logger.warn(&format!("declared tracker {announce_url} failed: {err:?}"));
                None
            }
        }
    } else {
        let request = http::AnnounceRequest {
            announce_url,
            info_hash: meta.info_hash,
            peer_id: local_peer_id,
            port: 6881,
            left: meta.total_length,
        };
        match http::announce(&request) {
            Ok(response) => Some(response.peers),
            Err(err) => {
                logger.warn(&format!("declared tracker {announce_url} failed: {err:?}"));
                None
            }
        }
    }
}

fn resolve_udp_tracker(host_port: &str) -> Option<SocketAddr> {
    host_port.to_socket_addrs().ok()?.next()
}

/// An Azureus-style peer ID: a two-letter client tag, four-digit version,
/// then random bytes to fill out the required 20.
fn generate_peer_id() -> [u8; 20] {
    let mut id = [0u8; 20];
    id[0..8].copy_from_slice(b"-LT0001-");
    for byte in id[8..].iter_mut() {
        *byte = random();
    }
    id
}
