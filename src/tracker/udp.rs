//! BEP-15 UDP tracker announce.
//!
//! Grounded on `original_source/src/core/UdpTracker.cpp`'s two-phase
//! connect/announce wire format. One deviation: the original packs the
//! announce request's port field as `port << 16 | (port & 0xFFFF)`, which
//! is wrong on the wire (BEP-15 wants one big-endian `u16` in the last two
//! bytes of a 98-byte request) — that bug is not reproduced here.

use std::net::SocketAddr;
use std::time::Duration;

use rand::random;

use crate::byte_tools::{bytes_to_u32, u32_to_bytes, u64_to_bytes};
use crate::tracker::{peer_addr::PeerAddr, TrackerError};
use crate::transport::UdpTransport;

const PROTOCOL_ID: u64 = 0x41727101980;
const ACTION_CONNECT: u32 = 0;
const ACTION_ANNOUNCE: u32 = 1;
const ACTION_ERROR: u32 = 3;
const EVENT_STARTED: u32 = 2;
const RECEIVE_TIMEOUT: Duration = Duration::from_secs(8);
const MAX_RESPONSE_LEN: usize = 20 + 6 * 200; // headroom for a large swarm

pub struct AnnounceRequest {
    pub info_hash: [u8; 20],
    pub peer_id: [u8; 20],
    pub port: u16,
    pub left: u64,
}

pub struct AnnounceResponse {
    pub interval: u32,
    pub peers: Vec<PeerAddr>,
}

/// Performs one connect+announce round trip against a UDP tracker.
pub fn announce(addr: SocketAddr, request: &AnnounceRequest) -> Result<AnnounceResponse, TrackerError> {
    let transport = UdpTransport::connect(addr, RECEIVE_TIMEOUT)?;

    let connection_id = connect(&transport)?;
    let response = send_announce(&transport, connection_id, request)?;
    Ok(response)
}

fn connect(transport: &UdpTransport) -> Result<u64, TrackerError> {
    let transaction_id: u32 = random();

    let mut packet = Vec::with_capacity(16);
    packet.extend_from_slice(&u64_to_bytes(PROTOCOL_ID));
    packet.extend_from_slice(&u32_to_bytes(ACTION_CONNECT));
    packet.extend_from_slice(&u32_to_bytes(transaction_id));

    let reply = transport.send_and_receive(&packet, 16)?;
    if reply.len() < 16 {
        return Err(TrackerError::ProtocolMismatch);
    }

    let action = bytes_to_u32(&reply[0..4]).ok_or(TrackerError::ProtocolMismatch)?;
    let received_txn_id = bytes_to_u32(&reply[4..8]).ok_or(TrackerError::ProtocolMismatch)?;
    if action != ACTION_CONNECT || received_txn_id != transaction_id {
        return Err(TrackerError::ProtocolMismatch);
    }

    let mut connection_id_bytes = [0u8; 8];
    connection_id_bytes.copy_from_slice(&reply[8..16]);
    Ok(u64::from_be_bytes(connection_id_bytes))
}

fn send_announce(
    transport: &UdpTransport,
    connection_id: u64,
    request: &AnnounceRequest,
) -> Result<AnnounceResponse, TrackerError> {
    let transaction_id: u32 = random();
    let key: u32 = random();

    let mut packet = Vec::with_capacity(98);
    packet.extend_from_slice(&u64_to_bytes(connection_id));
    packet.extend_from_slice(&u32_to_bytes(ACTION_ANNOUNCE));
    packet.extend_from_slice(&u32_to_bytes(transaction_id));
    packet.extend_from_slice(&request.info_hash);
    packet.extend_from_slice(&request.peer_id);
    packet.extend_from_slice(&u64_to_bytes(0)); // downloaded
    packet.extend_from_slice(&u64_to_bytes(request.left));
    packet.extend_from_slice(&u64_to_bytes(0)); // uploaded
    packet.extend_from_slice(&u32_to_bytes(EVENT_STARTED));
    packet.extend_from_slice(&u32_to_bytes(0)); // ip = default
    packet.extend_from_slice(&u32_to_bytes(key));
    packet.extend_from_slice(&(-1i32).to_be_bytes()); // num_want = default
    packet.extend_from_slice(&request.port.to_be_bytes());

    let reply = transport.send_and_receive(&packet, MAX_RESPONSE_LEN)?;
    if reply.len() < 8 {
        return Err(TrackerError::ProtocolMismatch);
    }

    let action = bytes_to_u32(&reply[0..4]).ok_or(TrackerError::ProtocolMismatch)?;
    let received_txn_id = bytes_to_u32(&reply[4..8]).ok_or(TrackerError::ProtocolMismatch)?;
    if received_txn_id != transaction_id {
        return Err(TrackerError::ProtocolMismatch);
    }

    if action == ACTION_ERROR {
        let message = String::from_utf8_lossy(&reply[8..]).into_owned();
        return Err(TrackerError::TrackerFailure(message));
    }
    if action != ACTION_ANNOUNCE || reply.len() < 20 {
        return Err(TrackerError::ProtocolMismatch);
    }

    let interval = bytes_to_u32(&reply[8..12]).ok_or(TrackerError::ProtocolMismatch)?;
    // leechers at [12..16], seeders at [16..20] are not surfaced today.
    let peers = PeerAddr::parse_compact_list(&reply[20..])
        .ok_or(TrackerError::MalformedResponse("peers"))?;

    Ok(AnnounceResponse { interval, peers })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::UdpSocket;
    use std::thread;

    #[test]
    fn full_connect_and_announce_round_trip() {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        let server_addr = server.local_addr().unwrap();

        let handler = thread::spawn(move || {
            let mut buf = [0u8; 128];

            let (len, from) = server.recv_from(&mut buf).unwrap();
            assert_eq!(len, 16);
            let txn_id = &buf[12..16];
            let mut reply = Vec::new();
            reply.extend_from_slice(&ACTION_CONNECT.to_be_bytes());
            reply.extend_from_slice(txn_id);
            reply.extend_from_slice(&99u64.to_be_bytes());
            server.send_to(&reply, from).unwrap();

            let (len, from) = server.recv_from(&mut buf).unwrap();
            assert_eq!(len, 98);
            assert_eq!(&buf[0..8], &99u64.to_be_bytes());
            let txn_id = buf[12..16].to_vec();
            let port_bytes = &buf[96..98];
            assert_eq!(port_bytes, &6881u16.to_be_bytes());

            let mut reply = Vec::new();
            reply.extend_from_slice(&ACTION_ANNOUNCE.to_be_bytes());
            reply.extend_from_slice(&txn_id);
            reply.extend_from_slice(&1800u32.to_be_bytes()); // interval
            reply.extend_from_slice(&0u32.to_be_bytes()); // leechers
            reply.extend_from_slice(&1u32.to_be_bytes()); // seeders
            reply.extend_from_slice(&[127, 0, 0, 1, 0x1A, 0xE1]);
            server.send_to(&reply, from).unwrap();
        });

        let request = AnnounceRequest {
            info_hash: [1u8; 20],
            peer_id: [2u8; 20],
            port: 6881,
            left: 1000,
        };
        let response = announce(server_addr, &request).unwrap();
        assert_eq!(response.interval, 1800);
        assert_eq!(response.peers.len(), 1);
        assert_eq!(response.peers[0].port, 6881);

        handler.join().unwrap();
    }

    #[test]
    fn tracker_error_action_surfaces_message() {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        let server_addr = server.local_addr().unwrap();

        let handler = thread::spawn(move || {
            let mut buf = [0u8; 128];
            let (_len, from) = server.recv_from(&mut buf).unwrap();
            let txn_id = &buf[12..16];
            let mut reply = Vec::new();
            reply.extend_from_slice(&ACTION_CONNECT.to_be_bytes());
            reply.extend_from_slice(txn_id);
            reply.extend_from_slice(&7u64.to_be_bytes());
            server.send_to(&reply, from).unwrap();

            let (_len, from) = server.recv_from(&mut buf).unwrap();
            let txn_id = buf[12..16].to_vec();
            let mut reply = Vec::new();
            reply.extend_from_slice(&ACTION_ERROR.to_be_bytes());
            reply.extend_from_slice(&txn_id);
            reply.extend_from_slice(b"bad info_hash");
            server.send_to(&reply, from).unwrap();
        });

        let request = AnnounceRequest {
            info_hash: [1u8; 20],
            peer_id: [2u8; 20],
            port: 6881,
            left: 1000,
        };
        let result = announce(server_addr, &request);
        match result {
            Err(TrackerError::TrackerFailure(message)) => assert_eq!(message, "bad info_hash"),
            other => panic!("expected TrackerFailure, got {other:?}"),
        }
        handler.join().unwrap();
    }
}
