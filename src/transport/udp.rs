// MIT License - Copyright (c) 2026 Peter Wright
// UDP packet transport

use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, warn};

use super::Transport;
use super::session::SessionState;
use crate::constants::MAX_DATAGRAM;
use crate::crypto::OmniCrypt;
use crate::error::{OmniError, Result};
use crate::protocol::{Message, Packet, PacketType, Request};

/// A packet accepted by [`UdpTransport::get_packet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Session control packet with its raw payload.
    Control(Packet),
    /// Decrypted, CRC-checked OmniMessage.
    Message(Message),
}

/// Connected UDP socket to the controller.
///
/// Every sent packet takes the next sequence number; a received packet is
/// only accepted when it echoes the last one issued.
pub struct UdpTransport {
    pub(super) socket: UdpSocket,
    pub(super) sequence: u16,
    pub(super) crypt: Option<OmniCrypt>,
    pub(super) state: SessionState,
}

impl UdpTransport {
    pub async fn connect(host: &str, port: u16) -> Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", 0)).await?;
        socket.connect((host, port)).await?;
        debug!("UDP socket bound to {}, peer {}:{}", socket.local_addr()?, host, port);
        Ok(Self {
            socket,
            sequence: 0,
            crypt: None,
            state: SessionState::Unauthenticated,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The sequence number of the last packet sent (0 before the first send).
    pub fn last_sequence(&self) -> u16 {
        self.sequence
    }

    /// Issue the next sequence number. Wraps from 65535 to 1, never 0.
    pub(super) fn next_sequence(&mut self) -> u16 {
        self.sequence = self.sequence.wrapping_add(1);
        if self.sequence == 0 {
            self.sequence = 1;
        }
        self.sequence
    }

    pub(super) async fn send_with_sequence(
        &mut self,
        sequence: u16,
        packet_type: PacketType,
        payload: Vec<u8>,
    ) -> Result<()> {
        let packet = Packet::new(sequence, packet_type, payload);
        self.socket.send(&packet.encode()).await?;
        debug!("Sent {:?} seq {}", packet_type, sequence);
        Ok(())
    }

    /// Send a session control packet under a fresh sequence number.
    pub async fn send_packet(&mut self, packet_type: PacketType, payload: Vec<u8>) -> Result<u16> {
        let sequence = self.next_sequence();
        self.send_with_sequence(sequence, packet_type, payload).await?;
        Ok(sequence)
    }

    /// Encrypt and send an OmniMessage under a fresh sequence number.
    pub async fn send_message(&mut self, msg: &Message) -> Result<u16> {
        let sequence = self.next_sequence();
        let crypt = self.crypt.as_ref().ok_or(OmniError::Disconnected)?;
        let payload = crypt.encrypt(&msg.encode(), sequence);
        self.send_with_sequence(sequence, PacketType::OmniMessage, payload)
            .await?;
        Ok(sequence)
    }

    /// Receive until a packet echoing the current sequence arrives or
    /// `timeout` elapses.
    ///
    /// Stale and undecodable datagrams are dropped. OmniMessage payloads are
    /// decrypted and checked; a bad CRC, an oversize length or a Nak is
    /// returned as an error straight away.
    pub async fn get_packet(&mut self, timeout: Duration) -> Result<Inbound> {
        let deadline = Instant::now() + timeout;
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let len = match timeout_at(deadline, self.socket.recv(&mut buf)).await {
                Ok(res) => res?,
                Err(_) => return Err(OmniError::timeout("controller reply")),
            };

            let packet = match Packet::decode(&buf[..len]) {
                Ok(p) => p,
                Err(e) => {
                    warn!("Dropping datagram: {}", e);
                    continue;
                }
            };
            if packet.sequence != self.sequence {
                debug!(
                    "Discarding {:?} with seq {} (expecting {})",
                    packet.packet_type, packet.sequence, self.sequence
                );
                continue;
            }

            if packet.packet_type != PacketType::OmniMessage {
                return Ok(Inbound::Control(packet));
            }
            let crypt = self
                .crypt
                .as_ref()
                .ok_or_else(|| OmniError::malformed("OmniMessage before secure session"))?;
            let plain = crypt.decrypt(&packet.payload, packet.sequence)?;
            let msg = Message::decode(&plain)?;
            debug!("Received message type {:#04x} seq {}", msg.msg_type, packet.sequence);
            return Ok(Inbound::Message(msg));
        }
    }

    /// Wait for a generic Ack. Absence of a reply, or any other message type,
    /// is `Ok(false)`; decoding errors still propagate.
    pub async fn wait_ack(&mut self, timeout: Duration) -> Result<bool> {
        match self.get_packet(timeout).await {
            Ok(Inbound::Message(msg)) => Ok(msg.is_ack()),
            Ok(Inbound::Control(_)) => Ok(false),
            Err(e) if e.is_timeout() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

impl Transport for UdpTransport {
    async fn request(&mut self, request: &Request, timeout: Duration) -> Result<Message> {
        self.send_message(&request.to_message()).await?;
        match self.get_packet(timeout).await {
            Ok(Inbound::Message(reply)) => Ok(reply),
            Ok(Inbound::Control(packet))
                if matches!(
                    packet.packet_type,
                    PacketType::TerminateSession | PacketType::AckTerminateSession
                ) =>
            {
                warn!("Controller terminated the session");
                self.crypt = None;
                self.state = SessionState::Unauthenticated;
                Err(OmniError::Disconnected)
            }
            Ok(Inbound::Control(packet)) => Err(OmniError::UnexpectedReply {
                expected: format!("reply to {}", request.describe()),
                got: format!("{:?}", packet.packet_type),
            }),
            Err(e) if e.is_timeout() => Err(OmniError::timeout(request.describe())),
            Err(e) => Err(e),
        }
    }
}

impl std::fmt::Debug for UdpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdpTransport")
            .field("sequence", &self.sequence)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{MSG_ACK, MSG_ZONE_STATUS};

    const KEY: [u8; 16] = [7; 16];

    async fn pair() -> (UdpTransport, UdpSocket) {
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = peer.local_addr().unwrap().port();
        let mut transport = UdpTransport::connect("127.0.0.1", port).await.unwrap();
        transport.crypt = Some(OmniCrypt::new(&KEY));
        (transport, peer)
    }

    async fn reply(peer: &UdpSocket, to: std::net::SocketAddr, seq: u16, msg: &Message) {
        let crypt = OmniCrypt::new(&KEY);
        let pkt = Packet::new(seq, PacketType::OmniMessage, crypt.encrypt(&msg.encode(), seq));
        peer.send_to(&pkt.encode(), to).await.unwrap();
    }

    async fn recv_request(peer: &UdpSocket) -> (Packet, std::net::SocketAddr) {
        let mut buf = [0u8; MAX_DATAGRAM];
        let (n, from) = peer.recv_from(&mut buf).await.unwrap();
        (Packet::decode(&buf[..n]).unwrap(), from)
    }

    #[tokio::test]
    async fn test_sequence_never_zero() {
        let (mut transport, _peer) = pair().await;
        transport.sequence = 0xFFFD;
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(transport.next_sequence());
        }
        assert_eq!(seen, vec![0xFFFE, 0xFFFF, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_request_skips_stale_sequence() {
        let (mut transport, peer) = pair().await;
        let server = tokio::spawn(async move {
            let (pkt, from) = recv_request(&peer).await;
            assert_eq!(pkt.sequence, 1);
            let zones = Message::new(MSG_ZONE_STATUS, vec![0, 0]);
            // stale first, then the real reply
            reply(&peer, from, 99, &Message::new(MSG_ACK, Vec::new())).await;
            reply(&peer, from, pkt.sequence, &zones).await;
        });

        let msg = transport
            .request(&Request::ZoneStatus { first: 1, last: 1 }, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(msg.msg_type, MSG_ZONE_STATUS);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_request_times_out() {
        let (mut transport, _peer) = pair().await;
        let err = transport
            .request(&Request::SystemStatus, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(err.to_string().contains("system status"));
    }

    #[tokio::test]
    async fn test_crc_failure_is_raised() {
        let (mut transport, peer) = pair().await;
        let server = tokio::spawn(async move {
            let (pkt, from) = recv_request(&peer).await;
            let mut bytes = Message::new(MSG_ZONE_STATUS, vec![1, 2]).encode();
            bytes[3] ^= 0xFF;
            let crypt = OmniCrypt::new(&KEY);
            let out = Packet::new(
                pkt.sequence,
                PacketType::OmniMessage,
                crypt.encrypt(&bytes, pkt.sequence),
            );
            peer.send_to(&out.encode(), from).await.unwrap();
        });

        let err = transport
            .request(&Request::ZoneStatus { first: 1, last: 1 }, Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, OmniError::CrcMismatch { .. }));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_terminate_while_waiting_is_disconnect() {
        let (mut transport, peer) = pair().await;
        let server = tokio::spawn(async move {
            let (pkt, from) = recv_request(&peer).await;
            let out = Packet::new(pkt.sequence, PacketType::AckTerminateSession, Vec::new());
            peer.send_to(&out.encode(), from).await.unwrap();
        });

        let err = transport
            .request(&Request::SystemEvents, Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, OmniError::Disconnected));
        assert!(transport.crypt.is_none());
        server.await.unwrap();
    }
}
