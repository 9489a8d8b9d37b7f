// MIT License - Copyright (c) 2026 Peter Wright
// Secure session negotiation and login

use std::time::Duration;

use tracing::{debug, info, warn};

use super::udp::{Inbound, UdpTransport};
use crate::constants::SESSION_ID_LEN;
use crate::crypto::{OmniCrypt, derive_session_key};
use crate::error::{OmniError, Result};
use crate::protocol::{PacketType, Request};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    KeyNegotiated,
    SecureSessionActive,
    LoggedIn,
}

fn handshake_failed(stage: impl Into<String>) -> OmniError {
    OmniError::HandshakeFailed {
        stage: stage.into(),
    }
}

impl UdpTransport {
    /// Negotiate a new encrypted session.
    ///
    /// Sequence: RequestNewSession → AckNewSession (session material) →
    /// derive key → RequestSecureSession → AckSecureSession. Each wait is
    /// bounded by `wait`; a timeout, a Nak or any other packet fails the
    /// handshake.
    pub async fn establish_session(&mut self, private_key: &[u8; 16], wait: Duration) -> Result<()> {
        self.crypt = None;
        self.state = SessionState::Unauthenticated;

        debug!("Requesting new session");
        self.send_packet(PacketType::RequestNewSession, Vec::new())
            .await?;
        let ack = self
            .expect_control(PacketType::AckNewSession, wait, "new session")
            .await?;
        if ack.len() < SESSION_ID_LEN {
            return Err(handshake_failed(format!(
                "new session ack carried {} bytes of session material",
                ack.len()
            )));
        }
        let mut session_id = [0u8; SESSION_ID_LEN];
        session_id.copy_from_slice(&ack[ack.len() - SESSION_ID_LEN..]);

        let crypt = OmniCrypt::new(&derive_session_key(private_key, &session_id));
        self.state = SessionState::KeyNegotiated;

        debug!("Requesting secure session");
        let sequence = self.next_sequence();
        let payload = crypt.encrypt(&session_id, sequence);
        self.send_with_sequence(sequence, PacketType::RequestSecureSession, payload)
            .await?;
        let echo = self
            .expect_control(PacketType::AckSecureSession, wait, "secure session")
            .await?;
        let echo = crypt
            .decrypt(&echo, sequence)
            .map_err(|_| handshake_failed("secure session ack is not a whole block"))?;
        if echo[..SESSION_ID_LEN] != session_id {
            return Err(handshake_failed("secure session ack does not echo the session id"));
        }

        self.crypt = Some(crypt);
        self.state = SessionState::SecureSessionActive;
        info!("Secure session established");
        Ok(())
    }

    /// Log in with the 4-digit login code.
    ///
    /// A refused login is `Ok(false)`: a wrong code is common and the whole
    /// connect cycle is simply retried later.
    pub async fn login(&mut self, code: [u8; 4], wait: Duration) -> Result<bool> {
        self.send_message(&Request::Login { code }.to_message())
            .await?;
        let accepted = match self.wait_ack(wait).await {
            Ok(accepted) => accepted,
            Err(OmniError::Nak) => false,
            Err(e) => return Err(e),
        };
        if accepted {
            self.state = SessionState::LoggedIn;
            info!("Logged in to controller");
        } else {
            warn!("Controller refused the login code");
        }
        Ok(accepted)
    }

    /// Log out and terminate the session. Best effort; never fails.
    pub async fn terminate(&mut self, wait: Duration) {
        if self.state == SessionState::LoggedIn
            && self
                .send_message(&Request::Logout.to_message())
                .await
                .is_ok()
        {
            let _ = self.wait_ack(wait).await;
        }
        if self.state != SessionState::Unauthenticated
            && self
                .send_packet(PacketType::TerminateSession, Vec::new())
                .await
                .is_ok()
        {
            match self.get_packet(wait).await {
                Ok(Inbound::Control(p)) if p.packet_type == PacketType::AckTerminateSession => {
                    debug!("Controller acknowledged session termination");
                }
                _ => debug!("No acknowledgement of session termination"),
            }
        }
        self.crypt = None;
        self.state = SessionState::Unauthenticated;
    }

    async fn expect_control(
        &mut self,
        expected: PacketType,
        wait: Duration,
        stage: &str,
    ) -> Result<Vec<u8>> {
        match self.get_packet(wait).await {
            Ok(Inbound::Control(p)) if p.packet_type == expected => Ok(p.payload),
            Ok(Inbound::Control(p)) if p.packet_type == PacketType::NakNewSession => {
                Err(handshake_failed(format!("controller refused {stage}")))
            }
            Ok(other) => Err(handshake_failed(format!(
                "unexpected reply to {stage} request: {other:?}"
            ))),
            Err(e) if e.is_timeout() => Err(handshake_failed(format!("no reply to {stage} request"))),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{MAX_DATAGRAM, MSG_ACK, MSG_NAK};
    use crate::protocol::{Message, Packet};
    use tokio::net::UdpSocket;

    const KEY: [u8; 16] = [
        1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16,
    ];
    const SESSION: [u8; 5] = [0xA1, 0xB2, 0xC3, 0xD4, 0xE5];

    async fn recv(peer: &UdpSocket) -> (Packet, std::net::SocketAddr) {
        let mut buf = [0u8; MAX_DATAGRAM];
        let (n, from) = peer.recv_from(&mut buf).await.unwrap();
        (Packet::decode(&buf[..n]).unwrap(), from)
    }

    /// Fake controller side of the handshake; answers the login with `login_reply`.
    async fn controller(peer: UdpSocket, login_reply: u8) {
        let (req, from) = recv(&peer).await;
        assert_eq!(req.packet_type, PacketType::RequestNewSession);
        let mut payload = vec![0x01, 0x03];
        payload.extend_from_slice(&SESSION);
        let ack = Packet::new(req.sequence, PacketType::AckNewSession, payload);
        peer.send_to(&ack.encode(), from).await.unwrap();

        let crypt = OmniCrypt::new(&derive_session_key(&KEY, &SESSION));
        let (req, from) = recv(&peer).await;
        assert_eq!(req.packet_type, PacketType::RequestSecureSession);
        let plain = crypt.decrypt(&req.payload, req.sequence).unwrap();
        assert_eq!(plain[..5], SESSION);
        let ack = Packet::new(
            req.sequence,
            PacketType::AckSecureSession,
            crypt.encrypt(&plain[..5], req.sequence),
        );
        peer.send_to(&ack.encode(), from).await.unwrap();

        let (req, from) = recv(&peer).await;
        let msg = Message::decode(&crypt.decrypt(&req.payload, req.sequence).unwrap()).unwrap();
        assert_eq!(msg.data, vec![1, 2, 3, 4]);
        let reply = Message::new(login_reply, Vec::new()).encode();
        let out = Packet::new(
            req.sequence,
            PacketType::OmniMessage,
            crypt.encrypt(&reply, req.sequence),
        );
        peer.send_to(&out.encode(), from).await.unwrap();
    }

    async fn connect() -> (UdpTransport, UdpSocket) {
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = peer.local_addr().unwrap().port();
        (UdpTransport::connect("127.0.0.1", port).await.unwrap(), peer)
    }

    #[tokio::test]
    async fn test_handshake_and_login() {
        let (mut transport, peer) = connect().await;
        let server = tokio::spawn(controller(peer, MSG_ACK));

        let wait = Duration::from_secs(2);
        transport.establish_session(&KEY, wait).await.unwrap();
        assert_eq!(transport.state(), SessionState::SecureSessionActive);
        assert!(transport.login([1, 2, 3, 4], wait).await.unwrap());
        assert_eq!(transport.state(), SessionState::LoggedIn);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_login_refused_is_soft() {
        let (mut transport, peer) = connect().await;
        let server = tokio::spawn(controller(peer, MSG_NAK));

        let wait = Duration::from_secs(2);
        transport.establish_session(&KEY, wait).await.unwrap();
        assert!(!transport.login([1, 2, 3, 4], wait).await.unwrap());
        assert_eq!(transport.state(), SessionState::SecureSessionActive);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_new_session_nak_fails_handshake() {
        let (mut transport, peer) = connect().await;
        let server = tokio::spawn(async move {
            let (req, from) = recv(&peer).await;
            let nak = Packet::new(req.sequence, PacketType::NakNewSession, Vec::new());
            peer.send_to(&nak.encode(), from).await.unwrap();
        });

        let err = transport
            .establish_session(&KEY, Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, OmniError::HandshakeFailed { .. }));
        assert_eq!(transport.state(), SessionState::Unauthenticated);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_silent_controller_fails_handshake() {
        let (mut transport, _peer) = connect().await;
        let err = transport
            .establish_session(&KEY, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, OmniError::HandshakeFailed { .. }));
    }
}
