// MIT License - Copyright (c) 2026 Peter Wright
// Request/reply transport seam

#[cfg(test)]
pub(crate) mod mock;
pub mod session;
pub mod udp;

use std::time::Duration;

use crate::error::{OmniError, Result};
use crate::protocol::{Message, Request};

pub use session::SessionState;
pub use udp::{Inbound, UdpTransport};

/// One request in flight at a time: send, then wait for the matching reply.
///
/// The scheduler and the command dispatcher only ever talk to the controller
/// through this trait.
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Send a request and wait up to `timeout` for the reply carrying the same
    /// sequence number.
    async fn request(&mut self, request: &Request, timeout: Duration) -> Result<Message>;

    /// Send a request whose only valid answer is a generic Ack.
    async fn request_ack(&mut self, request: &Request, timeout: Duration) -> Result<()> {
        let reply = self.request(request, timeout).await?;
        if reply.is_ack() {
            Ok(())
        } else {
            Err(OmniError::UnexpectedReply {
                expected: "Ack".to_string(),
                got: format!("{:#04x}", reply.msg_type),
            })
        }
    }
}
