// MIT License - Copyright (c) 2026 Peter Wright
// Scripted transport for unit tests

use std::collections::VecDeque;
use std::time::Duration;

use super::Transport;
use crate::constants::MSG_ACK;
use crate::error::{OmniError, Result};
use crate::protocol::{Message, Request};

/// Records every request and answers from a scripted queue.
///
/// An empty queue answers with a timeout.
#[derive(Default)]
pub struct MockTransport {
    pub sent: Vec<Request>,
    replies: VecDeque<Result<Message>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_reply(&mut self, msg: Message) -> &mut Self {
        self.replies.push_back(Ok(msg));
        self
    }

    pub fn push_ack(&mut self) -> &mut Self {
        self.push_reply(Message::new(MSG_ACK, Vec::new()))
    }

    pub fn push_error(&mut self, err: OmniError) -> &mut Self {
        self.replies.push_back(Err(err));
        self
    }

    /// Requests sent so far that were `Request::Command`.
    pub fn commands(&self) -> Vec<(u8, u8, u16)> {
        self.sent
            .iter()
            .filter_map(|r| match r {
                Request::Command { cmd, p1, p2 } => Some((*cmd, *p1, *p2)),
                _ => None,
            })
            .collect()
    }
}

impl Transport for MockTransport {
    async fn request(&mut self, request: &Request, _timeout: Duration) -> Result<Message> {
        self.sent.push(request.clone());
        self.replies
            .pop_front()
            .unwrap_or_else(|| Err(OmniError::timeout(request.describe())))
    }
}
