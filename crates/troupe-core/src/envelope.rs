//! Outbound message records.

use crate::error::ToneError;
use crate::id::NodeId;
use crate::tone::Tone;

/// One outbound message: author, tone, serialized argument data and, for
/// whispers, the explicit recipient.
///
/// Envelopes are immutable once built. Ownership moves into a mailbox on
/// enqueue and into a delivery agent on dequeue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    sender: NodeId,
    tone: Tone,
    message: Vec<u8>,
    recipient: Option<NodeId>,
}

impl Envelope {
    /// Build an envelope for a broadcast tone.
    ///
    /// Use [`Envelope::whisper`] for unicast; a whisper built here has no
    /// recipient and fails [`validate`](Envelope::validate).
    pub fn new(sender: NodeId, tone: Tone, message: impl Into<Vec<u8>>) -> Self {
        Self {
            sender,
            tone,
            message: message.into(),
            recipient: None,
        }
    }

    /// Build a whisper addressed to `recipient`.
    pub fn whisper(sender: NodeId, recipient: NodeId, message: impl Into<Vec<u8>>) -> Self {
        Self {
            sender,
            tone: Tone::Whisper,
            message: message.into(),
            recipient: Some(recipient),
        }
    }

    /// Build an envelope from parts, checking that a whisper names its
    /// recipient.
    pub fn try_new(
        sender: NodeId,
        tone: Tone,
        message: impl Into<Vec<u8>>,
        recipient: Option<NodeId>,
    ) -> Result<Self, ToneError> {
        let envelope = Self {
            sender,
            tone,
            message: message.into(),
            recipient,
        };
        envelope.validate()?;
        Ok(envelope)
    }

    /// Check the tone/recipient pairing.
    pub fn validate(&self) -> Result<(), ToneError> {
        if self.tone.requires_recipient() && self.recipient.is_none() {
            return Err(ToneError::MissingRecipient);
        }
        Ok(())
    }

    /// The author of the message.
    pub fn sender(&self) -> NodeId {
        self.sender
    }

    /// The delivery tone.
    pub fn tone(&self) -> Tone {
        self.tone
    }

    /// Serialized argument data.
    pub fn message(&self) -> &[u8] {
        &self.message
    }

    /// Explicit recipient, present for whispers.
    pub fn recipient(&self) -> Option<NodeId> {
        self.recipient
    }
}
