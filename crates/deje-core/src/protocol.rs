//! Gossip envelope and session glue.
//!
//! Peers exchange events and quorums over a pub/sub channel as text lines:
//!
//! ```text
//! deje event {"parent":"","handler":"SET","args":{...}}
//! deje quorum {"event_hash":"...","sigs":{...}}
//! ```
//!
//! The JSON payload is the canonical form, so the receiving peer derives the
//! same hash the sender did. Transport is someone else's problem: anything
//! implementing [`PubSubChannel`] can carry the bytes.
//!
//! Documents are named by `deje://host[:port]/path` URLs. [`parse_url`]
//! splits one into the websocket router to dial and the topic string the
//! document and its timestamp service are keyed by.

use std::fmt;

use tracing::debug;
use url::Url;

use crate::document::Document;
use crate::error::ErrorCode;
use crate::event::Event;
use crate::hash::{HashError, canonical_bytes};
use crate::quorum::Quorum;

const PREFIX: &str = "deje ";

/// Errors from encoding, decoding and publishing messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The bytes do not start with the `deje ` prefix.
    #[error("not a protocol message: {0:?}")]
    NotProtocol(String),

    /// The message kind is neither `event` nor `quorum`.
    #[error("not a valid message type: {0:?}")]
    UnknownKind(String),

    /// The payload is not a valid entity of the announced kind.
    #[error("bad {kind} payload: {source}")]
    Payload {
        kind: MessageKind,
        #[source]
        source: serde_json::Error,
    },

    /// The entity could not be serialized.
    #[error(transparent)]
    Encode(#[from] HashError),

    /// The channel refused the message. Holds its message verbatim.
    #[error("{0}")]
    Channel(String),

    /// The string is not a usable `deje://` URL.
    #[error("invalid deje URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl ProtocolError {
    /// Return the machine-readable error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotProtocol(_) | Self::UnknownKind(_) | Self::Payload { .. } => {
                ErrorCode::MalformedMessage
            }
            Self::Encode(e) => e.code(),
            Self::Channel(_) => ErrorCode::Io,
            Self::InvalidUrl { .. } => ErrorCode::InvalidUrl,
        }
    }
}

/// What a message carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Event,
    Quorum,
}

impl MessageKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Quorum => "quorum",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded gossip message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Event(Event),
    Quorum(Quorum),
}

impl Message {
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        match self {
            Self::Event(_) => MessageKind::Event,
            Self::Quorum(_) => MessageKind::Quorum,
        }
    }

    /// Hash of the carried entity.
    #[must_use]
    pub fn hash(&self) -> &str {
        match self {
            Self::Event(e) => e.hash(),
            Self::Quorum(q) => q.hash(),
        }
    }

    /// Wire bytes: `deje <kind> <canonical json>`.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::Encode`] if the entity cannot be serialized.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let payload = match self {
            Self::Event(e) => canonical_bytes(e)?,
            Self::Quorum(q) => canonical_bytes(q)?,
        };
        let kind = self.kind().as_str();
        let mut out = Vec::with_capacity(PREFIX.len() + kind.len() + 1 + payload.len());
        out.extend_from_slice(PREFIX.as_bytes());
        out.extend_from_slice(kind.as_bytes());
        out.push(b' ');
        out.extend_from_slice(&payload);
        Ok(out)
    }

    /// Parse wire bytes.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::NotProtocol`], [`ProtocolError::UnknownKind`], or
    /// [`ProtocolError::Payload`].
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| ProtocolError::NotProtocol(String::from_utf8_lossy(bytes).into_owned()))?;
        let rest = text
            .strip_prefix(PREFIX)
            .ok_or_else(|| ProtocolError::NotProtocol(text.to_string()))?;
        let (kind, payload) = rest.split_once(' ').unwrap_or((rest, ""));
        match kind {
            "event" => serde_json::from_str(payload)
                .map(Self::Event)
                .map_err(|source| ProtocolError::Payload {
                    kind: MessageKind::Event,
                    source,
                }),
            "quorum" => serde_json::from_str(payload)
                .map(Self::Quorum)
                .map_err(|source| ProtocolError::Payload {
                    kind: MessageKind::Quorum,
                    source,
                }),
            other => Err(ProtocolError::UnknownKind(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Channel + session
// ---------------------------------------------------------------------------

/// Outbound half of a pub/sub transport.
///
/// The inbound half is whatever calls [`Session::on_message`].
pub trait PubSubChannel {
    /// Transport failure, reported verbatim.
    type Error: fmt::Display;

    /// Publish one message to every peer on the channel.
    ///
    /// # Errors
    ///
    /// Whatever the transport reports.
    fn publish(&mut self, payload: &[u8]) -> Result<(), Self::Error>;
}

/// In-process channel: every published payload is queued on the receiver.
impl PubSubChannel for flume::Sender<Vec<u8>> {
    type Error = flume::SendError<Vec<u8>>;

    fn publish(&mut self, payload: &[u8]) -> Result<(), Self::Error> {
        self.send(payload.to_vec())
    }
}

/// Result of handling one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub kind: MessageKind,
    pub hash: String,
    /// `false` if the entity was already registered.
    pub fresh: bool,
}

/// Connects a [`Document`] to a [`PubSubChannel`].
#[derive(Debug)]
pub struct Session<C> {
    channel: C,
}

impl<C: PubSubChannel> Session<C> {
    pub const fn new(channel: C) -> Self {
        Self { channel }
    }

    #[must_use]
    pub const fn channel(&self) -> &C {
        &self.channel
    }

    pub fn into_inner(self) -> C {
        self.channel
    }

    /// Publish an event.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::Encode`] or [`ProtocolError::Channel`].
    pub fn publish_event(&mut self, event: &Event) -> Result<(), ProtocolError> {
        self.publish(&Message::Event(event.clone()))
    }

    /// Publish a quorum.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::Encode`] or [`ProtocolError::Channel`].
    pub fn publish_quorum(&mut self, quorum: &Quorum) -> Result<(), ProtocolError> {
        self.publish(&Message::Quorum(quorum.clone()))
    }

    fn publish(&mut self, message: &Message) -> Result<(), ProtocolError> {
        let bytes = message.encode()?;
        self.channel
            .publish(&bytes)
            .map_err(|e| ProtocolError::Channel(e.to_string()))?;
        debug!(kind = %message.kind(), hash = %message.hash(), "published");
        Ok(())
    }

    /// Decode an inbound message and register its entity with `doc`.
    ///
    /// # Errors
    ///
    /// Any [`Message::decode`] error; `doc` is untouched in that case.
    pub fn on_message(&mut self, doc: &mut Document, bytes: &[u8]) -> Result<Delivery, ProtocolError> {
        let message = Message::decode(bytes)?;
        let kind = message.kind();
        let hash = message.hash().to_string();
        let fresh = match message {
            Message::Event(e) => doc.register_event(e),
            Message::Quorum(q) => doc.register_quorum(q),
        };
        debug!(kind = %kind, hash = %hash, fresh, "received");
        Ok(Delivery { kind, hash, fresh })
    }
}

// ---------------------------------------------------------------------------
// URLs
// ---------------------------------------------------------------------------

const URL_PREFIX: &str = "deje://";
const ROUTER_PATH: &str = "/ws";

/// Where a document lives: the router to dial and its topic there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentUrl {
    /// `ws://host[:port]/ws`.
    pub router: Url,
    /// The full `deje://` URL, with an empty path normalized to `/`.
    pub topic: String,
}

/// Split a `deje://` URL into router and topic.
///
/// ```
/// let url = deje_core::protocol::parse_url("deje://example.org:8080").unwrap();
/// assert_eq!(url.router.as_str(), "ws://example.org:8080/ws");
/// assert_eq!(url.topic, "deje://example.org:8080/");
/// ```
///
/// # Errors
///
/// [`ProtocolError::InvalidUrl`] if the scheme is not `deje`, the URL does
/// not parse, or it has no host.
pub fn parse_url(input: &str) -> Result<DocumentUrl, ProtocolError> {
    let invalid = |reason: String| ProtocolError::InvalidUrl {
        url: input.to_string(),
        reason,
    };
    if !input.starts_with(URL_PREFIX) {
        return Err(invalid("URL does not start with 'deje://'".into()));
    }

    let mut topic = Url::parse(input).map_err(|e| invalid(e.to_string()))?;
    let host = topic
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| invalid("missing host".into()))?
        .to_string();

    // `ws` is a special scheme and `deje` is not, so the router is built
    // fresh rather than by swapping the scheme.
    let mut router = Url::parse("ws://localhost").map_err(|e| invalid(e.to_string()))?;
    router
        .set_host(Some(&host))
        .map_err(|e| invalid(e.to_string()))?;
    router
        .set_port(topic.port())
        .map_err(|()| invalid("cannot carry the port".into()))?;
    router.set_path(ROUTER_PATH);

    if topic.path().is_empty() {
        topic.set_path("/");
    }
    Ok(DocumentUrl {
        router,
        topic: topic.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quorum::QuorumBuilder;
    use serde_json::json;

    struct Refusing;

    impl PubSubChannel for Refusing {
        type Error = String;

        fn publish(&mut self, _payload: &[u8]) -> Result<(), String> {
            Err("channel is down".into())
        }
    }

    #[test]
    fn event_envelope_is_byte_exact() {
        let e = Event::builder("handler_name").build();
        let bytes = Message::Event(e).encode().unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"deje event {"parent":"","handler":"handler_name","args":{}}"#
        );
    }

    #[test]
    fn decode_rejects_foreign_messages() {
        let err = Message::decode(b"hello world").unwrap_err();
        assert!(matches!(err, ProtocolError::NotProtocol(_)));
        assert_eq!(err.code(), ErrorCode::MalformedMessage);

        let err = Message::decode(b"deje blob {}").unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownKind(ref k) if k == "blob"));

        let err = Message::decode(b"deje event").unwrap_err();
        assert!(matches!(err, ProtocolError::Payload { kind: MessageKind::Event, .. }));

        let err = Message::decode(&[0xff, 0xfe]).unwrap_err();
        assert!(matches!(err, ProtocolError::NotProtocol(_)));
    }

    #[test]
    fn session_gossip_between_peers() {
        let (tx, rx) = flume::unbounded();
        let mut alice = Session::new(tx);
        let mut bob = Session::new(Refusing);
        let mut bobs_doc = Document::new("topic");

        let e = Event::set(["k"], json!({"v": [1, 2]})).build();
        let q = Quorum::for_event(&e).sign("alice", "sig").build();
        alice.publish_event(&e).unwrap();
        alice.publish_quorum(&q).unwrap();
        alice.publish_event(&e).unwrap();

        let got: Vec<Delivery> = rx
            .try_iter()
            .map(|bytes| bob.on_message(&mut bobs_doc, &bytes).unwrap())
            .collect();
        assert_eq!(got.len(), 3);
        assert_eq!(got[0].hash, e.hash());
        assert!(got[0].fresh);
        assert_eq!(got[1].kind, MessageKind::Quorum);
        assert!(!got[2].fresh);
        assert_eq!(bobs_doc.events().get(e.hash()), Some(&e));
        assert_eq!(bobs_doc.resolve_checkpoint(q.hash()), Some(&e));
    }

    #[test]
    fn channel_errors_are_verbatim() {
        let mut s = Session::new(Refusing);
        let err = s
            .publish_quorum(&QuorumBuilder::new("abc").build())
            .unwrap_err();
        assert_eq!(err.to_string(), "channel is down");
        assert_eq!(err.code(), ErrorCode::Io);
    }

    #[test]
    fn bad_message_leaves_document_untouched() {
        let mut s = Session::new(Refusing);
        let mut doc = Document::new("t");
        assert!(s.on_message(&mut doc, br#"deje event {"parent": 5}"#).is_err());
        assert!(doc.events().is_empty());
    }

    #[test]
    fn url_splits_into_router_and_topic() {
        let url = parse_url("deje://foo/bar").unwrap();
        assert_eq!(url.router.as_str(), "ws://foo/ws");
        assert_eq!(url.topic, "deje://foo/bar");

        let url = parse_url("deje://foo.bar.baz:8080").unwrap();
        assert_eq!(url.router.as_str(), "ws://foo.bar.baz:8080/ws");
        assert_eq!(url.topic, "deje://foo.bar.baz:8080/");
    }

    #[test]
    fn url_needs_deje_scheme_and_host() {
        for input in ["foo.bar.baz", "//foo.bar.baz:8080", "ws://foo/ws"] {
            let err = parse_url(input).unwrap_err();
            assert_eq!(
                err.to_string(),
                format!("invalid deje URL {input:?}: URL does not start with 'deje://'")
            );
            assert_eq!(err.code(), ErrorCode::InvalidUrl);
        }
        assert!(matches!(
            parse_url("deje://"),
            Err(ProtocolError::InvalidUrl { .. })
        ));
        assert!(parse_url("deje://foo:99999").is_err());
    }

    #[test]
    fn topic_matches_document_topic_key() {
        let url = parse_url("deje://peer.example/notes").unwrap();
        let doc = Document::new(url.topic.clone());
        assert_eq!(doc.topic(), "deje://peer.example/notes");
    }
}
