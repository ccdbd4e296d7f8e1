//! Request and reply representations exchanged with a transport.

use std::borrow::Cow;
use std::sync::LazyLock;

use bytes::Bytes;
use regex::Regex;

use super::config::BASE_1_0;

static MESSAGE_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<(?:\w+:)?rpc-reply\b[^>]*\bmessage-id\s*=\s*["']([^"']*)["']"#)
        .expect("message-id pattern is valid")
});

/// `<rpc-reply>` as the root element, after an optional XML declaration
/// and comments.
static RPC_REPLY_ROOT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*(?:<\?xml.*?\?>\s*)?(?:<!--.*?-->\s*)*<(?:\w+:)?rpc-reply\b")
        .expect("rpc-reply root pattern is valid")
});

/// One outbound request.
///
/// The body is opaque; it is wrapped, never inspected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Identifier correlating the request with its reply.
    pub message_id: String,

    /// Request payload (the operation element).
    pub body: String,
}

impl Request {
    /// Create a request.
    pub fn new(message_id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            body: body.into(),
        }
    }

    /// Render the request as a NETCONF `<rpc>` document.
    pub fn to_rpc_xml(&self) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><rpc message-id="{}" xmlns="{}">{}</rpc>"#,
            self.message_id, BASE_1_0, self.body
        )
    }
}

/// A structured NETCONF `<rpc-reply>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcReply {
    message_id: Option<String>,
    xml: String,
}

impl RpcReply {
    /// Wrap reply XML, extracting its `message-id` when present.
    pub fn new(xml: impl Into<String>) -> Self {
        let xml = xml.into();
        let message_id = MESSAGE_ID
            .captures(&xml)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string());
        Self { message_id, xml }
    }

    /// Parse a received message as an rpc-reply, if it is one.
    pub fn parse(message: &str) -> Option<Self> {
        if RPC_REPLY_ROOT.is_match(message) {
            Some(Self::new(message.trim()))
        } else {
            None
        }
    }

    /// The canonical XML text of the reply.
    pub fn xml(&self) -> &str {
        &self.xml
    }

    /// The `message-id` attribute, if the reply carried one.
    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    /// Whether the reply answers the given request.
    ///
    /// Replies without a `message-id` are accepted as answering any request.
    pub fn correlates_with(&self, request: &Request) -> bool {
        self.message_id
            .as_deref()
            .is_none_or(|id| id == request.message_id)
    }

    /// Whether the reply contains an `<rpc-error>` element.
    pub fn has_rpc_error(&self) -> bool {
        self.xml.contains("rpc-error>")
    }
}

/// Reply returned by a transport.
///
/// Either a recognized structured reply or an opaque value that is coerced
/// to text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// A structured rpc-reply.
    Rpc(RpcReply),

    /// Anything else the transport handed back.
    Raw(Bytes),
}

impl Reply {
    /// Classify a received message.
    pub fn from_message(message: Bytes) -> Self {
        let text = String::from_utf8_lossy(&message);
        match RpcReply::parse(&text) {
            Some(reply) => Reply::Rpc(reply),
            None => Reply::Raw(message),
        }
    }

    /// The normalized text form handed to subscribers and callers.
    pub fn normalize(&self) -> Cow<'_, str> {
        match self {
            Reply::Rpc(reply) => Cow::Borrowed(reply.xml()),
            Reply::Raw(raw) => String::from_utf8_lossy(raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OK_REPLY: &str = r#"<rpc-reply message-id="101" xmlns="urn:ietf:params:xml:ns:netconf:base:1.0"><ok/></rpc-reply>"#;

    #[test]
    fn test_request_wraps_body() {
        let request = Request::new("7", "<get-config><source><running/></source></get-config>");
        let xml = request.to_rpc_xml();
        assert!(xml.contains(r#"<rpc message-id="7""#));
        assert!(xml.ends_with("</get-config></rpc>"));
    }

    #[test]
    fn test_rpc_reply_message_id() {
        let reply = RpcReply::new(OK_REPLY);
        assert_eq!(reply.message_id(), Some("101"));
        assert!(reply.correlates_with(&Request::new("101", "<get/>")));
        assert!(!reply.correlates_with(&Request::new("102", "<get/>")));
        assert!(!reply.has_rpc_error());
    }

    #[test]
    fn test_prefixed_rpc_reply() {
        let reply = RpcReply::new(
            r#"<nc:rpc-reply xmlns:nc="urn:ietf:params:xml:ns:netconf:base:1.0" message-id='5'><nc:rpc-error/></nc:rpc-reply>"#,
        );
        assert_eq!(reply.message_id(), Some("5"));
        assert!(reply.has_rpc_error());
    }

    #[test]
    fn test_reply_without_message_id_correlates() {
        let reply = RpcReply::new("<rpc-reply><ok/></rpc-reply>");
        assert_eq!(reply.message_id(), None);
        assert!(reply.correlates_with(&Request::new("1", "<get/>")));
    }

    #[test]
    fn test_rpc_reply_root_after_declaration() {
        let xml = format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<!-- device -->\n{OK_REPLY}");
        let reply = RpcReply::parse(&xml).unwrap();
        assert_eq!(reply.message_id(), Some("101"));

        assert!(RpcReply::parse("<nc:rpc-reply message-id=\"2\"><ok/></nc:rpc-reply>").is_some());
    }

    #[test]
    fn test_notification_mentioning_rpc_reply_is_raw() {
        let notification = r#"<notification xmlns="urn:ietf:params:xml:ns:netconf:notification:1.0"><eventTime>2026-10-17T09:00:00Z</eventTime><log><msg>sent rpc-reply to peer</msg></log><rpc-reply-count>3</rpc-reply-count></notification>"#;
        assert!(RpcReply::parse(notification).is_none());

        let reply = Reply::from_message(Bytes::copy_from_slice(notification.as_bytes()));
        assert!(matches!(reply, Reply::Raw(_)));
    }

    #[test]
    fn test_classify_messages() {
        let rpc = Reply::from_message(Bytes::from_static(OK_REPLY.as_bytes()));
        assert!(matches!(rpc, Reply::Rpc(_)));
        assert_eq!(rpc.normalize(), OK_REPLY);

        let raw = Reply::from_message(Bytes::from_static(b"<notification/>"));
        assert!(matches!(raw, Reply::Raw(_)));
        assert_eq!(raw.normalize(), "<notification/>");
    }

    #[test]
    fn test_raw_reply_coerced_lossily() {
        let raw = Reply::Raw(Bytes::from_static(b"abc\xffdef"));
        assert_eq!(raw.normalize(), "abc\u{fffd}def");
    }
}
