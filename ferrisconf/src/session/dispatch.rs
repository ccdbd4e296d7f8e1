//! Request dispatch and subscriber notification.

use log::trace;

use crate::error::{Result, SessionError};
use crate::transport::{Reply, Request, Transport};

/// Callback receiving every normalized response, line-terminated.
pub type Subscriber = Box<dyn FnMut(&str) + Send>;

/// Wraps outbound requests, normalizes replies and notifies subscribers.
///
/// Every completed dispatch notifies each subscriber exactly once, in
/// registration order, before the result is handed back to the caller.
/// Callers that ignore the result still produce a notification.
#[derive(Default)]
pub struct ResponseDispatcher {
    subscribers: Vec<Subscriber>,
    next_message_id: u64,
    last_response: Option<String>,
}

impl ResponseDispatcher {
    /// Create a dispatcher with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber. Subscribers are notified in registration order.
    pub fn subscribe<F>(&mut self, subscriber: F)
    where
        F: FnMut(&str) + Send + 'static,
    {
        self.subscribers.push(Box::new(subscriber));
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// The most recent normalized response.
    pub fn last_response(&self) -> Option<&str> {
        self.last_response.as_deref()
    }

    /// Dispatch one payload through `transport`.
    ///
    /// Returns the normalized response, or `None` when `ignore_result` is set.
    pub async fn dispatch<T: Transport>(
        &mut self,
        transport: &T,
        session: &mut T::Session,
        payload: &str,
        ignore_result: bool,
    ) -> Result<Option<String>> {
        let request = self.next_request(payload)?;
        trace!("dispatch: message-id {}", request.message_id);

        let reply = transport.dispatch_rpc(session, &request).await?;
        let response = self.publish(&reply);

        Ok(if ignore_result { None } else { Some(response) })
    }

    /// Build the request for `payload`, assigning the next message id.
    fn next_request(&mut self, payload: &str) -> Result<Request> {
        let body = payload.trim();
        if body.is_empty() {
            return Err(SessionError::EmptyPayload.into());
        }

        self.next_message_id += 1;
        Ok(Request::new(self.next_message_id.to_string(), body))
    }

    /// Normalize `reply`, record it and notify every subscriber.
    fn publish(&mut self, reply: &Reply) -> String {
        let response = reply.normalize().into_owned();

        let line = format!("{response}\n");
        for subscriber in &mut self.subscribers {
            subscriber(&line);
        }

        self.last_response = Some(response.clone());
        response
    }
}

impl std::fmt::Debug for ResponseDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseDispatcher")
            .field("subscribers", &self.subscribers.len())
            .field("next_message_id", &self.next_message_id)
            .field("last_response", &self.last_response)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use crate::account::Credentials;
    use crate::error::Error;
    use crate::transport::stub::{StubSession, StubTransport};

    async fn open(transport: &StubTransport) -> StubSession {
        transport
            .connect("router", 830, Credentials::None { username: None })
            .await
            .unwrap()
    }

    fn recording(dispatcher: &mut ResponseDispatcher) -> Arc<Mutex<Vec<String>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        dispatcher.subscribe(move |line| sink.lock().unwrap().push(line.to_string()));
        seen
    }

    #[tokio::test]
    async fn test_ignored_result_still_notifies() {
        let transport = StubTransport::new().accept_anonymous();
        let mut session = open(&transport).await;
        let mut dispatcher = ResponseDispatcher::new();
        let seen = recording(&mut dispatcher);

        let result = dispatcher
            .dispatch(&transport, &mut session, "<get/>", true)
            .await
            .unwrap();

        assert_eq!(result, None);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].contains("<data><get/></data>"));
        assert!(seen[0].ends_with('\n'));
    }

    #[tokio::test]
    async fn test_result_matches_notification() {
        let transport = StubTransport::new().accept_anonymous();
        let mut session = open(&transport).await;
        let mut dispatcher = ResponseDispatcher::new();
        let seen = recording(&mut dispatcher);

        let result = dispatcher
            .dispatch(&transport, &mut session, "<get-config/>", false)
            .await
            .unwrap()
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.last().unwrap(), &format!("{result}\n"));
        assert_eq!(dispatcher.last_response(), Some(result.as_str()));
    }

    #[tokio::test]
    async fn test_subscribers_notified_in_order() {
        let transport = StubTransport::new().accept_anonymous();
        let mut session = open(&transport).await;
        let mut dispatcher = ResponseDispatcher::new();

        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let order = order.clone();
            dispatcher.subscribe(move |_| order.lock().unwrap().push(tag));
        }

        dispatcher
            .dispatch(&transport, &mut session, "<get/>", true)
            .await
            .unwrap();

        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
        assert_eq!(dispatcher.subscriber_count(), 3);
    }

    #[tokio::test]
    async fn test_stateful_subscriber_without_sync() {
        let transport = StubTransport::new().accept_anonymous();
        let mut session = open(&transport).await;
        let mut dispatcher = ResponseDispatcher::new();

        // Cell is Send but not Sync
        let counter = std::cell::Cell::new(0);
        let counts = Arc::new(Mutex::new(Vec::new()));
        let sink = counts.clone();
        dispatcher.subscribe(move |_| {
            counter.set(counter.get() + 1);
            sink.lock().unwrap().push(counter.get());
        });

        for payload in ["<get/>", "<get-config/>"] {
            dispatcher
                .dispatch(&transport, &mut session, payload, true)
                .await
                .unwrap();
        }

        assert_eq!(*counts.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_notifications_follow_dispatch_order() {
        let transport = StubTransport::new().accept_anonymous();
        let mut session = open(&transport).await;
        let mut dispatcher = ResponseDispatcher::new();
        let seen = recording(&mut dispatcher);

        for payload in ["<a/>", "<b/>", "<c/>"] {
            dispatcher
                .dispatch(&transport, &mut session, payload, true)
                .await
                .unwrap();
        }

        let seen = seen.lock().unwrap();
        assert!(seen[0].contains("<a/>"));
        assert!(seen[1].contains("<b/>"));
        assert!(seen[2].contains("<c/>"));

        let ids: Vec<_> = transport
            .requests()
            .into_iter()
            .map(|r| r.message_id)
            .collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn test_normalization_is_stable() {
        let transport = StubTransport::new().accept_anonymous();
        let mut session = open(&transport).await;
        let mut dispatcher = ResponseDispatcher::new();

        let first = dispatcher
            .dispatch(&transport, &mut session, "<get/>", false)
            .await
            .unwrap();
        let second = dispatcher
            .dispatch(&transport, &mut session, "<get/>", false)
            .await
            .unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_raw_reply_coerced_to_text() {
        let transport = StubTransport::new()
            .accept_anonymous()
            .raw_reply_for("<ping/>");
        let mut session = open(&transport).await;
        let mut dispatcher = ResponseDispatcher::new();
        let seen = recording(&mut dispatcher);

        let result = dispatcher
            .dispatch(&transport, &mut session, "<ping/>", false)
            .await
            .unwrap();

        assert_eq!(result.as_deref(), Some("raw:<ping/>"));
        assert_eq!(seen.lock().unwrap()[0], "raw:<ping/>\n");
    }

    #[tokio::test]
    async fn test_empty_payload_rejected_without_notification() {
        let transport = StubTransport::new().accept_anonymous();
        let mut session = open(&transport).await;
        let mut dispatcher = ResponseDispatcher::new();
        let seen = recording(&mut dispatcher);

        let err = dispatcher
            .dispatch(&transport, &mut session, "   ", false)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Session(SessionError::EmptyPayload)));
        assert!(seen.lock().unwrap().is_empty());
        assert!(transport.requests().is_empty());
    }
}
