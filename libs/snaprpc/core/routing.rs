//! Inbound message dispatch
//!
//! Replies go back to whoever is waiting in the correlation table. Pushes,
//! violations and the final close go to the owner of the connection over a
//! channel, in the order the read task saw them.

use crate::correlator::CorrelationTable;
use crate::error::SnapError;
use crate::message::{Inbound, Notification, Response};
use crate::traits::{CloseReason, FrameSink};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Connection-level happenings for the owner of an [`RpcClient`](crate::client::RpcClient)
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    Notification(Notification),
    /// A frame was dropped; the connection is still usable
    Violation(SnapError),
    /// The connection is gone. Always the last event.
    Closed(CloseReason),
}

pub type LinkEvents = mpsc::UnboundedReceiver<LinkEvent>;

/// [`FrameSink`] that classifies frames and settles pending calls
pub struct MessageRouter {
    table: Arc<CorrelationTable>,
    link_tx: mpsc::UnboundedSender<LinkEvent>,
}

impl MessageRouter {
    pub fn new(table: Arc<CorrelationTable>, link_tx: mpsc::UnboundedSender<LinkEvent>) -> Self {
        Self { table, link_tx }
    }

    pub fn route(&self, inbound: Inbound) {
        match inbound {
            Inbound::Response(Response { id, outcome }) => {
                let settled = match outcome {
                    Ok(value) => self.table.resolve(id, value),
                    Err(err) => self.table.reject(id, err.into()),
                };
                if !settled {
                    debug!("Discarding reply {}: no call waiting (timed out or unknown)", id);
                }
            }
            Inbound::Notification(notification) => {
                trace!("<- notification {}", notification.method);
                self.forward(LinkEvent::Notification(notification));
            }
            Inbound::Invalid(reason) => self.on_violation(SnapError::ProtocolViolation(reason)),
        }
    }

    fn forward(&self, event: LinkEvent) {
        if self.link_tx.send(event).is_err() {
            trace!("Link event receiver dropped");
        }
    }
}

impl FrameSink for MessageRouter {
    fn on_frame(&self, frame: Value) {
        self.route(Inbound::classify(frame));
    }

    fn on_violation(&self, error: SnapError) {
        warn!("{}", error);
        self.forward(LinkEvent::Violation(error));
    }

    fn on_closed(&self, reason: CloseReason) {
        let failed = self
            .table
            .fail_all(SnapError::ConnectionClosed(reason.to_string()));
        if failed > 0 {
            debug!("Failed {} pending call(s): {}", failed, reason);
        }
        self.forward(LinkEvent::Closed(reason));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn router() -> (MessageRouter, Arc<CorrelationTable>, LinkEvents) {
        let table = Arc::new(CorrelationTable::new());
        let (tx, rx) = mpsc::unbounded_channel();
        (MessageRouter::new(Arc::clone(&table), tx), table, rx)
    }

    #[test]
    fn test_reply_settles_slot() {
        let (router, table, _events) = router();
        let mut slot = table.register(1).unwrap();

        router.on_frame(json!({"jsonrpc": "2.0", "id": 1, "result": {"server": {}}}));

        assert_eq!(slot.try_recv().unwrap().unwrap(), json!({"server": {}}));
    }

    #[test]
    fn test_error_reply_becomes_remote_error() {
        let (router, table, _events) = router();
        let mut slot = table.register(4).unwrap();

        router.on_frame(json!({"id": 4, "error": {"code": -32602, "message": "Invalid params"}}));

        match slot.try_recv().unwrap() {
            Err(SnapError::Remote { code, message, .. }) => {
                assert_eq!(code, -32602);
                assert_eq!(message, "Invalid params");
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_notifications_and_violations_are_forwarded_in_order() {
        let (router, _table, mut events) = router();

        router.on_frame(json!({"method": "Client.OnConnect", "params": {"id": "a"}}));
        router.on_frame(json!({"id": 1, "method": "Server.GetStatus"}));
        router.on_frame(json!({"method": "Group.OnMute", "params": {"id": "g", "mute": true}}));

        assert!(matches!(events.try_recv(), Ok(LinkEvent::Notification(n)) if n.method == "Client.OnConnect"));
        assert!(matches!(events.try_recv(), Ok(LinkEvent::Violation(SnapError::ProtocolViolation(_)))));
        assert!(matches!(events.try_recv(), Ok(LinkEvent::Notification(n)) if n.method == "Group.OnMute"));
    }

    #[test]
    fn test_close_fails_pending_then_reports() {
        let (router, table, mut events) = router();
        let mut slot = table.register(1).unwrap();

        router.on_closed(CloseReason::PeerClosed);

        assert!(matches!(slot.try_recv().unwrap(), Err(SnapError::ConnectionClosed(_))));
        assert_eq!(events.try_recv().unwrap(), LinkEvent::Closed(CloseReason::PeerClosed));
    }
}
