//! Event stream emitted towards the outer process.

use crate::model::{Rundown, RundownSegment};
use nwgnrcs::{RundownId, SegmentId};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Everything the watcher tells the outside world.
///
/// Data events follow the emission order of one poll cycle strictly;
/// events from a later poll never interleave with an earlier one.
#[derive(Clone, Debug)]
pub enum WatcherEvent {
    Info(String),
    Warning(String),
    Error(String),
    RundownCreate {
        rundown_id: RundownId,
        rundown: Rundown,
    },
    RundownUpdate {
        rundown_id: RundownId,
        rundown: Rundown,
    },
    RundownDelete {
        rundown_id: RundownId,
    },
    SegmentCreate {
        rundown_id: RundownId,
        segment_id: SegmentId,
        segment: RundownSegment,
    },
    SegmentUpdate {
        rundown_id: RundownId,
        segment_id: SegmentId,
        segment: RundownSegment,
    },
    SegmentDelete {
        rundown_id: RundownId,
        segment_id: SegmentId,
    },
    /// Coalesced rank reassignment: the full rank map of one rundown.
    SegmentRanksUpdate {
        rundown_id: RundownId,
        ranks: BTreeMap<SegmentId, f64>,
    },
}

/// Fan-out bus for [`WatcherEvent`].
///
/// Subscribers that dropped their receiver are pruned on the next
/// broadcast. Sending never blocks; listeners must not call back into the
/// watcher without going through its public operations.
#[derive(Clone, Default)]
pub struct WatcherEventBus {
    subscribers: Arc<Mutex<Vec<UnboundedSender<WatcherEvent>>>>,
}

impl WatcherEventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn subscribe(&self) -> UnboundedReceiver<WatcherEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut subscribers = self.subscribers.lock().unwrap();
            subscribers.push(tx);
        }
        rx
    }

    pub fn broadcast(&self, event: WatcherEvent) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_reaches_all_subscribers() {
        let bus = WatcherEventBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.broadcast(WatcherEvent::Info("hello".to_string()));

        assert!(matches!(rx1.recv().await, Some(WatcherEvent::Info(_))));
        assert!(matches!(rx2.recv().await, Some(WatcherEvent::Info(_))));
    }

    #[tokio::test]
    async fn test_dead_subscribers_are_pruned() {
        let bus = WatcherEventBus::new();
        let rx = bus.subscribe();
        drop(rx);

        let mut alive = bus.subscribe();
        bus.broadcast(WatcherEvent::Info("still here".to_string()));

        assert!(matches!(alive.recv().await, Some(WatcherEvent::Info(_))));
        assert_eq!(bus.subscribers.lock().unwrap().len(), 1);
    }
}
