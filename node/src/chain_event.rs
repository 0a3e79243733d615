//! Notifications emitted once an admission is durable.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use dagchain_types::Block;

use crate::BehaviorFlags;

/// Chain-level events observers can subscribe to via the [`EventBus`].
#[derive(Clone, Debug)]
pub enum ChainEvent {
    /// A block was added to the DAG.
    BlockAccepted {
        block: Arc<Block>,
        tip_changed: bool,
        flags: BehaviorFlags,
    },
    /// An ordered block was connected, with or without ledger effects.
    BlockConnected {
        block: Arc<Block>,
        is_on_main_chain: bool,
    },
    /// A reorganization reversed a block's effects.
    BlockDisconnected { block: Arc<Block> },
}

type Listener = Arc<dyn Fn(&ChainEvent) + Send + Sync>;

/// Fan-out event bus.
///
/// Listeners are invoked inline on the emitting thread; keep handlers fast
/// to avoid stalling block processing. A panicking listener is logged and
/// skipped. Channel subscribers get events through a bounded queue; when a
/// queue is full the event is dropped for that subscriber.
///
/// Cloning is cheap; emitters clone the bus and release its lock before
/// calling out, so a listener may subscribe others.
#[derive(Clone, Default)]
pub struct EventBus {
    listeners: Vec<Listener>,
    channels: Vec<mpsc::Sender<ChainEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: Box<dyn Fn(&ChainEvent) + Send + Sync>) {
        self.listeners.push(Arc::from(listener));
    }

    pub fn subscribe_channel(&mut self, capacity: usize) -> mpsc::Receiver<ChainEvent> {
        self.channels.retain(|tx| !tx.is_closed());
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.channels.push(tx);
        rx
    }

    pub fn emit(&self, event: &ChainEvent) {
        for (index, listener) in self.listeners.iter().enumerate() {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                tracing::warn!(listener = index, "chain event listener panicked");
            }
        }
        for tx in &self.channels {
            match tx.try_send(event.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::warn!("chain event subscriber queue full, dropping event");
                }
                Err(TrySendError::Closed(_)) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn event() -> ChainEvent {
        ChainEvent::BlockDisconnected {
            block: Arc::new(dagchain_types::NetworkParams::regtest().genesis),
        }
    }

    #[test]
    fn emit_calls_all_listeners() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut bus = EventBus::new();

        let c1 = Arc::clone(&counter);
        bus.subscribe(Box::new(move |_| {
            c1.fetch_add(1, Ordering::SeqCst);
        }));
        let c2 = Arc::clone(&counter);
        bus.subscribe(Box::new(move |_| {
            c2.fetch_add(10, Ordering::SeqCst);
        }));

        bus.emit(&event());
        assert_eq!(counter.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn panicking_listener_does_not_stop_the_rest() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut bus = EventBus::new();
        bus.subscribe(Box::new(|_| panic!("listener failure")));
        let c = Arc::clone(&counter);
        bus.subscribe(Box::new(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        }));

        bus.emit(&event());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn full_channel_drops_instead_of_blocking() {
        let mut bus = EventBus::new();
        let mut rx = bus.subscribe_channel(1);
        bus.emit(&event());
        bus.emit(&event());

        assert!(matches!(rx.recv().await, Some(ChainEvent::BlockDisconnected { .. })));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn clone_is_a_snapshot_of_the_listeners() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut bus = EventBus::new();
        let c = Arc::clone(&counter);
        bus.subscribe(Box::new(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        }));

        let snapshot = bus.clone();
        bus.subscribe(Box::new(|_| panic!("added after the snapshot")));
        snapshot.emit(&event());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(bus.listeners.len(), 2);
    }

    #[test]
    fn closed_channels_are_pruned_on_subscribe() {
        let mut bus = EventBus::new();
        drop(bus.subscribe_channel(4));
        let _rx = bus.subscribe_channel(4);
        assert_eq!(bus.channels.len(), 1);
        bus.emit(&event());
    }
}
