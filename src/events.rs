//! Engine notifications and their delivery to the host.
//!
//! The engine enqueues owned [`WalletEvent`] values through an [`EventSink`]
//! while it still holds its state lock, so the queue order is the order the
//! changes were made. One delivery thread per session drains the queue and
//! calls the attached [`WalletListener`].

use crate::types::{Utxo, WalletStatus};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletEvent {
    /// `done == total` means the wallet caught up with the node.
    SyncProgress { done: u64, total: u64 },
    SystemStateChanged,
    KeychainChanged,
    TransactionChanged,
    TxPeerChanged,
    AddressChanged,
    AllUtxoChanged(Vec<Utxo>),
    Status(WalletStatus),
}

const EVENT_KINDS: usize = 8;

impl WalletEvent {
    fn kind(&self) -> usize {
        match self {
            WalletEvent::SyncProgress { .. } => 0,
            WalletEvent::SystemStateChanged => 1,
            WalletEvent::KeychainChanged => 2,
            WalletEvent::TransactionChanged => 3,
            WalletEvent::TxPeerChanged => 4,
            WalletEvent::AddressChanged => 5,
            WalletEvent::AllUtxoChanged(_) => 6,
            WalletEvent::Status(_) => 7,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            WalletEvent::SyncProgress { .. } => "sync_progress",
            WalletEvent::SystemStateChanged => "system_state_changed",
            WalletEvent::KeychainChanged => "keychain_changed",
            WalletEvent::TransactionChanged => "transaction_changed",
            WalletEvent::TxPeerChanged => "tx_peer_changed",
            WalletEvent::AddressChanged => "address_changed",
            WalletEvent::AllUtxoChanged(_) => "all_utxo_changed",
            WalletEvent::Status(_) => "status",
        }
    }
}

/// Host-side receiver of session events. Every method defaults to a no-op.
///
/// Calls arrive on the session's delivery thread, one at a time.
#[allow(unused_variables)]
pub trait WalletListener: Send + Sync {
    fn on_sync_progress(&self, done: u64, total: u64) {}

    fn on_system_state_changed(&self) {}

    fn on_keychain_changed(&self) {}

    fn on_transaction_changed(&self) {}

    fn on_tx_peer_changed(&self) {}

    fn on_address_changed(&self) {}

    fn on_all_utxo_changed(&self, utxos: &[Utxo]) {}

    fn on_status(&self, status: &WalletStatus) {}
}

fn deliver(listener: &dyn WalletListener, event: &WalletEvent) {
    match event {
        WalletEvent::SyncProgress { done, total } => listener.on_sync_progress(*done, *total),
        WalletEvent::SystemStateChanged => listener.on_system_state_changed(),
        WalletEvent::KeychainChanged => listener.on_keychain_changed(),
        WalletEvent::TransactionChanged => listener.on_transaction_changed(),
        WalletEvent::TxPeerChanged => listener.on_tx_peer_changed(),
        WalletEvent::AddressChanged => listener.on_address_changed(),
        WalletEvent::AllUtxoChanged(utxos) => listener.on_all_utxo_changed(utxos),
        WalletEvent::Status(status) => listener.on_status(status),
    }
}

enum Message {
    Event { seq: u64, event: WalletEvent },
    Stop,
}

/// Cloneable producer side of a session's event queue.
#[derive(Clone)]
pub struct EventSink {
    sender: UnboundedSender<Message>,
    next_seq: Arc<AtomicU64>,
}

impl EventSink {
    /// Queues `event`. Dropped silently once the session is closing.
    pub fn emit(&self, event: WalletEvent) {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let _ = self.sender.send(Message::Event { seq, event });
    }
}

struct Shared {
    listener: Mutex<Option<Arc<dyn WalletListener>>>,
    /// Held for the whole of each listener call.
    delivery: Mutex<()>,
    suppressed: AtomicBool,
}

impl Shared {
    fn listener(&self) -> Option<Arc<dyn WalletListener>> {
        self.listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn delivery(&self) -> MutexGuard<'_, ()> {
        self.delivery.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct EventDispatcher {
    shared: Arc<Shared>,
    sink: EventSink,
    thread: Mutex<Option<JoinHandle<()>>>,
    thread_id: Option<ThreadId>,
}

impl EventDispatcher {
    /// Starts the delivery thread for one session.
    pub fn start(label: &str) -> std::io::Result<Self> {
        let (sender, receiver) = unbounded_channel();
        let shared = Arc::new(Shared {
            listener: Mutex::new(None),
            delivery: Mutex::new(()),
            suppressed: AtomicBool::new(false),
        });

        let worker_shared = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name(format!("wallet-events-{}", label))
            .spawn(move || delivery_loop(receiver, worker_shared))?;
        let thread_id = Some(thread.thread().id());

        Ok(Self {
            shared,
            sink: EventSink {
                sender,
                next_seq: Arc::new(AtomicU64::new(1)),
            },
            thread: Mutex::new(Some(thread)),
            thread_id,
        })
    }

    pub fn sink(&self) -> EventSink {
        self.sink.clone()
    }

    /// Replaces the listener. `None` detaches; queued events are then dropped.
    pub fn set_listener(&self, listener: Option<Arc<dyn WalletListener>>) {
        *self
            .shared
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = listener;
    }

    fn on_delivery_thread(&self) -> bool {
        self.thread_id == Some(thread::current().id())
    }

    /// Stops all further delivery. Returns once no listener call is running,
    /// except when called from a listener, which cannot wait for itself.
    pub fn suppress(&self) {
        if self.on_delivery_thread() {
            self.shared.suppressed.store(true, Ordering::SeqCst);
            return;
        }
        let _guard = self.shared.delivery();
        self.shared.suppressed.store(true, Ordering::SeqCst);
    }

    pub fn is_suppressed(&self) -> bool {
        self.shared.suppressed.load(Ordering::SeqCst)
    }

    /// Suppresses delivery and ends the delivery thread.
    pub fn shutdown(&self) {
        self.suppress();
        let _ = self.sink.sender.send(Message::Stop);

        let thread = self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(thread) = thread {
            if self.on_delivery_thread() {
                // the loop exits on its own after the current callback
                return;
            }
            if thread.join().is_err() {
                tracing::error!("event delivery thread panicked");
            }
        }
    }
}

impl Drop for EventDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn delivery_loop(mut receiver: UnboundedReceiver<Message>, shared: Arc<Shared>) {
    let mut last_delivered = [0u64; EVENT_KINDS];

    while let Some(message) = receiver.blocking_recv() {
        let (seq, event) = match message {
            Message::Event { seq, event } => (seq, event),
            Message::Stop => break,
        };

        let _guard = shared.delivery();
        if shared.suppressed.load(Ordering::SeqCst) {
            break;
        }

        let kind = event.kind();
        if seq <= last_delivered[kind] {
            tracing::debug!(seq, event = event.name(), "dropping stale event");
            continue;
        }
        last_delivered[kind] = seq;

        let Some(listener) = shared.listener() else {
            continue;
        };
        if catch_unwind(AssertUnwindSafe(|| deliver(listener.as_ref(), &event))).is_err() {
            tracing::error!(event = event.name(), "listener panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    struct Recorder(Mutex<mpsc::Sender<WalletEvent>>);

    impl WalletListener for Recorder {
        fn on_sync_progress(&self, done: u64, total: u64) {
            let _ = self.0.lock().unwrap().send(WalletEvent::SyncProgress { done, total });
        }

        fn on_keychain_changed(&self) {
            let _ = self.0.lock().unwrap().send(WalletEvent::KeychainChanged);
        }
    }

    fn recorder(dispatcher: &EventDispatcher) -> mpsc::Receiver<WalletEvent> {
        let (tx, rx) = mpsc::channel();
        dispatcher.set_listener(Some(Arc::new(Recorder(Mutex::new(tx)))));
        rx
    }

    #[test]
    fn test_fifo_delivery() {
        let dispatcher = EventDispatcher::start("fifo").unwrap();
        let rx = recorder(&dispatcher);
        let sink = dispatcher.sink();
        for done in 0..=10 {
            sink.emit(WalletEvent::SyncProgress { done, total: 10 });
        }
        for done in 0..=10 {
            assert_eq!(
                rx.recv_timeout(Duration::from_secs(5)).unwrap(),
                WalletEvent::SyncProgress { done, total: 10 }
            );
        }
    }

    #[test]
    fn test_stale_event_dropped() {
        let dispatcher = EventDispatcher::start("stale").unwrap();
        let rx = recorder(&dispatcher);
        let sink = dispatcher.sink();

        sink.emit(WalletEvent::KeychainChanged);
        let _ = sink.sender.send(Message::Event {
            seq: 1,
            event: WalletEvent::KeychainChanged,
        });
        sink.emit(WalletEvent::SyncProgress { done: 1, total: 1 });

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), WalletEvent::KeychainChanged);
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            WalletEvent::SyncProgress { done: 1, total: 1 }
        );
    }

    #[test]
    fn test_no_delivery_after_shutdown() {
        let dispatcher = EventDispatcher::start("shutdown").unwrap();
        let rx = recorder(&dispatcher);
        let sink = dispatcher.sink();
        dispatcher.shutdown();
        assert!(dispatcher.is_suppressed());

        sink.emit(WalletEvent::KeychainChanged);
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }
}
