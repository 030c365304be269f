//! Integration test: log events are only emitted with the semaphore free.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use ecat_shared_memory::SharedMemoryChannel;
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

use super::Fixture;

/// Tries the semaphore from a second handle on every event.
struct LockWitness {
    handle: SharedMemoryChannel,
    events: Arc<AtomicUsize>,
    while_held: Arc<AtomicUsize>,
}

impl<S: Subscriber> Layer<S> for LockWitness {
    fn on_event(&self, _event: &Event<'_>, _ctx: Context<'_, S>) {
        self.events.fetch_add(1, Ordering::SeqCst);
        match self.handle.try_lock() {
            Ok(Some(guard)) => {
                let _ = guard.unlock();
            }
            _ => {
                self.while_held.fetch_add(1, Ordering::SeqCst);
            }
        }
    }
}

#[test]
fn state_and_gate_changes_are_logged_after_release() {
    let mut fx = Fixture::new("log_outside_lock");
    let events = Arc::new(AtomicUsize::new(0));
    let while_held = Arc::new(AtomicUsize::new(0));
    let witness = LockWitness {
        handle: fx.open_handle(),
        events: Arc::clone(&events),
        while_held: Arc::clone(&while_held),
    };
    let subscriber = tracing_subscriber::registry().with(witness);

    tracing::subscriber::with_default(subscriber, || {
        // Start -> switch on disabled on both drives.
        fx.set_status(0x0250, 0x0250);
        fx.control.step(0.0).unwrap();
        // Both enabled: two state changes plus the gate opening.
        fx.set_status(0x0237, 0x0237);
        fx.control.step(0.002).unwrap();
        // Fault on one drive closes the gate again.
        fx.set_status(0x0218, 0x0237);
        fx.control.step(0.004).unwrap();
    });

    assert!(events.load(Ordering::SeqCst) >= 6, "state changes were logged");
    assert_eq!(while_held.load(Ordering::SeqCst), 0);
}
