//! Scan dispatcher.
//!
//! Barcode scanners usually behave as keyboards ("keyboard wedge"): a scan arrives as a burst of
//! characters followed by a terminator key. The dispatcher accumulates those characters, emits one
//! [`ScanEvent`] per terminator and delivers it to whichever workflow is currently subscribed.
//!
//! ```text
//! scanner chars ──feed()──▶ ┌────────────────┐  ScanEvent   ┌──────────────┐
//!                           │ ScanDispatcher │ ───────────▶ │ subscription │ ──pump()──▶ Workflow
//! decoded text ─publish()─▶ └────────────────┘   (mpsc)     └──────────────┘
//! ```
//!
//! Rules:
//! - Partial buffers are never delivered.
//! - Carriage returns are dropped so `\r\n` scanners work with a `\n` terminator.
//! - Only one subscriber listens at a time; subscribing again replaces the previous listener.
//! - The same text arriving again within the debounce window of the last delivered scan is dropped.

use crate::clock::Clock;
use crate::config::BcmaConfig;
use crate::constants::MAX_SCAN_LENGTH;
use crate::model::{ScanEvent, ScanSource};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Identifies one subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// What happened to a published scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublishOutcome {
    Delivered,
    /// Dropped as a rapid repeat of the previous scan.
    Debounced,
    /// Nobody was listening; the scan was dropped.
    NoListener,
}

struct Listener {
    id: SubscriptionId,
    sender: mpsc::UnboundedSender<ScanEvent>,
}

/// Receiving end handed to a workflow.
#[derive(Debug)]
pub struct ScanSubscription {
    id: SubscriptionId,
    receiver: mpsc::UnboundedReceiver<ScanEvent>,
}

impl ScanSubscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Next queued scan, without waiting.
    pub fn try_next(&mut self) -> Option<ScanEvent> {
        self.receiver.try_recv().ok()
    }

    /// Wait for the next scan. Returns `None` once the dispatcher has dropped this subscription.
    pub async fn next(&mut self) -> Option<ScanEvent> {
        self.receiver.recv().await
    }
}

pub struct ScanDispatcher {
    clock: Arc<dyn Clock>,
    debounce: Duration,
    terminator: char,
    buffer: String,
    overflowed: bool,
    listener: Option<Listener>,
    last_delivered: Option<(String, DateTime<Utc>)>,
    next_id: u64,
}

impl ScanDispatcher {
    pub fn new(config: &BcmaConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            debounce: config.debounce(),
            terminator: config.scan_terminator(),
            buffer: String::new(),
            overflowed: false,
            listener: None,
            last_delivered: None,
            next_id: 0,
        }
    }

    /// Start listening. Any previous subscription is closed.
    pub fn subscribe(&mut self) -> ScanSubscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);

        if let Some(previous) = self.listener.replace(Listener { id, sender }) {
            debug!(previous = previous.id.0, current = id.0, "scan listener replaced");
        }

        ScanSubscription { id, receiver }
    }

    /// Stop delivering to `id` if it is still the current listener.
    pub fn unsubscribe(&mut self, id: SubscriptionId) {
        if self.listener.as_ref().is_some_and(|l| l.id == id) {
            self.listener = None;
        }
    }

    pub fn has_listener(&self) -> bool {
        self.listener
            .as_ref()
            .is_some_and(|l| !l.sender.is_closed())
    }

    /// Publish one fully decoded barcode, e.g. from a camera decoder callback.
    pub fn publish(&mut self, raw: &str) -> PublishOutcome {
        let now = self.clock.now();
        let value = raw.trim();

        if let Some((last, at)) = &self.last_delivered {
            let elapsed = now - *at;
            // A clock that stepped backwards gives a negative gap; that is never a repeat.
            if last == value && elapsed >= Duration::zero() && elapsed < self.debounce {
                debug!(value, "debounced repeat scan");
                return PublishOutcome::Debounced;
            }
        }

        let Some(listener) = &self.listener else {
            warn!(value, "scan dropped: no workflow is listening");
            return PublishOutcome::NoListener;
        };

        let event = ScanEvent::new(raw, ScanSource::Scanner, now);
        if listener.sender.send(event).is_err() {
            warn!(value, "scan dropped: listener has gone away");
            self.listener = None;
            return PublishOutcome::NoListener;
        }

        self.last_delivered = Some((value.to_string(), now));
        PublishOutcome::Delivered
    }

    /// Feed one keystroke from a keyboard-wedge scanner.
    ///
    /// Returns the publish outcome when `c` completes a scan.
    pub fn feed_char(&mut self, c: char) -> Option<PublishOutcome> {
        if c == '\r' {
            return None;
        }

        if c == self.terminator {
            let overflowed = std::mem::take(&mut self.overflowed);
            let scanned = std::mem::take(&mut self.buffer);
            if overflowed || scanned.trim().is_empty() {
                return None;
            }
            return Some(self.publish(&scanned));
        }

        if self.overflowed {
            return None;
        }
        if self.buffer.len() >= MAX_SCAN_LENGTH {
            warn!(limit = MAX_SCAN_LENGTH, "scan input too long; discarding until terminator");
            self.buffer.clear();
            self.overflowed = true;
            return None;
        }

        self.buffer.push(c);
        None
    }

    /// Feed a run of keystrokes, returning one outcome per completed scan.
    pub fn feed(&mut self, input: &str) -> Vec<PublishOutcome> {
        input.chars().filter_map(|c| self.feed_char(c)).collect()
    }

    /// Characters received since the last terminator.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::barcode::BarcodeKind;
    use crate::clock::FixedClock;

    fn dispatcher() -> (ScanDispatcher, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let dispatcher = ScanDispatcher::new(&BcmaConfig::default(), clock.clone());
        (dispatcher, clock)
    }

    #[test]
    fn wedge_characters_are_buffered_until_terminator() {
        let (mut dispatcher, _clock) = dispatcher();
        let mut sub = dispatcher.subscribe();

        assert!(dispatcher.feed("PT123").is_empty());
        assert_eq!(dispatcher.pending_len(), 5);
        assert!(sub.try_next().is_none());

        assert_eq!(dispatcher.feed("45\r\n"), vec![PublishOutcome::Delivered]);
        assert_eq!(dispatcher.pending_len(), 0);

        let event = sub.try_next().expect("one scan delivered");
        assert_eq!(event.kind(), BarcodeKind::Patient);
        assert_eq!(event.value(), "PT12345");
        assert_eq!(event.source, ScanSource::Scanner);
        assert!(sub.try_next().is_none());
    }

    #[test]
    fn blank_lines_are_not_scans() {
        let (mut dispatcher, _clock) = dispatcher();
        let mut sub = dispatcher.subscribe();

        assert!(dispatcher.feed("\n  \n").is_empty());
        assert!(sub.try_next().is_none());
    }

    #[test]
    fn rapid_identical_scans_are_debounced() {
        let (mut dispatcher, clock) = dispatcher();
        let mut sub = dispatcher.subscribe();

        assert_eq!(dispatcher.publish("MA00001"), PublishOutcome::Delivered);
        clock.advance(Duration::milliseconds(100));
        assert_eq!(dispatcher.publish("MA00001"), PublishOutcome::Debounced);
        clock.advance(Duration::milliseconds(300));
        assert_eq!(dispatcher.publish("MA00001"), PublishOutcome::Delivered);

        assert!(sub.try_next().is_some());
        assert!(sub.try_next().is_some());
        assert!(sub.try_next().is_none());
    }

    #[test]
    fn repeat_at_debounce_boundary_is_delivered() {
        let (mut dispatcher, clock) = dispatcher();
        let _sub = dispatcher.subscribe();

        assert_eq!(dispatcher.publish("MA00001"), PublishOutcome::Delivered);
        clock.advance(Duration::milliseconds(299));
        assert_eq!(dispatcher.publish("MA00001"), PublishOutcome::Debounced);
        clock.advance(Duration::milliseconds(1));
        assert_eq!(dispatcher.publish("MA00001"), PublishOutcome::Delivered);
    }

    #[test]
    fn clock_stepping_backwards_does_not_debounce() {
        let (mut dispatcher, clock) = dispatcher();
        let _sub = dispatcher.subscribe();

        assert_eq!(dispatcher.publish("MA00001"), PublishOutcome::Delivered);
        clock.advance(Duration::seconds(-5));
        assert_eq!(dispatcher.publish("MA00001"), PublishOutcome::Delivered);
    }

    #[test]
    fn different_scans_are_never_debounced() {
        let (mut dispatcher, _clock) = dispatcher();
        let _sub = dispatcher.subscribe();

        assert_eq!(dispatcher.publish("PT12345"), PublishOutcome::Delivered);
        assert_eq!(dispatcher.publish("MA00001"), PublishOutcome::Delivered);
    }

    #[test]
    fn new_subscription_replaces_previous_listener() {
        let (mut dispatcher, _clock) = dispatcher();
        let mut first = dispatcher.subscribe();
        let mut second = dispatcher.subscribe();

        assert_eq!(dispatcher.publish("PT12345"), PublishOutcome::Delivered);
        assert!(first.try_next().is_none());
        assert!(second.try_next().is_some());
    }

    #[test]
    fn scans_without_listener_are_dropped() {
        let (mut dispatcher, _clock) = dispatcher();
        assert_eq!(dispatcher.publish("PT12345"), PublishOutcome::NoListener);

        let sub = dispatcher.subscribe();
        let id = sub.id();
        drop(sub);
        assert!(!dispatcher.has_listener());
        assert_eq!(dispatcher.publish("PT12345"), PublishOutcome::NoListener);

        let sub = dispatcher.subscribe();
        dispatcher.unsubscribe(id);
        assert!(dispatcher.has_listener());
        dispatcher.unsubscribe(sub.id());
        assert!(!dispatcher.has_listener());
    }

    #[test]
    fn overlong_input_is_discarded_up_to_terminator() {
        let (mut dispatcher, _clock) = dispatcher();
        let mut sub = dispatcher.subscribe();

        let noise = "X".repeat(MAX_SCAN_LENGTH + 10);
        assert!(dispatcher.feed(&noise).is_empty());
        assert!(dispatcher.feed("\n").is_empty());
        assert!(sub.try_next().is_none());

        assert_eq!(dispatcher.feed("PT12345\n"), vec![PublishOutcome::Delivered]);
    }

    #[tokio::test]
    async fn subscription_can_be_awaited() {
        let (mut dispatcher, _clock) = dispatcher();
        let mut sub = dispatcher.subscribe();

        dispatcher.publish("MA00001");
        let event = sub.next().await.expect("scan delivered");
        assert_eq!(event.kind(), BarcodeKind::Medication);

        drop(dispatcher);
        assert!(sub.next().await.is_none());
    }
}
