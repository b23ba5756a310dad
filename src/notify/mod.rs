//! Change notifier: fans committed state changes out to every connected desk.
//!
//! Publishing never blocks. Events go into a bounded broadcast channel; a
//! subscriber that falls further behind than the buffer is told so with
//! [`Notification::Resync`] and is expected to re-read the participant list.
//! Nothing is dropped without the consumer finding out.
//!
//! Each [`Subscription`] also remembers the furthest `(status, gift_redeemed)` it
//! has delivered per participant and skips anything older, so a consumer never
//! sees a participant move backwards. The marks survive a resync, and
//! [`Subscription::observe`] raises them to whatever the consumer re-read.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::types::{AttendanceStatus, Participant, ParticipantId};

/// Default number of events buffered per subscriber.
pub const DEFAULT_BUFFER: usize = 1024;

/// A committed change to one participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    /// Publication order across all participants.
    pub seq: u64,
    pub participant_id: ParticipantId,
    pub status: AttendanceStatus,
    pub gift_redeemed: bool,
    pub at: DateTime<Utc>,
}

impl ChangeEvent {
    fn progress(&self) -> (AttendanceStatus, bool) {
        (self.status, self.gift_redeemed)
    }
}

/// What a subscriber receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Change(ChangeEvent),

    /// The subscriber fell behind and `missed` events were discarded.
    Resync { missed: u64 },
}

/// Publish side of the change stream. Cheap to clone.
#[derive(Clone)]
pub struct ChangeNotifier {
    inner: Arc<NotifierInner>,
}

struct NotifierInner {
    tx: broadcast::Sender<ChangeEvent>,
    next_seq: AtomicU64,
}

impl ChangeNotifier {
    pub fn new(buffer: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer.max(1));
        ChangeNotifier {
            inner: Arc::new(NotifierInner {
                tx,
                next_seq: AtomicU64::new(0),
            }),
        }
    }

    /// Publishes the current state of `participant`. Returns the event sent.
    ///
    /// Fire-and-forget: having no subscribers is not an error.
    pub fn publish(&self, participant: &Participant) -> ChangeEvent {
        let event = ChangeEvent {
            seq: self.inner.next_seq.fetch_add(1, Ordering::Relaxed),
            participant_id: participant.id.clone(),
            status: participant.status,
            gift_redeemed: participant.gift_redeemed,
            at: Utc::now(),
        };

        let receivers = self.inner.tx.send(event.clone()).unwrap_or(0);
        debug!(
            seq = event.seq,
            participant_id = %event.participant_id,
            status = %event.status,
            gift_redeemed = event.gift_redeemed,
            receivers,
            "Change published"
        );
        event
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.inner.tx.subscribe(),
            seen: HashMap::new(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.tx.receiver_count()
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER)
    }
}

/// Receive side of the change stream.
pub struct Subscription {
    rx: broadcast::Receiver<ChangeEvent>,
    seen: HashMap<ParticipantId, (AttendanceStatus, bool)>,
}

impl Subscription {
    /// Waits for the next notification. Returns `None` once the notifier is gone.
    pub async fn next(&mut self) -> Option<Notification> {
        loop {
            match self.rx.recv().await {
                Ok(event) => {
                    if self.admit(&event) {
                        return Some(Notification::Change(event));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "Change subscriber lagged; requesting resync");
                    return Some(Notification::Resync { missed });
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Raises the high-water marks to the given records, typically a re-read of
    /// the participant list after a resync. Older events are then skipped.
    pub fn observe<'a>(&mut self, participants: impl IntoIterator<Item = &'a Participant>) {
        for participant in participants {
            let progress = participant.progress();
            self.seen
                .entry(participant.id.clone())
                .and_modify(|last| *last = (*last).max(progress))
                .or_insert(progress);
        }
    }

    /// Records the event's progress. False if it would move the participant backwards.
    fn admit(&mut self, event: &ChangeEvent) -> bool {
        let progress = event.progress();
        match self.seen.get(&event.participant_id) {
            Some(&last) if progress < last => {
                debug!(
                    participant_id = %event.participant_id,
                    seq = event.seq,
                    "Skipping stale change event"
                );
                false
            }
            _ => {
                self.seen.insert(event.participant_id.clone(), progress);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NewParticipant;
    use std::time::Duration;

    fn participant(id: &str, status: AttendanceStatus, gift: bool) -> Participant {
        let mut p =
            Participant::registered(NewParticipant::new(id, "X", "x@example.org"), Utc::now());
        p.status = status;
        p.gift_redeemed = gift;
        p
    }

    #[tokio::test]
    async fn subscribers_receive_published_changes() {
        let notifier = ChangeNotifier::new(16);
        let mut a = notifier.subscribe();
        let mut b = notifier.subscribe();

        let sent = notifier.publish(&participant("p1", AttendanceStatus::Scanned, false));

        assert_eq!(a.next().await, Some(Notification::Change(sent.clone())));
        assert_eq!(b.next().await, Some(Notification::Change(sent)));
    }

    #[test]
    fn publish_without_subscribers_is_fine() {
        let notifier = ChangeNotifier::new(4);
        let event = notifier.publish(&participant("p1", AttendanceStatus::Scanned, false));
        assert_eq!(event.seq, 0);
        assert_eq!(notifier.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn regressions_are_filtered_per_participant() {
        let notifier = ChangeNotifier::new(16);
        let mut sub = notifier.subscribe();

        notifier.publish(&participant("p1", AttendanceStatus::Scanned, true));
        notifier.publish(&participant("p1", AttendanceStatus::Scanned, false));
        notifier.publish(&participant("p2", AttendanceStatus::Registered, false));

        let Some(Notification::Change(first)) = sub.next().await else {
            panic!("expected change");
        };
        assert_eq!(first.participant_id, ParticipantId::new("p1"));
        assert!(first.gift_redeemed);

        // The stale p1 event is skipped; p2 is unaffected by p1's progress.
        let Some(Notification::Change(second)) = sub.next().await else {
            panic!("expected change");
        };
        assert_eq!(second.participant_id, ParticipantId::new("p2"));
    }

    #[tokio::test]
    async fn lagging_subscriber_is_told_to_resync() {
        let notifier = ChangeNotifier::new(2);
        let mut sub = notifier.subscribe();

        for i in 0..5 {
            notifier.publish(&participant(&format!("p{i}"), AttendanceStatus::Scanned, false));
        }

        assert_eq!(sub.next().await, Some(Notification::Resync { missed: 3 }));
        let Some(Notification::Change(event)) = sub.next().await else {
            panic!("expected change after resync");
        };
        assert_eq!(event.seq, 3);
    }

    #[tokio::test]
    async fn dropping_the_notifier_ends_subscriptions() {
        let notifier = ChangeNotifier::new(4);
        let mut sub = notifier.subscribe();
        drop(notifier);
        assert_eq!(sub.next().await, None);
    }

    #[tokio::test]
    async fn resync_keeps_marks_and_observe_raises_them() {
        let notifier = ChangeNotifier::new(2);
        let mut sub = notifier.subscribe();

        notifier.publish(&participant("p1", AttendanceStatus::Scanned, true));
        assert!(matches!(sub.next().await, Some(Notification::Change(_))));

        // Overflow the buffer with stale p1 and p2 events.
        notifier.publish(&participant("p1", AttendanceStatus::CheckedIn, false));
        notifier.publish(&participant("p2", AttendanceStatus::CheckedIn, false));
        notifier.publish(&participant("p2", AttendanceStatus::Registered, false));
        notifier.publish(&participant("p1", AttendanceStatus::Scanned, false));
        assert_eq!(sub.next().await, Some(Notification::Resync { missed: 2 }));

        // The consumer re-read p2 as checked in.
        sub.observe([&participant("p2", AttendanceStatus::CheckedIn, false)]);

        // Both retained events are stale and skipped.
        let next = tokio::time::timeout(Duration::from_millis(50), sub.next()).await;
        assert!(next.is_err());

        notifier.publish(&participant("p3", AttendanceStatus::Scanned, false));
        let Some(Notification::Change(event)) = sub.next().await else {
            panic!("expected change");
        };
        assert_eq!(event.participant_id, ParticipantId::new("p3"));
    }
}
