//! Deadline-ordered, non-blocking event scheduler.
//!
//! Every pending transition (an event's begin or end) is keyed by its
//! absolute deadline, so a poll only touches what is due. Polling never
//! sleeps; the hub loop asks for [`EventScheduler::next_deadline`] to bound
//! its own wait and polls once per wakeup.
//!
//! ```text
//! push_sequence(t0, [e]) ── (t0+e.start, Begin) ──poll──> activate targets
//!                                   │
//!                                   └─> (t0+e.end, End) ──poll──> deactivate, drop
//! ```

use std::collections::BTreeMap;
use std::time::Instant;

use crate::choreography::Event;
use crate::protocol::{Delivery, EffectCommand};

/// Ends sort before begins so a target switched off and on at the same
/// instant is left on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Phase {
    End,
    Begin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Deadline {
    at: Instant,
    phase: Phase,
    /// Insertion order, breaks remaining ties.
    id: u64,
}

#[derive(Debug)]
struct Scheduled {
    sequence_start: Instant,
    event: Event,
}

/// Pending and active events, ordered by their next transition.
#[derive(Debug, Default)]
pub struct EventScheduler {
    queue: BTreeMap<Deadline, Scheduled>,
    next_id: u64,
}

impl EventScheduler {
    /// Create an empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a sequence whose offsets are relative to `start`.
    pub fn push_sequence(&mut self, start: Instant, events: Vec<Event>) {
        for event in events {
            let id = self.next_id;
            self.next_id += 1;
            let deadline = Deadline {
                at: start + event.start,
                phase: Phase::Begin,
                id,
            };
            self.queue.insert(
                deadline,
                Scheduled {
                    sequence_start: start,
                    event,
                },
            );
        }
    }

    /// Fire every transition due at `now`, in deadline order.
    ///
    /// A begin produces an activate per target and re-queues the event for
    /// its end; an end produces a deactivate per target and drops it.
    pub fn poll(&mut self, now: Instant) -> Vec<Delivery> {
        let mut out = Vec::new();

        while let Some(entry) = self.queue.first_entry() {
            if entry.key().at > now {
                break;
            }
            let (deadline, mut scheduled) = entry.remove_entry();

            match deadline.phase {
                Phase::Begin => {
                    push_command(&mut out, &scheduled.event, EffectCommand::Activate);
                    scheduled.event.started = true;
                    let end = Deadline {
                        at: scheduled.sequence_start + scheduled.event.end(),
                        phase: Phase::End,
                        id: deadline.id,
                    };
                    self.queue.insert(end, scheduled);
                }
                Phase::End => {
                    log::trace!(
                        "[Round] {} finished for {} target(s)",
                        scheduled.event.kind,
                        scheduled.event.targets.len()
                    );
                    push_command(&mut out, &scheduled.event, EffectCommand::Deactivate);
                }
            }
        }

        out
    }

    /// When the next transition is due, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.queue.keys().next().map(|deadline| deadline.at)
    }

    /// Drop every pending and active event. Returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.queue.len();
        self.queue.clear();
        dropped
    }

    /// Events not yet finished.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Events whose begin has fired but whose end has not.
    pub fn active_count(&self) -> usize {
        self.queue.values().filter(|s| s.event.started).count()
    }
}

fn push_command(out: &mut Vec<Delivery>, event: &Event, command: EffectCommand) {
    out.extend(
        event
            .targets
            .iter()
            .map(|target| Delivery::command(target.connection, command)),
    );
}
