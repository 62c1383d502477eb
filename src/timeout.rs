/*
 * Copyright (C) 2024 Fastly, Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use crate::error::Error;
use crate::item::Handle;
use slab::Slab;
use std::collections::BTreeSet;
use std::time::{Duration, Instant};

const TICK_DURATION_MS: u64 = 1;

fn duration_to_ticks_round_down(d: Duration) -> u64 {
    (d.as_millis() / (TICK_DURATION_MS as u128)) as u64
}

fn duration_to_ticks_round_up(d: Duration) -> u64 {
    ((d.as_micros() + (TICK_DURATION_MS as u128 * 1000) - 1) / (TICK_DURATION_MS as u128 * 1000))
        as u64
}

fn ticks_to_duration(t: u64) -> Duration {
    Duration::from_millis(t * TICK_DURATION_MS)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutEvent {
    // deliver the pending closed status of an item
    ClosedStatus(Handle),

    // a provider item got no response within the request timeout
    RequestTimeout(Handle),
}

impl TimeoutEvent {
    pub fn handle(&self) -> Handle {
        match self {
            Self::ClosedStatus(h) | Self::RequestTimeout(h) => *h,
        }
    }
}

// slab keys are reused, so a handle also carries the sequence number of the
// timer it was issued for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerHandle {
    key: usize,
    seq: u64,
}

/// One-shot timers driven by the session owner. Expired events are pulled
/// with `take_expired` and handled with no session state borrowed.
pub trait TimeoutFacility: Send {
    fn schedule(&mut self, delay: Duration, event: TimeoutEvent) -> Result<TimerHandle, Error>;

    // returns false if the timer already fired or was cancelled
    fn cancel(&mut self, timer: TimerHandle) -> bool;

    fn take_expired(&mut self, now: Instant) -> Option<TimeoutEvent>;

    // time until the next timer expires, if any are scheduled
    fn timeout(&self, now: Instant) -> Option<Duration>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct Timer {
    seq: u64,
    expires: u64,
    event: TimeoutEvent,
}

/// Fixed-capacity timer queue with millisecond ticks. Timers with the same
/// expiry fire in the order they were scheduled.
pub struct TimerQueue {
    timers: Slab<Timer>,

    // (expires, seq, key)
    by_expiry: BTreeSet<(u64, u64, usize)>,

    start: Instant,
    next_seq: u64,
}

impl TimerQueue {
    pub fn new(capacity: usize) -> Self {
        Self::with_start(capacity, Instant::now())
    }

    pub fn with_start(capacity: usize, start: Instant) -> Self {
        Self {
            timers: Slab::with_capacity(capacity),
            by_expiry: BTreeSet::new(),
            start,
            next_seq: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.timers.capacity()
    }

    fn get_ticks(&self, t: Instant) -> u64 {
        duration_to_ticks_round_down(t.saturating_duration_since(self.start))
    }

    pub fn schedule_at(
        &mut self,
        now: Instant,
        delay: Duration,
        event: TimeoutEvent,
    ) -> Result<TimerHandle, Error> {
        if self.timers.len() == self.timers.capacity() {
            return Err(Error::TimersExhausted);
        }

        // never fire early, even if now falls in the middle of a tick
        let expires = duration_to_ticks_round_up(now.saturating_duration_since(self.start) + delay);

        let seq = self.next_seq;
        self.next_seq += 1;

        let key = self.timers.insert(Timer {
            seq,
            expires,
            event,
        });

        self.by_expiry.insert((expires, seq, key));

        Ok(TimerHandle { key, seq })
    }
}

impl TimeoutFacility for TimerQueue {
    fn schedule(&mut self, delay: Duration, event: TimeoutEvent) -> Result<TimerHandle, Error> {
        self.schedule_at(Instant::now(), delay, event)
    }

    fn cancel(&mut self, timer: TimerHandle) -> bool {
        match self.timers.get(timer.key) {
            Some(t) if t.seq == timer.seq => {}
            _ => return false,
        }

        let t = self.timers.remove(timer.key);
        self.by_expiry.remove(&(t.expires, t.seq, timer.key));

        true
    }

    fn take_expired(&mut self, now: Instant) -> Option<TimeoutEvent> {
        let ticks = self.get_ticks(now);

        let &(expires, seq, key) = self.by_expiry.iter().next()?;

        if expires > ticks {
            return None;
        }

        self.by_expiry.remove(&(expires, seq, key));

        Some(self.timers.remove(key).event)
    }

    fn timeout(&self, now: Instant) -> Option<Duration> {
        let &(expires, _, _) = self.by_expiry.iter().next()?;

        let elapsed = now.saturating_duration_since(self.start);

        Some(ticks_to_duration(expires).saturating_sub(elapsed))
    }

    fn len(&self) -> usize {
        self.timers.len()
    }
}
