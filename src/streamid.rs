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
use log::{debug, error};
use serde::Deserialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Mutex;

// streams 1-4 carry login, source directory and the two dictionaries
pub const CONSUMER_STARTING_STREAM_ID: i32 = 5;

// provider-origin streams are negative. this is the magnitude of the first
pub const PROVIDER_STARTING_STREAM_ID: i32 = 1;

// exclusive ceiling on stream id magnitudes
pub const STREAM_ID_CEILING: i32 = i32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Consumer,
    Provider,
}

impl Role {
    pub fn of_stream_id(stream_id: i32) -> Self {
        if stream_id < 0 {
            Self::Provider
        } else {
            Self::Consumer
        }
    }

    pub fn starting_stream_id(self) -> i32 {
        match self {
            Self::Consumer => CONSUMER_STARTING_STREAM_ID,
            Self::Provider => PROVIDER_STARTING_STREAM_ID,
        }
    }

    fn to_wire(self, magnitude: i64) -> i32 {
        // magnitudes are always below the ceiling, which fits in an i32
        let m = magnitude as i32;

        match self {
            Self::Consumer => m,
            Self::Provider => -m,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Consumer => write!(f, "consumer"),
            Self::Provider => write!(f, "provider"),
        }
    }
}

/// Hands out wire stream ids for one connection role.
///
/// Until the space has been exhausted once, allocation is a single atomic
/// add. After the first wraparound, ids may still be held by long-lived
/// items, so allocation scans for a free range under a lock, asking the
/// caller which ids are in use.
pub struct StreamIdAllocator {
    role: Role,
    start: i64,
    ceiling: i64,

    // magnitude of the last id handed out before wrapping
    next: AtomicI64,

    wrapped: AtomicBool,

    // where the post-wrap scan resumes
    cursor: Mutex<i64>,
}

impl StreamIdAllocator {
    pub fn new(role: Role) -> Self {
        Self::with_ceiling(role, STREAM_ID_CEILING)
    }

    pub fn with_ceiling(role: Role, ceiling: i32) -> Self {
        let start = i64::from(role.starting_stream_id());

        // the space must hold at least one id
        let ceiling = i64::from(ceiling).max(start + 1);

        Self {
            role,
            start,
            ceiling,
            next: AtomicI64::new(start - 1),
            wrapped: AtomicBool::new(false),
            cursor: Mutex::new(start),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_wrapped(&self) -> bool {
        self.wrapped.load(Ordering::Acquire)
    }

    /// Returns the first of `count` contiguous ids. `in_use` is consulted
    /// only once the space has wrapped, with wire (signed) ids.
    pub fn allocate<F>(&self, count: u32, in_use: F) -> Result<i32, Error>
    where
        F: Fn(i32) -> bool,
    {
        let count = i64::from(count.max(1));

        if !self.is_wrapped() {
            let prev = self.next.fetch_add(count, Ordering::AcqRel);

            if prev + count < self.ceiling {
                return Ok(self.role.to_wire(prev + 1));
            }
        }

        self.allocate_wrapped(count, in_use)
    }

    fn allocate_wrapped<F>(&self, count: i64, in_use: F) -> Result<i32, Error>
    where
        F: Fn(i32) -> bool,
    {
        let cursor = &mut *self.cursor.lock().unwrap();

        if !self.wrapped.swap(true, Ordering::AcqRel) {
            debug!("{} stream id space wrapped", self.role);

            *cursor = self.start;
        }

        let from = *cursor;

        let first = match self.scan(from, self.ceiling, count, &in_use) {
            Some(first) => first,
            None => match self.scan(self.start, (from + count).min(self.ceiling), count, &in_use) {
                Some(first) => first,
                None => {
                    error!(
                        "{} stream id space exhausted, streams are likely being leaked",
                        self.role
                    );

                    return Err(Error::StreamIdExhausted(self.role));
                }
            },
        };

        *cursor = first + count;
        if *cursor >= self.ceiling {
            *cursor = self.start;
        }

        Ok(self.role.to_wire(first))
    }

    // find the first run of count free magnitudes within [from, end)
    fn scan<F>(&self, from: i64, end: i64, count: i64, in_use: &F) -> Option<i64>
    where
        F: Fn(i32) -> bool,
    {
        let mut candidate = from;

        'outer: while candidate + count <= end {
            for m in candidate..(candidate + count) {
                if in_use(self.role.to_wire(m)) {
                    candidate = m + 1;
                    continue 'outer;
                }
            }

            return Some(candidate);
        }

        None
    }

    #[cfg(test)]
    pub fn set_next(&self, magnitude: i32) {
        self.next.store(i64::from(magnitude), Ordering::Release);
    }
}
