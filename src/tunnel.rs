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
use crate::streamid::Role;
use std::collections::HashMap;

// sub-stream ids below this carry the tunnel's own control traffic
pub const TUNNEL_SUB_STREAM_FLOOR: i32 = 5;

/// The private stream id space nested inside one tunnel stream.
///
/// Released ids go onto a LIFO free list that is drained before the counter
/// advances, which keeps the space compact under open/close churn. Only
/// uniqueness among live sub-streams is guaranteed, not reuse order.
pub struct SubStreamSpace {
    // last id handed out by the counter
    next: i32,
    free: Vec<i32>,
    live: HashMap<i32, Handle>,
}

impl Default for SubStreamSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl SubStreamSpace {
    pub fn new() -> Self {
        Self {
            next: TUNNEL_SUB_STREAM_FLOOR - 1,
            free: Vec::new(),
            live: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    pub fn get(&self, stream_id: i32) -> Option<Handle> {
        self.live.get(&stream_id).copied()
    }

    /// Binds `handle` to a sub-stream id. A `requested` id of 0 picks the
    /// next free one, anything else must be at or above the floor and not
    /// already live.
    pub fn open(&mut self, requested: i32, handle: Handle) -> Result<i32, Error> {
        let stream_id = if requested != 0 {
            if requested < 0 {
                return Err(Error::invalid_usage(format!(
                    "sub-stream id {} is negative",
                    requested
                )));
            }

            if requested < TUNNEL_SUB_STREAM_FLOOR {
                return Err(Error::invalid_usage(format!(
                    "sub-stream id {} is reserved, ids start at {}",
                    requested, TUNNEL_SUB_STREAM_FLOOR
                )));
            }

            if self.live.contains_key(&requested) {
                return Err(Error::invalid_usage(format!(
                    "sub-stream id {} is already in use",
                    requested
                )));
            }

            requested
        } else {
            self.next_free()?
        };

        self.live.insert(stream_id, handle);

        Ok(stream_id)
    }

    fn next_free(&mut self) -> Result<i32, Error> {
        // explicitly requested ids may shadow entries on either path
        while let Some(id) = self.free.pop() {
            if !self.live.contains_key(&id) {
                return Ok(id);
            }
        }

        loop {
            if self.next == i32::MAX {
                return Err(Error::StreamIdExhausted(Role::Consumer));
            }

            self.next += 1;

            if !self.live.contains_key(&self.next) {
                return Ok(self.next);
            }
        }
    }

    pub fn release(&mut self, stream_id: i32) -> Option<Handle> {
        let handle = self.live.remove(&stream_id)?;

        self.free.push(stream_id);

        Some(handle)
    }

    /// Handles of the live sub-streams, in stream id order.
    pub fn handles(&self) -> Vec<Handle> {
        let mut handles: Vec<(i32, Handle)> = self.live.iter().map(|(k, v)| (*k, *v)).collect();
        handles.sort_unstable();

        handles.into_iter().map(|(_, h)| h).collect()
    }

    // unbinds every live sub-stream, returning their handles
    pub fn detach_all(&mut self) -> Vec<Handle> {
        let mut handles: Vec<(i32, Handle)> = self.live.drain().collect();
        handles.sort_unstable();

        self.free.clear();
        self.next = TUNNEL_SUB_STREAM_FLOOR - 1;

        handles.into_iter().map(|(_, h)| h).collect()
    }

    pub fn reset(&mut self) {
        self.next = TUNNEL_SUB_STREAM_FLOOR - 1;
        self.free.clear();
        self.live.clear();
    }
}

/// Variant state carried by a tunnel item.
#[derive(Default)]
pub struct TunnelState {
    pub space: SubStreamSpace,

    // set once the provider accepts the tunnel stream
    pub established: bool,
}

impl TunnelState {
    pub fn reset(&mut self) {
        self.space.reset();
        self.established = false;
    }
}
