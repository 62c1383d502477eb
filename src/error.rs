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

use crate::item::{Handle, ItemKind};
use crate::streamid::Role;
use crate::transport::TransportError;

/// Errors reported synchronously at an operation boundary.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid usage: {0}")]
    InvalidUsage(String),

    #[error("invalid handle {0}")]
    InvalidHandle(Handle),

    #[error("{op} is not supported on {kind} items")]
    InvalidOperation { op: &'static str, kind: ItemKind },

    #[error("no free {0} stream id left after a full wraparound scan")]
    StreamIdExhausted(Role),

    #[error("timeout facility is out of capacity")]
    TimersExhausted,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl Error {
    pub fn invalid_usage<S: Into<String>>(s: S) -> Self {
        Self::InvalidUsage(s.into())
    }

    // internal errors indicate a leak or resource problem elsewhere in the
    // process rather than a mistake by the caller
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::StreamIdExhausted(_) | Self::TimersExhausted)
    }
}

/// Reasons an inbound message was dropped. These are logged by the
/// dispatcher and never reach application callbacks.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("no item is registered for stream {0}")]
    UnknownStream(i32),

    #[error("batch on stream {batch_stream} has no live member for stream {stream}")]
    BatchMemberGone { batch_stream: i32, stream: i32 },

    #[error("stream {0} does not belong to a tunnel stream")]
    NotATunnel(i32),

    #[error("tunnel on stream {tunnel} carried an inner message with invalid stream {stream}")]
    MalformedTunnelMsg { tunnel: i32, stream: i32 },

    #[error("tunnel on stream {tunnel} has no sub-stream {stream}")]
    UnknownSubStream { tunnel: i32, stream: i32 },

    #[error("unexpected {0} message")]
    UnexpectedMsg(&'static str),
}
