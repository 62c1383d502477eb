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

use crate::item::Handle;
use crate::msg::Msg;

pub type ConnectionId = usize;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("no output buffers available")]
    NoBuffers,

    #[error("connection {0} is down")]
    ConnectionDown(ConnectionId),

    #[error("submit failed: {0}")]
    Failed(String),
}

/// Routing information attached to every submission.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubmitOptions {
    pub connection: ConnectionId,

    // handle of the submitting item. the transport attaches it to inbound
    // messages on the same stream so the dispatcher can skip the stream
    // lookup
    pub handle: Handle,

    pub service_name: Option<String>,
    pub service_id: Option<u16>,

    // set when the message travels inside a tunnel stream, in which case
    // the message stream id is a sub-stream id
    pub tunnel_stream_id: Option<i32>,
}

/// The physical side of a session. Submission never blocks; failure is
/// reported through the return value and surfaced to whichever item
/// operation triggered it.
pub trait Transport: Send + Sync {
    fn submit(&self, msg: &Msg, opts: &SubmitOptions) -> Result<(), TransportError>;
}
