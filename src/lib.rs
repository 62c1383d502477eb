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

//! Item multiplexing and lifecycle engine for a publish/subscribe
//! market-data session.
//!
//! Applications open items through a [`Session`](session::Session), which
//! assigns each one a handle and a wire stream id, submits its request to a
//! [`Transport`](transport::Transport) and routes inbound messages back to
//! the item's [`Client`](client::Client).

pub mod client;
pub mod closedstatus;
pub mod config;
pub mod core;
pub mod directory;
pub mod dispatch;
pub mod error;
pub mod item;
mod lifecycle;
pub mod msg;
pub mod pool;
pub mod registry;
pub mod session;
pub mod streamid;
pub mod timeout;
pub mod transport;
pub mod tunnel;

#[cfg(test)]
mod testutil;

pub use crate::client::{Client, Closure, ItemEvent};
pub use crate::config::SessionConfig;
pub use crate::dispatch::Inbound;
pub use crate::error::{DispatchError, Error};
pub use crate::item::{Handle, ItemInfo, ItemKind, ItemState};
pub use crate::session::{LocalSession, Session, SessionState, SharedSession};
