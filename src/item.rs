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

use crate::client::{Client, Closure, ItemEvent};
use crate::closedstatus::PendingClosedStatus;
use crate::core::counter::Counter;
use crate::directory::Service;
use crate::msg::{Msg, RequestMsg};
use crate::timeout::TimerHandle;
use crate::transport::{ConnectionId, SubmitOptions};
use crate::tunnel::TunnelState;
use std::fmt;
use std::ops::BitOr;
use std::sync::Arc;

/// Application-facing item identifier. Handles are issued from a counter
/// and never reused within a session, so a stale handle can not resolve to
/// a recycled item. 0 is never a valid handle.
pub type Handle = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    Single,
    Batch,
    Tunnel,
    Sub,
    ProviderSingle,
}

impl ItemKind {
    pub const COUNT: usize = 5;

    pub fn index(self) -> usize {
        match self {
            Self::Single => 0,
            Self::Batch => 1,
            Self::Tunnel => 2,
            Self::Sub => 3,
            Self::ProviderSingle => 4,
        }
    }

    pub fn ops(self) -> Ops {
        match self {
            Self::Single | Self::Sub => Ops::REISSUE | Ops::POST | Ops::GENERIC,
            Self::Batch | Self::Tunnel => Ops::NONE,
            Self::ProviderSingle => {
                Ops::REISSUE | Ops::GENERIC | Ops::REFRESH | Ops::UPDATE | Ops::STATUS
            }
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::Single => "single",
            Self::Batch => "batch",
            Self::Tunnel => "tunnel",
            Self::Sub => "sub",
            Self::ProviderSingle => "provider single",
        };

        write!(f, "{}", s)
    }
}

// Removed is never observed through the registry, only on items on their
// way back to the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    Unopened,
    Open,
    Closing,
    Removed,
}

/// Operations an item variant accepts after it has been opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ops(u8);

impl Ops {
    pub const NONE: Self = Self(0);
    pub const REISSUE: Self = Self(0x01);
    pub const POST: Self = Self(0x02);
    pub const GENERIC: Self = Self(0x04);
    pub const REFRESH: Self = Self(0x08);
    pub const UPDATE: Self = Self(0x10);
    pub const STATUS: Self = Self(0x20);

    pub fn contains(self, other: Self) -> bool {
        other.0 != 0 && (self.0 & other.0) == other.0
    }

    // the operation a submitted message needs, if it can be submitted at all
    pub fn for_msg(msg: &Msg) -> Option<Self> {
        match msg {
            Msg::Post(_) => Some(Self::POST),
            Msg::Generic(_) => Some(Self::GENERIC),
            Msg::Refresh(_) => Some(Self::REFRESH),
            Msg::Update(_) => Some(Self::UPDATE),
            Msg::Status(_) => Some(Self::STATUS),
            Msg::Request(_) | Msg::TunnelOpen(_) | Msg::Ack(_) | Msg::Close(_) => None,
        }
    }
}

impl BitOr for Ops {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

#[derive(Default)]
pub struct BatchState {
    // member handles in request order. slot i holds the member on stream
    // batch.stream_id + 1 + i, or 0 once that member is gone
    pub members: Vec<Handle>,

    pub outstanding: Counter,

    // a terminal status was seen on the batch stream itself
    pub status_seen: bool,
}

impl BatchState {
    pub fn member_at(&self, offset: i32) -> Option<Handle> {
        if offset < 1 {
            return None;
        }

        match self.members.get((offset - 1) as usize) {
            Some(&h) if h != 0 => Some(h),
            _ => None,
        }
    }

    pub fn live_members(&self) -> Vec<Handle> {
        self.members.iter().copied().filter(|&h| h != 0).collect()
    }

    // returns true if the member was live
    pub fn detach(&mut self, member: Handle) -> bool {
        match self.members.iter_mut().find(|h| **h == member) {
            Some(slot) => {
                *slot = 0;
                true
            }
            None => false,
        }
    }

    fn reset(&mut self) {
        self.members.clear();
        self.outstanding.set(0);
        self.status_seen = false;
    }
}

#[derive(Default)]
pub struct ProviderState {
    pub request_timer: Option<TimerHandle>,
}

pub enum Variant {
    Single,
    Batch(BatchState),
    Tunnel(TunnelState),
    Sub,
    ProviderSingle(ProviderState),
}

impl Variant {
    fn new(kind: ItemKind) -> Self {
        match kind {
            ItemKind::Single => Self::Single,
            ItemKind::Batch => Self::Batch(BatchState::default()),
            ItemKind::Tunnel => Self::Tunnel(TunnelState::default()),
            ItemKind::Sub => Self::Sub,
            ItemKind::ProviderSingle => Self::ProviderSingle(ProviderState::default()),
        }
    }
}

/// Snapshot of an item for inspection.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemInfo {
    pub handle: Handle,
    pub kind: ItemKind,
    pub state: ItemState,
    pub stream_id: i32,
    pub domain_type: u8,
    pub parent: Handle,
    pub service_name: Option<String>,
    pub closed_status_pending: bool,
}

pub struct Item {
    pub handle: Handle,
    pub state: ItemState,

    // 0 until assigned, then fixed for the life of the item
    pub stream_id: i32,

    pub domain_type: u8,

    // non-owning back-reference to a tunnel or batch item
    pub parent: Handle,

    pub client: Option<Arc<dyn Client>>,
    pub closure: Option<Closure>,

    pub connection: ConnectionId,

    // directory binding, None while unresolved
    pub service: Option<Service>,

    // the service the application asked for, if by name
    pub service_name: Option<String>,

    // most recent request submitted for this item
    pub request: Option<RequestMsg>,

    pub closed_status: Option<PendingClosedStatus>,

    pub variant: Variant,
}

impl Item {
    pub fn new(kind: ItemKind) -> Self {
        Self {
            handle: 0,
            state: ItemState::Unopened,
            stream_id: 0,
            domain_type: 0,
            parent: 0,
            client: None,
            closure: None,
            connection: 0,
            service: None,
            service_name: None,
            request: None,
            closed_status: None,
            variant: Variant::new(kind),
        }
    }

    pub fn kind(&self) -> ItemKind {
        match &self.variant {
            Variant::Single => ItemKind::Single,
            Variant::Batch(_) => ItemKind::Batch,
            Variant::Tunnel(_) => ItemKind::Tunnel,
            Variant::Sub => ItemKind::Sub,
            Variant::ProviderSingle(_) => ItemKind::ProviderSingle,
        }
    }

    pub fn attach(&mut self, client: Arc<dyn Client>, closure: Option<Closure>, parent: Handle) {
        self.client = Some(client);
        self.closure = closure;
        self.parent = parent;
    }

    pub fn assign_stream_id(&mut self, stream_id: i32) {
        debug_assert!(
            self.stream_id == 0 || self.stream_id == stream_id,
            "stream id of an item is immutable once assigned"
        );

        self.stream_id = stream_id;
    }

    // opened under single-open before `service` was known, and asks for it
    // by name or id
    pub fn awaits_service(&self, service: &Service) -> bool {
        if self.service.is_some() || self.state != ItemState::Open || self.is_doomed() {
            return false;
        }

        if !matches!(self.kind(), ItemKind::Single | ItemKind::ProviderSingle) {
            return false;
        }

        let req = match &self.request {
            Some(req) => req,
            None => return false,
        };

        match (&self.service_name, req.key.service_id) {
            (Some(name), _) => *name == service.name,
            (None, Some(id)) => id == service.id,
            (None, None) => false,
        }
    }

    // a closed status is scheduled, so the item only exists until it fires
    pub fn is_doomed(&self) -> bool {
        self.closed_status.is_some()
    }

    pub fn batch(&self) -> Option<&BatchState> {
        match &self.variant {
            Variant::Batch(b) => Some(b),
            _ => None,
        }
    }

    pub fn batch_mut(&mut self) -> Option<&mut BatchState> {
        match &mut self.variant {
            Variant::Batch(b) => Some(b),
            _ => None,
        }
    }

    pub fn tunnel(&self) -> Option<&TunnelState> {
        match &self.variant {
            Variant::Tunnel(t) => Some(t),
            _ => None,
        }
    }

    pub fn tunnel_mut(&mut self) -> Option<&mut TunnelState> {
        match &mut self.variant {
            Variant::Tunnel(t) => Some(t),
            _ => None,
        }
    }

    pub fn provider_mut(&mut self) -> Option<&mut ProviderState> {
        match &mut self.variant {
            Variant::ProviderSingle(p) => Some(p),
            _ => None,
        }
    }

    pub fn event(&self) -> ItemEvent {
        ItemEvent {
            handle: self.handle,
            parent_handle: self.parent,
            closure: self.closure.clone(),
        }
    }

    pub fn submit_options(&self, tunnel_stream_id: Option<i32>) -> SubmitOptions {
        SubmitOptions {
            connection: self.connection,
            handle: self.handle,
            service_name: match &self.service {
                Some(s) => Some(s.name.clone()),
                None => self.service_name.clone(),
            },
            service_id: self.service.as_ref().map(|s| s.id),
            tunnel_stream_id,
        }
    }

    pub fn info(&self) -> ItemInfo {
        ItemInfo {
            handle: self.handle,
            kind: self.kind(),
            state: self.state,
            stream_id: self.stream_id,
            domain_type: self.domain_type,
            parent: self.parent,
            service_name: self.service_name.clone(),
            closed_status_pending: self.is_doomed(),
        }
    }

    // clear all per-use state. variant allocations are kept for reuse
    pub fn reset(&mut self) {
        self.handle = 0;
        self.state = ItemState::Unopened;
        self.stream_id = 0;
        self.domain_type = 0;
        self.parent = 0;
        self.client = None;
        self.closure = None;
        self.connection = 0;
        self.service = None;
        self.service_name = None;
        self.request = None;
        self.closed_status = None;

        match &mut self.variant {
            Variant::Batch(b) => b.reset(),
            Variant::Tunnel(t) => t.reset(),
            Variant::ProviderSingle(p) => p.request_timer = None,
            Variant::Single | Variant::Sub => {}
        }
    }
}
