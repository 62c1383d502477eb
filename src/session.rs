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

use crate::client::{Client, Closure};
use crate::config::SessionConfig;
use crate::core::cell::{LocalCell, StateCell, SyncCell};
use crate::directory::{Directory, LoginSession, Service};
use crate::error::Error;
use crate::item::{Handle, ItemInfo};
use crate::msg::{Msg, RequestMsg, TunnelStreamRequest};
use crate::registry::ItemRegistry;
use crate::streamid::Role;
use crate::timeout::{TimeoutEvent, TimeoutFacility, TimerQueue};
use crate::transport::Transport;
use log::{debug, info};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// All mutable state of a session. Only ever touched through the session's
/// state cell.
pub struct SessionState {
    pub(crate) config: SessionConfig,
    pub(crate) registry: ItemRegistry,
    pub(crate) timeouts: Box<dyn TimeoutFacility>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) directory: Arc<dyn Directory>,
    pub(crate) login: Arc<dyn LoginSession>,
}

impl SessionState {
    pub fn new(
        config: SessionConfig,
        transport: Arc<dyn Transport>,
        directory: Arc<dyn Directory>,
        login: Arc<dyn LoginSession>,
        timeouts: Box<dyn TimeoutFacility>,
    ) -> Self {
        Self {
            registry: ItemRegistry::new(&config),
            config,
            timeouts,
            transport,
            directory,
            login,
        }
    }

    pub fn role(&self) -> Role {
        self.config.role
    }

    // closes every remaining item and drops pooled allocations
    fn shutdown(&mut self) -> usize {
        let handles = self.registry.top_level();
        let count = handles.len();

        for handle in handles {
            if let Err(e) = self.unregister(handle) {
                debug!("error closing handle {} on shutdown: {}", handle, e);
            }
        }

        self.registry.clear_pool();

        count
    }
}

/// Item layer of one consumer or provider session.
///
/// `C` decides how the state is guarded. Every operation takes the state
/// only for its own duration and application callbacks always run after
/// it has been released, so callbacks may re-enter the session.
pub struct Session<C> {
    state: C,
}

/// Session for single-threaded use.
pub type LocalSession = Session<LocalCell<SessionState>>;

/// Session that may be shared between a dispatch thread and application
/// threads.
pub type SharedSession = Session<SyncCell<SessionState>>;

impl<C> Session<C>
where
    C: StateCell<SessionState>,
{
    pub fn new(
        config: SessionConfig,
        transport: Arc<dyn Transport>,
        directory: Arc<dyn Directory>,
        login: Arc<dyn LoginSession>,
    ) -> Self {
        let timeouts = Box::new(TimerQueue::new(config.timer_capacity));

        Self::with_timeouts(config, transport, directory, login, timeouts)
    }

    pub fn with_timeouts(
        config: SessionConfig,
        transport: Arc<dyn Transport>,
        directory: Arc<dyn Directory>,
        login: Arc<dyn LoginSession>,
        timeouts: Box<dyn TimeoutFacility>,
    ) -> Self {
        debug!(
            "creating {} session item_count_hint={}",
            config.role, config.item_count_hint
        );

        Self {
            state: C::new(SessionState::new(
                config, transport, directory, login, timeouts,
            )),
        }
    }

    pub(crate) fn state(&self) -> &C {
        &self.state
    }

    pub fn role(&self) -> Role {
        self.state.with(|s| s.role())
    }

    /// Opens an item for `req` and returns its handle. A `parent` of 0
    /// opens a top-level item (single or batch on a consumer session,
    /// provider single on a provider session). A non-zero `parent` must be
    /// a tunnel handle, and opens a sub-item inside that tunnel.
    ///
    /// Routing failures are not errors. The item is returned as usual and
    /// its closed status is delivered to `client` shortly after.
    pub fn register_client(
        &self,
        req: RequestMsg,
        client: Arc<dyn Client>,
        closure: Option<Closure>,
        parent: Handle,
    ) -> Result<Handle, Error> {
        self.state
            .with(|s| s.register_client(req, client, closure, parent))
    }

    pub fn register_tunnel(
        &self,
        req: TunnelStreamRequest,
        client: Arc<dyn Client>,
        closure: Option<Closure>,
    ) -> Result<Handle, Error> {
        self.state.with(|s| s.open_tunnel(req, client, closure))
    }

    pub fn reissue(&self, req: RequestMsg, handle: Handle) -> Result<(), Error> {
        self.state.with(|s| s.reissue(req, handle))
    }

    /// Submits a post, generic, refresh, update or status message on an
    /// open item, stamped with the item's stream id and domain.
    pub fn submit(&self, msg: Msg, handle: Handle) -> Result<(), Error> {
        self.state.with(|s| s.submit(msg, handle))
    }

    /// Closes an item. The item is gone once this returns, even if the
    /// close could not be sent.
    pub fn unregister(&self, handle: Handle) -> Result<(), Error> {
        self.state.with(|s| s.unregister(handle))
    }

    /// Tells the session that `service` is now in the directory. Items
    /// opened for it under single-open are bound to it and their requests
    /// resent. Returns the number of items bound.
    pub fn service_added(&self, service: &Service) -> usize {
        self.state.with(|s| s.service_added(service))
    }

    pub fn item_info(&self, handle: Handle) -> Option<ItemInfo> {
        self.state.with(|s| s.registry.get(handle).map(|i| i.info()))
    }

    pub fn item_count(&self) -> usize {
        self.state.with(|s| s.registry.len())
    }

    pub fn stream_count(&self) -> usize {
        self.state.with(|s| s.registry.stream_count())
    }

    /// Handles every timer that has expired as of `now`, returning the
    /// number of events processed.
    pub fn process_timeouts(&self, now: Instant) -> usize {
        let mut count = 0;

        while let Some(event) = self.state.with(|s| s.timeouts.take_expired(now)) {
            count += 1;

            let delivery = self.state.with(|s| match event {
                TimeoutEvent::ClosedStatus(h) => s.fire_closed_status(h),
                TimeoutEvent::RequestTimeout(h) => s.fire_request_timeout(h),
            });

            if let Some(d) = delivery {
                d.deliver();
            }

            self.state.with(|s| s.remove_item(event.handle()));
        }

        count
    }

    pub fn next_timeout(&self, now: Instant) -> Option<Duration> {
        self.state.with(|s| s.timeouts.timeout(now))
    }

    pub fn shutdown(&self) {
        let count = self.state.with(|s| s.shutdown());

        info!("session shut down, closed {} items", count);
    }
}
