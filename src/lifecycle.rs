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

//! Opening, modifying and closing items. Everything here runs with the
//! session state held and never calls into the application.

use crate::client::{Client, Closure};
use crate::closedstatus::{self, ClosedStatus};
use crate::directory::Service;
use crate::error::Error;
use crate::item::{Handle, Item, ItemKind, ItemState, Ops};
use crate::msg::{
    domain, CloseMsg, Msg, MsgKey, RequestMsg, State, TunnelStreamRequest, DICTIONARY_ENUM_NAME,
    DICTIONARY_FIELD_NAME,
};
use crate::session::SessionState;
use crate::streamid::Role;
use crate::timeout::TimeoutEvent;
use crate::transport::ConnectionId;
use log::{debug, warn};
use std::sync::Arc;

enum Route {
    Ready {
        connection: ConnectionId,

        // None while pending on a service the directory doesn't know yet
        service: Option<Service>,
    },
    Failed(State),
}

fn validate_request(req: &RequestMsg) -> Result<(), Error> {
    if req.domain_type == domain::LOGIN || req.domain_type == domain::SOURCE {
        return Err(Error::invalid_usage(format!(
            "domain {} is managed by the session and can not be opened as an item",
            req.domain_type
        )));
    }

    if !req.batch_names.is_empty() {
        if req.key.name.is_some() {
            return Err(Error::invalid_usage(
                "batch request must not also carry an item name",
            ));
        }

        if req.batch_names.iter().any(|n| n.is_empty()) {
            return Err(Error::invalid_usage("batch request contains an empty name"));
        }

        return Ok(());
    }

    let name = match req.name() {
        Some(name) if !name.is_empty() => name,
        _ => return Err(Error::invalid_usage("request has no item name")),
    };

    if req.domain_type == domain::DICTIONARY
        && name != DICTIONARY_FIELD_NAME
        && name != DICTIONARY_ENUM_NAME
    {
        return Err(Error::invalid_usage(format!(
            "dictionary name must be {} or {}, not {}",
            DICTIONARY_FIELD_NAME, DICTIONARY_ENUM_NAME, name
        )));
    }

    Ok(())
}

impl SessionState {
    fn route(
        &self,
        service_name: Option<&str>,
        service_id: Option<u16>,
        require_service: bool,
    ) -> Route {
        let connection = match self.login.active_connection() {
            Some(c) => c,
            None => return Route::Failed(closedstatus::no_connection()),
        };

        let pending = self.login.single_open_supported();

        if let Some(name) = service_name {
            return match self.directory.resolve_name(name) {
                Some(svc) => Route::Ready {
                    connection,
                    service: Some(svc),
                },
                None if pending => Route::Ready {
                    connection,
                    service: None,
                },
                None => Route::Failed(closedstatus::service_name_not_found(name)),
            };
        }

        if let Some(id) = service_id {
            return match self.directory.resolve_id(id) {
                Some(svc) => Route::Ready {
                    connection,
                    service: Some(svc),
                },
                None if pending => Route::Ready {
                    connection,
                    service: None,
                },
                None => Route::Failed(closedstatus::service_id_not_found(id)),
            };
        }

        if require_service {
            return Route::Failed(closedstatus::no_service());
        }

        Route::Ready {
            connection,
            service: None,
        }
    }

    // registers an item that failed routing and arms its closed status
    fn register_failed(&mut self, item: Item, status: ClosedStatus) -> Result<Handle, Error> {
        let handle = self.registry.register(item);

        if let Err(e) = self.schedule_closed_status(handle, status) {
            self.remove_item(handle);

            return Err(e);
        }

        Ok(handle)
    }

    fn tunnel_stream_of(&self, item: &Item) -> Option<i32> {
        if item.kind() != ItemKind::Sub {
            return None;
        }

        self.registry.get(item.parent).map(|t| t.stream_id)
    }

    pub(crate) fn register_client(
        &mut self,
        req: RequestMsg,
        client: Arc<dyn Client>,
        closure: Option<Closure>,
        parent: Handle,
    ) -> Result<Handle, Error> {
        validate_request(&req)?;

        if parent != 0 {
            return self.open_sub_item(req, client, closure, parent);
        }

        match self.role() {
            Role::Consumer if !req.batch_names.is_empty() => self.open_batch(req, client, closure),
            Role::Consumer => self.open_single(req, client, closure),
            Role::Provider if !req.batch_names.is_empty() => Err(Error::invalid_usage(
                "batch requests are not supported on a provider session",
            )),
            Role::Provider => self.open_provider_item(req, client, closure),
        }
    }

    fn open_single(
        &mut self,
        mut req: RequestMsg,
        client: Arc<dyn Client>,
        closure: Option<Closure>,
    ) -> Result<Handle, Error> {
        let mut item = self.registry.create(ItemKind::Single);
        item.attach(client, closure, 0);
        item.domain_type = req.domain_type;
        item.service_name = req.service_name.clone();

        let (connection, service) =
            match self.route(req.service_name.as_deref(), req.key.service_id, true) {
                Route::Ready {
                    connection,
                    service,
                } => (connection, service),
                Route::Failed(state) => {
                    let status = ClosedStatus::new(
                        req.domain_type,
                        req.key.clone(),
                        req.service_name.clone(),
                        state,
                    );

                    return self.register_failed(item, status);
                }
            };

        let stream_id = match self.registry.next_stream_id(1) {
            Ok(id) => id,
            Err(e) => {
                self.registry.recycle(item);

                return Err(e);
            }
        };

        item.assign_stream_id(stream_id);
        item.connection = connection;
        item.service = service;

        req.stream_id = stream_id;
        req.qos.get_or_insert_with(Default::default);

        if let Err(e) = self
            .transport
            .submit(&Msg::Request(req.clone()), &item.submit_options(None))
        {
            self.registry.recycle(item);

            return Err(e.into());
        }

        item.state = ItemState::Open;
        item.request = Some(req);

        let handle = self.registry.register(item);
        self.registry.bind_stream(stream_id, handle);

        debug!("opened single item handle={} stream={}", handle, stream_id);

        Ok(handle)
    }

    fn open_batch(
        &mut self,
        mut req: RequestMsg,
        client: Arc<dyn Client>,
        closure: Option<Closure>,
    ) -> Result<Handle, Error> {
        let names = req.batch_names.clone();

        let mut batch = self.registry.create(ItemKind::Batch);
        batch.attach(client.clone(), closure.clone(), 0);
        batch.domain_type = req.domain_type;
        batch.service_name = req.service_name.clone();

        let batch_handle = batch.handle;

        let mut members = Vec::with_capacity(names.len());

        for name in names.iter() {
            let mut member = self.registry.create(ItemKind::Single);
            member.attach(client.clone(), closure.clone(), batch_handle);
            member.domain_type = req.domain_type;
            member.service_name = req.service_name.clone();

            let mut member_req = req.clone();
            member_req.batch_names.clear();
            member_req.key.name = Some(name.clone());
            member.request = Some(member_req);

            members.push(member);
        }

        if let Some(b) = batch.batch_mut() {
            b.members = members.iter().map(|m| m.handle).collect();
            b.outstanding.set(members.len());
        }

        let (connection, service) =
            match self.route(req.service_name.as_deref(), req.key.service_id, true) {
                Route::Ready {
                    connection,
                    service,
                } => (connection, service),
                Route::Failed(state) => {
                    // nothing was sent, so no status will ever arrive on
                    // the batch stream itself
                    if let Some(b) = batch.batch_mut() {
                        b.status_seen = true;
                    }

                    self.registry.register(batch);

                    for member in members {
                        let status = ClosedStatus::new(
                            req.domain_type,
                            MsgKey {
                                name: member.request.as_ref().and_then(|r| r.key.name.clone()),
                                ..req.key.clone()
                            },
                            req.service_name.clone(),
                            state.clone(),
                        );

                        if let Err(e) = self.register_failed(member, status) {
                            self.remove_item(batch_handle);

                            return Err(e);
                        }
                    }

                    return Ok(batch_handle);
                }
            };

        let count = names.len() as u32 + 1;

        let first = match self.registry.next_stream_id(count) {
            Ok(id) => id,
            Err(e) => {
                for member in members {
                    self.registry.recycle(member);
                }

                self.registry.recycle(batch);

                return Err(e);
            }
        };

        batch.assign_stream_id(first);
        batch.connection = connection;
        batch.service = service.clone();

        req.stream_id = first;
        req.qos.get_or_insert_with(Default::default);

        if let Err(e) = self
            .transport
            .submit(&Msg::Request(req.clone()), &batch.submit_options(None))
        {
            for member in members {
                self.registry.recycle(member);
            }

            self.registry.recycle(batch);

            return Err(e.into());
        }

        batch.state = ItemState::Open;
        batch.request = Some(req);

        self.registry.register(batch);
        self.registry.bind_stream(first, batch_handle);

        for (i, mut member) in members.into_iter().enumerate() {
            let stream_id = first + 1 + i as i32;

            member.assign_stream_id(stream_id);
            member.connection = connection;
            member.service = service.clone();
            member.state = ItemState::Open;

            if let Some(r) = member.request.as_mut() {
                r.stream_id = stream_id;
                r.qos.get_or_insert_with(Default::default);
            }

            let handle = self.registry.register(member);
            self.registry.bind_stream(stream_id, handle);
        }

        debug!(
            "opened batch item handle={} stream={} members={}",
            batch_handle,
            first,
            count - 1
        );

        Ok(batch_handle)
    }

    pub(crate) fn open_tunnel(
        &mut self,
        mut req: TunnelStreamRequest,
        client: Arc<dyn Client>,
        closure: Option<Closure>,
    ) -> Result<Handle, Error> {
        if self.role() != Role::Consumer {
            return Err(Error::invalid_usage(
                "tunnel streams are not supported on a provider session",
            ));
        }

        let name = match &req.name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => return Err(Error::invalid_usage("tunnel stream request has no name")),
        };

        if req.service_name.is_none() && req.service_id.is_none() {
            return Err(Error::invalid_usage(
                "tunnel stream request must identify a service",
            ));
        }

        let mut item = self.registry.create(ItemKind::Tunnel);
        item.attach(client, closure, 0);
        item.domain_type = req.domain_type;
        item.service_name = req.service_name.clone();

        let (connection, service) =
            match self.route(req.service_name.as_deref(), req.service_id, true) {
                Route::Ready {
                    connection,
                    service,
                } => (connection, service),
                Route::Failed(state) => {
                    let status = ClosedStatus::new(
                        req.domain_type,
                        MsgKey {
                            service_id: req.service_id,
                            ..MsgKey::with_name(&name)
                        },
                        req.service_name.clone(),
                        state,
                    );

                    return self.register_failed(item, status);
                }
            };

        let stream_id = match self.registry.next_stream_id(1) {
            Ok(id) => id,
            Err(e) => {
                self.registry.recycle(item);

                return Err(e);
            }
        };

        item.assign_stream_id(stream_id);
        item.connection = connection;
        item.service = service;

        req.stream_id = stream_id;

        if let Err(e) = self
            .transport
            .submit(&Msg::TunnelOpen(req), &item.submit_options(None))
        {
            self.registry.recycle(item);

            return Err(e.into());
        }

        item.state = ItemState::Open;

        let handle = self.registry.register(item);
        self.registry.bind_stream(stream_id, handle);

        debug!(
            "opened tunnel item handle={} stream={} name={}",
            handle, stream_id, name
        );

        Ok(handle)
    }

    fn open_sub_item(
        &mut self,
        mut req: RequestMsg,
        client: Arc<dyn Client>,
        closure: Option<Closure>,
        parent: Handle,
    ) -> Result<Handle, Error> {
        match self.registry.get(parent) {
            Some(t) if t.kind() == ItemKind::Tunnel => {
                if t.is_doomed() || t.state != ItemState::Open {
                    return Err(Error::InvalidHandle(parent));
                }
            }
            Some(t) if !t.is_doomed() => {
                return Err(Error::invalid_usage(format!(
                    "parent handle {} is a {} item, not a tunnel",
                    parent,
                    t.kind()
                )))
            }
            _ => return Err(Error::InvalidHandle(parent)),
        }

        if !req.batch_names.is_empty() {
            return Err(Error::invalid_usage(
                "batch requests are not supported inside a tunnel stream",
            ));
        }

        if req.service_name.is_some() || req.key.service_id.is_some() {
            return Err(Error::invalid_usage(
                "requests inside a tunnel stream must not name a service",
            ));
        }

        let mut item = self.registry.create(ItemKind::Sub);
        item.attach(client, closure, parent);
        item.domain_type = req.domain_type;

        let (tunnel_stream_id, connection, service, sub_id) = {
            let tunnel = match self.registry.get_mut(parent) {
                Some(t) => t,
                None => return Err(Error::InvalidHandle(parent)),
            };

            let tunnel_stream_id = tunnel.stream_id;
            let connection = tunnel.connection;
            let service = tunnel.service.clone();

            let space = match tunnel.tunnel_mut() {
                Some(t) => &mut t.space,
                None => return Err(Error::InvalidHandle(parent)),
            };

            match space.open(req.stream_id, item.handle) {
                Ok(id) => (tunnel_stream_id, connection, service, id),
                Err(e) => {
                    self.registry.recycle(item);

                    return Err(e);
                }
            }
        };

        item.assign_stream_id(sub_id);
        item.connection = connection;
        item.service = service;

        req.stream_id = sub_id;
        req.qos.get_or_insert_with(Default::default);

        if let Err(e) = self.transport.submit(
            &Msg::Request(req.clone()),
            &item.submit_options(Some(tunnel_stream_id)),
        ) {
            if let Some(t) = self
                .registry
                .get_mut(parent)
                .and_then(|t| t.tunnel_mut())
            {
                t.space.release(sub_id);
            }

            self.registry.recycle(item);

            return Err(e.into());
        }

        item.state = ItemState::Open;
        item.request = Some(req);

        let handle = self.registry.register(item);

        debug!(
            "opened sub item handle={} tunnel={} stream={}",
            handle, parent, sub_id
        );

        Ok(handle)
    }

    fn open_provider_item(
        &mut self,
        mut req: RequestMsg,
        client: Arc<dyn Client>,
        closure: Option<Closure>,
    ) -> Result<Handle, Error> {
        let mut item = self.registry.create(ItemKind::ProviderSingle);
        item.attach(client, closure, 0);
        item.domain_type = req.domain_type;
        item.service_name = req.service_name.clone();

        let (connection, service) =
            match self.route(req.service_name.as_deref(), req.key.service_id, false) {
                Route::Ready {
                    connection,
                    service,
                } => (connection, service),
                Route::Failed(state) => {
                    let status = ClosedStatus::new(
                        req.domain_type,
                        req.key.clone(),
                        req.service_name.clone(),
                        state,
                    );

                    return self.register_failed(item, status);
                }
            };

        let stream_id = match self.registry.next_stream_id(1) {
            Ok(id) => id,
            Err(e) => {
                self.registry.recycle(item);

                return Err(e);
            }
        };

        item.assign_stream_id(stream_id);
        item.connection = connection;
        item.service = service;

        req.stream_id = stream_id;
        req.qos.get_or_insert_with(Default::default);

        if let Err(e) = self
            .transport
            .submit(&Msg::Request(req.clone()), &item.submit_options(None))
        {
            self.registry.recycle(item);

            return Err(e.into());
        }

        item.state = ItemState::Open;
        item.request = Some(req);

        let handle = self.registry.register(item);
        self.registry.bind_stream(stream_id, handle);

        if let Some(timeout) = self.config.request_timeout() {
            match self
                .timeouts
                .schedule(timeout, TimeoutEvent::RequestTimeout(handle))
            {
                Ok(timer) => {
                    if let Some(p) = self
                        .registry
                        .get_mut(handle)
                        .and_then(|i| i.provider_mut())
                    {
                        p.request_timer = Some(timer);
                    }
                }
                Err(e) => warn!(
                    "request timeout not armed for handle {}: {}",
                    handle, e
                ),
            }
        }

        debug!("opened provider item handle={} stream={}", handle, stream_id);

        Ok(handle)
    }

    /// Binds items left pending under single-open to a service that has
    /// just appeared in the directory, resending each one's request with
    /// the resolved service. An item whose resend fails stays pending.
    pub(crate) fn service_added(&mut self, service: &Service) -> usize {
        let mut count = 0;

        for handle in self.registry.awaiting_service(service) {
            let (msg, opts) = match self.registry.get(handle) {
                Some(item) => match &item.request {
                    Some(req) => {
                        let mut opts = item.submit_options(self.tunnel_stream_of(item));
                        opts.service_name = Some(service.name.clone());
                        opts.service_id = Some(service.id);

                        (Msg::Request(req.clone()), opts)
                    }
                    None => continue,
                },
                None => continue,
            };

            if let Err(e) = self.transport.submit(&msg, &opts) {
                warn!(
                    "failed to resend request of handle {} to service {}: {}",
                    handle, service.name, e
                );

                continue;
            }

            if let Some(item) = self.registry.get_mut(handle) {
                item.service = Some(service.clone());
            }

            count += 1;
        }

        if count > 0 {
            debug!("bound {} pending items to service {}", count, service.name);
        }

        count
    }

    // an open, non-doomed item, or InvalidHandle
    fn open_item(&self, handle: Handle) -> Result<&Item, Error> {
        match self.registry.get(handle) {
            Some(item) if !item.is_doomed() && item.state == ItemState::Open => Ok(item),
            _ => Err(Error::InvalidHandle(handle)),
        }
    }

    pub(crate) fn reissue(&mut self, mut req: RequestMsg, handle: Handle) -> Result<(), Error> {
        let item = self.open_item(handle)?;

        let kind = item.kind();

        if !kind.ops().contains(Ops::REISSUE) {
            return Err(Error::InvalidOperation { op: "reissue", kind });
        }

        if !req.batch_names.is_empty() {
            return Err(Error::invalid_usage("reissue can not carry a batch"));
        }

        if req.domain_type != item.domain_type {
            return Err(Error::invalid_usage(format!(
                "reissue can not change domain from {} to {}",
                item.domain_type, req.domain_type
            )));
        }

        if let Some(name) = &req.service_name {
            if item.service_name.as_deref() != Some(name.as_str()) {
                return Err(Error::invalid_usage("reissue can not change the service"));
            }
        }

        let prev = item.request.as_ref();

        if let (Some(name), Some(prev)) = (req.name(), prev) {
            if prev.name() != Some(name) {
                return Err(Error::invalid_usage("reissue can not change the item name"));
            }
        }

        req.stream_id = item.stream_id;

        if req.key.name.is_none() {
            req.key.name = prev.and_then(|p| p.key.name.clone());
        }

        if req.qos.is_none() {
            req.qos = prev.and_then(|p| p.qos);
        }

        let opts = item.submit_options(self.tunnel_stream_of(item));

        self.transport.submit(&Msg::Request(req.clone()), &opts)?;

        if let Some(item) = self.registry.get_mut(handle) {
            item.request = Some(req);
        }

        debug!("reissued handle={}", handle);

        Ok(())
    }

    pub(crate) fn submit(&mut self, mut msg: Msg, handle: Handle) -> Result<(), Error> {
        let op = match Ops::for_msg(&msg) {
            Some(op) => op,
            None => {
                return Err(Error::invalid_usage(format!(
                    "{} messages can not be submitted on an item",
                    msg.name()
                )))
            }
        };

        let item = self.open_item(handle)?;

        let kind = item.kind();

        if !kind.ops().contains(op) {
            return Err(Error::InvalidOperation {
                op: msg.name(),
                kind,
            });
        }

        msg.set_stream_id(item.stream_id);

        // generic messages may travel on their own domain
        if !matches!(&msg, Msg::Generic(m) if m.domain_type != 0) {
            msg.set_domain_type(item.domain_type);
        }

        let opts = item.submit_options(self.tunnel_stream_of(item));

        self.transport.submit(&msg, &opts)?;

        Ok(())
    }

    fn send_close(&mut self, handle: Handle) -> Result<(), Error> {
        let item = match self.registry.get(handle) {
            Some(item) => item,
            None => return Ok(()),
        };

        if item.state != ItemState::Open || item.stream_id == 0 {
            return Ok(());
        }

        let msg = Msg::Close(CloseMsg {
            stream_id: item.stream_id,
            domain_type: item.domain_type,
        });

        let opts = item.submit_options(self.tunnel_stream_of(item));

        if let Some(item) = self.registry.get_mut(handle) {
            item.state = ItemState::Closing;
        }

        self.transport.submit(&msg, &opts)?;

        Ok(())
    }

    // send a close and remove, removing even if the close fails
    fn close_item(&mut self, handle: Handle) -> Result<(), Error> {
        let ret = self.send_close(handle);

        self.remove_item(handle);

        if let Err(e) = &ret {
            warn!("close of handle {} failed: {}", handle, e);
        }

        ret
    }

    pub(crate) fn unregister(&mut self, handle: Handle) -> Result<(), Error> {
        let item = match self.registry.get(handle) {
            Some(item) => item,
            None => return Err(Error::InvalidHandle(handle)),
        };

        if item.is_doomed() {
            // nothing was sent upstream, and the pending status is dropped
            self.remove_item(handle);

            return Ok(());
        }

        match item.kind() {
            ItemKind::Batch => {
                let members = match item.batch() {
                    Some(b) => b.live_members(),
                    None => Vec::new(),
                };

                let mut ret = Ok(());

                for member in members {
                    if let Err(e) = self.close_item(member) {
                        if ret.is_ok() {
                            ret = Err(e);
                        }
                    }
                }

                // the last member going away may have released the batch
                self.remove_item(handle);

                ret
            }
            ItemKind::Tunnel => {
                self.detach_sub_items(handle);

                self.close_item(handle)
            }
            _ => self.close_item(handle),
        }
    }

    fn detach_sub_items(&mut self, tunnel: Handle) {
        let subs = match self
            .registry
            .get_mut(tunnel)
            .and_then(|t| t.tunnel_mut())
        {
            Some(t) => t.space.detach_all(),
            None => return,
        };

        for sub in subs {
            self.remove_item(sub);
        }
    }

    /// Takes an item out of the session and returns it to the pool. Safe
    /// to call for handles that are already gone.
    pub(crate) fn remove_item(&mut self, handle: Handle) -> bool {
        let mut item = match self.registry.unregister(handle) {
            Some(item) => item,
            None => return false,
        };

        if let Some(pending) = item.closed_status.take() {
            self.timeouts.cancel(pending.timer);
        }

        if let Some(timer) = item.provider_mut().and_then(|p| p.request_timer.take()) {
            self.timeouts.cancel(timer);
        }

        match item.kind() {
            ItemKind::Sub => {
                if let Some(t) = self
                    .registry
                    .get_mut(item.parent)
                    .and_then(|t| t.tunnel_mut())
                {
                    t.space.release(item.stream_id);
                }
            }
            ItemKind::Tunnel => {
                let subs = match item.tunnel_mut() {
                    Some(t) => t.space.detach_all(),
                    None => Vec::new(),
                };

                for sub in subs {
                    self.remove_item(sub);
                }
            }
            ItemKind::Batch => {
                let members = match item.batch() {
                    Some(b) => b.live_members(),
                    None => Vec::new(),
                };

                for member in members {
                    self.remove_item(member);
                }
            }
            ItemKind::Single if item.parent != 0 => self.member_removed(item.parent, handle),
            _ => {}
        }

        item.state = ItemState::Removed;

        debug!(
            "removed {} item handle={} stream={}",
            item.kind(),
            handle,
            item.stream_id
        );

        self.registry.recycle(item);

        true
    }

    fn member_removed(&mut self, batch_handle: Handle, member: Handle) {
        let release = match self
            .registry
            .get_mut(batch_handle)
            .and_then(|b| b.batch_mut())
        {
            Some(b) => {
                if !b.detach(member) {
                    return;
                }

                match b.outstanding.dec(1) {
                    Ok(remaining) => remaining == 0 && b.status_seen,
                    Err(_) => {
                        warn!("batch handle={} member count underflow", batch_handle);

                        false
                    }
                }
            }
            None => false,
        };

        if release {
            self.remove_item(batch_handle);
        }
    }

    // a terminal status arrived on the batch stream itself
    pub(crate) fn batch_stream_closed(&mut self, batch_handle: Handle) {
        let (stream_id, release) = match self.registry.get_mut(batch_handle) {
            Some(item) => {
                let stream_id = item.stream_id;

                match item.batch_mut() {
                    Some(b) => {
                        b.status_seen = true;

                        (stream_id, b.outstanding.get() == 0)
                    }
                    None => return,
                }
            }
            None => return,
        };

        // members keep their own streams
        self.registry.unbind_stream(stream_id, batch_handle);

        if release {
            self.remove_item(batch_handle);
        }
    }
}
