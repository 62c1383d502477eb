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

use crate::client::Delivery;
use crate::core::cell::StateCell;
use crate::error::DispatchError;
use crate::item::{Handle, ItemKind, ItemState};
use crate::msg::{Msg, StreamState};
use crate::session::{Session, SessionState};
use crate::tunnel::TUNNEL_SUB_STREAM_FLOOR;
use log::{debug, trace, warn};

/// A decoded message from the transport.
#[derive(Debug, Clone)]
pub struct Inbound {
    pub msg: Msg,

    // handle the transport attached to the stream at submit time, if any
    pub handle: Option<Handle>,

    // set for messages that arrived inside a tunnel stream. the message
    // stream id is then a sub-stream id
    pub tunnel_stream_id: Option<i32>,
}

impl Inbound {
    pub fn new(msg: Msg) -> Self {
        Self {
            msg,
            handle: None,
            tunnel_stream_id: None,
        }
    }

    pub fn with_handle(mut self, handle: Handle) -> Self {
        self.handle = Some(handle);
        self
    }

    pub fn in_tunnel(mut self, tunnel_stream_id: i32) -> Self {
        self.tunnel_stream_id = Some(tunnel_stream_id);
        self
    }
}

// what happens to the target item once the callback has returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Followup {
    None,
    Remove(Handle),
    BatchStreamClosed(Handle),
}

fn is_terminal(msg: &Msg) -> bool {
    match msg {
        Msg::Refresh(m) => match m.state.stream_state {
            StreamState::Open => false,
            StreamState::NonStreaming => m.complete,
            _ => true,
        },
        Msg::Status(m) => match &m.state {
            Some(state) => !state.stream_state.is_open(),
            None => false,
        },
        _ => false,
    }
}

impl SessionState {
    fn resolve_item(&self, handle: Option<Handle>, stream_id: i32) -> Result<Handle, DispatchError> {
        let handle = match handle.filter(|h| self.registry.contains(*h)) {
            Some(h) => h,
            None => match self.registry.handle_for_stream(stream_id) {
                Some(h) => h,
                None => return Err(DispatchError::UnknownStream(stream_id)),
            },
        };

        let item = match self.registry.get(handle) {
            Some(item) => item,
            None => return Err(DispatchError::UnknownStream(stream_id)),
        };

        if let Some(batch) = item.batch() {
            // member streams follow the batch stream in request order
            if stream_id != item.stream_id {
                return match batch.member_at(stream_id - item.stream_id) {
                    Some(member) => Ok(member),
                    None => Err(DispatchError::BatchMemberGone {
                        batch_stream: item.stream_id,
                        stream: stream_id,
                    }),
                };
            }
        }

        Ok(handle)
    }

    fn resolve_sub_item(&self, tunnel_stream_id: i32, stream_id: i32) -> Result<Handle, DispatchError> {
        let tunnel = match self.registry.handle_for_stream(tunnel_stream_id) {
            Some(h) => h,
            None => return Err(DispatchError::UnknownStream(tunnel_stream_id)),
        };

        let state = match self.registry.get(tunnel).and_then(|t| t.tunnel()) {
            Some(state) => state,
            None => return Err(DispatchError::NotATunnel(tunnel_stream_id)),
        };

        if stream_id < TUNNEL_SUB_STREAM_FLOOR {
            return Err(DispatchError::MalformedTunnelMsg {
                tunnel: tunnel_stream_id,
                stream: stream_id,
            });
        }

        match state.space.get(stream_id) {
            Some(h) => Ok(h),
            None => Err(DispatchError::UnknownSubStream {
                tunnel: tunnel_stream_id,
                stream: stream_id,
            }),
        }
    }

    // find the target item and capture everything needed to call it back.
    // the returned list holds statuses for sub-items of a closed tunnel
    fn route_inbound(
        &mut self,
        inbound: Inbound,
    ) -> Result<(Delivery, Vec<Delivery>, Followup), DispatchError> {
        let Inbound {
            msg,
            handle,
            tunnel_stream_id,
        } = inbound;

        match &msg {
            Msg::Request(_) | Msg::TunnelOpen(_) | Msg::Post(_) | Msg::Close(_) => {
                return Err(DispatchError::UnexpectedMsg(msg.name()))
            }
            _ => {}
        }

        let stream_id = msg.stream_id();

        let target = match tunnel_stream_id {
            Some(t) => self.resolve_sub_item(t, stream_id)?,
            None => self.resolve_item(handle, stream_id)?,
        };

        let item = match self.registry.get_mut(target) {
            Some(item) => item,
            None => return Err(DispatchError::UnknownStream(stream_id)),
        };

        let kind = item.kind();

        let first_response = matches!(msg, Msg::Refresh(_) | Msg::Status(_));

        if first_response {
            if let Some(timer) = item.provider_mut().and_then(|p| p.request_timer.take()) {
                self.timeouts.cancel(timer);
            }
        }

        if kind == ItemKind::Tunnel && msg.stream_state() == Some(StreamState::Open) {
            if let Some(t) = item.tunnel_mut() {
                if !t.established {
                    debug!("tunnel handle={} established", target);
                }

                t.established = true;
            }
        }

        let followup = if is_terminal(&msg) {
            if kind == ItemKind::Batch {
                Followup::BatchStreamClosed(target)
            } else {
                Followup::Remove(target)
            }
        } else {
            Followup::None
        };

        let client = match &item.client {
            Some(c) => c.clone(),
            None => return Err(DispatchError::UnknownStream(stream_id)),
        };

        // the stream is already closed upstream
        if let Followup::Remove(_) = followup {
            item.state = ItemState::Closing;
        }

        let delivery = Delivery {
            client,
            event: item.event(),
            msg,
        };

        let orphans = if kind == ItemKind::Tunnel && followup != Followup::None {
            self.tunnel_closed_statuses(target)
        } else {
            Vec::new()
        };

        Ok((delivery, orphans, followup))
    }
}

impl<C> Session<C>
where
    C: StateCell<SessionState>,
{
    /// Routes one inbound message to its item and delivers it. Messages
    /// that can not be routed are dropped and the reason returned. A
    /// message that leaves its stream closed also removes the item, after
    /// the callback has returned. When that item is a tunnel, each of its
    /// sub-items is first told with a closed recover status.
    pub fn dispatch(&self, inbound: Inbound) -> Result<(), DispatchError> {
        let routed = self.state().with(|s| s.route_inbound(inbound));

        let (delivery, orphans, followup) = match routed {
            Ok(ret) => ret,
            Err(e) => {
                warn!("dropping inbound message: {}", e);

                return Err(e);
            }
        };

        trace!(
            "delivering {} to handle={}",
            delivery.msg,
            delivery.event.handle
        );

        delivery.deliver();

        for d in orphans {
            d.deliver();
        }

        match followup {
            Followup::None => {}
            Followup::Remove(handle) => {
                self.state().with(|s| s.remove_item(handle));
            }
            Followup::BatchStreamClosed(handle) => {
                self.state().with(|s| s.batch_stream_closed(handle));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msg::{domain, DataState, RefreshMsg, State, StatusCode, StatusMsg, UpdateMsg};

    #[test]
    fn terminal_messages() {
        let open = Msg::Refresh(RefreshMsg::new(5, domain::MARKET_PRICE, State::open_ok()));
        assert!(!is_terminal(&open));

        let snapshot = State::new(StreamState::NonStreaming, DataState::Ok, StatusCode::None, "");
        let mut partial = RefreshMsg::new(5, domain::MARKET_PRICE, snapshot);
        partial.complete = false;
        assert!(!is_terminal(&Msg::Refresh(partial.clone())));

        partial.complete = true;
        assert!(is_terminal(&Msg::Refresh(partial)));

        let closed = State::new(StreamState::Closed, DataState::Suspect, StatusCode::NotFound, "");
        assert!(is_terminal(&Msg::Status(StatusMsg::new(5, domain::MARKET_PRICE, Some(closed)))));
        assert!(!is_terminal(&Msg::Status(StatusMsg::new(5, domain::MARKET_PRICE, None))));
        assert!(!is_terminal(&Msg::Update(UpdateMsg::new(5, domain::MARKET_PRICE))));
    }
}
