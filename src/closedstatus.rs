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

//! Deferred failure delivery. An item that can not be routed at open time
//! is still registered and handed back to the caller, and its closed status
//! is delivered from the timeout facility once the opening call has
//! returned.

use crate::client::Delivery;
use crate::error::Error;
use crate::item::{Handle, ItemState};
use crate::msg::{CloseMsg, DataState, Msg, MsgKey, StatusCode, StatusMsg, State, StreamState};
use crate::session::SessionState;
use crate::timeout::{TimeoutEvent, TimerHandle};
use log::{debug, trace, warn};

/// Template for a synthetic status, captured when the failure is detected.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedStatus {
    pub domain_type: u8,
    pub key: MsgKey,
    pub service_name: Option<String>,
    pub state: State,
}

impl ClosedStatus {
    pub fn new(domain_type: u8, key: MsgKey, service_name: Option<String>, state: State) -> Self {
        Self {
            domain_type,
            key,
            service_name,
            state,
        }
    }

    pub fn to_status_msg(&self, stream_id: i32) -> StatusMsg {
        let mut msg = StatusMsg::new(stream_id, self.domain_type, Some(self.state.clone()));

        msg.key = self.key.clone();
        msg.service_name = self.service_name.clone();

        msg
    }
}

pub struct PendingClosedStatus {
    pub timer: TimerHandle,
    pub status: ClosedStatus,
}

pub fn service_name_not_found(name: &str) -> State {
    State::new(
        StreamState::Closed,
        DataState::Suspect,
        StatusCode::NotFound,
        &format!("Service name of '{}' is not found.", name),
    )
}

pub fn service_id_not_found(id: u16) -> State {
    State::new(
        StreamState::Closed,
        DataState::Suspect,
        StatusCode::NotFound,
        &format!("Service id of '{}' is not found.", id),
    )
}

pub fn no_service() -> State {
    State::new(
        StreamState::Closed,
        DataState::Suspect,
        StatusCode::None,
        "Passed in request message does not identify any service.",
    )
}

pub fn no_connection() -> State {
    State::new(
        StreamState::ClosedRecover,
        DataState::Suspect,
        StatusCode::None,
        "Session is not connected.",
    )
}

pub fn tunnel_closed() -> State {
    State::new(
        StreamState::ClosedRecover,
        DataState::Suspect,
        StatusCode::None,
        "Tunnel stream closed.",
    )
}

pub fn request_timed_out() -> State {
    State::new(
        StreamState::ClosedRecover,
        DataState::Suspect,
        StatusCode::Timeout,
        "Request timed out.",
    )
}

impl SessionState {
    /// Arms the closed status timer for an item. Returns false if one is
    /// already pending, in which case the earlier status wins.
    pub(crate) fn schedule_closed_status(
        &mut self,
        handle: Handle,
        status: ClosedStatus,
    ) -> Result<bool, Error> {
        let delay = self.config.closed_status_delay();

        let item = match self.registry.get_mut(handle) {
            Some(item) => item,
            None => return Err(Error::InvalidHandle(handle)),
        };

        if item.closed_status.is_some() {
            trace!("closed status already pending for handle {}", handle);

            return Ok(false);
        }

        let timer = self
            .timeouts
            .schedule(delay, TimeoutEvent::ClosedStatus(handle))?;

        debug!(
            "scheduled closed status for {} item handle={}: {}",
            item.kind(),
            handle,
            status.state
        );

        item.closed_status = Some(PendingClosedStatus { timer, status });

        Ok(true)
    }

    // builds the synthetic status for a fired timer. the item stays
    // registered, and so unusable, until the caller removes it
    pub(crate) fn fire_closed_status(&mut self, handle: Handle) -> Option<Delivery> {
        let item = self.registry.get(handle)?;

        let pending = item.closed_status.as_ref()?;

        let msg = Msg::Status(pending.status.to_status_msg(item.stream_id));

        Some(Delivery {
            client: item.client.clone()?,
            event: item.event(),
            msg,
        })
    }

    pub(crate) fn fire_request_timeout(&mut self, handle: Handle) -> Option<Delivery> {
        let item = self.registry.get_mut(handle)?;

        // fired, nothing left to cancel
        item.provider_mut()?.request_timer = None;

        // the close goes out here, so a later unregister must not repeat it
        item.state = ItemState::Closing;

        debug!(
            "request timed out on provider item handle={} stream={}",
            handle, item.stream_id
        );

        let close = Msg::Close(CloseMsg {
            stream_id: item.stream_id,
            domain_type: item.domain_type,
        });

        if let Err(e) = self.transport.submit(&close, &item.submit_options(None)) {
            warn!(
                "failed to close timed out stream {}: {}",
                item.stream_id, e
            );
        }

        let key = match &item.request {
            Some(req) => req.key.clone(),
            None => MsgKey::default(),
        };

        let status = ClosedStatus::new(
            item.domain_type,
            key,
            item.service_name.clone(),
            request_timed_out(),
        );

        Some(Delivery {
            client: item.client.clone()?,
            event: item.event(),
            msg: Msg::Status(status.to_status_msg(item.stream_id)),
        })
    }

    // statuses for the sub-items of a tunnel whose stream was closed by the
    // provider. the subs are marked closing since their streams are gone
    pub(crate) fn tunnel_closed_statuses(&mut self, tunnel: Handle) -> Vec<Delivery> {
        let subs = match self.registry.get(tunnel).and_then(|t| t.tunnel()) {
            Some(t) => t.space.handles(),
            None => return Vec::new(),
        };

        let mut out = Vec::with_capacity(subs.len());

        for sub in subs {
            let item = match self.registry.get_mut(sub) {
                Some(item) => item,
                None => continue,
            };

            item.state = ItemState::Closing;

            let client = match &item.client {
                Some(c) => c.clone(),
                None => continue,
            };

            let key = match &item.request {
                Some(req) => req.key.clone(),
                None => MsgKey::default(),
            };

            let status = ClosedStatus::new(
                item.domain_type,
                key,
                item.service_name.clone(),
                tunnel_closed(),
            );

            out.push(Delivery {
                client,
                event: item.event(),
                msg: Msg::Status(status.to_status_msg(item.stream_id)),
            });
        }

        if !out.is_empty() {
            debug!(
                "tunnel handle={} closed, notifying {} sub items",
                tunnel,
                out.len()
            );
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msg::domain;

    #[test]
    fn status_from_template() {
        let s = ClosedStatus::new(
            domain::MARKET_PRICE,
            MsgKey::with_name("IBM.N"),
            Some("FEED".to_string()),
            service_name_not_found("FEED"),
        );

        let m = s.to_status_msg(7);

        assert_eq!(m.stream_id, 7);
        assert_eq!(m.domain_type, domain::MARKET_PRICE);
        assert_eq!(m.key.name.as_deref(), Some("IBM.N"));
        assert_eq!(m.service_name.as_deref(), Some("FEED"));

        let state = m.state.unwrap();
        assert_eq!(state.stream_state, StreamState::Closed);
        assert_eq!(state.code, StatusCode::NotFound);
        assert_eq!(state.text, "Service name of 'FEED' is not found.");
    }
}
