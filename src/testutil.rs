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

use crate::client::{Client, ItemEvent};
use crate::directory::{Directory, LoginSession, Service};
use crate::item::Handle;
use crate::msg::{Msg, StatusMsg};
use crate::transport::{ConnectionId, SubmitOptions, Transport, TransportError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct MockTransport {
    pub sent: Mutex<Vec<(Msg, SubmitOptions)>>,
    pub fail: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::Relaxed);
    }

    pub fn sent(&self) -> Vec<Msg> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(m, _)| m.clone())
            .collect()
    }

    pub fn last(&self) -> Option<(Msg, SubmitOptions)> {
        self.sent.lock().unwrap().last().cloned()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn closes(&self) -> Vec<i32> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(m, _)| match m {
                Msg::Close(c) => Some(c.stream_id),
                _ => None,
            })
            .collect()
    }
}

impl Transport for MockTransport {
    fn submit(&self, msg: &Msg, opts: &SubmitOptions) -> Result<(), TransportError> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(TransportError::NoBuffers);
        }

        self.sent.lock().unwrap().push((msg.clone(), opts.clone()));

        Ok(())
    }
}

pub struct MockDirectory {
    pub services: Mutex<Vec<Service>>,
}

impl MockDirectory {
    pub fn new(services: &[(u16, &str)]) -> Arc<Self> {
        Arc::new(Self {
            services: Mutex::new(
                services
                    .iter()
                    .map(|(id, name)| Service::new(*id, name))
                    .collect(),
            ),
        })
    }
}

impl Directory for MockDirectory {
    fn resolve_name(&self, name: &str) -> Option<Service> {
        self.services
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.name == name)
            .cloned()
    }

    fn resolve_id(&self, id: u16) -> Option<Service> {
        self.services
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.id == id)
            .cloned()
    }
}

pub struct MockLogin {
    pub connection: Mutex<Option<ConnectionId>>,
    pub single_open: AtomicBool,
}

impl MockLogin {
    pub fn new(connection: Option<ConnectionId>, single_open: bool) -> Arc<Self> {
        Arc::new(Self {
            connection: Mutex::new(connection),
            single_open: AtomicBool::new(single_open),
        })
    }
}

impl LoginSession for MockLogin {
    fn single_open_supported(&self) -> bool {
        self.single_open.load(Ordering::Relaxed)
    }

    fn active_connection(&self) -> Option<ConnectionId> {
        *self.connection.lock().unwrap()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Received {
    pub handle: Handle,
    pub parent: Handle,
    pub msg: Msg,
}

#[derive(Default)]
pub struct RecordingClient {
    pub received: Mutex<Vec<Received>>,
}

impl RecordingClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn received(&self) -> Vec<Received> {
        self.received.lock().unwrap().clone()
    }

    pub fn statuses(&self) -> Vec<(Handle, StatusMsg)> {
        self.received
            .lock()
            .unwrap()
            .iter()
            .filter_map(|r| match &r.msg {
                Msg::Status(s) => Some((r.handle, s.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self) -> usize {
        self.received.lock().unwrap().len()
    }
}

impl Client for RecordingClient {
    fn on_all_msg(&self, msg: &Msg, event: &ItemEvent) {
        self.received.lock().unwrap().push(Received {
            handle: event.handle,
            parent: event.parent_handle,
            msg: msg.clone(),
        });
    }
}
