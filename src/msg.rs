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

//! Decoded protocol messages. Encoding to and from the wire happens in the
//! transport, so these carry only the header fields the item engine reads
//! or stamps, plus an opaque payload.

use std::fmt;

pub mod domain {
    pub const LOGIN: u8 = 1;
    pub const SOURCE: u8 = 4;
    pub const DICTIONARY: u8 = 5;
    pub const MARKET_PRICE: u8 = 6;
    pub const MARKET_BY_ORDER: u8 = 7;
    pub const MARKET_BY_PRICE: u8 = 8;
    pub const MARKET_MAKER: u8 = 9;
    pub const SYMBOL_LIST: u8 = 10;
    pub const SYSTEM: u8 = 127;
}

pub const DICTIONARY_FIELD_NAME: &str = "RWFFld";
pub const DICTIONARY_ENUM_NAME: &str = "RWFEnum";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Open,
    NonStreaming,
    ClosedRecover,
    Closed,
    Redirected,
}

impl StreamState {
    pub fn is_open(self) -> bool {
        self == Self::Open
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataState {
    NoChange,
    Ok,
    Suspect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    None,
    NotFound,
    Timeout,
    NotAuthorized,
    NoResources,
    SourceUnknown,
    InvalidArgument,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct State {
    pub stream_state: StreamState,
    pub data_state: DataState,
    pub code: StatusCode,
    pub text: String,
}

impl State {
    pub fn new(stream_state: StreamState, data_state: DataState, code: StatusCode, text: &str) -> Self {
        Self {
            stream_state,
            data_state,
            code,
            text: text.to_string(),
        }
    }

    pub fn open_ok() -> Self {
        Self::new(StreamState::Open, DataState::Ok, StatusCode::None, "")
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{:?}/{:?}/{:?} \"{}\"",
            self.stream_state, self.data_state, self.code, self.text
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeliness {
    RealTime,
    InexactDelayed,
    Delayed(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rate {
    TickByTick,
    JitConflated,
    TimeConflated(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Qos {
    pub timeliness: Timeliness,
    pub rate: Rate,
}

impl Default for Qos {
    fn default() -> Self {
        Self {
            timeliness: Timeliness::RealTime,
            rate: Rate::TickByTick,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MsgKey {
    pub name: Option<String>,
    pub name_type: Option<u8>,
    pub service_id: Option<u16>,
    pub filter: Option<u32>,
    pub identifier: Option<i32>,
}

impl MsgKey {
    pub fn with_name(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestMsg {
    // 0 lets the engine pick. a non-zero value is only honored for
    // tunnel sub-streams
    pub stream_id: i32,
    pub domain_type: u8,
    pub key: MsgKey,
    pub service_name: Option<String>,
    pub batch_names: Vec<String>,
    pub qos: Option<Qos>,
    pub priority: Option<(u8, u16)>,
    pub streaming: bool,
    pub private_stream: bool,
    pub pause: bool,
    pub payload: Vec<u8>,
}

impl Default for RequestMsg {
    fn default() -> Self {
        Self {
            stream_id: 0,
            domain_type: domain::MARKET_PRICE,
            key: MsgKey::default(),
            service_name: None,
            batch_names: Vec::new(),
            qos: None,
            priority: None,
            streaming: true,
            private_stream: false,
            pause: false,
            payload: Vec::new(),
        }
    }
}

impl RequestMsg {
    pub fn new(domain_type: u8, name: &str) -> Self {
        Self {
            domain_type,
            key: MsgKey::with_name(name),
            ..Default::default()
        }
    }

    pub fn batch(domain_type: u8, names: &[&str]) -> Self {
        Self {
            domain_type,
            batch_names: names.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn service_name(mut self, name: &str) -> Self {
        self.service_name = Some(name.to_string());
        self
    }

    pub fn service_id(mut self, id: u16) -> Self {
        self.key.service_id = Some(id);
        self
    }

    pub fn non_streaming(mut self) -> Self {
        self.streaming = false;
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.key.name.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TunnelStreamRequest {
    pub stream_id: i32,
    pub domain_type: u8,
    pub name: Option<String>,
    pub service_name: Option<String>,
    pub service_id: Option<u16>,
    pub response_timeout_secs: u32,
    pub guaranteed_output_buffers: u32,
}

impl Default for TunnelStreamRequest {
    fn default() -> Self {
        Self {
            stream_id: 0,
            domain_type: domain::SYSTEM,
            name: None,
            service_name: None,
            service_id: None,
            response_timeout_secs: 60,
            guaranteed_output_buffers: 50,
        }
    }
}

impl TunnelStreamRequest {
    pub fn new(domain_type: u8, name: &str, service_name: &str) -> Self {
        Self {
            domain_type,
            name: Some(name.to_string()),
            service_name: Some(service_name.to_string()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefreshMsg {
    pub stream_id: i32,
    pub domain_type: u8,
    pub key: MsgKey,
    pub service_name: Option<String>,
    pub state: State,
    pub solicited: bool,
    pub complete: bool,
    pub clear_cache: bool,
    pub seq_num: Option<u32>,
    pub payload: Vec<u8>,
}

impl RefreshMsg {
    pub fn new(stream_id: i32, domain_type: u8, state: State) -> Self {
        Self {
            stream_id,
            domain_type,
            key: MsgKey::default(),
            service_name: None,
            state,
            solicited: true,
            complete: true,
            clear_cache: true,
            seq_num: None,
            payload: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateMsg {
    pub stream_id: i32,
    pub domain_type: u8,
    pub key: MsgKey,
    pub update_type: u8,
    pub seq_num: Option<u32>,
    pub payload: Vec<u8>,
}

impl UpdateMsg {
    pub fn new(stream_id: i32, domain_type: u8) -> Self {
        Self {
            stream_id,
            domain_type,
            key: MsgKey::default(),
            update_type: 0,
            seq_num: None,
            payload: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusMsg {
    pub stream_id: i32,
    pub domain_type: u8,
    pub key: MsgKey,
    pub service_name: Option<String>,
    pub state: Option<State>,
    pub payload: Vec<u8>,
}

impl StatusMsg {
    pub fn new(stream_id: i32, domain_type: u8, state: Option<State>) -> Self {
        Self {
            stream_id,
            domain_type,
            key: MsgKey::default(),
            service_name: None,
            state,
            payload: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenericMsg {
    pub stream_id: i32,
    pub domain_type: u8,
    pub key: MsgKey,
    pub complete: bool,
    pub payload: Vec<u8>,
}

impl GenericMsg {
    pub fn new(stream_id: i32, domain_type: u8, payload: &[u8]) -> Self {
        Self {
            stream_id,
            domain_type,
            key: MsgKey::default(),
            complete: true,
            payload: payload.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostMsg {
    pub stream_id: i32,
    pub domain_type: u8,
    pub key: MsgKey,
    pub service_name: Option<String>,
    pub post_id: u32,
    pub seq_num: Option<u32>,
    pub ack_required: bool,
    pub complete: bool,
    pub payload: Vec<u8>,
}

impl PostMsg {
    pub fn new(post_id: u32, payload: &[u8]) -> Self {
        Self {
            stream_id: 0,
            domain_type: 0,
            key: MsgKey::default(),
            service_name: None,
            post_id,
            seq_num: None,
            ack_required: true,
            complete: true,
            payload: payload.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AckMsg {
    pub stream_id: i32,
    pub domain_type: u8,
    pub ack_id: u32,
    pub nack_code: Option<u8>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CloseMsg {
    pub stream_id: i32,
    pub domain_type: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    Request(RequestMsg),
    TunnelOpen(TunnelStreamRequest),
    Refresh(RefreshMsg),
    Update(UpdateMsg),
    Status(StatusMsg),
    Generic(GenericMsg),
    Post(PostMsg),
    Ack(AckMsg),
    Close(CloseMsg),
}

impl Msg {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Request(_) => "request",
            Self::TunnelOpen(_) => "tunnel open",
            Self::Refresh(_) => "refresh",
            Self::Update(_) => "update",
            Self::Status(_) => "status",
            Self::Generic(_) => "generic",
            Self::Post(_) => "post",
            Self::Ack(_) => "ack",
            Self::Close(_) => "close",
        }
    }

    pub fn stream_id(&self) -> i32 {
        match self {
            Self::Request(m) => m.stream_id,
            Self::TunnelOpen(m) => m.stream_id,
            Self::Refresh(m) => m.stream_id,
            Self::Update(m) => m.stream_id,
            Self::Status(m) => m.stream_id,
            Self::Generic(m) => m.stream_id,
            Self::Post(m) => m.stream_id,
            Self::Ack(m) => m.stream_id,
            Self::Close(m) => m.stream_id,
        }
    }

    pub fn set_stream_id(&mut self, stream_id: i32) {
        match self {
            Self::Request(m) => m.stream_id = stream_id,
            Self::TunnelOpen(m) => m.stream_id = stream_id,
            Self::Refresh(m) => m.stream_id = stream_id,
            Self::Update(m) => m.stream_id = stream_id,
            Self::Status(m) => m.stream_id = stream_id,
            Self::Generic(m) => m.stream_id = stream_id,
            Self::Post(m) => m.stream_id = stream_id,
            Self::Ack(m) => m.stream_id = stream_id,
            Self::Close(m) => m.stream_id = stream_id,
        }
    }

    pub fn domain_type(&self) -> u8 {
        match self {
            Self::Request(m) => m.domain_type,
            Self::TunnelOpen(m) => m.domain_type,
            Self::Refresh(m) => m.domain_type,
            Self::Update(m) => m.domain_type,
            Self::Status(m) => m.domain_type,
            Self::Generic(m) => m.domain_type,
            Self::Post(m) => m.domain_type,
            Self::Ack(m) => m.domain_type,
            Self::Close(m) => m.domain_type,
        }
    }

    pub fn set_domain_type(&mut self, domain_type: u8) {
        match self {
            Self::Request(m) => m.domain_type = domain_type,
            Self::TunnelOpen(m) => m.domain_type = domain_type,
            Self::Refresh(m) => m.domain_type = domain_type,
            Self::Update(m) => m.domain_type = domain_type,
            Self::Status(m) => m.domain_type = domain_type,
            Self::Generic(m) => m.domain_type = domain_type,
            Self::Post(m) => m.domain_type = domain_type,
            Self::Ack(m) => m.domain_type = domain_type,
            Self::Close(m) => m.domain_type = domain_type,
        }
    }

    // the stream state this message leaves the stream in, if it carries one
    pub fn stream_state(&self) -> Option<StreamState> {
        match self {
            Self::Refresh(m) => Some(m.state.stream_state),
            Self::Status(m) => m.state.as_ref().map(|s| s.stream_state),
            _ => None,
        }
    }
}

impl fmt::Display for Msg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} stream={} domain={}",
            self.name(),
            self.stream_id(),
            self.domain_type()
        )?;

        if let Some(state) = match self {
            Self::Refresh(m) => Some(&m.state),
            Self::Status(m) => m.state.as_ref(),
            _ => None,
        } {
            write!(f, " state={}", state)?;
        }

        Ok(())
    }
}
