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
use crate::msg::{AckMsg, GenericMsg, Msg, RefreshMsg, StatusMsg, UpdateMsg};
use std::any::Any;
use std::sync::Arc;

/// Opaque application context handed back with every event for an item.
pub type Closure = Arc<dyn Any + Send + Sync>;

pub struct ItemEvent {
    pub handle: Handle,

    // tunnel handle for sub-items, batch handle for batch members, else 0
    pub parent_handle: Handle,

    pub closure: Option<Closure>,
}

impl ItemEvent {
    pub fn closure<T: Any>(&self) -> Option<&T> {
        self.closure.as_ref()?.downcast_ref::<T>()
    }
}

/// Application callbacks. `on_all_msg` is invoked first for every message,
/// then the type-specific method. Callbacks run with no session state
/// borrowed, so they may call back into the session.
pub trait Client: Send + Sync {
    fn on_all_msg(&self, _msg: &Msg, _event: &ItemEvent) {}

    fn on_refresh_msg(&self, _msg: &RefreshMsg, _event: &ItemEvent) {}

    fn on_update_msg(&self, _msg: &UpdateMsg, _event: &ItemEvent) {}

    fn on_status_msg(&self, _msg: &StatusMsg, _event: &ItemEvent) {}

    fn on_generic_msg(&self, _msg: &GenericMsg, _event: &ItemEvent) {}

    fn on_ack_msg(&self, _msg: &AckMsg, _event: &ItemEvent) {}
}

// a message bound for an application callback, captured while the session
// state is held and delivered after it is released
pub struct Delivery {
    pub client: Arc<dyn Client>,
    pub event: ItemEvent,
    pub msg: Msg,
}

impl Delivery {
    pub fn deliver(&self) {
        let client = &self.client;
        let event = &self.event;

        client.on_all_msg(&self.msg, event);

        match &self.msg {
            Msg::Refresh(m) => client.on_refresh_msg(m, event),
            Msg::Update(m) => client.on_update_msg(m, event),
            Msg::Status(m) => client.on_status_msg(m, event),
            Msg::Generic(m) => client.on_generic_msg(m, event),
            Msg::Ack(m) => client.on_ack_msg(m, event),
            Msg::Request(_) | Msg::TunnelOpen(_) | Msg::Post(_) | Msg::Close(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msg::{domain, State};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Order(Mutex<Vec<&'static str>>);

    impl Client for Order {
        fn on_all_msg(&self, _msg: &Msg, _event: &ItemEvent) {
            self.0.lock().unwrap().push("all");
        }

        fn on_refresh_msg(&self, _msg: &RefreshMsg, event: &ItemEvent) {
            assert_eq!(event.closure::<u32>(), Some(&7));
            self.0.lock().unwrap().push("refresh");
        }
    }

    #[test]
    fn all_then_specific() {
        let client = Arc::new(Order::default());

        let d = Delivery {
            client: client.clone(),
            event: ItemEvent {
                handle: 1,
                parent_handle: 0,
                closure: Some(Arc::new(7u32)),
            },
            msg: Msg::Refresh(RefreshMsg::new(5, domain::MARKET_PRICE, State::open_ok())),
        };

        d.deliver();

        assert_eq!(*client.0.lock().unwrap(), vec!["all", "refresh"]);
    }
}
