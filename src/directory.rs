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

use crate::transport::ConnectionId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub id: u16,
    pub name: String,
}

impl Service {
    pub fn new(id: u16, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
        }
    }
}

/// Source directory lookups, answered from whatever the directory stream
/// has received so far.
pub trait Directory: Send + Sync {
    fn resolve_name(&self, name: &str) -> Option<Service>;

    fn resolve_id(&self, id: u16) -> Option<Service>;
}

pub trait LoginSession: Send + Sync {
    // when true, items for services that are not (yet) known are kept
    // pending instead of being failed
    fn single_open_supported(&self) -> bool;

    fn active_connection(&self) -> Option<ConnectionId>;
}
