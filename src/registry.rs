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

use crate::config::SessionConfig;
use crate::directory::Service;
use crate::error::Error;
use crate::item::{Handle, Item, ItemKind};
use crate::pool::ItemPool;
use crate::streamid::StreamIdAllocator;
use log::warn;
use std::collections::HashMap;

/// Owns every live item of a session and the two indexes used to find
/// them: by handle for application calls, and by wire stream id for
/// inbound messages. Tunnel sub-items are indexed by handle only, their
/// stream ids live in the tunnel's own space.
pub struct ItemRegistry {
    items: HashMap<Handle, Item>,
    streams: HashMap<i32, Handle>,
    allocator: StreamIdAllocator,
    pool: ItemPool,
    next_handle: Handle,
}

impl ItemRegistry {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            items: HashMap::with_capacity(config.item_count_hint),
            streams: HashMap::with_capacity(config.item_count_hint),
            allocator: StreamIdAllocator::with_ceiling(config.role, config.max_stream_id),
            pool: ItemPool::new(config.item_count_hint, config.pool_max),
            next_handle: 1,
        }
    }

    pub fn allocator(&self) -> &StreamIdAllocator {
        &self.allocator
    }

    // a fresh unregistered item with a new handle
    pub fn create(&mut self, kind: ItemKind) -> Item {
        let mut item = self.pool.acquire(kind);

        item.handle = self.next_handle;
        self.next_handle += 1;

        item
    }

    pub fn register(&mut self, item: Item) -> Handle {
        let handle = item.handle;

        debug_assert!(handle != 0);

        self.items.insert(handle, item);

        handle
    }

    pub fn bind_stream(&mut self, stream_id: i32, handle: Handle) {
        if let Some(prev) = self.streams.insert(stream_id, handle) {
            if prev != handle {
                warn!(
                    "stream {} rebound from handle {} to {}",
                    stream_id, prev, handle
                );
            }
        }
    }

    // removes the binding only if it still points at handle
    pub fn unbind_stream(&mut self, stream_id: i32, handle: Handle) -> bool {
        match self.streams.get(&stream_id) {
            Some(&h) if h == handle => {
                self.streams.remove(&stream_id);

                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.items.contains_key(&handle)
    }

    pub fn get(&self, handle: Handle) -> Option<&Item> {
        self.items.get(&handle)
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut Item> {
        self.items.get_mut(&handle)
    }

    pub fn handle_for_stream(&self, stream_id: i32) -> Option<Handle> {
        self.streams.get(&stream_id).copied()
    }

    /// Removes an item from both indexes and hands it back to the caller,
    /// who is expected to `recycle` it once done.
    pub fn unregister(&mut self, handle: Handle) -> Option<Item> {
        let item = self.items.remove(&handle)?;

        if item.kind() != ItemKind::Sub && item.stream_id != 0 {
            self.unbind_stream(item.stream_id, handle);
        }

        Some(item)
    }

    pub fn recycle(&mut self, item: Item) {
        self.pool.release(item);
    }

    /// Reserves `count` contiguous stream ids, skipping ids that are bound
    /// to live items once the id space has wrapped.
    pub fn next_stream_id(&self, count: u32) -> Result<i32, Error> {
        let streams = &self.streams;

        self.allocator
            .allocate(count, |id| streams.contains_key(&id))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    // handles of items with no parent, in handle order
    pub fn top_level(&self) -> Vec<Handle> {
        let mut handles: Vec<Handle> = self
            .items
            .values()
            .filter(|i| i.parent == 0)
            .map(|i| i.handle)
            .collect();

        handles.sort_unstable();

        handles
    }

    // items left waiting for `service`, in handle order
    pub fn awaiting_service(&self, service: &Service) -> Vec<Handle> {
        let mut handles: Vec<Handle> = self
            .items
            .values()
            .filter(|i| i.awaits_service(service))
            .map(|i| i.handle)
            .collect();

        handles.sort_unstable();

        handles
    }

    pub fn clear_pool(&mut self) {
        self.pool.clear();
    }

    #[cfg(test)]
    pub fn pool(&self) -> &ItemPool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streamid::Role;

    fn config(ceiling: i32) -> SessionConfig {
        SessionConfig {
            item_count_hint: 4,
            max_stream_id: ceiling,
            ..Default::default()
        }
    }

    #[test]
    fn handles_are_not_reused() {
        let mut r = ItemRegistry::new(&config(i32::MAX));

        let a = r.create(ItemKind::Single);
        let h = r.register(a);
        assert_eq!(h, 1);

        let item = r.unregister(h).unwrap();
        r.recycle(item);

        let b = r.create(ItemKind::Single);
        assert_eq!(b.handle, 2);
        assert!(r.get(h).is_none());
    }

    #[test]
    fn stream_index() {
        let mut r = ItemRegistry::new(&config(i32::MAX));

        let mut a = r.create(ItemKind::Single);
        let id = r.next_stream_id(1).unwrap();
        assert_eq!(id, 5);
        a.assign_stream_id(id);
        let h = r.register(a);
        r.bind_stream(id, h);

        assert_eq!(r.handle_for_stream(5), Some(h));
        assert_eq!(r.stream_count(), 1);

        // stale unbind is ignored
        assert!(!r.unbind_stream(5, h + 1));
        assert_eq!(r.handle_for_stream(5), Some(h));

        r.unregister(h).unwrap();
        assert_eq!(r.handle_for_stream(5), None);
        assert!(r.is_empty());
    }

    #[test]
    fn sub_items_keep_tunnel_binding() {
        let mut r = ItemRegistry::new(&config(i32::MAX));

        let mut tunnel = r.create(ItemKind::Tunnel);
        tunnel.assign_stream_id(5);
        let th = r.register(tunnel);
        r.bind_stream(5, th);

        // a sub-item on inner stream 5 must not touch the outer binding
        let mut sub = r.create(ItemKind::Sub);
        sub.assign_stream_id(5);
        sub.parent = th;
        let sh = r.register(sub);

        r.unregister(sh).unwrap();
        assert_eq!(r.handle_for_stream(5), Some(th));
        assert_eq!(r.top_level(), vec![th]);
    }

    #[test]
    fn wrapped_allocation_skips_bound_streams() {
        let mut r = ItemRegistry::new(&config(8));

        let mut handles = Vec::new();

        for _ in 0..3 {
            let mut item = r.create(ItemKind::Single);
            let id = r.next_stream_id(1).unwrap();
            item.assign_stream_id(id);
            let h = r.register(item);
            r.bind_stream(id, h);
            handles.push(h);
        }

        assert_eq!(r.stream_count(), 3);

        // 5, 6 and 7 are taken, so the next allocation wraps
        let item = r.unregister(handles[1]).unwrap();
        r.recycle(item);

        assert_eq!(r.next_stream_id(1).unwrap(), 6);
        assert!(r.allocator().is_wrapped());
        assert_eq!(r.allocator().role(), Role::Consumer);
    }
}
