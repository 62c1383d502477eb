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

use crate::item::{Item, ItemKind};

/// Free lists of released items, one per kind, so that open/close churn
/// reuses item allocations. Single items are the common case and are
/// preallocated.
pub struct ItemPool {
    free: [Vec<Item>; ItemKind::COUNT],
    max: usize,
}

impl ItemPool {
    pub fn new(preallocate: usize, max: usize) -> Self {
        let preallocate = preallocate.min(max);

        let mut free: [Vec<Item>; ItemKind::COUNT] = Default::default();

        let singles = &mut free[ItemKind::Single.index()];
        singles.reserve(preallocate);

        for _ in 0..preallocate {
            singles.push(Item::new(ItemKind::Single));
        }

        Self { free, max }
    }

    pub fn acquire(&mut self, kind: ItemKind) -> Item {
        match self.free[kind.index()].pop() {
            Some(item) => item,
            None => Item::new(kind),
        }
    }

    pub fn release(&mut self, mut item: Item) {
        let l = &mut self.free[item.kind().index()];

        if l.len() >= self.max {
            return;
        }

        item.reset();

        l.push(item);
    }

    pub fn available(&self, kind: ItemKind) -> usize {
        self.free[kind.index()].len()
    }

    pub fn clear(&mut self) {
        for l in self.free.iter_mut() {
            l.clear();
            l.shrink_to_fit();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuse() {
        let mut pool = ItemPool::new(2, 3);
        assert_eq!(pool.available(ItemKind::Single), 2);
        assert_eq!(pool.available(ItemKind::Batch), 0);

        let a = pool.acquire(ItemKind::Single);
        let b = pool.acquire(ItemKind::Tunnel);
        assert_eq!(b.kind(), ItemKind::Tunnel);
        assert_eq!(pool.available(ItemKind::Single), 1);

        let mut b = b;
        b.handle = 9;
        b.assign_stream_id(12);
        pool.release(b);
        assert_eq!(pool.available(ItemKind::Tunnel), 1);

        let b = pool.acquire(ItemKind::Tunnel);
        assert_eq!(b.handle, 0);
        assert_eq!(b.stream_id, 0);

        pool.release(a);
        pool.release(Item::new(ItemKind::Single));
        pool.release(Item::new(ItemKind::Single));
        assert_eq!(pool.available(ItemKind::Single), 3);

        pool.clear();
        assert_eq!(pool.available(ItemKind::Single), 0);
    }
}
