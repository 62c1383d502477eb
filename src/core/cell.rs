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

use std::cell::RefCell;
use std::sync::Mutex;

// Owner of a session's mutable state. Access is always scoped to a closure,
// so a borrow or lock can never escape into application callbacks.
pub trait StateCell<T> {
    fn new(value: T) -> Self;

    fn with<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&mut T) -> R;
}

// For sessions driven entirely from one thread. Operations are protected by
// a RefCell, so re-entering while a closure is running will panic rather
// than alias.
pub struct LocalCell<T> {
    value: RefCell<T>,
}

impl<T> StateCell<T> for LocalCell<T> {
    fn new(value: T) -> Self {
        Self {
            value: RefCell::new(value),
        }
    }

    fn with<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&mut T) -> R,
    {
        let mut value = self.value.borrow_mut();

        f(&mut value)
    }
}

// For sessions where the dispatch path and the application submit from
// different threads. The mutex is the coarse session lock.
pub struct SyncCell<T> {
    value: Mutex<T>,
}

impl<T> StateCell<T> for SyncCell<T> {
    fn new(value: T) -> Self {
        Self {
            value: Mutex::new(value),
        }
    }

    fn with<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&mut T) -> R,
    {
        let mut value = self.value.lock().unwrap();

        f(&mut value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn local_cell() {
        let c = LocalCell::new(vec![1]);

        c.with(|v| v.push(2));
        assert_eq!(c.with(|v| v.len()), 2);
    }

    #[test]
    fn sync_cell_shared() {
        let c = Arc::new(SyncCell::new(0usize));

        let mut threads = Vec::new();

        for _ in 0..4 {
            let c = Arc::clone(&c);

            threads.push(thread::spawn(move || {
                for _ in 0..1000 {
                    c.with(|v| *v += 1);
                }
            }));
        }

        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(c.with(|v| *v), 4000);
    }
}
