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

use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, PartialEq)]
pub struct CounterError;

/// A count of outstanding references that can be shared between threads.
/// Decrementing below zero is an error rather than a wraparound, so a
/// double release shows up at the call site instead of as a huge count.
#[derive(Debug, Default)]
pub struct Counter(AtomicUsize);

impl Counter {
    pub fn new(value: usize) -> Self {
        Self(AtomicUsize::new(value))
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    pub fn set(&self, value: usize) {
        self.0.store(value, Ordering::Release);
    }

    pub fn inc(&self, amount: usize) -> Result<usize, CounterError> {
        loop {
            let value = self.0.load(Ordering::Acquire);

            if amount > usize::MAX - value {
                return Err(CounterError);
            }

            if self
                .0
                .compare_exchange(value, value + amount, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Ok(value + amount);
            }
        }
    }

    // returns the remaining count
    pub fn dec(&self, amount: usize) -> Result<usize, CounterError> {
        loop {
            let value = self.0.load(Ordering::Acquire);

            if amount > value {
                return Err(CounterError);
            }

            if self
                .0
                .compare_exchange(value, value - amount, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Ok(value - amount);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter() {
        let c = Counter::new(2);

        assert_eq!(c.dec(1), Ok(1));
        assert_eq!(c.dec(1), Ok(0));
        assert_eq!(c.dec(1), Err(CounterError));
        assert_eq!(c.get(), 0);

        assert_eq!(c.inc(3), Ok(3));
        assert_eq!(c.dec(4), Err(CounterError));
        assert_eq!(c.dec(3), Ok(0));

        c.set(usize::MAX);
        assert_eq!(c.inc(1), Err(CounterError));
    }
}
