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

use crate::streamid::{Role, STREAM_ID_CEILING};
use config::{Config, ConfigError, Environment, File, FileFormat, Source};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const ENV_PREFIX: &str = "FEEDMUX";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub role: Role,

    // expected number of concurrently open items. sizes the registry maps
    // and the number of preallocated single items
    pub item_count_hint: usize,

    // upper bound on released items kept per kind
    pub pool_max: usize,

    pub closed_status_delay_ms: u64,

    // provider items only. 0 disables the timeout
    pub request_timeout_ms: u64,

    pub timer_capacity: usize,

    // exclusive ceiling on stream id magnitudes
    pub max_stream_id: i32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            role: Role::Consumer,
            item_count_hint: 1024,
            pool_max: 16384,
            closed_status_delay_ms: 1,
            request_timeout_ms: 15000,
            timer_capacity: 65536,
            max_stream_id: STREAM_ID_CEILING,
        }
    }
}

impl SessionConfig {
    /// Loads a config file, format chosen by extension. Values may be
    /// overridden by `FEEDMUX_*` environment variables.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        Self::load(File::from(path))
    }

    pub fn parse(s: &str, format: FileFormat) -> Result<Self, ConfigError> {
        Self::load(File::from_str(s, format))
    }

    fn load<S>(source: S) -> Result<Self, ConfigError>
    where
        S: Source + Send + Sync + 'static,
    {
        let config = Config::builder()
            .add_source(source)
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()?;

        let c: Self = config.try_deserialize()?;

        c.validate()?;

        Ok(c)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_stream_id <= self.role.starting_stream_id() {
            return Err(ConfigError::Message(format!(
                "max_stream_id must be greater than {}",
                self.role.starting_stream_id()
            )));
        }

        if self.timer_capacity == 0 {
            return Err(ConfigError::Message(
                "timer_capacity must be non-zero".to_string(),
            ));
        }

        Ok(())
    }

    pub fn closed_status_delay(&self) -> Duration {
        Duration::from_millis(self.closed_status_delay_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        if self.request_timeout_ms > 0 {
            Some(Duration::from_millis(self.request_timeout_ms))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::fs;

    #[test]
    fn defaults() {
        let c = SessionConfig::parse("", FileFormat::Toml).unwrap();

        assert_eq!(c, SessionConfig::default());
        assert_eq!(c.closed_status_delay(), Duration::from_millis(1));
        assert_eq!(c.request_timeout(), Some(Duration::from_secs(15)));
    }

    #[test]
    fn toml() {
        let s = r#"
            role = "provider"
            item_count_hint = 16
            request_timeout_ms = 0
        "#;

        let c = SessionConfig::parse(s, FileFormat::Toml).unwrap();

        assert_eq!(c.role, Role::Provider);
        assert_eq!(c.item_count_hint, 16);
        assert_eq!(c.request_timeout(), None);
        assert_eq!(c.pool_max, 16384);
    }

    #[test]
    fn file() {
        let path = env::temp_dir().join(format!("feedmux-config-{}.ini", std::process::id()));

        fs::write(&path, "closed_status_delay_ms=25\nmax_stream_id=1000\n").unwrap();

        let c = SessionConfig::from_file(&path);

        fs::remove_file(&path).unwrap();

        let c = c.unwrap();
        assert_eq!(c.closed_status_delay(), Duration::from_millis(25));
        assert_eq!(c.max_stream_id, 1000);
    }

    #[test]
    fn invalid() {
        assert!(SessionConfig::parse("max_stream_id = 3", FileFormat::Toml).is_err());
        assert!(SessionConfig::parse("timer_capacity = 0", FileFormat::Toml).is_err());
        assert!(SessionConfig::parse("role = \"neither\"", FileFormat::Toml).is_err());
    }
}
