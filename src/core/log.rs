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

use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::fs::File;
use std::io::{self, Write};
use std::str;
use std::sync::{Mutex, OnceLock};
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

const TIMESTAMP_MAX: usize = 64;

fn level_name(level: Level) -> &'static str {
    match level {
        Level::Error => "ERR",
        Level::Warn => "WARN",
        Level::Info => "INFO",
        Level::Debug => "DEBUG",
        Level::Trace => "TRACE",
    }
}

fn write_line(
    out: &mut dyn Write,
    now: OffsetDateTime,
    level: Level,
    target: &str,
    args: &std::fmt::Arguments,
) -> Result<(), io::Error> {
    let format =
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]");

    let mut ts = [0u8; TIMESTAMP_MAX];

    let size = {
        let mut ts = io::Cursor::new(&mut ts[..]);

        now.format_into(&mut ts, &format)
            .map_err(|_| io::Error::from(io::ErrorKind::InvalidData))?;

        ts.position() as usize
    };

    let ts = str::from_utf8(&ts[..size]).map_err(|_| io::Error::from(io::ErrorKind::InvalidData))?;

    // item routing chatter is only useful with the module path attached
    if level <= Level::Info {
        writeln!(out, "[{}] {} {}", level_name(level), ts, args)
    } else {
        writeln!(out, "[{}] {} [{}] {}", level_name(level), ts, target, args)
    }
}

pub struct SimpleLogger {
    local_offset: Option<UtcOffset>,
    output_file: Option<Mutex<File>>,
    max_level: LevelFilter,
}

impl Log for SimpleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let now = OffsetDateTime::now_utc().to_offset(self.local_offset.unwrap_or(UtcOffset::UTC));

        // a logger has nowhere to report its own failures
        let _ = match &self.output_file {
            Some(f) => write_line(
                &mut *f.lock().unwrap(),
                now,
                record.level(),
                record.target(),
                record.args(),
            ),
            None => write_line(
                &mut io::stdout().lock(),
                now,
                record.level(),
                record.target(),
                record.args(),
            ),
        };
    }

    fn flush(&self) {
        if let Some(f) = &self.output_file {
            let _ = f.lock().unwrap().flush();
        }
    }
}

static LOGGER: OnceLock<SimpleLogger> = OnceLock::new();

pub fn ensure_init_simple_logger(output_file: Option<File>, max_level: LevelFilter) {
    LOGGER.get_or_init(|| SimpleLogger {
        local_offset: UtcOffset::current_local_offset().ok(),
        output_file: output_file.map(Mutex::new),
        max_level,
    });
}

pub fn get_simple_logger() -> &'static SimpleLogger {
    ensure_init_simple_logger(None, LevelFilter::Info);

    // logger is guaranteed to have been initialized
    LOGGER.get().expect("logger should be initialized")
}

// Installs the simple logger as the global logger. Hosting applications that
// bring their own logger should not call this.
pub fn init(max_level: LevelFilter) -> Result<(), SetLoggerError> {
    ensure_init_simple_logger(None, max_level);

    log::set_logger(get_simple_logger())?;
    log::set_max_level(max_level);

    if get_simple_logger().local_offset.is_none() {
        log::warn!("Failed to determine local time offset. Log timestamps will be in UTC.");
    }

    Ok(())
}
