use std::{borrow::Cow, fmt};

use log::Level;

/// Log channel handed to each component at construction.
///
/// Forwards to the `log` facade under the handle's own target, so nothing is
/// emitted unless the host installs a logger.
#[derive(Clone, Debug)]
pub struct Logger {
    target: Cow<'static, str>,
}

impl Logger {
    pub fn new(target: impl Into<Cow<'static, str>>) -> Self {
        Self {
            target: target.into(),
        }
    }

    /// Derives a nested channel, e.g. `device` -> `device::thread`.
    pub fn child(&self, suffix: &str) -> Self {
        Self {
            target: Cow::Owned(format!("{}::{suffix}", self.target)),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        log::log!(target: self.target.as_ref(), level, "{args}");
    }

    pub fn error(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Error, args);
    }

    pub fn warn(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Warn, args);
    }

    pub fn info(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Info, args);
    }

    pub fn debug(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Debug, args);
    }

    pub fn trace(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Trace, args);
    }
}

impl Default for Logger {
    fn default() -> Self {
        Logger::new("kinect_capture::device")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_targets_nest() {
        let log = Logger::new("kinect_capture::device");
        assert_eq!(log.child("thread").target(), "kinect_capture::device::thread");
        // No logger is installed in tests; calls must be harmless.
        log.warn(format_args!("nothing listens to {}", "this"));
    }
}
