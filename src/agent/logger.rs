use std::fmt;

use log::Level;

/// Named logging handle handed to collectors.
///
/// Records go through the `log` facade with the handle's name as the target,
/// so per-component filtering works with the usual `RUST_LOG` style filters.
#[derive(Clone, Debug)]
pub struct Logger {
    name: String,
}

impl Logger {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn warn(&self, args: fmt::Arguments) {
        self.log(Level::Warn, args);
    }

    pub fn info(&self, args: fmt::Arguments) {
        self.log(Level::Info, args);
    }

    pub fn debug(&self, args: fmt::Arguments) {
        self.log(Level::Debug, args);
    }

    fn log(&self, level: Level, args: fmt::Arguments) {
        log::log!(target: self.name.as_str(), level, "{args}");
    }
}

#[cfg(test)]
mod tests {
    use assert2::assert;

    use super::*;

    #[test]
    fn test_logger_name() {
        let l = Logger::new("sysvars_gce");
        assert!(l.name == "sysvars_gce");

        // no logger installed, these must be no-ops
        l.warn(format_args!("warn {}", 1));
        l.info(format_args!("info {}", 2));
        l.debug(format_args!("debug {}", 3));
    }
}
