use crate::console_print;
use kernel_sync::OnceSlot;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

/// The logger the `log` facade points at. Lives in a write-once slot so
/// registration needs no `static mut`.
static LOGGER: OnceSlot<ConsoleLogger> = OnceSlot::new();

/// Routes the `log` facade to the debug-port console.
///
/// Records print as `LEVEL module::path: message`, one line each, straight
/// through the unbuffered sink.
pub struct ConsoleLogger {
    max_level: LevelFilter,
}

impl ConsoleLogger {
    #[must_use]
    pub const fn new(max_level: LevelFilter) -> Self {
        Self { max_level }
    }

    /// Park this logger in its slot and register it with the `log` facade.
    /// Call once during early init; the facade rejects a second
    /// registration.
    pub fn install(self) -> Result<(), SetLoggerError> {
        let max_level = self.max_level;
        // Losing the slot means a logger is already parked there; handing
        // the resident one to the facade lets it report the double
        // registration.
        let logger = match LOGGER.set(self) {
            Ok(fresh) => fresh,
            Err(resident) => resident,
        };
        log::set_logger(logger)?;
        log::set_max_level(max_level);
        Ok(())
    }
}

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        console_print!(
            "{:>5} {}: {}\n",
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {
        // the sink is unbuffered
    }
}
