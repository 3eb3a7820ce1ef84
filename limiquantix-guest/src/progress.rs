//! Progress meters for long-running operations.

use tracing::{debug, info};

use crate::traits::ProgressMeter;

/// Discards all updates.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMeter;

impl ProgressMeter for NullMeter {
    fn start(&mut self, _text: &str, _size: Option<u64>) {}
    fn update(&mut self, _done: u64) {}
    fn end(&mut self, _done: u64) {}
}

/// Reports progress through the log.
#[derive(Debug, Default, Clone)]
pub struct TracingMeter {
    text: String,
    size: Option<u64>,
}

impl TracingMeter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressMeter for TracingMeter {
    fn start(&mut self, text: &str, size: Option<u64>) {
        self.text = text.to_string();
        self.size = size;
        info!(task = %self.text, size = ?size, "Started");
    }

    fn update(&mut self, done: u64) {
        match self.size {
            Some(size) if size > 0 => {
                debug!(task = %self.text, percent = done * 100 / size, "Progress")
            }
            _ => debug!(task = %self.text, done, "Progress"),
        }
    }

    fn end(&mut self, done: u64) {
        info!(task = %self.text, done, "Finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracing_meter_tracks_task() {
        let mut meter = TracingMeter::new();
        meter.start("Creating storage file /tmp/a.img", Some(0));
        meter.update(10);
        meter.end(10);
        assert_eq!(meter.text, "Creating storage file /tmp/a.img");
        assert_eq!(meter.size, Some(0));

        let meter: &mut dyn ProgressMeter = &mut NullMeter;
        meter.start("ignored", None);
        meter.end(0);
    }
}
