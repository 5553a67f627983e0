/// Receives rendered progress. Owns presentation, never wait state.
pub trait ProgressSink: Send {
    /// A full progress line (a state transition or terminal outcome).
    fn line(&mut self, text: &str);

    /// "Still waiting": the snapshot did not change since the last check.
    fn tick(&mut self);
}

impl<P: ProgressSink + ?Sized> ProgressSink for &mut P {
    fn line(&mut self, text: &str) {
        (**self).line(text);
    }

    fn tick(&mut self) {
        (**self).tick();
    }
}

/// Collects everything in memory; ticks are recorded as `"."` entries.
#[derive(Debug, Default, Clone)]
pub struct RecordedProgress {
    pub entries: Vec<String>,
}

impl RecordedProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines only, ticks dropped.
    pub fn lines(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.as_str() != ".")
            .map(String::as_str)
            .collect()
    }

    pub fn ticks(&self) -> usize {
        self.entries.iter().filter(|e| e.as_str() == ".").count()
    }
}

impl ProgressSink for RecordedProgress {
    fn line(&mut self, text: &str) {
        self.entries.push(text.to_string());
    }

    fn tick(&mut self) {
        self.entries.push(".".to_string());
    }
}

/// Discards everything (`--quiet`).
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn line(&mut self, _text: &str) {}

    fn tick(&mut self) {}
}
