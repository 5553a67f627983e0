use std::io::{self, Stdout, Write};

use fleet_core::ProgressSink;

/// Prints progress lines; ticks become dots on the current line.
pub struct ConsoleProgress<W: Write + Send> {
    out: W,
    dots: bool,
}

impl ConsoleProgress<Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> ConsoleProgress<W> {
    pub fn new(out: W) -> Self {
        Self { out, dots: false }
    }

    fn end_dots(&mut self) {
        if self.dots {
            let _ = writeln!(self.out);
            self.dots = false;
        }
    }
}

// Progress output is best effort; a closed stdout must not abort the wait.
impl<W: Write + Send> ProgressSink for ConsoleProgress<W> {
    fn line(&mut self, text: &str) {
        self.end_dots();
        let _ = writeln!(self.out, "{text}");
    }

    fn tick(&mut self) {
        self.dots = true;
        let _ = write!(self.out, ".");
        let _ = self.out.flush();
    }
}

impl<W: Write + Send> Drop for ConsoleProgress<W> {
    fn drop(&mut self) {
        self.end_dots();
    }
}
