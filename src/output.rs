use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;

/// Line-oriented report output. The binary writes each line straight to
/// stdout; a capturing transcript keeps them for tests instead.
#[derive(Clone, Default)]
pub struct Transcript {
    lines: Arc<Mutex<Vec<String>>>,
    echo: bool,
}

impl Transcript {
    pub fn stdout() -> Self {
        Self {
            lines: Arc::default(),
            echo: true,
        }
    }

    pub fn capture() -> Self {
        Self::default()
    }

    pub fn line(&self, line: impl Into<String>) {
        let line = line.into();
        if self.echo {
            let mut stdout = std::io::stdout().lock();
            // a closed pipe is not worth aborting the command for
            let _ = writeln!(stdout, "{}", line);
            return;
        }
        self.lines.lock().push(line);
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    pub fn contains(&self, line: &str) -> bool {
        self.lines.lock().iter().any(|l| l == line)
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.lines.lock())
    }
}
