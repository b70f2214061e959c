//! Colored terminal output for pipeline runs.

use std::io::Write;
use termcolor::{BufferWriter, Color, ColorChoice, ColorSpec, WriteColor};

/// Output manager for consistent colored terminal output
#[derive(Debug)]
pub struct OutputManager {
    stdout: BufferWriter,
    quiet: bool,
}

impl OutputManager {
    /// Create a new output manager
    pub fn new(quiet: bool) -> Self {
        Self {
            stdout: BufferWriter::stdout(ColorChoice::Auto),
            quiet,
        }
    }

    fn symbol_line(&self, symbol: &str, color: Color, message: &str) {
        if self.quiet {
            return;
        }
        let mut buffer = self.stdout.buffer();
        let _ = buffer.set_color(ColorSpec::new().set_fg(Some(color)).set_bold(true));
        let _ = write!(&mut buffer, "{symbol}");
        let _ = buffer.reset();
        let _ = writeln!(&mut buffer, " {message}");
        let _ = self.stdout.print(&buffer);
    }

    /// Print a step header: `═══ [2/6] assemble ═══`
    pub fn step(&self, index: usize, total: usize, name: &str) {
        if self.quiet {
            return;
        }
        let mut buffer = self.stdout.buffer();
        let _ = writeln!(&mut buffer);
        let _ = buffer.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)).set_bold(true));
        let _ = writeln!(&mut buffer, "═══ [{index}/{total}] {name} ═══");
        let _ = buffer.reset();
        let _ = self.stdout.print(&buffer);
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        self.symbol_line("ℹ", Color::Cyan, message);
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        self.symbol_line("✓", Color::Green, message);
    }

    /// Print a warning message
    pub fn warn(&self, message: &str) {
        self.symbol_line("⚠", Color::Yellow, message);
    }

    /// Print a `label: value` line
    pub fn field(&self, label: &str, value: &str) {
        if self.quiet {
            return;
        }
        let mut buffer = self.stdout.buffer();
        let _ = buffer.set_color(ColorSpec::new().set_bold(true));
        let _ = write!(&mut buffer, "  {label:<16}");
        let _ = buffer.reset();
        let _ = writeln!(&mut buffer, "{value}");
        let _ = self.stdout.print(&buffer);
    }

    /// Print indented text (for sub-items)
    pub fn indent(&self, message: &str) {
        if self.quiet {
            return;
        }
        let mut buffer = self.stdout.buffer();
        let _ = writeln!(&mut buffer, "    {message}");
        let _ = self.stdout.print(&buffer);
    }

    /// Print a plain line to stdout, even in quiet mode.
    ///
    /// Used for machine-readable results.
    pub fn result(&self, message: &str) {
        let mut buffer = self.stdout.buffer();
        let _ = writeln!(&mut buffer, "{message}");
        let _ = self.stdout.print(&buffer);
    }

    /// Print an error message to stderr (always shown)
    pub fn error(&self, message: &str) {
        let stderr = BufferWriter::stderr(ColorChoice::Auto);
        let mut buffer = stderr.buffer();
        let _ = buffer.set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true));
        let _ = write!(&mut buffer, "✗");
        let _ = buffer.reset();
        let _ = writeln!(&mut buffer, " {message}");
        if stderr.print(&buffer).is_err() {
            eprintln!("✗ {message}");
        }
    }

    /// Print recovery suggestions to stderr
    pub fn suggestions(&self, suggestions: &[String]) {
        if suggestions.is_empty() {
            return;
        }
        let stderr = BufferWriter::stderr(ColorChoice::Auto);
        let mut buffer = stderr.buffer();
        let _ = writeln!(&mut buffer, "\n💡 Recovery suggestions:");
        for suggestion in suggestions {
            let _ = writeln!(&mut buffer, "  • {suggestion}");
        }
        let _ = stderr.print(&buffer);
    }
}
