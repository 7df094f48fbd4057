//! Terminal output formatting.
//!
//! Command results go to stdout uncolored so they can be piped; status
//! lines go to stderr and are colored when the terminal supports it.

pub mod colors;
pub mod errors;

/// Output handler for consistent terminal formatting
pub struct OutputHandler {
    colors: colors::ColorSupport,
}

impl OutputHandler {
    /// Create a new output handler
    pub fn new() -> Self {
        Self::with_colors(colors::ColorSupport::detect())
    }

    pub fn with_colors(colors: colors::ColorSupport) -> Self {
        Self { colors }
    }

    /// Print command output
    pub fn print(&self, message: &str) {
        println!("{}", message);
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        eprintln!("{}", self.colors.dim(message));
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        eprintln!("{} {}", self.colors.green("✓"), message);
    }
}

impl Default for OutputHandler {
    fn default() -> Self {
        Self::new()
    }
}
