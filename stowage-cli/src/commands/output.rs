//! Console output abstraction.
//!
//! Handlers write through [`Output`] instead of `println!` so their text can
//! be captured in tests.

use std::io::{self, Write};

/// Trait for outputting messages to the user.
pub trait Output: Send + Sync {
    /// Print a line of text.
    fn println(&self, message: &str);

    /// Print text without a newline.
    #[allow(dead_code)]
    fn print(&self, message: &str);

    /// Print an empty line.
    fn newline(&self) {
        self.println("");
    }

    /// Print a section header.
    fn header(&self, title: &str) {
        self.println(title);
        self.println(&"=".repeat(title.len()));
    }

    /// Print an indented line.
    fn indented(&self, message: &str) {
        self.println(&format!("  {}", message));
    }

    /// Print a warning message.
    fn warning(&self, message: &str) {
        self.println(&format!("Warning: {}", message));
    }

    /// Print an error message.
    #[allow(dead_code)]
    fn error(&self, message: &str) {
        self.println(&format!("Error: {}", message));
    }

    /// Print a success message.
    fn success(&self, message: &str) {
        self.println(&format!("Success: {}", message));
    }
}

/// Standard console output.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleOutput;

impl ConsoleOutput {
    pub fn new() -> Self {
        Self
    }
}

impl Output for ConsoleOutput {
    fn println(&self, message: &str) {
        println!("{}", message);
    }

    fn print(&self, message: &str) {
        print!("{}", message);
        io::stdout().flush().ok();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Captures output lines.
    #[derive(Default)]
    pub(crate) struct BufferOutput {
        lines: Mutex<Vec<String>>,
    }

    impl BufferOutput {
        pub(crate) fn lines(&self) -> Vec<String> {
            self.lines.lock().unwrap().clone()
        }
    }

    impl Output for BufferOutput {
        fn println(&self, message: &str) {
            self.lines.lock().unwrap().push(message.to_string());
        }

        fn print(&self, message: &str) {
            self.lines.lock().unwrap().push(message.to_string());
        }
    }

    #[test]
    fn test_header_is_underlined() {
        let output = BufferOutput::default();
        output.header("Bundles");
        output.indented("one");
        assert_eq!(output.lines(), vec!["Bundles", "=======", "  one"]);
    }
}
