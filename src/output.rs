/// User-facing command output.
///
/// Command modules write through this trait rather than `println!` so that
/// diagnostics stay on stderr and machine-readable data stays on stdout.
pub trait UserOutput: Send + Sync {
    /// Informational status message (e.g., "Listening on localhost:6030")
    fn status(&self, message: &str);

    fn success(&self, message: &str);

    fn warning(&self, message: &str);

    fn error(&self, message: &str);

    /// Raw data for stdout (tables, JSON documents).
    fn data(&self, content: &str);
}

/// Standard CLI output. Status lines go to stderr so stdout can be piped.
pub struct CliOutput;

impl UserOutput for CliOutput {
    fn status(&self, message: &str) {
        eprintln!("{}", message);
    }

    fn success(&self, message: &str) {
        eprintln!("\x1b[32m{}\x1b[0m", message);
    }

    fn warning(&self, message: &str) {
        eprintln!("\x1b[33m{}\x1b[0m", message);
    }

    fn error(&self, message: &str) {
        eprintln!("\x1b[31m{}\x1b[0m", message);
    }

    fn data(&self, content: &str) {
        println!("{}", content);
    }
}
