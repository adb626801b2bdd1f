// Logging and verbosity control

use std::sync::atomic::{AtomicU8, Ordering};

use tracing::Level;

/// Global verbosity level
static VERBOSITY: AtomicU8 = AtomicU8::new(1);

/// Verbosity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum VerbosityLevel {
    /// Quiet mode - errors only
    Quiet = 0,
    /// Normal mode - standard output
    Normal = 1,
    /// Verbose mode - detailed output
    Verbose = 2,
}

impl VerbosityLevel {
    /// Derive the level from the global CLI flags; `quiet` wins
    pub fn from_flags(verbose: bool, quiet: bool) -> Self {
        if quiet {
            VerbosityLevel::Quiet
        } else if verbose {
            VerbosityLevel::Verbose
        } else {
            VerbosityLevel::Normal
        }
    }

    pub fn current() -> Self {
        match VERBOSITY.load(Ordering::Relaxed) {
            0 => VerbosityLevel::Quiet,
            1 => VerbosityLevel::Normal,
            _ => VerbosityLevel::Verbose,
        }
    }

    pub fn set(level: Self) {
        VERBOSITY.store(level as u8, Ordering::Relaxed);
    }

    /// Check if we should output at this level
    pub fn should_output(&self) -> bool {
        self <= &Self::current()
    }

    /// Maximum tracing level, given the level from configuration
    pub fn max_level(&self, configured: &str) -> Level {
        match self {
            VerbosityLevel::Quiet => Level::ERROR,
            VerbosityLevel::Verbose => Level::DEBUG,
            VerbosityLevel::Normal => configured.parse().unwrap_or(Level::INFO),
        }
    }
}

/// Initialize logging based on CLI flags and the configured level
///
/// Logs go to stderr so command output on stdout stays pipeable. Installing a
/// second subscriber is a no-op.
pub fn init_logging(verbose: bool, quiet: bool, configured_level: &str) -> Level {
    let verbosity = VerbosityLevel::from_flags(verbose, quiet);
    VerbosityLevel::set(verbosity);

    let level = verbosity.max_level(configured_level);
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(verbosity == VerbosityLevel::Verbose)
        .with_writer(std::io::stderr)
        .try_init();
    level
}
