//! Host color-scheme detection

use std::sync::atomic::{AtomicBool, Ordering};

/// Answers whether the host currently prefers a dark color scheme
///
/// Queried every time the `system` theme is applied; implementations must
/// not cache the answer.
pub trait ColorSchemeProvider: Send + Sync {
    fn prefers_dark(&self) -> bool;
}

/// Fixed answer that can be flipped at runtime
#[derive(Debug, Default)]
pub struct StaticColorScheme {
    dark: AtomicBool,
}

impl StaticColorScheme {
    pub fn new(dark: bool) -> Self {
        Self {
            dark: AtomicBool::new(dark),
        }
    }

    pub fn set_dark(&self, dark: bool) {
        self.dark.store(dark, Ordering::SeqCst);
    }
}

impl ColorSchemeProvider for StaticColorScheme {
    fn prefers_dark(&self) -> bool {
        self.dark.load(Ordering::SeqCst)
    }
}

/// Reads the terminal's `COLORFGBG` hint (`"<fg>;<bg>"` or `"<fg>;<x>;<bg>"`)
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalColorScheme;

impl TerminalColorScheme {
    pub const ENV_VAR: &'static str = "COLORFGBG";

    pub fn new() -> Self {
        Self
    }

    /// Interpret a `COLORFGBG` value; `None` when it carries no background
    pub fn parse(value: &str) -> Option<bool> {
        let background: u8 = value.rsplit(';').next()?.trim().parse().ok()?;
        // ANSI 0-6 and 8 are dark backgrounds; 7 and 9-15 are light
        Some(background <= 6 || background == 8)
    }
}

impl ColorSchemeProvider for TerminalColorScheme {
    fn prefers_dark(&self) -> bool {
        std::env::var(Self::ENV_VAR)
            .ok()
            .and_then(|value| Self::parse(&value))
            .unwrap_or(false)
    }
}
