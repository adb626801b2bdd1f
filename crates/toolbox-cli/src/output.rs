// Output formatting and styling

use std::io::IsTerminal;

use colored::Colorize;

use toolbox_models::{GpuInfo, ModelDescriptor, RunningModelDescriptor, TokenStat};

use crate::logging::VerbosityLevel;

/// Output styling configuration
pub struct OutputStyle {
    pub use_colors: bool,
}

impl Default for OutputStyle {
    fn default() -> Self {
        Self {
            use_colors: std::io::stdout().is_terminal(),
        }
    }
}

impl OutputStyle {
    pub fn plain() -> Self {
        Self { use_colors: false }
    }

    pub fn success(&self, msg: &str) -> String {
        if self.use_colors {
            format!("{} {}", "✓".green().bold(), msg)
        } else {
            format!("✓ {}", msg)
        }
    }

    pub fn error(&self, msg: &str) -> String {
        if self.use_colors {
            format!("{} {}", "✗".red().bold(), msg)
        } else {
            format!("✗ {}", msg)
        }
    }

    pub fn warning(&self, msg: &str) -> String {
        if self.use_colors {
            format!("{} {}", "⚠".yellow(), msg)
        } else {
            format!("⚠ {}", msg)
        }
    }

    pub fn info(&self, msg: &str) -> String {
        if self.use_colors {
            format!("{} {}", "ℹ".blue(), msg)
        } else {
            format!("ℹ {}", msg)
        }
    }

    pub fn code(&self, code: &str) -> String {
        if self.use_colors {
            code.cyan().to_string()
        } else {
            code.to_string()
        }
    }

    pub fn header(&self, title: &str) -> String {
        if self.use_colors {
            title.bold().to_string()
        } else {
            title.to_string()
        }
    }
}

/// Print an error to stderr; shown even in quiet mode
pub fn print_error(msg: &str) {
    eprintln!("{}", OutputStyle::default().error(msg));
}

pub fn print_success(msg: &str) {
    if VerbosityLevel::Normal.should_output() {
        println!("{}", OutputStyle::default().success(msg));
    }
}

pub fn print_warning(msg: &str) {
    eprintln!("{}", OutputStyle::default().warning(msg));
}

/// Human-readable byte count using binary units
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// Installed models, one per line; the selected one is starred
pub fn render_models(style: &OutputStyle, models: &[ModelDescriptor], selected: &str) -> String {
    if models.is_empty() {
        return style.info("No models installed. Pull one with 'toolbox pull <name>'.");
    }
    let width = models.iter().map(|m| m.name.len()).max().unwrap_or(0);
    models
        .iter()
        .map(|model| {
            let marker = if model.name == selected { "*" } else { " " };
            let size = model.size().map(format_bytes).unwrap_or_default();
            format!(
                "{} {}  {}",
                marker,
                style.code(&format!("{:<width$}", model.name, width = width)),
                size
            )
            .trim_end()
            .to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Models resident in memory with their VRAM footprint
pub fn render_running(style: &OutputStyle, running: &[RunningModelDescriptor]) -> String {
    if running.is_empty() {
        return style.info("No models loaded.");
    }
    running
        .iter()
        .map(|model| match model.size_vram() {
            Some(vram) => format!("{}  {} VRAM", style.code(&model.name), format_bytes(vram)),
            None => style.code(&model.name),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_gpu(style: &OutputStyle, gpu: &GpuInfo) -> String {
    if gpu.total_bytes == 0 {
        return style.info("No GPU detected.");
    }
    format!(
        "{}\n  {} / {} ({:.0}%)",
        style.header(&gpu.name),
        format_bytes(gpu.used_bytes),
        format_bytes(gpu.total_bytes),
        gpu.usage_ratio() * 100.0
    )
}

/// Token usage per day with a closing total row
pub fn render_token_stats(style: &OutputStyle, stats: &[TokenStat]) -> String {
    if stats.is_empty() {
        return style.info("No token usage recorded yet.");
    }
    let mut lines = vec![style.header(&format!(
        "{:<10}  {:>12}  {:>12}  {:>12}",
        "date", "prompt", "completion", "total"
    ))];
    let mut prompt = 0u64;
    let mut completion = 0u64;
    for stat in stats {
        prompt = prompt.saturating_add(stat.prompt_tokens);
        completion = completion.saturating_add(stat.completion_tokens);
        lines.push(format!(
            "{:<10}  {:>12}  {:>12}  {:>12}",
            stat.date,
            stat.prompt_tokens,
            stat.completion_tokens,
            stat.total_tokens()
        ));
    }
    lines.push(format!(
        "{:<10}  {:>12}  {:>12}  {:>12}",
        "all",
        prompt,
        completion,
        prompt.saturating_add(completion)
    ));
    lines.join("\n")
}
