// Progress indicators and spinners

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::watch;

use toolbox_models::PullProgress;

/// Create a spinner for long-running operations
pub fn create_spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
        .template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|e| {
            eprintln!("Failed to create spinner template: {}", e);
            ProgressStyle::default_spinner()
        });
    spinner.set_style(style);
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

/// Create a byte progress bar for a model pull
pub fn create_pull_bar(model: &str) -> ProgressBar {
    let pb = ProgressBar::new(0);
    let style = ProgressStyle::default_bar()
        .template("{prefix} {msg:<20} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({percent}%)")
        .unwrap_or_else(|e| {
            eprintln!("Failed to create progress bar template: {}", e);
            ProgressStyle::default_bar()
        })
        .progress_chars("=>-");
    pb.set_style(style);
    pb.set_prefix(model.to_string());
    pb.set_message(PullProgress::INITIALIZING);
    pb
}

/// Mirror one snapshot onto `bar`
///
/// Phases without a byte count (e.g. "pulling manifest") only update the
/// message. The empty snapshot is ignored.
pub fn render_pull_progress(bar: &ProgressBar, progress: &PullProgress) {
    if progress.is_empty() {
        return;
    }
    bar.set_message(progress.status.clone());
    if progress.total > 0 {
        bar.set_length(progress.total);
        bar.set_position(progress.completed.min(progress.total));
    }
}

/// Render every snapshot published on `progress` until the sender is gone
pub async fn follow_pull(mut progress: watch::Receiver<PullProgress>, bar: ProgressBar) {
    loop {
        let snapshot = progress.borrow_and_update().clone();
        render_pull_progress(&bar, &snapshot);
        if progress.changed().await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_sets_length_and_position() {
        let bar = ProgressBar::hidden();
        render_pull_progress(&bar, &PullProgress::new("downloading", 50, 200));
        assert_eq!(bar.length(), Some(200));
        assert_eq!(bar.position(), 50);
        assert_eq!(bar.message(), "downloading");
    }

    #[test]
    fn test_render_ignores_empty_and_countless_snapshots() {
        let bar = ProgressBar::hidden();
        render_pull_progress(&bar, &PullProgress::new("downloading", 10, 100));
        render_pull_progress(&bar, &PullProgress::default());
        render_pull_progress(&bar, &PullProgress::new("verifying sha256 digest", 0, 0));
        assert_eq!(bar.position(), 10);
        assert_eq!(bar.message(), "verifying sha256 digest");
    }

    #[test]
    fn test_follow_pull_stops_when_sender_dropped() {
        let (tx, rx) = watch::channel(PullProgress::initializing());
        let bar = ProgressBar::hidden();
        tx.send_replace(PullProgress::new("downloading", 30, 60));
        drop(tx);

        tokio_test::block_on(follow_pull(rx, bar.clone()));

        assert_eq!(bar.length(), Some(60));
        assert_eq!(bar.position(), 30);
    }

    #[test]
    fn test_render_clamps_overshoot() {
        let bar = ProgressBar::hidden();
        render_pull_progress(&bar, &PullProgress::new("downloading", 150, 100));
        assert_eq!(bar.position(), 100);
    }
}
