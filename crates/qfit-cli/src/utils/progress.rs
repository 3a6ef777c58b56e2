use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use qfit::engine::progress::{Progress, ProgressCallback};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;

const TICK: Duration = Duration::from_millis(100);

/// Terminal view of a multiconformer run: a spinner per phase, a bar for the
/// cardinality sweep and one line per finished build level.
#[derive(Clone)]
pub struct CliProgressHandler {
    bar: Arc<Mutex<ProgressBar>>,
}

impl CliProgressHandler {
    pub fn new() -> Self {
        let bar = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::stderr())
            .with_style(phase_style())
            .with_message("Waiting for the workflow");
        bar.finish_and_clear();
        Self {
            bar: Arc::new(Mutex::new(bar)),
        }
    }

    pub fn get_callback(&self) -> ProgressCallback<'static> {
        let bar = Arc::clone(&self.bar);
        Box::new(move |event: Progress| match bar.lock() {
            Ok(bar) => apply(&bar, event),
            Err(_) => warn!("Progress bar lock is poisoned; dropping a progress event."),
        })
    }
}

impl Default for CliProgressHandler {
    fn default() -> Self {
        Self::new()
    }
}

fn apply(bar: &ProgressBar, event: Progress) {
    match event {
        Progress::PhaseStart { name } => {
            bar.reset();
            bar.set_length(0);
            bar.set_style(phase_style());
            bar.set_message(name);
            bar.enable_steady_tick(TICK);
        }
        Progress::PhaseFinish => {
            let phase = bar.message();
            bar.disable_steady_tick();
            bar.finish_with_message(format!("{} done", phase));
        }
        Progress::TaskStart { total_steps } => {
            bar.disable_steady_tick();
            bar.set_style(sweep_style());
            bar.set_length(total_steps);
            bar.set_position(0);
        }
        Progress::TaskIncrement => bar.inc(1),
        Progress::TaskFinish => {
            if let Some(length) = bar.length() {
                bar.set_position(length);
            }
        }
        Progress::LevelComplete {
            level,
            levels,
            survivors,
            kept,
        } => {
            // Levels are counted from zero by the builder.
            let shown = level + 1;
            bar.println(format!(
                "  level {}/{}: {} of {} conformers kept",
                shown, levels, kept, survivors
            ));
            bar.set_message(format!("Building level {}/{}", shown, levels));
        }
        Progress::Message(text) => bar.println(format!("  {}", text)),
    }
}

fn phase_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan} [{elapsed_precise}] {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn sweep_style() -> ProgressStyle {
    ProgressStyle::with_template("{msg} {wide_bar:.green/white} {pos}/{len} cardinalities")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar_of(handler: &CliProgressHandler) -> ProgressBar {
        handler.bar.lock().unwrap().clone()
    }

    #[test]
    fn starts_idle() {
        let handler = CliProgressHandler::new();
        let bar = bar_of(&handler);
        assert!(bar.is_finished());
        assert_eq!(bar.length(), Some(0));
    }

    #[test]
    fn build_levels_are_reported_from_one() {
        let handler = CliProgressHandler::new();
        let callback = handler.get_callback();

        callback(Progress::PhaseStart { name: "Building" });
        assert_eq!(bar_of(&handler).message(), "Building");

        callback(Progress::LevelComplete {
            level: 0,
            levels: 2,
            survivors: 12,
            kept: 8,
        });
        assert_eq!(bar_of(&handler).message(), "Building level 1/2");

        callback(Progress::LevelComplete {
            level: 1,
            levels: 2,
            survivors: 96,
            kept: 40,
        });
        assert_eq!(bar_of(&handler).message(), "Building level 2/2");

        callback(Progress::PhaseFinish);
        let bar = bar_of(&handler);
        assert!(bar.is_finished());
        assert_eq!(bar.message(), "Building level 2/2 done");
    }

    #[test]
    fn sweep_fills_the_bar() {
        let handler = CliProgressHandler::new();
        let callback = handler.get_callback();

        callback(Progress::PhaseStart { name: "Selection" });
        callback(Progress::TaskStart { total_steps: 5 });
        callback(Progress::TaskIncrement);
        callback(Progress::TaskIncrement);
        {
            let bar = bar_of(&handler);
            assert_eq!(bar.length(), Some(5));
            assert_eq!(bar.position(), 2);
        }

        callback(Progress::TaskFinish);
        assert_eq!(bar_of(&handler).position(), 5);

        callback(Progress::PhaseFinish);
        assert_eq!(bar_of(&handler).message(), "Selection done");
    }

    #[test]
    fn events_from_worker_threads_are_applied() {
        let handler = CliProgressHandler::new();
        let callback = handler.get_callback();

        std::thread::spawn(move || {
            callback(Progress::PhaseStart { name: "Selection" });
            callback(Progress::Message("screened 64 candidates".into()));
            callback(Progress::PhaseFinish);
        })
        .join()
        .unwrap();

        let bar = bar_of(&handler);
        assert!(bar.is_finished());
        assert_eq!(bar.message(), "Selection done");
    }
}
