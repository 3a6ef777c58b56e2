#[derive(Debug, Clone)]
pub enum Progress {
    PhaseStart { name: &'static str },
    PhaseFinish,

    TaskStart { total_steps: u64 },
    TaskIncrement,
    TaskFinish,

    /// A build level finished with `kept` candidates out of `survivors`.
    /// `level` counts from zero.
    LevelComplete {
        level: usize,
        levels: usize,
        survivors: usize,
        kept: usize,
    },

    Message(String),
}

pub type ProgressCallback<'a> = Box<dyn Fn(Progress) + Send + Sync + 'a>;

#[derive(Default)]
pub struct ProgressReporter<'a> {
    callback: Option<ProgressCallback<'a>>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(callback: ProgressCallback<'a>) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    #[inline]
    pub fn report(&self, event: Progress) {
        if let Some(cb) = &self.callback {
            cb(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn events_reach_the_callback_in_order() {
        let seen = Mutex::new(Vec::new());
        let reporter = ProgressReporter::with_callback(Box::new(|event| {
            let label = match event {
                Progress::PhaseStart { name } => name.to_string(),
                Progress::LevelComplete { level, .. } => format!("level {}", level),
                _ => "other".to_string(),
            };
            seen.lock().unwrap().push(label);
        }));

        reporter.report(Progress::PhaseStart { name: "Build" });
        reporter.report(Progress::LevelComplete {
            level: 0,
            levels: 1,
            survivors: 3,
            kept: 3,
        });
        reporter.report(Progress::PhaseFinish);
        drop(reporter);

        assert_eq!(seen.into_inner().unwrap(), vec!["Build", "level 0", "other"]);
    }

    #[test]
    fn silent_reporter_ignores_events() {
        ProgressReporter::new().report(Progress::Message("ignored".into()));
    }
}
