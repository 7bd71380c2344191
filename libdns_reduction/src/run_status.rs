use std::sync::mpsc::Sender;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Stage {
    #[default]
    Generating,
    Running,
    Done,
}

/// Progress of a script run, sent from the worker to the UI
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptStatus {
    pub progress: f32,
    pub step: usize,
    pub total_steps: usize,
    pub stage: Stage,
}

impl ScriptStatus {
    pub fn new(step: usize, total_steps: usize, stage: Stage) -> Self {
        let progress = if total_steps == 0 {
            1.0
        } else {
            (step as f32 / total_steps as f32).min(1.0)
        };
        Self {
            progress,
            step,
            total_steps,
            stage,
        }
    }
}

/// Receives the index of each finished script step
pub trait ProgressSink {
    fn update(&mut self, step: usize);
}

impl<F: FnMut(usize)> ProgressSink for F {
    fn update(&mut self, step: usize) {
        self(step)
    }
}

/// Forwards step progress over a channel
#[derive(Debug)]
pub struct StatusReporter {
    tx: Sender<ScriptStatus>,
    total_steps: usize,
    disconnected: bool,
}

impl StatusReporter {
    pub fn new(tx: Sender<ScriptStatus>, total_steps: usize) -> Self {
        Self {
            tx,
            total_steps,
            disconnected: false,
        }
    }
}

impl ProgressSink for StatusReporter {
    fn update(&mut self, step: usize) {
        if self.disconnected {
            return;
        }
        let status = ScriptStatus::new(step + 1, self.total_steps, Stage::Running);
        if self.tx.send(status).is_err() {
            log::warn!("Progress receiver hung up, no further progress will be reported.");
            self.disconnected = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;

    #[test]
    fn test_status_progress() {
        assert_eq!(ScriptStatus::new(5, 10, Stage::Running).progress, 0.5);
        assert_eq!(ScriptStatus::new(0, 0, Stage::Done).progress, 1.0);
    }

    #[test]
    fn test_status_reporter() {
        let (tx, rx) = channel();
        let mut reporter = StatusReporter::new(tx, 4);
        reporter.update(0);
        reporter.update(3);
        let received: Vec<ScriptStatus> = rx.try_iter().collect();
        assert_eq!(received.len(), 2);
        assert_eq!(received[0].step, 1);
        assert_eq!(received[1], ScriptStatus::new(4, 4, Stage::Running));
        drop(rx);
        reporter.update(1);
        assert!(reporter.disconnected);
    }

    #[test]
    fn test_closure_sink() {
        let mut seen = Vec::new();
        {
            let mut sink = |step: usize| seen.push(step);
            let sink: &mut dyn ProgressSink = &mut sink;
            sink.update(2);
            sink.update(7);
        }
        assert_eq!(seen, vec![2, 7]);
    }
}
