//! Wind-down from "counting" to "idle" once the task has settled.

use std::time::Duration;

use etabar_core::DEFAULT_DWELL_MS;

/// Receives progress updates from the countdown and the completion transition.
pub trait ProgressSink: Send + Sync {
    /// Set the predicted remaining time; `None` means idle.
    fn set_remaining(&self, remaining_ms: Option<u64>);

    /// Set the busy flag.
    fn set_busy(&self, busy: bool);
}

/// Forces the bar to 100%, holds it for a fixed dwell, then goes idle.
///
/// The dwell does not depend on how far the countdown was from zero, so an
/// early finish never jumps straight to idle and a late finish never moves
/// the bar backwards.
#[derive(Debug, Clone, Copy)]
pub struct CompletionTransition {
    dwell: Duration,
}

impl Default for CompletionTransition {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_DWELL_MS))
    }
}

impl CompletionTransition {
    /// Create a transition with the given dwell.
    pub fn new(dwell: Duration) -> Self {
        Self { dwell }
    }

    /// Dwell at 100%.
    pub fn dwell(&self) -> Duration {
        self.dwell
    }

    /// Run the transition against `sink`.
    pub async fn finish<S: ProgressSink + ?Sized>(&self, sink: &S) {
        sink.set_remaining(Some(0));
        tokio::time::sleep(self.dwell).await;
        sink.set_busy(false);
        sink.set_remaining(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::time::Instant;

    #[derive(Debug, PartialEq)]
    enum Call {
        Remaining(Option<u64>),
        Busy(bool),
    }

    struct RecordingSink {
        calls: Mutex<Vec<(Call, Instant)>>,
    }

    impl ProgressSink for RecordingSink {
        fn set_remaining(&self, remaining_ms: Option<u64>) {
            self.calls
                .lock()
                .unwrap()
                .push((Call::Remaining(remaining_ms), Instant::now()));
        }

        fn set_busy(&self, busy: bool) {
            self.calls.lock().unwrap().push((Call::Busy(busy), Instant::now()));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_finish_sequence() {
        let sink = RecordingSink {
            calls: Mutex::new(Vec::new()),
        };
        let start = Instant::now();

        CompletionTransition::default().finish(&sink).await;

        let calls = sink.calls.into_inner().unwrap();
        let kinds: Vec<&Call> = calls.iter().map(|(c, _)| c).collect();
        assert_eq!(
            kinds,
            vec![&Call::Remaining(Some(0)), &Call::Busy(false), &Call::Remaining(None)]
        );
        assert_eq!(calls[0].1, start);
        assert_eq!(calls[1].1 - start, Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_dwell() {
        let sink = RecordingSink {
            calls: Mutex::new(Vec::new()),
        };
        let transition = CompletionTransition::new(Duration::from_millis(50));
        let start = Instant::now();

        transition.finish(&sink).await;

        assert_eq!(start.elapsed(), Duration::from_millis(50));
        assert_eq!(transition.dwell(), Duration::from_millis(50));
    }
}
