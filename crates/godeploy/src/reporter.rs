use std::time::Duration;

use indicatif::ProgressBar;

/// Progress output of long-running operations.
pub(crate) trait Reporter {
    /// A new step has started.
    fn step(&self, message: &str);

    /// Print a line without disturbing the current step.
    fn note(&self, message: &str);

    /// The operation has ended.
    fn finish(&self, message: &str);
}

/// [`Reporter`] rendering steps on an [`indicatif`] spinner.
pub(crate) struct SpinnerReporter {
    /// Underlying spinner.
    pg: ProgressBar,
}

impl SpinnerReporter {
    /// Start a ticking spinner.
    pub fn new() -> Self {
        let pg = ProgressBar::new_spinner();
        pg.enable_steady_tick(Duration::from_millis(150));

        Self { pg }
    }
}

impl Reporter for SpinnerReporter {
    fn step(&self, message: &str) {
        self.pg.set_message(message.to_owned());
    }

    fn note(&self, message: &str) {
        self.pg.println(message);
    }

    fn finish(&self, message: &str) {
        self.pg.finish_with_message(message.to_owned());
    }
}

impl Drop for SpinnerReporter {
    fn drop(&mut self) {
        if !self.pg.is_finished() {
            self.pg.finish_and_clear();
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::Reporter;

    /// [`Reporter`] discarding everything.
    pub(crate) struct Silent;

    impl Reporter for Silent {
        fn step(&self, _: &str) {}

        fn note(&self, _: &str) {}

        fn finish(&self, _: &str) {}
    }
}
