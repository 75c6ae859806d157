use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::io;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::checkpoint::SelectionInput;
use crate::supervisor::{PhaseStatus, WorkflowEvent};
use crate::ui::icons::{CHECK, CLOCK, CROSS, RETRY, SPARKLE};

/// Terminal progress for an itinerary run, rendered via `indicatif`.
///
/// Two bars are stacked vertically:
/// - Step bar: top-level steps of the current phase
/// - Task spinner: the task currently talking to the model
pub struct RunProgress {
    multi: MultiProgress,
    step_bar: ProgressBar,
    task_bar: ProgressBar,
    verbose: bool,
}

impl RunProgress {
    pub fn new(verbose: bool) -> Self {
        let multi = MultiProgress::new();

        let step_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .expect("progress bar template is a valid static string")
            .progress_chars("█▓▒░");
        let step_bar = multi.add(ProgressBar::new(0));
        step_bar.set_style(step_style);
        step_bar.set_prefix(" Phase");

        let task_style = ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {msg} {elapsed:.dim}")
            .expect("progress bar template is a valid static string");
        let task_bar = multi.add(ProgressBar::new_spinner());
        task_bar.set_style(task_style);
        task_bar.set_prefix("  Task");

        Self {
            multi,
            step_bar,
            task_bar,
            verbose,
        }
    }

    /// Handle on the bars' terminal, for output that must not interleave with them.
    pub fn terminal(&self) -> MultiProgress {
        self.multi.clone()
    }

    /// Spawn a task that renders every event until the channel closes.
    pub fn spawn(self, mut rx: mpsc::Receiver<WorkflowEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                self.handle(&event);
            }
            self.finish();
        })
    }

    fn print_line(&self, msg: impl AsRef<str>) {
        if self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    pub fn handle(&self, event: &WorkflowEvent) {
        match event {
            WorkflowEvent::PhaseStarted {
                phase, total_steps, ..
            } => {
                self.step_bar.reset();
                self.step_bar.set_length(*total_steps as u64);
                self.step_bar.set_message(style(phase).yellow().to_string());
                self.task_bar.enable_steady_tick(Duration::from_millis(100));
            }
            WorkflowEvent::StepStarted { phase, step, .. } => {
                self.step_bar
                    .set_message(format!("{} {}", style(phase).yellow(), style(step).dim()));
            }
            WorkflowEvent::StepCompleted { .. } => self.step_bar.inc(1),
            WorkflowEvent::TaskStarted { task } => {
                self.task_bar.set_message(task.clone());
                if self.verbose {
                    self.print_line(format!("    {} {}", style("→").dim(), style(task).dim()));
                }
            }
            WorkflowEvent::TaskRetrying {
                task,
                attempt,
                delay_ms,
            } => {
                self.print_line(format!(
                    "    {}{} busy, retry {} in {:.1}s",
                    RETRY,
                    style(task).yellow(),
                    attempt,
                    *delay_ms as f64 / 1000.0
                ));
            }
            WorkflowEvent::TaskCompleted {
                task, defaulted, ..
            } => {
                if *defaulted {
                    self.print_line(format!(
                        "    {} {}",
                        style(task).yellow(),
                        style("returned nothing usable; continuing with an empty result").dim()
                    ));
                } else if self.verbose {
                    self.print_line(format!("    {}{}", CHECK, style(task).dim()));
                }
            }
            WorkflowEvent::TaskFailed { task, error } => {
                self.print_line(format!("    {}{}: {}", CROSS, style(task).red(), error));
            }
            WorkflowEvent::PhaseFinished {
                phase,
                status,
                steps_completed,
            } => {
                let line = match status {
                    PhaseStatus::Completed => format!("{}{}", CHECK, style(phase).green()),
                    PhaseStatus::TimedOut => format!(
                        "{}{} timed out after {} step(s)",
                        CLOCK,
                        style(phase).red(),
                        steps_completed
                    ),
                    PhaseStatus::Failed => format!("{}{} failed", CROSS, style(phase).red()),
                };
                // Stop ticking so the checkpoint prompt owns the terminal.
                self.task_bar.disable_steady_tick();
                self.task_bar.set_message("");
                self.print_line(line);
            }
            WorkflowEvent::CheckpointResolved { selected } => {
                let ids: Vec<String> = selected.iter().map(u32::to_string).collect();
                self.print_line(format!(
                    "{}Selected region(s) {}",
                    SPARKLE,
                    style(ids.join(", ")).cyan()
                ));
            }
        }
    }

    pub fn finish(&self) {
        self.task_bar.finish_and_clear();
        self.step_bar.finish_and_clear();
    }
}

/// Checkpoint input that hides the progress bars while it talks to the user.
pub struct SuspendedInput<I> {
    inner: I,
    terminal: MultiProgress,
}

impl<I: SelectionInput> SuspendedInput<I> {
    pub fn new(inner: I, terminal: MultiProgress) -> Self {
        Self { inner, terminal }
    }

    pub fn into_inner(self) -> I {
        self.inner
    }
}

impl<I: SelectionInput> SelectionInput for SuspendedInput<I> {
    fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>> {
        let inner = &mut self.inner;
        self.terminal.suspend(|| inner.read_line(prompt))
    }

    fn show(&mut self, text: &str) {
        let inner = &mut self.inner;
        self.terminal.suspend(|| inner.show(text));
    }

    fn notify(&mut self, message: &str) {
        let inner = &mut self.inner;
        self.terminal.suspend(|| inner.notify(message));
    }
}
