use std::{
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam_channel::{select, Receiver, Sender};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use crate::{
    config::Config,
    datapoint::{DataPoint, Dimensions},
    registry::Reporter,
    BuildError, Error,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Command {
    Pause,
    Resume,
    Do,
    Stop,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Running { next_tick: Instant },
    Paused,
    Stopped,
}

struct Worker {
    control: Sender<Command>,
    handle: JoinHandle<()>,
}

/// Runs an action periodically on a dedicated thread.
///
/// The worker starts out running, with the first tick one interval after creation. Ticks are fixed-rate: if the action
/// overruns, missed ticks are skipped rather than queued. Control methods hand their command directly to the worker and
/// block until it has been accepted, which includes waiting for an action already in progress to return.
///
/// Once stopped, every control method returns [`Error::BackgroundJobNotStarted`].
pub struct Background {
    worker: Mutex<Option<Worker>>,
}

impl Background {
    /// Spawns a worker running `action` every `interval`.
    ///
    /// # Errors
    ///
    /// If the worker thread cannot be spawned, an error will be returned.
    pub fn new<F>(interval: Duration, action: F) -> Result<Self, BuildError>
    where
        F: FnMut() + Send + 'static,
    {
        let (control, commands) = crossbeam_channel::bounded(0);
        let handle = thread::Builder::new()
            .name("sfxclient-background".to_string())
            .spawn(move || run(&commands, interval, action))
            .map_err(BuildError::Spawn)?;

        Ok(Self { worker: Mutex::new(Some(Worker { control, handle })) })
    }

    /// Disables the periodic tick. Pausing a paused job has no effect.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackgroundJobNotStarted`] if the job has been stopped.
    pub fn pause(&self) -> Result<(), Error> {
        self.send(Command::Pause)
    }

    /// Re-enables the periodic tick, with the next tick one interval from now. Resuming a running job has no effect.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackgroundJobNotStarted`] if the job has been stopped.
    pub fn resume(&self) -> Result<(), Error> {
        self.send(Command::Resume)
    }

    /// Runs the action once, right away, whether or not the job is paused.
    ///
    /// When the job is running, the next tick is rescheduled to one interval after this run.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackgroundJobNotStarted`] if the job has been stopped.
    pub fn do_now(&self) -> Result<(), Error> {
        self.send(Command::Do)
    }

    /// Stops the job and waits for its worker to exit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackgroundJobNotStarted`] if the job was already stopped.
    pub fn stop(&self) -> Result<(), Error> {
        let Worker { control, handle } = self.worker.lock().take().ok_or(Error::BackgroundJobNotStarted)?;

        // A worker that already exited has nothing left to stop.
        let _ = control.send(Command::Stop);
        drop(control);
        if handle.join().is_err() {
            error!("Background worker panicked.");
        }
        Ok(())
    }

    fn send(&self, command: Command) -> Result<(), Error> {
        let worker = self.worker.lock();
        let worker = worker.as_ref().ok_or(Error::BackgroundJobNotStarted)?;
        worker.control.send(command).map_err(|_| Error::BackgroundJobNotStarted)
    }
}

impl Drop for Background {
    fn drop(&mut self) {
        // Disconnecting the control channel ends the worker at its next wakeup.
        drop(self.worker.get_mut().take());
    }
}

fn run<F>(commands: &Receiver<Command>, interval: Duration, mut action: F)
where
    F: FnMut(),
{
    let mut state = State::Running { next_tick: Instant::now() + interval };
    loop {
        let timer = match state {
            State::Running { next_tick } => crossbeam_channel::at(next_tick),
            State::Paused => crossbeam_channel::never(),
            State::Stopped => break,
        };

        select! {
            recv(commands) -> command => {
                // All handles gone: nobody is left to control us.
                let command = command.unwrap_or(Command::Stop);
                trace!(?command, ?state, "Background worker received command.");
                state = transition(state, command, interval, &mut action);
            }
            recv(timer) -> _ => {
                action();
                if let State::Running { next_tick } = state {
                    state = State::Running { next_tick: following_tick(next_tick, interval) };
                }
            }
        }
    }

    debug!("Background worker stopped.");
}

fn transition<F>(state: State, command: Command, interval: Duration, action: &mut F) -> State
where
    F: FnMut(),
{
    match (state, command) {
        (_, Command::Stop) | (State::Stopped, _) => State::Stopped,
        (State::Running { .. }, Command::Pause) | (State::Paused, Command::Pause) => State::Paused,
        (State::Running { .. }, Command::Resume) => state,
        (State::Paused, Command::Resume) => State::Running { next_tick: Instant::now() + interval },
        (State::Running { .. }, Command::Do) => {
            action();
            State::Running { next_tick: Instant::now() + interval }
        }
        (State::Paused, Command::Do) => {
            action();
            State::Paused
        }
    }
}

/// Next tick on the fixed-rate schedule, skipping any that were missed while the action ran.
fn following_tick(previous: Instant, interval: Duration) -> Instant {
    let now = Instant::now();
    let next = previous + interval;
    if next > now {
        next
    } else {
        now + interval
    }
}

/// Reports a [`Reporter`] periodically on a [`Background`] job.
///
/// Submission failures in the periodic action are logged and otherwise ignored. Stopping the reporter cancels any
/// submission still in flight, as does dropping it.
pub struct BackgroundReporter {
    reporter: Arc<Reporter>,
    interval: Duration,
    job: Mutex<Option<Background>>,
    // Kept apart from `job`: a control call holds that lock while the worker finishes a report, and `stop` must be
    // able to cancel that report in the meantime.
    cancel: Mutex<Option<CancellationToken>>,
}

impl BackgroundReporter {
    /// Creates a new `BackgroundReporter` posting to the endpoint described by `config`.
    ///
    /// The reporter is not started until [`start`](BackgroundReporter::start) is called.
    ///
    /// # Errors
    ///
    /// If the HTTP forwarder cannot be built from `config`, an error will be returned.
    pub fn new(config: &Config, default_dimensions: Dimensions, interval: Duration) -> Result<Self, BuildError> {
        let reporter = Reporter::new(config, default_dimensions)?;
        Ok(Self::from_reporter(Arc::new(reporter), interval))
    }

    /// Creates a new `BackgroundReporter` driving an existing reporter.
    pub fn from_reporter(reporter: Arc<Reporter>, interval: Duration) -> Self {
        Self { reporter, interval, job: Mutex::new(None), cancel: Mutex::new(None) }
    }

    /// Returns the underlying reporter, for tracking metrics.
    pub fn reporter(&self) -> &Arc<Reporter> {
        &self.reporter
    }

    /// Starts periodic reporting. Starting a started reporter has no effect.
    ///
    /// # Errors
    ///
    /// If the background worker cannot be spawned, an error will be returned.
    pub fn start(&self) -> Result<(), BuildError> {
        let mut job = self.job.lock();
        if job.is_some() {
            return Ok(());
        }

        let cancel = CancellationToken::new();
        let reporter = Arc::clone(&self.reporter);
        let token = cancel.clone();
        let background = Background::new(self.interval, move || report_in_background(&reporter, &token))?;
        *self.cancel.lock() = Some(cancel);
        *job = Some(background);
        Ok(())
    }

    /// Pauses periodic reporting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackgroundReporterNotStarted`] if the reporter is not started.
    pub fn pause(&self) -> Result<(), Error> {
        self.with_job(Background::pause)
    }

    /// Resumes periodic reporting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackgroundReporterNotStarted`] if the reporter is not started.
    pub fn resume(&self) -> Result<(), Error> {
        self.with_job(Background::resume)
    }

    /// Runs a report cycle on the background worker right away.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackgroundReporterNotStarted`] if the reporter is not started.
    pub fn do_now(&self) -> Result<(), Error> {
        self.with_job(Background::do_now)
    }

    /// Stops periodic reporting, cancelling any submission in flight.
    ///
    /// The reporter can be started again afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackgroundReporterNotStarted`] if the reporter is not started.
    pub fn stop(&self) -> Result<(), Error> {
        let cancel = self.cancel.lock().take().ok_or(Error::BackgroundReporterNotStarted)?;
        cancel.cancel();

        // Waits for any control call still handing a command to the worker.
        let background = self.job.lock().take().ok_or(Error::BackgroundReporterNotStarted)?;
        background.stop()
    }

    /// Runs a report cycle on the calling thread, independent of the background job.
    ///
    /// # Errors
    ///
    /// See [`Reporter::report`].
    pub fn report(&self, cancel: &CancellationToken) -> Result<Vec<DataPoint>, Error> {
        self.reporter.report(cancel)
    }

    fn with_job<F>(&self, f: F) -> Result<(), Error>
    where
        F: FnOnce(&Background) -> Result<(), Error>,
    {
        let job = self.job.lock();
        let background = job.as_ref().ok_or(Error::BackgroundReporterNotStarted)?;
        f(background)
    }
}

impl Drop for BackgroundReporter {
    fn drop(&mut self) {
        // The job's own drop then disconnects the worker.
        if let Some(cancel) = self.cancel.get_mut().take() {
            cancel.cancel();
        }
    }
}

fn report_in_background(reporter: &Reporter, cancel: &CancellationToken) {
    match reporter.report(cancel) {
        Ok(points) => trace!(points = points.len(), "Background report completed."),
        Err(e) if e.is_cancelled() => debug!("Background report cancelled."),
        Err(e) => error!(error = %e, "Failed to report datapoints."),
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        thread::sleep,
        time::{Duration, Instant},
    };

    use super::{following_tick, Background};
    use crate::Error;

    fn counting(interval: Duration) -> (Background, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&runs);
        let background = Background::new(interval, move || {
            counted.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        (background, runs)
    }

    fn wait_for(runs: &AtomicUsize, expected: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while runs.load(Ordering::SeqCst) < expected && Instant::now() < deadline {
            sleep(Duration::from_millis(5));
        }
        assert_eq!(runs.load(Ordering::SeqCst), expected);
    }

    #[test]
    fn missed_ticks_are_skipped() {
        let interval = Duration::from_millis(100);
        let stale = Instant::now().checked_sub(Duration::from_secs(1)).unwrap();
        assert!(following_tick(stale, interval) > Instant::now());

        let future = Instant::now() + Duration::from_secs(1);
        assert_eq!(following_tick(future, interval), future + interval);
    }

    #[test]
    fn pause_do_resume_stop() {
        let interval = Duration::from_millis(200);
        let (background, runs) = counting(interval);

        sleep(Duration::from_millis(300));
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        background.pause().unwrap();
        background.pause().unwrap();
        sleep(Duration::from_millis(300));
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        background.do_now().unwrap();
        wait_for(&runs, 2);
        sleep(Duration::from_millis(300));
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        background.resume().unwrap();
        sleep(Duration::from_millis(300));
        assert_eq!(runs.load(Ordering::SeqCst), 3);

        background.stop().unwrap();
        assert!(matches!(background.stop(), Err(Error::BackgroundJobNotStarted)));
        assert!(matches!(background.pause(), Err(Error::BackgroundJobNotStarted)));
        assert!(matches!(background.resume(), Err(Error::BackgroundJobNotStarted)));
        assert!(matches!(background.do_now(), Err(Error::BackgroundJobNotStarted)));
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn do_realigns_running_timer() {
        let interval = Duration::from_millis(300);
        let (background, runs) = counting(interval);

        sleep(Duration::from_millis(150));
        background.do_now().unwrap();
        wait_for(&runs, 1);

        // The original tick at 300ms was pushed back to 450ms.
        sleep(Duration::from_millis(225));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        sleep(Duration::from_millis(150));
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        background.stop().unwrap();
    }

    #[test]
    fn resume_while_running_is_noop() {
        let (background, runs) = counting(Duration::from_millis(200));
        sleep(Duration::from_millis(100));
        background.resume().unwrap();
        sleep(Duration::from_millis(150));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        background.stop().unwrap();
    }

    #[test]
    fn each_do_runs_once() {
        let (background, runs) = counting(Duration::from_secs(60));
        for expected in 1..=5 {
            background.do_now().unwrap();
            wait_for(&runs, expected);
        }
        background.stop().unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn dropping_ends_worker() {
        let (background, runs) = counting(Duration::from_millis(50));
        drop(background);
        sleep(Duration::from_millis(200));
        assert!(runs.load(Ordering::SeqCst) <= 1);
    }
}
