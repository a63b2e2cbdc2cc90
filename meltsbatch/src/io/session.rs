//! Interactive engine sessions driven over stdin/stdout.
//!
//! A [`ProcessSession`] owns one engine process. Commands are written one per
//! line and flushed; between commands the session waits, bounded by the step
//! timeout, until its [`ReadinessDetector`] decides the engine can take more
//! input. Output is drained by reader threads into a channel so neither pipe
//! can fill up and stall the engine. On unix the engine leads its own process
//! group, and terminating the session kills the whole group, including
//! anything a driver script started.
//!
//! ```text
//! Spawned -> Running -> AwaitingInput -> Running ... -> Completed
//!                   \-> Failed | TimedOut
//! ```

use std::fmt::{self, Display};
use std::io::{ErrorKind, Read, Write};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, instrument, warn};
use wait_timeout::ChildExt;

use super::readiness::{OutputWindow, Readiness, ReadinessDetector};
use crate::core::error::RunError;

/// Transcript lines attached to protocol errors.
pub const TRANSCRIPT_TAIL_LINES: usize = 40;

/// Default bound on engine output kept in a transcript.
pub const TRANSCRIPT_LIMIT_BYTES: usize = 1_000_000;

/// Output since the last send that readiness patterns are matched against.
const MATCH_WINDOW_BYTES: usize = 16 * 1024;

const READ_CHUNK_BYTES: usize = 8192;

/// Interaction state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Spawned,
    Running,
    AwaitingInput,
    Completed,
    Failed,
    TimedOut,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Failed | SessionState::TimedOut
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptEvent {
    Sent(String),
    Received { stream: Stream, line: String },
    Note(String),
}

impl Display for TranscriptEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranscriptEvent::Sent(token) => write!(f, "> {token}"),
            TranscriptEvent::Received {
                stream: Stream::Stdout,
                line,
            } => write!(f, "  {line}"),
            TranscriptEvent::Received {
                stream: Stream::Stderr,
                line,
            } => write!(f, "! {line}"),
            TranscriptEvent::Note(note) => write!(f, "# {note}"),
        }
    }
}

/// Audit trail of one session: every command sent, and every output line
/// received while logging was enabled.
///
/// Received output is kept up to a byte limit; beyond it, bytes are only
/// counted and a truncation note closes the transcript.
#[derive(Debug, Clone)]
pub struct Transcript {
    events: Vec<TranscriptEvent>,
    partial_stdout: String,
    partial_stderr: String,
    limit: usize,
    kept: usize,
    truncated: usize,
}

impl Default for Transcript {
    fn default() -> Self {
        Self::with_limit(TRANSCRIPT_LIMIT_BYTES)
    }
}

impl Transcript {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            events: Vec::new(),
            partial_stdout: String::new(),
            partial_stderr: String::new(),
            limit,
            kept: 0,
            truncated: 0,
        }
    }

    pub fn events(&self) -> &[TranscriptEvent] {
        &self.events
    }

    /// Received bytes dropped because of the limit.
    pub fn truncated(&self) -> usize {
        self.truncated
    }

    pub fn send_count(&self) -> usize {
        self.events
            .iter()
            .filter(|event| matches!(event, TranscriptEvent::Sent(_)))
            .count()
    }

    /// Render the transcript, including any unterminated trailing output.
    pub fn render(&self) -> String {
        let mut lines: Vec<String> = self.events.iter().map(ToString::to_string).collect();
        if !self.partial_stdout.is_empty() {
            lines.push(format!("  {}", self.partial_stdout));
        }
        if !self.partial_stderr.is_empty() {
            lines.push(format!("! {}", self.partial_stderr));
        }
        let mut rendered = lines.join("\n");
        rendered.push('\n');
        rendered
    }

    /// The last `lines` rendered lines.
    pub fn tail(&self, lines: usize) -> String {
        let rendered = self.render();
        let all: Vec<&str> = rendered.lines().collect();
        all[all.len().saturating_sub(lines)..].join("\n")
    }

    fn record_sent(&mut self, token: &str) {
        self.flush_partial();
        self.events.push(TranscriptEvent::Sent(token.to_string()));
    }

    fn record_output(&mut self, stream: Stream, text: &str) {
        let room = self.limit.saturating_sub(self.kept);
        let keep = floor_char_boundary(text, room);
        self.kept += keep;
        self.truncated += text.len() - keep;
        let text = &text[..keep];
        if text.is_empty() {
            return;
        }

        let partial = match stream {
            Stream::Stdout => &mut self.partial_stdout,
            Stream::Stderr => &mut self.partial_stderr,
        };
        partial.push_str(text);
        while let Some(idx) = partial.find('\n') {
            let line = partial[..idx].trim_end_matches('\r').to_string();
            partial.drain(..=idx);
            self.events.push(TranscriptEvent::Received { stream, line });
        }
    }

    fn note(&mut self, note: &str) {
        self.events.push(TranscriptEvent::Note(note.to_string()));
    }

    /// Flush unterminated output and note any truncation.
    fn close(&mut self) {
        self.flush_partial();
        if self.truncated > 0 {
            warn!(truncated = self.truncated, "engine output truncated");
            self.note(&format!("output truncated {} bytes", self.truncated));
        }
    }

    fn flush_partial(&mut self) {
        for (stream, partial) in [
            (Stream::Stdout, &mut self.partial_stdout),
            (Stream::Stderr, &mut self.partial_stderr),
        ] {
            if !partial.is_empty() {
                let line = std::mem::take(partial);
                self.events.push(TranscriptEvent::Received { stream, line });
            }
        }
    }
}

/// Timing bounds for a session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Upper bound on waiting for readiness after one command.
    pub step_timeout: Duration,
    /// Granularity of the readiness poll.
    pub poll_interval: Duration,
    /// Time the engine gets to exit on its own once its input is closed.
    pub exit_grace: Duration,
    /// Engine output kept in the transcript.
    pub output_limit_bytes: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            step_timeout: Duration::from_secs(10 * 60),
            poll_interval: Duration::from_millis(50),
            exit_grace: Duration::from_secs(5),
            output_limit_bytes: TRANSCRIPT_LIMIT_BYTES,
        }
    }
}

struct Chunk {
    stream: Stream,
    text: String,
}

/// Output of the current step, reduced to the tail patterns are matched on.
///
/// Every chunk is assessed as it arrives, so the window only has to hold one
/// chunk plus enough context for multi-chunk markers.
#[derive(Debug, Default)]
struct StepOutput {
    tail: String,
}

impl StepOutput {
    fn push(&mut self, text: &str) {
        self.tail.push_str(text);
        if self.tail.len() > MATCH_WINDOW_BYTES {
            let mut cut = self.tail.len() - MATCH_WINDOW_BYTES;
            while !self.tail.is_char_boundary(cut) {
                cut += 1;
            }
            self.tail.drain(..cut);
        }
    }

    fn window(&self, quiet_for: Duration) -> OutputWindow<'_> {
        OutputWindow {
            since_send: &self.tail,
            quiet_for,
        }
    }
}

/// A live engine process and its interaction state.
pub struct ProcessSession<D: ReadinessDetector> {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    output: Receiver<Chunk>,
    detector: D,
    options: SessionOptions,
    state: SessionState,
    transcript: Transcript,
    log_output: bool,
    /// Every command of the last `write` went out.
    sequence_sent: bool,
    /// The last readiness came from a prompt or finish marker, not silence.
    at_prompt: bool,
    finish_seen: bool,
    exit_status: Option<ExitStatus>,
}

impl<D: ReadinessDetector> ProcessSession<D> {
    /// Spawn `cmd` with all three standard streams piped.
    ///
    /// The caller sets the working directory and startup arguments.
    #[instrument(skip_all, fields(program = %cmd.get_program().to_string_lossy()))]
    pub fn spawn(mut cmd: Command, detector: D, options: SessionOptions) -> Result<Self, RunError> {
        let program = cmd.get_program().to_string_lossy().into_owned();
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        debug!("spawning engine process");
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(source) => {
                error!(err = %source, "failed to spawn engine");
                return Err(RunError::ProcessSpawn { program, source });
            }
        };

        let (tx, rx) = mpsc::channel();
        if let Some(stdout) = child.stdout.take() {
            spawn_reader(stdout, Stream::Stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_reader(stderr, Stream::Stderr, tx);
        }
        let stdin = child.stdin.take();

        info!(pid = child.id(), "engine spawned");
        Ok(Self {
            child: Some(child),
            stdin,
            output: rx,
            detector,
            state: SessionState::Spawned,
            transcript: Transcript::with_limit(options.output_limit_bytes),
            options,
            log_output: true,
            sequence_sent: false,
            at_prompt: false,
            finish_seen: false,
            exit_status: None,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }

    /// Whether the engine printed a termination marker.
    pub fn finish_seen(&self) -> bool {
        self.finish_seen
    }

    /// Send `commands` in order, one per line.
    ///
    /// With `wait`, each command is followed by a bounded wait for readiness.
    /// With `log`, received output lines are kept in the transcript.
    #[instrument(skip_all, fields(commands = commands.len(), wait = wait, log = log))]
    pub fn write<T: Display>(&mut self, commands: &[T], wait: bool, log: bool) -> Result<(), RunError> {
        self.log_output = log;
        self.sequence_sent = false;
        let total = commands.len();
        for (index, command) in commands.iter().enumerate() {
            let token = command.to_string();
            self.send(&token, index, total)?;
            if wait {
                self.wait_ready(index + 1, total)?;
            }
        }
        self.sequence_sent = true;
        Ok(())
    }

    /// Close the engine's input, give it `exit_grace` to exit, then terminate.
    ///
    /// An engine still running after the grace period is only `Completed` if
    /// it was sitting at a prompt or had reported a finish; an engine that
    /// merely went quiet may still be calculating and ends `Failed`.
    pub fn finish(&mut self) -> Result<SessionState, RunError> {
        if self.state.is_terminal() {
            self.terminate();
            return Ok(self.state);
        }
        self.stdin.take();
        let mut still_running = false;
        if let Some(child) = self.child.as_mut() {
            match child.wait_timeout(self.options.exit_grace) {
                Ok(Some(status)) => {
                    debug!(exit_code = ?status.code(), "engine exited after input closed");
                    self.exit_status = Some(status);
                }
                Ok(None) => {
                    debug!(
                        grace_secs = self.options.exit_grace.as_secs_f64(),
                        "engine still running after grace period"
                    );
                    still_running = true;
                }
                Err(err) => return Err(RunError::io("wait for engine exit", err)),
            }
        }

        let mut rest = StepOutput::default();
        match self.pump(None, &mut rest) {
            Readiness::Error(line) => {
                return Err(self.fail(format!("engine reported an error: {line}")));
            }
            Readiness::Finished => self.finish_seen = true,
            _ => {}
        }
        if still_running && !self.at_prompt && !self.finish_seen {
            return Err(self.fail(format!(
                "engine still running {:?} after input closed, with no prompt or finish marker",
                self.options.exit_grace
            )));
        }
        self.terminate();
        Ok(self.state)
    }

    /// Kill the engine if it is still running and release its handles.
    ///
    /// Idempotent. The session ends `Completed` only if the whole command
    /// sequence went out and the engine then exited cleanly, reported a
    /// finish, or was back at a prompt. Anything else ends `Failed`.
    pub fn terminate(&mut self) {
        let released = self.release_process();
        if !self.state.is_terminal() {
            let exited_cleanly = self.exit_status.is_some_and(|status| status.success());
            let settled = self.finish_seen || self.at_prompt || exited_cleanly;
            self.state = match self.state {
                SessionState::AwaitingInput | SessionState::Running
                    if self.sequence_sent && settled =>
                {
                    SessionState::Completed
                }
                _ => SessionState::Failed,
            };
        }
        if released {
            self.transcript.close();
            if let Some(status) = self.exit_status {
                self.transcript.note(&format!("engine exited with {status}"));
            }
            info!(state = ?self.state, "engine session closed");
        }
    }

    fn send(&mut self, token: &str, index: usize, total: usize) -> Result<(), RunError> {
        if self.state.is_terminal() {
            return Err(self.fail(format!(
                "cannot send {token:?}: session already {:?}",
                self.state
            )));
        }
        if let Some(status) = self.poll_exit() {
            return Err(self.fail(format!(
                "engine exited with {status} after {index} of {total} commands"
            )));
        }
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(self.fail("engine stdin is closed".to_string()));
        };
        let written = writeln!(stdin, "{token}").and_then(|()| stdin.flush());
        if let Err(err) = written {
            return Err(self.fail(format!(
                "writing {token:?} failed after {index} of {total} commands: {err}"
            )));
        }
        debug!(token, "sent command");
        self.transcript.record_sent(token);
        self.state = SessionState::Running;
        self.at_prompt = false;
        Ok(())
    }

    fn wait_ready(&mut self, sent: usize, total: usize) -> Result<(), RunError> {
        let step_started = Instant::now();
        let mut last_output = step_started;
        let mut step = StepOutput::default();
        loop {
            let verdict = match self.output.recv_timeout(self.options.poll_interval) {
                Ok(chunk) => {
                    last_output = Instant::now();
                    self.pump(Some(chunk), &mut step)
                }
                Err(RecvTimeoutError::Timeout) => Readiness::Pending,
                // Both pipes closed; the exit check below picks it up.
                Err(RecvTimeoutError::Disconnected) => {
                    thread::sleep(self.options.poll_interval);
                    Readiness::Pending
                }
            };
            let verdict = match verdict {
                Readiness::Pending => self.detector.assess(&step.window(last_output.elapsed())),
                decided => decided,
            };

            match verdict {
                Readiness::Prompt => {
                    self.at_prompt = true;
                    self.state = SessionState::AwaitingInput;
                    return Ok(());
                }
                Readiness::Quiet => {
                    debug!(sent, total, "engine quiet, assuming ready");
                    self.state = SessionState::AwaitingInput;
                    return Ok(());
                }
                Readiness::Finished => {
                    debug!(sent, total, "engine reported finish");
                    self.finish_seen = true;
                    self.at_prompt = true;
                    self.state = SessionState::AwaitingInput;
                    return Ok(());
                }
                Readiness::Error(line) => {
                    return Err(self.fail(format!("engine reported an error: {line}")));
                }
                Readiness::Pending => {}
            }

            if let Some(status) = self.poll_exit() {
                if let Readiness::Error(line) = self.pump(None, &mut step) {
                    return Err(self.fail(format!("engine reported an error: {line}")));
                }
                if sent == total && status.success() {
                    info!("engine exited after the final command");
                    self.state = SessionState::Completed;
                    return Ok(());
                }
                return Err(self.fail(format!(
                    "engine exited with {status} after {sent} of {total} commands"
                )));
            }

            if step_started.elapsed() >= self.options.step_timeout {
                return Err(self.time_out(sent, total));
            }
        }
    }

    /// Absorb `first` and everything else already received, assessing after
    /// each chunk.
    ///
    /// Returns the first decisive verdict, except that an error anywhere wins.
    fn pump(&mut self, first: Option<Chunk>, step: &mut StepOutput) -> Readiness {
        let mut verdict = Readiness::Pending;
        let mut next = first.or_else(|| self.output.try_recv().ok());
        while let Some(chunk) = next {
            step.push(&chunk.text);
            if self.log_output {
                self.transcript.record_output(chunk.stream, &chunk.text);
            }
            match self.detector.assess(&step.window(Duration::ZERO)) {
                Readiness::Error(line) => return Readiness::Error(line),
                Readiness::Pending => {}
                decided if verdict == Readiness::Pending => verdict = decided,
                _ => {}
            }
            next = self.output.try_recv().ok();
        }
        verdict
    }

    fn poll_exit(&mut self) -> Option<ExitStatus> {
        if let Some(status) = self.exit_status {
            return Some(status);
        }
        let child = self.child.as_mut()?;
        match child.try_wait() {
            Ok(Some(status)) => {
                self.exit_status = Some(status);
                Some(status)
            }
            Ok(None) => None,
            Err(err) => {
                warn!(err = %err, "failed to poll engine status");
                None
            }
        }
    }

    fn fail(&mut self, reason: String) -> RunError {
        warn!(reason = %reason, "engine session failed");
        self.transcript.note(&reason);
        self.state = SessionState::Failed;
        self.terminate();
        RunError::ProtocolFailure {
            reason,
            transcript_tail: self.transcript.tail(TRANSCRIPT_TAIL_LINES),
        }
    }

    fn time_out(&mut self, sent: usize, total: usize) -> RunError {
        let timeout = self.options.step_timeout;
        warn!(
            timeout_secs = timeout.as_secs_f64(),
            sent, total, "engine not ready in time, killing"
        );
        self.transcript
            .note(&format!("no readiness within {timeout:?}, terminating"));
        self.state = SessionState::TimedOut;
        self.terminate();
        RunError::ProtocolTimeout {
            timeout,
            sent,
            total,
            transcript_tail: self.transcript.tail(TRANSCRIPT_TAIL_LINES),
        }
    }

    /// Close stdin, kill the engine's process group and reap the child.
    /// Returns false if already released.
    fn release_process(&mut self) -> bool {
        self.stdin.take();
        let Some(mut child) = self.child.take() else {
            return false;
        };
        // Helpers started by a driver script may outlive it and hold the pipes.
        kill_process_group(child.id());
        match child.try_wait() {
            Ok(Some(status)) => {
                self.exit_status.get_or_insert(status);
            }
            _ => {
                if let Err(err) = child.kill()
                    && err.kind() != ErrorKind::InvalidInput
                {
                    warn!(err = %err, "failed to kill engine");
                }
                match child.wait() {
                    Ok(status) => {
                        self.exit_status.get_or_insert(status);
                    }
                    Err(err) => warn!(err = %err, "failed to reap engine"),
                }
            }
        }
        // Reader threads end on their own once every writer of the pipes is gone.
        true
    }
}

impl<D: ReadinessDetector> Drop for ProcessSession<D> {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Kill every process in the group led by `pid`.
///
/// The workspace forbids `unsafe`, so the signal goes through `kill(1)`.
#[cfg(unix)]
fn kill_process_group(pid: u32) {
    let status = Command::new("kill")
        .args(["-KILL", "--", &format!("-{pid}")])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    match status {
        Ok(status) if status.success() => debug!(pgid = pid, "killed engine process group"),
        // The group is already gone when every member has exited.
        Ok(_) => {}
        Err(err) => warn!(err = %err, "failed to run kill for engine process group"),
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

fn spawn_reader<R: Read + Send + 'static>(mut reader: R, stream: Stream, tx: Sender<Chunk>) {
    thread::spawn(move || {
        let mut buf = [0u8; READ_CHUNK_BYTES];
        // Bytes of a multi-byte character split across reads.
        let mut pending: Vec<u8> = Vec::new();
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    pending.extend_from_slice(&buf[..n]);
                    let complete = utf8_complete_len(&pending);
                    if complete == 0 {
                        continue;
                    }
                    let text = String::from_utf8_lossy(&pending[..complete]).into_owned();
                    pending.drain(..complete);
                    if tx.send(Chunk { stream, text }).is_err() {
                        return;
                    }
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => {
                    warn!(err = %err, ?stream, "engine output read failed");
                    break;
                }
            }
        }
        if !pending.is_empty() {
            let text = String::from_utf8_lossy(&pending).into_owned();
            let _ = tx.send(Chunk { stream, text });
        }
    });
}

/// Length of `bytes` without a trailing, possibly incomplete UTF-8 sequence.
fn utf8_complete_len(bytes: &[u8]) -> usize {
    for back in 1..=bytes.len().min(3) {
        let idx = bytes.len() - back;
        let byte = bytes[idx];
        if byte & 0xC0 == 0x80 {
            continue;
        }
        let width = match byte {
            0xF0.. => 4,
            0xE0.. => 3,
            0xC0.. => 2,
            _ => 1,
        };
        return if width > back { idx } else { bytes.len() };
    }
    bytes.len()
}

/// Largest char boundary of `text` not beyond `max`.
fn floor_char_boundary(text: &str, max: usize) -> usize {
    if max >= text.len() {
        return text.len();
    }
    let mut idx = max;
    while !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;

    #[test]
    fn transcript_splits_lines_per_stream_and_counts_sends() {
        let mut transcript = Transcript::default();
        transcript.record_sent("3");
        transcript.record_output(Stream::Stdout, "line one\nline ");
        transcript.record_output(Stream::Stderr, "warn\r\n");
        transcript.record_output(Stream::Stdout, "two\nYour choice: ");
        transcript.record_sent("1");

        assert_eq!(transcript.send_count(), 2);
        assert_eq!(
            transcript.render(),
            "> 3\n  line one\n! warn\n  line two\n  Your choice: \n> 1\n"
        );
    }

    #[test]
    fn tail_keeps_last_lines() {
        let mut transcript = Transcript::default();
        for token in ["1", "2", "3", "4"] {
            transcript.record_sent(token);
        }
        assert_eq!(transcript.tail(2), "> 3\n> 4");
        assert_eq!(transcript.tail(10).lines().count(), 4);
    }

    #[test]
    fn transcript_stops_keeping_output_at_the_limit() {
        let mut transcript = Transcript::with_limit(10);
        transcript.record_sent("4");
        transcript.record_output(Stream::Stdout, "12345\n");
        transcript.record_output(Stream::Stdout, "abcdefgh\n");
        transcript.record_output(Stream::Stdout, "dropped\n");
        transcript.record_sent("0");
        transcript.close();

        assert_eq!(transcript.truncated(), 5 + 8);
        assert_eq!(transcript.send_count(), 2);
        assert_eq!(
            transcript.render(),
            "> 4\n  12345\n  abcd\n> 0\n# output truncated 13 bytes\n"
        );
    }

    #[test]
    fn step_window_stays_bounded() {
        let mut step = StepOutput::default();
        let line = "é".repeat(100) + "\n";
        for _ in 0..1_000 {
            step.push(&line);
        }
        step.push("Your choice: ");
        assert!(step.tail.len() <= MATCH_WINDOW_BYTES);
        assert!(step.tail.ends_with("Your choice: "));
    }

    struct SplitReader {
        reads: VecDeque<Vec<u8>>,
    }

    impl Read for SplitReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let Some(next) = self.reads.pop_front() else {
                return Ok(0);
            };
            buf[..next.len()].copy_from_slice(&next);
            Ok(next.len())
        }
    }

    #[test]
    fn reader_keeps_characters_split_across_reads() {
        let bytes = "T = 1200 °C\n".as_bytes();
        let split = bytes.iter().position(|&byte| byte == 0xC2).expect("degree sign") + 1;
        let reader = SplitReader {
            reads: [bytes[..split].to_vec(), bytes[split..].to_vec()].into(),
        };
        let (tx, rx) = mpsc::channel();
        spawn_reader(reader, Stream::Stdout, tx);

        let text: String = rx.iter().map(|chunk| chunk.text).collect();
        assert_eq!(text, "T = 1200 °C\n");
    }

    #[test]
    fn complete_len_holds_back_only_an_unfinished_sequence() {
        assert_eq!(utf8_complete_len(b"abc"), 3);
        assert_eq!(utf8_complete_len("aé".as_bytes()), 3);
        assert_eq!(utf8_complete_len(&[b'a', 0xC3]), 1);
        assert_eq!(utf8_complete_len(&[b'a', 0xE2, 0x82]), 1);
        assert_eq!(utf8_complete_len(&[0xF0, 0x9F, 0x98]), 0);
        assert_eq!(utf8_complete_len(&[0xF0, 0x9F, 0x98, 0x80]), 4);
    }

    #[test]
    fn terminal_states() {
        assert!(SessionState::Completed.is_terminal());
        assert!(SessionState::TimedOut.is_terminal());
        assert!(!SessionState::AwaitingInput.is_terminal());
    }
}
