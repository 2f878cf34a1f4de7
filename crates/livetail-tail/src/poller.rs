use std::io::{self, Write};
use std::time::Duration;

use livetail_api::{ApiError, LiveTailApi, PollResponse, SessionId};
use livetail_types::{Severity, UserSignal};
use tokio_util::sync::CancellationToken;

use crate::state::{PollError, StopReason, TailState};

/// Timing of the poll loop
#[derive(Clone, Debug)]
pub struct TailConfig {
    /// Pause between two polls, independent of how long a poll took
    pub poll_interval: Duration,
    /// Pause between creating the session and the first poll, giving the
    /// server's engine time to start
    pub startup_delay: Duration,
    /// Longest wait for the session delete before giving up on it
    pub delete_timeout: Duration,
}

impl Default for TailConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            startup_delay: Duration::from_secs(2),
            delete_timeout: Duration::from_secs(5),
        }
    }
}

/// Summary of a finished session
#[derive(Debug)]
pub struct TailReport {
    pub session: SessionId,
    /// Offset the next poll would have asked for
    pub offset: u64,
    pub polls: u64,
    pub stop: StopReason,
}

impl TailReport {
    pub fn state(&self) -> TailState {
        self.stop.state()
    }
}

/// Drives one Live Tail session from creation to deletion
pub struct LiveTail<'a, A: LiveTailApi + ?Sized> {
    api: &'a A,
    config: TailConfig,
}

impl<'a, A: LiveTailApi + ?Sized> LiveTail<'a, A> {
    pub fn new(api: &'a A, config: TailConfig) -> Self {
        Self { api, config }
    }

    /// Create a session for `filter`, print its messages to `out` until it
    /// stops, then delete it.
    ///
    /// Only a failed creation is returned as an error. Every other way the
    /// loop can end is reported through [`TailReport::stop`], after the
    /// session has been deleted.
    pub async fn run<W: Write>(
        &self,
        filter: Option<&str>,
        out: &mut W,
        cancel: &CancellationToken,
    ) -> Result<TailReport, ApiError> {
        let session = self.api.create_session(filter).await?;
        tracing::debug!(session = %session, "Live Tail session created");

        let mut progress = Progress::default();
        let stop = self.poll_until_stopped(&session, &mut progress, out, cancel).await;
        progress.state = stop.state();
        tracing::debug!(
            session = %session,
            state = ?progress.state,
            offset = progress.offset,
            polls = progress.polls,
            "Poll loop stopped"
        );

        self.close(&session).await;

        Ok(TailReport {
            session,
            offset: progress.offset,
            polls: progress.polls,
            stop,
        })
    }

    async fn poll_until_stopped<W: Write>(
        &self,
        session: &SessionId,
        progress: &mut Progress,
        out: &mut W,
        cancel: &CancellationToken,
    ) -> StopReason {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return StopReason::Interrupted,
            _ = tokio::time::sleep(self.config.startup_delay) => {}
        }

        tracing::info!("Starting Live Tail session");

        loop {
            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => return StopReason::Interrupted,
                response = self.api.latest(session, progress.offset) => response,
            };
            progress.polls += 1;

            let step = match response {
                Ok(response) => progress
                    .apply(response, out)
                    .unwrap_or_else(|e| Step::Stop(StopReason::Fatal(PollError::Output(e)))),
                Err(e) => Step::Stop(StopReason::from_api_error(e)),
            };

            if let Step::Stop(reason) = step {
                return reason;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return StopReason::Interrupted,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }

    /// Best effort: the run ends the same way whether or not this succeeds
    async fn close(&self, session: &SessionId) {
        tracing::info!("Ending the Live Tail session");
        let deleted =
            tokio::time::timeout(self.config.delete_timeout, self.api.delete_session(session))
                .await;
        match deleted {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(session = %session, error = %e, "Failed to delete Live Tail session");
            }
            Err(_) => {
                tracing::warn!(
                    session = %session,
                    timeout = ?self.config.delete_timeout,
                    "Gave up waiting for the Live Tail session delete"
                );
            }
        }
    }
}

enum Step {
    Continue,
    Stop(StopReason),
}

/// Cursor of a running session
#[derive(Debug)]
struct Progress {
    offset: u64,
    polls: u64,
    state: TailState,
}

impl Default for Progress {
    fn default() -> Self {
        Self {
            offset: 0,
            polls: 0,
            state: TailState::Polling,
        }
    }
}

impl Progress {
    /// Fold one poll response into the cursor and print its payloads
    fn apply<W: Write>(&mut self, response: PollResponse, out: &mut W) -> io::Result<Step> {
        let Some(state) = response.state else {
            return Ok(Step::Continue);
        };

        // Never move backwards, even if the server reports an older offset
        self.offset = self.offset.max(state.current_offset.saturating_add(1));

        for message in &state.user_messages {
            for signal in message.signals() {
                match signal {
                    UserSignal::RateLimit(Severity::Error) => {
                        return Ok(Step::Stop(StopReason::RateLimited));
                    }
                    UserSignal::RateLimit(Severity::Warning) => {
                        tracing::warn!(
                            "Your query is producing too many messages and will cause the \
                             session to end. Please add additional metadata fields to your \
                             query to make it more specific."
                        );
                    }
                    UserSignal::MaxRunningTime(Severity::Error) => {
                        return Ok(Step::Stop(StopReason::TimedOut));
                    }
                    _ => {}
                }
            }
        }

        if state.is_stopped {
            return Ok(Step::Stop(StopReason::SessionStopped));
        }

        for message in &response.messages {
            writeln!(out, "{}", message.payload)?;
        }
        out.flush()?;

        Ok(Step::Continue)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use livetail_types::{ServerMessage, SessionState, UserMessage};

    use super::*;

    #[derive(Clone, Debug, PartialEq, Eq)]
    enum Call {
        Create(Option<String>),
        Latest(SessionId, u64),
        Delete(SessionId),
    }

    /// Scripted API: answers polls from a queue and records every call
    struct FakeApi {
        create: Mutex<Option<Result<SessionId, ApiError>>>,
        polls: Mutex<VecDeque<Result<PollResponse, ApiError>>>,
        calls: Mutex<Vec<Call>>,
        delete_hangs: bool,
    }

    impl FakeApi {
        fn new(polls: Vec<Result<PollResponse, ApiError>>) -> Self {
            Self {
                create: Mutex::new(Some(Ok(SessionId::new("tail-1")))),
                polls: Mutex::new(polls.into()),
                calls: Mutex::new(Vec::new()),
                delete_hangs: false,
            }
        }

        fn failing_create(err: ApiError) -> Self {
            let api = Self::new(Vec::new());
            *api.create.lock().unwrap() = Some(Err(err));
            api
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn offsets(&self) -> Vec<u64> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    Call::Latest(_, offset) => Some(offset),
                    _ => None,
                })
                .collect()
        }
    }

    #[async_trait]
    impl LiveTailApi for FakeApi {
        async fn create_session(&self, filter: Option<&str>) -> Result<SessionId, ApiError> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Create(filter.map(str::to_string)));
            self.create
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Ok(SessionId::new("tail-1")))
        }

        async fn latest(
            &self,
            session: &SessionId,
            offset: u64,
        ) -> Result<PollResponse, ApiError> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Latest(session.clone(), offset));
            // An exhausted script ends the session so a broken loop cannot spin forever
            self.polls
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(stopped(u64::MAX - 1)))
        }

        async fn delete_session(&self, session: &SessionId) -> Result<(), ApiError> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Delete(session.clone()));
            if self.delete_hangs {
                std::future::pending::<()>().await;
            }
            Ok(())
        }
    }

    fn instant() -> TailConfig {
        TailConfig {
            poll_interval: Duration::ZERO,
            startup_delay: Duration::ZERO,
            delete_timeout: Duration::from_secs(5),
        }
    }

    fn empty() -> PollResponse {
        PollResponse {
            state: None,
            messages: vec![ServerMessage::new("never printed")],
        }
    }

    fn batch(current_offset: u64, payloads: &[&str]) -> PollResponse {
        PollResponse {
            state: Some(SessionState {
                current_offset,
                ..Default::default()
            }),
            messages: payloads.iter().map(|p| ServerMessage::new(*p)).collect(),
        }
    }

    fn with_signal(current_offset: u64, signal: UserSignal, payloads: &[&str]) -> PollResponse {
        let mut response = batch(current_offset, payloads);
        if let Some(state) = response.state.as_mut() {
            state.user_messages.push(UserMessage::with_signal(signal));
        }
        response
    }

    fn stopped(current_offset: u64) -> PollResponse {
        let mut response = batch(current_offset, &["after stop"]);
        if let Some(state) = response.state.as_mut() {
            state.is_stopped = true;
        }
        response
    }

    fn malformed() -> ApiError {
        ApiError::MalformedBody(serde_json::from_str::<serde_json::Value>("<html>").unwrap_err())
    }

    async fn run(api: &FakeApi, filter: Option<&str>) -> (TailReport, String) {
        let mut out = Vec::new();
        let report = LiveTail::new(api, instant())
            .run(filter, &mut out, &CancellationToken::new())
            .await
            .unwrap();
        (report, String::from_utf8(out).unwrap())
    }

    #[tokio::test]
    async fn test_offsets_follow_server_cursor() {
        let api = FakeApi::new(vec![
            Ok(empty()),
            Ok(batch(4, &["a", "b"])),
            Ok(empty()),
            Ok(batch(9, &["c"])),
            Ok(stopped(10)),
        ]);

        let (report, out) = run(&api, Some("_sourceCategory=prod")).await;

        assert_eq!(api.offsets(), vec![0, 0, 5, 5, 10]);
        assert_eq!(out, "a\nb\nc\n");
        assert_eq!(report.state(), TailState::StoppedTimeout);
        assert_eq!(report.offset, 11);
        assert_eq!(report.polls, 5);
    }

    #[tokio::test]
    async fn test_session_id_used_for_every_call() {
        let api = FakeApi::new(vec![Ok(batch(0, &["x"])), Ok(stopped(1))]);

        let (report, _) = run(&api, None).await;

        let calls = api.calls();
        assert_eq!(calls.first(), Some(&Call::Create(None)));
        assert_eq!(calls.last(), Some(&Call::Delete(report.session.clone())));
        assert!(calls[1..calls.len() - 1]
            .iter()
            .all(|c| matches!(c, Call::Latest(id, _) if *id == report.session)));
        assert_eq!(
            calls.iter().filter(|c| matches!(c, Call::Delete(_))).count(),
            1
        );
    }

    #[tokio::test]
    async fn test_offset_never_moves_backwards() {
        let api = FakeApi::new(vec![Ok(batch(10, &[])), Ok(batch(3, &[])), Ok(stopped(12))]);

        run(&api, None).await;

        assert_eq!(api.offsets(), vec![0, 11, 11]);
    }

    #[tokio::test]
    async fn test_rate_limit_error_stops_and_deletes() {
        let api = FakeApi::new(vec![
            Ok(batch(0, &["first"])),
            Ok(with_signal(1, UserSignal::RateLimit(Severity::Error), &["dropped"])),
            Ok(batch(2, &["unreachable"])),
        ]);

        let (report, out) = run(&api, None).await;

        assert_eq!(report.state(), TailState::StoppedRateLimit);
        assert_eq!(out, "first\n");
        assert_eq!(api.offsets(), vec![0, 1]);
        assert_eq!(api.calls().last(), Some(&Call::Delete(SessionId::new("tail-1"))));
    }

    #[tokio::test]
    async fn test_rate_limit_warning_keeps_polling() {
        let api = FakeApi::new(vec![
            Ok(with_signal(0, UserSignal::RateLimit(Severity::Warning), &["kept"])),
            Ok(stopped(1)),
        ]);

        let (report, out) = run(&api, None).await;

        assert_eq!(out, "kept\n");
        assert_eq!(report.polls, 2);
        assert_eq!(report.state(), TailState::StoppedTimeout);
    }

    #[tokio::test]
    async fn test_max_running_time_error_times_out() {
        let api = FakeApi::new(vec![Ok(with_signal(
            7,
            UserSignal::MaxRunningTime(Severity::Error),
            &["dropped"],
        ))]);

        let (report, out) = run(&api, None).await;

        assert!(matches!(report.stop, StopReason::TimedOut));
        assert_eq!(report.state(), TailState::StoppedTimeout);
        assert!(out.is_empty());
        assert_eq!(report.offset, 8);
    }

    #[tokio::test]
    async fn test_max_running_time_warning_is_ignored() {
        let api = FakeApi::new(vec![
            Ok(with_signal(0, UserSignal::MaxRunningTime(Severity::Warning), &["ok"])),
            Ok(stopped(1)),
        ]);

        let (_, out) = run(&api, None).await;

        assert_eq!(out, "ok\n");
    }

    #[tokio::test]
    async fn test_malformed_body_is_fatal() {
        let api = FakeApi::new(vec![Ok(batch(0, &["a"])), Err(malformed())]);

        let (report, out) = run(&api, None).await;

        assert!(matches!(report.stop, StopReason::Throttled(_)));
        assert_eq!(report.state(), TailState::StoppedFatal);
        assert_eq!(out, "a\n");
        assert_eq!(api.calls().last(), Some(&Call::Delete(SessionId::new("tail-1"))));
    }

    #[tokio::test]
    async fn test_error_status_stops_with_error() {
        let api = FakeApi::new(vec![Err(ApiError::Status {
            url: "latest".into(),
            status: 404,
        })]);

        let (report, _) = run(&api, None).await;

        assert_eq!(report.state(), TailState::StoppedError);
        assert!(matches!(api.calls().last(), Some(Call::Delete(_))));
    }

    #[tokio::test]
    async fn test_failed_create_makes_no_further_calls() {
        let api = FakeApi::failing_create(ApiError::Rejected("invalid query".into()));
        let mut out = Vec::new();

        let result = LiveTail::new(&api, instant())
            .run(Some("| bad"), &mut out, &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(ApiError::Rejected(_))));
        assert_eq!(api.calls(), vec![Call::Create(Some("| bad".into()))]);
    }

    #[tokio::test]
    async fn test_interrupt_still_deletes_session() {
        let api = FakeApi::new(vec![Ok(batch(0, &["a"]))]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut out = Vec::new();

        let report = LiveTail::new(&api, instant())
            .run(None, &mut out, &cancel)
            .await
            .unwrap();

        assert_eq!(report.state(), TailState::Interrupted);
        assert_eq!(report.polls, 0);
        assert_eq!(
            api.calls(),
            vec![Call::Create(None), Call::Delete(SessionId::new("tail-1"))]
        );
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_output_failure_is_fatal() {
        let api = FakeApi::new(vec![Ok(batch(0, &["a"]))]);

        let report = LiveTail::new(&api, instant())
            .run(None, &mut BrokenPipe, &CancellationToken::new())
            .await
            .unwrap();

        assert!(matches!(report.stop, StopReason::Fatal(PollError::Output(_))));
        assert!(matches!(api.calls().last(), Some(Call::Delete(_))));
    }

    #[tokio::test]
    async fn test_hanging_delete_is_abandoned() {
        let mut api = FakeApi::new(vec![Ok(stopped(0))]);
        api.delete_hangs = true;
        let config = TailConfig {
            delete_timeout: Duration::from_millis(20),
            ..instant()
        };
        let mut out = Vec::new();

        let report = tokio::time::timeout(
            Duration::from_secs(5),
            LiveTail::new(&api, config).run(None, &mut out, &CancellationToken::new()),
        )
        .await
        .expect("run should not wait for the delete forever")
        .unwrap();

        assert!(matches!(report.stop, StopReason::SessionStopped));
        assert!(matches!(api.calls().last(), Some(Call::Delete(_))));
    }
}
