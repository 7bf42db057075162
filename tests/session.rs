// ABOUTME: Integration tests for the session engine against an in-memory opener.
// ABOUTME: Covers lifecycle transitions, relays, interception, and teardown.

mod support;

use beach::diagnostics::WarningKind;
use beach::session::{
    CloseReason, ConnectError, ConnectRequest, INPUT_QUEUE_CAPACITY, PipeSetupError,
    RelayKind, RelayOutcome, RemoteStream, Session, SessionConfig, SessionError, SessionState,
    Submission, input_queue,
};
use beach::types::Target;
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use support::{Failure, RecordingSink, StubConnector};
use tokio::sync::mpsc::error::TrySendError;

fn request(target: &str) -> ConnectRequest {
    ConnectRequest::new(Target::parse(target).unwrap(), SecretString::from("hunter2"))
}

fn session(sink: &Arc<RecordingSink>) -> Session {
    support::init_tracing();
    Session::new(SessionConfig::default(), sink.clone())
}

mod lifecycle {
    use super::*;

    #[tokio::test]
    async fn remote_end_of_output_closes_after_all_relays_finish() {
        let sink = Arc::new(RecordingSink::default());
        let connector = StubConnector::new();
        let mut session = session(&sink);

        session.connect(&connector, request("alice@example.com")).await.unwrap();
        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(session.relays_started(), 3);

        let mut remote = connector.stats.take_remote();
        for i in 0..3 {
            remote.say(&format!("line {i}")).await;
        }
        remote.hang_up_stdout();

        let reason = session.wait_for_close().await;
        assert_eq!(reason, CloseReason::RemoteClosed);
        assert_eq!(session.state(), SessionState::Closing);

        let lines = sink.wait_for(3).await;
        let texts: Vec<_> = lines.iter().map(|(_, l)| l.as_str()).collect();
        assert_eq!(texts, ["line 0", "line 1", "line 2"]);

        let report = session.close(reason).await.unwrap();
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(report.relays.len(), 3);
        assert_eq!(report.reason, CloseReason::RemoteClosed);
        let output = report
            .relays
            .iter()
            .find(|exit| exit.kind == RelayKind::OutputReader)
            .unwrap();
        assert_eq!(output.outcome, RelayOutcome::Finished);

        assert_eq!(
            session.transitions(),
            [
                SessionState::Idle,
                SessionState::Connecting,
                SessionState::Authenticated,
                SessionState::Active,
                SessionState::Closing,
                SessionState::Closed,
            ]
        );
        assert_eq!(connector.stats.shell_closes(), 1);
        assert_eq!(connector.stats.connection_closes(), 1);
    }

    #[tokio::test]
    async fn rejected_open_fails_without_starting_relays() {
        let sink = Arc::new(RecordingSink::default());
        let connector = StubConnector::failing(Failure::Open);
        let mut session = session(&sink);

        let err = session
            .connect(&connector, request("alice@example.com"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SessionError::Connect(ConnectError::AuthenticationRejected(_))
        ));
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(session.relays_started(), 0);
        assert_eq!(
            session.transitions(),
            [SessionState::Idle, SessionState::Connecting, SessionState::Failed]
        );
    }

    #[tokio::test]
    async fn slow_open_times_out() {
        let sink = Arc::new(RecordingSink::default());
        let connector = StubConnector::failing(Failure::Hang);
        support::init_tracing();
        let config = SessionConfig::default().connect_timeout(Duration::from_millis(50));
        let mut session = Session::new(config, sink.clone());

        let err = session
            .connect(&connector, request("alice@example.com"))
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::Connect(ConnectError::Timeout(_))));
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(session.relays_started(), 0);
    }

    #[tokio::test]
    async fn failed_session_cannot_connect_again() {
        let sink = Arc::new(RecordingSink::default());
        let mut session = session(&sink);
        session
            .connect(&StubConnector::failing(Failure::Open), request("a@b"))
            .await
            .unwrap_err();

        let err = session
            .connect(&StubConnector::new(), request("a@b"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::InvalidTransition {
                from: SessionState::Failed,
                to: SessionState::Connecting
            }
        ));
    }

    #[tokio::test]
    async fn subscribers_observe_state_changes() {
        let sink = Arc::new(RecordingSink::default());
        let mut session = session(&sink);
        let rx = session.subscribe();
        assert_eq!(*rx.borrow(), SessionState::Idle);

        session.connect(&StubConnector::new(), request("a@b")).await.unwrap();
        assert_eq!(*rx.borrow(), SessionState::Active);

        session.close(CloseReason::UserExit).await.unwrap();
        assert_eq!(*rx.borrow(), SessionState::Closed);
    }
}

mod setup_failures {
    use super::*;

    async fn connect_with(failure: Failure) -> (Session, StubConnector, SessionError) {
        let sink = Arc::new(RecordingSink::default());
        let connector = StubConnector::failing(failure);
        let mut session = session(&sink);
        let err = session
            .connect(&connector, request("alice@example.com"))
            .await
            .unwrap_err();
        (session, connector, err)
    }

    #[tokio::test]
    async fn channel_refusal_closes_the_connection() {
        let (session, connector, err) = connect_with(Failure::NewSession).await;

        assert!(matches!(err, SessionError::PipeSetup(PipeSetupError::Channel(_))));
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(session.relays_started(), 0);
        assert_eq!(connector.stats.shell_closes(), 0);
        assert_eq!(connector.stats.connection_closes(), 1);
    }

    #[tokio::test]
    async fn pipe_failure_closes_shell_and_connection() {
        let (session, connector, err) = connect_with(Failure::Pipes).await;

        assert!(matches!(err, SessionError::PipeSetup(PipeSetupError::Pipe { .. })));
        assert_eq!(session.relays_started(), 0);
        assert_eq!(connector.stats.shell_closes(), 1);
        assert_eq!(connector.stats.connection_closes(), 1);
    }

    #[tokio::test]
    async fn shell_request_failure_closes_shell_and_connection() {
        let (session, connector, err) = connect_with(Failure::RequestShell).await;

        assert!(matches!(err, SessionError::PipeSetup(PipeSetupError::Shell(_))));
        assert_eq!(
            session.transitions(),
            [
                SessionState::Idle,
                SessionState::Connecting,
                SessionState::Authenticated,
                SessionState::Failed,
            ]
        );
        assert_eq!(session.relays_started(), 0);
        assert_eq!(connector.stats.shell_closes(), 1);
        assert_eq!(connector.stats.connection_closes(), 1);
    }
}

mod input {
    use super::*;

    #[tokio::test]
    async fn alice_lists_prints_and_exits() {
        let sink = Arc::new(RecordingSink::default());
        let connector = StubConnector::new();
        let mut session = session(&sink);
        session.connect(&connector, request("alice@example.com")).await.unwrap();
        let mut remote = connector.stats.take_remote();

        assert_eq!(session.submit("ls").await.unwrap(), Submission::Sent);
        assert_eq!(session.submit("pwd").await.unwrap(), Submission::Sent);
        assert_eq!(session.submit("exit").await.unwrap(), Submission::Exit);
        assert_eq!(session.state(), SessionState::Closing);

        assert_eq!(remote.read_line().await.as_deref(), Some("ls"));
        assert_eq!(remote.read_line().await.as_deref(), Some("pwd"));

        let report = session.close(CloseReason::UserExit).await.unwrap();
        assert_eq!(report.reason, CloseReason::UserExit);
        assert_eq!(report.target, Some(Target::parse("alice@example.com").unwrap()));
        assert!(report.warnings.is_empty());

        // `exit` never reached the remote shell.
        assert_eq!(remote.read_line().await, None);
    }

    #[tokio::test]
    async fn exit_makes_wait_for_close_return_immediately() {
        let sink = Arc::new(RecordingSink::default());
        let mut session = session(&sink);
        session.connect(&StubConnector::new(), request("a@b")).await.unwrap();

        session.submit("  exit ").await.unwrap();
        assert_eq!(session.wait_for_close().await, CloseReason::UserExit);
    }

    #[tokio::test]
    async fn hist_is_answered_locally() {
        let sink = Arc::new(RecordingSink::default());
        let connector = StubConnector::new();
        let mut session = session(&sink);
        session.connect(&connector, request("a@b")).await.unwrap();
        let mut remote = connector.stats.take_remote();

        session.submit("ls").await.unwrap();
        session.submit("").await.unwrap();
        session.submit("pwd").await.unwrap();
        let shown = session.submit("hist").await.unwrap();

        assert_eq!(
            shown,
            Submission::History("User cmd history:\n(1) pwd\n(2) ls\n".to_string())
        );
        assert_eq!(remote.read_line().await.as_deref(), Some("ls"));
        assert_eq!(remote.read_line().await.as_deref(), Some(""));
        assert_eq!(remote.read_line().await.as_deref(), Some("pwd"));
        assert_eq!(session.history().len(), 2);
    }

    #[tokio::test]
    async fn history_keeps_the_last_five_commands() {
        let sink = Arc::new(RecordingSink::default());
        let mut session = session(&sink);
        session.connect(&StubConnector::new(), request("a@b")).await.unwrap();

        for cmd in ["c1", "c2", "c3", "c4", "c5", "c6"] {
            session.submit(cmd).await.unwrap();
        }

        let entries: Vec<_> = session.history().entries().collect();
        assert_eq!(entries, ["c6", "c5", "c4", "c3", "c2"]);
    }

    #[tokio::test]
    async fn submit_requires_an_active_session() {
        let sink = Arc::new(RecordingSink::default());
        let mut session = session(&sink);

        let err = session.submit("ls").await.unwrap_err();
        assert!(matches!(err, SessionError::NotActive(SessionState::Idle)));
    }

    #[tokio::test]
    async fn submit_waits_while_the_remote_is_not_reading() {
        let sink = Arc::new(RecordingSink::default());
        // Room for exactly one "cmd\n" in the pipe.
        let connector = StubConnector::new().pipe_capacity(4);
        let mut session = session(&sink);
        session.connect(&connector, request("a@b")).await.unwrap();
        let mut remote = connector.stats.take_remote();

        for _ in 0..INPUT_QUEUE_CAPACITY {
            session.submit("cmd").await.unwrap();
        }
        // The writer holds a few more; keep going until the queue is full.
        let mut accepted = INPUT_QUEUE_CAPACITY;
        loop {
            match tokio::time::timeout(Duration::from_millis(100), session.submit("cmd")).await {
                Ok(sent) => {
                    sent.unwrap();
                    accepted += 1;
                    assert!(accepted <= INPUT_QUEUE_CAPACITY + 3, "queue never filled");
                }
                Err(_) => break,
            }
        }

        let mut blocked = Box::pin(session.submit("cmd"));
        assert!(
            tokio::time::timeout(Duration::from_millis(100), &mut blocked)
                .await
                .is_err()
        );

        assert_eq!(remote.read_line().await.as_deref(), Some("cmd"));
        let sent = tokio::time::timeout(Duration::from_secs(5), blocked)
            .await
            .expect("submit stayed blocked after the remote read")
            .unwrap();
        assert_eq!(sent, Submission::Sent);
    }

    #[tokio::test]
    async fn input_queue_holds_at_most_ten_pending_chunks() {
        let (tx, mut rx) = input_queue(INPUT_QUEUE_CAPACITY);

        for i in 0..INPUT_QUEUE_CAPACITY {
            tx.try_send(format!("cmd {i}\n").into()).unwrap();
        }
        assert!(matches!(
            tx.try_send("one too many\n".into()),
            Err(TrySendError::Full(_))
        ));

        assert_eq!(rx.recv().await.unwrap(), "cmd 0\n");
        tx.try_send("now it fits\n".into()).unwrap();
    }
}

mod output {
    use super::*;

    #[tokio::test]
    async fn read_error_closes_the_session() {
        let sink = Arc::new(RecordingSink::default());
        let connector = StubConnector::failing(Failure::StdoutError);
        let mut session = session(&sink);
        session.connect(&connector, request("a@b")).await.unwrap();

        let reason = tokio::time::timeout(Duration::from_secs(5), session.wait_for_close())
            .await
            .unwrap();
        assert!(matches!(reason, CloseReason::RelayFailed(_)), "got {reason:?}");
        assert_eq!(session.state(), SessionState::Closing);

        let report = session.close(reason).await.unwrap();
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(report.relays.len(), 3);
        let output = report
            .relays
            .iter()
            .find(|exit| exit.kind == RelayKind::OutputReader)
            .unwrap();
        assert!(matches!(output.outcome, RelayOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn write_error_leaves_the_session_active() {
        let sink = Arc::new(RecordingSink::default());
        let connector = StubConnector::new();
        let mut session = session(&sink);
        session.connect(&connector, request("a@b")).await.unwrap();
        let mut remote = connector.stats.take_remote();
        remote.hang_up_stdin();

        assert_eq!(session.submit("ls").await.unwrap(), Submission::Sent);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(session.state(), SessionState::Active);

        // The writer is gone, so further input has nowhere to go.
        assert!(matches!(
            session.submit("pwd").await,
            Err(SessionError::InputClosed)
        ));
        assert_eq!(session.state(), SessionState::Active);

        let report = session.close(CloseReason::UserExit).await.unwrap();
        let writer = report
            .relays
            .iter()
            .find(|exit| exit.kind == RelayKind::InputWriter)
            .unwrap();
        assert!(matches!(writer.outcome, RelayOutcome::Failed(_)), "got {:?}", writer.outcome);
    }

    #[tokio::test]
    async fn streams_are_relayed_separately() {
        let sink = Arc::new(RecordingSink::default());
        let connector = StubConnector::new();
        let mut session = session(&sink);
        session.connect(&connector, request("a@b")).await.unwrap();
        let mut remote = connector.stats.take_remote();

        remote.complain("permission denied").await;
        sink.wait_for(1).await;
        remote.say("total 0").await;
        let lines = sink.wait_for(2).await;

        assert_eq!(
            lines,
            [
                (RemoteStream::Stderr, "permission denied".to_string()),
                (RemoteStream::Stdout, "total 0".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn stderr_ending_does_not_close_the_session() {
        let sink = Arc::new(RecordingSink::default());
        let connector = StubConnector::new();
        let mut session = session(&sink);
        session.connect(&connector, request("a@b")).await.unwrap();
        let mut remote = connector.stats.take_remote();

        remote.hang_up_stderr();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(session.state(), SessionState::Active);

        session.submit("still here").await.unwrap();
        assert_eq!(remote.read_line().await.as_deref(), Some("still here"));
    }
}

mod teardown {
    use super::*;

    #[tokio::test]
    async fn close_failures_become_warnings() {
        let sink = Arc::new(RecordingSink::default());
        let connector = StubConnector::failing(Failure::CloseShell);
        let mut session = session(&sink);
        session.connect(&connector, request("a@b")).await.unwrap();

        let report = session.close(CloseReason::UserExit).await.unwrap();

        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].kind, WarningKind::ShellClose);
        assert_eq!(connector.stats.connection_closes(), 1);
    }

    #[tokio::test]
    async fn connection_close_failure_is_reported() {
        let sink = Arc::new(RecordingSink::default());
        let connector = StubConnector::failing(Failure::CloseConnection);
        let mut session = session(&sink);
        session.connect(&connector, request("a@b")).await.unwrap();

        let report = session.close(CloseReason::InputEnded).await.unwrap();

        assert_eq!(report.reason, CloseReason::InputEnded);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].kind, WarningKind::ConnectionClose);
    }

    #[tokio::test]
    async fn close_cancels_idle_relays() {
        let sink = Arc::new(RecordingSink::default());
        let connector = StubConnector::new();
        let mut session = session(&sink);
        session.connect(&connector, request("a@b")).await.unwrap();
        // Remote ends stay open, so every relay is blocked when closing starts.
        let _remote = connector.stats.take_remote();

        let report = session.close(CloseReason::UserExit).await.unwrap();

        assert_eq!(report.relays.len(), 3);
        for exit in &report.relays {
            match exit.kind {
                // Cancellation and the dropped queue race; either way it stopped.
                RelayKind::InputWriter => assert!(matches!(
                    exit.outcome,
                    RelayOutcome::Cancelled | RelayOutcome::Finished
                )),
                _ => assert_eq!(exit.outcome, RelayOutcome::Cancelled),
            }
        }
    }

    #[tokio::test]
    async fn closing_twice_is_rejected() {
        let sink = Arc::new(RecordingSink::default());
        let mut session = session(&sink);
        session.connect(&StubConnector::new(), request("a@b")).await.unwrap();
        session.close(CloseReason::UserExit).await.unwrap();

        let err = session.close(CloseReason::UserExit).await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidTransition { .. }));
    }
}
