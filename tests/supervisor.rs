//! Supervisor loop integration tests

use std::sync::Arc;
use std::time::Duration;

use cub_device::{Error, SessionEnd, SessionOutcome, Supervisor, Watchdog};

mod common;

use common::{
    FakeInput, FlakyProbe, RecordingIndicator, RecordingSpeech, ScriptedAnswers,
    ScriptedTranscriber, SessionScript, Signal, final_text, record,
};

struct Rig {
    supervisor: Supervisor<FakeInput, FlakyProbe>,
    input: FakeInput,
    probe: FlakyProbe,
    transcriber: Arc<ScriptedTranscriber>,
    indicator: Arc<RecordingIndicator>,
    speech: Arc<RecordingSpeech>,
}

fn rig(probe_failures: u32, sessions: Vec<SessionScript>, answers: ScriptedAnswers) -> Rig {
    rig_with_restart_delay(probe_failures, sessions, answers, Duration::from_millis(1))
}

fn rig_with_restart_delay(
    probe_failures: u32,
    sessions: Vec<SessionScript>,
    answers: ScriptedAnswers,
    restart_delay: Duration,
) -> Rig {
    let input = FakeInput::default();
    let probe = FlakyProbe::failing(probe_failures);
    let transcriber = Arc::new(ScriptedTranscriber::new(sessions));
    let indicator = Arc::new(RecordingIndicator::default());
    let speech = Arc::new(RecordingSpeech::default());

    let watchdog = Watchdog::new(probe.clone(), indicator.clone())
        .with_retry_interval(Duration::from_millis(1));
    let supervisor = Supervisor::new(
        input.clone(),
        watchdog,
        transcriber.clone(),
        Arc::new(answers),
        speech.clone(),
        indicator.clone(),
        "hey cub",
    )
    .with_restart_delay(restart_delay)
    .quiet();

    Rig {
        supervisor,
        input,
        probe,
        transcriber,
        indicator,
        speech,
    }
}

#[tokio::test]
async fn test_waits_for_network_before_listening() {
    let rig = rig(
        3,
        vec![SessionScript::Responses(vec![Err(Error::StreamLimitExceeded)])],
        ScriptedAnswers::default(),
    );

    let outcome = rig.supervisor.run_once().await;

    assert!(matches!(
        outcome,
        SessionOutcome::Completed(SessionEnd::LimitReached)
    ));
    assert_eq!(rig.probe.calls(), 4);
    assert_eq!(
        rig.indicator.signals(),
        vec![
            Signal::Reset,
            Signal::Pulse,
            Signal::Pulse,
            Signal::Pulse,
            Signal::Ready,
            Signal::Idle,
        ]
    );
    assert_eq!(rig.transcriber.opened(), 1);
}

#[tokio::test]
async fn test_microphone_released_after_session() {
    let rig = rig(
        0,
        vec![SessionScript::Responses(vec![final_text("exit")])],
        ScriptedAnswers::default(),
    );

    let outcome = rig.supervisor.run_once().await;

    assert!(matches!(
        outcome,
        SessionOutcome::Completed(SessionEnd::ExitRequested)
    ));
    assert_eq!(rig.input.opened(), 1);
    assert_eq!(rig.input.released(), 1);
}

#[tokio::test]
async fn test_fault_resets_lights() {
    let rig = rig(0, vec![SessionScript::OpenFails], ScriptedAnswers::default());

    let outcome = rig.supervisor.run_once().await;

    assert!(matches!(
        outcome,
        SessionOutcome::Faulted(Error::Transcription(_))
    ));
    assert_eq!(
        rig.indicator.signals(),
        vec![Signal::Reset, Signal::Ready, Signal::Reset]
    );
    assert_eq!(rig.input.released(), 1);
}

#[tokio::test]
async fn test_mid_session_fault_is_reported() {
    let rig = rig(
        0,
        vec![SessionScript::Responses(vec![
            final_text("hey cub"),
            Err(Error::Transcription("connection reset".to_string())),
        ])],
        ScriptedAnswers::default(),
    );

    let outcome = rig.supervisor.run_once().await;

    assert!(matches!(outcome, SessionOutcome::Faulted(_)));
    assert_eq!(rig.indicator.signals().last(), Some(&Signal::Reset));
}

#[tokio::test]
async fn test_sessions_restart_until_shutdown() {
    let rig = rig(
        0,
        vec![
            SessionScript::Responses(vec![Err(Error::StreamLimitExceeded)]),
            SessionScript::OpenFails,
            SessionScript::Responses(vec![
                final_text("hey cub"),
                final_text("what time is it"),
            ]),
        ],
        ScriptedAnswers::new(vec![Ok(record("what time is it", "it is noon", 95, 2))]),
    );

    // The fourth session has no script and stays open until shutdown
    rig.supervisor
        .run_until(tokio::time::sleep(Duration::from_millis(100)))
        .await;

    assert_eq!(rig.transcriber.opened(), 4);
    assert_eq!(rig.input.opened(), 4);
    assert_eq!(rig.input.released(), 4);
    assert_eq!(rig.speech.spoken(), vec!["it is noon"]);
    assert_eq!(rig.indicator.signals().last(), Some(&Signal::Reset));
}

#[tokio::test]
async fn test_repeated_faults_back_off() {
    let failures = (0..50).map(|_| SessionScript::OpenFails).collect();
    let rig = rig_with_restart_delay(
        0,
        failures,
        ScriptedAnswers::default(),
        Duration::from_millis(20),
    );

    // Restarts at roughly 0, 20, 60 and 140ms
    rig.supervisor
        .run_until(tokio::time::sleep(Duration::from_millis(150)))
        .await;

    let opened = rig.transcriber.opened();
    assert!(opened >= 2, "restarted only {opened} times");
    assert!(opened <= 5, "restarted {opened} times without backing off");
    assert_eq!(rig.input.released(), opened);
}

#[tokio::test]
async fn test_shutdown_interrupts_restart_delay() {
    let rig = rig_with_restart_delay(
        0,
        vec![SessionScript::OpenFails],
        ScriptedAnswers::default(),
        Duration::from_secs(3600),
    );

    tokio::time::timeout(
        Duration::from_secs(5),
        rig.supervisor
            .run_until(tokio::time::sleep(Duration::from_millis(50))),
    )
    .await
    .expect("shutdown should not wait for the restart delay");

    assert_eq!(rig.transcriber.opened(), 1);
    assert_eq!(rig.indicator.signals().last(), Some(&Signal::Reset));
}
