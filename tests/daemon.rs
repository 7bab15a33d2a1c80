//! Wake loop tests
//!
//! Drives the daemon's listening loop with scripted audio until the source closes

use homevoice::voice::DecodingProfile;
use homevoice::{Daemon, Error};

mod common;

use common::{
    Fakes, RecordingSink, ScriptedDialog, ScriptedSource, ScriptedTranscriber, loud, quiet,
    test_config,
};

#[tokio::test]
async fn test_inline_command_skips_cue_and_capture() {
    let config = test_config();
    let format = config.capture.format();
    let fakes = Fakes::new(
        ScriptedTranscriber::new(&["Megatron turn off the hallway light"], &[]),
        ScriptedDialog::new(&[
            r#"<HA_COMMAND>{"service": "light.turn_off", "entity_id": "light.hallway"}</HA_COMMAND>Done, hallway lights are off."#,
        ]),
    );
    let mut daemon = Daemon::with_services(config, fakes.services());
    let mut source = ScriptedSource::new(format).repeat(&loud(format), 2);
    let mut sink = RecordingSink::default();

    let err = daemon.listen(&mut source, &mut sink).await.unwrap_err();

    assert!(matches!(err, Error::DeviceClosed(_)));
    assert_eq!(daemon.turns(), 1);
    assert_eq!(sink.cues, 0);
    assert_eq!(sink.spoken(), vec!["Done, hallway lights are off."]);
    assert_eq!(fakes.dialog.user_texts(), vec!["turn off the hallway light"]);
    assert_eq!(fakes.home.services(), vec!["light/turn_off"]);
    assert_eq!(fakes.stt.profiles(), vec![DecodingProfile::Fast]);
}

#[tokio::test]
async fn test_bare_wake_word_cues_then_captures() {
    let config = test_config();
    let format = config.capture.format();
    let fakes = Fakes::new(
        ScriptedTranscriber::new(&["Megatron."], &["what time is it"]),
        ScriptedDialog::new(&["It is noon."]),
    );
    let mut daemon = Daemon::with_services(config, fakes.services());
    let mut source = ScriptedSource::new(format)
        .repeat(&loud(format), 2)
        .repeat(&loud(format), 1)
        .repeat(&quiet(format), 3);
    let mut sink = RecordingSink::default();

    daemon.listen(&mut source, &mut sink).await.unwrap_err();

    assert_eq!(sink.cues, 1);
    assert_eq!(daemon.turns(), 1);
    assert_eq!(sink.spoken(), vec!["It is noon."]);
    assert_eq!(fakes.dialog.user_texts(), vec!["what time is it"]);
    assert_eq!(
        fakes.stt.profiles(),
        vec![DecodingProfile::Fast, DecodingProfile::Accurate]
    );
    assert!(source.discards >= 2);
}

#[tokio::test]
async fn test_wake_word_followed_by_silence_is_not_a_turn() {
    let config = test_config();
    let format = config.capture.format();
    let fakes = Fakes::new(
        ScriptedTranscriber::new(&["Megatron."], &[""]),
        ScriptedDialog::new(&[]),
    );
    let mut daemon = Daemon::with_services(config, fakes.services());
    let mut source = ScriptedSource::new(format)
        .repeat(&loud(format), 2)
        .repeat(&loud(format), 1)
        .repeat(&quiet(format), 3);
    let mut sink = RecordingSink::default();

    daemon.listen(&mut source, &mut sink).await.unwrap_err();

    assert_eq!(sink.cues, 1);
    assert_eq!(daemon.turns(), 0);
    assert!(fakes.dialog.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_wake_hint_is_sent_with_fast_profile() {
    let config = test_config();
    let format = config.capture.format();
    let fakes = Fakes::new(ScriptedTranscriber::new(&[], &[]), ScriptedDialog::new(&[]));
    let mut daemon = Daemon::with_services(config, fakes.services());
    let mut source = ScriptedSource::new(format).repeat(&loud(format), 2);
    let mut sink = RecordingSink::default();

    daemon.listen(&mut source, &mut sink).await.unwrap_err();

    let calls = fakes.stt.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1, "Voice commands. Wake word is Megatron.");
}

#[tokio::test]
async fn test_missed_windows_never_reach_dialog() {
    let config = test_config();
    let format = config.capture.format();
    let fakes = Fakes::new(
        ScriptedTranscriber::new(&["hello there", "", "mega tron?"], &[]),
        ScriptedDialog::new(&[]),
    );
    let mut daemon = Daemon::with_services(config, fakes.services());
    let mut source = ScriptedSource::new(format).repeat(&loud(format), 6);
    let mut sink = RecordingSink::default();

    daemon.listen(&mut source, &mut sink).await.unwrap_err();

    assert_eq!(daemon.turns(), 0);
    assert_eq!(fakes.stt.profiles().len(), 3);
    assert!(fakes.dialog.requests.lock().unwrap().is_empty());
    assert_eq!(sink.cues, 0);
}

#[tokio::test]
async fn test_transient_read_errors_are_skipped() {
    let config = test_config();
    let format = config.capture.format();
    let fakes = Fakes::new(
        ScriptedTranscriber::new(&["megatron open the garage door"], &[]),
        ScriptedDialog::new(&["Opening."]),
    );
    let mut daemon = Daemon::with_services(config, fakes.services());
    let mut source = ScriptedSource::new(format)
        .then([loud(format)])
        .then_error()
        .then([loud(format)]);
    let mut sink = RecordingSink::default();

    daemon.listen(&mut source, &mut sink).await.unwrap_err();

    assert_eq!(daemon.turns(), 1);
    assert_eq!(sink.spoken(), vec!["Opening."]);
}

#[tokio::test]
async fn test_history_carries_across_turns() {
    let config = test_config();
    let format = config.capture.format();
    let fakes = Fakes::new(
        ScriptedTranscriber::new(&["megatron who are you", "megatron and what do you do"], &[]),
        ScriptedDialog::new(&["I am Megatron.", "I run the house."]),
    );
    let mut daemon = Daemon::with_services(config, fakes.services());
    let mut source = ScriptedSource::new(format).repeat(&loud(format), 4);
    let mut sink = RecordingSink::default();

    daemon.listen(&mut source, &mut sink).await.unwrap_err();

    assert_eq!(daemon.turns(), 2);
    assert_eq!(daemon.orchestrator().history().len(), 4);

    let requests = fakes.dialog.requests.lock().unwrap();
    assert_eq!(requests[1].len(), 4);
    assert_eq!(requests[1][2].content, "I am Megatron.");
}
