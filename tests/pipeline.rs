//! Command pipeline tests
//!
//! Classifier fallbacks, queue ordering, speech serialization and the
//! capture → dispatch flow end to end

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use handset::config::PipelineConfig;
use handset::pipeline::{FAREWELL_MESSAGE, INTERNAL_ERROR_MESSAGE, Status};
use handset::voice::SpeechSink;
use handset::{
    Agent, AppRegistry, Category, Classifier, Command, CommandQueue, Error, Routed, StatusMarker,
};
use tokio::sync::watch;

mod common;
use common::{
    FakeDevice, Harness, RecordingRenderer, ScriptedAnswers, ScriptedCapture, ScriptedClassifier,
    camera_registry,
};

fn fast_timing() -> PipelineConfig {
    PipelineConfig {
        poll_interval: Duration::from_millis(10),
        error_backoff: Duration::from_millis(1),
    }
}

fn classifier(service: ScriptedClassifier) -> (Classifier, Arc<ScriptedClassifier>) {
    let service = Arc::new(service);
    (Classifier::new(service.clone(), 3), service)
}

fn agent(h: &Harness, replies: &[&str], capture: ScriptedCapture) -> (Agent, Arc<ScriptedClassifier>) {
    let (classifier, service) = classifier(ScriptedClassifier::new(replies));
    let agent = Agent::new(
        classifier,
        h.dispatcher.clone(),
        Arc::new(capture),
        StatusMarker::disabled(),
        fast_timing(),
    );
    (agent, service)
}

#[tokio::test]
async fn classifier_error_falls_back_to_general() {
    let (classifier, _) = classifier(ScriptedClassifier::failing());

    let command = classifier.classify("tell me a joke").await;

    assert_eq!(command, Command::general("tell me a joke"));
}

#[tokio::test]
async fn unrecognized_reply_falls_back_to_general() {
    let (classifier, _) = classifier(ScriptedClassifier::new(&["banana, reminder at 5pm"]));

    assert_eq!(
        classifier.categorize("hmm").await,
        ["general hmm".to_string()]
    );
    let command = classifier.classify("hmm").await;
    assert_eq!(command.category, Category::General);
    assert_eq!(command.query, "hmm");
}

#[tokio::test]
async fn placeholder_echo_is_retried_then_accepted() {
    let (classifier, service) =
        classifier(ScriptedClassifier::new(&["general (query)", "open camera"]));

    let command = classifier.classify("open camera").await;

    assert_eq!(command.category, Category::Open);
    assert_eq!(command.query, "camera");
    assert_eq!(service.calls(), 2);
}

#[tokio::test]
async fn placeholder_retry_is_bounded() {
    let (classifier, service) = classifier(ScriptedClassifier::new(&["open (query)"]));

    let command = classifier.classify("do the thing").await;

    assert_eq!(command, Command::general("do the thing"));
    assert_eq!(service.calls(), 3);
}

#[tokio::test]
async fn only_first_intent_is_used() {
    let (classifier, _) = classifier(ScriptedClassifier::new(&["open chrome, open firefox"]));

    let command = classifier.classify("open chrome and firefox").await;

    assert_eq!(command.query, "chrome");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_pushes_dequeue_in_sequence_order() {
    let queue = Arc::new(CommandQueue::new());

    let mut producers = Vec::new();
    for p in 0..4 {
        let queue = queue.clone();
        producers.push(tokio::spawn(async move {
            for i in 0..50 {
                let text = format!("{p}-{i}");
                queue.push(Command::new(text.clone(), Category::General, text));
                tokio::task::yield_now().await;
            }
        }));
    }
    for producer in producers {
        producer.await.unwrap();
    }
    assert_eq!(queue.len(), 200);

    let mut seqs = Vec::new();
    let mut per_producer: Vec<Vec<u32>> = vec![Vec::new(); 4];
    while let Some(entry) = queue.pop_timeout(Duration::from_millis(10)).await {
        seqs.push(entry.seq);
        let (p, i) = entry.command.raw_text.split_once('-').unwrap();
        per_producer[p.parse::<usize>().unwrap()].push(i.parse().unwrap());
    }

    assert_eq!(seqs, (0..200).collect::<Vec<u64>>());
    for order in per_producer {
        assert_eq!(order, (0..50).collect::<Vec<u32>>());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_speech_never_overlaps() {
    let renderer = Arc::new(RecordingRenderer::with_render_time(Duration::from_millis(20)));
    let sink = SpeechSink::new(renderer.clone());

    let first = sink.speak("one");
    let second = sink.speak("two");
    first.await.unwrap();
    second.await.unwrap();

    let mut windows = renderer.windows();
    assert_eq!(windows.len(), 2);
    windows.sort_by_key(|(start, _)| *start);
    assert!(windows[0].1 <= windows[1].0, "render windows overlap");
}

#[tokio::test]
async fn open_camera_end_to_end() {
    let h = Harness::new(
        FakeDevice::connected().with_installed("com.android.camera2"),
        camera_registry(),
        ScriptedAnswers::new("unused"),
    );
    let (agent, _) = agent(&h, &["open camera"], ScriptedCapture::lines(&["open camera"]));

    let (_tx, rx) = watch::channel(false);
    agent.run_until(rx).await.unwrap();

    let spoken = h.spoken().await;
    assert!(spoken.contains(&"Opening camera".to_string()), "{spoken:?}");
    assert_eq!(h.device.start_calls().len(), 1);
    assert_eq!(h.device.start_calls()[0].0, "com.android.camera2");
    assert!(agent.queue().is_empty());
}

#[tokio::test]
async fn open_command_is_queued_with_success_result() {
    let h = Harness::new(
        FakeDevice::connected().with_installed("com.android.camera2"),
        camera_registry(),
        ScriptedAnswers::new("unused"),
    );
    let (agent, _) = agent(&h, &["open camera"], ScriptedCapture::lines(&[]));

    assert_eq!(agent.handle_utterance("open camera").await, Routed::Queued(0));

    let entry = agent
        .queue()
        .pop_timeout(Duration::from_millis(10))
        .await
        .unwrap();
    let result = h.dispatcher.execute(&entry.command).await.unwrap();
    assert!(result.success);
    assert_eq!(result.message, "Opening camera");
}

#[tokio::test]
async fn realtime_bypasses_queue_and_device() {
    let h = Harness::new(
        FakeDevice::connected(),
        camera_registry(),
        ScriptedAnswers::new("Sunny and 24 degrees."),
    );
    let (agent, _) = agent(
        &h,
        &["realtime what's the weather"],
        ScriptedCapture::lines(&[]),
    );

    let routed = agent.handle_utterance("what's the weather").await;

    let Routed::Answered(result) = routed else {
        panic!("expected an immediate answer, got {routed:?}");
    };
    assert!(result.success);
    assert_eq!(result.message, "Sunny and 24 degrees.");
    assert!(agent.queue().is_empty());
    assert!(h.device.calls().is_empty());
    assert_eq!(h.answers.questions(), ["what's the weather"]);
    assert_eq!(h.spoken().await, ["Sunny and 24 degrees."]);
}

#[tokio::test]
async fn answer_failure_is_spoken() {
    let h = Harness::new(
        FakeDevice::connected(),
        camera_registry(),
        ScriptedAnswers::failing(),
    );

    let result = h
        .dispatcher
        .execute(&Command::general("who was akbar"))
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(h.spoken().await, ["Sorry, I couldn't process your request."]);
}

#[tokio::test]
async fn exit_phrase_skips_classification() {
    let h = Harness::new(
        FakeDevice::connected(),
        camera_registry(),
        ScriptedAnswers::new("unused"),
    );
    let (agent, service) = agent(&h, &["general stop"], ScriptedCapture::lines(&[]));

    assert_eq!(agent.handle_utterance("stop").await, Routed::Exit);

    assert_eq!(service.calls(), 0);
    assert_eq!(h.exits.load(Ordering::SeqCst), 1);
    assert_eq!(h.spoken().await, [FAREWELL_MESSAGE]);
}

#[tokio::test]
async fn exit_category_terminates_capture_loop() {
    let h = Harness::new(
        FakeDevice::connected().with_installed("com.android.camera2"),
        camera_registry(),
        ScriptedAnswers::new("unused"),
    );
    let (agent, _) = agent(
        &h,
        &["exit"],
        ScriptedCapture::lines(&["bye for now", "open camera"]),
    );

    let (_tx, rx) = watch::channel(false);
    agent.run_until(rx).await.unwrap();

    assert_eq!(h.exits.load(Ordering::SeqCst), 1);
    assert!(h.device.start_calls().is_empty());
}

#[tokio::test]
async fn unclear_speech_asks_to_repeat() {
    let h = Harness::new(
        FakeDevice::connected(),
        camera_registry(),
        ScriptedAnswers::new("unused"),
    );
    let (agent, service) = agent(
        &h,
        &["general x"],
        ScriptedCapture::new(vec![Err(Error::SpeechUnclear)]),
    );

    let (_tx, rx) = watch::channel(false);
    agent.run_until(rx).await.unwrap();

    assert_eq!(service.calls(), 0);
    assert!(h.spoken().await.contains(&"Sorry, I didn't catch that. Could you repeat?".to_string()));
}

#[tokio::test]
async fn capture_error_does_not_stop_listening() {
    let h = Harness::new(
        FakeDevice::connected().with_installed("com.android.camera2"),
        camera_registry(),
        ScriptedAnswers::new("unused"),
    );
    let (agent, _) = agent(
        &h,
        &["open camera"],
        ScriptedCapture::new(vec![
            Err(Error::SpeechService("recognizer unavailable".into())),
            Ok("open camera".into()),
        ]),
    );

    let (_tx, rx) = watch::channel(false);
    agent.run_until(rx).await.unwrap();

    assert_eq!(
        h.device.start_calls(),
        [("com.android.camera2".to_string(), handset::LaunchStrategy::Monkey)]
    );
}

#[tokio::test]
async fn panicking_command_does_not_stop_dispatch() {
    let registry = AppRegistry::new([
        ("camera", "com.android.camera2"),
        ("crashy", "com.example.crashy"),
    ]);
    let h = Harness::new(
        FakeDevice::connected()
            .with_installed("com.example.crashy")
            .with_panicking_launch("com.example.crashy")
            .with_installed("com.android.camera2"),
        registry,
        ScriptedAnswers::new("unused"),
    );
    let (agent, _) = agent(
        &h,
        &["open crashy", "open camera"],
        ScriptedCapture::lines(&["open crashy", "open camera"]),
    );

    let (_tx, rx) = watch::channel(false);
    agent.run_until(rx).await.unwrap();

    let started: Vec<_> = h.device.start_calls().into_iter().map(|(p, _)| p).collect();
    assert_eq!(started, ["com.example.crashy", "com.android.camera2"]);
    let spoken = h.spoken().await;
    assert!(spoken.contains(&INTERNAL_ERROR_MESSAGE.to_string()), "{spoken:?}");
    assert!(spoken.contains(&"Opening camera".to_string()), "{spoken:?}");
}

#[tokio::test]
async fn dropped_shutdown_sender_keeps_listening() {
    let h = Harness::new(
        FakeDevice::connected().with_installed("com.android.camera2"),
        camera_registry(),
        ScriptedAnswers::new("unused"),
    );
    let (agent, _) = agent(&h, &["open camera"], ScriptedCapture::lines(&["open camera"]));

    let (tx, rx) = watch::channel(false);
    drop(tx);
    agent.run_until(rx).await.unwrap();

    assert_eq!(h.device.start_calls().len(), 1);
}

#[tokio::test]
async fn startup_without_device_fails() {
    let h = Harness::new(
        FakeDevice::disconnected(),
        camera_registry(),
        ScriptedAnswers::new("unused"),
    );
    let (agent, _) = agent(&h, &["open camera"], ScriptedCapture::lines(&["open camera"]));

    let (_tx, rx) = watch::channel(false);
    let err = agent.run_until(rx).await.unwrap_err();

    assert!(matches!(err, Error::DeviceUnavailable));
    assert!(h.device.actuation_calls().is_empty());
}

#[tokio::test]
async fn status_marker_tracks_activity() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Status.data");
    let h = Harness::new(
        FakeDevice::connected(),
        camera_registry(),
        ScriptedAnswers::new("It is noon."),
    );
    let (classifier, _) = classifier(ScriptedClassifier::new(&["realtime what time is it"]));
    let agent = Agent::new(
        classifier,
        h.dispatcher.clone(),
        Arc::new(ScriptedCapture::lines(&[])),
        StatusMarker::new(&path),
        fast_timing(),
    );

    agent.handle_utterance("what time is it").await;

    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        Status::Available.as_str()
    );
}

#[tokio::test]
async fn shutdown_signal_stops_agent() {
    let h = Harness::new(
        FakeDevice::connected(),
        camera_registry(),
        ScriptedAnswers::new("unused"),
    );
    let (classifier, _) = classifier(ScriptedClassifier::new(&["general x"]));
    let agent = Agent::new(
        classifier,
        h.dispatcher.clone(),
        Arc::new(BlockedCapture),
        StatusMarker::disabled(),
        fast_timing(),
    );

    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = tx.send(true);
    });

    tokio::time::timeout(Duration::from_secs(5), agent.run_until(rx))
        .await
        .expect("agent should stop on shutdown")
        .unwrap();
}

/// Capture that never hears anything within the test's lifetime
struct BlockedCapture;

impl handset::SpeechCapture for BlockedCapture {
    fn listen(&self) -> handset::Result<String> {
        std::thread::sleep(Duration::from_millis(200));
        Err(Error::InputClosed)
    }
}
