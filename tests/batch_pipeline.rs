use std::io::Write;

use dwell_timeline::classify::StateClassifier;
use dwell_timeline::frame::frame_digest_hex;
use dwell_timeline::ingest::{FrameSource, SequenceSource, VideoConfig, VideoSource};
use dwell_timeline::output::{ImageFormat, MemorySink, SequenceSink};
use dwell_timeline::pipeline::{run_batch, BatchSource, FramePipeline, StopHandle};
use dwell_timeline::records::RecordStore;
use dwell_timeline::render::OverlayRenderer;

fn payload(class: &str) -> String {
    format!(
        r#"{{"predictions":[{{"x":48,"y":32,"width":24,"height":20,"class":"{}","confidence":0.82}}]}}"#,
        class
    )
}

fn write_csv(path: &std::path::Path, payloads: &[String]) {
    let mut writer = csv::Writer::from_path(path).unwrap();
    writer.write_record(["frame", "predictions"]).unwrap();
    for (i, p) in payloads.iter().enumerate() {
        writer.write_record([i.to_string().as_str(), p.as_str()]).unwrap();
    }
    writer.flush().unwrap();
}

fn open_video(reference: &str) -> VideoSource {
    VideoSource::open(&VideoConfig {
        reference: reference.to_string(),
        ..Default::default()
    })
    .unwrap()
}

#[test]
fn csv_records_annotate_into_image_sequence() {
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("predictions.csv");
    // Records at 15 fps against a 30 fps video: each record covers two frames.
    write_csv(
        &csv_path,
        &[payload("Standing"), payload("Clinch"), payload("Ground"), "not json".to_string()],
    );

    let records = RecordStore::open(&csv_path).unwrap();
    assert_eq!(records.len(), 4);
    let video = open_video("stub://match?frames=8&fps=30&width=480&height=360");
    let mut source = BatchSource::new(video, records, 15.0).unwrap();

    let out = dir.path().join("annotated");
    let sink = SequenceSink::create(&out, ImageFormat::Png, 30.0).unwrap();
    let renderer = OverlayRenderer::new(StateClassifier::default(), 30.0);
    let mut pipeline = FramePipeline::new(renderer, 30.0, sink);

    let report = run_batch(&mut source, &mut pipeline, &StopHandle::new(), |_| {}).unwrap();
    assert_eq!(report.frames_processed, 8);
    assert_eq!(report.frames_with_records, 6);
    assert_eq!(report.parse_errors, 2);
    for entry in &report.labels {
        assert!((entry.seconds - 2.0 / 30.0).abs() < 1e-9, "{:?}", entry);
    }
    let total: f64 = report.labels.iter().map(|l| l.percent).sum();
    assert!((total - 100.0).abs() < 1e-6);

    assert!(out.join("frame_000001.png").exists());
    assert!(out.join("frame_000008.png").exists());
    let reread = SequenceSource::open(&out, 1.0).unwrap();
    assert_eq!(reread.frame_rate(), 30.0);
    assert_eq!(reread.dimensions(), (480, 360));
}

#[test]
fn jsonl_records_and_repeat_runs_render_identically() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("predictions.jsonl");
    let mut file = std::fs::File::create(&path).unwrap();
    for class in ["Standing_guard", "Ground_control", "Referee"] {
        writeln!(file, "{}", payload(class)).unwrap();
    }
    drop(file);

    let run = || {
        let records = RecordStore::open(&path).unwrap();
        let video = open_video("stub://match?frames=3&width=400&height=300");
        let mut source = BatchSource::new(video, records, 30.0).unwrap();
        let renderer = OverlayRenderer::new(StateClassifier::default(), 30.0);
        let mut pipeline = FramePipeline::new(renderer, 30.0, MemorySink::new());
        let report = run_batch(&mut source, &mut pipeline, &StopHandle::new(), |_| {}).unwrap();
        let digests: Vec<String> = pipeline
            .into_sink()
            .frames
            .iter()
            .map(|f| frame_digest_hex(&f.image))
            .collect();
        (report, digests)
    };

    let (first, first_digests) = run();
    let (_, second_digests) = run();
    assert_eq!(first_digests, second_digests);
    assert_eq!(first.frames_processed, 3);
    assert_eq!(first.parse_errors, 0);
    let names: Vec<&str> = first.labels.iter().map(|l| l.label.as_str()).collect();
    assert_eq!(names, vec!["standing", "clinch", "ground"]);
}

#[test]
fn missing_record_store_fails_fast() {
    let dir = tempfile::tempdir().unwrap();
    assert!(RecordStore::open(&dir.path().join("absent.csv")).is_err());
}
