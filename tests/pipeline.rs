// 该文件是 Shibie （识别） 项目的一部分。
// tests/pipeline.rs - 采集、训练、识别的端到端测试
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use image::{GrayImage, Luma, Rgb, RgbImage};
use url::Url;

use shibie::{
  config::PipelineConfig,
  input::CaptureError,
  model::ModelRepository,
  pipeline::Pipeline,
  store::SampleStore,
  task::{InferenceError, SessionEnd, load_latest_bundle},
  train::{Trainer, TrainingError},
};

fn config(dir: &Path) -> PipelineConfig {
  PipelineConfig::default()
    .with_data_root(dir.join("data"))
    .with_model_dir(dir.join("models"))
    .with_capture_fps(0)
    .with_capture_duration(Duration::from_secs(3600))
}

/// 同一类别的样本相同，类别之间亮度差别很大
fn write_samples(store: &SampleStore, class: &str, level: u8, count: usize) {
  let image = GrayImage::from_fn(128, 128, |x, _| Luma([level.saturating_add((x % 4) as u8)]));
  for _ in 0..count {
    store.write_sample(class, &image).unwrap();
  }
}

fn seeded(dir: &Path) -> (PipelineConfig, SampleStore, ModelRepository) {
  let config = config(dir);
  let store = SampleStore::new(&config.data_root);
  let repository = ModelRepository::new(&config.model_dir);
  write_samples(&store, "a", 20, 6);
  write_samples(&store, "b", 220, 6);
  (config, store, repository)
}

#[test]
fn training_is_deterministic() {
  let dir = tempfile::tempdir().unwrap();
  let (config, store, repository) = seeded(dir.path());
  let trainer = Trainer::new(&config, &store, &repository);

  let first = trainer.train(&["a", "b"]).unwrap();
  let second = trainer.train(&["a", "b"]).unwrap();
  assert_eq!(first.accuracy, second.accuracy);
  assert_eq!(first.classifier, second.classifier);
  assert_eq!(first.accuracy, 1.0);
}

#[test]
fn training_failures_are_reported() {
  let dir = tempfile::tempdir().unwrap();
  let config = config(dir.path());
  let store = SampleStore::new(&config.data_root);
  let repository = ModelRepository::new(&config.model_dir);
  let trainer = Trainer::new(&config, &store, &repository);

  let none: [&str; 0] = [];
  assert!(matches!(trainer.train(&none), Err(TrainingError::NoData)));
  assert!(matches!(trainer.train(&["a", "b"]), Err(TrainingError::NoData)));

  write_samples(&store, "a", 10, 3);
  assert!(matches!(
    trainer.train(&["a"]),
    Err(TrainingError::InsufficientClasses(1))
  ));
  std::fs::create_dir_all(config.data_root.join("b")).unwrap();
  assert!(matches!(
    trainer.train(&["a", "b"]),
    Err(TrainingError::InsufficientClasses(1))
  ));
  assert!(repository.list().unwrap().is_empty());
}

#[test]
fn bundle_and_label_map_follow_class_order() {
  let dir = tempfile::tempdir().unwrap();
  let (config, store, repository) = seeded(dir.path());

  Trainer::new(&config, &store, &repository)
    .train(&["a", "b"])
    .unwrap();

  let (info, bundle) = load_latest_bundle(&repository).unwrap();
  assert!(info.path.file_name().unwrap().to_string_lossy().starts_with("model_"));
  assert_eq!(bundle.classes, vec!["a", "b"]);
  assert_eq!(bundle.label_map.index_of("a"), Some(0));
  assert_eq!(bundle.label_map.index_of("b"), Some(1));

  let labels: BTreeMap<String, usize> =
    serde_json::from_str(&std::fs::read_to_string(config.label_map_path()).unwrap()).unwrap();
  assert_eq!(labels, BTreeMap::from([("a".to_string(), 0), ("b".to_string(), 1)]));
}

#[test]
fn reversed_class_order_reverses_indices() {
  let dir = tempfile::tempdir().unwrap();
  let (config, store, repository) = seeded(dir.path());

  let bundle = Trainer::new(&config, &store, &repository)
    .train(&["b", "a"])
    .unwrap();
  assert_eq!(bundle.label_map.index_of("b"), Some(0));
  assert_eq!(bundle.label_map.index_of("a"), Some(1));
}

#[test]
fn newest_bundle_wins() {
  let dir = tempfile::tempdir().unwrap();
  let (config, store, repository) = seeded(dir.path());
  let bundle = Trainer::new(&config, &store, &repository)
    .train(&["a", "b"])
    .unwrap();

  for created_at in [100, 200, 50] {
    let mut older = bundle.clone();
    older.created_at = created_at;
    repository.save(&older).unwrap();
  }
  std::fs::remove_file(repository.path_for(bundle.created_at)).unwrap();

  let (info, loaded) = load_latest_bundle(&repository).unwrap();
  assert_eq!(info.path, repository.path_for(200));
  assert_eq!(loaded.created_at, 200);
}

#[test]
fn corrupt_newest_bundle_does_not_fall_back() {
  let dir = tempfile::tempdir().unwrap();
  let (config, store, repository) = seeded(dir.path());
  let bundle = Trainer::new(&config, &store, &repository)
    .train(&["a", "b"])
    .unwrap();

  let mut older = bundle.clone();
  older.created_at = 100;
  repository.save(&older).unwrap();
  std::fs::remove_file(repository.path_for(bundle.created_at)).unwrap();
  std::fs::write(repository.path_for(200), b"not a bundle").unwrap();

  assert!(matches!(
    load_latest_bundle(&repository),
    Err(InferenceError::LoadFailure(_))
  ));
  assert!(repository.path_for(100).is_file());
}

#[test]
fn recognize_end_to_end_from_replayed_frames() {
  let dir = tempfile::tempdir().unwrap();
  let (config, store, repository) = seeded(dir.path());
  Trainer::new(&config, &store, &repository)
    .train(&["a", "b"])
    .unwrap();

  let frames = dir.path().join("frames");
  std::fs::create_dir_all(&frames).unwrap();
  for i in 0..3 {
    let mut image = RgbImage::from_pixel(160, 120, Rgb([225, 225, 225]));
    // 一个 40x40 的暗块，辅助框检测应能找到它
    for y in 40..80 {
      for x in 60..100 {
        image.put_pixel(x, y, Rgb([0, 0, 0]));
      }
    }
    image.save(frames.join(format!("{i:03}.png"))).unwrap();
  }

  let record = dir.path().join("record");
  let pipeline = Pipeline::new(
    config,
    Url::parse(&format!("folder://{}", frames.display())).unwrap(),
    Url::parse(&format!("folder://{}?raw", record.display())).unwrap(),
  );

  let report = pipeline.recognize_session().unwrap();
  assert_eq!(report.frames, 3);
  assert_eq!(report.unknown, 0);
  assert_eq!(report.end, SessionEnd::EndOfStream);
  assert!(report.history.iter().all(|p| p.label == "b"));
  assert!(pipeline.recognize().contains("最近结果"));
  assert!(record.is_dir());
}

#[test]
fn record_session_writes_samples_then_trains() {
  let dir = tempfile::tempdir().unwrap();
  let config = config(dir.path());

  let still = |name: &str, level: u8| {
    let path = dir.path().join(name);
    RgbImage::from_pixel(64, 48, Rgb([level, level, level]))
      .save(&path)
      .unwrap();
    Url::parse(&format!("image://{}?repeat=4", path.display())).unwrap()
  };

  let dark = Pipeline::new(config.clone(), still("dark.png", 15), Url::parse("log:").unwrap());
  let report = dark.capture("a").unwrap();
  assert_eq!((report.frames, report.saved), (4, 4));

  let bright = Pipeline::new(config, still("bright.png", 235), Url::parse("log:").unwrap());
  let report = bright.capture("b").unwrap();
  assert_eq!(report.saved, 4);

  assert_eq!(bright.store().count_samples("a").unwrap(), 4);
  let status = bright.train(&["a", "b"]);
  assert!(status.starts_with("训练完成"), "{status}");
  assert!(bright.models().starts_with('*'));
}

#[test]
fn missing_camera_is_a_capture_error() {
  let dir = tempfile::tempdir().unwrap();
  let pipeline = Pipeline::new(
    config(dir.path()),
    Url::parse(&format!("folder://{}/absent", dir.path().display())).unwrap(),
    Url::parse("log:").unwrap(),
  );
  assert!(matches!(
    pipeline.capture("a"),
    Err(shibie::pipeline::PipelineError::Capture(CaptureError::DeviceUnavailable(_)))
  ));
}
