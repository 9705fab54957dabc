// 该文件是 Shibie （识别） 项目的一部分。
// src/pipeline.rs - 面向菜单与命令行的流水线入口
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

//! 每个操作都返回给用户看的状态文字，错误在这里转换成文字，不会再向上传播。

use std::fmt::Write as _;
use std::path::Path;

use chrono::{DateTime, Local};
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{
  FromUrl,
  config::PipelineConfig,
  features::FeatureEncoder,
  input::{CaptureError, InputWrapper},
  model::{ModelBundle, ModelRepository},
  output::{OutputError, OutputWrapper},
  store::{ImportReport, SampleStore, StoreError},
  task::{
    CaptureReport, InferenceError, Interrupt, RecognitionReport, RecognizeTask, Recognizer,
    RecordError, RecordTask, Task, load_latest_bundle,
  },
  train::{Trainer, TrainingError},
};

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("视频输入错误: {0}")]
  Capture(#[from] CaptureError),
  #[error("输出错误: {0}")]
  Output(#[from] OutputError),
  #[error(transparent)]
  Record(#[from] RecordError),
  #[error(transparent)]
  Inference(#[from] InferenceError),
}

pub struct Pipeline {
  config: PipelineConfig,
  store: SampleStore,
  repository: ModelRepository,
  input: Url,
  output: Url,
  interrupt: Interrupt,
}

impl Pipeline {
  pub fn new(config: PipelineConfig, input: Url, output: Url) -> Self {
    Self {
      store: SampleStore::new(&config.data_root),
      repository: ModelRepository::new(&config.model_dir),
      config,
      input,
      output,
      interrupt: Interrupt::default(),
    }
  }

  /// 使用进程级的 Ctrl-C 处理
  pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
    self.interrupt = interrupt;
    self
  }

  pub fn config(&self) -> &PipelineConfig {
    &self.config
  }

  pub fn store(&self) -> &SampleStore {
    &self.store
  }

  pub fn repository(&self) -> &ModelRepository {
    &self.repository
  }

  pub fn known_classes(&self) -> Result<Vec<String>, StoreError> {
    self.store.list_known_classes()
  }

  /// 为每个类别建好样本目录
  pub fn prepare_classes<S: AsRef<str>>(&self, classes: &[S]) -> Result<(), StoreError> {
    for class in classes {
      self.store.ensure_class_directory(class.as_ref())?;
    }
    Ok(())
  }

  fn open_input(&self) -> Result<InputWrapper, CaptureError> {
    info!("打开视频输入: {}", self.input);
    InputWrapper::from_url(&self.input)
  }

  fn open_output(&self) -> Result<OutputWrapper, OutputError> {
    OutputWrapper::from_url(&self.output)
  }

  pub fn capture(&self, class: &str) -> Result<CaptureReport, PipelineError> {
    let input = self.open_input()?;
    let output = self.open_output()?;
    let session = self.interrupt.session();
    let report =
      RecordTask::new(&self.config, &self.store, class).run_task(input, output, &session)?;
    Ok(report)
  }

  pub fn fit<S: AsRef<str>>(&self, classes: &[S]) -> Result<ModelBundle, TrainingError> {
    Trainer::new(&self.config, &self.store, &self.repository).train(classes)
  }

  /// 先加载模型，再打开视频输入
  pub fn recognize_session(&self) -> Result<RecognitionReport, PipelineError> {
    let (_, bundle) = load_latest_bundle(&self.repository)?;
    let recognizer = Recognizer::from_bundle(bundle, &self.config);
    let input = self.open_input()?;
    let output = self.open_output()?;
    let session = self.interrupt.session();
    let report = RecognizeTask::new(recognizer).run_task(input, output, &session)?;
    Ok(report)
  }

  pub fn record(&self, class: &str) -> String {
    match self.capture(class) {
      Ok(report) => format!(
        "类别 {} 采集结束（{}）：{} 帧，保存样本 {} 张，用时 {:.1} 秒",
        report.class,
        report.end,
        report.frames,
        report.saved,
        report.elapsed.as_secs_f64()
      ),
      Err(e) => failure("采集失败", &e),
    }
  }

  pub fn train<S: AsRef<str>>(&self, classes: &[S]) -> String {
    match self.fit(classes) {
      Ok(bundle) => format!(
        "训练完成：准确率 {:.2}%，类别 [{}]，模型 {}",
        bundle.accuracy * 100.0,
        bundle.classes.join(", "),
        self.repository.path_for(bundle.created_at).display()
      ),
      Err(e) => failure("训练失败", &e),
    }
  }

  pub fn recognize(&self) -> String {
    match self.recognize_session() {
      Ok(report) => {
        let mut status = format!("识别结束（{}）：{} 帧", report.end, report.frames);
        if report.unknown > 0 {
          let _ = write!(status, "，{} 帧标签无效", report.unknown);
        }
        if !report.history.is_empty() {
          let recent: Vec<String> = report
            .history
            .iter()
            .map(|p| format!("#{} {}", p.frame_index, p.label))
            .collect();
          let _ = write!(status, "\n最近结果：{}", recent.join(", "));
        }
        status
      }
      Err(e) => failure("识别失败", &e),
    }
  }

  pub fn import(&self, class: &str, source: &Path) -> String {
    let encoder = FeatureEncoder::new(self.config.model_size);
    match self.store.import_dir(class, source, &encoder) {
      Ok(ImportReport { imported, skipped }) => format!(
        "导入到 {}：成功 {} 张，跳过 {} 个无法解码的文件",
        class, imported, skipped
      ),
      Err(e) => failure("导入失败", &e),
    }
  }

  pub fn stats(&self) -> String {
    match self.store.class_stats() {
      Ok(stats) if stats.is_empty() => {
        format!("{} 下还没有任何类别", self.store.root().display())
      }
      Ok(stats) => {
        let total: usize = stats.iter().map(|s| s.samples).sum();
        let mut status = String::new();
        for s in &stats {
          let _ = writeln!(status, "  {:<16} {:>6}", s.label, s.samples);
        }
        let _ = write!(status, "  {:<16} {:>6}", "合计", total);
        status
      }
      Err(e) => failure("统计失败", &e),
    }
  }

  pub fn models(&self) -> String {
    match self.repository.describe() {
      Ok(summaries) if summaries.is_empty() => {
        format!("{} 下还没有模型", self.repository.dir().display())
      }
      Ok(summaries) => {
        let mut lines = Vec::with_capacity(summaries.len());
        for summary in summaries.iter().rev() {
          let created = DateTime::from_timestamp(summary.info.created_at, 0)
            .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| summary.info.created_at.to_string());
          let marker = if summary.active { "*" } else { " " };
          let line = match summary.accuracy {
            Some(accuracy) => format!(
              "{} {}  {}  准确率 {:.2}%  [{}]",
              marker,
              summary.info.path.display(),
              created,
              accuracy * 100.0,
              summary.classes.join(", ")
            ),
            None => format!(
              "{} {}  {}  (无法读取)",
              marker,
              summary.info.path.display(),
              created
            ),
          };
          lines.push(line);
        }
        lines.join("\n")
      }
      Err(e) => failure("读取模型列表失败", &e),
    }
  }
}

fn failure(what: &str, e: &dyn std::error::Error) -> String {
  error!("{}: {}", what, e);
  format!("{}：{}", what, e)
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{GrayImage, Luma};

  fn pipeline(dir: &Path) -> Pipeline {
    let config = PipelineConfig::default()
      .with_data_root(dir.join("data"))
      .with_model_dir(dir.join("models"));
    Pipeline::new(
      config,
      Url::parse("folder:///nonexistent-shibie-input").unwrap(),
      Url::parse("log:").unwrap(),
    )
  }

  #[test]
  fn failures_become_status_text() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(dir.path());

    assert!(pipeline.train(&["a", "b"]).starts_with("训练失败"));
    assert!(pipeline.recognize().contains("没有可用的模型"));
    assert!(pipeline.record("book").starts_with("采集失败"));
    assert!(pipeline.stats().contains("还没有任何类别"));
    assert!(pipeline.models().contains("还没有模型"));
  }

  #[test]
  fn stats_lists_every_class_with_total() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(dir.path());
    pipeline.prepare_classes(&["book", "cube"]).unwrap();
    let sample = GrayImage::from_pixel(128, 128, Luma([9]));
    for _ in 0..3 {
      pipeline.store().write_sample("book", &sample).unwrap();
    }

    let stats = pipeline.stats();
    assert!(stats.contains("book"));
    assert!(stats.contains("cube"));
    assert!(stats.lines().last().unwrap().trim_end().ends_with('3'));
  }
}
