// 该文件是 Shibie （识别） 项目的一部分。
// src/task.rs - 采集与识别会话
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

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use image::imageops;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  config::PipelineConfig,
  detect::{BoundingBox, BoxDetector},
  features::FeatureEncoder,
  frame::Frame,
  input::CaptureError,
  model::{
    BundleError, BundleInfo, Classifier, DecisionTree, LabelMap, ModelBundle, ModelRepository,
    select_latest,
  },
  output::{Display, LabelView, OutputError, RecognitionView, RecordingView, Scene},
  store::{SampleStore, StoreError},
};

/// 识别历史保留的条数
pub const HISTORY_LEN: usize = 10;

/// 每帧处理完之后检查一次的停止信号
pub trait StopSignal {
  fn should_stop(&self) -> bool;
}

impl StopSignal for AtomicBool {
  fn should_stop(&self) -> bool {
    self.load(Ordering::SeqCst)
  }
}

impl<S: StopSignal + ?Sized> StopSignal for &S {
  fn should_stop(&self) -> bool {
    (**self).should_stop()
  }
}

impl<S: StopSignal + ?Sized> StopSignal for Arc<S> {
  fn should_stop(&self) -> bool {
    (**self).should_stop()
  }
}

/// 永不停止，只靠输入结束或时间限制退出
#[derive(Debug, Default, Clone, Copy)]
pub struct Never;

impl StopSignal for Never {
  fn should_stop(&self) -> bool {
    false
  }
}

#[derive(Debug, Default)]
struct InterruptState {
  active: AtomicBool,
  stopped: AtomicBool,
}

/// Ctrl-C：会话进行中时结束会话，否则退出程序
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
  state: Arc<InterruptState>,
}

impl Interrupt {
  /// 安装进程级的 Ctrl-C 处理函数，每个进程只能调用一次
  pub fn install() -> Result<Self, ctrlc::Error> {
    let interrupt = Self::default();
    let state = interrupt.state.clone();
    ctrlc::set_handler(move || {
      if state.active.load(Ordering::SeqCst) {
        info!("收到中断信号，结束当前会话...");
        state.stopped.store(true, Ordering::SeqCst);
      } else {
        warn!("收到中断信号，退出程序");
        std::process::exit(130);
      }
    })?;
    Ok(interrupt)
  }

  /// 开始一个会话，守卫 drop 时会话结束
  pub fn session(&self) -> SessionGuard<'_> {
    self.state.stopped.store(false, Ordering::SeqCst);
    self.state.active.store(true, Ordering::SeqCst);
    SessionGuard { interrupt: self }
  }
}

impl StopSignal for Interrupt {
  fn should_stop(&self) -> bool {
    self.state.stopped.load(Ordering::SeqCst)
  }
}

pub struct SessionGuard<'a> {
  interrupt: &'a Interrupt,
}

impl StopSignal for SessionGuard<'_> {
  fn should_stop(&self) -> bool {
    self.interrupt.should_stop()
  }
}

impl Drop for SessionGuard<'_> {
  fn drop(&mut self) {
    self.interrupt.state.active.store(false, Ordering::SeqCst);
  }
}

/// 会话结束的原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
  /// 输入源不再产出帧
  EndOfStream,
  /// 收到停止信号
  Stopped,
  /// 达到采集时长
  TimeLimit,
  /// 取帧失败，会话提前结束
  CaptureFailed(String),
}

impl std::fmt::Display for SessionEnd {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      SessionEnd::EndOfStream => write!(f, "输入结束"),
      SessionEnd::Stopped => write!(f, "用户停止"),
      SessionEnd::TimeLimit => write!(f, "达到采集时长"),
      SessionEnd::CaptureFailed(reason) => write!(f, "取帧失败: {}", reason),
    }
  }
}

/// 一个会话：输入 + 显示端 + 停止信号
pub trait Task<I, O>: Sized {
  type Output;
  type Error;

  fn run_task<S: StopSignal>(
    self,
    input: I,
    output: O,
    stop: S,
  ) -> Result<Self::Output, Self::Error>;
}

/// 会话结束时无论结果如何都调用 `finish`，循环本身的错误优先
fn finish_with<D: Display, T, E: From<OutputError>>(
  display: &mut D,
  result: Result<T, E>,
) -> Result<T, E> {
  let finished = display.finish();
  let value = result?;
  finished?;
  Ok(value)
}

#[derive(Error, Debug)]
pub enum RecordError {
  #[error(transparent)]
  Store(#[from] StoreError),
  #[error("显示失败: {0}")]
  Output(#[from] OutputError),
}

#[derive(Debug, Clone)]
pub struct CaptureReport {
  pub class: String,
  pub frames: u64,
  pub saved: usize,
  pub elapsed: Duration,
  pub end: SessionEnd,
}

/// 为一个类别采集样本
///
/// 采样节奏和会话时长分别计时：每隔 `sample_interval` 保存一张，
/// 从会话开始计满 `capture_duration` 后结束。
pub struct RecordTask<'a> {
  store: &'a SampleStore,
  class: String,
  encoder: FeatureEncoder,
  detector: BoxDetector,
  sample_interval: Duration,
  capture_duration: Duration,
}

impl<'a> RecordTask<'a> {
  pub fn new(config: &PipelineConfig, store: &'a SampleStore, class: impl Into<String>) -> Self {
    Self {
      store,
      class: class.into(),
      encoder: FeatureEncoder::new(config.model_size),
      detector: BoxDetector::from_config(config),
      sample_interval: config.sample_interval,
      capture_duration: config.capture_duration,
    }
  }

  fn run_loop<I, O, S>(
    &self,
    input: I,
    display: &mut O,
    stop: S,
  ) -> Result<CaptureReport, RecordError>
  where
    I: Iterator<Item = Result<Frame, CaptureError>>,
    O: Display,
    S: StopSignal,
  {
    let dir = self.store.ensure_class_directory(&self.class)?;
    info!("开始采集 {} -> {}", self.class, dir.display());

    let session_start = Instant::now();
    let mut last_sample: Option<Instant> = None;
    let mut frames = 0;
    let mut saved = 0;
    let mut end = SessionEnd::EndOfStream;

    for item in input {
      if session_start.elapsed() >= self.capture_duration {
        end = SessionEnd::TimeLimit;
        break;
      }
      let frame = match item {
        Ok(frame) => frame,
        Err(e) => {
          warn!("取帧失败，结束采集: {}", e);
          end = SessionEnd::CaptureFailed(e.to_string());
          break;
        }
      };

      let model_view = self.encoder.to_model_view(&frame.image);
      if last_sample.is_none_or(|t| t.elapsed() >= self.sample_interval) {
        let path = self.store.write_sample(&self.class, &model_view)?;
        debug!("保存样本: {}", path.display());
        last_sample = Some(Instant::now());
        saved += 1;
      }

      let edges = self.detector.edges(&model_view);
      display.show(&Scene::Recording(RecordingView {
        frame: &frame,
        class: &self.class,
        model_view: &model_view,
        edges: &edges,
        saved,
      }))?;
      frames += 1;

      if stop.should_stop() {
        end = SessionEnd::Stopped;
        break;
      }
    }

    let report = CaptureReport {
      class: self.class.clone(),
      frames,
      saved,
      elapsed: session_start.elapsed(),
      end,
    };
    info!(
      "采集结束 ({}): {} 帧, 保存 {} 张, 耗时 {:.2?}",
      report.end, report.frames, report.saved, report.elapsed
    );
    Ok(report)
  }
}

impl<I, O> Task<I, O> for RecordTask<'_>
where
  I: Iterator<Item = Result<Frame, CaptureError>>,
  O: Display,
{
  type Output = CaptureReport;
  type Error = RecordError;

  fn run_task<S: StopSignal>(
    self,
    input: I,
    mut output: O,
    stop: S,
  ) -> Result<CaptureReport, RecordError> {
    let result = self.run_loop(input, &mut output, stop);
    finish_with(&mut output, result)
  }
}

#[derive(Error, Debug)]
pub enum InferenceError {
  #[error("没有可用的模型，请先训练")]
  NoModel,
  #[error("模型加载失败: {0}")]
  LoadFailure(#[source] BundleError),
  #[error("预测结果 {0} 不在标签表中")]
  UnknownLabel(usize),
  #[error("视频输入错误: {0}")]
  Capture(#[from] CaptureError),
  #[error("显示失败: {0}")]
  Output(#[from] OutputError),
}

/// 找到最新的模型包并加载，最新的一个损坏时不回退
pub fn load_latest_bundle(
  repository: &ModelRepository,
) -> Result<(BundleInfo, ModelBundle), InferenceError> {
  let bundles = repository.list().map_err(InferenceError::LoadFailure)?;
  let latest = select_latest(&bundles).ok_or(InferenceError::NoModel)?;
  info!("加载模型: {}", latest.path.display());
  let bundle = repository
    .load(&latest.path)
    .map_err(InferenceError::LoadFailure)?;
  Ok((latest.clone(), bundle))
}

/// 单帧识别结果
#[derive(Debug)]
pub struct Recognition<'a> {
  pub label: Result<&'a str, InferenceError>,
  pub boxes: Vec<BoundingBox>,
}

/// 加载好的模型 + 编码器 + 辅助框检测
pub struct Recognizer<C> {
  classifier: C,
  label_map: LabelMap,
  accuracy: f64,
  encoder: FeatureEncoder,
  detector: BoxDetector,
}

impl Recognizer<DecisionTree> {
  pub fn from_bundle(bundle: ModelBundle, config: &PipelineConfig) -> Self {
    Self::new(
      bundle.classifier,
      bundle.label_map,
      bundle.accuracy,
      FeatureEncoder::new(config.model_size),
      BoxDetector::from_config(config),
    )
  }
}

impl<C: Classifier> Recognizer<C> {
  pub fn new(
    classifier: C,
    label_map: LabelMap,
    accuracy: f64,
    encoder: FeatureEncoder,
    detector: BoxDetector,
  ) -> Self {
    Self {
      classifier,
      label_map,
      accuracy,
      encoder,
      detector,
    }
  }

  pub fn accuracy(&self) -> f64 {
    self.accuracy
  }

  pub fn classify(&self, frame: &Frame) -> Result<&str, InferenceError> {
    let features = self.encoder.encode(&frame.image);
    let index = self.classifier.predict(features.as_ref());
    self
      .label_map
      .name_of(index)
      .ok_or(InferenceError::UnknownLabel(index))
  }

  /// 辅助框只用于显示，和预测结果无关
  pub fn boxes(&self, frame: &Frame) -> Vec<BoundingBox> {
    let gray = imageops::grayscale(&frame.image);
    self.detector.detect(&gray)
  }

  pub fn process(&self, frame: &Frame) -> Recognition<'_> {
    Recognition {
      label: self.classify(frame),
      boxes: self.boxes(frame),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prediction {
  pub frame_index: u64,
  pub label: String,
}

#[derive(Debug, Clone)]
pub struct RecognitionReport {
  pub frames: u64,
  /// 预测结果不在标签表中的帧数
  pub unknown: u64,
  /// 最近的预测，最新的在最后
  pub history: VecDeque<Prediction>,
  pub end: SessionEnd,
}

impl RecognitionReport {
  fn push(&mut self, prediction: Prediction) {
    if self.history.len() == HISTORY_LEN {
      self.history.pop_front();
    }
    self.history.push_back(prediction);
  }
}

pub struct RecognizeTask<C> {
  recognizer: Recognizer<C>,
}

impl<C: Classifier> RecognizeTask<C> {
  pub fn new(recognizer: Recognizer<C>) -> Self {
    Self { recognizer }
  }

  fn run_loop<I, O, S>(
    &self,
    input: I,
    display: &mut O,
    stop: S,
  ) -> Result<RecognitionReport, InferenceError>
  where
    I: Iterator<Item = Result<Frame, CaptureError>>,
    O: Display,
    S: StopSignal,
  {
    info!("开始识别...");
    let mut report = RecognitionReport {
      frames: 0,
      unknown: 0,
      history: VecDeque::with_capacity(HISTORY_LEN),
      end: SessionEnd::EndOfStream,
    };

    for item in input {
      let frame = match item {
        Ok(frame) => frame,
        Err(e) => {
          warn!("取帧失败，结束识别: {}", e);
          report.end = SessionEnd::CaptureFailed(e.to_string());
          break;
        }
      };

      let now = Instant::now();
      let recognition = self.recognizer.process(&frame);
      let fault;
      let label = match &recognition.label {
        Ok(name) => {
          report.push(Prediction {
            frame_index: frame.index,
            label: name.to_string(),
          });
          LabelView::Class(name)
        }
        Err(e) => {
          warn!("第 {} 帧: {}", frame.index, e);
          report.unknown += 1;
          fault = e.to_string();
          LabelView::Fault(&fault)
        }
      };
      debug!("第 {} 帧识别耗时: {:.2?}", frame.index, now.elapsed());

      display.show(&Scene::Recognition(RecognitionView {
        frame: &frame,
        label,
        accuracy: self.recognizer.accuracy(),
        boxes: &recognition.boxes,
      }))?;
      report.frames += 1;

      if stop.should_stop() {
        report.end = SessionEnd::Stopped;
        break;
      }
    }

    info!(
      "识别结束 ({}): {} 帧, 其中 {} 帧标签无效",
      report.end, report.frames, report.unknown
    );
    Ok(report)
  }
}

impl<C, I, O> Task<I, O> for RecognizeTask<C>
where
  C: Classifier,
  I: Iterator<Item = Result<Frame, CaptureError>>,
  O: Display,
{
  type Output = RecognitionReport;
  type Error = InferenceError;

  fn run_task<S: StopSignal>(
    self,
    input: I,
    mut output: O,
    stop: S,
  ) -> Result<RecognitionReport, InferenceError> {
    let result = self.run_loop(input, &mut output, stop);
    finish_with(&mut output, result)
  }
}
