// 该文件是 Shibie （识别） 项目的一部分。
// src/config.rs - 流水线参数
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

use std::path::PathBuf;
use std::time::Duration;

/// 模型输入边长（像素）
pub const MODEL_SIZE: u32 = 128;
/// 预览窗口中每一块画面的边长
pub const DISPLAY_SIZE: u32 = 400;
/// 辅助框的最小面积，面积不大于该值的框会被丢弃
pub const MIN_BOX_AREA: u32 = 500;
/// 训练集/验证集划分使用的随机种子
pub const SPLIT_SEED: u64 = 42;
/// 验证集所占比例
pub const HELD_OUT_FRACTION: f64 = 0.2;
/// 每秒采样次数
pub const CAPTURE_FPS: u32 = 5;
/// 单次采集的最长时间（秒）
pub const CAPTURE_SECONDS: u64 = 5;
pub const CANNY_LOW: f32 = 50.0;
pub const CANNY_HIGH: f32 = 150.0;

/// 流水线配置
///
/// 所有会话参数都从这里显式传入，不依赖任何全局状态。
#[derive(Debug, Clone)]
pub struct PipelineConfig {
  /// 样本根目录，每个类别一个子目录
  pub data_root: PathBuf,
  /// 模型包与标签表的保存目录
  pub model_dir: PathBuf,
  /// 模型输入边长
  pub model_size: u32,
  /// 辅助框最小面积
  pub min_box_area: u32,
  /// 划分随机种子
  pub split_seed: u64,
  /// 验证集比例
  pub held_out_fraction: f64,
  /// 两次采样之间的间隔
  pub sample_interval: Duration,
  /// 单次采集的总时长
  pub capture_duration: Duration,
  pub canny_low: f32,
  pub canny_high: f32,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      data_root: PathBuf::from("data"),
      model_dir: PathBuf::from("."),
      model_size: MODEL_SIZE,
      min_box_area: MIN_BOX_AREA,
      split_seed: SPLIT_SEED,
      held_out_fraction: HELD_OUT_FRACTION,
      sample_interval: Duration::from_millis(1000 / CAPTURE_FPS as u64),
      capture_duration: Duration::from_secs(CAPTURE_SECONDS),
      canny_low: CANNY_LOW,
      canny_high: CANNY_HIGH,
    }
  }
}

impl PipelineConfig {
  pub fn with_data_root(mut self, data_root: impl Into<PathBuf>) -> Self {
    self.data_root = data_root.into();
    self
  }

  pub fn with_model_dir(mut self, model_dir: impl Into<PathBuf>) -> Self {
    self.model_dir = model_dir.into();
    self
  }

  /// 按每秒采样次数设置采样间隔，0 表示每帧都保存
  pub fn with_capture_fps(mut self, fps: u32) -> Self {
    self.sample_interval = if fps == 0 {
      Duration::ZERO
    } else {
      Duration::from_secs_f64(1.0 / fps as f64)
    };
    self
  }

  pub fn with_capture_duration(mut self, duration: Duration) -> Self {
    self.capture_duration = duration;
    self
  }

  /// 标签表文件路径
  pub fn label_map_path(&self) -> PathBuf {
    self.model_dir.join("labels.json")
  }
}
