// 该文件是 Shibie （识别） 项目的一部分。
// src/args.rs - 命令行参数
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

use clap::{Parser, Subcommand};
use url::Url;

use shibie::config::{CAPTURE_FPS, CAPTURE_SECONDS, PipelineConfig};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 样本根目录，每个类别一个子目录
  #[arg(long, default_value = "data", value_name = "DIR")]
  pub data_root: PathBuf,

  /// 模型包与 labels.json 的保存目录
  #[arg(long, default_value = ".", value_name = "DIR")]
  pub model_dir: PathBuf,

  /// 视频输入
  /// 支持格式:
  /// - V4L2: v4l2:///dev/video0?width=640&height=480
  /// - 图片目录回放: folder:///path/to/frames
  /// - 单张图片: image:///path/to/still.png?repeat=100
  #[arg(long, default_value = "v4l2:///dev/video0", value_name = "URL")]
  pub input: Url,

  /// 画面输出
  /// 支持格式:
  /// - 仅日志: log:
  /// - 预览图片（每帧覆盖）: image:///tmp/preview.png
  /// - 按日期目录记录: folder:///path/to/record
  /// 均可附加 ?font=/path/to/font.ttf
  #[arg(long, default_value = "log:", value_name = "URL")]
  pub output: Url,

  /// 单次采集的时长（秒）
  #[arg(long, default_value_t = CAPTURE_SECONDS, value_name = "SECONDS")]
  pub capture_seconds: u64,

  /// 每秒保存的样本数，0 表示每帧都保存
  #[arg(long, default_value_t = CAPTURE_FPS, value_name = "FPS")]
  pub capture_fps: u32,

  /// 不指定时进入交互菜单
  #[command(subcommand)]
  pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// 为一个类别采集样本
  Record { class: String },
  /// 训练模型，不指定类别时使用全部已有类别
  Train { classes: Vec<String> },
  /// 用最新的模型实时识别
  Recognize,
  /// 把一个目录里的图片导入为某个类别的样本
  Import { class: String, dir: PathBuf },
  /// 每个类别的样本数
  Stats,
  /// 列出已保存的模型
  Models,
}

impl Args {
  pub fn pipeline_config(&self) -> PipelineConfig {
    PipelineConfig::default()
      .with_data_root(&self.data_root)
      .with_model_dir(&self.model_dir)
      .with_capture_fps(self.capture_fps)
      .with_capture_duration(Duration::from_secs(self.capture_seconds))
  }
}
