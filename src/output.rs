// 该文件是 Shibie （识别） 项目的一部分。
// src/output.rs - 输出定义
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

use image::GrayImage;
use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, detect::BoundingBox, frame::Frame};

pub mod draw;

mod directory_record;
mod log_output;
mod save_image_file;
pub use self::directory_record::DirectoryRecordOutput;
pub use self::log_output::LogOutput;
pub use self::save_image_file::SaveImageFileOutput;

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("不支持的输出方式: {0}")]
  SchemeMismatch(String),
  #[error("字体加载错误: {0}")]
  FontError(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
}

/// 识别结果的文字部分
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelView<'a> {
  /// 预测出的类别名
  Class(&'a str),
  /// 本帧无法给出类别（例如标签表损坏）
  Fault(&'a str),
}

/// 采集会话中的一帧
pub struct RecordingView<'a> {
  pub frame: &'a Frame,
  pub class: &'a str,
  /// 模型分辨率的灰度图
  pub model_view: &'a GrayImage,
  /// `model_view` 的 Canny 边缘
  pub edges: &'a GrayImage,
  /// 到目前为止保存的样本数
  pub saved: usize,
}

/// 识别会话中的一帧
pub struct RecognitionView<'a> {
  pub frame: &'a Frame,
  pub label: LabelView<'a>,
  /// 模型训练时记录的准确率，0..=1
  pub accuracy: f64,
  /// 仅用于显示的辅助框
  pub boxes: &'a [BoundingBox],
}

pub enum Scene<'a> {
  Recording(RecordingView<'a>),
  Recognition(RecognitionView<'a>),
}

/// 显示端
///
/// 会话结束时无论成功与否都会调用一次 `finish`。
pub trait Display {
  fn show(&mut self, scene: &Scene<'_>) -> Result<(), OutputError>;

  fn finish(&mut self) -> Result<(), OutputError> {
    Ok(())
  }
}

impl<D: Display + ?Sized> Display for &mut D {
  fn show(&mut self, scene: &Scene<'_>) -> Result<(), OutputError> {
    (**self).show(scene)
  }

  fn finish(&mut self) -> Result<(), OutputError> {
    (**self).finish()
  }
}

pub enum OutputWrapper {
  Log(LogOutput),
  SaveImageFile(SaveImageFileOutput),
  DirectoryRecord(DirectoryRecordOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      LogOutput::SCHEME => Ok(OutputWrapper::Log(LogOutput::from_url(url)?)),
      SaveImageFileOutput::SCHEME => Ok(OutputWrapper::SaveImageFile(
        SaveImageFileOutput::from_url(url)?,
      )),
      DirectoryRecordOutput::SCHEME => Ok(OutputWrapper::DirectoryRecord(
        DirectoryRecordOutput::from_url(url)?,
      )),
      other => Err(OutputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Display for OutputWrapper {
  fn show(&mut self, scene: &Scene<'_>) -> Result<(), OutputError> {
    match self {
      OutputWrapper::Log(output) => output.show(scene),
      OutputWrapper::SaveImageFile(output) => output.show(scene),
      OutputWrapper::DirectoryRecord(output) => output.show(scene),
    }
  }

  fn finish(&mut self) -> Result<(), OutputError> {
    match self {
      OutputWrapper::Log(output) => output.finish(),
      OutputWrapper::SaveImageFile(output) => output.finish(),
      OutputWrapper::DirectoryRecord(output) => output.finish(),
    }
  }
}

/// 从 `?font=/path/to/font.ttf` 读取字体路径
pub(crate) fn font_query(url: &Url) -> Option<std::path::PathBuf> {
  url
    .query_pairs()
    .find(|(k, _)| k == "font")
    .map(|(_, v)| std::path::PathBuf::from(v.into_owned()))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn output_schemes_resolve() {
    for (url, expected) in [
      ("log:", "log"),
      ("image:///tmp/p.png", "image"),
      ("folder:///tmp/rec", "folder"),
    ] {
      let output = OutputWrapper::from_url(&Url::parse(url).unwrap()).unwrap();
      let scheme = match output {
        OutputWrapper::Log(_) => "log",
        OutputWrapper::SaveImageFile(_) => "image",
        OutputWrapper::DirectoryRecord(_) => "folder",
      };
      assert_eq!(scheme, expected);
    }
  }

  #[test]
  fn unknown_output_scheme_is_rejected() {
    let url = Url::parse("rtsp://0.0.0.0:8554/live").unwrap();
    assert!(matches!(
      OutputWrapper::from_url(&url),
      Err(OutputError::SchemeMismatch(s)) if s == "rtsp"
    ));
  }
}
