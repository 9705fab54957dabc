// 该文件是 Shibie （识别） 项目的一部分。
// src/input.rs - 视频/图像输入
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

use thiserror::Error;

use crate::{FromUrl, FromUrlWithScheme, frame::Frame};

mod image_directory;
mod read_image_file;
pub use self::image_directory::ImageDirectoryInput;
pub use self::read_image_file::ImageFileInput;

#[cfg(feature = "v4l2_input")]
mod v4l2_input;
#[cfg(feature = "v4l2_input")]
pub use self::v4l2_input::V4l2Input;

/// 采集错误只结束当前会话
#[derive(Error, Debug)]
pub enum CaptureError {
  #[error("视频设备不可用: {0}")]
  DeviceUnavailable(String),
  #[error("帧获取失败: {0}")]
  Acquisition(String),
  #[error("不支持的输入来源: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
}

/// 输入源类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSourceType {
  /// 单张图片
  Image,
  /// 图片目录回放
  Directory,
  /// V4L2 摄像头
  V4l2,
}

/// 逐帧产出的输入源，`None` 表示流结束
pub trait InputSource: Iterator<Item = Result<Frame, CaptureError>> {
  fn source_type(&self) -> InputSourceType;
}

pub enum InputWrapper {
  ImageDirectory(ImageDirectoryInput),
  ImageFile(ImageFileInput),
  #[cfg(feature = "v4l2_input")]
  V4l2(V4l2Input),
}

impl FromUrl for InputWrapper {
  type Error = CaptureError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      ImageDirectoryInput::SCHEME => Ok(InputWrapper::ImageDirectory(
        ImageDirectoryInput::from_url(url)?,
      )),
      ImageFileInput::SCHEME => Ok(InputWrapper::ImageFile(ImageFileInput::from_url(url)?)),
      #[cfg(feature = "v4l2_input")]
      V4l2Input::SCHEME => Ok(InputWrapper::V4l2(V4l2Input::from_url(url)?)),
      other => Err(CaptureError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Iterator for InputWrapper {
  type Item = Result<Frame, CaptureError>;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      InputWrapper::ImageDirectory(input) => input.next(),
      InputWrapper::ImageFile(input) => input.next(),
      #[cfg(feature = "v4l2_input")]
      InputWrapper::V4l2(input) => input.next(),
    }
  }
}

impl InputSource for InputWrapper {
  fn source_type(&self) -> InputSourceType {
    match self {
      InputWrapper::ImageDirectory(input) => input.source_type(),
      InputWrapper::ImageFile(input) => input.source_type(),
      #[cfg(feature = "v4l2_input")]
      InputWrapper::V4l2(input) => input.source_type(),
    }
  }
}
