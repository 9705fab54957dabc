// 该文件是 Shibie （识别） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use std::path::Path;

use image::{ImageReader, RgbImage};
use tracing::error;
use url::Url;

use super::{CaptureError, InputSource, InputSourceType};
use crate::{FromUrl, FromUrlWithScheme, frame::Frame, url_path};

/// 单张图片作为输入，`?repeat=N` 时重复 N 帧
pub struct ImageFileInput {
  image: RgbImage,
  remaining: u64,
  frame_index: u64,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = CaptureError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(CaptureError::SchemeMismatch(url.scheme().to_string()));
    }

    let repeat = url
      .query_pairs()
      .find(|(k, _)| k == "repeat")
      .and_then(|(_, v)| v.parse().ok())
      .unwrap_or(1);

    Ok(Self::open(&url_path(url))?.with_repeat(repeat))
  }
}

impl ImageFileInput {
  pub fn open(path: &Path) -> Result<Self, CaptureError> {
    let image = ImageReader::open(path)
      .map_err(|e| CaptureError::DeviceUnavailable(format!("{}: {}", path.display(), e)))?
      .decode()?
      .to_rgb8();
    Ok(Self::from(image))
  }

  pub fn with_repeat(mut self, repeat: u64) -> Self {
    self.remaining = repeat;
    self
  }
}

impl From<RgbImage> for ImageFileInput {
  fn from(image: RgbImage) -> Self {
    Self {
      image,
      remaining: 1,
      frame_index: 0,
    }
  }
}

impl Iterator for ImageFileInput {
  type Item = Result<Frame, CaptureError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.remaining == 0 {
      return None;
    }
    self.remaining -= 1;
    let frame = Frame::new(self.image.clone(), self.frame_index, 0);
    self.frame_index += 1;
    Some(Ok(frame))
  }
}

impl InputSource for ImageFileInput {
  fn source_type(&self) -> InputSourceType {
    InputSourceType::Image
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn repeat_query_controls_frame_count() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("still.png");
    RgbImage::new(3, 3).save(&path).unwrap();

    let url = Url::parse(&format!("image://{}?repeat=3", path.display())).unwrap();
    let input = ImageFileInput::from_url(&url).unwrap();
    let indices: Vec<u64> = input.map(|f| f.unwrap().index).collect();
    assert_eq!(indices, vec![0, 1, 2]);
  }

  #[test]
  fn single_frame_by_default() {
    let input = ImageFileInput::from(RgbImage::new(1, 1));
    assert_eq!(input.count(), 1);
  }
}
