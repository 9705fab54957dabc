// 该文件是 Shibie （识别） 项目的一部分。
// src/input/image_directory.rs - 图片目录回放输入
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

use std::path::{Path, PathBuf};
use std::time::Instant;
use std::vec::IntoIter;

use image::ImageReader;
use tracing::{error, info};
use url::Url;

use super::{CaptureError, InputSource, InputSourceType};
use crate::{FromUrl, FromUrlWithScheme, frame::Frame, url_path};

const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "gif", "webp"];

/// 按文件名顺序回放一个目录里的图片，相当于一段录好的视频
pub struct ImageDirectoryInput {
  files: IntoIter<PathBuf>,
  frame_index: u64,
  start_time: Instant,
}

impl FromUrlWithScheme for ImageDirectoryInput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for ImageDirectoryInput {
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
    Self::open(&url_path(url))
  }
}

impl ImageDirectoryInput {
  pub fn open(dir: &Path) -> Result<Self, CaptureError> {
    if !dir.is_dir() {
      return Err(CaptureError::DeviceUnavailable(format!(
        "目录不存在: {}",
        dir.display()
      )));
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
      let path = entry?.path();
      let is_image = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false);
      if path.is_file() && is_image {
        files.push(path);
      }
    }
    files.sort();
    info!("回放目录 {}: {} 帧", dir.display(), files.len());

    Ok(Self {
      files: files.into_iter(),
      frame_index: 0,
      start_time: Instant::now(),
    })
  }
}

impl Iterator for ImageDirectoryInput {
  type Item = Result<Frame, CaptureError>;

  fn next(&mut self) -> Option<Self::Item> {
    let path = self.files.next()?;
    let image = ImageReader::open(&path)
      .map_err(CaptureError::from)
      .and_then(|reader| reader.decode().map_err(CaptureError::from))
      .map_err(|e| CaptureError::Acquisition(format!("{}: {}", path.display(), e)));

    Some(image.map(|image| {
      let frame = Frame::new(
        image.to_rgb8(),
        self.frame_index,
        self.start_time.elapsed().as_millis() as u64,
      );
      self.frame_index += 1;
      frame
    }))
  }
}

impl InputSource for ImageDirectoryInput {
  fn source_type(&self) -> InputSourceType {
    InputSourceType::Directory
  }
}
