// 该文件是 Shibie （识别） 项目的一部分。
// src/output/directory_record.rs - 按日期目录逐帧记录
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

use chrono::{Datelike, Utc};
use image::RgbImage;
use tracing::{debug, error};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  output::{Display, OutputError, Scene, draw::Draw, font_query},
  url_path,
};

/// 每帧一个文件：`<dir>/<年>/<月>/<日>/<时-分-秒>-<序号>.png`
///
/// 带 `?raw` 时保存未经叠加的原始帧，可以再作为 `folder://` 输入回放。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  draw: Draw,
  raw: bool,
  frame_counter: u16,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = OutputError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      error!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      );
      return Err(OutputError::SchemeMismatch(uri.scheme().to_string()));
    }

    let raw = uri.query_pairs().any(|(k, _)| k == "raw");
    let draw = Draw::from_font_option(font_query(uri).as_deref())?;

    Ok(Self::new(url_path(uri), draw).with_raw(raw))
  }
}

impl DirectoryRecordOutput {
  pub fn new(directory: PathBuf, draw: Draw) -> Self {
    Self {
      directory,
      draw,
      raw: false,
      frame_counter: 0,
    }
  }

  pub fn with_raw(mut self, raw: bool) -> Self {
    self.raw = raw;
    self
  }

  fn frame_id(&mut self) -> u16 {
    self.frame_counter = self.frame_counter.wrapping_add(1);
    self.frame_counter
  }

  fn frame_path(&mut self) -> Result<PathBuf, OutputError> {
    let now = Utc::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:04X}.png",
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }

  fn image_for(&self, scene: &Scene<'_>) -> RgbImage {
    match scene {
      Scene::Recording(view) if self.raw => view.frame.image.clone(),
      Scene::Recognition(view) if self.raw => view.frame.image.clone(),
      _ => self.draw.render(scene),
    }
  }
}

impl Display for DirectoryRecordOutput {
  fn show(&mut self, scene: &Scene<'_>) -> Result<(), OutputError> {
    let image = self.image_for(scene);
    let path = self.frame_path()?;
    image.save(&path)?;
    debug!("记录帧: {}", path.display());
    Ok(())
  }
}
