// 该文件是 Shibie （识别） 项目的一部分。
// src/output/save_image_file.rs - 保存最新一帧到图像文件
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

use image::RgbImage;
use tracing::{debug, error};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  output::{Display, OutputError, Scene, draw::Draw, font_query},
  url_path,
};

/// 每帧覆盖写同一个文件，作为“窗口”的替代品
///
/// `image:///tmp/preview.png?font=/path/to/font.ttf`
pub struct SaveImageFileOutput {
  path: PathBuf,
  draw: Draw,
  written: u64,
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
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

    let draw = Draw::from_font_option(font_query(uri).as_deref())?;
    Ok(Self::new(url_path(uri), draw))
  }
}

impl SaveImageFileOutput {
  pub fn new(path: PathBuf, draw: Draw) -> Self {
    Self {
      path,
      draw,
      written: 0,
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn save_image(&mut self, image: RgbImage) -> Result<(), OutputError> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    image.save(&self.path)?;
    self.written += 1;
    debug!("保存图像到文件: {} (#{})", self.path.display(), self.written);

    Ok(())
  }
}

impl Display for SaveImageFileOutput {
  fn show(&mut self, scene: &Scene<'_>) -> Result<(), OutputError> {
    let image = self.draw.render(scene);
    self.save_image(image)
  }
}
