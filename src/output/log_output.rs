// 该文件是 Shibie （识别） 项目的一部分。
// src/output/log_output.rs - 仅记录日志的输出
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

use tracing::{error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  output::{Display, LabelView, OutputError, Scene},
};

/// 不渲染画面，只把每帧的结果写进日志
#[derive(Debug, Default)]
pub struct LogOutput {
  frames: u64,
}

impl FromUrlWithScheme for LogOutput {
  const SCHEME: &'static str = "log";
}

impl FromUrl for LogOutput {
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
    Ok(Self::default())
  }
}

impl Display for LogOutput {
  fn show(&mut self, scene: &Scene<'_>) -> Result<(), OutputError> {
    self.frames += 1;
    match scene {
      Scene::Recording(view) => info!(
        "采集 {}: 帧 #{}, 已保存 {} 张",
        view.class, view.frame.index, view.saved
      ),
      Scene::Recognition(view) => match view.label {
        LabelView::Class(name) => info!(
          "帧 #{}: {} (模型准确率 {:.2}%, 辅助框 {} 个)",
          view.frame.index,
          name,
          view.accuracy * 100.0,
          view.boxes.len()
        ),
        LabelView::Fault(message) => warn!("帧 #{}: {}", view.frame.index, message),
      },
    }
    Ok(())
  }

  fn finish(&mut self) -> Result<(), OutputError> {
    info!("输出结束，共 {} 帧", self.frames);
    Ok(())
  }
}
