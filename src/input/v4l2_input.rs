// 该文件是 Shibie （识别） 项目的一部分。
// src/input/v4l2_input.rs - V4L2 摄像头输入
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

use std::time::Instant;

use image::RgbImage;
use tracing::{error, info};
use url::Url;
use v4l::FourCC;
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;

use super::{CaptureError, InputSource, InputSourceType};
use crate::{FromUrl, FromUrlWithScheme, frame::Frame, url_path};

const DEFAULT_DEVICE: &str = "/dev/video0";
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const BUFFER_COUNT: u32 = 4;

/// V4L2 摄像头输入
///
/// `v4l2:///dev/video0?width=640&height=480`。设备在 drop 时关闭。
pub struct V4l2Input {
  /// 捕获流，必须先于设备释放
  stream: Option<Stream<'static>>,
  /// V4L2 设备
  _device: Device,
  frame_index: u64,
  width: u32,
  height: u32,
  start_time: Instant,
}

impl FromUrlWithScheme for V4l2Input {
  const SCHEME: &'static str = "v4l2";
}

impl FromUrl for V4l2Input {
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

    let path = url_path(url);
    let device_path = if path.as_os_str().is_empty() || path.as_os_str() == "/" {
      DEFAULT_DEVICE.to_string()
    } else {
      path.to_string_lossy().into_owned()
    };
    let query = |key: &str, default: u32| {
      url
        .query_pairs()
        .find(|(k, _)| k == key)
        .and_then(|(_, v)| v.parse().ok())
        .unwrap_or(default)
    };

    Self::open(
      &device_path,
      query("width", DEFAULT_WIDTH),
      query("height", DEFAULT_HEIGHT),
    )
  }
}

impl V4l2Input {
  pub fn open(device_path: &str, width: u32, height: u32) -> Result<Self, CaptureError> {
    let unavailable =
      |e: std::io::Error| CaptureError::DeviceUnavailable(format!("{}: {}", device_path, e));

    let device = Device::with_path(device_path).map_err(unavailable)?;

    let mut format = device.format().map_err(unavailable)?;
    format.width = width;
    format.height = height;
    format.fourcc = FourCC::new(b"YUYV");
    let format = device.set_format(&format).map_err(unavailable)?;
    if format.fourcc != FourCC::new(b"YUYV") {
      return Err(CaptureError::DeviceUnavailable(format!(
        "{}: 设备不支持 YUYV 格式（协商结果 {}）",
        device_path, format.fourcc
      )));
    }

    let stream =
      Stream::with_buffers(&device, Type::VideoCapture, BUFFER_COUNT).map_err(unavailable)?;
    info!(
      "摄像头已打开: {} {}x{}",
      device_path, format.width, format.height
    );

    Ok(Self {
      stream: Some(stream),
      _device: device,
      frame_index: 0,
      width: format.width,
      height: format.height,
      start_time: Instant::now(),
    })
  }

  /// 将 YUYV 格式转换为 RGB
  fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Vec<u8> {
    let mut rgb = Vec::with_capacity((width * height * 3) as usize);

    for chunk in yuyv.chunks_exact(4) {
      let y0 = chunk[0] as f32;
      let u = chunk[1] as f32 - 128.0;
      let y1 = chunk[2] as f32;
      let v = chunk[3] as f32 - 128.0;

      for y in [y0, y1] {
        let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
        let g = (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
        let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;
        rgb.extend_from_slice(&[r, g, b]);
      }
    }

    rgb
  }
}

impl Drop for V4l2Input {
  fn drop(&mut self) {
    self.stream.take();
    info!("摄像头已释放");
  }
}

impl Iterator for V4l2Input {
  type Item = Result<Frame, CaptureError>;

  fn next(&mut self) -> Option<Self::Item> {
    let stream = self.stream.as_mut()?;

    let item = match stream.next() {
      Ok((buffer, _meta)) => {
        let rgb = Self::yuyv_to_rgb(buffer, self.width, self.height);
        match RgbImage::from_raw(self.width, self.height, rgb) {
          Some(image) => {
            let frame = Frame::new(
              image,
              self.frame_index,
              self.start_time.elapsed().as_millis() as u64,
            );
            self.frame_index += 1;
            Ok(frame)
          }
          None => Err(CaptureError::Acquisition("缓冲区大小与分辨率不符".to_string())),
        }
      }
      Err(e) => Err(CaptureError::Acquisition(e.to_string())),
    };
    Some(item)
  }
}

impl InputSource for V4l2Input {
  fn source_type(&self) -> InputSourceType {
    InputSourceType::V4l2
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn yuyv_gray_converts_to_equal_channels() {
    let yuyv = [100u8, 128, 200, 128];
    let rgb = V4l2Input::yuyv_to_rgb(&yuyv, 2, 1);
    assert_eq!(rgb, vec![100, 100, 100, 200, 200, 200]);
  }
}
