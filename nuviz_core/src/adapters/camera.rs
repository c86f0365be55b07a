//! Camera frames -> bounded JPEG image primitives.

use super::{sensor_stream, SampleContext, SceneContext, StreamAdapter};
use crate::assembler::FrameBuilder;
use crate::config::ConverterConfig;
use crate::error::ConvertError;
use crate::protocol::{CoordinateFrame, ImagePrimitive, Primitive, PrimitiveType, SensorPose, StreamMetadata};
use crate::transform::SensorExtrinsic;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{resize, FilterType};
use image::{ExtendedColorType, ImageEncoder, ImageFormat, RgbImage};
use nuviz_env::{EnvError, ImageData, SensorData};
use tracing::debug;

/// Largest size within `max_width` x `max_height` with the input's aspect
/// ratio. Never upscales; a bound of 0 leaves that dimension unconstrained.
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    let fits_w = max_width == 0 || width <= max_width;
    let fits_h = max_height == 0 || height <= max_height;
    if (fits_w && fits_h) || width == 0 || height == 0 {
        return (width, height);
    }

    let (w, h) = (width as u64, height as u64);
    let (mw, mh) = (max_width as u64, max_height as u64);

    // Width binds when w/h > mw/mh, or when height is unconstrained.
    let width_limited = mh == 0 || (mw != 0 && w * mh > h * mw);
    let (nw, nh) = if width_limited {
        (mw, h * mw / w)
    } else {
        (w * mh / h, mh)
    };
    (nw.max(1) as u32, nh.max(1) as u32)
}

/// Converts one camera channel into an image primitive per sample.
#[derive(Debug)]
pub struct CameraAdapter {
    channel: String,
    stream: String,
    max_width: u32,
    max_height: u32,
    quality: u8,
    sensor_pose: Option<SensorPose>,
}

impl CameraAdapter {
    pub fn new(channel: &str, config: &ConverterConfig) -> Self {
        Self {
            channel: channel.to_string(),
            stream: sensor_stream("camera", channel),
            max_width: config.image_max_width,
            max_height: config.image_max_height,
            quality: config.jpeg_quality,
            sensor_pose: None,
        }
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    /// Resizes (downscale only) and re-encodes a frame.
    ///
    /// An encoded JPEG that already fits is forwarded byte-for-byte.
    pub fn convert_image(&self, image: &ImageData) -> Result<ImagePrimitive, ConvertError> {
        match image {
            ImageData::Raw { width, height, rgb } => {
                let buffer = RgbImage::from_raw(*width, *height, rgb.clone()).ok_or_else(|| {
                    ConvertError::UnexpectedData {
                        sensor: self.channel.clone(),
                        expected: "width * height * 3 RGB bytes",
                    }
                })?;
                self.encode_bounded(&buffer)
            }
            ImageData::Encoded(bytes) => {
                let format = image::guess_format(bytes)?;
                let decoded = image::load_from_memory(bytes)?;
                let (width, height) = (decoded.width(), decoded.height());

                if format == ImageFormat::Jpeg
                    && fit_within(width, height, self.max_width, self.max_height) == (width, height)
                {
                    return Ok(ImagePrimitive {
                        data: bytes.clone(),
                        width_px: width,
                        height_px: height,
                    });
                }
                self.encode_bounded(&decoded.to_rgb8())
            }
        }
    }

    fn encode_bounded(&self, buffer: &RgbImage) -> Result<ImagePrimitive, ConvertError> {
        let (width, height) = buffer.dimensions();
        let (nw, nh) = fit_within(width, height, self.max_width, self.max_height);

        let resized;
        let out = if (nw, nh) == (width, height) {
            buffer
        } else {
            debug!("{}: {}x{} -> {}x{}", self.channel, width, height, nw, nh);
            resized = resize(buffer, nw, nh, FilterType::Lanczos3);
            &resized
        };

        let mut data = Vec::new();
        JpegEncoder::new_with_quality(&mut data, self.quality).write_image(
            out.as_raw(),
            nw,
            nh,
            ExtendedColorType::Rgb8,
        )?;

        Ok(ImagePrimitive {
            data,
            width_px: nw,
            height_px: nh,
        })
    }
}

impl StreamAdapter for CameraAdapter {
    fn name(&self) -> &str {
        &self.channel
    }

    fn load(&mut self, scene: &SceneContext<'_>) -> Result<(), ConvertError> {
        // Pixels never move; the calibration only documents where the camera sits.
        self.sensor_pose = match scene.source.calibration(&self.channel) {
            Ok(calibration) => {
                let pose = SensorExtrinsic::from_calibration(&calibration)?.pose();
                Some(SensorPose {
                    translation: pose.translation,
                    rotation: pose.rotation,
                })
            }
            Err(EnvError::SensorNotFound(_)) => None,
            Err(e) => return Err(e.into()),
        };
        Ok(())
    }

    fn get_metadata(&self) -> Vec<StreamMetadata> {
        let mut meta = StreamMetadata::new(self.stream.clone(), PrimitiveType::Image)
            .with_coordinate(CoordinateFrame::Identity);
        if let Some(pose) = self.sensor_pose {
            meta = meta.with_sensor_pose(pose);
        }
        vec![meta]
    }

    fn convert_message(
        &mut self,
        sample: &SampleContext<'_>,
        frame: &mut FrameBuilder<'_>,
    ) -> Result<(), ConvertError> {
        let reading = sample.require_reading(&self.channel)?;
        let SensorData::Image(image) = &reading.data else {
            return Err(ConvertError::UnexpectedData {
                sensor: self.channel.clone(),
                expected: "image",
            });
        };
        let primitive = self.convert_image(image)?;
        frame.push(&self.stream, Primitive::Image(primitive))
    }
}
