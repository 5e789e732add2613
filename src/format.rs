//! Format negotiation between the sensor and the image pipeline.
//!
//! The catalog of usable formats is the intersection of what the sensor
//! advertises and what the pipeline accepts, computed once at manager
//! construction. Frame-size enumeration intersects the two capability
//! answers on demand: discrete sensor sizes are filtered through the
//! pipeline's `try_format`, stepwise ranges are merged axis by axis
//! (LCM of the steps, larger minimum, smaller maximum).

use bitflags::bitflags;
use log::warn;

use crate::hal::{FrameSizeQuery, ImageData, SensorCtl, SizeRange, Stepwise};
use crate::{Error, Format, PixelFormat, Result, StreamKind};

bitflags! {
    /// Properties of an enumerated format.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct FormatFlags: u32 {
        const COMPRESSED = 0x0001;
        const EMULATED = 0x0002;
    }
}

/// One entry of the format catalog.
#[derive(Clone, Debug, PartialEq)]
pub struct FmtDesc {
    /// Position in the catalog this descriptor was returned from.
    pub index: u32,
    pub stream: StreamKind,
    pub flags: FormatFlags,
    pub pixelformat: PixelFormat,
    pub sub_pixelformat: PixelFormat,
    pub description: String,
}

/// Formats supported by both the sensor and the image pipeline for one
/// stream. Built once, immutable afterwards.
#[derive(Debug)]
pub struct FormatCatalog {
    descs: Vec<FmtDesc>,
}

impl FormatCatalog {
    /// Walks the sensor's advertised formats and keeps those the
    /// pipeline accepts, re-indexed from zero.
    pub fn build(stream: StreamKind, sensor: &dyn SensorCtl, imgdata: &dyn ImageData) -> Self {
        let mut descs: Vec<FmtDesc> = Vec::new();
        let mut sensor_index = 0;

        while let Some(desc) = sensor.format_range(stream, sensor_index) {
            if imgdata.accepts_format(desc.pixelformat, desc.sub_pixelformat) {
                descs.push(FmtDesc {
                    index: descs.len() as u32,
                    stream,
                    ..desc
                });
            }
            sensor_index += 1;
        }

        if descs.is_empty() {
            warn!("no {} format is supported by both sensor and pipeline", stream);
        }

        FormatCatalog { descs }
    }

    pub fn get(&self, index: u32) -> Option<&FmtDesc> {
        self.descs.get(index as usize)
    }

    pub fn len(&self) -> usize {
        self.descs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FmtDesc> {
        self.descs.iter()
    }
}

/// Answers a frame-size enumeration request by intersecting the sensor
/// and pipeline capabilities.
///
/// A discrete sensor yields its `query.index`-th pair among those the
/// pipeline's `try_format` accepts; a stepwise sensor yields a single
/// merged stepwise descriptor at index 0. An empty intersection is an
/// invalid-argument error.
pub(crate) fn enum_frame_sizes(
    sensor: &dyn SensorCtl,
    imgdata: &dyn ImageData,
    query: &FrameSizeQuery,
) -> Result<SizeRange> {
    let pipeline = imgdata
        .framesize_range(&FrameSizeQuery { index: 0, ..*query })
        .ok_or(Error::InvalidArg)?;

    let mut matched = 0;
    let mut sensor_index = 0;

    loop {
        let caps = sensor
            .framesize_range(&FrameSizeQuery {
                index: sensor_index,
                ..*query
            })
            .ok_or(Error::InvalidArg)?;

        match caps {
            SizeRange::Discrete { size, sub } => {
                let format = Format {
                    width: size.width,
                    height: size.height,
                    pixelformat: query.pixelformat,
                    sub_pixelformat: query.sub_pixelformat,
                    sub_width: sub.width,
                    sub_height: sub.height,
                    sizeimage: 0,
                };
                if imgdata.try_format(&format).is_ok() {
                    if matched == query.index {
                        return Ok(SizeRange::Discrete { size, sub });
                    }
                    matched += 1;
                }
                sensor_index += 1;
            }
            SizeRange::Stepwise { size, sub } => {
                // One merged descriptor covers the whole range.
                if query.index != 0 {
                    return Err(Error::InvalidArg);
                }
                let SizeRange::Stepwise {
                    size: pipe_size,
                    sub: pipe_sub,
                } = pipeline
                else {
                    return Err(Error::InvalidArg);
                };
                return Ok(SizeRange::Stepwise {
                    size: merge_stepwise(&size, &pipe_size)?,
                    sub: merge_stepwise(&sub, &pipe_sub)?,
                });
            }
        }
    }
}

fn merge_stepwise(a: &Stepwise, b: &Stepwise) -> Result<Stepwise> {
    let merged = Stepwise {
        step_width: lcm(a.step_width, b.step_width),
        step_height: lcm(a.step_height, b.step_height),
        min_width: a.min_width.max(b.min_width),
        min_height: a.min_height.max(b.min_height),
        max_width: a.max_width.min(b.max_width),
        max_height: a.max_height.min(b.max_height),
    };

    if merged.min_width > merged.max_width || merged.min_height > merged.max_height {
        return Err(Error::InvalidArg);
    }

    Ok(merged)
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let r = a % b;
        a = b;
        b = r;
    }
    a
}

fn lcm(a: u32, b: u32) -> u32 {
    if a == 0 || b == 0 {
        0
    } else {
        a / gcd(a, b) * b
    }
}
