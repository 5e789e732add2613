//! Format catalog and frame-size negotiation against scripted
//! capabilities.

mod common;

use std::sync::Arc;

use capmux::hal::{Discrete, FrameSizeQuery, SizeRange, Stepwise};
use capmux::ioctl::{FrameSizeEnum, Request};
use capmux::{Error, StreamKind, StreamManager};

use common::{fmt_desc, MockPipeline, MockSensor, JPEG, NO_SUB, RGB565, YUYV};

const VIDEO: StreamKind = StreamKind::Video;

fn stepwise(min: u32, max: u32, step: u32) -> Stepwise {
    Stepwise {
        min_width: min,
        max_width: max,
        step_width: step,
        min_height: min,
        max_height: max,
        step_height: step,
    }
}

fn size_query(index: u32) -> FrameSizeQuery {
    FrameSizeQuery {
        stream: VIDEO,
        index,
        pixelformat: YUYV,
        sub_pixelformat: NO_SUB,
    }
}

#[test]
fn catalog_is_the_intersection_of_sensor_and_pipeline() {
    // Sensor offers YUYV and RGB565, pipeline accepts YUYV and JPEG:
    // only YUYV survives.
    let sensor = Arc::new(MockSensor::new(vec![
        fmt_desc(YUYV, "YUYV 4:2:2"),
        fmt_desc(RGB565, "RGB 5:6:5"),
    ]));
    let pipeline = Arc::new(MockPipeline::new(vec![YUYV, JPEG]));
    let manager = StreamManager::new("/dev/video0", sensor, pipeline).unwrap();

    let only = manager.enum_fmt(VIDEO, 0).unwrap();
    assert_eq!(only.index, 0);
    assert_eq!(only.pixelformat, YUYV);
    assert_eq!(only.description, "YUYV 4:2:2");

    assert_eq!(manager.enum_fmt(VIDEO, 1), Err(Error::InvalidArg));

    // Enumeration is stable.
    assert_eq!(manager.enum_fmt(VIDEO, 0).unwrap(), only);
}

#[test]
fn discrete_sizes_are_filtered_through_the_pipeline() {
    let mut sensor = MockSensor::new(vec![fmt_desc(YUYV, "YUYV 4:2:2")]);
    sensor.sizes = vec![
        SizeRange::Discrete {
            size: Discrete {
                width: 320,
                height: 240,
            },
            sub: Discrete::default(),
        },
        SizeRange::Discrete {
            size: Discrete {
                width: 640,
                height: 480,
            },
            sub: Discrete::default(),
        },
        SizeRange::Discrete {
            size: Discrete {
                width: 1920,
                height: 1080,
            },
            sub: Discrete::default(),
        },
    ];
    let mut pipeline = MockPipeline::new(vec![YUYV]);
    pipeline.sizes = vec![SizeRange::Stepwise {
        size: stepwise(96, 1280, 16),
        sub: Stepwise::default(),
    }];
    pipeline.max_size = Some(Discrete {
        width: 1280,
        height: 720,
    });
    let manager =
        StreamManager::new("/dev/video0", Arc::new(sensor), Arc::new(pipeline)).unwrap();

    // 1920x1080 exceeds what the pipeline can do, so only two entries
    // are enumerable.
    let first = manager.enum_frame_sizes(&size_query(0)).unwrap();
    assert_eq!(
        first,
        SizeRange::Discrete {
            size: Discrete {
                width: 320,
                height: 240
            },
            sub: Discrete::default(),
        }
    );

    let second = manager.enum_frame_sizes(&size_query(1)).unwrap();
    assert_eq!(
        second,
        SizeRange::Discrete {
            size: Discrete {
                width: 640,
                height: 480
            },
            sub: Discrete::default(),
        }
    );

    assert_eq!(
        manager.enum_frame_sizes(&size_query(2)),
        Err(Error::InvalidArg)
    );
}

#[test]
fn stepwise_ranges_are_merged() {
    let mut sensor = MockSensor::new(vec![fmt_desc(YUYV, "YUYV 4:2:2")]);
    sensor.sizes = vec![SizeRange::Stepwise {
        size: stepwise(96, 2592, 16),
        sub: stepwise(96, 1280, 16),
    }];
    let mut pipeline = MockPipeline::new(vec![YUYV]);
    pipeline.sizes = vec![SizeRange::Stepwise {
        size: stepwise(160, 1920, 24),
        sub: stepwise(160, 640, 24),
    }];
    let manager =
        StreamManager::new("/dev/video0", Arc::new(sensor), Arc::new(pipeline)).unwrap();

    let merged = manager.enum_frame_sizes(&size_query(0)).unwrap();
    assert_eq!(
        merged,
        SizeRange::Stepwise {
            size: stepwise(160, 1920, 48),
            sub: stepwise(160, 640, 48),
        }
    );

    // A single stepwise descriptor covers the whole range.
    assert_eq!(
        manager.enum_frame_sizes(&size_query(1)),
        Err(Error::InvalidArg)
    );
}

#[test]
fn disjoint_stepwise_ranges_are_an_error() {
    let mut sensor = MockSensor::new(vec![fmt_desc(YUYV, "YUYV 4:2:2")]);
    sensor.sizes = vec![SizeRange::Stepwise {
        size: stepwise(64, 128, 16),
        sub: Stepwise::default(),
    }];
    let mut pipeline = MockPipeline::new(vec![YUYV]);
    pipeline.sizes = vec![SizeRange::Stepwise {
        size: stepwise(256, 512, 16),
        sub: Stepwise::default(),
    }];
    let manager =
        StreamManager::new("/dev/video0", Arc::new(sensor), Arc::new(pipeline)).unwrap();

    assert_eq!(
        manager.enum_frame_sizes(&size_query(0)),
        Err(Error::InvalidArg)
    );
}

#[test]
fn frame_sizes_through_the_ioctl_surface() {
    let mut sensor = MockSensor::new(vec![fmt_desc(YUYV, "YUYV 4:2:2")]);
    sensor.sizes = vec![SizeRange::Stepwise {
        size: stepwise(96, 1920, 16),
        sub: Stepwise::default(),
    }];
    let mut pipeline = MockPipeline::new(vec![YUYV]);
    pipeline.sizes = vec![SizeRange::Stepwise {
        size: stepwise(96, 1920, 16),
        sub: Stepwise::default(),
    }];
    let manager =
        StreamManager::new("/dev/video0", Arc::new(sensor), Arc::new(pipeline)).unwrap();

    let mut frmsize = FrameSizeEnum {
        stream: VIDEO,
        index: 0,
        pixelformat: YUYV,
        sub_pixelformat: NO_SUB,
        sizes: None,
    };
    manager.ioctl(Request::EnumFrameSizes(&mut frmsize)).unwrap();
    assert_eq!(
        frmsize.sizes,
        Some(SizeRange::Stepwise {
            size: stepwise(96, 1920, 16),
            sub: Stepwise::default(),
        })
    );
}

#[test]
fn format_application_prechecks_the_pipeline() {
    let (manager, sensor, _pipeline) = common::make_manager();

    // JPEG is not in the pipeline's vocabulary: refused before the
    // sensor sees anything.
    let jpeg = capmux::Format::from((b"JPEG", (1280, 720)));
    assert_eq!(manager.s_fmt(&jpeg), Err(Error::NotSupported));
    assert_eq!(manager.try_fmt(&jpeg), Err(Error::NotSupported));
    assert!(sensor.state.lock().unwrap().applied_format.is_none());

    let yuyv = capmux::Format::from((b"YUYV", (640, 480)));
    manager.try_fmt(&yuyv).unwrap();
    manager.s_fmt(&yuyv).unwrap();
    assert_eq!(
        sensor.state.lock().unwrap().applied_format,
        Some(yuyv)
    );
}
