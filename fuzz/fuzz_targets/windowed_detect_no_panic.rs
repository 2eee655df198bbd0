// SPDX-License-Identifier: MIT OR Apache-2.0

#![no_main]

#[path = "common.rs"]
mod common;

use libfuzzer_sys::fuzz_target;
use perfcp_core::bucket_observations;
use perfcp_detect::{
    AlertChangeMode, AlertConfig, Polarity, WindowedDetectorConfig, WindowedRegressionDetector,
};

fuzz_target!(|data: &[u8]| {
    let mut cursor = common::ByteCursor::new(data);

    let min_back_window = common::bounded(cursor.next_u8(), 0, 32);
    let config = WindowedDetectorConfig {
        min_back_window,
        max_back_window: min_back_window + common::bounded(cursor.next_u8(), 0, 32),
        fore_window: common::bounded(cursor.next_u8(), 0, 32),
        threshold: f64::from(cursor.next_u8()) / 8.0,
        alert: AlertConfig {
            polarity: if cursor.next_u8() & 1 == 0 {
                Polarity::LowerIsBetter
            } else {
                Polarity::HigherIsBetter
            },
            change_mode: if cursor.next_u8() & 1 == 0 {
                AlertChangeMode::Percentage
            } else {
                AlertChangeMode::Absolute
            },
            min_alert_change: f64::from(cursor.next_u8()) / 16.0,
        },
        noise_profiling: cursor.next_u8() & 1 == 0,
    };

    let mut observations = Vec::new();
    let mut key = 0u32;
    while !cursor.is_empty() && observations.len() < 512 {
        key += u32::from(cursor.next_u8() % 3 == 0);
        let raw = cursor.next_i16();
        let value = if raw == i16::MIN {
            f64::NAN
        } else {
            f64::from(raw) / 16.0
        };
        observations.push((key, value));
    }
    let Ok(revisions) = bucket_observations(observations) else {
        return;
    };

    let Ok(detector) = WindowedRegressionDetector::new(config) else {
        return;
    };
    let detection = detector
        .detect(&revisions)
        .expect("bucketed revisions are strictly ordered");
    assert_eq!(detection.analyses.len(), revisions.len());
    assert!(
        detection
            .events
            .iter()
            .all(|event| detection.analyses[event.index].is_change)
    );
});
