//! Heuristic detectors evaluated on every completion.
//!
//! Detectors never block a completion; their findings become alerts.

use chrono::{DateTime, FixedOffset, Timelike};

use crate::config::FraudConfig;
use crate::models::{AlertType, GeoPoint};

/// Facts about one completion the detectors look at
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionSignal {
    /// Completion time (Unix ms)
    pub completed_at: i64,
    /// The same user's latest completion of another task (Unix ms)
    pub previous_completion: Option<i64>,
    /// Where the device reported the technician was
    pub reported_location: Option<GeoPoint>,
    pub point_location: Option<GeoPoint>,
}

/// A detector hit, ready to become an alert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub alert_type: AlertType,
    pub description: String,
}

/// Run every detector.
///
/// Findings are ordered so `suspicious_time` comes last and can compound
/// with the other alerts raised for the same completion.
pub fn evaluate(config: &FraudConfig, signal: &CompletionSignal) -> Vec<Finding> {
    [
        location_mismatch(config, signal),
        rapid_completion(config, signal),
        suspicious_time(config, signal),
    ]
    .into_iter()
    .flatten()
    .collect()
}

fn location_mismatch(config: &FraudConfig, signal: &CompletionSignal) -> Option<Finding> {
    let reported = signal.reported_location?;
    let point = signal.point_location?;
    let distance = reported.distance_m(&point);
    (distance > config.location_radius_m).then(|| Finding {
        alert_type: AlertType::LocationMismatch,
        description: format!(
            "Completion reported {distance:.0} m from the lubrication point (limit {:.0} m)",
            config.location_radius_m
        ),
    })
}

fn rapid_completion(config: &FraudConfig, signal: &CompletionSignal) -> Option<Finding> {
    let previous = signal.previous_completion?;
    let gap_ms = (signal.completed_at - previous).abs();
    let limit_ms = config.rapid_completion_secs.saturating_mul(1000);
    (gap_ms < limit_ms).then(|| Finding {
        alert_type: AlertType::RapidCompletion,
        description: format!(
            "Completed {}s after the previous task (minimum {}s)",
            gap_ms / 1000,
            config.rapid_completion_secs
        ),
    })
}

fn suspicious_time(config: &FraudConfig, signal: &CompletionSignal) -> Option<Finding> {
    let offset = FixedOffset::east_opt(config.utc_offset_minutes.saturating_mul(60))?;
    let local = DateTime::from_timestamp_millis(signal.completed_at)?.with_timezone(&offset);
    let hour = local.hour();
    (!within_working_hours(config, hour)).then(|| Finding {
        alert_type: AlertType::SuspiciousTime,
        description: format!(
            "Completed at {hour:02}:00 (UTC{offset}), outside working hours {:02}:00-{:02}:00",
            config.working_hours_start, config.working_hours_end
        ),
    })
}

fn within_working_hours(config: &FraudConfig, hour: u32) -> bool {
    let (start, end) = (config.working_hours_start, config.working_hours_end);
    match start.cmp(&end) {
        std::cmp::Ordering::Less => (start..end).contains(&hour),
        // overnight shift, e.g. 22-06
        std::cmp::Ordering::Greater => hour >= start || hour < end,
        std::cmp::Ordering::Equal => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const HOUR_MS: i64 = 60 * 60 * 1000;

    fn signal_at(hour: i64) -> CompletionSignal {
        CompletionSignal {
            completed_at: hour * HOUR_MS,
            previous_completion: None,
            reported_location: None,
            point_location: None,
        }
    }

    fn types(findings: &[Finding]) -> Vec<AlertType> {
        findings.iter().map(|finding| finding.alert_type).collect()
    }

    #[test]
    fn quiet_completion_has_no_findings() {
        let config = FraudConfig::default();
        assert!(evaluate(&config, &signal_at(10)).is_empty());
    }

    #[test]
    fn night_completion_is_suspicious() {
        let config = FraudConfig::default();
        assert_eq!(
            types(&evaluate(&config, &signal_at(3))),
            vec![AlertType::SuspiciousTime]
        );
        assert!(evaluate(&config, &signal_at(22)).len() == 1);
        assert!(evaluate(&config, &signal_at(6)).is_empty());
    }

    #[test]
    fn overnight_window_wraps_midnight() {
        let config = FraudConfig {
            working_hours_start: 22,
            working_hours_end: 6,
            ..FraudConfig::default()
        };
        assert!(evaluate(&config, &signal_at(23)).is_empty());
        assert!(evaluate(&config, &signal_at(2)).is_empty());
        assert_eq!(evaluate(&config, &signal_at(12)).len(), 1);
    }

    #[test]
    fn working_hours_follow_the_site_offset() {
        let east = FraudConfig {
            utc_offset_minutes: 600,
            ..FraudConfig::default()
        };
        // 03:00 UTC is early afternoon at UTC+10
        assert!(evaluate(&east, &signal_at(3)).is_empty());

        let west = FraudConfig {
            utc_offset_minutes: -600,
            ..FraudConfig::default()
        };
        // 14:00 UTC is 04:00 at UTC-10
        let findings = evaluate(&west, &signal_at(14));
        assert_eq!(types(&findings), vec![AlertType::SuspiciousTime]);
        assert!(findings[0].description.contains("04:00 (UTC-10:00)"));
    }

    #[test]
    fn rapid_completion_uses_interval() {
        let config = FraudConfig::default();
        let mut signal = signal_at(10);
        signal.previous_completion = Some(signal.completed_at - 30_000);
        assert_eq!(
            types(&evaluate(&config, &signal)),
            vec![AlertType::RapidCompletion]
        );

        signal.previous_completion = Some(signal.completed_at - 10 * 60_000);
        assert!(evaluate(&config, &signal).is_empty());
    }

    #[test]
    fn location_mismatch_beyond_radius() {
        let config = FraudConfig::default();
        let mut signal = signal_at(10);
        signal.point_location = Some(GeoPoint::new(-33.4489, -70.6693));
        signal.reported_location = Some(GeoPoint::new(-33.4489, -70.6693));
        assert!(evaluate(&config, &signal).is_empty());

        signal.reported_location = Some(GeoPoint::new(-33.4489, -70.6593));
        let findings = evaluate(&config, &signal);
        assert_eq!(types(&findings), vec![AlertType::LocationMismatch]);
        assert!(findings[0].description.contains(" m from"));
    }

    #[test]
    fn suspicious_time_is_evaluated_last() {
        let config = FraudConfig::default();
        let mut signal = signal_at(2);
        signal.previous_completion = Some(signal.completed_at - 1_000);
        assert_eq!(
            types(&evaluate(&config, &signal)),
            vec![AlertType::RapidCompletion, AlertType::SuspiciousTime]
        );
    }
}
