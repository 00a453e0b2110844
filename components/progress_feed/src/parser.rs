// components/progress_feed/src/parser.rs
//! Best-effort progress inference from the extraction subprocess's free-form
//! output. The tool prints several different encodings depending on which
//! internal stage is running; each gets a matcher that normalizes to a
//! percentage. The matcher table is heuristic and version-fragile: a tool
//! upgrade that reformats its lines degrades this to silence, never to
//! wrong events.

use crate::{Phase, ProgressEvent};
use regex::Regex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Minimum spacing between emitted events for one job.
pub const DEFAULT_THROTTLE: Duration = Duration::from_millis(500);

/// Transcoder `time=` lines carry elapsed encoded time but no total, so
/// percentage is estimated against this fixed track length. Known
/// approximation: tracks far from four minutes get a skewed curve. Exact
/// duration from metadata would fix it, but the estimate is kept as-is.
pub const ASSUMED_TRACK_SECONDS: f32 = 240.0;

struct Matcher {
    pattern: Regex,
    phase: Phase,
    normalize: fn(&regex::Captures) -> Option<f32>,
}

/// Turns raw subprocess lines into throttled, monotonic [`ProgressEvent`]s
/// for one job.
pub struct ProgressTracker {
    job_id: Uuid,
    throttle: Duration,
    matchers: Vec<Matcher>,
    last_emit: Option<Instant>,
    high_water: HashMap<Phase, f32>,
    milestone_50: bool,
    milestone_90: bool,
}

impl ProgressTracker {
    pub fn new(job_id: Uuid) -> Self {
        Self::with_throttle(job_id, DEFAULT_THROTTLE)
    }

    pub fn with_throttle(job_id: Uuid, throttle: Duration) -> Self {
        Self {
            job_id,
            throttle,
            matchers: default_matchers(),
            last_emit: None,
            high_water: HashMap::new(),
            milestone_50: false,
            milestone_90: false,
        }
    }

    /// Feed one output line; returns an event when the line parsed to a
    /// percentage and the throttle window allows emission.
    pub fn observe(&mut self, line: &str) -> Option<ProgressEvent> {
        let (phase, raw) = self.match_line(line)?;
        let percent = self.clamp_monotonic(phase, raw);

        let milestone = self.milestone_message(percent);
        if milestone.is_none() && !self.throttle_allows() {
            return None;
        }
        self.last_emit = Some(Instant::now());

        let mut event = ProgressEvent::new(self.job_id, phase, percent);
        if let Some(message) = milestone {
            event = event.with_message(message);
        }
        Some(event)
    }

    fn match_line(&self, line: &str) -> Option<(Phase, f32)> {
        for matcher in &self.matchers {
            if let Some(caps) = matcher.pattern.captures(line) {
                if let Some(percent) = (matcher.normalize)(&caps) {
                    return Some((matcher.phase, percent.clamp(0.0, 100.0)));
                }
            }
        }
        None
    }

    fn clamp_monotonic(&mut self, phase: Phase, percent: f32) -> f32 {
        let high = self.high_water.entry(phase).or_insert(0.0);
        if percent > *high {
            *high = percent;
        }
        *high
    }

    fn throttle_allows(&self) -> bool {
        match self.last_emit {
            None => true,
            Some(at) => at.elapsed() >= self.throttle,
        }
    }

    /// Milestone messages fire exactly once each and bypass the throttle.
    fn milestone_message(&mut self, percent: f32) -> Option<&'static str> {
        if !self.milestone_50 && percent >= 50.0 {
            self.milestone_50 = true;
            return Some("halfway there");
        }
        if !self.milestone_90 && percent >= 90.0 {
            self.milestone_90 = true;
            return Some("almost done");
        }
        None
    }
}

fn default_matchers() -> Vec<Matcher> {
    vec![
        // yt-dlp: "[download]  42.7% of 3.52MiB at 1.21MiB/s ETA 00:02"
        Matcher {
            pattern: Regex::new(r"\[download\]\s+(\d+(?:\.\d+)?)%").unwrap(),
            phase: Phase::Downloading,
            normalize: |caps| caps.get(1)?.as_str().parse().ok(),
        },
        // Size pair without a percentage: "1.50MiB of 3.00MiB"
        Matcher {
            pattern: Regex::new(
                r"(\d+(?:\.\d+)?)([KMG])iB\s+of\s+~?\s*(\d+(?:\.\d+)?)([KMG])iB",
            )
            .unwrap(),
            phase: Phase::Downloading,
            normalize: |caps| {
                let done = to_bytes(caps.get(1)?.as_str(), caps.get(2)?.as_str())?;
                let total = to_bytes(caps.get(3)?.as_str(), caps.get(4)?.as_str())?;
                if total <= 0.0 {
                    return None;
                }
                Some(done / total * 100.0)
            },
        },
        // Transcoder: "size=    2048kB time=00:01:30.02 bitrate= 186.2kbits/s"
        Matcher {
            pattern: Regex::new(r"time=(\d+):(\d{2}):(\d{2}(?:\.\d+)?)").unwrap(),
            phase: Phase::Processing,
            normalize: |caps| {
                let hours: f32 = caps.get(1)?.as_str().parse().ok()?;
                let minutes: f32 = caps.get(2)?.as_str().parse().ok()?;
                let seconds: f32 = caps.get(3)?.as_str().parse().ok()?;
                let elapsed = hours * 3600.0 + minutes * 60.0 + seconds;
                Some(elapsed / ASSUMED_TRACK_SECONDS * 100.0)
            },
        },
    ]
}

fn to_bytes(value: &str, unit: &str) -> Option<f32> {
    let value: f32 = value.parse().ok()?;
    let factor = match unit {
        "K" => 1024.0,
        "M" => 1024.0 * 1024.0,
        "G" => 1024.0 * 1024.0 * 1024.0,
        _ => return None,
    };
    Some(value * factor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn tracker() -> ProgressTracker {
        ProgressTracker::with_throttle(Uuid::new_v4(), Duration::ZERO)
    }

    #[test]
    fn test_percent_token_line() {
        let mut t = tracker();
        let event = t
            .observe("[download]  42.7% of 3.52MiB at 1.21MiB/s ETA 00:02")
            .unwrap();

        assert_eq!(event.phase, Phase::Downloading);
        assert!((event.percent - 42.7).abs() < 0.01);
    }

    #[test]
    fn test_size_pair_line() {
        let mut t = tracker();
        let event = t.observe("downloaded 1.50MiB of 3.00MiB").unwrap();

        assert_eq!(event.phase, Phase::Downloading);
        assert!((event.percent - 50.0).abs() < 0.01);
    }

    #[test]
    fn test_transcoder_time_line_uses_assumed_duration() {
        let mut t = tracker();
        let event = t
            .observe("size=    2048kB time=00:02:00.00 bitrate= 186.2kbits/s")
            .unwrap();

        assert_eq!(event.phase, Phase::Processing);
        // 120s of an assumed 240s track.
        assert!((event.percent - 50.0).abs() < 0.01);
    }

    #[test]
    fn test_unrecognized_lines_are_silent() {
        let mut t = tracker();
        assert_matches!(t.observe("[youtube] extracting signature"), None);
        assert_matches!(t.observe(""), None);
    }

    #[test]
    fn test_percent_never_decreases_within_phase() {
        let mut t = tracker();
        t.observe("[download]  80.0%").unwrap();
        let event = t.observe("[download]  10.0%").unwrap();

        assert!((event.percent - 80.0).abs() < 0.01);
    }

    #[test]
    fn test_phases_track_independently() {
        let mut t = tracker();
        t.observe("[download]  90.0%").unwrap();
        let event = t.observe("time=00:00:24.00").unwrap();

        assert_eq!(event.phase, Phase::Processing);
        assert!((event.percent - 10.0).abs() < 0.01);
    }

    #[test]
    fn test_percent_clamped_to_hundred() {
        let mut t = tracker();
        // 480s elapsed against the assumed 240s track.
        let event = t.observe("time=00:08:00.00").unwrap();
        assert_eq!(event.percent, 100.0);
    }

    #[test]
    fn test_throttle_suppresses_rapid_lines() {
        let mut t = ProgressTracker::with_throttle(Uuid::new_v4(), Duration::from_secs(60));
        assert!(t.observe("[download]  10.0%").is_some());
        assert_matches!(t.observe("[download]  11.0%"), None);
    }

    #[test]
    fn test_milestones_fire_once_and_bypass_throttle() {
        let mut t = ProgressTracker::with_throttle(Uuid::new_v4(), Duration::from_secs(60));

        assert!(t.observe("[download]  10.0%").is_some());

        // Throttled window, but crossing 50% must still surface.
        let half = t.observe("[download]  55.0%").unwrap();
        assert_eq!(half.message.as_deref(), Some("halfway there"));

        let ninety = t.observe("[download]  95.0%").unwrap();
        assert_eq!(ninety.message.as_deref(), Some("almost done"));

        // Exactly once each.
        assert_matches!(t.observe("[download]  99.0%"), None);
    }

    #[test]
    fn test_milestone_crossed_in_one_jump_reports_fifty_first() {
        let mut t = tracker();
        let event = t.observe("[download]  96.0%").unwrap();
        assert_eq!(event.message.as_deref(), Some("halfway there"));

        let event = t.observe("[download]  97.0%").unwrap();
        assert_eq!(event.message.as_deref(), Some("almost done"));
    }
}
