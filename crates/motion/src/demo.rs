//! Scripted transform tracks.
//!
//! A script is JSON:
//!
//! ```json
//! { "tracks": [ {
//!     "entity": "camera",
//!     "start": 0.0,
//!     "looping": false,
//!     "keyframes": [
//!         { "time": 0.0, "position": [0, 1, 6], "look_at": [0, 0, 0] },
//!         { "time": 4.0, "position": [6, 1, 0], "look_at": [0, 0, 0] }
//!     ]
//! } ] }
//! ```
//!
//! Keyframe times are relative to the track start. While a track is active
//! the demo system claims its entity, so no other system writes that
//! transform in the same frame.

use std::collections::BTreeSet;
use std::path::Path;

use glam::{Quat, Vec3};
use pathtracer_common::Transform;
use pathtracer_engine::{FrameContext, System, SystemError};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum DemoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("track for {entity:?}: {reason}")]
    InvalidTrack { entity: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    pub time: f32,
    pub position: Vec3,
    /// Explicit orientation. Takes precedence over `look_at`.
    #[serde(default)]
    pub rotation: Option<Quat>,
    #[serde(default)]
    pub look_at: Option<Vec3>,
}

impl Keyframe {
    fn orientation(&self) -> Quat {
        match (self.rotation, self.look_at) {
            (Some(rotation), _) => rotation.normalize(),
            (None, Some(target)) if target != self.position => {
                Transform::looking_at(self.position, target).rotation
            }
            _ => Quat::IDENTITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Name of the driven entity.
    pub entity: String,
    #[serde(default)]
    pub start: f32,
    #[serde(default)]
    pub looping: bool,
    pub keyframes: Vec<Keyframe>,
}

impl Track {
    pub fn duration(&self) -> f32 {
        self.keyframes.last().map(|k| k.time).unwrap_or(0.0)
    }

    fn validate(&self) -> Result<(), DemoError> {
        let invalid = |reason: &str| DemoError::InvalidTrack {
            entity: self.entity.clone(),
            reason: reason.to_string(),
        };
        if self.keyframes.is_empty() {
            return Err(invalid("no keyframes"));
        }
        if self.keyframes.windows(2).any(|w| w[1].time < w[0].time) {
            return Err(invalid("keyframe times must not decrease"));
        }
        if self.looping && self.duration() <= 0.0 {
            return Err(invalid("looping track needs a positive duration"));
        }
        Ok(())
    }

    /// Local time within the track at script time `t`, or `None` when the
    /// track is not active.
    fn local_time(&self, t: f32) -> Option<f32> {
        let local = t - self.start;
        if local < 0.0 {
            return None;
        }
        let duration = self.duration();
        if self.looping {
            Some(local % duration)
        } else if local <= duration {
            Some(local)
        } else {
            None
        }
    }

    /// Local time to apply for a frame that advanced script time from `prev`
    /// to `now`. A non-looping track whose end falls inside the step yields
    /// its end time once, so the last keyframe is always written.
    fn step_time(&self, prev: f32, now: f32) -> Option<f32> {
        if let Some(local) = self.local_time(now) {
            return Some(local);
        }
        let duration = self.duration();
        let (prev_local, now_local) = (prev - self.start, now - self.start);
        (!self.looping && prev_local < duration && now_local > duration).then_some(duration)
    }

    /// Interpolated position and orientation at track-local time `t`.
    pub fn sample(&self, t: f32) -> Option<(Vec3, Quat)> {
        let first = self.keyframes.first()?;
        if t <= first.time {
            return Some((first.position, first.orientation()));
        }
        for pair in self.keyframes.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            if t <= b.time {
                let span = b.time - a.time;
                let s = if span > 0.0 { (t - a.time) / span } else { 1.0 };
                return Some((
                    a.position.lerp(b.position, s),
                    a.orientation().slerp(b.orientation(), s),
                ));
            }
        }
        let last = self.keyframes.last()?;
        Some((last.position, last.orientation()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DemoScript {
    pub tracks: Vec<Track>,
}

impl DemoScript {
    pub fn from_json(text: &str) -> Result<Self, DemoError> {
        let script: Self = serde_json::from_str(text)?;
        for track in &script.tracks {
            track.validate()?;
        }
        Ok(script)
    }

    pub fn load(path: &Path) -> Result<Self, DemoError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Script time after which no track is active. Infinite if any track loops.
    pub fn end_time(&self) -> f32 {
        self.tracks
            .iter()
            .map(|t| {
                if t.looping {
                    f32::INFINITY
                } else {
                    t.start + t.duration()
                }
            })
            .fold(0.0, f32::max)
    }
}

/// Plays a [`DemoScript`] against named entities.
#[derive(Debug, Default)]
pub struct DemoSystem {
    script: DemoScript,
    time: f32,
    playing: bool,
    missing: BTreeSet<String>,
}

impl DemoSystem {
    pub fn new(script: DemoScript) -> Self {
        Self {
            script,
            time: 0.0,
            playing: true,
            missing: BTreeSet::new(),
        }
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn set_playing(&mut self, playing: bool) {
        self.playing = playing;
    }

    pub fn is_finished(&self) -> bool {
        self.time > self.script.end_time()
    }

    /// Number of tracks active at the current script time.
    pub fn active_tracks(&self) -> usize {
        self.script
            .tracks
            .iter()
            .filter(|t| t.local_time(self.time).is_some())
            .count()
    }
}

impl System for DemoSystem {
    fn update(&mut self, ctx: &mut FrameContext<'_>) -> Result<(), SystemError> {
        if !self.playing {
            return Ok(());
        }
        let prev = self.time;
        self.time += ctx.dt;
        let me = ctx.current();

        for track in &self.script.tracks {
            let Some(local) = track.step_time(prev, self.time) else {
                continue;
            };
            let Some(id) = ctx.world.find(&track.entity) else {
                if self.missing.insert(track.entity.clone()) {
                    ctx.warn(format!("demo track entity {:?} does not exist", track.entity));
                }
                continue;
            };
            let Some((position, rotation)) = track.sample(local) else {
                continue;
            };
            let scale = ctx.world.get(id).map(|d| d.transform.scale).unwrap_or(Vec3::ONE);
            ctx.world.write_transform(
                id,
                me,
                Transform {
                    position,
                    rotation,
                    scale,
                },
            )?;
        }
        Ok(())
    }
}
