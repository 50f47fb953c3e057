//! Per-session configuration.

use std::time::Duration;

/// Voice-activity-detection parameters forwarded in `session.update`.
#[derive(Debug, Clone)]
pub struct VadOptions {
    pub threshold: f32,
    pub prefix_padding_ms: u32,
    pub silence_duration_ms: u32,
}

impl Default for VadOptions {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            prefix_padding_ms: 300,
            silence_duration_ms: 500,
        }
    }
}

/// Everything a session needs beyond its injected collaborators.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Behavioral instructions for the remote agent.
    pub instructions: String,
    /// Voice identifier for synthesized speech.
    pub voice: String,
    /// Sampling temperature.
    pub temperature: f32,
    pub vad: VadOptions,
    /// Window within which identically-worded turns of the same role count as
    /// duplicate deliveries. Empirical; guards against double delivery, not a
    /// protocol invariant.
    pub dedup_window: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            instructions: String::new(),
            voice: "sage".to_owned(),
            temperature: 0.8,
            vad: VadOptions::default(),
            dedup_window: Duration::from_millis(2000),
        }
    }
}
