//! Encoding profiles shared by every stage that writes video.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Target profile every concatenated segment is normalized to.
///
/// All encoding stages use the same codec arguments so the final lossless
/// concat sees identical stream parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingProfile {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub video_codec: String,
    pub preset: String,
    pub crf: u8,
    pub pixel_format: String,
    pub audio_codec: String,
    pub audio_bitrate: String,
    pub sample_rate: u32,
    pub channels: u8,
}

impl Default for EncodingProfile {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            fps: 30,
            video_codec: "libx264".to_string(),
            preset: "veryfast".to_string(),
            crf: 23,
            pixel_format: "yuv420p".to_string(),
            audio_codec: "aac".to_string(),
            audio_bitrate: "128k".to_string(),
            sample_rate: 44100,
            channels: 2,
        }
    }
}

impl EncodingProfile {
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::config("profile width and height must be positive"));
        }
        if self.fps == 0 {
            return Err(Error::config("profile fps must be positive"));
        }
        if self.video_codec.is_empty() || self.audio_codec.is_empty() {
            return Err(Error::config("profile codecs must not be empty"));
        }
        Ok(())
    }

    /// Scale-and-pad chain that fits any input into the target frame.
    pub fn normalize_filter(&self) -> String {
        format!(
            "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,setsar=1,fps={fps}",
            w = self.width,
            h = self.height,
            fps = self.fps
        )
    }

    pub fn video_args(&self) -> Vec<String> {
        vec![
            "-c:v".to_string(),
            self.video_codec.clone(),
            "-preset".to_string(),
            self.preset.clone(),
            "-crf".to_string(),
            self.crf.to_string(),
            "-pix_fmt".to_string(),
            self.pixel_format.clone(),
            "-r".to_string(),
            self.fps.to_string(),
        ]
    }

    pub fn audio_args(&self) -> Vec<String> {
        vec![
            "-c:a".to_string(),
            self.audio_codec.clone(),
            "-b:a".to_string(),
            self.audio_bitrate.clone(),
            "-ar".to_string(),
            self.sample_rate.to_string(),
            "-ac".to_string(),
            self.channels.to_string(),
        ]
    }
}

/// Live-stream transform settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    /// Delay after spawn before the `started` status is confirmed.
    pub grace_period_secs: u64,
    pub video_bitrate: String,
    pub maxrate: String,
    pub bufsize: String,
    pub gop: u32,
    pub output_format: String,
    /// Delete the streamed source file once the run terminates.
    pub delete_source: bool,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: 60,
            video_bitrate: "3000k".to_string(),
            maxrate: "3000k".to_string(),
            bufsize: "6000k".to_string(),
            gop: 60,
            output_format: "flv".to_string(),
            delete_source: true,
        }
    }
}

impl BroadcastConfig {
    /// Arguments for streaming `source` in real time to `stream_url`.
    pub fn stream_args(
        &self,
        profile: &EncodingProfile,
        source: &str,
        stream_url: &str,
    ) -> Vec<String> {
        let mut args = vec![
            "-hide_banner".to_string(),
            "-re".to_string(),
            "-i".to_string(),
            source.to_string(),
            "-c:v".to_string(),
            profile.video_codec.clone(),
            "-preset".to_string(),
            profile.preset.clone(),
            "-b:v".to_string(),
            self.video_bitrate.clone(),
            "-maxrate".to_string(),
            self.maxrate.clone(),
            "-bufsize".to_string(),
            self.bufsize.clone(),
            "-pix_fmt".to_string(),
            profile.pixel_format.clone(),
            "-g".to_string(),
            self.gop.to_string(),
        ];
        args.extend(profile.audio_args());
        args.extend([
            "-f".to_string(),
            self.output_format.clone(),
            stream_url.to_string(),
        ]);
        args
    }
}
