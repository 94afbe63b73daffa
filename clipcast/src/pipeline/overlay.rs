//! Overlay compositing: static footer + logo, and the time-windowed
//! animated overlay.
//!
//! Argument vectors are pure functions of their inputs, so identical inputs
//! always produce identical engine invocations.

use std::path::{Path, PathBuf};

use tracing::info;

use super::filter::{Expr, OverlayNode, Var};
use super::{StageContext, TempLedger, path_arg};
use crate::config::EncodingProfile;
use crate::{Error, Result};

/// Closed interval `[entry, exit]` during which the animated overlay is shown,
/// with the slide-in / hold / slide-out law for its vertical offset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayWindow {
    entry: f64,
    exit: f64,
    slide: f64,
}

impl OverlayWindow {
    /// Window starting at `entry` and lasting `duration` seconds.
    pub fn new(entry: f64, duration: f64, slide: f64) -> Result<Self> {
        let exit = entry + duration;
        if !(entry.is_finite() && exit.is_finite()) || entry < 0.0 || entry >= exit {
            return Err(Error::validation(format!(
                "overlay window must satisfy 0 <= entry < exit, got [{entry}, {exit}]"
            )));
        }
        if !(slide > 0.0 && slide * 2.0 < duration) {
            return Err(Error::validation(format!(
                "overlay slide of {slide}s does not fit a {duration}s window"
            )));
        }
        Ok(Self { entry, exit, slide })
    }

    pub fn entry(&self) -> f64 {
        self.entry
    }

    pub fn exit(&self) -> f64 {
        self.exit
    }

    /// Predicate true for `t` in `[entry, exit]`.
    pub fn enable(&self) -> Expr {
        Expr::t().between(Expr::num(self.entry), Expr::num(self.exit))
    }

    /// Vertical offset of the overlay's top edge.
    ///
    /// `main_h` is fully hidden below the frame, `main_h - overlay_h` is fully
    /// shown against the bottom edge. Slides in over `[entry, entry+slide)`,
    /// holds until `exit-slide`, then slides out until `exit`.
    pub fn y_offset(&self) -> Expr {
        let hidden = || Expr::var(Var::MainH);
        let height = || Expr::var(Var::OverlayH);
        let shown = || hidden().sub(height());
        let progress_since =
            |start: f64| Expr::t().sub(Expr::num(start)).div(Expr::num(self.slide));

        let sliding_in = hidden().sub(height().mul(progress_since(self.entry)));
        let sliding_out = shown().add(height().mul(progress_since(self.exit - self.slide)));

        Expr::if_else(
            Expr::t().lt(Expr::num(self.entry + self.slide)),
            sliding_in,
            Expr::if_else(
                Expr::t().lt(Expr::num(self.exit - self.slide)),
                shown(),
                sliding_out,
            ),
        )
    }

    /// Horizontally centred.
    pub fn x_offset(&self) -> Expr {
        Expr::var(Var::MainW)
            .sub(Expr::var(Var::OverlayW))
            .div(Expr::num(2.0))
    }
}

/// Graphic composited by the animated overlay stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlaySource {
    /// Video clip; looped so it never ends before the base video.
    Clip(PathBuf),
    /// Still image, looped for the same reason.
    Image(PathBuf),
}

impl OverlaySource {
    fn input_args(&self) -> Vec<String> {
        match self {
            Self::Clip(path) => vec![
                "-stream_loop".to_string(),
                "-1".to_string(),
                "-i".to_string(),
                path_arg(path),
            ],
            Self::Image(path) => vec![
                "-loop".to_string(),
                "1".to_string(),
                "-i".to_string(),
                path_arg(path),
            ],
        }
    }
}

fn encode_tail(profile: &EncodingProfile, output: &Path) -> Vec<String> {
    let mut args = vec![
        "-map".to_string(),
        "[vout]".to_string(),
        "-map".to_string(),
        "0:a?".to_string(),
    ];
    args.extend(profile.video_args());
    args.extend([
        "-c:a".to_string(),
        "copy".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        path_arg(output),
    ]);
    args
}

/// Filter graph placing the footer at the bottom edge and the logo in the
/// top-right corner, `margin` pixels in.
pub fn static_filter_graph(margin: u32) -> String {
    let margin = f64::from(margin);
    let footer = OverlayNode {
        base: "0:v".to_string(),
        overlay: "1:v".to_string(),
        x: Expr::var(Var::MainW)
            .sub(Expr::var(Var::OverlayW))
            .div(Expr::num(2.0)),
        y: Expr::var(Var::MainH).sub(Expr::var(Var::OverlayH)),
        enable: None,
        shortest: false,
        output: "footed".to_string(),
    };
    let logo = OverlayNode {
        base: "footed".to_string(),
        overlay: "2:v".to_string(),
        x: Expr::var(Var::MainW)
            .sub(Expr::var(Var::OverlayW))
            .sub(Expr::num(margin)),
        y: Expr::num(margin),
        enable: None,
        shortest: false,
        output: "vout".to_string(),
    };
    format!("{footer};{logo}")
}

/// Arguments for [`compose_static_footer_and_logo`].
///
/// The audio track is copied when present; `0:a?` keeps video-only input valid.
pub fn static_overlay_args(
    video: &Path,
    footer: &Path,
    logo: &Path,
    margin: u32,
    profile: &EncodingProfile,
    output: &Path,
) -> Vec<String> {
    let mut args = vec![
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-i".to_string(),
        path_arg(video),
        "-i".to_string(),
        path_arg(footer),
        "-i".to_string(),
        path_arg(logo),
        "-filter_complex".to_string(),
        static_filter_graph(margin),
    ];
    args.extend(encode_tail(profile, output));
    args
}

/// Filter graph for the animated overlay.
///
/// The overlay stream is shifted so its first frame lands on the window
/// entry. Both [`OverlaySource`] kinds are looped inputs, so `shortest=1`
/// always ends the output with the base video: a graphic shorter than the
/// window repeats rather than truncating the composite.
pub fn animated_filter_graph(window: &OverlayWindow) -> String {
    let node = OverlayNode {
        base: "0:v".to_string(),
        overlay: "ov".to_string(),
        x: window.x_offset(),
        y: window.y_offset(),
        enable: Some(window.enable()),
        shortest: true,
        output: "vout".to_string(),
    };
    format!(
        "[1:v]format=rgba,setpts=PTS-STARTPTS+{}/TB[ov];{}",
        Expr::num(window.entry()),
        node
    )
}

/// Arguments for [`compose_animated_overlay`].
pub fn animated_overlay_args(
    video: &Path,
    source: &OverlaySource,
    window: &OverlayWindow,
    profile: &EncodingProfile,
    output: &Path,
) -> Vec<String> {
    let mut args = vec![
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-i".to_string(),
        path_arg(video),
    ];
    args.extend(source.input_args());
    args.extend(["-filter_complex".to_string(), animated_filter_graph(window)]);
    args.extend(encode_tail(profile, output));
    args
}

/// Burn the footer and logo into `video` as `<job>_<label>.mp4`.
pub async fn compose_static_footer_and_logo(
    ctx: &StageContext,
    ledger: &mut TempLedger,
    video: &Path,
    footer: &Path,
    logo: &Path,
    label: &str,
) -> Result<PathBuf> {
    let output = ctx.paths.temp(label, "mp4");
    info!(video = %video.display(), output = %output.display(), "Compositing footer and logo");
    ledger.register(&output, "overlay_static");
    let args = static_overlay_args(
        video,
        footer,
        logo,
        ctx.config.overlay.logo_margin,
        &ctx.config.profile,
        &output,
    );
    ctx.ffmpeg_run("overlay_static", &args).await?;
    Ok(output)
}

/// Composite `source` onto `video` during `window` as `<job>_<label>.mp4`.
pub async fn compose_animated_overlay(
    ctx: &StageContext,
    ledger: &mut TempLedger,
    video: &Path,
    source: &OverlaySource,
    window: &OverlayWindow,
    label: &str,
) -> Result<PathBuf> {
    let output = ctx.paths.temp(label, "mp4");
    info!(
        video = %video.display(),
        entry = window.entry(),
        exit = window.exit(),
        "Compositing animated overlay"
    );
    ledger.register(&output, "overlay_animated");
    let args = animated_overlay_args(video, source, window, &ctx.config.profile, &output);
    ctx.ffmpeg_run("overlay_animated", &args).await?;
    Ok(output)
}
