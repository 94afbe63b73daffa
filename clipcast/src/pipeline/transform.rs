//! Segment transforms: cut, re-encode, duration probe and text rendering.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{StageContext, TempLedger, path_arg};
use crate::config::{EncodingProfile, OverlayConfig};
use crate::{Error, Result};

/// Seconds formatted for the engine's time options.
fn secs_arg(secs: f64) -> String {
    format!("{:.3}", secs)
}

/// Arguments producing `[0, split)` from `input` without re-encoding.
pub fn cut_head_args(input: &Path, split_secs: f64, output: &Path) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-i".to_string(),
        path_arg(input),
        "-t".to_string(),
        secs_arg(split_secs),
        "-map".to_string(),
        "0".to_string(),
        "-c".to_string(),
        "copy".to_string(),
        "-avoid_negative_ts".to_string(),
        "make_zero".to_string(),
        path_arg(output),
    ]
}

/// Arguments producing `[split, end)` from `input` without re-encoding.
pub fn cut_tail_args(input: &Path, split_secs: f64, output: &Path) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-ss".to_string(),
        secs_arg(split_secs),
        "-i".to_string(),
        path_arg(input),
        "-map".to_string(),
        "0".to_string(),
        "-c".to_string(),
        "copy".to_string(),
        "-avoid_negative_ts".to_string(),
        "make_zero".to_string(),
        path_arg(output),
    ]
}

/// Arguments normalizing `input` to the target profile.
pub fn reencode_args(input: &Path, profile: &EncodingProfile, output: &Path) -> Vec<String> {
    let mut out = vec![
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-i".to_string(),
        path_arg(input),
        "-map".to_string(),
        "0:v:0".to_string(),
        "-map".to_string(),
        "0:a:0?".to_string(),
        "-vf".to_string(),
        profile.normalize_filter(),
    ];
    out.extend(profile.video_args());
    out.extend(profile.audio_args());
    out.extend([
        "-movflags".to_string(),
        "+faststart".to_string(),
        path_arg(output),
    ]);
    out
}

/// Arguments asking the probe tool for the container duration only.
pub fn probe_duration_args(input: &Path) -> Vec<String> {
    vec![
        "-v".to_string(),
        "error".to_string(),
        "-show_entries".to_string(),
        "format=duration".to_string(),
        "-of".to_string(),
        "default=noprint_wrappers=1:nokey=1".to_string(),
        path_arg(input),
    ]
}

/// Escape a value for use inside a single-quoted filter option.
pub fn escape_filter_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace(':', "\\:")
        .replace('\'', "\\'")
}

/// Arguments rasterizing the text in `text_file` onto a transparent canvas.
pub fn text_image_args(text_file: &Path, overlay: &OverlayConfig, output: &Path) -> Vec<String> {
    let mut drawtext = format!(
        "drawtext=textfile='{}':fontcolor={}:fontsize={}:x=(w-text_w)/2:y=(h-text_h)/2",
        escape_filter_value(&path_arg(text_file)),
        overlay.font_color,
        overlay.font_size
    );
    if let Some(font) = &overlay.font_file {
        drawtext.push_str(&format!(
            ":fontfile='{}'",
            escape_filter_value(&path_arg(font))
        ));
    }

    vec![
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-f".to_string(),
        "lavfi".to_string(),
        "-i".to_string(),
        format!(
            "color=c=black@0.0:s={}x{}:d=1,format=rgba",
            overlay.text_width, overlay.text_height
        ),
        "-vf".to_string(),
        drawtext,
        "-frames:v".to_string(),
        "1".to_string(),
        path_arg(output),
    ]
}

/// Parse the probe tool's duration output.
pub fn parse_duration(output: &str) -> Option<f64> {
    let value: f64 = output.lines().map(str::trim).find(|l| !l.is_empty())?.parse().ok()?;
    (value.is_finite() && value >= 0.0).then_some(value)
}

/// Split `input` at `split_secs` into `(head, tail)`.
///
/// Both outputs are registered before their invocation starts.
pub async fn cut(
    ctx: &StageContext,
    ledger: &mut TempLedger,
    input: &Path,
    split_secs: f64,
) -> Result<(PathBuf, PathBuf)> {
    if !(split_secs.is_finite() && split_secs > 0.0) {
        return Err(Error::validation(format!(
            "split point must be positive, got {split_secs}"
        )));
    }

    let head = ctx.paths.temp("part_a", "mp4");
    let tail = ctx.paths.temp("part_b", "mp4");
    info!(input = %input.display(), split_secs, "Cutting principal video");

    ledger.register(&head, "cut");
    ctx.ffmpeg_run("cut", &cut_head_args(input, split_secs, &head)).await?;

    ledger.register(&tail, "cut");
    ctx.ffmpeg_run("cut", &cut_tail_args(input, split_secs, &tail)).await?;

    Ok((head, tail))
}

/// Normalize `input` to the configured profile as `<job>_<label>.mp4`.
pub async fn reencode(
    ctx: &StageContext,
    ledger: &mut TempLedger,
    input: &Path,
    label: &str,
) -> Result<PathBuf> {
    let output = ctx.paths.temp(label, "mp4");
    info!(input = %input.display(), output = %output.display(), "Re-encoding segment");
    ledger.register(&output, "reencode");
    ctx.ffmpeg_run(
        "reencode",
        &reencode_args(input, &ctx.config.profile, &output),
    )
    .await?;
    Ok(output)
}

/// Media duration in seconds.
pub async fn duration(ctx: &StageContext, input: &Path) -> Result<f64> {
    let output = ctx
        .runner
        .run_capture(ctx.ffprobe(), &probe_duration_args(input))
        .await
        .map_err(|e| Error::probe(input, e.to_string()))?;
    let secs = parse_duration(&output).ok_or_else(|| {
        Error::probe(
            input,
            format!("unparseable duration output '{}'", output.trim()),
        )
    })?;
    debug!(input = %input.display(), secs, "Probed duration");
    Ok(secs)
}

/// Rasterize `text` into a transparent `<job>_<label>.png`.
///
/// The text goes through a side-car file so no escaping of the text itself
/// is needed; both files are registered.
pub async fn render_text_image(
    ctx: &StageContext,
    ledger: &mut TempLedger,
    text: &str,
    label: &str,
) -> Result<PathBuf> {
    let sidecar = ctx.paths.temp(label, "txt");
    let image = ctx.paths.temp(label, "png");

    ledger.register(&sidecar, "render_text");
    tokio::fs::write(&sidecar, text)
        .await
        .map_err(|e| Error::io_path("writing", &sidecar, e))?;

    ledger.register(&image, "render_text");
    ctx.ffmpeg_run(
        "render_text",
        &text_image_args(&sidecar, &ctx.config.overlay, &image),
    )
    .await?;

    debug!(image = %image.display(), "Rendered text image");
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::pipeline::JobPaths;
    use crate::test_utils::{RecordingRunner, RunnerScript};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn context(dir: &TempDir, runner: Arc<RecordingRunner>) -> StageContext {
        StageContext::new(
            runner,
            Arc::new(AppConfig::default()),
            JobPaths::new(dir.path(), "job1"),
        )
    }

    #[test]
    fn test_cut_args() {
        let head = cut_head_args(Path::new("in.mp4"), 90.0, Path::new("a.mp4"));
        assert_eq!(
            head,
            [
                "-y", "-hide_banner", "-i", "in.mp4", "-t", "90.000", "-map", "0", "-c", "copy",
                "-avoid_negative_ts", "make_zero", "a.mp4"
            ]
        );
        let tail = cut_tail_args(Path::new("in.mp4"), 90.0, Path::new("b.mp4"));
        assert_eq!(&tail[2..6], ["-ss", "90.000", "-i", "in.mp4"]);
        assert_eq!(tail.last().unwrap(), "b.mp4");
    }

    #[test]
    fn test_reencode_args_use_profile() {
        let profile = EncodingProfile::default();
        let out = reencode_args(Path::new("in.mov"), &profile, Path::new("out.mp4"));
        assert!(out.contains(&"0:a:0?".to_string()));
        assert!(out.contains(&profile.normalize_filter()));
        assert!(out.windows(2).any(|w| w == ["-c:v", "libx264"]));
        assert!(out.windows(2).any(|w| w == ["-c:a", "aac"]));
        assert_eq!(out.last().unwrap(), "out.mp4");
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("123.456000\n"), Some(123.456));
        assert_eq!(parse_duration("\n  42\n"), Some(42.0));
        assert_eq!(parse_duration("N/A"), None);
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("-1"), None);
    }

    #[test]
    fn test_escape_filter_value() {
        assert_eq!(escape_filter_value("C:\\a'b"), "C\\:\\\\a\\'b");
    }

    #[tokio::test]
    async fn test_cut_registers_both_parts() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        let ctx = context(&dir, runner.clone());
        let mut ledger = TempLedger::new("job1");

        let (head, tail) = cut(&ctx, &mut ledger, Path::new("src.mp4"), 30.0)
            .await
            .unwrap();

        assert_eq!(head, dir.path().join("job1_part_a.mp4"));
        assert_eq!(tail, dir.path().join("job1_part_b.mp4"));
        assert!(ledger.contains(&head) && ledger.contains(&tail));
        assert_eq!(runner.calls().len(), 2);
        assert!(crate::utils::fs::is_file(&head).await);
    }

    #[tokio::test]
    async fn test_cut_rejects_non_positive_split() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        let ctx = context(&dir, runner.clone());
        let mut ledger = TempLedger::new("job1");

        let err = cut(&ctx, &mut ledger, Path::new("src.mp4"), 0.0)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_cut_still_registers_output() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(RecordingRunner::with_script(
            RunnerScript::default().fail_when_args_contain("-ss", 1),
        ));
        let ctx = context(&dir, runner);
        let mut ledger = TempLedger::new("job1");

        let err = cut(&ctx, &mut ledger, Path::new("src.mp4"), 30.0)
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), Some(1));
        assert_eq!(ledger.len(), 2);
    }

    #[tokio::test]
    async fn test_duration_probe() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(RecordingRunner::with_script(
            RunnerScript::default().capture_output("187.25\n"),
        ));
        let ctx = context(&dir, runner.clone());

        let secs = duration(&ctx, Path::new("src.mp4")).await.unwrap();
        assert_eq!(secs, 187.25);
        assert_eq!(runner.calls()[0].tool, "ffprobe");
    }

    #[tokio::test]
    async fn test_duration_probe_errors() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(RecordingRunner::with_script(
            RunnerScript::default().capture_output("N/A"),
        ));
        let ctx = context(&dir, runner);
        let err = duration(&ctx, Path::new("src.mp4")).await.unwrap_err();
        assert!(matches!(err, Error::Probe { .. }));

        let runner = Arc::new(RecordingRunner::with_script(
            RunnerScript::default().fail_when_args_contain("format=duration", 1),
        ));
        let ctx = context(&dir, runner);
        let err = duration(&ctx, Path::new("src.mp4")).await.unwrap_err();
        assert!(matches!(err, Error::Probe { .. }));
    }

    #[tokio::test]
    async fn test_render_text_image_registers_sidecar_and_image() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        let ctx = context(&dir, runner.clone());
        let mut ledger = TempLedger::new("job1");

        let image = render_text_image(&ctx, &mut ledger, "Live: it's on", "banner")
            .await
            .unwrap();

        let sidecar = dir.path().join("job1_banner.txt");
        assert_eq!(image, dir.path().join("job1_banner.png"));
        assert_eq!(
            tokio::fs::read_to_string(&sidecar).await.unwrap(),
            "Live: it's on"
        );
        assert!(ledger.contains(&sidecar) && ledger.contains(&image));
        let call = &runner.calls()[0];
        assert!(call.args.iter().any(|a| a.starts_with("color=c=black@0.0:s=1280x120")));
    }
}
