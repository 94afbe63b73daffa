//! Lossless join of an ordered segment list via a concat manifest.

use std::path::{Path, PathBuf};

use tracing::info;

use super::{StageContext, TempLedger, path_arg};
use crate::{Error, Result};

/// Quote a path for a concat manifest `file` line.
fn quote_manifest_path(path: &Path) -> String {
    format!("'{}'", path_arg(path).replace('\'', "'\\''"))
}

/// Manifest text listing `segments` in order, one per line.
pub fn manifest_contents(segments: &[PathBuf]) -> String {
    segments
        .iter()
        .map(|s| format!("file {}\n", quote_manifest_path(s)))
        .collect()
}

pub fn concat_args(manifest: &Path, output: &Path) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-f".to_string(),
        "concat".to_string(),
        "-safe".to_string(),
        "0".to_string(),
        "-i".to_string(),
        path_arg(manifest),
        "-map".to_string(),
        "0".to_string(),
        "-c".to_string(),
        "copy".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        path_arg(output),
    ]
}

/// Join `segments` into `output` by stream copy.
///
/// Segments with mismatched codec parameters are not detected here; the
/// engine rejects them and the failure surfaces as a `concat` transform error.
pub async fn concatenate(
    ctx: &StageContext,
    ledger: &mut TempLedger,
    segments: &[PathBuf],
    output: &Path,
) -> Result<PathBuf> {
    if segments.is_empty() {
        return Err(Error::validation("nothing to concatenate"));
    }

    // Relative entries in a manifest resolve against the manifest's directory.
    let absolute = segments
        .iter()
        .map(|s| std::path::absolute(s).map_err(|e| Error::io_path("resolving", s, e)))
        .collect::<Result<Vec<_>>>()?;

    let manifest = ctx.paths.temp("concat", "txt");
    ledger.register(&manifest, "concat");
    tokio::fs::write(&manifest, manifest_contents(&absolute))
        .await
        .map_err(|e| Error::io_path("writing", &manifest, e))?;

    info!(
        segments = segments.len(),
        output = %output.display(),
        "Concatenating segments"
    );
    ctx.ffmpeg_run("concat", &concat_args(&manifest, output))
        .await?;
    Ok(output.to_path_buf())
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
    fn test_manifest_preserves_order() {
        let segments = [
            PathBuf::from("/w/A.mp4"),
            PathBuf::from("/w/B.mp4"),
            PathBuf::from("/w/C.mp4"),
        ];
        assert_eq!(
            manifest_contents(&segments),
            "file '/w/A.mp4'\nfile '/w/B.mp4'\nfile '/w/C.mp4'\n"
        );
    }

    #[test]
    fn test_manifest_escapes_quotes() {
        let segments = [PathBuf::from("/w/it's.mp4")];
        assert_eq!(manifest_contents(&segments), "file '/w/it'\\''s.mp4'\n");
    }

    #[tokio::test]
    async fn test_concatenate_writes_manifest_and_registers_it() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        let ctx = context(&dir, runner.clone());
        let mut ledger = TempLedger::new("job1");
        let segments: Vec<PathBuf> = ["A", "B", "C"]
            .iter()
            .map(|n| dir.path().join(format!("{n}.mp4")))
            .collect();
        let output = dir.path().join("job1_final.mp4");

        concatenate(&ctx, &mut ledger, &segments, &output)
            .await
            .unwrap();

        let manifest = dir.path().join("job1_concat.txt");
        assert!(ledger.contains(&manifest));
        assert!(!ledger.contains(&output));
        let text = tokio::fs::read_to_string(&manifest).await.unwrap();
        let names: Vec<&str> = text
            .lines()
            .map(|l| l.rsplit('/').next().unwrap().trim_end_matches('\''))
            .collect();
        assert_eq!(names, ["A.mp4", "B.mp4", "C.mp4"]);

        let call = &runner.calls()[0];
        assert!(call.args.windows(2).any(|w| w == ["-c", "copy"]));
        assert_eq!(
            call.args.last().unwrap(),
            &output.to_string_lossy().to_string()
        );
    }

    #[tokio::test]
    async fn test_mismatch_surfaces_as_transform_error() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(RecordingRunner::with_script(
            RunnerScript::default().fail_when_args_contain("concat", 1),
        ));
        let ctx = context(&dir, runner);
        let mut ledger = TempLedger::new("job1");

        let err = concatenate(
            &ctx,
            &mut ledger,
            &[dir.path().join("a.mp4")],
            &dir.path().join("out.mp4"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Transform { stage: "concat", .. }));
        assert_eq!(err.exit_code(), Some(1));
    }

    #[tokio::test]
    async fn test_empty_segment_list_rejected() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        let ctx = context(&dir, runner.clone());
        let mut ledger = TempLedger::new("job1");
        let err = concatenate(&ctx, &mut ledger, &[], &dir.path().join("out.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(runner.calls().is_empty());
    }
}
