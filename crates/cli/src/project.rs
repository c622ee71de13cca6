//! Project-directory driver.
//!
//! A project directory holds exactly one video and one subtitle file,
//! optionally a `voice_map.json`. Outputs land under a sibling
//! `output/<project>/` tree: the dubbed video, `report.json`, `cpm.csv`,
//! subtitle variants, and on failure an `issues/issue.md`.

use std::path::{Path, PathBuf};

use serde_json::json;

use redub_config::Settings;
use redub_core::{lang, subtitle, Cue, Error, Result, VoiceMap};
use redub_media::MediaTool;
use redub_pipeline::{RunReport, RunRequest, Runner};

pub struct ProjectLayout {
    pub name: String,
    pub dir: PathBuf,
    pub video: PathBuf,
    pub subtitle: PathBuf,
    pub voice_map: Option<PathBuf>,
    pub glossary: Option<PathBuf>,
}

/// Find the project's video, subtitle, and optional voice map. Exactly one
/// of each media input is expected; extras are used first-come with a
/// warning.
pub fn discover(dir: &Path) -> Result<ProjectLayout> {
    let dir = dir
        .canonicalize()
        .map_err(|e| Error::InvalidInput(format!("bad project dir {}: {}", dir.display(), e)))?;
    let mut videos = Vec::new();
    let mut subtitles = Vec::new();
    for entry in std::fs::read_dir(&dir)? {
        let path = entry?.path();
        match path.extension().and_then(|e| e.to_str()) {
            Some("mp4") => videos.push(path),
            Some("srt") => subtitles.push(path),
            _ => {}
        }
    }
    videos.sort();
    subtitles.sort();

    if videos.is_empty() {
        return Err(Error::InvalidInput(format!(
            "no MP4 found in {}",
            dir.display()
        )));
    }
    if subtitles.is_empty() {
        return Err(Error::InvalidInput(format!(
            "no SRT found in {}",
            dir.display()
        )));
    }
    if videos.len() > 1 {
        tracing::warn!(count = videos.len(), "multiple MP4s, using the first");
    }
    if subtitles.len() > 1 {
        tracing::warn!(count = subtitles.len(), "multiple SRTs, using the first");
    }

    let voice_map = dir.join("voice_map.json");
    let glossary = dir.join("glossary.yaml");
    let name = dir
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string());
    Ok(ProjectLayout {
        name,
        video: videos.remove(0),
        subtitle: subtitles.remove(0),
        voice_map: voice_map.exists().then_some(voice_map),
        glossary: glossary.exists().then_some(glossary),
        dir,
    })
}

/// Output tree for a project: a sibling `output/<project>/` directory.
pub fn output_dir(layout: &ProjectLayout, explicit: Option<&Path>) -> PathBuf {
    match explicit {
        Some(path) => path.to_path_buf(),
        None => layout
            .dir
            .parent()
            .unwrap_or(Path::new("."))
            .join("output")
            .join(&layout.name),
    }
}

/// Per-cue CPM table rows: `(index, cpm, duration_ms, chars, start_ms, end_ms)`.
pub fn cpm_rows(cues: &[Cue]) -> Vec<(usize, f64, u32, usize, u32, u32)> {
    cues.iter()
        .enumerate()
        .map(|(i, cue)| {
            (
                i + 1,
                cue.cpm(),
                cue.duration_ms(),
                cue.char_count(),
                cue.start_ms,
                cue.end_ms,
            )
        })
        .collect()
}

pub fn cpm_csv(cues: &[Cue]) -> String {
    let mut out = String::from("index,cpm,duration_ms,chars,start_ms,end_ms\n");
    for (index, cpm, duration, chars, start, end) in cpm_rows(cues) {
        out.push_str(&format!(
            "{index},{cpm:.1},{duration},{chars},{start},{end}\n"
        ));
    }
    out
}

/// Validate a project directory: layout, subtitle language, recommended
/// voice, robust-timestamp hint. Writes `validation.json` in the output
/// tree and returns its path.
pub async fn validate(dir: &Path, media: &MediaTool) -> Result<PathBuf> {
    let layout = discover(dir)?;
    let out_dir = output_dir(&layout, None);
    std::fs::create_dir_all(&out_dir)?;

    let cues = subtitle::load(&layout.subtitle)?;
    let texts: Vec<&str> = cues.iter().map(|c| c.text.as_str()).collect();
    let detected = lang::detect_language(&texts);
    let voice = lang::recommended_voice(detected);
    let robust_hint = media
        .has_negative_start(&layout.video)
        .await
        .unwrap_or(false);

    if let Some(map_path) = &layout.voice_map {
        VoiceMap::load(map_path)?;
    }
    let glossary_terms = match &layout.glossary {
        Some(path) => Some(load_glossary(path)?.len()),
        None => None,
    };

    let path = out_dir.join("validation.json");
    let payload = json!({
        "project": layout.name,
        "mp4": layout.video,
        "srt": layout.subtitle,
        "lang": detected,
        "recommended_voice": voice,
        "recommend_robust_ts": robust_hint,
        "has_voice_map": layout.voice_map.is_some(),
        "glossary_terms": glossary_terms,
    });
    std::fs::write(
        &path,
        serde_json::to_string_pretty(&payload).map_err(|e| Error::Invariant(e.to_string()))?,
    )?;
    tracing::info!(
        project = %layout.name,
        lang = detected,
        voice,
        robust_hint,
        "project validated"
    );
    Ok(path)
}

/// Run the whole pipeline for a project directory. Returns the report
/// path; a fatal error additionally leaves `issues/issue.md` behind.
pub async fn run_project(
    settings: Settings,
    dir: &Path,
    out_override: Option<&Path>,
) -> Result<PathBuf> {
    let layout = discover(dir)?;
    let out_dir = output_dir(&layout, out_override);
    std::fs::create_dir_all(&out_dir)?;

    match run_project_inner(settings, &layout, &out_dir).await {
        Ok(report) => {
            let report_path = out_dir.join("report.json");
            std::fs::write(
                &report_path,
                serde_json::to_string_pretty(&report)
                    .map_err(|e| Error::Invariant(e.to_string()))?,
            )?;
            Ok(report_path)
        }
        Err(e) => {
            write_issue(&out_dir, &e);
            Err(e)
        }
    }
}

async fn run_project_inner(
    mut settings: Settings,
    layout: &ProjectLayout,
    out_dir: &Path,
) -> Result<RunReport> {
    let cues = subtitle::load(&layout.subtitle)?;
    std::fs::write(out_dir.join("cpm.csv"), cpm_csv(&cues))?;

    // Pick the subtitle language tag from the script when the settings
    // carry only the default.
    let texts: Vec<&str> = cues.iter().map(|c| c.text.as_str()).collect();
    let detected = lang::detect_language(&texts);
    settings.output.subtitle_lang = detected.to_string();

    let voice_map = match &layout.voice_map {
        Some(path) => Some(VoiceMap::load(path)?),
        None => None,
    };

    let runner = Runner::new(settings);
    let request = RunRequest {
        video: layout.video.clone(),
        subtitle: layout.subtitle.clone(),
        output: out_dir.join(format!("{}.dub.mp4", layout.name)),
        voice_map,
        artifacts_dir: Some(out_dir.to_path_buf()),
    };
    runner.run(&request).await
}

/// Term glossary carried with a project (term -> preferred rendering).
pub fn load_glossary(path: &Path) -> Result<std::collections::BTreeMap<String, String>> {
    let content = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&content)
        .map_err(|e| Error::InvalidInput(format!("malformed glossary {}: {}", path.display(), e)))
}

fn write_issue(out_dir: &Path, error: &Error) {
    let issue_dir = out_dir.join("issues");
    if std::fs::create_dir_all(&issue_dir).is_err() {
        return;
    }
    let body = format!(
        "# Issue: project run failure\n\n## Detail\n\nkind: {}\n\n{}\n\n\
         ## Fix Template\n\n- Root cause:\n- Impact:\n- Fix steps:\n- Verification:\n",
        error.kind(),
        error
    );
    let _ = std::fs::write(issue_dir.join("issue.md"), body);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed_project(dir: &Path) {
        std::fs::write(dir.join("movie.mp4"), b"not really a video").unwrap();
        std::fs::write(
            dir.join("movie.srt"),
            "1\n00:00:00,000 --> 00:00:02,000\n你好，世界。\n\n",
        )
        .unwrap();
    }

    #[test]
    fn test_discover_happy_path() {
        let dir = tempfile::tempdir().unwrap();
        seed_project(dir.path());
        let layout = discover(dir.path()).unwrap();
        assert!(layout.video.ends_with("movie.mp4"));
        assert!(layout.subtitle.ends_with("movie.srt"));
        assert!(layout.voice_map.is_none());
    }

    #[test]
    fn test_discover_requires_both_inputs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("only.mp4"), b"x").unwrap();
        assert!(matches!(
            discover(dir.path()),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_output_dir_is_sibling_tree() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("myproj");
        std::fs::create_dir(&project).unwrap();
        seed_project(&project);
        let layout = discover(&project).unwrap();
        let out = output_dir(&layout, None);
        assert!(out.ends_with("output/myproj"), "{}", out.display());
    }

    #[test]
    fn test_cpm_csv_shape() {
        let cues = vec![Cue::new(0, 10_000, "x".repeat(30))];
        let csv = cpm_csv(&cues);
        let mut lines = csv.lines();
        assert_eq!(lines.next().unwrap(), "index,cpm,duration_ms,chars,start_ms,end_ms");
        assert_eq!(lines.next().unwrap(), "1,180.0,10000,30,0,10000");
    }
}
