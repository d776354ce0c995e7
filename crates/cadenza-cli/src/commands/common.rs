//! Shared CLI helpers used across multiple commands.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use cadenza_config::EngineConfig;
use cadenza_core::{Project, SourceRef};
use indicatif::{ProgressBar, ProgressStyle};

/// Load engine settings from `path`, or from the user config directory
/// (falling back to defaults) when no path is given.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("failed to load settings from {}", path.display())),
        None => EngineConfig::load_or_default().context("failed to load user settings"),
    }
}

/// Read a project file (TOML).
///
/// Relative clip paths are resolved against the directory holding the
/// project, so a project and its audio can move together.
pub fn load_project(path: &Path) -> anyhow::Result<Project> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read project {}", path.display()))?;
    let mut project: Project = toml::from_str(&text)
        .with_context(|| format!("failed to parse project {}", path.display()))?;

    let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
    for clip in project.tracks.iter_mut().flat_map(|t| t.clips.iter_mut()) {
        if let SourceRef::Path(source) = &clip.source
            && source.is_relative()
        {
            clip.source = SourceRef::Path(resolve(&base, source));
        }
    }
    Ok(project)
}

fn resolve(base: &Path, source: &Path) -> PathBuf {
    if base.as_os_str().is_empty() {
        source.to_path_buf()
    } else {
        base.join(source)
    }
}

/// Install a Ctrl+C handler. The returned flag goes false once it fires.
pub fn interrupt_flag() -> anyhow::Result<Arc<AtomicBool>> {
    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .context("failed to install the Ctrl+C handler")?;
    Ok(running)
}

/// A progress bar over `len` units with the shared CLI style.
pub fn progress_bar(len: u64) -> anyhow::Result<ProgressBar> {
    let bar = ProgressBar::new(len);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {percent}% ({eta})")
            .context("invalid progress template")?
            .progress_chars("=> "),
    );
    Ok(bar)
}

/// Write `bytes` to `path`, naming the file on failure.
pub fn write_output(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    std::fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_clip_paths_follow_the_project() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("song.toml");
        std::fs::write(
            &path,
            r#"
name = "Song"
bpm = 96.0

[[tracks]]
id = "drums"
name = "Drums"

[[tracks.clips]]
id = "loop"
source = { path = "audio/loop.wav" }
start_time = 0.0
duration = 4.0

[[tracks.clips]]
id = "fill"
source = { path = "/abs/fill.wav" }
start_time = 4.0
duration = 1.0
"#,
        )
        .unwrap();

        let project = load_project(&path).unwrap();
        assert_eq!(project.bpm, 96.0);
        let clips = &project.tracks[0].clips;
        assert_eq!(clips[0].source, SourceRef::path(dir.path().join("audio/loop.wav")));
        assert_eq!(clips[1].source, SourceRef::path("/abs/fill.wav"));
    }

    #[test]
    fn missing_project_names_the_file() {
        let err = load_project(Path::new("/nonexistent/song.toml")).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/song.toml"));
    }

    #[test]
    fn explicit_config_is_validated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        std::fs::write(&path, "[render]\nchannels = 6\n").unwrap();
        assert!(load_config(Some(&path)).is_err());

        std::fs::write(&path, "[render]\nsample_rate = 22050\n").unwrap();
        assert_eq!(load_config(Some(&path)).unwrap().render.sample_rate, 22_050);
    }
}
