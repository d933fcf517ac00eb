use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

const IGNORED_DESTINATION_EXTS: &[&str] = &["jpg", "jpeg", "png", "webp", "json"];

#[derive(Debug, Clone, PartialEq)]
pub enum OutputLine {
    Progress(f64),
    Destination(PathBuf),
    AlreadyDownloaded(PathBuf),
    Merged(PathBuf),
    Other,
}

struct Patterns {
    progress: Regex,
    destination: Regex,
    already: Regex,
    merged: Regex,
}

fn patterns() -> &'static Patterns {
    static P: OnceLock<Patterns> = OnceLock::new();
    P.get_or_init(|| Patterns {
        progress: Regex::new(r"(\d+\.\d+)%").expect("static regex"),
        destination: Regex::new(r"Destination:\s*(.+)$").expect("static regex"),
        already: Regex::new(r"\[download\]\s+(.+?) has already been downloaded").expect("static regex"),
        merged: Regex::new(r#"Merging formats into "(.+)""#).expect("static regex"),
    })
}

fn is_side_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IGNORED_DESTINATION_EXTS.iter().any(|x| e.eq_ignore_ascii_case(x)))
}

/// Classifies one line of yt-dlp output.
pub fn parse_line(line: &str) -> OutputLine {
    let line = line.trim_end();
    let p = patterns();

    if let Some(c) = p.merged.captures(line) {
        return OutputLine::Merged(PathBuf::from(&c[1]));
    }
    if let Some(c) = p.destination.captures(line) {
        let path = PathBuf::from(c[1].trim());
        return if is_side_file(&path) { OutputLine::Other } else { OutputLine::Destination(path) };
    }
    if let Some(c) = p.already.captures(line) {
        let path = PathBuf::from(c[1].trim());
        return if is_side_file(&path) { OutputLine::Other } else { OutputLine::AlreadyDownloaded(path) };
    }
    if let Some(c) = p.progress.captures(line) {
        if let Ok(pct) = c[1].parse::<f64>() {
            return OutputLine::Progress(pct);
        }
    }
    OutputLine::Other
}

/// Accumulates the output path across a whole run.
#[derive(Debug, Default)]
pub struct OutputTracker {
    path: Option<PathBuf>,
    merged: bool,
}

impl OutputTracker {
    /// Feeds one line; returns a progress percentage when the line carries one.
    pub fn observe(&mut self, line: &str) -> Option<f64> {
        match parse_line(line) {
            OutputLine::Progress(pct) => return Some(pct),
            OutputLine::Merged(path) => {
                self.path = Some(path);
                self.merged = true;
            }
            OutputLine::Destination(path) | OutputLine::AlreadyDownloaded(path) if !self.merged => {
                self.path = Some(path);
            }
            _ => {}
        }
        None
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_lines() {
        assert_eq!(parse_line("[download]  42.5% of 3.10MiB at 1.00MiB/s ETA 00:02"), OutputLine::Progress(42.5));
        assert_eq!(
            parse_line("[download] Destination: temp/run-1/Song Name.webm"),
            OutputLine::Destination(PathBuf::from("temp/run-1/Song Name.webm"))
        );
        assert_eq!(
            parse_line("[download] temp/run-1/clip.m4a has already been downloaded"),
            OutputLine::AlreadyDownloaded(PathBuf::from("temp/run-1/clip.m4a"))
        );
        assert_eq!(
            parse_line(r#"[Merger] Merging formats into "temp/run-1/clip.mkv""#),
            OutputLine::Merged(PathBuf::from("temp/run-1/clip.mkv"))
        );
        assert_eq!(parse_line("[youtube] abc: Downloading webpage"), OutputLine::Other);
        assert_eq!(parse_line("[download] 100% of 3.10MiB"), OutputLine::Other);
    }

    #[test]
    fn thumbnails_and_metadata_are_not_outputs() {
        assert_eq!(parse_line("[info] Writing video thumbnail to: x.jpg"), OutputLine::Other);
        assert_eq!(parse_line("[download] Destination: temp/run-1/cover.webp"), OutputLine::Other);
        assert_eq!(parse_line("[download] Destination: temp/run-1/clip.info.JSON"), OutputLine::Other);
    }

    #[test]
    fn last_destination_wins_until_merge() {
        let mut t = OutputTracker::default();
        for line in [
            "[download] Destination: temp/run-1/clip.f137.mp4",
            "[download]   3.0% of 10MiB",
            "[download] Destination: temp/run-1/clip.f140.m4a",
            r#"[Merger] Merging formats into "temp/run-1/clip.mp4""#,
            "[download] Destination: temp/run-1/late.m4a",
        ] {
            t.observe(line);
        }
        assert_eq!(t.path(), Some(Path::new("temp/run-1/clip.mp4")));
    }

    #[test]
    fn observe_reports_progress() {
        let mut t = OutputTracker::default();
        assert_eq!(t.observe("[download]  99.9% of 1MiB"), Some(99.9));
        assert_eq!(t.observe("[download] Destination: a.mp3"), None);
        assert_eq!(t.path(), Some(Path::new("a.mp3")));
    }
}
