//! File system utilities

use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::core::models::AppResult;

/// Longest sanitized title, in characters, before the extension is appended
pub const MAX_FILENAME_CHARS: usize = 48;

/// Ensure directory exists
pub fn ensure_dir_exists(path: &Path) -> AppResult<()> {
    if !path.exists() {
        fs::create_dir_all(path)?;
    }
    Ok(())
}

fn is_invisible(c: char) -> bool {
    matches!(
        c,
        '\u{00AD}'
            | '\u{034F}'
            | '\u{061C}'
            | '\u{115F}'
            | '\u{1160}'
            | '\u{17B4}'
            | '\u{17B5}'
            | '\u{180B}'..='\u{180E}'
            | '\u{200B}'..='\u{200F}'
            | '\u{202A}'..='\u{202E}'
            | '\u{2060}'..='\u{206F}'
            | '\u{3164}'
            | '\u{FE00}'..='\u{FE0F}'
            | '\u{FEFF}'
            | '\u{FFA0}'
    )
}

/// Turn a media title into a safe, bounded file stem
pub fn sanitize_filename(filename: &str) -> String {
    let mut cleaned = String::with_capacity(filename.len());

    for c in filename.chars() {
        let mapped = match c {
            c if c.is_control() || is_invisible(c) => continue,
            '<' | '>' | ':' | '"' | '|' | '?' | '*' | '/' | '\\' => '_',
            c => c,
        };
        // collapse runs of underscores
        if mapped == '_' && cleaned.ends_with('_') {
            continue;
        }
        cleaned.push(mapped);
    }

    let trim = |s: &str| -> String {
        s.trim_matches(|c: char| c.is_whitespace() || c == '_' || c == '.')
            .to_string()
    };

    let trimmed = trim(&cleaned);
    let truncated: String = trimmed.chars().take(MAX_FILENAME_CHARS).collect();
    let result = trim(&truncated);

    if result.is_empty() {
        "_".to_string()
    } else {
        result
    }
}

/// `name.ext` for 0, `name-N.ext` otherwise
pub fn numbered_filename(base: &str, n: usize) -> String {
    if n == 0 {
        return base.to_string();
    }
    match base.rfind('.') {
        Some(dot) if dot > 0 => format!("{}-{}{}", &base[..dot], n, &base[dot..]),
        _ => format!("{}-{}", base, n),
    }
}

/// First name in `directory` not taken by an existing entry
pub fn resolve_available_filename(directory: &Path, base: &str) -> String {
    let mut n = 0;
    loop {
        let candidate = numbered_filename(base, n);
        if !directory.join(&candidate).exists() {
            return candidate;
        }
        n += 1;
    }
}

/// Rename, falling back to copy + remove when crossing filesystems
pub fn move_file(from: &Path, to: &Path) -> AppResult<PathBuf> {
    if let Some(parent) = to.parent() {
        ensure_dir_exists(parent)?;
    }

    if let Err(rename_err) = fs::rename(from, to) {
        debug!(
            "Rename {:?} -> {:?} failed ({}), copying instead",
            from, to, rename_err
        );
        fs::copy(from, to)?;
        fs::remove_file(from)?;
    }

    Ok(to.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("Artist - Song"), "Artist - Song");
        assert_eq!(sanitize_filename("What? Why: Because"), "What_ Why_ Because");
        assert_eq!(sanitize_filename("a<>b"), "a_b");
        assert_eq!(sanitize_filename("zero\u{200B}width\u{FEFF}"), "zerowidth");
        assert_eq!(sanitize_filename("tab\tnewline\n"), "tabnewline");
        assert_eq!(sanitize_filename("  ..__hidden__..  "), "hidden");
        assert_eq!(sanitize_filename("???"), "_");
        assert_eq!(sanitize_filename(""), "_");
    }

    #[test]
    fn test_sanitize_truncates_on_char_boundary() {
        let long = "é".repeat(100);
        let sanitized = sanitize_filename(&long);
        assert_eq!(sanitized.chars().count(), MAX_FILENAME_CHARS);

        let spaced = format!("{} tail", "x".repeat(MAX_FILENAME_CHARS - 1));
        // the cut lands right after a space which is trimmed again
        assert_eq!(sanitize_filename(&spaced), "x".repeat(MAX_FILENAME_CHARS - 1));
    }

    #[test]
    fn test_numbered_filename() {
        assert_eq!(numbered_filename("video.mp4", 0), "video.mp4");
        assert_eq!(numbered_filename("video.mp4", 3), "video-3.mp4");
        assert_eq!(numbered_filename("my.song.mp3", 1), "my.song-1.mp3");
        assert_eq!(numbered_filename("noext", 2), "noext-2");
        assert_eq!(numbered_filename(".hidden", 1), ".hidden-1");
    }

    #[test]
    fn test_resolve_available_filename() {
        let dir = tempdir().unwrap();
        assert_eq!(resolve_available_filename(dir.path(), "video.mp4"), "video.mp4");

        fs::write(dir.path().join("video.mp4"), b"a").unwrap();
        fs::write(dir.path().join("video-1.mp4"), b"b").unwrap();
        assert_eq!(resolve_available_filename(dir.path(), "video.mp4"), "video-2.mp4");
    }

    #[test]
    fn test_move_file_creates_parent() -> AppResult<()> {
        let dir = tempdir().unwrap();
        let from = dir.path().join("src.bin");
        let to = dir.path().join("deep").join("dst.bin");
        fs::write(&from, b"payload").unwrap();

        move_file(&from, &to)?;
        assert!(!from.exists());
        assert_eq!(fs::read(&to).unwrap(), b"payload");
        Ok(())
    }
}
