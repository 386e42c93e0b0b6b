use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

use crate::error::{Error, Result};

pub const SPEC_FILE: &str = "spec.json";
const MAX_SLUG_LEN: usize = 40;

/// Spec folders under `specs_dir`, most recently modified first.
/// A missing `specs_dir` is not an error.
pub fn list_spec_folders(specs_dir: &Path) -> Result<Vec<PathBuf>> {
    if !specs_dir.exists() {
        return Ok(Vec::new());
    }

    let mut folders: Vec<(PathBuf, SystemTime)> = Vec::new();
    for entry in fs::read_dir(specs_dir)? {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if metadata.is_dir() {
            let mtime = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            folders.push((entry.path(), mtime));
        }
    }

    folders.sort_by(|a, b| b.1.cmp(&a.1));
    Ok(folders.into_iter().map(|(path, _)| path).collect())
}

pub fn folder_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Ask the user to choose one of `folders`. Blank input picks the first.
/// Invalid choices are reported and yield `None`.
pub fn pick_spec<R: BufRead, W: Write>(
    folders: &[PathBuf],
    input: &mut R,
    output: &mut W,
) -> Result<Option<PathBuf>> {
    writeln!(output, "\nExisting specs:")?;
    for (i, folder) in folders.iter().enumerate() {
        let default = if i == 0 { " (default)" } else { "" };
        writeln!(output, "  [{}] {}{}", i + 1, folder_name(folder), default)?;
    }
    write!(output, "\nPick a spec [1]: ")?;
    output.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    let choice = line.trim();

    if choice.is_empty() {
        return Ok(folders.first().cloned());
    }

    match choice.parse::<usize>() {
        Ok(n) if n >= 1 && n <= folders.len() => Ok(Some(folders[n - 1].clone())),
        _ => {
            writeln!(output, "Invalid choice: {}", choice)?;
            Ok(None)
        }
    }
}

/// List the folders under `specs_dir` and let the user pick one.
pub fn select_spec<R: BufRead, W: Write>(
    specs_dir: &Path,
    input: &mut R,
    output: &mut W,
) -> Result<Option<PathBuf>> {
    let folders = list_spec_folders(specs_dir)?;
    if folders.is_empty() {
        writeln!(output, "No specs found in {}", specs_dir.display())?;
        return Ok(None);
    }
    pick_spec(&folders, input, output)
}

/// Default folder name for a task: lower-cased, spaces to hyphens, at most 40 chars.
pub fn slugify(task: &str) -> String {
    task.to_lowercase()
        .replace(' ', "-")
        .chars()
        .take(MAX_SLUG_LEN)
        .collect()
}

/// Prompt for the spec folder name (defaulting to the task slug) and create it.
pub fn ask_spec_name<R: BufRead, W: Write>(
    specs_dir: &Path,
    task: &str,
    input: &mut R,
    output: &mut W,
) -> Result<PathBuf> {
    let slug = slugify(task);
    write!(output, "\nSpec folder name [specs/{}]: ", slug)?;
    output.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    let name = match line.trim() {
        "" => slug,
        custom => custom.to_string(),
    };

    if name.is_empty() || Path::new(&name).is_absolute() || name.split('/').any(|p| p == "..") {
        return Err(Error::InvalidSpecName(name));
    }

    let spec_path = specs_dir.join(&name);
    fs::create_dir_all(&spec_path)?;
    debug!(path = %spec_path.display(), "spec folder ready");
    Ok(spec_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Cursor;
    use std::time::Duration;
    use tempfile::TempDir;

    fn make_folder(root: &Path, name: &str, age_secs: u64) -> PathBuf {
        let path = root.join(name);
        fs::create_dir_all(&path).unwrap();
        let mtime = SystemTime::now() - Duration::from_secs(age_secs);
        File::open(&path).unwrap().set_modified(mtime).unwrap();
        path
    }

    #[test]
    fn test_missing_specs_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        let folders = list_spec_folders(&dir.path().join("specs")).unwrap();
        assert!(folders.is_empty());
    }

    #[test]
    fn test_folders_sorted_newest_first() {
        let dir = TempDir::new().unwrap();
        make_folder(dir.path(), "old", 300);
        make_folder(dir.path(), "newest", 10);
        make_folder(dir.path(), "middle", 100);
        fs::write(dir.path().join("stray.txt"), "not a folder").unwrap();

        let folders = list_spec_folders(dir.path()).unwrap();
        let names: Vec<String> = folders.iter().map(|p| folder_name(p)).collect();
        assert_eq!(names, vec!["newest", "middle", "old"]);
    }

    #[test]
    fn test_blank_choice_picks_most_recent() {
        let dir = TempDir::new().unwrap();
        make_folder(dir.path(), "older", 200);
        make_folder(dir.path(), "recent", 5);

        let folders = list_spec_folders(dir.path()).unwrap();
        let mut input = Cursor::new("\n");
        let mut output = Vec::new();
        let picked = pick_spec(&folders, &mut input, &mut output).unwrap();

        assert_eq!(picked, Some(dir.path().join("recent")));
        let shown = String::from_utf8(output).unwrap();
        assert!(shown.contains("[1] recent (default)"));
        assert!(shown.contains("[2] older"));
    }

    #[test]
    fn test_numeric_choice() {
        let folders = vec![PathBuf::from("specs/a"), PathBuf::from("specs/b")];
        let mut input = Cursor::new("2\n");
        let mut output = Vec::new();
        let picked = pick_spec(&folders, &mut input, &mut output).unwrap();
        assert_eq!(picked, Some(PathBuf::from("specs/b")));
    }

    #[test]
    fn test_invalid_choices_are_reported() {
        let folders = vec![PathBuf::from("specs/a")];
        for bad in ["0", "2", "abc", "-1"] {
            let mut input = Cursor::new(format!("{}\n", bad));
            let mut output = Vec::new();
            let picked = pick_spec(&folders, &mut input, &mut output).unwrap();
            assert_eq!(picked, None);
            let shown = String::from_utf8(output).unwrap();
            assert!(shown.contains(&format!("Invalid choice: {}", bad)));
        }
    }

    #[test]
    fn test_select_with_no_specs() {
        let dir = TempDir::new().unwrap();
        let mut input = Cursor::new("");
        let mut output = Vec::new();
        let picked = select_spec(dir.path(), &mut input, &mut output).unwrap();
        assert_eq!(picked, None);
        assert!(String::from_utf8(output).unwrap().contains("No specs found"));
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Fix the Login Bug"), "fix-the-login-bug");
        let long = "Add a very long task description that keeps going and going";
        let slug = slugify(long);
        assert_eq!(slug.chars().count(), 40);
        assert_eq!(slug, "add-a-very-long-task-description-that-ke");
    }

    #[test]
    fn test_slugify_does_not_split_multibyte_chars() {
        let slug = slugify(&"é".repeat(50));
        assert_eq!(slug.chars().count(), 40);
    }

    #[test]
    fn test_ask_spec_name_uses_default_and_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let specs = dir.path().join("specs");

        for _ in 0..2 {
            let mut input = Cursor::new("\n");
            let mut output = Vec::new();
            let path = ask_spec_name(&specs, "Fix the Login Bug", &mut input, &mut output).unwrap();
            assert_eq!(path, specs.join("fix-the-login-bug"));
            assert!(path.is_dir());
            let shown = String::from_utf8(output).unwrap();
            assert!(shown.contains("[specs/fix-the-login-bug]"));
        }
    }

    #[test]
    fn test_ask_spec_name_override() {
        let dir = TempDir::new().unwrap();
        let mut input = Cursor::new("  custom-name  \n");
        let mut output = Vec::new();
        let path = ask_spec_name(dir.path(), "whatever", &mut input, &mut output).unwrap();
        assert_eq!(path, dir.path().join("custom-name"));
        assert!(path.is_dir());
    }

    #[test]
    fn test_ask_spec_name_rejects_escaping_names() {
        let dir = TempDir::new().unwrap();
        let mut input = Cursor::new("../outside\n");
        let mut output = Vec::new();
        let err = ask_spec_name(dir.path(), "task", &mut input, &mut output).unwrap_err();
        assert!(matches!(err, Error::InvalidSpecName(_)));
    }
}
