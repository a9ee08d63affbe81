use anyhow::{Result, bail};
use git2::{DiffFormat, DiffOptions, Repository};
use std::path::Path;

use crate::utils::is_contained_relative;

fn check_relative(file: &str) -> Result<()> {
    if !is_contained_relative(Path::new(file)) {
        bail!("'{file}' is not a path inside the working directory");
    }
    Ok(())
}

/// Unified diff of `file` between HEAD and the working directory, like
/// `git diff HEAD -- <file>`. Empty on any failure.
pub fn file_diff(workdir: &Path, file: &str) -> String {
    diff_against_head(workdir, file).unwrap_or_else(|e| {
        log::debug!("No diff for {file} in {}: {e:#}", workdir.display());
        String::new()
    })
}

fn diff_against_head(workdir: &Path, file: &str) -> Result<String> {
    check_relative(file)?;
    let repo = Repository::open(workdir)?;
    let tree = repo.head()?.peel_to_tree()?;
    let mut opts = DiffOptions::new();
    opts.pathspec(file).disable_pathspec_match(true);
    let diff = repo.diff_tree_to_workdir_with_index(Some(&tree), Some(&mut opts))?;

    let mut patch = Vec::new();
    diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
        if matches!(line.origin(), '+' | '-' | ' ') {
            patch.push(line.origin() as u8);
        }
        patch.extend_from_slice(line.content());
        true
    })?;
    Ok(String::from_utf8_lossy(&patch).into_owned())
}

/// Current on-disk contents of `file`. Empty on any failure.
pub fn file_content(workdir: &Path, file: &str) -> String {
    let read = check_relative(file).and_then(|()| Ok(std::fs::read(workdir.join(file))?));
    match read {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            log::debug!("Cannot read {file} in {}: {e:#}", workdir.display());
            String::new()
        }
    }
}

/// Contents of `file` at HEAD, like `git show HEAD:<file>`. Empty on any failure.
pub fn original_file_content(workdir: &Path, file: &str) -> String {
    head_blob(workdir, file).unwrap_or_else(|e| {
        log::debug!("No HEAD version of {file} in {}: {e:#}", workdir.display());
        String::new()
    })
}

fn head_blob(workdir: &Path, file: &str) -> Result<String> {
    check_relative(file)?;
    let repo = Repository::open(workdir)?;
    let tree = repo.head()?.peel_to_tree()?;
    let entry = tree.get_path(Path::new(file))?;
    let blob = entry.to_object(&repo)?.peel_to_blob()?;
    Ok(String::from_utf8_lossy(blob.content()).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::git::tests::init_test_repo;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn diff_shows_working_changes_for_one_file() {
        let repo = init_test_repo();
        let p = repo.path();
        fs::write(p.join("README.md"), "# Changed\n").unwrap();
        fs::write(p.join("other.txt"), "noise\n").unwrap();

        let diff = file_diff(p, "README.md");
        assert!(diff.contains("diff --git a/README.md b/README.md"));
        assert!(diff.contains("-# Test Repository"));
        assert!(diff.contains("+# Changed"));
        assert!(!diff.contains("other.txt"));
    }

    #[test]
    fn diff_is_empty_for_unchanged_or_invalid_input() {
        let repo = init_test_repo();
        assert_eq!(file_diff(repo.path(), "README.md"), "");
        assert_eq!(file_diff(repo.path(), "../escape"), "");
        let plain = TempDir::new().unwrap();
        assert_eq!(file_diff(plain.path(), "README.md"), "");
    }

    #[test]
    fn reads_current_and_head_versions() {
        let repo = init_test_repo();
        let p = repo.path();
        fs::write(p.join("README.md"), "new text\n").unwrap();

        assert_eq!(file_content(p, "README.md"), "new text\n");
        assert_eq!(original_file_content(p, "README.md"), "# Test Repository\n");
    }

    #[test]
    fn missing_files_read_as_empty() {
        let repo = init_test_repo();
        let p = repo.path();
        fs::write(p.join("fresh.txt"), "x").unwrap();

        assert_eq!(original_file_content(p, "fresh.txt"), "");
        assert_eq!(file_content(p, "absent.txt"), "");
        assert_eq!(file_content(p, "/etc/hostname"), "");
    }
}
