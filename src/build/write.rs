//! Output writer: atomic write-then-rename under the site's output directory.

use std::path::{Path, PathBuf};

pub fn write_output(output_dir: &Path, relative_path: &str, contents: &[u8]) -> std::io::Result<PathBuf> {
    let full_path = output_dir.join(relative_path);
    crate::paths::atomic_write(&full_path, contents)?;
    Ok(full_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_nested_output_path_creating_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_output(dir.path(), "blog/post/index.html", b"<html></html>").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"<html></html>");
    }
}
