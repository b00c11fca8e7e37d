use super::LocalFile;
use std::fs::remove_file;
use std::io;
use std::path::Path;

pub trait FileDeleter {
    /// Delete a single file. If the file does not exist this is not an error.
    fn delete(&self, file_path: &Path) -> io::Result<()>;
}

impl FileDeleter for LocalFile {
    fn delete(&self, file_path: &Path) -> io::Result<()> {
        if !file_path.exists() {
            return Ok(());
        }
        remove_file(file_path)
    }
}

#[cfg(feature = "mocks")]
pub mod mock {
    use crate::mock::MockLocalFile;
    use mockall::predicate;
    use std::path::{Path, PathBuf};

    impl MockLocalFile {
        pub fn should_delete(&mut self, path: &Path) {
            self.expect_delete()
                .with(predicate::eq(PathBuf::from(path)))
                .times(1)
                .returning(|_| Ok(()));
        }
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    fn test_delete_missing_file_is_not_an_error() {
        let deleter = LocalFile;
        let result = deleter.delete(Path::new("/a/path/that/does/not/exist"));
        assert!(result.is_ok());
    }

    #[test]
    fn test_delete_existing_file() {
        let tempdir = tempfile::tempdir().unwrap();
        let path = tempdir.path().join("some_file");
        std::fs::write(&path, "content").unwrap();

        let deleter = LocalFile;
        assert!(deleter.delete(&path).is_ok());
        assert!(!path.exists());
    }
}
