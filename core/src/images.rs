use std::path::{Path, PathBuf};

use thiserror::Error;
use time::OffsetDateTime;
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

/// Name prefix of every image file this application creates.
pub const IMAGE_PREFIX: &str = "RECIPE_";
/// Extension of every image file this application creates.
pub const IMAGE_EXTENSION: &str = ".jpg";

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("image source {0} is not a regular file")]
    NotAFile(PathBuf),
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Whether `name` follows the managed image naming convention.
///
/// Only files matching this are ever considered for deletion, so it must
/// stay identical across releases.
pub fn is_managed_image(name: &str) -> bool {
    name.starts_with(IMAGE_PREFIX) && name.ends_with(IMAGE_EXTENSION)
}

/// Final path component of an image reference.
///
/// `file:///data/files/RECIPE_1.jpg` and `/data/files/RECIPE_1.jpg` both
/// yield `RECIPE_1.jpg`. A reference without any `/` is returned whole.
/// The name is taken verbatim, whitespace included.
pub fn reference_file_name(reference: &str) -> Option<&str> {
    let name = reference.rsplit('/').next()?;
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// Build a fresh file name like `RECIPE_20240131_093000_1a2b3c4d.jpg`.
pub fn new_image_file_name(now: OffsetDateTime) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{IMAGE_PREFIX}{:04}{:02}{:02}_{:02}{:02}{:02}_{}{IMAGE_EXTENSION}",
        now.year(),
        u8::from(now.month()),
        now.day(),
        now.hour(),
        now.minute(),
        now.second(),
        &suffix[..8]
    )
}

/// `file://` URI for an absolute path.
pub fn file_uri(path: &Path) -> String {
    format!("file://{}", path.display())
}

/// Copy `source` into the image directory under a fresh managed name and
/// return the reference to store on the recipe.
pub async fn import_image<P: AsRef<Path>>(dir: P, source: &Path) -> Result<String, ImageError> {
    let dir = dir.as_ref();
    let meta = fs::metadata(source).await.map_err(|source_err| ImageError::Io {
        path: source.to_path_buf(),
        source: source_err,
    })?;
    if !meta.is_file() {
        return Err(ImageError::NotAFile(source.to_path_buf()));
    }
    fs::create_dir_all(dir).await.map_err(|e| ImageError::Io {
        path: dir.to_path_buf(),
        source: e,
    })?;
    let dest = dir.join(new_image_file_name(OffsetDateTime::now_utc()));
    fs::copy(source, &dest).await.map_err(|e| ImageError::Io {
        path: dest.clone(),
        source: e,
    })?;
    let dest = fs::canonicalize(&dest).await.map_err(|e| ImageError::Io {
        path: dest.clone(),
        source: e,
    })?;
    debug!(file = %dest.display(), "imported recipe image");
    Ok(file_uri(&dest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn managed_pattern_is_exact() {
        assert!(is_managed_image("RECIPE_1.jpg"));
        assert!(is_managed_image("RECIPE_20240101_120000_abc.jpg"));
        assert!(!is_managed_image("notes.txt"));
        assert!(!is_managed_image("recipe_1.jpg"));
        assert!(!is_managed_image("RECIPE_1.jpeg"));
        assert!(!is_managed_image("RECIPE_1.jpg.bak"));
        assert!(is_managed_image("RECIPE_.jpg"));
        assert!(!is_managed_image("PHOTO_RECIPE_1.jpg"));
    }

    #[test]
    fn reference_names() {
        assert_eq!(
            reference_file_name("file:///dir/RECIPE_1.jpg"),
            Some("RECIPE_1.jpg")
        );
        assert_eq!(reference_file_name("/a/b/RECIPE_2.jpg"), Some("RECIPE_2.jpg"));
        assert_eq!(reference_file_name("RECIPE_3.jpg"), Some("RECIPE_3.jpg"));
        assert_eq!(reference_file_name(""), None);
        assert_eq!(reference_file_name("file:///dir/"), None);
        assert_eq!(
            reference_file_name("file:///dir/RECIPE_4.jpg "),
            Some("RECIPE_4.jpg ")
        );
    }

    #[test]
    fn generated_names_are_managed() {
        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let name = new_image_file_name(now);
        assert!(name.starts_with("RECIPE_20231114_221320_"), "{name}");
        assert!(is_managed_image(&name));
        assert_ne!(name, new_image_file_name(now));
    }

    #[tokio::test]
    async fn import_copies_into_dir() {
        let src_dir = tempfile::tempdir().unwrap();
        let src = src_dir.path().join("photo.jpg");
        std::fs::write(&src, b"jpeg").unwrap();
        let store = tempfile::tempdir().unwrap();

        let reference = import_image(store.path().join("files"), &src).await.unwrap();
        assert!(reference.starts_with("file://"));
        let name = reference_file_name(&reference).unwrap();
        assert!(is_managed_image(name));
        let copied = store.path().join("files").join(name);
        assert_eq!(std::fs::read(copied).unwrap(), b"jpeg");
    }

    #[tokio::test]
    async fn import_rejects_directories() {
        let store = tempfile::tempdir().unwrap();
        let err = import_image(store.path(), store.path()).await.unwrap_err();
        assert!(matches!(err, ImageError::NotAFile(_)));
    }
}
