//! Picked image references and the file dialog that produces them.

use std::future::Future;
use std::io;
use std::path::PathBuf;

use tracing::debug;

use crate::events::Eye;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

/// Something that can be resolved to the raw bytes of one picked image.
///
/// `Ok(None)` means the item exists but has nothing to hand over.
pub trait ImageSource: Send + Sync + 'static {
    fn label(&self) -> String;

    fn load_bytes(&self) -> impl Future<Output = io::Result<Option<Vec<u8>>>> + Send;
}

/// A user selected image that has not been read yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickedImageRef {
    path: PathBuf,
}

impl PickedImageRef {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn display_name(&self) -> String {
        self.path
            .file_name()
            .unwrap_or(self.path.as_os_str())
            .to_string_lossy()
            .into_owned()
    }
}

impl ImageSource for PickedImageRef {
    fn label(&self) -> String {
        self.path.display().to_string()
    }

    async fn load_bytes(&self) -> io::Result<Option<Vec<u8>>> {
        let bytes = tokio::fs::read(&self.path).await?;
        debug!(path = %self.path.display(), len = bytes.len(), "read picked image");
        Ok((!bytes.is_empty()).then_some(bytes))
    }
}

/// Open the native file dialog for one eye. `None` when the user cancels.
pub async fn pick_image(eye: Eye) -> Option<PickedImageRef> {
    let title = match eye {
        Eye::Left => "Pick Left Eye Image",
        Eye::Right => "Pick Right Eye Image",
    };
    rfd::AsyncFileDialog::new()
        .set_title(title)
        .add_filter("Images", IMAGE_EXTENSIONS)
        .pick_file()
        .await
        .map(|handle| PickedImageRef::new(handle.path().to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_file_resolves_to_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.png");
        std::fs::write(&path, b"").unwrap();
        let picked = PickedImageRef::new(&path);
        assert!(picked.load_bytes().await.unwrap().is_none());
        assert_eq!(picked.display_name(), "empty.png");
    }

    #[tokio::test]
    async fn vanished_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let picked = PickedImageRef::new(dir.path().join("gone.jpg"));
        let err = picked.load_bytes().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
