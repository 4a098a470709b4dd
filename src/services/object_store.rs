//! The two bucket operations a deploy needs, behind a trait so the uploader
//! can run against the real OSS client, the dry-run logger, or a test double.

use crate::{errors::DeployResult, models::object_key::ObjectKey};
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::{io, path::Path, pin::Pin};
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::info;

pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send + Sync>>;

/// Payload handed to `put_object`.
///
/// Owns the open file through `stream`; dropping the body closes the file.
pub struct ObjectBody {
    pub stream: ByteStream,
    pub size_bytes: u64,
    pub content_type: String,
}

impl ObjectBody {
    /// Open `path` for streaming and guess its content type from the extension.
    pub async fn from_file(path: &Path) -> DeployResult<Self> {
        let file = File::open(path).await?;
        let size_bytes = file.metadata().await?.len();
        let content_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        Ok(Self {
            stream: Box::pin(ReaderStream::new(file)),
            size_bytes,
            content_type,
        })
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Remove `key` from the bucket. Succeeds when the key does not exist.
    async fn delete_object(&self, key: &ObjectKey) -> DeployResult<()>;

    /// Store `body` under `key`, replacing any existing object.
    async fn put_object(&self, key: &ObjectKey, body: ObjectBody) -> DeployResult<()>;
}

/// Store used by `--dry-run`: logs each call and never touches the network.
pub struct DryRunStore {
    pub bucket: String,
}

#[async_trait]
impl ObjectStore for DryRunStore {
    async fn delete_object(&self, key: &ObjectKey) -> DeployResult<()> {
        info!(bucket = %self.bucket, %key, "dry run: would delete object");
        Ok(())
    }

    async fn put_object(&self, key: &ObjectKey, body: ObjectBody) -> DeployResult<()> {
        info!(
            bucket = %self.bucket,
            %key,
            size_bytes = body.size_bytes,
            content_type = %body.content_type,
            "dry run: would put object"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use std::path::PathBuf;

    #[tokio::test]
    async fn body_streams_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("site.css");
        tokio::fs::write(&path, b"body { margin: 0 }").await.unwrap();

        let body = ObjectBody::from_file(&path).await.unwrap();
        assert_eq!(body.size_bytes, 18);
        assert_eq!(body.content_type, "text/css");

        let chunks: Vec<Bytes> = body.stream.try_collect().await.unwrap();
        assert_eq!(chunks.concat(), b"body { margin: 0 }");
    }

    #[tokio::test]
    async fn unknown_extension_is_octet_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.unknownext");
        tokio::fs::write(&path, b"").await.unwrap();

        let body = ObjectBody::from_file(&path).await.unwrap();
        assert_eq!(body.size_bytes, 0);
        assert_eq!(body.content_type, "application/octet-stream");
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let err = ObjectBody::from_file(&PathBuf::from("/definitely/not/here.txt"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, crate::errors::DeployError::Io(_)));
    }

    #[tokio::test]
    async fn dry_run_accepts_everything() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.html");
        tokio::fs::write(&path, b"<html></html>").await.unwrap();
        let key = ObjectKey::from_path(dir.path(), &path).unwrap();

        let store = DryRunStore {
            bucket: "site".into(),
        };
        store.delete_object(&key).await.unwrap();
        store
            .put_object(&key, ObjectBody::from_file(&path).await.unwrap())
            .await
            .unwrap();
    }
}
