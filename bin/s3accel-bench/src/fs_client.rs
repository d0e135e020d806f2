//! Object client serving a local directory as a single bucket

use std::io::SeekFrom;
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use s3accel_common::{BucketName, Error, ObjectMetadata, ObjectUri, Result};
use s3accel_io::{ObjectClient, ObjectContent, Range};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

/// Maps `s3://<bucket>/<key>` to `<root>/<key>`
pub struct FsObjectClient {
    root: PathBuf,
    bucket: BucketName,
}

impl FsObjectClient {
    pub fn new(root: impl Into<PathBuf>, bucket: BucketName) -> Self {
        Self {
            root: root.into(),
            bucket,
        }
    }

    fn path_for(&self, uri: &ObjectUri) -> Result<PathBuf> {
        if uri.bucket() != &self.bucket {
            return Err(not_found(uri));
        }

        let key = Path::new(uri.key().as_str());
        if key
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(Error::invalid_argument(format!(
                "key {} escapes the bucket directory",
                uri.key()
            )));
        }
        Ok(self.root.join(key))
    }
}

fn not_found(uri: &ObjectUri) -> Error {
    Error::ObjectNotFound {
        bucket: uri.bucket().to_string(),
        key: uri.key().to_string(),
    }
}

fn map_io(uri: &ObjectUri, err: std::io::Error) -> Error {
    if err.kind() == std::io::ErrorKind::NotFound {
        not_found(uri)
    } else {
        Error::Io(err)
    }
}

#[async_trait]
impl ObjectClient for FsObjectClient {
    async fn head_object(&self, uri: &ObjectUri) -> Result<ObjectMetadata> {
        let path = self.path_for(uri)?;
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| map_io(uri, e))?;
        if !meta.is_file() {
            return Err(not_found(uri));
        }

        let mut metadata = ObjectMetadata::new(meta.len());
        if let Ok(modified) = meta.modified()
            && let Ok(age) = modified.duration_since(UNIX_EPOCH)
        {
            metadata = metadata.with_etag(format!("{:x}-{:x}", meta.len(), age.as_nanos()));
        }
        Ok(metadata)
    }

    async fn get_object(&self, uri: &ObjectUri, range: Option<Range>) -> Result<ObjectContent> {
        let path = self.path_for(uri)?;
        let mut file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| map_io(uri, e))?;
        let size = file.metadata().await?.len();

        let body = match range {
            None => file.take(size),
            Some(range) => {
                if range.start() >= size {
                    return Err(Error::transport(format!(
                        "range {range} not satisfiable for {uri} ({size} bytes)"
                    )));
                }
                file.seek(SeekFrom::Start(range.start())).await?;
                let end = range.end().min(size - 1);
                file.take(end - range.start() + 1)
            }
        };

        Ok(ObjectContent::new(
            ReaderStream::new(body).map_err(Error::from).boxed(),
        ))
    }
}
