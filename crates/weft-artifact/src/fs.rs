use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::{Artifact, ByteStream, Sink, SinkWriteError, render};

/// Filesystem-based sink.
///
/// Deposits artifacts under `{base_path}/{rendered destination}/`. Parent
/// directories are created automatically. Files keep their file name,
/// structured values are written as `value.json`, and list elements go to
/// one numbered subdirectory each so that equally named files never collide.
pub struct FsSink {
  base_path: PathBuf,
}

impl FsSink {
  /// Create a new filesystem sink with the given base path.
  pub fn new(base_path: impl Into<PathBuf>) -> Self {
    Self {
      base_path: base_path.into(),
    }
  }

  fn destination_dir(&self, rendered: &str) -> Result<PathBuf, SinkWriteError> {
    let relative = Path::new(rendered);
    let escapes = relative
      .components()
      .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
      return Err(SinkWriteError::InvalidDestination(rendered.to_string()));
    }
    Ok(self.base_path.join(relative))
  }

  async fn deposit_into(
    &self,
    artifact: &Artifact,
    dir: &Path,
    written: &mut Vec<PathBuf>,
  ) -> Result<(), SinkWriteError> {
    fs::create_dir_all(dir).await.map_err(|source| SinkWriteError::Io {
      path: dir.to_path_buf(),
      source,
    })?;

    match artifact {
      Artifact::File(src) => {
        let name = src
          .file_name()
          .ok_or_else(|| SinkWriteError::InvalidDestination(src.display().to_string()))?;
        let dst = dir.join(name);
        copy_file(src, &dst).await?;
        written.push(dst);
      }
      Artifact::Value(value) => {
        let dst = dir.join("value.json");
        let data = serde_json::to_vec_pretty(value).map_err(|e| SinkWriteError::Io {
          path: dst.clone(),
          source: e.into(),
        })?;
        fs::write(&dst, data)
          .await
          .map_err(|source| SinkWriteError::Io {
            path: dst.clone(),
            source,
          })?;
        written.push(dst);
      }
      Artifact::List(items) => {
        for (index, item) in items.iter().enumerate() {
          let sub = dir.join(index.to_string());
          Box::pin(self.deposit_into(item, &sub, written)).await?;
        }
      }
    }

    Ok(())
  }
}

#[async_trait]
impl Sink for FsSink {
  async fn deposit(
    &self,
    artifact: &Artifact,
    destination: &str,
    context: &serde_json::Value,
  ) -> Result<Vec<PathBuf>, SinkWriteError> {
    let rendered = render(destination, context).map_err(|source| SinkWriteError::Template {
      template: destination.to_string(),
      source,
    })?;
    let dir = self.destination_dir(&rendered)?;

    let mut written = Vec::new();
    self.deposit_into(artifact, &dir, &mut written).await?;

    debug!(destination = %dir.display(), files = written.len(), "artifact_deposited");
    Ok(written)
  }
}

async fn open_stream(path: &Path) -> Result<ByteStream, SinkWriteError> {
  let file = File::open(path).await.map_err(|source| SinkWriteError::Io {
    path: path.to_path_buf(),
    source,
  })?;
  Ok(Box::pin(ReaderStream::new(file)))
}

async fn copy_file(src: &Path, dst: &Path) -> Result<(), SinkWriteError> {
  let io_err = |source| SinkWriteError::Io {
    path: dst.to_path_buf(),
    source,
  };

  let mut stream = open_stream(src).await?;
  let mut file = File::create(dst).await.map_err(io_err)?;

  while let Some(chunk) = stream.next().await {
    let bytes = chunk.map_err(|source| SinkWriteError::Io {
      path: src.to_path_buf(),
      source,
    })?;
    file.write_all(&bytes).await.map_err(io_err)?;
  }

  file.flush().await.map_err(io_err)?;
  Ok(())
}
