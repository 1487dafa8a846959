use std::{
    env,
    fs::File,
    io::{BufReader, Read},
    path::{Path, PathBuf},
};

use sha2::{Digest, Sha256};
use thiserror::Error;

use super::BoxError;

/// Errors raised while bringing a model up.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("model root {path} is not a directory")]
    MissingRoot { path: PathBuf },
    #[error("environment variable {var} is not set")]
    MissingEnv { var: String },
    #[error("model artefact {path} does not exist")]
    MissingArtefact { path: PathBuf },
    #[error("failed to read artefact at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("artefact at {path} expected SHA-256 {expected} but found {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
    #[error("failed to load model: {0}")]
    Model(#[source] BoxError),
}

/// Directory holding a model's artefacts.
///
/// # Examples
///
/// ```
/// use taxon_contract::adapter::ModelRoot;
///
/// let dir = tempfile::tempdir().unwrap();
/// std::fs::write(dir.path().join("weights.bin"), b"\x00").unwrap();
///
/// let root = ModelRoot::new(dir.path()).unwrap();
/// assert!(root.artefact("weights.bin").is_ok());
/// assert!(root.artefact("tokenizer.json").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRoot {
    path: PathBuf,
}

impl ModelRoot {
    /// Use an existing directory as the model root.
    ///
    /// # Errors
    ///
    /// Returns [`InitError::MissingRoot`] unless `path` is a directory.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, InitError> {
        let path = path.into();
        if !path.is_dir() {
            return Err(InitError::MissingRoot { path });
        }
        Ok(Self { path })
    }

    /// Resolve the root as `$var/relative`.
    ///
    /// # Errors
    ///
    /// Returns [`InitError::MissingEnv`] when `var` is unset, otherwise as
    /// for [`ModelRoot::new`].
    pub fn from_env(var: &str, relative: impl AsRef<Path>) -> Result<Self, InitError> {
        let base = env::var_os(var).ok_or_else(|| InitError::MissingEnv {
            var: var.to_owned(),
        })?;
        Self::new(PathBuf::from(base).join(relative))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of a file under the root.
    ///
    /// # Errors
    ///
    /// Returns [`InitError::MissingArtefact`] if the file does not exist.
    pub fn artefact(&self, name: impl AsRef<Path>) -> Result<PathBuf, InitError> {
        let path = self.path.join(name);
        if path.is_file() {
            Ok(path)
        } else {
            Err(InitError::MissingArtefact { path })
        }
    }

    /// Path of a file under the root whose SHA-256 digest matches `sha256`.
    ///
    /// # Errors
    ///
    /// Returns [`InitError::MissingArtefact`], [`InitError::Io`] or
    /// [`InitError::ChecksumMismatch`].
    pub fn verified_artefact(
        &self,
        name: impl AsRef<Path>,
        sha256: &str,
    ) -> Result<PathBuf, InitError> {
        let path = self.artefact(name)?;
        let actual = compute_sha256(&path)?;
        let expected = normalise_hex(sha256);
        if actual == expected {
            Ok(path)
        } else {
            Err(InitError::ChecksumMismatch {
                path,
                expected,
                actual,
            })
        }
    }
}

/// Computes the SHA-256 digest of the file at `path`.
///
/// # Errors
///
/// Returns I/O errors from opening or reading the file.
pub fn compute_sha256(path: &Path) -> Result<String, InitError> {
    let io_error = |source| InitError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(io_error)?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = [0_u8; 8192];
    loop {
        let read = reader.read(&mut buffer).map_err(io_error)?;
        if read == 0 {
            break;
        }
        let chunk = buffer.get(..read).ok_or_else(|| {
            io_error(std::io::Error::other(
                "read reported bytes beyond buffer length",
            ))
        })?;
        hasher.update(chunk);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

fn normalise_hex(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase()
}
