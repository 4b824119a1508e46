use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::AuthError;
use crate::token::OAuthToken;

/// Directory under the user's home holding cached credentials
pub const CREDENTIALS_DIR: &str = ".credentials";

/// Name of the cached token file
pub const CACHE_FILE_NAME: &str = "youtube-secret.json";

/// File-based storage for a single cached token.
///
/// The file is not locked: two processes sharing a path race on write and the
/// last writer wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    /// Resolve the cache file from `secrets_path`, or from `~/.credentials` when it is unset
    pub fn resolve(secrets_path: Option<&Path>) -> Result<Self, AuthError> {
        Self::resolve_in(secrets_path, dirs::home_dir())
    }

    /// Same as [`TokenStore::resolve`] with an explicit home directory
    pub fn resolve_in(
        secrets_path: Option<&Path>,
        home: Option<PathBuf>,
    ) -> Result<Self, AuthError> {
        let dir = match secrets_path.filter(|p| !p.as_os_str().is_empty()) {
            Some(dir) => dir.to_path_buf(),
            None => {
                let home = home.ok_or_else(|| {
                    AuthError::PathResolution(
                        "could not determine the current user's home directory".to_string(),
                    )
                })?;
                let dir = home.join(CREDENTIALS_DIR);
                // A failure here resurfaces as a write error once a token is saved
                if let Err(e) = create_private_dir(&dir) {
                    warn!(
                        "Failed to create credential directory '{}': {}",
                        dir.display(),
                        e
                    );
                }
                dir
            }
        };

        let path = dir.join(urlencoding::encode(CACHE_FILE_NAME).into_owned());
        debug!("Credential cache file: {}", path.display());
        Ok(Self { path })
    }

    /// Create a token store at a specific path
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the cached token
    pub fn load(&self) -> Result<OAuthToken, AuthError> {
        let file = File::open(&self.path).map_err(|source| AuthError::NotFound {
            path: self.path.clone(),
            source,
        })?;

        serde_json::from_reader(BufReader::new(file)).map_err(|e| AuthError::Decode {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }

    /// Save the token, replacing any previous content, readable by the owner only
    pub fn save(&self, token: &OAuthToken) -> Result<(), AuthError> {
        debug!("Saving credential file to: {}", self.path.display());

        self.write_token(token).map_err(|source| AuthError::Write {
            path: self.path.clone(),
            source,
        })
    }

    fn write_token(&self, token: &OAuthToken) -> std::io::Result<()> {
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let file = options.open(&self.path)?;

        // An existing file keeps its old mode on open, so tighten it explicitly
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
        }

        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, token)?;
        writer.write_all(b"\n")?;
        writer.flush()
    }
}

fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(dir)
}
