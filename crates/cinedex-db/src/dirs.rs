//! Per-user locations of cinedex files.

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};

/// Directory below the base directory that holds cinedex files.
const APP_DIR_NAME: &str = "cinedex";

/// Kind of per-user directory, following the XDG base directory layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppDir {
    /// `$XDG_CONFIG_HOME/cinedex`, or `~/.config/cinedex`.
    Config,
    /// `$XDG_DATA_HOME/cinedex`, or `~/.local/share/cinedex`.
    Data,
}

impl AppDir {
    const fn xdg_var(self) -> &'static str {
        match self {
            Self::Config => "XDG_CONFIG_HOME",
            Self::Data => "XDG_DATA_HOME",
        }
    }

    const fn home_relative(self) -> &'static str {
        match self {
            Self::Config => ".config",
            Self::Data => ".local/share",
        }
    }

    /// Resolves `file` inside this directory.
    ///
    /// An explicit `dir` overrides the per-user location and holds every
    /// cinedex file directly.
    ///
    /// # Errors
    ///
    /// Returns an error if `dir` is `None` and neither the XDG variable nor
    /// `HOME` gives an absolute path.
    pub fn file(self, dir: Option<&Path>, file: &str) -> Result<PathBuf> {
        self.file_with(dir, file, |key| std::env::var(key).ok())
    }

    fn file_with<F>(self, dir: Option<&Path>, file: &str, lookup: F) -> Result<PathBuf>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(d) = dir {
            return Ok(d.join(file));
        }

        // Relative XDG values are invalid and ignored.
        let base = lookup(self.xdg_var())
            .map(PathBuf::from)
            .filter(|path| path.is_absolute());
        let base = match base {
            Some(base) => base,
            None => match lookup("HOME").filter(|home| !home.is_empty()) {
                Some(home) => PathBuf::from(home).join(self.home_relative()),
                None => bail!("HOME environment variable is not set"),
            },
        };
        Ok(base.join(APP_DIR_NAME).join(file))
    }
}
