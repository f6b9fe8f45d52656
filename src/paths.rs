use std::path::{Path, PathBuf};

use crate::error::{EngineError, Result};

/// Turns a recipient display name into a directory segment: lowercase
/// alphanumerics, everything else collapsed to `-`. A name with no usable
/// characters is an error rather than a silent fallback folder.
pub fn slugify(value: &str) -> Result<String> {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if ch.is_alphanumeric() {
            out.extend(ch.to_lowercase());
        } else {
            out.push('-');
        }
    }
    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        return Err(EngineError::UnsafeRecipientName(value.to_string()));
    }
    Ok(trimmed.to_string())
}

/// Maps (recipient, year, number) onto the fixed on-disk layout
/// `<root>/<recipient-slug>/<year>/<number>.pdf`. The layout is a stable
/// contract for external tooling reading the output tree.
#[derive(Debug, Clone)]
pub struct InvoicePaths {
    root: PathBuf,
}

impl InvoicePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Default invoices root under the user's documents folder, matching the
    /// layout the desktop app files into.
    pub fn default_root() -> PathBuf {
        home_dir()
            .join("Documents")
            .join("invoicegen")
            .join("invoices")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn plan(&self, recipient: &str, year: i32, number: i64) -> Result<PathBuf> {
        let slug = slugify(recipient)?;
        Ok(self
            .root
            .join(slug)
            .join(year.to_string())
            .join(format!("{number}.pdf")))
    }

    /// Create-if-absent; succeeding twice is fine.
    pub fn ensure_parent(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

/// Default location for the engine database, under the platform user-data
/// directory.
pub fn default_data_dir() -> PathBuf {
    let base = if cfg!(target_os = "windows") {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| home_dir().join("AppData").join("Roaming"))
    } else if cfg!(target_os = "macos") {
        home_dir().join("Library").join("Application Support")
    } else {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| home_dir().join(".local").join("share"))
    };
    base.join("invoicegen")
}

fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Hands the file to the platform opener. Fire-and-forget: the viewer's
/// exit status is not the engine's concern.
pub(crate) fn open_with_system_viewer(path: &Path) -> Result<()> {
    let (program, args): (&str, Vec<&std::ffi::OsStr>) = if cfg!(target_os = "windows") {
        ("cmd", vec!["/C".as_ref(), "start".as_ref(), "".as_ref(), path.as_os_str()])
    } else if cfg!(target_os = "macos") {
        ("open", vec![path.as_os_str()])
    } else {
        ("xdg-open", vec![path.as_os_str()])
    };
    std::process::Command::new(program).args(args).spawn()?;
    Ok(())
}
