//! Locating the ffmpeg executable.
//!
//! Resolution order: explicit override from the config, then the bundled copy
//! at `<bundle_dir>/<os>/ffmpeg[.exe]`, then plain `ffmpeg` on the search path.

use std::path::{Path, PathBuf};
use std::process::Command;

use shadercap_common::config::EncoderConfig;
use shadercap_common::error::{ShadercapError, ShadercapResult};

/// Program name used when nothing else resolves.
pub const SEARCH_PATH_BINARY: &str = "ffmpeg";

/// Platforms that ship a bundled encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    Macos,
    Windows,
}

impl Platform {
    /// The platform this binary was built for, if it has a bundled encoder.
    pub fn current() -> Option<Self> {
        Self::from_os(std::env::consts::OS)
    }

    pub fn from_os(os: &str) -> Option<Self> {
        match os {
            "linux" => Some(Self::Linux),
            "macos" => Some(Self::Macos),
            "windows" => Some(Self::Windows),
            _ => None,
        }
    }

    /// Subdirectory of the bundle directory.
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Macos => "macos",
            Self::Windows => "windows",
        }
    }

    pub fn binary_name(self) -> &'static str {
        match self {
            Self::Windows => "ffmpeg.exe",
            Self::Linux | Self::Macos => "ffmpeg",
        }
    }
}

/// Where a resolved binary came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinarySource {
    Configured,
    Bundled,
    SearchPath,
}

/// A resolved encoder executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderBinary {
    pub program: PathBuf,
    pub source: BinarySource,
}

impl EncoderBinary {
    pub fn search_path() -> Self {
        Self {
            program: PathBuf::from(SEARCH_PATH_BINARY),
            source: BinarySource::SearchPath,
        }
    }
}

/// Resolve the encoder for the running platform.
pub fn resolve_encoder(config: &EncoderConfig) -> EncoderBinary {
    let bundle_dir = config.bundled_dir.clone().or_else(default_bundle_dir);
    resolve_with(config, Platform::current(), bundle_dir.as_deref())
}

/// Resolution with the platform and bundle directory made explicit.
pub fn resolve_with(
    config: &EncoderConfig,
    platform: Option<Platform>,
    bundle_dir: Option<&Path>,
) -> EncoderBinary {
    if let Some(program) = &config.binary {
        tracing::debug!(program = %program.display(), "Using configured encoder");
        return EncoderBinary {
            program: program.clone(),
            source: BinarySource::Configured,
        };
    }

    let Some(platform) = platform else {
        tracing::warn!(
            os = std::env::consts::OS,
            "No bundled encoder for this platform; using ffmpeg from PATH"
        );
        return EncoderBinary::search_path();
    };

    if let Some(dir) = bundle_dir {
        let candidate = dir.join(platform.dir_name()).join(platform.binary_name());
        if candidate.is_file() {
            tracing::debug!(program = %candidate.display(), "Using bundled encoder");
            return EncoderBinary {
                program: candidate,
                source: BinarySource::Bundled,
            };
        }
        tracing::debug!(
            missing = %candidate.display(),
            "Bundled encoder not found; using ffmpeg from PATH"
        );
    }
    EncoderBinary::search_path()
}

/// `bin/` next to the running executable.
fn default_bundle_dir() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    exe.parent().map(|dir| dir.join("bin"))
}

/// Run `<encoder> -version` and return its first output line.
pub fn encoder_version(binary: &EncoderBinary) -> ShadercapResult<String> {
    let output = Command::new(&binary.program)
        .arg("-version")
        .output()
        .map_err(|e| {
            ShadercapError::subprocess(
                "version",
                "not started",
                format!("{}: {e}", binary.program.display()),
            )
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !output.status.success() {
        return Err(ShadercapError::subprocess(
            "version",
            output.status.to_string(),
            format!("{stdout}{}", String::from_utf8_lossy(&output.stderr)),
        ));
    }
    Ok(stdout.lines().next().unwrap_or_default().trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_names() {
        assert_eq!(Platform::from_os("linux"), Some(Platform::Linux));
        assert_eq!(Platform::from_os("freebsd"), None);
        assert_eq!(Platform::Windows.binary_name(), "ffmpeg.exe");
        assert_eq!(Platform::Macos.dir_name(), "macos");
    }

    #[test]
    fn test_configured_binary_wins() {
        let config = EncoderConfig {
            binary: Some(PathBuf::from("/opt/ffmpeg/bin/ffmpeg")),
            bundled_dir: None,
        };
        let resolved = resolve_with(&config, Some(Platform::Linux), None);
        assert_eq!(resolved.source, BinarySource::Configured);
        assert_eq!(resolved.program, PathBuf::from("/opt/ffmpeg/bin/ffmpeg"));
    }

    #[test]
    fn test_bundled_binary_used_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let bundled = dir.path().join("linux").join("ffmpeg");
        std::fs::create_dir_all(bundled.parent().unwrap()).unwrap();
        std::fs::write(&bundled, b"").unwrap();

        let resolved = resolve_with(
            &EncoderConfig::default(),
            Some(Platform::Linux),
            Some(dir.path()),
        );
        assert_eq!(resolved.source, BinarySource::Bundled);
        assert_eq!(resolved.program, bundled);
    }

    #[test]
    fn test_missing_bundle_falls_back_to_search_path() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = resolve_with(
            &EncoderConfig::default(),
            Some(Platform::Windows),
            Some(dir.path()),
        );
        assert_eq!(resolved, EncoderBinary::search_path());
    }

    #[test]
    fn test_unknown_platform_uses_search_path() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = resolve_with(&EncoderConfig::default(), None, Some(dir.path()));
        assert_eq!(resolved.source, BinarySource::SearchPath);
    }

    #[test]
    fn test_version_query_reports_missing_binary() {
        let binary = EncoderBinary {
            program: PathBuf::from("/nonexistent/shadercap-ffmpeg"),
            source: BinarySource::Configured,
        };
        let err = encoder_version(&binary).unwrap_err();
        assert!(matches!(err, ShadercapError::Subprocess { .. }));
    }
}
