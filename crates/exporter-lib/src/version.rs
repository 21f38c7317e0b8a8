//! Build and version information

use prometheus::{GaugeVec, Opts};
use std::fmt;

/// Values substituted at build time through the environment, with local
/// build defaults.
const REVISION: &str = match option_env!("GCP_EXPORTER_REVISION") {
    Some(v) => v,
    None => "HEAD",
};
const BRANCH: &str = match option_env!("GCP_EXPORTER_BRANCH") {
    Some(v) => v,
    None => "HEAD",
};
const BUILT_AT: &str = match option_env!("GCP_EXPORTER_BUILT_AT") {
    Some(v) => v,
    None => "now",
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    pub name: String,
    pub version: String,
    pub revision: String,
    pub branch: String,
    pub built_at: String,
    pub os: String,
    pub arch: String,
}

impl VersionInfo {
    /// Version info of the running build for the binary `name` at `version`
    pub fn current(name: &str, version: &str) -> Self {
        let built_at = if BUILT_AT == "now" {
            chrono::Utc::now().to_rfc3339()
        } else {
            BUILT_AT.to_string()
        };

        Self {
            name: name.to_string(),
            version: version.to_string(),
            revision: REVISION.to_string(),
            branch: BRANCH.to_string(),
            built_at,
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        }
    }

    /// `gcp-exporter 0.1.0 (abc123)`
    pub fn line(&self) -> String {
        format!("{} {} ({})", self.name, self.version, self.revision)
    }

    pub fn short_line(&self) -> String {
        format!("{} ({})", self.version, self.revision)
    }

    pub fn user_agent(&self) -> String {
        format!(
            "{} {} ({}; {}/{})",
            self.name, self.version, self.branch, self.os, self.arch
        )
    }

    /// Multi-line form shown by `--version`
    pub fn extended(&self) -> String {
        format!(
            "Version:      {}\nGit revision: {}\nGit branch:   {}\nBuilt:        {}\nOS/Arch:      {}/{}\n",
            self.version, self.revision, self.branch, self.built_at, self.os, self.arch
        )
    }

    /// Constant `1` gauge labelled with the build fields
    pub fn collector(&self) -> prometheus::Result<GaugeVec> {
        let build_info = GaugeVec::new(
            Opts::new(
                "gcp_exporter_version_info",
                "A metric with a constant '1' value labeled by different build stats fields.",
            ),
            &["name", "version", "revision", "branch", "built_at", "os", "architecture"],
        )?;
        build_info
            .with_label_values(&[
                self.name.as_str(),
                self.version.as_str(),
                self.revision.as_str(),
                self.branch.as_str(),
                self.built_at.as_str(),
                self.os.as_str(),
                self.arch.as_str(),
            ])
            .set(1.0);
        Ok(build_info)
    }
}

impl fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.line())
    }
}
