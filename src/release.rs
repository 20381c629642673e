// src/release.rs

//! Fedora release identifiers
//!
//! A release is either `rawhide` or `f<N>`. It determines which base image
//! to download and which koji build tag the "latest builds" repository points
//! at. Rawhide has no fixed number, so its dist tag is discovered from the
//! `%define dist_version` line of the fedora-release spec file.

use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use regex::Regex;
use reqwest::blocking::Client;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Connection attempts for the spec file lookup
const LOOKUP_RETRIES: u32 = 10;

/// Pause between lookup attempts
const LOOKUP_RETRY_DELAY: Duration = Duration::from_secs(1);

static FEDORA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^f(\d+)$").expect("static regex"));

static DIST_VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^%define dist_version\s+(\S+)$").expect("static regex"));

/// A Fedora release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    Rawhide,
    Fedora(u32),
}

impl FromStr for Release {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_lowercase();
        if s == "rawhide" {
            return Ok(Self::Rawhide);
        }
        FEDORA_RE
            .captures(&s)
            .and_then(|caps| caps[1].parse().ok())
            .map(Self::Fedora)
            .ok_or_else(|| Error::UnsupportedReleaseError(s.clone()))
    }
}

impl fmt::Display for Release {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rawhide => write!(f, "rawhide"),
            Self::Fedora(n) => write!(f, "f{}", n),
        }
    }
}

impl Release {
    /// URL of the latest published qcow2 for this release
    pub fn image_url(&self, base_url: &str) -> String {
        let base_url = base_url.trim_end_matches('/');
        match self {
            Self::Rawhide => format!(
                "{}/fedora-rawhide-image-test/lastSuccessfulBuild/artifact/Fedora-Rawhide.qcow2",
                base_url
            ),
            Self::Fedora(n) => format!(
                "{0}/fedora-f{1}-image-test/lastSuccessfulBuild/artifact/Fedora-{1}.qcow2",
                base_url, n
            ),
        }
    }

    /// File name the image is saved under (last URL component)
    pub fn image_file_name(&self) -> String {
        match self {
            Self::Rawhide => "Fedora-Rawhide.qcow2".to_string(),
            Self::Fedora(n) => format!("Fedora-{}.qcow2", n),
        }
    }

    pub fn is_rawhide(&self) -> bool {
        matches!(self, Self::Rawhide)
    }

    /// Resolve the koji dist tag (`f<N>`), asking `lookup` for rawhide
    pub fn dist_tag(&self, lookup: &dyn RawhideLookup) -> Result<String> {
        match self {
            Self::Fedora(n) => Ok(format!("f{}", n)),
            Self::Rawhide => {
                let version = lookup.dist_version()?;
                debug!("Rawhide dist version is {}", version);
                Ok(format!("f{}", version))
            }
        }
    }
}

/// Source of the current rawhide dist version
pub trait RawhideLookup {
    fn dist_version(&self) -> Result<String>;
}

/// Extract the `dist_version` value from a fedora-release spec file
pub fn parse_dist_version(spec: &str) -> Option<String> {
    spec.lines()
        .find_map(|line| DIST_VERSION_RE.captures(line))
        .map(|caps| caps[1].to_string())
}

/// Reads the dist version from the fedora-release spec file over HTTP
pub struct HttpRawhideLookup {
    client: Client,
    url: String,
}

impl HttpRawhideLookup {
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::IoError(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: config.rawhide_spec_url.clone(),
        })
    }

    /// Fetch the spec file text
    ///
    /// Connection failures are retried; a non-2xx response yields `None`.
    fn fetch(&self) -> Option<String> {
        for attempt in 1..=LOOKUP_RETRIES {
            match self.client.get(&self.url).send() {
                Ok(response) if response.status().is_success() => return response.text().ok(),
                Ok(response) => {
                    warn!("HTTP {} from {}", response.status(), self.url);
                    return None;
                }
                Err(e) => {
                    debug!("Lookup attempt {} of {} failed: {}", attempt, self.url, e);
                    std::thread::sleep(LOOKUP_RETRY_DELAY);
                }
            }
        }
        warn!("Could not connect to {}", self.url);
        None
    }
}

impl RawhideLookup for HttpRawhideLookup {
    fn dist_version(&self) -> Result<String> {
        info!("Discovering rawhide dist version from {}", self.url);
        let spec = self
            .fetch()
            .ok_or_else(|| Error::UnresolvedRawhideError(format!("no response from {}", self.url)))?;

        parse_dist_version(&spec).ok_or_else(|| {
            Error::UnresolvedRawhideError(format!("no dist_version declaration in {}", self.url))
        })
    }
}
