// src/guest/session.rs

//! Lifecycle of one mounted disk image

use super::{GuestExecutor, Guestfish};
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Exclusive handle on a launched and mounted image
///
/// There is exactly one session per pipeline run. Dropping it shuts the
/// appliance down, whether or not the run succeeded.
pub struct ImageSession<E: GuestExecutor> {
    executor: E,
    image: PathBuf,
    mounted: bool,
    closed: bool,
}

impl ImageSession<Guestfish> {
    /// Attach `image` read-write with libguestfs and start the appliance
    pub fn launch(image: &Path, memory_mb: u32) -> Result<Self> {
        Self::with_executor(image, Guestfish::start(image)?, memory_mb)
    }
}

impl<E: GuestExecutor> ImageSession<E> {
    /// Start the appliance behind `executor`
    pub fn with_executor(image: &Path, executor: E, memory_mb: u32) -> Result<Self> {
        info!("Going to prepare {}", image.display());
        let mut session = Self {
            executor,
            image: image.to_path_buf(),
            mounted: false,
            closed: false,
        };
        session.executor.launch(memory_mb)?;
        Ok(session)
    }

    /// Image this session is attached to
    pub fn image(&self) -> &Path {
        &self.image
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Mount every filesystem of the first operating system found
    ///
    /// Mount points are mounted shortest path first so `/` is in place before
    /// `/boot` and `/boot` before `/boot/efi`.
    pub fn mount_all(&mut self) -> Result<()> {
        let roots = self.executor.inspect_os()?;
        let Some(root) = roots.first() else {
            return Err(Error::NoOSFoundError);
        };
        if roots.len() > 1 {
            warn!("Found {} operating systems, using {}", roots.len(), root);
        }

        let mut mountpoints = self.executor.mountpoints(root)?;
        mountpoints.sort_by_key(|(mount_point, _)| mount_point.len());

        for (mount_point, device) in mountpoints {
            debug!("Mounting {} on {}", device, mount_point);
            if let Err(e) = self.executor.mount(&device, &mount_point) {
                error!("{}", e);
                return Err(Error::MountError {
                    device,
                    mount_point,
                    reason: e.to_string(),
                });
            }
        }

        self.mounted = true;
        Ok(())
    }

    /// Run a shell command in the guest, returning its stdout
    pub fn run(&mut self, command: &str) -> Result<String> {
        debug!("Running in guest: {}", command);
        self.executor.sh(command)
    }

    pub fn mkdir_p(&mut self, path: &str) -> Result<()> {
        self.executor.mkdir_p(path)
    }

    /// Copy a host file or directory into `remote_dir`
    pub fn copy_in(&mut self, local: &Path, remote_dir: &str) -> Result<()> {
        self.executor.copy_in(local, remote_dir).map_err(|e| {
            error!("{}", e);
            Error::StageCopyError {
                source_path: local.display().to_string(),
                destination: remote_dir.to_string(),
                message: e.to_string(),
            }
        })
    }

    /// Relabel `path` with the given file_contexts database
    pub fn selinux_relabel(&mut self, specfile: &str, path: &str) -> Result<()> {
        self.executor
            .selinux_relabel(specfile, path)
            .map_err(|e| Error::RelabelError(e.to_string()))
    }

    /// Shut the appliance down, flushing writes to the image
    pub fn shutdown(mut self) -> Result<()> {
        self.close()
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        debug!("Shutting down guest for {}", self.image.display());
        self.executor.shutdown()
    }
}

impl<E: GuestExecutor> Drop for ImageSession<E> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to shut down guest: {}", e);
        }
    }
}
