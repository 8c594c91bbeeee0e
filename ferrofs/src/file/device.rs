//! Character devices and the device switch.

use std::sync::Arc;

use crate::{
    error::FsError,
    fs::{FileSystem, Inode, Stat},
    param::NDEV,
};

/// A character device driver.
pub trait CharDevice: Send + Sync {
    fn read(&self, dst: &mut [u8]) -> Result<usize, FsError>;
    fn write(&self, src: &[u8]) -> Result<usize, FsError>;
}

/// The device switch: drivers indexed by major number.
pub(crate) struct DeviceTable {
    devices: [Option<Arc<dyn CharDevice>>; NDEV],
}

impl DeviceTable {
    pub(crate) fn new() -> Self {
        Self {
            devices: [const { None }; NDEV],
        }
    }

    pub(crate) fn register(&mut self, major: i16, driver: Arc<dyn CharDevice>) {
        self.devices[usize::try_from(major).unwrap()] = Some(driver);
    }

    /// Resolves a major number to its driver; majors outside
    /// `[0, NDEV)` or without a registered driver are rejected.
    pub(crate) fn get(&self, major: i16) -> Result<Arc<dyn CharDevice>, FsError> {
        usize::try_from(major)
            .ok()
            .and_then(|major| self.devices.get(major))
            .and_then(Option::as_ref)
            .cloned()
            .ok_or(FsError::NoDevice)
    }
}

/// A device-backed open file.
///
/// Holds the device inode (so its reference count reflects the open
/// file) and the resolved driver.
pub(super) struct DeviceFile {
    driver: Arc<dyn CharDevice>,
    inode: Inode,
}

impl DeviceFile {
    pub(super) fn new(driver: Arc<dyn CharDevice>, inode: Inode) -> Self {
        Self { driver, inode }
    }

    pub(super) fn close(self, fs: &FileSystem) {
        let tx = fs.begin_tx();
        self.inode.into_tx(&tx).put();
    }

    pub(super) fn stat(&self, fs: &FileSystem) -> Stat {
        let tx = fs.begin_readonly_tx();
        let mut ip = self.inode.clone().into_tx(&tx);
        ip.lock().stat()
    }

    pub(super) fn read(&self, dst: &mut [u8]) -> Result<usize, FsError> {
        self.driver.read(dst)
    }

    pub(super) fn write(&self, src: &[u8]) -> Result<usize, FsError> {
        self.driver.write(src)
    }
}
