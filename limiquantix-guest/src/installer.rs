//! Installers that need no media fetching.
//!
//! - [`ImportInstaller`] boots an existing disk image. There is no install
//!   phase.
//! - [`PxeInstaller`] network boots the installer, then boots from disk.
//! - [`CdromInstaller`] attaches an ISO image as a transient CD-ROM for the
//!   install boot.

use std::path::Path;

use tracing::{debug, instrument};

use crate::devices::{Device, VirtualDisk};
use crate::domain::DomainOs;
use crate::error::{GuestError, Result};
use crate::guest::Guest;
use crate::traits::{Installer, ProgressMeter};

/// Point the guest at `dev`. The install boot always wins; the final boot
/// keeps a boot order the caller already chose.
fn set_boot_device(os: &mut DomainOs, dev: &str, is_install: bool) {
    if os.is_container() || os.kernel().is_some() {
        return;
    }
    if is_install || os.bootorder().is_empty() {
        debug!(dev, is_install, "Setting boot device");
        os.set_bootorder(&[dev]);
    }
}

/// Boots an existing disk image.
#[derive(Debug, Clone, Default)]
pub struct ImportInstaller;

impl ImportInstaller {
    pub fn new() -> Self {
        Self
    }
}

impl Installer for ImportInstaller {
    fn prepare(&mut self, _guest: &Guest, _meter: &mut dyn ProgressMeter, _scratch_dir: &Path) -> Result<()> {
        Ok(())
    }

    fn has_install_phase(&self) -> bool {
        false
    }

    fn alter_bootconfig(&self, _guest: &Guest, is_install: bool, os: &mut DomainOs) -> Result<()> {
        if !is_install {
            set_boot_device(os, DomainOs::BOOT_HD, false);
        }
        Ok(())
    }
}

/// Network boots the installer.
#[derive(Debug, Clone, Default)]
pub struct PxeInstaller;

impl PxeInstaller {
    pub fn new() -> Self {
        Self
    }
}

impl Installer for PxeInstaller {
    fn prepare(&mut self, guest: &Guest, _meter: &mut dyn ProgressMeter, _scratch_dir: &Path) -> Result<()> {
        if guest.get_devices(crate::devices::DeviceKind::Interface).is_empty() {
            return Err(GuestError::Installer(
                "A network device is required for PXE installs".to_string(),
            ));
        }
        Ok(())
    }

    fn has_install_phase(&self) -> bool {
        true
    }

    fn alter_bootconfig(&self, _guest: &Guest, is_install: bool, os: &mut DomainOs) -> Result<()> {
        let dev = if is_install { DomainOs::BOOT_NETWORK } else { DomainOs::BOOT_HD };
        set_boot_device(os, dev, is_install);
        Ok(())
    }
}

/// Installs from an ISO image attached as a CD-ROM.
#[derive(Debug, Clone)]
pub struct CdromInstaller {
    location: String,
    cdrom: VirtualDisk,
}

impl CdromInstaller {
    pub fn new(location: &str) -> Result<Self> {
        let mut cdrom = VirtualDisk::with_path(VirtualDisk::DEVICE_CDROM, location)?;
        cdrom.set_transient(true);
        Ok(Self {
            location: location.to_string(),
            cdrom,
        })
    }
}

impl Installer for CdromInstaller {
    #[instrument(skip(self, _guest, _meter, _scratch_dir), fields(location = %self.location))]
    fn prepare(&mut self, _guest: &Guest, _meter: &mut dyn ProgressMeter, _scratch_dir: &Path) -> Result<()> {
        if !Path::new(&self.location).exists() {
            return Err(GuestError::Installer(format!(
                "Install media '{}' does not exist",
                self.location
            )));
        }
        Ok(())
    }

    fn has_install_phase(&self) -> bool {
        true
    }

    fn alter_bootconfig(&self, _guest: &Guest, is_install: bool, os: &mut DomainOs) -> Result<()> {
        let dev = if is_install { DomainOs::BOOT_CDROM } else { DomainOs::BOOT_HD };
        set_boot_device(os, dev, is_install);
        Ok(())
    }

    fn install_devices(&self) -> Vec<Device> {
        vec![Device::Disk(self.cdrom.clone())]
    }

    fn location(&self) -> Option<&str> {
        Some(&self.location)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::devices::VirtualInterface;
    use crate::mock::MockConnection;
    use crate::progress::NullMeter;

    fn guest() -> Guest {
        Guest::new(Arc::new(MockConnection::new("qemu:///system")))
    }

    fn hvm_os() -> DomainOs {
        let mut os = DomainOs::new();
        os.set_os_type(Some(DomainOs::TYPE_HVM)).unwrap();
        os
    }

    #[test]
    fn test_import_boots_disk() {
        let installer = ImportInstaller::new();
        assert!(!installer.has_install_phase());

        let mut os = hvm_os();
        installer.alter_bootconfig(&guest(), false, &mut os).unwrap();
        assert_eq!(os.bootorder(), vec!["hd"]);

        let mut os = hvm_os();
        os.set_bootorder(&["cdrom", "hd"]);
        installer.alter_bootconfig(&guest(), false, &mut os).unwrap();
        assert_eq!(os.bootorder(), vec!["cdrom", "hd"], "explicit order is kept");
    }

    #[test]
    fn test_pxe_phases() {
        let installer = PxeInstaller::new();
        let mut os = hvm_os();
        installer.alter_bootconfig(&guest(), true, &mut os).unwrap();
        assert_eq!(os.bootorder(), vec!["network"]);

        let mut os = hvm_os();
        installer.alter_bootconfig(&guest(), false, &mut os).unwrap();
        assert_eq!(os.bootorder(), vec!["hd"]);

        let dir = tempfile::tempdir().unwrap();
        let mut installer = PxeInstaller::new();
        let mut g = guest();
        assert!(installer.prepare(&g, &mut NullMeter, dir.path()).is_err());
        g.add_device(VirtualInterface::new());
        assert!(installer.prepare(&g, &mut NullMeter, dir.path()).is_ok());
    }

    #[test]
    fn test_kernel_boot_is_untouched() {
        let mut os = hvm_os();
        os.set_kernel(Some("/boot/vmlinuz")).unwrap();
        PxeInstaller::new().alter_bootconfig(&guest(), true, &mut os).unwrap();
        assert!(os.bootorder().is_empty());
    }

    #[test]
    fn test_cdrom_media() {
        let dir = tempfile::tempdir().unwrap();
        let iso = dir.path().join("install.iso");
        let mut installer = CdromInstaller::new(iso.to_str().unwrap()).unwrap();
        assert!(
            installer.prepare(&guest(), &mut NullMeter, dir.path()).is_err(),
            "missing media is rejected"
        );

        std::fs::write(&iso, b"iso").unwrap();
        installer.prepare(&guest(), &mut NullMeter, dir.path()).unwrap();
        assert_eq!(installer.location(), iso.to_str());

        let devices = installer.install_devices();
        let cdrom = devices[0].as_disk().unwrap();
        assert!(cdrom.is_cdrom());
        assert!(cdrom.transient());
        assert_eq!(cdrom.path().as_deref(), iso.to_str());

        let mut os = hvm_os();
        installer.alter_bootconfig(&guest(), true, &mut os).unwrap();
        assert_eq!(os.bootorder(), vec!["cdrom"]);
    }
}
