//! Default resolution for a whole guest.
//!
//! [`set_defaults`] fills in everything the caller left unspecified from
//! the OS variant metadata, host capabilities and what the connection
//! supports. The passes run in a fixed order because later passes read
//! earlier results (disk buses decide disk targets, spice graphics decide
//! the video model). Every pass only replaces unset or placeholder values,
//! so running the whole set again changes nothing.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::devices::{
    CharDevice, Device, DeviceContext, DeviceId, DeviceKind, VirtualController, VirtualDevice,
    VirtualDisk, VirtualInput, ADDRESS_TYPE_SPAPR_VIO,
};
use crate::domain::DomainOs;
use crate::error::{GuestError, Result};
use crate::guest::Guest;
use crate::osdict::OsKey;
use crate::support::{check_conn_hv_support, check_conn_support, CompatMode, SupportFeature};
use crate::traits::Connection;
use crate::types::HostCapabilities;

const XEN_HVMLOADER: &str = "/usr/lib/xen/boot/hvmloader";
const XEN_QEMU_DM_64: &str = "/usr/lib64/xen/bin/qemu-dm";
const XEN_QEMU_DM: &str = "/usr/lib/xen/bin/qemu-dm";
const DRIVER_TAP: &str = "tap";

/// Run every default pass over `guest`.
pub(crate) fn set_defaults(guest: &mut Guest) -> Result<()> {
    set_osxml_defaults(guest)?;
    set_clock_defaults(guest)?;
    set_emulator_defaults(guest)?;
    set_cpu_defaults(guest)?;

    let compat = guest.compat_mode();
    debug!(?compat, variant = ?guest.os_variant(), "Resolving guest defaults");

    set_feature_defaults(guest, compat)?;
    set_device_defaults(guest, compat)?;
    add_implied_controllers(guest)?;
    check_address_multi(guest)?;
    set_disk_defaults(guest, compat)?;
    set_net_defaults(guest, compat)?;
    set_input_defaults(guest)?;
    set_sound_defaults(guest, compat)?;
    set_video_defaults(guest, compat)?;
    Ok(())
}

fn hv_type(guest: &Guest) -> String {
    guest.guest_type().unwrap_or_default()
}

fn host_capabilities(conn: &dyn Connection) -> HostCapabilities {
    conn.host_capabilities().unwrap_or_else(|e| {
        warn!(error = %e, "Could not read host capabilities, assuming defaults");
        HostCapabilities::default()
    })
}

/// True when virtio devices can be used for the OS variant `key` flag.
pub(crate) fn can_virtio(guest: &Guest, key: OsKey, compat: CompatMode) -> bool {
    if !guest.conn.is_qemu() {
        return false;
    }
    if !guest.lookup_osdict_key(key).as_bool() {
        return false;
    }
    if guest.os.is_x86() {
        return true;
    }
    guest.os.is_arm_vexpress()
        && guest.os.dtb().is_some()
        && guest.lookup_osdict_key(OsKey::VirtioMmio).as_bool()
        && check_conn_support(guest.conn.as_ref(), SupportFeature::ConnVirtioMmio, compat)
}

// =============================================================================
// GUEST-LEVEL PASSES
// =============================================================================

fn set_osxml_defaults(guest: &mut Guest) -> Result<()> {
    let hv_type = hv_type(guest);

    if guest.os.is_container() && guest.os.init().is_none() {
        let root_fs = guest
            .devices
            .iter()
            .filter_map(|(_, dev)| dev.as_filesystem())
            .any(|fs| fs.target_dir().as_deref() == Some("/"));
        let init = if root_fs { "/sbin/init" } else { "/bin/sh" };
        guest.os.set_init(Some(init))?;
    }

    if guest.os.loader().is_none() && guest.os.is_hvm() && hv_type == "xen" {
        guest.os.set_loader(Some(XEN_HVMLOADER))?;
    }
    // libvirt's xen driver still expects the older name
    if guest.os.os_type().as_deref() == Some(DomainOs::TYPE_XEN) && hv_type == "xen" {
        guest.os.set_os_type(Some(DomainOs::TYPE_LINUX))?;
    }
    if guest.os.kernel().is_some() || guest.os.init().is_some() {
        guest.os.set_bootorder::<&str>(&[]);
    }
    if guest.os.machine().is_none() && guest.os.is_ppc64() {
        guest.os.set_machine(Some("pseries"))?;
    }
    Ok(())
}

fn set_clock_defaults(guest: &mut Guest) -> Result<()> {
    if !guest.os.is_hvm() || guest.clock.offset().is_some() {
        return Ok(());
    }
    let offset = guest.lookup_osdict_key(OsKey::Clock).as_str().unwrap_or("utc");
    guest.clock.set_offset(Some(offset))
}

fn set_emulator_defaults(guest: &mut Guest) -> Result<()> {
    if guest.os.is_xenpv() {
        return guest.set_emulator(None);
    }
    if guest.emulator().is_some() {
        return Ok(());
    }
    if guest.os.is_hvm() && hv_type(guest) == "xen" {
        let emulator = if host_capabilities(guest.conn.as_ref()).arch == "x86_64" {
            XEN_QEMU_DM_64
        } else {
            XEN_QEMU_DM
        };
        guest.set_emulator(Some(emulator))?;
    }
    Ok(())
}

fn set_cpu_defaults(guest: &mut Guest) -> Result<()> {
    let vcpus = guest.vcpus().unwrap_or(1);
    guest.cpu.set_topology_defaults(vcpus)
}

fn set_feature_defaults(guest: &mut Guest, compat: CompatMode) -> Result<()> {
    if guest.os.is_container() {
        guest.features.set_acpi(None)?;
        guest.features.set_apic(None)?;
        guest.features.set_pae(None)?;
        return Ok(());
    }
    if !guest.os.is_hvm() {
        return Ok(());
    }

    let skip_acpi = guest.lookup_osdict_key(OsKey::XenDisableAcpi).as_bool()
        && check_conn_hv_support(
            guest.conn.as_ref(),
            SupportFeature::HvSkipDefaultAcpi,
            &hv_type(guest),
            compat,
        );

    if guest.features.acpi().is_none() {
        let acpi = !skip_acpi && guest.lookup_osdict_key(OsKey::Acpi).as_bool();
        guest.features.set_acpi(Some(acpi))?;
    }
    if guest.features.apic().is_none() {
        let apic = !skip_acpi && guest.lookup_osdict_key(OsKey::Apic).as_bool();
        guest.features.set_apic(Some(apic))?;
    }
    if guest.features.pae().is_none() {
        let pae = host_capabilities(guest.conn.as_ref()).supports_pae;
        guest.features.set_pae(Some(pae))?;
    }
    Ok(())
}

// =============================================================================
// DEVICE PASSES
// =============================================================================

fn set_device_defaults(guest: &mut Guest, compat: CompatMode) -> Result<()> {
    let hv_type = hv_type(guest);
    let ctx = DeviceContext {
        conn: guest.conn.as_ref(),
        os: &guest.os,
        hv_type: &hv_type,
        compat,
    };
    for (_, dev) in guest.devices.iter_mut() {
        dev.set_defaults(&ctx)?;
    }
    Ok(())
}

fn add_implied_controllers(guest: &mut Guest) -> Result<()> {
    let is_spapr = |dev: &Device| dev.address().address_type().as_deref() == Some(ADDRESS_TYPE_SPAPR_VIO);

    let spapr_disk = guest
        .devices
        .iter()
        .any(|(_, dev)| dev.kind() == DeviceKind::Disk && is_spapr(dev));
    let spapr_ctrl = guest
        .devices
        .iter()
        .any(|(_, dev)| dev.kind() == DeviceKind::Controller && is_spapr(dev));

    if spapr_disk && !spapr_ctrl {
        debug!("Adding spapr-vio SCSI controller");
        let mut ctrl = VirtualController::with_type(VirtualController::TYPE_SCSI);
        ctrl.address_mut().set_addrstr(ADDRESS_TYPE_SPAPR_VIO)?;
        guest.add_device(ctrl);
    }
    Ok(())
}

/// Reject two devices on one PCI function, and mark function 0 of a slot
/// shared by several functions as multifunction.
fn check_address_multi(guest: &mut Guest) -> Result<()> {
    let mut slots: BTreeMap<(i64, i64, i64), BTreeMap<i64, DeviceId>> = BTreeMap::new();

    for (id, dev) in &guest.devices {
        let Some(slot) = dev.address().pci_slot() else {
            continue;
        };
        let function = dev.address().function().unwrap_or(0);
        let functions = slots.entry(slot).or_default();
        if let Some(first) = functions.get(&function) {
            let first = guest.device(*first).map(Device::describe).unwrap_or_default();
            return Err(GuestError::AddressConflict {
                first,
                second: dev.describe(),
            });
        }
        functions.insert(function, *id);
    }

    for functions in slots.values() {
        if functions.len() < 2 {
            continue;
        }
        if let Some(dev) = functions.get(&0).and_then(|id| guest.device_mut(*id)) {
            dev.address_mut().set_multifunction(Some(true))?;
        }
    }
    Ok(())
}

fn default_disk_bus(
    os: &DomainOs,
    disk: &VirtualDisk,
    virtio: bool,
    os_disk_bus: Option<&'static str>,
) -> &'static str {
    if disk.is_floppy() {
        return "fdc";
    }
    if os.is_xenpv() {
        return "xen";
    }
    if !os.is_hvm() {
        return "ide";
    }
    match os_disk_bus {
        _ if virtio && disk.is_disk() => "virtio",
        Some(bus) if disk.is_disk() => bus,
        _ if os.is_pseries() => "scsi",
        _ if os.is_arm() => "sd",
        _ => "ide",
    }
}

fn set_disk_defaults(guest: &mut Guest, compat: CompatMode) -> Result<()> {
    let virtio = can_virtio(guest, OsKey::VirtioDisk, compat);
    let os_disk_bus = guest.lookup_osdict_key(OsKey::DiskBus).as_str();
    let blktap = guest.os.is_xenpv() && host_capabilities(guest.conn.as_ref()).blktap_capable;

    let mut used_targets: Vec<String> = Vec::new();
    for (_, dev) in guest.devices.iter_mut() {
        let Some(disk) = dev.as_disk_mut() else {
            continue;
        };
        if disk.bus().is_none() {
            let bus = default_disk_bus(&guest.os, disk, virtio, os_disk_bus);
            disk.set_bus(Some(bus))?;
        }
        if blktap
            && disk.disk_type().as_deref() == Some(VirtualDisk::TYPE_FILE)
            && disk.driver_name().is_none()
        {
            disk.set_driver_name(Some(DRIVER_TAP))?;
        }
        let target = match disk.target() {
            Some(target) => target,
            None => disk.generate_target(&used_targets)?,
        };
        used_targets.push(target);
    }
    Ok(())
}

fn set_net_defaults(guest: &mut Guest, compat: CompatMode) -> Result<()> {
    let model = if !guest.os.is_hvm() {
        None
    } else if can_virtio(guest, OsKey::VirtioNet, compat) {
        Some("virtio")
    } else {
        guest.lookup_osdict_key(OsKey::NetModel).as_str()
    };
    let Some(model) = model else {
        return Ok(());
    };

    for (_, dev) in guest.devices.iter_mut() {
        if let Some(net) = dev.as_interface_mut() {
            if net.model().is_none() {
                net.set_model(Some(model))?;
            }
        }
    }
    Ok(())
}

fn set_input_defaults(guest: &mut Guest) -> Result<()> {
    let (input_type, input_bus) = if guest.os.is_xenpv() {
        (VirtualInput::TYPE_MOUSE, VirtualInput::BUS_XEN)
    } else {
        (
            guest
                .lookup_osdict_key(OsKey::InputType)
                .as_str()
                .unwrap_or(VirtualInput::TYPE_MOUSE),
            guest
                .lookup_osdict_key(OsKey::InputBus)
                .as_str()
                .unwrap_or(VirtualInput::BUS_PS2),
        )
    };

    for (_, dev) in guest.devices.iter_mut() {
        if let Some(input) = dev.as_input_mut() {
            if input.is_unresolved() {
                input.set_input_type(Some(input_type))?;
                input.set_bus(Some(input_bus))?;
            }
        }
    }
    Ok(())
}

fn set_sound_defaults(guest: &mut Guest, compat: CompatMode) -> Result<()> {
    let hv_type = hv_type(guest);
    let conn = guest.conn.as_ref();
    let model = if check_conn_hv_support(conn, SupportFeature::HvSoundIch6, &hv_type, compat) {
        "ich6"
    } else if check_conn_hv_support(conn, SupportFeature::HvSoundAc97, &hv_type, compat) {
        "ac97"
    } else {
        "es1370"
    };

    for (_, dev) in guest.devices.iter_mut() {
        if let Some(sound) = dev.as_sound_mut() {
            if sound.is_default_model() {
                sound.set_model(Some(model))?;
            }
        }
    }
    Ok(())
}

fn set_video_defaults(guest: &mut Guest, compat: CompatMode) -> Result<()> {
    let has_spice = guest
        .devices
        .iter()
        .filter_map(|(_, dev)| dev.as_graphics())
        .any(|gfx| gfx.is_spice());
    let model = if has_spice {
        "qxl"
    } else {
        guest
            .lookup_osdict_key(OsKey::VideoModel)
            .as_str()
            .unwrap_or("cirrus")
    };

    for (_, dev) in guest.devices.iter_mut() {
        if let Some(video) = dev.as_video_mut() {
            if video.is_default_model() {
                video.set_model(Some(model))?;
            }
        }
    }

    let has_agent = guest
        .devices
        .iter()
        .filter_map(|(_, dev)| dev.as_char())
        .any(CharDevice::is_spicevmc_channel);
    if has_spice
        && !has_agent
        && check_conn_support(guest.conn.as_ref(), SupportFeature::HvCharSpicevmc, compat)
    {
        let hv_type = hv_type(guest);
        let mut agent = CharDevice::spicevmc_channel();
        let ctx = DeviceContext {
            conn: guest.conn.as_ref(),
            os: &guest.os,
            hv_type: &hv_type,
            compat,
        };
        agent.set_defaults(&ctx)?;
        debug!("Adding spice agent channel");
        guest.add_device(agent);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::devices::{
        DeviceFilter, VirtualFilesystem, VirtualGraphics, VirtualInterface, VirtualSound,
        VirtualVideo,
    };
    use crate::mock::MockConnection;

    fn kvm_guest(variant: &str) -> Guest {
        let conn = Arc::new(MockConnection::new("qemu:///system"));
        let mut guest = Guest::new(conn);
        guest.set_name(Some("defaults")).unwrap();
        guest.set_guest_type(Some("kvm")).unwrap();
        guest.set_os_variant(variant).unwrap();
        guest.os_mut().set_os_type(Some("hvm")).unwrap();
        guest.os_mut().set_arch(Some("x86_64")).unwrap();
        guest
    }

    fn disk(device: &str, path: &str) -> VirtualDisk {
        VirtualDisk::with_path(device, path).unwrap()
    }

    fn buses(guest: &Guest) -> Vec<(Option<String>, Option<String>)> {
        guest
            .get_devices(DeviceKind::Disk)
            .iter()
            .filter_map(|d| d.as_disk())
            .map(|d| (d.bus(), d.target()))
            .collect()
    }

    #[test]
    fn test_passes_are_idempotent() {
        let mut guest = kvm_guest("fedora18");
        guest.add_device(disk("disk", "/tmp/defaults-idem.img"));
        guest.add_device(disk("cdrom", "/tmp/defaults-idem.iso"));
        guest.add_device(VirtualInterface::new());
        guest.add_device(VirtualGraphics::with_type("spice"));
        guest.add_device(VirtualVideo::new());
        guest.add_device(VirtualSound::new());
        guest.add_device(VirtualInput::new());
        guest.cpu_mut().set_cores(Some(2)).unwrap();
        guest.set_vcpus(Some(4)).unwrap();

        set_defaults(&mut guest).unwrap();
        let once = guest.get_xml_config();
        set_defaults(&mut guest).unwrap();
        assert_eq!(guest.get_xml_config(), once);
        assert_eq!(guest.get_devices(DeviceKind::Channel).len(), 1, "one agent channel only");
    }

    #[test]
    fn test_explicit_values_survive() {
        let mut guest = kvm_guest("fedora18");
        let mut d = disk("disk", "/tmp/defaults-keep.img");
        d.set_bus(Some("ide")).unwrap();
        d.set_target(Some("hdb")).unwrap();
        guest.add_device(d);
        let mut net = VirtualInterface::new();
        net.set_model(Some("e1000")).unwrap();
        guest.add_device(net);
        let mut video = VirtualVideo::new();
        video.set_model(Some("vga")).unwrap();
        guest.add_device(video);
        let mut sound = VirtualSound::new();
        sound.set_model(Some("ac97")).unwrap();
        guest.add_device(sound);
        let mut input = VirtualInput::new();
        input.set_input_type(Some("tablet")).unwrap();
        input.set_bus(Some("usb")).unwrap();
        guest.add_device(input);
        guest.add_device(VirtualGraphics::with_type("spice"));
        guest.set_emulator(Some("/opt/qemu")).unwrap();
        guest.os_mut().set_machine(Some("pc-1.0")).unwrap();
        guest.set_vcpus(Some(4)).unwrap();
        guest.cpu_mut().set_sockets(Some(1)).unwrap();
        guest.cpu_mut().set_cores(Some(2)).unwrap();
        guest.cpu_mut().set_threads(Some(2)).unwrap();
        guest.clock_mut().set_offset(Some("localtime")).unwrap();
        guest.features_mut().set_acpi(Some(false)).unwrap();

        set_defaults(&mut guest).unwrap();

        assert_eq!(buses(&guest), vec![(Some("ide".into()), Some("hdb".into()))]);
        let net = guest.get_devices(DeviceKind::Interface)[0].as_interface().unwrap();
        assert_eq!(net.model().as_deref(), Some("e1000"));
        let video = guest.get_devices(DeviceKind::Video)[0].as_video().unwrap();
        assert_eq!(video.model().as_deref(), Some("vga"));
        let sound = guest.get_devices(DeviceKind::Sound)[0].as_sound().unwrap();
        assert_eq!(sound.model().as_deref(), Some("ac97"));
        let inputs = guest.get_devices(DeviceKind::Input);
        assert_eq!(inputs.len(), 1);
        let input = inputs[0].as_input().unwrap();
        assert_eq!(input.input_type().as_deref(), Some("tablet"));
        assert_eq!(input.bus().as_deref(), Some("usb"));
        assert_eq!(guest.emulator().as_deref(), Some("/opt/qemu"));
        assert_eq!(guest.os().machine().as_deref(), Some("pc-1.0"));
        let cpu = guest.cpu();
        assert_eq!((cpu.sockets(), cpu.cores(), cpu.threads()), (Some(1), Some(2), Some(2)));
        assert_eq!(guest.clock().offset().as_deref(), Some("localtime"));
        assert_eq!(guest.features().acpi(), Some(false));
        assert_eq!(guest.features().apic(), Some(true));
    }

    #[test]
    fn test_disk_buses_and_targets() {
        let mut guest = kvm_guest("fedora18");
        guest.add_device(disk("disk", "/tmp/defaults-a.img"));
        guest.add_device(disk("disk", "/tmp/defaults-b.img"));
        guest.add_device(disk("cdrom", "/tmp/defaults.iso"));
        guest.add_device(disk("floppy", "/tmp/defaults.vfd"));

        set_defaults(&mut guest).unwrap();
        assert_eq!(
            buses(&guest),
            vec![
                (Some("virtio".into()), Some("vda".into())),
                (Some("virtio".into()), Some("vdb".into())),
                (Some("ide".into()), Some("hda".into())),
                (Some("fdc".into()), Some("fda".into())),
            ]
        );
    }

    #[test]
    fn test_generic_variant_avoids_virtio() {
        let mut guest = kvm_guest("generic");
        guest.add_device(disk("disk", "/tmp/defaults-generic.img"));
        guest.add_device(VirtualInterface::new());
        assert!(!can_virtio(&guest, OsKey::VirtioDisk, CompatMode::Upstream));

        set_defaults(&mut guest).unwrap();
        assert_eq!(buses(&guest), vec![(Some("ide".into()), Some("hda".into()))]);
        let net = guest.get_devices(DeviceKind::Interface)[0].as_interface().unwrap();
        assert_eq!(net.model(), None);
    }

    #[test]
    fn test_can_virtio_needs_qemu() {
        let conn = Arc::new(MockConnection::new("xen:///"));
        let mut guest = Guest::new(conn);
        guest.set_os_variant("fedora18").unwrap();
        guest.os_mut().set_os_type(Some("hvm")).unwrap();
        assert!(!can_virtio(&guest, OsKey::VirtioDisk, CompatMode::Upstream));

        let guest = kvm_guest("fedora18");
        assert!(can_virtio(&guest, OsKey::VirtioDisk, CompatMode::Upstream));
    }

    #[test]
    fn test_pci_conflict_and_multifunction() {
        let mut guest = kvm_guest("generic");
        let mut a = VirtualInterface::new();
        a.address_mut().set_addrstr("00:05.0").unwrap();
        let mut b = VirtualInterface::new();
        b.address_mut().set_addrstr("00:05.1").unwrap();
        let a = guest.add_device(a);
        guest.add_device(b);

        check_address_multi(&mut guest).unwrap();
        assert_eq!(guest.device(a).unwrap().address().multifunction(), Some(true));

        let mut c = VirtualSound::new();
        c.address_mut().set_addrstr("00:05.1").unwrap();
        guest.add_device(c);
        let err = check_address_multi(&mut guest).unwrap_err();
        assert!(matches!(err, GuestError::AddressConflict { .. }), "got {err}");
        assert!(err.to_string().contains("sound"));
    }

    #[test]
    fn test_spapr_vio_controller_is_implied() {
        let mut guest = kvm_guest("generic");
        let mut d = disk("disk", "/tmp/defaults-ppc.img");
        d.address_mut().set_addrstr("spapr-vio").unwrap();
        guest.add_device(d);

        add_implied_controllers(&mut guest).unwrap();
        add_implied_controllers(&mut guest).unwrap();
        let ctrls = guest.get_devices(DeviceKind::Controller);
        assert_eq!(ctrls.len(), 1);
        let ctrl = ctrls[0].as_controller().unwrap();
        assert_eq!(ctrl.controller_type().as_deref(), Some("scsi"));
        assert_eq!(ctrl.address().address_type().as_deref(), Some("spapr-vio"));
    }

    #[test]
    fn test_xen_hvm_defaults() {
        let conn = Arc::new(MockConnection::new("xen:///"));
        let mut guest = Guest::new(conn);
        guest.os_mut().set_os_type(Some("hvm")).unwrap();

        set_defaults(&mut guest).unwrap();
        assert_eq!(guest.os().loader().as_deref(), Some(XEN_HVMLOADER));
        assert_eq!(guest.emulator().as_deref(), Some(XEN_QEMU_DM_64));
        assert_eq!(guest.clock().offset().as_deref(), Some("utc"));
        assert_eq!(
            (guest.features().acpi(), guest.features().apic(), guest.features().pae()),
            (Some(true), Some(true), Some(true))
        );
    }

    #[test]
    fn test_xen_pv_defaults() {
        let conn = Arc::new(MockConnection::new("xen:///"));
        let mut guest = Guest::new(conn);
        guest.set_emulator(Some("/usr/bin/qemu-dm")).unwrap();
        guest.add_device(disk("disk", "/tmp/defaults-pv.img"));
        guest.add_default_input_device();

        set_defaults(&mut guest).unwrap();
        assert_eq!(guest.os().os_type().as_deref(), Some("linux"));
        assert_eq!(guest.emulator(), None);
        assert_eq!(buses(&guest), vec![(Some("xen".into()), Some("xvda".into()))]);
        let input = guest.get_devices(DeviceKind::Input)[0].to_xml();
        assert_eq!(input, "<input type=\"mouse\" bus=\"xen\"/>");
    }

    #[test]
    fn test_container_defaults() {
        let conn = Arc::new(MockConnection::new("lxc:///"));
        let mut guest = Guest::new(conn);
        guest.os_mut().set_os_type(Some("exe")).unwrap();
        guest.features_mut().set_acpi(Some(true)).unwrap();
        guest.os_mut().set_bootorder(&["hd"]);

        set_defaults(&mut guest).unwrap();
        assert_eq!(guest.os().init().as_deref(), Some("/bin/sh"));
        assert!(guest.os().bootorder().is_empty());
        assert_eq!(guest.features().acpi(), None);

        let mut guest = Guest::new(Arc::new(MockConnection::new("lxc:///")));
        guest.os_mut().set_os_type(Some("exe")).unwrap();
        let mut fs = VirtualFilesystem::new();
        fs.set_source(Some("/srv/root")).unwrap();
        fs.set_target_dir(Some("/")).unwrap();
        guest.add_device(fs);
        set_defaults(&mut guest).unwrap();
        assert_eq!(guest.os().init().as_deref(), Some("/sbin/init"));
    }

    #[test]
    fn test_ppc64_machine() {
        let mut guest = kvm_guest("generic");
        guest.os_mut().set_arch(Some("ppc64")).unwrap();
        guest.add_device(disk("disk", "/tmp/defaults-ppc64.img"));
        set_defaults(&mut guest).unwrap();
        assert_eq!(guest.os().machine().as_deref(), Some("pseries"));
        assert_eq!(buses(&guest), vec![(Some("scsi".into()), Some("sda".into()))]);
    }

    #[test]
    fn test_video_and_sound_without_spice() {
        let mut guest = kvm_guest("win7");
        guest.add_device(VirtualGraphics::with_type("vnc"));
        guest.add_device(VirtualVideo::new());
        guest.add_device(VirtualSound::new());
        guest.add_device(VirtualInput::new());

        set_defaults(&mut guest).unwrap();
        let xml = guest.get_xml_config();
        assert!(xml.contains("<model type=\"vga\"/>"), "{xml}");
        assert!(xml.contains("<sound model=\"ich6\"/>"), "{xml}");
        assert!(xml.contains("<input type=\"tablet\" bus=\"usb\"/>"), "{xml}");
        assert!(guest.get_devices(DeviceKind::Channel).is_empty());
        assert_eq!(guest.clock().offset().as_deref(), Some("localtime"));
        assert!(guest.get_devices(DeviceFilter::All).len() >= 4);
    }
}
