//! End-to-end tests of document generation and installation against the
//! mock connection.

use std::sync::Arc;

use limiquantix_guest::{
    CdromInstaller, DeviceKind, Guest, GuestError, MockConnection, NullMeter, VirtualDisk,
    VirtualDevice, VirtualGraphics, VirtualInput, VirtualInterface, VirtualSound, VirtualVideo,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("limiquantix_guest=debug")
        .with_test_writer()
        .try_init();
}

fn kvm_guest(conn: Arc<MockConnection>, name: &str, variant: &str) -> Guest {
    let mut guest = Guest::new(conn);
    guest.set_guest_type(Some("kvm")).unwrap();
    guest.set_name(Some(name)).unwrap();
    guest.set_os_variant(variant).unwrap();
    guest.set_memory(Some(1_048_576)).unwrap();
    guest.os_mut().set_os_type(Some("hvm")).unwrap();
    guest.os_mut().set_arch(Some("x86_64")).unwrap();
    guest
}

fn qemu() -> Arc<MockConnection> {
    Arc::new(MockConnection::new("qemu:///system"))
}

#[test]
fn test_unknown_content_survives_roundtrip() {
    init_tracing();
    let xml = "<domain type='kvm' id='7'>\n  <name>keep</name>\n  <metadata>\n    <app:info xmlns:app='http://example.org/app'>42</app:info>\n  </metadata>\n  <memory>524288</memory>\n  <os>\n    <type>hvm</type>\n  </os>\n  <devices>\n    <emulator>/usr/bin/qemu-kvm</emulator>\n    <panic>\n      <address type='isa' iobase='0x505'/>\n    </panic>\n    <disk type='file' device='disk'>\n      <source file='/tmp/keep.img'/>\n      <target dev='vda' bus='virtio'/>\n    </disk>\n  </devices>\n</domain>";
    let mut guest = Guest::from_xml(qemu(), xml).unwrap();
    assert_eq!(guest.name().as_deref(), Some("keep"));
    assert_eq!(guest.maxmemory(), Some(524288));

    guest.set_description(Some("edited")).unwrap();
    let out = guest.get_xml_config();
    assert!(out.contains("<app:info xmlns:app=\"http://example.org/app\">42</app:info>"), "{out}");
    assert!(out.contains("<address type=\"isa\" iobase=\"0x505\"/>"), "{out}");
    assert!(out.contains("<description>edited</description>"), "{out}");
    assert!(out.contains("<source file=\"/tmp/keep.img\"/>"), "{out}");
    assert!(out.contains(" id=\"7\""), "{out}");
}

#[test]
fn test_kvm_spice_guest() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let iso = dir.path().join("spicy.iso");
    std::fs::write(&iso, b"iso").unwrap();

    let mut guest = kvm_guest(qemu(), "spicy", "fedora18")
        .with_installer(Box::new(CdromInstaller::new(iso.to_str().unwrap()).unwrap()));
    let mut disk = VirtualDisk::with_path("disk", "/tmp/spicy.img").unwrap();
    disk.set_driver_cache(Some("none")).unwrap();
    guest.add_device(disk);
    let mut nic = VirtualInterface::new();
    nic.set_macaddr(Some("52:54:00:aa:bb:cc")).unwrap();
    guest.add_device(nic);
    guest.add_device(VirtualGraphics::with_type("spice"));
    guest.add_device(VirtualVideo::new());
    guest.add_device(VirtualSound::new());
    guest.add_device(VirtualInput::new());

    let before = guest.get_xml_config();
    let install = guest.get_install_xml(false).unwrap().unwrap();

    assert!(install.contains("<target dev=\"vda\" bus=\"virtio\"/>"), "{install}");
    assert!(install.contains("<model type=\"virtio\"/>"), "{install}");
    assert!(install.contains("<sound model=\"ich6\"/>"), "{install}");
    assert!(install.contains("<model type=\"qxl\"/>"), "{install}");
    assert!(install.contains("<channel type=\"spicevmc\">"), "{install}");
    assert!(install.contains("<on_reboot>destroy</on_reboot>"), "{install}");
    assert!(install.contains("<boot dev=\"cdrom\"/>"), "{install}");

    let xml = guest.get_config_xml().unwrap();
    assert!(xml.contains("<target dev=\"vda\" bus=\"virtio\"/>"), "{xml}");
    assert!(xml.contains("<sound model=\"ich6\"/>"), "{xml}");
    assert!(xml.contains("<model type=\"qxl\"/>"), "{xml}");
    assert!(xml.contains("spicevmc"), "{xml}");
    assert!(xml.contains("<on_reboot>restart</on_reboot>"), "{xml}");
    assert!(xml.contains("<boot dev=\"hd\"/>"), "{xml}");

    assert_eq!(guest.get_xml_config(), before, "document generation leaves the guest alone");
    assert!(guest.get_devices(DeviceKind::Channel).is_empty());
}

#[test]
fn test_cdrom_install_phases() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let iso = dir.path().join("f18.iso");
    std::fs::write(&iso, b"iso").unwrap();
    let iso = iso.to_str().unwrap().to_string();

    let mut guest = kvm_guest(qemu(), "cd", "fedora18")
        .with_installer(Box::new(CdromInstaller::new(&iso).unwrap()));
    guest.add_device(VirtualDisk::with_path("disk", "/tmp/cd.img").unwrap());

    let install = guest.get_install_xml(false).unwrap().unwrap();
    assert!(install.contains("<boot dev=\"cdrom\"/>"), "{install}");
    assert!(install.contains(&iso), "{install}");
    assert!(install.contains("<on_reboot>destroy</on_reboot>"), "{install}");
    assert!(install.contains("<on_crash>destroy</on_crash>"), "{install}");

    let final_xml = guest.get_config_xml().unwrap();
    assert!(final_xml.contains("<boot dev=\"hd\"/>"), "{final_xml}");
    assert!(!final_xml.contains(&iso), "media is ejected: {final_xml}");
    assert!(final_xml.contains("device=\"cdrom\""), "the drive stays: {final_xml}");
    assert!(final_xml.contains("<on_reboot>restart</on_reboot>"), "{final_xml}");

    assert!(!guest.get_continue_inst());
    assert_eq!(guest.get_devices(DeviceKind::Disk).len(), 1);
}

#[test]
fn test_three_stage_install_keeps_media() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let iso = dir.path().join("xp.iso");
    std::fs::write(&iso, b"iso").unwrap();
    let iso = iso.to_str().unwrap().to_string();

    let mut guest = kvm_guest(qemu(), "xp", "winxp")
        .with_installer(Box::new(CdromInstaller::new(&iso).unwrap()));
    guest.add_device(VirtualDisk::with_path("disk", "/tmp/xp.img").unwrap());
    assert!(guest.get_continue_inst());

    let final_xml = guest.get_config_xml().unwrap();
    assert!(final_xml.contains(&iso), "{final_xml}");

    let second = guest.get_install_xml(true).unwrap().unwrap();
    assert!(second.contains("<boot dev=\"hd\"/>"), "second stage boots disk: {second}");
}

#[test]
fn test_import_has_no_install_document() {
    let mut guest = kvm_guest(qemu(), "imp", "fedora18");
    assert_eq!(guest.get_install_xml(false).unwrap(), None);
}

#[test]
fn test_xen_pv_final_boot_uses_pygrub() {
    init_tracing();
    let conn = Arc::new(MockConnection::new("xen:///"));
    let mut guest = Guest::new(conn);
    guest.set_name(Some("pv")).unwrap();
    guest.add_device(VirtualDisk::with_path("disk", "/tmp/pv.img").unwrap());

    let xml = guest.get_config_xml().unwrap();
    assert!(xml.contains("<bootloader>/usr/bin/pygrub</bootloader>"), "{xml}");
    assert!(xml.contains("<target dev=\"xvda\" bus=\"xen\"/>"), "{xml}");
    assert_eq!(guest.bootloader(), None);

    guest.os_mut().set_kernel(Some("/boot/vmlinuz")).unwrap();
    let xml = guest.get_config_xml().unwrap();
    assert!(!xml.contains("pygrub"), "{xml}");
    assert!(xml.contains("<kernel>/boot/vmlinuz</kernel>"), "{xml}");
}

#[test]
fn test_name_collision_and_replace() {
    init_tracing();
    let conn = Arc::new(MockConnection::new("qemu:///system").with_guest("taken", true, &[]));

    let mut guest = Guest::new(conn.clone());
    assert!(matches!(guest.set_name(Some("taken")), Err(GuestError::Validation(_))));

    guest.replace = true;
    guest.set_name(Some("taken")).unwrap();
    guest.set_guest_type(Some("kvm")).unwrap();
    guest.os_mut().set_os_type(Some("hvm")).unwrap();

    let dom = guest.start_install(&mut NullMeter, false, false).unwrap().unwrap();
    assert_eq!(dom.name, "taken");
    assert_eq!(
        conn.calls(),
        vec!["destroy:taken", "undefine:taken", "create:taken", "define:taken"]
    );
}

#[test]
fn test_address_conflict_rolls_back() {
    init_tracing();
    let mut guest = kvm_guest(qemu(), "clash", "generic");
    let mut a = VirtualInterface::new();
    a.address_mut().set_addrstr("00:03.0").unwrap();
    let mut b = VirtualSound::new();
    b.address_mut().set_addrstr("00:03.0").unwrap();
    guest.add_device(a);
    guest.add_device(b);

    let before = guest.get_xml_config();
    let err = guest.get_config_xml().unwrap_err();
    assert!(matches!(err, GuestError::AddressConflict { .. }), "got {err}");
    assert_eq!(guest.get_xml_config(), before);
    assert_eq!(guest.on_reboot(), None);
}

#[test]
fn test_multifunction_slot() {
    let mut guest = kvm_guest(qemu(), "multi", "generic");
    for addr in ["00:04.0", "00:04.1", "00:04.2"] {
        let mut nic = VirtualInterface::new();
        nic.address_mut().set_addrstr(addr).unwrap();
        guest.add_device(nic);
    }

    let xml = guest.get_config_xml().unwrap();
    assert_eq!(xml.matches("multifunction=\"on\"").count(), 1, "{xml}");
}

#[test]
fn test_usb2_controllers() {
    let mut guest = kvm_guest(qemu(), "usb", "fedora18");
    guest.add_usb2_controllers();
    let xml = guest.get_config_xml().unwrap();
    assert_eq!(xml.matches("<controller type=\"usb\"").count(), 4, "{xml}");
    assert!(xml.contains("model=\"ich9-ehci1\""), "{xml}");
    assert!(xml.contains("model=\"ich9-uhci3\""), "{xml}");
}

#[test]
fn test_floppy_gets_fdc_bus() {
    let mut guest = kvm_guest(qemu(), "fd", "fedora18");
    guest.add_device(VirtualDisk::with_path("floppy", "/tmp/boot.vfd").unwrap());
    let xml = guest.get_config_xml().unwrap();
    assert!(xml.contains("<target dev=\"fda\" bus=\"fdc\"/>"), "{xml}");
}

#[test]
fn test_install_flow() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("web.img");
    let conn = qemu();

    let mut guest = kvm_guest(conn.clone(), "web", "fedora18");
    let mut disk = VirtualDisk::with_path("disk", image.to_str().unwrap()).unwrap();
    disk.set_size(Some(1 << 20));
    guest.add_device(disk);
    guest.autostart = true;

    assert_eq!(guest.start_install(&mut NullMeter, true, false).unwrap(), None);
    assert!(conn.calls().is_empty(), "dry runs touch nothing");
    assert!(!image.exists());

    let dom = guest.start_install(&mut NullMeter, false, false).unwrap().unwrap();
    assert_eq!(dom.name, "web");
    assert_eq!(std::fs::metadata(&image).unwrap().len(), 1 << 20);
    assert_eq!(conn.calls(), vec!["create:web", "define:web", "autostart:web"]);
    assert!(conn.autostart_enabled("web"));
    assert_eq!(guest.domain().map(|d| d.name.as_str()), Some("web"));

    assert!(matches!(
        guest.start_install(&mut NullMeter, false, false),
        Err(GuestError::Installer(_))
    ));
}

#[test]
fn test_noboot_only_defines() {
    let conn = qemu();
    let mut guest = kvm_guest(conn.clone(), "quiet", "fedora18");
    guest.start_install(&mut NullMeter, false, true).unwrap();
    assert_eq!(conn.calls(), vec!["define:quiet", "define:quiet"]);
}
