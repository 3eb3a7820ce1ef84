//! The `<os>` block: guest type, architecture and boot configuration.

use crate::binding::{xml_accessors, XmlBuilder, XmlProperty};
use crate::error::Result;
use crate::xml::Element;

use super::subobject_builder;

const ORDER: &[&str] = &[
    "./type",
    "./type/@arch",
    "./type/@machine",
    "./init",
    "./loader",
    "./kernel",
    "./initrd",
    "./cmdline",
    "./dtb",
    "./boot",
    "./bootmenu/@enable",
    "./bios/@useserial",
];

const OS_TYPE: XmlProperty<DomainOs> =
    XmlProperty::new("os_type", "./type").with_default(|_| Some(DomainOs::TYPE_XEN.into()));
const ARCH: XmlProperty<DomainOs> = XmlProperty::new("arch", "./type/@arch");
const MACHINE: XmlProperty<DomainOs> = XmlProperty::new("machine", "./type/@machine");
const INIT: XmlProperty<DomainOs> = XmlProperty::new("init", "./init");
const LOADER: XmlProperty<DomainOs> = XmlProperty::new("loader", "./loader");
const KERNEL: XmlProperty<DomainOs> = XmlProperty::new("kernel", "./kernel");
const INITRD: XmlProperty<DomainOs> = XmlProperty::new("initrd", "./initrd");
const KERNEL_ARGS: XmlProperty<DomainOs> = XmlProperty::new("kernel_args", "./cmdline");
const DTB: XmlProperty<DomainOs> = XmlProperty::new("dtb", "./dtb");
const ENABLE_BOOTMENU: XmlProperty<DomainOs> =
    XmlProperty::new("enable_bootmenu", "./bootmenu/@enable").yesno();
const USESERIAL: XmlProperty<DomainOs> =
    XmlProperty::new("useserial", "./bios/@useserial").yesno();

/// `<os>` element of a domain.
#[derive(Debug, Clone)]
pub struct DomainOs {
    state: crate::binding::XmlState,
}

subobject_builder!(
    DomainOs,
    "os",
    ORDER,
    [
        OS_TYPE,
        ARCH,
        MACHINE,
        INIT,
        LOADER,
        KERNEL,
        INITRD,
        KERNEL_ARGS,
        DTB,
        ENABLE_BOOTMENU,
        USESERIAL
    ]
);

impl DomainOs {
    pub const TYPE_HVM: &'static str = "hvm";
    pub const TYPE_XEN: &'static str = "xen";
    pub const TYPE_LINUX: &'static str = "linux";
    pub const TYPE_EXE: &'static str = "exe";

    pub const BOOT_HD: &'static str = "hd";
    pub const BOOT_CDROM: &'static str = "cdrom";
    pub const BOOT_FLOPPY: &'static str = "fd";
    pub const BOOT_NETWORK: &'static str = "network";

    xml_accessors! {
        str os_type, set_os_type => OS_TYPE;
        str arch, set_arch => ARCH;
        str machine, set_machine => MACHINE;
        /// Container init binary.
        str init, set_init => INIT;
        str loader, set_loader => LOADER;
        str kernel, set_kernel => KERNEL;
        str initrd, set_initrd => INITRD;
        str kernel_args, set_kernel_args => KERNEL_ARGS;
        str dtb, set_dtb => DTB;
        flag enable_bootmenu, set_enable_bootmenu => ENABLE_BOOTMENU;
        flag useserial, set_useserial => USESERIAL;
    }

    /// Boot devices, in the order they are tried.
    pub fn bootorder(&self) -> Vec<String> {
        self.state
            .element()
            .child_elements()
            .filter(|el| el.name() == "boot")
            .filter_map(|el| el.attribute("dev").map(str::to_string))
            .collect()
    }

    /// Replace the boot device list.
    pub fn set_bootorder<S: AsRef<str>>(&mut self, devs: &[S]) {
        let hint = self.state.hint("./boot");
        let el = self.state.element_mut();
        el.take_children_where(|child| child.name() == "boot");
        for dev in devs {
            let mut boot = Element::new("boot");
            boot.set_attribute("dev", dev.as_ref());
            el.append_child(boot, &hint);
        }
    }

    /// Unset every property and drop the boot list.
    pub fn clear(&mut self) -> Result<()> {
        self.set_bootorder::<&str>(&[]);
        for prop in Self::PROPERTIES {
            self.set_value(prop, None)?;
        }
        Ok(())
    }

    pub fn is_hvm(&self) -> bool {
        self.os_type().as_deref() == Some(Self::TYPE_HVM)
    }

    /// Xen paravirtualized guest.
    pub fn is_xenpv(&self) -> bool {
        matches!(
            self.os_type().as_deref(),
            Some(Self::TYPE_XEN) | Some(Self::TYPE_LINUX)
        )
    }

    pub fn is_container(&self) -> bool {
        self.os_type().as_deref() == Some(Self::TYPE_EXE)
    }

    /// True for x86 guests. An unset arch means the host's, assumed x86_64.
    pub fn is_x86(&self) -> bool {
        match self.arch() {
            None => true,
            Some(arch) => matches!(arch.as_str(), "x86_64" | "i686" | "i586" | "i486" | "i386"),
        }
    }

    pub fn is_ppc64(&self) -> bool {
        self.arch().as_deref() == Some("ppc64")
    }

    pub fn is_pseries(&self) -> bool {
        self.is_ppc64() && self.machine().as_deref() == Some("pseries")
    }

    pub fn is_arm(&self) -> bool {
        self.arch().map(|a| a.starts_with("arm")).unwrap_or(false)
    }

    pub fn is_arm_vexpress(&self) -> bool {
        self.is_arm()
            && self
                .machine()
                .map(|m| m.starts_with("vexpress-"))
                .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_type_is_xen() {
        let os = DomainOs::new();
        assert_eq!(os.os_type().as_deref(), Some("xen"));
        assert!(os.is_xenpv());
        assert!(os.is_x86(), "unset arch counts as x86");
        assert_eq!(os.to_xml(), "<os>\n    <type>xen</type>\n  </os>");
    }

    #[test]
    fn test_hvm_boot_layout() {
        let mut os = DomainOs::new();
        os.set_enable_bootmenu(Some(true)).unwrap();
        os.set_bootorder(&["network", "hd"]);
        os.set_loader(Some("/usr/lib/xen/boot/hvmloader")).unwrap();
        os.set_arch(Some("x86_64")).unwrap();
        os.set_os_type(Some("hvm")).unwrap();

        assert!(os.is_hvm());
        assert_eq!(os.bootorder(), vec!["network", "hd"]);
        assert_eq!(
            os.to_xml(),
            "<os>\n    <type arch=\"x86_64\">hvm</type>\n    <loader>/usr/lib/xen/boot/hvmloader</loader>\n    <boot dev=\"network\"/>\n    <boot dev=\"hd\"/>\n    <bootmenu enable=\"yes\"/>\n  </os>"
        );

        os.set_bootorder(&["cdrom"]);
        assert_eq!(os.bootorder(), vec!["cdrom"]);
    }

    #[test]
    fn test_parsed_bootorder_is_editable() {
        let el = Element::parse(
            "<os>\n    <type arch=\"i686\" machine=\"pc\">hvm</type>\n    <boot dev=\"hd\"/>\n    <bootmenu enable=\"no\"/>\n  </os>",
        )
        .unwrap();
        let mut os = DomainOs::parsed(el);
        assert_eq!(os.bootorder(), vec!["hd"]);
        assert_eq!(os.enable_bootmenu(), Some(false));

        os.set_bootorder(&["cdrom", "hd"]);
        assert_eq!(
            os.to_xml(),
            "<os>\n    <type arch=\"i686\" machine=\"pc\">hvm</type>\n    <boot dev=\"cdrom\"/>\n    <boot dev=\"hd\"/>\n    <bootmenu enable=\"no\"/>\n  </os>"
        );
    }

    #[test]
    fn test_clear_removes_everything() {
        let mut os = DomainOs::new();
        os.set_os_type(Some("linux")).unwrap();
        os.set_kernel(Some("/boot/vmlinuz")).unwrap();
        os.set_bootorder(&["hd"]);
        os.clear().unwrap();

        assert_eq!(os.os_type(), None);
        assert_eq!(os.kernel(), None);
        assert!(os.bootorder().is_empty());
        assert_eq!(os.to_xml(), "");
    }

    #[test]
    fn test_arch_predicates() {
        let mut os = DomainOs::new();
        os.set_arch(Some("ppc64")).unwrap();
        assert!(!os.is_x86());
        assert!(os.is_ppc64());
        assert!(!os.is_pseries());
        os.set_machine(Some("pseries")).unwrap();
        assert!(os.is_pseries());

        os.set_arch(Some("armv7l")).unwrap();
        os.set_machine(Some("vexpress-a9")).unwrap();
        assert!(os.is_arm());
        assert!(os.is_arm_vexpress());
    }
}
