//! The guest aggregate: one `<domain>` definition with its sub-objects and
//! devices.
//!
//! A [`Guest`] is either parsed from existing XML or built from scratch
//! against a [`Connection`]. Callers edit it through typed accessors and the
//! device collection, then ask for a document:
//!
//! - [`Guest::get_xml_config`] serializes exactly what was configured.
//! - [`Guest::get_install_xml`] and [`Guest::get_config_xml`] produce the
//!   install-phase and final documents. Both run the installer and the
//!   default passes on a snapshot that is rolled back afterwards, so asking
//!   for a document never changes the guest.
//! - [`Guest::start_install`] drives a whole installation.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::sync::{Arc, OnceLock};

use tracing::{debug, info, instrument, warn};

use crate::binding::{render_state, xml_accessors, PropValue, XmlBuilder, XmlProperty, XmlState};
use crate::defaults;
use crate::devices::{
    CharDevice, CharKind, Device, DeviceFilter, DeviceId, DeviceKind, VirtualController,
    VirtualInput, VirtualSound, VirtualVideo,
};
use crate::domain::{
    DomainClock, DomainCpu, DomainFeatures, DomainNumatune, DomainOs, DomainSeclabel,
};
use crate::error::{GuestError, Result};
use crate::installer::ImportInstaller;
use crate::osdict::{OsDictionary, OsKey, OsValue};
use crate::support::CompatMode;
use crate::traits::{Connection, Installer, OsMetadata, ProgressMeter};
use crate::types::DomainRef;
use crate::validate::{validate_cpuset, validate_uuid};
use crate::xml::{Element, XmlPath};

/// Bootloader used for the final boot of Xen PV guests without a kernel.
pub const PYGRUB: &str = "/usr/bin/pygrub";

const ORDER: &[&str] = &[
    "./@type",
    "./name",
    "./uuid",
    "./description",
    "./memory",
    "./currentMemory",
    "./memoryBacking",
    "./vcpu",
    "./vcpu/@cpuset",
    "./vcpu/@current",
    "./numatune",
    "./bootloader",
    "./os",
    "./features",
    "./cpu",
    "./clock",
    "./on_poweroff",
    "./on_reboot",
    "./on_crash",
    "./devices",
    "./devices/emulator",
    "./seclabel",
];

/// Nesting depth of `<devices>`.
const DEVICES_DEPTH: usize = 1;

// =============================================================================
// PROPERTIES
// =============================================================================

fn validate_guest_name(guest: &Guest, value: &PropValue) -> Result<()> {
    let name = value.to_string();
    if guest.name().as_deref() == Some(name.as_str()) {
        return Ok(());
    }
    Guest::validate_name(guest.conn.as_ref(), &name, !guest.replace)
}

/// Raising current memory above the maximum raises the maximum.
fn couple_memory(guest: &mut Guest, value: Option<PropValue>) -> Result<Option<PropValue>> {
    if let Some(mem) = value.as_ref().and_then(PropValue::as_int) {
        if guest.maxmemory().map(|max| max < mem).unwrap_or(true) {
            guest.set_value(&MAXMEMORY, Some(mem.into()))?;
        }
    }
    Ok(value)
}

/// Lowering vcpus below the current count lowers the current count.
fn couple_vcpus(guest: &mut Guest, value: Option<PropValue>) -> Result<Option<PropValue>> {
    if let Some(vcpus) = value.as_ref().and_then(PropValue::as_int) {
        if guest.curvcpus().map(|cur| cur > vcpus).unwrap_or(false) {
            guest.set_value(&CURVCPUS, Some(vcpus.into()))?;
        }
    }
    Ok(value)
}

const TYPE: XmlProperty<Guest> =
    XmlProperty::new("type", "./@type").with_default(|_| Some("xen".into()));
const NAME: XmlProperty<Guest> = XmlProperty::new("name", "./name").with_validator(validate_guest_name);
const UUID: XmlProperty<Guest> = XmlProperty::new("uuid", "./uuid")
    .with_validator(|_, v| validate_uuid(&v.to_string()))
    .with_default(|g| Some(g.random_uuid().into()));
const DESCRIPTION: XmlProperty<Guest> = XmlProperty::new("description", "./description");
const MAXMEMORY: XmlProperty<Guest> = XmlProperty::new("maxmemory", "./memory")
    .int()
    .with_default(|g| g.memory().map(PropValue::Int));
const MEMORY: XmlProperty<Guest> = XmlProperty::new("memory", "./currentMemory")
    .int()
    .with_default(|_| Some(1i64.into()))
    .with_set_hook(couple_memory);
const HUGEPAGE: XmlProperty<Guest> =
    XmlProperty::new("hugepage", "./memoryBacking/hugepages").boolean();
const VCPUS: XmlProperty<Guest> = XmlProperty::new("vcpus", "./vcpu")
    .int()
    .with_default(|_| Some(1i64.into()))
    .with_set_hook(couple_vcpus);
const CURVCPUS: XmlProperty<Guest> = XmlProperty::new("curvcpus", "./vcpu/@current").int();
const CPUSET: XmlProperty<Guest> = XmlProperty::new("cpuset", "./vcpu/@cpuset")
    .with_validator(|_, v| validate_cpuset(&v.to_string()));
const BOOTLOADER: XmlProperty<Guest> = XmlProperty::new("bootloader", "./bootloader");
const ON_POWEROFF: XmlProperty<Guest> =
    XmlProperty::new("on_poweroff", "./on_poweroff").with_default(|_| Some("destroy".into()));
const ON_REBOOT: XmlProperty<Guest> = XmlProperty::new("on_reboot", "./on_reboot");
const ON_CRASH: XmlProperty<Guest> = XmlProperty::new("on_crash", "./on_crash");
const EMULATOR: XmlProperty<Guest> = XmlProperty::new("emulator", "./devices/emulator");

// =============================================================================
// GUEST
// =============================================================================

/// A guest definition bound to a hypervisor connection.
pub struct Guest {
    pub(crate) conn: Arc<dyn Connection>,
    pub(crate) osdict: Arc<dyn OsMetadata>,
    pub(crate) installer: Box<dyn Installer>,
    pub(crate) compat: CompatMode,

    pub(crate) state: XmlState,
    pub(crate) os: DomainOs,
    pub(crate) features: DomainFeatures,
    pub(crate) clock: DomainClock,
    pub(crate) cpu: DomainCpu,
    pub(crate) seclabel: DomainSeclabel,
    pub(crate) numatune: DomainNumatune,
    pub(crate) devices: Vec<(DeviceId, Device)>,
    next_device_id: u64,

    os_variant: Option<String>,
    random_uuid: OnceLock<String>,
    domain: Option<DomainRef>,

    /// Mark the guest to start with the host once installed.
    pub autostart: bool,
    /// Replace an existing guest with the same name on install.
    pub replace: bool,
}

impl XmlBuilder for Guest {
    const PROPERTIES: &'static [&'static XmlProperty<Self>] = &[
        &TYPE,
        &NAME,
        &UUID,
        &DESCRIPTION,
        &MAXMEMORY,
        &MEMORY,
        &HUGEPAGE,
        &VCPUS,
        &CURVCPUS,
        &CPUSET,
        &BOOTLOADER,
        &ON_POWEROFF,
        &ON_REBOOT,
        &ON_CRASH,
        &EMULATOR,
    ];

    fn xml_state(&self) -> &XmlState {
        &self.state
    }

    fn xml_state_mut(&mut self) -> &mut XmlState {
        &mut self.state
    }

    fn render(&self) -> Element {
        let mut el = render_state(self);
        self.state.attach_child(&mut el, DomainNumatune::TAG, self.numatune.render());
        self.state.attach_child(&mut el, DomainOs::TAG, self.os.render());
        self.state.attach_child(&mut el, DomainFeatures::TAG, self.features.render());
        self.state.attach_child(&mut el, DomainCpu::TAG, self.cpu.render());
        self.state.attach_child(&mut el, DomainClock::TAG, self.clock.render());
        self.state.attach_child(&mut el, DomainSeclabel::TAG, self.seclabel.render());
        self.attach_devices(&mut el);
        el
    }
}

impl fmt::Debug for Guest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guest")
            .field("uri", &self.conn.uri())
            .field("name", &self.name())
            .field("devices", &self.devices.len())
            .field("os_variant", &self.os_variant)
            .finish_non_exhaustive()
    }
}

impl Guest {
    /// An empty guest for `conn`.
    pub fn new(conn: Arc<dyn Connection>) -> Self {
        Self::assemble(
            conn,
            XmlState::new("domain", 0, ORDER),
            DomainOs::new(),
            DomainFeatures::new(),
            DomainClock::new(),
            DomainCpu::new(),
            DomainSeclabel::new(),
            DomainNumatune::new(),
        )
    }

    /// Parse an existing `<domain>` document.
    pub fn from_xml(conn: Arc<dyn Connection>, xml: &str) -> Result<Self> {
        let mut root = Element::parse(xml)?;
        if root.name() != "domain" {
            return Err(GuestError::Xml(format!(
                "expected a <domain> document, found <{}>",
                root.name()
            )));
        }

        let child = |name: &str| {
            root.find_child(name)
                .cloned()
                .unwrap_or_else(|| Element::new(name))
        };
        let os = DomainOs::parsed(child(DomainOs::TAG));
        let features = DomainFeatures::parsed(child(DomainFeatures::TAG));
        let clock = DomainClock::parsed(child(DomainClock::TAG));
        let cpu = DomainCpu::parsed(child(DomainCpu::TAG));
        let seclabel = DomainSeclabel::parsed(child(DomainSeclabel::TAG));
        let numatune = DomainNumatune::parsed(child(DomainNumatune::TAG));

        let device_elements = match root.element_mut(&XmlPath::parse("./devices")) {
            Some(devices) => {
                devices.take_children_where(|el| DeviceKind::from_tag(el.name()).is_some())
            }
            None => Vec::new(),
        };

        let mut guest = Self::assemble(
            conn,
            XmlState::parsed(root, 0, ORDER),
            os,
            features,
            clock,
            cpu,
            seclabel,
            numatune,
        );
        for el in device_elements {
            if let Some(dev) = Device::from_element(el) {
                let id = guest.next_id();
                guest.devices.push((id, dev));
            }
        }
        debug!(name = ?guest.name(), devices = guest.devices.len(), "Parsed guest");
        Ok(guest)
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        conn: Arc<dyn Connection>,
        state: XmlState,
        os: DomainOs,
        features: DomainFeatures,
        clock: DomainClock,
        cpu: DomainCpu,
        seclabel: DomainSeclabel,
        numatune: DomainNumatune,
    ) -> Self {
        Self {
            conn,
            osdict: Arc::new(OsDictionary::new()),
            installer: Box::new(ImportInstaller::new()),
            compat: CompatMode::Auto,
            state,
            os,
            features,
            clock,
            cpu,
            seclabel,
            numatune,
            devices: Vec::new(),
            next_device_id: 0,
            os_variant: None,
            random_uuid: OnceLock::new(),
            domain: None,
            autostart: false,
            replace: false,
        }
    }

    /// Use `installer` for installation and boot configuration.
    pub fn with_installer(mut self, installer: Box<dyn Installer>) -> Self {
        self.installer = installer;
        self
    }

    /// Use another source of OS variant metadata.
    pub fn with_os_metadata(mut self, osdict: Arc<dyn OsMetadata>) -> Self {
        self.osdict = osdict;
        self
    }

    pub fn with_compat_mode(mut self, compat: CompatMode) -> Self {
        self.compat = compat;
        self
    }

    pub fn set_installer(&mut self, installer: Box<dyn Installer>) {
        self.installer = installer;
    }

    pub fn installer(&self) -> &dyn Installer {
        self.installer.as_ref()
    }

    pub fn conn(&self) -> &dyn Connection {
        self.conn.as_ref()
    }

    /// Compat mode in effect for this guest, with `Auto` resolved.
    pub fn compat_mode(&self) -> CompatMode {
        self.compat
            .resolve(&self.guest_type().unwrap_or_default(), self.emulator().as_deref())
    }

    /// Domain created by the last install, if any.
    pub fn domain(&self) -> Option<&DomainRef> {
        self.domain.as_ref()
    }

    // =========================================================================
    // Properties
    // =========================================================================

    xml_accessors! {
        /// Hypervisor type (`<domain type=...>`).
        str guest_type, set_guest_type => TYPE;
        str name, set_name => NAME;
        str uuid, set_uuid => UUID;
        str description, set_description => DESCRIPTION;
        /// Current memory in KiB.
        int memory, set_memory => MEMORY;
        bool hugepage, set_hugepage => HUGEPAGE;
        int vcpus, set_vcpus => VCPUS;
        str cpuset, set_cpuset => CPUSET;
        str bootloader, set_bootloader => BOOTLOADER;
        str on_poweroff, set_on_poweroff => ON_POWEROFF;
        str on_reboot, set_on_reboot => ON_REBOOT;
        str on_crash, set_on_crash => ON_CRASH;
        str emulator, set_emulator => EMULATOR;
    }

    /// Maximum memory in KiB.
    pub fn maxmemory(&self) -> Option<i64> {
        self.get_int(&MAXMEMORY)
    }

    /// Set the maximum memory. It cannot go below the current memory.
    pub fn set_maxmemory(&mut self, value: Option<i64>) -> Result<()> {
        if let (Some(max), Some(cur)) = (value, self.memory()) {
            if max < cur {
                return Err(GuestError::Validation(format!(
                    "maxmemory {} is below current memory {}",
                    max, cur
                )));
            }
        }
        self.set_int(&MAXMEMORY, value)
    }

    /// vCPUs online at boot.
    pub fn curvcpus(&self) -> Option<i64> {
        self.get_int(&CURVCPUS)
    }

    /// Set the boot vCPU count. It cannot exceed `vcpus`.
    pub fn set_curvcpus(&mut self, value: Option<i64>) -> Result<()> {
        if let (Some(cur), Some(max)) = (value, self.vcpus()) {
            if cur > max {
                return Err(GuestError::Validation(format!(
                    "curvcpus {} exceeds vcpus {}",
                    cur, max
                )));
            }
        }
        self.set_int(&CURVCPUS, value)
    }

    fn random_uuid(&self) -> String {
        self.random_uuid
            .get_or_init(|| uuid::Uuid::new_v4().to_string())
            .clone()
    }

    pub fn os_variant(&self) -> Option<&str> {
        self.os_variant.as_deref()
    }

    /// Select the OS variant whose metadata drives the default passes.
    pub fn set_os_variant(&mut self, variant: &str) -> Result<()> {
        let variant = variant.to_ascii_lowercase();
        if !self.osdict.is_valid_variant(&variant) {
            return Err(GuestError::Validation(format!(
                "Distro '{}' does not exist in our dictionary",
                variant
            )));
        }
        self.os_variant = Some(variant);
        Ok(())
    }

    pub(crate) fn lookup_osdict_key(&self, key: OsKey) -> OsValue {
        self.osdict.lookup(self.os_variant.as_deref(), key)
    }

    pub fn os(&self) -> &DomainOs {
        &self.os
    }

    pub fn os_mut(&mut self) -> &mut DomainOs {
        &mut self.os
    }

    pub fn features(&self) -> &DomainFeatures {
        &self.features
    }

    pub fn features_mut(&mut self) -> &mut DomainFeatures {
        &mut self.features
    }

    pub fn clock(&self) -> &DomainClock {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut DomainClock {
        &mut self.clock
    }

    pub fn cpu(&self) -> &DomainCpu {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut DomainCpu {
        &mut self.cpu
    }

    pub fn seclabel(&self) -> &DomainSeclabel {
        &self.seclabel
    }

    pub fn seclabel_mut(&mut self) -> &mut DomainSeclabel {
        &mut self.seclabel
    }

    pub fn numatune(&self) -> &DomainNumatune {
        &self.numatune
    }

    pub fn numatune_mut(&mut self) -> &mut DomainNumatune {
        &mut self.numatune
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Check a guest name, and optionally that no guest on `conn` uses it.
    pub fn validate_name(conn: &dyn Connection, name: &str, check_collision: bool) -> Result<()> {
        crate::validate::validate_name("Guest", name, true)?;
        if check_collision && conn.lookup_domain(name)?.is_some() {
            return Err(GuestError::Validation(format!(
                "Guest name '{}' is already in use.",
                name
            )));
        }
        Ok(())
    }

    /// Fail if `name` exists on `conn`, or remove it when `allow_replace`
    /// is set. A running guest is destroyed before being undefined.
    #[instrument(skip(conn))]
    pub fn check_vm_collision(conn: &dyn Connection, name: &str, allow_replace: bool) -> Result<()> {
        let Some(existing) = conn.lookup_domain(name)? else {
            return Ok(());
        };
        if !allow_replace {
            return Err(GuestError::NameCollision(name.to_string()));
        }

        debug!(name, "Explicitly replacing guest");
        let remove = || -> Result<()> {
            if existing.is_running() {
                info!(name, "Destroying guest");
                conn.destroy_domain(name)?;
            }
            info!(name, "Undefining guest");
            conn.undefine_domain(name)
        };
        remove().map_err(|e| {
            GuestError::Connection(format!("Could not remove old vm '{}': {}", name, e))
        })
    }

    // =========================================================================
    // Devices
    // =========================================================================

    fn next_id(&mut self) -> DeviceId {
        self.next_device_id += 1;
        DeviceId(self.next_device_id)
    }

    /// Add a device after the last device of the same or an earlier kind.
    pub fn add_device(&mut self, dev: impl Into<Device>) -> DeviceId {
        let dev = dev.into();
        let kind = dev.kind();
        let pos = self
            .devices
            .iter()
            .rposition(|(_, d)| d.kind() <= kind)
            .map(|i| i + 1)
            .unwrap_or(0);
        let id = self.next_id();
        self.devices.insert(pos, (id, dev));
        id
    }

    pub fn remove_device(&mut self, id: DeviceId) -> Option<Device> {
        let pos = self.devices.iter().position(|(i, _)| *i == id)?;
        Some(self.devices.remove(pos).1)
    }

    pub fn device(&self, id: DeviceId) -> Option<&Device> {
        self.devices.iter().find(|(i, _)| *i == id).map(|(_, d)| d)
    }

    pub fn device_mut(&mut self, id: DeviceId) -> Option<&mut Device> {
        self.devices.iter_mut().find(|(i, _)| *i == id).map(|(_, d)| d)
    }

    /// Devices matching `filter`, in document order.
    pub fn get_devices(&self, filter: impl Into<DeviceFilter>) -> Vec<&Device> {
        let filter = filter.into();
        self.devices
            .iter()
            .filter(|(_, d)| filter.matches(d.kind()))
            .map(|(_, d)| d)
            .collect()
    }

    pub fn get_device_ids(&self, filter: impl Into<DeviceFilter>) -> Vec<DeviceId> {
        let filter = filter.into();
        self.devices
            .iter()
            .filter(|(_, d)| filter.matches(d.kind()))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Put the rendered devices into `<devices>`, right after `<emulator>`.
    fn attach_devices(&self, el: &mut Element) {
        if self.devices.is_empty() {
            return;
        }
        let rendered: Vec<Element> = self.devices.iter().map(|(_, d)| d.render()).collect();
        let path = XmlPath::parse("./devices");
        if el.find(&path).is_none() {
            if let Err(e) = el.set_value(&path, None, &self.state.hint("./devices")) {
                warn!(error = %e, "Failed to create devices element");
                return;
            }
        }
        if let Some(devices) = el.element_mut(&path) {
            devices.insert_children_after("emulator", rendered, DEVICES_DEPTH);
        }
    }

    pub fn add_default_input_device(&mut self) {
        if self.os.is_container() || !self.os.is_x86() {
            return;
        }
        self.add_device(VirtualInput::new());
    }

    pub fn add_default_sound_device(&mut self) {
        if !self.os.is_hvm() || !self.os.is_x86() {
            return;
        }
        self.add_device(VirtualSound::new());
    }

    pub fn add_default_console_device(&mut self) -> Result<()> {
        if self.os.is_xenpv() {
            return Ok(());
        }
        let mut console = CharDevice::new(CharKind::Console);
        console.set_char_type(Some(CharDevice::TYPE_PTY))?;
        self.add_device(console);
        Ok(())
    }

    pub fn add_default_video_device(&mut self) {
        if self.os.is_container() {
            return;
        }
        self.add_device(VirtualVideo::new());
    }

    /// Add the ICH9 USB2 controller set.
    pub fn add_usb2_controllers(&mut self) {
        for ctrl in VirtualController::get_usb2_controllers() {
            self.add_device(ctrl);
        }
    }

    // =========================================================================
    // Documents
    // =========================================================================

    /// The document as currently configured, with no defaults resolved.
    pub fn get_xml_config(&self) -> String {
        format!("{}\n", self.render().to_xml_string())
    }

    /// The install-phase document, or `None` when the installer has no
    /// install phase. `disk_boot` asks for the second stage of a multi-stage
    /// install, which boots from disk.
    pub fn get_install_xml(&mut self, disk_boot: bool) -> Result<Option<String>> {
        self.produce_configuration(true, disk_boot)
    }

    /// The document for normal boots after installation.
    pub fn get_config_xml(&mut self) -> Result<String> {
        self.produce_configuration(false, false)?.ok_or_else(|| {
            GuestError::Internal("final configuration was not produced".to_string())
        })
    }

    /// Build the document for one phase. Every change made on the way is
    /// rolled back before returning.
    #[instrument(skip(self), fields(name = ?self.name()))]
    pub fn produce_configuration(&mut self, install: bool, disk_boot: bool) -> Result<Option<String>> {
        let osblob_install = install && !disk_boot;
        if osblob_install && !self.installer.has_install_phase() {
            debug!("Installer has no install phase");
            return Ok(None);
        }

        let mut scope = ConfigScope::new(self);

        let install_devices = scope.installer.install_devices();
        for dev in install_devices {
            scope.add_device(dev);
        }
        let mut os = scope.os.clone();
        scope.installer.alter_bootconfig(&scope, osblob_install, &mut os)?;
        scope.os = os;

        scope.set_transient_device_defaults(install)?;

        let action = if install { "destroy" } else { "restart" };
        scope.set_on_reboot(Some(action))?;
        scope.set_on_crash(Some(action))?;

        defaults::set_defaults(&mut scope)?;

        scope.set_bootloader(None)?;
        if !install && scope.os.is_xenpv() && scope.os.kernel().is_none() {
            debug!(bootloader = PYGRUB, "Xen PV guest boots through pygrub");
            scope.set_bootloader(Some(PYGRUB))?;
            scope.os.clear()?;
        }

        Ok(Some(scope.get_xml_config()))
    }

    fn set_transient_device_defaults(&mut self, install: bool) -> Result<()> {
        if install {
            return Ok(());
        }
        let continue_inst = self.get_continue_inst();
        let mut skipped = Vec::new();
        for (id, dev) in self.devices.iter_mut() {
            let Some(disk) = dev.as_disk_mut() else {
                continue;
            };
            if !disk.transient() {
                continue;
            }
            if disk.is_disk() {
                skipped.push(*id);
            } else if disk.is_cdrom() && !continue_inst {
                disk.set_path(None)?;
            }
        }
        for id in skipped {
            debug!(device = %id, "Dropping transient disk");
            self.remove_device(id);
        }
        Ok(())
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            state: self.state.clone(),
            os: self.os.clone(),
            features: self.features.clone(),
            clock: self.clock.clone(),
            cpu: self.cpu.clone(),
            seclabel: self.seclabel.clone(),
            numatune: self.numatune.clone(),
            devices: self.devices.clone(),
        }
    }

    fn restore(&mut self, snap: Snapshot) {
        self.state = snap.state;
        self.os = snap.os;
        self.features = snap.features;
        self.clock = snap.clock;
        self.cpu = snap.cpu;
        self.seclabel = snap.seclabel;
        self.numatune = snap.numatune;
        self.devices = snap.devices;
    }

    // =========================================================================
    // Installation
    // =========================================================================

    /// True when the OS needs a second boot from disk to finish installing
    /// (see [`Guest::continue_install`]).
    pub fn get_continue_inst(&self) -> bool {
        if !self.installer.has_install_phase() {
            return false;
        }
        self.lookup_osdict_key(OsKey::ThreeStageInstall).as_bool()
    }

    /// Install the guest: prepare media, allocate storage, then create and
    /// define the domain. With `dry_run` nothing is created and `None` is
    /// returned. With `noboot` the guest is only defined, unless the
    /// installer needs an install boot.
    #[instrument(skip(self, meter), fields(name = ?self.name()))]
    pub fn start_install(
        &mut self,
        meter: &mut dyn ProgressMeter,
        dry_run: bool,
        noboot: bool,
    ) -> Result<Option<DomainRef>> {
        if self.domain.is_some() {
            return Err(GuestError::Installer("Domain has already been started!".to_string()));
        }

        let scratch = tempfile::Builder::new().prefix("lqx-guest-").tempdir()?;
        let result = self.run_install(meter, dry_run, noboot, scratch.path());
        self.installer.cleanup();
        result
    }

    fn run_install(
        &mut self,
        meter: &mut dyn ProgressMeter,
        dry_run: bool,
        noboot: bool,
        scratch_dir: &Path,
    ) -> Result<Option<DomainRef>> {
        self.prepare_installer(meter, scratch_dir)?;

        for (_, dev) in &self.devices {
            dev.validate()?;
        }
        if !dry_run {
            let conn = Arc::clone(&self.conn);
            for (_, dev) in self.devices.iter_mut() {
                dev.setup(conn.as_ref(), meter)?;
            }
        }

        let (start_xml, final_xml) = self.build_xml(true)?;
        if dry_run {
            return Ok(None);
        }

        let name = self
            .name()
            .ok_or_else(|| GuestError::Validation("A name must be set before installing".to_string()))?;
        Self::check_vm_collision(self.conn.as_ref(), &name, self.replace)?;

        let dom = self.create_guest(meter, start_xml, &final_xml, true, noboot)?;
        self.flag_autostart(&dom)?;
        Ok(Some(dom))
    }

    fn prepare_installer(&mut self, meter: &mut dyn ProgressMeter, scratch_dir: &Path) -> Result<()> {
        let mut installer = std::mem::replace(&mut self.installer, Box::new(ImportInstaller::new()));
        let result = installer.prepare(self, meter, scratch_dir);
        self.installer = installer;
        result
    }

    /// Boot the second install stage from disk.
    #[instrument(skip(self, meter), fields(name = ?self.name()))]
    pub fn continue_install(
        &mut self,
        meter: &mut dyn ProgressMeter,
        dry_run: bool,
    ) -> Result<Option<DomainRef>> {
        let (start_xml, final_xml) = self.build_xml(false)?;
        if dry_run {
            return Ok(None);
        }
        self.create_guest(meter, start_xml, &final_xml, false, false)
            .map(Some)
    }

    fn build_xml(&mut self, is_initial: bool) -> Result<(Option<String>, String)> {
        let start_xml = self.get_install_xml(!is_initial)?;
        let final_xml = self.get_config_xml()?;
        debug!(
            phase = if is_initial { "install" } else { "continue" },
            xml = start_xml.as_deref().unwrap_or("None required"),
            "Generated install XML"
        );
        debug!(xml = %final_xml, "Generated boot XML");
        Ok((start_xml, final_xml))
    }

    fn create_guest(
        &mut self,
        meter: &mut dyn ProgressMeter,
        start_xml: Option<String>,
        final_xml: &str,
        is_initial: bool,
        noboot: bool,
    ) -> Result<DomainRef> {
        let label = if is_initial { "Creating domain..." } else { "Starting domain..." };
        meter.start(label, None);

        let doboot = !noboot || self.installer.has_install_phase();
        let boot_xml = start_xml.as_deref().unwrap_or(final_xml);
        if is_initial && doboot {
            self.conn.create_domain(boot_xml)?;
        } else {
            let dom = self.conn.define_domain(boot_xml)?;
            if doboot {
                self.conn.start_domain(&dom.name)?;
            }
        }
        meter.end(0);

        let dom = self.conn.define_domain(final_xml)?;
        info!(name = %dom.name, booted = doboot, "Guest installed");
        self.domain = Some(dom.clone());
        Ok(dom)
    }

    fn flag_autostart(&self, dom: &DomainRef) -> Result<()> {
        if !self.autostart {
            return Ok(());
        }
        match self.conn.set_autostart(&dom.name, true) {
            Ok(()) => Ok(()),
            Err(GuestError::Unsupported(msg)) => {
                warn!(name = %dom.name, "Could not set autostart flag: {}", msg);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

// =============================================================================
// SNAPSHOTS
// =============================================================================

struct Snapshot {
    state: XmlState,
    os: DomainOs,
    features: DomainFeatures,
    clock: DomainClock,
    cpu: DomainCpu,
    seclabel: DomainSeclabel,
    numatune: DomainNumatune,
    devices: Vec<(DeviceId, Device)>,
}

/// Mutable access to a guest whose configuration is restored when the
/// scope ends, however it ends.
pub(crate) struct ConfigScope<'g> {
    guest: &'g mut Guest,
    saved: Option<Snapshot>,
}

impl<'g> ConfigScope<'g> {
    pub(crate) fn new(guest: &'g mut Guest) -> Self {
        let saved = Some(guest.snapshot());
        Self { guest, saved }
    }
}

impl Deref for ConfigScope<'_> {
    type Target = Guest;

    fn deref(&self) -> &Guest {
        self.guest
    }
}

impl DerefMut for ConfigScope<'_> {
    fn deref_mut(&mut self) -> &mut Guest {
        self.guest
    }
}

impl Drop for ConfigScope<'_> {
    fn drop(&mut self) {
        if let Some(snap) = self.saved.take() {
            self.guest.restore(snap);
        }
    }
}
