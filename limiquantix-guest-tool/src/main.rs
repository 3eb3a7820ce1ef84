//! # lqx-guest
//!
//! Command-line front end for the guest configuration model. Loads a domain
//! document, applies the configured OS variant and installer, and prints or
//! installs the resulting definitions.
//!
//! ## Usage
//! ```bash
//! lqx-guest --variant fedora18 final-xml vm.xml
//! lqx-guest --config /etc/limiquantix/guest.yaml install vm.xml --dry-run
//! lqx-guest support conn_stream
//! ```

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{debug, error, info, warn};

use limiquantix_guest::{
    check_support, CdromInstaller, Connection, Guest, ImportInstaller, Installer,
    MockConnection, PxeInstaller, SupportData, SupportFeature, TracingMeter,
};

mod cli;
mod config;

use cli::{Args, Command};
use config::{Backend, Config, InstallerKind};

const DEFAULT_CONFIG_PATH: &str = "/etc/limiquantix/guest.yaml";

fn main() -> Result<()> {
    let args = Args::parse();

    if args.json_logs {
        limiquantix_common::init_logging_json(&args.log_level)?;
    } else {
        limiquantix_common::init_logging(&args.log_level)?;
    }

    let config = load_config(&args)?;
    config.validate()?;

    let conn = connect(&config)?;
    info!(uri = %conn.uri(), "Connection ready");

    if let Err(e) = run(&args.command, &config, conn) {
        error!(error = %e, "Command failed");
        return Err(e);
    }
    Ok(())
}

fn load_config(args: &Args) -> Result<Config> {
    let config = match &args.config {
        Some(path) => {
            let cfg = Config::load(path)?;
            info!(config_path = %path.display(), "Configuration loaded");
            cfg
        }
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            let cfg = Config::load(DEFAULT_CONFIG_PATH)?;
            info!(config_path = DEFAULT_CONFIG_PATH, "Configuration loaded from default location");
            cfg
        }
        None => {
            info!("No config file found, using CLI arguments and defaults");
            Config::default()
        }
    };
    Ok(config.with_cli_overrides(args))
}

fn connect(config: &Config) -> Result<Arc<dyn Connection>> {
    let uri = &config.connection.uri;
    match config.connection.backend {
        Backend::Mock => {
            let mock = &config.connection.mock;
            let mut conn = MockConnection::new(uri)
                .with_versions(mock.lib_version, mock.daemon_version, mock.driver_version)
                .with_host(mock.host.clone());
            for function in mock.functions.iter().flatten() {
                conn = conn.with_function(function.object, &function.name);
            }
            for flag in &mock.missing_flags {
                conn = conn.without_flag(flag);
            }
            for guest in &mock.guests {
                let macs: Vec<&str> = guest.macs.iter().map(String::as_str).collect();
                conn = conn.with_guest(&guest.name, guest.active, &macs);
            }
            Ok(Arc::new(conn))
        }
        Backend::Libvirt => open_libvirt(uri),
    }
}

#[cfg(feature = "libvirt")]
fn open_libvirt(uri: &str) -> Result<Arc<dyn Connection>> {
    let conn = limiquantix_guest::LibvirtConnection::open(uri)
        .with_context(|| format!("Failed to connect to {}", uri))?;
    Ok(Arc::new(conn))
}

#[cfg(not(feature = "libvirt"))]
fn open_libvirt(uri: &str) -> Result<Arc<dyn Connection>> {
    bail!("Cannot open {}: libvirt support is not compiled in", uri)
}

fn build_installer(config: &Config) -> Result<Box<dyn Installer>> {
    let installer = &config.guest.installer;
    Ok(match installer.kind {
        InstallerKind::Import => Box::new(ImportInstaller::new()),
        InstallerKind::Pxe => Box::new(PxeInstaller::new()),
        InstallerKind::Cdrom => {
            let location = installer
                .location
                .as_deref()
                .context("cdrom installs need a location")?;
            Box::new(CdromInstaller::new(location)?)
        }
    })
}

fn load_guest(path: &Path, config: &Config, conn: Arc<dyn Connection>) -> Result<Guest> {
    let xml = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let mut guest = Guest::from_xml(conn, &xml)
        .with_context(|| format!("Failed to parse {}", path.display()))?
        .with_compat_mode(config.guest.compat)
        .with_installer(build_installer(config)?);
    if let Some(ref variant) = config.guest.variant {
        guest.set_os_variant(variant)?;
    }
    guest.autostart = config.guest.autostart;
    guest.replace = config.guest.replace;
    Ok(guest)
}

fn run(command: &Command, config: &Config, conn: Arc<dyn Connection>) -> Result<()> {
    match command {
        Command::Roundtrip { file } => {
            let guest = load_guest(file, config, conn)?;
            print!("{}", guest.get_xml_config());
        }
        Command::InstallXml { file, disk_boot } => {
            let mut guest = load_guest(file, config, conn)?;
            match guest.get_install_xml(*disk_boot)? {
                Some(xml) => print!("{}", xml),
                None => info!("Installer has no install phase"),
            }
        }
        Command::FinalXml { file } => {
            let mut guest = load_guest(file, config, conn)?;
            print!("{}", guest.get_config_xml()?);
        }
        Command::Install { file, dry_run, noboot } => {
            let mut guest = load_guest(file, config, conn)?;
            let mut meter = TracingMeter::new();
            match guest.start_install(&mut meter, *dry_run, *noboot)? {
                Some(dom) => {
                    if guest.get_continue_inst() {
                        warn!(
                            name = %dom.name,
                            "Installation needs a second boot from disk once the guest shuts down"
                        );
                    }
                    println!("{}", serde_json::to_string_pretty(&dom)?);
                }
                None => println!("Dry run completed, nothing was created"),
            }
        }
        Command::Support { feature, hv_type } => {
            let data = hv_type
                .as_ref()
                .map(|hv| SupportData::HvType(hv.clone()))
                .unwrap_or_default();
            let features: Vec<SupportFeature> = match feature {
                Some(name) => match SupportFeature::from_name(name) {
                    Some(f) => vec![f],
                    None => bail!("Unknown capability check '{}'", name),
                },
                None => SupportFeature::ALL.to_vec(),
            };
            let mut results = serde_json::Map::new();
            for f in features {
                // Checks that need a domain or other object have none to run against here.
                let value = match check_support(conn.as_ref(), f, &data, config.guest.compat) {
                    Ok(supported) => serde_json::Value::Bool(supported),
                    Err(e) => {
                        debug!(feature = %f, error = %e, "Check needs an object");
                        serde_json::Value::Null
                    }
                };
                results.insert(f.name().to_string(), value);
            }
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
    }
    Ok(())
}
