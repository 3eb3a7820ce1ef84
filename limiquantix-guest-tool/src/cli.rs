//! Command-line argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use limiquantix_guest::CompatMode;

/// lqx-guest - Build, inspect and install libvirt guest definitions
#[derive(Parser, Debug)]
#[command(name = "lqx-guest")]
#[command(about = "Build, inspect and install libvirt guest definitions")]
#[command(version)]
pub struct Args {
    /// Path to configuration file (optional, defaults used if not found)
    #[arg(short, long, env = "LQX_GUEST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn", env = "LQX_GUEST_LOG")]
    pub log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    pub json_logs: bool,

    /// Connection URI, overriding the configuration
    #[arg(long, env = "LIBVIRT_DEFAULT_URI")]
    pub uri: Option<String>,

    /// OS variant of the guest (e.g. fedora18, win7)
    #[arg(long)]
    pub variant: Option<String>,

    /// Version threshold set for capability checks (auto, upstream, rhel6)
    #[arg(long, value_parser = parse_compat)]
    pub compat: Option<CompatMode>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Parse a domain document and print it back unchanged
    Roundtrip {
        /// Domain XML file
        file: PathBuf,
    },

    /// Print the install-phase document
    InstallXml {
        /// Domain XML file
        file: PathBuf,

        /// Second stage of a multi-stage install (boot from disk)
        #[arg(long)]
        disk_boot: bool,
    },

    /// Print the document used after installation
    FinalXml {
        /// Domain XML file
        file: PathBuf,
    },

    /// Install the guest described by a domain document
    Install {
        /// Domain XML file
        file: PathBuf,

        /// Resolve everything but create nothing
        #[arg(long)]
        dry_run: bool,

        /// Define the guest without booting it
        #[arg(long)]
        noboot: bool,
    },

    /// Evaluate capability checks against the connection
    Support {
        /// Check name (e.g. conn_stream); all checks when omitted
        feature: Option<String>,

        /// Guest hypervisor type for per-hypervisor checks (e.g. kvm)
        #[arg(long)]
        hv_type: Option<String>,
    },
}

fn parse_compat(value: &str) -> Result<CompatMode, String> {
    value.parse().map_err(|e: limiquantix_guest::GuestError| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_install_flags() {
        let args = Args::try_parse_from([
            "lqx-guest",
            "--variant",
            "win7",
            "--compat",
            "rhel6",
            "install",
            "vm.xml",
            "--dry-run",
        ])
        .unwrap();
        assert_eq!(args.variant.as_deref(), Some("win7"));
        assert_eq!(args.compat, Some(CompatMode::Rhel6));
        assert_eq!(
            args.command,
            Command::Install { file: "vm.xml".into(), dry_run: true, noboot: false }
        );
    }

    #[test]
    fn test_bad_compat_is_rejected() {
        let err = Args::try_parse_from(["lqx-guest", "--compat", "rhel9", "roundtrip", "vm.xml"]);
        assert!(err.is_err());
    }
}
