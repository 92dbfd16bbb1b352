//! Section command table.
//!
//! Maps every (section, platform) pair to either a shell command or an
//! explicit "unsupported" marker. The built-in table is an exhaustive match,
//! so a missing pair is a compile error; config overrides are validated when
//! the table is loaded, before any node is contacted.

use crate::inventory::Platform;
use crate::validate::{ValidationError, ValidationResult};
use hydra_bundle::SectionName;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-platform, per-section overrides from the config file.
///
/// A `null` value marks the pair explicitly unsupported.
pub type CommandOverrides = BTreeMap<Platform, BTreeMap<SectionName, Option<String>>>;

/// What to run for one (section, platform) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "command", rename_all = "snake_case")]
pub enum CommandEntry {
    Command(String),
    Unsupported,
}

impl CommandEntry {
    pub fn command(&self) -> Option<&str> {
        match self {
            CommandEntry::Command(cmd) => Some(cmd),
            CommandEntry::Unsupported => None,
        }
    }

    pub fn is_supported(&self) -> bool {
        matches!(self, CommandEntry::Command(_))
    }
}

/// Complete capability table for all sections on all platforms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionCommandTable {
    entries: Vec<CommandEntry>,
}

fn slot(section: SectionName, platform: Platform) -> usize {
    section.index() * Platform::ALL.len() + platform.index()
}

impl SectionCommandTable {
    fn from_fn(f: impl Fn(SectionName, Platform) -> CommandEntry) -> Self {
        let mut entries = Vec::with_capacity(SectionName::ALL.len() * Platform::ALL.len());
        for section in SectionName::ALL {
            for platform in Platform::ALL {
                entries.push(f(section, platform));
            }
        }
        Self { entries }
    }

    /// The built-in table.
    pub fn builtin() -> Self {
        Self::from_fn(builtin_command)
    }

    /// Built-in table with config overrides applied and validated.
    pub fn with_overrides(overrides: &CommandOverrides) -> ValidationResult<Self> {
        let mut table = Self::builtin();
        for (platform, sections) in overrides {
            for (section, command) in sections {
                let entry = match command {
                    Some(cmd) if cmd.trim().is_empty() => {
                        return Err(ValidationError::InvalidValue {
                            field: format!("commands.{}.{}", platform, section),
                            message: "command must not be empty (use null for unsupported)"
                                .to_string(),
                        });
                    }
                    Some(cmd) => CommandEntry::Command(cmd.trim().to_string()),
                    None => CommandEntry::Unsupported,
                };
                table.entries[slot(*section, *platform)] = entry;
            }
        }
        table.validate()?;
        Ok(table)
    }

    /// Check that every pair resolves to a usable entry.
    pub fn validate(&self) -> ValidationResult<()> {
        if self.entries.len() != SectionName::ALL.len() * Platform::ALL.len() {
            return Err(ValidationError::SchemaError(format!(
                "command table has {} entries, expected {}",
                self.entries.len(),
                SectionName::ALL.len() * Platform::ALL.len()
            )));
        }
        for section in SectionName::ALL {
            for platform in Platform::ALL {
                if let CommandEntry::Command(cmd) = self.lookup(section, platform) {
                    if cmd.trim().is_empty() {
                        return Err(ValidationError::MissingField(format!(
                            "commands.{}.{}",
                            platform, section
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn lookup(&self, section: SectionName, platform: Platform) -> &CommandEntry {
        &self.entries[slot(section, platform)]
    }

    /// Number of sections with a command on `platform`.
    pub fn supported_count(&self, platform: Platform) -> usize {
        SectionName::ALL
            .iter()
            .filter(|s| self.lookup(**s, platform).is_supported())
            .count()
    }

    /// Sections marked unsupported on `platform`, in enumeration order.
    pub fn unsupported_sections(&self, platform: Platform) -> Vec<SectionName> {
        SectionName::ALL
            .iter()
            .copied()
            .filter(|s| !self.lookup(*s, platform).is_supported())
            .collect()
    }
}

/// One combined command that prints the node summary line.
pub fn summary_command(platform: Platform) -> &'static str {
    match platform {
        Platform::Linux => {
            r#"printf 'HOMEOPS_NODE_SNAPSHOT|hostname=%s|os=%s|version=%s|kernel=%s|cpu=%s|cores=%s|ram_total=%s|uptime=%s\n' "$(hostname)" "$(. /etc/os-release 2>/dev/null && echo "$NAME")" "$(. /etc/os-release 2>/dev/null && echo "$VERSION_ID")" "$(uname -r)" "$(grep -m1 'model name' /proc/cpuinfo 2>/dev/null | cut -d: -f2)" "$(nproc 2>/dev/null)" "$(free -h 2>/dev/null | awk '/^Mem:/{print $2}')" "$(uptime -p 2>/dev/null)""#
        }
        Platform::Macos => {
            r#"printf 'HOMEOPS_NODE_SNAPSHOT|hostname=%s|os=%s|version=%s|kernel=%s|cpu=%s|cores=%s|ram_total=%s|uptime=%s\n' "$(hostname)" "$(sw_vers -productName)" "$(sw_vers -productVersion)" "$(uname -r)" "$(sysctl -n machdep.cpu.brand_string)" "$(sysctl -n hw.ncpu)" "$(( $(sysctl -n hw.memsize) / 1073741824 ))Gi" "$(uptime | sed 's/.*up \([^,]*\),.*/\1/')""#
        }
    }
}

fn cmd(s: &str) -> CommandEntry {
    CommandEntry::Command(s.to_string())
}

fn builtin_command(section: SectionName, platform: Platform) -> CommandEntry {
    use Platform::{Linux, Macos};
    use SectionName::*;

    match (section, platform) {
        (OsIdentity, Linux) => cmd("cat /etc/os-release; uname -srm"),
        (OsIdentity, Macos) => cmd("sw_vers; uname -srm"),

        (Uptime, Linux) => cmd("uptime -s"),
        (Uptime, Macos) => cmd("sysctl -n kern.boottime"),

        (Cpu, Linux) => cmd("lscpu | grep -E '^(Architecture|Model name|Socket|Core|Thread|CPU\\(s\\))'"),
        (Cpu, Macos) => cmd("sysctl -n machdep.cpu.brand_string hw.physicalcpu hw.logicalcpu"),

        (Ram, Linux) => cmd("grep -E '^(MemTotal|SwapTotal)' /proc/meminfo"),
        (Ram, Macos) => cmd("sysctl -n hw.memsize"),

        (Disks, Linux) => cmd("lsblk -d -o NAME,SIZE,TYPE,MODEL,SERIAL -n"),
        (Disks, Macos) => cmd("diskutil list physical"),

        (Df, Linux) => cmd("df -hT -x tmpfs -x devtmpfs -x overlay -x squashfs --output=source,fstype,size,target"),
        (Df, Macos) => cmd("df -h -l | awk '{print $1, $2, $9}'"),

        (Network, Linux) => cmd("ip -brief addr show | grep -v '^lo'"),
        (Network, Macos) => cmd("ifconfig | awk '/^[a-z]/{iface=$1} /inet /{print iface, $2}'"),

        (Dns, Linux) => cmd("grep -E '^(nameserver|search)' /etc/resolv.conf; resolvectl dns 2>/dev/null"),
        (Dns, Macos) => cmd("scutil --dns | grep 'nameserver\\[' | sort -u"),

        (Ports, Linux) => cmd("ss -tulnH | awk '{print $1, $5}' | sort -u"),
        (Ports, Macos) => cmd("lsof -nP -iTCP -sTCP:LISTEN | awk 'NR>1{print $1, $9}' | sort -u"),

        (Services, Linux) => cmd("systemctl list-units --type=service --state=running --no-pager --no-legend --plain | awk '{print $1}'"),
        (Services, Macos) => cmd("launchctl list | awk 'NR>1 && $1 != \"-\" {print $3}' | sort"),

        (DockerVersion, _) => cmd("docker version --format '{{.Server.Version}}'"),

        (DockerPs, _) => cmd("docker ps --format '{{.Names}}\t{{.Image}}\t{{.Ports}}' | sort"),

        (DockerCompose, _) => cmd("docker compose ls --format table | awk 'NR>1{print $1, $3}'"),

        (Gpu, Linux) => cmd("nvidia-smi --query-gpu=name,driver_version,memory.total --format=csv,noheader"),
        (Gpu, Macos) => cmd("system_profiler SPDisplaysDataType | grep -E 'Chipset Model|VRAM|Metal'"),

        (LspciGpu, Linux) => cmd("lspci | grep -Ei 'vga|3d|display'"),
        (LspciGpu, Macos) => CommandEntry::Unsupported,

        (NfsMounts, Linux) => cmd("findmnt -t nfs,nfs4 -n -o SOURCE,TARGET,FSTYPE"),
        (NfsMounts, Macos) => cmd("mount -t nfs"),

        (ZfsStatus, Linux) => cmd("zpool list -H -o name,size,health 2>/dev/null; zpool status -x"),
        (ZfsStatus, Macos) => CommandEntry::Unsupported,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_is_complete_and_valid() {
        let table = SectionCommandTable::builtin();
        table.validate().unwrap();
        assert_eq!(table.supported_count(Platform::Linux), SectionName::ALL.len());
        assert_eq!(
            table.unsupported_sections(Platform::Macos),
            vec![SectionName::LspciGpu, SectionName::ZfsStatus]
        );
    }

    #[test]
    fn lookup_returns_platform_specific_command() {
        let table = SectionCommandTable::builtin();
        let linux = table.lookup(SectionName::Ports, Platform::Linux).command().unwrap();
        let mac = table.lookup(SectionName::Ports, Platform::Macos).command().unwrap();
        assert!(linux.starts_with("ss "));
        assert!(mac.starts_with("lsof "));
    }

    #[test]
    fn overrides_replace_and_disable_entries() {
        let mut overrides = CommandOverrides::new();
        let mut linux = BTreeMap::new();
        linux.insert(SectionName::Gpu, Some("rocm-smi --showproductname".to_string()));
        linux.insert(SectionName::ZfsStatus, None);
        overrides.insert(Platform::Linux, linux);

        let table = SectionCommandTable::with_overrides(&overrides).unwrap();
        assert_eq!(
            table.lookup(SectionName::Gpu, Platform::Linux).command(),
            Some("rocm-smi --showproductname")
        );
        assert_eq!(
            table.lookup(SectionName::ZfsStatus, Platform::Linux),
            &CommandEntry::Unsupported
        );
        // Other platforms are untouched.
        assert!(table.lookup(SectionName::Gpu, Platform::Macos).is_supported());
    }

    #[test]
    fn empty_override_is_rejected_at_load() {
        let mut overrides = CommandOverrides::new();
        let mut linux = BTreeMap::new();
        linux.insert(SectionName::Dns, Some("   ".to_string()));
        overrides.insert(Platform::Linux, linux);

        let err = SectionCommandTable::with_overrides(&overrides).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidValue { ref field, .. } if field == "commands.linux.DNS"));
    }

    #[test]
    fn overrides_deserialize_from_config_json() {
        let json = r#"{"macos": {"GPU": null, "PORTS": "netstat -an | grep LISTEN"}}"#;
        let overrides: CommandOverrides = serde_json::from_str(json).unwrap();
        let table = SectionCommandTable::with_overrides(&overrides).unwrap();
        assert!(!table.lookup(SectionName::Gpu, Platform::Macos).is_supported());
    }

    #[test]
    fn summary_commands_emit_marker() {
        for platform in Platform::ALL {
            let prefix = format!("{}|hostname=", hydra_bundle::SUMMARY_MAGIC);
            assert!(summary_command(platform).contains(&prefix));
        }
    }
}
