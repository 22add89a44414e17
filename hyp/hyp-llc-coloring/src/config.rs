//! Boot-time coloring configuration from the hypervisor command line.
//!
//! | Key | Value |
//! |-----|-------|
//! | `llc-coloring` | boolean; enable or disable coloring explicitly |
//! | `llc-size`, `llc-nr-ways` | LLC size and associativity; together they give the way size and imply `llc-coloring=on` |
//! | `llc-way-size` | way size override, preferred over the pair above |
//! | `dom0-llc-colors` | color set of the hardware domain |
//! | `buddy-alloc-size` | boot memory kept for the ordinary heap while coloring (default 64 MiB) |
//!
//! Unknown keys belong to other subsystems and are skipped. A malformed value
//! is reported and leaves its key unset.

use crate::domain::{DomainConfig, DomainId, DomainKind};
use crate::error::CmdlineError;
use crate::num::parse_uint;
use alloc::string::{String, ToString};
use log::warn;

pub const DEFAULT_BUDDY_ALLOC_SIZE: u64 = 64 * 1024 * 1024;

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ColoringConfig {
    /// Explicit `llc-coloring=`; `None` if not given.
    pub enabled: Option<bool>,
    pub llc_size: Option<u64>,
    pub llc_nr_ways: Option<u32>,
    pub llc_way_size: Option<u64>,
    /// Unparsed `dom0-llc-colors=`; parsing needs the color count.
    pub dom0_colors: Option<String>,
    pub buddy_alloc_size: u64,
}

impl Default for ColoringConfig {
    fn default() -> Self {
        Self {
            enabled: None,
            llc_size: None,
            llc_nr_ways: None,
            llc_way_size: None,
            dom0_colors: None,
            buddy_alloc_size: DEFAULT_BUDDY_ALLOC_SIZE,
        }
    }
}

impl ColoringConfig {
    #[must_use]
    pub fn from_cmdline(cmdline: &str) -> Self {
        let mut config = Self::default();
        for token in cmdline.split_ascii_whitespace() {
            let (key, value) = token.split_once('=').unwrap_or((token, ""));
            if let Err(e) = config.apply(key, value) {
                warn!("Ignoring {key}={value}: {e}");
            }
        }
        config
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<(), CmdlineError> {
        match key {
            "llc-coloring" => self.enabled = Some(parse_bool(value)?),
            "llc-size" => self.llc_size = Some(parse_size(value)?),
            "llc-nr-ways" => {
                let ways = parse_uint(value).ok_or(CmdlineError::Integer)?;
                self.llc_nr_ways = Some(u32::try_from(ways).map_err(|_| CmdlineError::Integer)?);
            }
            "llc-way-size" => self.llc_way_size = Some(parse_size(value)?),
            "dom0-llc-colors" => self.dom0_colors = Some(value.to_string()),
            "buddy-alloc-size" => self.buddy_alloc_size = parse_size(value)?,
            _ => {}
        }
        Ok(())
    }

    /// The way size given on the command line, if any.
    #[must_use]
    pub fn way_size_override(&self) -> Option<u64> {
        self.llc_way_size.or(match (self.llc_size, self.llc_nr_ways) {
            (Some(size), Some(ways)) if ways != 0 => Some(size / u64::from(ways)),
            _ => None,
        })
    }

    /// Whether the administrator asked for coloring.
    #[must_use]
    pub const fn coloring_requested(&self) -> bool {
        match self.enabled {
            Some(enabled) => enabled,
            None => self.llc_size.is_some() && self.llc_nr_ways.is_some(),
        }
    }

    /// Creation parameters of the hardware domain.
    #[must_use]
    pub fn hardware_domain(&self) -> DomainConfig {
        DomainConfig {
            id: DomainId::HARDWARE,
            kind: DomainKind::Hardware,
            llc_colors: self.dom0_colors.clone(),
        }
    }
}

/// # Errors
/// [`CmdlineError::Bool`] for anything but the accepted spellings.
pub fn parse_bool(s: &str) -> Result<bool, CmdlineError> {
    match s {
        "1" | "yes" | "on" | "true" | "enable" => Ok(true),
        "0" | "no" | "off" | "false" | "disable" => Ok(false),
        _ => Err(CmdlineError::Bool),
    }
}

/// A byte count with optional `K`, `M` or `G` suffix (powers of 1024).
///
/// # Errors
/// [`CmdlineError::Size`] if `s` is not a number with an optional suffix, or overflows.
pub fn parse_size(s: &str) -> Result<u64, CmdlineError> {
    let (digits, shift) = match s.as_bytes().last() {
        Some(b'k' | b'K') => (&s[..s.len() - 1], 10),
        Some(b'm' | b'M') => (&s[..s.len() - 1], 20),
        Some(b'g' | b'G') => (&s[..s.len() - 1], 30),
        _ => (s, 0),
    };
    let value = parse_uint(digits).ok_or(CmdlineError::Size)?;
    value
        .checked_mul(1 << shift)
        .ok_or(CmdlineError::Size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_coloring_keys() {
        let c = ColoringConfig::from_cmdline(
            "console=dtuart llc-coloring=on llc-way-size=64K dom0-llc-colors=0-3,8 buddy-alloc-size=32M noreboot",
        );
        assert_eq!(c.enabled, Some(true));
        assert_eq!(c.llc_way_size, Some(64 * 1024));
        assert_eq!(c.way_size_override(), Some(64 * 1024));
        assert_eq!(c.dom0_colors.as_deref(), Some("0-3,8"));
        assert_eq!(c.buddy_alloc_size, 32 * 1024 * 1024);
        assert!(c.coloring_requested());
    }

    #[test]
    fn size_and_ways_imply_coloring() {
        let c = ColoringConfig::from_cmdline("llc-size=1M llc-nr-ways=16");
        assert_eq!(c.way_size_override(), Some(64 * 1024));
        assert!(c.coloring_requested());

        let c = ColoringConfig::from_cmdline("llc-size=1M llc-nr-ways=16 llc-coloring=off");
        assert!(!c.coloring_requested());

        let c = ColoringConfig::from_cmdline("llc-size=1M llc-nr-ways=16 llc-way-size=128K");
        assert_eq!(c.way_size_override(), Some(128 * 1024));
    }

    #[test]
    fn defaults_when_absent() {
        let c = ColoringConfig::from_cmdline("");
        assert_eq!(c, ColoringConfig::default());
        assert!(!c.coloring_requested());
        assert_eq!(c.way_size_override(), None);
        assert_eq!(c.buddy_alloc_size, DEFAULT_BUDDY_ALLOC_SIZE);
        assert_eq!(c.hardware_domain().llc_colors, None);
    }

    #[test]
    fn malformed_values_leave_key_unset() {
        let c = ColoringConfig::from_cmdline("llc-coloring=maybe llc-way-size=12Q llc-nr-ways=0x");
        assert_eq!(c.enabled, None);
        assert_eq!(c.llc_way_size, None);
        assert_eq!(c.llc_nr_ways, None);
    }

    #[test]
    fn zero_ways_give_no_override() {
        let c = ColoringConfig::from_cmdline("llc-size=1M llc-nr-ways=0");
        assert_eq!(c.way_size_override(), None);
    }

    #[test]
    fn sizes() {
        assert_eq!(parse_size("4096"), Ok(4096));
        assert_eq!(parse_size("0x1000"), Ok(4096));
        assert_eq!(parse_size("2m"), Ok(2 << 20));
        assert_eq!(parse_size("1G"), Ok(1 << 30));
        assert_eq!(parse_size("K"), Err(CmdlineError::Size));
        assert_eq!(parse_size("16E"), Err(CmdlineError::Size));
        assert_eq!(parse_size("0xFFFFFFFFFFFFFFFFG"), Err(CmdlineError::Size));
    }

    #[test]
    fn booleans() {
        for s in ["1", "yes", "on", "true", "enable"] {
            assert_eq!(parse_bool(s), Ok(true));
        }
        for s in ["0", "no", "off", "false", "disable"] {
            assert_eq!(parse_bool(s), Ok(false));
        }
        assert_eq!(parse_bool(""), Err(CmdlineError::Bool));
    }
}
