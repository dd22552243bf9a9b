//! Configuration records for [`crate::channel::Channel`] and
//! [`crate::pipe::PipeStage`], built once (from CLI flags, a config file,
//! or an embedding host) and passed by reference — replacing the
//! Lua-option-table reads of the module this crate is modeled on with
//! plain `serde`-deserializable structs.

use serde::Deserialize;

/// A single PID-remap or filter rule, in the wire form described by the
/// `map`/`filter` config options (`"pmt=500"`, `"video=501"`,
/// `"eng=502"`, or a bare PID number to drop).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MapSelector {
    Pid(u16),
    Pmt,
    Video,
    Audio,
    Lang([u8; 3]),
}

#[derive(Clone, Copy, Debug)]
pub struct MapRule {
    pub selector: MapSelector,
    pub target_pid: u16,
}

/// Parses one `map` entry, e.g. `"pmt=500"`, `"video=501"`, `"101=600"`,
/// `"eng=502"`.
pub fn parse_map_rule(s: &str) -> anyhow::Result<MapRule> {
    let (lhs, rhs) = s
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("map rule '{s}' missing '='"))?;
    let target_pid: u16 = rhs.trim().parse()?;

    let lhs = lhs.trim();
    let selector = if let Ok(pid) = lhs.parse::<u16>() {
        MapSelector::Pid(pid)
    } else {
        match lhs {
            "pmt" => MapSelector::Pmt,
            "video" => MapSelector::Video,
            "audio" => MapSelector::Audio,
            lang if lang.len() == 3 => {
                let bytes = lang.as_bytes();
                MapSelector::Lang([bytes[0], bytes[1], bytes[2]])
            }
            _ => anyhow::bail!("unrecognized map selector '{lhs}'"),
        }
    };

    Ok(MapRule { selector, target_pid })
}

/// Configuration for a [`crate::channel::Channel`] instance.
#[derive(Clone, Debug, Deserialize)]
pub struct ChannelConfig {
    pub name: String,
    /// Program number to extract. `None` means auto-latch onto the first
    /// program seen in the PAT.
    #[serde(default)]
    pub pnr: Option<u16>,
    /// Program number to present downstream as, if different from `pnr`.
    #[serde(default)]
    pub set_pnr: Option<u16>,
    /// PIDs to join unconditionally; only takes independent effect while
    /// `pnr` is `None` (see crate-level docs).
    #[serde(default)]
    pub pid: Vec<u16>,
    #[serde(default = "default_true")]
    pub sdt: bool,
    #[serde(default = "default_true")]
    pub eit: bool,
    #[serde(default)]
    pub map: Vec<String>,
    #[serde(default)]
    pub filter: Vec<u16>,
    /// Whether to recompute the EIT CRC-32 after rewriting its
    /// transport_stream_id/service_id. Defaults to `true` (always hand
    /// back a structurally valid section).
    #[serde(default = "default_true")]
    pub eit_recompute_crc: bool,
}

fn default_true() -> bool {
    true
}

impl ChannelConfig {
    pub fn new(name: impl Into<String>) -> anyhow::Result<Self> {
        let name = name.into();
        if name.is_empty() {
            anyhow::bail!("channel: name is required");
        }
        Ok(Self {
            name,
            pnr: None,
            set_pnr: None,
            pid: Vec::new(),
            sdt: true,
            eit: true,
            map: Vec::new(),
            filter: Vec::new(),
            eit_recompute_crc: true,
        })
    }

    pub fn map_rules(&self) -> anyhow::Result<Vec<MapRule>> {
        self.map.iter().map(|s| parse_map_rule(s)).collect()
    }
}

/// Configuration for a [`crate::pipe::PipeStage`] instance.
#[derive(Clone, Debug, Deserialize)]
pub struct PipeConfig {
    pub name: String,
    pub command: String,
    /// Seconds before auto-restart; 0 disables auto-restart.
    #[serde(default = "default_restart")]
    pub restart: u32,
    /// Whether the child's stdout carries a TS stream (vs. being treated
    /// as a second stderr-like text log).
    #[serde(default)]
    pub stream: bool,
    /// Whether to buffer incoming TS behind a jitter buffer before
    /// forwarding downstream.
    #[serde(default)]
    pub sync: bool,
    #[serde(default)]
    pub sync_opts: Option<String>,
    /// Whether this pipe is bound to an upstream TS source (the
    /// `upstream` option of the module this is modeled on). When true,
    /// `send_ts` is the intended write path and `send_text` is rejected,
    /// matching the original's `sin.mode == CHILD_IO_MPEGTS` restriction.
    #[serde(default)]
    pub ts_input: bool,
}

fn default_restart() -> u32 {
    5
}

impl PipeConfig {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> anyhow::Result<Self> {
        let name = name.into();
        let command = command.into();
        if name.is_empty() {
            anyhow::bail!("pipe: name is required");
        }
        if command.is_empty() {
            anyhow::bail!("pipe: command line is required");
        }
        Ok(Self {
            name,
            command,
            restart: 5,
            stream: false,
            sync: false,
            sync_opts: None,
            ts_input: false,
        })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.name.is_empty() {
            anyhow::bail!("pipe: name is required");
        }
        if self.command.is_empty() {
            anyhow::bail!("pipe: command line is required");
        }
        if self.restart > 86_400 {
            anyhow::bail!("pipe: restart delay out of range");
        }
        if self.sync && !self.stream {
            anyhow::bail!("pipe: buffering is only supported with TS input (stream = true)");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pmt_rule() {
        let rule = parse_map_rule("pmt=500").unwrap();
        assert_eq!(rule.selector, MapSelector::Pmt);
        assert_eq!(rule.target_pid, 500);
    }

    #[test]
    fn parses_literal_pid_rule() {
        let rule = parse_map_rule("101=600").unwrap();
        assert_eq!(rule.selector, MapSelector::Pid(101));
    }

    #[test]
    fn parses_language_rule() {
        let rule = parse_map_rule("eng=502").unwrap();
        assert_eq!(rule.selector, MapSelector::Lang(*b"eng"));
    }

    #[test]
    fn rejects_malformed_rule() {
        assert!(parse_map_rule("video").is_err());
    }

    #[test]
    fn pipe_config_rejects_sync_without_stream() {
        let mut cfg = PipeConfig::new("p", "/bin/true").unwrap();
        cfg.sync = true;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn pipe_config_rejects_restart_out_of_range() {
        let mut cfg = PipeConfig::new("p", "/bin/true").unwrap();
        cfg.restart = 100_000;
        assert!(cfg.validate().is_err());
    }
}
