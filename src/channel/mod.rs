//! Channel Demux Core: extracts a single program out of a multiplex and
//! re-stamps its PSI tables (PAT/PMT/SDT/EIT) to describe a single-program
//! transport stream, optionally remapping or dropping elementary PIDs.
//!
//! State machine and table rewriting are modeled directly on the
//! `channel` module this crate replaces: CRC-unchanged sections are
//! re-emitted from cache, a CRC change on the PAT tears down and rebuilds
//! everything derived from program structure (`stream_reload`), and a CRC
//! change on the PMT tears down only the elementary PID bookkeeping.

use std::collections::HashMap;

use crate::assembler::PsiAssembler;
use crate::config::{ChannelConfig, MapRule, MapSelector};
use crate::constants::{
    stream_type, DESC_CA, DESC_LANGUAGE, PID_CAT, PID_EIT, PID_PAT, PID_SDT, TABLE_ID_SDT_ACTUAL,
};
use crate::crc::psi_get_crc32;
use crate::host::DemuxHost;
use crate::packet::{self, TsPacket};
use crate::psi::cat::{parse_cat, CatSection};
use crate::psi::eit::{parse_eit_pf, rewrite_service};
use crate::psi::pat::{build_single_program, parse_pat};
use crate::psi::pmt::{parse_pmt, PmtSection};
use crate::psi::sdt::{parse_sdt, SdtSection};

/// How an elementary/custom PID is treated on output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PidRemap {
    /// Forward unchanged.
    None,
    /// Forward, rewriting the PID field to the given value.
    To(u16),
    /// Receive (for bookkeeping/PCR purposes) but never forward.
    Drop,
}

/// Bookkeeping classification for a joined, program-derived PID.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PidClass {
    Pmt,
    Pcr,
    Video,
    Audio,
    /// Conditional access PID, harvested from a tag 0x09 descriptor in
    /// either the CAT or a PMT's program/ES descriptor loops.
    Ca,
    Other,
}

/// Role hint passed to [`Channel::map_custom_pid`] so a `map` rule keyed
/// on `pmt`/`video`/`audio`/a language code can match.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PidRole {
    Pmt,
    Pcr,
    Video,
    Audio(Option<[u8; 3]>),
    Other,
}

fn extract_language(descriptors: &[u8]) -> Option<[u8; 3]> {
    let mut idx = 0;
    while idx + 2 <= descriptors.len() {
        let tag = descriptors[idx];
        let len = descriptors[idx + 1] as usize;
        if idx + 2 + len > descriptors.len() {
            break;
        }
        if tag == DESC_LANGUAGE && len >= 3 {
            return Some([descriptors[idx + 2], descriptors[idx + 3], descriptors[idx + 4]]);
        }
        idx += 2 + len;
    }
    None
}

/// Extracts a single program from an incoming transport stream and
/// re-emits it (optionally under a different program number, with
/// elementary PIDs remapped or dropped per `config.map`/`config.filter`).
pub struct Channel<H: DemuxHost> {
    config: ChannelConfig,
    host: H,
    map_rules: Vec<MapRule>,

    pnr: Option<u16>,
    set_pnr: u16,
    tsid: u16,
    pmt_pid: Option<u16>,
    pcr_pid: Option<u16>,

    pid_class: HashMap<u16, PidClass>,
    pid_remap: HashMap<u16, PidRemap>,

    pat_in: PsiAssembler,
    pmt_in: PsiAssembler,
    cat_in: PsiAssembler,
    sdt_in: PsiAssembler,
    eit_in: PsiAssembler,

    pat_out: PsiAssembler,
    pmt_out: PsiAssembler,
    sdt_out: PsiAssembler,

    /// Version number of the *output* PAT, incremented independently of
    /// whatever version the upstream PAT happens to carry.
    custom_pat_version: u8,

    last_pat_crc: Option<u32>,
    last_pmt_crc: Option<u32>,
    last_cat_crc: Option<u32>,
    /// Per-section CRC memory for a (possibly multi-section) SDT carousel,
    /// sized to `last_section_number + 1` once the first section arrives.
    sdt_checksums: Option<Vec<Option<u32>>>,
    /// `section_number` of the SDT section that currently carries our
    /// selected service, i.e. the one `sdt_out_section` was built from.
    sdt_selected_section: Option<u8>,

    pat_out_section: Option<Vec<u8>>,
    pmt_out_section: Option<(u16, Vec<u8>)>,
    sdt_out_section: Option<Vec<u8>>,
}

impl<H: DemuxHost> Channel<H> {
    pub fn new(config: ChannelConfig, mut host: H) -> anyhow::Result<Self> {
        let map_rules = config.map_rules()?;

        host.join_pid(PID_PAT);
        host.join_pid(PID_CAT);
        if config.sdt {
            host.join_pid(PID_SDT);
        }
        if config.eit {
            host.join_pid(PID_EIT);
        }

        // Supplemental unconditional joins only apply while no PNR is
        // known yet; once a PNR is latched, PMT-driven joins take over.
        if config.pnr.is_none() {
            for &pid in &config.pid {
                host.join_pid(pid);
            }
        }

        Ok(Self {
            pnr: config.pnr,
            set_pnr: config.set_pnr.or(config.pnr).unwrap_or(0),
            config,
            host,
            map_rules,
            tsid: 0,
            pmt_pid: None,
            pcr_pid: None,
            pid_class: HashMap::new(),
            pid_remap: HashMap::new(),
            pat_in: PsiAssembler::new(),
            pmt_in: PsiAssembler::new(),
            cat_in: PsiAssembler::new(),
            sdt_in: PsiAssembler::new(),
            eit_in: PsiAssembler::new(),
            pat_out: PsiAssembler::new(),
            pmt_out: PsiAssembler::new(),
            sdt_out: PsiAssembler::new(),
            custom_pat_version: 0,
            last_pat_crc: None,
            last_pmt_crc: None,
            last_cat_crc: None,
            sdt_checksums: None,
            sdt_selected_section: None,
            pat_out_section: None,
            pmt_out_section: None,
            sdt_out_section: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn pnr(&self) -> Option<u16> {
        self.pnr
    }

    fn effective_pid(&self, origin: u16) -> u16 {
        match self.pid_remap.get(&origin) {
            Some(PidRemap::To(p)) => *p,
            _ => origin,
        }
    }

    fn map_custom_pid(&mut self, origin_pid: u16, role: PidRole) {
        for rule in &self.map_rules {
            let matches = match rule.selector {
                MapSelector::Pid(p) => p == origin_pid,
                MapSelector::Pmt => role == PidRole::Pmt,
                MapSelector::Video => role == PidRole::Video,
                MapSelector::Audio => matches!(role, PidRole::Audio(_)),
                MapSelector::Lang(code) => matches!(role, PidRole::Audio(Some(c)) if c == code),
            };
            if matches {
                self.pid_remap.insert(origin_pid, PidRemap::To(rule.target_pid));
                return;
            }
        }
        if self.config.filter.contains(&origin_pid) {
            self.pid_remap.insert(origin_pid, PidRemap::Drop);
        }
    }

    /// Feeds one incoming TS packet. Any resulting output packets are
    /// handed to the [`DemuxHost`].
    pub fn on_ts(&mut self, pkt: &TsPacket) {
        if !packet::is_sync(pkt) {
            return;
        }
        let pid = packet::pid(pkt);

        if pid == PID_PAT {
            self.on_pat(pkt);
        } else if pid == PID_CAT {
            self.on_cat(pkt);
            self.host.send(pkt);
        } else if pid == PID_SDT && self.config.sdt {
            self.on_sdt(pkt);
        } else if pid == PID_EIT && self.config.eit {
            self.on_eit(pkt);
        } else if Some(pid) == self.pmt_pid {
            self.on_pmt(pkt);
        } else if self.pid_class.contains_key(&pid) {
            self.forward(pkt, pid);
        }
    }

    fn forward(&mut self, pkt: &TsPacket, origin_pid: u16) {
        match self.pid_remap.get(&origin_pid).copied().unwrap_or(PidRemap::None) {
            PidRemap::Drop => {}
            PidRemap::To(new_pid) => {
                let mut out = *pkt;
                packet::set_pid(&mut out, new_pid);
                self.host.send(&out);
            }
            PidRemap::None => self.host.send(pkt),
        }
    }

    fn stream_reload(&mut self) {
        tracing::info!(channel = %self.config.name, "stream changed, reloading");
        for pid in self.pid_class.keys().copied().collect::<Vec<_>>() {
            self.host.leave_pid(pid);
        }
        self.pid_class.clear();
        self.pid_remap.clear();
        self.pmt_pid = None;
        self.pcr_pid = None;
        self.last_pat_crc = None;
        self.last_pmt_crc = None;
        self.last_cat_crc = None;
        self.sdt_checksums = None;
        self.sdt_selected_section = None;
        self.pmt_out_section = None;
        self.sdt_out_section = None;
    }

    /// Scans a raw descriptor loop for tag 0x09 (conditional access)
    /// entries and classifies/joins the CA PID they carry. Used for both
    /// the CAT's descriptor loop and a PMT's program/ES descriptor loops.
    fn harvest_ca_pids(&mut self, descriptors: &[u8]) {
        let mut idx = 0;
        while idx + 2 <= descriptors.len() {
            let tag = descriptors[idx];
            let len = descriptors[idx + 1] as usize;
            if idx + 2 + len > descriptors.len() {
                break;
            }
            if tag == DESC_CA && len >= 4 {
                let ca_pid = (((descriptors[idx + 4] & 0x1F) as u16) << 8) | descriptors[idx + 5] as u16;
                self.pid_class.entry(ca_pid).or_insert(PidClass::Ca);
                if !self.host.check_pid(ca_pid) {
                    self.host.join_pid(ca_pid);
                }
            }
            idx += 2 + len;
        }
    }

    // ---- PAT ----

    fn on_pat(&mut self, pkt: &TsPacket) {
        let Some(section) = self.pat_in.push(pkt) else {
            return;
        };
        if let Err(err) = self.handle_pat_section(&section) {
            tracing::warn!(channel = %self.config.name, error = %err, "malformed PAT section");
        }
    }

    fn handle_pat_section(&mut self, section: &[u8]) -> anyhow::Result<()> {
        let crc = psi_get_crc32(section).ok_or_else(|| anyhow::anyhow!("short PAT section"))?;
        if Some(crc) == self.last_pat_crc {
            self.emit_pat();
            return Ok(());
        }

        let pat = parse_pat(section)?;
        let had_previous = self.last_pat_crc.is_some();
        if had_previous {
            self.stream_reload();
        }
        self.last_pat_crc = Some(crc);
        self.tsid = pat.transport_stream_id;

        let chosen = match self.config.pnr {
            Some(p) => pat.programs.iter().find(|e| e.program_number == p).copied(),
            None => pat.programs.first().copied(),
        };

        let Some(entry) = chosen else {
            tracing::warn!(channel = %self.config.name, "requested program not found in PAT");
            self.pat_out_section = None;
            return Ok(());
        };

        self.pnr = Some(entry.program_number);
        self.set_pnr = self.config.set_pnr.unwrap_or(entry.program_number);
        self.pmt_pid = Some(entry.pmt_pid);
        self.host.join_pid(entry.pmt_pid);
        self.pid_class.insert(entry.pmt_pid, PidClass::Pmt);
        self.map_custom_pid(entry.pmt_pid, PidRole::Pmt);

        let output_pmt_pid = self.effective_pid(entry.pmt_pid);
        self.custom_pat_version = (self.custom_pat_version + 1) & 0x1F;
        let section = build_single_program(self.tsid, self.custom_pat_version, self.set_pnr, output_pmt_pid);
        self.pat_out_section = Some(section);
        self.emit_pat();
        Ok(())
    }

    fn emit_pat(&mut self) {
        if let Some(section) = self.pat_out_section.clone() {
            for pkt in self.pat_out.split(&section, PID_PAT) {
                self.host.send(&pkt);
            }
        }
    }

    // ---- CAT ----

    fn on_cat(&mut self, pkt: &TsPacket) {
        let Some(section) = self.cat_in.push(pkt) else {
            return;
        };
        if let Err(err) = self.handle_cat_section(&section) {
            tracing::warn!(channel = %self.config.name, error = %err, "malformed CAT section");
        }
    }

    fn handle_cat_section(&mut self, section: &[u8]) -> anyhow::Result<()> {
        let crc = psi_get_crc32(section).ok_or_else(|| anyhow::anyhow!("short CAT section"))?;
        if Some(crc) == self.last_cat_crc {
            return Ok(());
        }

        let cat: CatSection = parse_cat(section)?;
        let had_previous = self.last_cat_crc.is_some();
        if had_previous {
            self.stream_reload();
            return Ok(());
        }
        self.last_cat_crc = Some(crc);
        self.harvest_ca_pids(&cat.descriptors);
        Ok(())
    }

    // ---- PMT ----

    fn on_pmt(&mut self, pkt: &TsPacket) {
        let Some(section) = self.pmt_in.push(pkt) else {
            return;
        };
        if let Err(err) = self.handle_pmt_section(&section) {
            tracing::warn!(channel = %self.config.name, error = %err, "malformed PMT section");
        }
    }

    fn handle_pmt_section(&mut self, section: &[u8]) -> anyhow::Result<()> {
        let crc = psi_get_crc32(section).ok_or_else(|| anyhow::anyhow!("short PMT section"))?;
        if Some(crc) == self.last_pmt_crc {
            self.emit_pmt();
            return Ok(());
        }

        let mut pmt: PmtSection = parse_pmt(section)?;
        if Some(pmt.program_number) != self.pnr {
            // Stray PMT (continuity counter glitch landed us on the wrong
            // program) — ignore rather than rebuild from it.
            return Ok(());
        }

        let had_previous = self.last_pmt_crc.is_some();
        if had_previous {
            let stale: Vec<u16> = self
                .pid_class
                .iter()
                .filter(|(_, class)| **class != PidClass::Pmt)
                .map(|(pid, _)| *pid)
                .collect();
            for pid in stale {
                self.host.leave_pid(pid);
                self.pid_class.remove(&pid);
                self.pid_remap.remove(&pid);
            }
            self.pcr_pid = None;
        }
        self.last_pmt_crc = Some(crc);

        if pmt.pcr_pid != crate::constants::NULL_PID {
            self.pcr_pid = Some(pmt.pcr_pid);
            self.pid_class.entry(pmt.pcr_pid).or_insert(PidClass::Pcr);
            if !self.host.check_pid(pmt.pcr_pid) {
                self.host.join_pid(pmt.pcr_pid);
            }
            self.map_custom_pid(pmt.pcr_pid, PidRole::Pcr);
        }

        for stream in &pmt.streams {
            let role = if stream_type::is_video(stream.stream_type) {
                PidRole::Video
            } else if stream_type::is_audio(stream.stream_type) {
                PidRole::Audio(extract_language(&stream.descriptors))
            } else {
                PidRole::Other
            };

            let class = match role {
                PidRole::Video => PidClass::Video,
                PidRole::Audio(_) => PidClass::Audio,
                _ => PidClass::Other,
            };
            self.pid_class.entry(stream.elementary_pid).or_insert(class);
            if !self.host.check_pid(stream.elementary_pid) {
                self.host.join_pid(stream.elementary_pid);
            }
            self.map_custom_pid(stream.elementary_pid, role);
            self.harvest_ca_pids(&stream.descriptors);
        }
        self.harvest_ca_pids(&pmt.program_descriptors);

        pmt.streams
            .retain(|s| !matches!(self.pid_remap.get(&s.elementary_pid), Some(PidRemap::Drop)));

        if let Some(pcr) = self.pcr_pid {
            pmt.pcr_pid = self.effective_pid(pcr);
        }
        for stream in &mut pmt.streams {
            stream.elementary_pid = self.effective_pid(stream.elementary_pid);
        }
        pmt.program_number = self.set_pnr;

        let out_pid = self.effective_pid(self.pmt_pid.expect("pmt_pid set before on_pmt runs"));
        let version = pmt.version;
        self.pmt_out_section = Some((out_pid, pmt.build(version)));
        self.emit_pmt();
        Ok(())
    }

    fn emit_pmt(&mut self) {
        if let Some((pid, section)) = self.pmt_out_section.clone() {
            for pkt in self.pmt_out.split(&section, pid) {
                self.host.send(&pkt);
            }
        }
    }

    // ---- SDT ----

    fn on_sdt(&mut self, pkt: &TsPacket) {
        let Some(section) = self.sdt_in.push(pkt) else {
            return;
        };
        if let Err(err) = self.handle_sdt_section(&section) {
            tracing::warn!(channel = %self.config.name, error = %err, "malformed SDT section");
        }
    }

    fn handle_sdt_section(&mut self, section: &[u8]) -> anyhow::Result<()> {
        let crc = psi_get_crc32(section).ok_or_else(|| anyhow::anyhow!("short SDT section"))?;
        let sdt = parse_sdt(section)?;
        if sdt.table_id != TABLE_ID_SDT_ACTUAL {
            return Ok(());
        }

        let checksums = self
            .sdt_checksums
            .get_or_insert_with(|| vec![None; sdt.last_section_number as usize + 1]);
        if sdt.section_number as usize >= checksums.len() {
            checksums.resize(sdt.section_number as usize + 1, None);
        }
        let previous = checksums[sdt.section_number as usize];
        if previous == Some(crc) {
            if Some(sdt.section_number) == self.sdt_selected_section {
                self.emit_sdt();
            }
            return Ok(());
        }
        let had_previous = previous.is_some();
        checksums[sdt.section_number as usize] = Some(crc);

        if had_previous {
            self.stream_reload();
            return Ok(());
        }

        let Some(pnr) = self.pnr else {
            return Ok(());
        };
        // Sections besides the one carrying our service are normal and
        // silent in a multi-section carousel.
        let Some(mut service) = sdt.services.iter().find(|s| s.service_id == pnr).cloned() else {
            return Ok(());
        };

        self.sdt_selected_section = Some(sdt.section_number);
        service.service_id = self.set_pnr;
        self.sdt_out_section = Some(SdtSection::build_single_service(
            self.tsid,
            sdt.original_network_id,
            sdt.version,
            service,
        ));
        self.emit_sdt();
        Ok(())
    }

    fn emit_sdt(&mut self) {
        if let Some(section) = self.sdt_out_section.clone() {
            for pkt in self.sdt_out.split(&section, PID_SDT) {
                self.host.send(&pkt);
            }
        }
    }

    // ---- EIT ----

    fn on_eit(&mut self, pkt: &TsPacket) {
        let Some(section) = self.eit_in.push(pkt) else {
            return;
        };
        if let Err(err) = self.handle_eit_section(section) {
            tracing::warn!(channel = %self.config.name, error = %err, "malformed EIT section");
        }
    }

    fn handle_eit_section(&mut self, mut section: Vec<u8>) -> anyhow::Result<()> {
        let hdr = parse_eit_pf(&section)?;
        let Some(pnr) = self.pnr else {
            return Ok(());
        };
        if hdr.transport_stream_id != self.tsid || hdr.service_id != pnr {
            return Ok(());
        }

        rewrite_service(&mut section, self.set_pnr, self.tsid, self.config.eit_recompute_crc)?;
        for pkt in self.eit_in.split(&section, PID_EIT) {
            self.host.send(&pkt);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChannelConfig;
    use crate::crc::finalize_section;
    use crate::host::TestHost;
    use crate::psi::section::push_generic_header;

    fn build_pat(tsid: u16, version: u8, programs: &[(u16, u16)]) -> Vec<u8> {
        let mut buf = Vec::new();
        push_generic_header(&mut buf, 0x00, tsid, version, true, 0, 0);
        for (pn, pid) in programs {
            buf.extend_from_slice(&pn.to_be_bytes());
            buf.push(0xE0 | ((*pid >> 8) as u8 & 0x1F));
            buf.push(*pid as u8);
        }
        finalize_section(&mut buf);
        buf
    }

    fn feed_section(assembler: &mut PsiAssembler, section: &[u8], pid: u16) -> Vec<TsPacket> {
        assembler.split(section, pid)
    }

    #[test]
    fn latches_first_program_when_pnr_unset() {
        let cfg = ChannelConfig::new("ch1").unwrap();
        let mut channel = Channel::new(cfg, TestHost::new()).unwrap();

        let pat = build_pat(1, 0, &[(100, 0x100)]);
        let mut feeder = PsiAssembler::new();
        for pkt in feed_section(&mut feeder, &pat, PID_PAT) {
            channel.on_ts(&pkt);
        }

        assert_eq!(channel.pnr(), Some(100));
        assert!(channel.host.joined.contains(&0x100));
        assert!(!channel.host.sent.is_empty());
    }

    #[test]
    fn resend_on_unchanged_pat_does_not_rejoin() {
        let mut cfg = ChannelConfig::new("ch1").unwrap();
        cfg.pnr = Some(100);
        let mut channel = Channel::new(cfg, TestHost::new()).unwrap();

        let pat = build_pat(1, 0, &[(100, 0x100)]);
        let mut feeder = PsiAssembler::new();
        for pkt in feed_section(&mut feeder, &pat, PID_PAT) {
            channel.on_ts(&pkt);
        }
        let sent_before = channel.host.sent.len();

        let mut feeder2 = PsiAssembler::new();
        for pkt in feed_section(&mut feeder2, &pat, PID_PAT) {
            channel.on_ts(&pkt);
        }
        assert!(channel.host.sent.len() > sent_before);
        assert_eq!(channel.pnr(), Some(100));
    }

    #[test]
    fn pat_version_change_reloads_program_pids() {
        let mut cfg = ChannelConfig::new("ch1").unwrap();
        cfg.pnr = Some(100);
        let mut channel = Channel::new(cfg, TestHost::new()).unwrap();

        let pat1 = build_pat(1, 0, &[(100, 0x100)]);
        let mut feeder = PsiAssembler::new();
        for pkt in feed_section(&mut feeder, &pat1, PID_PAT) {
            channel.on_ts(&pkt);
        }
        assert!(channel.host.joined.contains(&0x100));

        let pat2 = build_pat(1, 1, &[(100, 0x200)]);
        let mut feeder2 = PsiAssembler::new();
        for pkt in feed_section(&mut feeder2, &pat2, PID_PAT) {
            channel.on_ts(&pkt);
        }
        assert!(channel.host.joined.contains(&0x200));
        assert!(!channel.host.joined.contains(&0x100));
    }

    #[test]
    fn elementary_pid_can_be_remapped() {
        let mut cfg = ChannelConfig::new("ch1").unwrap();
        cfg.pnr = Some(100);
        cfg.map = vec!["video=900".to_string()];
        let mut channel = Channel::new(cfg, TestHost::new()).unwrap();

        let pat = build_pat(1, 0, &[(100, 0x100)]);
        let mut feeder = PsiAssembler::new();
        for pkt in feed_section(&mut feeder, &pat, PID_PAT) {
            channel.on_ts(&pkt);
        }

        let pmt = PmtSection {
            program_number: 100,
            version: 0,
            current_next: true,
            pcr_pid: 0x101,
            program_descriptors: vec![],
            streams: vec![crate::psi::pmt::StreamEntry {
                stream_type: stream_type::H264,
                elementary_pid: 0x101,
                descriptors: vec![],
            }],
        };
        let pmt_section = pmt.build(0);
        let mut pmt_feeder = PsiAssembler::new();
        for pkt in feed_section(&mut pmt_feeder, &pmt_section, 0x100) {
            channel.on_ts(&pkt);
        }

        let mut es_pkt = [0u8; crate::constants::TS_PACKET_SIZE];
        es_pkt[0] = crate::constants::TS_SYNC_BYTE;
        packet::set_pid(&mut es_pkt, 0x101);
        es_pkt[3] = 0x10;
        channel.on_ts(&es_pkt);

        let remapped = channel
            .host
            .sent
            .iter()
            .any(|p| packet::pid(p) == 900);
        assert!(remapped);
    }

    /// Reassembles the latest complete PSI section sent to `pid` out of a
    /// host's sent-packet log.
    fn reassemble_section(sent: &[TsPacket], pid: u16) -> Vec<u8> {
        let mut assembler = PsiAssembler::new();
        let mut last = None;
        for pkt in sent.iter().filter(|p| packet::pid(p) == pid) {
            if let Some(section) = assembler.push(pkt) {
                last = Some(section);
            }
        }
        last.expect("no complete section reassembled")
    }

    fn build_sdt_section(
        tsid: u16,
        version: u8,
        section_number: u8,
        last_section_number: u8,
        services: &[u16],
    ) -> Vec<u8> {
        let mut buf = Vec::new();
        push_generic_header(
            &mut buf,
            TABLE_ID_SDT_ACTUAL,
            tsid,
            version,
            true,
            section_number,
            last_section_number,
        );
        buf.extend_from_slice(&1u16.to_be_bytes()); // original_network_id
        buf.push(0xFF);
        for service_id in services {
            buf.extend_from_slice(&service_id.to_be_bytes());
            buf.push(0xFC); // no EIT schedule/p-f
            buf.push((4 & 0x07) << 5); // running_status=4, desc_len high=0
            buf.push(0x00); // desc_len low=0
        }
        finalize_section(&mut buf);
        buf
    }

    #[test]
    fn pmt_drop_filter_omits_stream_from_output() {
        let mut cfg = ChannelConfig::new("ch1").unwrap();
        cfg.pnr = Some(100);
        cfg.filter = vec![0x102];
        let mut channel = Channel::new(cfg, TestHost::new()).unwrap();

        let pat = build_pat(1, 0, &[(100, 0x100)]);
        let mut feeder = PsiAssembler::new();
        for pkt in feed_section(&mut feeder, &pat, PID_PAT) {
            channel.on_ts(&pkt);
        }

        let pmt = PmtSection {
            program_number: 100,
            version: 0,
            current_next: true,
            pcr_pid: 0x101,
            program_descriptors: vec![],
            streams: vec![
                crate::psi::pmt::StreamEntry { stream_type: stream_type::H264, elementary_pid: 0x101, descriptors: vec![] },
                crate::psi::pmt::StreamEntry { stream_type: stream_type::AAC_ADTS, elementary_pid: 0x102, descriptors: vec![] },
            ],
        };
        let pmt_section = pmt.build(0);
        let mut pmt_feeder = PsiAssembler::new();
        for pkt in feed_section(&mut pmt_feeder, &pmt_section, 0x100) {
            channel.on_ts(&pkt);
        }

        let out = reassemble_section(&channel.host.sent, 0x100);
        let parsed = parse_pmt(&out).unwrap();
        assert_eq!(parsed.streams.len(), 1);
        assert_eq!(parsed.streams[0].elementary_pid, 0x101);
    }

    #[test]
    fn cat_harvests_ca_pid_and_forwards_raw() {
        let cfg = ChannelConfig::new("ch1").unwrap();
        let mut channel = Channel::new(cfg, TestHost::new()).unwrap();

        let mut cat = Vec::new();
        push_generic_header(&mut cat, crate::constants::TABLE_ID_CAT, 0xFFFF, 0, true, 0, 0);
        cat.extend_from_slice(&[0x09, 0x04, 0x00, 0x01, 0x08, 0x80]); // CA PID 0x0880
        finalize_section(&mut cat);

        let mut feeder = PsiAssembler::new();
        for pkt in feed_section(&mut feeder, &cat, PID_CAT) {
            channel.on_ts(&pkt);
        }

        assert!(channel.host.joined.contains(&0x0880));
        assert!(channel.host.sent.iter().any(|p| packet::pid(p) == PID_CAT));
    }

    #[test]
    fn pat_version_increments_independently_of_upstream() {
        let mut cfg = ChannelConfig::new("ch1").unwrap();
        cfg.pnr = Some(100);
        let mut channel = Channel::new(cfg, TestHost::new()).unwrap();

        // Upstream keeps the PAT at version 0 across a real PMT PID change.
        let pat1 = build_pat(1, 0, &[(100, 0x100)]);
        let mut feeder1 = PsiAssembler::new();
        for pkt in feed_section(&mut feeder1, &pat1, PID_PAT) {
            channel.on_ts(&pkt);
        }
        let first = reassemble_section(&channel.host.sent, PID_PAT);
        let first_version = parse_pat(&first).unwrap().version;
        assert_eq!(first_version, 1);

        let pat2 = build_pat(1, 0, &[(100, 0x200)]);
        let mut feeder2 = PsiAssembler::new();
        for pkt in feed_section(&mut feeder2, &pat2, PID_PAT) {
            channel.on_ts(&pkt);
        }
        let second = reassemble_section(&channel.host.sent, PID_PAT);
        let second_version = parse_pat(&second).unwrap().version;
        assert_eq!(second_version, 2);
    }

    #[test]
    fn sdt_non_originating_section_without_service_is_silent() {
        let mut cfg = ChannelConfig::new("ch1").unwrap();
        cfg.pnr = Some(100);
        let mut channel = Channel::new(cfg, TestHost::new()).unwrap();

        let pat = build_pat(1, 0, &[(100, 0x100)]);
        let mut feeder = PsiAssembler::new();
        for pkt in feed_section(&mut feeder, &pat, PID_PAT) {
            channel.on_ts(&pkt);
        }

        // Two-section carousel: section 0 carries an unrelated service,
        // section 1 carries ours.
        let sdt0 = build_sdt_section(1, 0, 0, 1, &[200]);
        let mut sdt_feeder0 = PsiAssembler::new();
        for pkt in feed_section(&mut sdt_feeder0, &sdt0, PID_SDT) {
            channel.on_ts(&pkt);
        }
        assert!(channel.host.sent.iter().all(|p| packet::pid(p) != PID_SDT));

        let sdt1 = build_sdt_section(1, 0, 1, 1, &[100]);
        let mut sdt_feeder1 = PsiAssembler::new();
        for pkt in feed_section(&mut sdt_feeder1, &sdt1, PID_SDT) {
            channel.on_ts(&pkt);
        }
        assert!(channel.host.sent.iter().any(|p| packet::pid(p) == PID_SDT));

        // Re-sending the same section 0 content afterwards must not wipe
        // the cached, already-selected section 1 output.
        let sent_before = channel.host.sent.len();
        let mut sdt_feeder0_again = PsiAssembler::new();
        for pkt in feed_section(&mut sdt_feeder0_again, &sdt0, PID_SDT) {
            channel.on_ts(&pkt);
        }
        assert_eq!(channel.host.sent.len(), sent_before);
    }
}
