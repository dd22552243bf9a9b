//! PMT (Program Map Table, table_id 0x02).

use crate::crc::finalize_section;
use crate::psi::section::{parse_generic_header, push_generic_header};
use crate::constants::TABLE_ID_PMT;

#[derive(Clone, Debug)]
pub struct StreamEntry {
    pub stream_type: u8,
    pub elementary_pid: u16,
    /// Raw ES descriptor loop bytes, kept verbatim so remapping a PID
    /// never has to understand or rebuild descriptor contents.
    pub descriptors: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct PmtSection {
    pub program_number: u16,
    pub version: u8,
    pub current_next: bool,
    pub pcr_pid: u16,
    /// Raw program-level descriptor loop bytes, kept verbatim.
    pub program_descriptors: Vec<u8>,
    pub streams: Vec<StreamEntry>,
}

pub fn parse_pmt(section: &[u8]) -> anyhow::Result<PmtSection> {
    let hdr = parse_generic_header(section)?;
    if hdr.table_id != TABLE_ID_PMT {
        anyhow::bail!("not PMT");
    }
    let b = hdr.body;
    if b.len() < 4 {
        anyhow::bail!("PMT body too short");
    }

    let pcr_pid = (((b[0] & 0x1F) as u16) << 8) | b[1] as u16;
    let prog_info_len = (((b[2] & 0x0F) as usize) << 8) | b[3] as usize;
    if 4 + prog_info_len > b.len() {
        anyhow::bail!("truncated program_info");
    }
    let program_descriptors = b[4..4 + prog_info_len].to_vec();

    let mut idx = 4 + prog_info_len;
    let mut streams = Vec::new();
    while idx + 5 <= b.len() {
        let stream_type = b[idx];
        let elementary_pid = (((b[idx + 1] & 0x1F) as u16) << 8) | b[idx + 2] as u16;
        let es_info_len = (((b[idx + 3] & 0x0F) as usize) << 8) | b[idx + 4] as usize;
        let desc_start = idx + 5;
        let desc_end = desc_start + es_info_len;
        if desc_end > b.len() {
            anyhow::bail!("truncated ES descriptors");
        }

        streams.push(StreamEntry {
            stream_type,
            elementary_pid,
            descriptors: b[desc_start..desc_end].to_vec(),
        });
        idx = desc_end;
    }

    Ok(PmtSection {
        program_number: hdr.table_id_extension,
        version: hdr.version,
        current_next: hdr.current_next,
        pcr_pid,
        program_descriptors,
        streams,
    })
}

impl PmtSection {
    /// Re-serializes this PMT, e.g. after remapping `pcr_pid` and/or
    /// elementary PIDs in `streams` in place.
    pub fn build(&self, version: u8) -> Vec<u8> {
        let mut buf = Vec::with_capacity(32);
        push_generic_header(
            &mut buf,
            TABLE_ID_PMT,
            self.program_number,
            version,
            self.current_next,
            0,
            0,
        );

        buf.push(0xE0 | ((self.pcr_pid >> 8) as u8 & 0x1F));
        buf.push(self.pcr_pid as u8);
        let prog_info_len = self.program_descriptors.len() as u16;
        buf.push(0xF0 | ((prog_info_len >> 8) as u8 & 0x0F));
        buf.push(prog_info_len as u8);
        buf.extend_from_slice(&self.program_descriptors);

        for stream in &self.streams {
            buf.push(stream.stream_type);
            buf.push(0xE0 | ((stream.elementary_pid >> 8) as u8 & 0x1F));
            buf.push(stream.elementary_pid as u8);
            let es_info_len = stream.descriptors.len() as u16;
            buf.push(0xF0 | ((es_info_len >> 8) as u8 & 0x0F));
            buf.push(es_info_len as u8);
            buf.extend_from_slice(&stream.descriptors);
        }

        finalize_section(&mut buf);
        buf
    }
}
