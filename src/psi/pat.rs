//! PAT (Program Association Table, table_id 0x00).

use crate::crc::finalize_section;
use crate::psi::section::{parse_generic_header, push_generic_header};
use crate::constants::TABLE_ID_PAT;

#[derive(Clone, Debug)]
pub struct PatSection {
    pub transport_stream_id: u16,
    pub version: u8,
    pub current_next: bool,
    pub programs: Vec<PatEntry>,
}

#[derive(Clone, Copy, Debug)]
pub struct PatEntry {
    pub program_number: u16,
    pub pmt_pid: u16,
}

pub fn parse_pat(section: &[u8]) -> anyhow::Result<PatSection> {
    let hdr = parse_generic_header(section)?;
    if hdr.table_id != TABLE_ID_PAT {
        anyhow::bail!("not PAT");
    }

    let mut programs = Vec::new();
    let mut idx = 0;
    while idx + 4 <= hdr.body.len() {
        let program_number = u16::from_be_bytes([hdr.body[idx], hdr.body[idx + 1]]);
        let pid = (((hdr.body[idx + 2] & 0x1F) as u16) << 8) | hdr.body[idx + 3] as u16;
        idx += 4;
        if program_number != 0 {
            programs.push(PatEntry { program_number, pmt_pid: pid });
        }
    }

    Ok(PatSection {
        transport_stream_id: hdr.table_id_extension,
        version: hdr.version,
        current_next: hdr.current_next,
        programs,
    })
}

/// Builds a single-program PAT section (the SPTS this crate produces
/// always advertises exactly one program).
pub fn build_single_program(
    transport_stream_id: u16,
    version: u8,
    program_number: u16,
    pmt_pid: u16,
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16);
    push_generic_header(
        &mut buf,
        TABLE_ID_PAT,
        transport_stream_id,
        version,
        true,
        0,
        0,
    );
    buf.extend_from_slice(&program_number.to_be_bytes());
    buf.push(0xE0 | ((pmt_pid >> 8) as u8 & 0x1F));
    buf.push(pmt_pid as u8);
    finalize_section(&mut buf);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_and_parses_single_program() {
        let section = build_single_program(1, 0, 100, 0x100);
        let pat = parse_pat(&section).unwrap();
        assert_eq!(pat.transport_stream_id, 1);
        assert_eq!(pat.programs.len(), 1);
        assert_eq!(pat.programs[0].program_number, 100);
        assert_eq!(pat.programs[0].pmt_pid, 0x100);
    }

    #[test]
    fn rejects_wrong_table_id() {
        let mut section = build_single_program(1, 0, 100, 0x100);
        section[0] = 0x02;
        assert!(parse_pat(&section).is_err());
    }
}
