//! CRC-32 Engine (CRC-32/MPEG-2: poly 0x04C11DB7, init 0xFFFFFFFF, no
//! reflection, no final xor), used to validate and stamp PSI sections.

use crc::{Crc, CRC_32_MPEG_2};

static CRC32_MPEG2: Crc<u32> = Crc::<u32>::new(&CRC_32_MPEG_2);

pub fn crc32(bytes: &[u8]) -> u32 {
    CRC32_MPEG2.checksum(bytes)
}

/// Computes the CRC-32 over a complete PSI section (table_id through the
/// end of the body, excluding the trailing 4 CRC bytes).
pub fn psi_calc_crc32(section: &[u8]) -> u32 {
    let len = section.len();
    if len < 4 {
        return crc32(section);
    }
    crc32(&section[..len - 4])
}

/// Extracts the CRC-32 stored in the last 4 bytes of a section.
pub fn psi_get_crc32(section: &[u8]) -> Option<u32> {
    let len = section.len();
    if len < 4 {
        return None;
    }
    let b = &section[len - 4..];
    Some(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

/// Returns true if the section's trailing CRC matches its computed CRC.
pub fn psi_check_crc32(section: &[u8]) -> bool {
    match psi_get_crc32(section) {
        Some(stored) => stored == psi_calc_crc32(section),
        None => false,
    }
}

/// Patches `section_length` (the low 12 bits of bytes 1-2, following the
/// section_syntax_indicator/reserved bits at the top) to reflect `buf`'s
/// current length, then appends a freshly computed CRC-32 as the final 4
/// bytes. `buf` must already contain table_id through the end of the body
/// (no CRC placeholder).
pub fn finalize_section(buf: &mut Vec<u8>) {
    let section_length = (buf.len() - 3 + 4) as u16; // body after byte 2, plus the CRC we're about to add
    buf[1] = (buf[1] & 0xF0) | ((section_length >> 8) as u8 & 0x0F);
    buf[2] = section_length as u8;

    let crc = crc32(buf.as_slice());
    buf.extend_from_slice(&crc.to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc_of_pat_section_is_stable() {
        // table_id=0, ssi+reserved+length(=13), tsid=1, reserved+version+cn=0xC1,
        // section_number=0, last_section_number=0, program 1 -> pmt pid 0x100
        let mut buf = vec![
            0x00, 0xB0, 0x00, 0x00, 0x01, 0xC1, 0x00, 0x00, 0x00, 0x01, 0xE1, 0x00,
        ];
        buf[1] = 0xB0;
        buf[2] = 0x00;
        finalize_section(&mut buf);
        assert!(psi_check_crc32(&buf));
    }

    #[test]
    fn tampered_section_fails_check() {
        let mut buf = vec![0x00, 0xB0, 0x00, 0x00, 0x01, 0xC1, 0x00, 0x00, 0x00, 0x01, 0xE1, 0x00];
        finalize_section(&mut buf);
        let last = buf.len() - 1;
        buf[last] ^= 0xFF;
        assert!(!psi_check_crc32(&buf));
    }
}
