//! EIT present/following (table_ids 0x4E actual / 0x4F other).
//!
//! The Channel Demux Core only needs to rewrite the `service_id` (the
//! table_id_extension) and the `transport_stream_id` embedded in the body
//! to match the single-program transport stream it produces; the event
//! loop that follows is forwarded untouched.

use crate::constants::{
    TABLE_ID_EIT_PF_ACTUAL, TABLE_ID_EIT_SCHEDULE_ACTUAL_END, TABLE_ID_EIT_SCHEDULE_ACTUAL_START,
};
use crate::crc::{crc32, psi_check_crc32};
use crate::psi::section::parse_generic_header;

#[derive(Clone, Debug)]
pub struct EitHeader {
    pub table_id: u8,
    pub service_id: u16,
    pub version: u8,
    pub transport_stream_id: u16,
    pub original_network_id: u16,
}

/// Parses an EIT section, accepting only "actual" table_ids: present/
/// following (0x4E) or schedule (0x50..=0x5F). "Other" transport stream
/// variants (0x4F, 0x60..=0x6F) are rejected — this crate only ever
/// rewrites and forwards the selected program's own EIT.
pub fn parse_eit_pf(section: &[u8]) -> anyhow::Result<EitHeader> {
    let hdr = parse_generic_header(section)?;
    let is_actual = hdr.table_id == TABLE_ID_EIT_PF_ACTUAL
        || (TABLE_ID_EIT_SCHEDULE_ACTUAL_START..=TABLE_ID_EIT_SCHEDULE_ACTUAL_END).contains(&hdr.table_id);
    if !is_actual {
        anyhow::bail!("not an actual EIT table");
    }
    if hdr.body.len() < 4 {
        anyhow::bail!("EIT body too short");
    }

    Ok(EitHeader {
        table_id: hdr.table_id,
        service_id: hdr.table_id_extension,
        version: hdr.version,
        transport_stream_id: u16::from_be_bytes([hdr.body[0], hdr.body[1]]),
        original_network_id: u16::from_be_bytes([hdr.body[2], hdr.body[3]]),
    })
}

/// Rewrites `service_id` and `transport_stream_id` in place within a
/// complete EIT section, leaving the event loop untouched. Whether the
/// trailing CRC-32 is recomputed is caller-controlled: some downstream
/// consumers expect a byte-for-byte passthrough with a now-stale CRC,
/// matching the historical behavior of the module this was ported from.
pub fn rewrite_service(section: &mut [u8], new_service_id: u16, new_tsid: u16, recompute_crc: bool) -> anyhow::Result<()> {
    if section.len() < 8 + 4 + 4 {
        anyhow::bail!("EIT section too short to rewrite");
    }
    if !psi_check_crc32(section) {
        anyhow::bail!("CRC-32 mismatch");
    }

    section[3..5].copy_from_slice(&new_service_id.to_be_bytes());
    section[8..10].copy_from_slice(&new_tsid.to_be_bytes());

    if recompute_crc {
        let len = section.len();
        let crc = crc32(&section[..len - 4]);
        section[len - 4..].copy_from_slice(&crc.to_be_bytes());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc::finalize_section;
    use crate::psi::section::push_generic_header;

    fn sample(service_id: u16, tsid: u16) -> Vec<u8> {
        let mut buf = Vec::new();
        push_generic_header(&mut buf, TABLE_ID_EIT_PF_ACTUAL, service_id, 0, true, 0, 0);
        buf.extend_from_slice(&tsid.to_be_bytes()); // transport_stream_id
        buf.extend_from_slice(&0x1234u16.to_be_bytes()); // original_network_id
        buf.push(0xFF); // segment_last_section_number
        buf.push(0x00); // last_table_id
        finalize_section(&mut buf);
        buf
    }

    #[test]
    fn rewrite_with_crc_recompute() {
        let mut section = sample(1, 2);
        rewrite_service(&mut section, 9, 10, true).unwrap();
        let hdr = parse_eit_pf(&section).unwrap();
        assert_eq!(hdr.service_id, 9);
        assert_eq!(hdr.transport_stream_id, 10);
        assert!(psi_check_crc32(&section));
    }

    #[test]
    fn rewrite_without_crc_recompute_invalidates_crc() {
        let mut section = sample(1, 2);
        rewrite_service(&mut section, 9, 10, false).unwrap();
        assert!(!psi_check_crc32(&section));
    }
}
