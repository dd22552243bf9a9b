//! SDT (Service Description Table, table_id 0x42 actual / 0x46 other).
//!
//! Service loop layout per EN 300 468: after the 8-byte generic section
//! header comes `original_network_id` (2 bytes) and `reserved_future_use`
//! (1 byte), then the service loop — no other fields. A service entry is
//! `service_id`(2) + flags(1) + running_status/free_CA/desc_len(2) +
//! descriptors.

use crate::crc::finalize_section;
use crate::psi::section::{parse_generic_header, push_generic_header};
use crate::constants::{TABLE_ID_SDT_ACTUAL, TABLE_ID_SDT_OTHER};

#[derive(Clone, Debug)]
pub struct Service {
    pub service_id: u16,
    pub eit_schedule: bool,
    pub eit_present_following: bool,
    pub running_status: u8,
    pub free_ca_mode: bool,
    /// Raw descriptor loop (service descriptor 0x48 etc.), kept verbatim.
    pub descriptors: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct SdtSection {
    pub table_id: u8,
    pub transport_stream_id: u16,
    pub version: u8,
    pub current_next: bool,
    pub section_number: u8,
    pub last_section_number: u8,
    pub original_network_id: u16,
    pub services: Vec<Service>,
}

pub fn parse_sdt(section: &[u8]) -> anyhow::Result<SdtSection> {
    let hdr = parse_generic_header(section)?;
    if hdr.table_id != TABLE_ID_SDT_ACTUAL && hdr.table_id != TABLE_ID_SDT_OTHER {
        anyhow::bail!("not SDT");
    }
    let b = hdr.body;
    if b.len() < 3 {
        anyhow::bail!("SDT body too short");
    }

    let original_network_id = u16::from_be_bytes([b[0], b[1]]);
    // b[2] is reserved_future_use.

    let mut idx = 3;
    let mut services = Vec::new();
    while idx + 5 <= b.len() {
        let service_id = u16::from_be_bytes([b[idx], b[idx + 1]]);
        let eit_schedule = b[idx + 2] & 0x02 != 0;
        let eit_present_following = b[idx + 2] & 0x01 != 0;
        let running_status = (b[idx + 3] >> 5) & 0x07;
        let free_ca_mode = b[idx + 3] & 0x10 != 0;
        let desc_len = (((b[idx + 3] & 0x0F) as usize) << 8) | b[idx + 4] as usize;

        let desc_start = idx + 5;
        let desc_end = desc_start + desc_len;
        if desc_end > b.len() {
            anyhow::bail!("truncated SDT descriptors");
        }

        services.push(Service {
            service_id,
            eit_schedule,
            eit_present_following,
            running_status,
            free_ca_mode,
            descriptors: b[desc_start..desc_end].to_vec(),
        });
        idx = desc_end;
    }

    Ok(SdtSection {
        table_id: hdr.table_id,
        transport_stream_id: hdr.table_id_extension,
        version: hdr.version,
        current_next: hdr.current_next,
        section_number: hdr.section_number,
        last_section_number: hdr.last_section_number,
        original_network_id,
        services,
    })
}

impl SdtSection {
    pub fn build(&self, version: u8) -> Vec<u8> {
        let mut buf = Vec::with_capacity(32);
        push_generic_header(
            &mut buf,
            self.table_id,
            self.transport_stream_id,
            version,
            self.current_next,
            0,
            0,
        );
        buf.extend_from_slice(&self.original_network_id.to_be_bytes());
        buf.push(0xFF); // reserved_future_use, all 1s

        for svc in &self.services {
            buf.extend_from_slice(&svc.service_id.to_be_bytes());
            let mut flags = 0xFCu8; // reserved_future_use (6 bits) = all 1s
            if svc.eit_schedule {
                flags |= 0x02;
            }
            if svc.eit_present_following {
                flags |= 0x01;
            }
            buf.push(flags);

            let desc_len = svc.descriptors.len() as u16;
            let mut b1 = (svc.running_status & 0x07) << 5;
            if svc.free_ca_mode {
                b1 |= 0x10;
            }
            b1 |= (desc_len >> 8) as u8 & 0x0F;
            buf.push(b1);
            buf.push(desc_len as u8);
            buf.extend_from_slice(&svc.descriptors);
        }

        finalize_section(&mut buf);
        buf
    }

    /// Builds an SDT-actual section advertising exactly one service,
    /// the single program this crate's channel outputs.
    pub fn build_single_service(
        transport_stream_id: u16,
        original_network_id: u16,
        version: u8,
        service: Service,
    ) -> Vec<u8> {
        let sdt = SdtSection {
            table_id: TABLE_ID_SDT_ACTUAL,
            transport_stream_id,
            version,
            current_next: true,
            section_number: 0,
            last_section_number: 0,
            original_network_id,
            services: vec![service],
        };
        sdt.build(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_then_parse_roundtrips_service_loop_offset() {
        let svc = Service {
            service_id: 5,
            eit_schedule: true,
            eit_present_following: true,
            running_status: 4,
            free_ca_mode: false,
            descriptors: vec![0x48, 0x03, 0x01, 0x00, 0x00],
        };
        let section = SdtSection::build_single_service(1, 2, 0, svc);
        let parsed = parse_sdt(&section).unwrap();
        assert_eq!(parsed.transport_stream_id, 1);
        assert_eq!(parsed.original_network_id, 2);
        assert_eq!(parsed.services.len(), 1);
        assert_eq!(parsed.services[0].service_id, 5);
        assert_eq!(parsed.services[0].running_status, 4);
        assert_eq!(parsed.services[0].descriptors, vec![0x48, 0x03, 0x01, 0x00, 0x00]);
    }

    #[test]
    fn two_services_parse_independently() {
        let mut sdt = SdtSection {
            table_id: TABLE_ID_SDT_ACTUAL,
            transport_stream_id: 1,
            version: 0,
            current_next: true,
            section_number: 0,
            last_section_number: 0,
            original_network_id: 0x1234,
            services: vec![
                Service { service_id: 1, eit_schedule: false, eit_present_following: false, running_status: 4, free_ca_mode: false, descriptors: vec![] },
                Service { service_id: 2, eit_schedule: false, eit_present_following: false, running_status: 4, free_ca_mode: false, descriptors: vec![0x48, 0x01, 0x00] },
            ],
        };
        sdt.version = 3;
        let section = sdt.build(3);
        let parsed = parse_sdt(&section).unwrap();
        assert_eq!(parsed.services.len(), 2);
        assert_eq!(parsed.services[1].descriptors, vec![0x48, 0x01, 0x00]);
    }
}
