//! CAT (Conditional Access Table, table_id 0x01).
//!
//! The source never rewrites CAT — it is forwarded raw once joined — so
//! this codec only parses far enough to detect version changes and hand
//! back the CA descriptor loop for the EMM PID harvest in
//! [`crate::channel`].

use crate::psi::section::parse_generic_header;
use crate::constants::TABLE_ID_CAT;

#[derive(Clone, Debug)]
pub struct CatSection {
    pub version: u8,
    pub current_next: bool,
    /// Raw CA descriptor loop, scanned for tag 0x09 (CA) entries.
    pub descriptors: Vec<u8>,
}

pub fn parse_cat(section: &[u8]) -> anyhow::Result<CatSection> {
    let hdr = parse_generic_header(section)?;
    if hdr.table_id != TABLE_ID_CAT {
        anyhow::bail!("not CAT");
    }
    Ok(CatSection {
        version: hdr.version,
        current_next: hdr.current_next,
        descriptors: hdr.body.to_vec(),
    })
}
