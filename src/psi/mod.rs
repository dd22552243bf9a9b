pub mod cat;
pub mod eit;
pub mod pat;
pub mod pmt;
pub mod sdt;
pub mod section;

pub use cat::{parse_cat, CatSection};
pub use eit::{parse_eit_pf, rewrite_service as rewrite_eit_service, EitHeader};
pub use pat::{parse_pat, PatEntry, PatSection};
pub use pmt::{parse_pmt, PmtSection, StreamEntry};
pub use sdt::{parse_sdt, SdtSection, Service as SdtService};
