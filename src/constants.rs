//! Constants for MPEG-TS packet and PSI section handling.

/// Size in bytes of a single MPEG-TS packet.
pub const TS_PACKET_SIZE: usize = 188;

/// Sync byte that must lead every TS packet.
pub const TS_SYNC_BYTE: u8 = 0x47;

/// Null packet PID, used for stuffing.
pub const NULL_PID: u16 = 0x1FFF;

/// One past the highest valid 13-bit PID value.
pub const MAX_PID: u16 = 0x2000;

/// Maximum PSI section size (table_id + section_length field + body),
/// per ISO/IEC 13818-1 (private sections may run up to 4096 bytes).
pub const PSI_MAX_SIZE: usize = 4096;

/// Well-known PSI PIDs.
pub const PID_PAT: u16 = 0x0000;
pub const PID_CAT: u16 = 0x0001;
pub const PID_SDT: u16 = 0x0011;
pub const PID_EIT: u16 = 0x0012;

/// Table IDs this crate understands.
pub const TABLE_ID_PAT: u8 = 0x00;
pub const TABLE_ID_CAT: u8 = 0x01;
pub const TABLE_ID_PMT: u8 = 0x02;
pub const TABLE_ID_SDT_ACTUAL: u8 = 0x42;
pub const TABLE_ID_SDT_OTHER: u8 = 0x46;
pub const TABLE_ID_EIT_PF_ACTUAL: u8 = 0x4E;
pub const TABLE_ID_EIT_PF_OTHER: u8 = 0x4F;
/// `table_id` range for EIT schedule, "actual" transport stream.
pub const TABLE_ID_EIT_SCHEDULE_ACTUAL_START: u8 = 0x50;
pub const TABLE_ID_EIT_SCHEDULE_ACTUAL_END: u8 = 0x5F;

/// Descriptor tag used to classify elementary streams by language.
pub const DESC_LANGUAGE: u8 = 0x0A;
/// Conditional access descriptor tag (CAT/PMT).
pub const DESC_CA: u8 = 0x09;

/// Stream type values used to classify PMT elementary streams as audio/video.
pub mod stream_type {
    pub const MPEG2_VIDEO: u8 = 0x02;
    pub const MPEG1_AUDIO: u8 = 0x03;
    pub const MPEG2_AUDIO: u8 = 0x04;
    pub const AAC_ADTS: u8 = 0x0F;
    pub const AAC_LATM: u8 = 0x11;
    pub const H264: u8 = 0x1B;
    pub const HEVC: u8 = 0x24;
    pub const AC3: u8 = 0x81;
    pub const EAC3: u8 = 0x87;

    pub fn is_video(stream_type: u8) -> bool {
        matches!(stream_type, MPEG2_VIDEO | H264 | HEVC)
    }

    pub fn is_audio(stream_type: u8) -> bool {
        matches!(
            stream_type,
            MPEG1_AUDIO | MPEG2_AUDIO | AAC_ADTS | AAC_LATM | AC3 | EAC3
        )
    }
}
