//! Instruction bytes, file identifiers and tags used by the USIM application

/// Class byte for every UICC command sent here
pub const CLA: u8 = 0x00;

/// Instruction bytes
pub mod ins {
    /// SELECT
    pub const SELECT: u8 = 0xA4;
    /// READ BINARY
    pub const READ_BINARY: u8 = 0xB0;
    /// READ RECORD
    pub const READ_RECORD: u8 = 0xB2;
    /// AUTHENTICATE
    pub const AUTHENTICATE: u8 = 0x88;
    /// GET RESPONSE
    pub const GET_RESPONSE: u8 = 0xC0;
}

/// SELECT parameters
pub mod select {
    /// P1: select by file identifier
    pub const BY_FILE_ID: u8 = 0x00;
    /// P1: select by DF name (AID)
    pub const BY_DF_NAME: u8 = 0x04;
    /// P2: return the FCP template
    pub const RETURN_FCP: u8 = 0x04;
}

/// AUTHENTICATE P2 for the 3G security context with a specific reference
pub const AUTH_CONTEXT_3G: u8 = 0x81;

/// READ RECORD P2 for absolute/current record mode
pub const RECORD_ABSOLUTE: u8 = 0x04;

/// Length of the EF_IMSI content
pub const EF_IMSI_LENGTH: u8 = 0x09;

/// File identifiers
pub mod file_id {
    /// Master file
    pub const MF: [u8; 2] = [0x3F, 0x00];
    /// EF_DIR under the MF
    pub const EF_DIR: [u8; 2] = [0x2F, 0x00];
    /// EF_IMSI under the USIM ADF
    pub const EF_IMSI: [u8; 2] = [0x6F, 0x07];
}

/// File control parameter tags
pub mod fcp_tags {
    /// FCP template
    pub const TEMPLATE: u8 = 0x62;
    /// File size
    pub const FILE_SIZE: u8 = 0x80;
    /// Total file size
    pub const TOTAL_FILE_SIZE: u8 = 0x81;
    /// File descriptor
    pub const FILE_DESCRIPTOR: u8 = 0x82;
    /// File identifier
    pub const FILE_IDENTIFIER: u8 = 0x83;
    /// DF name (AID)
    pub const DF_NAME: u8 = 0x84;
    /// Short file identifier
    pub const SHORT_FILE_IDENTIFIER: u8 = 0x88;
    /// Life cycle status integer
    pub const LIFE_CYCLE_STATUS: u8 = 0x8A;
    /// Security attribute, referenced to EF_ARR
    pub const SECURITY_ATTRIBUTE_REFERENCED: u8 = 0x8B;
    /// Security attribute, compact
    pub const SECURITY_ATTRIBUTE_COMPACT: u8 = 0x8C;
    /// Proprietary information
    pub const PROPRIETARY_INFO: u8 = 0xA5;
    /// Security attribute, expanded
    pub const SECURITY_ATTRIBUTE_EXPANDED: u8 = 0xAB;
    /// PIN status template DO
    pub const PIN_STATUS_TEMPLATE: u8 = 0xC6;
}

/// EF_DIR record tags
pub mod dir_tags {
    /// Application template
    pub const APPLICATION_TEMPLATE: u8 = 0x61;
    /// Application identifier
    pub const APPLICATION_IDENTIFIER: u8 = 0x4F;
    /// Application label
    pub const APPLICATION_LABEL: u8 = 0x50;
}

/// AUTHENTICATE result tags
pub mod auth_tags {
    /// Successful 3G authentication
    pub const SUCCESS: u8 = 0xDB;
    /// Synchronisation failure
    pub const SYNC_FAILURE: u8 = 0xDC;
}
