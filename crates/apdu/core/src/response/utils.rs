//! Utility functions for APDU response handling

use crate::response::status::StatusWord;
use tracing::debug;

/// Extract status word (SW1, SW2) and data from raw APDU response data
///
/// Returns `None` if the data is too short to contain a status word.
pub fn extract_response_parts(raw: &[u8]) -> Option<((u8, u8), &[u8])> {
    if raw.len() < 2 {
        debug!("Response too short: {} bytes", raw.len());
        return None;
    }

    let (data, sw) = raw.split_at(raw.len() - 2);
    Some(((sw[0], sw[1]), data))
}

/// Extract status word as a StatusWord object and data from raw APDU response data
pub fn extract_status_and_data(raw: &[u8]) -> Option<(StatusWord, &[u8])> {
    extract_response_parts(raw).map(|((sw1, sw2), data)| (StatusWord::new(sw1, sw2), data))
}
