//! APDUs issued to the USIM

use endorse_apdu_core::Command;

use crate::constants::{
    AUTH_CONTEXT_3G, CLA, EF_IMSI_LENGTH, RECORD_ABSOLUTE, file_id, ins, select,
};
use crate::{Error, Result};

/// SELECT the master file
pub fn select_mf() -> Command {
    select_file(file_id::MF)
}

/// SELECT a file by identifier, asking for its FCP
pub fn select_file(fid: [u8; 2]) -> Command {
    Command::new_with_data(CLA, ins::SELECT, select::BY_FILE_ID, select::RETURN_FCP, fid.to_vec())
}

/// SELECT an application by AID
pub fn select_adf(aid: &[u8]) -> Command {
    Command::new_with_data(CLA, ins::SELECT, select::BY_DF_NAME, select::RETURN_FCP, aid.to_vec())
}

/// READ RECORD `record` of the current EF
///
/// Record sizes above 255 are requested with Le = 0.
pub fn read_record(record: u8, size: u32) -> Command {
    let le = u8::try_from(size).unwrap_or(0x00);
    Command::new_with_le(CLA, ins::READ_RECORD, record, RECORD_ABSOLUTE, le)
}

/// READ BINARY of the EF_IMSI content
pub const fn read_imsi() -> Command {
    Command::new_with_le(CLA, ins::READ_BINARY, 0x00, 0x00, EF_IMSI_LENGTH)
}

/// AUTHENTICATE data field: `len(RAND) || RAND || len(AUTN) || AUTN`
///
/// The whole field has to fit a short Lc.
pub fn authenticate_data(rand: &[u8], autn: &[u8]) -> Result<Vec<u8>> {
    let total = rand.len() + autn.len() + 2;
    if total > usize::from(u8::MAX) {
        return Err(Error::ChallengeTooLong(total));
    }

    let mut data = Vec::with_capacity(total);
    data.push(rand.len() as u8);
    data.extend_from_slice(rand);
    data.push(autn.len() as u8);
    data.extend_from_slice(autn);
    Ok(data)
}

/// AUTHENTICATE in the 3G context
pub fn authenticate(rand: &[u8], autn: &[u8]) -> Result<Command> {
    Ok(Command::new_with_data(
        CLA,
        ins::AUTHENTICATE,
        0x00,
        AUTH_CONTEXT_3G,
        authenticate_data(rand, autn)?,
    ))
}

/// GET RESPONSE for `le` pending bytes
pub const fn get_response(le: u8) -> Command {
    Command::new_with_le(CLA, ins::GET_RESPONSE, 0x00, 0x00, le)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_commands() {
        assert_eq!(select_mf().to_apdu_string(), "00A40004023F00");
        assert_eq!(select_file(file_id::EF_DIR).to_apdu_string(), "00A40004022F00");
        assert_eq!(
            select_adf(&[0xA0, 0x00, 0x00, 0x00, 0x87]).to_apdu_string(),
            "00A4040405A000000087"
        );
    }

    #[test]
    fn test_read_commands() {
        assert_eq!(read_record(1, 0x26).to_apdu_string(), "00B2010426");
        assert_eq!(read_record(1, 0x1FF).to_apdu_string(), "00B2010400");
        assert_eq!(read_imsi().to_apdu_string(), "00B0000009");
        assert_eq!(get_response(0x2C).to_apdu_string(), "00C000002C");
    }

    #[test]
    fn test_authenticate() {
        let rand = [0x11; 16];
        let autn = [0x22; 16];
        let command = authenticate(&rand, &autn).unwrap();
        let apdu = command.to_apdu_string();
        assert!(apdu.starts_with("0088008122101111"));
        assert_eq!(command.data.len(), 34);
        assert_eq!(command.data[17], 0x10);
    }

    #[test]
    fn test_authenticate_rejects_oversized_challenge() {
        assert!(authenticate_data(&[0; 253], &[]).is_ok());
        assert!(matches!(
            authenticate_data(&[0; 254], &[]),
            Err(Error::ChallengeTooLong(256))
        ));
        assert!(matches!(
            authenticate(&[0; 16], &[0; 300]),
            Err(Error::ChallengeTooLong(318))
        ));
    }
}
