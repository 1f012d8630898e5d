use crate::consts::PAYLOAD_LEN;

pub(crate) fn xor_checksum(payload: &[u8; PAYLOAD_LEN]) -> u8 {
    payload.iter().fold(0, |acc, b| acc ^ b)
}
