//! Closed caption (CEA-608/708) data carried in SEI messages.

use crate::{
    extractor::{ExtractorOutput, SampleFlags},
    format::TrackType,
};

const PAYLOAD_TYPE_CC: u32 = 4;
const COUNTRY_CODE: u8 = 0xB5;
const PROVIDER_CODE_ATSC: u16 = 0x31;
const PROVIDER_CODE_DIRECTV: u16 = 0x2F;
const USER_DATA_IDENTIFIER_GA94: u32 = u32::from_be_bytes(*b"GA94");
const USER_DATA_TYPE_CODE_MPEG_CC: u8 = 0x03;

/// Reads a value coded as a run of `0xFF` bytes plus a final byte.
fn read_non_255_terminated_value(data: &[u8], pos: &mut usize) -> Option<u32> {
    let mut value = 0u32;
    loop {
        let byte = *data.get(*pos)?;
        *pos += 1;
        value += byte as u32;
        if byte != 0xFF {
            return Some(value);
        }
    }
}

/// Writes the cc_data of every caption SEI message in `sei_buffer` as one
/// key frame sample to each of `track_ids`.
///
/// `sei_buffer` holds unescaped SEI messages without the NAL unit header.
pub fn consume(
    presentation_time_us: Option<i64>,
    sei_buffer: &[u8],
    output: &mut dyn ExtractorOutput,
    track_ids: &[u32],
) {
    let mut pos = 0;
    // The last byte holds the rbsp trailing bits.
    while sei_buffer.len().saturating_sub(pos) > 1 {
        let payload_type = read_non_255_terminated_value(sei_buffer, &mut pos);
        let payload_size = read_non_255_terminated_value(sei_buffer, &mut pos);

        let (Some(payload_type), Some(payload_size)) = (payload_type, payload_size) else {
            log::warn!("Skipping remainder of malformed SEI NAL unit.");
            return;
        };
        let payload_size = payload_size as usize;
        if payload_size > sei_buffer.len() - pos {
            // Encrypted SEI NAL units end up here.
            log::warn!("Skipping remainder of malformed SEI NAL unit.");
            return;
        }

        let payload = &sei_buffer[pos..pos + payload_size];
        if payload_type == PAYLOAD_TYPE_CC && payload_size >= 8 {
            if let Some(cc_data) = caption_cc_data(payload) {
                write_cc_data(presentation_time_us, cc_data, output, track_ids);
            }
        }
        pos += payload_size;
    }
}

/// Returns the cc_data of a user_data_registered_itu_t_t35 payload that
/// carries ATSC A/53 or DirecTV captions.
fn caption_cc_data(payload: &[u8]) -> Option<&[u8]> {
    let country_code = payload[0];
    let provider_code = u16::from_be_bytes([payload[1], payload[2]]);
    let mut pos = 3;

    let mut user_identifier = 0;
    if provider_code == PROVIDER_CODE_ATSC {
        user_identifier = u32::from_be_bytes(payload.get(pos..pos + 4)?.try_into().ok()?);
        pos += 4;
    }
    let user_data_type_code = *payload.get(pos)?;
    pos += 1;
    if provider_code == PROVIDER_CODE_DIRECTV {
        // user_data_length
        pos += 1;
    }

    let supported = country_code == COUNTRY_CODE
        && user_data_type_code == USER_DATA_TYPE_CODE_MPEG_CC
        && match provider_code {
            PROVIDER_CODE_ATSC => user_identifier == USER_DATA_IDENTIFIER_GA94,
            PROVIDER_CODE_DIRECTV => true,
            _ => false,
        };
    if !supported {
        return None;
    }
    payload.get(pos..)
}

fn write_cc_data(
    presentation_time_us: Option<i64>,
    cc_data: &[u8],
    output: &mut dyn ExtractorOutput,
    track_ids: &[u32],
) {
    let Some(&first_byte) = cc_data.first() else {
        return;
    };
    let process_cc_data = first_byte & 0x40 != 0;
    if !process_cc_data {
        return;
    }

    let cc_count = (first_byte & 0x1F) as usize;
    // Skip em_data.
    let start = 2;
    let sample_length = cc_count * 3;
    let Some(sample) = cc_data.get(start..start + sample_length) else {
        log::warn!("Truncated cc_data: {cc_count} constructs announced");
        return;
    };

    for &track_id in track_ids {
        let track = output.track(track_id, TrackType::Text);
        track.sample_bytes(sample);
        if let Some(time_us) = presentation_time_us {
            track.sample_metadata(time_us, SampleFlags::KEY_FRAME, sample_length, 0, None);
        }
    }
}
