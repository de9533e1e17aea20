//! LDM record unpacking.

use std::io::Read;

use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use tracing::debug;

use crate::be_i32;
use crate::error::{NexradError, NexradResult};
use crate::header::VOLUME_HEADER_LEN;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const BZIP2_MAGIC: &[u8; 3] = b"BZh";

/// Undo whole-file gzip applied by some mirrors.
pub(crate) fn maybe_gunzip(data: &[u8]) -> NexradResult<Option<Vec<u8>>> {
    if !data.starts_with(&GZIP_MAGIC) {
        return Ok(None);
    }
    let mut out = Vec::new();
    GzDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| NexradError::Decompression(format!("gzip: {}", e)))?;
    Ok(Some(out))
}

/// Concatenate the message stream following the volume header.
///
/// Compressed archives are a sequence of `i32` control words each followed
/// by that many bytes of bzip2 data (a negative word marks the final record).
/// Older uncompressed archives carry the messages directly.
pub(crate) fn message_stream(data: &[u8]) -> NexradResult<Vec<u8>> {
    let body = data.get(VOLUME_HEADER_LEN..).unwrap_or_default();
    if body.get(4..7) != Some(&BZIP2_MAGIC[..]) {
        return Ok(body.to_vec());
    }

    let mut out = Vec::new();
    let mut offset = 0usize;
    let mut records = 0usize;

    while offset + 4 <= body.len() {
        let control = be_i32(body, offset)?;
        let size = control.unsigned_abs() as usize;
        if size == 0 {
            break;
        }

        let start = offset + 4;
        let block = body.get(start..start + size).ok_or(NexradError::Truncated {
            offset: VOLUME_HEADER_LEN + start,
            needed: size,
        })?;

        if block.starts_with(BZIP2_MAGIC) {
            BzDecoder::new(block)
                .read_to_end(&mut out)
                .map_err(|e| NexradError::Decompression(format!("record {}: {}", records, e)))?;
        } else {
            out.extend_from_slice(block);
        }

        records += 1;
        offset = start + size;
        if control < 0 {
            break;
        }
    }

    debug!(records, bytes = out.len(), "Unpacked LDM records");
    Ok(out)
}
