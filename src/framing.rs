use crate::errors::{PipelineError, Result};
use std::io::{ErrorKind, Read, Write};

pub const PREFIX_LEN: usize = 4;

/// Writes one `[u32 big-endian length][payload]` record. There is no trailer;
/// closing the channel after the last record ends the transfer.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> Result<()> {
    let len = u32::try_from(payload.len()).map_err(|_| PipelineError::Transfer {
        message: format!("payload of {} bytes exceeds the 4-byte length prefix", payload.len()),
    })?;

    writer
        .write_all(&len.to_be_bytes())
        .and_then(|_| writer.write_all(payload))
        .and_then(|_| writer.flush())
        .map_err(|e| PipelineError::Transfer {
            message: format!("writing record of {} bytes: {}", payload.len(), e),
        })
}

pub fn read_frame<R: Read>(reader: &mut R) -> Result<Vec<u8>> {
    let mut prefix = [0u8; PREFIX_LEN];
    read_exactly(reader, &mut prefix)?;
    let len = u32::from_be_bytes(prefix) as usize;

    // Allocation follows the bytes that arrive, not the prefix
    let mut payload = Vec::new();
    let received = reader
        .take(len as u64)
        .read_to_end(&mut payload)
        .map_err(|e| PipelineError::Transfer {
            message: format!("reading from channel: {}", e),
        })?;
    if received < len {
        return Err(PipelineError::PrematureEof {
            expected: len,
            received,
        });
    }
    Ok(payload)
}

/// Fills `buf` completely, blocking until the bytes arrive; EOF first is a premature close.
fn read_exactly<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    let mut received = 0;
    while received < buf.len() {
        match reader.read(&mut buf[received..]) {
            Ok(0) => {
                return Err(PipelineError::PrematureEof {
                    expected: buf.len(),
                    received,
                })
            }
            Ok(n) => received += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(PipelineError::Transfer {
                    message: format!("reading from channel: {}", e),
                })
            }
        }
    }
    Ok(())
}
