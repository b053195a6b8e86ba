// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! LZMA compression of opcode blocks. */

use {
    crate::serialization::LZMA_HEADER_LENGTH,
    anyhow::{anyhow, Context, Result},
    std::io::{Read, Write},
    xz2::stream::{LzmaOptions, Stream},
};

/// Offset of the uncompressed size field in an LZMA-alone header.
const SIZE_FIELD_OFFSET: usize = 5;

/// Default compression preset.
pub const DEFAULT_LZMA_PRESET: u32 = 6;

/// Compress data into an LZMA-alone stream.
///
/// liblzma always emits an unknown uncompressed size plus an end of payload
/// marker. The executor sizes its output buffer from the header, so the real
/// size is patched into the header after encoding.
pub fn compress_lzma(data: &[u8], preset: u32) -> Result<Vec<u8>> {
    let options = LzmaOptions::new_preset(preset)
        .with_context(|| format!("resolving LZMA preset {}", preset))?;
    let stream = Stream::new_lzma_encoder(&options).context("initializing LZMA encoder")?;

    let mut encoder = xz2::write::XzEncoder::new_stream(Vec::new(), stream);
    encoder.write_all(data).context("compressing opcode block")?;
    let mut compressed = encoder.finish().context("finishing LZMA stream")?;

    if compressed.len() < LZMA_HEADER_LENGTH {
        return Err(anyhow!("LZMA encoder produced a truncated header"));
    }

    compressed[SIZE_FIELD_OFFSET..LZMA_HEADER_LENGTH]
        .copy_from_slice(&(data.len() as u64).to_le_bytes());

    Ok(compressed)
}

/// Read the uncompressed size advertised by an LZMA-alone header.
pub fn lzma_uncompressed_size(data: &[u8]) -> Result<Option<u64>> {
    if data.len() < LZMA_HEADER_LENGTH {
        return Err(anyhow!("LZMA stream shorter than its header"));
    }

    let mut size = [0u8; 8];
    size.copy_from_slice(&data[SIZE_FIELD_OFFSET..LZMA_HEADER_LENGTH]);

    Ok(match u64::from_le_bytes(size) {
        u64::MAX => None,
        size => Some(size),
    })
}

fn decode(data: &[u8]) -> Result<Vec<u8>> {
    let stream = Stream::new_lzma_decoder(u64::MAX).context("initializing LZMA decoder")?;
    let mut decoder = xz2::read::XzDecoder::new_stream(data, stream);
    let mut res = Vec::new();
    decoder.read_to_end(&mut res)?;

    Ok(res)
}

/// Decompress an LZMA-alone stream.
///
/// Streams produced by [compress_lzma] carry both a known size and an end
/// marker, a combination older liblzma releases reject. Those are decoded
/// as unknown-size streams first. Streams without an end marker are decoded
/// with the header as written.
pub fn decompress_lzma(data: &[u8]) -> Result<Vec<u8>> {
    let expected = lzma_uncompressed_size(data)?;

    let mut unsized_stream = data.to_vec();
    unsized_stream[SIZE_FIELD_OFFSET..LZMA_HEADER_LENGTH].copy_from_slice(&[0xff; 8]);

    let res = match decode(&unsized_stream) {
        Ok(res) => res,
        Err(_) => decode(data).context("decompressing LZMA stream")?,
    };

    if let Some(expected) = expected {
        if res.len() as u64 != expected {
            return Err(anyhow!(
                "LZMA stream advertised {} bytes but produced {}",
                expected,
                res.len()
            ));
        }
    }

    Ok(res)
}
