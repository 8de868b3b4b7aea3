//! Little-endian PCM packing and unpacking
//!
//! 8-bit PCM is unsigned (offset 128), wider depths are signed two's complement.

/// Average interleaved frames down to a single channel
pub fn downmix_i16(samples: &[i16], channels: u16) -> Vec<i16> {
    if channels <= 1 {
        return samples.to_vec();
    }

    samples
        .chunks(channels as usize)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / frame.len() as i32) as i16
        })
        .collect()
}

/// Average interleaved float frames down to a single channel
pub fn downmix_f32(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }

    samples
        .chunks(channels as usize)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Append one 16-bit sample, rescaled to `bits`
pub fn push_i16(out: &mut Vec<u8>, sample: i16, bits: u8) {
    match bits {
        8 => out.push(((sample >> 8) as i32 + 128) as u8),
        16 => out.extend_from_slice(&sample.to_le_bytes()),
        24 => out.extend_from_slice(&((sample as i32) << 8).to_le_bytes()[..3]),
        _ => out.extend_from_slice(&((sample as i32) << 16).to_le_bytes()),
    }
}

/// Append one float sample in `[-1.0, 1.0]`, rescaled to `bits`
pub fn push_f32(out: &mut Vec<u8>, sample: f32, bits: u8) {
    let s = sample.clamp(-1.0, 1.0);
    match bits {
        8 => out.push(((s * i8::MAX as f32) as i32 + 128) as u8),
        16 => out.extend_from_slice(&((s * i16::MAX as f32) as i16).to_le_bytes()),
        24 => out.extend_from_slice(&((s * 8_388_607.0) as i32).to_le_bytes()[..3]),
        _ => out.extend_from_slice(&((s as f64 * i32::MAX as f64) as i32).to_le_bytes()),
    }
}

/// Unpack PCM bytes into signed samples. A trailing partial sample is ignored.
pub fn unpack(bytes: &[u8], bits: u8) -> Vec<i32> {
    match bits {
        8 => bytes.iter().map(|&b| b as i32 - 128).collect(),
        16 => bytes
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]) as i32)
            .collect(),
        24 => bytes
            .chunks_exact(3)
            // place in the top three bytes, then shift back to sign-extend
            .map(|b| i32::from_le_bytes([0, b[0], b[1], b[2]]) >> 8)
            .collect(),
        _ => bytes
            .chunks_exact(4)
            .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
    }
}
