use base64::Engine;

/// Sample rate the live provider expects for inbound microphone audio.
pub const INPUT_PCM16_SAMPLE_RATE: u32 = 16_000;
/// Sample rate of the speech the live provider streams back.
pub const OUTPUT_PCM16_SAMPLE_RATE: u32 = 24_000;

/// MIME type attached to inbound realtime audio.
pub fn input_mime_type() -> String {
    format!("audio/pcm;rate={INPUT_PCM16_SAMPLE_RATE}")
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PcmError {
    #[error("audio payload is empty")]
    Empty,
    #[error("audio payload has odd byte length {0}")]
    OddLength(usize),
    #[error("audio payload is not valid base64")]
    Base64,
}

/// Decodes little-endian PCM16 bytes into f32 samples in [-1.0, 1.0].
pub fn pcm16_to_f32(bytes: &[u8]) -> Result<Vec<f32>, PcmError> {
    if bytes.is_empty() {
        return Err(PcmError::Empty);
    }
    if bytes.len() % 2 != 0 {
        return Err(PcmError::OddLength(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|chunk| {
            let v = i16::from_le_bytes([chunk[0], chunk[1]]);
            (v as f32 / 32768.0).clamp(-1.0, 1.0)
        })
        .collect())
}

/// Decodes a base64 fragment into its raw bytes.
pub fn decode_base64(fragment: &str) -> Result<Vec<u8>, PcmError> {
    base64::engine::general_purpose::STANDARD
        .decode(fragment)
        .map_err(|_| PcmError::Base64)
}

/// Converts a slice of f32 samples to a vector of i16 samples.
pub fn convert_f32_to_i16(pcm32: &[f32]) -> Vec<i16> {
    pcm32
        .iter()
        .map(|&sample| (sample * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as i16)
        .collect()
}

/// Averages interleaved frames down to a single channel.
pub fn downmix_to_mono(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks(channels)
        .map(|c| c.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// A trait for converting audio sample types to a binary representation (Vec<u8>).
pub trait ToBinary {
    fn to_binary(&self) -> Vec<u8>;
}

impl ToBinary for [i16] {
    fn to_binary(&self) -> Vec<u8> {
        self.iter()
            .flat_map(|&sample| sample.to_le_bytes())
            .collect()
    }
}

impl ToBinary for [f32] {
    fn to_binary(&self) -> Vec<u8> {
        self.iter()
            .flat_map(|&sample| {
                let v = (sample * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
                v.to_le_bytes()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcm16_to_f32_rejects_odd_payloads() {
        assert_eq!(pcm16_to_f32(&[1, 2, 3]), Err(PcmError::OddLength(3)));
        assert_eq!(pcm16_to_f32(&[]), Err(PcmError::Empty));
    }

    #[test]
    fn test_pcm16_to_f32_scales_samples() {
        let bytes = [i16::MIN, 0, 16384].to_binary();
        let samples = pcm16_to_f32(&bytes).unwrap();
        assert_eq!(samples, vec![-1.0, 0.0, 0.5]);
    }

    #[test]
    fn test_decode_base64_rejects_garbage() {
        assert_eq!(decode_base64("AAE=").unwrap(), vec![0, 1]);
        assert_eq!(decode_base64("%%%"), Err(PcmError::Base64));
    }

    #[test]
    fn test_downmix_averages_channels() {
        assert_eq!(downmix_to_mono(&[1.0, 0.0, 0.5, 0.5], 2), vec![0.5, 0.5]);
    }
}
