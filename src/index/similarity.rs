/// TF-IDF / vector-space similarity. Field-length norms are stored as one
/// byte per doc using a 3-bit-mantissa float encoding; the decoder table
/// is precomputed.
pub struct Similarity {
    norm_decoder: [f32; 256],
}

impl Default for Similarity {
    fn default() -> Self {
        Similarity::new()
    }
}

impl Similarity {
    pub fn new() -> Self {
        let mut norm_decoder = [0.0f32; 256];
        for (byte, slot) in norm_decoder.iter_mut().enumerate() {
            *slot = byte315_to_float(byte as u8);
        }
        Similarity { norm_decoder }
    }

    /// `log((doc_max + 1) / (doc_freq + 1)) + 1`
    pub fn idf(&self, doc_freq: u64, doc_max: u64) -> f32 {
        ((doc_max as f64 + 1.0) / (doc_freq as f64 + 1.0)).ln() as f32 + 1.0
    }

    pub fn tf(&self, freq: f32) -> f32 {
        freq.sqrt()
    }

    pub fn length_norm(&self, num_tokens: u32) -> f32 {
        if num_tokens == 0 {
            0.0
        } else {
            1.0 / (num_tokens as f32).sqrt()
        }
    }

    /// Reciprocal square root of the sum of squared weights, making scores
    /// comparable across queries.
    pub fn query_norm(&self, sum_of_squared_weights: f32) -> f32 {
        if sum_of_squared_weights <= 0.0 {
            1.0
        } else {
            1.0 / sum_of_squared_weights.sqrt()
        }
    }

    pub fn coord(&self, overlap: u32, max_overlap: u32) -> f32 {
        if max_overlap == 0 {
            1.0
        } else {
            overlap as f32 / max_overlap as f32
        }
    }

    pub fn encode_norm(&self, value: f32) -> u8 {
        float_to_byte315(value)
    }

    pub fn decode_norm(&self, byte: u8) -> f32 {
        self.norm_decoder[byte as usize]
    }
}

// Float compression with 3 mantissa bits and a zero exponent of 15,
// covering the [0, ~7.5e9] range with ~10% relative error.
fn float_to_byte315(value: f32) -> u8 {
    let bits = value.to_bits() as i32;
    let small = bits >> (24 - 3);
    if small <= ((63 - 15) << 3) {
        return if bits <= 0 { 0 } else { 1 };
    }
    if small >= ((63 - 15) << 3) + 0x100 {
        return 255;
    }
    (small - ((63 - 15) << 3)) as u8
}

fn byte315_to_float(byte: u8) -> f32 {
    if byte == 0 {
        return 0.0;
    }
    let mut bits = (byte as u32) << (24 - 3);
    bits += (63 - 15) << 24;
    f32::from_bits(bits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idf_matches_formula() {
        let sim = Similarity::new();
        let expected = ((5.0f64) / (2.0f64)).ln() as f32 + 1.0;
        assert!((sim.idf(1, 4) - expected).abs() < 1e-6);
        // A term in every doc still gets a positive weight.
        assert!(sim.idf(100, 100) > 0.9);
    }

    #[test]
    fn norm_bytes_round_trip_monotonically() {
        let sim = Similarity::new();
        let mut last = -1.0f32;
        for num_tokens in [1u32, 2, 4, 9, 100, 10_000] {
            let norm = sim.length_norm(num_tokens);
            let decoded = sim.decode_norm(sim.encode_norm(norm));
            assert!(decoded <= last.max(norm) || last < 0.0);
            assert!(decoded >= 0.0);
            assert!((decoded - norm).abs() / norm < 0.25, "{} vs {}", decoded, norm);
            last = decoded;
        }
        assert_eq!(sim.decode_norm(sim.encode_norm(0.0)), 0.0);
    }

    #[test]
    fn query_norm_handles_zero() {
        let sim = Similarity::new();
        assert_eq!(sim.query_norm(0.0), 1.0);
        assert!((sim.query_norm(4.0) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn coord_scales_by_overlap() {
        let sim = Similarity::new();
        assert_eq!(sim.coord(1, 2), 0.5);
        assert_eq!(sim.coord(0, 0), 1.0);
    }
}
