//! Shell encoding of the excitation pulses (mirror of the decoder)

use crate::decoder::shell_blocks;
use crate::math::lin2log;
use crate::range::{EntropyEncoder, RangeEncoder};
use crate::tables::pulses::*;
use crate::types::{
    QuantizationOffsetType, SignalType, MAX_PULSES, N_RATE_LEVELS, SHELL_CODEC_FRAME_LENGTH,
};

/// Pulse-count caps at each combine level of the shell tree
static MAX_PULSES_TABLE: [i32; 4] = [8, 10, 12, 16];

/// Approximate cost in Q5 bits of coding `symbol` with an 8-bit ICDF
fn icdf_bits_q5(icdf: &[u8], symbol: usize) -> i32 {
    let hi = if symbol == 0 { 256 } else { icdf[symbol - 1] as i32 };
    let prob = (hi - icdf[symbol] as i32).max(1);
    ((8 << 7) - lin2log(prob)) >> 2
}

fn combine_and_check(out: &mut [i32], input: &[i32], max_pulses: i32, len: usize) -> bool {
    let mut any_over = false;
    for k in 0..len {
        let sum = input[2 * k] + input[2 * k + 1];
        if sum > max_pulses {
            any_over = true;
        }
        out[k] = sum;
    }
    any_over
}

fn encode_split(range_enc: &mut RangeEncoder, child1: i32, p: i32, table: &'static [u8; 152]) {
    if p > 0 {
        let off = SHELL_CODE_TABLE_OFFSETS[p as usize];
        range_enc.encode_icdf(child1 as usize, &table[off..off + p as usize + 1], 8);
    }
}

/// Hierarchically encode the pulse magnitudes of one 16-sample block
fn shell_encoder(range_enc: &mut RangeEncoder, pulses0: &[i32]) {
    let mut pulses1 = [0i32; 8];
    let mut pulses2 = [0i32; 4];
    let mut pulses3 = [0i32; 2];
    let mut pulses4 = [0i32; 1];
    combine_and_check(&mut pulses1, pulses0, i32::MAX, 8);
    combine_and_check(&mut pulses2, &pulses1, i32::MAX, 4);
    combine_and_check(&mut pulses3, &pulses2, i32::MAX, 2);
    combine_and_check(&mut pulses4, &pulses3, i32::MAX, 1);

    encode_split(range_enc, pulses3[0], pulses4[0], &SHELL_CODE_TABLE3);
    for i in 0..2 {
        encode_split(range_enc, pulses2[2 * i], pulses3[i], &SHELL_CODE_TABLE2);
        for j in 0..2 {
            let idx = 2 * (2 * i + j);
            encode_split(range_enc, pulses1[idx], pulses2[2 * i + j], &SHELL_CODE_TABLE1);
            for k in 0..2 {
                let leaf = 2 * (idx + k);
                encode_split(range_enc, pulses0[leaf], pulses1[idx + k], &SHELL_CODE_TABLE0);
            }
        }
    }
}

/// Encode the excitation of one frame: rate level, per-block sums with
/// overflow markers, shell splits, shifted-out LSBs and signs
pub(crate) fn encode_pulses(
    range_enc: &mut RangeEncoder,
    signal_type: SignalType,
    quant_offset_type: QuantizationOffsetType,
    pulses: &mut [i8],
) {
    let frame_length = pulses.len();
    let iter = shell_blocks(frame_length);

    // Pad a partial last block with zeros
    let mut abs_pulses = [0i32; 30 * SHELL_CODEC_FRAME_LENGTH];
    for (i, &p) in pulses.iter().enumerate() {
        abs_pulses[i] = (p as i32).abs();
    }

    // Per block: shift magnitudes down until every level of the combine
    // tree fits its cap
    let mut sum_pulses = [0i32; 30];
    let mut n_rshifts = [0i32; 30];
    for i in 0..iter {
        let block = i * SHELL_CODEC_FRAME_LENGTH;
        n_rshifts[i] = 0;
        loop {
            let mut comb8 = [0i32; 8];
            let mut comb4 = [0i32; 4];
            let mut comb2 = [0i32; 2];
            let mut comb1 = [0i32; 1];
            let mut scale_down = combine_and_check(
                &mut comb8,
                &abs_pulses[block..block + SHELL_CODEC_FRAME_LENGTH],
                MAX_PULSES_TABLE[0],
                8,
            );
            scale_down |= combine_and_check(&mut comb4, &comb8, MAX_PULSES_TABLE[1], 4);
            scale_down |= combine_and_check(&mut comb2, &comb4, MAX_PULSES_TABLE[2], 2);
            scale_down |= combine_and_check(&mut comb1, &comb2, MAX_PULSES_TABLE[3], 1);
            if scale_down {
                n_rshifts[i] += 1;
                for a in &mut abs_pulses[block..block + SHELL_CODEC_FRAME_LENGTH] {
                    *a >>= 1;
                }
            } else {
                sum_pulses[i] = comb1[0];
                break;
            }
        }
    }

    // Pick the rate level with the smallest estimated total cost
    let type_band = signal_type.index() >> 1;
    let mut rate_level = 0usize;
    let mut min_bits_q5 = i32::MAX;
    for k in 0..N_RATE_LEVELS - 1 {
        let mut bits_q5 = icdf_bits_q5(&RATE_LEVELS_ICDF[type_band], k);
        for i in 0..iter {
            if n_rshifts[i] > 0 {
                bits_q5 += icdf_bits_q5(&PULSES_PER_BLOCK_ICDF[k], MAX_PULSES + 1);
            } else {
                bits_q5 += icdf_bits_q5(&PULSES_PER_BLOCK_ICDF[k], sum_pulses[i] as usize);
            }
        }
        if bits_q5 < min_bits_q5 {
            min_bits_q5 = bits_q5;
            rate_level = k;
        }
    }
    range_enc.encode_icdf(rate_level, &RATE_LEVELS_ICDF[type_band], 8);

    // Per-block sums with the marker chain for shifted blocks
    for i in 0..iter {
        if n_rshifts[i] == 0 {
            range_enc.encode_icdf(sum_pulses[i] as usize, &PULSES_PER_BLOCK_ICDF[rate_level], 8);
        } else {
            range_enc.encode_icdf(MAX_PULSES + 1, &PULSES_PER_BLOCK_ICDF[rate_level], 8);
            for _ in 0..n_rshifts[i] - 1 {
                range_enc.encode_icdf(MAX_PULSES + 1, &PULSES_PER_BLOCK_ICDF[N_RATE_LEVELS - 1], 8);
            }
            let force_lsb = (n_rshifts[i] == 10) as i32;
            range_enc.encode_icdf(
                (sum_pulses[i] - force_lsb) as usize,
                &PULSES_PER_BLOCK_ICDF[N_RATE_LEVELS - 1],
                8,
            );
        }
    }

    // Shell splits
    for i in 0..iter {
        if sum_pulses[i] > 0 {
            shell_encoder(
                range_enc,
                &abs_pulses[i * SHELL_CODEC_FRAME_LENGTH..(i + 1) * SHELL_CODEC_FRAME_LENGTH],
            );
        }
    }

    // Shifted-out LSBs, MSB first
    for i in 0..iter {
        if n_rshifts[i] > 0 {
            let block = i * SHELL_CODEC_FRAME_LENGTH;
            for k in 0..SHELL_CODEC_FRAME_LENGTH {
                let abs_q = if block + k < frame_length {
                    (pulses[block + k] as i32).abs()
                } else {
                    0
                };
                for j in (0..n_rshifts[i]).rev() {
                    let bit = (abs_q >> j) & 1;
                    range_enc.encode_icdf(bit as usize, &LSB_ICDF, 8);
                }
            }
        }
    }

    // Signs of non-zero pulses
    let base = 7 * (quant_offset_type.index() + (signal_type.index() << 1));
    let mut icdf = [0u8; 2];
    for i in 0..iter {
        let p_eff = sum_pulses[i] | (n_rshifts[i] << 5);
        if p_eff <= 0 {
            continue;
        }
        icdf[0] = SIGN_ICDF[base + (sum_pulses[i] as usize & 0x1f).min(6)];
        let block = i * SHELL_CODEC_FRAME_LENGTH;
        for k in 0..SHELL_CODEC_FRAME_LENGTH {
            if block + k < frame_length && pulses[block + k] != 0 {
                let sym = if pulses[block + k] < 0 { 0 } else { 1 };
                range_enc.encode_icdf(sym, &icdf, 8);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::decode_pulses;
    use crate::range::{EntropyDecoder, RangeDecoder};

    fn round_trip(pulses: &[i8], signal_type: SignalType) {
        let mut enc = RangeEncoder::new();
        let mut buf = pulses.to_vec();
        encode_pulses(
            &mut enc,
            signal_type,
            QuantizationOffsetType::Low,
            &mut buf,
        );
        let enc_range = enc.range();
        let data = enc.finish();

        let mut dec = RangeDecoder::new(&data);
        let mut decoded = vec![0i16; pulses.len()];
        decode_pulses(
            &mut dec,
            &mut decoded,
            signal_type,
            QuantizationOffsetType::Low,
        );
        for (a, b) in pulses.iter().zip(decoded.iter()) {
            assert_eq!(*a as i16, *b);
        }
        assert_eq!(dec.range(), enc_range);
    }

    #[test]
    fn test_pulse_round_trip_sparse() {
        let mut pulses = vec![0i8; 320];
        pulses[3] = 2;
        pulses[17] = -1;
        pulses[100] = 5;
        pulses[101] = -4;
        pulses[319] = 1;
        round_trip(&pulses, SignalType::Unvoiced);
    }

    #[test]
    fn test_pulse_round_trip_zero() {
        let pulses = vec![0i8; 160];
        round_trip(&pulses, SignalType::Inactive);
    }

    #[test]
    fn test_pulse_round_trip_dense_with_shifts() {
        // Magnitudes large enough to force LSB shifting
        let mut pulses = vec![0i8; 160];
        for (i, p) in pulses.iter_mut().enumerate() {
            *p = match i % 4 {
                0 => 9,
                1 => -7,
                2 => 3,
                _ => -2,
            };
        }
        round_trip(&pulses, SignalType::Voiced);
    }

    #[test]
    fn test_pulse_round_trip_partial_block() {
        // 10 ms at 12 kHz: 120 samples, not a multiple of 16
        let mut pulses = vec![0i8; 120];
        pulses[119] = -3;
        pulses[60] = 2;
        round_trip(&pulses, SignalType::Unvoiced);
    }
}
