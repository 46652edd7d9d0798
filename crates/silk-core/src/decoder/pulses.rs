//! Shell decoding of the excitation pulses

use crate::range::{EntropyDecoder, RangeDecoder};
use crate::tables::pulses::*;
use crate::types::{
    QuantizationOffsetType, SignalType, LOG2_SHELL_CODEC_FRAME_LENGTH, MAX_PULSES, N_RATE_LEVELS,
    SHELL_CODEC_FRAME_LENGTH,
};

/// Number of 16-sample shell blocks covering `frame_length` samples
pub(crate) fn shell_blocks(frame_length: usize) -> usize {
    let mut iter = frame_length >> LOG2_SHELL_CODEC_FRAME_LENGTH;
    if iter * SHELL_CODEC_FRAME_LENGTH < frame_length {
        // 10 ms at 12 kHz is not a multiple of 16; the last block is coded
        // in full and the tail samples discarded
        iter += 1;
    }
    iter
}

fn decode_split(
    range_dec: &mut RangeDecoder<'_>,
    p: i16,
    table: &'static [u8; 152],
) -> (i16, i16) {
    if p > 0 {
        let off = SHELL_CODE_TABLE_OFFSETS[p as usize];
        let child1 = range_dec.decode_icdf(&table[off..off + p as usize + 1], 8) as i16;
        (child1, p - child1)
    } else {
        (0, 0)
    }
}

/// Hierarchically decode the pulse magnitudes of one 16-sample block
fn shell_decoder(range_dec: &mut RangeDecoder<'_>, pulses0: &mut [i16], total: i16) {
    let mut pulses3 = [0i16; 2];
    let mut pulses2 = [0i16; 4];
    let mut pulses1 = [0i16; 8];

    (pulses3[0], pulses3[1]) = decode_split(range_dec, total, &SHELL_CODE_TABLE3);
    for i in 0..2 {
        (pulses2[2 * i], pulses2[2 * i + 1]) = decode_split(range_dec, pulses3[i], &SHELL_CODE_TABLE2);
        for j in 0..2 {
            let idx = 2 * (2 * i + j);
            (pulses1[idx], pulses1[idx + 1]) =
                decode_split(range_dec, pulses2[2 * i + j], &SHELL_CODE_TABLE1);
            for k in 0..2 {
                let leaf = 2 * (idx + k);
                (pulses0[leaf], pulses0[leaf + 1]) =
                    decode_split(range_dec, pulses1[idx + k], &SHELL_CODE_TABLE0);
            }
        }
    }
}

/// Decode the excitation of one frame into signed pulses
pub(crate) fn decode_pulses(
    range_dec: &mut RangeDecoder<'_>,
    pulses: &mut [i16],
    signal_type: SignalType,
    quant_offset_type: QuantizationOffsetType,
) {
    let frame_length = pulses.len();
    let rate_level = range_dec.decode_icdf(
        &RATE_LEVELS_ICDF[signal_type.index() >> 1],
        8,
    );

    // Sum of pulses per block, with the overflow marker escalating to LSB
    // shifts
    let iter = shell_blocks(frame_length);
    let mut sum_pulses = [0i32; 30];
    let mut n_lshifts = [0i32; 30];
    for i in 0..iter {
        n_lshifts[i] = 0;
        sum_pulses[i] = range_dec.decode_icdf(&PULSES_PER_BLOCK_ICDF[rate_level], 8) as i32;
        while sum_pulses[i] == MAX_PULSES as i32 + 1 && n_lshifts[i] < 15 {
            n_lshifts[i] += 1;
            let force_lsb = (n_lshifts[i] == 10) as i32;
            sum_pulses[i] = range_dec
                .decode_icdf(&PULSES_PER_BLOCK_ICDF[N_RATE_LEVELS - 1], 8) as i32
                + force_lsb;
        }
        // A corrupt stream can leave the marker value in place; clamping
        // keeps the shell decoder inside its tables, and the payload-size
        // check at the end of the frame reports the damage
        sum_pulses[i] = sum_pulses[i].min(MAX_PULSES as i32);
    }

    // Shell decode the magnitudes into a block-padded buffer; a partial
    // last block is parsed in full and its tail discarded
    let mut padded = [0i16; 30 * SHELL_CODEC_FRAME_LENGTH];
    for i in 0..iter {
        let start = i * SHELL_CODEC_FRAME_LENGTH;
        if sum_pulses[i] > 0 {
            shell_decoder(
                range_dec,
                &mut padded[start..start + SHELL_CODEC_FRAME_LENGTH],
                sum_pulses[i] as i16,
            );
        }
    }

    // LSBs, MSB-first, for blocks that overflowed
    for i in 0..iter {
        if n_lshifts[i] > 0 {
            let start = i * SHELL_CODEC_FRAME_LENGTH;
            for k in 0..SHELL_CODEC_FRAME_LENGTH {
                let mut abs_q = padded[start + k] as i32;
                for _ in 0..n_lshifts[i] {
                    abs_q <<= 1;
                    abs_q += range_dec.decode_icdf(&LSB_ICDF, 8) as i32;
                }
                padded[start + k] = abs_q as i16;
            }
            sum_pulses[i] |= n_lshifts[i] << 5;
        }
    }

    decode_signs(
        range_dec,
        &mut padded[..iter * SHELL_CODEC_FRAME_LENGTH],
        signal_type,
        quant_offset_type,
        &sum_pulses[..iter],
    );
    pulses.copy_from_slice(&padded[..frame_length]);
}

/// Decode the sign of every non-zero pulse
fn decode_signs(
    range_dec: &mut RangeDecoder<'_>,
    pulses: &mut [i16],
    signal_type: SignalType,
    quant_offset_type: QuantizationOffsetType,
    sum_pulses: &[i32],
) {
    let base = 7 * (quant_offset_type.index() + (signal_type.index() << 1));
    let mut icdf = [0u8; 2];
    for (i, &p) in sum_pulses.iter().enumerate() {
        if p <= 0 {
            continue;
        }
        icdf[0] = SIGN_ICDF[base + (p as usize & 0x1f).min(6)];
        let start = i * SHELL_CODEC_FRAME_LENGTH;
        for q in &mut pulses[start..start + SHELL_CODEC_FRAME_LENGTH] {
            if *q > 0 && range_dec.decode_icdf(&icdf, 8) == 0 {
                *q = -*q;
            }
        }
    }
}
