//! Side-information index decoding

use crate::range::{EntropyDecoder, RangeDecoder};
use crate::tables::frame::{
    TYPE_OFFSET_NO_VAD_ICDF, TYPE_OFFSET_VAD_ICDF, UNIFORM4_ICDF, UNIFORM8_ICDF,
};
use crate::tables::gain::{DELTA_GAIN_ICDF, GAIN_ICDF};
use crate::tables::ltp::{ltp_gain_icdf, LTP_PER_INDEX_ICDF, LTP_SCALE_ICDF};
use crate::tables::nlsf::{
    codebook_for_order, NLSF_EXT_ICDF, NLSF_INTERPOLATION_FACTOR_ICDF,
};
use crate::tables::pitch::{contour_tables, lag_fine_icdf, PITCH_DELTA_ICDF, PITCH_LAG_ICDF};
use crate::types::{
    ConditionalCoding, QuantizationOffsetType, SignalType, MAX_NB_SUBFR,
    NLSF_QUANT_MAX_AMPLITUDE,
};

use super::ChannelDecoder;

/// Decode all side-information indices of one frame into
/// `state.indices`
pub(crate) fn decode_indices(
    state: &mut ChannelDecoder,
    range_dec: &mut RangeDecoder<'_>,
    frame_index: usize,
    decode_lbrr: bool,
    cond_coding: ConditionalCoding,
) {
    // Signal type and quantizer offset
    let type_sym = if decode_lbrr || state.vad_flags[frame_index] {
        range_dec.decode_icdf(&TYPE_OFFSET_VAD_ICDF, 8) + 2
    } else {
        range_dec.decode_icdf(&TYPE_OFFSET_NO_VAD_ICDF, 8)
    };
    state.indices.signal_type = SignalType::from_index(type_sym >> 1);
    state.indices.quant_offset_type = QuantizationOffsetType::from_index(type_sym & 1);

    // Gains: first subframe absolute (MSB + LSB) or delta, remainder delta
    if cond_coding == ConditionalCoding::Conditionally {
        state.indices.gains_indices[0] = range_dec.decode_icdf(&DELTA_GAIN_ICDF, 8) as i8;
    } else {
        let msb = range_dec.decode_icdf(&GAIN_ICDF[state.indices.signal_type.index()], 8) as i8;
        let lsb = range_dec.decode_icdf(&UNIFORM8_ICDF, 8) as i8;
        state.indices.gains_indices[0] = (msb << 3) + lsb;
    }
    for i in 1..state.nb_subfr {
        state.indices.gains_indices[i] = range_dec.decode_icdf(&DELTA_GAIN_ICDF, 8) as i8;
    }

    // NLSF stage-1 index and stage-2 residuals
    let cb = codebook_for_order(state.lpc_order);
    let type_band = state.indices.signal_type.index() >> 1;
    let stage1 = range_dec.decode_icdf(
        &cb.cb1_icdf[type_band * cb.n_vectors..(type_band + 1) * cb.n_vectors],
        8,
    );
    state.indices.nlsf_indices[0] = stage1 as i8;
    for i in 0..cb.order {
        let mut ix = range_dec.decode_icdf(cb.ec_icdf_for(stage1, i), 8) as i32;
        if ix == 0 {
            ix -= range_dec.decode_icdf(&NLSF_EXT_ICDF, 8) as i32;
        } else if ix == 2 * NLSF_QUANT_MAX_AMPLITUDE {
            ix += range_dec.decode_icdf(&NLSF_EXT_ICDF, 8) as i32;
        }
        state.indices.nlsf_indices[i + 1] = (ix - NLSF_QUANT_MAX_AMPLITUDE) as i8;
    }

    // NLSF interpolation factor, only for 20 ms frames
    state.indices.nlsf_interp_coef_q2 = if state.nb_subfr == MAX_NB_SUBFR {
        range_dec.decode_icdf(&NLSF_INTERPOLATION_FACTOR_ICDF, 8) as i8
    } else {
        4
    };

    if state.indices.signal_type == SignalType::Voiced {
        // Pitch lag: delta against the previous frame when possible,
        // otherwise absolute coarse + fine
        let mut absolute = true;
        if cond_coding == ConditionalCoding::Conditionally
            && state.ec_prev_signal_type == SignalType::Voiced
        {
            let delta = range_dec.decode_icdf(&PITCH_DELTA_ICDF, 8) as i32;
            if delta > 0 {
                state.indices.lag_index = state.ec_prev_lag_index + (delta - 9) as i16;
                absolute = false;
            }
        }
        if absolute {
            let coarse = range_dec.decode_icdf(&PITCH_LAG_ICDF, 8) as i32;
            let fine = range_dec.decode_icdf(lag_fine_icdf(state.fs_khz), 8) as i32;
            state.indices.lag_index = (coarse * (state.fs_khz as i32 >> 1) + fine) as i16;
        }
        state.ec_prev_lag_index = state.indices.lag_index;

        let (contour_icdf, _, _) = contour_tables(state.fs_khz, state.nb_subfr);
        state.indices.contour_index = range_dec.decode_icdf(contour_icdf, 8) as i8;

        // LTP filter: periodicity index, then per-subframe codebook index
        state.indices.per_index = range_dec.decode_icdf(&LTP_PER_INDEX_ICDF, 8) as i8;
        for k in 0..state.nb_subfr {
            state.indices.ltp_index[k] =
                range_dec.decode_icdf(ltp_gain_icdf(state.indices.per_index as usize), 8) as i8;
        }

        state.indices.ltp_scale_index = if cond_coding == ConditionalCoding::Independently {
            range_dec.decode_icdf(&LTP_SCALE_ICDF, 8) as i8
        } else {
            0
        };
    }
    state.ec_prev_signal_type = state.indices.signal_type;

    // LCG seed
    state.indices.seed = range_dec.decode_icdf(&UNIFORM4_ICDF, 8) as i8;
}
