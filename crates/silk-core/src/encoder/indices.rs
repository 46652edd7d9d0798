//! Side-information index encoding (mirror of the decoder's grammar)

use crate::range::{EntropyEncoder, RangeEncoder};
use crate::tables::frame::{
    TYPE_OFFSET_NO_VAD_ICDF, TYPE_OFFSET_VAD_ICDF, UNIFORM4_ICDF, UNIFORM8_ICDF,
};
use crate::tables::gain::{DELTA_GAIN_ICDF, GAIN_ICDF};
use crate::tables::ltp::{ltp_gain_icdf, LTP_PER_INDEX_ICDF, LTP_SCALE_ICDF};
use crate::tables::nlsf::{codebook_for_order, NLSF_EXT_ICDF, NLSF_INTERPOLATION_FACTOR_ICDF};
use crate::tables::pitch::{contour_tables, lag_fine_icdf, PITCH_DELTA_ICDF, PITCH_LAG_ICDF};
use crate::types::{ConditionalCoding, SignalType, MAX_NB_SUBFR, NLSF_QUANT_MAX_AMPLITUDE};

use super::Encoder;

/// Write all side-information indices of one frame
pub(crate) fn encode_indices(
    enc: &mut Encoder,
    range_enc: &mut RangeEncoder,
    vad_flag: bool,
    cond_coding: ConditionalCoding,
) {
    let ind = &enc.indices;

    // Signal type and quantizer offset
    let type_sym = ind.signal_type.index() * 2 + ind.quant_offset_type.index();
    if vad_flag {
        debug_assert!(type_sym >= 2);
        range_enc.encode_icdf(type_sym - 2, &TYPE_OFFSET_VAD_ICDF, 8);
    } else {
        debug_assert!(type_sym < 2);
        range_enc.encode_icdf(type_sym, &TYPE_OFFSET_NO_VAD_ICDF, 8);
    }

    // Gains
    if cond_coding == ConditionalCoding::Conditionally {
        range_enc.encode_icdf(ind.gains_indices[0] as usize, &DELTA_GAIN_ICDF, 8);
    } else {
        range_enc.encode_icdf(
            (ind.gains_indices[0] >> 3) as usize,
            &GAIN_ICDF[ind.signal_type.index()],
            8,
        );
        range_enc.encode_icdf((ind.gains_indices[0] & 7) as usize, &UNIFORM8_ICDF, 8);
    }
    for i in 1..enc.nb_subfr {
        range_enc.encode_icdf(ind.gains_indices[i] as usize, &DELTA_GAIN_ICDF, 8);
    }

    // NLSF indices
    let cb = codebook_for_order(enc.lpc_order);
    let type_band = ind.signal_type.index() >> 1;
    let stage1 = ind.nlsf_indices[0] as usize;
    range_enc.encode_icdf(
        stage1,
        &cb.cb1_icdf[type_band * cb.n_vectors..(type_band + 1) * cb.n_vectors],
        8,
    );
    for i in 0..cb.order {
        let res = ind.nlsf_indices[i + 1] as i32;
        let sym = (res + NLSF_QUANT_MAX_AMPLITUDE).clamp(0, 2 * NLSF_QUANT_MAX_AMPLITUDE);
        range_enc.encode_icdf(sym as usize, cb.ec_icdf_for(stage1, i), 8);
        if sym == 0 {
            let ext = -res - NLSF_QUANT_MAX_AMPLITUDE;
            range_enc.encode_icdf(ext as usize, &NLSF_EXT_ICDF, 8);
        } else if sym == 2 * NLSF_QUANT_MAX_AMPLITUDE {
            let ext = res - NLSF_QUANT_MAX_AMPLITUDE;
            range_enc.encode_icdf(ext as usize, &NLSF_EXT_ICDF, 8);
        }
    }

    if enc.nb_subfr == MAX_NB_SUBFR {
        range_enc.encode_icdf(
            ind.nlsf_interp_coef_q2 as usize,
            &NLSF_INTERPOLATION_FACTOR_ICDF,
            8,
        );
    }

    if ind.signal_type == SignalType::Voiced {
        // Pitch lag: delta when the previous frame was voiced and the lag
        // is close enough, else absolute
        let mut encode_absolute = true;
        if cond_coding == ConditionalCoding::Conditionally
            && enc.ec_prev_signal_type == SignalType::Voiced
        {
            let delta = ind.lag_index as i32 - enc.ec_prev_lag_index as i32;
            if (-8..=11).contains(&delta) {
                range_enc.encode_icdf((delta + 9) as usize, &PITCH_DELTA_ICDF, 8);
                encode_absolute = false;
            } else {
                range_enc.encode_icdf(0, &PITCH_DELTA_ICDF, 8);
            }
        }
        if encode_absolute {
            let half = enc.fs_khz as i32 >> 1;
            let coarse = ind.lag_index as i32 / half;
            let fine = ind.lag_index as i32 - coarse * half;
            range_enc.encode_icdf(coarse as usize, &PITCH_LAG_ICDF, 8);
            range_enc.encode_icdf(fine as usize, lag_fine_icdf(enc.fs_khz), 8);
        }
        enc.ec_prev_lag_index = ind.lag_index;

        let (contour_icdf, _, _) = contour_tables(enc.fs_khz, enc.nb_subfr);
        range_enc.encode_icdf(ind.contour_index as usize, contour_icdf, 8);

        range_enc.encode_icdf(ind.per_index as usize, &LTP_PER_INDEX_ICDF, 8);
        for k in 0..enc.nb_subfr {
            range_enc.encode_icdf(
                ind.ltp_index[k] as usize,
                ltp_gain_icdf(ind.per_index as usize),
                8,
            );
        }

        if cond_coding == ConditionalCoding::Independently {
            range_enc.encode_icdf(ind.ltp_scale_index as usize, &LTP_SCALE_ICDF, 8);
        }
    }
    enc.ec_prev_signal_type = ind.signal_type;

    // LCG seed
    range_enc.encode_icdf(ind.seed as usize, &UNIFORM4_ICDF, 8);
}
