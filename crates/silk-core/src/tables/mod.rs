//! Constant data from RFC 6716
//!
//! Every ICDF, codebook, contour table and filter coefficient the codec
//! consumes, split per concern. The values reproduce the tables of RFC 6716
//! (Section 4.2.7) and the reference SILK implementation; nothing in here is
//! computed at runtime except the derived stereo grid in `stereo`.

pub mod frame;
pub mod gain;
pub mod ltp;
pub mod nlsf;
pub mod pitch;
pub mod pulses;
pub mod resampler;
pub mod stereo;

/// One of the two NLSF multi-stage codebooks (NB/MB order 10, WB order 16)
pub struct NlsfCodebook {
    /// Number of stage-1 vectors
    pub n_vectors: usize,
    /// Codebook order (10 or 16)
    pub order: usize,
    /// Residual quantization step in Q16
    pub quant_step_size_q16: i32,
    /// Inverse of the step in Q6
    pub inv_quant_step_size_q6: i32,
    /// Stage-1 vectors, Q8, `n_vectors * order`
    pub cb1_nlsf_q8: &'static [u8],
    /// Per-element weights for the stage-1 vectors, Q9
    pub cb1_wght_q9: &'static [i16],
    /// Stage-1 index ICDFs: unvoiced row then voiced row
    pub cb1_icdf: &'static [u8],
    /// Back-prediction coefficients, Q8, two rows of `order - 1`
    pub pred_q8: &'static [u8],
    /// Stage-2 ICDF selector per vector and coefficient
    pub ec_sel: &'static [u8],
    /// Predictor-row selector per vector and coefficient
    pub pred_sel: &'static [u8],
    /// Concatenated stage-2 ICDFs, 9 entries each
    pub ec_icdf: &'static [u8],
    /// Minimum NLSF spacing, Q15, `order + 1` entries
    pub delta_min_q15: &'static [i32],
}

impl NlsfCodebook {
    /// Stage-2 ICDF slice for coefficient `i` of stage-1 vector `cb1`
    pub fn ec_icdf_for(&self, cb1: usize, i: usize) -> &'static [u8] {
        let table = self.ec_sel[cb1 * self.order + i] as usize;
        &self.ec_icdf[table * 9..table * 9 + 9]
    }

    /// Back-prediction coefficient for coefficient `i` of stage-1 vector
    /// `cb1`; valid for `i < order - 1`
    pub fn pred_q8_for(&self, cb1: usize, i: usize) -> i32 {
        let row = self.pred_sel[cb1 * self.order + i] as usize;
        self.pred_q8[row * (self.order - 1) + i] as i32
    }
}
