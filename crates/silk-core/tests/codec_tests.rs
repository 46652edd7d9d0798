//! End-to-end encode/decode scenarios

use silk_core::{encode_stereo, Bandwidth, Decoder, Encoder};

fn tone(freq: f32, fs_hz: f32, amp: f32, len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| amp * (2.0 * std::f32::consts::PI * freq * i as f32 / fs_hz).sin())
        .collect()
}

fn rms(x: &[f32]) -> f32 {
    (x.iter().map(|v| v * v).sum::<f32>() / x.len() as f32).sqrt()
}

fn peak(x: &[f32]) -> f32 {
    x.iter().fold(0f32, |m, v| m.max(v.abs()))
}

#[test]
fn silence_mono_20ms_wb() {
    let mut enc = Encoder::new(Bandwidth::Wide).unwrap();
    let pcm = vec![0f32; 320];
    let payload = enc.encode(&pcm, false).unwrap();
    assert!(!payload.is_empty());
    assert!(payload.len() <= 40, "silence packet is {} bytes", payload.len());

    let mut dec = Decoder::new(1).unwrap();
    let out = dec.decode(&payload, Bandwidth::Wide, 960, false).unwrap();
    assert_eq!(out.len(), 960);
    assert!(peak(&out) <= 1e-3, "silence decoded to peak {}", peak(&out));
}

#[test]
fn sine_mono_20ms_wb_parity_and_level() {
    let mut enc = Encoder::new(Bandwidth::Wide).unwrap();
    let mut dec = Decoder::new(1).unwrap();

    let mut in_rms = 0f32;
    let mut out_rms = 0f32;
    for frame in 0..8 {
        let pcm = tone(300.0, 16_000.0, 0.3, 320);
        let payload = enc.encode(&pcm, true).unwrap();
        let out = dec.decode(&payload, Bandwidth::Wide, 960, true).unwrap();
        assert_eq!(out.len(), 960);
        assert_eq!(
            enc.final_range(),
            dec.final_range(),
            "range mismatch on frame {}",
            frame
        );
        if frame >= 5 {
            in_rms = rms(&pcm);
            out_rms = rms(&out);
        }
    }
    // Steady-state level within 6 dB of the input
    let ratio = out_rms / in_rms;
    assert!(
        ratio > 0.5 && ratio < 2.0,
        "level ratio {} (in {} out {})",
        ratio,
        in_rms,
        out_rms
    );
}

#[test]
fn range_parity_every_bandwidth_and_duration() {
    for &bw in &[Bandwidth::Narrow, Bandwidth::Medium, Bandwidth::Wide] {
        for &ms in &[10usize, 20, 40, 60] {
            let fs = bw.fs_khz() * 1000;
            let native = bw.fs_khz() * ms;
            let out_48 = 48 * ms;
            let mut enc = Encoder::new(bw).unwrap();
            let mut dec = Decoder::new(1).unwrap();
            for _ in 0..3 {
                let pcm = tone(250.0, fs as f32, 0.4, native);
                let payload = enc.encode(&pcm, true).unwrap();
                let out = dec.decode(&payload, bw, out_48, true).unwrap();
                assert_eq!(out.len(), out_48);
                assert_eq!(
                    enc.final_range(),
                    dec.final_range(),
                    "parity failed at {:?} {} ms",
                    bw,
                    ms
                );
            }
        }
    }
}

#[test]
fn stereo_20ms_wb_distinct_channels() {
    let mut enc_mid = Encoder::new(Bandwidth::Wide).unwrap();
    let mut enc_side = Encoder::new(Bandwidth::Wide).unwrap();
    let mut dec = Decoder::new(2).unwrap();

    for _ in 0..6 {
        let left = tone(300.0, 16_000.0, 0.5, 320);
        let right = tone(350.0, 16_000.0, 0.5, 320);
        let payload = encode_stereo(
            &mut enc_mid,
            &mut enc_side,
            &left,
            &right,
            Bandwidth::Wide,
            [true, true],
        )
        .unwrap();
        assert!(payload.len() < 600, "stereo packet {} bytes", payload.len());

        let out = dec.decode(&payload, Bandwidth::Wide, 960, true).unwrap();
        assert_eq!(out.len(), 2 * 960);
        assert_eq!(enc_mid.final_range(), dec.final_range());
    }
}

#[test]
fn stereo_identical_channels_stay_identical() {
    let mut enc_mid = Encoder::new(Bandwidth::Wide).unwrap();
    let mut enc_side = Encoder::new(Bandwidth::Wide).unwrap();
    let mut dec = Decoder::new(2).unwrap();

    let mut max_diff = 0f32;
    for _ in 0..4 {
        let x = tone(440.0, 16_000.0, 0.4, 320);
        let payload = encode_stereo(
            &mut enc_mid,
            &mut enc_side,
            &x,
            &x,
            Bandwidth::Wide,
            [true, false],
        )
        .unwrap();
        let out = dec.decode(&payload, Bandwidth::Wide, 960, true).unwrap();
        for n in 0..960 {
            max_diff = max_diff.max((out[2 * n] - out[2 * n + 1]).abs());
        }
    }
    assert!(max_diff < 1e-3, "L/R diverged by {}", max_diff);
}

#[test]
fn stereo_antiphase_channels_stay_antiphase() {
    let mut enc_mid = Encoder::new(Bandwidth::Wide).unwrap();
    let mut enc_side = Encoder::new(Bandwidth::Wide).unwrap();
    let mut dec = Decoder::new(2).unwrap();

    let mut sum_energy = 0f32;
    let mut side_energy = 0f32;
    for _ in 0..6 {
        let x = tone(300.0, 16_000.0, 0.4, 320);
        let neg: Vec<f32> = x.iter().map(|v| -v).collect();
        let payload = encode_stereo(
            &mut enc_mid,
            &mut enc_side,
            &x,
            &neg,
            Bandwidth::Wide,
            [true, true],
        )
        .unwrap();
        let out = dec.decode(&payload, Bandwidth::Wide, 960, true).unwrap();
        for n in 0..960 {
            let l = out[2 * n];
            let r = out[2 * n + 1];
            sum_energy += (l + r) * (l + r);
            side_energy += l * l + r * r;
        }
    }
    // left + right is the decoded mid channel, which was (close to) zero
    assert!(
        sum_energy < 0.05 * side_energy + 1.0,
        "mid leak {} vs side {}",
        sum_energy,
        side_energy
    );
}

#[test]
fn multi_frame_gain_continuity() {
    let mut enc = Encoder::new(Bandwidth::Wide).unwrap();
    for frame in 0..10 {
        let pcm = tone(400.0, 16_000.0, 0.4, 320);
        let payload = enc.encode(&pcm, true).unwrap();
        assert!(
            payload.len() >= 10 && payload.len() <= 400,
            "frame {} is {} bytes",
            frame,
            payload.len()
        );
    }
}

#[test]
fn plc_fades_and_rejoins() {
    let mut enc = Encoder::new(Bandwidth::Wide).unwrap();
    let mut dec = Decoder::new(1).unwrap();

    let mut last_good = vec![0f32; 960];
    for _ in 0..5 {
        let pcm = tone(300.0, 16_000.0, 0.4, 320);
        let payload = enc.encode(&pcm, true).unwrap();
        last_good = dec.decode(&payload, Bandwidth::Wide, 960, true).unwrap();
    }
    let good_peak = peak(&last_good);

    let mut peaks = Vec::new();
    for _ in 0..3 {
        let out = dec.decode_plc(Bandwidth::Wide, 960).unwrap();
        assert_eq!(out.len(), 960);
        peaks.push(peak(&out));
    }
    // Concealment never exceeds the last valid peak (small numeric slack)
    for &p in &peaks {
        assert!(p <= good_peak * 1.1 + 1e-3, "PLC peak {} vs {}", p, good_peak);
    }
    // And it decays over consecutive losses
    assert!(
        peaks[2] <= peaks[0] * 1.05 + 1e-3,
        "PLC did not fade: {:?}",
        peaks
    );

    // A real packet after the losses must decode without a large step at
    // the join
    let pcm = tone(300.0, 16_000.0, 0.4, 320);
    let payload = enc.encode(&pcm, true).unwrap();
    let rejoin = dec.decode(&payload, Bandwidth::Wide, 960, true).unwrap();
    assert_eq!(rejoin.len(), 960);
    assert!(peak(&rejoin) < 1.0);
}

#[test]
fn decoder_determinism_end_to_end() {
    let mut enc = Encoder::new(Bandwidth::Medium).unwrap();
    let pcm = tone(200.0, 12_000.0, 0.3, 240);
    let payload = enc.encode(&pcm, true).unwrap();

    let mut d1 = Decoder::new(1).unwrap();
    let mut d2 = Decoder::new(1).unwrap();
    let o1 = d1.decode(&payload, Bandwidth::Medium, 960, true).unwrap();
    let o2 = d2.decode(&payload, Bandwidth::Medium, 960, true).unwrap();
    assert_eq!(o1, o2);
    assert_eq!(d1.final_range(), d2.final_range());
}

#[test]
fn reset_recovers_from_failed_decode() {
    let mut dec = Decoder::new(1).unwrap();
    // Feed garbage; whether it errors or not, a reset plus normal decoding
    // must work afterwards
    let garbage: Vec<u8> = (0..50u8).map(|i| i.wrapping_mul(193)).collect();
    let _ = dec.decode(&garbage, Bandwidth::Wide, 960, true);
    dec.reset();

    let mut enc = Encoder::new(Bandwidth::Wide).unwrap();
    let pcm = tone(300.0, 16_000.0, 0.3, 320);
    let payload = enc.encode(&pcm, true).unwrap();
    let out = dec.decode(&payload, Bandwidth::Wide, 960, true).unwrap();
    assert_eq!(out.len(), 960);
}
