//! End-to-end encode/decode behavior.

use half::f16;
use ndarray::Array3;

use jvol::container::HEADER_SIZE;
use jvol::{Codec, CodecConfig, CodecError, DType, PaddingMode, Sample, Volume};

/// Deterministic LCG noise in `[-1, 1)`.
fn noise(seed: u64) -> impl FnMut() -> f64 {
    let mut state = seed;
    move || {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (state >> 11) as f64 / (1u64 << 53) as f64 * 2.0 - 1.0
    }
}

fn smooth_with_noise(shape: (usize, usize, usize), amplitude: f64) -> Array3<i16> {
    let mut next = noise(7);
    Array3::from_shape_fn(shape, |(x, y, z)| {
        let smooth = 400.0 * ((x as f64 / 5.0).sin() + (y as f64 / 7.0).cos()) + 30.0 * z as f64;
        (smooth + amplitude * next()).round() as i16
    })
}

fn codec(block_size: usize, quality: u8) -> Codec {
    Codec::new(
        CodecConfig::default()
            .with_block_size(block_size)
            .with_quality(quality),
    )
    .unwrap()
}

fn round_trip(codec: &Codec, volume: &Volume) -> Volume {
    let bytes = codec.encode(volume).unwrap();
    codec.decode(&bytes).unwrap()
}

fn mse<T: Sample>(a: &Volume, b: &Volume) -> f64 {
    let (a, b) = (a.view::<T>().unwrap(), b.view::<T>().unwrap());
    let sum: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(&x, &y)| (x.to_f64() - y.to_f64()).powi(2))
        .sum();
    sum / a.len() as f64
}

fn max_abs_error<T: Sample>(a: &Volume, b: &Volume) -> f64 {
    let (a, b) = (a.view::<T>().unwrap(), b.view::<T>().unwrap());
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| (x.to_f64() - y.to_f64()).abs())
        .fold(0.0, f64::max)
}

#[test]
fn all_zero_volume_is_lossless() {
    let codec = codec(8, 50);
    for volume in [
        Volume::try_from(Array3::<u8>::zeros((16, 16, 16))).unwrap(),
        Volume::try_from(Array3::<i16>::zeros((16, 16, 16))).unwrap(),
        Volume::try_from(Array3::<f32>::zeros((16, 16, 16))).unwrap(),
    ] {
        let decoded = round_trip(&codec, &volume);
        assert_eq!(decoded, volume, "dtype {:?}", volume.dtype());
    }
}

#[test]
fn constant_volumes_are_lossless_at_any_quality() {
    let volume = Volume::try_from(Array3::from_elem((10, 12, 9), 1000u16)).unwrap();
    for quality in [1, 30, 60, 100] {
        let decoded = round_trip(&codec(8, quality), &volume);
        assert_eq!(decoded, volume, "quality {quality}");
    }
}

#[test]
fn non_multiple_shape_is_padded_and_cropped() {
    let samples = Array3::from_shape_fn((9, 9, 9), |(x, y, z)| (x * 81 + y * 9 + z) as i16);
    let volume = Volume::try_from(samples).unwrap();
    let codec = codec(8, 90);
    let bytes = codec.encode(&volume).unwrap();

    let (header, _) = Codec::inspect(&bytes).unwrap();
    assert_eq!(header.padding, [7, 7, 7]);
    assert_eq!(header.shape, [9, 9, 9]);

    let decoded = codec.decode(&bytes).unwrap();
    assert_eq!(decoded.dim(), (9, 9, 9));
    assert_eq!(decoded.dtype(), DType::I16);
}

#[test]
fn truncated_payload_is_corrupt_stream() {
    let volume = Volume::try_from(smooth_with_noise((16, 16, 16), 50.0)).unwrap();
    let codec = codec(8, 60);
    let bytes = codec.encode(&volume).unwrap();
    let err = codec.decode(&bytes[..bytes.len() - 10]).unwrap_err();
    assert!(matches!(err, CodecError::CorruptStream { .. }), "{err}");
}

#[test]
fn flipped_payload_byte_is_corrupt_stream() {
    let volume = Volume::try_from(smooth_with_noise((16, 16, 16), 50.0)).unwrap();
    let codec = codec(8, 60);
    let mut bytes = codec.encode(&volume).unwrap();
    let middle = HEADER_SIZE + (bytes.len() - HEADER_SIZE) / 2;
    bytes[middle] ^= 0x5A;
    let err = codec.decode(&bytes).unwrap_err();
    assert!(matches!(err, CodecError::CorruptStream { .. }), "{err}");
}

#[test]
fn header_damage_is_reported_by_kind() {
    let volume = Volume::try_from(Array3::<u8>::zeros((4, 4, 4))).unwrap();
    let codec = codec(4, 60);
    let bytes = codec.encode(&volume).unwrap();

    let err = codec.decode(&bytes[..20]).unwrap_err();
    assert!(matches!(err, CodecError::Format { .. }));

    let mut wrong_magic = bytes.clone();
    wrong_magic[..4].copy_from_slice(b"JPEG");
    assert!(matches!(
        codec.decode(&wrong_magic),
        Err(CodecError::Format { .. })
    ));

    let mut trailing = bytes.clone();
    trailing.extend_from_slice(&[0, 0]);
    assert!(matches!(
        codec.decode(&trailing),
        Err(CodecError::Format { .. })
    ));
}

#[test]
fn error_decreases_as_quality_increases() {
    let volume = Volume::try_from(smooth_with_noise((24, 24, 24), 200.0)).unwrap();
    let errors: Vec<f64> = [5, 25, 50, 75, 95, 100]
        .into_iter()
        .map(|quality| mse::<i16>(&volume, &round_trip(&codec(8, quality), &volume)))
        .collect();
    for pair in errors.windows(2) {
        assert!(pair[1] <= pair[0], "errors not monotonic: {errors:?}");
    }
    assert!(errors[5] < 1.0, "quality 100 error {}", errors[5]);
}

#[test]
fn size_decreases_as_quality_decreases() {
    let volume = Volume::try_from(smooth_with_noise((24, 24, 24), 200.0)).unwrap();
    let sizes: Vec<usize> = [95, 50, 5]
        .into_iter()
        .map(|quality| codec(8, quality).encode(&volume).unwrap().len())
        .collect();
    assert!(sizes[0] > sizes[1] && sizes[1] > sizes[2], "{sizes:?}");
}

#[test]
fn every_dtype_round_trips() {
    let shape = (11, 6, 7);
    let codec = codec(4, 100);
    let ramp = |x: usize, y: usize, z: usize| (x * 11 + y * 5 + z * 3) as f64;

    let volumes = [
        Volume::try_from(Array3::from_shape_fn(shape, |(x, y, z)| ramp(x, y, z) as u8)).unwrap(),
        Volume::try_from(Array3::from_shape_fn(shape, |(x, y, z)| (ramp(x, y, z) - 90.0) as i8))
            .unwrap(),
        Volume::try_from(Array3::from_shape_fn(shape, |(x, y, z)| (ramp(x, y, z) * 300.0) as u16))
            .unwrap(),
        Volume::try_from(Array3::from_shape_fn(shape, |(x, y, z)| {
            (ramp(x, y, z) * 150.0 - 20000.0) as i16
        }))
        .unwrap(),
    ];
    for volume in &volumes {
        let decoded = round_trip(&codec, volume);
        assert_eq!(decoded.dim(), shape);
        assert_eq!(decoded.dtype(), volume.dtype());
        let error = match volume.dtype() {
            DType::U8 => max_abs_error::<u8>(volume, &decoded),
            DType::I8 => max_abs_error::<i8>(volume, &decoded),
            DType::U16 => max_abs_error::<u16>(volume, &decoded),
            DType::I16 => max_abs_error::<i16>(volume, &decoded),
            _ => unreachable!(),
        };
        assert!(error <= 3.0, "{:?}: max error {error}", volume.dtype());
    }

    let floats = Volume::try_from(Array3::from_shape_fn(shape, |(x, y, z)| {
        (ramp(x, y, z) / 8.0 - 5.0) as f32
    }))
    .unwrap();
    let decoded = round_trip(&codec, &floats);
    assert_eq!(decoded.dtype(), DType::F32);
    assert!(max_abs_error::<f32>(&floats, &decoded) < 0.01);

    let halves = Volume::try_from(Array3::from_shape_fn(shape, |(x, y, z)| {
        f16::from_f64(ramp(x, y, z) / 4.0)
    }))
    .unwrap();
    let decoded = round_trip(&codec, &halves);
    assert_eq!(decoded.dtype(), DType::F16);
    assert!(max_abs_error::<f16>(&halves, &decoded) < 0.1);
}

#[test]
fn float_output_stays_within_input_range() {
    let mut next = noise(3);
    let samples = Array3::from_shape_fn((12, 12, 12), |_| (next() * 2.5 + 10.0) as f32);
    let (lo, hi) = samples
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let volume = Volume::try_from(samples).unwrap();
    let decoded = round_trip(&codec(8, 10), &volume);
    let view = decoded.view::<f32>().unwrap();
    assert!(view.iter().all(|&v| v >= lo && v <= hi));
}

#[test]
fn unit_blocks_are_lossless() {
    let volume = Volume::try_from(smooth_with_noise((5, 7, 3), 1000.0)).unwrap();
    let decoded = round_trip(&codec(1, 1), &volume);
    assert_eq!(decoded, volume);
}

#[test]
fn non_finite_samples_are_range_errors() {
    let mut samples = Array3::<f32>::zeros((4, 4, 4));
    samples[[1, 2, 3]] = f32::INFINITY;
    let volume = Volume::try_from(samples).unwrap();
    assert!(matches!(
        codec(4, 60).encode(&volume),
        Err(CodecError::Range { .. })
    ));
}

#[test]
fn output_does_not_depend_on_thread_count() {
    let volume = Volume::try_from(smooth_with_noise((20, 17, 9), 80.0)).unwrap();
    let single = Codec::new(CodecConfig::default().with_threads(1)).unwrap();
    let many = Codec::new(CodecConfig::default().with_threads(4)).unwrap();
    assert_eq!(single.encode(&volume).unwrap(), many.encode(&volume).unwrap());
}

#[test]
fn zero_and_edge_padding_both_decode() {
    let volume = Volume::try_from(smooth_with_noise((13, 5, 6), 20.0)).unwrap();
    for padding in [PaddingMode::Edge, PaddingMode::Zero] {
        let codec = Codec::new(CodecConfig::default().with_padding(padding).with_quality(95))
            .unwrap();
        let decoded = round_trip(&codec, &volume);
        assert_eq!(decoded.dim(), (13, 5, 6));
        assert!(mse::<i16>(&volume, &decoded) < 50.0);
    }
}

#[test]
fn free_functions_use_defaults() {
    let volume = Volume::try_from(smooth_with_noise((8, 8, 8), 10.0)).unwrap();
    let bytes = jvol::encode(&volume).unwrap();
    let header = jvol::Header::inspect(&bytes).unwrap();
    assert_eq!(header.quality, 60);
    assert_eq!(header.block_size, 8);
    assert_eq!(header.padding_mode, PaddingMode::Edge);
    assert_eq!(jvol::decode(&bytes).unwrap().dim(), (8, 8, 8));
}
