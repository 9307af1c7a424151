use j2k_tile::error::CoderError;
use j2k_tile::mct::{as_samples, norms};
use j2k_tile::{
    BlockCoder, BlockId, BlockTarget, BufferLayout, CodeBlockJob, ComponentParams,
    ComponentTransform, CoordinateMapper, DecodePlanes, DecodeScheduler, Decomposition, Direction,
    EncodeScheduler, EncodedBlock, Executor, Kernel, Point, QuantStep, RawBlockCoder, Rect, Sample,
    ShiftInfo, TileBuffer, TileProcessor, TileSettings, WaveletTransform,
};
use core::fmt::Debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

const SENTINEL: i32 = -7777;

fn processor(num_workers: usize) -> TileProcessor {
    TileProcessor::new(TileSettings {
        num_workers,
        ..TileSettings::default()
    })
}

fn raw() -> j2k_tile::Result<RawBlockCoder> {
    Ok(RawBlockCoder::new())
}

fn reversible_params(rect: Rect) -> ComponentParams {
    let mut params = ComponentParams::new(rect, 4, 8, false, WaveletTransform::Reversible53);
    params.code_block_exponents = (3, 3);
    params.precinct_exponents = vec![(4, 4); 4];
    params
}

/// Encode random coefficients with the raw coder. Returns the decomposition
/// holding the coded data and the buffer the coefficients were taken from.
fn encoded_component(rect: Rect, seed: u64) -> (Decomposition, TileBuffer<'static, i32>) {
    let mut decomposition = Decomposition::build(reversible_params(rect)).unwrap();
    let processor = processor(4);
    let mut source = processor.encode_buffer::<i32>(&decomposition).unwrap();
    let mut rng = StdRng::seed_from_u64(seed);

    for v in source.plane_mut().unwrap() {
        *v = rng.random_range(-200..=200);
    }

    let outcome = processor
        .encode_component(&mut decomposition, &mut source, 1.0, raw)
        .unwrap();

    assert!(outcome.report.success);
    assert_eq!(outcome.report.scheduled, decomposition.num_code_blocks());

    (decomposition, source)
}

fn assert_windows_match<T>(windowed: &TileBuffer<'_, T>, full: &TileBuffer<'_, T>)
where
    T: Sample + PartialEq + Debug,
{
    for r in 0..windowed.num_resolutions() {
        for b in 0..windowed.num_bands(r) {
            let window = windowed.padded_band_window(r, b);

            if window.is_empty() {
                continue;
            }

            assert_eq!(
                windowed.read_band(r, b, window).unwrap(),
                full.read_band(r, b, window).unwrap(),
                "resolution {r}, band {b}"
            );
        }
    }
}

#[test]
fn coordinates_round_trip() {
    let params = reversible_params(Rect::from_xywh(13, 7, 100, 75));
    let decomposition = Decomposition::build(params).unwrap();
    let mapper = CoordinateMapper::new(&decomposition);

    assert_eq!(mapper.canvas_to_tile(Point::new(13, 7)), Some(Point::new(0, 0)));
    assert_eq!(mapper.canvas_to_tile(Point::new(112, 81)), Some(Point::new(99, 74)));
    assert_eq!(mapper.canvas_to_tile(Point::new(113, 7)), None);
    assert_eq!(mapper.canvas_to_tile(Point::new(12, 7)), None);
    assert_eq!(mapper.tile_to_canvas(Point::new(99, 74)), Some(Point::new(112, 81)));

    let mut buffer = TileBuffer::<i32>::new(
        &decomposition,
        decomposition.rect(),
        Direction::Decode,
        0,
        BufferLayout::Unified,
    )
    .unwrap();
    buffer.allocate(true).unwrap();

    for r in 0..decomposition.num_resolutions() {
        let rect = decomposition.resolution(r).rect;
        let mut in_bands = 0_u64;

        for y in 0..rect.height() {
            for x in 0..rect.width() {
                let p = Point::new(x, y);
                assert_eq!(mapper.tile_to_resolution(r, p), Some(p));

                let Some((b, local)) = mapper.resolution_to_subband(r, p) else {
                    assert!(r > 0);
                    continue;
                };

                in_bands += 1;
                assert_eq!(mapper.subband_to_resolution(r, b, local), Some(p));

                let absolute = mapper.subband_to_band_absolute(r, b, local).unwrap();
                assert_eq!(mapper.band_absolute_to_subband(r, b, absolute), Some(local));
                assert_eq!(buffer.transform(r, b, absolute.x, absolute.y), Some(p));
            }
        }

        let band_area: u64 = decomposition
            .resolution(r)
            .bands
            .iter()
            .map(|b| b.rect.area())
            .sum();

        assert_eq!(in_bands, band_area, "resolution {r}");
        assert_eq!(
            mapper.resolution_to_subband(r, Point::new(rect.width(), 0)),
            None
        );
    }
}

#[test]
fn full_decode_reproduces_coefficients() {
    let (decomposition, source) = encoded_component(Rect::from_xywh(5, 3, 97, 61), 1);

    let (full, report) = processor(4)
        .decode_component::<i32, _, _>(&decomposition, decomposition.rect(), raw)
        .unwrap();

    assert!(report.success);
    assert_eq!(report.executed, decomposition.num_code_blocks());
    assert_eq!(full.plane().unwrap(), source.plane().unwrap());
}

#[test]
fn windowed_decode_matches_full_decode() {
    let (decomposition, _) = encoded_component(Rect::from_xywh(5, 3, 97, 61), 2);
    let processor = processor(4);

    let (full, _) = processor
        .decode_component::<i32, _, _>(&decomposition, decomposition.rect(), raw)
        .unwrap();
    let (windowed, report) = processor
        .decode_component::<i32, _, _>(&decomposition, Rect::from_xywh(45, 23, 17, 13), raw)
        .unwrap();

    assert!(report.success);
    assert!(!windowed.is_whole_tile());
    assert!(report.scheduled < decomposition.num_code_blocks());
    assert_eq!(windowed.bounds(), Rect::from_xywh(45, 23, 17, 13));
    assert_windows_match(&windowed, &full);

    let windows = [
        Rect::from_xywh(5, 3, 1, 1),
        Rect::from_xywh(101, 63, 1, 1),
        Rect::from_xywh(0, 0, 20, 20),
        Rect::from_xywh(60, 10, 42, 5),
        Rect::from_xywh(33, 40, 3, 24),
        Rect::from_xywh(90, 50, 100, 100),
    ];

    windows.par_iter().for_each(|window| {
        let (windowed, report) = processor
            .decode_component::<i32, _, _>(&decomposition, *window, raw)
            .unwrap();

        assert!(report.success, "{window:?}");
        assert_windows_match(&windowed, &full);
    });
}

#[test]
fn reduced_decode_matches_full_decode() {
    let (decomposition, _) = encoded_component(Rect::from_xywh(0, 0, 80, 80), 3);

    let (full, _) = processor(2)
        .decode_component::<i32, _, _>(&decomposition, decomposition.rect(), raw)
        .unwrap();

    let reducing = TileProcessor::new(TileSettings {
        num_workers: 2,
        reduce: 1,
        ..TileSettings::default()
    });
    let (reduced, report) = reducing
        .decode_component::<i32, _, _>(&decomposition, Rect::from_xywh(20, 20, 30, 30), raw)
        .unwrap();

    assert!(report.success);
    assert_eq!(reduced.num_resolutions(), 3);
    assert_eq!(reduced.bounds(), Rect::from_ltrb(10, 10, 25, 25));
    assert_eq!(reduced.tile_bounds(), decomposition.resolution(2).rect);
    assert_windows_match(&reduced, &full);
}

#[test]
fn split_layout_matches_unified_layout() {
    let (decomposition, source) = encoded_component(Rect::from_xywh(1, 1, 50, 40), 4);

    let split = TileProcessor::new(TileSettings {
        num_workers: 3,
        layout: BufferLayout::Split,
        ..TileSettings::default()
    });
    let (buffer, report) = split
        .decode_component::<i32, _, _>(&decomposition, decomposition.rect(), raw)
        .unwrap();

    assert!(report.success);
    assert!(buffer.plane().is_err());

    for r in 0..buffer.num_resolutions() {
        for b in 0..buffer.num_bands(r) {
            let rect = buffer.band_rect(r, b);

            if rect.is_empty() {
                continue;
            }

            assert_eq!(
                buffer.read_band(r, b, rect).unwrap(),
                source.read_band(r, b, rect).unwrap()
            );
        }
    }
}

#[test]
fn split_layout_windowed_decode() {
    let (decomposition, _) = encoded_component(Rect::from_xywh(3, 7, 61, 45), 13);

    let (full, _) = processor(2)
        .decode_component::<i32, _, _>(&decomposition, decomposition.rect(), raw)
        .unwrap();

    let split = TileProcessor::new(TileSettings {
        num_workers: 3,
        layout: BufferLayout::Split,
        ..TileSettings::default()
    });

    for window in [Rect::from_xywh(30, 20, 9, 6), Rect::from_xywh(3, 7, 2, 50)] {
        let (windowed, report) = split
            .decode_component::<i32, _, _>(&decomposition, window, raw)
            .unwrap();

        assert!(report.success);
        assert_eq!(windowed.layout(), BufferLayout::Split);
        assert!(report.scheduled < decomposition.num_code_blocks());
        assert_windows_match(&windowed, &full);
    }
}

#[test]
fn decode_into_attached_storage() {
    let (decomposition, source) = encoded_component(Rect::from_xywh(0, 0, 40, 30), 5);
    let stride = 48;
    let mut storage = vec![SENTINEL; stride * 30];

    {
        let mut buffer = TileBuffer::<i32>::new(
            &decomposition,
            decomposition.rect(),
            Direction::Decode,
            0,
            BufferLayout::Unified,
        )
        .unwrap();
        buffer.attach(&mut storage, stride).unwrap();
        assert!(buffer.transfer().is_err());

        let scheduled =
            DecodeScheduler::new(&decomposition).schedule(&mut buffer, &Executor::new(2), raw);
        assert!(scheduled);
    }

    for (y, row) in storage.chunks_exact(stride).enumerate() {
        let start = y * 40;
        assert_eq!(&row[..40], &source.plane().unwrap()[start..start + 40]);
        assert!(row[40..].iter().all(|v| *v == SENTINEL));
    }
}

#[test]
fn worker_count_does_not_change_results() {
    let (decomposition, _) = encoded_component(Rect::from_xywh(3, 9, 90, 70), 6);
    let window = Rect::from_xywh(30, 30, 40, 20);

    let (single, single_report) = processor(1)
        .decode_component::<i32, _, _>(&decomposition, window, raw)
        .unwrap();
    let (pooled, pooled_report) = processor(8)
        .decode_component::<i32, _, _>(&decomposition, window, raw)
        .unwrap();

    assert_eq!(single_report, pooled_report);
    assert_eq!(single.plane().unwrap(), pooled.plane().unwrap());
}

fn irreversible_params(rect: Rect, num_resolutions: u8) -> ComponentParams {
    let mut params =
        ComponentParams::new(rect, num_resolutions, 8, false, WaveletTransform::Irreversible97);
    params.code_block_exponents = (3, 3);
    params.step_sizes = vec![QuantStep {
        exponent: 8,
        mantissa: 0,
    }];
    params
}

/// Encode random multiples of the step size of each band with the raw coder.
fn encoded_irreversible_component(
    params: ComponentParams,
    seed: u64,
) -> (Decomposition, TileBuffer<'static, f32>) {
    let mut decomposition = Decomposition::build(params).unwrap();
    let processor = processor(3);
    let mut source = processor.encode_buffer::<f32>(&decomposition).unwrap();
    let mut rng = StdRng::seed_from_u64(seed);

    let mut targets = vec![];
    for (r, resolution) in decomposition.resolutions().iter().enumerate() {
        for (b, band) in resolution.bands.iter().enumerate() {
            targets.push((
                BlockTarget {
                    resolution: r as u8,
                    band: b as u8,
                    rect: band.rect,
                },
                band.step_size,
            ));
        }
    }

    {
        let plain: Vec<_> = targets.iter().map(|(t, _)| *t).collect();
        let mut views = source.block_views_mut(&plain).unwrap();

        for (view, (_, step)) in views.iter_mut().zip(&targets) {
            for y in 0..view.height() {
                for v in view.row_mut(y) {
                    *v = rng.random_range(-50..=50) as f32 * step;
                }
            }
        }
    }

    let outcome = processor
        .encode_component(&mut decomposition, &mut source, 1.0, raw)
        .unwrap();
    assert!(outcome.report.success);

    (decomposition, source)
}

#[test]
fn irreversible_blocks_are_dequantized() {
    let params = irreversible_params(Rect::from_xywh(0, 0, 32, 24), 3);
    let (decomposition, source) = encoded_irreversible_component(params, 7);

    let (decoded, report) = processor(3)
        .decode_component::<f32, _, _>(&decomposition, decomposition.rect(), raw)
        .unwrap();

    assert!(report.success);
    assert_eq!(decoded.plane().unwrap(), source.plane().unwrap());
}

#[test]
fn irreversible_windowed_decode_matches_full_decode() {
    let params = irreversible_params(Rect::from_xywh(7, 5, 73, 51), 4);
    let (decomposition, _) = encoded_irreversible_component(params, 12);
    let processor = processor(4);

    let (full, _) = processor
        .decode_component::<f32, _, _>(&decomposition, decomposition.rect(), raw)
        .unwrap();
    let (windowed, report) = processor
        .decode_component::<f32, _, _>(&decomposition, Rect::from_xywh(40, 30, 5, 5), raw)
        .unwrap();

    assert!(report.success);
    assert!(report.scheduled < decomposition.num_code_blocks());
    assert_eq!(windowed.bounds(), Rect::from_xywh(40, 30, 5, 5));
    assert_windows_match(&windowed, &full);

    // The 9/7 filter needs a wider margin than the 5/3 one.
    let reversible = Decomposition::build(reversible_params(decomposition.rect())).unwrap();
    let narrow = TileBuffer::<f32>::new(
        &reversible,
        Rect::from_xywh(40, 30, 5, 5),
        Direction::Decode,
        0,
        BufferLayout::Unified,
    )
    .unwrap();
    let top = windowed.num_resolutions() - 1;
    assert!(
        windowed
            .padded_band_window(top, 0)
            .contains_rect(narrow.padded_band_window(top, 0))
    );

    let windows = [
        Rect::from_xywh(7, 5, 1, 1),
        Rect::from_xywh(79, 55, 1, 1),
        Rect::from_xywh(8, 6, 3, 3),
        Rect::from_xywh(21, 13, 30, 2),
        Rect::from_xywh(60, 40, 50, 50),
    ];

    windows.par_iter().for_each(|window| {
        let (windowed, report) = processor
            .decode_component::<f32, _, _>(&decomposition, *window, raw)
            .unwrap();

        assert!(report.success, "{window:?}");
        assert_windows_match(&windowed, &full);
    });
}

#[test]
fn rate_control_weights_distortion() {
    let mut decomposition =
        Decomposition::build(reversible_params(Rect::from_xywh(0, 0, 33, 17))).unwrap();
    let processor = TileProcessor::new(TileSettings {
        num_workers: 4,
        rate_control: true,
        ..TileSettings::default()
    });

    let mut buffer = processor.encode_buffer::<i32>(&decomposition).unwrap();
    let mut rng = StdRng::seed_from_u64(8);

    for v in buffer.plane_mut().unwrap() {
        *v = rng.random_range(-100..=100);
    }

    let expected: f64 = buffer
        .plane()
        .unwrap()
        .iter()
        .map(|v| (*v as f64) * (*v as f64))
        .sum();
    let norm = norms(true)[0];

    let outcome = processor
        .encode_component(&mut decomposition, &mut buffer, norm, raw)
        .unwrap();

    assert!(outcome.report.success);
    assert!((outcome.weighted_distortion - expected * norm * norm).abs() < 1e-6 * expected);
    assert_eq!(
        outcome.coded_bytes,
        decomposition.code_blocks().map(|(_, b)| b.data.len()).sum::<usize>()
    );
}

/// Fails (or panics) on one specific code-block, either when decoding or
/// when encoding it.
struct FailingCoder {
    inner: RawBlockCoder,
    fail: BlockId,
    panic: bool,
    on_encode: bool,
}

impl FailingCoder {
    fn check(&self, id: BlockId, encoding: bool) -> Result<(), CoderError> {
        if id != self.fail || encoding != self.on_encode {
            return Ok(());
        }

        if self.panic {
            panic!("coder exploded");
        }

        Err(CoderError::Corrupt)
    }
}

impl BlockCoder for FailingCoder {
    fn decode(&mut self, job: &CodeBlockJob<'_>, out: &mut [i32]) -> Result<(), CoderError> {
        self.check(job.id, false)?;
        self.inner.decode(job, out)
    }

    fn encode(
        &mut self,
        job: &CodeBlockJob<'_>,
        samples: &[i32],
    ) -> Result<EncodedBlock, CoderError> {
        self.check(job.id, true)?;
        self.inner.encode(job, samples)
    }
}

fn sentinel_buffer(decomposition: &Decomposition) -> TileBuffer<'static, i32> {
    let mut buffer = TileBuffer::<i32>::new(
        decomposition,
        decomposition.rect(),
        Direction::Decode,
        0,
        BufferLayout::Unified,
    )
    .unwrap();
    buffer.allocate(false).unwrap();
    buffer.plane_mut().unwrap().fill(SENTINEL);
    buffer
}

#[test]
fn failure_cancels_pending_blocks() {
    let (decomposition, source) = encoded_component(Rect::from_xywh(0, 0, 64, 48), 9);
    let (fail, _) = decomposition
        .code_blocks()
        .find(|(id, _)| id.resolution == 2)
        .unwrap();

    let mut buffer = sentinel_buffer(&decomposition);
    let report = DecodeScheduler::new(&decomposition)
        .run(&mut buffer, &Executor::single(), || {
            Ok(FailingCoder {
                inner: RawBlockCoder::new(),
                fail,
                panic: false,
                on_encode: false,
            })
        })
        .unwrap();

    let before = decomposition.code_blocks().filter(|(id, _)| *id < fail).count();

    assert!(!report.success);
    assert_eq!(report.failed, 1);
    assert_eq!(report.executed, before);
    assert_eq!(report.skipped, report.scheduled - before - 1);
    assert_eq!(report.executed + report.skipped + report.failed, report.scheduled);

    for (id, block) in decomposition.code_blocks() {
        if block.rect.is_empty() {
            continue;
        }

        let decoded = buffer.read_band(id.resolution, id.band, block.rect).unwrap();

        if id < fail {
            assert_eq!(decoded, source.read_band(id.resolution, id.band, block.rect).unwrap());
        } else {
            assert!(decoded.iter().all(|v| *v == SENTINEL), "{id:?}");
        }
    }
}

#[test]
fn panicking_coder_fails_schedule() {
    let (decomposition, _) = encoded_component(Rect::from_xywh(0, 0, 64, 48), 10);
    let (fail, fail_block) = decomposition
        .code_blocks()
        .find(|(id, _)| id.resolution == 3 && id.band == 2)
        .unwrap();
    let fail_rect = fail_block.rect;

    let factory = || {
        Ok(FailingCoder {
            inner: RawBlockCoder::new(),
            fail,
            panic: true,
            on_encode: false,
        })
    };

    let executor = Executor::new(4);
    let mut buffer = sentinel_buffer(&decomposition);
    let report = DecodeScheduler::new(&decomposition)
        .run(&mut buffer, &executor, factory)
        .unwrap();

    assert!(!report.success);
    assert_eq!(report.failed, 1);
    assert_eq!(report.executed + report.skipped + report.failed, report.scheduled);
    assert!(
        buffer
            .read_band(3, 2, fail_rect)
            .unwrap()
            .iter()
            .all(|v| *v == SENTINEL)
    );

    let mut buffer = sentinel_buffer(&decomposition);
    assert!(!DecodeScheduler::new(&decomposition).schedule(&mut buffer, &executor, factory));
}

#[test]
fn failed_encode_stores_nothing() {
    let mut decomposition =
        Decomposition::build(reversible_params(Rect::from_xywh(0, 0, 64, 48))).unwrap();
    let processor = processor(4);
    let mut buffer = processor.encode_buffer::<i32>(&decomposition).unwrap();
    let mut rng = StdRng::seed_from_u64(14);

    for v in buffer.plane_mut().unwrap() {
        *v = rng.random_range(-100..=100);
    }

    let (fail, _) = decomposition
        .code_blocks()
        .find(|(id, _)| id.resolution == 2)
        .unwrap();

    for panic in [false, true] {
        let factory = || {
            Ok(FailingCoder {
                inner: RawBlockCoder::new(),
                fail,
                panic,
                on_encode: true,
            })
        };

        let outcome = processor
            .encode_component(&mut decomposition, &mut buffer, 1.0, factory)
            .unwrap();

        assert!(!outcome.report.success);
        assert_eq!(outcome.report.failed, 1);
        assert_eq!(
            outcome.report.executed + outcome.report.skipped + outcome.report.failed,
            outcome.report.scheduled
        );
        assert!(
            decomposition
                .code_blocks()
                .all(|(_, block)| block.data.is_empty() && block.num_passes == 0)
        );

        assert!(!EncodeScheduler::new(&mut decomposition).schedule(
            &mut buffer,
            &Executor::single(),
            factory
        ));
        assert!(decomposition.code_blocks().all(|(_, block)| block.data.is_empty()));
    }

    let outcome = processor
        .encode_component(&mut decomposition, &mut buffer, 1.0, raw)
        .unwrap();

    assert!(outcome.report.success);
    assert!(decomposition.code_blocks().all(|(_, block)| !block.data.is_empty()));
}

#[test]
fn coder_creation_failure_is_an_error() {
    let (decomposition, _) = encoded_component(Rect::from_xywh(0, 0, 16, 16), 11);
    let mut buffer = sentinel_buffer(&decomposition);

    let result = DecodeScheduler::new(&decomposition).run(&mut buffer, &Executor::single(), || {
        Err::<RawBlockCoder, _>(j2k_tile::error::AllocationError::Coder.into())
    });

    assert!(result.is_err());
    assert!(buffer.plane().unwrap().iter().all(|v| *v == SENTINEL));
}

fn encode_shifts(n: usize) -> Vec<ShiftInfo> {
    vec![ShiftInfo::new(8, false, 128, Direction::Encode).unwrap(); n]
}

fn decode_shifts(n: usize) -> Vec<ShiftInfo> {
    vec![ShiftInfo::new(8, false, 128, Direction::Decode).unwrap(); n]
}

#[test]
fn reversible_colour_transform_known_values() {
    let processor = processor(2);
    let n = 19;
    let (mut r, mut g, mut b) = (vec![10; n], vec![20; n], vec![30; n]);

    processor
        .compress_transform(
            vec![&mut r[..], &mut g[..], &mut b[..]],
            &encode_shifts(3),
            n,
            true,
            true,
        )
        .unwrap();

    assert!(r.iter().all(|v| *v == -108));
    assert!(g.iter().all(|v| *v == 10));
    assert!(b.iter().all(|v| *v == -10));

    processor
        .decompress_transform(
            DecodePlanes::Reversible(vec![&mut r[..], &mut g[..], &mut b[..]]),
            &decode_shifts(3),
            n,
            true,
        )
        .unwrap();

    assert!(r.iter().all(|v| *v == 10));
    assert!(g.iter().all(|v| *v == 20));
    assert!(b.iter().all(|v| *v == 30));
}

#[test]
fn signed_samples_are_clamped() {
    let shifts = [ShiftInfo::new(8, true, 0, Direction::Decode).unwrap()];
    let mut plane = vec![130, -200, 5, 127, -128];

    processor(1)
        .decompress_transform(DecodePlanes::Reversible(vec![&mut plane[..]]), &shifts, 5, false)
        .unwrap();

    assert_eq!(plane, vec![127, -128, 5, 127, -128]);
}

#[test]
fn irreversible_colour_transform_round_trip() {
    let processor = processor(4);
    let n = 1000;
    let mut rng = StdRng::seed_from_u64(12);
    let original: Vec<Vec<i32>> = (0..3)
        .map(|_| (0..n).map(|_| rng.random_range(0..=255)).collect())
        .collect();

    let (mut r, mut g, mut b) = (original[0].clone(), original[1].clone(), original[2].clone());
    processor
        .compress_transform(
            vec![&mut r[..], &mut g[..], &mut b[..]],
            &encode_shifts(3),
            40,
            true,
            false,
        )
        .unwrap();

    let to_float =
        |p: &[i32]| -> Vec<f32> { p.iter().map(|v| f32::from_bits(*v as u32)).collect() };
    let (mut y, mut u, mut v) = (to_float(&r), to_float(&g), to_float(&b));

    processor
        .decompress_transform(
            DecodePlanes::Irreversible(vec![&mut y[..], &mut u[..], &mut v[..]]),
            &decode_shifts(3),
            40,
            true,
        )
        .unwrap();

    for (plane, original) in [&y, &u, &v].into_iter().zip(&original) {
        for (decoded, expected) in as_samples(plane).iter().zip(original) {
            assert!((decoded - expected).abs() <= 1, "{decoded} vs {expected}");
        }
    }
}

#[test]
fn transform_worker_count_does_not_change_results() {
    let n = 1000;
    let mut rng = StdRng::seed_from_u64(13);
    let input: Vec<Vec<i32>> = (0..4)
        .map(|_| (0..n).map(|_| rng.random_range(0..=255)).collect())
        .collect();

    let run = |num_workers: usize| {
        let processor = TileProcessor::new(TileSettings {
            num_workers,
            lines_per_task: 3,
            ..TileSettings::default()
        });
        let mut planes = input.clone();
        processor
            .compress_transform(
                planes.iter_mut().map(|p| &mut p[..]).collect(),
                &encode_shifts(4),
                10,
                true,
                true,
            )
            .unwrap();
        planes
    };

    assert_eq!(run(1), run(8));
}

#[test]
fn scalar_and_vector_kernels_agree() {
    let executor = Executor::single();
    let n = 1003;
    let mut rng = StdRng::seed_from_u64(14);

    let samples: Vec<Vec<i32>> = (0..3)
        .map(|_| (0..n).map(|_| rng.random_range(0..=4095)).collect())
        .collect();
    let coefficients: Vec<Vec<i32>> = (0..3)
        .map(|_| (0..n).map(|_| rng.random_range(-3000..=3000)).collect())
        .collect();
    let floats: Vec<Vec<f32>> = (0..3)
        .map(|_| (0..n).map(|_| rng.random_range(-2048.0_f32..2048.0)).collect())
        .collect();

    let encode = vec![ShiftInfo::new(12, false, 2048, Direction::Encode).unwrap(); 3];
    let decode = vec![ShiftInfo::new(12, false, 2048, Direction::Decode).unwrap(); 3];

    let transform = |kernel| ComponentTransform {
        kernel,
        lines_per_task: 8,
        stride: 17,
        mct: true,
    };

    let forward = |kernel, reversible| {
        let mut planes = samples.clone();
        transform(kernel)
            .compress(
                &executor,
                planes.iter_mut().map(|p| &mut p[..]).collect(),
                &encode,
                reversible,
            )
            .unwrap();
        planes
    };

    let inverse_int = |kernel| {
        let mut planes = coefficients.clone();
        transform(kernel)
            .decompress(
                &executor,
                DecodePlanes::Reversible(planes.iter_mut().map(|p| &mut p[..]).collect()),
                &decode,
            )
            .unwrap();
        planes
    };

    let inverse_float = |kernel| {
        let mut planes = floats.clone();
        transform(kernel)
            .decompress(
                &executor,
                DecodePlanes::Irreversible(planes.iter_mut().map(|p| &mut p[..]).collect()),
                &decode,
            )
            .unwrap();
        planes
            .iter()
            .map(|p| as_samples(p).to_vec())
            .collect::<Vec<_>>()
    };

    assert_eq!(forward(Kernel::Scalar, true), forward(Kernel::Vector, true));
    assert_eq!(forward(Kernel::Scalar, false), forward(Kernel::Vector, false));
    assert_eq!(inverse_int(Kernel::Scalar), inverse_int(Kernel::Vector));
    assert_eq!(inverse_float(Kernel::Scalar), inverse_float(Kernel::Vector));
}
