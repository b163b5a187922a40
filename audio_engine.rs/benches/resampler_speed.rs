use std::time::Duration;

use audio_engine::audio_event::AudioEvent;
use audio_engine::chain::AudioProcessor;
use audio_engine::format::{AudioFormat, Endian, SampleEncoding};
use audio_engine::resample::RateTransposer;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn bench_resample_ratios(c: &mut Criterion) {
	use rand::prelude::*;
	let mut rng = rand::thread_rng();
	let n_ch = 2;
	let n_samples = 44_100;

	let format = AudioFormat::new(
		44_100.0,
		n_ch,
		SampleEncoding::Float32 {
			endian: Endian::Little,
		},
	);
	let input: Vec<f32> = (0..n_samples * n_ch).map(|_| rng.gen_range(-1.0..=1.0)).collect();

	let mut group = c.benchmark_group("RateTransposer factor");

	for factor in [0.5, 0.75, 1.25, 2.0] {
		let transposer = RateTransposer::new(factor, n_ch);
		group.bench_function(BenchmarkId::new("process", format!("{factor}x")), |b| {
			b.iter(|| {
				let mut event = AudioEvent::new(format);
				event.set_float_buffer(input.clone());
				black_box(transposer.process(&mut event));
			});
		});
	}

	group.finish();
}

criterion_group! {
  name = benches;
  config = Criterion::default().measurement_time(Duration::from_secs(8));
  targets = bench_resample_ratios
}
criterion_main!(benches);
