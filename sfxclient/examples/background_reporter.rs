use std::{sync::Arc, thread::sleep, time::Duration};

use rand::Rng as _;
use sfxclient::{atomics::Int64, BackgroundReporter, Config, Counter, Dimensions, StableGauge, WrappedGauge};

fn main() {
    tracing_subscriber::fmt::init();

    let mut dimensions = Dimensions::new();
    dimensions.insert("service".to_string(), "example".to_string());

    let config = Config::new().with_url("http://localhost:9080/v2/datapoint");
    let background = BackgroundReporter::new(&config, dimensions, Duration::from_secs(5))
        .expect("failed to build background reporter");
    let reporter = background.reporter();

    let server_loops = Arc::new(Counter::new("tcp_server_loops", Dimensions::new()));
    let lucky_iterations = Arc::new(Int64::new(0));
    let build = Arc::new(StableGauge::new("build_number", Dimensions::new()));
    build.record(42);

    reporter.track(server_loops.clone());
    reporter.track(build.clone());
    reporter.track(Arc::new(WrappedGauge::new("lucky_iterations", Dimensions::new(), lucky_iterations.clone())));
    let latency = reporter.new_bucket("tcp_server_loop_delta_ms", Dimensions::new()).expect("bucket needs a name");

    background.start().expect("failed to start background reporter");

    let mut rng = rand::rng();

    // Loop over and over, pretending to do some work.
    loop {
        server_loops.inc(1);
        latency.add(rng.random_range(1..500));

        if rand::random_bool(0.75) {
            lucky_iterations.inc(1);
        } else {
            lucky_iterations.inc(-1);
        }

        sleep(Duration::from_millis(10));
    }
}
