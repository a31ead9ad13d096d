use mts_relay::MainThreadExecutor;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{info, trace, warn};

/// Fixed-rate simulation loop. Main-thread packets run here, once per tick.
pub async fn run_tick_loop(
    tick_rate: u32,
    mut executor: MainThreadExecutor,
    shutdown_rx: watch::Receiver<bool>,
) {
    let tick_duration = Duration::from_millis(1000 / u64::from(tick_rate.max(1)));
    let mut tick_count: u64 = 0;

    info!("Tick loop started ({} TPS)", tick_rate);

    loop {
        let tick_start = Instant::now();
        if *shutdown_rx.borrow() {
            break;
        }

        let ran = executor.run_pending();
        if ran > 0 {
            trace!("Tick {} ran {} queued packets", tick_count, ran);
        }

        tick_count += 1;

        let elapsed = tick_start.elapsed();
        if elapsed < tick_duration {
            tokio::time::sleep(tick_duration - elapsed).await;
        } else if tick_count % 100 == 0 {
            warn!("Tick {} took {:?} (over {:?} budget)", tick_count, elapsed, tick_duration);
        }
    }

    info!(
        "Tick loop stopped after {} ticks, {} connection queues open",
        tick_count,
        executor.queue_count()
    );
}
