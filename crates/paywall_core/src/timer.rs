use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use futures::{future, Stream, StreamExt};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_stream::wrappers::IntervalStream;
use tracing::info;

use crate::config::CooldownConfig;

pub const DEFAULT_COUNTDOWN: Duration = Duration::from_secs(5);
/// Stand-in deadline when `start + duration` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Countdown that gates the paywall's close control.
///
/// Purely time driven: nothing about the purchase session feeds into it.
#[derive(Debug)]
pub struct PresentationTimer {
    countdown_start: Instant,
    duration: Duration,
    enabled: bool,
    dismiss_latched: AtomicBool,
}

impl PresentationTimer {
    pub fn start(config: &CooldownConfig) -> Self {
        Self::start_at(
            Instant::now(),
            config.start_delay(),
            config.duration(),
            config.enabled,
        )
    }

    pub fn with_duration(duration: Duration) -> Self {
        Self::start_at(Instant::now(), Duration::ZERO, duration, true)
    }

    pub fn disabled() -> Self {
        Self::start_at(Instant::now(), Duration::ZERO, Duration::ZERO, false)
    }

    fn start_at(
        appeared_at: Instant,
        start_delay: Duration,
        duration: Duration,
        enabled: bool,
    ) -> Self {
        Self {
            countdown_start: saturating_add(appeared_at, start_delay),
            duration,
            enabled,
            dismiss_latched: AtomicBool::new(false),
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn deadline(&self) -> Instant {
        saturating_add(self.countdown_start, self.duration)
    }

    pub fn elapsed_fraction(&self) -> f64 {
        self.fraction_at(Instant::now())
    }

    pub fn fraction_at(&self, now: Instant) -> f64 {
        if !self.enabled {
            return 1.0;
        }
        fraction_between(self.countdown_start, self.duration, now)
    }

    /// Latches: once this has returned `true` it keeps returning `true`.
    pub fn dismiss_allowed(&self) -> bool {
        if self.dismiss_latched.load(Ordering::Acquire) {
            return true;
        }
        if self.fraction_at(Instant::now()) < 1.0 {
            return false;
        }
        if !self.dismiss_latched.swap(true, Ordering::AcqRel) {
            info!(
                duration_secs = self.duration.as_secs_f64(),
                "presentation timer: dismiss allowed"
            );
        }
        true
    }

    pub async fn wait_dismiss_allowed(&self) {
        if self.enabled {
            time::sleep_until(self.deadline()).await;
        }
        self.dismiss_allowed();
    }

    /// Emits the elapsed fraction every `tick` and ends right after emitting 1.0.
    pub fn progress(&self, tick: Duration) -> impl Stream<Item = f64> + Send + 'static {
        let countdown_start = self.countdown_start;
        let duration = self.duration;
        let enabled = self.enabled;

        let mut interval = time::interval(tick.max(Duration::from_millis(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        IntervalStream::new(interval)
            .map(move |now| {
                if enabled {
                    fraction_between(countdown_start, duration, now)
                } else {
                    1.0
                }
            })
            .scan(false, |finished, fraction| {
                if *finished {
                    return future::ready(None);
                }
                *finished = fraction >= 1.0;
                future::ready(Some(fraction))
            })
    }
}

fn saturating_add(at: Instant, by: Duration) -> Instant {
    at.checked_add(by)
        .or_else(|| at.checked_add(FAR_FUTURE))
        .unwrap_or(at)
}

fn fraction_between(countdown_start: Instant, duration: Duration, now: Instant) -> f64 {
    let elapsed = now.saturating_duration_since(countdown_start);
    if elapsed >= duration {
        return 1.0;
    }
    (elapsed.as_secs_f64() / duration.as_secs_f64()).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn dismiss_flips_once_at_deadline() {
        let timer = PresentationTimer::with_duration(DEFAULT_COUNTDOWN);
        assert!(!timer.dismiss_allowed());
        assert_eq!(timer.elapsed_fraction(), 0.0);

        time::advance(Duration::from_millis(4_999)).await;
        assert!(!timer.dismiss_allowed());

        time::advance(Duration::from_millis(1)).await;
        assert!(timer.dismiss_allowed());
        assert_eq!(timer.elapsed_fraction(), 1.0);

        time::advance(Duration::from_secs(10)).await;
        assert!(timer.dismiss_allowed());
        assert_eq!(timer.elapsed_fraction(), 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn start_delay_holds_fraction_at_zero() {
        let timer = PresentationTimer::start(&CooldownConfig {
            enabled: true,
            duration_secs: 2.0,
            start_delay_ms: 600,
        });

        time::advance(Duration::from_millis(500)).await;
        assert_eq!(timer.elapsed_fraction(), 0.0);

        time::advance(Duration::from_millis(1_100)).await;
        assert!((timer.elapsed_fraction() - 0.5).abs() < 1e-9);
        assert!(!timer.dismiss_allowed());

        time::advance(Duration::from_millis(1_000)).await;
        assert!(timer.dismiss_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_cooldown_allows_dismiss_immediately() {
        let timer = PresentationTimer::disabled();
        assert!(timer.dismiss_allowed());
        assert_eq!(timer.elapsed_fraction(), 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_duration_is_immediately_dismissable() {
        let timer = PresentationTimer::with_duration(Duration::ZERO);
        assert!(timer.dismiss_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_resolves_at_deadline() {
        let timer = PresentationTimer::with_duration(Duration::from_secs(3));
        let started = Instant::now();

        timer.wait_dismiss_allowed().await;

        assert!(started.elapsed() >= Duration::from_secs(3));
        assert!(timer.dismiss_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn progress_is_monotonic_and_ends_at_one() {
        let timer = PresentationTimer::with_duration(DEFAULT_COUNTDOWN);
        let fractions: Vec<f64> = timer.progress(Duration::from_secs(1)).collect().await;

        assert_eq!(fractions.len(), 6);
        assert_eq!(fractions.first().copied(), Some(0.0));
        assert_eq!(fractions.last().copied(), Some(1.0));
        assert!(fractions.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[tokio::test(start_paused = true)]
    async fn huge_duration_never_panics_or_allows_dismiss() {
        let timer = PresentationTimer::with_duration(Duration::MAX);
        assert!(timer.deadline() > Instant::now() + Duration::from_secs(86_400 * 365));

        time::advance(Duration::from_secs(86_400)).await;
        assert!(!timer.dismiss_allowed());
        assert!(timer.elapsed_fraction() < 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn huge_start_delay_keeps_the_countdown_pending() {
        let appeared_at = Instant::now();
        let timer = PresentationTimer::start_at(appeared_at, Duration::MAX, DEFAULT_COUNTDOWN, true);
        assert!(timer.deadline() > appeared_at + DEFAULT_COUNTDOWN);

        time::advance(Duration::from_secs(60)).await;
        assert_eq!(timer.elapsed_fraction(), 0.0);
        assert!(!timer.dismiss_allowed());
    }
}
