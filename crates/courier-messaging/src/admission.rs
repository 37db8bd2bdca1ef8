use parking_lot::Mutex;

use courier_core::MiddlewareError;

/// Backpressure settings for the inbound skeleton.
///
/// Disabled by default; when enabled, intake is paused once the number of
/// requests being processed reaches `upper_threshold_percent` of
/// `max_in_flight` and resumed once it falls back to
/// `lower_threshold_percent`. The gap between the two thresholds is the
/// hysteresis band that keeps intake from flapping.
#[derive(Debug, Clone)]
pub struct AdmissionConfig {
    pub enabled: bool,
    pub max_in_flight: usize,
    pub upper_threshold_percent: u8,
    pub lower_threshold_percent: u8,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_in_flight: 0,
            upper_threshold_percent: 80,
            lower_threshold_percent: 20,
        }
    }
}

impl AdmissionConfig {
    pub fn validate(&self) -> Result<(), MiddlewareError> {
        if !self.enabled {
            return Ok(());
        }
        let mut violations = Vec::new();
        if self.max_in_flight == 0 {
            violations.push("max_in_flight must be greater than zero".to_owned());
        }
        if self.upper_threshold_percent == 0 || self.upper_threshold_percent > 100 {
            violations.push(format!(
                "upper_threshold_percent must be in (0, 100], got {}",
                self.upper_threshold_percent
            ));
        }
        if self.lower_threshold_percent >= 100 {
            violations.push(format!(
                "lower_threshold_percent must be in [0, 100), got {}",
                self.lower_threshold_percent
            ));
        }
        if self.lower_threshold_percent >= self.upper_threshold_percent {
            violations.push(format!(
                "lower_threshold_percent ({}) must be below upper_threshold_percent ({})",
                self.lower_threshold_percent, self.upper_threshold_percent
            ));
        }
        if violations.is_empty() {
            Ok(())
        } else {
            Err(MiddlewareError::InvalidConfiguration(violations.join("; ")))
        }
    }
}

/// Whether the skeleton is currently accepting new requests from the
/// transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeState {
    Flowing,
    Throttled,
}

#[derive(Debug)]
struct Counters {
    in_flight: usize,
    throttled: bool,
}

/// Hysteresis counter behind the skeleton's pause/resume decisions.
///
/// `request_accepted` and `request_completed` return `Some` exactly when the
/// caller must act on a state transition, so pause and resume each fire once
/// per excursion past the watermarks.
#[derive(Debug)]
pub struct AdmissionControl {
    enabled: bool,
    upper_mark: usize,
    lower_mark: usize,
    counters: Mutex<Counters>,
}

impl AdmissionControl {
    pub fn new(config: AdmissionConfig) -> Result<Self, MiddlewareError> {
        config.validate()?;
        let upper_mark = (config.max_in_flight * config.upper_threshold_percent as usize)
            .div_ceil(100)
            .max(1);
        let lower_mark = config.max_in_flight * config.lower_threshold_percent as usize / 100;
        Ok(Self {
            enabled: config.enabled,
            upper_mark,
            lower_mark,
            counters: Mutex::new(Counters {
                in_flight: 0,
                throttled: false,
            }),
        })
    }

    /// Record an accepted request. Returns `Some(Throttled)` on the single
    /// crossing of the upper watermark.
    pub fn request_accepted(&self) -> Option<IntakeState> {
        if !self.enabled {
            return None;
        }
        let mut counters = self.counters.lock();
        counters.in_flight += 1;
        if !counters.throttled && counters.in_flight >= self.upper_mark {
            counters.throttled = true;
            return Some(IntakeState::Throttled);
        }
        None
    }

    /// Record a completed request. Returns `Some(Flowing)` on the single
    /// crossing back below the lower watermark.
    pub fn request_completed(&self) -> Option<IntakeState> {
        if !self.enabled {
            return None;
        }
        let mut counters = self.counters.lock();
        counters.in_flight = counters.in_flight.saturating_sub(1);
        if counters.throttled && counters.in_flight <= self.lower_mark {
            counters.throttled = false;
            return Some(IntakeState::Flowing);
        }
        None
    }

    pub fn state(&self) -> IntakeState {
        if self.counters.lock().throttled {
            IntakeState::Throttled
        } else {
            IntakeState::Flowing
        }
    }

    pub fn in_flight(&self) -> usize {
        self.counters.lock().in_flight
    }
}
