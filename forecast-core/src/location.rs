//! Location acquisition as an explicit state machine.
//!
//! [`LocationEngine`] is pure: every [`LocationEvent`] goes through
//! [`LocationEngine::handle`], which updates the state and returns the
//! [`LocationEffect`]s the caller must carry out. [`LocationSession`] is the
//! async driver that runs those effects against a [`LocationProvider`] and
//! turns timers into tokio tasks.

use std::{collections::HashSet, time::Duration};

use crate::{error::LocationError, model::LocationSample};

pub mod session;

pub use session::{LocationProvider, LocationSession};

/// How long to wait for a fine reading before falling back to the coarse tier.
pub const ACQUISITION_TIMEOUT: Duration = Duration::from_secs(30);
pub const RETRY_DELAY: Duration = Duration::from_secs(3);
pub const RESET_DELAY: Duration = Duration::from_secs(2);
pub const MAX_RETRIES: u32 = 5;
/// Readings with a larger uncertainty radius are discarded.
pub const MAX_ACCEPTED_ACCURACY_M: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccuracyTier {
    /// Best the device can do.
    Fine,
    /// Roughly three kilometers.
    Coarse,
}

/// Permission state as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationStatus {
    NotDetermined,
    Restricted,
    Denied,
    AuthorizedAlways,
    AuthorizedWhenInUse,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LocationState {
    Unauthorized,
    PendingAuthorization,
    /// Permission granted, waiting to (re)start updates.
    Authorized,
    Acquiring,
    Acquired,
    Denied,
    Restricted,
    /// No fine reading arrived in time; acquiring on the coarse tier.
    TimedOut,
    Failed(LocationError),
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    Acquisition,
    AuthorizationRetry,
    AcquisitionRetry,
    Reset,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LocationEvent {
    Start,
    AuthorizationChanged(AuthorizationStatus),
    Reading(LocationSample),
    ProviderFailed(String),
    TimerFired(TimerKind),
    Stop,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LocationEffect {
    RequestAuthorization,
    SetAccuracy(AccuracyTier),
    StartUpdates,
    StopUpdates,
    StartTimer(TimerKind, Duration),
    CancelTimer(TimerKind),
    Publish(LocationSample),
}

#[derive(Debug)]
pub struct LocationEngine {
    state: LocationState,
    tier: AccuracyTier,
    updating: bool,
    armed: HashSet<TimerKind>,
    last_published: Option<LocationSample>,
    last_error: Option<LocationError>,
    // Authorization and acquisition failures draw from separate budgets.
    authorization_retries: u32,
    acquisition_retries: u32,
    reset_used: bool,
}

impl Default for LocationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl LocationEngine {
    pub fn new() -> Self {
        Self {
            state: LocationState::Unauthorized,
            tier: AccuracyTier::Fine,
            updating: false,
            armed: HashSet::new(),
            last_published: None,
            last_error: None,
            authorization_retries: 0,
            acquisition_retries: 0,
            reset_used: false,
        }
    }

    pub fn state(&self) -> &LocationState {
        &self.state
    }

    pub fn tier(&self) -> AccuracyTier {
        self.tier
    }

    pub fn last_published(&self) -> Option<&LocationSample> {
        self.last_published.as_ref()
    }

    pub fn last_error(&self) -> Option<&LocationError> {
        self.last_error.as_ref()
    }

    pub fn authorization_retries(&self) -> u32 {
        self.authorization_retries
    }

    pub fn acquisition_retries(&self) -> u32 {
        self.acquisition_retries
    }

    pub fn is_timer_armed(&self, kind: TimerKind) -> bool {
        self.armed.contains(&kind)
    }

    pub fn handle(&mut self, event: LocationEvent) -> Vec<LocationEffect> {
        if matches!(self.state, LocationState::Stopped) {
            return Vec::new();
        }

        let mut fx = Vec::new();
        match event {
            LocationEvent::Start => self.on_start(&mut fx),
            LocationEvent::AuthorizationChanged(status) => self.on_authorization(status, &mut fx),
            LocationEvent::Reading(sample) => self.on_reading(sample, &mut fx),
            LocationEvent::ProviderFailed(reason) => self.on_provider_failed(reason, &mut fx),
            LocationEvent::TimerFired(kind) => self.on_timer(kind, &mut fx),
            LocationEvent::Stop => self.on_stop(&mut fx),
        }
        fx
    }

    fn is_terminal(&self) -> bool {
        matches!(self.state, LocationState::Failed(_) | LocationState::Stopped)
    }

    fn awaiting_restart(&self) -> bool {
        self.armed.contains(&TimerKind::AcquisitionRetry) || self.armed.contains(&TimerKind::Reset)
    }

    fn on_start(&mut self, fx: &mut Vec<LocationEffect>) {
        if self.state != LocationState::Unauthorized {
            return;
        }
        self.state = LocationState::PendingAuthorization;
        fx.push(LocationEffect::RequestAuthorization);
    }

    fn on_authorization(&mut self, status: AuthorizationStatus, fx: &mut Vec<LocationEffect>) {
        if self.is_terminal() {
            return;
        }
        tracing::info!(?status, "Location authorization changed");

        match status {
            AuthorizationStatus::NotDetermined => {
                self.state = LocationState::PendingAuthorization;
                fx.push(LocationEffect::RequestAuthorization);
            }
            AuthorizationStatus::AuthorizedAlways | AuthorizationStatus::AuthorizedWhenInUse => {
                self.authorization_retries = 0;
                self.cancel_timer(TimerKind::AuthorizationRetry, fx);
                if !self.updating && !self.awaiting_restart() {
                    self.state = LocationState::Authorized;
                    self.begin_acquisition(AccuracyTier::Fine, fx);
                }
            }
            AuthorizationStatus::Denied | AuthorizationStatus::Restricted => {
                self.halt_updates(fx);
                self.cancel_timer(TimerKind::Acquisition, fx);
                self.cancel_timer(TimerKind::AcquisitionRetry, fx);
                self.cancel_timer(TimerKind::Reset, fx);
                self.state = if status == AuthorizationStatus::Denied {
                    LocationState::Denied
                } else {
                    LocationState::Restricted
                };
                self.schedule_authorization_retry(fx);
            }
        }
    }

    fn on_reading(&mut self, sample: LocationSample, fx: &mut Vec<LocationEffect>) {
        if !self.updating {
            return;
        }
        if !self.accepts(&sample) {
            tracing::debug!(
                accuracy = sample.horizontal_accuracy,
                "Discarding insufficiently accurate location"
            );
            return;
        }

        self.cancel_timer(TimerKind::Acquisition, fx);
        self.acquisition_retries = 0;
        self.reset_used = false;
        self.state = LocationState::Acquired;
        self.last_published = Some(sample.clone());
        fx.push(LocationEffect::Publish(sample));
    }

    fn accepts(&self, sample: &LocationSample) -> bool {
        let accuracy = sample.horizontal_accuracy;
        if accuracy.is_nan() || accuracy < 0.0 {
            return false;
        }
        if accuracy <= MAX_ACCEPTED_ACCURACY_M {
            return true;
        }
        // On the coarse tier something is better than nothing.
        self.tier == AccuracyTier::Coarse && self.last_published.is_none()
    }

    fn on_provider_failed(&mut self, reason: String, fx: &mut Vec<LocationEffect>) {
        if self.is_terminal() {
            return;
        }
        tracing::warn!(
            retries = self.acquisition_retries,
            "Location acquisition failed: {}",
            reason
        );

        self.halt_updates(fx);
        self.cancel_timer(TimerKind::Acquisition, fx);
        self.last_error = Some(LocationError::AcquisitionFailed(reason.clone()));

        if self.acquisition_retries < MAX_RETRIES {
            self.acquisition_retries += 1;
            self.state = LocationState::Authorized;
            self.start_timer(TimerKind::AcquisitionRetry, RETRY_DELAY, fx);
        } else if !self.reset_used {
            tracing::info!("Location retries exhausted, resetting");
            self.reset_used = true;
            self.state = LocationState::Authorized;
            self.start_timer(TimerKind::Reset, RESET_DELAY, fx);
        } else {
            self.fail(LocationError::AcquisitionFailed(reason), fx);
        }
    }

    fn on_timer(&mut self, kind: TimerKind, fx: &mut Vec<LocationEffect>) {
        // A timer that was cancelled or replaced may still deliver.
        if !self.armed.remove(&kind) || self.is_terminal() {
            return;
        }

        match kind {
            TimerKind::Acquisition => {
                if self.state != LocationState::Acquiring || self.tier != AccuracyTier::Fine {
                    return;
                }
                tracing::info!("No accurate location in time, falling back to coarse accuracy");
                self.last_error = Some(LocationError::AcquisitionTimeout);
                self.halt_updates(fx);
                self.begin_acquisition(AccuracyTier::Coarse, fx);
            }
            TimerKind::AuthorizationRetry => {
                if matches!(self.state, LocationState::Denied | LocationState::Restricted) {
                    self.state = LocationState::PendingAuthorization;
                    fx.push(LocationEffect::RequestAuthorization);
                }
            }
            TimerKind::AcquisitionRetry => self.begin_acquisition(self.tier, fx),
            TimerKind::Reset => {
                self.acquisition_retries = 0;
                self.begin_acquisition(AccuracyTier::Fine, fx);
            }
        }
    }

    fn on_stop(&mut self, fx: &mut Vec<LocationEffect>) {
        self.halt_updates(fx);
        self.cancel_all_timers(fx);
        self.state = LocationState::Stopped;
    }

    fn begin_acquisition(&mut self, tier: AccuracyTier, fx: &mut Vec<LocationEffect>) {
        self.tier = tier;
        fx.push(LocationEffect::SetAccuracy(tier));
        fx.push(LocationEffect::StartUpdates);
        self.updating = true;

        match tier {
            AccuracyTier::Fine => {
                self.state = LocationState::Acquiring;
                self.start_timer(TimerKind::Acquisition, ACQUISITION_TIMEOUT, fx);
            }
            AccuracyTier::Coarse => self.state = LocationState::TimedOut,
        }
    }

    fn schedule_authorization_retry(&mut self, fx: &mut Vec<LocationEffect>) {
        if self.authorization_retries < MAX_RETRIES {
            self.authorization_retries += 1;
            self.start_timer(TimerKind::AuthorizationRetry, RETRY_DELAY, fx);
        } else {
            tracing::warn!("Location permission still denied, giving up");
            self.fail(LocationError::PermissionDenied, fx);
        }
    }

    fn fail(&mut self, error: LocationError, fx: &mut Vec<LocationEffect>) {
        self.halt_updates(fx);
        self.cancel_all_timers(fx);
        self.last_error = Some(error.clone());
        self.state = LocationState::Failed(error);
    }

    fn halt_updates(&mut self, fx: &mut Vec<LocationEffect>) {
        if self.updating {
            self.updating = false;
            fx.push(LocationEffect::StopUpdates);
        }
    }

    fn start_timer(&mut self, kind: TimerKind, after: Duration, fx: &mut Vec<LocationEffect>) {
        self.armed.insert(kind);
        fx.push(LocationEffect::StartTimer(kind, after));
    }

    fn cancel_timer(&mut self, kind: TimerKind, fx: &mut Vec<LocationEffect>) {
        if self.armed.remove(&kind) {
            fx.push(LocationEffect::CancelTimer(kind));
        }
    }

    fn cancel_all_timers(&mut self, fx: &mut Vec<LocationEffect>) {
        for kind in self.armed.drain() {
            fx.push(LocationEffect::CancelTimer(kind));
        }
    }
}
