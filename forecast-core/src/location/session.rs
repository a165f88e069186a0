use std::collections::HashMap;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};

use super::{AccuracyTier, LocationEffect, LocationEngine, LocationEvent, LocationState, TimerKind};
use crate::model::LocationSample;

/// Commands the engine issues to the platform location service.
///
/// Readings, permission changes and errors flow the other way, as
/// [`LocationEvent`]s sent through [`LocationSession::events`].
pub trait LocationProvider: Send + 'static {
    fn request_authorization(&mut self);
    fn set_desired_accuracy(&mut self, tier: AccuracyTier);
    fn start_updates(&mut self);
    fn stop_updates(&mut self);
}

/// Owns a running [`LocationEngine`] and its timers.
///
/// Dropping the session aborts it; [`stop`](Self::stop) shuts it down
/// cleanly and tells the provider to stop updating.
pub struct LocationSession {
    events: mpsc::UnboundedSender<LocationEvent>,
    readings: watch::Receiver<Option<LocationSample>>,
    state: watch::Receiver<LocationState>,
    task: Option<JoinHandle<()>>,
}

impl LocationSession {
    /// Spawn the driver and kick off the permission request.
    pub fn start<P: LocationProvider>(provider: P) -> Self {
        let (events, inbox) = mpsc::unbounded_channel();
        let (readings_tx, readings) = watch::channel(None);
        let (state_tx, state) = watch::channel(LocationState::Unauthorized);

        let driver = Driver {
            engine: LocationEngine::new(),
            provider,
            timers: HashMap::new(),
            events: events.clone(),
            readings: readings_tx,
            state: state_tx,
        };
        let task = tokio::spawn(driver.run(inbox));

        let _ = events.send(LocationEvent::Start);
        Self {
            events,
            readings,
            state,
            task: Some(task),
        }
    }

    /// Sender for platform callbacks (readings, permission changes, errors).
    pub fn events(&self) -> mpsc::UnboundedSender<LocationEvent> {
        self.events.clone()
    }

    /// Latest accepted reading. Feed this to
    /// [`WeatherAggregator::follow`](crate::WeatherAggregator::follow).
    pub fn readings(&self) -> watch::Receiver<Option<LocationSample>> {
        self.readings.clone()
    }

    pub fn state_updates(&self) -> watch::Receiver<LocationState> {
        self.state.clone()
    }

    pub fn state(&self) -> LocationState {
        self.state.borrow().clone()
    }

    pub async fn stop(mut self) {
        let _ = self.events.send(LocationEvent::Stop);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!("Location session ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for LocationSession {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

struct Driver<P> {
    engine: LocationEngine,
    provider: P,
    timers: HashMap<TimerKind, JoinHandle<()>>,
    events: mpsc::UnboundedSender<LocationEvent>,
    readings: watch::Sender<Option<LocationSample>>,
    state: watch::Sender<LocationState>,
}

impl<P: LocationProvider> Driver<P> {
    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<LocationEvent>) {
        while let Some(event) = inbox.recv().await {
            let stopping = matches!(event, LocationEvent::Stop);

            for effect in self.engine.handle(event) {
                self.apply(effect);
            }
            let current = self.engine.state();
            self.state.send_if_modified(|state| {
                if *state == *current {
                    return false;
                }
                *state = current.clone();
                true
            });

            if stopping {
                break;
            }
        }

        for (_, timer) in self.timers.drain() {
            timer.abort();
        }
        tracing::debug!("Location session finished");
    }

    fn apply(&mut self, effect: LocationEffect) {
        match effect {
            LocationEffect::RequestAuthorization => self.provider.request_authorization(),
            LocationEffect::SetAccuracy(tier) => self.provider.set_desired_accuracy(tier),
            LocationEffect::StartUpdates => self.provider.start_updates(),
            LocationEffect::StopUpdates => self.provider.stop_updates(),
            LocationEffect::StartTimer(kind, after) => {
                let events = self.events.clone();
                let timer = tokio::spawn(async move {
                    tokio::time::sleep(after).await;
                    let _ = events.send(LocationEvent::TimerFired(kind));
                });
                if let Some(previous) = self.timers.insert(kind, timer) {
                    previous.abort();
                }
            }
            LocationEffect::CancelTimer(kind) => {
                if let Some(timer) = self.timers.remove(&kind) {
                    timer.abort();
                }
            }
            LocationEffect::Publish(sample) => {
                tracing::info!(
                    coordinate = %sample.coordinate,
                    accuracy = sample.horizontal_accuracy,
                    "Location updated"
                );
                self.readings.send_replace(Some(sample));
            }
        }
    }
}
