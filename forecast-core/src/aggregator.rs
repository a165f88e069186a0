//! Two-feed fetch, merge, cache and favorites.
//!
//! The aggregator publishes a [`WeatherState`] through a `watch` channel.
//! Consumers either [`subscribe`](WeatherAggregator::subscribe) and react to
//! changes or poll [`state`](WeatherAggregator::state).
//!
//! Failures never escape: a failed stage is logged and leaves the previously
//! published values in place, so the worst case is "no data yet". Published
//! weather always belongs to a single coordinate.

use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use tokio::{sync::watch, task::JoinHandle};

use crate::{
    model::{
        Coordinate, CurrentConditions, DailyForecastEntry, FavoriteLocation, ForecastSnapshot,
        HourlyForecastEntry, LocationSample, upcoming_days,
    },
    provider::WeatherSource,
    store::{
        self, CURRENT_WEATHER_KEY, FAVORITES_KEY, FORECAST_KEY, HOURLY_FORECAST_KEY,
        KeyValueStore, LAST_UPDATE_KEY, WEATHER_LOCATION_KEY,
    },
};

/// Cached data younger than this is shown without a refresh.
pub const FRESHNESS_WINDOW_SECS: i64 = 3600;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeatherState {
    /// Coordinate the weather fields below were fetched for.
    pub location: Option<Coordinate>,
    pub current: Option<CurrentConditions>,
    /// Upcoming days; today is represented by `current`.
    pub forecast: Vec<DailyForecastEntry>,
    pub hourly: Vec<HourlyForecastEntry>,
    pub last_updated: Option<DateTime<Utc>>,
    pub favorites: Vec<FavoriteLocation>,
}

impl WeatherState {
    fn snapshot(&self, last_updated: DateTime<Utc>) -> Option<ForecastSnapshot> {
        Some(ForecastSnapshot {
            location: self.location?,
            current: self.current.clone()?,
            forecast: self.forecast.clone(),
            hourly: self.hourly.clone(),
            last_updated,
        })
    }

    /// Weather for another coordinate is arriving. Nothing published for
    /// the previous one may be mixed with it.
    fn retarget(&mut self, coordinate: Coordinate) {
        if self.location != Some(coordinate) {
            self.location = Some(coordinate);
            self.current = None;
            self.forecast.clear();
            self.hourly.clear();
            self.last_updated = None;
        }
    }
}

/// Which stages of a refresh succeeded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOutcome {
    /// Current conditions and daily forecast.
    pub one_call: bool,
    pub hourly: bool,
}

impl FetchOutcome {
    pub fn is_complete(&self) -> bool {
        self.one_call && self.hourly
    }
}

/// `true` iff there is a last update and it is less than an hour old.
pub fn is_fresh(last_updated: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    last_updated.is_some_and(|at| now - at < TimeDelta::seconds(FRESHNESS_WINDOW_SECS))
}

pub struct WeatherAggregator {
    source: Arc<dyn WeatherSource>,
    store: Arc<dyn KeyValueStore>,
    state: watch::Sender<WeatherState>,
}

impl WeatherAggregator {
    /// Build an aggregator and hydrate it from the store.
    ///
    /// Cached weather is loaded whether or not it is fresh: a stale cache is
    /// still worth showing while the caller refreshes. Favorites are always
    /// loaded.
    pub fn new(source: Arc<dyn WeatherSource>, store: Arc<dyn KeyValueStore>) -> Self {
        let initial = load_state(store.as_ref());
        let (state, _) = watch::channel(initial);
        Self {
            source,
            store,
            state,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<WeatherState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> WeatherState {
        self.state.borrow().clone()
    }

    /// Whether the published weather is fresh, for whatever coordinate it
    /// was fetched for.
    pub fn is_data_fresh(&self) -> bool {
        is_fresh(self.state.borrow().last_updated, Utc::now())
    }

    /// Like [`is_data_fresh`](Self::is_data_fresh), but also requires the
    /// published weather to belong to `coordinate`.
    pub fn is_fresh_for(&self, coordinate: Coordinate) -> bool {
        let state = self.state.borrow();
        state.location == Some(coordinate) && is_fresh(state.last_updated, Utc::now())
    }

    /// Refresh both feeds for `coordinate`.
    ///
    /// The hourly feed is requested even when the one-call feed fails. The
    /// snapshot is stamped only once both stages succeeded and it was
    /// written to the store.
    pub async fn fetch_weather(&self, coordinate: Coordinate) -> FetchOutcome {
        let mut outcome = FetchOutcome::default();

        match self.source.one_call(coordinate).await {
            Ok(data) => {
                let forecast = upcoming_days(&data.daily);
                tracing::debug!(days = forecast.len(), "One-call feed received");
                self.state.send_modify(|state| {
                    state.retarget(coordinate);
                    state.current = Some(data.current);
                    state.forecast = forecast;
                });
                outcome.one_call = true;
            }
            Err(e) => tracing::warn!(%coordinate, "One-call fetch failed: {}", e),
        }

        match self.source.hourly(coordinate).await {
            Ok(feed) => {
                let hourly: Vec<HourlyForecastEntry> =
                    feed.list.iter().map(HourlyForecastEntry::from).collect();
                tracing::debug!(entries = hourly.len(), "Hourly feed received");
                self.state.send_modify(|state| {
                    state.retarget(coordinate);
                    state.hourly = hourly;
                });
                outcome.hourly = true;
            }
            Err(e) => tracing::warn!(%coordinate, "Hourly fetch failed: {}", e),
        }

        if outcome.is_complete() {
            self.persist_snapshot(Utc::now());
        }

        tracing::info!(
            %coordinate,
            one_call = outcome.one_call,
            hourly = outcome.hourly,
            "Weather refresh finished"
        );
        outcome
    }

    /// Fetch unless the published weather is fresh and for `coordinate`.
    /// Returns `None` if the cache was used.
    pub async fn refresh_if_stale(&self, coordinate: Coordinate) -> Option<FetchOutcome> {
        if self.is_fresh_for(coordinate) {
            tracing::debug!(%coordinate, "Cached weather is fresh, skipping refresh");
            return None;
        }
        Some(self.fetch_weather(coordinate).await)
    }

    /// Run [`fetch_weather`](Self::fetch_weather) as its own task. Aborting
    /// the handle cancels the refresh.
    pub fn spawn_fetch(self: &Arc<Self>, coordinate: Coordinate) -> JoinHandle<FetchOutcome> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.fetch_weather(coordinate).await })
    }

    /// Refresh every time a new location is published. Ends when the sender
    /// side of `locations` is dropped.
    pub fn follow(
        self: &Arc<Self>,
        mut locations: watch::Receiver<Option<LocationSample>>,
    ) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let sample = locations.borrow_and_update().clone();
                if let Some(sample) = sample {
                    this.fetch_weather(sample.coordinate).await;
                }
                if locations.changed().await.is_err() {
                    break;
                }
            }
        })
    }

    pub fn favorites(&self) -> Vec<FavoriteLocation> {
        self.state.borrow().favorites.clone()
    }

    /// Returns `false` if the location was already a favorite or is not a
    /// valid coordinate.
    pub fn add_to_favorites(&self, location: impl Into<Coordinate>) -> bool {
        self.add_favorite(None, location.into())
    }

    pub fn add_named_favorite(&self, name: impl Into<String>, coordinate: Coordinate) -> bool {
        self.add_favorite(Some(name.into()), coordinate)
    }

    /// Removes every favorite at this coordinate. Returns `true` if any were removed.
    pub fn remove_from_favorites(&self, location: impl Into<Coordinate>) -> bool {
        let coordinate = location.into();
        let removed = self.state.send_if_modified(|state| {
            let before = state.favorites.len();
            state.favorites.retain(|f| f.coordinate != coordinate);
            state.favorites.len() != before
        });
        self.persist_favorites();
        removed
    }

    pub fn is_favorited(&self, location: impl Into<Coordinate>) -> bool {
        let coordinate = location.into();
        self.state
            .borrow()
            .favorites
            .iter()
            .any(|f| f.coordinate == coordinate)
    }

    pub fn has_favorites(&self) -> bool {
        !self.state.borrow().favorites.is_empty()
    }

    fn add_favorite(&self, name: Option<String>, coordinate: Coordinate) -> bool {
        // NaN never compares equal and encodes as null, which breaks both
        // deduplication and reloading the list.
        if !coordinate.is_valid() {
            tracing::warn!(?coordinate, "Refusing to add invalid coordinate to favorites");
            return false;
        }

        let added = self.state.send_if_modified(|state| {
            if state.favorites.iter().any(|f| f.coordinate == coordinate) {
                return false;
            }
            state.favorites.push(FavoriteLocation::new(name, coordinate));
            true
        });
        if added {
            self.persist_favorites();
        }
        added
    }

    fn persist_favorites(&self) {
        let favorites = self.favorites();
        if let Err(e) = store::save_json(self.store.as_ref(), FAVORITES_KEY, &favorites) {
            tracing::warn!("Failed to persist favorites: {:#}", e);
        }
    }

    /// Write the published weather as one snapshot and stamp it `now`.
    /// Nothing is stamped unless every entry reached the store.
    fn persist_snapshot(&self, now: DateTime<Utc>) {
        let Some(snapshot) = self.state.borrow().snapshot(now) else {
            return;
        };

        let encoded = [
            (WEATHER_LOCATION_KEY, serde_json::to_vec(&snapshot.location)),
            (CURRENT_WEATHER_KEY, serde_json::to_vec(&snapshot.current)),
            (FORECAST_KEY, serde_json::to_vec(&snapshot.forecast)),
            (HOURLY_FORECAST_KEY, serde_json::to_vec(&snapshot.hourly)),
            (LAST_UPDATE_KEY, serde_json::to_vec(&snapshot.last_updated)),
        ];
        let entries: Result<Vec<_>, _> = encoded
            .into_iter()
            .map(|(key, bytes)| bytes.map(|bytes| (key, bytes)))
            .collect();
        let entries = match entries {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Failed to encode forecast snapshot, cache left unchanged: {}", e);
                return;
            }
        };

        if let Err(e) = store::write_batch(self.store.as_ref(), entries) {
            tracing::warn!("Failed to persist forecast snapshot: {:#}", e);
            return;
        }

        self.state.send_modify(|state| state.last_updated = Some(now));
    }
}

fn load_state(store: &dyn KeyValueStore) -> WeatherState {
    let last_updated: Option<DateTime<Utc>> = store::load_json(store, LAST_UPDATE_KEY);
    if !is_fresh(last_updated, Utc::now()) {
        tracing::info!(?last_updated, "Cached weather is stale or missing");
    }

    WeatherState {
        location: store::load_json(store, WEATHER_LOCATION_KEY),
        current: store::load_json(store, CURRENT_WEATHER_KEY),
        forecast: store::load_json(store, FORECAST_KEY).unwrap_or_default(),
        hourly: store::load_json(store, HOURLY_FORECAST_KEY).unwrap_or_default(),
        last_updated,
        favorites: store::load_json(store, FAVORITES_KEY).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::FetchError,
        model::{HourlyFeed, HourlyItem, HourlyMain, HourlyWind, OneCallResponse, fixtures},
        store::{MemoryStore, load_json, save_json},
    };
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct StubSource {
        one_call: Mutex<Option<OneCallResponse>>,
        hourly: Mutex<Option<HourlyFeed>>,
        calls: AtomicUsize,
    }

    impl StubSource {
        fn serving(one_call: Option<OneCallResponse>, hourly: Option<HourlyFeed>) -> Arc<Self> {
            Arc::new(Self {
                one_call: Mutex::new(one_call),
                hourly: Mutex::new(hourly),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl WeatherSource for StubSource {
        async fn one_call(&self, _: Coordinate) -> Result<OneCallResponse, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.one_call
                .lock()
                .clone()
                .ok_or_else(|| FetchError::InvalidResponse("offline".into()))
        }

        async fn hourly(&self, _: Coordinate) -> Result<HourlyFeed, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.hourly
                .lock()
                .clone()
                .ok_or_else(|| FetchError::InvalidResponse("offline".into()))
        }
    }

    /// Reads fine, refuses every write.
    #[derive(Debug, Default)]
    struct ReadOnlyStore(MemoryStore);

    impl KeyValueStore for ReadOnlyStore {
        fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
            self.0.get(key)
        }

        fn set(&self, key: &str, _: Vec<u8>) -> anyhow::Result<()> {
            anyhow::bail!("read-only store, cannot write '{key}'")
        }

        fn remove(&self, key: &str) -> anyhow::Result<()> {
            anyhow::bail!("read-only store, cannot remove '{key}'")
        }
    }

    fn one_call(temperature: f64, days: usize) -> OneCallResponse {
        OneCallResponse {
            current: fixtures::current(temperature),
            daily: fixtures::days(days),
        }
    }

    fn hourly_feed(weather_lists: Vec<Vec<crate::model::WeatherCondition>>) -> HourlyFeed {
        HourlyFeed {
            list: weather_lists
                .into_iter()
                .enumerate()
                .map(|(i, weather)| HourlyItem {
                    dt: 1_737_810_800 + i as i64 * 10_800,
                    main: HourlyMain {
                        temp: 5.0 + i as f64,
                    },
                    weather,
                    wind: HourlyWind {
                        speed: 3.0,
                        deg: 180,
                    },
                })
                .collect(),
        }
    }

    fn aggregator(source: Arc<StubSource>) -> (WeatherAggregator, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (WeatherAggregator::new(source, store.clone()), store)
    }

    const HERE: Coordinate = Coordinate {
        latitude: 52.37,
        longitude: 4.89,
    };
    const SYDNEY: Coordinate = Coordinate {
        latitude: -33.87,
        longitude: 151.21,
    };

    #[test]
    fn freshness_window_boundaries() {
        let now = Utc::now();

        assert!(!is_fresh(None, now));
        assert!(is_fresh(Some(now - TimeDelta::seconds(3599)), now));
        assert!(!is_fresh(Some(now - TimeDelta::seconds(3600)), now));
        assert!(!is_fresh(Some(now - TimeDelta::seconds(7200)), now));
    }

    #[test]
    fn new_aggregator_without_cache_is_not_fresh() {
        let (agg, _) = aggregator(StubSource::serving(None, None));

        assert!(!agg.is_data_fresh());
        assert_eq!(agg.state(), WeatherState::default());
    }

    #[tokio::test]
    async fn fetch_merges_both_feeds_and_persists() {
        let source = StubSource::serving(
            Some(one_call(8.5, 8)),
            Some(hourly_feed(vec![vec![fixtures::condition(500, "Rain")], vec![]])),
        );
        let (agg, store) = aggregator(source.clone());

        let outcome = agg.fetch_weather(HERE).await;

        assert!(outcome.is_complete());
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);

        let state = agg.state();
        assert_eq!(state.location, Some(HERE));
        assert_eq!(state.current, Some(fixtures::current(8.5)));
        assert_eq!(state.forecast, fixtures::days(8)[1..]);
        assert_eq!(state.hourly.len(), 2);
        assert_eq!(state.hourly[0].weather.main, "Rain");
        assert_eq!(state.hourly[1].weather, crate::model::WeatherCondition::unknown());
        assert!(agg.is_data_fresh());
        assert!(agg.is_fresh_for(HERE));

        let cached: Option<CurrentConditions> = load_json(store.as_ref(), CURRENT_WEATHER_KEY);
        assert_eq!(cached, state.current);
        let stamp: Option<DateTime<Utc>> = load_json(store.as_ref(), LAST_UPDATE_KEY);
        assert_eq!(stamp, state.last_updated);
        let location: Option<Coordinate> = load_json(store.as_ref(), WEATHER_LOCATION_KEY);
        assert_eq!(location, Some(HERE));
        let hourly: Option<Vec<HourlyForecastEntry>> =
            load_json(store.as_ref(), HOURLY_FORECAST_KEY);
        assert_eq!(hourly, Some(state.hourly));
    }

    #[tokio::test]
    async fn single_daily_entry_yields_empty_forecast() {
        let source = StubSource::serving(Some(one_call(3.0, 1)), Some(hourly_feed(vec![])));
        let (agg, _) = aggregator(source);

        agg.fetch_weather(HERE).await;

        assert!(agg.state().current.is_some());
        assert!(agg.state().forecast.is_empty());
    }

    #[tokio::test]
    async fn failed_one_call_still_fetches_hourly_but_does_not_persist() {
        let source = StubSource::serving(None, Some(hourly_feed(vec![vec![]])));
        let (agg, store) = aggregator(source.clone());

        let outcome = agg.fetch_weather(HERE).await;

        assert_eq!(
            outcome,
            FetchOutcome {
                one_call: false,
                hourly: true,
            }
        );
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(agg.state().hourly.len(), 1);
        assert!(agg.state().current.is_none());
        assert!(agg.state().last_updated.is_none());
        assert!(!store.contains(HOURLY_FORECAST_KEY));
        assert!(!store.contains(LAST_UPDATE_KEY));
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_state() {
        let source = StubSource::serving(Some(one_call(8.5, 3)), Some(hourly_feed(vec![vec![]])));
        let (agg, _) = aggregator(source.clone());
        agg.fetch_weather(HERE).await;
        let before = agg.state();

        *source.one_call.lock() = None;
        *source.hourly.lock() = None;
        let outcome = agg.fetch_weather(HERE).await;

        assert_eq!(outcome, FetchOutcome::default());
        assert_eq!(agg.state(), before);
    }

    #[tokio::test]
    async fn failed_store_write_leaves_data_unstamped() {
        let source = StubSource::serving(Some(one_call(8.5, 3)), Some(hourly_feed(vec![])));
        let agg = WeatherAggregator::new(source, Arc::new(ReadOnlyStore::default()));

        let outcome = agg.fetch_weather(HERE).await;

        assert!(outcome.is_complete());
        assert_eq!(agg.state().current, Some(fixtures::current(8.5)));
        assert!(agg.state().last_updated.is_none());
        assert!(!agg.is_data_fresh());
    }

    #[tokio::test]
    async fn subscribers_see_published_weather() {
        let source = StubSource::serving(Some(one_call(12.0, 2)), Some(hourly_feed(vec![])));
        let (agg, _) = aggregator(source);
        let mut rx = agg.subscribe();

        let handle = Arc::new(agg).spawn_fetch(HERE);
        rx.changed().await.unwrap();
        handle.await.unwrap();

        assert_eq!(rx.borrow().current.as_ref().map(|c| c.temperature), Some(12.0));
    }

    #[tokio::test]
    async fn follow_refreshes_on_new_location() {
        let source = StubSource::serving(Some(one_call(1.0, 2)), Some(hourly_feed(vec![])));
        let (agg, _) = aggregator(source.clone());
        let agg = Arc::new(agg);
        let (tx, rx) = watch::channel(None);

        let task = agg.follow(rx);
        tx.send(Some(LocationSample::at(HERE, 20.0))).unwrap();
        drop(tx);
        task.await.unwrap();

        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert!(agg.state().current.is_some());
    }

    #[tokio::test]
    async fn refresh_if_stale_uses_fresh_cache() {
        let source = StubSource::serving(Some(one_call(1.0, 2)), Some(hourly_feed(vec![])));
        let (agg, _) = aggregator(source.clone());

        assert!(agg.refresh_if_stale(HERE).await.is_some());
        assert!(agg.refresh_if_stale(HERE).await.is_none());
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fresh_cache_for_another_coordinate_is_refetched() {
        let source = StubSource::serving(Some(one_call(10.0, 2)), Some(hourly_feed(vec![])));
        let (agg, _) = aggregator(source.clone());
        agg.fetch_weather(HERE).await;
        assert!(!agg.is_fresh_for(SYDNEY));

        *source.one_call.lock() = Some(one_call(24.0, 2));
        let outcome = agg.refresh_if_stale(SYDNEY).await;

        assert_eq!(outcome.map(|o| o.is_complete()), Some(true));
        assert_eq!(source.calls.load(Ordering::SeqCst), 4);
        let state = agg.state();
        assert_eq!(state.location, Some(SYDNEY));
        assert_eq!(state.current.map(|c| c.temperature), Some(24.0));
        assert!(agg.is_fresh_for(SYDNEY));
        assert!(!agg.is_fresh_for(HERE));
    }

    #[tokio::test]
    async fn partial_refresh_for_new_coordinate_drops_old_weather() {
        let source = StubSource::serving(Some(one_call(10.0, 4)), Some(hourly_feed(vec![vec![]])));
        let (agg, store) = aggregator(source.clone());
        agg.fetch_weather(HERE).await;

        *source.one_call.lock() = None;
        agg.fetch_weather(SYDNEY).await;

        let state = agg.state();
        assert_eq!(state.location, Some(SYDNEY));
        assert!(state.current.is_none());
        assert!(state.forecast.is_empty());
        assert_eq!(state.hourly.len(), 1);
        assert!(!agg.is_data_fresh());
        let location: Option<Coordinate> = load_json(store.as_ref(), WEATHER_LOCATION_KEY);
        assert_eq!(location, Some(HERE));
    }

    #[test]
    fn startup_loads_stale_cache_and_favorites() {
        let store = Arc::new(MemoryStore::new());
        let stale = Utc::now() - TimeDelta::hours(5);
        let favorites = vec![FavoriteLocation::new(None, HERE)];
        save_json(store.as_ref(), WEATHER_LOCATION_KEY, &HERE).unwrap();
        save_json(store.as_ref(), CURRENT_WEATHER_KEY, &fixtures::current(4.0)).unwrap();
        save_json(store.as_ref(), FORECAST_KEY, &fixtures::days(2)).unwrap();
        save_json(store.as_ref(), HOURLY_FORECAST_KEY, &fixtures::hourly(3)).unwrap();
        save_json(store.as_ref(), LAST_UPDATE_KEY, &stale).unwrap();
        save_json(store.as_ref(), FAVORITES_KEY, &favorites).unwrap();

        let agg = WeatherAggregator::new(StubSource::serving(None, None), store);

        assert!(!agg.is_data_fresh());
        let state = agg.state();
        assert_eq!(state.location, Some(HERE));
        assert_eq!(state.current, Some(fixtures::current(4.0)));
        assert_eq!(state.forecast.len(), 2);
        assert_eq!(state.hourly, fixtures::hourly(3));
        assert_eq!(state.last_updated, Some(stale));
        assert!(agg.is_favorited(HERE));
    }

    #[test]
    fn startup_without_cached_location_is_not_fresh_for_any_coordinate() {
        let store = Arc::new(MemoryStore::new());
        save_json(store.as_ref(), CURRENT_WEATHER_KEY, &fixtures::current(4.0)).unwrap();
        save_json(store.as_ref(), LAST_UPDATE_KEY, &Utc::now()).unwrap();

        let agg = WeatherAggregator::new(StubSource::serving(None, None), store);

        assert!(agg.is_data_fresh());
        assert!(!agg.is_fresh_for(HERE));
    }

    #[test]
    fn startup_tolerates_corrupt_cache() {
        let store = Arc::new(MemoryStore::new());
        store.set(CURRENT_WEATHER_KEY, b"garbage".to_vec()).unwrap();
        store.set(FAVORITES_KEY, b"[{]".to_vec()).unwrap();

        let agg = WeatherAggregator::new(StubSource::serving(None, None), store);

        assert!(agg.state().current.is_none());
        assert!(!agg.has_favorites());
    }

    #[test]
    fn add_to_favorites_is_idempotent_on_coordinate() {
        let (agg, store) = aggregator(StubSource::serving(None, None));
        let sample = LocationSample::at(HERE, 15.0);

        assert!(!agg.has_favorites());
        assert!(agg.add_to_favorites(&sample));
        assert!(agg.is_favorited(&sample));

        let mut moved = sample.clone();
        moved.altitude = 300.0;
        assert!(!agg.add_to_favorites(&moved));
        assert!(!agg.add_named_favorite("Home", HERE));

        assert_eq!(agg.favorites().len(), 1);
        let persisted: Option<Vec<FavoriteLocation>> = load_json(store.as_ref(), FAVORITES_KEY);
        assert_eq!(persisted.map(|f| f.len()), Some(1));
    }

    #[test]
    fn invalid_coordinates_never_reach_favorites() {
        let (agg, store) = aggregator(StubSource::serving(None, None));
        agg.add_named_favorite("Home", HERE);

        assert!(!agg.add_to_favorites(Coordinate::new(f64::NAN, 0.0)));
        assert!(!agg.add_to_favorites(Coordinate::new(f64::NAN, 0.0)));
        assert!(!agg.add_named_favorite("Nowhere", Coordinate::new(0.0, f64::INFINITY)));
        assert!(!agg.add_to_favorites(Coordinate::new(91.0, 0.0)));
        assert_eq!(agg.favorites().len(), 1);

        let reloaded = WeatherAggregator::new(StubSource::serving(None, None), store);
        assert_eq!(reloaded.favorites().len(), 1);
        assert!(reloaded.is_favorited(HERE));
    }

    #[test]
    fn remove_from_favorites_updates_store() {
        let (agg, store) = aggregator(StubSource::serving(None, None));
        let other = Coordinate::new(48.85, 2.35);
        agg.add_named_favorite("Home", HERE);
        agg.add_to_favorites(other);

        assert!(agg.remove_from_favorites(HERE));
        assert!(!agg.is_favorited(HERE));
        assert!(agg.is_favorited(other));
        assert!(!agg.remove_from_favorites(HERE));

        let persisted: Vec<FavoriteLocation> = load_json(store.as_ref(), FAVORITES_KEY).unwrap();
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].coordinate, other);
    }

    #[test]
    fn favorites_keep_insertion_order() {
        let (agg, _) = aggregator(StubSource::serving(None, None));
        let coords = [
            Coordinate::new(1.0, 1.0),
            Coordinate::new(-3.0, 2.0),
            Coordinate::new(0.5, 9.0),
        ];
        for c in coords {
            agg.add_to_favorites(c);
        }

        let listed: Vec<Coordinate> = agg.favorites().iter().map(|f| f.coordinate).collect();
        assert_eq!(listed, coords);
    }
}
