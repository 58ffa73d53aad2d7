//! Data behind the dashboard view.
//!
//! Two independent slots, the energy series and the statistics summary, each
//! hold a [`FetchResult`]. Every fetch takes a ticket when it is issued; a
//! result is applied only if its ticket is still the newest one for the slot,
//! so a slow response for an old period can never overwrite a newer one.

use parking_lot::Mutex;

use crate::types::{EnergyPoint, Period, Statistics};
use crate::{Error, WattsonClient};

/// State of one asynchronous request.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchResult<T> {
    Pending,
    Success(T),
    /// User-facing reason
    Failure(String),
}

impl<T> FetchResult<T> {
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    pub const fn success(&self) -> Option<&T> {
        match self {
            Self::Success(value) => Some(value),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&str> {
        match self {
            Self::Failure(reason) => Some(reason),
            _ => None,
        }
    }

    fn from_result(result: Result<T, Error>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(err) => Self::Failure(err.message().to_string()),
        }
    }
}

/// Issued with every energy-series request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnergyTicket {
    seq: u64,
    period: Period,
}

impl EnergyTicket {
    pub const fn period(self) -> Period {
        self.period
    }
}

/// Issued with every statistics request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatisticsTicket {
    seq: u64,
}

/// What the dashboard shows as a whole.
#[derive(Debug, Clone, PartialEq)]
pub enum DashboardView {
    Loading,
    /// One of the slots failed; no data is shown.
    Failed(String),
    Ready {
        period: Period,
        energy: Vec<EnergyPoint>,
        statistics: Statistics,
    },
}

#[derive(Debug, Clone)]
pub struct DashboardState {
    period: Period,
    energy: FetchResult<Vec<EnergyPoint>>,
    statistics: FetchResult<Statistics>,
    energy_seq: u64,
    statistics_seq: u64,
}

impl DashboardState {
    /// Both slots start pending: nothing has been loaded yet.
    pub const fn new(period: Period) -> Self {
        Self {
            period,
            energy: FetchResult::Pending,
            statistics: FetchResult::Pending,
            energy_seq: 0,
            statistics_seq: 0,
        }
    }

    /// Marks the energy slot pending for `period` and hands out the ticket
    /// the response must present.
    pub fn begin_energy(&mut self, period: Period) -> EnergyTicket {
        self.energy_seq += 1;
        self.period = period;
        self.energy = FetchResult::Pending;
        EnergyTicket {
            seq: self.energy_seq,
            period,
        }
    }

    pub fn begin_statistics(&mut self) -> StatisticsTicket {
        self.statistics_seq += 1;
        self.statistics = FetchResult::Pending;
        StatisticsTicket {
            seq: self.statistics_seq,
        }
    }

    /// Applies an energy response. Returns `false` when the ticket is stale
    /// and the response was dropped.
    pub fn resolve_energy(
        &mut self,
        ticket: EnergyTicket,
        result: Result<Vec<EnergyPoint>, Error>,
    ) -> bool {
        if ticket.seq != self.energy_seq || ticket.period != self.period {
            return false;
        }
        self.energy = FetchResult::from_result(result);
        true
    }

    /// Applies a statistics response. Returns `false` when the ticket is
    /// stale and the response was dropped.
    pub fn resolve_statistics(
        &mut self,
        ticket: StatisticsTicket,
        result: Result<Statistics, Error>,
    ) -> bool {
        if ticket.seq != self.statistics_seq {
            return false;
        }
        self.statistics = FetchResult::from_result(result);
        true
    }

    pub const fn period(&self) -> Period {
        self.period
    }

    pub const fn energy(&self) -> &FetchResult<Vec<EnergyPoint>> {
        &self.energy
    }

    pub const fn statistics(&self) -> &FetchResult<Statistics> {
        &self.statistics
    }

    /// True while either slot is pending.
    pub const fn is_loading(&self) -> bool {
        self.energy.is_pending() || self.statistics.is_pending()
    }

    pub fn view(&self) -> DashboardView {
        if self.is_loading() {
            return DashboardView::Loading;
        }
        match (&self.energy, &self.statistics) {
            (FetchResult::Success(energy), FetchResult::Success(statistics)) => {
                DashboardView::Ready {
                    period: self.period,
                    energy: energy.clone(),
                    statistics: statistics.clone(),
                }
            }
            (energy, statistics) => DashboardView::Failed(
                energy
                    .failure()
                    .or_else(|| statistics.failure())
                    .unwrap_or_default()
                    .to_string(),
            ),
        }
    }
}

/// Drives the two dashboard fetches against the gateway.
///
/// All work happens on the caller's task; the state lock is never held
/// across an await.
pub struct DashboardCoordinator {
    client: WattsonClient,
    state: Mutex<DashboardState>,
}

impl DashboardCoordinator {
    pub fn new(client: WattsonClient, period: Period) -> Self {
        Self {
            client,
            state: Mutex::new(DashboardState::new(period)),
        }
    }

    /// Initial load: both slots, concurrently.
    pub async fn mount(&self) {
        self.reload_all().await;
    }

    /// User-triggered retry of both slots.
    pub async fn refresh(&self) {
        self.reload_all().await;
    }

    /// Switches the energy series to `period`. Statistics are left alone.
    /// Selecting the period already shown does nothing.
    pub async fn set_period(&self, period: Period) {
        let ticket = {
            let mut state = self.state.lock();
            if state.period == period {
                return;
            }
            state.begin_energy(period)
        };
        self.fetch_energy(ticket).await;
    }

    async fn reload_all(&self) {
        let (energy, statistics) = {
            let mut state = self.state.lock();
            let period = state.period;
            (state.begin_energy(period), state.begin_statistics())
        };
        tokio::join!(self.fetch_energy(energy), self.fetch_statistics(statistics));
    }

    async fn fetch_energy(&self, ticket: EnergyTicket) {
        let result = self.client.get_energy_data(ticket.period).await;
        let applied = self.state.lock().resolve_energy(ticket, result);
        if !applied {
            tracing::debug!(
                period = %ticket.period,
                seq = ticket.seq,
                "dropping stale energy data"
            );
        }
    }

    async fn fetch_statistics(&self, ticket: StatisticsTicket) {
        let result = self.client.get_statistics().await;
        let applied = self.state.lock().resolve_statistics(ticket, result);
        if !applied {
            tracing::debug!(seq = ticket.seq, "dropping stale statistics");
        }
    }

    pub fn snapshot(&self) -> DashboardState {
        self.state.lock().clone()
    }

    pub fn view(&self) -> DashboardView {
        self.state.lock().view()
    }

    pub fn is_loading(&self) -> bool {
        self.state.lock().is_loading()
    }

    pub fn period(&self) -> Period {
        self.state.lock().period
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Peak;

    fn points(label: &str) -> Vec<EnergyPoint> {
        vec![EnergyPoint {
            consumption: 12.5,
            name: Some(label.to_string()),
            hour: None,
        }]
    }

    fn statistics() -> Statistics {
        Statistics {
            total_consumption: 120.0,
            average_daily: 4.0,
            peak_consumption: Peak {
                value: 9.5,
                timestamp: None,
            },
            estimated_cost: 14.4,
        }
    }

    fn rejected(message: &str) -> Error {
        Error::Rejected {
            status: 400,
            message: message.to_string(),
        }
    }

    #[test]
    fn starts_loading() {
        let state = DashboardState::new(Period::Monthly);
        assert!(state.is_loading());
        assert_eq!(state.view(), DashboardView::Loading);
    }

    #[test]
    fn loading_until_both_slots_resolve() {
        let mut state = DashboardState::new(Period::Monthly);
        let energy = state.begin_energy(Period::Monthly);
        let stats = state.begin_statistics();

        assert!(state.resolve_statistics(stats, Ok(statistics())));
        assert!(state.is_loading());

        assert!(state.resolve_energy(energy, Ok(points("Jan"))));
        assert!(!state.is_loading());
        assert!(matches!(state.view(), DashboardView::Ready { .. }));
    }

    #[test]
    fn failure_also_ends_loading() {
        let mut state = DashboardState::new(Period::Monthly);
        let energy = state.begin_energy(Period::Monthly);
        let stats = state.begin_statistics();

        state.resolve_energy(energy, Err(rejected("Invalid period")));
        assert!(state.is_loading());
        state.resolve_statistics(stats, Ok(statistics()));

        assert!(!state.is_loading());
        assert_eq!(state.view(), DashboardView::Failed("Invalid period".to_string()));
    }

    #[test]
    fn newer_period_wins_regardless_of_resolution_order() {
        let mut state = DashboardState::new(Period::Monthly);
        let daily = state.begin_energy(Period::Daily);
        let monthly = state.begin_energy(Period::Monthly);

        assert!(state.resolve_energy(monthly, Ok(points("Jan"))));
        assert!(!state.resolve_energy(daily, Ok(points("01 Jan"))));

        assert_eq!(state.period(), Period::Monthly);
        assert_eq!(state.energy().success(), Some(&points("Jan")));
    }

    #[test]
    fn stale_failure_is_ignored_too() {
        let mut state = DashboardState::new(Period::Monthly);
        let hourly = state.begin_energy(Period::Hourly);
        let daily = state.begin_energy(Period::Daily);

        assert!(!state.resolve_energy(hourly, Err(rejected("boom"))));
        assert!(state.energy().is_pending());
        assert!(state.resolve_energy(daily, Ok(points("01 Jan"))));
    }

    #[test]
    fn same_period_reissued_still_takes_newest() {
        let mut state = DashboardState::new(Period::Daily);
        let first = state.begin_energy(Period::Daily);
        let second = state.begin_energy(Period::Daily);

        assert!(!state.resolve_energy(first, Ok(points("old"))));
        assert!(state.resolve_energy(second, Ok(points("new"))));
        assert_eq!(state.energy().success(), Some(&points("new")));
    }

    #[test]
    fn begin_discards_previous_data() {
        let mut state = DashboardState::new(Period::Monthly);
        let ticket = state.begin_energy(Period::Monthly);
        state.resolve_energy(ticket, Ok(points("Jan")));

        state.begin_energy(Period::Hourly);
        assert!(state.energy().is_pending());
        assert!(state.energy().success().is_none());
    }

    #[test]
    fn failed_slot_hides_the_other_slots_data() {
        let mut state = DashboardState::new(Period::Monthly);
        let energy = state.begin_energy(Period::Monthly);
        let stats = state.begin_statistics();
        state.resolve_energy(energy, Ok(points("Jan")));
        let message = "Failed to load dashboard data. Please try again.";
        state.resolve_statistics(stats, Err(rejected(message)));

        assert_eq!(state.view(), DashboardView::Failed(message.to_string()));
    }
}
