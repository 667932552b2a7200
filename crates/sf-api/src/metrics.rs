//! Prometheus metrics exposed on `/metrics`.

use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct VoteLabels {
    pub target: String,
    pub action: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct TriggerLabels {
    pub trigger: String,
}

pub struct ApiMetrics {
    registry: Registry,
    pub threads_created: Counter,
    pub replies_created: Counter,
    pub votes_cast: Family<VoteLabels, Counter>,
    pub ai_jobs_started: Family<TriggerLabels, Counter>,
    pub ai_jobs_in_flight: Gauge,
}

impl Default for ApiMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ApiMetrics {
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix("study_forum");

        let threads_created = Counter::default();
        registry.register("threads_created", "Threads created", threads_created.clone());

        let replies_created = Counter::default();
        registry.register("replies_created", "Replies posted by users", replies_created.clone());

        let votes_cast = Family::<VoteLabels, Counter>::default();
        registry.register("votes_cast", "Votes applied to the ledger", votes_cast.clone());

        let ai_jobs_started = Family::<TriggerLabels, Counter>::default();
        registry.register("ai_jobs_started", "AI answer jobs started", ai_jobs_started.clone());

        let ai_jobs_in_flight = Gauge::default();
        registry.register("ai_jobs_in_flight", "AI answer jobs not yet settled", ai_jobs_in_flight.clone());

        Self { registry, threads_created, replies_created, votes_cast, ai_jobs_started, ai_jobs_in_flight }
    }

    pub fn record_vote(&self, target: &str, action: &str) {
        self.votes_cast
            .get_or_create(&VoteLabels { target: target.to_string(), action: action.to_string() })
            .inc();
    }

    pub fn record_ai_job(&self, trigger: &str) {
        self.ai_jobs_started.get_or_create(&TriggerLabels { trigger: trigger.to_string() }).inc();
    }

    /// OpenMetrics text exposition.
    pub fn render(&self) -> Result<String, std::fmt::Error> {
        let mut buffer = String::new();
        encode(&mut buffer, &self.registry)?;
        Ok(buffer)
    }
}
