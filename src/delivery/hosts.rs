//! Per-run host health tracking.
//!
//! The candidate host set is fixed for a run and derived from the account
//! identity. A host that returns server errors is marked down and skipped
//! until a cool-down elapses; the marking expires on its own, so a host
//! that recovered is retried without operator intervention. State is owned
//! by the run (one tenant per run), never shared globally.

use std::time::{Duration, Instant};

use tracing::info;

use crate::emit;
use crate::metrics::events::HostMarkedDown;

/// Number of fallback hosts derived after the primary.
const FALLBACK_HOSTS: usize = 3;

struct HostHealth {
    hostname: String,
    down_since: Option<Instant>,
}

/// Ordered candidate hosts with time-bounded down markings.
pub struct HostPool {
    hosts: Vec<HostHealth>,
    cooldown: Duration,
}

impl HostPool {
    /// Build the deterministic candidate set for an account:
    /// `{app}.{domain}`, then `{app}-1.{domain}` … `{app}-3.{domain}`.
    pub fn for_account(application_id: &str, domain: &str, cooldown: Duration) -> Self {
        let mut hostnames = vec![format!("{application_id}.{domain}")];
        for i in 1..=FALLBACK_HOSTS {
            hostnames.push(format!("{application_id}-{i}.{domain}"));
        }
        Self::new(hostnames, cooldown)
    }

    /// Build a pool over an explicit host list.
    pub fn new(hostnames: Vec<String>, cooldown: Duration) -> Self {
        Self {
            hosts: hostnames
                .into_iter()
                .map(|hostname| HostHealth {
                    hostname,
                    down_since: None,
                })
                .collect(),
            cooldown,
        }
    }

    /// Hosts to try, in order.
    ///
    /// Filters out hosts still inside their cool-down. When every host is
    /// down, the full set is returned instead of failing outright: the
    /// markings are stale guesses, and trying again beats giving up.
    pub fn candidates(&self) -> Vec<String> {
        let available: Vec<String> = self
            .hosts
            .iter()
            .filter(|h| self.is_healthy(h))
            .map(|h| h.hostname.clone())
            .collect();

        if available.is_empty() {
            self.hosts.iter().map(|h| h.hostname.clone()).collect()
        } else {
            available
        }
    }

    /// Mark a host down as of now.
    pub fn mark_down(&mut self, hostname: &str) {
        if let Some(host) = self.hosts.iter_mut().find(|h| h.hostname == hostname) {
            info!(host = %hostname, "Marking host down");
            host.down_since = Some(Instant::now());
            emit!(HostMarkedDown {
                host: hostname.to_string(),
            });
        }
    }

    /// True when the host is not currently marked down (expired markings
    /// count as healthy).
    pub fn is_available(&self, hostname: &str) -> bool {
        self.hosts
            .iter()
            .find(|h| h.hostname == hostname)
            .is_some_and(|h| self.is_healthy(h))
    }

    fn is_healthy(&self, host: &HostHealth) -> bool {
        match host.down_since {
            None => true,
            Some(since) => since.elapsed() >= self.cooldown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(cooldown: Duration) -> HostPool {
        HostPool::for_account("ACME1", "search-api.net", cooldown)
    }

    #[test]
    fn test_candidate_derivation() {
        let pool = pool(Duration::from_secs(300));
        assert_eq!(
            pool.candidates(),
            vec![
                "ACME1.search-api.net",
                "ACME1-1.search-api.net",
                "ACME1-2.search-api.net",
                "ACME1-3.search-api.net",
            ]
        );
    }

    #[test]
    fn test_marked_down_host_is_filtered() {
        let mut pool = pool(Duration::from_secs(300));
        pool.mark_down("ACME1.search-api.net");

        assert!(!pool.is_available("ACME1.search-api.net"));
        assert!(pool.is_available("ACME1-1.search-api.net"));
        assert_eq!(pool.candidates().len(), 3);
        assert!(!pool.candidates().contains(&"ACME1.search-api.net".to_string()));
    }

    #[test]
    fn test_down_marking_expires_after_cooldown() {
        let mut pool = pool(Duration::ZERO);
        pool.mark_down("ACME1.search-api.net");

        // Zero cool-down: the marking is already expired.
        assert!(pool.is_available("ACME1.search-api.net"));
        assert_eq!(pool.candidates().len(), 4);
    }

    #[test]
    fn test_all_down_falls_back_to_full_set() {
        let mut pool = pool(Duration::from_secs(300));
        for host in pool.candidates() {
            pool.mark_down(&host);
        }

        // Stale-while-revalidate: try everything again rather than failing.
        assert_eq!(pool.candidates().len(), 4);
    }

    #[test]
    fn test_unknown_host_is_ignored() {
        let mut pool = pool(Duration::from_secs(300));
        pool.mark_down("nonsense.example");
        assert!(!pool.is_available("nonsense.example"));
        assert_eq!(pool.candidates().len(), 4);
    }
}
