//! M/M/c utilisation assessment for the picker queue
//!
//! The packing zone is modeled as an M/M/c queue: pallet demand arrives
//! at rate λ, `c` pickers serve at rate μ each. The assessment feeds the
//! observability facade and the high-consumption probe with the
//! utilisation ρ and the Erlang-C probability that a pallet waits.

use serde::Serialize;

use crate::config::QueueingConfig;

/// Utilisation band against the configured thresholds.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum QueueBand {
    Stable,
    Overloaded,
    Critical,
}

impl std::fmt::Display for QueueBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueBand::Stable => write!(f, "STABLE"),
            QueueBand::Overloaded => write!(f, "OVERLOADED"),
            QueueBand::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// One M/M/c assessment.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct QueueAssessment {
    /// Utilisation ρ = λ / (c·μ)
    pub rho: f64,
    /// Erlang-C probability that an arriving pallet must wait
    pub wait_probability: f64,
    pub band: QueueBand,
}

/// Assess an M/M/c queue.
///
/// `arrival_rate` and `service_rate` share any time unit; `servers` is
/// the active picker count. A saturated or empty system degenerates to
/// ρ clamped high with certain waiting.
pub fn assess(
    arrival_rate: f64,
    service_rate: f64,
    servers: usize,
    config: &QueueingConfig,
) -> QueueAssessment {
    if servers == 0 || service_rate <= 0.0 {
        return QueueAssessment {
            rho: if arrival_rate > 0.0 { f64::INFINITY } else { 0.0 },
            wait_probability: if arrival_rate > 0.0 { 1.0 } else { 0.0 },
            band: if arrival_rate > 0.0 {
                QueueBand::Critical
            } else {
                QueueBand::Stable
            },
        };
    }

    let c = servers as f64;
    let offered = arrival_rate / service_rate; // A = λ/μ
    let rho = offered / c;

    let wait_probability = if rho >= 1.0 {
        1.0
    } else {
        erlang_c(offered, servers)
    };

    let band = if rho >= config.critical_threshold {
        QueueBand::Critical
    } else if rho >= config.overload_threshold {
        QueueBand::Overloaded
    } else {
        QueueBand::Stable
    };

    QueueAssessment {
        rho,
        wait_probability,
        band,
    }
}

/// Erlang-C formula for the probability of waiting, offered load `a`,
/// `c` servers. Terms are accumulated iteratively to avoid factorials.
fn erlang_c(a: f64, c: usize) -> f64 {
    let mut term = 1.0; // a^k / k!
    let mut sum = 1.0; // Σ_{k=0}^{c-1} a^k/k!
    for k in 1..c {
        term *= a / k as f64;
        sum += term;
    }
    let top = term * a / c as f64; // a^c / c!
    let rho = a / c as f64;
    let numerator = top / (1.0 - rho);
    numerator / (sum + numerator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_system_is_stable() {
        let q = assess(0.0, 10.0, 4, &QueueingConfig::default());
        assert_eq!(q.band, QueueBand::Stable);
        assert!(q.rho.abs() < 1e-9);
        assert!(q.wait_probability.abs() < 1e-9);
    }

    #[test]
    fn no_servers_under_load_is_critical() {
        let q = assess(50.0, 10.0, 0, &QueueingConfig::default());
        assert_eq!(q.band, QueueBand::Critical);
        assert!((q.wait_probability - 1.0).abs() < 1e-9);
    }

    #[test]
    fn erlang_c_matches_single_server_closed_form() {
        // M/M/1: P(wait) = ρ.
        let q = assess(6.0, 10.0, 1, &QueueingConfig::default());
        assert!((q.rho - 0.6).abs() < 1e-9);
        assert!((q.wait_probability - 0.6).abs() < 1e-9);
    }

    #[test]
    fn bands_follow_thresholds() {
        let config = QueueingConfig::default();
        assert_eq!(assess(70.0, 10.0, 10, &config).band, QueueBand::Stable);
        assert_eq!(assess(85.0, 10.0, 10, &config).band, QueueBand::Overloaded);
        assert_eq!(assess(96.0, 10.0, 10, &config).band, QueueBand::Critical);
    }

    #[test]
    fn saturation_waits_with_certainty() {
        let q = assess(120.0, 10.0, 10, &QueueingConfig::default());
        assert!(q.rho > 1.0);
        assert!((q.wait_probability - 1.0).abs() < 1e-9);
    }
}
