// tests/gateway/scenario_tests.rs

#[cfg(test)]
mod tests {
    use crate::fixtures::test_clock::TestClock;
    use chrono::TimeDelta;
    use ip_gate::{AccessDecision, Gate, GatewayConfig, Ledger, hour_floor};
    use std::sync::Arc;

    fn gate(config: GatewayConfig, clock: &TestClock) -> Gate<TestClock> {
        let ledger = Arc::new(Ledger::with_config(&config, clock.clone()));
        Gate::new(ledger, &config)
    }

    #[test]
    fn accesses_across_an_hour_boundary() {
        let clock = TestClock::new();
        let t0 = TestClock::t0();
        let gate = gate(GatewayConfig::new("s"), &clock);

        gate.ledger().grant("10.0.0.1").unwrap();
        assert!(gate.check_access("10.0.0.1", "a.example").unwrap().is_authorized());
        clock.advance(TimeDelta::seconds(10));
        assert!(gate.check_access("10.0.0.1", "b.example").unwrap().is_authorized());
        clock.set(t0 + TimeDelta::seconds(3700));
        assert!(gate.check_access("10.0.0.1", "a.example").unwrap().is_authorized());

        let snapshot = gate.ledger().lookup("10.0.0.1").unwrap().snapshot();
        assert_eq!(snapshot.domains_accessed, vec!["a.example", "b.example"]);
        assert_eq!(snapshot.buckets.len(), 2);
        assert_eq!(snapshot.buckets[&hour_floor(t0)], 2);
        assert_eq!(
            snapshot.buckets[&hour_floor(t0 + TimeDelta::seconds(3700))],
            1
        );
        assert_eq!(snapshot.last_access, Some(t0 + TimeDelta::seconds(3700)));
    }

    #[test]
    fn same_hour_accesses_share_one_bucket() {
        let clock = TestClock::new();
        let gate = gate(GatewayConfig::new("s"), &clock);
        gate.unlock("10.0.0.1", "s").unwrap();

        for _ in 0..7 {
            gate.check_access("10.0.0.1", "a.example").unwrap();
            clock.advance(TimeDelta::minutes(5));
        }

        let buckets = gate.ledger().lookup("10.0.0.1").unwrap().buckets();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets.values().sum::<u64>(), 7);
    }

    #[test]
    fn repeated_unlock_keeps_a_single_record() {
        let clock = TestClock::new();
        let gate = gate(GatewayConfig::new("s"), &clock);

        for _ in 0..3 {
            gate.unlock("10.0.0.1", "s").unwrap();
            clock.advance(TimeDelta::hours(1));
        }

        let snapshot = gate.ledger().snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].authed_at, TestClock::t0());
    }

    #[test]
    fn wrong_secret_never_grants() {
        let clock = TestClock::new();
        let gate = gate(GatewayConfig::new("correct horse"), &clock);
        gate.unlock("10.0.0.1", "correct hors").unwrap();
        gate.unlock("10.0.0.1", "correct horse battery").unwrap();
        assert_eq!(
            gate.check_access("10.0.0.1", "a.example").unwrap(),
            AccessDecision::Unknown
        );
        assert_eq!(gate.failed_logins()[0].1.len(), 2);
    }
}
