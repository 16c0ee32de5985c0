//! Static name -> constructor table for strategies.

use serde_yaml::Mapping;
use std::fmt::Write;

use super::{
    EmaCross, IndexHold, Momentum, MomentumRebalance, StochCross, Strategy, StrategyError,
};

/// Run-level inputs every constructor receives.
#[derive(Debug, Clone, Copy)]
pub struct StrategyArgs<'a> {
    /// Primary ticker of the run
    pub ticker: &'a str,
    /// Default order size in shares
    pub trade_size: u64,
    /// Strategy-specific parameters
    pub params: &'a Mapping,
}

type Constructor = fn(StrategyArgs<'_>) -> Result<Box<dyn Strategy>, StrategyError>;

/// A registered strategy.
#[derive(Clone)]
pub struct StrategyEntry {
    /// Config name (`ema_cross`)
    pub name: &'static str,
    /// Class-style aliases (`EMACrossStrategy`)
    pub aliases: &'static [&'static str],
    /// One-line description
    pub description: &'static str,
    build: Constructor,
}

impl std::fmt::Debug for StrategyEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyEntry")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .finish()
    }
}

impl StrategyEntry {
    fn matches(&self, key: &str) -> bool {
        self.name.eq_ignore_ascii_case(key) || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(key))
    }
}

fn build_ema_cross(args: StrategyArgs<'_>) -> Result<Box<dyn Strategy>, StrategyError> {
    Ok(Box::new(EmaCross::from_args(args)?))
}

fn build_stoch(args: StrategyArgs<'_>) -> Result<Box<dyn Strategy>, StrategyError> {
    Ok(Box::new(StochCross::from_args(args)?))
}

fn build_momentum(args: StrategyArgs<'_>) -> Result<Box<dyn Strategy>, StrategyError> {
    Ok(Box::new(Momentum::from_args(args)?))
}

fn build_momentum_rebalance(args: StrategyArgs<'_>) -> Result<Box<dyn Strategy>, StrategyError> {
    Ok(Box::new(MomentumRebalance::from_args(args)?))
}

fn build_index_hold(args: StrategyArgs<'_>) -> Result<Box<dyn Strategy>, StrategyError> {
    Ok(Box::new(IndexHold::from_args(args)?))
}

/// Registry of all built-in strategies.
#[derive(Debug, Clone)]
pub struct StrategyRegistry {
    entries: Vec<StrategyEntry>,
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self {
            entries: vec![
                StrategyEntry {
                    name: "ema_cross",
                    aliases: &["EMACrossStrategy", "EMACrossConfig", "ema"],
                    description: "Long on fast/slow EMA golden cross, flat on death cross",
                    build: build_ema_cross,
                },
                StrategyEntry {
                    name: "stoch",
                    aliases: &["StochCrossStrategy", "StochConfig", "stoch_cross"],
                    description: "Long when %K crosses above %D, flat when below",
                    build: build_stoch,
                },
                StrategyEntry {
                    name: "momentum",
                    aliases: &["MomentumStrategy"],
                    description: "Buy and hold the top-N momentum stocks",
                    build: build_momentum,
                },
                StrategyEntry {
                    name: "momentum_rebalance",
                    aliases: &["MomentumRebalanceStrategy"],
                    description: "Top-N momentum stocks, rebalanced monthly or quarterly",
                    build: build_momentum_rebalance,
                },
                StrategyEntry {
                    name: "index_hold",
                    aliases: &["IndexHoldStrategy"],
                    description: "Buy and hold a single index ETF",
                    build: build_index_hold,
                },
            ],
        }
    }

    pub fn entries(&self) -> &[StrategyEntry] {
        &self.entries
    }

    /// One line per strategy: name, description, aliases.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            let _ = writeln!(
                out,
                "{:<20} {} (aliases: {})",
                entry.name,
                entry.description,
                entry.aliases.join(", ")
            );
        }
        out
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|e| e.name).collect()
    }

    /// Find by config name, falling back to the class name.
    pub fn find(&self, name: &str, class: Option<&str>) -> Option<&StrategyEntry> {
        self.entries
            .iter()
            .find(|e| e.matches(name))
            .or_else(|| class.and_then(|c| self.entries.iter().find(|e| e.matches(c))))
    }

    pub fn create(
        &self,
        name: &str,
        class: Option<&str>,
        args: StrategyArgs<'_>,
    ) -> Result<Box<dyn Strategy>, StrategyError> {
        let entry = self
            .find(name, class)
            .ok_or_else(|| StrategyError::UnknownStrategy {
                name: name.to_string(),
                available: self.names().join(", "),
            })?;
        (entry.build)(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn args(params: &Mapping) -> StrategyArgs<'_> {
        StrategyArgs {
            ticker: "AAPL",
            trade_size: 100,
            params,
        }
    }

    #[test_case("ema_cross", None, "EMACrossStrategy-000" ; "by name")]
    #[test_case("EMA_CROSS", None, "EMACrossStrategy-000" ; "case insensitive")]
    #[test_case("custom", Some("StochCrossStrategy"), "StochCrossStrategy-000" ; "by class")]
    #[test_case("momentum", None, "MomentumStrategy-000" ; "momentum")]
    #[test_case("momentum_rebalance", None, "MomentumRebalanceStrategy-000" ; "rebalance")]
    #[test_case("index_hold", None, "IndexHoldStrategy-000" ; "index hold")]
    fn test_create(name: &str, class: Option<&str>, expected_id: &str) {
        let params = Mapping::new();
        let strategy = StrategyRegistry::new().create(name, class, args(&params)).unwrap();
        assert_eq!(strategy.id(), expected_id);
    }

    #[test]
    fn test_describe_lists_every_strategy() {
        let registry = StrategyRegistry::new();
        let listing = registry.describe();
        assert_eq!(listing.lines().count(), registry.entries().len());
        assert!(listing.contains("Buy and hold a single index ETF (aliases: IndexHoldStrategy)"));
        assert!(listing.lines().next().unwrap().starts_with("ema_cross"));
    }

    #[test]
    fn test_unknown_strategy() {
        let params = Mapping::new();
        let err = StrategyRegistry::new()
            .create("martingale", None, args(&params))
            .err()
            .unwrap();
        assert!(matches!(err, StrategyError::UnknownStrategy { .. }));
        assert!(err.to_string().contains("ema_cross"));
    }

    #[test]
    fn test_bad_params_rejected() {
        let params: Mapping = serde_yaml::from_str("fast_ema_period: fast").unwrap();
        let err = StrategyRegistry::new()
            .create("ema_cross", None, args(&params))
            .err()
            .unwrap();
        assert!(matches!(err, StrategyError::InvalidParams { .. }));
    }
}
