//! # Integration Tests
//!
//! End-to-end and cross-crate tests.
//!
//! Covers:
//! - Direction scenarios on synthetic reading streams (`scenario_tests`)
//! - Tracker, detector and session invariants (`invariant_tests`)
//! - Simulated bus -> sampling -> detector -> session -> dispatcher (`e2e_tests`)

#[cfg(test)]
mod fixtures;

#[cfg(test)]
mod scenario_tests;

#[cfg(test)]
mod invariant_tests;

#[cfg(test)]
mod e2e_tests;

#[cfg(test)]
mod contract_tests {
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{BoardIndex, Position, Side};

    #[test]
    fn test_position_numbering() {
        for board in BoardIndex::ALL {
            assert_eq!(board.position(Side::A).index(), 2 * board.index());
            assert_eq!(board.position(Side::B).index(), 2 * board.index() + 1);
        }
        assert_eq!(Position::ALL.len(), 6);
    }

    #[test]
    fn test_default_config_loads_and_validates() {
        let config =
            ConfigLoader::load_from_str("[device]\ndevice_id = \"motionplay-device-009\"\n", ConfigFormat::Toml)
                .unwrap();
        assert_eq!(config.device.suffix(), "009");
        ConfigLoader::validate(&config).unwrap();
        assert_eq!(config.detector.max_peak_gap_ms, 150.0);
        assert_eq!(config.upload.proximity_batch_size, 25);
    }
}
